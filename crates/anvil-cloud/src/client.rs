use std::path::Path;
use std::sync::Arc;

use anvil_core::{
    ArtifactRef, BuildExit, BuildRequest, BuildStream, CacheEntry, CacheSnapshot, CacheStore,
    ContentHash, Manifest, Platform, PlatformConfig, PlatformError, ReleaseInfo, UserInfo,
};
use futures::StreamExt;
use futures::stream::BoxStream;
use secrecy::SecretString;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::executor::{HttpExecutor, RealExecutor};
use crate::http::{HttpError, HttpRequest, HttpResponse};

/// Build output headers carrying follow-up URLs.
const SLUG_URL_HEADER: &str = "x-slug-url";
const EXIT_URL_HEADER: &str = "x-exit-url";

/// Base URLs of the two remote services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Accounts, apps, and releases.
    pub api_url: String,
    /// File storage, cache, and builds.
    pub build_url: String,
}

impl Endpoints {
    pub fn new(api_url: &str, build_url: &str) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_owned(),
            build_url: build_url.trim_end_matches('/').to_owned(),
        }
    }

    pub fn from_config(config: &PlatformConfig) -> Self {
        Self::new(&config.api_url, &config.build_url)
    }
}

/// Platform client scoped to one application, parameterized over the HTTP
/// executor for testability.
pub struct AnvilClient<E: HttpExecutor = RealExecutor> {
    executor: Arc<E>,
    endpoints: Endpoints,
    api_key: SecretString,
    user_agent: String,
    app_name: String,
}

impl AnvilClient<RealExecutor> {
    pub fn new(endpoints: Endpoints, api_key: SecretString, app_name: &str) -> Self {
        Self::with_executor(RealExecutor::new(), endpoints, api_key, app_name)
    }
}

impl<E: HttpExecutor> AnvilClient<E> {
    pub fn with_executor(
        executor: E,
        endpoints: Endpoints,
        api_key: SecretString,
        app_name: &str,
    ) -> Self {
        Self {
            executor: Arc::new(executor),
            endpoints,
            api_key,
            user_agent: anvil_core::config::default_user_agent(),
            app_name: app_name.to_owned(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    fn authorize(&self, mut request: HttpRequest) -> HttpRequest {
        request.user_agent.clone_from(&self.user_agent);
        request.api_key = Some(self.api_key.clone());
        request
    }

    async fn call(
        &self,
        operation: &'static str,
        request: HttpRequest,
    ) -> Result<HttpResponse, PlatformError> {
        let response = self
            .executor
            .send(self.authorize(request))
            .await
            .map_err(transport(operation))?;
        ensure_success(operation, response)
    }

    fn cache_url(&self) -> String {
        format!("{}/cache/{}", self.endpoints.build_url, self.app_name)
    }
}

fn transport(operation: &'static str) -> impl FnOnce(HttpError) -> PlatformError {
    move |e| PlatformError::Request {
        operation,
        source: Box::new(e),
    }
}

fn ensure_success(
    operation: &'static str,
    response: HttpResponse,
) -> Result<HttpResponse, PlatformError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(PlatformError::Rejected {
            operation,
            status: response.status,
            detail: response.text().trim().to_owned(),
        })
    }
}

fn decode<T: DeserializeOwned>(
    operation: &'static str,
    response: &HttpResponse,
) -> Result<T, PlatformError> {
    serde_json::from_slice(&response.body).map_err(|e| PlatformError::Protocol {
        operation,
        detail: e.to_string(),
    })
}

#[derive(Deserialize)]
struct ReleaseResponse {
    #[serde(alias = "name")]
    version: String,
}

#[derive(Deserialize)]
struct AppResponse {
    web_url: String,
}

#[derive(Deserialize)]
struct ArchiveResponse {
    slug_url: String,
}

impl<E: HttpExecutor + 'static> Platform for AnvilClient<E> {
    type Build = RemoteBuild<E>;

    async fn user_info(&self) -> Result<UserInfo, PlatformError> {
        let url = format!("{}/account", self.endpoints.api_url);
        let response = self.call("user info", HttpRequest::get(url)).await?;
        decode("user info", &response)
    }

    async fn upload(&self, hash: &ContentHash, path: &Path) -> Result<String, PlatformError> {
        let url = format!("{}/file/{hash}", self.endpoints.build_url);
        let response = self
            .call("file upload", HttpRequest::post(&url).file(path))
            .await?;
        let remote_ref = response.header("location").map_or(url, str::to_owned);
        tracing::debug!(hash = %hash.short(), %remote_ref, "file uploaded");
        Ok(remote_ref)
    }

    async fn start_build(&self, request: &BuildRequest) -> Result<RemoteBuild<E>, PlatformError> {
        const OPERATION: &str = "build";

        let body = serde_json::to_value(request).map_err(|e| PlatformError::Protocol {
            operation: OPERATION,
            detail: e.to_string(),
        })?;
        let url = format!("{}/manifest/build", self.endpoints.build_url);
        let response = self
            .executor
            .send_streaming(self.authorize(HttpRequest::post(url).json(body)))
            .await
            .map_err(transport(OPERATION))?;

        if !(200..300).contains(&response.status) {
            return Err(PlatformError::Rejected {
                operation: OPERATION,
                status: response.status,
                detail: "build submission refused".to_owned(),
            });
        }

        tracing::debug!(files = request.files.len(), "build started");
        Ok(RemoteBuild {
            slug_url: response.header(SLUG_URL_HEADER).map(str::to_owned),
            exit_url: response.header(EXIT_URL_HEADER).map(str::to_owned),
            lines: response.lines,
            executor: Arc::clone(&self.executor),
            exit_request: self.authorize(HttpRequest::get(String::new())),
        })
    }

    async fn release(
        &self,
        app_name: &str,
        artifact: ArtifactRef,
        description: Option<&str>,
    ) -> Result<ReleaseInfo, PlatformError> {
        let url = format!("{}/apps/{app_name}/releases", self.endpoints.api_url);
        let body = serde_json::json!({
            "slug_url": artifact.into_string(),
            "description": description,
        });
        let response = self.call("release", HttpRequest::post(url).json(body)).await?;
        let release: ReleaseResponse = decode("release", &response)?;

        let url = format!("{}/apps/{app_name}", self.endpoints.api_url);
        let response = self.call("app info", HttpRequest::get(url)).await?;
        let app: AppResponse = decode("app info", &response)?;

        tracing::info!(app = app_name, version = %release.version, "released");
        Ok(ReleaseInfo {
            version: release.version,
            web_url: app.web_url,
        })
    }

    async fn upload_archive(
        &self,
        app_name: &str,
        path: &Path,
    ) -> Result<ArtifactRef, PlatformError> {
        let url = format!("{}/archive/{app_name}", self.endpoints.build_url);
        let response = self
            .call("archive upload", HttpRequest::post(url).file(path))
            .await?;
        let archive: ArchiveResponse = decode("archive upload", &response)?;
        Ok(ArtifactRef::new(archive.slug_url))
    }
}

impl<E: HttpExecutor> CacheStore for AnvilClient<E> {
    async fn snapshot(&self) -> Result<CacheSnapshot, PlatformError> {
        const OPERATION: &str = "cache read";

        let request = self.authorize(HttpRequest::get(self.cache_url()));
        let response = self
            .executor
            .send(request)
            .await
            .map_err(transport(OPERATION))?;

        if response.status == 404 {
            tracing::debug!(app = %self.app_name, "no cache yet");
            return Ok(CacheSnapshot::default());
        }
        let response = ensure_success(OPERATION, response)?;
        let snapshot: CacheSnapshot = decode(OPERATION, &response)?;
        tracing::debug!(entries = snapshot.len(), "cache snapshot fetched");
        Ok(snapshot)
    }

    async fn record(&self, entry: CacheEntry) -> Result<(), PlatformError> {
        let url = format!("{}/files/{}", self.cache_url(), entry.hash);
        let body = serde_json::json!({ "remote_ref": entry.remote_ref });
        self.call("cache write", HttpRequest::put(url).json(body))
            .await
            .map(drop)
    }

    async fn record_manifest(&self, manifest: &Manifest) -> Result<(), PlatformError> {
        let url = format!("{}/manifest", self.cache_url());
        let body = serde_json::json!(manifest.path_index());
        self.call("cache manifest write", HttpRequest::put(url).json(body))
            .await
            .map(drop)
    }
}

/// Output of a build running on the build service.
pub struct RemoteBuild<E: HttpExecutor = RealExecutor> {
    lines: BoxStream<'static, Result<String, HttpError>>,
    slug_url: Option<String>,
    exit_url: Option<String>,
    executor: Arc<E>,
    /// Authorized request template for the exit status lookup.
    exit_request: HttpRequest,
}

impl<E: HttpExecutor> std::fmt::Debug for RemoteBuild<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBuild")
            .field("slug_url", &self.slug_url)
            .field("exit_url", &self.exit_url)
            .finish_non_exhaustive()
    }
}

impl<E: HttpExecutor> BuildStream for RemoteBuild<E> {
    async fn next_line(&mut self) -> Result<Option<String>, PlatformError> {
        self.lines
            .next()
            .await
            .transpose()
            .map_err(transport("build output"))
    }

    async fn finish(mut self) -> Result<BuildExit, PlatformError> {
        const OPERATION: &str = "build status";

        while self.next_line().await?.is_some() {}

        let Some(exit_url) = self.exit_url else {
            return Err(PlatformError::Protocol {
                operation: OPERATION,
                detail: "response carried no exit status URL".to_owned(),
            });
        };

        let mut request = self.exit_request;
        request.url = exit_url;
        let response = self
            .executor
            .send(request)
            .await
            .map_err(transport(OPERATION))?;
        let response = ensure_success(OPERATION, response)?;

        let text = response.text();
        let status = text.trim().parse::<i32>().map_err(|e| PlatformError::Protocol {
            operation: OPERATION,
            detail: format!("exit status {text:?}: {e}"),
        })?;

        Ok(BuildExit {
            status,
            artifact: self.slug_url.map(ArtifactRef::new),
        })
    }
}
