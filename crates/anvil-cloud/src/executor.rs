use std::collections::BTreeMap;

use futures::StreamExt;
use secrecy::ExposeSecret;

use crate::http::{Body, HttpError, HttpRequest, HttpResponse, Method, StreamingResponse, split_lines};

/// Abstraction over HTTP transport for testability.
///
/// Production code uses [`RealExecutor`], tests use mockall-generated mocks.
#[allow(async_fn_in_trait)]
pub trait HttpExecutor: Send + Sync {
    /// Send a request and buffer the whole response body.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;

    /// Send a request and hand back the body as a line stream.
    async fn send_streaming(&self, request: HttpRequest)
    -> Result<StreamingResponse, HttpError>;
}

/// reqwest-backed executor.
#[derive(Debug, Clone, Default)]
pub struct RealExecutor {
    http: reqwest::Client,
}

impl RealExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    async fn dispatch(&self, request: HttpRequest) -> Result<reqwest::Response, HttpError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
        };

        let mut builder = self.http.request(method, &request.url);
        if !request.user_agent.is_empty() {
            builder = builder.header(reqwest::header::USER_AGENT, &request.user_agent);
        }
        if let Some(key) = &request.api_key {
            builder = builder.basic_auth("", Some(key.expose_secret()));
        }

        builder = match request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(&value),
            Body::File(path) => {
                let file = tokio::fs::File::open(&path)
                    .await
                    .map_err(|e| HttpError::BodyFile { path, source: e })?;
                builder
                    .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                    .body(reqwest::Body::from(file))
            }
        };

        tracing::debug!(method = ?request.method, url = %request.url, "http request");
        builder
            .send()
            .await
            .map_err(|e| HttpError::Transport { source: e })
    }
}

fn header_map(headers: &reqwest::header::HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_owned(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

impl HttpExecutor for RealExecutor {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let response = self.dispatch(request).await?;
        let status = response.status().as_u16();
        let headers = header_map(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| HttpError::Transport { source: e })?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn send_streaming(
        &self,
        request: HttpRequest,
    ) -> Result<StreamingResponse, HttpError> {
        let response = self.dispatch(request).await?;
        let status = response.status().as_u16();
        let headers = header_map(response.headers());
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| HttpError::Transport { source: e }));

        Ok(StreamingResponse {
            status,
            headers,
            lines: split_lines(chunks),
        })
    }
}
