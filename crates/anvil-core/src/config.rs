use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::env::{EnvProvider, parse_build_env};
use crate::manifest::Manifest;
use crate::platform::{BuildFile, BuildRequest};

/// Name of the per-project configuration file.
pub const CONFIG_FILE: &str = "anvil.toml";

/// Buildpack URL schemes the build service accepts.
pub const BUILDPACK_SCHEMES: &[&str] = &["http", "https", "git"];

/// anvil.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnvilConfig {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub build: BuildSettings,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Target application name
    pub name: Option<String>,
    /// Human-readable description attached to each release
    pub release_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSettings {
    /// Custom buildpack (http, https or git URL). Auto-detected when unset.
    pub buildpack_url: Option<String>,
    /// Build environment, one `KEY=VALUE` per line (Java properties syntax).
    #[serde(default)]
    pub env: String,
    /// Read the remote file cache when diffing. Writes are always enabled.
    #[serde(default = "default_true")]
    pub use_cache: bool,
    /// Ask the build service to store the resulting slug.
    #[serde(default)]
    pub write_slug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Directory to deploy, relative to the project directory
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    /// Comma-separated include globs
    #[serde(default = "default_includes")]
    pub includes: String,
    /// Comma-separated exclude globs
    #[serde(default)]
    pub excludes: String,
    /// Maximum concurrent file uploads
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Platform API (accounts, apps, releases)
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Build service (file uploads, cache, builds)
    #[serde(default = "default_build_url")]
    pub build_url: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            buildpack_url: None,
            env: String::new(),
            use_cache: true,
            write_slug: false,
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            includes: default_includes(),
            excludes: String::new(),
            upload_concurrency: default_upload_concurrency(),
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            build_url: default_build_url(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl AnvilConfig {
    /// Load from anvil.toml at the given path, or return defaults if not found.
    pub fn load(project_dir: &Path) -> crate::Result<Self> {
        let config_path = project_dir.join(CONFIG_FILE);
        if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).map_err(|e| crate::Error::ConfigLoad {
                    path: config_path.clone(),
                    source: e,
                })?;
            toml::from_str(&content).map_err(|e| crate::Error::ConfigParse {
                path: config_path,
                source: e,
            })
        } else {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn app_name(&self) -> crate::Result<&str> {
        self.app
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or(crate::Error::MissingAppName)
    }

    /// Buildpack URL with blank values treated as unset.
    pub fn buildpack_url(&self) -> Option<&str> {
        self.build
            .buildpack_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

/// Resolved, immutable configuration for one build.
///
/// Build environment values are expanded when the config is constructed and
/// never again.
#[derive(Clone)]
pub struct BuildConfig {
    pub api_key: SecretString,
    pub consumer_user_agent: String,
    pub read_cache: bool,
    pub write_cache: bool,
    pub write_slug: bool,
    pub app_name: String,
    pub app_user: String,
    pub buildpack_url: Option<String>,
    pub env: BTreeMap<String, String>,
}

impl fmt::Debug for BuildConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildConfig")
            .field("api_key", &"[REDACTED]")
            .field("consumer_user_agent", &self.consumer_user_agent)
            .field("read_cache", &self.read_cache)
            .field("write_cache", &self.write_cache)
            .field("write_slug", &self.write_slug)
            .field("app_name", &self.app_name)
            .field("app_user", &self.app_user)
            .field("buildpack_url", &self.buildpack_url)
            .field("env", &self.env)
            .finish()
    }
}

impl BuildConfig {
    pub fn new(
        config: &AnvilConfig,
        api_key: SecretString,
        app_user: &str,
        env: &impl EnvProvider,
    ) -> crate::Result<Self> {
        let app_name = config.app_name()?.to_owned();

        let buildpack_url = match config.buildpack_url() {
            Some(url) => {
                validate_buildpack_url(url)?;
                Some(url.to_owned())
            }
            None => None,
        };

        let env = expand_build_env(&config.build.env, env)?;
        tracing::debug!(
            app = %app_name,
            vars = env.len(),
            read_cache = config.build.use_cache,
            "build config resolved",
        );

        Ok(Self {
            api_key,
            consumer_user_agent: default_user_agent(),
            read_cache: config.build.use_cache,
            write_cache: true,
            write_slug: config.build.write_slug,
            app_name,
            app_user: app_user.to_owned(),
            buildpack_url,
            env,
        })
    }

    /// Assemble a build submission for `manifest`, whose content is already
    /// resolvable through `remote_ref`.
    ///
    /// `buildpack_override` takes precedence over the configured buildpack.
    pub fn build_request<'a>(
        &self,
        manifest: &Manifest,
        remote_ref: impl Fn(&crate::ContentHash) -> Option<&'a str>,
        buildpack_override: Option<&str>,
    ) -> Result<BuildRequest, crate::ContentHash> {
        let files = manifest
            .entries()
            .iter()
            .map(|entry| {
                remote_ref(&entry.hash)
                    .map(|r| BuildFile {
                        path: entry.path.clone(),
                        hash: entry.hash.clone(),
                        size: entry.size,
                        remote_ref: r.to_owned(),
                    })
                    .ok_or_else(|| entry.hash.clone())
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BuildRequest {
            app_name: self.app_name.clone(),
            app_user: self.app_user.clone(),
            consumer_user_agent: self.consumer_user_agent.clone(),
            buildpack_url: buildpack_override
                .map(str::to_owned)
                .or_else(|| self.buildpack_url.clone()),
            env: self.env.clone(),
            read_cache: self.read_cache,
            write_cache: self.write_cache,
            write_slug: self.write_slug,
            files,
        })
    }
}

/// Parse build environment text and expand each value against `provider`.
pub fn expand_build_env(
    text: &str,
    provider: &impl EnvProvider,
) -> crate::Result<BTreeMap<String, String>> {
    let mut vars = parse_build_env(text)?;
    for value in vars.values_mut() {
        *value = provider.expand(value);
    }
    Ok(vars)
}

/// Check that a buildpack URL is well formed and uses an accepted scheme.
pub fn validate_buildpack_url(url: &str) -> crate::Result<()> {
    let invalid = |reason| crate::Error::InvalidBuildpackUrl {
        url: url.to_owned(),
        reason,
    };

    if url.chars().any(char::is_whitespace) {
        return Err(invalid("invalid URL format"));
    }

    let Some((scheme, rest)) = url.split_once(':') else {
        return Err(invalid("should be of type http:// or git://"));
    };

    let mut chars = scheme.chars();
    let well_formed = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !well_formed || rest.is_empty() {
        return Err(invalid("invalid URL format"));
    }

    if !BUILDPACK_SCHEMES.contains(&scheme) {
        return Err(invalid("should be of type http:// or git://"));
    }

    Ok(())
}

pub fn default_user_agent() -> String {
    format!("anvil/{}", env!("CARGO_PKG_VERSION"))
}

fn default_true() -> bool {
    true
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_includes() -> String {
    "**".to_owned()
}

fn default_upload_concurrency() -> usize {
    4
}

fn default_api_url() -> String {
    "https://api.heroku.com".to_owned()
}

fn default_build_url() -> String {
    "https://api.anvilworks.org".to_owned()
}

fn default_api_key_env() -> String {
    "HEROKU_API_KEY".to_owned()
}
