use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("app name not set — set [app].name in anvil.toml or pass --app")]
    MissingAppName,

    #[error("API key not found — export {var} or add it to .env")]
    MissingApiKey { var: String },

    #[error("invalid buildpack URL {url:?}: {reason}")]
    InvalidBuildpackUrl { url: String, reason: &'static str },

    #[error("duplicate path in manifest: {path}")]
    DuplicateManifestPath { path: String },

    // ── Build environment ──
    #[error("error parsing build environment at line {line}: {reason}")]
    BuildEnv { line: usize, reason: String },
}
