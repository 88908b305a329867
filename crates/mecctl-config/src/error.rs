use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading profile file {path}: {source}")]
    ProfileRead { path: String, #[source] source: std::io::Error },
    #[error("parsing profile file {path}: {source}")]
    ProfileParse { path: String, #[source] source: serde_yaml::Error },
    #[error("installing tracing subscriber: {0}")]
    Tracing(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
