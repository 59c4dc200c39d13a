use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("failed to parse log: {0}")]
    Parse(String),

    #[error("log produced no valid frame samples")]
    NoFrameData,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("pre-flight check failed: {0}")]
    PreFlight(String),

    #[error("external process error: {0}")]
    ExternalProcess(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("restoration error: {0}")]
    Restoration(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("session cancelled: {0}")]
    Cancelled(String),

    #[error("lock contention: {0}")]
    LockContention(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("toml serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, BenchError>;
