use thiserror::Error;

/// Unified error type for the PDF build and publish pipeline
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("Remote tag listing failed: {0}")]
    RemoteList(String),

    #[error("Integrity check failed for {artifact}: {reason}")]
    Integrity { artifact: String, reason: String },

    #[error("Documentation build failed: {0}")]
    Build(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Command `{command}` exited with status {status}: {stderr}")]
    Process {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("Download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results in pdf-manuals
pub type Result<T> = std::result::Result<T, PdfError>;

impl PdfError {
    pub fn remote_list(msg: impl Into<String>) -> Self {
        PdfError::RemoteList(msg.into())
    }

    pub fn integrity(artifact: impl Into<String>, reason: impl Into<String>) -> Self {
        PdfError::Integrity {
            artifact: artifact.into(),
            reason: reason.into(),
        }
    }

    pub fn build(msg: impl Into<String>) -> Self {
        PdfError::Build(msg.into())
    }

    pub fn publish(msg: impl Into<String>) -> Self {
        PdfError::Publish(msg.into())
    }

    pub fn archive(msg: impl Into<String>) -> Self {
        PdfError::Archive(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        PdfError::Config(msg.into())
    }
}
