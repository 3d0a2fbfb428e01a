use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Navigation to {0} did not settle in time")]
    NavigationTimeout(String),

    #[error("Step '{step}' failed: {reason}")]
    Interaction { step: &'static str, reason: String },

    #[error("Unexpected export destination: {0}")]
    WrongDestination(String),

    #[error("Fetching export payload failed: {0}")]
    Fetch(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Export payload is missing '{0}'")]
    MissingField(&'static str),

    #[error("Timeline error: {0}")]
    Timeline(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Task aborted before completion")]
    TaskAborted,
}

impl Error {
    /// Whether a fresh attempt on a new page may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Navigation { .. }
                | Error::NavigationTimeout(_)
                | Error::Interaction { .. }
                | Error::WrongDestination(_)
                | Error::Fetch(_)
                | Error::Browser(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Encoding(err.to_string())
    }
}
