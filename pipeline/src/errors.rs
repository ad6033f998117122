use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    Input(String),

    #[error("No data: {0}")]
    EmptyInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sensor registry error: {0}")]
    Registry(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Object storage error: {0}")]
    Storage(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures of an external service call. These propagate to the
    /// Lambda runtime unhandled; the trigger's own retry policy applies.
    pub fn is_upstream(&self) -> bool {
        match self {
            Error::Registry(_) | Error::Queue(_) | Error::Storage(_) | Error::Notification(_) => {
                true
            }

            Error::Input(_)
            | Error::EmptyInput(_)
            | Error::Config(_)
            | Error::Json(_)
            | Error::Csv(_)
            | Error::Io(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
