use std::fmt;

#[derive(Debug)]
pub enum BatchError {
    ThreadPool(rayon::ThreadPoolBuildError),
    Settings(String),
}

impl From<rayon::ThreadPoolBuildError> for BatchError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        BatchError::ThreadPool(e)
    }
}

impl From<serde_json::Error> for BatchError {
    fn from(e: serde_json::Error) -> Self {
        BatchError::Settings(e.to_string())
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchError::ThreadPool(e) => write!(f, "Thread pool error: {}", e),
            BatchError::Settings(e) => write!(f, "Settings error: {}", e),
        }
    }
}

impl std::error::Error for BatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BatchError::ThreadPool(e) => Some(e),
            BatchError::Settings(_) => None,
        }
    }
}
