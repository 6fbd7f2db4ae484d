use crate::messaging::PageId;
use crate::retry::Retryable;
use crate::style::selector::SelectorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("Style parse error: {0}")]
    Style(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Rice Cooker already initialized in page {0}")]
    AlreadyInitialized(PageId),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure to reach a page's script context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The page exists but no Page Agent is listening yet.
    #[error("Could not establish connection. Receiving end does not exist (page {0})")]
    NoReceiver(PageId),

    #[error("Page {0} is closed")]
    PageClosed(PageId),

    #[error("No active page")]
    NoActivePage,
}

impl Retryable for DeliveryError {
    fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::NoReceiver(_))
    }
}

impl Retryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Delivery(err) => err.is_retryable(),
            _ => false,
        }
    }
}
