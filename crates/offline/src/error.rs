use thiserror::Error;

#[derive(Error, Debug)]
pub enum OfflineError {
    /// Index loading succeeded, but the representation carries no index at all.
    #[error("Missing segment index")]
    MissingSegmentIndex,

    #[error("Unbounded segment index")]
    UnboundedSegmentIndex,

    #[error("Interrupted")]
    Interrupted,

    #[error("Representation {0:?} has no base URL")]
    NoBaseUrl(Option<String>),

    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error("Invalid container data: {0}")]
    InvalidContainer(String),

    #[error("Invalid MPD: {0}")]
    MpdParsing(String),

    #[error("Index probe task failed: {0}")]
    ProbeTask(String),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error(transparent)]
    MpdParseError(#[from] dash_mpd::DashMpdError),
}

impl OfflineError {
    /// Cancellation is never treated as a probe failure, whatever the build intent is.
    pub fn is_interruption(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

pub type OfflineResult<T> = Result<T, OfflineError>;
