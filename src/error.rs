use reqwest::StatusCode;
use thiserror::Error;

/// Everything that can go wrong between a story reference and a finished
/// EPUB. Transport failures are split into a transient class (retried
/// indefinitely by `Transport`) and fatal ones that surface to the caller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("\"{0}\" is not a fanfiction.net story URL or a story id")]
    StoryRef(String),
    #[error("no story found for id {0}")]
    StoryNotFound(u64),
    #[error("requested story id {requested} but the page reports id {parsed}")]
    IdMismatch { requested: u64, parsed: u64 },
    #[error("chapter label {0:?} has no leading chapter number")]
    ChapterLabel(String),
    #[error("cannot interpret {field} value {value:?}")]
    Field { field: String, value: String },
    #[error("invalid date: {0}")]
    DateFormat(#[from] chrono::ParseError),
    #[error("unrecognized duration {0:?}")]
    Duration(String),
    #[error("duration {0:?} walks off the calendar")]
    DateRange(String),
    #[error("page is missing expected element {0}")]
    MissingElement(&'static str),
    #[error("unrecognized image format for {0}")]
    UnsupportedImage(String),
    #[error("cannot resolve url: {0}")]
    InvalidUrl(String),
    #[error("request for {url} failed with status {status}")]
    Status { url: String, status: StatusCode },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("FlareSolverr: {0}")]
    Solver(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Epub(#[from] epub_builder::Error),
}

impl Error {
    /// Failures the transport recovers from by retrying the request.
    /// Anything else is fatal and propagates unchanged.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Error::Http(inner) => {
                inner.is_timeout()
                    || inner.is_connect()
                    || inner.status().map_or(false, |status| status.is_server_error())
            }
            _ => false,
        }
    }
}

#[test]
fn test_server_errors_are_transient() {
    let error = Error::Status {
        url: "https://www.fanfiction.net/s/1/".to_string(),
        status: StatusCode::SERVICE_UNAVAILABLE,
    };
    assert!(error.is_transient());
    let error = Error::Status {
        url: "https://www.fanfiction.net/s/1/".to_string(),
        status: StatusCode::TOO_MANY_REQUESTS,
    };
    assert!(error.is_transient());
}

#[test]
fn test_everything_else_is_fatal() {
    assert!(!Error::StoryNotFound(12345).is_transient());
    let error = Error::Status {
        url: "https://www.fanfiction.net/s/1/".to_string(),
        status: StatusCode::FORBIDDEN,
    };
    assert!(!error.is_transient());
}
