use std::fmt;

/// Failures of a call against the downstream read-it-later API.
///
/// None of these are retried by this crate.
#[derive(Debug)]
pub enum DownstreamError {
    /// The call needs a token and the credentials never held one.
    NotAuthenticated,
    /// An enumerated query option holds a value outside its set.
    InvalidOption { field: &'static str },
    /// The downstream answered with anything other than 200 OK.
    Api { status: u16, body: String },
    /// DNS, connection, TLS or timeout failure.
    Transport(reqwest::Error),
    /// A request payload or query string could not be encoded.
    Encode(String),
    /// A 200 response whose body does not have the expected shape.
    Decode(serde_json::Error),
}

impl DownstreamError {
    /// Status code of an [`DownstreamError::Api`] failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            DownstreamError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for DownstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownstreamError::NotAuthenticated => write!(
                f,
                "not authenticated (a new authentication with password is needed)"
            ),
            DownstreamError::InvalidOption { field } => write!(f, "invalid option: {}", field),
            DownstreamError::Api { status, body } => {
                write!(f, "downstream API error: {}: {}", status, body)
            }
            DownstreamError::Transport(e) => write!(f, "downstream request failed: {}", e),
            DownstreamError::Encode(msg) => write!(f, "failed to encode request: {}", msg),
            DownstreamError::Decode(e) => write!(f, "unexpected downstream payload: {}", e),
        }
    }
}

impl std::error::Error for DownstreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DownstreamError::Transport(e) => Some(e),
            DownstreamError::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for DownstreamError {
    fn from(e: reqwest::Error) -> Self {
        DownstreamError::Transport(e)
    }
}

impl From<serde_json::Error> for DownstreamError {
    fn from(e: serde_json::Error) -> Self {
        DownstreamError::Decode(e)
    }
}
