use crate::transport::TransportError;

/// The response arrived with the expected status but its payload is unusable.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("response body does not match the expected shape: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("`{0}` is empty")]
    EmptyField(&'static str),
}

/// Why a call to the booking API did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("could not encode the request body: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("unexpected status {status}, expected {expected}")]
    UnexpectedStatus {
        status: u16,
        expected: u16,
        body: String,
    },
    #[error("status {status} but {source}")]
    Extraction {
        status: u16,
        body: String,
        #[source]
        source: ExtractionError,
    },
}

impl ApiError {
    /// The HTTP status, absent when no response arrived.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Encode(_) | ApiError::Transport(_) => None,
            ApiError::UnexpectedStatus { status, .. } | ApiError::Extraction { status, .. } => {
                Some(*status)
            }
        }
    }

    /// The response body, absent when no response arrived.
    pub fn body(&self) -> Option<&str> {
        match self {
            ApiError::Encode(_) | ApiError::Transport(_) => None,
            ApiError::UnexpectedStatus { body, .. } | ApiError::Extraction { body, .. } => {
                Some(body)
            }
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Transport(_))
    }
}

/// Error building a [crate::api::BookingApiClient].
#[derive(Debug, thiserror::Error)]
pub enum InvalidBaseUrl {
    #[error("invalid base URL `{url}`: {source}")]
    Parse {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("base URL `{0}` must be an http or https URL")]
    Scheme(String),
}
