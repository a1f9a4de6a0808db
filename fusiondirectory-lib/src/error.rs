/// The category of a failed connector operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The connector settings cannot be used as given.
    Configuration,
    /// FusionDirectory could not be reached at all.
    Communication,
    /// FusionDirectory refused our credentials or session, even after logging in again.
    Unauthorized,
    /// The requested object (or tab) does not exist.
    NotFound,
    /// FusionDirectory answered with any other non-successful status.
    Rejected,
    /// The response body could not be understood.
    InvalidPayload,
    /// An attribute of a change-set is not mapped to any tab.
    UnknownAttribute,
    /// A value cannot be used for the attribute it was given for.
    UnsupportedValue,
}

#[derive(Debug, thiserror::Error)]
#[error("{1}")]
pub struct ServiceError(pub ErrorKind, pub String);

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        self.0
    }

    /// Build the error for a non-successful HTTP answer, picking the kind from the status code.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let kind = match status {
            reqwest::StatusCode::UNAUTHORIZED => ErrorKind::Unauthorized,
            reqwest::StatusCode::NOT_FOUND => ErrorKind::NotFound,
            _ => ErrorKind::Rejected,
        };
        ServiceError(kind, format!("status: {}, message: {}", status.as_u16(), body))
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError(ErrorKind::InvalidPayload, format!("Could not decode FusionDirectory answer: {e}"))
    }
}
