use thiserror::Error;

use crate::source::ErrorMarker;

/// Errors surfaced by view query building and result streaming.
#[derive(Debug, Error)]
pub enum ViewError {
    /// An option value was rejected while building the query.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The request was already iterated to completion.
    #[error("Query has already been executed; results can only be iterated once")]
    AlreadyQueried,

    /// The design document does not exist in the requested namespace.
    #[error("Design document not found: {0}")]
    DesignDocumentNotFound(String),

    /// The design document exists but has no view with this name.
    #[error("View not found: {0}")]
    ViewNotFound(String),

    /// The server rejected the request parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request canceled: {0}")]
    RequestCanceled(String),

    #[error("Service not available: {0}")]
    ServiceNotAvailable(String),

    #[error("Internal server failure: {0}")]
    InternalServerFailure(String),

    #[error("Authentication failure: {0}")]
    AuthenticationFailure(String),

    #[error("Temporary failure: {0}")]
    TemporaryFailure(String),

    #[error("Parsing failure: {0}")]
    ParsingFailure(String),

    #[error("Ambiguous timeout: {0}")]
    AmbiguousTimeout(String),

    #[error("Unambiguous timeout: {0}")]
    UnambiguousTimeout(String),

    /// An in-stream error marker with a code this client does not map.
    #[error("Server error {code}: {message}")]
    Server { code: u32, message: String },

    /// An unexpected fault from the raw row source or while decoding.
    #[error("Internal SDK error: {0}")]
    InternalSdk(String),
}

/// Numeric codes carried by in-stream error markers.
pub mod codes {
    pub const REQUEST_CANCELED: u32 = 2;
    pub const INVALID_ARGUMENT: u32 = 3;
    pub const SERVICE_NOT_AVAILABLE: u32 = 4;
    pub const INTERNAL_SERVER_FAILURE: u32 = 5;
    pub const AUTHENTICATION_FAILURE: u32 = 6;
    pub const TEMPORARY_FAILURE: u32 = 7;
    pub const PARSING_FAILURE: u32 = 8;
    pub const AMBIGUOUS_TIMEOUT: u32 = 13;
    pub const UNAMBIGUOUS_TIMEOUT: u32 = 14;
    pub const VIEW_NOT_FOUND: u32 = 501;
    pub const DESIGN_DOCUMENT_NOT_FOUND: u32 = 502;
}

impl ViewError {
    /// Maps a server-encoded error marker to its domain error.
    ///
    /// Marker context, when present, is appended to the message.
    pub fn from_marker(marker: &ErrorMarker) -> Self {
        let message = match &marker.context {
            Some(context) => format!("{} (context: {context})", marker.message),
            None => marker.message.clone(),
        };
        match marker.code {
            codes::REQUEST_CANCELED => ViewError::RequestCanceled(message),
            codes::INVALID_ARGUMENT => ViewError::InvalidRequest(message),
            codes::SERVICE_NOT_AVAILABLE => ViewError::ServiceNotAvailable(message),
            codes::INTERNAL_SERVER_FAILURE => ViewError::InternalServerFailure(message),
            codes::AUTHENTICATION_FAILURE => ViewError::AuthenticationFailure(message),
            codes::TEMPORARY_FAILURE => ViewError::TemporaryFailure(message),
            codes::PARSING_FAILURE => ViewError::ParsingFailure(message),
            codes::AMBIGUOUS_TIMEOUT => ViewError::AmbiguousTimeout(message),
            codes::UNAMBIGUOUS_TIMEOUT => ViewError::UnambiguousTimeout(message),
            codes::VIEW_NOT_FOUND => ViewError::ViewNotFound(message),
            codes::DESIGN_DOCUMENT_NOT_FOUND => ViewError::DesignDocumentNotFound(message),
            code => ViewError::Server { code, message },
        }
    }

    /// Returns true for errors that originate from an in-stream marker.
    pub fn is_in_stream(&self) -> bool {
        matches!(
            self,
            ViewError::DesignDocumentNotFound(_)
                | ViewError::ViewNotFound(_)
                | ViewError::InvalidRequest(_)
                | ViewError::RequestCanceled(_)
                | ViewError::ServiceNotAvailable(_)
                | ViewError::InternalServerFailure(_)
                | ViewError::AuthenticationFailure(_)
                | ViewError::TemporaryFailure(_)
                | ViewError::ParsingFailure(_)
                | ViewError::AmbiguousTimeout(_)
                | ViewError::UnambiguousTimeout(_)
                | ViewError::Server { .. }
        )
    }

    /// Returns true if the error was raised while building the query.
    pub fn is_build_error(&self) -> bool {
        matches!(self, ViewError::InvalidArgument(_))
    }

    pub(crate) fn internal(message: impl std::fmt::Display) -> Self {
        ViewError::InternalSdk(message.to_string())
    }
}

/// Result type for view operations.
pub type Result<T> = std::result::Result<T, ViewError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(code: u32) -> ErrorMarker {
        ErrorMarker::new(code, "boom")
    }

    #[test]
    fn maps_known_codes() {
        assert!(matches!(
            ViewError::from_marker(&marker(codes::DESIGN_DOCUMENT_NOT_FOUND)),
            ViewError::DesignDocumentNotFound(_)
        ));
        assert!(matches!(
            ViewError::from_marker(&marker(codes::VIEW_NOT_FOUND)),
            ViewError::ViewNotFound(_)
        ));
        assert!(matches!(
            ViewError::from_marker(&marker(codes::UNAMBIGUOUS_TIMEOUT)),
            ViewError::UnambiguousTimeout(_)
        ));
    }

    #[test]
    fn unknown_code_keeps_code_and_message() {
        match ViewError::from_marker(&marker(9999)) {
            ViewError::Server { code, message } => {
                assert_eq!(code, 9999);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn marker_context_is_carried_into_message() {
        let marker = ErrorMarker::new(codes::DESIGN_DOCUMENT_NOT_FOUND, "not found")
            .with_context(serde_json::json!({"design_document": "dev_beers"}));
        let err = ViewError::from_marker(&marker);

        assert_eq!(
            err.to_string(),
            r#"Design document not found: not found (context: {"design_document":"dev_beers"})"#
        );
    }

    #[test]
    fn classifies_error_kinds() {
        let build = ViewError::InvalidArgument("limit must be non-negative".to_string());
        assert!(build.is_build_error());
        assert!(!build.is_in_stream());

        let server_invalid = ViewError::from_marker(&marker(codes::INVALID_ARGUMENT));
        assert!(matches!(server_invalid, ViewError::InvalidRequest(_)));
        assert!(!server_invalid.is_build_error());
        assert!(server_invalid.is_in_stream());

        assert!(!ViewError::AlreadyQueried.is_in_stream());
        assert!(!ViewError::internal("socket closed").is_in_stream());
        let not_found = ViewError::from_marker(&marker(codes::DESIGN_DOCUMENT_NOT_FOUND));
        assert!(not_found.is_in_stream());
    }
}
