use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use log::error;

/// Error kinds surfaced by the inventory store and the request handlers.
///
/// `Validation` maps to 400 with the message as the response body,
/// `NotFound` to 404, `Storage` to 500. Best-effort cleanup failures
/// (old photo removal) are logged at the call site and never reach here.
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("{0}")]
    Validation(String),
    #[error("Not found")]
    NotFound,
    #[error("Error saving file")]
    Storage(#[source] anyhow::Error),
}

impl InventoryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<anyhow::Error> for InventoryError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(err)
    }
}

impl ResponseError for InventoryError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let Self::Storage(cause) = self {
            error!("photo storage error: {cause:?}");
        }
        HttpResponse::build(self.status_code()).body(self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_error_kinds() {
        assert_eq!(
            InventoryError::validation("Inventory name is required").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(InventoryError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            InventoryError::Storage(anyhow::anyhow!("disk full")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn not_found_body_is_plain_text() {
        assert_eq!(InventoryError::NotFound.to_string(), "Not found");
    }
}
