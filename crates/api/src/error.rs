//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use domain::{DomainError, ErrorKind};
use projections::ProjectionError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
///
/// Every response body is `{"error": <message>, "code": <machine code>}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed caller identity.
    #[error("{0}")]
    Unauthorized(String),

    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),

    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Caller lacks the role for this route.
    #[error("Not authorized to access this resource")]
    Forbidden,

    /// Workflow error from the checkout layer.
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    /// Domain logic error.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Read model catch-up failed.
    #[error(transparent)]
    Projection(#[from] ProjectionError),

    /// Internal server error.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            ApiError::Checkout(err) => (status_for(err.kind()), err.code()),
            ApiError::Domain(err) => (status_for(err.kind()), err.code()),
            ApiError::Projection(_) | ApiError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        }
    }
}

/// HTTP status for a domain failure class.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::EmptyCart
        | ErrorKind::CouponIneligible
        | ErrorKind::OutOfStock
        | ErrorKind::InsufficientStock
        | ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::InvalidState | ErrorKind::OverDeduction | ErrorKind::Conflict => {
            StatusCode::CONFLICT
        }
        ErrorKind::Gateway => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        metrics::counter!("http_errors_total", "code" => code).increment(1);
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal server error");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = serde_json::json!({ "error": message, "code": code });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{OrderError, StockError};

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(status_for(ErrorKind::EmptyCart), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::OverDeduction), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::Gateway), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(ErrorKind::Forbidden), StatusCode::FORBIDDEN);
    }

    #[test]
    fn domain_errors_keep_their_codes() {
        let err = ApiError::from(DomainError::from(StockError::InsufficientStock {
            requested: 4,
            available: 1,
        }));
        assert_eq!(err.parts(), (StatusCode::BAD_REQUEST, "insufficient_stock"));

        let err = ApiError::from(CheckoutError::Domain(DomainError::from(OrderError::NotFound)));
        assert_eq!(err.parts().0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn internal_detail_is_not_leaked() {
        let response = ApiError::Internal("pool exhausted".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "internal server error");
        assert_eq!(body["code"], "internal");
    }
}
