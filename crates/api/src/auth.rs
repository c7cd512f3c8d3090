//! Caller identity extraction.
//!
//! Token verification happens upstream; the gateway forwards the resolved
//! principal as `x-user-id` (UUID) and `x-user-role` (`customer`, `seller` or
//! `admin`, default `customer`).

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{Caller, Role, UserId};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Caller);

impl Identity {
    /// Rejects callers that are not admins.
    pub fn require_admin(self) -> Result<Caller, ApiError> {
        if self.0.is_admin() {
            Ok(self.0)
        } else {
            Err(ApiError::Forbidden)
        }
    }

    /// Rejects callers that are neither admins nor sellers.
    pub fn require_operator(self) -> Result<Caller, ApiError> {
        if self.0.is_operator() {
            Ok(self.0)
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id: UserId = header(parts, USER_ID_HEADER)?
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?
            .trim()
            .parse()
            .map_err(|_| ApiError::Unauthorized("Invalid user id".to_string()))?;

        let role = match header(parts, USER_ROLE_HEADER)? {
            Some(raw) => Role::parse(raw)
                .ok_or_else(|| ApiError::Unauthorized(format!("Unknown role: {raw}")))?,
            None => Role::Customer,
        };

        Ok(Identity(Caller::new(user_id, role)))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, ApiError> {
    parts
        .headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| ApiError::Unauthorized(format!("Malformed {name} header")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(headers: &[(&str, &str)]) -> Result<Identity, ApiError> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Identity::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn defaults_to_customer() {
        let user = UserId::new();
        let Identity(caller) = extract(&[(USER_ID_HEADER, &user.to_string())])
            .await
            .unwrap();
        assert_eq!(caller, Caller::customer(user));
    }

    #[tokio::test]
    async fn reads_role_header() {
        let user = UserId::new();
        let Identity(caller) = extract(&[(USER_ID_HEADER, &user.to_string()), (USER_ROLE_HEADER, "Admin")])
            .await
            .unwrap();
        assert!(caller.is_admin());
    }

    #[tokio::test]
    async fn rejects_missing_or_bad_identity() {
        assert!(matches!(extract(&[]).await, Err(ApiError::Unauthorized(_))));
        assert!(matches!(
            extract(&[(USER_ID_HEADER, "not-a-uuid")]).await,
            Err(ApiError::Unauthorized(_))
        ));
        assert!(matches!(
            extract(&[(USER_ID_HEADER, &UserId::new().to_string()), (USER_ROLE_HEADER, "root")]).await,
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn operator_checks() {
        let seller = Identity(Caller::seller(UserId::new()));
        assert!(seller.require_operator().is_ok());
        assert!(matches!(seller.require_admin(), Err(ApiError::Forbidden)));
    }
}
