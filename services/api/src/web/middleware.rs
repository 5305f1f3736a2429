//! services/api/src/web/middleware.rs
//!
//! Caller identity middleware.

use axum::{extract::Request, middleware::Next, response::Response};

use crate::error::ApiError;
use crate::web::state::OwnerId;

pub const OWNER_HEADER: &str = "x-owner-id";

/// Reads the opaque owner id supplied by the authentication gateway and
/// inserts it into request extensions for handlers to use.
///
/// A missing header means an anonymous caller. A header that is not valid
/// text is rejected with 400.
pub async fn extract_owner(mut req: Request, next: Next) -> Result<Response, ApiError> {
    let owner = match req.headers().get(OWNER_HEADER) {
        Some(value) => value
            .to_str()
            .map(|s| s.trim().to_string())
            .map_err(|_| ApiError::BadRequest(format!("{} header is not valid text", OWNER_HEADER)))?,
        None => String::new(),
    };

    req.extensions_mut().insert(OwnerId(owner));
    Ok(next.run(req).await)
}
