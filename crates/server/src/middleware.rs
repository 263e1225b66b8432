use axum::{extract::Request, middleware::Next, response::Response};
use uuid::Uuid;

use crate::error::ApiError;

pub const OWNER_HEADER: &str = "x-owner-id";

/// Authenticated owner of the request. The id arrives in the `x-owner-id`
/// header set by the fronting session provider; the store layer scopes every
/// operation to it.
#[derive(Debug, Clone, Copy)]
pub struct OwnerContext {
    pub owner_id: Uuid,
}

pub async fn load_owner_middleware(
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let owner_id = request
        .headers()
        .get(OWNER_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing or invalid owner context".to_string()))?;

    request.extensions_mut().insert(OwnerContext { owner_id });
    Ok(next.run(request).await)
}
