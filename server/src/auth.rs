//! Axum extractor for an authenticated [`User`] (§4.1). Accepts either an
//! opaque session handle (`Authorization: Session <handle>`, the preferred
//! path once a client has logged in) or a raw bearer JWT
//! (`Authorization: Bearer <jwt>`, for first contact / service-to-service
//! callers) and resolves it to a principal the rest of the API can gate on.

use crate::{error::ApiError, AppState};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use mesh_core::{identity, model::User, CoreError};

pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(CoreError::Unauthenticated)?;

        let conn = state.store.conn().map_err(CoreError::from)?;
        let user = if let Some(handle) = header.strip_prefix("Session ") {
            identity::authenticate(&conn, state.identity_provider.as_ref(), identity::Credential::SessionHandle(handle), |h| {
                identity::find_session(&conn, h)
            })?
        } else if let Some(jwt) = header.strip_prefix("Bearer ") {
            identity::authenticate(&conn, state.identity_provider.as_ref(), identity::Credential::BearerJwt(jwt), |h| {
                identity::find_session(&conn, h)
            })?
        } else {
            return Err(CoreError::Unauthenticated.into());
        };

        Ok(AuthUser(user))
    }
}
