//! Authentication middleware: every protected route passes the gate first

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::{
    auth::{AuthUser, Credentials, authenticate},
    error::ApiError,
    state::AppState,
};

/// Resolve the request credentials and stash the caller in the extensions
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let credentials = Credentials::from_headers(req.headers()).ok_or_else(|| {
        warn!("Request to {} without credentials", req.uri().path());
        ApiError::Unauthenticated
    })?;

    let user = authenticate(
        state.store.as_ref(),
        &credentials,
        state.verification_enabled(),
    )
    .await?;

    req.extensions_mut().insert(AuthUser { user });

    Ok(next.run(req).await)
}
