//! Bearer-token authentication.
//!
//! The middleware never rejects a request. It resolves the caller, if any,
//! and leaves the decision to the operation: uploads require a caller,
//! queries do not.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use iepscan::service::Caller;

use crate::state::AppState;

/// The resolved caller of a request, attached as a request extension.
#[derive(Debug, Clone, Default)]
pub struct CurrentCaller(pub Option<Caller>);

impl CurrentCaller {
    pub fn as_ref(&self) -> Option<&Caller> {
        self.0.as_ref()
    }
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    let caller = match bearer_token(&headers) {
        Some(token) => {
            let caller = state.authenticate(token);
            match &caller {
                Some(c) => debug!("Authenticated request for {}", c.user_id),
                None => warn!("Rejected unknown bearer token"),
            }
            caller
        }
        None => None,
    };

    request.extensions_mut().insert(CurrentCaller(caller));
    next.run(request).await
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
