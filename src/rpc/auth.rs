//! Auth interceptor (spec.md §4.7).
//!
//! Every unary call must carry `Authorization: Bearer <token>`. Missing
//! header, wrong prefix, empty token, or unknown token all become
//! `unauthenticated` before any catalogue access — enforced as an axum
//! middleware layered in front of every RPC route.

use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::RegistryError;
use crate::rpc::AppState;

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub token: String,
}

fn extract_bearer_token<B>(request: &Request<B>) -> Result<&str, RegistryError> {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(RegistryError::Unauthenticated)?;
    let value = header.to_str().map_err(|_| RegistryError::Unauthenticated)?;
    let token = value.strip_prefix(BEARER_PREFIX).ok_or(RegistryError::Unauthenticated)?;
    if token.is_empty() {
        return Err(RegistryError::Unauthenticated);
    }
    Ok(token)
}

pub async fn require_bearer_token(
    State(state): State<AppState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, RegistryError> {
    let token = extract_bearer_token(&request)?;
    let principal = state.tokens.get(token).map(|p| p.clone()).ok_or(RegistryError::Unauthenticated)?;
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn missing_header_is_rejected() {
        let request = Request::builder().body(Body::empty()).unwrap();
        assert!(extract_bearer_token(&request).is_err());
    }

    #[test]
    fn wrong_prefix_is_rejected() {
        let request = Request::builder()
            .header(axum::http::header::AUTHORIZATION, "Basic deadbeef")
            .body(Body::empty())
            .unwrap();
        assert!(extract_bearer_token(&request).is_err());
    }

    #[test]
    fn empty_token_is_rejected() {
        let request = Request::builder()
            .header(axum::http::header::AUTHORIZATION, "Bearer ")
            .body(Body::empty())
            .unwrap();
        assert!(extract_bearer_token(&request).is_err());
    }

    #[test]
    fn valid_bearer_is_extracted() {
        let request = Request::builder()
            .header(axum::http::header::AUTHORIZATION, "Bearer abc123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_bearer_token(&request).unwrap(), "abc123");
    }
}
