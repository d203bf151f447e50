//! Request identity: who is calling, from which context, and whether the
//! anti-forgery token checks out.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

use crate::domain::value_objects::ActorId;
use crate::selection::{SelectionContext, SELECTED_LOCATION_COOKIE};

use super::error::ApiError;

/// Set by the authenticating proxy in front of the service.
pub const ACTOR_HEADER: &str = "x-actor-id";
pub const NONCE_HEADER: &str = "x-wcmls-nonce";
pub const NONCE_COOKIE: &str = "wcmls_nonce";
/// Host platform credential on lifecycle hook calls.
pub const HOOK_SECRET_HEADER: &str = "x-wcmls-hook-secret";
pub const SESSION_COOKIE: &str = "wcmls_session";
/// `admin` when the request renders an admin screen.
pub const CONTEXT_HEADER: &str = "x-wcmls-context";

#[derive(Clone, Debug, Default)]
pub struct RequestIdentity {
    pub actor: Option<ActorId>,
    pub admin_screen: bool,
    pub ajax: bool,
    nonce: Option<String>,
    hook_secret: Option<String>,
    cookies: HashMap<String, String>,
}

impl RequestIdentity {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);
        Self {
            actor: text(ACTOR_HEADER).and_then(|v| v.parse::<u64>().ok()).filter(|id| *id != 0).map(ActorId::new),
            admin_screen: text(CONTEXT_HEADER).is_some_and(|v| v.eq_ignore_ascii_case("admin")),
            ajax: text("x-requested-with").is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest")),
            nonce: text(NONCE_HEADER).filter(|v| !v.is_empty()).map(str::to_string),
            hook_secret: text(HOOK_SECRET_HEADER).filter(|v| !v.is_empty()).map(str::to_string),
            cookies: parse_cookies(headers),
        }
    }

    pub fn cookie(&self, name: &str) -> Option<&str> { self.cookies.get(name).map(String::as_str) }

    /// Double-submit check: the nonce header must repeat the nonce cookie.
    pub fn verify_nonce(&self) -> Result<(), ApiError> {
        match (self.nonce.as_deref(), self.cookie(NONCE_COOKIE)) {
            (Some(sent), Some(expected)) if !expected.is_empty() && sent == expected => Ok(()),
            _ => {
                tracing::warn!(actor = ?self.actor, "Anti-forgery check failed");
                Err(ApiError::forbidden("Security check failed."))
            }
        }
    }

    /// True when the request carries the configured hook secret. Always
    /// false when no secret is configured.
    pub fn carries_hook_secret(&self, expected: Option<&str>) -> bool {
        match (self.hook_secret.as_deref(), expected) {
            (Some(sent), Some(expected)) => !expected.is_empty() && sent == expected,
            _ => false,
        }
    }

    pub fn selection_context(&self) -> SelectionContext {
        SelectionContext {
            cookie: self.cookie(SELECTED_LOCATION_COOKIE).map(str::to_string),
            actor: self.actor,
            session: self.cookie(SESSION_COOKIE).map(str::to_string),
            admin_screen: self.admin_screen,
            ajax: self.ajax,
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}
