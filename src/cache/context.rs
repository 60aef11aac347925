//! Request-side cache dimensions and the host-supplied page context.

use axum::{
    body::Body,
    http::{Method, Request, header},
};
use uuid::Uuid;

/// User-Agent fragments that classify a client as mobile.
const MOBILE_UA_TOKENS: [&str; 7] = [
    "Mobile",
    "Android",
    "Silk/",
    "Kindle",
    "BlackBerry",
    "Opera Mini",
    "Opera Mobi",
];

/// Device classification used as an optional cache dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    Mobile,
    Desktop,
}

impl DeviceClass {
    pub(crate) fn tag(self) -> &'static str {
        match self {
            Self::Mobile => "mobile",
            Self::Desktop => "desktop",
        }
    }

    /// Classify a client from its User-Agent header value.
    pub fn from_user_agent(user_agent: &str) -> Self {
        if MOBILE_UA_TOKENS
            .iter()
            .any(|token| user_agent.contains(token))
        {
            Self::Mobile
        } else {
            Self::Desktop
        }
    }
}

/// Authentication classification; always part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthClass {
    LoggedIn,
    Guest,
}

impl AuthClass {
    pub(crate) fn tag(self) -> &'static str {
        match self {
            Self::LoggedIn => "logged_in",
            Self::Guest => "guest",
        }
    }
}

/// Request classification only the host site can provide.
///
/// Insert one of these into the request's extensions from a layer that runs
/// before the cache layer. A request without one is treated as an anonymous
/// front-end page view.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    /// The requester has an authenticated session.
    pub authenticated: bool,
    /// Administrative view.
    pub admin: bool,
    /// Search results view.
    pub search: bool,
    /// The request resolved to no content.
    pub not_found: bool,
    /// Draft/preview rendering.
    pub preview: bool,
    /// Background job, CLI, or machine API execution context.
    pub automation: bool,
    /// Cart, checkout, account, or other transactional commerce view.
    pub transactional: bool,
    /// Content item the view resolved to, when there is exactly one.
    pub content_id: Option<Uuid>,
}

/// Everything the policy engine and key deriver need from one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub query: String,
    pub device: DeviceClass,
    pub page: PageContext,
}

impl RequestContext {
    pub fn from_request(request: &Request<Body>) -> Self {
        let page = request
            .extensions()
            .get::<PageContext>()
            .cloned()
            .unwrap_or_default();
        let user_agent = request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        Self {
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            query: request.uri().query().unwrap_or_default().to_string(),
            device: DeviceClass::from_user_agent(user_agent),
            page,
        }
    }

    pub fn auth_class(&self) -> AuthClass {
        if self.page.authenticated {
            AuthClass::LoggedIn
        } else {
            AuthClass::Guest
        }
    }
}
