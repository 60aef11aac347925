//! Cacheability policy engine.
//!
//! One pure decision per request: cache, or bypass with a reason. The rules
//! fence off every situation where a stored, user-independent snapshot would
//! be wrong (personalized, transactional, or non-idempotent content) or
//! would break a live interaction such as logging in. Rules are ordered;
//! the first match wins.

use std::collections::HashSet;

use axum::http::Method;
use once_cell::sync::Lazy;

use super::config::CacheConfig;
use super::context::RequestContext;

/// Path prefix of machine-readable API endpoints.
const API_PREFIX: &str = "/api";
/// Static assets may legitimately carry `login` in their file names.
const ASSET_PREFIX: &str = "/assets";
/// Query parameter that opts a request out of caching.
const BYPASS_PARAM: &str = "nocache";

/// `action` parameter values that mark an authentication flow.
static AUTH_ACTIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "login",
        "logout",
        "register",
        "lostpassword",
        "resetpass",
        "rp",
        "postpass",
    ]
    .into_iter()
    .collect()
});

/// Outcome of the cacheability decision for one request.
///
/// The middleware computes this once and stores it in the request's
/// extensions, so every later observer sees the same memoized result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Bypass(BypassReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassReason {
    /// Caching is globally disabled in configuration.
    Disabled,
    /// Authenticated requester, special view, or automation context.
    PrivilegedContext,
    /// Login/logout/registration/password-reset endpoint.
    AuthEndpoint,
    /// Anything other than GET.
    UnsafeMethod,
    /// Machine-readable API endpoint.
    ApiEndpoint,
    /// Explicit `nocache` opt-out.
    OptOut,
    /// Cart/checkout/account or similar transactional view.
    Transactional,
    /// The resolved content id is on the exclusion list.
    ExcludedContent,
}

impl BypassReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::PrivilegedContext => "privileged_context",
            Self::AuthEndpoint => "auth_endpoint",
            Self::UnsafeMethod => "unsafe_method",
            Self::ApiEndpoint => "api_endpoint",
            Self::OptOut => "opt_out",
            Self::Transactional => "transactional",
            Self::ExcludedContent => "excluded_content",
        }
    }
}

/// Decide whether this request's response may be cached.
pub fn decide(ctx: &RequestContext, config: &CacheConfig) -> Decision {
    if config.disabled {
        return Decision::Bypass(BypassReason::Disabled);
    }

    let page = &ctx.page;
    if page.authenticated
        || page.admin
        || page.search
        || page.not_found
        || page.preview
        || page.automation
    {
        return Decision::Bypass(BypassReason::PrivilegedContext);
    }

    if is_auth_endpoint(&ctx.path, &ctx.query) {
        return Decision::Bypass(BypassReason::AuthEndpoint);
    }

    if ctx.method != Method::GET {
        return Decision::Bypass(BypassReason::UnsafeMethod);
    }

    if is_api_path(&ctx.path) {
        return Decision::Bypass(BypassReason::ApiEndpoint);
    }

    if has_query_param(&ctx.query, BYPASS_PARAM) {
        return Decision::Bypass(BypassReason::OptOut);
    }

    if page.transactional {
        return Decision::Bypass(BypassReason::Transactional);
    }

    if let Some(content_id) = page.content_id {
        if config.is_excluded(content_id) {
            return Decision::Bypass(BypassReason::ExcludedContent);
        }
    }

    Decision::Allow
}

fn is_auth_endpoint(path: &str, query: &str) -> bool {
    if path.contains("login") && !path.starts_with(ASSET_PREFIX) {
        return true;
    }
    url::form_urlencoded::parse(query.as_bytes())
        .any(|(name, value)| name == "action" && AUTH_ACTIONS.contains(value.as_ref()))
}

fn is_api_path(path: &str) -> bool {
    path == API_PREFIX || path.starts_with("/api/")
}

fn has_query_param(query: &str, param: &str) -> bool {
    url::form_urlencoded::parse(query.as_bytes()).any(|(name, _)| name == param)
}
