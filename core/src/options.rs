//! Options applied to a request when it is intercepted.
//!
//! # Design
//! Plain data, deserializable from JSON so suites can keep request fixtures
//! next to their test vectors. Application order is fixed: headers are copied
//! verbatim, then a Basic Authorization header is derived from `auth` unless
//! one is already present, then `path` overwrites the request target.

use std::collections::BTreeMap;

use base64::Engine;
use serde::Deserialize;

use crate::error::InterceptError;
use crate::request::ClientRequest;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RequestOptions {
    /// Header fields copied onto the request as given.
    pub headers: BTreeMap<String, String>,
    /// `user:password` credential for a derived Basic Authorization header.
    pub auth: Option<String>,
    /// Replacement request target.
    pub path: Option<String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(raw: &str) -> Result<Self, InterceptError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_auth(mut self, credential: impl Into<String>) -> Self {
        self.auth = Some(credential.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Apply to `req`. On error the request is left untouched.
    pub(crate) fn apply(&self, req: &ClientRequest) -> Result<(), InterceptError> {
        let mut headers = req.headers().clone();
        for (name, value) in &self.headers {
            headers.set(name, value)?;
        }
        if let Some(credential) = &self.auth {
            if !headers.contains("authorization") {
                headers.set("authorization", &basic_auth(credential))?;
            }
        }
        req.replace_headers(headers);
        if let Some(path) = &self.path {
            req.set_path(path.as_str());
        }
        Ok(())
    }
}

/// `Basic` Authorization value for a `user:password` credential.
pub fn basic_auth(credential: &str) -> String {
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(credential)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn request() -> ClientRequest {
        ClientRequest::new(Method::GET, "/original")
    }

    #[test]
    fn basic_auth_encodes_credential() {
        assert_eq!(basic_auth("foo:bar"), "Basic Zm9vOmJhcg==");
    }

    #[test]
    fn headers_are_copied_verbatim() {
        let req = request();
        RequestOptions::new()
            .with_header("X-Custom", "Value With Case")
            .apply(&req)
            .unwrap();
        assert_eq!(req.header("x-custom").as_deref(), Some("Value With Case"));
    }

    #[test]
    fn auth_derives_authorization_header() {
        let req = request();
        RequestOptions::new().with_auth("foo:bar").apply(&req).unwrap();
        assert_eq!(req.header("Authorization").as_deref(), Some("Basic Zm9vOmJhcg=="));
    }

    #[test]
    fn explicit_authorization_wins_over_auth() {
        let req = request();
        RequestOptions::new()
            .with_header("Authorization", "Bearer explicit")
            .with_auth("foo:bar")
            .apply(&req)
            .unwrap();
        assert_eq!(req.header("authorization").as_deref(), Some("Bearer explicit"));
    }

    #[test]
    fn path_overwrites_request_target() {
        let req = request();
        RequestOptions::new().with_path("/replaced?q=1").apply(&req).unwrap();
        assert_eq!(req.path(), "/replaced?q=1");

        let req = request();
        RequestOptions::new().apply(&req).unwrap();
        assert_eq!(req.path(), "/original");
    }

    #[test]
    fn options_load_from_json() {
        let options = RequestOptions::from_json(
            r#"{"headers":{"expect":"100-continue"},"auth":"u:p","path":"/json"}"#,
        )
        .unwrap();
        assert_eq!(options.headers.get("expect").map(String::as_str), Some("100-continue"));
        assert_eq!(options.auth.as_deref(), Some("u:p"));
        assert_eq!(options.path.as_deref(), Some("/json"));

        assert_eq!(RequestOptions::from_json("{}").unwrap(), RequestOptions::default());
    }

    #[test]
    fn malformed_json_is_an_options_error() {
        let err = RequestOptions::from_json(r#"{"hedaers":{}}"#).unwrap_err();
        assert!(matches!(err, InterceptError::Options(_)));
    }

    #[test]
    fn invalid_header_aborts_application() {
        let req = request();
        let err = RequestOptions::new()
            .with_header("bad header", "v")
            .apply(&req)
            .unwrap_err();
        assert!(matches!(err, InterceptError::InvalidHeaderName(_)));
    }

    #[test]
    fn rejected_options_leave_no_partial_headers() {
        let req = request();
        // "Authorization" sorts before "bad header", so it is staged first.
        let err = RequestOptions::new()
            .with_header("Authorization", "stale")
            .with_header("bad header", "x")
            .with_path("/never")
            .apply(&req)
            .unwrap_err();
        assert!(matches!(err, InterceptError::InvalidHeaderName(_)));
        assert!(req.headers().is_empty());
        assert_eq!(req.path(), "/original");

        RequestOptions::new().with_auth("foo:bar").apply(&req).unwrap();
        assert_eq!(req.header("authorization").as_deref(), Some("Basic Zm9vOmJhcg=="));
    }
}
