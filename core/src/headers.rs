//! Case-insensitive header store for intercepted requests.
//!
//! # Design
//! Backed by `http::HeaderMap`, which lowercases names on insert, so lookups
//! ignore case without extra normalisation here. Values are validated on the
//! way in and handed back as owned `String`s; values that are not visible
//! ASCII are read back lossily.

use http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::InterceptError;

#[derive(Debug, Clone, Default)]
pub struct HeaderStore {
    map: HeaderMap,
}

impl HeaderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, replacing any previous values.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), InterceptError> {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| InterceptError::InvalidHeaderName(name.to_string()))?;
        let value = HeaderValue::from_str(value).map_err(|_| InterceptError::InvalidHeaderValue {
            name: name.to_string(),
        })?;
        self.map.insert(header, value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.map
            .get(name)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.map
            .remove(name)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn as_map(&self) -> &HeaderMap {
        &self.map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let mut headers = HeaderStore::new();
        headers.set("Content-Type", "application/json").unwrap();
        assert_eq!(headers.get("content-type").as_deref(), Some("application/json"));
        assert_eq!(headers.get("CONTENT-TYPE").as_deref(), Some("application/json"));
        assert!(headers.contains("Content-type"));
    }

    #[test]
    fn set_replaces_previous_value() {
        let mut headers = HeaderStore::new();
        headers.set("x-trace", "1").unwrap();
        headers.set("X-Trace", "2").unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("x-trace").as_deref(), Some("2"));
    }

    #[test]
    fn remove_returns_old_value() {
        let mut headers = HeaderStore::new();
        headers.set("authorization", "Bearer t").unwrap();
        assert_eq!(headers.remove("Authorization").as_deref(), Some("Bearer t"));
        assert!(headers.is_empty());
        assert_eq!(headers.remove("authorization"), None);
    }

    #[test]
    fn invalid_name_and_value_are_rejected() {
        let mut headers = HeaderStore::new();
        assert!(matches!(
            headers.set("bad name", "v"),
            Err(InterceptError::InvalidHeaderName(name)) if name == "bad name"
        ));
        assert!(matches!(
            headers.set("x-ok", "line\nbreak"),
            Err(InterceptError::InvalidHeaderValue { .. })
        ));
        assert!(headers.is_empty());
    }

    #[test]
    fn missing_or_invalid_lookup_is_none() {
        let headers = HeaderStore::new();
        assert_eq!(headers.get("x-missing"), None);
        assert_eq!(headers.get("not a header"), None);
    }
}
