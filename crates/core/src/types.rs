//! Shared value types for the Atelier client domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (API versions are ordered, query values
//! follow the server's truthiness rules) and participate in request
//! construction.

use serde::{Deserialize, Serialize};

use crate::identifiers::Namespace;

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Atelier API version number (`v1`, `v2`, ...).
///
/// Version `0` is not a real API version; an operation declaring it needs no
/// version prefix on its path (the server-info and handshake endpoints).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiVersion(u32);

impl ApiVersion {
    /// Version assumed until the server reports its own.
    pub const DEFAULT: ApiVersion = ApiVersion(1);

    /// Version for endpoints that are addressed without a version prefix.
    pub const UNVERSIONED: ApiVersion = ApiVersion(0);

    /// Creates an [`ApiVersion`] from a raw number.
    pub const fn new(version: u32) -> Self {
        Self(version)
    }

    /// Returns the underlying number.
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns `true` for endpoints that carry a `v{n}/` path prefix.
    pub fn is_versioned(self) -> bool {
        self.0 > 0
    }
}

impl Default for ApiVersion {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Scheme
// ---------------------------------------------------------------------------

/// Web server protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Plain HTTP.
    #[default]
    Http,
    /// HTTP over TLS.
    Https,
}

impl Scheme {
    /// Returns the URL scheme string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// A single query-string value.
///
/// Booleans always serialize (`1`/`0`). Every other value serializes only
/// when it is "truthy": empty strings, zero numbers, and empty lists are
/// dropped from the query entirely.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    /// Serialized as `1` or `0`.
    Bool(bool),
    /// Omitted when zero.
    Number(i64),
    /// Omitted when empty.
    Text(String),
    /// Joined with `,`; omitted when empty.
    List(Vec<String>),
}

impl QueryValue {
    /// Serialized form, or `None` when the value is omitted.
    fn render(&self) -> Option<String> {
        match self {
            Self::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            Self::Number(0) => None,
            Self::Number(n) => Some(n.to_string()),
            Self::Text(s) if s.is_empty() => None,
            Self::Text(s) => Some(s.clone()),
            Self::List(items) if items.is_empty() => None,
            Self::List(items) => Some(items.join(",")),
        }
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<u32> for QueryValue {
    fn from(value: u32) -> Self {
        Self::Number(i64::from(value))
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for QueryValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// Ordered query parameters. Serialization order is insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams(Vec<(String, QueryValue)>);

impl QueryParams {
    /// Creates an empty parameter list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter (builder style).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.push(key, value);
        self
    }

    /// Appends a parameter.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<QueryValue>) {
        self.0.push((key.into(), value.into()));
    }

    /// Returns `true` if no parameters were added.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serializes to `k=v&k=v` without a leading `?`. Values are not escaped;
    /// the whole URL is percent-encoded once it is assembled.
    pub fn encode(&self) -> String {
        self.0
            .iter()
            .filter_map(|(key, value)| value.render().map(|v| format!("{key}={v}")))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Serializes with a leading `?`, or returns an empty string when every
    /// parameter was omitted.
    pub fn to_query_string(&self) -> String {
        let encoded = self.encode();
        if encoded.is_empty() {
            encoded
        } else {
            format!("?{encoded}")
        }
    }
}

// ---------------------------------------------------------------------------
// Server capabilities
// ---------------------------------------------------------------------------

/// An optional server feature advertised by the server-info endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerFeature {
    /// Feature name (e.g. `"DEEPSEE"`, `"ENSEMBLE"`).
    pub name: String,
    /// Whether the feature is enabled in this instance.
    #[serde(default)]
    pub enabled: bool,
}

/// Capabilities reported by the unversioned server-info endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Product version string (e.g. `"IRIS for UNIX ... 2024.1"`).
    #[serde(default)]
    pub version: String,
    /// Instance identifier.
    #[serde(default)]
    pub id: String,
    /// Highest Atelier API version the server implements.
    #[serde(default)]
    pub api: u32,
    /// Optional features.
    #[serde(default)]
    pub features: Vec<ServerFeature>,
    /// Namespaces the authenticated user can access.
    #[serde(default)]
    pub namespaces: Vec<String>,
}

impl ServerInfo {
    /// Returns `true` for the IRIS server family (as opposed to Caché/Ensemble).
    pub fn is_iris(&self) -> bool {
        self.version.starts_with("IRIS")
    }

    /// Returns `true` if `namespace` is in the advertised list, ignoring case.
    pub fn has_namespace(&self, namespace: &Namespace) -> bool {
        self.namespaces.iter().any(|ns| namespace.matches(ns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_omits_falsy_values_but_keeps_false_booleans() {
        let params = QueryParams::new()
            .with("flag", true)
            .with("name", "")
            .with("count", 0i64)
            .with("x", "v");
        assert_eq!(params.encode(), "flag=1&x=v");

        let params = QueryParams::new().with("generated", false).with("filter", "*.cls");
        assert_eq!(params.to_query_string(), "?generated=0&filter=*.cls");
    }

    #[test]
    fn empty_query_renders_nothing() {
        let params = QueryParams::new().with("name", "").with("items", Vec::<String>::new());
        assert_eq!(params.to_query_string(), "");
        assert!(QueryParams::new().is_empty());
    }

    #[test]
    fn lists_join_with_commas() {
        let params = QueryParams::new().with("files", vec!["a.cls".to_string(), "b.mac".to_string()]);
        assert_eq!(params.encode(), "files=a.cls,b.mac");
    }

    #[test]
    fn api_versions_order_numerically() {
        assert!(ApiVersion::new(2) > ApiVersion::DEFAULT);
        assert!(!ApiVersion::UNVERSIONED.is_versioned());
        assert_eq!(ApiVersion::new(7).to_string(), "v7");
    }

    #[test]
    fn server_info_detects_family_and_namespaces() {
        let info: ServerInfo = serde_json::from_value(serde_json::json!({
            "version": "IRIS for UNIX (Ubuntu Server LTS for x86-64) 2024.1",
            "id": "abc",
            "api": 8,
            "features": [{"name": "DEEPSEE", "enabled": true}],
            "namespaces": ["%SYS", "USER"]
        }))
        .unwrap();
        assert!(info.is_iris());
        assert!(info.has_namespace(&Namespace::new("user").unwrap()));
        assert!(info.has_namespace(&Namespace::new("%sys").unwrap()));
        assert!(!info.has_namespace(&Namespace::new("SAMPLES").unwrap()));
    }
}
