//! Request description and the pure parts of request construction: path
//! versioning, URL assembly, header defaults and basic authentication.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE,
    USER_AGENT,
};
use reqwest::Method;
use serde_json::Value;

use atelier_core::{ApiVersion, ConnectionSettings, QueryParams};

/// Characters `encodeURI` leaves untouched besides ASCII alphanumerics.
const URI_UNESCAPED: &str = ";/?:@&=+$,#-_.!~*'()";

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Serialized as JSON.
    Json(Value),
    /// Sent verbatim with its own content type.
    Text {
        /// `Content-Type` header value.
        content_type: &'static str,
        /// Body text.
        text: String,
    },
}

/// One call against the Atelier API.
///
/// `path` is relative to `/api/atelier/` and excludes the version prefix,
/// which the pipeline adds from the negotiated version.
#[derive(Debug, Clone)]
pub struct AtelierRequest {
    pub(crate) min_version: ApiVersion,
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) body: Option<RequestBody>,
    pub(crate) query: QueryParams,
    pub(crate) headers: HeaderMap,
    pub(crate) no_output: bool,
}

impl AtelierRequest {
    /// Creates an unversioned request.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            min_version: ApiVersion::UNVERSIONED,
            method,
            path: path.into(),
            body: None,
            query: QueryParams::new(),
            headers: HeaderMap::new(),
            no_output: false,
        }
    }

    /// `GET path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// `POST path`.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// `PUT path`.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// `DELETE path`.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Minimum API version the server must have negotiated. Any version
    /// above zero also adds the `v{n}/` path prefix.
    #[must_use]
    pub fn min_version(mut self, version: u32) -> Self {
        self.min_version = ApiVersion::new(version);
        self
    }

    /// JSON body.
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    /// Raw text body with an explicit content type.
    #[must_use]
    pub fn text(mut self, content_type: &'static str, text: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text {
            content_type,
            text: text.into(),
        });
        self
    }

    /// Query parameters.
    #[must_use]
    pub fn query(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }

    /// Extra request header.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Suppress forwarding of server console output.
    #[must_use]
    pub fn no_output(mut self) -> Self {
        self.no_output = true;
        self
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Unversioned path.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Adds `v{api}/` in front of `path` for versioned operations.
pub fn versioned_path(min_version: ApiVersion, api_version: ApiVersion, path: &str) -> String {
    if min_version.is_versioned() {
        format!("v{}/{}", api_version.as_u32(), path)
    } else {
        path.to_string()
    }
}

/// Full, percent-encoded request URL.
pub fn build_url(settings: &ConnectionSettings, versioned_path: &str, query: &QueryParams) -> String {
    let raw = format!(
        "{}://{}:{}{}/api/atelier/{}{}",
        settings.scheme().as_str(),
        settings.host,
        settings.port,
        settings.path_prefix,
        versioned_path,
        query.to_query_string()
    );
    encode_uri(&raw)
}

/// Percent-encodes everything `encodeURI` would: reserved URI characters and
/// ASCII alphanumerics pass through, every other character is escaped as
/// UTF-8.
pub fn encode_uri(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    let mut buf = [0u8; 4];
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || URI_UNESCAPED.contains(ch) {
            encoded.push(ch);
        } else {
            encoded.push_str(&urlencoding::encode(ch.encode_utf8(&mut buf)));
        }
    }
    encoded
}

/// Default headers plus the caller's own.
///
/// `Accept` and `Cache-Control` are always set. `PUT`/`POST` get a JSON
/// content type unless the caller or a text body supplied one.
pub fn request_headers(request: &AtelierRequest, user_agent: &str) -> HeaderMap {
    let mut headers = request.headers.clone();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    if let Ok(agent) = HeaderValue::from_str(user_agent) {
        headers.entry(USER_AGENT).or_insert(agent);
    }
    if let Some(RequestBody::Text { content_type, .. }) = &request.body {
        headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(*content_type));
    }
    if request.method == Method::PUT || request.method == Method::POST {
        headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static("application/json"));
    }
    headers
}

/// `Authorization: Basic ...` for the configured credentials.
///
/// Only sent when both username and password are configured; an empty
/// password still counts (unauthenticated access with a blank password).
pub fn basic_auth(settings: &ConnectionSettings) -> Option<(HeaderName, HeaderValue)> {
    let (Some(user), Some(password)) = (&settings.username, &settings.password) else {
        return None;
    };
    let token = STANDARD.encode(format!("{user}:{password}"));
    let mut value = HeaderValue::from_str(&format!("Basic {token}")).ok()?;
    value.set_sensitive(true);
    Some((AUTHORIZATION, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::Namespace;

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            active: true,
            host: "localhost".into(),
            port: 52773,
            path_prefix: "/iris".into(),
            namespace: Namespace::new("USER"),
            username: Some("_SYSTEM".into()),
            password: Some("SYS".into()),
            ..ConnectionSettings::default()
        }
    }

    #[test]
    fn versioned_operations_get_negotiated_prefix() {
        assert_eq!(
            versioned_path(ApiVersion::new(1), ApiVersion::new(6), "USER/docnames"),
            "v6/USER/docnames"
        );
        assert_eq!(versioned_path(ApiVersion::UNVERSIONED, ApiVersion::new(6), ""), "");
    }

    #[test]
    fn url_is_assembled_and_encoded_as_a_whole() {
        let query = QueryParams::new().with("filter", "a b").with("generated", false);
        let url = build_url(&settings(), "v1/USER/doc/%Library.Base.cls", &query);
        assert_eq!(
            url,
            "http://localhost:52773/iris/api/atelier/v1/USER/doc/%25Library.Base.cls?filter=a%20b&generated=0"
        );
    }

    #[test]
    fn encode_uri_keeps_reserved_characters() {
        assert_eq!(encode_uri("a/b?c=d&e#f"), "a/b?c=d&e#f");
        assert_eq!(encode_uri("é"), "%C3%A9");
    }

    #[test]
    fn put_and_post_default_to_json_content_type() {
        let headers = request_headers(&AtelierRequest::post("x"), "ua");
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers[ACCEPT], "application/json");
        assert_eq!(headers[CACHE_CONTROL], "no-cache");

        let headers = request_headers(&AtelierRequest::get("x"), "ua");
        assert!(headers.get(CONTENT_TYPE).is_none());

        let xml = AtelierRequest::post("x").text("application/xml", "<x/>");
        assert_eq!(request_headers(&xml, "ua")[CONTENT_TYPE], "application/xml");
    }

    #[test]
    fn basic_auth_needs_both_credentials() {
        let (_, value) = basic_auth(&settings()).unwrap();
        assert_eq!(value, "Basic X1NZU1RFTTpTWVM=");

        let mut anonymous = settings();
        anonymous.password = None;
        assert!(basic_auth(&anonymous).is_none());
    }
}
