//! Typed wrappers over [`AtelierClient::execute`], one per Atelier
//! operation.
//!
//! Each wrapper only fixes the method, path, minimum API version and
//! parameter encoding; all behaviour lives in the pipeline.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use atelier_core::{
    ApiVersion, AtelierError, Namespace, QueryParams, ResponseEnvelope, ServerInfo, WorkId,
};

use crate::{AtelierClient, AtelierRequest};

/// Conflict-detection header sent with document writes.
const IF_NONE_MATCH: &str = "if_none_match";

/// Timestamp layout the server expects in the conflict header.
const MTIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Document body for [`AtelierClient::put_doc`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentContent {
    /// `true` when `content` holds base64 fragments.
    pub enc: bool,
    /// Source lines, or base64 fragments when `enc` is set.
    pub content: Vec<String>,
    /// Last known server modification time, used for conflict detection.
    #[serde(skip)]
    pub mtime: Option<DateTime<Utc>>,
}

impl DocumentContent {
    /// Text document from its lines.
    pub fn text<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            enc: false,
            content: lines.into_iter().map(Into::into).collect(),
            mtime: None,
        }
    }

    /// Sets the modification time the write is based on.
    #[must_use]
    pub fn based_on(mut self, mtime: DateTime<Utc>) -> Self {
        self.mtime = Some(mtime);
        self
    }
}

/// Filter for [`AtelierClient::doc_names`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocNamesFilter {
    /// Document category (`CLS`, `RTN`, `CSP`, `OTH` or `*`).
    pub category: String,
    /// Document type within the category (`*` for any).
    pub doc_type: String,
    /// Name pattern.
    pub filter: String,
    /// Include generated documents.
    pub generated: bool,
}

impl Default for DocNamesFilter {
    fn default() -> Self {
        Self {
            category: "*".into(),
            doc_type: "*".into(),
            filter: String::new(),
            generated: false,
        }
    }
}

/// Parameters of [`AtelierClient::action_search`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParams {
    /// Text or pattern to find.
    pub query: String,
    /// Document name patterns to search in.
    pub documents: Vec<String>,
    /// Treat `query` as a regular expression.
    pub regex: bool,
    /// Match whole words only.
    pub word: bool,
    /// Case-sensitive matching.
    pub case: bool,
    /// Include system documents.
    pub sys: bool,
    /// Include generated documents.
    pub generated: bool,
    /// Upper bound on results; `0` keeps the server default.
    pub max: u32,
}

impl SearchParams {
    fn to_query(&self) -> QueryParams {
        QueryParams::new()
            .with("query", self.query.as_str())
            .with("files", self.documents.join(","))
            .with("regex", self.regex)
            .with("word", self.word)
            .with("case", self.case)
            .with("sys", self.sys)
            .with("gen", self.generated)
            .with("max", self.max)
    }
}

impl AtelierClient {
    /// Fetches server capabilities and negotiates the API version.
    ///
    /// On a versioned server the client's namespace must exist there. The
    /// reported API version and server family are then stored for later
    /// requests.
    ///
    /// # Errors
    ///
    /// [`AtelierError::NamespaceNotFound`] when the namespace is missing, plus
    /// every error of [`execute`](Self::execute).
    pub async fn server_info(&self) -> Result<ServerInfo, AtelierError> {
        let envelope = self.execute(AtelierRequest::get("")).await?;
        let content = envelope.result.content.as_json().cloned().unwrap_or_default();
        let info: ServerInfo =
            serde_json::from_value(content).map_err(|e| AtelierError::InvalidResponse {
                message: format!("malformed server info: {e}"),
            })?;

        if info.api > 0 {
            if let Some(ns) = self.settings().namespace {
                if !info.has_namespace(&ns) {
                    return Err(AtelierError::NamespaceNotFound {
                        namespace: ns.to_string(),
                        available: info.namespaces.clone(),
                    });
                }
            }
            self.env
                .settings
                .remember_api_version(&self.context, ApiVersion::new(info.api))?;
            self.env
                .settings
                .remember_server_family(&self.context, info.is_iris())?;
            info!(
                connection = %self.context,
                version = %info.version,
                api = info.api,
                "Negotiated API version"
            );
        }
        Ok(info)
    }

    /// Namespace details.
    pub async fn namespace_info(&self) -> Result<ResponseEnvelope, AtelierError> {
        let ns = self.namespace()?;
        self.execute(AtelierRequest::get(ns.as_str()).min_version(1))
            .await
    }

    /// Lists document names.
    pub async fn doc_names(&self, filter: &DocNamesFilter) -> Result<ResponseEnvelope, AtelierError> {
        let ns = self.namespace()?;
        let query = QueryParams::new()
            .with("filter", filter.filter.as_str())
            .with("generated", filter.generated);
        self.execute(
            AtelierRequest::get(format!(
                "{ns}/docnames/{}/{}",
                filter.category, filter.doc_type
            ))
            .min_version(1)
            .query(query),
        )
        .await
    }

    /// Fetches one document. `format` selects an alternative export format.
    pub async fn get_doc(
        &self,
        name: &str,
        format: Option<&str>,
    ) -> Result<ResponseEnvelope, AtelierError> {
        let ns = self.namespace()?;
        let mut query = QueryParams::new();
        if let Some(format) = format {
            query.push("format", format);
        }
        self.execute(
            AtelierRequest::get(format!("{ns}/doc/{name}"))
                .min_version(1)
                .query(query),
        )
        .await
    }

    /// Fetches several documents in one call.
    pub async fn get_docs(&self, names: &[String]) -> Result<ResponseEnvelope, AtelierError> {
        let ns = self.namespace()?;
        self.execute(
            AtelierRequest::post(format!("{ns}/docs"))
                .min_version(1)
                .json(json!(names)),
        )
        .await
    }

    /// Creates or replaces a document.
    ///
    /// Unless `ignore_conflict` is set, the write carries the document's
    /// known modification time so the server can reject a stale overwrite.
    pub async fn put_doc(
        &self,
        name: &str,
        document: &DocumentContent,
        ignore_conflict: bool,
    ) -> Result<ResponseEnvelope, AtelierError> {
        let ns = self.namespace()?;
        let mut request = AtelierRequest::put(format!("{ns}/doc/{name}"))
            .min_version(1)
            .query(QueryParams::new().with("ignoreConflict", ignore_conflict))
            .json(json!({ "enc": document.enc, "content": document.content }));

        if let Some(mtime) = document.mtime.filter(|_| !ignore_conflict) {
            let stamp = mtime.format(MTIME_FORMAT).to_string();
            if let Ok(value) = HeaderValue::from_str(&stamp) {
                request = request.header(HeaderName::from_static(IF_NONE_MATCH), value);
            }
        }
        self.execute(request).await
    }

    /// Deletes one document.
    pub async fn delete_doc(&self, name: &str) -> Result<ResponseEnvelope, AtelierError> {
        let ns = self.namespace()?;
        self.execute(AtelierRequest::delete(format!("{ns}/doc/{name}")).min_version(1))
            .await
    }

    /// Deletes several documents.
    pub async fn delete_docs(&self, names: &[String]) -> Result<ResponseEnvelope, AtelierError> {
        let ns = self.namespace()?;
        self.execute(
            AtelierRequest::delete(format!("{ns}/docs"))
                .min_version(1)
                .json(json!(names)),
        )
        .await
    }

    /// Returns class index information for `names`.
    pub async fn action_index(&self, names: &[String]) -> Result<ResponseEnvelope, AtelierError> {
        let ns = self.namespace()?;
        self.execute(
            AtelierRequest::post(format!("{ns}/action/index"))
                .min_version(1)
                .json(json!(names)),
        )
        .await
    }

    /// Runs a SQL query with positional parameters.
    pub async fn action_query(
        &self,
        query: &str,
        parameters: &[Value],
    ) -> Result<ResponseEnvelope, AtelierError> {
        let ns = self.namespace()?;
        self.execute(
            AtelierRequest::post(format!("{ns}/action/query"))
                .min_version(1)
                .json(json!({ "query": query, "parameters": parameters })),
        )
        .await
    }

    /// Compiles documents. `source` asks for the generated source back.
    pub async fn action_compile(
        &self,
        names: &[String],
        flags: Option<&str>,
        source: bool,
    ) -> Result<ResponseEnvelope, AtelierError> {
        let ns = self.namespace()?;
        let query = QueryParams::new()
            .with("flags", flags.unwrap_or_default())
            .with("source", source);
        self.execute(
            AtelierRequest::post(format!("{ns}/action/compile"))
                .min_version(1)
                .query(query)
                .json(json!(names)),
        )
        .await
    }

    /// Server-side text search.
    pub async fn action_search(&self, params: &SearchParams) -> Result<ResponseEnvelope, AtelierError> {
        let ns = self.namespace()?;
        self.execute(
            AtelierRequest::get(format!("{ns}/action/search"))
                .min_version(2)
                .query(params.to_query())
                .no_output(),
        )
        .await
    }

    /// Converts an XML export into UDL documents.
    pub async fn cvt_xml_udl(&self, xml: &str) -> Result<ResponseEnvelope, AtelierError> {
        let ns = self.namespace()?;
        self.execute(
            AtelierRequest::post(format!("{ns}/cvt/xml/doc"))
                .min_version(1)
                .text("application/xml", xml),
        )
        .await
    }

    /// Expanded definition of `macro_name` as seen from `doc`.
    pub async fn macro_definition(
        &self,
        doc: &str,
        macro_name: &str,
        includes: &[String],
    ) -> Result<ResponseEnvelope, AtelierError> {
        let ns = self.namespace()?;
        self.execute(
            AtelierRequest::post(format!("{ns}/action/getmacrodefinition"))
                .min_version(2)
                .json(json!({ "docname": doc, "macroname": macro_name, "includes": includes })),
        )
        .await
    }

    /// Document and line where `macro_name` is defined.
    pub async fn macro_location(
        &self,
        doc: &str,
        macro_name: &str,
        includes: &[String],
    ) -> Result<ResponseEnvelope, AtelierError> {
        let ns = self.namespace()?;
        self.execute(
            AtelierRequest::post(format!("{ns}/action/getmacrolocation"))
                .min_version(2)
                .json(json!({ "docname": doc, "macroname": macro_name, "includes": includes })),
        )
        .await
    }

    /// Macros visible from `doc`.
    pub async fn macro_list(
        &self,
        doc: &str,
        includes: &[String],
    ) -> Result<ResponseEnvelope, AtelierError> {
        let ns = self.namespace()?;
        self.execute(
            AtelierRequest::post(format!("{ns}/action/getmacrolist"))
                .min_version(2)
                .json(json!({ "docname": doc, "includes": includes })),
        )
        .await
    }

    /// Web applications defined for the namespace.
    pub async fn csp_apps(&self, detail: bool) -> Result<ResponseEnvelope, AtelierError> {
        let ns = self.namespace()?;
        self.execute(
            AtelierRequest::get(format!("%SYS/cspapps/{ns}"))
                .min_version(1)
                .query(QueryParams::new().with("detail", detail)),
        )
        .await
    }

    /// Interoperability classes of the given kind.
    pub async fn ens_class_list(&self, kind: u32) -> Result<ResponseEnvelope, AtelierError> {
        let ns = self.namespace()?;
        self.execute(AtelierRequest::get(format!("{ns}/ens/classes/{kind}")).min_version(1))
            .await
    }

    /// Queues long-running work. The server answers with a work id in
    /// `result.location`.
    pub async fn queue_async(&self, request: Value) -> Result<ResponseEnvelope, AtelierError> {
        let ns = self.namespace()?;
        let envelope = self
            .execute(
                AtelierRequest::post(format!("{ns}/work"))
                    .min_version(1)
                    .json(request),
            )
            .await?;
        debug!(location = ?envelope.result.extra.get("location"), "Queued work");
        Ok(envelope)
    }

    /// Polls queued work.
    pub async fn poll_async(&self, id: &WorkId) -> Result<ResponseEnvelope, AtelierError> {
        let ns = self.namespace()?;
        self.execute(AtelierRequest::get(format!("{ns}/work/{id}")).min_version(1))
            .await
    }

    /// Cancels queued work.
    pub async fn cancel_async(&self, id: &WorkId) -> Result<ResponseEnvelope, AtelierError> {
        let ns = self.namespace()?;
        self.execute(AtelierRequest::delete(format!("{ns}/work/{id}")).min_version(1))
            .await
    }

    /// Namespace every document operation is addressed to.
    fn namespace(&self) -> Result<Namespace, AtelierError> {
        let settings = self.settings();
        if !settings.is_active() {
            return Err(AtelierError::Inactive {
                connection: self.context.name(),
            });
        }
        settings
            .namespace
            .ok_or_else(|| AtelierError::Configuration {
                message: format!("connection '{}' has no namespace", self.context),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_params_omit_unset_values() {
        let params = SearchParams {
            query: "Hello".into(),
            documents: vec!["*.cls".into(), "*.mac".into()],
            case: true,
            ..SearchParams::default()
        };
        assert_eq!(
            params.to_query().encode(),
            "query=Hello&files=*.cls,*.mac&regex=0&word=0&case=1&sys=0&gen=0"
        );
    }

    #[test]
    fn mtime_uses_millisecond_layout() {
        let mtime = DateTime::parse_from_rfc3339("2024-03-05T07:08:09.123Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            mtime.format(MTIME_FORMAT).to_string(),
            "2024-03-05 07:08:09.123"
        );
    }

    #[test]
    fn document_mtime_is_not_serialized() {
        let doc = DocumentContent::text(["Class A {}"]).based_on(Utc::now());
        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            json!({ "enc": false, "content": ["Class A {}"] })
        );
    }
}
