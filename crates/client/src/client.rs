//! The request pipeline.
//!
//! [`AtelierClient::execute`] runs one call end to end: precondition checks,
//! session acquisition, URL and header construction, the HTTP exchange and
//! every side effect a response has on shared state (cookie refresh, status
//! indicator, console output, reconnection scheduling).

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use reqwest::header::{HeaderValue, COOKIE, SET_COOKIE};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use atelier_core::{
    AtelierError, AuthTarget, ConnectionContext, ConnectionSettings, FailureSource,
    ResponseEnvelope,
};

use crate::environment::ClientEnvironment;
use crate::request::{basic_auth, build_url, request_headers, versioned_path, RequestBody};
use crate::scheduler::Recheck;
use crate::transport::transport_error;
use crate::AtelierRequest;

/// Client for one connection context.
///
/// Cheap to clone; all clones share the [`ClientEnvironment`]. Settings are
/// resolved per request, so versions negotiated by
/// [`server_info`](Self::server_info) apply to the next call.
#[derive(Debug, Clone)]
pub struct AtelierClient {
    pub(crate) env: Arc<ClientEnvironment>,
    pub(crate) context: ConnectionContext,
    pub(crate) namespace: Option<String>,
}

impl AtelierClient {
    pub(crate) fn new(
        env: Arc<ClientEnvironment>,
        context: ConnectionContext,
        namespace: Option<String>,
    ) -> Self {
        Self {
            env,
            context,
            namespace,
        }
    }

    /// Connection context this client serves.
    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    /// Currently effective settings.
    pub fn settings(&self) -> ConnectionSettings {
        self.env
            .settings
            .resolve(&self.context, self.namespace.as_deref())
    }

    /// Session cookies currently held for this connection.
    pub fn cookies(&self) -> Vec<String> {
        self.env.sessions.cookies(&self.settings().identity())
    }

    /// Executes `request`.
    ///
    /// A `HEAD` request returns the session cookies as a JSON array in
    /// `result.content` instead of a parsed envelope.
    ///
    /// # Errors
    ///
    /// - [`AtelierError::Inactive`] / [`AtelierError::VersionUnsupported`]
    ///   before any network traffic.
    /// - [`AtelierError::HttpStatus`] for non-2xx responses.
    /// - [`AtelierError::Transport`] when the server cannot be reached.
    /// - [`AtelierError::InvalidResponse`] / [`AtelierError::Protocol`] for
    ///   malformed or failed envelopes.
    pub async fn execute(&self, request: AtelierRequest) -> Result<ResponseEnvelope, AtelierError> {
        let settings = self.settings();
        self.precheck(&settings, &request)?;

        let exchange = Exchange {
            env: Arc::clone(&self.env),
            context: self.context.clone(),
            namespace: self.namespace.clone(),
            settings,
        };

        let reply = if request.method == Method::HEAD {
            let cookies = exchange.session_cookies();
            exchange.send(request, cookies, true).await?
        } else {
            let (cookies, with_basic) = exchange.acquire_session().await?;
            exchange.send(request, cookies, with_basic).await?
        };
        Ok(reply.into_envelope())
    }

    fn precheck(
        &self,
        settings: &ConnectionSettings,
        request: &AtelierRequest,
    ) -> Result<(), AtelierError> {
        if !settings.is_active() {
            return Err(AtelierError::Inactive {
                connection: self.context.name(),
            });
        }
        if request.min_version > settings.api_version {
            return Err(AtelierError::VersionUnsupported {
                required: request.min_version.as_u32(),
                negotiated: settings.api_version.as_u32(),
            });
        }
        Ok(())
    }
}

/// What a completed exchange produced.
enum Reply {
    /// `HEAD`: the session cookies after the response was absorbed.
    Cookies(Vec<String>),
    Envelope(ResponseEnvelope),
}

impl Reply {
    fn into_envelope(self) -> ResponseEnvelope {
        match self {
            Self::Cookies(cookies) => ResponseEnvelope::with_content(Value::from(cookies)),
            Self::Envelope(envelope) => envelope,
        }
    }

    fn into_cookies(self) -> Vec<String> {
        match self {
            Self::Cookies(cookies) => cookies,
            Self::Envelope(_) => Vec::new(),
        }
    }
}

/// Everything one request needs, owned so the handshake probe can run as a
/// `'static` shared future.
#[derive(Clone)]
struct Exchange {
    env: Arc<ClientEnvironment>,
    context: ConnectionContext,
    namespace: Option<String>,
    settings: ConnectionSettings,
}

impl Exchange {
    fn target(&self) -> AuthTarget {
        AuthTarget::new(self.settings.username.as_deref(), &self.settings.identity())
    }

    fn session_cookies(&self) -> Vec<String> {
        self.env.sessions.cookies(&self.settings.identity())
    }

    /// Cookies to send and whether to add basic authentication.
    ///
    /// An existing session is used as is, with basic auth alongside. A cold
    /// session joins (or starts) the handshake for its target; basic auth is
    /// only added afterwards when the handshake yielded no cookies.
    async fn acquire_session(&self) -> Result<(Vec<String>, bool), AtelierError> {
        let existing = self.session_cookies();
        if !existing.is_empty() {
            return Ok((existing, true));
        }

        let target = self.target();
        let probe = self.clone();
        let cookies = self
            .env
            .sessions
            .auth()
            .acquire(&target, move || {
                async move {
                    probe
                        .send(AtelierRequest::new(Method::HEAD, ""), Vec::new(), true)
                        .await
                        .map(Reply::into_cookies)
                }
                .boxed()
            })
            .await?;

        if !cookies.is_empty() {
            info!(auth_target = %target, "Session established");
        }
        let with_basic = cookies.is_empty();
        Ok((cookies, with_basic))
    }

    async fn send(
        self,
        request: AtelierRequest,
        cookies: Vec<String>,
        with_basic: bool,
    ) -> Result<Reply, AtelierError> {
        let settings = &self.settings;
        let path = versioned_path(request.min_version, settings.api_version, &request.path);
        let url = build_url(settings, &path, &request.query);

        let mut headers = request_headers(&request, &self.env.options.user_agent);
        if !cookies.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&cookies.join("; ")) {
                headers.insert(COOKIE, value);
            }
        }
        if with_basic || request.method == Method::HEAD {
            if let Some((name, value)) = basic_auth(settings) {
                headers.insert(name, value);
            }
        }

        debug!(
            method = %request.method,
            url = %url,
            connection = %self.context,
            "Sending Atelier request"
        );

        let mut builder = self
            .env
            .transport
            .client_for(settings)
            .request(request.method.clone(), &url)
            .headers(headers);
        match &request.body {
            Some(RequestBody::Json(value)) => builder = builder.body(value.to_string()),
            Some(RequestBody::Text { text, .. }) => builder = builder.body(text.clone()),
            None => {}
        }

        let _permit = self.env.transport.permit().await?;
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return Err(self.transport_failed(&e)),
        };

        let status = response.status();
        let set_cookies: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok().map(str::to_string))
            .collect();
        let identity = settings.identity();
        let cookies = self.env.sessions.absorb_cookies(&identity, &set_cookies);

        if status == StatusCode::UNAUTHORIZED {
            return Err(self.unauthorized(status));
        }
        if !status.is_success() {
            return Err(AtelierError::HttpStatus {
                status: status.as_u16(),
                message: reason(status),
            });
        }

        self.env.status.set_text(&settings.connection_info());
        self.env.status.set_tooltip(&format!(
            "Connected as {}",
            settings.username.as_deref().unwrap_or_default()
        ));

        if request.method == Method::HEAD {
            self.env.sessions.auth().forget(&self.target());
            return Ok(Reply::Cookies(cookies));
        }

        let body = response.text().await.map_err(|e| transport_error(&e))?;
        let mut envelope = ResponseEnvelope::from_body(&body)?;
        envelope.decode_content()?;

        if !request.no_output && !envelope.is_studio_action() {
            for line in envelope.console_lines() {
                self.env.console.append_line(line);
            }
        }

        if let Err(failure) = envelope.classify() {
            if failure.source == FailureSource::ResultStatus {
                self.env.console.append_line(&failure.message);
            }
            debug!(
                url = %url,
                message = %failure.message,
                "Atelier request reported failure"
            );
            return Err(failure.into());
        }
        Ok(Reply::Envelope(envelope))
    }

    /// Side effects of a 401: the session is stale, so drop the pending
    /// handshake and have the connection re-checked shortly.
    fn unauthorized(&self, status: StatusCode) -> AtelierError {
        warn!(connection = %self.context, "Server rejected credentials");
        self.env.sessions.auth().forget(&self.target());
        self.recheck(true, self.env.options.unauthorized_recheck_delay);
        AtelierError::HttpStatus {
            status: status.as_u16(),
            message: reason(status),
        }
    }

    fn transport_failed(&self, err: &reqwest::Error) -> AtelierError {
        let error = transport_error(err);
        warn!(connection = %self.context, error = %error, "Atelier request failed");
        if error.is_connection_refused() {
            self.env.sessions.auth().forget(&self.target());
            self.env.status.set_text(&format!(
                "{} - Disconnected",
                self.settings.connection_info()
            ));
            if let Err(e) = self.env.settings.forget_address(&self.context) {
                warn!(connection = %self.context, error = %e, "Could not reset learned address");
            }
            self.recheck(false, self.env.options.refused_recheck_delay);
        }
        error
    }

    /// Schedules a re-check of this connection unless one is running now;
    /// the running check reports its own outcome.
    fn recheck(&self, force: bool, delay: Duration) {
        if self.env.is_checking(&self.context) {
            debug!(connection = %self.context, "Re-check in progress, not scheduling another");
            return;
        }
        self.env.scheduler.schedule(
            delay,
            Recheck {
                force,
                context: Some(self.context.clone()),
                namespace: self.namespace.clone(),
            },
        );
    }
}

fn reason(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("Unknown status")
        .to_string()
}
