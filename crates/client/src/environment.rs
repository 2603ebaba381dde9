//! Process-wide client environment: the collaborators and shared state every
//! [`AtelierClient`] draws on.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::{debug, info};

use atelier_core::{
    AtelierError, AuthTarget, ConfigProvider, ConnectionContext, ConnectivityChecker,
    ConsoleSink, SettingsResolver, StateStore, StatusSink,
};

use crate::reconnect::ReconnectChecker;
use crate::scheduler::RecheckScheduler;
use crate::sessions::SessionManager;
use crate::transport::TransportPool;
use crate::{AtelierClient, ClientOptions};

/// Shared state behind every client of one process.
///
/// Owns the settings resolver, the [`SessionManager`], the re-check
/// scheduler and the pooled transport. Build it once with
/// [`ClientEnvironment::builder`] and hand out clients with
/// [`ClientEnvironment::client`].
pub struct ClientEnvironment {
    pub(crate) settings: SettingsResolver,
    pub(crate) sessions: SessionManager,
    pub(crate) scheduler: RecheckScheduler,
    pub(crate) transport: TransportPool,
    pub(crate) status: Arc<dyn StatusSink>,
    pub(crate) console: Arc<dyn ConsoleSink>,
    pub(crate) options: ClientOptions,
    checking: Mutex<HashSet<ConnectionContext>>,
}

impl ClientEnvironment {
    /// Starts building an environment over the two mandatory collaborators.
    pub fn builder(
        config: Arc<dyn ConfigProvider>,
        state: Arc<dyn StateStore>,
    ) -> EnvironmentBuilder {
        EnvironmentBuilder {
            config,
            state,
            status: None,
            console: None,
            checker: None,
            options: ClientOptions::default(),
        }
    }

    /// A client bound to `context`. `namespace` overrides the configured
    /// namespace.
    pub fn client(self: &Arc<Self>, context: ConnectionContext, namespace: Option<&str>) -> AtelierClient {
        AtelierClient::new(Arc::clone(self), context, namespace.map(str::to_string))
    }

    /// Settings resolver.
    pub fn settings(&self) -> &SettingsResolver {
        &self.settings
    }

    /// Session state.
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Pending re-checks.
    pub fn scheduler(&self) -> &RecheckScheduler {
        &self.scheduler
    }

    /// Options the environment was built with.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Drops the stored session for `context` so the next request performs a
    /// fresh handshake.
    pub fn logout(&self, context: &ConnectionContext) {
        let settings = self.settings.resolve(context, None);
        let identity = settings.identity();
        let target = AuthTarget::new(settings.username.as_deref(), &identity);
        self.sessions.invalidate(&identity, &target);
        info!(connection = %context, identity = %identity, "Session cleared");
    }

    /// Returns `true` while a connectivity re-check for `context` is running.
    ///
    /// Failures of requests made during a re-check do not schedule another
    /// one.
    pub fn is_checking(&self, context: &ConnectionContext) -> bool {
        self.checking
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(context)
    }

    /// Marks `context` as being re-checked until the returned guard drops.
    /// `None` if a re-check for it is already running.
    pub(crate) fn begin_check(&self, context: &ConnectionContext) -> Option<CheckGuard<'_>> {
        let inserted = self
            .checking
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(context.clone());
        inserted.then(|| CheckGuard {
            env: self,
            context: context.clone(),
        })
    }
}

/// Clears the re-check mark of one context on drop.
pub(crate) struct CheckGuard<'a> {
    env: &'a ClientEnvironment,
    context: ConnectionContext,
}

impl Drop for CheckGuard<'_> {
    fn drop(&mut self) {
        self.env
            .checking
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.context);
    }
}

impl std::fmt::Debug for ClientEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientEnvironment")
            .field("sessions", &self.sessions)
            .field("scheduler", &self.scheduler)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ClientEnvironment`].
///
/// Sinks default to `tracing` output. The connectivity checker defaults to a
/// [`ReconnectChecker`] over the environment being built.
pub struct EnvironmentBuilder {
    config: Arc<dyn ConfigProvider>,
    state: Arc<dyn StateStore>,
    status: Option<Arc<dyn StatusSink>>,
    console: Option<Arc<dyn ConsoleSink>>,
    checker: Option<Arc<dyn ConnectivityChecker>>,
    options: ClientOptions,
}

impl EnvironmentBuilder {
    /// Status indicator.
    #[must_use]
    pub fn status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status = Some(sink);
        self
    }

    /// Console output surface.
    #[must_use]
    pub fn console_sink(mut self, sink: Arc<dyn ConsoleSink>) -> Self {
        self.console = Some(sink);
        self
    }

    /// Replaces the default [`ReconnectChecker`].
    #[must_use]
    pub fn checker(mut self, checker: Arc<dyn ConnectivityChecker>) -> Self {
        self.checker = Some(checker);
        self
    }

    /// Transport and reconnection tunables.
    #[must_use]
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the environment.
    ///
    /// # Errors
    ///
    /// [`AtelierError::Configuration`] if the HTTP transport cannot be
    /// constructed.
    pub fn build(self) -> Result<Arc<ClientEnvironment>, AtelierError> {
        let transport = TransportPool::new(&self.options)?;
        let status = self.status.unwrap_or_else(|| Arc::new(LogSink));
        let console = self.console.unwrap_or_else(|| Arc::new(LogSink));
        let settings = SettingsResolver::new(self.config, Arc::clone(&self.state));
        let sessions = SessionManager::new(self.state);
        let options = self.options;
        let checker = self.checker;

        Ok(Arc::new_cyclic(|weak: &Weak<ClientEnvironment>| {
            let checker =
                checker.unwrap_or_else(|| Arc::new(ReconnectChecker::new(weak.clone())));
            ClientEnvironment {
                settings,
                sessions,
                scheduler: RecheckScheduler::new(checker),
                transport,
                status,
                console,
                options,
                checking: Mutex::default(),
            }
        }))
    }
}

/// Sink used when the embedder supplies none.
struct LogSink;

impl StatusSink for LogSink {
    fn set_text(&self, text: &str) {
        debug!(status = text, "Connection status");
    }

    fn set_tooltip(&self, tooltip: &str) {
        debug!(tooltip, "Connection status detail");
    }
}

impl ConsoleSink for LogSink {
    fn append_line(&self, line: &str) {
        info!(target: "atelier::console", "{line}");
    }
}
