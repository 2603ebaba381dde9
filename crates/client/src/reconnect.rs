//! Default connectivity checker.

use std::sync::Weak;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use atelier_core::{ConnectionContext, ConnectivityChecker};

use crate::environment::ClientEnvironment;

/// Re-runs the server-info handshake for a connection.
///
/// Holds the environment weakly; once the environment is dropped pending
/// checks do nothing. A check without a context has nothing to enumerate
/// and is skipped. While a check for a context runs, failures it provokes
/// do not schedule further checks (see [`ClientEnvironment::is_checking`]).
#[derive(Debug)]
pub struct ReconnectChecker {
    env: Weak<ClientEnvironment>,
}

impl ReconnectChecker {
    /// Creates a checker for `env`.
    pub fn new(env: Weak<ClientEnvironment>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl ConnectivityChecker for ReconnectChecker {
    async fn check_connection(
        &self,
        force: bool,
        context: Option<ConnectionContext>,
        namespace: Option<String>,
    ) {
        let Some(env) = self.env.upgrade() else {
            debug!("Client environment dropped, skipping re-check");
            return;
        };
        let Some(context) = context else {
            debug!("Re-check without a connection, skipping");
            return;
        };
        let Some(_guard) = env.begin_check(&context) else {
            debug!(connection = %context, "Re-check already running, skipping");
            return;
        };

        if force {
            env.logout(&context);
        }
        let client = env.client(context.clone(), namespace.as_deref());
        match client.server_info().await {
            Ok(info) => info!(
                connection = %context,
                version = %info.version,
                "Connection re-established"
            ),
            Err(e) => warn!(connection = %context, error = %e, "Connection re-check failed"),
        }
    }
}
