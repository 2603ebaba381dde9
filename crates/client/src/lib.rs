//! Session-aware HTTP client for the Atelier REST API.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, handshake deduplication, cookie
//! refresh, reconnection scheduling and the typed endpoint wrappers live
//! here. Domain rules (settings layering, envelope classification, cookie
//! merging) come from [`atelier_core`]; collaborators are reached through its
//! port traits.
//!
//! ## Usage
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use atelier_core::{ConfigProvider, ConnectionContext, StateStore};
//! # async fn demo(config: Arc<dyn ConfigProvider>, state: Arc<dyn StateStore>) -> Result<(), atelier_core::AtelierError> {
//! let env = atelier_client::ClientEnvironment::builder(config, state).build()?;
//! let client = env.client(ConnectionContext::Workspace("project".into()), None);
//! client.server_info().await?;
//! let names = client.doc_names(&Default::default()).await?;
//! # let _ = names;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`client`] | [`AtelierClient`] and the request pipeline |
//! | [`endpoints`] | One wrapper per Atelier operation |
//! | [`environment`] | [`ClientEnvironment`] and its builder |
//! | [`auth`] | [`AuthCoordinator`] handshake deduplication |
//! | [`sessions`] | [`SessionManager`] |
//! | [`scheduler`] | [`RecheckScheduler`] |
//! | [`reconnect`] | [`ReconnectChecker`] |
//! | [`request`] | [`AtelierRequest`] and URL/header construction |

pub mod auth;
pub mod client;
pub mod endpoints;
pub mod environment;
pub mod options;
pub mod reconnect;
pub mod request;
pub mod scheduler;
pub mod sessions;
mod transport;

pub use auth::{AuthCoordinator, HandshakeResult};
pub use client::AtelierClient;
pub use endpoints::{DocNamesFilter, DocumentContent, SearchParams};
pub use environment::{ClientEnvironment, EnvironmentBuilder};
pub use options::{ClientOptions, DEFAULT_MAX_CONNECTIONS};
pub use reconnect::ReconnectChecker;
pub use request::{AtelierRequest, RequestBody};
pub use reqwest::Method;
pub use scheduler::{Recheck, RecheckScheduler, ScheduledRecheck};
pub use sessions::SessionManager;
