//! Core domain for the Atelier client.
//!
//! This crate holds every domain concept the request pipeline works with:
//! identifiers, connection settings and their resolver, the session cookie
//! cache, the response envelope, and the error type. Infrastructure crates
//! implement the port traits defined here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! Configuration, runtime state, status display, console output and the
//! reconnection trigger are reached only through [`ports`].
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`Namespace`, `ConnectionIdentity`, `AuthTarget`, ...) |
//! | [`types`] | Value types (`ApiVersion`, `QueryParams`, `ServerInfo`, ...) |
//! | [`envelope`] | Response envelope parsing, decoding and classification |
//! | [`errors`] | [`AtelierError`] and [`RetryPolicy`] |
//! | [`session`] | Cookie jar and persistent [`SessionCache`] |
//! | [`settings`] | Layered [`ConnectionSettings`] and [`SettingsResolver`] |
//! | [`ports`] | Collaborator traits |

pub mod envelope;
pub mod errors;
pub mod identifiers;
pub mod ports;
pub mod session;
pub mod settings;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use envelope::{
    Content, EnvelopeFailure, EnvelopeResult, EnvelopeStatus, FailureSource, ResponseEnvelope,
};
pub use errors::{
    AtelierError, RetryPolicy, TransportErrorKind, REFUSED_RECHECK_DELAY,
    UNAUTHORIZED_RECHECK_DELAY,
};
pub use identifiers::{AuthTarget, ConnectionIdentity, Namespace, ServerName, WorkId};
pub use ports::{
    ConfigProvider, ConnectionBlock, ConnectionContext, ConnectivityChecker, ConsoleSink,
    ServerDefinition, StateStore, StateStoreExt, StatusSink,
};
pub use session::{Session, SessionCache};
pub use settings::{ConnectionSettings, SettingsOverrides, SettingsResolver};
pub use types::{ApiVersion, QueryParams, QueryValue, Scheme, ServerFeature, ServerInfo};
