//! Workspace-side collaborators for the Atelier client.
//!
//! Implements the [`atelier_core::ConfigProvider`] and
//! [`atelier_core::StateStore`] ports:
//!
//! - [`WorkspaceConfig`]: `atelier.toml` with `[servers.*]`,
//!   `[connections.*]` and `[transport]` sections.
//! - [`FileStateStore`]: JSON runtime state, replaced atomically on write.
//! - [`MemoryStateStore`]: process-local state.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** File formats and paths live here. The client crate
//! only sees the port traits.

pub mod config;
pub mod errors;
pub mod state;

pub use config::{TransportSection, WorkspaceConfig, CONFIG_FILE};
pub use errors::WorkspaceError;
pub use state::{FileStateStore, MemoryStateStore, DEFAULT_STATE_PATH};
