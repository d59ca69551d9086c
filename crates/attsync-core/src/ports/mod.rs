//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. The sync engine depends on these interfaces;
//! their implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IRemoteStore`] - Remote attachment store (list, upload, delete, download, publish)
//! - [`IDocumentRenderer`] - Per-project classification and rendering of the derived document

pub mod remote_store;
pub mod renderer;

pub use remote_store::{IRemoteStore, RemoteError};
pub use renderer::{Categories, IDocumentRenderer, Section};
