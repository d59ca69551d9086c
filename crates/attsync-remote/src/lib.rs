//! AttSync Remote - Confluence adapter and gallery renderer
//!
//! Provides:
//! - A typed async client for the Confluence REST content API
//! - [`ConfluenceAttachmentStore`], the [`IRemoteStore`] implementation the
//!   sync engine drives
//! - [`GalleryRenderer`], which turns asset keys and sync history into the
//!   page body published after each cycle
//!
//! ## Modules
//!
//! - [`client`] - HTTP client and status-to-error mapping
//! - [`page`] - Key classification and storage-format rendering
//! - [`retry_after`] - `Retry-After` header parsing
//! - [`store`] - [`IRemoteStore`] adapter on top of the client
//!
//! [`IRemoteStore`]: attsync_core::ports::IRemoteStore

pub mod client;
pub mod page;
pub mod retry_after;
pub mod store;

pub use client::ConfluenceClient;
pub use page::GalleryRenderer;
pub use store::ConfluenceAttachmentStore;
