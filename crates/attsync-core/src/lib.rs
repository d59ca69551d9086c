//! AttSync Core - Domain types and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `AssetKey`, `Fingerprint`, `Snapshot`, `SyncDiff`, `HistoryEntry`
//! - **Port definitions** - Traits for adapters: `IRemoteStore`, `IDocumentRenderer`
//! - **Configuration** - The YAML configuration file and its validation
//!
//! # Architecture
//!
//! The domain module holds pure data with no I/O. Ports define the trait
//! interfaces that the sync engine depends on and that adapter crates
//! implement. Nothing in this crate talks to the network or the filesystem
//! beyond loading the configuration file.

pub mod config;
pub mod domain;
pub mod ports;
