//! MirrorSync Core - Domain logic and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Manifest`, `FileEntry`, `MirrorRecord`
//! - **State machine** - `MirrorStatus` transitions for a mirror pass
//! - **Port definitions** - Traits for adapters: `IProviderAdapter`, `IManifestStore`,
//!   `IMirrorRepository`, `IWorkspaceReplicator`
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! # Architecture
//!
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement
//! (`mirrorsync-cache` for storage, `mirrorsync-providers` for HTTP).

pub mod config;
pub mod domain;
pub mod ports;
