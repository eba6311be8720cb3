//! Build orchestration and coordination.
//!
//! This module provides the main [`Bundler`] orchestrator that drives the
//! platform collaborators for each requested architecture and reports the
//! resulting [`BuildArtifact`]s.
//!
//! # Module Organization
//!
//! - [`checksum`] - artifact size and SHA-256
//! - [`cleanup`] - tasks deferred to the end of a run
//! - [`naming`] - output directory layout and artifact names
//! - `orchestrator` - the [`Bundler`] itself
//! - `signing` - the run's signing identity
//! - [`tool_detection`] - external tool availability checking

pub mod checksum;
pub mod cleanup;
pub mod naming;
mod orchestrator;
mod signing;
pub mod tool_detection;

pub use cleanup::CleanupRegistry;
pub use naming::{OutputLayout, artifact_version};
pub use orchestrator::{ArtifactKind, BuildArtifact, Bundler};
