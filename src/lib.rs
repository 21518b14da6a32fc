//! Waybill is an artifact-tracking HTTP proxy sidecar.
//!
//! It sits next to a build, forwards the build's repository traffic to
//! configured upstream services, and keeps an in-memory ledger of every
//! artifact uploaded or downloaded — sizes and MD5/SHA-1/SHA-256 digests
//! computed in-flight — for later export to a central build-tracking
//! system. Artifacts pre-seeded in a local archive are served directly
//! and reported from the previous run's manifest.
//!
//! # Architecture
//!
//! - [`archive`] -- Local artifact archive lookup behind the
//!   [`ArchiveIndex`](archive::ArchiveIndex) trait.
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, validate).
//! - [`config`] -- Configuration loading, validation, and hot-reloading via
//!   the [`ConfigSource`](config::ConfigSource) trait.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`health`] -- `GET /health` endpoint handler returning runtime diagnostics.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`proxy`] -- Core HTTP forwarding: route resolution, header construction,
//!   and the retrying forward engine.
//! - [`relay`] -- Single-pass streaming relay with inline content digesting.
//! - [`server`] -- Axum server setup, shared application state, and graceful
//!   shutdown.
//! - [`tracking`] -- The tracking ledger, its wire model, and the tracked
//!   content HTTP surface.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML config file support _(enabled by default)_ |
//! | `json` | JSON config file support |

// Binary crate — public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod archive;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod proxy;
pub mod relay;
pub mod server;
pub mod tracking;
