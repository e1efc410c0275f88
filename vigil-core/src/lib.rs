//! # vigil-core
//!
//! Core library for vigil - a live client for a code-analysis engine.
//!
//! This library provides:
//! - Decoding of the engine's event stream, including compressed chunks
//! - A single-writer store reconciling events into per-module state
//! - Finding extraction from raw tool output
//! - A pure view engine (filter, sort, cluster, stats, export)
//! - The streaming connection with automatic reconnect
//! - Configuration, logging, and the restorable session
//!
//! ## Architecture
//!
//! Data flows in one direction:
//! - **Transport:** text frames from the engine's stream
//! - **Store:** decoded events applied in arrival order per module
//! - **Derived:** findings and views computed from committed snapshots
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vigil_core::{Config, Reconciler, ReconcilerOptions, TungsteniteConnector};
//!
//! # async fn run() -> vigil_core::Result<()> {
//! let config = Config::load()?;
//! let reconciler = Reconciler::spawn(
//!     ReconcilerOptions::from_config(&config)?,
//!     Arc::new(TungsteniteConnector),
//! );
//! reconciler.connect();
//!
//! let state = reconciler.snapshot();
//! println!("{} modules", state.modules.len());
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use reconciler::{Reconciler, ReconcilerOptions};
pub use transport::{ConnectionState, TungsteniteConnector};
pub use types::*;

// Public modules
pub mod commands;
pub mod config;
pub mod error;
pub mod findings;
pub mod format;
pub mod logging;
pub mod protocol;
pub mod reconciler;
pub mod session;
pub mod store;
pub mod transport;
pub mod types;
pub mod view;
