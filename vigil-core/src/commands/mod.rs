//! Run commands
//!
//! Start and stop requests go to the analysis engine's HTTP API. They are
//! fire-and-forget from the caller's side: the reconciler runs them in the
//! background and feeds the outcome back into the store as an
//! acknowledgement or rejection.
//!
//! | Command | Endpoint |
//! |---------|----------|
//! | start-run | `POST /api/run-analysis` |
//! | stop-run | `POST /api/stop-analysis` |
//! | stop-watch | `POST /api/stop-watch` |
//! | tool catalog | `GET /api/tools` |

mod client;

pub use client::CommandClient;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Entry in the engine's tool catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Module id → display name map from a catalog
pub fn tool_names(catalog: &[ToolInfo]) -> HashMap<String, String> {
    catalog
        .iter()
        .map(|t| (t.id.clone(), t.title.clone()))
        .collect()
}
