//! Module state store
//!
//! The single source of truth for the reconciled session. [`StateStore`] is
//! owned by exactly one writer (the reconciler task); readers only ever see
//! committed [`RunState`] snapshots.
//!
//! ```text
//!  Event ──► StateStore::handle_event ──► Sequencer ──► reducer::apply ──► RunState
//!                     │                      ▲
//!                     └─► DecodeJob ──► inflate ──► StateStore::complete_decode
//! ```
//!
//! ## Ordering
//!
//! Module events are applied in arrival order per module, including
//! compressed stream chunks that finish inflating out of order. A global init
//! clears modules immediately and discards any chunks still in flight.

pub mod reducer;
mod sequencer;

pub use reducer::{apply, format_log_line, Action, ModuleUpdate, ANALYSIS_STARTED};
pub use sequencer::{Sequencer, Ticket};

use chrono::Local;

use crate::protocol::{Event, ModuleEvent, StreamChunk};
use crate::types::RunState;

/// A compressed chunk waiting to be inflated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeJob {
    pub ticket: Ticket,
    pub encoded: String,
}

/// Writer-side state: the current [`RunState`] plus ordering bookkeeping.
pub struct StateStore {
    state: RunState,
    sequencer: Sequencer,
    recent_limit: usize,
}

impl StateStore {
    /// Create an empty store keeping `recent_limit` display lines per module.
    pub fn new(recent_limit: usize) -> Self {
        Self {
            state: RunState::default(),
            sequencer: Sequencer::new(),
            recent_limit: recent_limit.max(1),
        }
    }

    /// The last committed state
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Number of compressed chunks still being inflated
    pub fn pending_chunks(&self) -> usize {
        self.sequencer.pending()
    }

    /// Apply a global action immediately.
    pub fn dispatch(&mut self, action: Action) {
        if matches!(action, Action::GlobalInit | Action::Reset) {
            self.sequencer.clear();
        }
        apply(&mut self.state, action, self.recent_limit);
    }

    /// Route a decoded event. Returns a job when the event carries a
    /// compressed chunk that must be inflated before it can be applied.
    pub fn handle_event(&mut self, event: Event) -> Option<DecodeJob> {
        match event {
            Event::SystemLog { text } => {
                self.dispatch(Action::SystemMessage(text));
                None
            }
            Event::GlobalInit => {
                self.dispatch(Action::GlobalInit);
                None
            }
            Event::GlobalEnd { status } => {
                self.dispatch(Action::GlobalEnd { status });
                None
            }
            Event::Module { module, event } => {
                let module = module.into_string();
                let update = match event {
                    ModuleEvent::Stream(StreamChunk::GzipBase64(encoded)) => {
                        let ticket = self.sequencer.reserve(&module);
                        return Some(DecodeJob { ticket, encoded });
                    }
                    ModuleEvent::Stream(StreamChunk::Plain(text)) => ModuleUpdate::AppendStream(text),
                    ModuleEvent::Init => ModuleUpdate::Init,
                    ModuleEvent::Log { text } | ModuleEvent::Error { text } => {
                        ModuleUpdate::AppendLine(format_log_line(&text, Local::now()))
                    }
                    ModuleEvent::End { status, summary } => ModuleUpdate::End { status, summary },
                    ModuleEvent::Metrics(metrics) => ModuleUpdate::Metrics(metrics),
                };
                let ready = self.sequencer.push_ready(&module, update);
                self.apply_module_updates(&module, ready);
                None
            }
        }
    }

    /// Deliver the inflated text for a previously returned [`DecodeJob`].
    pub fn complete_decode(&mut self, ticket: &Ticket, text: String) {
        let ready = self
            .sequencer
            .fulfill(ticket, ModuleUpdate::AppendStream(text));
        self.apply_module_updates(&ticket.module, ready);
    }

    fn apply_module_updates(&mut self, module: &str, updates: Vec<ModuleUpdate>) {
        for update in updates {
            apply(
                &mut self.state,
                Action::Module {
                    module: module.to_string(),
                    update,
                },
                self.recent_limit,
            );
        }
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(reducer::DEFAULT_RECENT_LINES)
    }
}
