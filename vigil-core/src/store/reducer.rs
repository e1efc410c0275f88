//! Pure state transitions
//!
//! Every change to [`RunState`] goes through [`apply`]. Transitions never fail:
//! an action that does not fit the current state still produces a well-formed
//! state (e.g. `END` for a module that never sent `INIT` creates it).

use std::sync::Arc;

use chrono::{DateTime, TimeZone};

use crate::session::RestorableSession;
use crate::types::{Metrics, ModuleLog, ModuleStatus, OverallStatus, RunMode, RunState};

/// First line of every module log after `INIT`
pub const ANALYSIS_STARTED: &str = "Analysis started...";

/// Default size of each module's display ring
pub const DEFAULT_RECENT_LINES: usize = 10;

/// A change to one module's log
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleUpdate {
    /// Start of a module run
    Init,
    /// One formatted log line (LOG / ERROR)
    AppendLine(String),
    /// Raw stream text, possibly a partial line
    AppendStream(String),
    /// Terminal status and summary
    End {
        status: Option<String>,
        summary: Option<String>,
    },
    /// Replacement counters
    Metrics(Metrics),
}

/// Every transition the store knows about
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Module-less `LOG`
    SystemMessage(String),
    /// `GLOBAL_INIT` or module-less `INIT`
    GlobalInit,
    /// `GLOBAL_END`
    GlobalEnd { status: Option<String> },
    /// Module-scoped event, already ordered by the sequencer
    Module { module: String, update: ModuleUpdate },
    /// Fault on a live connection
    ConnectionError,
    /// A start-run command was issued
    StartRequested { mode: RunMode },
    /// The engine rejected a start-run command
    StartRejected,
    /// The engine acknowledged a stop-analysis command
    StopAnalysisAcknowledged,
    /// The engine acknowledged a stop-watch command
    StopWatchAcknowledged,
    /// Project path changed by the presentation layer
    ProjectSelected(String),
    /// Restorable fields loaded at startup
    SessionRestored(RestorableSession),
    /// Back to the initial state
    Reset,
}

/// Format a log line with a wall-clock prefix, e.g. `[10:56:04 PM] text`.
pub fn format_log_line<Tz: TimeZone>(text: &str, at: DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("[{}] {}", at.format("%-I:%M:%S %p"), text)
}

/// Apply one action to the state. `recent_limit` bounds each display ring.
pub fn apply(state: &mut RunState, action: Action, recent_limit: usize) {
    match action {
        Action::SystemMessage(text) => {
            state.last_system_message = text;
        }
        Action::GlobalInit => {
            state.modules.clear();
            state.is_analyzing = true;
            state.overall_status = OverallStatus::Running;
        }
        Action::GlobalEnd { status } => {
            state.is_analyzing = false;
            state.overall_status = OverallStatus::from_reported(status.as_deref());
        }
        Action::Module { module, update } => {
            let log = Arc::make_mut(state.modules.entry(module).or_default());
            apply_module(log, update, recent_limit);
        }
        Action::ConnectionError => {
            state.overall_status = OverallStatus::Error;
            state.is_analyzing = false;
            state.is_watching = false;
        }
        Action::StartRequested { mode } => {
            state.is_analyzing = true;
            state.overall_status = OverallStatus::Starting;
            if mode == RunMode::Watch {
                state.is_watching = true;
                state.overall_status = OverallStatus::Watching;
            }
        }
        Action::StartRejected => {
            state.is_analyzing = false;
            state.overall_status = OverallStatus::Error;
        }
        Action::StopAnalysisAcknowledged => {
            state.is_analyzing = false;
            state.overall_status = OverallStatus::Idle;
        }
        Action::StopWatchAcknowledged => {
            state.is_watching = false;
            state.is_analyzing = false;
            state.overall_status = OverallStatus::Idle;
        }
        Action::ProjectSelected(path) => {
            state.project_path = path;
        }
        Action::SessionRestored(session) => {
            state.project_path = session.project_path;
            state.is_watching = session.is_watching;
        }
        Action::Reset => {
            let revision = state.revision;
            *state = RunState::default();
            state.revision = revision;
        }
    }
    state.revision += 1;
}

fn apply_module(log: &mut ModuleLog, update: ModuleUpdate, recent_limit: usize) {
    match update {
        ModuleUpdate::Init => {
            log.status = ModuleStatus::Running;
            log.recent_lines = vec![ANALYSIS_STARTED.to_string()];
            log.full_text = format!("{}\n", ANALYSIS_STARTED);
            log.metrics = None;
        }
        ModuleUpdate::AppendLine(line) => {
            log.full_text.push_str(&line);
            log.full_text.push('\n');
            log.recent_lines.push(line);
            trim_front(&mut log.recent_lines, recent_limit);
        }
        ModuleUpdate::AppendStream(text) => {
            log.full_text.push_str(&text);
            match log.recent_lines.last_mut() {
                Some(last) if !last.ends_with('\n') => last.push_str(&text),
                _ => log.recent_lines.push(text),
            }
            trim_front(&mut log.recent_lines, recent_limit);
        }
        ModuleUpdate::End { status, summary } => {
            log.status = ModuleStatus::from_reported(status.as_deref());
            log.summary = summary;
        }
        ModuleUpdate::Metrics(metrics) => {
            log.metrics = Some(metrics);
        }
    }
}

/// Keep only the newest `limit` entries.
fn trim_front(lines: &mut Vec<String>, limit: usize) {
    if lines.len() > limit {
        let excess = lines.len() - limit;
        lines.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn module(id: &str, update: ModuleUpdate) -> Action {
        Action::Module {
            module: id.to_string(),
            update,
        }
    }

    fn run(actions: Vec<Action>) -> RunState {
        let mut state = RunState::default();
        for action in actions {
            apply(&mut state, action, DEFAULT_RECENT_LINES);
        }
        state
    }

    #[test]
    fn test_init_resets_module() {
        let state = run(vec![
            module("B_Ruff", ModuleUpdate::AppendLine("old".to_string())),
            module("B_Ruff", ModuleUpdate::Metrics(Metrics::default())),
            module("B_Ruff", ModuleUpdate::Init),
        ]);
        let log = state.module("B_Ruff").unwrap();
        assert_eq!(log.status, ModuleStatus::Running);
        assert_eq!(log.recent_lines, vec![ANALYSIS_STARTED.to_string()]);
        assert_eq!(log.full_text, "Analysis started...\n");
        assert!(log.metrics.is_none());
    }

    #[test]
    fn test_module_created_lazily_as_pending() {
        let state = run(vec![module(
            "F_ESLint",
            ModuleUpdate::AppendLine("hello".to_string()),
        )]);
        let log = state.module("F_ESLint").unwrap();
        assert_eq!(log.status, ModuleStatus::Pending);
        assert_eq!(log.full_text, "hello\n");
    }

    #[test]
    fn test_recent_lines_are_bounded_suffix() {
        let mut actions = Vec::new();
        for i in 0..25 {
            actions.push(module("m", ModuleUpdate::AppendLine(format!("line {}", i))));
        }
        let state = run(actions);
        let log = state.module("m").unwrap();

        assert_eq!(log.recent_lines.len(), 10);
        let all: Vec<&str> = log.full_text.lines().collect();
        let suffix: Vec<String> = all[all.len() - 10..].iter().map(|s| s.to_string()).collect();
        assert_eq!(log.recent_lines, suffix);
        assert_eq!(log.recent_lines[0], "line 15");
    }

    #[test]
    fn test_stream_continues_partial_line() {
        let state = run(vec![
            module("m", ModuleUpdate::AppendStream("a.py:1:1: E1".to_string())),
            module("m", ModuleUpdate::AppendStream("01 bad\n".to_string())),
            module("m", ModuleUpdate::AppendStream("next".to_string())),
        ]);
        let log = state.module("m").unwrap();
        assert_eq!(log.full_text, "a.py:1:1: E101 bad\nnext");
        assert_eq!(
            log.recent_lines,
            vec!["a.py:1:1: E101 bad\n".to_string(), "next".to_string()]
        );
    }

    #[test]
    fn test_stream_ring_is_capped() {
        let mut actions = Vec::new();
        for i in 0..15 {
            actions.push(module("m", ModuleUpdate::AppendStream(format!("chunk {}\n", i))));
        }
        let state = run(actions);
        let log = state.module("m").unwrap();
        assert_eq!(log.recent_lines.len(), 10);
        assert_eq!(log.recent_lines[0], "chunk 5\n");
    }

    #[test]
    fn test_end_is_fail_closed() {
        let state = run(vec![module(
            "B_Ruff",
            ModuleUpdate::End {
                status: Some("PASS".to_string()),
                summary: Some("ok".to_string()),
            },
        )]);
        let log = state.module("B_Ruff").unwrap();
        assert_eq!(log.status, ModuleStatus::Pass);
        assert_eq!(log.summary.as_deref(), Some("ok"));

        let mut state = state;
        apply(
            &mut state,
            module(
                "B_Ruff",
                ModuleUpdate::End {
                    status: Some("TIMEOUT".to_string()),
                    summary: None,
                },
            ),
            DEFAULT_RECENT_LINES,
        );
        assert_eq!(state.module("B_Ruff").unwrap().status, ModuleStatus::Fail);
    }

    #[test]
    fn test_global_init_then_end_pass() {
        let state = run(vec![
            Action::GlobalInit,
            module("a", ModuleUpdate::Init),
            module("a", ModuleUpdate::AppendLine("x".to_string())),
            module(
                "a",
                ModuleUpdate::End {
                    status: Some("FAIL".to_string()),
                    summary: None,
                },
            ),
            Action::SystemMessage("halfway".to_string()),
            Action::GlobalEnd {
                status: Some("PASS".to_string()),
            },
        ]);
        assert!(!state.is_analyzing);
        assert_eq!(state.overall_status, OverallStatus::Success);
    }

    #[test]
    fn test_global_init_clears_modules_but_keeps_watching() {
        let state = run(vec![
            Action::StartRequested {
                mode: RunMode::Watch,
            },
            module("a", ModuleUpdate::Init),
            Action::GlobalInit,
        ]);
        assert!(state.modules.is_empty());
        assert!(state.is_analyzing);
        assert!(state.is_watching);
        assert_eq!(state.overall_status, OverallStatus::Running);
    }

    #[test]
    fn test_connection_error_clears_flags() {
        let state = run(vec![
            Action::StartRequested {
                mode: RunMode::Watch,
            },
            Action::ConnectionError,
        ]);
        assert_eq!(state.overall_status, OverallStatus::Error);
        assert!(!state.is_analyzing);
        assert!(!state.is_watching);
    }

    #[test]
    fn test_start_and_stop_commands() {
        let state = run(vec![Action::StartRequested {
            mode: RunMode::Full,
        }]);
        assert_eq!(state.overall_status, OverallStatus::Starting);
        assert!(state.is_analyzing);
        assert!(!state.is_watching);

        let state = run(vec![
            Action::StartRequested {
                mode: RunMode::Watch,
            },
            Action::StopWatchAcknowledged,
        ]);
        assert_eq!(state.overall_status, OverallStatus::Idle);
        assert!(!state.is_analyzing);
        assert!(!state.is_watching);

        let state = run(vec![
            Action::StartRequested {
                mode: RunMode::Full,
            },
            Action::StartRejected,
        ]);
        assert_eq!(state.overall_status, OverallStatus::Error);
        assert!(!state.is_analyzing);
    }

    #[test]
    fn test_session_restore_and_reset() {
        let state = run(vec![Action::SessionRestored(RestorableSession {
            project_path: "/work/app".to_string(),
            is_watching: true,
        })]);
        assert_eq!(state.project_path, "/work/app");
        assert!(state.is_watching);
        assert_eq!(state.overall_status, OverallStatus::Idle);

        let mut state = state;
        apply(&mut state, Action::Reset, DEFAULT_RECENT_LINES);
        assert_eq!(state.project_path, "");
        assert!(!state.is_watching);
        assert_eq!(state.revision, 2);
    }

    #[test]
    fn test_format_log_line() {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 22, 56, 4).unwrap();
        assert_eq!(format_log_line("hello", at), "[10:56:04 PM] hello");

        let at = Utc.with_ymd_and_hms(2025, 1, 2, 9, 5, 0).unwrap();
        assert_eq!(format_log_line("x", at), "[9:05:00 AM] x");
    }
}
