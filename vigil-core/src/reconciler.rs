//! Reconciler actor
//!
//! Ties the pieces together. One task owns the [`StateStore`] and the
//! [`FindingIndex`]; everything that changes state reaches it as a message:
//!
//! ```text
//! TransportEvent ──┐
//! Reconciler handle ┼─► reconciler task ──► watch<Arc<RunState>>
//! inflate / command ┘        │          └─► watch<Arc<Vec<Finding>>>
//!   completions              └─► session.json
//! ```
//!
//! Readers never block the writer: [`Reconciler::snapshot`] and
//! [`Reconciler::findings`] return the last committed values.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::Instrument;

use crate::commands::{tool_names, CommandClient};
use crate::config::Config;
use crate::error::Result;
use crate::findings::{FindingExtractor, FindingIndex};
use crate::protocol::{decode, decompress::inflate_chunk};
use crate::session::{RestorableSession, SessionFile};
use crate::store::{Action, StateStore, Ticket};
use crate::transport::{self, ConnectionState, Connector, TransportEvent, TransportHandle};
use crate::types::{Finding, RunMode, RunState};
use crate::view::{ViewQuery, ViewResult};

/// Everything needed to start a reconciler
pub struct ReconcilerOptions {
    pub stream_url: String,
    pub reconnect_delay: Duration,
    pub recent_lines: usize,
    pub trend_buckets: usize,
    /// Module id → display name
    pub tool_names: HashMap<String, String>,
    /// Where the restorable session lives; `None` disables persistence
    pub session: Option<SessionFile>,
    /// Command API client; `None` rejects start commands locally
    pub client: Option<CommandClient>,
}

impl ReconcilerOptions {
    /// Options from configuration, persisting the session at its XDG path.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            stream_url: config.server.stream_url(),
            reconnect_delay: config.server.reconnect_delay(),
            recent_lines: config.view.recent_lines,
            trend_buckets: config.view.trend_buckets,
            tool_names: config.tool_names(),
            session: Some(SessionFile::default_location()),
            client: Some(CommandClient::new(&config.server)?),
        })
    }

    /// Options for an offline reconciler with default settings.
    pub fn offline(stream_url: impl Into<String>) -> Self {
        let config = Config::default();
        Self {
            stream_url: stream_url.into(),
            reconnect_delay: config.server.reconnect_delay(),
            recent_lines: config.view.recent_lines,
            trend_buckets: config.view.trend_buckets,
            tool_names: config.tool_names(),
            session: None,
            client: None,
        }
    }
}

/// Requests from handles
#[derive(Debug)]
enum Request {
    StartRun {
        mode: RunMode,
        project_path: Option<String>,
        selected_tools: Option<Vec<String>>,
    },
    StopRun,
    StopWatch,
    SelectProject(String),
    RefreshTools,
    Reset,
}

/// Completions re-entering the writer
#[derive(Debug)]
enum Completion {
    Inflated { ticket: Ticket, text: String },
    Command(Action),
    ToolNames(HashMap<String, String>),
}

/// Handle to a running reconciler
#[derive(Clone)]
pub struct Reconciler {
    requests: mpsc::UnboundedSender<Request>,
    state: watch::Receiver<Arc<RunState>>,
    findings: watch::Receiver<Arc<Vec<Finding>>>,
    transport: TransportHandle,
    trend_buckets: usize,
}

impl Reconciler {
    /// Spawn the reconciler and its connection actor. The connection is not
    /// opened until [`Reconciler::connect`].
    pub fn spawn(options: ReconcilerOptions, connector: Arc<dyn Connector>) -> Self {
        let (transport, transport_events) =
            transport::spawn(connector, options.stream_url.clone(), options.reconnect_delay);

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        let mut store = StateStore::new(options.recent_lines);
        let mut last_saved = RestorableSession::default();
        if let Some(file) = &options.session {
            let restored = file.load();
            if restored != last_saved {
                tracing::info!(
                    project_path = %restored.project_path,
                    is_watching = restored.is_watching,
                    "Restored session"
                );
                store.dispatch(Action::SessionRestored(restored.clone()));
                last_saved = restored;
            }
        }

        let (state_tx, state_rx) = watch::channel(Arc::new(store.state().clone()));
        let (findings_tx, findings_rx) = watch::channel(Arc::new(Vec::new()));

        let actor = ReconcilerActor {
            store,
            index: FindingIndex::new(FindingExtractor::new(options.tool_names.clone())),
            default_tool_names: options.tool_names,
            session: options.session,
            last_saved,
            client: options.client,
            requests: request_rx,
            completions: completion_rx,
            completion_tx,
            transport_events,
            state_tx,
            findings_tx,
        };
        tokio::spawn(actor.run().instrument(tracing::info_span!("reconciler")));

        Self {
            requests: request_tx,
            state: state_rx,
            findings: findings_rx,
            transport,
            trend_buckets: options.trend_buckets,
        }
    }

    /// Last committed state
    pub fn snapshot(&self) -> Arc<RunState> {
        self.state.borrow().clone()
    }

    /// Receiver notified on every commit
    pub fn subscribe(&self) -> watch::Receiver<Arc<RunState>> {
        self.state.clone()
    }

    /// Latest extracted findings across all modules
    pub fn findings(&self) -> Arc<Vec<Finding>> {
        self.findings.borrow().clone()
    }

    pub fn subscribe_findings(&self) -> watch::Receiver<Arc<Vec<Finding>>> {
        self.findings.clone()
    }

    /// Run the view pipeline over the current findings.
    pub fn view(&self, query: &ViewQuery) -> ViewResult {
        let mut query = query.clone();
        if query.trend_buckets == 0 {
            query.trend_buckets = self.trend_buckets;
        }
        query.process(&self.findings())
    }

    pub fn connect(&self) {
        self.transport.connect();
    }

    pub fn disconnect(&self) {
        self.transport.disconnect();
    }

    /// Send a raw text frame to the engine.
    pub fn send(&self, text: impl Into<String>) {
        self.transport.send(text);
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.transport.watch_state()
    }

    /// Issue a start-run. `project_path` replaces the selected project when
    /// given.
    pub fn start_run(
        &self,
        mode: RunMode,
        project_path: Option<String>,
        selected_tools: Option<Vec<String>>,
    ) {
        self.request(Request::StartRun {
            mode,
            project_path,
            selected_tools,
        });
    }

    pub fn stop_run(&self) {
        self.request(Request::StopRun);
    }

    pub fn stop_watch(&self) {
        self.request(Request::StopWatch);
    }

    pub fn select_project(&self, project_path: impl Into<String>) {
        self.request(Request::SelectProject(project_path.into()));
    }

    /// Refresh display names from the engine's tool catalog.
    pub fn refresh_tools(&self) {
        self.request(Request::RefreshTools);
    }

    pub fn reset(&self) {
        self.request(Request::Reset);
    }

    fn request(&self, request: Request) {
        if self.requests.send(request).is_err() {
            tracing::warn!("Reconciler has stopped");
        }
    }
}

struct ReconcilerActor {
    store: StateStore,
    index: FindingIndex,
    default_tool_names: HashMap<String, String>,
    session: Option<SessionFile>,
    last_saved: RestorableSession,
    client: Option<CommandClient>,
    requests: mpsc::UnboundedReceiver<Request>,
    completions: mpsc::UnboundedReceiver<Completion>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    state_tx: watch::Sender<Arc<RunState>>,
    findings_tx: watch::Sender<Arc<Vec<Finding>>>,
}

impl ReconcilerActor {
    async fn run(mut self) {
        loop {
            let revision = self.store.state().revision;
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(request) => self.on_request(request),
                    None => break,
                },
                Some(event) = self.transport_events.recv() => self.on_transport(event),
                Some(completion) = self.completions.recv() => self.on_completion(completion),
            }
            if self.store.state().revision != revision {
                self.commit();
            }
        }
        tracing::debug!("Reconciler stopped");
    }

    fn on_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => tracing::info!("Event stream connected"),
            TransportEvent::Frame(raw) => self.on_frame(&raw),
            TransportEvent::Error(e) => {
                tracing::error!(error = %e, "Event stream failed");
                self.store.dispatch(Action::ConnectionError);
            }
            TransportEvent::Closed => tracing::debug!("Event stream closed"),
        }
    }

    fn on_frame(&mut self, raw: &str) {
        let event = match decode(raw) {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable frame");
                return;
            }
        };
        if let Some(job) = self.store.handle_event(event) {
            let completions = self.completion_tx.clone();
            let span = tracing::debug_span!("inflate", module = %job.ticket.module);
            tokio::spawn(async move {
                let text = inflate_chunk(job.ticket.module.clone(), job.encoded).await;
                let _ = completions.send(Completion::Inflated {
                    ticket: job.ticket,
                    text,
                });
            }
            .instrument(span));
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Inflated { ticket, text } => self.store.complete_decode(&ticket, text),
            Completion::Command(action) => self.store.dispatch(action),
            Completion::ToolNames(names) => {
                let mut merged = self.default_tool_names.clone();
                merged.extend(names);
                self.index.extractor_mut().set_tool_names(merged);
                // Tool names are baked into findings; re-extract everything
                self.index.clear();
                self.index.refresh(self.store.state());
                self.publish_findings();
            }
        }
    }

    fn on_request(&mut self, request: Request) {
        match request {
            Request::StartRun {
                mode,
                project_path,
                selected_tools,
            } => self.start_run(mode, project_path, selected_tools),
            Request::StopRun => {
                let path = self.store.state().project_path.clone();
                self.run_command(
                    "stop_run",
                    Some(Action::StopAnalysisAcknowledged),
                    None,
                    move |client| async move { client.stop_run(&path).await },
                );
            }
            Request::StopWatch => {
                let path = self.store.state().project_path.clone();
                self.run_command(
                    "stop_watch",
                    Some(Action::StopWatchAcknowledged),
                    None,
                    move |client| async move { client.stop_watch(&path).await },
                );
            }
            Request::SelectProject(path) => self.store.dispatch(Action::ProjectSelected(path)),
            Request::RefreshTools => {
                let Some(client) = self.client.clone() else {
                    return;
                };
                let completions = self.completion_tx.clone();
                tokio::spawn(async move {
                    match client.fetch_tools().await {
                        Ok(catalog) => {
                            let _ = completions.send(Completion::ToolNames(tool_names(&catalog)));
                        }
                        Err(e) => tracing::warn!(error = %e, "Failed to fetch tool catalog"),
                    }
                });
            }
            Request::Reset => self.store.dispatch(Action::Reset),
        }
    }

    fn start_run(
        &mut self,
        mode: RunMode,
        project_path: Option<String>,
        selected_tools: Option<Vec<String>>,
    ) {
        if let Some(path) = project_path {
            self.store.dispatch(Action::ProjectSelected(path));
        }
        let path = self.store.state().project_path.clone();
        if path.is_empty() {
            tracing::warn!("Start requested without a project path");
            self.store.dispatch(Action::StartRejected);
            return;
        }

        self.store.dispatch(Action::StartRequested { mode });
        self.run_command(
            "start_run",
            None,
            Some(Action::StartRejected),
            move |client| async move {
                client
                    .start_run(&path, mode, selected_tools.as_deref())
                    .await
            },
        );
    }

    /// Run a command in the background and feed the matching outcome action
    /// back into the store. Without a client the command fails immediately.
    fn run_command<F, Fut>(
        &mut self,
        name: &'static str,
        on_success: Option<Action>,
        on_failure: Option<Action>,
        command: F,
    ) where
        F: FnOnce(CommandClient) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send,
    {
        let Some(client) = self.client.clone() else {
            tracing::warn!(command = name, "No command API configured");
            if let Some(action) = on_failure {
                self.store.dispatch(action);
            }
            return;
        };

        let completions = self.completion_tx.clone();
        tokio::spawn(async move {
            let follow_up = match command(client).await {
                Ok(()) => {
                    tracing::info!(command = name, "Command accepted");
                    on_success
                }
                Err(e) => {
                    tracing::warn!(command = name, error = %e, "Command failed");
                    on_failure
                }
            };
            if let Some(action) = follow_up {
                let _ = completions.send(Completion::Command(action));
            }
        });
    }

    fn commit(&mut self) {
        let state = self.store.state();
        self.state_tx.send_replace(Arc::new(state.clone()));
        self.persist_session();
        if self.index.refresh(self.store.state()) {
            self.publish_findings();
        }
    }

    fn publish_findings(&self) {
        self.findings_tx.send_replace(Arc::new(self.index.findings()));
    }

    fn persist_session(&mut self) {
        let current = RestorableSession::from_state(self.store.state());
        if current == self.last_saved {
            return;
        }
        if let Some(file) = &self.session {
            if let Err(e) = file.save(&current) {
                tracing::warn!(path = %file.path().display(), error = %e, "Failed to save session");
                return;
            }
        }
        self.last_saved = current;
    }
}
