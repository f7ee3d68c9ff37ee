//! Entry point that starts sessions per broker and pipeline

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mdstream_metadata::Pipeline;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{error, info};

use crate::context::EngineContext;
use crate::error::SessionError;
use crate::reporter::SessionCounters;
use crate::session::{Session, SessionState};

/// Owns every running session.
///
/// `watch_*` return immediately; the session is started in the background
/// and a start failure is logged without affecting other sessions.
pub struct DataBroker {
    ctx: Arc<EngineContext>,
    /// Also guards the transition of `stopping`
    sessions: Arc<Mutex<Vec<Session>>>,
    starts: Mutex<Vec<AbortHandle>>,
    running: Arc<AtomicUsize>,
    stopping: Arc<AtomicBool>,
}

impl DataBroker {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            sessions: Arc::new(Mutex::new(Vec::new())),
            starts: Mutex::new(Vec::new()),
            running: Arc::new(AtomicUsize::new(0)),
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn watch_trades(&self, broker: &str) -> JoinHandle<Result<(), SessionError>> {
        self.watch(broker, Pipeline::Trades)
    }

    pub fn watch_bids_asks(&self, broker: &str) -> JoinHandle<Result<(), SessionError>> {
        self.watch(broker, Pipeline::BidsAsks)
    }

    pub fn watch(&self, broker: &str, pipeline: Pipeline) -> JoinHandle<Result<(), SessionError>> {
        let ctx = Arc::clone(&self.ctx);
        let sessions = Arc::clone(&self.sessions);
        let running = Arc::clone(&self.running);
        let stopping = Arc::clone(&self.stopping);
        let broker = broker.to_string();

        let handle = tokio::spawn(async move {
            let session = match Session::start(&ctx, &broker, pipeline).await {
                Ok(session) => session,
                Err(e) => {
                    error!(broker = %broker, pipeline = %pipeline, error = %e, "Error watching {} for exchange {}", pipeline, broker);
                    return Err(e);
                }
            };

            let late = match sessions.lock() {
                Ok(mut sessions) if !stopping.load(Ordering::SeqCst) => {
                    sessions.push(session);
                    running.fetch_add(1, Ordering::SeqCst);
                    None
                }
                _ => Some(session),
            };
            if let Some(session) = late {
                info!(broker = %broker, pipeline = %pipeline, "Shutdown in progress, discarding session");
                session.join().await;
            }
            Ok(())
        });

        if let Ok(mut starts) = self.starts.lock() {
            starts.retain(|start| !start.is_finished());
            starts.push(handle.abort_handle());
        }
        handle
    }

    /// Number of sessions currently running
    pub fn running_sessions(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Shared running-session count, for health reporting
    pub fn running_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.running)
    }

    pub fn state(&self, broker: &str, pipeline: Pipeline) -> Option<SessionState> {
        self.find(broker, pipeline, |s| s.state())
    }

    pub fn counters(&self, broker: &str, pipeline: Pipeline) -> Option<Arc<SessionCounters>> {
        self.find(broker, pipeline, |s| Arc::clone(s.counters()))
    }

    pub fn symbols(&self, broker: &str, pipeline: Pipeline) -> Option<Vec<String>> {
        self.find(broker, pipeline, |s| s.symbols().to_vec())
    }

    fn find<R>(&self, broker: &str, pipeline: Pipeline, f: impl FnOnce(&Session) -> R) -> Option<R> {
        let sessions = self.sessions.lock().ok()?;
        sessions
            .iter()
            .find(|s| s.broker() == broker && s.pipeline() == pipeline)
            .map(f)
    }

    /// Stop every session and wait for their tasks. Starts still in flight
    /// are aborted; sessions started afterwards are discarded.
    pub async fn shutdown(&self) {
        let sessions: Vec<Session> = match self.sessions.lock() {
            Ok(mut sessions) => {
                self.stopping.store(true, Ordering::SeqCst);
                sessions.drain(..).collect()
            }
            Err(_) => {
                self.stopping.store(true, Ordering::SeqCst);
                Vec::new()
            }
        };
        self.running.store(0, Ordering::SeqCst);

        let pending: Vec<AbortHandle> = match self.starts.lock() {
            Ok(mut starts) => starts.drain(..).filter(|start| !start.is_finished()).collect(),
            Err(_) => Vec::new(),
        };
        for start in &pending {
            start.abort();
        }
        if !pending.is_empty() {
            info!(starts = pending.len(), "Aborted in-flight session starts");
        }

        let count = sessions.len();
        for session in &sessions {
            session.stop();
        }
        for session in sessions {
            session.join().await;
        }
        info!(sessions = count, "All sessions stopped");
    }
}
