//! Per-broker, per-pipeline streaming session
//!
//! A session moves through `Creating -> Subscribed -> Running` inside
//! [`Session::start`]. Failing before `Running` is fatal to that session
//! only. Once running, three tasks share one shutdown signal: the metrics
//! reporter, the subscription refresher and the poller.

use std::fmt;
use std::sync::Arc;

use mdstream_metadata::Pipeline;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::context::EngineContext;
use crate::emitter::Emitter;
use crate::error::SessionError;
use crate::extract::{QuoteDiffExtractor, TradeDiffExtractor};
use crate::metrics::SessionMetrics;
use crate::poller::Poller;
use crate::refresher::SubscriptionRefresher;
use crate::reporter::{MetricsReporter, SessionCounters};
use crate::traits::FeedConnection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Creating,
    Subscribed,
    Running,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Creating => "creating",
            SessionState::Subscribed => "subscribed",
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Connection identity for a session, distinct per pipeline
pub fn connection_id(broker: &str, pipeline: Pipeline) -> String {
    format!("{}-{}-streamer", broker, pipeline.as_str())
}

/// A running session
pub struct Session {
    broker: String,
    pipeline: Pipeline,
    connection: Arc<dyn FeedConnection>,
    symbols: Arc<[String]>,
    counters: Arc<SessionCounters>,
    metrics: SessionMetrics,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    pub async fn start(
        ctx: &EngineContext,
        broker: &str,
        pipeline: Pipeline,
    ) -> Result<Session, SessionError> {
        let id = connection_id(broker, pipeline);
        debug!(broker = %broker, pipeline = %pipeline, state = %SessionState::Creating, "Starting session");

        let connection = ctx
            .registry
            .create_connection(broker, &id, true)
            .await
            .map_err(|source| SessionError::Connect {
                broker: broker.to_string(),
                pipeline,
                source,
            })?;
        connection
            .load_markets()
            .await
            .map_err(|source| SessionError::LoadMarkets {
                broker: broker.to_string(),
                pipeline,
                source,
            })?;
        let symbols: Arc<[String]> = connection
            .symbols_for_market_type(&ctx.market_type)
            .map_err(|source| SessionError::Symbols {
                broker: broker.to_string(),
                pipeline,
                source,
            })?
            .into();

        let metrics = SessionMetrics::new(broker, pipeline);
        metrics.set_symbols(symbols.len());

        let refresher = SubscriptionRefresher::new(
            broker,
            pipeline,
            Arc::clone(&connection),
            Arc::clone(&symbols),
            ctx.batch_size(broker),
        );
        // Initial subscribe; failures are logged per batch by the refresher
        drop(refresher.refresh());
        debug!(broker = %broker, pipeline = %pipeline, state = %SessionState::Subscribed, symbols = symbols.len(), "Subscriptions issued");

        let counters = Arc::new(SessionCounters::new());
        let (shutdown, rx) = watch::channel(false);
        let timings = ctx.timings;
        let emitter = Emitter::new(broker, pipeline, Arc::clone(&ctx.consumer));
        let period = timings.processing_interval(pipeline);

        let poller_task = match pipeline {
            Pipeline::Trades => tokio::spawn(
                Poller::new(
                    broker,
                    pipeline,
                    Arc::clone(&connection),
                    Arc::clone(&symbols),
                    TradeDiffExtractor::new(),
                    emitter,
                    Arc::clone(&counters),
                    period,
                    timings.overload_margin,
                )
                .run(rx.clone()),
            ),
            Pipeline::BidsAsks => tokio::spawn(
                Poller::new(
                    broker,
                    pipeline,
                    Arc::clone(&connection),
                    Arc::clone(&symbols),
                    QuoteDiffExtractor::new(),
                    emitter,
                    Arc::clone(&counters),
                    period,
                    timings.overload_margin,
                )
                .run(rx.clone()),
            ),
        };
        let reporter = MetricsReporter::new(broker, pipeline, Arc::clone(&counters));
        let tasks = vec![
            tokio::spawn(reporter.run(timings.metrics_interval, rx.clone())),
            tokio::spawn(refresher.run(timings.refresh_interval, rx)),
            poller_task,
        ];

        metrics.set_running(true);
        info!(
            broker = %broker,
            pipeline = %pipeline,
            connection = %id,
            symbols = symbols.len(),
            "Session running"
        );

        Ok(Session {
            broker: broker.to_string(),
            pipeline,
            connection,
            symbols,
            counters,
            metrics,
            shutdown,
            tasks,
        })
    }

    pub fn broker(&self) -> &str {
        &self.broker
    }

    pub fn pipeline(&self) -> Pipeline {
        self.pipeline
    }

    pub fn connection(&self) -> &Arc<dyn FeedConnection> {
        &self.connection
    }

    /// Symbol universe fetched at start
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn counters(&self) -> &Arc<SessionCounters> {
        &self.counters
    }

    pub fn state(&self) -> SessionState {
        if *self.shutdown.borrow() {
            SessionState::Stopped
        } else {
            SessionState::Running
        }
    }

    /// Signal all session tasks to stop. Subscriptions are left in place.
    pub fn stop(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }
        self.metrics.set_running(false);
        info!(broker = %self.broker, pipeline = %self.pipeline, "Session stopped");
    }

    /// Stop and wait for all session tasks to finish
    pub async fn join(mut self) {
        self.stop();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(broker = %self.broker, pipeline = %self.pipeline, error = %e, "Session task failed");
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}
