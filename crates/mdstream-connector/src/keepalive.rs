//! Process liveness and memory usage logging

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use memory_stats::memory_stats;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{info, warn};

pub const STOP_CHECK_INTERVAL: Duration = Duration::from_secs(5);
pub const MEMORY_REPORT_INTERVAL: Duration = Duration::from_secs(60);

const MEGABYTE: f64 = 1024.0 * 1024.0;

/// Memory held by this process, in megabytes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryUsage {
    pub physical_mb: f64,
    pub virtual_mb: f64,
}

impl MemoryUsage {
    /// `None` on platforms where usage cannot be read
    pub fn current() -> Option<Self> {
        memory_stats().map(|stats| Self::from_bytes(stats.physical_mem, stats.virtual_mem))
    }

    fn from_bytes(physical: usize, virtual_mem: usize) -> Self {
        Self {
            physical_mb: physical as f64 / MEGABYTE,
            virtual_mb: virtual_mem as f64 / MEGABYTE,
        }
    }
}

/// Log memory usage on start and every minute until `stop` is set.
/// Returns the number of reports written.
pub async fn keep_alive(stop: Arc<AtomicBool>, running: Arc<AtomicUsize>) -> u64 {
    let started = Instant::now();
    let mut stop_check = interval(STOP_CHECK_INTERVAL);
    stop_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut report = interval(MEMORY_REPORT_INTERVAL);
    report.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut reports = 0;

    loop {
        tokio::select! {
            _ = stop_check.tick() => {
                if stop.load(Ordering::SeqCst) {
                    info!(uptime_secs = started.elapsed().as_secs(), "Keep-alive stopped");
                    return reports;
                }
            }
            _ = report.tick() => {
                reports += 1;
                let uptime_secs = started.elapsed().as_secs();
                let running_sessions = running.load(Ordering::SeqCst);
                match MemoryUsage::current() {
                    Some(usage) => info!(
                        uptime_secs,
                        running_sessions,
                        physical_mb = usage.physical_mb,
                        virtual_mb = usage.virtual_mb,
                        "Process memory usage"
                    ),
                    None => warn!(uptime_secs, running_sessions, "Process memory usage unavailable"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_usage_in_megabytes() {
        let usage = MemoryUsage::from_bytes(3 * 1024 * 1024, 512 * 1024);
        assert_eq!(usage.physical_mb, 3.0);
        assert_eq!(usage.virtual_mb, 0.5);
    }

    #[test]
    fn test_current_memory_usage() {
        let usage = MemoryUsage::current().unwrap();
        assert!(usage.physical_mb > 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_every_minute_until_stopped() {
        let stop = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicUsize::new(2));
        let handle = tokio::spawn(keep_alive(Arc::clone(&stop), running));

        tokio::time::sleep(Duration::from_secs(125)).await;
        assert!(!handle.is_finished());

        stop.store(true, Ordering::SeqCst);
        let reports = handle.await.unwrap();

        // Start, one minute, two minutes
        assert_eq!(reports, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_within_one_check() {
        let stop = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(keep_alive(stop, Arc::new(AtomicUsize::new(0))));

        tokio::time::sleep(STOP_CHECK_INTERVAL).await;
        assert!(handle.is_finished());
    }
}
