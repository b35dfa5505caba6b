//! Round scheduler
//!
//! The RoundScheduler drives the measurement cycle:
//! - Fans out one probe task per active domain
//! - Hands every completed probe to the StatsAggregator
//! - Waits for the whole round (fan-in) before sleeping
//! - Repeats until the LifecycleController asks it to stop
//!
//! ## Architecture
//!
//! ```text
//!                      ┌────────────────┐
//!                      │ RoundScheduler │◀──── LifecycleController
//!                      └────────────────┘          (stop at round
//!                              │                     boundaries)
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//!   ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//!   │ probe(a.com)│     │ probe(b.com)│ ... │ probe(n.com)│
//!   └─────────────┘     └─────────────┘     └─────────────┘
//!          │                   │                   │
//!          └───────────────────┼───────────────────┘
//!                              ▼
//!                     ┌─────────────────┐
//!                     │ StatsAggregator │──▶ DurableStore
//!                     └─────────────────┘
//! ```
//!
//! ## Round Flow
//!
//! 1. Read the active domain set
//! 2. Spawn one task per domain; each probes and then updates the
//!    aggregator as soon as its own probe completes
//! 3. Join every task (a slow resolution delays the whole round)
//! 4. If stop was requested, exit without sleeping; otherwise sleep for the
//!    interval and start the next round

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::lifecycle::LifecycleController;
use crate::probe::{LatencyProbe, ProbeError};
use crate::stats::StatsAggregator;

/// Events emitted by the RoundScheduler
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// Scheduler started
    Started {
        domains: usize,
    },

    /// A round is about to fan out
    RoundStarted {
        round: u64,
        domains: usize,
        at: Instant,
    },

    /// A probe's latency was folded into the statistics
    SampleRecorded {
        round: u64,
        domain: String,
        latency_usec: u64,
        record_count: u64,
        mean_latency: f64,
        std_dev: f64,
    },

    /// A probe produced no sample this round
    ProbeFailed {
        round: u64,
        error: ProbeError,
    },

    /// Every task of the round has completed
    RoundCompleted {
        round: u64,
        recorded: usize,
        failed: usize,
    },

    /// Scheduler stopped
    Stopped {
        rounds: u64,
    },
}

/// Outcome of one round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundSummary {
    /// Round number (1-based)
    pub round: u64,
    /// Probes whose latency was recorded
    pub recorded: usize,
    /// Probes that produced no sample
    pub failed: usize,
}

/// Drives repeated probe rounds over the active domain set
///
/// ## Lifecycle
///
/// 1. Recover a [`StatsAggregator`] from the durable store
/// 2. Create with [`RoundScheduler::new()`]
/// 3. Start with [`RoundScheduler::run()`]
/// 4. Call [`LifecycleController::stop()`] from anywhere; `run()` returns
///    once the round in flight has completed
///
/// ## Threading
///
/// Probe tasks are spawned on the ambient tokio runtime; on a multi-threaded
/// runtime they execute in parallel. Fan-out is unbounded: one task per
/// domain per round.
pub struct RoundScheduler {
    /// Probe used for every domain
    probe: LatencyProbe,

    /// Shared statistics
    aggregator: Arc<StatsAggregator>,

    /// Stop channel
    lifecycle: Arc<LifecycleController>,

    /// Sleep between rounds
    interval: Duration,

    /// Rounds started so far
    rounds: AtomicU64,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<SchedulerEvent>,
}

impl RoundScheduler {
    /// Create a new round scheduler
    ///
    /// # Returns
    ///
    /// A tuple of (scheduler, event_receiver) where event_receiver yields
    /// scheduler events
    pub fn new(
        probe: LatencyProbe,
        aggregator: Arc<StatsAggregator>,
        lifecycle: Arc<LifecycleController>,
        config: &SchedulerConfig,
    ) -> Result<(Self, mpsc::Receiver<SchedulerEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let scheduler = Self {
            probe,
            aggregator,
            lifecycle,
            interval: config.interval(),
            rounds: AtomicU64::new(0),
            event_tx: tx,
        };

        Ok((scheduler, rx))
    }

    /// Run rounds until stopped
    ///
    /// Stop is observed only between rounds: a round that has fanned out
    /// always completes, including its aggregator updates. The inter-round
    /// sleep ends early on stop. On return the durable store connection has
    /// been released.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: The controller was already started, or closing the store
    ///   failed. The store is closed and the controller `Stopped` either way.
    pub async fn run(&self) -> Result<()> {
        // Every exit below goes through the close/finish tail
        let (started, running) = match self.lifecycle.start() {
            Ok(true) => (Ok(()), true),
            Ok(false) => {
                info!("Stop requested before start, not running any rounds");
                (Ok(()), false)
            }
            Err(e) => {
                error!("Scheduler failed to start: {}", e);
                (Err(e), false)
            }
        };

        if running {
            self.emit_event(SchedulerEvent::Started {
                domains: self.aggregator.domains().len(),
            });

            loop {
                self.run_round().await;

                if !self.lifecycle.is_running() {
                    break;
                }

                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => {}
                    _ = self.lifecycle.stopped() => {
                        debug!("Stop requested during inter-round sleep");
                    }
                }

                if !self.lifecycle.is_running() {
                    break;
                }
            }
        }

        let rounds = self.rounds();
        self.emit_event(SchedulerEvent::Stopped { rounds });
        info!("Scheduler stopped after {} round(s)", rounds);

        let closed = self.aggregator.close().await;
        if let Err(e) = &closed {
            error!("Failed to close durable store: {}", e);
        }
        self.lifecycle.finish();

        started.and(closed)
    }

    /// Execute one full round: fan out, then wait for every probe
    pub async fn run_round(&self) -> RoundSummary {
        let round = self.rounds.fetch_add(1, Ordering::SeqCst) + 1;
        let domains = self.aggregator.domains().to_vec();

        debug!("Round {} starting for {} domain(s)", round, domains.len());
        self.emit_event(SchedulerEvent::RoundStarted {
            round,
            domains: domains.len(),
            at: Instant::now(),
        });

        let mut tasks = JoinSet::new();
        for domain in domains {
            let probe = self.probe.clone();
            let aggregator = Arc::clone(&self.aggregator);
            let event_tx = self.event_tx.clone();
            tasks.spawn(probe_and_record(round, domain, probe, aggregator, event_tx));
        }

        let mut summary = RoundSummary {
            round,
            recorded: 0,
            failed: 0,
        };

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(true) => summary.recorded += 1,
                Ok(false) => summary.failed += 1,
                Err(e) => {
                    error!("Probe task for round {} did not complete: {}", round, e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            round,
            recorded = summary.recorded,
            failed = summary.failed,
            "Round complete"
        );
        self.emit_event(SchedulerEvent::RoundCompleted {
            round,
            recorded: summary.recorded,
            failed: summary.failed,
        });

        summary
    }

    /// Rounds started so far
    pub fn rounds(&self) -> u64 {
        self.rounds.load(Ordering::SeqCst)
    }

    /// The stop channel this scheduler observes
    pub fn lifecycle(&self) -> &Arc<LifecycleController> {
        &self.lifecycle
    }

    /// Emit a scheduler event
    fn emit_event(&self, event: SchedulerEvent) {
        emit(&self.event_tx, event);
    }
}

/// Probe one domain and fold the result into the aggregator
///
/// Returns whether a sample was recorded.
async fn probe_and_record(
    round: u64,
    domain: String,
    probe: LatencyProbe,
    aggregator: Arc<StatsAggregator>,
    event_tx: mpsc::Sender<SchedulerEvent>,
) -> bool {
    let report = match probe.probe(&domain).await {
        Ok(report) => report,
        Err(e) => {
            warn!(
                domain = %e.domain(),
                latency_usec = ?e.latency_usec(),
                "Probe failed: {}",
                e
            );
            emit(&event_tx, SchedulerEvent::ProbeFailed { round, error: e });
            return false;
        }
    };

    match aggregator.update(&domain, report.latency_usec).await {
        Ok(stat) => {
            emit(
                &event_tx,
                SchedulerEvent::SampleRecorded {
                    round,
                    domain,
                    latency_usec: report.latency_usec,
                    record_count: stat.record_count,
                    mean_latency: stat.mean_latency,
                    std_dev: stat.std_dev,
                },
            );
            true
        }
        Err(e) => {
            warn!("Dropping sample for {}: {}", domain, e);
            false
        }
    }
}

fn emit(event_tx: &mpsc::Sender<SchedulerEvent>, event: SchedulerEvent) {
    // Full channel means nobody is keeping up; drop rather than block a round
    if event_tx.try_send(event).is_err() {
        warn!("Scheduler event channel full or closed, dropping event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::config::ResolverConfig;
    use crate::lifecycle::RunState;
    use crate::state::MemoryStore;
    use crate::traits::{Resolution, Resolver, ResolverFactory};
    use async_trait::async_trait;

    struct InstantResolver;

    #[async_trait]
    impl Resolver for InstantResolver {
        async fn resolve(&self, _name: &str) -> Resolution {
            Resolution::Response {
                response_code: "NoError".to_string(),
                answers: 1,
            }
        }

        fn resolver_name(&self) -> &'static str {
            "instant"
        }
    }

    struct InstantFactory;

    impl ResolverFactory for InstantFactory {
        fn create(&self, _config: &ResolverConfig) -> crate::Result<Box<dyn Resolver>> {
            Ok(Box::new(InstantResolver))
        }
    }

    async fn scheduler_for(
        store: MemoryStore,
        domains: &[&str],
        interval_secs: u64,
    ) -> (RoundScheduler, mpsc::Receiver<SchedulerEvent>, Arc<StatsAggregator>) {
        let configured: Vec<String> = domains.iter().map(|d| d.to_string()).collect();
        let aggregator = Arc::new(
            StatsAggregator::recover(Box::new(store), &configured)
                .await
                .unwrap(),
        );
        let probe = LatencyProbe::new(Arc::new(InstantFactory), ResolverConfig::default());
        let (scheduler, rx) = RoundScheduler::new(
            probe,
            Arc::clone(&aggregator),
            Arc::new(LifecycleController::new()),
            &SchedulerConfig::with_interval_secs(interval_secs),
        )
        .unwrap();
        (scheduler, rx, aggregator)
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let config = SchedulerConfig::with_interval_secs(0);
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_run_round_probes_every_domain() {
        let (scheduler, _rx, aggregator) = scheduler_for(MemoryStore::new(), &["a.test", "b.test", "c.test"], 1).await;

        let summary = scheduler.run_round().await;
        assert_eq!(
            summary,
            RoundSummary {
                round: 1,
                recorded: 3,
                failed: 0
            }
        );

        for domain in ["a.test", "b.test", "c.test"] {
            assert_eq!(aggregator.load(domain).await.unwrap().record_count, 1);
        }
        assert_eq!(scheduler.rounds(), 1);
    }

    #[tokio::test]
    async fn test_stop_before_run_returns_immediately() {
        let store = MemoryStore::new();
        let (scheduler, _rx, aggregator) = scheduler_for(store.clone(), &["a.test"], 1).await;

        scheduler.lifecycle().stop();
        scheduler.run().await.unwrap();

        assert_eq!(scheduler.rounds(), 0);
        assert_eq!(aggregator.load("a.test").await.unwrap().record_count, 0);
        assert_eq!(scheduler.lifecycle().state(), RunState::Stopped);
        assert!(store.is_closed().await);
    }

    #[tokio::test]
    async fn test_run_on_started_controller_still_releases_store() {
        let store = MemoryStore::new();
        let (scheduler, mut rx, _aggregator) = scheduler_for(store.clone(), &["a.test"], 1).await;

        assert!(scheduler.lifecycle().start().unwrap());
        assert!(matches!(scheduler.run().await, Err(Error::InvalidInput(_))));

        assert_eq!(scheduler.rounds(), 0);
        assert!(store.is_closed().await, "store released after a failed start");
        assert_eq!(scheduler.lifecycle().state(), RunState::Stopped);
        assert_eq!(rx.try_recv().unwrap(), SchedulerEvent::Stopped { rounds: 0 });
    }
}
