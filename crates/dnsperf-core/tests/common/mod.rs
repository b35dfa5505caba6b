//! Test doubles and common utilities for contract tests
//!
//! This module provides scripted resolvers and fault-injecting stores that
//! let the tests pin latencies and storage failures without touching the
//! network or a database.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dnsperf_core::config::{ResolverConfig, SchedulerConfig, StoreConfig};
use dnsperf_core::error::{Error, Result};
use dnsperf_core::stats::DomainStat;
use dnsperf_core::traits::{
    DurableStore, DurableStoreFactory, LatencySample, Resolution, Resolver, ResolverFactory,
};
use dnsperf_core::{LatencyProbe, LifecycleController, MemoryStore, RoundScheduler, SchedulerEvent, StatsAggregator};
use tokio::sync::mpsc;

/// How a scripted resolver spends its latency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// `tokio::time::advance`: exact to the microsecond, one probe at a time
    Advance,
    /// `tokio::time::sleep`: lets concurrent probes overlap
    Sleep,
}

#[derive(Default)]
struct Script {
    latencies: HashMap<String, VecDeque<Duration>>,
    silent: HashSet<String>,
    queried: Vec<String>,
}

/// Resolver factory whose resolvers answer after scripted delays
///
/// Latencies are popped per domain in order; once a domain's script runs
/// out, `default_latency` applies. Clones share the script.
#[derive(Clone)]
pub struct ScriptedResolverFactory {
    script: Arc<Mutex<Script>>,
    default_latency: Duration,
    pacing: Pacing,
    created: Arc<AtomicUsize>,
}

impl ScriptedResolverFactory {
    pub fn new(default_latency: Duration, pacing: Pacing) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::default())),
            default_latency,
            pacing,
            created: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue latencies for `domain`
    pub fn script(self, domain: &str, latencies: &[Duration]) -> Self {
        self.script
            .lock()
            .unwrap()
            .latencies
            .entry(domain.to_string())
            .or_default()
            .extend(latencies.iter().copied());
        self
    }

    /// Make every query for `domain` go unanswered
    pub fn silent(self, domain: &str) -> Self {
        self.script.lock().unwrap().silent.insert(domain.to_string());
        self
    }

    /// Names queried so far, in completion order
    pub fn queried(&self) -> Vec<String> {
        self.script.lock().unwrap().queried.clone()
    }

    /// Number of resolvers built
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ResolverFactory for ScriptedResolverFactory {
    fn create(&self, _config: &ResolverConfig) -> Result<Box<dyn Resolver>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedResolver {
            factory: self.clone(),
        }))
    }
}

struct ScriptedResolver {
    factory: ScriptedResolverFactory,
}

#[async_trait]
impl Resolver for ScriptedResolver {
    async fn resolve(&self, name: &str) -> Resolution {
        let domain = name.split_once('.').map(|(_, rest)| rest).unwrap_or(name);

        let (delay, silent) = {
            let mut script = self.factory.script.lock().unwrap();
            let delay = script
                .latencies
                .get_mut(domain)
                .and_then(VecDeque::pop_front)
                .unwrap_or(self.factory.default_latency);
            (delay, script.silent.contains(domain))
        };

        match self.factory.pacing {
            Pacing::Advance => tokio::time::advance(delay).await,
            Pacing::Sleep => tokio::time::sleep(delay).await,
        }

        self.factory.script.lock().unwrap().queried.push(name.to_string());

        if silent {
            Resolution::NoResponse {
                reason: "request timed out".to_string(),
            }
        } else {
            Resolution::Response {
                response_code: "NXDomain".to_string(),
                answers: 0,
            }
        }
    }

    fn resolver_name(&self) -> &'static str {
        "scripted"
    }
}

/// Resolver factory that can never build a resolver
pub struct UnavailableResolverFactory;

impl ResolverFactory for UnavailableResolverFactory {
    fn create(&self, _config: &ResolverConfig) -> Result<Box<dyn Resolver>> {
        Err(Error::resolver("no nameservers configured"))
    }
}

/// Which store operation a [`FaultyStore`] should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    EnsureSchema,
    LoadSummaries,
}

/// A MemoryStore wrapper with switchable failures
///
/// Clones share both the underlying rows and the failure switches.
#[derive(Clone)]
pub struct FaultyStore {
    inner: MemoryStore,
    startup_fault: Option<Fault>,
    reject_inserts: Arc<Mutex<HashSet<String>>>,
    fail_writes: Arc<AtomicBool>,
    write_attempts: Arc<AtomicUsize>,
}

impl FaultyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            startup_fault: None,
            reject_inserts: Arc::new(Mutex::new(HashSet::new())),
            fail_writes: Arc::new(AtomicBool::new(false)),
            write_attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail a startup operation
    pub fn with_startup_fault(mut self, fault: Fault) -> Self {
        self.startup_fault = Some(fault);
        self
    }

    /// Fail `insert_summary` for `domain`
    pub fn rejecting_insert(self, domain: &str) -> Self {
        self.reject_inserts.lock().unwrap().insert(domain.to_string());
        self
    }

    /// Toggle failures of `update_summary` and `append_sample`
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of summary and sample writes attempted
    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    /// The wrapped store, for inspection
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn check_writes(&self) -> Result<()> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::store("connection lost"));
        }
        Ok(())
    }
}

#[async_trait]
impl DurableStore for FaultyStore {
    async fn ensure_schema(&self) -> Result<()> {
        if self.startup_fault == Some(Fault::EnsureSchema) {
            return Err(Error::store("permission denied"));
        }
        self.inner.ensure_schema().await
    }

    async fn load_summaries(&self) -> Result<Vec<DomainStat>> {
        if self.startup_fault == Some(Fault::LoadSummaries) {
            return Err(Error::store("table is locked"));
        }
        self.inner.load_summaries().await
    }

    async fn load_summary(&self, domain: &str) -> Result<Option<DomainStat>> {
        self.inner.load_summary(domain).await
    }

    async fn insert_summary(&self, domain: &str) -> Result<DomainStat> {
        if self.reject_inserts.lock().unwrap().contains(domain) {
            return Err(Error::store(format!("cannot insert {}", domain)));
        }
        self.inner.insert_summary(domain).await
    }

    async fn update_summary(&self, stat: &DomainStat) -> Result<()> {
        self.check_writes()?;
        self.inner.update_summary(stat).await
    }

    async fn append_sample(&self, sample: &LatencySample) -> Result<()> {
        self.check_writes()?;
        self.inner.append_sample(sample).await
    }

    async fn list_samples(&self, domain: &str) -> Result<Vec<LatencySample>> {
        self.inner.list_samples(domain).await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    fn store_name(&self) -> &'static str {
        "faulty"
    }
}

/// Store factory that hands out clones of one FaultyStore
pub struct FaultyStoreFactory(pub FaultyStore);

impl DurableStoreFactory for FaultyStoreFactory {
    fn create(&self, _config: &StoreConfig) -> Result<Box<dyn DurableStore>> {
        Ok(Box::new(self.0.clone()))
    }
}

/// Everything a scheduler test needs to drive and inspect a run
pub struct Harness {
    pub scheduler: RoundScheduler,
    pub events: mpsc::Receiver<SchedulerEvent>,
    pub aggregator: Arc<StatsAggregator>,
    pub lifecycle: Arc<LifecycleController>,
}

/// Recover an aggregator from `store` and wire up a scheduler around it
pub async fn harness(
    store: impl DurableStore + 'static,
    factory: impl ResolverFactory + 'static,
    domains: &[&str],
    interval_secs: u64,
) -> Harness {
    let configured: Vec<String> = domains.iter().map(|d| d.to_string()).collect();
    let aggregator = Arc::new(
        StatsAggregator::recover(Box::new(store), &configured)
            .await
            .expect("recovery succeeds"),
    );
    let lifecycle = Arc::new(LifecycleController::new());
    let probe = LatencyProbe::new(Arc::new(factory), ResolverConfig::default());

    let (scheduler, events) = RoundScheduler::new(
        probe,
        Arc::clone(&aggregator),
        Arc::clone(&lifecycle),
        &SchedulerConfig::with_interval_secs(interval_secs),
    )
    .expect("scheduler construction succeeds");

    Harness {
        scheduler,
        events,
        aggregator,
        lifecycle,
    }
}

/// Wait for the next event matching `pred`, skipping the rest
pub async fn next_matching(
    events: &mut mpsc::Receiver<SchedulerEvent>,
    pred: impl Fn(&SchedulerEvent) -> bool,
) -> SchedulerEvent {
    loop {
        let event = events.recv().await.expect("scheduler event channel open");
        if pred(&event) {
            return event;
        }
    }
}

pub fn micros(us: u64) -> Duration {
    Duration::from_micros(us)
}

pub fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
