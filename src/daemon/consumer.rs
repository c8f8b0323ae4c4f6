// Resumable consumer of the platform event stream
//
// Each poll opens a window [watermark, now], reads it page by page and
// hands every event to the filter chain and, when accepted, to the
// reconciler. The watermark is returned to the caller instead of living in
// shared state.

use crate::config::Config;
use crate::filtering::{FilterChain, FilterOutcome, FilterRules, RejectReason};
use crate::inventory::{VmEvent, VmSnapshot};
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::registry::LeaseRegistry;
use crate::source::EventSource;
use crate::telemetry::{Endpoints, PLATFORM_EVENT_TOTAL, PLATFORM_LATENCY};
use chrono::{DateTime, Duration, Utc};
use std::time::Instant;

/// Granularity of event creation times
pub fn time_unit() -> Duration {
    Duration::seconds(1)
}

/// Boundary between events already read and events still to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark {
    last_read: DateTime<Utc>,
    next_start: DateTime<Utc>,
}

impl Watermark {
    /// Watermark of a consumer started at `start`; earlier events are never read
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            last_read: start,
            next_start: start,
        }
    }

    /// Creation time of the most recently read event (or the start time)
    pub fn last_read(&self) -> DateTime<Utc> {
        self.last_read
    }

    /// Start of the next window to open
    pub fn window_start(&self) -> DateTime<Utc> {
        self.next_start
    }

    /// Advance past an event that has been read
    pub fn observe(self, created_at: DateTime<Utc>) -> Self {
        let last_read = self.last_read.max(created_at);
        Self {
            last_read,
            next_start: self.next_start.max(last_read + time_unit()),
        }
    }

    /// Move one time unit forward without reading anything
    pub fn skip_ahead(self) -> Self {
        Self {
            last_read: self.last_read + time_unit(),
            next_start: self.next_start + time_unit(),
        }
    }
}

/// What happened to one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Event kind is not reconciled (VM removal)
    Ignored,
    Rejected(RejectReason),
    /// Accepted, but the VM could not be snapshotted
    Skipped,
    Reconciled(ReconcileReport),
}

/// Counters over the consumer's lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub windows_opened: u64,
    pub window_failures: u64,
    pub read_failures: u64,
    pub events_read: u64,
    pub ignored: u64,
    pub rejected: u64,
    pub skipped: u64,
    pub reconciled: u64,
}

/// Outer loop body: event source -> filter chain -> reconciler
pub struct EventStreamConsumer<S: EventSource, R: LeaseRegistry> {
    source: S,
    chain: FilterChain,
    reconciler: Reconciler<R>,
    page_size: usize,
    endpoints: Endpoints,
    stats: ConsumerStats,
}

impl<S: EventSource, R: LeaseRegistry> EventStreamConsumer<S, R> {
    pub fn new(
        source: S,
        chain: FilterChain,
        reconciler: Reconciler<R>,
        page_size: usize,
        endpoints: Endpoints,
    ) -> Self {
        Self {
            source,
            chain,
            reconciler,
            page_size: page_size.max(1),
            endpoints,
            stats: ConsumerStats::default(),
        }
    }

    /// Wire a consumer from configuration around the given collaborators
    pub fn from_config(config: &Config, source: S, registry: R) -> crate::Result<Self> {
        let endpoints = Endpoints::new(config.platform.address.clone(), registry.endpoint());
        let rules = FilterRules::from_config(&config.platform, &config.filter)?;
        let reconciler = Reconciler::new(
            registry,
            config.platform.custom_attribute_namespace.clone(),
            config.registry.group().map(str::to_string),
            endpoints.clone(),
        );

        Ok(Self::new(
            source,
            FilterChain::new(rules, endpoints.clone()),
            reconciler,
            config.platform.page_size,
            endpoints,
        ))
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Read and process every event created within `[watermark, now]`.
    ///
    /// Never fails: a window that cannot be opened moves the watermark one
    /// time unit forward so the next poll does not retry the same window
    /// forever.
    pub async fn poll_once(&mut self, watermark: Watermark, now: DateTime<Utc>) -> Watermark {
        let start = watermark.window_start();

        let timer = Instant::now();
        let opened = self.source.open_window(start, now).await;
        self.endpoints
            .latency(PLATFORM_LATENCY, "stage", "open_window", timer.elapsed());

        let mut handle = match opened {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(
                    "Cannot open event window from {} on {}: {}",
                    start,
                    self.source.endpoint(),
                    e
                );
                self.endpoints.failure(e.kind());
                self.stats.window_failures += 1;
                return watermark.skip_ahead();
            }
        };
        self.stats.windows_opened += 1;

        let mut watermark = watermark;
        loop {
            let timer = Instant::now();
            let page = self.source.read_next(&mut handle, self.page_size).await;
            self.endpoints
                .latency(PLATFORM_LATENCY, "stage", "read_next_events", timer.elapsed());

            let events = match page {
                Ok(events) => events,
                Err(e) => {
                    tracing::warn!("Failed to read events: {}", e);
                    self.endpoints.failure(e.kind());
                    self.stats.read_failures += 1;
                    break;
                }
            };
            if events.is_empty() {
                break;
            }

            tracing::debug!("Received {} event(s)", events.len());
            for event in &events {
                self.dispatch(event).await;
                watermark = watermark.observe(event.created_at);
            }
        }

        if let Err(e) = self.source.close(handle).await {
            tracing::warn!("Failed to close event window: {}", e);
            self.endpoints.failure(e.kind());
        }

        watermark
    }

    /// Classify one event and reconcile its VM when accepted
    pub async fn dispatch(&mut self, event: &VmEvent) -> Dispatch {
        self.stats.events_read += 1;
        tracing::debug!(
            "Event {} at {}: {} {}",
            event.key,
            event.created_at,
            event.kind.as_str(),
            event.message
        );
        self.endpoints
            .increment(PLATFORM_EVENT_TOTAL, "event", event.kind.as_str());

        if !event.kind.registers() {
            tracing::debug!("Event {} not reconciled ({})", event.key, event.kind.as_str());
            self.stats.ignored += 1;
            return Dispatch::Ignored;
        }

        let vm = match (self.chain.classify(event), event.vm.as_ref()) {
            (FilterOutcome::Accepted, Some(vm)) => vm,
            (FilterOutcome::Rejected(reason), _) => {
                self.stats.rejected += 1;
                return Dispatch::Rejected(reason);
            }
            (FilterOutcome::Accepted, None) => {
                self.stats.rejected += 1;
                return Dispatch::Rejected(RejectReason::NoVm);
            }
        };

        let definitions = match self.source.custom_fields().await {
            Ok(definitions) => definitions,
            Err(e) => {
                tracing::error!("Cannot read custom attribute definitions: {}", e);
                self.endpoints.failure(e.kind());
                self.stats.skipped += 1;
                return Dispatch::Skipped;
            }
        };

        let snapshot = match VmSnapshot::extract(vm, &definitions) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!("Cannot snapshot VM of event {}: {}", event.key, e);
                self.endpoints.failure("snapshot");
                self.stats.skipped += 1;
                return Dispatch::Skipped;
            }
        };

        let report = self.reconciler.reconcile(&snapshot).await;
        self.stats.reconciled += 1;
        Dispatch::Reconciled(report)
    }

    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    pub fn chain(&self) -> &FilterChain {
        &self.chain
    }

    pub fn reconciler(&self) -> &Reconciler<R> {
        &self.reconciler
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}
