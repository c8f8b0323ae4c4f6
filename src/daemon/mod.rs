// Daemon module: the long-running synchronization loop

mod consumer;
mod signals;

pub use consumer::{
    time_unit, ConsumerStats, Dispatch, EventStreamConsumer, Watermark,
};
pub use signals::{sleep_through, ReceivedSignal, SignalHandler, SignalSource};

use crate::error::Result;
use crate::registry::LeaseRegistry;
use crate::source::EventSource;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Polls the event stream until a shutdown signal arrives
pub struct Daemon<S: EventSource, R: LeaseRegistry> {
    consumer: EventStreamConsumer<S, R>,
    poll_interval: Duration,
}

impl<S: EventSource, R: LeaseRegistry> Daemon<S, R> {
    pub fn new(consumer: EventStreamConsumer<S, R>, poll_interval: Duration) -> Self {
        Self {
            consumer,
            poll_interval,
        }
    }

    /// Run in the foreground. Only events created after startup are read.
    pub async fn run(&mut self) -> Result<()> {
        let mut signal_handler = SignalHandler::new()?;
        let mut watermark = Watermark::starting_at(Utc::now());

        tracing::info!(
            "Daemon started, polling every {:?} from {}",
            self.poll_interval,
            watermark.window_start()
        );

        loop {
            watermark = self.consumer.poll_once(watermark, Utc::now()).await;

            let consumer = &self.consumer;
            let stop = sleep_through(self.poll_interval, &mut signal_handler, |_| {
                log_stats(consumer.stats())
            })
            .await;
            if stop.is_some() {
                tracing::info!("Shutdown signal received");
                break;
            }
        }

        log_stats(self.consumer.stats());
        tracing::info!("Daemon shutdown complete (last event read at {})", watermark.last_read());
        Ok(())
    }

    pub fn consumer(&self) -> &EventStreamConsumer<S, R> {
        &self.consumer
    }
}

fn log_stats(stats: &ConsumerStats) {
    tracing::info!(
        "Events read: {}, reconciled: {}, rejected: {}, ignored: {}, skipped: {}, window failures: {}",
        stats.events_read,
        stats.reconciled,
        stats.rejected,
        stats.ignored,
        stats.skipped,
        stats.window_failures
    );
}

/// Process every event the source holds up to `until`, once
pub async fn replay<S: EventSource, R: LeaseRegistry>(
    consumer: &mut EventStreamConsumer<S, R>,
    until: DateTime<Utc>,
) -> Watermark {
    let start = Watermark::starting_at(DateTime::<Utc>::UNIX_EPOCH);
    consumer.poll_once(start, until).await
}
