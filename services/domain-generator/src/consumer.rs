//! Message lifecycle controller.
//!
//! Reads one notification at a time, runs it through the pipeline while
//! keeping the broker claim alive, then acknowledges it. Only a broker
//! failure while the message is in flight requeues it; every other problem
//! is absorbed by the pipeline and the message is acknowledged.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use hydro_common::InboundMessage;
use storage::{Delivery, MessageQueue, QueueError};

use crate::config::ConsumerConfig;
use crate::pipeline::Pipeline;
use crate::report::ProcessingSummary;

const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

// ============================================================================
// Shared State
// ============================================================================

/// Process-wide consumer state, shared with the status server.
#[derive(Debug, Default)]
pub struct ConsumerState {
    running: AtomicBool,
    messages_acked: AtomicU64,
    messages_requeued: AtomicU64,
    sites_dispatched: AtomicU64,
    /// Unix seconds of the last finished message; 0 when none yet.
    last_message_at: AtomicI64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub running: bool,
    pub messages_acked: u64,
    pub messages_requeued: u64,
    pub sites_dispatched: u64,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl ConsumerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    fn record_ack(&self, sites_dispatched: usize) {
        self.messages_acked.fetch_add(1, Ordering::Relaxed);
        self.sites_dispatched
            .fetch_add(sites_dispatched as u64, Ordering::Relaxed);
        self.touch();
    }

    fn record_requeue(&self) {
        self.messages_requeued.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    fn touch(&self) {
        self.last_message_at
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let last = self.last_message_at.load(Ordering::Relaxed);
        StateSnapshot {
            running: self.is_running(),
            messages_acked: self.messages_acked.load(Ordering::Relaxed),
            messages_requeued: self.messages_requeued.load(Ordering::Relaxed),
            sites_dispatched: self.sites_dispatched.load(Ordering::Relaxed),
            last_message_at: (last > 0)
                .then(|| DateTime::from_timestamp(last, 0))
                .flatten(),
        }
    }
}

// ============================================================================
// Consumer
// ============================================================================

/// How a delivery was settled.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    Acknowledged(ProcessingSummary),
    /// Body could not be decoded; acknowledged without processing.
    Discarded,
    Requeued,
}

pub struct MessageConsumer<Q> {
    queue: Q,
    pipeline: Arc<Pipeline>,
    state: Arc<ConsumerState>,
    keep_alive: Duration,
    max_consecutive_errors: u32,
    retry_delay: Duration,
}

impl<Q: MessageQueue> MessageConsumer<Q> {
    pub fn new(
        queue: Q,
        pipeline: Arc<Pipeline>,
        state: Arc<ConsumerState>,
        keep_alive: Duration,
        max_consecutive_errors: u32,
    ) -> Self {
        Self {
            queue,
            pipeline,
            state,
            // tokio intervals reject a zero period
            keep_alive: keep_alive.max(Duration::from_millis(1)),
            max_consecutive_errors: max_consecutive_errors.max(1),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn from_config(
        queue: Q,
        pipeline: Arc<Pipeline>,
        state: Arc<ConsumerState>,
        config: &ConsumerConfig,
    ) -> Self {
        Self::new(
            queue,
            pipeline,
            state,
            Duration::from_secs(config.keep_alive_secs),
            config.max_consecutive_errors,
        )
    }

    /// Initial delay before retrying after a broker error. Doubles per
    /// consecutive failure.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn state(&self) -> &Arc<ConsumerState> {
        &self.state
    }

    /// Consume until shutdown or until broker errors exceed the limit.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> Result<(), QueueError> {
        self.state.set_running(true);
        info!("Consumer started");

        let mut consecutive_errors = 0u32;

        let result = loop {
            let next = tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutting down consumer");
                    break Ok(());
                }
                next = self.queue.next_delivery() => next,
            };

            let step = match next {
                Ok(Some(delivery)) => self.handle_delivery(delivery).await.map(|_| ()),
                Ok(None) => Ok(()),
                Err(e) => Err(e),
            };

            match step {
                Ok(()) => consecutive_errors = 0,
                Err(e) => {
                    consecutive_errors += 1;
                    if consecutive_errors >= self.max_consecutive_errors {
                        error!(
                            error = %e,
                            consecutive_errors,
                            "Broker unavailable, stopping consumer"
                        );
                        break Err(e);
                    }

                    let delay = self.backoff(consecutive_errors);
                    warn!(
                        error = %e,
                        consecutive_errors,
                        retry_in_ms = delay.as_millis() as u64,
                        "Broker error, retrying"
                    );

                    tokio::select! {
                        _ = shutdown.recv() => {
                            info!("Shutting down consumer");
                            break Ok(());
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        };

        self.state.set_running(false);
        result
    }

    /// Process and settle one delivery.
    ///
    /// Returns an error only when the broker could not be told the outcome.
    pub async fn handle_delivery(
        &mut self,
        delivery: Delivery,
    ) -> Result<MessageOutcome, QueueError> {
        let message = match InboundMessage::from_slice(&delivery.payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(entry_id = %delivery.entry_id, error = %e, "Discarding undecodable message");
                self.queue.ack(&delivery).await?;
                self.state.record_ack(0);
                counter!("domain_generator_messages_total", "outcome" => "discarded").increment(1);
                return Ok(MessageOutcome::Discarded);
            }
        };

        info!(
            entry_id = %delivery.entry_id,
            rdf = %message.rdf,
            issuance_time = %message.issuance_time,
            attempts = delivery.attempts,
            "Received message"
        );

        let pipeline = Arc::clone(&self.pipeline);
        let processing = pipeline.process_message(&message);
        tokio::pin!(processing);

        let mut ticker = tokio::time::interval(self.keep_alive);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        let processed = loop {
            tokio::select! {
                summary = &mut processing => break Ok(summary),
                _ = ticker.tick() => {
                    if let Err(e) = self.queue.keep_alive(&delivery).await {
                        break Err(e);
                    }
                }
            }
        };

        match processed {
            Ok(summary) => {
                self.queue.ack(&delivery).await?;
                self.state.record_ack(summary.dispatched());
                counter!("domain_generator_messages_total", "outcome" => "acked").increment(1);

                info!(
                    entry_id = %delivery.entry_id,
                    sites = summary.total(),
                    dispatched = summary.dispatched(),
                    failed = summary.failed(),
                    dispatched_lids = ?summary.dispatched_lids(),
                    "Message acknowledged"
                );
                Ok(MessageOutcome::Acknowledged(summary))
            }
            Err(e) => {
                warn!(
                    entry_id = %delivery.entry_id,
                    error = %e,
                    "Keep-alive failed, requeueing message"
                );
                self.queue.nack(&delivery).await?;
                self.state.record_requeue();
                counter!("domain_generator_messages_total", "outcome" => "requeued").increment(1);
                Ok(MessageOutcome::Requeued)
            }
        }
    }

    fn backoff(&self, consecutive_errors: u32) -> Duration {
        let factor = 2u32.saturating_pow(consecutive_errors.saturating_sub(1));
        self.retry_delay.saturating_mul(factor).min(MAX_RETRY_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_starts_empty() {
        let state = ConsumerState::new();
        let snapshot = state.snapshot();

        assert!(!snapshot.running);
        assert_eq!(snapshot.messages_acked, 0);
        assert_eq!(snapshot.last_message_at, None);
    }

    #[test]
    fn test_counters() {
        let state = ConsumerState::new();
        state.set_running(true);
        state.record_ack(2);
        state.record_ack(0);
        state.record_requeue();

        let snapshot = state.snapshot();
        assert!(snapshot.running);
        assert_eq!(snapshot.messages_acked, 2);
        assert_eq!(snapshot.messages_requeued, 1);
        assert_eq!(snapshot.sites_dispatched, 2);
        assert!(snapshot.last_message_at.is_some());
    }
}
