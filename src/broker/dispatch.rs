//! Dispatch engine
//!
//! A dispatcher takes one published message and the snapshot of subscribers
//! taken for its topic, and makes exactly one independent delivery attempt
//! per subscriber. Two strategies share the [`Dispatcher`] trait:
//!
//! - [`InlineDispatcher`] awaits each delivery in turn inside the publishing
//!   task. No tasks are created; a slow subscriber delays the rest by at most
//!   its inbox timeout.
//! - [`SpawnDispatcher`] spawns one tokio task per delivery. A semaphore caps
//!   the number of live delivery tasks; when the cap is reached the publisher
//!   waits for a slot before spawning more.
//!
//! In both cases nothing is ordered across subscribers, a failed attempt
//! never stops the others, and delivery conditions are absorbed here and
//! never reach the publisher as errors.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::error;

use crate::broker::message::Message;
use crate::subscriber::{DeliveryOutcome, Subscriber};

/// Strategy selector used by the settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    Inline,
    #[default]
    Spawned,
}

#[async_trait]
pub trait Dispatcher<T: Send + Sync + 'static>: Send + Sync + fmt::Debug {
    /// Hand one delivery per target off and return once all of them are
    /// under way (or, for inline dispatch, finished).
    async fn dispatch(
        &self,
        message: Arc<Message<T>>,
        targets: Vec<Arc<Subscriber<T>>>,
    ) -> Dispatched;
}

/// Build the dispatcher selected by `mode`.
pub fn dispatcher_for<T: Send + Sync + 'static>(
    mode: DispatchMode,
    max_in_flight: usize,
) -> Arc<dyn Dispatcher<T>> {
    match mode {
        DispatchMode::Inline => Arc::new(InlineDispatcher),
        DispatchMode::Spawned => Arc::new(SpawnDispatcher::new(max_in_flight)),
    }
}

/// Aggregated outcomes of one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub dropped_inactive: usize,
    pub dropped_full: usize,
    pub timed_out: usize,
}

impl DeliveryReport {
    pub fn record(&mut self, outcome: DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Delivered => self.delivered += 1,
            DeliveryOutcome::DroppedInactive => self.dropped_inactive += 1,
            DeliveryOutcome::DroppedFull => self.dropped_full += 1,
            DeliveryOutcome::TimedOut => self.timed_out += 1,
        }
    }

    pub fn dropped(&self) -> usize {
        self.dropped_inactive + self.dropped_full + self.timed_out
    }

    pub fn total(&self) -> usize {
        self.delivered + self.dropped()
    }
}

enum Pending {
    Done(DeliveryReport),
    Running(Vec<JoinHandle<DeliveryOutcome>>),
}

/// Handle returned by a publish once its deliveries are dispatched.
///
/// Dropping it is fire-and-forget: spawned deliveries keep running.
/// Awaiting [`wait`](Self::wait) resolves when every attempt has finished.
pub struct Dispatched {
    targets: usize,
    pending: Pending,
}

impl Dispatched {
    pub fn empty() -> Self {
        Self::completed(0, DeliveryReport::default())
    }

    pub fn completed(targets: usize, report: DeliveryReport) -> Self {
        Self {
            targets,
            pending: Pending::Done(report),
        }
    }

    pub fn running(handles: Vec<JoinHandle<DeliveryOutcome>>) -> Self {
        Self {
            targets: handles.len(),
            pending: Pending::Running(handles),
        }
    }

    /// Number of subscribers in the snapshot.
    pub fn targets(&self) -> usize {
        self.targets
    }

    pub fn is_empty(&self) -> bool {
        self.targets == 0
    }

    /// Wait for every delivery attempt and collect the outcomes.
    ///
    /// A delivery task that panicked is logged and left out of the report.
    pub async fn wait(self) -> DeliveryReport {
        match self.pending {
            Pending::Done(report) => report,
            Pending::Running(handles) => {
                let mut report = DeliveryReport::default();
                for joined in futures::future::join_all(handles).await {
                    match joined {
                        Ok(outcome) => report.record(outcome),
                        Err(e) => error!("Delivery task failed: {e}"),
                    }
                }
                report
            }
        }
    }
}

impl fmt::Debug for Dispatched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatched")
            .field("targets", &self.targets)
            .field("done", &matches!(self.pending, Pending::Done(_)))
            .finish()
    }
}

/// Delivers sequentially inside the publishing task.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatcher;

#[async_trait]
impl<T: Send + Sync + 'static> Dispatcher<T> for InlineDispatcher {
    async fn dispatch(
        &self,
        message: Arc<Message<T>>,
        targets: Vec<Arc<Subscriber<T>>>,
    ) -> Dispatched {
        let mut report = DeliveryReport::default();
        for subscriber in &targets {
            report.record(subscriber.deliver(message.clone()).await);
        }
        Dispatched::completed(targets.len(), report)
    }
}

/// Delivers from one spawned task per subscriber, at most `max_in_flight`
/// at a time across every publish sharing this dispatcher.
#[derive(Debug, Clone)]
pub struct SpawnDispatcher {
    permits: Arc<Semaphore>,
    max_in_flight: usize,
}

impl SpawnDispatcher {
    pub const DEFAULT_MAX_IN_FLIGHT: usize = 1024;

    pub fn new(max_in_flight: usize) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Delivery tasks currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.permits.available_permits()
    }
}

impl Default for SpawnDispatcher {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_IN_FLIGHT)
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Dispatcher<T> for SpawnDispatcher {
    async fn dispatch(
        &self,
        message: Arc<Message<T>>,
        targets: Vec<Arc<Subscriber<T>>>,
    ) -> Dispatched {
        let mut handles = Vec::with_capacity(targets.len());
        for subscriber in targets {
            // the semaphore is never closed, so this only waits
            let permit = self.permits.clone().acquire_owned().await.ok();
            let message = message.clone();
            handles.push(tokio::spawn(async move {
                let outcome = subscriber.deliver(message).await;
                drop(permit);
                outcome
            }));
        }
        Dispatched::running(handles)
    }
}
