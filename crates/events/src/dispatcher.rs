//! Delivery dispatcher: a bounded worker pool for webhook fan-out.
//!
//! `publish` hands an event and its matching subscriptions to
//! [`DeliveryDispatcher::dispatch`] and returns. A fan-out task owned by the
//! dispatcher queues one delivery per subscription, and a single loop drains
//! the bounded queue, spawning at most `workers` deliveries at a time. Each
//! delivery is independent: it runs its own attempts, each under a deadline,
//! sleeps a jittered backoff between them, and ends in exactly one terminal
//! state (`delivered`, `dead_lettered` or `cancelled`).
//!
//! Shutdown closes the queue, drains in-flight deliveries for a bounded
//! time, then cancels whatever is left.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use archibus_core::audit::action_kinds;
use archibus_core::delivery::DeliveryState;
use archibus_core::retry::RetryPolicy;
use archibus_core::types::DbId;
use archibus_db::models::delivery::{CreateDelivery, UpdateDelivery};
use archibus_db::models::subscription::Subscription;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::audit::AuditEmitter;
use crate::delivery::webhook::{WebhookError, WebhookSender};
use crate::delivery::{BodyMode, DeliveryRequest};
use crate::envelope::EventEnvelope;
use crate::store::DeliveryLog;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Default maximum number of concurrent deliveries.
const DEFAULT_WORKERS: usize = 16;

/// Default capacity of the delivery-task queue.
const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default time one event's fan-out waits for queue space.
const DEFAULT_ENQUEUE_TIMEOUT: Duration = Duration::from_millis(250);

/// Default deadline for one delivery attempt.
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Buffer of the outcome notification channel.
const OUTCOME_CAPACITY: usize = 1024;

/// Reason recorded for a task rejected because the queue stayed full.
const QUEUE_FULL_REASON: &str = "dispatch queue full";

/// Reason recorded for deliveries cut short by shutdown.
const SHUTDOWN_REASON: &str = "dispatcher shut down";

/// Tunables for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum concurrent delivery tasks.
    pub workers: usize,
    /// Capacity of the bounded task queue.
    pub queue_capacity: usize,
    /// How long one event's fan-out waits for queue space before
    /// dead-lettering what is left.
    pub enqueue_timeout: Duration,
    /// Deadline applied to each attempt.
    pub attempt_timeout: Duration,
    /// Attempt budget and backoff.
    pub retry: RetryPolicy,
    /// What goes into the request body.
    pub body_mode: BodyMode,
}

impl DispatcherConfig {
    /// Load configuration from environment variables.
    ///
    /// Unparseable values fall back to the default.
    ///
    /// | Variable                      | Default   |
    /// |-------------------------------|-----------|
    /// | `DISPATCH_WORKERS`            | `16`      |
    /// | `DISPATCH_QUEUE_CAPACITY`     | `1024`    |
    /// | `DISPATCH_ENQUEUE_TIMEOUT_MS` | `250`     |
    /// | `DELIVERY_TIMEOUT_SECS`       | `5`       |
    /// | `DELIVERY_MAX_ATTEMPTS`       | `2`       |
    /// | `DELIVERY_INITIAL_BACKOFF_MS` | `1000`    |
    /// | `DELIVERY_MAX_BACKOFF_MS`     | `60000`   |
    /// | `DELIVERY_JITTER`             | `0.2`     |
    /// | `DELIVERY_BODY`               | `payload` |
    pub fn from_env() -> Self {
        fn var<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.parse().ok())
        }

        let defaults = Self::default();
        let retry = RetryPolicy::new(
            var("DELIVERY_MAX_ATTEMPTS").unwrap_or(defaults.retry.max_attempts),
            var("DELIVERY_INITIAL_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.initial_backoff),
            var("DELIVERY_MAX_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.max_backoff),
            var("DELIVERY_JITTER").unwrap_or(defaults.retry.jitter),
        );

        Self {
            workers: var("DISPATCH_WORKERS").unwrap_or(defaults.workers),
            queue_capacity: var("DISPATCH_QUEUE_CAPACITY").unwrap_or(defaults.queue_capacity),
            enqueue_timeout: var("DISPATCH_ENQUEUE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.enqueue_timeout),
            attempt_timeout: var("DELIVERY_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.attempt_timeout),
            retry,
            body_mode: var("DELIVERY_BODY").unwrap_or(defaults.body_mode),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            enqueue_timeout: DEFAULT_ENQUEUE_TIMEOUT,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            retry: RetryPolicy::default(),
            body_mode: BodyMode::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Error / outcome
// ---------------------------------------------------------------------------

/// Why a delivery could not be handed to the worker pool.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Dispatch queue full after waiting {0:?}")]
    QueueFull(Duration),

    #[error("Dispatcher is shut down")]
    ShutDown,
}

/// Terminal result of one (event, subscription) delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryOutcome {
    pub event_id: String,
    pub subscription_id: String,
    pub callback_url: String,
    pub state: DeliveryState,
    pub attempts: u32,
    pub last_error: Option<String>,
}

// ---------------------------------------------------------------------------
// Delivery context (shared by all delivery tasks)
// ---------------------------------------------------------------------------

struct DeliveryTask {
    event: Arc<EventEnvelope>,
    subscription: Subscription,
    record_id: Option<DbId>,
}

struct DeliveryContext {
    sender: Arc<dyn WebhookSender>,
    log: Arc<dyn DeliveryLog>,
    audit: AuditEmitter,
    config: DispatcherConfig,
    outcomes: broadcast::Sender<DeliveryOutcome>,
}

impl DeliveryContext {
    /// Create the `pending` delivery record. Best-effort.
    async fn create_record(
        &self,
        event: &EventEnvelope,
        subscription: &Subscription,
    ) -> Option<DbId> {
        let input = CreateDelivery {
            event_id: event.event_id.clone(),
            subscription_id: subscription.id.clone(),
            callback_url: subscription.callback_url.clone(),
            state: DeliveryState::Pending,
        };
        match self.log.create(input).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    event_id = %event.event_id,
                    subscription_id = %subscription.id,
                    "Failed to create delivery record"
                );
                None
            }
        }
    }

    /// Update the delivery record. Best-effort.
    async fn record(
        &self,
        task: &DeliveryTask,
        state: DeliveryState,
        attempts: u32,
        last_error: Option<String>,
        last_status: Option<u16>,
    ) {
        let Some(id) = task.record_id else {
            return;
        };
        let input = UpdateDelivery {
            state,
            attempt_count: i32::try_from(attempts).unwrap_or(i32::MAX),
            last_error,
            last_status_code: last_status.and_then(|s| i16::try_from(s).ok()),
        };
        if let Err(e) = self.log.update(id, input).await {
            tracing::warn!(error = %e, delivery_id = id, state = %state, "Failed to update delivery record");
        }
    }

    /// Move a delivery into a terminal state, audit permanent failures and
    /// announce the outcome.
    async fn finish(
        &self,
        task: &DeliveryTask,
        state: DeliveryState,
        attempts: u32,
        last_error: Option<String>,
        last_status: Option<u16>,
    ) {
        debug_assert!(state.is_terminal());
        self.record(task, state, attempts, last_error.clone(), last_status)
            .await;

        if state == DeliveryState::DeadLettered {
            self.audit
                .record(
                    action_kinds::DELIVERY_FAILED,
                    Some(&task.event.source_service),
                    serde_json::json!({
                        "event_id": task.event.event_id,
                        "event_type": task.event.event_type,
                        "subscription_id": task.subscription.id,
                        "subscriber_service": task.subscription.subscriber_service,
                        "callback_url": task.subscription.callback_url,
                        "attempts": attempts,
                        "error": last_error,
                    }),
                )
                .await;
        }

        // No receivers is fine.
        let _ = self.outcomes.send(DeliveryOutcome {
            event_id: task.event.event_id.clone(),
            subscription_id: task.subscription.id.clone(),
            callback_url: task.subscription.callback_url.clone(),
            state,
            attempts,
            last_error,
        });
    }

    /// One attempt under the per-attempt deadline.
    async fn attempt(&self, task: &DeliveryTask, attempt: u32) -> Result<u16, WebhookError> {
        let request = DeliveryRequest::build(
            &task.event,
            &task.subscription,
            self.config.body_mode,
            attempt,
        )
        .map_err(|e| WebhookError::InvalidRequest(e.to_string()))?;

        match tokio::time::timeout(self.config.attempt_timeout, self.sender.send(&request)).await {
            Ok(result) => result,
            Err(_) => Err(WebhookError::Timeout(self.config.attempt_timeout)),
        }
    }

    /// Drive one delivery to a terminal state.
    async fn deliver(&self, task: DeliveryTask, cancel: CancellationToken) {
        let policy = &self.config.retry;
        let mut attempt: u32 = 0;
        let mut last_error: Option<String> = None;
        let mut last_status: Option<u16> = None;

        loop {
            attempt += 1;
            self.record(
                &task,
                DeliveryState::Delivering,
                attempt,
                last_error.clone(),
                last_status,
            )
            .await;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.finish(&task, DeliveryState::Cancelled, attempt, Some(SHUTDOWN_REASON.into()), last_status).await;
                    return;
                }
                result = self.attempt(&task, attempt) => result,
            };

            let err = match result {
                Ok(status) => {
                    tracing::info!(attempt, status, "Webhook delivered");
                    self.finish(&task, DeliveryState::Delivered, attempt, None, Some(status))
                        .await;
                    return;
                }
                Err(e) => e,
            };

            last_status = err.status_code();
            last_error = Some(err.to_string());

            if !policy.should_retry(attempt) {
                tracing::error!(
                    attempt,
                    url = %task.subscription.callback_url,
                    error = %err,
                    "Webhook delivery failed after all attempts"
                );
                self.finish(
                    &task,
                    DeliveryState::DeadLettered,
                    attempt,
                    last_error,
                    last_status,
                )
                .await;
                return;
            }

            let delay = policy.delay_for(attempt);
            tracing::warn!(
                attempt,
                url = %task.subscription.callback_url,
                error = %err,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Webhook delivery attempt failed, retrying"
            );
            self.record(
                &task,
                DeliveryState::Retrying,
                attempt,
                last_error.clone(),
                last_status,
            )
            .await;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.finish(&task, DeliveryState::Cancelled, attempt, Some(SHUTDOWN_REASON.into()), last_status).await;
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// DeliveryDispatcher
// ---------------------------------------------------------------------------

/// Bounded asynchronous worker pool for webhook deliveries.
///
/// One instance per process, shared via `Arc`.
pub struct DeliveryDispatcher {
    queue: Mutex<Option<mpsc::Sender<DeliveryTask>>>,
    ctx: Arc<DeliveryContext>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl DeliveryDispatcher {
    /// Start the dispatch loop on the current Tokio runtime.
    pub fn start(
        config: DispatcherConfig,
        sender: Arc<dyn WebhookSender>,
        log: Arc<dyn DeliveryLog>,
        audit: AuditEmitter,
    ) -> Arc<Self> {
        let workers = config.workers.max(1);
        let queue_capacity = config.queue_capacity.max(1);

        let (tx, rx) = mpsc::channel(queue_capacity);
        let (outcomes, _) = broadcast::channel(OUTCOME_CAPACITY);
        let ctx = Arc::new(DeliveryContext {
            sender,
            log,
            audit,
            config,
            outcomes,
        });
        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();
        let semaphore = Arc::new(Semaphore::new(workers));

        tracker.spawn(dispatch_loop(
            rx,
            Arc::clone(&ctx),
            semaphore,
            tracker.clone(),
            cancel.clone(),
        ));

        tracing::info!(workers, queue_capacity, "Delivery dispatcher started");

        Arc::new(Self {
            queue: Mutex::new(Some(tx)),
            ctx,
            tracker,
            cancel,
        })
    }

    /// Receive the terminal outcome of every delivery from now on.
    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<DeliveryOutcome> {
        self.ctx.outcomes.subscribe()
    }

    /// Hand every delivery for `event` to the pool and return immediately.
    ///
    /// The fan-out runs on the dispatcher's own tracker, so dropping the
    /// caller's future (request timeout, client disconnect) cannot cut it
    /// short. Every subscription ends in a terminal state. Queue space is
    /// awaited for at most `enqueue_timeout` per event, not per delivery;
    /// once that budget is spent, deliveries that find the queue full are
    /// dead-lettered. After shutdown they are cancelled.
    ///
    /// Returns the number of deliveries handed off.
    pub fn dispatch(&self, event: Arc<EventEnvelope>, subscriptions: Vec<Subscription>) -> usize {
        let count = subscriptions.len();
        if count == 0 {
            return 0;
        }

        let queue = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let deadline = Instant::now() + self.ctx.config.enqueue_timeout;
        let span = tracing::info_span!("fan_out", event_id = %event.event_id, deliveries = count);

        self.tracker.spawn(
            fan_out(
                Arc::clone(&self.ctx),
                queue,
                event,
                subscriptions,
                deadline,
            )
            .instrument(span),
        );
        count
    }

    /// Stop accepting work, drain in-flight deliveries for up to
    /// `drain_timeout`, then cancel the rest.
    pub async fn shutdown(&self, drain_timeout: Duration) {
        drop(
            self.queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        self.tracker.close();

        if tokio::time::timeout(drain_timeout, self.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                drain_timeout_secs = drain_timeout.as_secs(),
                "Delivery drain timed out, cancelling outstanding deliveries"
            );
            self.cancel.cancel();
            self.tracker.wait().await;
        }

        tracing::info!("Delivery dispatcher stopped");
    }
}

/// Create a record for each delivery and queue it, sharing one deadline
/// across the whole event.
async fn fan_out(
    ctx: Arc<DeliveryContext>,
    queue: Option<mpsc::Sender<DeliveryTask>>,
    event: Arc<EventEnvelope>,
    subscriptions: Vec<Subscription>,
    deadline: Instant,
) {
    for subscription in subscriptions {
        let record_id = ctx.create_record(&event, &subscription).await;
        let task = DeliveryTask {
            event: Arc::clone(&event),
            subscription,
            record_id,
        };

        let result = match &queue {
            Some(queue) => hand_off(&ctx, queue, task, deadline).await,
            None => {
                ctx.finish(&task, DeliveryState::Cancelled, 0, Some(SHUTDOWN_REASON.into()), None)
                    .await;
                Err(DispatchError::ShutDown)
            }
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Delivery not queued");
        }
    }
}

/// Queue one task, waiting no later than `deadline` for space.
async fn hand_off(
    ctx: &DeliveryContext,
    queue: &mpsc::Sender<DeliveryTask>,
    task: DeliveryTask,
    deadline: Instant,
) -> Result<(), DispatchError> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    let sent = if remaining.is_zero() {
        queue.try_send(task).map_err(|e| match e {
            TrySendError::Full(task) => SendTimeoutError::Timeout(task),
            TrySendError::Closed(task) => SendTimeoutError::Closed(task),
        })
    } else {
        queue.send_timeout(task, remaining).await
    };

    match sent {
        Ok(()) => Ok(()),
        Err(SendTimeoutError::Timeout(task)) => {
            tracing::error!(
                subscription_id = %task.subscription.id,
                "Dispatch queue full, dead-lettering delivery"
            );
            ctx.finish(
                &task,
                DeliveryState::DeadLettered,
                0,
                Some(QUEUE_FULL_REASON.into()),
                None,
            )
            .await;
            Err(DispatchError::QueueFull(ctx.config.enqueue_timeout))
        }
        Err(SendTimeoutError::Closed(task)) => {
            ctx.finish(&task, DeliveryState::Cancelled, 0, Some(SHUTDOWN_REASON.into()), None)
                .await;
            Err(DispatchError::ShutDown)
        }
    }
}

/// Pull tasks off the queue and spawn a delivery for each, bounded by the
/// semaphore. Exits when the queue closes or on cancellation.
async fn dispatch_loop(
    mut rx: mpsc::Receiver<DeliveryTask>,
    ctx: Arc<DeliveryContext>,
    semaphore: Arc<Semaphore>,
    tracker: TaskTracker,
    cancel: CancellationToken,
) {
    loop {
        let task = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            task = rx.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            ctx.finish(&task, DeliveryState::Cancelled, 0, Some(SHUTDOWN_REASON.into()), None)
                .await;
            break;
        };

        let span = tracing::info_span!(
            "delivery",
            event_id = %task.event.event_id,
            subscription_id = %task.subscription.id,
        );
        let ctx = Arc::clone(&ctx);
        let cancel = cancel.clone();
        tracker.spawn(
            async move {
                let _permit = permit;
                ctx.deliver(task, cancel).await;
            }
            .instrument(span),
        );
    }

    // Whatever is still queued never started.
    rx.close();
    while let Some(task) = rx.recv().await {
        ctx.finish(&task, DeliveryState::Cancelled, 0, Some(SHUTDOWN_REASON.into()), None)
            .await;
    }
}
