//! Debounced push-event bus.
//!
//! The bus receives server push notifications, batches them until the stream
//! goes quiet, and routes each batch through the [`Router`] in a single
//! delivery pass.
//!
//! # Lifecycle
//!
//! The bus is an explicitly constructed service object. It is cheap to clone
//! (all clones share one router and one delivery task) and has an explicit
//! `init()` / `shutdown()` lifecycle, so tests can stand up an isolated bus.
//!
//! ```text
//! push channel ──emit()──► mpsc ──► bus task
//!                                     │  Debouncer (deadline reset per event)
//!                                     ▼
//!                               quiet period elapsed
//!                                     │
//!                                     ▼
//!                              router::deliver()
//!                         ┌───────────┼───────────┐
//!                         ▼           ▼           ▼
//!                     handlers    handlers    unrouted → warn!
//! ```
//!
//! # Guarantees
//!
//! - **One pass per burst**: events arriving within the debounce window of each
//!   other are delivered together
//! - **In-memory only**: events still buffered at shutdown are dropped
//! - **Isolated handlers**: a failing handler never blocks the others
//!
//! # Example
//!
//! ```ignore
//! let bus = PushBus::new(SyncConfig::from_env()?);
//! bus.register("movie", movies.refreshing_handlers());
//! bus.register("badges", badges.push_handlers());
//! bus.init();
//!
//! // From the socket reader:
//! bus.ingest_json(&frame)?;
//!
//! // On teardown:
//! bus.shutdown().await;
//! ```

use std::future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};

use crate::config::SyncConfig;
use crate::debounce::Debouncer;
use crate::error::SyncError;
use crate::event::PushEvent;
use crate::router::{deliver, DeliveryReport, Registration, ResourceHandlers, Router};

enum BusMessage {
    Event(PushEvent),
    Flush(oneshot::Sender<DeliveryReport>),
}

struct Running {
    sender: mpsc::UnboundedSender<BusMessage>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<usize>,
}

struct BusInner {
    config: SyncConfig,
    router: Arc<Mutex<Router>>,
    running: Mutex<Option<Running>>,
}

/// Batching router for server push events.
#[derive(Clone)]
pub struct PushBus {
    inner: Arc<BusInner>,
}

impl PushBus {
    /// Create a stopped bus. Handlers can be registered before `init()`.
    pub fn new(config: SyncConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                config,
                router: Arc::new(Mutex::new(Router::new())),
                running: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Register handlers for a resource type.
    ///
    /// Handlers for the same type run in registration order.
    pub fn register(
        &self,
        resource_type: impl Into<String>,
        handlers: ResourceHandlers,
    ) -> Registration {
        self.router().register(resource_type, handlers)
    }

    pub fn unregister(&self, registration: Registration) -> bool {
        self.router().unregister(registration)
    }

    /// Start the delivery task. Returns false if it is already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn init(&self) -> bool {
        let mut running = self.running();
        if running.is_some() {
            return false;
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let (stop, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run(
            self.inner.router.clone(),
            self.inner.config.clone(),
            receiver,
            stop_rx,
        ));

        *running = Some(Running { sender, stop, task });
        true
    }

    pub fn is_running(&self) -> bool {
        self.running().is_some()
    }

    /// Queue an event for the next delivery pass.
    ///
    /// The queue is unbounded; an accepted event is never dropped while the
    /// bus keeps running.
    pub fn emit(&self, event: PushEvent) -> Result<(), SyncError> {
        self.sender()?
            .send(BusMessage::Event(event))
            .map_err(|_| SyncError::BusNotRunning)
    }

    /// Decode a JSON push frame and queue it.
    pub fn ingest_json(&self, payload: &str) -> Result<(), SyncError> {
        let event = PushEvent::from_json(payload).inspect_err(|e| {
            warn!(error = %e, "rejected push payload");
        })?;
        self.emit(event)
    }

    /// Deliver everything buffered right now, without waiting for quiet.
    pub async fn flush(&self) -> Result<DeliveryReport, SyncError> {
        let sender = self.sender()?;
        let (reply, response) = oneshot::channel();
        sender
            .send(BusMessage::Flush(reply))
            .map_err(|_| SyncError::BusNotRunning)?;
        response.await.map_err(|_| SyncError::BusNotRunning)
    }

    /// Stop the delivery task.
    ///
    /// Events still waiting for their quiet period are dropped; returns how
    /// many. Returns 0 if the bus was not running.
    pub async fn shutdown(&self) -> usize {
        let Some(running) = self.running().take() else {
            return 0;
        };
        drop(running.sender);
        let _ = running.stop.send(());
        match running.task.await {
            Ok(dropped) => dropped,
            Err(e) => {
                warn!(error = %e, "push bus task ended abnormally");
                0
            }
        }
    }

    fn sender(&self) -> Result<mpsc::UnboundedSender<BusMessage>, SyncError> {
        self.running()
            .as_ref()
            .map(|r| r.sender.clone())
            .ok_or(SyncError::BusNotRunning)
    }

    fn router(&self) -> MutexGuard<'_, Router> {
        match self.inner.router.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("router mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        match self.inner.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("bus state mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl std::fmt::Debug for PushBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushBus")
            .field("debounce", &self.inner.config.debounce)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Delivery loop. Returns the number of events dropped at shutdown.
async fn run(
    router: Arc<Mutex<Router>>,
    config: SyncConfig,
    mut receiver: mpsc::UnboundedReceiver<BusMessage>,
    mut stop: oneshot::Receiver<()>,
) -> usize {
    info!(
        debounce_ms = config.debounce.as_millis() as u64,
        "push bus starting"
    );

    let mut debouncer = Debouncer::new(config.debounce);

    loop {
        let deadline = debouncer.deadline();
        let quiet = async move {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;

            _ = &mut stop => break,

            message = receiver.recv() => match message {
                Some(BusMessage::Event(event)) => {
                    trace!(
                        resource_type = %event.resource_type,
                        operation = %event.operation,
                        ids = event.ids.len(),
                        "push event buffered"
                    );
                    debouncer.push(event, Instant::now());
                    if config.backlog_warning > 0 && debouncer.len() == config.backlog_warning {
                        warn!(
                            buffered = debouncer.len(),
                            "push burst is large, delivery is still waiting for quiet"
                        );
                    }
                }
                Some(BusMessage::Flush(reply)) => {
                    let report = deliver_batch(&router, debouncer.take_all());
                    let _ = reply.send(report);
                }
                None => break,
            },

            _ = quiet => {
                if let Some(events) = debouncer.take_ready(Instant::now()) {
                    deliver_batch(&router, events);
                }
            }
        }
    }

    // Whatever is still queued in the channel never reached the debouncer.
    receiver.close();
    let mut dropped = debouncer.len();
    while let Ok(message) = receiver.try_recv() {
        if let BusMessage::Event(_) = message {
            dropped += 1;
        }
    }
    if dropped > 0 {
        warn!(dropped, "push bus stopped with undelivered events");
    }
    info!("push bus stopped");
    dropped
}

fn deliver_batch(router: &Mutex<Router>, events: Vec<PushEvent>) -> DeliveryReport {
    if events.is_empty() {
        return DeliveryReport::default();
    }
    let report = deliver(router, events);
    debug!(
        events = report.events,
        resources = report.resources,
        invocations = report.invocations,
        unrouted = report.unrouted.len(),
        failures = report.failures.len(),
        "push batch delivered"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{keys, Key};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const DEBOUNCE: Duration = Duration::from_millis(100);

    fn bus() -> PushBus {
        PushBus::new(SyncConfig::default().with_debounce(DEBOUNCE))
    }

    fn counting(bus: &PushBus, resource: &str) -> (Arc<AtomicUsize>, Arc<Mutex<Vec<Vec<Key>>>>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (c, s) = (calls.clone(), seen.clone());
        bus.register(
            resource,
            ResourceHandlers::new().on_update(move |ids| {
                c.fetch_add(1, Ordering::SeqCst);
                s.lock().unwrap().push(ids.to_vec());
                Ok(())
            }),
        );
        (calls, seen)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_delivered_once() {
        let bus = bus();
        let (calls, seen) = counting(&bus, "movie");
        bus.init();

        for ids in [[1, 2], [2, 3], [3, 4], [1, 4], [5, 5]] {
            bus.emit(PushEvent::update("movie", keys(ids))).unwrap();
        }

        tokio::time::sleep(DEBOUNCE * 2).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().unwrap(), vec![keys([1, 2, 3, 4, 5])]);
        bus.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_event_restarts_quiet_period() {
        let bus = bus();
        let (calls, _) = counting(&bus, "movie");
        bus.init();

        bus.emit(PushEvent::update("movie", keys([1]))).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        bus.emit(PushEvent::update("movie", keys([2]))).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0, "still inside the window");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        bus.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_are_separate_deliveries() {
        let bus = bus();
        let (calls, _) = counting(&bus, "movie");
        bus.init();

        bus.emit(PushEvent::update("movie", keys([1]))).unwrap();
        tokio::time::sleep(DEBOUNCE * 2).await;
        bus.emit(PushEvent::update("movie", keys([1]))).unwrap();
        tokio::time::sleep(DEBOUNCE * 2).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        bus.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_delivers_immediately() {
        let bus = bus();
        let (calls, _) = counting(&bus, "movie");
        bus.init();

        bus.emit(PushEvent::update("movie", keys([1]))).unwrap();
        bus.emit(PushEvent::update("series", keys([1]))).unwrap();
        let report = bus.flush().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.events, 2);
        assert_eq!(
            report.unrouted,
            vec![SyncError::UnroutedEvent {
                resource_type: "series".into()
            }]
        );
        bus.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_larger_than_backlog_warning_is_kept() {
        let bus = PushBus::new(
            SyncConfig::default()
                .with_debounce(DEBOUNCE)
                .with_backlog_warning(16),
        );
        let (calls, seen) = counting(&bus, "movie");
        bus.init();

        // The bus task cannot run until this loop yields.
        for id in 0..2000_u32 {
            bus.emit(PushEvent::update("movie", keys([id]))).unwrap();
        }
        let report = bus.flush().await.unwrap();

        assert_eq!(report.events, 2000);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(seen.lock().unwrap()[0], keys(0..2000_u32));
        assert_eq!(bus.shutdown().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zeroed_config_starts_and_delivers() {
        let bus = PushBus::new(
            SyncConfig::default()
                .with_debounce(Duration::ZERO)
                .with_backlog_warning(0),
        );
        let (calls, _) = counting(&bus, "movie");
        assert!(bus.init());

        bus.emit(PushEvent::update("movie", keys([1]))).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_emit_requires_running_bus() {
        let bus = bus();
        assert_eq!(
            bus.emit(PushEvent::any("movie")),
            Err(SyncError::BusNotRunning)
        );

        assert!(bus.init());
        assert!(!bus.init(), "second init is a no-op");
        assert!(bus.emit(PushEvent::any("movie")).is_ok());

        bus.shutdown().await;
        assert!(!bus.is_running());
        assert_eq!(
            bus.emit(PushEvent::any("movie")),
            Err(SyncError::BusNotRunning)
        );
        assert!(matches!(bus.flush().await, Err(SyncError::BusNotRunning)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drops_pending_events() {
        let bus = bus();
        let (calls, _) = counting(&bus, "movie");
        bus.init();

        bus.emit(PushEvent::update("movie", keys([1]))).unwrap();
        bus.emit(PushEvent::update("movie", keys([2]))).unwrap();
        tokio::task::yield_now().await;

        assert_eq!(bus.shutdown().await, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ingest_json() {
        let bus = bus();
        let (_, seen) = counting(&bus, "episode");
        bus.init();

        bus.ingest_json(r#"{"resourceType":"episode","operation":"update","ids":[3]}"#)
            .unwrap();
        assert!(matches!(
            bus.ingest_json("not json"),
            Err(SyncError::MalformedEvent { .. })
        ));
        bus.flush().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![keys([3])]);
        bus.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregister_stops_delivery() {
        let bus = bus();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let registration = bus.register(
            "movie",
            ResourceHandlers::new().on_any(move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        bus.init();

        assert!(bus.unregister(registration));
        bus.emit(PushEvent::any("movie")).unwrap();
        let report = bus.flush().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            report.unrouted,
            vec![SyncError::UnroutedEvent {
                resource_type: "movie".into()
            }]
        );
        bus.shutdown().await;
    }
}
