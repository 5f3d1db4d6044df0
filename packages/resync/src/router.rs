//! Resource-type routing for push events.
//!
//! The router is a dispatch table from a resource-type tag to the handler sets
//! registered for it. A handler set is a small tagged union of callbacks:
//!
//! | Slot | Signature | Invoked |
//! |------|-----------|---------|
//! | `any` | `Fn() -> Result<()>` | once per delivery if the resource had any event |
//! | `update` | `Fn(&[Key]) -> Result<()>` | with the de-duplicated updated ids |
//! | `delete` | `Fn(&[Key]) -> Result<()>` | with the de-duplicated deleted ids |
//!
//! The router knows nothing about containers. Handlers close over whatever
//! store they refresh, so new resource types register without touching the bus.
//!
//! # Panic Safety
//!
//! Every handler call is isolated with `catch_unwind`. A handler that errors or
//! panics is logged and reported; the remaining handlers still run.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::{debug, error, warn};

use crate::error::SyncError;
use crate::event::{Operation, PushEvent};
use crate::key::Key;

type IdsFn = Arc<dyn Fn(&[Key]) -> Result<()> + Send + Sync>;
type AnyFn = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// Callbacks for one resource type.
#[derive(Clone, Default)]
pub struct ResourceHandlers {
    any: Option<AnyFn>,
    update: Option<IdsFn>,
    delete: Option<IdsFn>,
}

impl ResourceHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once per delivery whenever the resource saw any event.
    pub fn on_any<F>(mut self, handler: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.any = Some(Arc::new(handler));
        self
    }

    /// Called with the ids of all `update` events in the batch.
    pub fn on_update<F>(mut self, handler: F) -> Self
    where
        F: Fn(&[Key]) -> Result<()> + Send + Sync + 'static,
    {
        self.update = Some(Arc::new(handler));
        self
    }

    /// Called with the ids of all `delete` events in the batch.
    pub fn on_delete<F>(mut self, handler: F) -> Self
    where
        F: Fn(&[Key]) -> Result<()> + Send + Sync + 'static,
    {
        self.delete = Some(Arc::new(handler));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.any.is_none() && self.update.is_none() && self.delete.is_none()
    }
}

impl fmt::Debug for ResourceHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandlers")
            .field("any", &self.any.is_some())
            .field("update", &self.update.is_some())
            .field("delete", &self.delete.is_some())
            .finish()
    }
}

/// Token returned by `register`, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Registration(u64);

struct Entry {
    registration: Registration,
    resource_type: String,
    handlers: ResourceHandlers,
}

/// Dispatch table, in registration order.
#[derive(Default)]
pub struct Router {
    entries: Vec<Entry>,
    next_id: u64,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        resource_type: impl Into<String>,
        handlers: ResourceHandlers,
    ) -> Registration {
        let registration = Registration(self.next_id);
        self.next_id += 1;
        let resource_type = resource_type.into();
        debug!(%resource_type, ?handlers, "push handlers registered");
        self.entries.push(Entry {
            registration,
            resource_type,
            handlers,
        });
        registration
    }

    pub fn unregister(&mut self, registration: Registration) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.registration != registration);
        before != self.entries.len()
    }

    /// Handler sets for a resource type, in registration order.
    pub fn handlers_for(&self, resource_type: &str) -> Vec<ResourceHandlers> {
        self.entries
            .iter()
            .filter(|e| e.resource_type == resource_type)
            .map(|e| e.handlers.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("registrations", &self.entries.len())
            .finish()
    }
}

/// All events of one resource type in a delivery, bucketed by operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBatch {
    pub resource_type: String,
    /// De-duplicated ids per operation, in first-seen order.
    pub operations: BTreeMap<Operation, Vec<Key>>,
}

impl ResourceBatch {
    pub fn ids(&self, operation: Operation) -> Option<&[Key]> {
        self.operations.get(&operation).map(Vec::as_slice)
    }
}

/// Group events by resource type (first-seen order), then by operation.
pub fn group(events: Vec<PushEvent>) -> Vec<ResourceBatch> {
    let mut batches: Vec<ResourceBatch> = Vec::new();
    let mut by_resource: HashMap<String, usize> = HashMap::new();
    let mut seen: HashMap<(usize, Operation), HashSet<Key>> = HashMap::new();

    for event in events {
        let slot = *by_resource
            .entry(event.resource_type.clone())
            .or_insert_with(|| {
                batches.push(ResourceBatch {
                    resource_type: event.resource_type.clone(),
                    operations: BTreeMap::new(),
                });
                batches.len() - 1
            });

        let ids = batches[slot].operations.entry(event.operation).or_default();
        let seen_ids = seen.entry((slot, event.operation)).or_default();
        for id in event.ids {
            if seen_ids.insert(id.clone()) {
                ids.push(id);
            }
        }
    }
    batches
}

/// Outcome of one delivery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Events in the batch.
    pub events: usize,
    /// Distinct resource types in the batch.
    pub resources: usize,
    /// Handler calls made.
    pub invocations: usize,
    /// One [`SyncError::UnroutedEvent`] per resource type without handlers.
    pub unrouted: Vec<SyncError>,
    /// Handlers that errored or panicked.
    pub failures: Vec<SyncError>,
}

impl DeliveryReport {
    pub fn is_clean(&self) -> bool {
        self.unrouted.is_empty() && self.failures.is_empty()
    }
}

/// Route a batch of events to the registered handlers.
///
/// The router lock is only held while looking handlers up, so handlers may
/// register or unregister without deadlocking.
pub fn deliver(router: &Mutex<Router>, events: Vec<PushEvent>) -> DeliveryReport {
    let mut report = DeliveryReport {
        events: events.len(),
        ..DeliveryReport::default()
    };

    for batch in group(events) {
        report.resources += 1;

        let handler_sets = match router.lock() {
            Ok(router) => router.handlers_for(&batch.resource_type),
            Err(poisoned) => {
                warn!("router mutex was poisoned, recovering");
                poisoned.into_inner().handlers_for(&batch.resource_type)
            }
        };

        if handler_sets.is_empty() {
            warn!(
                resource_type = %batch.resource_type,
                "push event for resource type without handlers"
            );
            report.unrouted.push(SyncError::UnroutedEvent {
                resource_type: batch.resource_type,
            });
            continue;
        }

        for handlers in &handler_sets {
            if let Some(any) = &handlers.any {
                invoke(&mut report, &batch.resource_type, Operation::Any, || any());
            }
            for (operation, slot) in [
                (Operation::Update, &handlers.update),
                (Operation::Delete, &handlers.delete),
            ] {
                if let (Some(handler), Some(ids)) = (slot, batch.ids(operation)) {
                    invoke(&mut report, &batch.resource_type, operation, || handler(ids));
                }
            }
        }
    }

    report
}

fn invoke<F>(report: &mut DeliveryReport, resource_type: &str, operation: Operation, call: F)
where
    F: FnOnce() -> Result<()>,
{
    report.invocations += 1;

    let message = match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => return,
        Ok(Err(e)) => {
            error!(resource_type, %operation, error = ?e, "push handler failed");
            format!("{e:#}")
        }
        Err(panic_info) => {
            let panic_msg = extract_panic_message(&panic_info);
            error!(resource_type, %operation, panic = %panic_msg, "push handler panicked");
            format!("panicked: {panic_msg}")
        }
    };

    report.failures.push(SyncError::HandlerFailed {
        resource_type: resource_type.to_string(),
        operation,
        message,
    });
}

fn extract_panic_message(panic_info: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
