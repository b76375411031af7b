//! Watch/event distribution
//!
//! Writers queue events on a process-local unbounded channel and never
//! block: a single background task drains the queue, hands each event to
//! matching local watchers and publishes it on the shared bus so other
//! replicas observe it. Inbound bus messages are re-emitted to local
//! watchers unless they originated here (loop-back suppression).
//!
//! Ordering is per-resource within one writer, since that writer's events
//! pass through one sequential drain task; cross-replica ordering is not
//! guaranteed and delivery is at-least-once.

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use hylo_core::{matches_all, LabelSelector, Resource, ResourceReference};

use crate::bus::MessageBus;

/// Topic every replica publishes and subscribes on
pub const EVENTS_TOPIC: &str = "hylo.events";

/// What happened to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

/// A change notification delivered to watchers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceWatchEvent {
    /// Created, updated or deleted
    pub kind: EventKind,

    /// Collection coordinates of the resource
    pub reference: ResourceReference,

    /// Snapshot of the resource after the write (before, for deletes)
    pub resource: Resource,
}

/// Filter a watcher subscribes with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchFilter {
    pub group: String,
    pub version: String,
    pub plural: String,

    /// Restrict to one namespace; `None` spans all of them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Every selector must hold for an event to be delivered
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selectors: Vec<LabelSelector>,
}

impl WatchFilter {
    /// Watch a whole collection
    pub fn collection(
        group: impl Into<String>,
        version: impl Into<String>,
        plural: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            plural: plural.into(),
            namespace: None,
            selectors: Vec::new(),
        }
    }

    /// Restrict to a namespace
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Add a label selector
    pub fn with_selector(mut self, selector: LabelSelector) -> Self {
        self.selectors.push(selector);
        self
    }

    /// Whether an event passes this filter
    pub fn matches(&self, event: &ResourceWatchEvent) -> bool {
        let reference = &event.reference;
        if reference.group != self.group
            || reference.version != self.version
            || reference.plural != self.plural
        {
            return false;
        }
        if let Some(namespace) = &self.namespace {
            if reference.namespace.as_deref() != Some(namespace.as_str()) {
                return false;
            }
        }
        matches_all(&self.selectors, &event.resource.metadata.labels)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    origin: String,
    event: ResourceWatchEvent,
}

struct Watcher {
    id: u64,
    filter: WatchFilter,
    sender: mpsc::UnboundedSender<ResourceWatchEvent>,
}

type WatcherSet = Arc<Mutex<Vec<Watcher>>>;

/// Fan-out point for resource change events
///
/// One hub per process; stores publish into it, watchers subscribe out of
/// it, and the shared bus carries events between replicas.
pub struct EventHub {
    instance_id: String,
    outbound: mpsc::UnboundedSender<ResourceWatchEvent>,
    watchers: WatcherSet,
    next_watcher_id: AtomicU64,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl EventHub {
    /// Start the hub's background tasks and return it
    ///
    /// `instance_id` tags outbound envelopes; inbound envelopes carrying the
    /// same tag are dropped so local events are not delivered twice. The
    /// bus subscription is established before this returns, so events
    /// published afterwards reach every already-started replica.
    pub async fn start(instance_id: impl Into<String>, bus: Arc<dyn MessageBus>) -> Arc<Self> {
        let instance_id = instance_id.into();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ResourceWatchEvent>();
        let watchers: WatcherSet = Arc::new(Mutex::new(Vec::new()));

        let subscription = match bus.subscribe(EVENTS_TOPIC).await {
            Ok(stream) => Some(stream),
            Err(e) => {
                tracing::warn!(error = %e, "failed to subscribe to shared channel");
                None
            }
        };

        let drain_watchers = Arc::clone(&watchers);
        let origin = instance_id.clone();
        let drain = tokio::spawn(async move {
            while let Some(event) = outbound_rx.recv().await {
                dispatch(&drain_watchers, &event);
                match serde_json::to_vec(&Envelope {
                    origin: origin.clone(),
                    event,
                }) {
                    Ok(payload) => {
                        if let Err(e) = bus.publish(EVENTS_TOPIC, payload).await {
                            tracing::warn!(error = %e, "failed to publish event to shared channel");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to serialize event envelope"),
                }
            }
        });

        let inbound_watchers = Arc::clone(&watchers);
        let local = instance_id.clone();
        let inbound = tokio::spawn(async move {
            let Some(mut stream) = subscription else {
                return;
            };
            while let Some(payload) = stream.next().await {
                let envelope: Envelope = match serde_json::from_slice(&payload) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping malformed event envelope");
                        continue;
                    }
                };
                if envelope.origin == local {
                    continue;
                }
                dispatch(&inbound_watchers, &envelope.event);
            }
        });

        Arc::new(Self {
            instance_id,
            outbound,
            watchers,
            next_watcher_id: AtomicU64::new(0),
            tasks: vec![drain, inbound],
        })
    }

    /// This replica's identity tag
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Queue an event for distribution; never blocks the writer
    pub fn publish(&self, event: ResourceWatchEvent) {
        // The receiver lives in the drain task; a send failure means the
        // hub is shutting down and the event has nowhere to go.
        let _ = self.outbound.send(event);
    }

    /// Subscribe with a filter; dropping the stream unsubscribes
    pub fn watch(&self, filter: WatchFilter) -> WatchStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.next_watcher_id.fetch_add(1, Ordering::Relaxed);
        self.watchers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Watcher { id, filter, sender });
        WatchStream {
            id,
            watchers: Arc::clone(&self.watchers),
            receiver,
        }
    }

    /// Number of live watchers (diagnostics and tests)
    pub fn watcher_count(&self) -> usize {
        self.watchers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Drop for EventHub {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn dispatch(watchers: &Mutex<Vec<Watcher>>, event: &ResourceWatchEvent) {
    let mut watchers = watchers.lock().unwrap_or_else(|e| e.into_inner());
    watchers.retain(|watcher| {
        if !watcher.filter.matches(event) {
            return true;
        }
        tracing::debug!(watcher = watcher.id, name = %event.reference.name, "dispatching event");
        // A closed receiver means the stream was dropped; prune it
        watcher.sender.send(event.clone()).is_ok()
    });
}

/// Lazy, unbounded, non-restartable stream of watch events
///
/// The stream never completes on its own; dropping it unregisters the
/// watcher promptly.
pub struct WatchStream {
    id: u64,
    watchers: WatcherSet,
    receiver: mpsc::UnboundedReceiver<ResourceWatchEvent>,
}

impl Stream for WatchStream {
    type Item = ResourceWatchEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for WatchStream {
    fn drop(&mut self) {
        self.watchers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|watcher| watcher.id != self.id);
    }
}
