//! Live fan-out of ingested entries to connected subscribers.
//!
//! This module provides:
//! - [`Deliverable`]: The send capability a transport hands to the hub
//! - [`BroadcastHub`]: Subscriber registry with per-subscriber filters
//! - [`ServerMessage`] / [`ClientMessage`]: The JSON frames exchanged with subscribers
//!
//! The hub never sees sockets. Each subscriber is an `Arc<dyn Deliverable>`
//! and delivery failures stay local to that subscriber.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::{LogEntry, LogLevel, contains_ignore_case};

/// Message sent to a subscriber whose frame could not be understood.
pub const PROCESS_ERROR_MESSAGE: &str = "Failed to process message";

/// Why a frame could not be handed to a subscriber.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The subscriber's channel is gone.
    #[error("subscriber channel closed")]
    Closed,
    /// Any other transport failure.
    #[error("delivery failed: {0}")]
    Failed(String),
}

/// Capability to push one text frame to one subscriber.
pub trait Deliverable: Send + Sync {
    /// Sends a serialized frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscriber can no longer receive frames.
    fn send(&self, frame: &str) -> Result<(), DeliveryError>;
}

/// Identifier of a connected subscriber. Never reused within a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Returns the numeric part of the id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Live-feed filter chosen by a subscriber. Empty means everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberFilter {
    /// Exact level match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
    /// Case-insensitive substring of the subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl SubscriberFilter {
    /// Returns true if `entry` passes this filter.
    #[must_use]
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if self.level.is_some_and(|level| level != entry.level) {
            return false;
        }
        match self.subject.as_deref() {
            Some(subject) => contains_ignore_case(&entry.subject, subject),
            None => true,
        }
    }
}

/// Frames sent from the hub to a subscriber.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ServerMessage<'a> {
    /// Greeting sent on connect.
    Connected {
        /// Rendered subscriber id
        #[serde(rename = "clientId")]
        client_id: String,
    },
    /// Acknowledges a subscribe with the effective filter.
    Subscribed {
        /// Filter now in force
        filters: &'a SubscriberFilter,
    },
    /// Acknowledges an unsubscribe.
    Unsubscribed,
    /// A newly ingested entry.
    Log(&'a LogEntry),
    /// A frame from the subscriber could not be processed.
    Error {
        /// Human-readable reason
        message: &'a str,
    },
}

/// Frames a subscriber may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Sets the live filter. Without `filters` the current filter is kept.
    Subscribe {
        /// New filter
        #[serde(default)]
        filters: Option<SubscriberFilter>,
    },
    /// Clears the live filter.
    Unsubscribe,
}

struct Subscriber {
    sink: Arc<dyn Deliverable>,
    filter: SubscriberFilter,
}

/// Registry of live subscribers.
pub struct BroadcastHub {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<SubscriberId, Subscriber>>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("active", &self.active_count())
            .finish_non_exhaustive()
    }
}

impl BroadcastHub {
    /// Creates an empty hub. The first subscriber is `client-1`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Greets a new subscriber, then registers it with no filter.
    ///
    /// The greeting goes out before registration so a concurrent broadcast
    /// can never reach the subscriber ahead of it.
    pub fn on_connect(&self, sink: Arc<dyn Deliverable>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        deliver(
            id,
            sink.as_ref(),
            &ServerMessage::Connected {
                client_id: id.to_string(),
            },
        );

        self.subscribers.write().insert(
            id,
            Subscriber {
                sink,
                filter: SubscriberFilter::default(),
            },
        );
        info!(subscriber_id = %id, "Subscriber connected");
        id
    }

    /// Sets the filter of `id` and acknowledges with the effective filter.
    ///
    /// `None` keeps the current filter. Returns false for an unknown id.
    pub fn on_subscribe(&self, id: SubscriberId, filter: Option<SubscriberFilter>) -> bool {
        let (sink, effective) = {
            let mut subscribers = self.subscribers.write();
            let Some(subscriber) = subscribers.get_mut(&id) else {
                return false;
            };
            if let Some(filter) = filter {
                subscriber.filter = filter;
            }
            (Arc::clone(&subscriber.sink), subscriber.filter.clone())
        };
        debug!(subscriber_id = %id, filter = ?effective, "Subscriber filter set");

        deliver(
            id,
            sink.as_ref(),
            &ServerMessage::Subscribed {
                filters: &effective,
            },
        );
        true
    }

    /// Clears the filter of `id` and acknowledges. Returns false for an unknown id.
    pub fn on_unsubscribe(&self, id: SubscriberId) -> bool {
        let sink = {
            let mut subscribers = self.subscribers.write();
            let Some(subscriber) = subscribers.get_mut(&id) else {
                return false;
            };
            subscriber.filter = SubscriberFilter::default();
            Arc::clone(&subscriber.sink)
        };
        debug!(subscriber_id = %id, "Subscriber filter cleared");

        deliver(id, sink.as_ref(), &ServerMessage::Unsubscribed);
        true
    }

    /// Removes `id`. Returns false if it was already gone.
    pub fn on_disconnect(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.write().remove(&id).is_some();
        if removed {
            info!(subscriber_id = %id, "Subscriber disconnected");
        }
        removed
    }

    /// Handles a raw text frame from `id`.
    ///
    /// Frames that do not parse as a [`ClientMessage`] are answered with an
    /// error frame; the subscriber stays connected.
    pub fn on_message(&self, id: SubscriberId, raw: &str) {
        match serde_json::from_str::<ClientMessage>(raw) {
            Ok(ClientMessage::Subscribe { filters }) => {
                self.on_subscribe(id, filters);
            }
            Ok(ClientMessage::Unsubscribe) => {
                self.on_unsubscribe(id);
            }
            Err(e) => {
                warn!(subscriber_id = %id, error = %e, "Failed to process subscriber message");
                let sink = self
                    .subscribers
                    .read()
                    .get(&id)
                    .map(|s| Arc::clone(&s.sink));
                if let Some(sink) = sink {
                    deliver(
                        id,
                        sink.as_ref(),
                        &ServerMessage::Error {
                            message: PROCESS_ERROR_MESSAGE,
                        },
                    );
                }
            }
        }
    }

    /// Sends `entry` to every subscriber whose filter accepts it.
    ///
    /// Works on a snapshot of the registry. Returns the number of successful
    /// deliveries.
    pub fn broadcast(&self, entry: &LogEntry) -> usize {
        let targets: Vec<(SubscriberId, Arc<dyn Deliverable>)> = self
            .subscribers
            .read()
            .iter()
            .filter(|(_, s)| s.filter.matches(entry))
            .map(|(id, s)| (*id, Arc::clone(&s.sink)))
            .collect();
        if targets.is_empty() {
            return 0;
        }

        let frame = match serde_json::to_string(&ServerMessage::Log(entry)) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(event_id = %entry.event_id, error = %e, "Failed to serialize log frame");
                return 0;
            }
        };

        targets
            .into_iter()
            .filter(|(id, sink)| match sink.send(&frame) {
                Ok(()) => true,
                Err(e) => {
                    debug!(subscriber_id = %id, error = %e, "Broadcast delivery failed");
                    false
                }
            })
            .count()
    }

    /// Returns the number of connected subscribers.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

fn deliver(id: SubscriberId, sink: &dyn Deliverable, message: &ServerMessage<'_>) {
    match serde_json::to_string(message) {
        Ok(frame) => {
            if let Err(e) = sink.send(&frame) {
                debug!(subscriber_id = %id, error = %e, "Delivery failed");
            }
        }
        Err(e) => warn!(subscriber_id = %id, error = %e, "Failed to serialize frame"),
    }
}
