//! In-process record-lifecycle bus.
//!
//! Every create/update/delete on a managed entity is published here after it
//! has been committed. Subscribers receive the event together with an
//! [`EventContext`] describing who performed the mutation.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::CatalystError;

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

impl EventKind {
    pub fn all() -> &'static [EventKind] {
        &[EventKind::Create, EventKind::Update, EventKind::Delete]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = CatalystError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(EventKind::Create),
            "update" => Ok(EventKind::Update),
            "delete" => Ok(EventKind::Delete),
            other => Err(CatalystError::UnknownEvent(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// User / EventContext
// ---------------------------------------------------------------------------

/// The authenticated principal behind a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Ambient information travelling with a published event.
#[derive(Debug, Clone, Default)]
pub struct EventContext {
    user: Option<User>,
}

impl EventContext {
    /// A context with no acting user (system-initiated mutation).
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_user(user: User) -> Self {
        Self { user: Some(user) }
    }

    /// Resolve the acting user, if any.
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }
}

// ---------------------------------------------------------------------------
// RecordEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RecordEvent {
    pub kind: EventKind,
    pub collection: String,
    pub record: serde_json::Value,
}

impl RecordEvent {
    pub fn new(kind: EventKind, collection: impl Into<String>, record: serde_json::Value) -> Self {
        Self {
            kind,
            collection: collection.into(),
            record,
        }
    }
}

// ---------------------------------------------------------------------------
// LifecycleBus
// ---------------------------------------------------------------------------

type Subscriber = Arc<dyn Fn(EventContext, RecordEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Publish/subscribe channel for record-lifecycle events.
///
/// Cloning the bus yields a handle to the same subscriber list.
#[derive(Clone, Default)]
pub struct LifecycleBus {
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
}

impl LifecycleBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F, Fut>(&self, handler: F)
    where
        F: Fn(EventContext, RecordEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let subscriber: Subscriber = Arc::new(
            move |ctx: EventContext, event: RecordEvent| -> BoxFuture<'static, ()> {
                Box::pin(handler(ctx, event))
            },
        );
        if let Ok(mut subs) = self.subscribers.write() {
            subs.push(subscriber);
        }
    }

    /// Deliver `event` to every subscriber, in subscription order.
    pub async fn publish(&self, ctx: &EventContext, event: RecordEvent) {
        let subs: Vec<Subscriber> = match self.subscribers.read() {
            Ok(subs) => subs.clone(),
            Err(_) => return,
        };
        for sub in subs {
            sub(ctx.clone(), event.clone()).await;
        }
    }
}
