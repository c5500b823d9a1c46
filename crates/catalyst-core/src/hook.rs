//! Record-lifecycle hook dispatch.
//!
//! Subscribed to the [`LifecycleBus`], the dispatcher runs every hook
//! reaction whose collections and events match a published event. Runs go
//! through the [`TaskPool`], so in pool mode the mutation that produced the
//! event never waits on or observes the reaction outcome.

use std::sync::Arc;

use serde::Serialize;

use crate::action::ActionRunner;
use crate::bus::{EventContext, EventKind, LifecycleBus, RecordEvent, User};
use crate::error::Result;
use crate::pool::TaskPool;
use crate::reaction::{HookTrigger, Reaction, TriggerKind};
use crate::store::ReactionStore;

/// JSON payload handed to hook-triggered actions.
#[derive(Debug, Serialize)]
pub struct HookPayload<'a> {
    pub action: EventKind,
    pub collection: &'a str,
    pub record: &'a serde_json::Value,
    pub auth: &'a User,
    pub admin: Option<serde_json::Value>,
}

pub struct HookDispatcher {
    store: Arc<dyn ReactionStore>,
    runner: Arc<ActionRunner>,
    pool: Arc<TaskPool>,
}

impl HookDispatcher {
    pub fn new(store: Arc<dyn ReactionStore>, runner: Arc<ActionRunner>, pool: Arc<TaskPool>) -> Self {
        Self { store, runner, pool }
    }

    /// Subscribe this dispatcher to `bus`.
    pub fn bind(self: &Arc<Self>, bus: &LifecycleBus) {
        let dispatcher = Arc::clone(self);
        bus.subscribe(move |ctx, event| {
            let dispatcher = dispatcher.clone();
            async move { dispatcher.handle(ctx, event).await }
        });
    }

    pub async fn handle(&self, ctx: EventContext, event: RecordEvent) {
        let Some(user) = ctx.user() else {
            tracing::warn!(
                collection = %event.collection,
                event = %event.kind,
                "dropping lifecycle event without acting user"
            );
            return;
        };

        let matches = match self.find_matches(&event.collection, event.kind) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::error!(collection = %event.collection, error = %e, "failed to list hook reactions");
                return;
            }
        };
        if matches.is_empty() {
            return;
        }

        let payload = HookPayload {
            action: event.kind,
            collection: &event.collection,
            record: &event.record,
            auth: user,
            admin: None,
        };
        let payload = match serde_json::to_string(&payload) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(collection = %event.collection, error = %e, "failed to encode hook payload");
                return;
            }
        };

        for reaction in matches {
            let runner = self.runner.clone();
            let payload = payload.clone();
            let reaction_id = reaction.id.clone();
            let job = async move {
                if let Err(e) = runner.run_reaction(&reaction, &payload).await {
                    tracing::error!(reaction_id = %reaction.id, error = %e, "hook reaction failed");
                }
            };
            if let Err(e) = self.pool.submit(job).await {
                tracing::warn!(reaction_id = %reaction_id, error = %e, "hook reaction not dispatched");
            }
        }
    }

    /// Every hook reaction matching `collection` and `event`.
    ///
    /// Reactions with undecodable trigger data are skipped with a warning.
    pub fn find_matches(&self, collection: &str, event: EventKind) -> Result<Vec<Reaction>> {
        let reactions = self.store.list_by_trigger(TriggerKind::Hook)?;
        Ok(reactions
            .into_iter()
            .filter(|reaction| match reaction.trigger_as::<HookTrigger>(TriggerKind::Hook) {
                Ok(hook) => hook.matches(collection, event),
                Err(e) => {
                    tracing::warn!(reaction_id = %reaction.id, error = %e, "skipping hook reaction");
                    false
                }
            })
            .collect())
    }
}
