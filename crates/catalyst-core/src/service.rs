//! Write path for reactions.
//!
//! [`ReactionService`] is what an API layer calls to change reactions. Each
//! mutation is committed to the store first, then mirrored into the
//! [`Scheduler`] and finally published on the lifecycle bus under the
//! `reactions` collection.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::bus::{EventContext, EventKind, LifecycleBus, RecordEvent};
use crate::error::Result;
use crate::reaction::{decode_data, NewReaction, Reaction, ScheduleTrigger, TriggerKind, WebhookTrigger};
use crate::schedule::{parse_expression, Scheduler};
use crate::store::ReactionStore;

pub const REACTIONS_COLLECTION: &str = "reactions";

pub struct ReactionService {
    store: Arc<dyn ReactionStore>,
    scheduler: Arc<Scheduler>,
    bus: LifecycleBus,
}

impl ReactionService {
    pub fn new(store: Arc<dyn ReactionStore>, scheduler: Arc<Scheduler>, bus: LifecycleBus) -> Self {
        Self { store, scheduler, bus }
    }

    pub fn list(&self) -> Result<Vec<Reaction>> {
        self.store.list()
    }

    pub fn get(&self, id: &str) -> Result<Reaction> {
        self.store.get(id)
    }

    pub async fn create(&self, ctx: &EventContext, new: NewReaction) -> Result<Reaction> {
        check(&new)?;
        let reaction = new.into_reaction(Uuid::new_v4().to_string(), Utc::now());
        self.warn_on_duplicate_path(&reaction);
        self.store.insert(&reaction)?;
        self.sync_schedule(&reaction);
        tracing::info!(reaction_id = %reaction.id, trigger = %reaction.trigger, "reaction created");
        self.publish(ctx, EventKind::Create, &reaction).await;
        Ok(reaction)
    }

    pub async fn update(&self, ctx: &EventContext, id: &str, new: NewReaction) -> Result<Reaction> {
        check(&new)?;
        let existing = self.store.get(id)?;
        let mut reaction = new.into_reaction(id, existing.created);
        reaction.updated = Utc::now();
        self.warn_on_duplicate_path(&reaction);
        self.store.update(&reaction)?;
        self.sync_schedule(&reaction);
        tracing::info!(reaction_id = %reaction.id, trigger = %reaction.trigger, "reaction updated");
        self.publish(ctx, EventKind::Update, &reaction).await;
        Ok(reaction)
    }

    pub async fn delete(&self, ctx: &EventContext, id: &str) -> Result<Reaction> {
        let removed = self.store.delete(id)?;
        self.scheduler.remove_reaction(id);
        tracing::info!(reaction_id = %id, "reaction deleted");
        self.publish(ctx, EventKind::Delete, &removed).await;
        Ok(removed)
    }

    /// Remove any running job, then register one if the reaction is scheduled.
    fn sync_schedule(&self, reaction: &Reaction) {
        self.scheduler.remove_reaction(&reaction.id);
        if reaction.is_trigger(TriggerKind::Schedule) {
            if let Err(e) = self.scheduler.add_reaction(reaction) {
                tracing::error!(reaction_id = %reaction.id, error = %e, "failed to schedule reaction");
            }
        }
    }

    fn warn_on_duplicate_path(&self, reaction: &Reaction) {
        let Ok(trigger) = reaction.trigger_as::<WebhookTrigger>(TriggerKind::Webhook) else {
            return;
        };
        let Ok(webhooks) = self.store.list_by_trigger(TriggerKind::Webhook) else {
            return;
        };
        let shadowing = webhooks.iter().find(|other| {
            other.id != reaction.id
                && other
                    .trigger_as::<WebhookTrigger>(TriggerKind::Webhook)
                    .is_ok_and(|t| t.path == trigger.path)
        });
        if let Some(other) = shadowing {
            tracing::warn!(
                reaction_id = %reaction.id,
                other_id = %other.id,
                path = %trigger.path,
                "webhook path already used; the earliest-created reaction receives requests"
            );
        }
    }

    async fn publish(&self, ctx: &EventContext, kind: EventKind, reaction: &Reaction) {
        match serde_json::to_value(reaction) {
            Ok(record) => {
                self.bus
                    .publish(ctx, RecordEvent::new(kind, REACTIONS_COLLECTION, record))
                    .await
            }
            Err(e) => tracing::error!(reaction_id = %reaction.id, error = %e, "failed to encode reaction event"),
        }
    }
}

/// Decode trigger and action, and parse the cron expression of schedules.
fn check(new: &NewReaction) -> Result<()> {
    new.validate()?;
    if new.trigger == TriggerKind::Schedule.as_str() {
        let trigger: ScheduleTrigger = decode_data(&new.trigger, &new.trigger_data)?;
        parse_expression(&trigger.expression)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionRunner, StaticToken};
    use crate::error::CatalystError;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Mutex;

    struct Fixture {
        service: ReactionService,
        scheduler: Arc<Scheduler>,
        events: Arc<Mutex<Vec<(EventKind, String)>>>,
    }

    fn fixture() -> Fixture {
        let runner = Arc::new(ActionRunner::new("http://app.test", Arc::new(StaticToken::new("tok"))));
        let scheduler = Arc::new(Scheduler::new(runner));
        let bus = LifecycleBus::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let seen = events.clone();
        bus.subscribe(move |_ctx, event| {
            let seen = seen.clone();
            async move {
                let id = event.record["id"].as_str().unwrap_or_default().to_string();
                seen.lock().unwrap().push((event.kind, id));
            }
        });
        Fixture {
            service: ReactionService::new(Arc::new(MemoryStore::new()), scheduler.clone(), bus),
            scheduler,
            events,
        }
    }

    fn schedule(expression: &str) -> NewReaction {
        NewReaction {
            name: "nightly".into(),
            trigger: "schedule".into(),
            trigger_data: json!({"expression": expression}),
            action: "webhook".into(),
            action_data: json!({"url": "http://localhost/"}),
        }
    }

    fn webhook(path: &str) -> NewReaction {
        NewReaction {
            name: "ingest".into(),
            trigger: "webhook".into(),
            trigger_data: json!({"path": path}),
            action: "webhook".into(),
            action_data: json!({"url": "http://localhost/"}),
        }
    }

    #[tokio::test]
    async fn create_registers_schedule_and_publishes() {
        let f = fixture();
        let ctx = EventContext::anonymous();
        let r = f.service.create(&ctx, schedule("0 0 1 1 *")).await.unwrap();
        assert!(f.scheduler.is_registered(&r.id));
        assert_eq!(f.service.get(&r.id).unwrap(), r);
        assert_eq!(*f.events.lock().unwrap(), vec![(EventKind::Create, r.id.clone())]);
    }

    #[tokio::test]
    async fn create_rejects_invalid_reaction() {
        let f = fixture();
        let mut bad = webhook("p");
        bad.action = "email".into();
        let err = f.service.create(&EventContext::anonymous(), bad).await.unwrap_err();
        assert!(matches!(err, CatalystError::UnknownAction(_)));
        assert!(f.service.list().unwrap().is_empty());
        assert!(f.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_moves_reaction_out_of_and_into_the_scheduler() {
        let f = fixture();
        let ctx = EventContext::anonymous();
        let r = f.service.create(&ctx, schedule("0 0 1 1 *")).await.unwrap();

        let updated = f.service.update(&ctx, &r.id, webhook("p")).await.unwrap();
        assert!(!f.scheduler.is_registered(&r.id));
        assert_eq!(updated.created, r.created);
        assert!(updated.updated >= r.updated);

        f.service.update(&ctx, &r.id, schedule("0 12 * * *")).await.unwrap();
        assert!(f.scheduler.is_registered(&r.id));
        assert_eq!(f.scheduler.job_count(), 1);
    }

    #[tokio::test]
    async fn create_rejects_invalid_cron_expression() {
        let f = fixture();
        let err = f
            .service
            .create(&EventContext::anonymous(), schedule("whenever"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalystError::InvalidSchedule { .. }));
        assert!(f.service.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_unknown_reaction_fails() {
        let f = fixture();
        let err = f
            .service
            .update(&EventContext::anonymous(), "missing", webhook("p"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalystError::ReactionNotFound(_)));
    }

    #[tokio::test]
    async fn delete_unregisters_and_publishes() {
        let f = fixture();
        let ctx = EventContext::anonymous();
        let r = f.service.create(&ctx, schedule("0 0 1 1 *")).await.unwrap();
        f.service.delete(&ctx, &r.id).await.unwrap();

        assert!(!f.scheduler.is_registered(&r.id));
        assert!(f.service.list().unwrap().is_empty());
        let kinds: Vec<EventKind> = f.events.lock().unwrap().iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, [EventKind::Create, EventKind::Delete]);
    }

    #[tokio::test]
    async fn duplicate_webhook_paths_are_allowed() {
        let f = fixture();
        let ctx = EventContext::anonymous();
        f.service.create(&ctx, webhook("same")).await.unwrap();
        f.service.create(&ctx, webhook("same")).await.unwrap();
        assert_eq!(f.service.list().unwrap().len(), 2);
    }
}
