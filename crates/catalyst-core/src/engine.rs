//! Wiring of the reaction engine.
//!
//! [`Engine`] owns one instance of every component and hands out shared
//! references. Nothing is global: tests build as many engines as they need.

use std::sync::Arc;

use crate::action::{ActionRunner, StaticToken, TokenSource};
use crate::bus::LifecycleBus;
use crate::config::Config;
use crate::error::Result;
use crate::hook::HookDispatcher;
use crate::pool::TaskPool;
use crate::reaction::{Reaction, TriggerKind, WebhookTrigger};
use crate::schedule::{LoadReport, Scheduler};
use crate::service::ReactionService;
use crate::store::ReactionStore;

pub struct Engine {
    config: Config,
    store: Arc<dyn ReactionStore>,
    runner: Arc<ActionRunner>,
    scheduler: Arc<Scheduler>,
    pool: Arc<TaskPool>,
    bus: LifecycleBus,
    service: ReactionService,
}

impl Engine {
    /// Build an engine whose Python actions receive `config.api_token`.
    ///
    /// Without a configured token a random one is generated for this process.
    /// Must be called from within a Tokio runtime.
    pub fn new(config: Config, store: Arc<dyn ReactionStore>) -> Self {
        let token = config.api_token_or_ephemeral();
        Self::with_tokens(config, store, Arc::new(StaticToken::new(token)))
    }

    pub fn with_tokens(config: Config, store: Arc<dyn ReactionStore>, tokens: Arc<dyn TokenSource>) -> Self {
        let runner = Arc::new(ActionRunner::from_config(&config, tokens));
        let scheduler = Arc::new(Scheduler::new(runner.clone()));
        let pool = Arc::new(TaskPool::new(
            config.dispatch.mode,
            config.dispatch.workers,
            config.dispatch.queue,
        ));

        let bus = LifecycleBus::new();
        let hooks = Arc::new(HookDispatcher::new(store.clone(), runner.clone(), pool.clone()));
        hooks.bind(&bus);

        let service = ReactionService::new(store.clone(), scheduler.clone(), bus.clone());

        Self {
            config,
            store,
            runner,
            scheduler,
            pool,
            bus,
            service,
        }
    }

    /// Register schedule jobs for every stored schedule reaction.
    pub fn start(&self) -> Result<LoadReport> {
        let report = self.scheduler.load_jobs(self.store.as_ref())?;
        tracing::info!(
            registered = report.registered.len(),
            failed = report.failed.len(),
            "schedule jobs loaded"
        );
        Ok(report)
    }

    /// Stop all schedule jobs and drain pending hook dispatches.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown();
        self.pool.shutdown().await;
    }

    /// The earliest-created webhook reaction registered for `path`.
    ///
    /// Reactions whose trigger data does not decode are skipped.
    pub fn resolve_webhook(&self, path: &str) -> Result<Option<(Reaction, WebhookTrigger)>> {
        for reaction in self.store.list_by_trigger(TriggerKind::Webhook)? {
            match reaction.trigger_as::<WebhookTrigger>(TriggerKind::Webhook) {
                Ok(trigger) if trigger.path == path => return Ok(Some((reaction, trigger))),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(reaction_id = %reaction.id, error = %e, "skipping webhook reaction");
                }
            }
        }
        Ok(None)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ReactionStore> {
        &self.store
    }

    pub fn runner(&self) -> &Arc<ActionRunner> {
        &self.runner
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn bus(&self) -> &LifecycleBus {
        &self.bus
    }

    pub fn service(&self) -> &ReactionService {
        &self.service
    }
}
