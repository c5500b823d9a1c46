//! Cron-driven reaction execution.
//!
//! The [`Scheduler`] keeps exactly one background job per registered
//! schedule reaction, keyed by reaction id. Each job sleeps until the next
//! cron occurrence and spawns an independent run with an empty `{}`
//! payload, so overlapping ticks of the same reaction are allowed. Run
//! failures are logged and never stop the job.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use croner::Cron;
use tokio::task::JoinHandle;

use crate::action::ActionRunner;
use crate::error::{CatalystError, Result};
use crate::reaction::{Reaction, ScheduleTrigger, TriggerKind};
use crate::store::ReactionStore;

/// Payload handed to actions on every schedule tick.
pub const TICK_PAYLOAD: &str = "{}";

/// Parse a 5-field cron expression; a leading seconds field is also accepted.
pub fn parse_expression(expression: &str) -> Result<Cron> {
    Cron::new(expression)
        .with_seconds_optional()
        .parse()
        .map_err(|e| CatalystError::InvalidSchedule {
            expression: expression.to_string(),
            reason: e.to_string(),
        })
}

// ---------------------------------------------------------------------------
// LoadReport
// ---------------------------------------------------------------------------

/// Outcome of loading every schedule reaction from the store.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub registered: Vec<String>,
    pub failed: Vec<(String, CatalystError)>,
}

impl LoadReport {
    /// Collapse the failures into one aggregate error, if there were any.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.failed.is_empty() {
            return Ok(self.registered);
        }
        Err(CatalystError::ScheduleLoad(
            self.failed
                .iter()
                .map(|(id, e)| format!("{id}: {e}"))
                .collect(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler {
    runner: Arc<ActionRunner>,
    jobs: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(runner: Arc<ActionRunner>) -> Self {
        Self {
            runner,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Register every schedule reaction in `store`, continuing past failures.
    ///
    /// Only a failure to read the store itself is returned as an error.
    pub fn load_jobs(&self, store: &dyn ReactionStore) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        for reaction in store.list_by_trigger(TriggerKind::Schedule)? {
            match self.add_reaction(&reaction) {
                Ok(()) => report.registered.push(reaction.id),
                Err(e) => {
                    tracing::warn!(reaction_id = %reaction.id, error = %e, "failed to schedule reaction");
                    report.failed.push((reaction.id, e));
                }
            }
        }
        Ok(report)
    }

    /// Start (or restart) the job for a schedule reaction.
    ///
    /// Any existing job for the same id is replaced. Must be called from
    /// within a Tokio runtime.
    pub fn add_reaction(&self, reaction: &Reaction) -> Result<()> {
        let trigger: ScheduleTrigger = reaction.trigger_as(TriggerKind::Schedule)?;
        let cron = parse_expression(&trigger.expression)?;

        let job = tokio::spawn(run_job(self.runner.clone(), reaction.clone(), cron));
        let previous = self
            .jobs
            .lock()
            .map_err(|_| CatalystError::Store("scheduler registry poisoned".into()))?
            .insert(reaction.id.clone(), job);
        if let Some(previous) = previous {
            previous.abort();
        }

        tracing::info!(
            reaction_id = %reaction.id,
            expression = %trigger.expression,
            "schedule registered"
        );
        Ok(())
    }

    /// Stop the job for `id`. Unknown ids are ignored.
    pub fn remove_reaction(&self, id: &str) {
        let removed = self.jobs.lock().ok().and_then(|mut jobs| jobs.remove(id));
        if let Some(job) = removed {
            job.abort();
            tracing::info!(reaction_id = %id, "schedule removed");
        }
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.jobs
            .lock()
            .map(|jobs| jobs.contains_key(id))
            .unwrap_or(false)
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().map(|jobs| jobs.len()).unwrap_or(0)
    }

    /// Stop every job.
    pub fn shutdown(&self) {
        if let Ok(mut jobs) = self.jobs.lock() {
            for (_, job) in jobs.drain() {
                job.abort();
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_job(runner: Arc<ActionRunner>, reaction: Reaction, cron: Cron) {
    let reaction = Arc::new(reaction);
    let mut cursor = Utc::now();
    loop {
        let next = match cron.find_next_occurrence(&cursor, false) {
            Ok(next) => next,
            Err(e) => {
                tracing::error!(reaction_id = %reaction.id, error = %e, "no further schedule occurrence");
                return;
            }
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        let runner = runner.clone();
        let tick = reaction.clone();
        tokio::spawn(async move {
            if let Err(e) = runner.run_reaction(&tick, TICK_PAYLOAD).await {
                tracing::error!(reaction_id = %tick.id, error = %e, "scheduled reaction failed");
            }
        });

        cursor = next.max(Utc::now());
    }
}
