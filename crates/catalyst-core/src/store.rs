//! Reaction persistence seam.
//!
//! Triggers only read through [`ReactionStore`]; the write half is used by
//! [`crate::service::ReactionService`]. Every implementation enumerates in
//! ascending `created` order (ties broken by id) so lookups that take the
//! first match, such as webhook path resolution, are deterministic.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{CatalystError, Result};
use crate::reaction::{Reaction, TriggerKind};

pub trait ReactionStore: Send + Sync {
    /// All reactions, oldest first.
    fn list(&self) -> Result<Vec<Reaction>>;

    fn get(&self, id: &str) -> Result<Reaction>;

    fn insert(&self, reaction: &Reaction) -> Result<()>;

    /// Replace an existing reaction with the same id.
    fn update(&self, reaction: &Reaction) -> Result<()>;

    /// Remove a reaction, returning what was stored.
    fn delete(&self, id: &str) -> Result<Reaction>;

    fn list_by_trigger(&self, kind: TriggerKind) -> Result<Vec<Reaction>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|r| r.is_trigger(kind))
            .collect())
    }
}

pub(crate) fn sort_reactions(reactions: &mut [Reaction]) {
    reactions.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Volatile store for tests and embedding.
#[derive(Default)]
pub struct MemoryStore {
    reactions: RwLock<HashMap<String, Reaction>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reactions(reactions: impl IntoIterator<Item = Reaction>) -> Self {
        Self {
            reactions: RwLock::new(reactions.into_iter().map(|r| (r.id.clone(), r)).collect()),
        }
    }
}

fn poisoned<T>(_: T) -> CatalystError {
    CatalystError::Store("memory store lock poisoned".into())
}

impl ReactionStore for MemoryStore {
    fn list(&self) -> Result<Vec<Reaction>> {
        let mut all: Vec<Reaction> = self.reactions.read().map_err(poisoned)?.values().cloned().collect();
        sort_reactions(&mut all);
        Ok(all)
    }

    fn get(&self, id: &str) -> Result<Reaction> {
        self.reactions
            .read()
            .map_err(poisoned)?
            .get(id)
            .cloned()
            .ok_or_else(|| CatalystError::ReactionNotFound(id.to_string()))
    }

    fn insert(&self, reaction: &Reaction) -> Result<()> {
        let mut map = self.reactions.write().map_err(poisoned)?;
        if map.contains_key(&reaction.id) {
            return Err(CatalystError::ReactionExists(reaction.id.clone()));
        }
        map.insert(reaction.id.clone(), reaction.clone());
        Ok(())
    }

    fn update(&self, reaction: &Reaction) -> Result<()> {
        let mut map = self.reactions.write().map_err(poisoned)?;
        match map.get_mut(&reaction.id) {
            Some(slot) => {
                *slot = reaction.clone();
                Ok(())
            }
            None => Err(CatalystError::ReactionNotFound(reaction.id.clone())),
        }
    }

    fn delete(&self, id: &str) -> Result<Reaction> {
        self.reactions
            .write()
            .map_err(poisoned)?
            .remove(id)
            .ok_or_else(|| CatalystError::ReactionNotFound(id.to_string()))
    }
}
