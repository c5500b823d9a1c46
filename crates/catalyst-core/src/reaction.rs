//! Reaction records and their trigger configuration.
//!
//! A stored reaction keeps `trigger`/`action` as raw kind strings with
//! free-form JSON data, exactly as the store hands them over. Decoding into
//! the typed [`Trigger`] (and [`crate::action::Action`]) happens per reaction
//! at use time, so one malformed record never affects the others.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::action::{self, Action};
use crate::bus::EventKind;
use crate::error::{CatalystError, Result};

// ---------------------------------------------------------------------------
// TriggerKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Schedule,
    Webhook,
    Hook,
}

impl TriggerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerKind::Schedule => "schedule",
            TriggerKind::Webhook => "webhook",
            TriggerKind::Hook => "hook",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TriggerKind {
    type Err = CatalystError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "schedule" => Ok(TriggerKind::Schedule),
            "webhook" => Ok(TriggerKind::Webhook),
            "hook" => Ok(TriggerKind::Hook),
            other => Err(CatalystError::UnknownTrigger(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Trigger data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleTrigger {
    pub expression: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookTrigger {
    /// Empty means unauthenticated access is allowed.
    #[serde(default)]
    pub token: String,
    pub path: String,
}

impl WebhookTrigger {
    /// Check an `Authorization` header value against the configured token.
    pub fn authorizes(&self, authorization: Option<&str>) -> bool {
        if self.token.is_empty() {
            return true;
        }
        authorization
            .and_then(|h| h.strip_prefix("Bearer "))
            .is_some_and(|t| t == self.token)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookTrigger {
    #[serde(default)]
    pub collections: Vec<String>,
    /// Event names; values other than create, update and delete never match.
    #[serde(default)]
    pub events: Vec<String>,
}

impl HookTrigger {
    pub fn matches(&self, collection: &str, event: EventKind) -> bool {
        self.collections.iter().any(|c| c == collection)
            && self.events.iter().any(|e| e == event.as_str())
    }
}

/// Decoded trigger configuration, one variant per trigger kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Schedule(ScheduleTrigger),
    Webhook(WebhookTrigger),
    Hook(HookTrigger),
}

impl Trigger {
    pub fn decode(kind: &str, data: &serde_json::Value) -> Result<Self> {
        match kind.parse::<TriggerKind>()? {
            TriggerKind::Schedule => decode_data(kind, data).map(Trigger::Schedule),
            TriggerKind::Webhook => decode_data(kind, data).map(Trigger::Webhook),
            TriggerKind::Hook => decode_data(kind, data).map(Trigger::Hook),
        }
    }
}

pub(crate) fn decode_data<T: DeserializeOwned>(kind: &str, data: &serde_json::Value) -> Result<T> {
    T::deserialize(data).map_err(|source| CatalystError::Decode {
        kind: kind.to_string(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Reaction
// ---------------------------------------------------------------------------

/// A stored trigger + action pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub id: String,
    pub name: String,
    pub trigger: String,
    #[serde(alias = "triggerdata", default)]
    pub trigger_data: serde_json::Value,
    pub action: String,
    #[serde(alias = "actiondata", default)]
    pub action_data: serde_json::Value,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Reaction {
    pub fn is_trigger(&self, kind: TriggerKind) -> bool {
        self.trigger == kind.as_str()
    }

    /// Decode the trigger data as a specific kind's schema.
    pub fn trigger_as<T: DeserializeOwned>(&self, kind: TriggerKind) -> Result<T> {
        if !self.is_trigger(kind) {
            return Err(CatalystError::UnknownTrigger(self.trigger.clone()));
        }
        decode_data(&self.trigger, &self.trigger_data)
    }

    pub fn decode_action(&self) -> Result<Action> {
        action::decode(&self.action, &self.action_data)
    }
}

/// The user-supplied part of a reaction, before id and timestamps exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReaction {
    pub name: String,
    pub trigger: String,
    #[serde(alias = "triggerdata", default)]
    pub trigger_data: serde_json::Value,
    pub action: String,
    #[serde(alias = "actiondata", default)]
    pub action_data: serde_json::Value,
}

impl NewReaction {
    /// Fail unless both trigger and action decode into their schemas.
    pub fn validate(&self) -> Result<()> {
        Trigger::decode(&self.trigger, &self.trigger_data)?;
        action::decode(&self.action, &self.action_data)?;
        Ok(())
    }

    pub fn into_reaction(self, id: impl Into<String>, now: DateTime<Utc>) -> Reaction {
        Reaction {
            id: id.into(),
            name: self.name,
            trigger: self.trigger,
            trigger_data: self.trigger_data,
            action: self.action,
            action_data: self.action_data,
            created: now,
            updated: now,
        }
    }
}
