//! Persistent reaction store using redb.
//!
//! # Table design
//!
//! A single `REACTIONS` table keyed by reaction id with the JSON-encoded
//! [`Reaction`] as value. Listing reads the whole table and sorts by
//! creation time; reaction counts are small enough that no secondary index
//! is kept.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::{CatalystError, Result};
use crate::reaction::Reaction;
use crate::store::{sort_reactions, ReactionStore};

// ---------------------------------------------------------------------------
// Table definition
// ---------------------------------------------------------------------------

/// Key: reaction id
/// Value: JSON-encoded Reaction
const REACTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("reactions");

fn db_err(e: impl std::fmt::Display) -> CatalystError {
    CatalystError::Store(e.to_string())
}

// ---------------------------------------------------------------------------
// ReactionDb
// ---------------------------------------------------------------------------

pub struct ReactionDb {
    db: Database,
}

impl ReactionDb {
    /// Open or create the redb database at `path`.
    ///
    /// Creates the `REACTIONS` table if it doesn't already exist.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(db_err)?;
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(REACTIONS).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db })
    }

    fn write(&self, id: &str, value: &[u8], must_exist: bool) -> Result<()> {
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(REACTIONS).map_err(db_err)?;
            let exists = table.get(id).map_err(db_err)?.is_some();
            match (must_exist, exists) {
                (true, false) => return Err(CatalystError::ReactionNotFound(id.to_string())),
                (false, true) => return Err(CatalystError::ReactionExists(id.to_string())),
                _ => {}
            }
            table.insert(id, value).map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }
}

fn decode(bytes: &[u8]) -> Result<Reaction> {
    serde_json::from_slice(bytes).map_err(db_err)
}

impl ReactionStore for ReactionDb {
    fn list(&self) -> Result<Vec<Reaction>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(REACTIONS).map_err(db_err)?;

        let mut result = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (k, v) = entry.map_err(db_err)?;
            match decode(v.value()) {
                Ok(reaction) => result.push(reaction),
                Err(e) => {
                    tracing::warn!(reaction_id = %k.value(), error = %e, "skipping undecodable reaction record");
                }
            }
        }
        sort_reactions(&mut result);
        Ok(result)
    }

    fn get(&self, id: &str) -> Result<Reaction> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(REACTIONS).map_err(db_err)?;
        match table.get(id).map_err(db_err)? {
            Some(v) => decode(v.value()),
            None => Err(CatalystError::ReactionNotFound(id.to_string())),
        }
    }

    fn insert(&self, reaction: &Reaction) -> Result<()> {
        let value = serde_json::to_vec(reaction)?;
        self.write(&reaction.id, &value, false)
    }

    fn update(&self, reaction: &Reaction) -> Result<()> {
        let value = serde_json::to_vec(reaction)?;
        self.write(&reaction.id, &value, true)
    }

    fn delete(&self, id: &str) -> Result<Reaction> {
        let wt = self.db.begin_write().map_err(db_err)?;
        let removed = {
            let mut table = wt.open_table(REACTIONS).map_err(db_err)?;
            let old = table.remove(id).map_err(db_err)?;
            match old {
                Some(v) => decode(v.value())?,
                None => return Err(CatalystError::ReactionNotFound(id.to_string())),
            }
        };
        wt.commit().map_err(db_err)?;
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reaction::TriggerKind;
    use crate::store::fixtures::reaction;
    use serde_json::json;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, ReactionDb) {
        let dir = TempDir::new().unwrap();
        let db = ReactionDb::open(&dir.path().join("reactions.redb")).unwrap();
        (dir, db)
    }

    fn webhook(id: &str, minute: i64, path: &str) -> Reaction {
        reaction(
            id,
            minute,
            "webhook",
            json!({"path": path}),
            json!({"url": "http://localhost"}),
        )
    }

    #[test]
    fn insert_get_and_list_in_creation_order() {
        let (_dir, db) = open_tmp();
        // Ids sort opposite to creation time
        db.insert(&webhook("a-late", 5, "x")).unwrap();
        db.insert(&webhook("z-early", 1, "x")).unwrap();

        assert_eq!(db.get("a-late").unwrap().trigger_data["path"], "x");
        let ids: Vec<String> = db.list().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, ["z-early", "a-late"]);
    }

    #[test]
    fn reopen_preserves_reactions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/reactions.redb");
        {
            let db = ReactionDb::open(&path).unwrap();
            db.insert(&webhook("r1", 0, "p")).unwrap();
        }
        let db = ReactionDb::open(&path).unwrap();
        assert_eq!(db.list_by_trigger(TriggerKind::Webhook).unwrap().len(), 1);
    }

    #[test]
    fn insert_twice_is_rejected() {
        let (_dir, db) = open_tmp();
        db.insert(&webhook("r1", 0, "p")).unwrap();
        assert!(matches!(
            db.insert(&webhook("r1", 0, "p")).unwrap_err(),
            CatalystError::ReactionExists(_)
        ));
    }

    #[test]
    fn update_replaces_and_delete_returns_last_value() {
        let (_dir, db) = open_tmp();
        assert!(matches!(
            db.update(&webhook("r1", 0, "p")).unwrap_err(),
            CatalystError::ReactionNotFound(_)
        ));

        db.insert(&webhook("r1", 0, "p")).unwrap();
        db.update(&webhook("r1", 0, "q")).unwrap();
        assert_eq!(db.get("r1").unwrap().trigger_data["path"], "q");

        let removed = db.delete("r1").unwrap();
        assert_eq!(removed.trigger_data["path"], "q");
        assert!(matches!(
            db.get("r1").unwrap_err(),
            CatalystError::ReactionNotFound(_)
        ));
        assert!(matches!(
            db.delete("r1").unwrap_err(),
            CatalystError::ReactionNotFound(_)
        ));
    }

    #[test]
    fn empty_db_lists_nothing() {
        let (_dir, db) = open_tmp();
        assert!(db.list().unwrap().is_empty());
    }

    #[test]
    fn undecodable_row_does_not_hide_the_others() {
        let (_dir, db) = open_tmp();
        db.insert(&webhook("good", 0, "ingest")).unwrap();
        {
            let wt = db.db.begin_write().unwrap();
            {
                let mut table = wt.open_table(REACTIONS).unwrap();
                let legacy = br#"{"id":"legacy","name":"old","trigger":"webhook","action":"webhook","created":"2024-01-01T00:00:00Z"}"#;
                table.insert("legacy", legacy.as_slice()).unwrap();
            }
            wt.commit().unwrap();
        }

        let ids: Vec<String> = db.list().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, ["good"]);
        let webhooks = db.list_by_trigger(TriggerKind::Webhook).unwrap();
        assert_eq!(webhooks.len(), 1);
        assert_eq!(webhooks[0].id, "good");
        assert!(matches!(db.get("legacy").unwrap_err(), CatalystError::Store(_)));
    }
}
