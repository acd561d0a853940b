mod mutator;

pub(crate) use mutator::{validate_input, MutationError, OptimisticMutator, StoreHandle};

use crate::models::{Bookmark, BookmarkPatch};
use std::collections::{HashMap, HashSet};

/// A change to apply to the local cache.
///
/// Both the optimistic mutator and the realtime listener funnel through
/// [`BookmarkStore::reconcile`], so merge rules live in exactly one place.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Change {
    /// Server confirmed a local create; swap the placeholder for the canonical row.
    Confirm { temp_id: String, record: Bookmark },
    Insert(Bookmark),
    Update(Bookmark),
    Delete { id: String },
}

/// Client-side mirror of the owner's bookmarks, newest first.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct BookmarkStore {
    items: Vec<Bookmark>,
    /// Ids known to be deleted on the server. Server ids are never reused,
    /// so a late insert or confirm for one of these is stale.
    deleted: HashSet<String>,
    /// Placeholder id -> canonical id, for every create confirmed so far.
    confirmed: HashMap<String, String>,
}

impl BookmarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[Bookmark] {
        &self.items
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<&Bookmark> {
        self.items.iter().find(|b| b.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|b| b.id == id)
    }

    /// Replace the whole list with a fresh server listing.
    ///
    /// Placeholders for creates still in flight are kept at the head so a
    /// slow initial fetch cannot drop them.
    pub fn replace_all(&mut self, mut rows: Vec<Bookmark>) {
        rows.retain(|b| !self.deleted.contains(&b.id));
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.dedup_by(|a, b| a.id == b.id);

        let pending: Vec<Bookmark> = self
            .items
            .drain(..)
            .filter(|b| b.is_pending())
            .collect();

        self.items = pending;
        self.items.extend(rows);
    }

    pub fn snapshot(&self) -> Vec<Bookmark> {
        self.items.clone()
    }

    /// Roll back to `snapshot`, taken before an optimistic edit or removal.
    ///
    /// Placeholders are not rolled back: one confirmed since the snapshot
    /// becomes its current canonical row (or nothing, if that row is gone),
    /// one dropped since stays dropped, and one created since stays put.
    /// Rows deleted on the server in the meantime stay deleted.
    pub fn restore(&mut self, snapshot: Vec<Bookmark>) {
        let current = std::mem::take(&mut self.items);

        let mut restored: Vec<Bookmark> = current
            .iter()
            .filter(|b| b.is_pending() && !snapshot.iter().any(|s| s.id == b.id))
            .cloned()
            .collect();

        for row in snapshot {
            let row = if let Some(canonical) = self.confirmed.get(&row.id) {
                match current.iter().find(|b| b.id == *canonical) {
                    Some(b) => b.clone(),
                    None => continue,
                }
            } else if row.is_pending() {
                match current.iter().find(|b| b.id == row.id) {
                    Some(b) => b.clone(),
                    None => continue,
                }
            } else {
                row
            };
            if self.deleted.contains(&row.id) || restored.iter().any(|b| b.id == row.id) {
                continue;
            }
            restored.push(row);
        }

        self.items = restored;
    }

    pub fn push_front(&mut self, record: Bookmark) {
        self.items.insert(0, record);
    }

    /// Local in-place edit. Returns false when the id is unknown.
    pub fn edit(&mut self, id: &str, patch: &BookmarkPatch) -> bool {
        match self.items.iter_mut().find(|b| b.id == id) {
            Some(b) => {
                patch.apply_to(b);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Bookmark> {
        self.position(id).map(|i| self.items.remove(i))
    }

    /// Apply a change keyed by id. Idempotent: replaying any change is a no-op.
    pub fn reconcile(&mut self, change: Change) {
        match change {
            Change::Confirm { temp_id, record } => {
                self.confirmed.insert(temp_id.clone(), record.id.clone());
                if self.deleted.contains(&record.id) {
                    // Deleted (and its delete echoed) before the create response landed.
                    self.remove(&temp_id);
                } else if self.contains(&record.id) {
                    // The realtime echo won the race; drop the placeholder.
                    self.remove(&temp_id);
                    if let Some(i) = self.position(&record.id) {
                        self.items[i] = record;
                    }
                } else if let Some(i) = self.position(&temp_id) {
                    self.items[i] = record;
                } else {
                    // Placeholder vanished (e.g. list restored); treat as a plain insert.
                    self.push_front(record);
                }
            }
            Change::Insert(record) => {
                if !self.contains(&record.id) && !self.deleted.contains(&record.id) {
                    self.push_front(record);
                }
            }
            Change::Update(record) => {
                if let Some(i) = self.position(&record.id) {
                    self.items[i] = record;
                }
            }
            Change::Delete { id } => {
                self.remove(&id);
                self.deleted.insert(id);
            }
        }
    }
}
