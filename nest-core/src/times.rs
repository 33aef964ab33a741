//! "100 times" counters: things the couple wants to do again and again.
//!
//! All counters live in one `timesToDo/812_917` document as `{ items: [...] }`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use nest_store::{Database, DocRef, Subscription};

use crate::couple::{pair_id, Member};
use crate::error::NestError;
use crate::items;

pub const TIMES_TO_DO: &str = "timesToDo";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimesItem {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub count: u32,
    pub created_at: DateTime<Utc>,
    pub created_by: Member,
}

#[derive(Clone)]
pub struct TimesToDo {
    db: Database,
}

impl TimesToDo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn doc(&self) -> DocRef {
        self.db.doc(TIMES_TO_DO, &pair_id())
    }

    pub fn list(&self) -> Result<Vec<TimesItem>, NestError> {
        items::load(&self.doc())
    }

    /// Sum of all counters.
    pub fn total_count(&self) -> Result<u64, NestError> {
        Ok(self.list()?.iter().map(|i| u64::from(i.count)).sum())
    }

    pub fn add(&self, member: Member, text: &str) -> Result<TimesItem, NestError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(NestError::EmptyText);
        }
        let item = TimesItem {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            count: 0,
            created_at: Utc::now(),
            created_by: member,
        };

        let doc = self.doc();
        let mut all = self.list()?;
        all.push(item.clone());
        items::store(&doc, &all)?;

        log::info!("{member} added {:?}", item.text);
        Ok(item)
    }

    /// Bump a counter; returns the new count.
    pub fn increment(&self, id: &str) -> Result<u32, NestError> {
        self.modify(id, |item| {
            item.count = item.count.saturating_add(1);
            true
        })
    }

    /// Lower a counter. Nothing is written when it is already 0.
    pub fn decrement(&self, id: &str) -> Result<u32, NestError> {
        self.modify(id, |item| {
            if item.count == 0 {
                return false;
            }
            item.count -= 1;
            true
        })
    }

    pub fn remove(&self, id: &str) -> Result<TimesItem, NestError> {
        let mut all = self.list()?;
        let index = position(&all, id)?;
        let removed = all.remove(index);
        items::store(&self.doc(), &all)?;
        Ok(removed)
    }

    /// Follow the counters; the callback gets the full list on every change.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[TimesItem]) + Send + Sync + 'static,
    {
        self.doc().on_snapshot(move |snap| {
            let items: Vec<TimesItem> = items::from_snapshot(snap);
            callback(&items);
        })
    }

    /// Apply `change` to one item and write the list back if it reports a
    /// change.
    fn modify<F>(&self, id: &str, change: F) -> Result<u32, NestError>
    where
        F: FnOnce(&mut TimesItem) -> bool,
    {
        let mut all = self.list()?;
        let index = position(&all, id)?;
        let changed = change(&mut all[index]);
        let count = all[index].count;
        if changed {
            items::store(&self.doc(), &all)?;
            log::debug!("Counter {id} is now {count}");
        }
        Ok(count)
    }
}

fn position(items: &[TimesItem], id: &str) -> Result<usize, NestError> {
    items
        .iter()
        .position(|i| i.id == id)
        .ok_or_else(|| NestError::ItemNotFound(id.to_string()))
}
