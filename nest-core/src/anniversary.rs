//! The couple's anniversary calendar.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use nest_store::{Database, DocRef, Subscription};

use crate::couple::pair_id;
use crate::error::NestError;
use crate::items;

pub const ANNIVERSARIES: &str = "anniversaries";

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anniversary {
    pub id: String,
    pub title: String,
    pub date: NaiveDate,
}

/// Whole days between `today` and an anniversary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Countdown {
    /// Today (0) or still ahead.
    Upcoming(i64),
    /// Days since it passed.
    Elapsed(i64),
}

impl Anniversary {
    pub fn countdown(&self, today: NaiveDate) -> Countdown {
        let days = (self.date - today).num_days();
        if days >= 0 {
            Countdown::Upcoming(days)
        } else {
            Countdown::Elapsed(-days)
        }
    }
}

fn newest_first(items: &mut [Anniversary]) {
    items.sort_by(|a, b| b.date.cmp(&a.date));
}

#[derive(Clone)]
pub struct Anniversaries {
    db: Database,
}

impl Anniversaries {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn doc(&self) -> DocRef {
        self.db.doc(ANNIVERSARIES, &pair_id())
    }

    /// All anniversaries, latest date first.
    pub fn list(&self) -> Result<Vec<Anniversary>, NestError> {
        let mut items: Vec<Anniversary> = items::load(&self.doc())?;
        newest_first(&mut items);
        Ok(items)
    }

    /// Record an anniversary. `date` is `YYYY-MM-DD`.
    pub fn add(&self, title: &str, date: &str) -> Result<Anniversary, NestError> {
        let title = title.trim();
        let date = date.trim();
        if title.is_empty() || date.is_empty() {
            return Err(NestError::EmptyText);
        }
        let date = NaiveDate::parse_from_str(date, DATE_FORMAT)
            .map_err(|_| NestError::InvalidDate(date.to_string()))?;

        let anniversary = Anniversary {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            date,
        };
        let doc = self.doc();
        let mut all: Vec<Anniversary> = items::load(&doc)?;
        all.push(anniversary.clone());
        items::store(&doc, &all)?;

        log::info!("Added anniversary {:?} on {}", anniversary.title, anniversary.date);
        Ok(anniversary)
    }

    pub fn remove(&self, id: &str) -> Result<Anniversary, NestError> {
        let doc = self.doc();
        let mut all: Vec<Anniversary> = items::load(&doc)?;
        let index = all
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| NestError::ItemNotFound(id.to_string()))?;
        let removed = all.remove(index);
        items::store(&doc, &all)?;
        Ok(removed)
    }

    /// Anniversaries whose date has not passed yet, soonest first, counted
    /// from today in UTC.
    pub fn upcoming(&self) -> Result<Vec<(Anniversary, i64)>, NestError> {
        let today = Utc::now().date_naive();
        let mut ahead: Vec<(Anniversary, i64)> = self
            .list()?
            .into_iter()
            .filter_map(|a| match a.countdown(today) {
                Countdown::Upcoming(days) => Some((a, days)),
                Countdown::Elapsed(_) => None,
            })
            .collect();
        ahead.sort_by_key(|(_, days)| *days);
        Ok(ahead)
    }

    /// Follow the calendar; the callback gets the list latest date first.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[Anniversary]) + Send + Sync + 'static,
    {
        self.doc().on_snapshot(move |snap| {
            let mut items: Vec<Anniversary> = items::from_snapshot(snap);
            newest_first(&mut items);
            callback(&items);
        })
    }
}
