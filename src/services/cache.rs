use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::models::Interval;

pub type SlotKey = (String, NaiveDate);

/// Occupied intervals per (court, date), filled on first read.
///
/// Loads run while the map entry is held, and writers invalidate only after
/// their transaction commits, so a reader cannot put back intervals older than
/// the latest committed write.
#[derive(Default)]
pub struct SlotCache {
    occupied: DashMap<SlotKey, Arc<Vec<Interval>>>,
}

impl SlotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load<E>(
        &self,
        court_id: &str,
        date: NaiveDate,
        load: impl FnOnce() -> Result<Vec<Interval>, E>,
    ) -> Result<Arc<Vec<Interval>>, E> {
        match self.occupied.entry((court_id.to_string(), date)) {
            Entry::Occupied(e) => Ok(e.get().clone()),
            Entry::Vacant(e) => {
                let intervals = Arc::new(load()?);
                e.insert(intervals.clone());
                Ok(intervals)
            }
        }
    }

    pub fn invalidate(&self, court_id: &str, date: NaiveDate) {
        if self.occupied.remove(&(court_id.to_string(), date)).is_some() {
            tracing::debug!(court_id, %date, "slot cache invalidated");
        }
    }

    pub fn invalidate_court(&self, court_id: &str) {
        self.occupied.retain(|(court, _), _| court != court_id);
    }

    pub fn contains(&self, court_id: &str, date: NaiveDate) -> bool {
        self.occupied.contains_key(&(court_id.to_string(), date))
    }

    pub fn len(&self) -> usize {
        self.occupied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occupied.is_empty()
    }
}
