pub mod booking;
pub mod cache;
pub mod directory;
pub mod history;
pub mod invitation;
pub mod matching;
pub mod messaging;
pub mod notify;
pub mod payment;
pub mod pricing;
pub mod rules;
pub mod scheduling;

use chrono::NaiveDate;
use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::errors::BookingError;
use cache::SlotCache;
use rules::BookingRules;

/// Booking rules plus the slot cache they guard. Every mutating operation
/// takes the connection explicitly and runs in its own write transaction.
pub struct Engine {
    pub rules: BookingRules,
    pub cache: SlotCache,
}

impl Engine {
    pub fn new(rules: BookingRules) -> Self {
        Self {
            rules,
            cache: SlotCache::new(),
        }
    }

    /// Commits and then drops the cached occupancy of every touched
    /// (court, date).
    pub(crate) fn commit(
        &self,
        tx: Transaction<'_>,
        touched: &[(&str, NaiveDate)],
    ) -> Result<(), BookingError> {
        tx.commit()?;
        for (court_id, date) in touched {
            self.cache.invalidate(court_id, *date);
        }
        Ok(())
    }
}

/// Opens a transaction that takes SQLite's write lock up front, so the
/// conflict check and the write that follows it cannot interleave with
/// another writer.
pub(crate) fn begin(conn: &mut Connection) -> rusqlite::Result<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
}
