//! In-memory catalog for pipeline tests.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::{DbError, DbResult, TableCatalog};
use crate::config::SelectionConfig;

/// Ordered record of side effects shared between test doubles.
pub(crate) type EventLog = Arc<Mutex<Vec<String>>>;

pub(crate) struct InMemoryCatalog {
    tables: Mutex<Vec<(String, DateTime<Utc>)>>,
    candidates: Option<Vec<String>>,
    failing_drops: HashSet<String>,
    fail_selection: bool,
    events: EventLog,
    now: DateTime<Utc>,
}

impl InMemoryCatalog {
    pub(crate) fn new(events: EventLog) -> Self {
        Self {
            tables: Mutex::new(Vec::new()),
            candidates: None,
            failing_drops: HashSet::new(),
            fail_selection: false,
            events,
            now: Utc::now(),
        }
    }

    /// Add a table created `age_days` ago.
    pub(crate) fn with_table(self, name: &str, age_days: i64) -> Self {
        let created = self.now - Duration::days(age_days);
        self.tables
            .lock()
            .unwrap()
            .push((name.to_string(), created));
        self
    }

    /// Return exactly `names` from selection, bypassing the filter.
    pub(crate) fn with_candidates(mut self, names: &[&str]) -> Self {
        self.candidates = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub(crate) fn failing_drop(mut self, name: &str) -> Self {
        self.failing_drops.insert(name.to_string());
        self
    }

    pub(crate) fn failing_selection(mut self) -> Self {
        self.fail_selection = true;
        self
    }

    pub(crate) fn table_names(&self) -> Vec<String> {
        self.tables
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub(crate) fn has_table(&self, name: &str) -> bool {
        self.table_names().iter().any(|t| t == name)
    }
}

#[async_trait]
impl TableCatalog for InMemoryCatalog {
    async fn find_stale_tables(&self, selection: &SelectionConfig) -> DbResult<Vec<String>> {
        if self.fail_selection {
            return Err(DbError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        if let Some(candidates) = &self.candidates {
            return Ok(candidates.clone());
        }
        let window = selection.window();
        Ok(self
            .tables
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, created)| selection.matches(name) && window.is_stale(*created, self.now))
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn drop_table(&self, table: &str) -> DbResult<()> {
        if self.failing_drops.contains(table) {
            self.events.lock().unwrap().push(format!("drop-failed:{table}"));
            return Err(DbError::Sqlx(sqlx::Error::Protocol(format!(
                "cannot drop {table}"
            ))));
        }
        self.events.lock().unwrap().push(format!("drop:{table}"));
        self.tables.lock().unwrap().retain(|(name, _)| name != table);
        Ok(())
    }

    fn database_name(&self) -> &str {
        "memory"
    }
}
