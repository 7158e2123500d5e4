//! Mutation counters, optionally persisted to a JSON file beside the
//! engine's data so operation volume survives process restarts.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use budget_core::BudgetError;
use budget_core::BudgetResult;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryCounters {
    pub transactions_created: usize,
    pub transfers_created: usize,
    pub transactions_deleted: usize,
    pub envelope_assignments: usize,
    pub allocations_set: usize,
    pub allocation_moves: usize,
    pub goal_auto_assignments: usize,
    pub rollovers: usize,
    pub rows_imported: usize,
    pub rows_skipped_duplicate: usize,
    pub reconciliations: usize,
    pub reconciliation_adjustments: usize,
}

#[derive(Debug)]
struct TelemetryStore {
    path: PathBuf,
}

impl TelemetryStore {
    fn from_env() -> Option<Self> {
        let home = env::var_os("BUDGET_ENGINE_HOME")?;
        let mut path = PathBuf::from(home);
        path.push("telemetry.json");
        Some(Self { path })
    }

    fn read(&self) -> BudgetResult<Option<TelemetryCounters>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path)
            .map_err(|e| BudgetError::unexpected(format!("failed to read {}: {e}", self.path.display())))?;
        let counters = serde_json::from_slice(&data)
            .map_err(|e| BudgetError::unexpected(format!("failed to parse {}: {e}", self.path.display())))?;
        Ok(Some(counters))
    }

    fn persist(&self, counters: &TelemetryCounters) -> BudgetResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| BudgetError::unexpected(format!("failed to create {}: {e}", parent.display())))?;
        }
        let data = serde_json::to_vec_pretty(counters)
            .map_err(|e| BudgetError::unexpected(format!("failed to encode telemetry counters: {e}")))?;
        fs::write(&self.path, data)
            .map_err(|e| BudgetError::unexpected(format!("failed to write {}: {e}", self.path.display())))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct TelemetryInner {
    counters: TelemetryCounters,
    store: Option<TelemetryStore>,
}

impl TelemetryInner {
    fn with_store(store: Option<TelemetryStore>) -> Self {
        match store {
            Some(store) => {
                let counters = match store.read() {
                    Ok(Some(existing)) => existing,
                    Ok(None) => TelemetryCounters::default(),
                    Err(err) => {
                        warn!(
                            path = %store.path.display(),
                            error = %err,
                            "failed to load persisted telemetry; continuing with defaults"
                        );
                        TelemetryCounters::default()
                    }
                };
                Self {
                    counters,
                    store: Some(store),
                }
            }
            None => Self::default(),
        }
    }

    fn persist(&self) {
        if let Some(store) = &self.store
            && let Err(err) = store.persist(&self.counters)
        {
            warn!(
                path = %store.path.display(),
                error = %err,
                "failed to persist telemetry counters"
            );
        }
    }
}

/// Thread-safe counter set shared by every clone of a `BudgetEngine`.
#[derive(Clone, Default)]
pub struct EngineTelemetry {
    inner: Arc<Mutex<TelemetryInner>>,
}

impl EngineTelemetry {
    #[must_use]
    pub fn new() -> Self {
        Self::from_store(None)
    }

    #[must_use]
    pub fn persistent_from_env() -> Self {
        Self::from_store(TelemetryStore::from_env())
    }

    #[must_use]
    pub fn with_store_path(path: PathBuf) -> Self {
        Self::from_store(Some(TelemetryStore { path }))
    }

    fn from_store(store: Option<TelemetryStore>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TelemetryInner::with_store(store))),
        }
    }

    fn update<F>(&self, mut updater: F)
    where
        F: FnMut(&mut TelemetryCounters),
    {
        if let Ok(mut inner) = self.inner.lock() {
            updater(&mut inner.counters);
            inner.persist();
        }
    }

    pub fn record_transaction_created(&self) {
        self.update(|c| c.transactions_created += 1);
    }

    pub fn record_transfer_created(&self) {
        self.update(|c| c.transfers_created += 1);
    }

    pub fn record_transaction_deleted(&self) {
        self.update(|c| c.transactions_deleted += 1);
    }

    pub fn record_envelope_assignment(&self) {
        self.update(|c| c.envelope_assignments += 1);
    }

    pub fn record_allocation_set(&self) {
        self.update(|c| c.allocations_set += 1);
    }

    pub fn record_allocation_move(&self) {
        self.update(|c| c.allocation_moves += 1);
    }

    pub fn record_goal_auto_assignments(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.update(|c| c.goal_auto_assignments += count);
    }

    pub fn record_rollover(&self) {
        self.update(|c| c.rollovers += 1);
    }

    pub fn record_import(&self, inserted: usize, skipped_duplicate: usize) {
        self.update(|c| {
            c.rows_imported += inserted;
            c.rows_skipped_duplicate += skipped_duplicate;
        });
    }

    pub fn record_reconciliation(&self, adjustment_created: bool) {
        self.update(|c| {
            c.reconciliations += 1;
            if adjustment_created {
                c.reconciliation_adjustments += 1;
            }
        });
    }

    #[must_use]
    pub fn snapshot(&self) -> TelemetryCounters {
        self.inner
            .lock()
            .map(|inner| inner.counters.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn store_path(&self) -> Option<PathBuf> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.store.as_ref().map(|store| store.path.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn counters_accumulate() {
        let telemetry = EngineTelemetry::new();
        telemetry.record_transaction_created();
        telemetry.record_transfer_created();
        telemetry.record_allocation_move();
        telemetry.record_import(2, 1);
        telemetry.record_reconciliation(true);
        let counters = telemetry.snapshot();
        assert_eq!(counters.transactions_created, 1);
        assert_eq!(counters.transfers_created, 1);
        assert_eq!(counters.allocation_moves, 1);
        assert_eq!(counters.rows_imported, 2);
        assert_eq!(counters.rows_skipped_duplicate, 1);
        assert_eq!(counters.reconciliations, 1);
        assert_eq!(counters.reconciliation_adjustments, 1);
    }

    #[test]
    fn persistence_survives_restart() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("telemetry.json");
        {
            let telemetry = EngineTelemetry::with_store_path(path.clone());
            telemetry.record_transaction_created();
            telemetry.record_rollover();
        }
        let telemetry = EngineTelemetry::with_store_path(path);
        let counters = telemetry.snapshot();
        assert_eq!(counters.transactions_created, 1);
        assert_eq!(counters.rollovers, 1);
    }

    #[test]
    fn persistence_recovers_from_corrupt_file() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("telemetry.json");
        fs::write(&path, b"not json").expect("write corrupt telemetry");

        let telemetry = EngineTelemetry::with_store_path(path.clone());
        let counters = telemetry.snapshot();
        assert_eq!(counters.transactions_created, 0);

        telemetry.record_transaction_created();

        let reloaded = EngineTelemetry::with_store_path(path);
        assert_eq!(reloaded.snapshot().transactions_created, 1);
    }
}
