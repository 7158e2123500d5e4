//! Public facade. Every mutating operation begins a unit of work,
//! delegates to the transaction/allocation/import/reconciliation
//! services, recalculates every period it touched, reads back a fresh
//! snapshot, and commits — or rolls back and reports a stable error
//! code. Read operations touch the store directly with no unit of work.

use std::collections::BTreeSet;
use std::collections::HashSet;
use std::sync::Arc;

use budget_core::AccountId;
use budget_core::BudgetError;
use budget_core::BudgetPeriod;
use budget_core::BudgetResult;
use budget_core::Envelope;
use budget_core::EnvelopeAllocation;
use budget_core::EnvelopeId;
use budget_core::ErrorCode;
use budget_core::Money;
use budget_core::Payee;
use budget_core::Transaction;
use budget_core::TransactionId;
use budget_core::UnitOfWork;
use budget_core::recalculate;
use budget_import::ConfirmedRow;
use budget_import::PreviewResult;
use budget_reconcile::ReconciliationOutcome;
use budget_reconcile::ReconciliationRequest;
use chrono::Datelike;
use chrono::NaiveDate;

use crate::allocations;
use crate::allocations::AllocationChange;
use crate::allocations::GoalAssignMode;
use crate::telemetry::EngineTelemetry;
use crate::transactions;
use crate::transactions::CreateInflowInput;
use crate::transactions::CreateOutflowInput;
use crate::transactions::UpdateTransactionInput;

#[derive(Debug, Clone)]
pub struct EngineError {
    pub code: ErrorCode,
    pub message: String,
    pub target: Option<String>,
}

impl From<&BudgetError> for EngineError {
    fn from(err: &BudgetError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            target: err.target().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BudgetSnapshot {
    pub year: i32,
    pub month: u32,
    pub is_closed: bool,
    pub carried_over: Money,
    pub total_income: Money,
    pub total_allocated: Money,
    pub total_spent: Money,
    pub ready_to_assign: Money,
}

impl BudgetSnapshot {
    fn from_period(period: &BudgetPeriod) -> BudgetResult<Self> {
        Ok(Self {
            year: period.year,
            month: period.month,
            is_closed: period.is_closed,
            carried_over: period.carried_over,
            total_income: period.total_income,
            total_allocated: period.total_allocated,
            total_spent: period.total_spent,
            ready_to_assign: period.ready_to_assign()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct EngineOutcome<T> {
    pub success: bool,
    pub errors: Vec<EngineError>,
    pub snapshot: Option<BudgetSnapshot>,
    pub allocation_changes: Vec<AllocationChange>,
    pub value: Option<T>,
}

impl<T> EngineOutcome<T> {
    fn success(snapshot: Option<BudgetSnapshot>, allocation_changes: Vec<AllocationChange>, value: T) -> Self {
        Self {
            success: true,
            errors: Vec::new(),
            snapshot,
            allocation_changes,
            value: Some(value),
        }
    }

    fn failure(error: &BudgetError) -> Self {
        Self {
            success: false,
            errors: vec![EngineError::from(error)],
            snapshot: None,
            allocation_changes: Vec::new(),
            value: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImportCommitResult {
    pub inserted_count: usize,
    pub skipped_duplicate_count: usize,
}

/// Thin wrapper over a store implementation, giving every mutating
/// operation the begin/act/recalculate/snapshot/commit envelope described
/// in the module docs.
#[derive(Clone)]
pub struct BudgetEngine {
    store: Arc<dyn UnitOfWork>,
    telemetry: EngineTelemetry,
}

impl BudgetEngine {
    #[must_use]
    pub fn new(store: Arc<dyn UnitOfWork>) -> Self {
        Self::with_telemetry(store, EngineTelemetry::new())
    }

    #[must_use]
    pub fn with_telemetry(store: Arc<dyn UnitOfWork>, telemetry: EngineTelemetry) -> Self {
        Self { store, telemetry }
    }

    #[must_use]
    pub fn telemetry(&self) -> &EngineTelemetry {
        &self.telemetry
    }

    fn store(&self) -> &dyn UnitOfWork {
        self.store.as_ref()
    }

    async fn snapshot(&self, year: i32, month: u32) -> BudgetResult<BudgetSnapshot> {
        let period = self
            .store()
            .periods()
            .get_by_year_month(year, month)
            .await?
            .ok_or_else(|| BudgetError::unexpected("period missing after recalculate"))?;
        BudgetSnapshot::from_period(&period)
    }

    async fn existing_fingerprints(
        &self,
        account_id: &AccountId,
        currency: &str,
    ) -> BudgetResult<HashSet<String>> {
        let transactions = self.store().transactions().by_account(account_id).await?;
        Ok(transactions
            .iter()
            .map(|t| {
                budget_import::fingerprint_for(
                    account_id,
                    t.date,
                    t.amount.minor_units(),
                    currency,
                    &t.payee,
                    t.memo.as_deref().unwrap_or(""),
                )
            })
            .collect())
    }

    /// Begins a unit of work, recalculates `(year, month)`, reads back a
    /// snapshot, and commits. On any failure, rolls back instead.
    async fn finish<T>(
        &self,
        year: i32,
        month: u32,
        currency: &str,
        value: T,
        changes: Vec<AllocationChange>,
    ) -> EngineOutcome<T> {
        if let Err(err) = recalculate(self.store(), year, month, currency).await {
            let _ = self.store().rollback().await;
            return EngineOutcome::failure(&err);
        }
        let snapshot = match self.snapshot(year, month).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                let _ = self.store().rollback().await;
                return EngineOutcome::failure(&err);
            }
        };
        if let Err(err) = self.store().commit().await {
            return EngineOutcome::failure(&err);
        }
        EngineOutcome::success(Some(snapshot), changes, value)
    }

    async fn abort<T>(&self, err: BudgetError) -> EngineOutcome<T> {
        let _ = self.store().rollback().await;
        EngineOutcome::failure(&err)
    }

    // -- Transaction Service -------------------------------------------

    pub async fn create_outflow(&self, input: CreateOutflowInput) -> EngineOutcome<Transaction> {
        let (year, month) = (input.date.year(), input.date.month());
        let currency = input.amount.currency().to_string();
        if let Err(err) = self.store().begin().await {
            return EngineOutcome::failure(&err);
        }
        match transactions::create_outflow(self.store(), input).await {
            Ok(txn) => {
                self.telemetry.record_transaction_created();
                self.finish(year, month, &currency, txn, Vec::new()).await
            }
            Err(err) => self.abort(err).await,
        }
    }

    pub async fn create_inflow(&self, input: CreateInflowInput) -> EngineOutcome<Transaction> {
        let (year, month) = (input.date.year(), input.date.month());
        let currency = input.amount.currency().to_string();
        if let Err(err) = self.store().begin().await {
            return EngineOutcome::failure(&err);
        }
        match transactions::create_inflow(self.store(), input).await {
            Ok(txn) => {
                self.telemetry.record_transaction_created();
                self.finish(year, month, &currency, txn, Vec::new()).await
            }
            Err(err) => self.abort(err).await,
        }
    }

    pub async fn create_transfer(
        &self,
        from_account: AccountId,
        to_account: AccountId,
        date: NaiveDate,
        amount: Money,
        memo: Option<String>,
    ) -> EngineOutcome<transactions::TransferOutcome> {
        let (year, month) = (date.year(), date.month());
        let currency = amount.currency().to_string();
        if let Err(err) = self.store().begin().await {
            return EngineOutcome::failure(&err);
        }
        match transactions::create_transfer(self.store(), from_account, to_account, date, amount, memo).await {
            Ok(outcome) => {
                self.telemetry.record_transfer_created();
                self.finish(year, month, &currency, outcome, Vec::new()).await
            }
            Err(err) => self.abort(err).await,
        }
    }

    pub async fn update_transaction(
        &self,
        id: TransactionId,
        patch: UpdateTransactionInput,
    ) -> EngineOutcome<Transaction> {
        if let Err(err) = self.store().begin().await {
            return EngineOutcome::failure(&err);
        }
        let before = match self.store().transactions().get_by_id(&id).await {
            Ok(Some(txn)) => txn,
            Ok(None) => {
                return self
                    .abort(BudgetError::validation_field("transaction not found", "id"))
                    .await;
            }
            Err(err) => return self.abort(err).await,
        };
        let before_period = (before.date.year(), before.date.month());
        let currency = before.amount.currency().to_string();

        match transactions::update_transaction(self.store(), &id, patch).await {
            Ok(txn) => {
                let after_period = (txn.date.year(), txn.date.month());
                if after_period != before_period
                    && let Err(err) = recalculate(self.store(), before_period.0, before_period.1, &currency).await
                {
                    let _ = self.store().rollback().await;
                    return EngineOutcome::failure(&err);
                }
                self.finish(after_period.0, after_period.1, &currency, txn, Vec::new()).await
            }
            Err(err) => self.abort(err).await,
        }
    }

    pub async fn delete_transaction(&self, id: TransactionId) -> EngineOutcome<()> {
        if let Err(err) = self.store().begin().await {
            return EngineOutcome::failure(&err);
        }
        let before = match self.store().transactions().get_by_id(&id).await {
            Ok(Some(txn)) => txn,
            Ok(None) => {
                return self
                    .abort(BudgetError::validation_field("transaction not found", "id"))
                    .await;
            }
            Err(err) => return self.abort(err).await,
        };
        let (year, month) = (before.date.year(), before.date.month());
        let currency = before.amount.currency().to_string();

        match transactions::delete_transaction(self.store(), &id).await {
            Ok(()) => {
                self.telemetry.record_transaction_deleted();
                self.finish(year, month, &currency, (), Vec::new()).await
            }
            Err(err) => self.abort(err).await,
        }
    }

    pub async fn mark_cleared(&self, id: TransactionId) -> EngineOutcome<Transaction> {
        if let Err(err) = self.store().begin().await {
            return EngineOutcome::failure(&err);
        }
        let (year, month, currency) = match self.period_of(&id).await {
            Ok(period) => period,
            Err(err) => return self.abort(err).await,
        };
        match transactions::mark_cleared(self.store(), &id).await {
            Ok(txn) => self.finish(year, month, &currency, txn, Vec::new()).await,
            Err(err) => self.abort(err).await,
        }
    }

    pub async fn mark_uncleared(&self, id: TransactionId) -> EngineOutcome<Transaction> {
        if let Err(err) = self.store().begin().await {
            return EngineOutcome::failure(&err);
        }
        let (year, month, currency) = match self.period_of(&id).await {
            Ok(period) => period,
            Err(err) => return self.abort(err).await,
        };
        match transactions::mark_uncleared(self.store(), &id).await {
            Ok(txn) => self.finish(year, month, &currency, txn, Vec::new()).await,
            Err(err) => self.abort(err).await,
        }
    }

    async fn period_of(&self, id: &TransactionId) -> BudgetResult<(i32, u32, String)> {
        let txn = self
            .store()
            .transactions()
            .get_by_id(id)
            .await?
            .ok_or_else(|| BudgetError::validation_field("transaction not found", "id"))?;
        Ok((
            txn.date.year(),
            txn.date.month(),
            txn.amount.currency().to_string(),
        ))
    }

    pub async fn assign_to_envelope(
        &self,
        id: TransactionId,
        envelope_id: EnvelopeId,
    ) -> EngineOutcome<Transaction> {
        if let Err(err) = self.store().begin().await {
            return EngineOutcome::failure(&err);
        }
        let before = match self.store().transactions().get_by_id(&id).await {
            Ok(Some(txn)) => txn,
            Ok(None) => {
                return self
                    .abort(BudgetError::validation_field("transaction not found", "id"))
                    .await;
            }
            Err(err) => return self.abort(err).await,
        };
        let (year, month) = (before.date.year(), before.date.month());
        let currency = before.amount.currency().to_string();

        match transactions::assign_to_envelope(self.store(), &id, envelope_id).await {
            Ok(txn) => {
                self.telemetry.record_envelope_assignment();
                self.finish(year, month, &currency, txn, Vec::new()).await
            }
            Err(err) => self.abort(err).await,
        }
    }

    // -- Envelope/Allocation Service -------------------------------------

    pub async fn set_allocation(
        &self,
        envelope_id: EnvelopeId,
        amount: Money,
        year: i32,
        month: u32,
    ) -> EngineOutcome<EnvelopeAllocation> {
        if let Err(err) = self.store().begin().await {
            return EngineOutcome::failure(&err);
        }
        let currency = amount.currency().to_string();
        match allocations::set_allocation(self.store(), &envelope_id, amount, year, month).await {
            Ok(allocation) => {
                self.telemetry.record_allocation_set();
                self.finish(year, month, &currency, allocation, Vec::new()).await
            }
            Err(err) => self.abort(err).await,
        }
    }

    pub async fn adjust_allocation(
        &self,
        envelope_id: EnvelopeId,
        delta: Money,
        year: i32,
        month: u32,
    ) -> EngineOutcome<EnvelopeAllocation> {
        if let Err(err) = self.store().begin().await {
            return EngineOutcome::failure(&err);
        }
        let currency = delta.currency().to_string();
        match allocations::adjust_allocation(self.store(), &envelope_id, delta, year, month).await {
            Ok(allocation) => {
                self.telemetry.record_allocation_set();
                self.finish(year, month, &currency, allocation, Vec::new()).await
            }
            Err(err) => self.abort(err).await,
        }
    }

    pub async fn move_allocation(
        &self,
        from_envelope: EnvelopeId,
        to_envelope: EnvelopeId,
        amount: Money,
        year: i32,
        month: u32,
    ) -> EngineOutcome<(EnvelopeAllocation, EnvelopeAllocation)> {
        if let Err(err) = self.store().begin().await {
            return EngineOutcome::failure(&err);
        }
        let currency = amount.currency().to_string();
        match allocations::move_allocation(self.store(), &from_envelope, &to_envelope, amount, year, month).await {
            Ok((from, to)) => {
                self.telemetry.record_allocation_move();
                self.finish(year, month, &currency, (from, to), Vec::new()).await
            }
            Err(err) => self.abort(err).await,
        }
    }

    pub async fn set_goal(
        &self,
        envelope_id: EnvelopeId,
        amount: Money,
        target_date: Option<NaiveDate>,
    ) -> EngineOutcome<Envelope> {
        if let Err(err) = self.store().begin().await {
            return EngineOutcome::failure(&err);
        }
        match allocations::set_goal(self.store(), &envelope_id, amount, target_date).await {
            Ok(envelope) => {
                if let Err(err) = self.store().commit().await {
                    return EngineOutcome::failure(&err);
                }
                EngineOutcome::success(None, Vec::new(), envelope)
            }
            Err(err) => self.abort(err).await,
        }
    }

    pub async fn auto_assign_to_goals(
        &self,
        mode: GoalAssignMode,
        year: i32,
        month: u32,
        currency: &str,
    ) -> EngineOutcome<()> {
        if let Err(err) = self.store().begin().await {
            return EngineOutcome::failure(&err);
        }
        match allocations::auto_assign_to_goals(self.store(), mode, year, month, currency).await {
            Ok(changes) => {
                self.telemetry.record_goal_auto_assignments(changes.len());
                self.finish(year, month, currency, (), changes).await
            }
            Err(err) => self.abort(err).await,
        }
    }

    pub async fn rollover(&self, year: i32, month: u32, currency: &str) -> EngineOutcome<BudgetPeriod> {
        if let Err(err) = self.store().begin().await {
            return EngineOutcome::failure(&err);
        }
        match allocations::rollover(self.store(), year, month, currency).await {
            Ok(period) => {
                self.telemetry.record_rollover();
                // The source period is now closed and cannot be recalculated
                // again, so snapshot it directly instead of going through `finish`.
                let snapshot = match BudgetSnapshot::from_period(&period) {
                    Ok(snapshot) => snapshot,
                    Err(err) => {
                        let _ = self.store().rollback().await;
                        return EngineOutcome::failure(&err);
                    }
                };
                if let Err(err) = self.store().commit().await {
                    return EngineOutcome::failure(&err);
                }
                EngineOutcome::success(Some(snapshot), Vec::new(), period)
            }
            Err(err) => self.abort(err).await,
        }
    }

    // -- CSV Import Pipeline ---------------------------------------------

    pub async fn import_preview(
        &self,
        account_id: &AccountId,
        csv_text: &str,
    ) -> BudgetResult<PreviewResult> {
        let account = self
            .store()
            .accounts()
            .get_by_id(account_id)
            .await?
            .ok_or_else(|| BudgetError::validation_field("account not found", "accountId"))?;
        let existing = self.existing_fingerprints(account_id, account.currency()).await?;
        budget_import::preview(csv_text, account_id, account.currency(), &existing)
    }

    /// Commits the `New` rows the caller confirmed. Recalculates every
    /// distinct `(year, month)` touched, in ascending order, and reports
    /// the snapshot of the chronologically last one as primary.
    pub async fn import_commit(
        &self,
        account_id: AccountId,
        confirmed: Vec<ConfirmedRow>,
    ) -> EngineOutcome<ImportCommitResult> {
        if confirmed.is_empty() {
            return EngineOutcome::success(None, Vec::new(), ImportCommitResult::default());
        }
        if let Err(err) = self.store().begin().await {
            return EngineOutcome::failure(&err);
        }

        let account = match self.store().accounts().get_by_id(&account_id).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                return self
                    .abort(BudgetError::validation_field("account not found", "accountId"))
                    .await;
            }
            Err(err) => return self.abort(err).await,
        };
        let currency = account.currency().to_string();

        let existing = match self.existing_fingerprints(&account_id, &currency).await {
            Ok(existing) => existing,
            Err(err) => return self.abort(err).await,
        };
        let plan = budget_import::plan_commit(confirmed, &existing);

        let mut impacted: BTreeSet<(i32, u32)> = BTreeSet::new();
        for row in &plan.to_insert {
            impacted.insert((row.date.year(), row.date.month()));
            let result = if row.amount.is_positive() {
                transactions::create_inflow(
                    self.store(),
                    CreateInflowInput {
                        account_id: account_id.clone(),
                        date: row.date,
                        amount: row.amount,
                        payee: row.payee.clone(),
                        memo: row.memo.clone(),
                    },
                )
                .await
                .map(|_| ())
            } else {
                transactions::create_outflow(
                    self.store(),
                    CreateOutflowInput {
                        account_id: account_id.clone(),
                        date: row.date,
                        amount: row.amount.abs(),
                        payee: row.payee.clone(),
                        memo: row.memo.clone(),
                        envelope_id: None,
                        splits: None,
                    },
                )
                .await
                .map(|_| ())
            };
            if let Err(err) = result {
                return self.abort(err).await;
            }
        }

        for (year, month) in &impacted {
            if let Err(err) = recalculate(self.store(), *year, *month, &currency).await {
                let _ = self.store().rollback().await;
                return EngineOutcome::failure(&err);
            }
        }

        let primary = impacted.iter().next_back().copied();
        let snapshot = match primary {
            Some((year, month)) => match self.snapshot(year, month).await {
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    let _ = self.store().rollback().await;
                    return EngineOutcome::failure(&err);
                }
            },
            None => None,
        };

        if let Err(err) = self.store().commit().await {
            return EngineOutcome::failure(&err);
        }

        let result = ImportCommitResult {
            inserted_count: plan.to_insert.len(),
            skipped_duplicate_count: plan.skipped_duplicate_count,
        };
        self.telemetry
            .record_import(result.inserted_count, result.skipped_duplicate_count);
        EngineOutcome::success(snapshot, Vec::new(), result)
    }

    // -- Reconciliation Engine --------------------------------------------

    pub async fn reconcile(&self, request: ReconciliationRequest) -> EngineOutcome<ReconciliationOutcome> {
        let (year, month) = (request.statement_date.year(), request.statement_date.month());
        let account_id = request.account_id.clone();
        if let Err(err) = self.store().begin().await {
            return EngineOutcome::failure(&err);
        }
        if !matches!(self.store().accounts().get_by_id(&account_id).await, Ok(Some(_))) {
            return self
                .abort(BudgetError::validation_field("account not found", "accountId"))
                .await;
        }

        match budget_reconcile::reconcile(self.store(), request).await {
            Ok(outcome) => {
                self.telemetry
                    .record_reconciliation(outcome.adjustment_transaction.is_some());
                // budget_reconcile::reconcile already recalculates internally.
                let snapshot = match self.snapshot(year, month).await {
                    Ok(snapshot) => snapshot,
                    Err(err) => {
                        let _ = self.store().rollback().await;
                        return EngineOutcome::failure(&err);
                    }
                };
                if let Err(err) = self.store().commit().await {
                    return EngineOutcome::failure(&err);
                }
                EngineOutcome::success(Some(snapshot), Vec::new(), outcome)
            }
            Err(err) => self.abort(err).await,
        }
    }

    // -- Lookups -----------------------------------------------------------

    pub async fn default_envelope_for_payee(&self, name: &str) -> BudgetResult<Option<Payee>> {
        self.store().payees().get_by_name(name).await
    }
}
