use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::entities::Account;
use crate::entities::AccountId;
use crate::entities::AllocationId;
use crate::entities::BudgetPeriod;
use crate::entities::BudgetPeriodId;
use crate::entities::Envelope;
use crate::entities::EnvelopeAllocation;
use crate::entities::EnvelopeId;
use crate::entities::Payee;
use crate::entities::PayeeId;
use crate::entities::SplitLineId;
use crate::entities::Transaction;
use crate::entities::TransactionId;
use crate::entities::TransactionSplitLine;
use crate::entities::TransactionType;
use crate::error::BudgetError;
use crate::error::BudgetResult;
use crate::money::Money;
use crate::repository::AccountRepository;
use crate::repository::BudgetPeriodRepository;
use crate::repository::EnvelopeAllocationRepository;
use crate::repository::EnvelopeRepository;
use crate::repository::PayeeRepository;
use crate::repository::TransactionRepository;
use crate::repository::TransactionSplitRepository;
use crate::repository::UnitOfWork;

#[derive(Clone, Default)]
struct State {
    accounts: HashMap<AccountId, Account>,
    envelopes: HashMap<EnvelopeId, Envelope>,
    transactions: HashMap<TransactionId, Transaction>,
    splits: HashMap<SplitLineId, TransactionSplitLine>,
    periods: HashMap<BudgetPeriodId, BudgetPeriod>,
    allocations: HashMap<AllocationId, EnvelopeAllocation>,
    payees: HashMap<PayeeId, Payee>,
}

struct Inner {
    state: State,
    snapshot: Option<State>,
}

/// In-memory implementation of the repository / unit-of-work contract.
/// A single mutex guards the whole store; `begin` clones the current state
/// aside so `rollback` can restore it verbatim, matching the single-writer
/// concurrency model the engine assumes.
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: State::default(),
                snapshot: None,
            }),
        }
    }

    #[must_use]
    pub fn new_id(prefix: &str) -> String {
        format!("{prefix}-{}", Uuid::new_v4())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryStore {
    async fn begin(&self) -> BudgetResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.snapshot.is_some() {
            return Err(BudgetError::unexpected(
                "a unit of work is already in flight",
            ));
        }
        inner.snapshot = Some(inner.state.clone());
        Ok(())
    }

    async fn commit(&self) -> BudgetResult<()> {
        let mut inner = self.inner.lock().await;
        inner.snapshot = None;
        Ok(())
    }

    async fn rollback(&self) -> BudgetResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(snapshot) = inner.snapshot.take() {
            inner.state = snapshot;
        }
        Ok(())
    }

    fn accounts(&self) -> &dyn AccountRepository {
        self
    }

    fn envelopes(&self) -> &dyn EnvelopeRepository {
        self
    }

    fn transactions(&self) -> &dyn TransactionRepository {
        self
    }

    fn splits(&self) -> &dyn TransactionSplitRepository {
        self
    }

    fn periods(&self) -> &dyn BudgetPeriodRepository {
        self
    }

    fn allocations(&self) -> &dyn EnvelopeAllocationRepository {
        self
    }

    fn payees(&self) -> &dyn PayeeRepository {
        self
    }
}

#[async_trait]
impl AccountRepository for InMemoryStore {
    async fn get_by_id(&self, id: &AccountId) -> BudgetResult<Option<Account>> {
        let inner = self.inner.lock().await;
        Ok(inner.state.accounts.get(id).cloned())
    }

    async fn get_all(&self) -> BudgetResult<Vec<Account>> {
        let inner = self.inner.lock().await;
        Ok(inner.state.accounts.values().cloned().collect())
    }

    async fn add(&self, account: Account) -> BudgetResult<()> {
        let mut inner = self.inner.lock().await;
        inner.state.accounts.insert(account.id.clone(), account);
        Ok(())
    }

    async fn update(&self, account: Account) -> BudgetResult<()> {
        let mut inner = self.inner.lock().await;
        if !inner.state.accounts.contains_key(&account.id) {
            return Err(BudgetError::unexpected("account not found"));
        }
        inner.state.accounts.insert(account.id.clone(), account);
        Ok(())
    }

    async fn delete(&self, id: &AccountId) -> BudgetResult<()> {
        let mut inner = self.inner.lock().await;
        inner.state.accounts.remove(id);
        Ok(())
    }

    async fn exists_by_id(&self, id: &AccountId) -> BudgetResult<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.state.accounts.contains_key(id))
    }

    async fn account_balance(&self, id: &AccountId) -> BudgetResult<Money> {
        let inner = self.inner.lock().await;
        let currency = inner
            .state
            .accounts
            .get(id)
            .map(|a| a.currency().to_string())
            .unwrap_or_else(|| "USD".to_string());
        let mut total = Money::zero(&currency);
        for txn in inner.state.transactions.values() {
            if txn.account_id == *id && !txn.is_deleted {
                total = total.add(&txn.amount)?;
            }
        }
        Ok(total)
    }

    async fn account_cleared_balance(&self, id: &AccountId) -> BudgetResult<Money> {
        let inner = self.inner.lock().await;
        let currency = inner
            .state
            .accounts
            .get(id)
            .map(|a| a.currency().to_string())
            .unwrap_or_else(|| "USD".to_string());
        let mut total = Money::zero(&currency);
        for txn in inner.state.transactions.values() {
            if txn.account_id == *id && !txn.is_deleted && txn.is_cleared {
                total = total.add(&txn.amount)?;
            }
        }
        Ok(total)
    }
}

#[async_trait]
impl EnvelopeRepository for InMemoryStore {
    async fn get_by_id(&self, id: &EnvelopeId) -> BudgetResult<Option<Envelope>> {
        let inner = self.inner.lock().await;
        Ok(inner.state.envelopes.get(id).cloned())
    }

    async fn get_all(&self) -> BudgetResult<Vec<Envelope>> {
        let inner = self.inner.lock().await;
        Ok(inner.state.envelopes.values().cloned().collect())
    }

    async fn add(&self, envelope: Envelope) -> BudgetResult<()> {
        let mut inner = self.inner.lock().await;
        inner.state.envelopes.insert(envelope.id.clone(), envelope);
        Ok(())
    }

    async fn update(&self, envelope: Envelope) -> BudgetResult<()> {
        let mut inner = self.inner.lock().await;
        if !inner.state.envelopes.contains_key(&envelope.id) {
            return Err(BudgetError::unexpected("envelope not found"));
        }
        inner.state.envelopes.insert(envelope.id.clone(), envelope);
        Ok(())
    }

    async fn delete(&self, id: &EnvelopeId) -> BudgetResult<()> {
        let mut inner = self.inner.lock().await;
        inner.state.envelopes.remove(id);
        Ok(())
    }

    async fn exists_by_id(&self, id: &EnvelopeId) -> BudgetResult<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.state.envelopes.contains_key(id))
    }
}

#[async_trait]
impl TransactionRepository for InMemoryStore {
    async fn get_by_id(&self, id: &TransactionId) -> BudgetResult<Option<Transaction>> {
        let inner = self.inner.lock().await;
        Ok(inner.state.transactions.get(id).cloned())
    }

    async fn get_all(&self) -> BudgetResult<Vec<Transaction>> {
        let inner = self.inner.lock().await;
        Ok(inner.state.transactions.values().cloned().collect())
    }

    async fn add(&self, transaction: Transaction) -> BudgetResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .state
            .transactions
            .insert(transaction.id.clone(), transaction);
        Ok(())
    }

    async fn update(&self, transaction: Transaction) -> BudgetResult<()> {
        let mut inner = self.inner.lock().await;
        if !inner.state.transactions.contains_key(&transaction.id) {
            return Err(BudgetError::unexpected("transaction not found"));
        }
        inner
            .state
            .transactions
            .insert(transaction.id.clone(), transaction);
        Ok(())
    }

    async fn delete(&self, id: &TransactionId) -> BudgetResult<()> {
        let mut inner = self.inner.lock().await;
        inner.state.transactions.remove(id);
        Ok(())
    }

    async fn exists_by_id(&self, id: &TransactionId) -> BudgetResult<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.state.transactions.contains_key(id))
    }

    async fn by_account(&self, account_id: &AccountId) -> BudgetResult<Vec<Transaction>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .state
            .transactions
            .values()
            .filter(|t| t.account_id == *account_id && !t.is_deleted)
            .cloned()
            .collect())
    }

    async fn by_envelope(&self, envelope_id: &EnvelopeId) -> BudgetResult<Vec<Transaction>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .state
            .transactions
            .values()
            .filter(|t| t.envelope_id.as_deref() == Some(envelope_id.as_str()) && !t.is_deleted)
            .cloned()
            .collect())
    }

    async fn by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BudgetResult<Vec<Transaction>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .state
            .transactions
            .values()
            .filter(|t| !t.is_deleted && t.date >= start && t.date <= end)
            .cloned()
            .collect())
    }

    async fn by_account_and_date_range(
        &self,
        account_id: &AccountId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BudgetResult<Vec<Transaction>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .state
            .transactions
            .values()
            .filter(|t| {
                !t.is_deleted && t.account_id == *account_id && t.date >= start && t.date <= end
            })
            .cloned()
            .collect())
    }

    async fn uncleared_by_account(&self, account_id: &AccountId) -> BudgetResult<Vec<Transaction>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .state
            .transactions
            .values()
            .filter(|t| t.account_id == *account_id && !t.is_deleted && !t.is_cleared)
            .cloned()
            .collect())
    }

    async fn unassigned(&self, account_id: &AccountId) -> BudgetResult<Vec<Transaction>> {
        let inner = self.inner.lock().await;
        let mut result = Vec::new();
        for t in inner.state.transactions.values() {
            if t.account_id != *account_id
                || t.is_deleted
                || t.is_transfer()
                || t.transaction_type != TransactionType::Outflow
                || t.envelope_id.is_some()
            {
                continue;
            }
            let has_splits = inner
                .state
                .splits
                .values()
                .any(|s| s.transaction_id == t.id);
            if !has_splits {
                result.push(t.clone());
            }
        }
        Ok(result)
    }

    async fn envelope_spent_in_range(
        &self,
        envelope_id: &EnvelopeId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BudgetResult<Money> {
        let inner = self.inner.lock().await;
        let currency = inner
            .state
            .transactions
            .values()
            .find(|t| t.date >= start && t.date <= end)
            .map(|t| t.amount.currency().to_string())
            .unwrap_or_else(|| "USD".to_string());
        let mut total = Money::zero(&currency);
        for t in inner.state.transactions.values() {
            if t.is_deleted || t.date < start || t.date > end {
                continue;
            }
            if t.transaction_type == TransactionType::Outflow
                && t.envelope_id.as_deref() == Some(envelope_id.as_str())
            {
                total = total.add(&t.amount.abs())?;
            }
        }
        for s in inner.state.splits.values() {
            if s.envelope_id != *envelope_id {
                continue;
            }
            if let Some(parent) = inner.state.transactions.get(&s.transaction_id)
                && !parent.is_deleted
                && parent.date >= start
                && parent.date <= end
            {
                total = total.add(&s.amount)?;
            }
        }
        Ok(total)
    }

    async fn totals_for_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        currency: &str,
    ) -> BudgetResult<(Money, Money)> {
        let inner = self.inner.lock().await;
        let mut income = Money::zero(currency);
        let mut spent = Money::zero(currency);
        for t in inner.state.transactions.values() {
            if t.is_deleted || t.is_transfer() || t.date < start || t.date > end {
                continue;
            }
            match t.transaction_type {
                TransactionType::Inflow => income = income.add(&t.amount)?,
                TransactionType::Outflow => spent = spent.add(&t.amount.abs())?,
                TransactionType::Transfer => {}
            }
        }
        Ok((income, spent))
    }
}

#[async_trait]
impl TransactionSplitRepository for InMemoryStore {
    async fn get_by_id(&self, id: &SplitLineId) -> BudgetResult<Option<TransactionSplitLine>> {
        let inner = self.inner.lock().await;
        Ok(inner.state.splits.get(id).cloned())
    }

    async fn by_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> BudgetResult<Vec<TransactionSplitLine>> {
        let inner = self.inner.lock().await;
        let mut lines: Vec<_> = inner
            .state
            .splits
            .values()
            .filter(|s| s.transaction_id == *transaction_id)
            .cloned()
            .collect();
        lines.sort_by_key(|s| s.sort_order);
        Ok(lines)
    }

    async fn add(&self, split: TransactionSplitLine) -> BudgetResult<()> {
        let mut inner = self.inner.lock().await;
        inner.state.splits.insert(split.id.clone(), split);
        Ok(())
    }

    async fn delete_by_transaction(&self, transaction_id: &TransactionId) -> BudgetResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .state
            .splits
            .retain(|_, s| s.transaction_id != *transaction_id);
        Ok(())
    }
}

#[async_trait]
impl BudgetPeriodRepository for InMemoryStore {
    async fn get_by_id(&self, id: &BudgetPeriodId) -> BudgetResult<Option<BudgetPeriod>> {
        let inner = self.inner.lock().await;
        Ok(inner.state.periods.get(id).cloned())
    }

    async fn get_by_year_month(
        &self,
        year: i32,
        month: u32,
    ) -> BudgetResult<Option<BudgetPeriod>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .state
            .periods
            .values()
            .find(|p| p.year == year && p.month == month)
            .cloned())
    }

    async fn get_all(&self) -> BudgetResult<Vec<BudgetPeriod>> {
        let inner = self.inner.lock().await;
        Ok(inner.state.periods.values().cloned().collect())
    }

    async fn add(&self, period: BudgetPeriod) -> BudgetResult<()> {
        let mut inner = self.inner.lock().await;
        inner.state.periods.insert(period.id.clone(), period);
        Ok(())
    }

    async fn update(&self, period: BudgetPeriod) -> BudgetResult<()> {
        let mut inner = self.inner.lock().await;
        if !inner.state.periods.contains_key(&period.id) {
            return Err(BudgetError::unexpected("budget period not found"));
        }
        inner.state.periods.insert(period.id.clone(), period);
        Ok(())
    }

    async fn delete(&self, id: &BudgetPeriodId) -> BudgetResult<()> {
        let mut inner = self.inner.lock().await;
        inner.state.periods.remove(id);
        Ok(())
    }

    async fn exists_by_id(&self, id: &BudgetPeriodId) -> BudgetResult<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.state.periods.contains_key(id))
    }
}

#[async_trait]
impl EnvelopeAllocationRepository for InMemoryStore {
    async fn get_by_id(&self, id: &AllocationId) -> BudgetResult<Option<EnvelopeAllocation>> {
        let inner = self.inner.lock().await;
        Ok(inner.state.allocations.get(id).cloned())
    }

    async fn get_by_envelope_and_period(
        &self,
        envelope_id: &EnvelopeId,
        period_id: &BudgetPeriodId,
    ) -> BudgetResult<Option<EnvelopeAllocation>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .state
            .allocations
            .values()
            .find(|a| a.envelope_id == *envelope_id && a.budget_period_id == *period_id)
            .cloned())
    }

    async fn by_period(
        &self,
        period_id: &BudgetPeriodId,
    ) -> BudgetResult<Vec<EnvelopeAllocation>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .state
            .allocations
            .values()
            .filter(|a| a.budget_period_id == *period_id)
            .cloned()
            .collect())
    }

    async fn add(&self, allocation: EnvelopeAllocation) -> BudgetResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .state
            .allocations
            .insert(allocation.id.clone(), allocation);
        Ok(())
    }

    async fn update(&self, allocation: EnvelopeAllocation) -> BudgetResult<()> {
        let mut inner = self.inner.lock().await;
        if !inner.state.allocations.contains_key(&allocation.id) {
            return Err(BudgetError::unexpected("allocation not found"));
        }
        inner
            .state
            .allocations
            .insert(allocation.id.clone(), allocation);
        Ok(())
    }

    async fn delete(&self, id: &AllocationId) -> BudgetResult<()> {
        let mut inner = self.inner.lock().await;
        inner.state.allocations.remove(id);
        Ok(())
    }

    async fn exists_by_id(&self, id: &AllocationId) -> BudgetResult<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.state.allocations.contains_key(id))
    }

    async fn period_total_allocated(
        &self,
        period_id: &BudgetPeriodId,
        currency: &str,
    ) -> BudgetResult<Money> {
        let inner = self.inner.lock().await;
        let mut total = Money::zero(currency);
        for a in inner.state.allocations.values() {
            if a.budget_period_id == *period_id {
                total = total.add(&a.allocated)?;
            }
        }
        Ok(total)
    }
}

#[async_trait]
impl PayeeRepository for InMemoryStore {
    async fn get_by_id(&self, id: &PayeeId) -> BudgetResult<Option<Payee>> {
        let inner = self.inner.lock().await;
        Ok(inner.state.payees.get(id).cloned())
    }

    async fn get_all(&self) -> BudgetResult<Vec<Payee>> {
        let inner = self.inner.lock().await;
        Ok(inner.state.payees.values().cloned().collect())
    }

    async fn add(&self, payee: Payee) -> BudgetResult<()> {
        let mut inner = self.inner.lock().await;
        inner.state.payees.insert(payee.id.clone(), payee);
        Ok(())
    }

    async fn update(&self, payee: Payee) -> BudgetResult<()> {
        let mut inner = self.inner.lock().await;
        if !inner.state.payees.contains_key(&payee.id) {
            return Err(BudgetError::unexpected("payee not found"));
        }
        inner.state.payees.insert(payee.id.clone(), payee);
        Ok(())
    }

    async fn delete(&self, id: &PayeeId) -> BudgetResult<()> {
        let mut inner = self.inner.lock().await;
        inner.state.payees.remove(id);
        Ok(())
    }

    async fn exists_by_id(&self, id: &PayeeId) -> BudgetResult<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.state.payees.contains_key(id))
    }

    async fn get_by_name(&self, name: &str) -> BudgetResult<Option<Payee>> {
        let inner = self.inner.lock().await;
        let normalized = Payee::normalize_name(name);
        Ok(inner
            .state
            .payees
            .values()
            .find(|p| p.name.eq_ignore_ascii_case(&normalized))
            .cloned())
    }

    async fn search(&self, query: &str) -> BudgetResult<Vec<Payee>> {
        let inner = self.inner.lock().await;
        let needle = query.to_ascii_lowercase();
        let mut matches: Vec<Payee> = inner
            .state
            .payees
            .values()
            .filter(|p| p.name.to_ascii_lowercase().contains(&needle))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.transaction_count.cmp(&a.transaction_count));
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::entities::AccountType;

    fn now() -> chrono::DateTime<Utc> {
        Utc::now()
    }

    #[tokio::test]
    async fn rollback_restores_prior_state() {
        let store = InMemoryStore::new();
        let account = Account::new(
            "a1".into(),
            "Checking",
            AccountType::Checking,
            "USD",
            0,
            now(),
        )
        .expect("account");
        store.add(account.clone()).await.expect("add");

        store.begin().await.expect("begin");
        store.delete(&account.id).await.expect("delete");
        assert!(!store.exists_by_id(&account.id).await.expect("exists"));
        store.rollback().await.expect("rollback");

        assert!(store.exists_by_id(&account.id).await.expect("exists"));
    }

    #[tokio::test]
    async fn commit_discards_snapshot() {
        let store = InMemoryStore::new();
        store.begin().await.expect("begin");
        let account = Account::new(
            "a1".into(),
            "Checking",
            AccountType::Checking,
            "USD",
            0,
            now(),
        )
        .expect("account");
        store.add(account.clone()).await.expect("add");
        store.commit().await.expect("commit");
        store.rollback().await.expect("rollback after commit is a no-op");
        assert!(store.exists_by_id(&account.id).await.expect("exists"));
    }
}
