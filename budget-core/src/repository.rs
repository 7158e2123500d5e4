use async_trait::async_trait;
use chrono::NaiveDate;

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
use crate::error::BudgetResult;
use crate::money::Money;

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn get_by_id(&self, id: &AccountId) -> BudgetResult<Option<Account>>;
    async fn get_all(&self) -> BudgetResult<Vec<Account>>;
    async fn add(&self, account: Account) -> BudgetResult<()>;
    async fn update(&self, account: Account) -> BudgetResult<()>;
    async fn delete(&self, id: &AccountId) -> BudgetResult<()>;
    async fn exists_by_id(&self, id: &AccountId) -> BudgetResult<bool>;

    /// Sum of non-deleted transaction amounts on this account.
    async fn account_balance(&self, id: &AccountId) -> BudgetResult<Money>;
    /// Same as above, restricted to cleared transactions.
    async fn account_cleared_balance(&self, id: &AccountId) -> BudgetResult<Money>;
}

#[async_trait]
pub trait EnvelopeRepository: Send + Sync {
    async fn get_by_id(&self, id: &EnvelopeId) -> BudgetResult<Option<Envelope>>;
    async fn get_all(&self) -> BudgetResult<Vec<Envelope>>;
    async fn add(&self, envelope: Envelope) -> BudgetResult<()>;
    async fn update(&self, envelope: Envelope) -> BudgetResult<()>;
    async fn delete(&self, id: &EnvelopeId) -> BudgetResult<()>;
    async fn exists_by_id(&self, id: &EnvelopeId) -> BudgetResult<bool>;
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn get_by_id(&self, id: &TransactionId) -> BudgetResult<Option<Transaction>>;
    async fn get_all(&self) -> BudgetResult<Vec<Transaction>>;
    async fn add(&self, transaction: Transaction) -> BudgetResult<()>;
    async fn update(&self, transaction: Transaction) -> BudgetResult<()>;
    async fn delete(&self, id: &TransactionId) -> BudgetResult<()>;
    async fn exists_by_id(&self, id: &TransactionId) -> BudgetResult<bool>;

    async fn by_account(&self, account_id: &AccountId) -> BudgetResult<Vec<Transaction>>;
    async fn by_envelope(&self, envelope_id: &EnvelopeId) -> BudgetResult<Vec<Transaction>>;
    async fn by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BudgetResult<Vec<Transaction>>;
    async fn by_account_and_date_range(
        &self,
        account_id: &AccountId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BudgetResult<Vec<Transaction>>;
    async fn uncleared_by_account(&self, account_id: &AccountId) -> BudgetResult<Vec<Transaction>>;
    /// Outflows with no envelope and no splits, excluding transfers and
    /// soft-deleted rows.
    async fn unassigned(&self, account_id: &AccountId) -> BudgetResult<Vec<Transaction>>;
    /// Sum of direct-assignment outflows plus split contributions to this
    /// envelope within `[start, end]`, always non-negative.
    async fn envelope_spent_in_range(
        &self,
        envelope_id: &EnvelopeId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BudgetResult<Money>;
    /// `(incomeSum, spentAbsSum)` over `[start, end]`, excluding transfers
    /// and soft-deleted rows.
    async fn totals_for_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        currency: &str,
    ) -> BudgetResult<(Money, Money)>;
}

#[async_trait]
pub trait TransactionSplitRepository: Send + Sync {
    async fn get_by_id(&self, id: &SplitLineId) -> BudgetResult<Option<TransactionSplitLine>>;
    async fn by_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> BudgetResult<Vec<TransactionSplitLine>>;
    async fn add(&self, split: TransactionSplitLine) -> BudgetResult<()>;
    async fn delete_by_transaction(&self, transaction_id: &TransactionId) -> BudgetResult<()>;
}

#[async_trait]
pub trait BudgetPeriodRepository: Send + Sync {
    async fn get_by_id(&self, id: &BudgetPeriodId) -> BudgetResult<Option<BudgetPeriod>>;
    async fn get_by_year_month(
        &self,
        year: i32,
        month: u32,
    ) -> BudgetResult<Option<BudgetPeriod>>;
    async fn get_all(&self) -> BudgetResult<Vec<BudgetPeriod>>;
    async fn add(&self, period: BudgetPeriod) -> BudgetResult<()>;
    async fn update(&self, period: BudgetPeriod) -> BudgetResult<()>;
    async fn delete(&self, id: &BudgetPeriodId) -> BudgetResult<()>;
    async fn exists_by_id(&self, id: &BudgetPeriodId) -> BudgetResult<bool>;
}

#[async_trait]
pub trait EnvelopeAllocationRepository: Send + Sync {
    async fn get_by_id(&self, id: &AllocationId) -> BudgetResult<Option<EnvelopeAllocation>>;
    async fn get_by_envelope_and_period(
        &self,
        envelope_id: &EnvelopeId,
        period_id: &BudgetPeriodId,
    ) -> BudgetResult<Option<EnvelopeAllocation>>;
    async fn by_period(
        &self,
        period_id: &BudgetPeriodId,
    ) -> BudgetResult<Vec<EnvelopeAllocation>>;
    async fn add(&self, allocation: EnvelopeAllocation) -> BudgetResult<()>;
    async fn update(&self, allocation: EnvelopeAllocation) -> BudgetResult<()>;
    async fn delete(&self, id: &AllocationId) -> BudgetResult<()>;
    async fn exists_by_id(&self, id: &AllocationId) -> BudgetResult<bool>;
    /// Sum of `allocated` across every allocation of a period.
    async fn period_total_allocated(
        &self,
        period_id: &BudgetPeriodId,
        currency: &str,
    ) -> BudgetResult<Money>;
}

#[async_trait]
pub trait PayeeRepository: Send + Sync {
    async fn get_by_id(&self, id: &PayeeId) -> BudgetResult<Option<Payee>>;
    async fn get_all(&self) -> BudgetResult<Vec<Payee>>;
    async fn add(&self, payee: Payee) -> BudgetResult<()>;
    async fn update(&self, payee: Payee) -> BudgetResult<()>;
    async fn delete(&self, id: &PayeeId) -> BudgetResult<()>;
    async fn exists_by_id(&self, id: &PayeeId) -> BudgetResult<bool>;

    /// Case-insensitive exact match on the normalized name.
    async fn get_by_name(&self, name: &str) -> BudgetResult<Option<Payee>>;
    /// Prefix-or-substring search, ranked by `transactionCount desc`.
    async fn search(&self, query: &str) -> BudgetResult<Vec<Payee>>;
}

/// A scoped transaction over the store. All engine operations that mutate
/// state begin exactly one unit of work and commit or roll it back before
/// returning.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn begin(&self) -> BudgetResult<()>;
    async fn commit(&self) -> BudgetResult<()>;
    async fn rollback(&self) -> BudgetResult<()>;

    fn accounts(&self) -> &dyn AccountRepository;
    fn envelopes(&self) -> &dyn EnvelopeRepository;
    fn transactions(&self) -> &dyn TransactionRepository;
    fn splits(&self) -> &dyn TransactionSplitRepository;
    fn periods(&self) -> &dyn BudgetPeriodRepository;
    fn allocations(&self) -> &dyn EnvelopeAllocationRepository;
    fn payees(&self) -> &dyn PayeeRepository;
}
