use chrono::DateTime;
use chrono::NaiveDate;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::error::BudgetError;
use crate::error::BudgetResult;
use crate::money::Money;

pub type AccountId = String;
pub type EnvelopeId = String;
pub type TransactionId = String;
pub type SplitLineId = String;
pub type BudgetPeriodId = String;
pub type AllocationId = String;
pub type PayeeId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    Checking,
    Savings,
    CreditCard,
    Cash,
    LineOfCredit,
    Investment,
    Other,
}

impl AccountType {
    /// Credit-type accounts count their balance toward liabilities
    /// regardless of sign.
    #[must_use]
    pub fn is_liability(&self) -> bool {
        matches!(self, AccountType::CreditCard | AccountType::LineOfCredit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    Inflow,
    Outflow,
    Transfer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub account_type: AccountType,
    pub balance: Money,
    pub cleared_balance: Money,
    pub uncleared_balance: Money,
    pub is_active: bool,
    pub is_on_budget: bool,
    pub sort_order: i64,
    pub note: Option<String>,
    pub last_reconciled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(
        id: AccountId,
        name: impl Into<String>,
        account_type: AccountType,
        currency: &str,
        sort_order: i64,
        now: DateTime<Utc>,
    ) -> BudgetResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(BudgetError::validation_field("name is required", "name"));
        }
        Ok(Self {
            id,
            name,
            account_type,
            balance: Money::zero(currency),
            cleared_balance: Money::zero(currency),
            uncleared_balance: Money::zero(currency),
            is_active: true,
            is_on_budget: true,
            sort_order,
            note: None,
            last_reconciled_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    #[must_use]
    pub fn currency(&self) -> &str {
        self.balance.currency()
    }

    /// Recomputes `balance` from cleared/uncleared components. Callers
    /// (the transaction and reconciliation services) supply freshly summed
    /// cleared/uncleared totals; this method only enforces the invariant
    /// `balance = cleared + uncleared` and stamps `updated_at`.
    pub fn refresh_balances(
        &mut self,
        cleared: Money,
        uncleared: Money,
        now: DateTime<Utc>,
    ) -> BudgetResult<()> {
        self.balance = cleared.add(&uncleared)?;
        self.cleared_balance = cleared;
        self.uncleared_balance = uncleared;
        self.updated_at = now;
        Ok(())
    }

    pub fn set_last_reconciled_at(&mut self, at: DateTime<Utc>, now: DateTime<Utc>) {
        self.last_reconciled_at = Some(at);
        self.updated_at = now;
    }

    pub fn rename(&mut self, name: impl Into<String>, now: DateTime<Utc>) -> BudgetResult<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(BudgetError::validation_field("name is required", "name"));
        }
        self.name = name;
        self.updated_at = now;
        Ok(())
    }

    /// Closing an account requires a zero balance.
    pub fn close(&mut self, now: DateTime<Utc>) -> BudgetResult<()> {
        if !self.balance.is_zero() {
            return Err(BudgetError::invalid_operation(
                "account balance must be zero to close",
            ));
        }
        self.is_active = false;
        self.updated_at = now;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: EnvelopeId,
    pub name: String,
    pub group: Option<String>,
    pub color: String,
    pub sort_order: i64,
    pub is_active: bool,
    pub is_hidden: bool,
    pub goal_amount: Option<Money>,
    pub goal_date: Option<NaiveDate>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Envelope {
    pub fn new(
        id: EnvelopeId,
        name: impl Into<String>,
        color: impl Into<String>,
        sort_order: i64,
        now: DateTime<Utc>,
    ) -> BudgetResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(BudgetError::validation_field("name is required", "name"));
        }
        Ok(Self {
            id,
            name,
            group: None,
            color: color.into(),
            sort_order,
            is_active: true,
            is_hidden: false,
            goal_amount: None,
            goal_date: None,
            note: None,
            created_at: now,
            updated_at: now,
        })
    }

    #[must_use]
    pub fn has_goal(&self) -> bool {
        self.goal_amount.is_some_and(|g| !g.is_zero())
    }

    pub fn set_goal(
        &mut self,
        amount: Money,
        target_date: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> BudgetResult<()> {
        if !amount.is_positive() {
            return Err(BudgetError::validation_field(
                "goal amount must be positive",
                "amount",
            ));
        }
        self.goal_amount = Some(amount);
        self.goal_date = target_date;
        self.updated_at = now;
        Ok(())
    }

    pub fn archive(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub envelope_id: Option<EnvelopeId>,
    pub transfer_account_id: Option<AccountId>,
    pub linked_transaction_id: Option<TransactionId>,
    pub date: NaiveDate,
    pub amount: Money,
    pub payee: String,
    pub memo: Option<String>,
    pub transaction_type: TransactionType,
    pub is_cleared: bool,
    pub is_reconciled: bool,
    pub is_approved: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: TransactionId,
        account_id: AccountId,
        transaction_type: TransactionType,
        amount: Money,
        date: NaiveDate,
        payee: impl Into<String>,
        now: DateTime<Utc>,
    ) -> BudgetResult<Self> {
        let payee = payee.into();
        let signed = match transaction_type {
            TransactionType::Inflow => {
                if !amount.is_positive() && !amount.is_zero() {
                    return Err(BudgetError::validation_field(
                        "inflow amount must not be negative",
                        "amount",
                    ));
                }
                amount
            }
            TransactionType::Outflow => {
                if amount.is_negative() {
                    amount
                } else {
                    amount.negate()
                }
            }
            TransactionType::Transfer => amount,
        };
        Ok(Self {
            id,
            account_id,
            envelope_id: None,
            transfer_account_id: None,
            linked_transaction_id: None,
            date,
            amount: signed,
            payee,
            memo: None,
            transaction_type,
            is_cleared: false,
            is_reconciled: false,
            is_approved: true,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        })
    }

    fn ensure_editable(&self) -> BudgetResult<()> {
        if self.is_reconciled {
            return Err(BudgetError::invalid_operation(
                "cannot edit a reconciled transaction",
            ));
        }
        Ok(())
    }

    pub fn set_amount(&mut self, amount: Money, now: DateTime<Utc>) -> BudgetResult<()> {
        self.ensure_editable()?;
        let signed = match self.transaction_type {
            TransactionType::Outflow => {
                if amount.is_negative() {
                    amount
                } else {
                    amount.negate()
                }
            }
            _ => amount,
        };
        self.amount = signed;
        self.updated_at = now;
        Ok(())
    }

    pub fn set_date(&mut self, date: NaiveDate, now: DateTime<Utc>) -> BudgetResult<()> {
        self.ensure_editable()?;
        self.date = date;
        self.updated_at = now;
        Ok(())
    }

    pub fn set_payee(&mut self, payee: impl Into<String>, now: DateTime<Utc>) -> BudgetResult<()> {
        self.ensure_editable()?;
        self.payee = payee.into();
        self.updated_at = now;
        Ok(())
    }

    pub fn set_memo(&mut self, memo: Option<String>, now: DateTime<Utc>) -> BudgetResult<()> {
        self.ensure_editable()?;
        self.memo = memo;
        self.updated_at = now;
        Ok(())
    }

    pub fn set_envelope(
        &mut self,
        envelope_id: Option<EnvelopeId>,
        now: DateTime<Utc>,
    ) -> BudgetResult<()> {
        self.ensure_editable()?;
        if self.transaction_type == TransactionType::Transfer && envelope_id.is_some() {
            return Err(BudgetError::invalid_operation(
                "transfers cannot carry an envelope assignment",
            ));
        }
        self.envelope_id = envelope_id;
        self.updated_at = now;
        Ok(())
    }

    pub fn set_transfer_account(&mut self, transfer_account_id: AccountId) {
        self.transfer_account_id = Some(transfer_account_id);
    }

    /// Second phase of transfer linking: sets the paired transaction id
    /// after both sides have been inserted.
    pub fn link_transfer(&mut self, linked_id: TransactionId, now: DateTime<Utc>) {
        self.linked_transaction_id = Some(linked_id);
        self.updated_at = now;
    }

    pub fn mark_cleared(&mut self, now: DateTime<Utc>) {
        self.is_cleared = true;
        self.updated_at = now;
    }

    pub fn mark_uncleared(&mut self, now: DateTime<Utc>) -> BudgetResult<()> {
        if self.is_reconciled {
            return Err(BudgetError::invalid_operation(
                "cannot unclear a reconciled transaction",
            ));
        }
        self.is_cleared = false;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_reconciled(&mut self, now: DateTime<Utc>) {
        self.is_cleared = true;
        self.is_reconciled = true;
        self.updated_at = now;
    }

    pub fn soft_delete(&mut self, now: DateTime<Utc>) -> BudgetResult<()> {
        self.ensure_editable()?;
        self.is_deleted = true;
        self.updated_at = now;
        Ok(())
    }

    #[must_use]
    pub fn is_transfer(&self) -> bool {
        self.transaction_type == TransactionType::Transfer
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSplitLine {
    pub id: SplitLineId,
    pub transaction_id: TransactionId,
    pub envelope_id: EnvelopeId,
    pub amount: Money,
    pub sort_order: i64,
}

impl TransactionSplitLine {
    pub fn new(
        id: SplitLineId,
        transaction_id: TransactionId,
        envelope_id: EnvelopeId,
        amount: Money,
        sort_order: i64,
    ) -> BudgetResult<Self> {
        if !amount.is_positive() {
            return Err(BudgetError::validation_field(
                "split amount must be positive",
                "amount",
            ));
        }
        if sort_order < 0 {
            return Err(BudgetError::validation_field(
                "sort order must be non-negative",
                "sortOrder",
            ));
        }
        Ok(Self {
            id,
            transaction_id,
            envelope_id,
            amount,
            sort_order,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetPeriod {
    pub id: BudgetPeriodId,
    pub year: i32,
    pub month: u32,
    pub total_income: Money,
    pub total_allocated: Money,
    pub total_spent: Money,
    pub carried_over: Money,
    pub is_closed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BudgetPeriod {
    pub fn new(
        id: BudgetPeriodId,
        year: i32,
        month: u32,
        currency: &str,
        now: DateTime<Utc>,
    ) -> BudgetResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(BudgetError::validation_field(
                "month must be between 1 and 12",
                "month",
            ));
        }
        Ok(Self {
            id,
            year,
            month,
            total_income: Money::zero(currency),
            total_allocated: Money::zero(currency),
            total_spent: Money::zero(currency),
            carried_over: Money::zero(currency),
            is_closed: false,
            created_at: now,
            updated_at: now,
        })
    }

    #[must_use]
    pub fn currency(&self) -> &str {
        self.total_income.currency()
    }

    pub fn ready_to_assign(&self) -> BudgetResult<Money> {
        self.total_income
            .add(&self.carried_over)?
            .sub(&self.total_allocated)
    }

    pub fn remaining(&self) -> BudgetResult<Money> {
        self.total_allocated.sub(&self.total_spent)
    }

    /// Used by the recalculation service to persist freshly derived totals.
    pub fn set_totals(
        &mut self,
        total_income: Money,
        total_spent: Money,
        total_allocated: Money,
        now: DateTime<Utc>,
    ) -> BudgetResult<()> {
        if self.is_closed {
            return Err(BudgetError::invalid_operation(
                "cannot recalculate a closed period",
            ));
        }
        self.total_income = total_income;
        self.total_spent = total_spent;
        self.total_allocated = total_allocated;
        self.updated_at = now;
        Ok(())
    }

    pub fn set_carried_over(&mut self, carried_over: Money, now: DateTime<Utc>) {
        self.carried_over = carried_over;
        self.updated_at = now;
    }

    pub fn close(&mut self, now: DateTime<Utc>) {
        self.is_closed = true;
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeAllocation {
    pub id: AllocationId,
    pub envelope_id: EnvelopeId,
    pub budget_period_id: BudgetPeriodId,
    pub allocated: Money,
    pub rollover_from_previous: Money,
    pub spent: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EnvelopeAllocation {
    pub fn new(
        id: AllocationId,
        envelope_id: EnvelopeId,
        budget_period_id: BudgetPeriodId,
        currency: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            envelope_id,
            budget_period_id,
            allocated: Money::zero(currency),
            rollover_from_previous: Money::zero(currency),
            spent: Money::zero(currency),
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn currency(&self) -> &str {
        self.allocated.currency()
    }

    pub fn available(&self) -> BudgetResult<Money> {
        self.allocated
            .add(&self.rollover_from_previous)?
            .sub(&self.spent)
    }

    pub fn total_budgeted(&self) -> BudgetResult<Money> {
        self.allocated.add(&self.rollover_from_previous)
    }

    pub fn set_allocated(&mut self, amount: Money, now: DateTime<Utc>) -> BudgetResult<()> {
        if amount.is_negative() {
            return Err(BudgetError::validation_field(
                "allocated amount must not be negative",
                "amount",
            ));
        }
        self.allocated = amount;
        self.updated_at = now;
        Ok(())
    }

    /// Used by the recalculation service; `spent` is always derived from
    /// raw transactions and is never negative.
    pub fn set_spent(&mut self, spent: Money, now: DateTime<Utc>) -> BudgetResult<()> {
        if spent.is_negative() {
            return Err(BudgetError::unexpected("derived spent must not be negative"));
        }
        self.spent = spent;
        self.updated_at = now;
        Ok(())
    }

    pub fn set_rollover(&mut self, rollover: Money, now: DateTime<Utc>) {
        self.rollover_from_previous = rollover;
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payee {
    pub id: PayeeId,
    pub name: String,
    pub default_envelope_id: Option<EnvelopeId>,
    pub is_hidden: bool,
    pub transaction_count: u64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payee {
    pub fn new(id: PayeeId, name: impl Into<String>, now: DateTime<Utc>) -> BudgetResult<Self> {
        let name = Payee::normalize_name(&name.into());
        if name.is_empty() {
            return Err(BudgetError::validation_field("name is required", "name"));
        }
        Ok(Self {
            id,
            name,
            default_envelope_id: None,
            is_hidden: false,
            transaction_count: 0,
            last_used_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Trims and collapses internal whitespace, as payee names are matched
    /// case-sensitively but must be free of incidental whitespace drift.
    #[must_use]
    pub fn normalize_name(raw: &str) -> String {
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    pub fn record_usage(&mut self, at: DateTime<Utc>) {
        self.transaction_count += 1;
        self.last_used_at = Some(at);
        self.updated_at = at;
    }

    pub fn set_default_envelope_if_absent(&mut self, envelope_id: EnvelopeId, now: DateTime<Utc>) {
        if self.default_envelope_id.is_none() {
            self.default_envelope_id = Some(envelope_id);
            self.updated_at = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-01T00:00:00Z")
            .expect("timestamp")
            .with_timezone(&Utc)
    }

    #[test]
    fn outflow_amount_is_always_negative() {
        let amount = Money::from_minor_units(2500, "USD").expect("money");
        let txn = Transaction::new(
            "t1".into(),
            "a1".into(),
            TransactionType::Outflow,
            amount,
            NaiveDate::from_ymd_opt(2026, 2, 10).expect("date"),
            "Coffee",
            now(),
        )
        .expect("txn");
        assert!(txn.amount.is_negative());
    }

    #[test]
    fn reconciled_transaction_rejects_edits() {
        let amount = Money::from_minor_units(100, "USD").expect("money");
        let mut txn = Transaction::new(
            "t1".into(),
            "a1".into(),
            TransactionType::Inflow,
            amount,
            NaiveDate::from_ymd_opt(2026, 2, 10).expect("date"),
            "Paycheck",
            now(),
        )
        .expect("txn");
        txn.mark_reconciled(now());
        assert!(txn.set_payee("Other", now()).is_err());
        assert!(txn.mark_uncleared(now()).is_err());
        assert!(txn.soft_delete(now()).is_err());
    }

    #[test]
    fn transfer_rejects_envelope_assignment() {
        let amount = Money::from_minor_units(100, "USD").expect("money");
        let mut txn = Transaction::new(
            "t1".into(),
            "a1".into(),
            TransactionType::Transfer,
            amount,
            NaiveDate::from_ymd_opt(2026, 2, 10).expect("date"),
            "Transfer",
            now(),
        )
        .expect("txn");
        assert!(txn.set_envelope(Some("e1".into()), now()).is_err());
    }

    #[test]
    fn payee_name_collapses_whitespace() {
        assert_eq!(Payee::normalize_name("  Whole   Foods  "), "Whole Foods");
    }

    #[test]
    fn closed_period_rejects_set_totals() {
        let mut period = BudgetPeriod::new("p1".into(), 2026, 2, "USD", now()).expect("period");
        period.close(now());
        let zero = Money::zero("USD");
        assert!(period.set_totals(zero, zero, zero, now()).is_err());
    }

    #[test]
    fn allocation_rejects_negative_amount() {
        let mut allocation =
            EnvelopeAllocation::new("al1".into(), "e1".into(), "p1".into(), "USD", now());
        let negative = Money::from_minor_units(-100, "USD").expect("money");
        assert!(allocation.set_allocated(negative, now()).is_err());
    }
}
