#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Statement-vs-cleared reconciliation: a deterministic state machine per
//! transaction, `(uncleared, !reconciled) -> (cleared, !reconciled) ->
//! (cleared, reconciled)`, producing either a zero difference or an
//! explicit adjustment transaction.

use budget_core::Account;
use budget_core::AccountId;
use budget_core::BudgetError;
use budget_core::BudgetResult;
use budget_core::Money;
use budget_core::Transaction;
use budget_core::TransactionId;
use budget_core::TransactionType;
use budget_core::UnitOfWork;
use chrono::Datelike;
use chrono::NaiveDate;
use chrono::Utc;

const ADJUSTMENT_PAYEE: &str = "Reconciliation Adjustment";
const ADJUSTMENT_MEMO: &str = "Auto-created to match statement ending balance";

#[derive(Debug, Clone)]
pub struct ReconciliationRequest {
    pub account_id: AccountId,
    pub statement_date: NaiveDate,
    pub statement_ending_balance: Money,
    pub transaction_ids: Vec<TransactionId>,
    pub create_adjustment_if_needed: bool,
}

#[derive(Debug, Clone)]
pub struct ReconciliationOutcome {
    pub statement_ending_balance: Money,
    pub cleared_balance: Money,
    pub difference: Money,
    pub reconciled_transaction_count: usize,
    pub adjustment_transaction: Option<Transaction>,
}

fn new_transaction_id() -> String {
    format!("txn-{}", uuid::Uuid::new_v4())
}

async fn refresh_account_balances(uow: &dyn UnitOfWork, account: &mut Account) -> BudgetResult<()> {
    let cleared = uow.accounts().account_cleared_balance(&account.id).await?;
    let total = uow.accounts().account_balance(&account.id).await?;
    let uncleared = total.sub(&cleared)?;
    account.refresh_balances(cleared, uncleared, Utc::now())?;
    uow.accounts().update(account.clone()).await?;
    Ok(())
}

/// Executes the reconciliation state machine described in the module
/// docs. The caller is responsible for wrapping this in a unit of work
/// and rolling back on any error: no partial clears or reconciles are
/// meant to survive a failed call, and this function relies on the
/// caller's rollback to guarantee that.
pub async fn reconcile(
    uow: &dyn UnitOfWork,
    request: ReconciliationRequest,
) -> BudgetResult<ReconciliationOutcome> {
    let mut account = uow
        .accounts()
        .get_by_id(&request.account_id)
        .await?
        .ok_or_else(|| BudgetError::validation_field("account not found", "accountId"))?;

    let mut targets = Vec::with_capacity(request.transaction_ids.len());
    for id in &request.transaction_ids {
        let txn = uow
            .transactions()
            .get_by_id(id)
            .await?
            .ok_or_else(|| BudgetError::invalid_operation("targeted transaction not found"))?;
        if txn.account_id != request.account_id {
            return Err(BudgetError::invalid_operation(
                "targeted transaction does not belong to this account",
            ));
        }
        if txn.is_deleted {
            return Err(BudgetError::invalid_operation(
                "cannot reconcile a deleted transaction",
            ));
        }
        if txn.is_reconciled {
            return Err(BudgetError::invalid_operation(
                "transaction is already reconciled",
            ));
        }
        targets.push(txn);
    }

    let now = Utc::now();
    for txn in &mut targets {
        if !txn.is_cleared {
            txn.mark_cleared(now);
        }
        uow.transactions().update(txn.clone()).await?;
    }

    refresh_account_balances(uow, &mut account).await?;

    let difference = request
        .statement_ending_balance
        .sub(&account.cleared_balance)?;

    let mut adjustment_transaction = None;
    if !difference.is_zero() {
        if !request.create_adjustment_if_needed {
            return Err(BudgetError::invalid_operation(
                "difference must be zero",
            ));
        }
        let (txn_type, amount) = if difference.is_positive() {
            (TransactionType::Inflow, difference)
        } else {
            (TransactionType::Outflow, difference.abs())
        };
        let mut adjustment = Transaction::new(
            new_transaction_id(),
            request.account_id.clone(),
            txn_type,
            amount,
            request.statement_date,
            ADJUSTMENT_PAYEE,
            now,
        )?;
        adjustment.memo = Some(ADJUSTMENT_MEMO.to_string());
        adjustment.mark_reconciled(now);
        uow.transactions().add(adjustment.clone()).await?;
        refresh_account_balances(uow, &mut account).await?;
        adjustment_transaction = Some(adjustment);
    }

    for txn in &mut targets {
        txn.mark_reconciled(now);
        uow.transactions().update(txn.clone()).await?;
    }

    account.set_last_reconciled_at(now, now);
    uow.accounts().update(account.clone()).await?;

    budget_core::recalculate(
        uow,
        request.statement_date.year(),
        request.statement_date.month(),
        account.currency(),
    )
    .await?;

    Ok(ReconciliationOutcome {
        statement_ending_balance: request.statement_ending_balance,
        cleared_balance: account.cleared_balance,
        difference: Money::zero(account.currency()),
        reconciled_transaction_count: targets.len(),
        adjustment_transaction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use budget_core::AccountType;
    use budget_core::InMemoryStore;

    async fn seed_account(uow: &dyn UnitOfWork) -> AccountId {
        let account = Account::new(
            "acct-1".into(),
            "Checking",
            AccountType::Checking,
            "USD",
            0,
            Utc::now(),
        )
        .expect("account");
        let id = account.id.clone();
        uow.accounts().add(account).await.expect("add account");
        id
    }

    async fn seed_transaction(
        uow: &dyn UnitOfWork,
        account_id: &AccountId,
        txn_type: TransactionType,
        amount_minor: i64,
        date: NaiveDate,
        payee: &str,
    ) -> TransactionId {
        let amount = Money::from_minor_units(amount_minor, "USD").expect("money");
        let txn = Transaction::new(
            new_transaction_id(),
            account_id.clone(),
            txn_type,
            amount,
            date,
            payee,
            Utc::now(),
        )
        .expect("txn");
        let id = txn.id.clone();
        uow.transactions().add(txn).await.expect("add txn");
        id
    }

    #[tokio::test]
    async fn reconcile_with_adjustment_matches_scenario_s5() {
        let store = InMemoryStore::new();
        let uow: &dyn UnitOfWork = &store;
        let account_id = seed_account(uow).await;

        let t1 = seed_transaction(
            uow,
            &account_id,
            TransactionType::Inflow,
            10000,
            NaiveDate::from_ymd_opt(2026, 2, 1).expect("date"),
            "Paycheck",
        )
        .await;
        let t2 = seed_transaction(
            uow,
            &account_id,
            TransactionType::Outflow,
            -3000,
            NaiveDate::from_ymd_opt(2026, 2, 2).expect("date"),
            "Rent",
        )
        .await;

        let request = ReconciliationRequest {
            account_id: account_id.clone(),
            statement_date: NaiveDate::from_ymd_opt(2026, 2, 2).expect("date"),
            statement_ending_balance: Money::from_minor_units(7500, "USD").expect("money"),
            transaction_ids: vec![t1, t2],
            create_adjustment_if_needed: true,
        };

        let outcome = reconcile(uow, request).await.expect("reconcile");
        assert_eq!(outcome.reconciled_transaction_count, 2);
        assert!(outcome.difference.is_zero());
        let adjustment = outcome.adjustment_transaction.expect("adjustment created");
        assert_eq!(adjustment.amount.minor_units(), -500);
        assert_eq!(adjustment.payee, "Reconciliation Adjustment");
        assert_eq!(outcome.cleared_balance.minor_units(), 7500);
    }

    #[tokio::test]
    async fn reconcile_without_adjustment_fails_on_nonzero_difference() {
        let store = InMemoryStore::new();
        let uow: &dyn UnitOfWork = &store;
        let account_id = seed_account(uow).await;
        let t1 = seed_transaction(
            uow,
            &account_id,
            TransactionType::Inflow,
            10000,
            NaiveDate::from_ymd_opt(2026, 2, 1).expect("date"),
            "Paycheck",
        )
        .await;

        let request = ReconciliationRequest {
            account_id,
            statement_date: NaiveDate::from_ymd_opt(2026, 2, 1).expect("date"),
            statement_ending_balance: Money::from_minor_units(9000, "USD").expect("money"),
            transaction_ids: vec![t1],
            create_adjustment_if_needed: false,
        };
        let result = reconcile(uow, request).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn reconcile_rejects_already_reconciled_transaction() {
        let store = InMemoryStore::new();
        let uow: &dyn UnitOfWork = &store;
        let account_id = seed_account(uow).await;
        let amount = Money::from_minor_units(100, "USD").expect("money");
        let mut txn = Transaction::new(
            new_transaction_id(),
            account_id.clone(),
            TransactionType::Inflow,
            amount,
            NaiveDate::from_ymd_opt(2026, 2, 1).expect("date"),
            "Paycheck",
            Utc::now(),
        )
        .expect("txn");
        txn.mark_reconciled(Utc::now());
        let id = txn.id.clone();
        uow.transactions().add(txn).await.expect("add txn");

        let request = ReconciliationRequest {
            account_id,
            statement_date: NaiveDate::from_ymd_opt(2026, 2, 1).expect("date"),
            statement_ending_balance: Money::from_minor_units(100, "USD").expect("money"),
            transaction_ids: vec![id],
            create_adjustment_if_needed: false,
        };
        let result = reconcile(uow, request).await;
        assert!(result.is_err());
    }
}
