//! Create/update/delete of inflows, outflows (with optional splits), and
//! linked transfer pairs. Maintains each touched account's cached
//! cleared/uncleared balances after every mutation.

use budget_core::Account;
use budget_core::AccountId;
use budget_core::BudgetError;
use budget_core::BudgetResult;
use budget_core::EnvelopeId;
use budget_core::Money;
use budget_core::Payee;
use budget_core::Transaction;
use budget_core::TransactionId;
use budget_core::TransactionSplitLine;
use budget_core::TransactionType;
use budget_core::UnitOfWork;
use chrono::NaiveDate;
use chrono::Utc;

fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}

pub(crate) async fn refresh_account_balances(
    uow: &dyn UnitOfWork,
    account_id: &AccountId,
) -> BudgetResult<Account> {
    let mut account = uow
        .accounts()
        .get_by_id(account_id)
        .await?
        .ok_or_else(|| BudgetError::unexpected("account disappeared mid-operation"))?;
    let cleared = uow.accounts().account_cleared_balance(account_id).await?;
    let total = uow.accounts().account_balance(account_id).await?;
    let uncleared = total.sub(&cleared)?;
    account.refresh_balances(cleared, uncleared, Utc::now())?;
    uow.accounts().update(account.clone()).await?;
    Ok(account)
}

async fn get_or_create_payee(uow: &dyn UnitOfWork, name: &str) -> BudgetResult<Payee> {
    let normalized = Payee::normalize_name(name);
    if let Some(existing) = uow.payees().get_by_name(&normalized).await? {
        return Ok(existing);
    }
    let payee = Payee::new(new_id("payee"), normalized, Utc::now())?;
    uow.payees().add(payee.clone()).await?;
    Ok(payee)
}

async fn record_payee_usage(uow: &dyn UnitOfWork, name: &str) -> BudgetResult<()> {
    let mut payee = get_or_create_payee(uow, name).await?;
    payee.record_usage(Utc::now());
    uow.payees().update(payee).await?;
    Ok(())
}

async fn require_account(uow: &dyn UnitOfWork, account_id: &AccountId) -> BudgetResult<Account> {
    uow.accounts()
        .get_by_id(account_id)
        .await?
        .ok_or_else(|| BudgetError::validation_field("account not found", "accountId"))
}

async fn require_envelope_exists(uow: &dyn UnitOfWork, envelope_id: &EnvelopeId) -> BudgetResult<()> {
    if uow.envelopes().exists_by_id(envelope_id).await? {
        Ok(())
    } else {
        Err(BudgetError::validation_field(
            "envelope not found",
            "envelopeId",
        ))
    }
}

#[derive(Debug, Clone)]
pub struct CreateOutflowInput {
    pub account_id: AccountId,
    pub date: NaiveDate,
    pub amount: Money,
    pub payee: String,
    pub memo: Option<String>,
    pub envelope_id: Option<EnvelopeId>,
    pub splits: Option<Vec<(EnvelopeId, Money)>>,
}

pub async fn create_outflow(
    uow: &dyn UnitOfWork,
    input: CreateOutflowInput,
) -> BudgetResult<Transaction> {
    if !input.amount.is_positive() {
        return Err(BudgetError::validation_field(
            "amount must be positive",
            "amount",
        ));
    }
    require_account(uow, &input.account_id).await?;

    if input.splits.is_some() && input.envelope_id.is_some() {
        return Err(BudgetError::validation(
            "splits and envelopeId are mutually exclusive",
        ));
    }

    let now = Utc::now();
    let mut txn = Transaction::new(
        new_id("txn"),
        input.account_id.clone(),
        TransactionType::Outflow,
        input.amount,
        input.date,
        input.payee.clone(),
        now,
    )?;
    txn.memo = input.memo;

    if let Some(splits) = &input.splits {
        let mut sum = Money::zero(input.amount.currency());
        for (envelope_id, amount) in splits {
            require_envelope_exists(uow, envelope_id).await?;
            sum = sum.add(amount)?;
        }
        if sum != input.amount {
            return Err(BudgetError::invalid_operation(
                "split amounts must sum to the transaction amount",
            ));
        }
    } else if let Some(envelope_id) = &input.envelope_id {
        require_envelope_exists(uow, envelope_id).await?;
        txn.set_envelope(Some(envelope_id.clone()), now)?;
    }

    uow.transactions().add(txn.clone()).await?;

    if let Some(splits) = input.splits {
        for (idx, (envelope_id, amount)) in splits.into_iter().enumerate() {
            let line = TransactionSplitLine::new(
                new_id("split"),
                txn.id.clone(),
                envelope_id,
                amount,
                idx as i64,
            )?;
            uow.splits().add(line).await?;
        }
    }

    record_payee_usage(uow, &input.payee).await?;
    refresh_account_balances(uow, &input.account_id).await?;
    Ok(txn)
}

#[derive(Debug, Clone)]
pub struct CreateInflowInput {
    pub account_id: AccountId,
    pub date: NaiveDate,
    pub amount: Money,
    pub payee: String,
    pub memo: Option<String>,
}

pub async fn create_inflow(
    uow: &dyn UnitOfWork,
    input: CreateInflowInput,
) -> BudgetResult<Transaction> {
    if !input.amount.is_positive() {
        return Err(BudgetError::validation_field(
            "amount must be positive",
            "amount",
        ));
    }
    require_account(uow, &input.account_id).await?;

    let now = Utc::now();
    let mut txn = Transaction::new(
        new_id("txn"),
        input.account_id.clone(),
        TransactionType::Inflow,
        input.amount,
        input.date,
        input.payee.clone(),
        now,
    )?;
    txn.memo = input.memo;
    uow.transactions().add(txn.clone()).await?;

    record_payee_usage(uow, &input.payee).await?;
    refresh_account_balances(uow, &input.account_id).await?;
    Ok(txn)
}

pub struct TransferOutcome {
    pub outflow: Transaction,
    pub inflow: Transaction,
}

pub async fn create_transfer(
    uow: &dyn UnitOfWork,
    from_account: AccountId,
    to_account: AccountId,
    date: NaiveDate,
    amount: Money,
    memo: Option<String>,
) -> BudgetResult<TransferOutcome> {
    if from_account == to_account {
        return Err(BudgetError::validation(
            "transfer source and destination must differ",
        ));
    }
    if !amount.is_positive() {
        return Err(BudgetError::validation_field(
            "amount must be positive",
            "amount",
        ));
    }
    require_account(uow, &from_account).await?;
    require_account(uow, &to_account).await?;

    let now = Utc::now();
    let mut outflow = Transaction::new(
        new_id("txn"),
        from_account.clone(),
        TransactionType::Transfer,
        amount.negate(),
        date,
        "Transfer",
        now,
    )?;
    outflow.memo = memo.clone();
    outflow.set_transfer_account(to_account.clone());

    let mut inflow = Transaction::new(
        new_id("txn"),
        to_account.clone(),
        TransactionType::Transfer,
        amount,
        date,
        "Transfer",
        now,
    )?;
    inflow.memo = memo;
    inflow.set_transfer_account(from_account.clone());

    uow.transactions().add(outflow.clone()).await?;
    uow.transactions().add(inflow.clone()).await?;

    outflow.link_transfer(inflow.id.clone(), now);
    inflow.link_transfer(outflow.id.clone(), now);
    uow.transactions().update(outflow.clone()).await?;
    uow.transactions().update(inflow.clone()).await?;

    refresh_account_balances(uow, &from_account).await?;
    refresh_account_balances(uow, &to_account).await?;

    Ok(TransferOutcome { outflow, inflow })
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTransactionInput {
    pub date: Option<NaiveDate>,
    pub amount: Option<Money>,
    pub payee: Option<String>,
    pub memo: Option<Option<String>>,
    pub envelope_id: Option<Option<EnvelopeId>>,
    pub splits: Option<Vec<(EnvelopeId, Money)>>,
}

pub async fn update_transaction(
    uow: &dyn UnitOfWork,
    id: &TransactionId,
    patch: UpdateTransactionInput,
) -> BudgetResult<Transaction> {
    let mut txn = uow
        .transactions()
        .get_by_id(id)
        .await?
        .ok_or_else(|| BudgetError::validation_field("transaction not found", "id"))?;

    let existing_splits = uow.splits().by_transaction(id).await?;

    if patch.envelope_id.is_some() && (!existing_splits.is_empty() || patch.splits.is_some()) {
        return Err(BudgetError::invalid_operation(
            "cannot assign an envelope to a split transaction",
        ));
    }

    if patch.amount.is_some() && !existing_splits.is_empty() && patch.splits.is_none() {
        return Err(BudgetError::invalid_operation(
            "providing an amount on a split transaction requires providing new splits",
        ));
    }

    let now = Utc::now();
    if let Some(date) = patch.date {
        txn.set_date(date, now)?;
    }
    if let Some(payee) = &patch.payee {
        txn.set_payee(payee.clone(), now)?;
    }
    if let Some(memo) = patch.memo {
        txn.set_memo(memo, now)?;
    }
    if let Some(amount) = patch.amount {
        txn.set_amount(amount, now)?;
    }
    if let Some(envelope_id) = patch.envelope_id {
        txn.set_envelope(envelope_id, now)?;
    }

    if let Some(splits) = patch.splits {
        let magnitude = txn.amount.abs();
        let mut sum = Money::zero(magnitude.currency());
        for (envelope_id, split_amount) in &splits {
            require_envelope_exists(uow, envelope_id).await?;
            sum = sum.add(split_amount)?;
        }
        if sum != magnitude {
            return Err(BudgetError::invalid_operation(
                "split amounts must sum to the transaction amount",
            ));
        }
        uow.splits().delete_by_transaction(id).await?;
        for (idx, (envelope_id, split_amount)) in splits.into_iter().enumerate() {
            let line = TransactionSplitLine::new(
                new_id("split"),
                id.clone(),
                envelope_id,
                split_amount,
                idx as i64,
            )?;
            uow.splits().add(line).await?;
        }
        txn.set_envelope(None, now)?;
    }

    uow.transactions().update(txn.clone()).await?;
    refresh_account_balances(uow, &txn.account_id).await?;
    Ok(txn)
}

pub async fn delete_transaction(uow: &dyn UnitOfWork, id: &TransactionId) -> BudgetResult<()> {
    let mut txn = uow
        .transactions()
        .get_by_id(id)
        .await?
        .ok_or_else(|| BudgetError::validation_field("transaction not found", "id"))?;
    let now = Utc::now();
    txn.soft_delete(now)?;
    let account_id = txn.account_id.clone();
    let linked_id = txn.linked_transaction_id.clone();
    uow.transactions().update(txn).await?;

    let mut affected_accounts = vec![account_id];
    if let Some(linked_id) = linked_id {
        if let Some(mut linked) = uow.transactions().get_by_id(&linked_id).await? {
            linked.soft_delete(now)?;
            affected_accounts.push(linked.account_id.clone());
            uow.transactions().update(linked).await?;
        }
    }

    for account_id in affected_accounts {
        refresh_account_balances(uow, &account_id).await?;
    }
    Ok(())
}

pub async fn mark_cleared(uow: &dyn UnitOfWork, id: &TransactionId) -> BudgetResult<Transaction> {
    let mut txn = uow
        .transactions()
        .get_by_id(id)
        .await?
        .ok_or_else(|| BudgetError::validation_field("transaction not found", "id"))?;
    txn.mark_cleared(Utc::now());
    uow.transactions().update(txn.clone()).await?;
    refresh_account_balances(uow, &txn.account_id).await?;
    Ok(txn)
}

pub async fn mark_uncleared(uow: &dyn UnitOfWork, id: &TransactionId) -> BudgetResult<Transaction> {
    let mut txn = uow
        .transactions()
        .get_by_id(id)
        .await?
        .ok_or_else(|| BudgetError::validation_field("transaction not found", "id"))?;
    txn.mark_uncleared(Utc::now())?;
    uow.transactions().update(txn.clone()).await?;
    refresh_account_balances(uow, &txn.account_id).await?;
    Ok(txn)
}

pub async fn assign_to_envelope(
    uow: &dyn UnitOfWork,
    id: &TransactionId,
    envelope_id: EnvelopeId,
) -> BudgetResult<Transaction> {
    let mut txn = uow
        .transactions()
        .get_by_id(id)
        .await?
        .ok_or_else(|| BudgetError::validation_field("transaction not found", "id"))?;
    if txn.is_transfer() {
        return Err(BudgetError::invalid_operation(
            "transfers cannot be assigned to an envelope",
        ));
    }
    let existing_splits = uow.splits().by_transaction(id).await?;
    if !existing_splits.is_empty() {
        return Err(BudgetError::invalid_operation(
            "cannot assign an envelope to a split transaction",
        ));
    }
    require_envelope_exists(uow, &envelope_id).await?;

    let now = Utc::now();
    txn.set_envelope(Some(envelope_id.clone()), now)?;
    uow.transactions().update(txn.clone()).await?;

    let mut payee = get_or_create_payee(uow, &txn.payee).await?;
    payee.set_default_envelope_if_absent(envelope_id, now);
    uow.payees().update(payee).await?;

    Ok(txn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use budget_core::AccountType;
    use budget_core::InMemoryStore;

    async fn seed_account(uow: &dyn UnitOfWork) -> AccountId {
        let account = Account::new(
            new_id("acct"),
            "Checking",
            AccountType::Checking,
            "USD",
            0,
            Utc::now(),
        )
        .expect("account");
        let id = account.id.clone();
        uow.accounts().add(account).await.expect("add");
        id
    }

    #[tokio::test]
    async fn create_outflow_updates_balances() {
        let store = InMemoryStore::new();
        let uow: &dyn UnitOfWork = &store;
        let account_id = seed_account(uow).await;

        create_outflow(
            uow,
            CreateOutflowInput {
                account_id: account_id.clone(),
                date: NaiveDate::from_ymd_opt(2026, 2, 10).expect("date"),
                amount: Money::from_minor_units(2500, "USD").expect("money"),
                payee: "Coffee".into(),
                memo: None,
                envelope_id: None,
                splits: None,
            },
        )
        .await
        .expect("outflow");

        let account = uow
            .accounts()
            .get_by_id(&account_id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(account.balance.minor_units(), -2500);
        assert_eq!(account.uncleared_balance.minor_units(), -2500);
    }

    #[tokio::test]
    async fn split_sum_must_match_amount() {
        let store = InMemoryStore::new();
        let uow: &dyn UnitOfWork = &store;
        let account_id = seed_account(uow).await;
        let envelope = budget_core::Envelope::new(new_id("env"), "Food", "#fff", 0, Utc::now())
            .expect("envelope");
        let envelope_id = envelope.id.clone();
        uow.envelopes().add(envelope).await.expect("add envelope");

        let result = create_outflow(
            uow,
            CreateOutflowInput {
                account_id,
                date: NaiveDate::from_ymd_opt(2026, 2, 10).expect("date"),
                amount: Money::from_minor_units(1000, "USD").expect("money"),
                payee: "Store".into(),
                memo: None,
                envelope_id: None,
                splits: Some(vec![(
                    envelope_id,
                    Money::from_minor_units(500, "USD").expect("money"),
                )]),
            },
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn transfer_links_both_sides() {
        let store = InMemoryStore::new();
        let uow: &dyn UnitOfWork = &store;
        let from = seed_account(uow).await;
        let to = seed_account(uow).await;

        let outcome = create_transfer(
            uow,
            from,
            to,
            NaiveDate::from_ymd_opt(2026, 2, 10).expect("date"),
            Money::from_minor_units(1000, "USD").expect("money"),
            None,
        )
        .await
        .expect("transfer");

        assert_eq!(
            outcome.outflow.linked_transaction_id.as_deref(),
            Some(outcome.inflow.id.as_str())
        );
        assert_eq!(
            outcome.inflow.linked_transaction_id.as_deref(),
            Some(outcome.outflow.id.as_str())
        );
    }

    #[tokio::test]
    async fn reconciled_transaction_cannot_be_deleted() {
        let store = InMemoryStore::new();
        let uow: &dyn UnitOfWork = &store;
        let account_id = seed_account(uow).await;
        let txn = create_inflow(
            uow,
            CreateInflowInput {
                account_id,
                date: NaiveDate::from_ymd_opt(2026, 2, 1).expect("date"),
                amount: Money::from_minor_units(100, "USD").expect("money"),
                payee: "Paycheck".into(),
                memo: None,
            },
        )
        .await
        .expect("inflow");

        let mut reconciled = uow
            .transactions()
            .get_by_id(&txn.id)
            .await
            .expect("get")
            .expect("exists");
        reconciled.mark_reconciled(Utc::now());
        uow.transactions()
            .update(reconciled)
            .await
            .expect("update");

        let result = delete_transaction(uow, &txn.id).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn updating_amount_on_split_transaction_requires_new_splits() {
        let store = InMemoryStore::new();
        let uow: &dyn UnitOfWork = &store;
        let account_id = seed_account(uow).await;
        let envelope = budget_core::Envelope::new(new_id("env"), "Food", "#fff", 0, Utc::now())
            .expect("envelope");
        let envelope_id = envelope.id.clone();
        uow.envelopes().add(envelope).await.expect("add envelope");

        let txn = create_outflow(
            uow,
            CreateOutflowInput {
                account_id,
                date: NaiveDate::from_ymd_opt(2026, 2, 10).expect("date"),
                amount: Money::from_minor_units(1000, "USD").expect("money"),
                payee: "Store".into(),
                memo: None,
                envelope_id: None,
                splits: Some(vec![(
                    envelope_id,
                    Money::from_minor_units(1000, "USD").expect("money"),
                )]),
            },
        )
        .await
        .expect("outflow with split");

        let result = update_transaction(
            uow,
            &txn.id,
            UpdateTransactionInput {
                amount: Some(Money::from_minor_units(2000, "USD").expect("money")),
                ..Default::default()
            },
        )
        .await;
        assert!(result.is_err());

        let unchanged = uow
            .transactions()
            .get_by_id(&txn.id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(unchanged.amount.minor_units(), -1000);
    }
}
