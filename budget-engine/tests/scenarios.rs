//! End-to-end coverage for the engine's literal worked scenarios, run
//! through the `BudgetEngine` facade against an in-memory store.

use std::sync::Arc;

use budget_core::Account;
use budget_core::AccountId;
use budget_core::AccountType;
use budget_core::Envelope;
use budget_core::EnvelopeId;
use budget_core::InMemoryStore;
use budget_core::Money;
use budget_core::UnitOfWork;
use budget_engine::BudgetEngine;
use budget_engine::CreateInflowInput;
use budget_engine::CreateOutflowInput;
use budget_engine::GoalAssignMode;
use chrono::NaiveDate;
use chrono::Utc;

fn usd(minor: i64) -> Money {
    Money::from_minor_units(minor, "USD").expect("money")
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

async fn seed_account(store: &dyn UnitOfWork, id: &str, name: &str) -> AccountId {
    let account = Account::new(id.to_string(), name, AccountType::Checking, "USD", 0, Utc::now())
        .expect("account");
    let account_id = account.id.clone();
    store.accounts().add(account).await.expect("add account");
    account_id
}

async fn seed_envelope(store: &dyn UnitOfWork, id: &str, name: &str) -> EnvelopeId {
    let envelope = Envelope::new(id.to_string(), name, "#fff", 0, Utc::now()).expect("envelope");
    let envelope_id = envelope.id.clone();
    store.envelopes().add(envelope).await.expect("add envelope");
    envelope_id
}

fn new_engine() -> (Arc<InMemoryStore>, BudgetEngine) {
    let store = Arc::new(InMemoryStore::new());
    let engine = BudgetEngine::new(store.clone() as Arc<dyn UnitOfWork>);
    (store, engine)
}

#[tokio::test]
async fn s1_allocate_spend_recalculate() {
    let (store, engine) = new_engine();
    let uow: &dyn UnitOfWork = store.as_ref();
    let account_id = seed_account(uow, "acct-a", "Checking").await;
    let envelope_id = seed_envelope(uow, "env-food", "Food").await;

    let inflow = engine
        .create_inflow(CreateInflowInput {
            account_id: account_id.clone(),
            date: date(2026, 2, 1),
            amount: usd(10000),
            payee: "Paycheck".into(),
            memo: None,
        })
        .await;
    assert!(inflow.success);

    let allocation = engine
        .set_allocation(envelope_id.clone(), usd(4000), 2026, 2)
        .await;
    assert!(allocation.success);

    let outflow = engine
        .create_outflow(CreateOutflowInput {
            account_id: account_id.clone(),
            date: date(2026, 2, 10),
            amount: usd(2500),
            payee: "Farmers Market".into(),
            memo: None,
            envelope_id: Some(envelope_id.clone()),
            splits: None,
        })
        .await;
    assert!(outflow.success);

    let snapshot = outflow.snapshot.expect("snapshot present");
    assert_eq!(snapshot.total_income.minor_units(), 10000);
    assert_eq!(snapshot.total_allocated.minor_units(), 4000);
    assert_eq!(snapshot.total_spent.minor_units(), 2500);
    assert_eq!(snapshot.ready_to_assign.minor_units(), 6000);

    let period = store
        .periods()
        .get_by_year_month(2026, 2)
        .await
        .expect("get period")
        .expect("period exists");
    let envelope_allocation = store
        .allocations()
        .get_by_envelope_and_period(&envelope_id, &period.id)
        .await
        .expect("get allocation")
        .expect("allocation exists");
    assert_eq!(envelope_allocation.spent.minor_units(), 2500);
    assert_eq!(envelope_allocation.available().expect("available").minor_units(), 1500);
}

#[tokio::test]
async fn s3_rollover_with_overspend() {
    let (store, engine) = new_engine();
    let uow: &dyn UnitOfWork = store.as_ref();
    let account_id = seed_account(uow, "acct-a", "Checking").await;
    let envelope_id = seed_envelope(uow, "env-food", "Food").await;

    engine
        .create_inflow(CreateInflowInput {
            account_id: account_id.clone(),
            date: date(2026, 2, 1),
            amount: usd(10000),
            payee: "Paycheck".into(),
            memo: None,
        })
        .await;

    engine
        .set_allocation(envelope_id.clone(), usd(5000), 2026, 2)
        .await;

    let outflow = engine
        .create_outflow(CreateOutflowInput {
            account_id: account_id.clone(),
            date: date(2026, 2, 15),
            amount: usd(7000),
            payee: "Big Grocery Run".into(),
            memo: None,
            envelope_id: Some(envelope_id.clone()),
            splits: None,
        })
        .await;
    assert!(outflow.success);
    let ready_before = outflow.snapshot.expect("snapshot").ready_to_assign;
    assert_eq!(ready_before.minor_units(), 5000);

    let rollover = engine.rollover(2026, 2, "USD").await;
    assert!(rollover.success);

    let closing_period = store
        .periods()
        .get_by_year_month(2026, 2)
        .await
        .expect("get")
        .expect("exists");
    assert!(closing_period.is_closed);

    let next_period = store
        .periods()
        .get_by_year_month(2026, 3)
        .await
        .expect("get")
        .expect("exists");
    assert_eq!(next_period.carried_over.minor_units(), 5000);

    let next_allocation = store
        .allocations()
        .get_by_envelope_and_period(&envelope_id, &next_period.id)
        .await
        .expect("get")
        .expect("exists");
    assert_eq!(next_allocation.rollover_from_previous.minor_units(), -2000);
}

#[tokio::test]
async fn s4_auto_assign_earliest_goal_first() {
    let (store, engine) = new_engine();
    let uow: &dyn UnitOfWork = store.as_ref();
    let account_id = seed_account(uow, "acct-a", "Checking").await;
    let car = seed_envelope(uow, "env-car", "Car").await;
    let vacation = seed_envelope(uow, "env-vacation", "Vacation").await;

    engine
        .set_goal(car.clone(), usd(8000), Some(date(2026, 2, 10)))
        .await;
    engine
        .set_goal(vacation.clone(), usd(8000), Some(date(2026, 3, 10)))
        .await;

    let inflow = engine
        .create_inflow(CreateInflowInput {
            account_id: account_id.clone(),
            date: date(2026, 2, 1),
            amount: usd(10000),
            payee: "Paycheck".into(),
            memo: None,
        })
        .await;
    assert!(inflow.success);

    let outcome = engine
        .auto_assign_to_goals(GoalAssignMode::EarliestGoalDateFirst, 2026, 2, "USD")
        .await;
    assert!(outcome.success);

    let snapshot = outcome.snapshot.expect("snapshot");
    assert_eq!(snapshot.ready_to_assign.minor_units(), 0);

    let period = store
        .periods()
        .get_by_year_month(2026, 2)
        .await
        .expect("get")
        .expect("exists");
    let car_allocation = store
        .allocations()
        .get_by_envelope_and_period(&car, &period.id)
        .await
        .expect("get")
        .expect("exists");
    let vacation_allocation = store
        .allocations()
        .get_by_envelope_and_period(&vacation, &period.id)
        .await
        .expect("get")
        .expect("exists");
    assert_eq!(car_allocation.allocated.minor_units(), 8000);
    assert_eq!(vacation_allocation.allocated.minor_units(), 2000);
}

#[tokio::test]
async fn s6_csv_duplicate_detection() {
    let (store, engine) = new_engine();
    let uow: &dyn UnitOfWork = store.as_ref();
    let account_id = seed_account(uow, "acct-a", "Checking").await;

    engine
        .create_outflow(CreateOutflowInput {
            account_id: account_id.clone(),
            date: date(2026, 2, 1),
            amount: usd(500),
            payee: "Coffee".into(),
            memo: None,
            envelope_id: None,
            splits: None,
        })
        .await;

    let csv_text = "Date,Payee,Amount\n\
         2026-02-01,Coffee,-5.00\n\
         2026-02-02,Groceries,-40.00\n\
         2026-02-03,Paycheck,100.00\n\
         2026-02-03,Paycheck,100.00\n";

    let preview = engine
        .import_preview(&account_id, csv_text)
        .await
        .expect("preview");
    assert_eq!(preview.counts.new, 2);
    assert_eq!(preview.counts.duplicate, 2);

    let confirmed: Vec<_> = preview
        .rows
        .iter()
        .filter(|row| matches!(row.status, budget_import::RowStatus::New))
        .map(|row| budget_import::ConfirmedRow {
            date: row.date.expect("date"),
            amount: row.amount.expect("amount"),
            payee: row.payee.clone(),
            memo: row.memo.clone(),
            fingerprint: row.fingerprint.clone().expect("fingerprint"),
        })
        .collect();

    let commit = engine
        .import_commit(account_id.clone(), confirmed.clone())
        .await;
    assert!(commit.success);
    assert_eq!(commit.value.as_ref().expect("value").inserted_count, 2);

    let recommit = engine.import_commit(account_id.clone(), confirmed).await;
    assert!(recommit.success);
    let recommit_value = recommit.value.expect("value");
    assert_eq!(recommit_value.inserted_count, 0);
    assert_eq!(recommit_value.skipped_duplicate_count, 2);

    let snapshot = engine
        .import_preview(&account_id, "Date,Payee,Amount\n")
        .await
        .expect("empty preview");
    assert_eq!(snapshot.rows.len(), 0);

    let period = store
        .periods()
        .get_by_year_month(2026, 2)
        .await
        .expect("get")
        .expect("exists");
    assert_eq!(period.total_income.minor_units(), 10000);
    assert_eq!(period.total_spent.minor_units(), 4500);
}
