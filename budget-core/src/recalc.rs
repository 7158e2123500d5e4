use chrono::Utc;

use crate::date_range::DateRange;
use crate::entities::BudgetPeriod;
use crate::error::BudgetResult;
use crate::money::Money;
use crate::repository::UnitOfWork;

fn new_period_id() -> String {
    format!("period-{}", uuid::Uuid::new_v4())
}

/// Deterministically re-derives a period's totals and every allocation's
/// `spent` from raw transactions. Idempotent: repeated calls with no
/// intervening writes leave all derived values byte-identical.
///
/// The covering period is created on first use (with zero totals) so that
/// a month with transactions but no allocations yet still has its income
/// and spend tracked; a closed period cannot be recalculated.
pub async fn recalculate(uow: &dyn UnitOfWork, year: i32, month: u32, currency: &str) -> BudgetResult<()> {
    let range = DateRange::for_month(year, month)?;

    let period = match uow.periods().get_by_year_month(year, month).await? {
        Some(period) => period,
        None => {
            let period =
                BudgetPeriod::new(new_period_id(), year, month, currency, Utc::now())?;
            uow.periods().add(period.clone()).await?;
            period
        }
    };

    let allocations = uow.allocations().by_period(&period.id).await?;
    for mut allocation in allocations {
        let spent = uow
            .transactions()
            .envelope_spent_in_range(&allocation.envelope_id, range.start(), range.end())
            .await?;
        allocation.set_spent(spent, Utc::now())?;
        uow.allocations().update(allocation).await?;
    }

    let (income_sum, spent_abs_sum) = uow
        .transactions()
        .totals_for_range(range.start(), range.end(), currency)
        .await?;
    let total_allocated = uow
        .allocations()
        .period_total_allocated(&period.id, currency)
        .await?;

    let mut period = uow
        .periods()
        .get_by_id(&period.id)
        .await?
        .unwrap_or(period);
    period.set_totals(income_sum, spent_abs_sum, total_allocated, Utc::now())?;
    uow.periods().update(period).await?;
    Ok(())
}

/// Ensures the `(year, month)` period row exists with zero totals, without
/// recomputing anything. Used by services that must reference a period
/// before any transaction exists for it (e.g. `setAllocation`).
pub async fn ensure_period(
    uow: &dyn UnitOfWork,
    year: i32,
    month: u32,
    currency: &str,
) -> BudgetResult<BudgetPeriod> {
    if let Some(period) = uow.periods().get_by_year_month(year, month).await? {
        return Ok(period);
    }
    let period = BudgetPeriod::new(
        new_period_id(),
        year,
        month,
        currency,
        Utc::now(),
    )?;
    uow.periods().add(period.clone()).await?;
    Ok(period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Account;
    use crate::entities::AccountType;
    use crate::entities::EnvelopeAllocation;
    use crate::entities::Transaction;
    use crate::entities::TransactionType;
    use crate::memory::InMemoryStore;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn recalculate_derives_income_spent_and_is_idempotent() {
        let store = InMemoryStore::new();
        let uow: &dyn UnitOfWork = &store;

        let account = Account::new(
            InMemoryStore::new_id("account"),
            "Checking",
            AccountType::Checking,
            "USD",
            0,
            Utc::now(),
        )
        .expect("account");
        let account_id = account.id.clone();
        uow.accounts().add(account).await.expect("add account");

        let envelope_id = InMemoryStore::new_id("envelope");
        let period = ensure_period(uow, 2026, 2, "USD").await.expect("period");
        let mut allocation = EnvelopeAllocation::new(
            InMemoryStore::new_id("allocation"),
            envelope_id.clone(),
            period.id.clone(),
            "USD",
            Utc::now(),
        );
        allocation
            .set_allocated(Money::from_minor_units(4000, "USD").expect("money"), Utc::now())
            .expect("set allocated");
        uow.allocations().add(allocation).await.expect("add allocation");

        let inflow = Transaction::new(
            InMemoryStore::new_id("txn"),
            account_id.clone(),
            TransactionType::Inflow,
            Money::from_minor_units(10000, "USD").expect("money"),
            NaiveDate::from_ymd_opt(2026, 2, 1).expect("date"),
            "Paycheck",
            Utc::now(),
        )
        .expect("inflow");
        uow.transactions().add(inflow).await.expect("add inflow");

        let mut outflow = Transaction::new(
            InMemoryStore::new_id("txn"),
            account_id,
            TransactionType::Outflow,
            Money::from_minor_units(2500, "USD").expect("money"),
            NaiveDate::from_ymd_opt(2026, 2, 10).expect("date"),
            "Groceries",
            Utc::now(),
        )
        .expect("outflow");
        outflow
            .set_envelope(Some(envelope_id), Utc::now())
            .expect("assign envelope");
        uow.transactions().add(outflow).await.expect("add outflow");

        recalculate(uow, 2026, 2, "USD").await.expect("recalculate");
        let period_after = uow
            .periods()
            .get_by_year_month(2026, 2)
            .await
            .expect("get period")
            .expect("period exists");
        assert_eq!(period_after.total_income.minor_units(), 10000);
        assert_eq!(period_after.total_spent.minor_units(), 2500);
        assert_eq!(period_after.total_allocated.minor_units(), 4000);

        recalculate(uow, 2026, 2, "USD").await.expect("recalculate again");
        let period_second = uow
            .periods()
            .get_by_year_month(2026, 2)
            .await
            .expect("get period")
            .expect("period exists");
        assert_eq!(period_second.total_income, period_after.total_income);
        assert_eq!(period_second.total_spent, period_after.total_spent);
        assert_eq!(period_second.total_allocated, period_after.total_allocated);
    }
}
