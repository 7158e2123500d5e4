//! Allocation set/adjust, money moves between envelopes, savings goals, and
//! month-end rollover.

use std::cmp::Ordering;

use budget_core::BudgetError;
use budget_core::BudgetPeriod;
use budget_core::BudgetResult;
use budget_core::Envelope;
use budget_core::EnvelopeAllocation;
use budget_core::EnvelopeId;
use budget_core::Money;
use budget_core::UnitOfWork;
use budget_core::ensure_period;
use budget_core::recalculate;
use chrono::NaiveDate;
use chrono::Utc;

fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}

async fn require_envelope(uow: &dyn UnitOfWork, envelope_id: &EnvelopeId) -> BudgetResult<Envelope> {
    uow.envelopes()
        .get_by_id(envelope_id)
        .await?
        .ok_or_else(|| BudgetError::validation_field("envelope not found", "envelopeId"))
}

async fn get_or_create_allocation(
    uow: &dyn UnitOfWork,
    envelope_id: &EnvelopeId,
    year: i32,
    month: u32,
    currency: &str,
) -> BudgetResult<EnvelopeAllocation> {
    let period = ensure_period(uow, year, month, currency).await?;
    if let Some(existing) = uow
        .allocations()
        .get_by_envelope_and_period(envelope_id, &period.id)
        .await?
    {
        return Ok(existing);
    }
    let allocation = EnvelopeAllocation::new(
        new_id("alloc"),
        envelope_id.clone(),
        period.id.clone(),
        currency,
        Utc::now(),
    );
    uow.allocations().add(allocation.clone()).await?;
    Ok(allocation)
}

pub async fn set_allocation(
    uow: &dyn UnitOfWork,
    envelope_id: &EnvelopeId,
    amount: Money,
    year: i32,
    month: u32,
) -> BudgetResult<EnvelopeAllocation> {
    require_envelope(uow, envelope_id).await?;
    if amount.is_negative() {
        return Err(BudgetError::validation_field(
            "allocation amount must not be negative",
            "amount",
        ));
    }
    let mut allocation =
        get_or_create_allocation(uow, envelope_id, year, month, amount.currency()).await?;
    allocation.set_allocated(amount, Utc::now())?;
    uow.allocations().update(allocation.clone()).await?;
    Ok(allocation)
}

pub async fn adjust_allocation(
    uow: &dyn UnitOfWork,
    envelope_id: &EnvelopeId,
    delta: Money,
    year: i32,
    month: u32,
) -> BudgetResult<EnvelopeAllocation> {
    require_envelope(uow, envelope_id).await?;
    let mut allocation =
        get_or_create_allocation(uow, envelope_id, year, month, delta.currency()).await?;
    let proposed = allocation.allocated.add(&delta)?;
    let clamped = if proposed.is_negative() {
        Money::zero(delta.currency())
    } else {
        proposed
    };
    allocation.set_allocated(clamped, Utc::now())?;
    uow.allocations().update(allocation.clone()).await?;
    Ok(allocation)
}

pub async fn move_allocation(
    uow: &dyn UnitOfWork,
    from_envelope: &EnvelopeId,
    to_envelope: &EnvelopeId,
    amount: Money,
    year: i32,
    month: u32,
) -> BudgetResult<(EnvelopeAllocation, EnvelopeAllocation)> {
    if from_envelope == to_envelope {
        return Err(BudgetError::validation(
            "source and destination envelopes must differ",
        ));
    }
    if !amount.is_positive() {
        return Err(BudgetError::validation_field(
            "amount must be positive",
            "amount",
        ));
    }
    require_envelope(uow, from_envelope).await?;
    require_envelope(uow, to_envelope).await?;

    let mut from_alloc =
        get_or_create_allocation(uow, from_envelope, year, month, amount.currency()).await?;
    let available = from_alloc.available()?;
    if amount.compare(&available)? == Ordering::Greater {
        return Err(BudgetError::invalid_operation(
            "amount exceeds envelope's available balance",
        ));
    }

    let mut to_alloc =
        get_or_create_allocation(uow, to_envelope, year, month, amount.currency()).await?;

    let now = Utc::now();
    from_alloc.set_allocated(from_alloc.allocated.sub(&amount)?, now)?;
    to_alloc.set_allocated(to_alloc.allocated.add(&amount)?, now)?;
    uow.allocations().update(from_alloc.clone()).await?;
    uow.allocations().update(to_alloc.clone()).await?;
    Ok((from_alloc, to_alloc))
}

pub async fn set_goal(
    uow: &dyn UnitOfWork,
    envelope_id: &EnvelopeId,
    amount: Money,
    target_date: Option<NaiveDate>,
) -> BudgetResult<Envelope> {
    let mut envelope = require_envelope(uow, envelope_id).await?;
    envelope.set_goal(amount, target_date, Utc::now())?;
    uow.envelopes().update(envelope.clone()).await?;
    Ok(envelope)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalAssignMode {
    EarliestGoalDateFirst,
    SmallestGoalFirst,
}

#[derive(Debug, Clone)]
pub struct AllocationChange {
    pub envelope_id: EnvelopeId,
    pub envelope_name: Option<String>,
    pub before_allocated: Money,
    pub after_allocated: Money,
}

impl AllocationChange {
    pub fn delta(&self) -> BudgetResult<Money> {
        self.after_allocated.sub(&self.before_allocated)
    }
}

fn name_key(envelope: &Envelope) -> String {
    envelope.name.to_lowercase()
}

pub async fn auto_assign_to_goals(
    uow: &dyn UnitOfWork,
    mode: GoalAssignMode,
    year: i32,
    month: u32,
    currency: &str,
) -> BudgetResult<Vec<AllocationChange>> {
    recalculate(uow, year, month, currency).await?;
    let period = ensure_period(uow, year, month, currency).await?;

    let mut envelopes: Vec<Envelope> = uow
        .envelopes()
        .get_all()
        .await?
        .into_iter()
        .filter(|e| e.is_active && e.has_goal())
        .collect();

    match mode {
        GoalAssignMode::EarliestGoalDateFirst => {
            envelopes.sort_by(|a, b| match (a.goal_date, b.goal_date) {
                (Some(da), Some(db)) => da.cmp(&db).then_with(|| name_key(a).cmp(&name_key(b))),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => name_key(a).cmp(&name_key(b)),
            });
        }
        GoalAssignMode::SmallestGoalFirst => {
            let mut needed = Vec::with_capacity(envelopes.len());
            for envelope in &envelopes {
                needed.push(envelope_needed(uow, envelope, &period, currency).await?);
            }
            let mut indexed: Vec<_> = envelopes.into_iter().zip(needed).collect();
            indexed.sort_by(|(a, na), (b, nb)| {
                na.compare(nb)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| name_key(a).cmp(&name_key(b)))
            });
            envelopes = indexed.into_iter().map(|(e, _)| e).collect();
        }
    }

    let mut remaining = period.ready_to_assign()?;
    let mut changes = Vec::new();

    for envelope in &envelopes {
        if !remaining.is_positive() {
            break;
        }
        let needed = envelope_needed(uow, envelope, &period, currency).await?;
        if !needed.is_positive() {
            continue;
        }
        let to_assign = if needed.compare(&remaining)? == Ordering::Greater {
            remaining
        } else {
            needed
        };
        if !to_assign.is_positive() {
            continue;
        }
        let before = get_or_create_allocation(uow, &envelope.id, year, month, currency)
            .await?
            .allocated;
        let updated = adjust_allocation(uow, &envelope.id, to_assign, year, month).await?;
        remaining = remaining.sub(&to_assign)?;
        changes.push(AllocationChange {
            envelope_id: envelope.id.clone(),
            envelope_name: Some(envelope.name.clone()),
            before_allocated: before,
            after_allocated: updated.allocated,
        });
    }

    Ok(changes)
}

async fn envelope_needed(
    uow: &dyn UnitOfWork,
    envelope: &Envelope,
    period: &BudgetPeriod,
    currency: &str,
) -> BudgetResult<Money> {
    let allocation =
        get_or_create_allocation(uow, &envelope.id, period.year, period.month, currency).await?;
    let available = allocation.available()?;
    let goal = envelope.goal_amount.unwrap_or_else(|| Money::zero(currency));
    let needed = goal.sub(&available)?;
    Ok(if needed.is_negative() {
        Money::zero(currency)
    } else {
        needed
    })
}

pub async fn rollover(
    uow: &dyn UnitOfWork,
    year: i32,
    month: u32,
    currency: &str,
) -> BudgetResult<BudgetPeriod> {
    recalculate(uow, year, month, currency).await?;
    let mut period = uow
        .periods()
        .get_by_year_month(year, month)
        .await?
        .ok_or_else(|| BudgetError::invalid_operation("period not found"))?;
    if period.is_closed {
        return Err(BudgetError::invalid_operation("period already closed"));
    }
    let ready_to_assign = period.ready_to_assign()?;

    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let mut next_period = ensure_period(uow, next_year, next_month, currency).await?;
    next_period.set_carried_over(ready_to_assign, Utc::now());
    uow.periods().update(next_period.clone()).await?;

    for allocation in uow.allocations().by_period(&period.id).await? {
        let available = allocation.available()?;
        let mut next_allocation = match uow
            .allocations()
            .get_by_envelope_and_period(&allocation.envelope_id, &next_period.id)
            .await?
        {
            Some(existing) => existing,
            None => {
                let fresh = EnvelopeAllocation::new(
                    new_id("alloc"),
                    allocation.envelope_id.clone(),
                    next_period.id.clone(),
                    currency,
                    Utc::now(),
                );
                uow.allocations().add(fresh.clone()).await?;
                fresh
            }
        };
        next_allocation.set_rollover(available, Utc::now());
        uow.allocations().update(next_allocation).await?;
    }

    period.close(Utc::now());
    uow.periods().update(period.clone()).await?;
    Ok(period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use budget_core::InMemoryStore;

    fn usd(minor: i64) -> Money {
        Money::from_minor_units(minor, "USD").expect("money")
    }

    async fn seed_envelope(uow: &dyn UnitOfWork, name: &str) -> EnvelopeId {
        let envelope = Envelope::new(new_id("env"), name, "#fff", 0, Utc::now()).expect("envelope");
        let id = envelope.id.clone();
        uow.envelopes().add(envelope).await.expect("add");
        id
    }

    #[tokio::test]
    async fn move_conserves_sum_and_ready_to_assign() {
        let store = InMemoryStore::new();
        let uow: &dyn UnitOfWork = &store;
        let food = seed_envelope(uow, "Food").await;
        let gas = seed_envelope(uow, "Gas").await;

        set_allocation(uow, &food, usd(4000), 2026, 2).await.expect("set food");
        set_allocation(uow, &gas, usd(2000), 2026, 2).await.expect("set gas");

        move_allocation(uow, &food, &gas, usd(1500), 2026, 2)
            .await
            .expect("move");

        let period = uow
            .periods()
            .get_by_year_month(2026, 2)
            .await
            .expect("get")
            .expect("exists");
        let food_alloc = uow
            .allocations()
            .get_by_envelope_and_period(&food, &period.id)
            .await
            .expect("get")
            .expect("exists");
        let gas_alloc = uow
            .allocations()
            .get_by_envelope_and_period(&gas, &period.id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(food_alloc.allocated.minor_units(), 2500);
        assert_eq!(gas_alloc.allocated.minor_units(), 3500);
    }

    #[tokio::test]
    async fn move_rejects_amount_above_available() {
        let store = InMemoryStore::new();
        let uow: &dyn UnitOfWork = &store;
        let food = seed_envelope(uow, "Food").await;
        let gas = seed_envelope(uow, "Gas").await;
        set_allocation(uow, &food, usd(1000), 2026, 2).await.expect("set food");

        let result = move_allocation(uow, &food, &gas, usd(1500), 2026, 2).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn adjust_allocation_never_goes_negative() {
        let store = InMemoryStore::new();
        let uow: &dyn UnitOfWork = &store;
        let food = seed_envelope(uow, "Food").await;
        set_allocation(uow, &food, usd(1000), 2026, 2).await.expect("set");

        let allocation = adjust_allocation(uow, &food, usd(-5000), 2026, 2)
            .await
            .expect("adjust");
        assert_eq!(allocation.allocated.minor_units(), 0);
    }
}
