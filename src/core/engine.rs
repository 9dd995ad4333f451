use chrono::{Datelike, Local, Months, NaiveDate};
use log::debug;

use super::error::ProjectionError;
use super::rate::MONTHS_PER_YEAR;
use super::types::{AccumulationParams, AccumulationResult, SchedulePeriod, SimulationOverrides};

/// Forward-simulates the account month by month.
///
/// Each month the prior balance earns one month of return and the month's
/// contribution is added. Values are carried at full precision and only
/// rounded when the schedule is built.
pub fn simulate(
    params: &AccumulationParams,
    overrides: SimulationOverrides,
) -> Result<AccumulationResult, ProjectionError> {
    let horizon_years = overrides.horizon_years.unwrap_or(params.horizon_years());
    let base_contribution = overrides
        .monthly_contribution
        .unwrap_or(params.monthly_contribution());
    let rate = overrides.monthly_rate.unwrap_or(params.monthly_rate());

    if !base_contribution.is_finite() || base_contribution < 0.0 {
        return Err(ProjectionError::invalid(
            "monthly_contribution",
            "monthly contribution cannot be negative",
        ));
    }
    if !rate.is_finite() || rate <= -1.0 {
        return Err(ProjectionError::invalid(
            "monthly_rate",
            "monthly rate must be finite and > -100%",
        ));
    }

    let month_count = horizon_years
        .checked_mul(MONTHS_PER_YEAR)
        .ok_or_else(|| ProjectionError::invalid("horizon_years", "horizon is too large"))?;
    let start = overrides
        .start_month
        .unwrap_or_else(|| Local::now().date_naive());
    let dates = month_end_series(start, month_count)?;

    debug!(
        "simulating {month_count} months at monthly rate {rate:.8} from {}",
        dates[0]
    );

    let len = month_count as usize + 1;
    let mut balances = Vec::with_capacity(len);
    let mut principals = Vec::with_capacity(len);
    let mut contributions = Vec::with_capacity(len);
    balances.push(params.initial_balance());
    principals.push(params.initial_balance());
    contributions.push(params.initial_balance());

    for month in 0..month_count {
        let contribution = contribution_for_month(
            base_contribution,
            params.annual_increment(),
            params.increment_years(),
            month,
        );
        let i = month as usize;
        balances.push(balances[i] * (1.0 + rate) + contribution);
        principals.push(principals[i] + contribution);
        contributions.push(contribution);
    }

    let schedule = dates
        .into_iter()
        .enumerate()
        .map(|(i, date)| {
            // Return is derived from the rounded columns so each row adds up.
            let principal = round_unit(principals[i]);
            let balance = round_unit(balances[i]);
            SchedulePeriod {
                date,
                principal,
                investment_return: balance - principal,
                balance,
                contribution: round_unit(contributions[i]),
            }
        })
        .collect::<Vec<_>>();

    let last = len - 1;
    let final_balance = round_unit(balances[last]);
    let total_principal = round_unit(principals[last]);
    Ok(AccumulationResult {
        final_balance,
        total_principal,
        total_return: final_balance - total_principal,
        schedule,
    })
}

/// Contribution in effect for `month` (0-based).
///
/// The increment steps in once at the start of each completed year, starting
/// with year two and never after `increment_years` steps.
pub fn contribution_for_month(
    base: f64,
    annual_increment: f64,
    increment_years: u32,
    month: u32,
) -> f64 {
    if annual_increment == 0.0 {
        return base;
    }
    let steps = (month / MONTHS_PER_YEAR).min(increment_years);
    base + annual_increment * steps as f64
}

/// Month-end dates for periods `0..=month_count`, period 0 ending the start month.
fn month_end_series(start: NaiveDate, month_count: u32) -> Result<Vec<NaiveDate>, ProjectionError> {
    let first_of_month = start.with_day(1).ok_or_else(|| {
        ProjectionError::invalid("start_month", "cannot resolve the first day of the month")
    })?;
    (0..=month_count)
        .map(|k| {
            first_of_month
                .checked_add_months(Months::new(k + 1))
                .and_then(|next| next.pred_opt())
                .ok_or_else(|| {
                    ProjectionError::invalid("start_month", "schedule runs past the calendar range")
                })
        })
        .collect()
}

fn round_unit(value: f64) -> i64 {
    value.round_ties_even() as i64
}
