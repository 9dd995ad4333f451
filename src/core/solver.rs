use chrono::NaiveDate;
use log::debug;
use serde::Serialize;

use super::engine::simulate;
use super::error::ProjectionError;
use super::rate::{MONTHS_PER_YEAR, annual_from_monthly, monthly_rate};
use super::types::{
    AccumulationParams, AccumulationResult, CompoundingMethod, SimulationOverrides, SolveTarget,
    SolvedValue,
};

pub const RATE_SEARCH_MIN: f64 = -0.99;
pub const RATE_SEARCH_MAX: f64 = 10.0;
pub const RATE_TOLERANCE: f64 = 1e-6;
const NEAR_ZERO_RATE: f64 = 1e-10;

#[derive(Debug, Clone, Serialize)]
pub struct SolveOutcome {
    pub solved: SolvedValue,
    pub projection: AccumulationResult,
}

/// Solves for the value of `target` that grows the account to `target_value`.
///
/// Contribution and horizon are rounded up so the target is never undershot;
/// the rate is returned as an annual fraction.
pub fn solve(
    params: &AccumulationParams,
    target: SolveTarget,
    target_value: f64,
) -> Result<SolvedValue, ProjectionError> {
    if !target_value.is_finite() || target_value <= 0.0 {
        return Err(ProjectionError::InvalidTarget(target_value));
    }

    let solved = if target_value <= params.initial_balance() {
        match target {
            SolveTarget::Amount => SolvedValue::Amount(0.0),
            SolveTarget::Rate => SolvedValue::Rate(0.0),
            SolveTarget::Horizon => SolvedValue::Horizon(0),
        }
    } else {
        match target {
            SolveTarget::Amount => SolvedValue::Amount(required_contribution(params, target_value)),
            SolveTarget::Rate => SolvedValue::Rate(required_annual_rate(params, target_value)?),
            SolveTarget::Horizon => SolvedValue::Horizon(required_horizon(params, target_value)?),
        }
    };
    debug!("solved {target} for target {target_value}: {solved:?}");
    Ok(solved)
}

/// Solves, then re-runs the forward simulation with the solved value in place.
pub fn solve_with_projection(
    params: &AccumulationParams,
    target: SolveTarget,
    target_value: f64,
    start_month: Option<NaiveDate>,
) -> Result<SolveOutcome, ProjectionError> {
    let solved = solve(params, target, target_value)?;
    let mut overrides = SimulationOverrides {
        start_month,
        ..SimulationOverrides::default()
    };
    match solved {
        SolvedValue::Amount(contribution) => overrides.monthly_contribution = Some(contribution),
        // The solver reports (1 + m)^12 - 1, which the geometric converter inverts exactly.
        SolvedValue::Rate(annual) => {
            overrides.monthly_rate = Some(monthly_rate(annual, CompoundingMethod::Geometric))
        }
        SolvedValue::Horizon(years) => overrides.horizon_years = Some(years),
    }
    let projection = simulate(params, overrides)?;
    Ok(SolveOutcome { solved, projection })
}

fn required_contribution(params: &AccumulationParams, target_value: f64) -> f64 {
    let months = params.month_count() as f64;
    let rate = params.monthly_rate();
    let initial = params.initial_balance();

    let amount = if rate == 0.0 {
        (target_value - initial) / months
    } else {
        let growth = (1.0 + rate).powf(months);
        (target_value - initial * growth) / ((growth - 1.0) / rate)
    };
    // Negative when the initial balance alone overshoots the target.
    amount.ceil().max(0.0)
}

fn required_annual_rate(
    params: &AccumulationParams,
    target_value: f64,
) -> Result<f64, ProjectionError> {
    let months = params.month_count();
    let initial = params.initial_balance();
    let contribution = params.monthly_contribution();

    if target_value <= initial + contribution * months as f64 {
        return Ok(0.0);
    }

    let mut lo = RATE_SEARCH_MIN;
    let mut hi = RATE_SEARCH_MAX;
    let low_value = level_annuity_future_value(initial, contribution, months, lo);
    let high_value = level_annuity_future_value(initial, contribution, months, hi);
    if !(low_value <= target_value && target_value <= high_value) {
        return Err(ProjectionError::unreachable(
            target_value,
            format!(
                "no monthly rate in [{RATE_SEARCH_MIN}, {RATE_SEARCH_MAX}] reaches it \
                 (future value spans {low_value} to {high_value})"
            ),
        ));
    }

    let mut iterations = 0;
    while hi - lo > RATE_TOLERANCE {
        iterations += 1;
        let mid = (lo + hi) * 0.5;
        if level_annuity_future_value(initial, contribution, months, mid) < target_value {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let monthly = (lo + hi) * 0.5;
    debug!("rate bisection converged after {iterations} iterations at monthly {monthly:.8}");
    Ok(annual_from_monthly(monthly))
}

/// Future value of `initial` plus a level monthly annuity at `rate`.
///
/// Non-decreasing in `rate` over (-1, inf) for non-negative inputs.
pub fn level_annuity_future_value(initial: f64, contribution: f64, months: u32, rate: f64) -> f64 {
    let months_f = months as f64;
    if rate.abs() < NEAR_ZERO_RATE {
        return initial + contribution * months_f;
    }
    let growth = (1.0 + rate).powf(months_f);
    let mut value = 0.0;
    if initial != 0.0 {
        value += initial * growth;
    }
    if contribution != 0.0 {
        value += contribution * (growth - 1.0) / rate;
    }
    value
}

fn required_horizon(params: &AccumulationParams, target_value: f64) -> Result<u32, ProjectionError> {
    let rate = params.monthly_rate();
    let initial = params.initial_balance();
    let contribution = params.monthly_contribution();

    let months = if rate == 0.0 {
        if contribution == 0.0 {
            return Err(ProjectionError::unreachable(
                target_value,
                "nothing is contributed and the balance earns no return",
            ));
        }
        (target_value - initial) / contribution
    } else {
        let numerator = target_value + contribution / rate;
        let denominator = initial + contribution / rate;
        if denominator <= 0.0 {
            return Err(ProjectionError::unreachable(
                target_value,
                "the account is empty and nothing is contributed",
            ));
        }
        (numerator / denominator).ln() / (1.0 + rate).ln()
    };

    let years = (months / MONTHS_PER_YEAR as f64).max(0.0).ceil();
    if !years.is_finite() || years > u32::MAX as f64 / MONTHS_PER_YEAR as f64 {
        return Err(ProjectionError::unreachable(
            target_value,
            format!("required horizon of {years} years is out of range"),
        ));
    }
    Ok(years as u32)
}
