use log::debug;

use super::error::ProjectionError;
use super::rate::{MONTHS_PER_YEAR, monthly_rate};
use super::types::{
    CompoundingMethod, MonthBalance, NoGrowthBaseline, WithdrawalResult, WithdrawalUnknown,
    YearsMonths,
};

/// Upper bound on a duration trace (100 years).
pub const MAX_DRAWDOWN_MONTHS: u32 = 100 * MONTHS_PER_YEAR;

/// How long `initial_balance` lasts when `monthly_withdrawal` is taken each month.
///
/// Stops as soon as the balance cannot cover the next withdrawal. A balance
/// whose monthly return covers the withdrawal never depletes; its trace is
/// capped at [`MAX_DRAWDOWN_MONTHS`] and `depleted` is false.
pub fn simulate_duration(
    initial_balance: f64,
    monthly_withdrawal: f64,
    annual_rate: f64,
) -> Result<WithdrawalResult, ProjectionError> {
    require_positive("initial_balance", initial_balance)?;
    require_positive("monthly_withdrawal", monthly_withdrawal)?;
    let rate = drawdown_rate(annual_rate)?;

    let perpetual = initial_balance * rate >= monthly_withdrawal;
    let mut balance = initial_balance;
    let mut monthly_balances = Vec::new();
    let mut month = 0;
    while balance - monthly_withdrawal > 0.0 && month < MAX_DRAWDOWN_MONTHS {
        balance = balance * (1.0 + rate) - monthly_withdrawal;
        month += 1;
        monthly_balances.push(MonthBalance { month, balance });
    }
    let depleted = !perpetual && month < MAX_DRAWDOWN_MONTHS;
    debug!("drawdown lasted {month} months (depleted: {depleted})");

    let no_growth_months = (initial_balance / monthly_withdrawal).floor();
    Ok(WithdrawalResult {
        solved_for: WithdrawalUnknown::Duration,
        duration: YearsMonths::from_months(month),
        monthly_withdrawal,
        initial_balance,
        depleted,
        monthly_balances,
        no_growth: NoGrowthBaseline::Duration(YearsMonths::from_months(
            no_growth_months.min(u32::MAX as f64) as u32,
        )),
    })
}

/// Level monthly withdrawal that exhausts `initial_balance` over `years`.
pub fn simulate_withdrawal(
    initial_balance: f64,
    years: f64,
    annual_rate: f64,
) -> Result<WithdrawalResult, ProjectionError> {
    require_positive("initial_balance", initial_balance)?;
    let months = horizon_months(years)?;
    let rate = drawdown_rate(annual_rate)?;

    let monthly_withdrawal = if rate == 0.0 {
        initial_balance / months as f64
    } else {
        initial_balance * rate / (1.0 - (1.0 + rate).powf(-(months as f64)))
    };

    let mut balance = initial_balance;
    let mut monthly_balances = Vec::with_capacity(months as usize);
    for month in 1..=months {
        let next = balance * (1.0 + rate) - monthly_withdrawal;
        // Only the final month may land a rounding residue below zero.
        if next < 0.0 && month < months {
            break;
        }
        balance = next;
        monthly_balances.push(MonthBalance { month, balance });
    }

    Ok(WithdrawalResult {
        solved_for: WithdrawalUnknown::MonthlyWithdrawal,
        duration: YearsMonths::from_months(months),
        monthly_withdrawal,
        initial_balance,
        depleted: true,
        monthly_balances,
        no_growth: NoGrowthBaseline::MonthlyWithdrawal(initial_balance / months as f64),
    })
}

/// Balance needed today to fund `monthly_withdrawal` for `years`.
pub fn simulate_required_initial(
    monthly_withdrawal: f64,
    years: f64,
    annual_rate: f64,
) -> Result<WithdrawalResult, ProjectionError> {
    require_positive("monthly_withdrawal", monthly_withdrawal)?;
    let months = horizon_months(years)?;
    let rate = drawdown_rate(annual_rate)?;

    let initial_balance = if rate == 0.0 {
        monthly_withdrawal * months as f64
    } else {
        monthly_withdrawal * (1.0 - (1.0 + rate).powf(-(months as f64))) / rate
    };

    let mut balance = initial_balance;
    let monthly_balances = (1..=months)
        .map(|month| {
            balance = balance * (1.0 + rate) - monthly_withdrawal;
            MonthBalance { month, balance }
        })
        .collect();

    Ok(WithdrawalResult {
        solved_for: WithdrawalUnknown::InitialBalance,
        duration: YearsMonths::from_months(months),
        monthly_withdrawal,
        initial_balance,
        depleted: true,
        monthly_balances,
        no_growth: NoGrowthBaseline::InitialBalance(monthly_withdrawal * months as f64),
    })
}

fn require_positive(name: &'static str, value: f64) -> Result<(), ProjectionError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ProjectionError::InvalidWithdrawalInput { name, value })
    }
}

fn horizon_months(years: f64) -> Result<u32, ProjectionError> {
    require_positive("years", years)?;
    let months = (years * MONTHS_PER_YEAR as f64).floor();
    if months < 1.0 || months > u32::MAX as f64 {
        return Err(ProjectionError::InvalidWithdrawalInput {
            name: "years",
            value: years,
        });
    }
    Ok(months as u32)
}

fn drawdown_rate(annual_rate: f64) -> Result<f64, ProjectionError> {
    if !annual_rate.is_finite() || annual_rate < 0.0 {
        return Err(ProjectionError::invalid(
            "annual_rate",
            "annual return rate cannot be less than 0",
        ));
    }
    Ok(monthly_rate(annual_rate, CompoundingMethod::Geometric))
}
