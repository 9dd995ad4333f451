mod engine;
mod error;
mod rate;
mod solver;
mod types;
mod withdrawal;

pub use engine::{contribution_for_month, simulate};
pub use error::ProjectionError;
pub use rate::{MONTHS_PER_YEAR, annual_from_monthly, monthly_rate};
pub use solver::{
    RATE_SEARCH_MAX, RATE_SEARCH_MIN, RATE_TOLERANCE, SolveOutcome, level_annuity_future_value,
    solve, solve_with_projection,
};
pub use types::{
    AccumulationInputs, AccumulationParams, AccumulationResult, CompoundingMethod, MonthBalance,
    NoGrowthBaseline, SchedulePeriod, SimulationOverrides, SolveTarget, SolvedValue,
    WithdrawalResult, WithdrawalUnknown, YearsMonths,
};
pub use withdrawal::{
    MAX_DRAWDOWN_MONTHS, simulate_duration, simulate_required_initial, simulate_withdrawal,
};
