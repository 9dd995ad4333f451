use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Serialize, Serializer};

use super::error::ProjectionError;
use super::rate::{MONTHS_PER_YEAR, monthly_rate};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompoundingMethod {
    #[default]
    Geometric,
    Arithmetic,
}

impl FromStr for CompoundingMethod {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "geometric" => Ok(Self::Geometric),
            "arithmetic" => Ok(Self::Arithmetic),
            other => Err(ProjectionError::invalid(
                "method",
                format!("must be either 'geometric' or 'arithmetic', got '{other}'"),
            )),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SolveTarget {
    Amount,
    Rate,
    Horizon,
}

impl FromStr for SolveTarget {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amount" => Ok(Self::Amount),
            "rate" => Ok(Self::Rate),
            "horizon" => Ok(Self::Horizon),
            other => Err(ProjectionError::invalid(
                "target",
                format!("must be one of 'amount', 'rate', 'horizon', got '{other}'"),
            )),
        }
    }
}

impl fmt::Display for SolveTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Amount => "amount",
            Self::Rate => "rate",
            Self::Horizon => "horizon",
        })
    }
}

/// Raw, unvalidated accumulation inputs. Rates are fractions (0.05 = 5%).
#[derive(Debug, Clone)]
pub struct AccumulationInputs {
    pub annual_return: f64,
    pub horizon_years: i64,
    pub monthly_contribution: f64,
    pub initial_balance: f64,
    pub method: CompoundingMethod,
    pub annual_increment: f64,
    pub increment_years: i64,
}

impl Default for AccumulationInputs {
    fn default() -> Self {
        Self {
            annual_return: 0.0,
            horizon_years: 1,
            monthly_contribution: 0.0,
            initial_balance: 0.0,
            method: CompoundingMethod::Geometric,
            annual_increment: 0.0,
            increment_years: 0,
        }
    }
}

/// Validated, immutable accumulation parameter set.
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulationParams {
    annual_return: f64,
    horizon_years: u32,
    monthly_contribution: f64,
    initial_balance: f64,
    method: CompoundingMethod,
    annual_increment: f64,
    increment_years: u32,
    monthly_rate: f64,
}

impl AccumulationParams {
    pub fn new(inputs: AccumulationInputs) -> Result<Self, ProjectionError> {
        if !inputs.annual_return.is_finite() || inputs.annual_return < 0.0 {
            return Err(ProjectionError::invalid(
                "annual_return",
                "yearly return rate cannot be less than 0",
            ));
        }
        if inputs.horizon_years <= 0 {
            return Err(ProjectionError::invalid(
                "horizon_years",
                "investment horizon must be positive",
            ));
        }
        if !inputs.monthly_contribution.is_finite() || inputs.monthly_contribution < 0.0 {
            return Err(ProjectionError::invalid(
                "monthly_contribution",
                "monthly contribution cannot be negative",
            ));
        }
        if !inputs.initial_balance.is_finite() || inputs.initial_balance < 0.0 {
            return Err(ProjectionError::invalid(
                "initial_balance",
                "initial balance cannot be negative",
            ));
        }
        if !inputs.annual_increment.is_finite() {
            return Err(ProjectionError::invalid(
                "annual_increment",
                "increment amount must be a number",
            ));
        }
        if inputs.increment_years < 0 {
            return Err(ProjectionError::invalid(
                "increment_years",
                "increment period cannot be negative",
            ));
        }
        // The month count must fit in u32 as well as the year count.
        let horizon_years = u32::try_from(inputs.horizon_years)
            .ok()
            .filter(|years| years.checked_mul(MONTHS_PER_YEAR).is_some())
            .ok_or_else(|| ProjectionError::invalid("horizon_years", "horizon is too large"))?;
        let increment_years = u32::try_from(inputs.increment_years)
            .map_err(|_| ProjectionError::invalid("increment_years", "period is too large"))?;

        Ok(Self {
            annual_return: inputs.annual_return,
            horizon_years,
            monthly_contribution: inputs.monthly_contribution,
            initial_balance: inputs.initial_balance,
            method: inputs.method,
            annual_increment: inputs.annual_increment,
            increment_years,
            monthly_rate: monthly_rate(inputs.annual_return, inputs.method),
        })
    }

    pub fn annual_return(&self) -> f64 {
        self.annual_return
    }

    pub fn horizon_years(&self) -> u32 {
        self.horizon_years
    }

    pub fn month_count(&self) -> u32 {
        self.horizon_years * MONTHS_PER_YEAR
    }

    pub fn monthly_contribution(&self) -> f64 {
        self.monthly_contribution
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    pub fn method(&self) -> CompoundingMethod {
        self.method
    }

    pub fn annual_increment(&self) -> f64 {
        self.annual_increment
    }

    pub fn increment_years(&self) -> u32 {
        self.increment_years
    }

    pub fn monthly_rate(&self) -> f64 {
        self.monthly_rate
    }
}

/// Per-call replacements for parameter-set values.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulationOverrides {
    pub horizon_years: Option<u32>,
    pub monthly_contribution: Option<f64>,
    pub monthly_rate: Option<f64>,
    /// Calendar month of period 0; any day within the month works.
    pub start_month: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulePeriod {
    #[serde(serialize_with = "serialize_epoch_millis")]
    pub date: NaiveDate,
    pub principal: i64,
    #[serde(rename = "return")]
    pub investment_return: i64,
    pub balance: i64,
    pub contribution: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccumulationResult {
    pub final_balance: i64,
    pub total_principal: i64,
    pub total_return: i64,
    #[serde(rename = "monthly_data")]
    pub schedule: Vec<SchedulePeriod>,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SolvedValue {
    /// Monthly contribution, ceiling-rounded.
    Amount(f64),
    /// Annual rate as a fraction.
    Rate(f64),
    /// Whole years, rounded up.
    Horizon(u32),
}

impl SolvedValue {
    pub fn value(self) -> f64 {
        match self {
            Self::Amount(v) | Self::Rate(v) => v,
            Self::Horizon(years) => years as f64,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct YearsMonths {
    pub years: u32,
    pub months: u32,
}

impl YearsMonths {
    pub fn from_months(total: u32) -> Self {
        Self {
            years: total / MONTHS_PER_YEAR,
            months: total % MONTHS_PER_YEAR,
        }
    }

    pub fn total_months(self) -> u32 {
        self.years * MONTHS_PER_YEAR + self.months
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalUnknown {
    Duration,
    MonthlyWithdrawal,
    InitialBalance,
}

/// What the same plan looks like with a 0% return.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum NoGrowthBaseline {
    Duration(YearsMonths),
    MonthlyWithdrawal(f64),
    InitialBalance(f64),
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct MonthBalance {
    pub month: u32,
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WithdrawalResult {
    pub solved_for: WithdrawalUnknown,
    pub duration: YearsMonths,
    pub monthly_withdrawal: f64,
    pub initial_balance: f64,
    /// False when the balance outlives the simulated window.
    pub depleted: bool,
    pub monthly_balances: Vec<MonthBalance>,
    pub no_growth: NoGrowthBaseline,
}

fn serialize_epoch_millis<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
    let millis = date
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_default();
    serializer.serialize_i64(millis)
}
