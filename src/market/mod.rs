//! Descriptive statistics over historical index price series.
//!
//! Prices are supplied by the caller (CSV file or in memory); nothing here
//! talks to a data provider.

use std::path::Path;

use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("{symbol}: need at least two prices, got {count}")]
    TooFewPrices { symbol: String, count: usize },

    #[error("{symbol}: price on {date} must be finite and > 0, got {close}")]
    NonPositivePrice {
        symbol: String,
        date: NaiveDate,
        close: f64,
    },

    #[error("failed to read price file: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Copy, Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatistics {
    pub symbol: String,
    pub annual_return: f64,
    pub total_return: f64,
    pub annual_volatility: f64,
    pub initial_price: f64,
    pub latest_price: f64,
    pub trading_days: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSummary {
    pub average_annual_return: f64,
    pub max_annual_return: f64,
    pub min_annual_return: f64,
    pub average_volatility: f64,
    pub max_volatility: f64,
    pub min_volatility: f64,
}

/// Reads `date,close` rows and returns them in date order.
pub fn load_price_csv(path: impl AsRef<Path>) -> Result<Vec<PricePoint>, MarketDataError> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;
    let mut prices = reader
        .deserialize::<PricePoint>()
        .collect::<Result<Vec<_>, _>>()?;
    prices.sort_by_key(|p| p.date);
    debug!("loaded {} prices from {}", prices.len(), path.as_ref().display());
    Ok(prices)
}

/// Annualised return and volatility assuming 252 trading days a year.
pub fn index_statistics(
    symbol: &str,
    prices: &[PricePoint],
) -> Result<IndexStatistics, MarketDataError> {
    if prices.len() < 2 {
        return Err(MarketDataError::TooFewPrices {
            symbol: symbol.to_string(),
            count: prices.len(),
        });
    }
    let first = prices[0];
    let last = prices[prices.len() - 1];
    if let Some(bad) = prices.iter().find(|p| !p.close.is_finite() || p.close <= 0.0) {
        return Err(MarketDataError::NonPositivePrice {
            symbol: symbol.to_string(),
            date: bad.date,
            close: bad.close,
        });
    }

    let total_return = last.close / first.close - 1.0;
    let years = prices.len() as f64 / TRADING_DAYS_PER_YEAR;
    let annual_return = (1.0 + total_return).powf(1.0 / years) - 1.0;

    let daily_returns = prices
        .windows(2)
        .map(|w| w[1].close / w[0].close - 1.0)
        .collect::<Vec<_>>();
    let annual_volatility = sample_std_dev(&daily_returns) * TRADING_DAYS_PER_YEAR.sqrt();

    Ok(IndexStatistics {
        symbol: symbol.to_string(),
        annual_return,
        total_return,
        annual_volatility,
        initial_price: first.close,
        latest_price: last.close,
        trading_days: prices.len(),
        start_date: first.date,
        end_date: last.date,
    })
}

pub fn summarize(indices: &[IndexStatistics]) -> Option<MarketSummary> {
    if indices.is_empty() {
        return None;
    }
    let returns = indices.iter().map(|i| i.annual_return).collect::<Vec<_>>();
    let vols = indices.iter().map(|i| i.annual_volatility).collect::<Vec<_>>();
    Some(MarketSummary {
        average_annual_return: mean(&returns),
        max_annual_return: returns.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        min_annual_return: returns.iter().copied().fold(f64::INFINITY, f64::min),
        average_volatility: mean(&vols),
        max_volatility: vols.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        min_volatility: vols.iter().copied().fold(f64::INFINITY, f64::min),
    })
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

// n - 1 denominator; a single observation has no spread.
fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}
