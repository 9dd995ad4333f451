use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use crate::api::{DEFAULT_PORT, ServerConfig, run_http_server};
use crate::core::{
    AccumulationInputs, AccumulationParams, CompoundingMethod, SimulationOverrides, SolveTarget,
    simulate, simulate_duration, simulate_required_initial, simulate_withdrawal,
    solve_with_projection,
};
use crate::market::{IndexStatistics, MarketSummary, index_statistics, load_price_csv, summarize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliMethod {
    Geometric,
    Arithmetic,
}

impl From<CliMethod> for CompoundingMethod {
    fn from(value: CliMethod) -> Self {
        match value {
            CliMethod::Geometric => CompoundingMethod::Geometric,
            CliMethod::Arithmetic => CompoundingMethod::Arithmetic,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliSolveTarget {
    Amount,
    Rate,
    Horizon,
}

impl From<CliSolveTarget> for SolveTarget {
    fn from(value: CliSolveTarget) -> Self {
        match value {
            CliSolveTarget::Amount => SolveTarget::Amount,
            CliSolveTarget::Rate => SolveTarget::Rate,
            CliSolveTarget::Horizon => SolveTarget::Horizon,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "compound",
    about = "Compound-interest planner: savings projections, inverse solves and drawdown"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API
    Serve(ServeArgs),
    /// Project a savings plan month by month
    Project(AccumulationArgs),
    /// Solve for the contribution, rate or horizon that reaches a target balance
    Solve {
        #[arg(long, value_enum)]
        target: CliSolveTarget,
        #[arg(long, help = "Target final balance")]
        target_value: f64,
        #[command(flatten)]
        plan: AccumulationArgs,
    },
    /// Plan withdrawals from an existing balance
    Withdraw {
        #[command(subcommand)]
        mode: WithdrawCommand,
    },
    /// Annualised return and volatility of index price files (date,close CSV)
    MarketStats {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    #[arg(
        long = "allowed-origin",
        help = "CORS origin to allow; repeat for several. Any origin when omitted"
    )]
    pub allowed_origins: Vec<String>,
}

impl From<ServeArgs> for ServerConfig {
    fn from(args: ServeArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            allowed_origins: args.allowed_origins,
        }
    }
}

#[derive(Args, Debug)]
pub struct AccumulationArgs {
    #[arg(long, help = "Expected annual return in percent, e.g. 7")]
    pub annual_return: f64,
    #[arg(long, help = "Investment horizon in whole years")]
    pub years: i64,
    #[arg(long, default_value_t = 0.0)]
    pub monthly_contribution: f64,
    #[arg(long, default_value_t = 0.0)]
    pub initial_balance: f64,
    #[arg(long, value_enum, default_value_t = CliMethod::Geometric)]
    pub method: CliMethod,
    #[arg(
        long,
        default_value_t = 0.0,
        allow_negative_numbers = true,
        help = "Amount added to the monthly contribution after each full year"
    )]
    pub annual_increment: f64,
    #[arg(
        long,
        default_value_t = 0,
        help = "Number of yearly increments before the contribution levels off"
    )]
    pub increment_years: i64,
    #[arg(
        long,
        help = "Any date in the first month of the schedule (YYYY-MM-DD); defaults to today"
    )]
    pub start_month: Option<NaiveDate>,
}

impl AccumulationArgs {
    fn params(&self) -> anyhow::Result<AccumulationParams> {
        let params = AccumulationParams::new(AccumulationInputs {
            annual_return: self.annual_return / 100.0,
            horizon_years: self.years,
            monthly_contribution: self.monthly_contribution,
            initial_balance: self.initial_balance,
            method: self.method.into(),
            annual_increment: self.annual_increment,
            increment_years: self.increment_years,
        })?;
        Ok(params)
    }
}

#[derive(Subcommand, Debug)]
pub enum WithdrawCommand {
    /// How long a balance lasts at a fixed monthly withdrawal
    Duration {
        #[arg(long)]
        initial_balance: f64,
        #[arg(long)]
        monthly_withdrawal: f64,
        #[arg(long, default_value_t = 0.0, help = "Annual return in percent")]
        annual_return: f64,
    },
    /// Monthly withdrawal that exhausts a balance over a number of years
    Amount {
        #[arg(long)]
        initial_balance: f64,
        #[arg(long)]
        years: f64,
        #[arg(long, default_value_t = 0.0, help = "Annual return in percent")]
        annual_return: f64,
    },
    /// Balance needed to fund a monthly withdrawal for a number of years
    Initial {
        #[arg(long)]
        monthly_withdrawal: f64,
        #[arg(long)]
        years: f64,
        #[arg(long, default_value_t = 0.0, help = "Annual return in percent")]
        annual_return: f64,
    },
}

#[derive(Debug, Serialize)]
pub struct MarketReport {
    pub indices: Vec<IndexStatistics>,
    pub summary: Option<MarketSummary>,
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => run_http_server(args.into())
            .await
            .context("HTTP server stopped"),
        Command::Project(plan) => {
            let overrides = SimulationOverrides {
                start_month: plan.start_month,
                ..SimulationOverrides::default()
            };
            print_json(&simulate(&plan.params()?, overrides)?)
        }
        Command::Solve {
            target,
            target_value,
            plan,
        } => print_json(&solve_with_projection(
            &plan.params()?,
            target.into(),
            target_value,
            plan.start_month,
        )?),
        Command::Withdraw { mode } => {
            let result = match mode {
                WithdrawCommand::Duration {
                    initial_balance,
                    monthly_withdrawal,
                    annual_return,
                } => simulate_duration(initial_balance, monthly_withdrawal, annual_return / 100.0),
                WithdrawCommand::Amount {
                    initial_balance,
                    years,
                    annual_return,
                } => simulate_withdrawal(initial_balance, years, annual_return / 100.0),
                WithdrawCommand::Initial {
                    monthly_withdrawal,
                    years,
                    annual_return,
                } => simulate_required_initial(monthly_withdrawal, years, annual_return / 100.0),
            }?;
            print_json(&result)
        }
        Command::MarketStats { files } => print_json(&market_report(&files)?),
    }
}

/// Statistics per file, keyed by the file stem, plus a cross-index summary.
pub fn market_report(files: &[PathBuf]) -> anyhow::Result<MarketReport> {
    let indices = files
        .iter()
        .map(|path| {
            let prices = load_price_csv(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Ok(index_statistics(&symbol_for(path), &prices)?)
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let summary = summarize(&indices);
    Ok(MarketReport { indices, summary })
}

fn symbol_for(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("index")
        .to_string()
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("compound").chain(args.iter().copied()))
            .expect("arguments parse")
    }

    #[test]
    fn project_flags_build_percent_based_params() {
        let Command::Project(plan) = parse(&[
            "project",
            "--annual-return",
            "7",
            "--years",
            "20",
            "--monthly-contribution",
            "500",
            "--method",
            "arithmetic",
            "--start-month",
            "2024-01-15",
        ])
        .command
        else {
            panic!("expected project");
        };
        let params = plan.params().expect("valid plan");
        assert!((params.annual_return() - 0.07).abs() < 1e-12);
        assert_eq!(params.horizon_years(), 20);
        assert_eq!(params.method(), CompoundingMethod::Arithmetic);
        assert_eq!(
            plan.start_month,
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
    }

    #[test]
    fn invalid_plan_surfaces_core_error() {
        let Command::Project(plan) =
            parse(&["project", "--annual-return", "5", "--years", "0"]).command
        else {
            panic!("expected project");
        };
        let err = plan.params().expect_err("zero horizon");
        assert!(err.to_string().contains("horizon_years"));
    }

    #[test]
    fn solve_requires_known_target() {
        let cli = parse(&[
            "solve",
            "--target",
            "horizon",
            "--target-value",
            "1000",
            "--annual-return",
            "2",
            "--years",
            "10",
        ]);
        let Command::Solve { target, .. } = cli.command else {
            panic!("expected solve");
        };
        assert_eq!(SolveTarget::from(target), SolveTarget::Horizon);

        assert!(
            Cli::try_parse_from(["compound", "solve", "--target", "num", "--target-value", "1"])
                .is_err()
        );
    }

    #[test]
    fn serve_args_become_server_config() {
        let Command::Serve(args) = parse(&[
            "serve",
            "--host",
            "127.0.0.1",
            "--port",
            "8080",
            "--allowed-origin",
            "http://localhost:3000",
            "--allowed-origin",
            "https://example.org",
        ])
        .command
        else {
            panic!("expected serve");
        };
        let config = ServerConfig::from(args);
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:8080");
        assert_eq!(config.allowed_origins.len(), 2);
    }

    #[test]
    fn withdraw_subcommands_parse() {
        let cli = parse(&[
            "withdraw",
            "amount",
            "--initial-balance",
            "100000",
            "--years",
            "20",
            "--annual-return",
            "4",
        ]);
        assert!(matches!(
            cli.command,
            Command::Withdraw {
                mode: WithdrawCommand::Amount { years, .. }
            } if years == 20.0
        ));
    }

    #[test]
    fn market_report_names_indices_by_file_stem() {
        let dir = std::env::temp_dir().join(format!("compound-cli-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("temp dir");
        let spx = dir.join("SPX.csv");
        let ndx = dir.join("NDX.csv");
        fs::write(&spx, "date,close\n2024-01-02,100\n2024-01-03,101\n2024-01-04,99\n")
            .expect("write csv");
        fs::write(&ndx, "date,close\n2024-01-02,200\n2024-01-03,210\n").expect("write csv");

        let report = market_report(&[spx, ndx]).expect("report");
        assert_eq!(report.indices[0].symbol, "SPX");
        assert_eq!(report.indices[1].symbol, "NDX");
        assert!(report.summary.is_some());

        let missing = market_report(&[dir.join("missing.csv")]).expect_err("no file");
        assert!(format!("{missing:#}").contains("missing.csv"));

        fs::remove_dir_all(&dir).ok();
    }
}
