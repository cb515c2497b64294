use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde_json::json;

use wallet_dashboard_core::models::fetch::{Disposition, FanOutResult};
use wallet_dashboard_core::models::interval::{CategoryFilter, DateRange, Interval, ValueMode};
use wallet_dashboard_core::models::query::{HistoricalQuery, PortfolioQuery, TransactionQuery};
use wallet_dashboard_core::models::settings::Settings;
use wallet_dashboard_core::services::interval_service::CategoryFlowSpec;
use wallet_dashboard_core::services::value_aggregator::KeyMode;
use wallet_dashboard_core::WalletDashboard;

#[derive(Parser, Debug)]
#[command(name = "wallet-dashboard")]
#[command(about = "Aggregate wallet portfolios and transaction flows into dashboard datasets")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Key assets by name instead of symbol
    #[arg(long, global = true)]
    by_name: bool,

    /// Ignore cached results
    #[arg(long, global = true)]
    refresh: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Asset allocation
    Assets(Wallets),
    /// Protocol allocation
    Protocols(Wallets),
    /// Chain allocation
    Chains(Wallets),
    /// Asset comparison and net worth across dates
    Compare {
        /// Snapshot dates, comma separated (YYYY-MM-DD)
        #[arg(long, required = true, value_delimiter = ',', value_parser = parse_date)]
        dates: Vec<NaiveDate>,

        #[command(flatten)]
        wallets: Wallets,
    },
    /// Category flows per interval
    Flows {
        #[arg(long, value_parser = parse_date)]
        from: NaiveDate,

        #[arg(long, value_parser = parse_date)]
        to: NaiveDate,

        /// day, week, month, quarter or year
        #[arg(long, default_value = "month")]
        interval: Interval,

        /// Sum fees instead of transferred value
        #[arg(long)]
        fees: bool,

        /// Only these category keys, comma separated
        #[arg(long, value_delimiter = ',')]
        categories: Option<Vec<String>>,

        #[command(flatten)]
        wallets: Wallets,
    },
    /// Delete expired cache entries
    Sweep,
}

#[derive(Args, Debug)]
struct Wallets {
    /// Wallet addresses
    #[arg(required = true, value_name = "ADDRESS")]
    addresses: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let settings = Settings::from_env().context("Invalid configuration")?;
    let dashboard = WalletDashboard::from_settings(settings)?;
    tracing::debug!(?dashboard, "Dashboard ready");

    let mode = if cli.by_name { KeyMode::Name } else { KeyMode::Symbol };

    let (output, disposition) = match cli.command {
        Command::Assets(wallets) => {
            let result = dashboard.portfolios(&portfolio_query(wallets, cli.refresh)).await?;
            let dataset = dashboard.asset_allocation(&result, mode);
            (report(&result, json!(dataset)), result.disposition())
        }
        Command::Protocols(wallets) => {
            let result = dashboard.portfolios(&portfolio_query(wallets, cli.refresh)).await?;
            let dataset = dashboard.protocol_allocation(&result);
            (report(&result, json!(dataset)), result.disposition())
        }
        Command::Chains(wallets) => {
            let result = dashboard.portfolios(&portfolio_query(wallets, cli.refresh)).await?;
            let dataset = dashboard.chain_allocation(&result);
            (report(&result, json!(dataset)), result.disposition())
        }
        Command::Compare { dates, wallets } => {
            let mut query = HistoricalQuery::new(wallets.addresses, dates);
            query.force_refresh = cli.refresh;
            let dates = query.normalized_dates()?;
            let result = dashboard.historical_portfolios(&query).await?;
            let body = json!({
                "comparison": dashboard.asset_comparison(&result, &dates, mode),
                "netWorth": dashboard.net_worth_series(&result, &dates),
            });
            (report(&result, body), result.disposition())
        }
        Command::Flows {
            from,
            to,
            interval,
            fees,
            categories,
            wallets,
        } => {
            let range = DateRange::new(from, to)?;

            let mut spec = CategoryFlowSpec::new(range, interval);
            if fees {
                spec = spec.with_mode(ValueMode::Fees);
            }
            if let Some(categories) = categories {
                spec = spec.with_filter(CategoryFilter::only(categories));
            }

            let mut query = TransactionQuery::new(wallets.addresses, range);
            query.force_refresh = cli.refresh;
            let result = dashboard.transactions(&query).await?;
            let table = dashboard.category_flows(&result, &spec);
            let (starts, stacks) = dashboard.category_stacks(&table, &spec);
            let body = json!({ "intervals": starts, "stacks": stacks, "table": table });
            (report(&result, body), result.disposition())
        }
        Command::Sweep => {
            let removed = dashboard.sweep_cache()?;
            (json!({ "removed": removed }), Disposition::TotalSuccess)
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    if disposition == Disposition::TotalFailure {
        bail!("Every upstream request failed");
    }
    Ok(())
}

fn portfolio_query(wallets: Wallets, refresh: bool) -> PortfolioQuery {
    let mut query = PortfolioQuery::new(wallets.addresses);
    query.force_refresh = refresh;
    query
}

/// Attach fan-out bookkeeping to a pipeline output.
fn report<T>(result: &FanOutResult<T>, data: serde_json::Value) -> serde_json::Value {
    json!({
        "disposition": result.disposition().to_string(),
        "fromCache": result.from_cache,
        "errors": result.errors,
        "data": data,
    })
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| format!("invalid date '{raw}', expected YYYY-MM-DD"))
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
