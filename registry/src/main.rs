//! Bravo CLI
//!
//! Builds the currency service from the environment, fetches the initial
//! rates and runs one registry or conversion command.

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bravo_common::{CurrencyError, CurrencyKind};
use bravo_registry::{CurrencyService, ServiceConfig};

/// Bravo currency conversion CLI
#[derive(Parser, Debug)]
#[command(name = "bravo")]
#[command(about = "Currency registry and conversion backed by live market rates")]
struct Args {
    /// Fictitious currencies to register first, as CODE=RATE
    #[arg(long = "fictitious", value_parser = parse_fictitious)]
    fictitious: Vec<(String, Decimal)>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert an amount between two registered currencies
    Convert {
        from: String,
        to: String,
        #[arg(allow_negative_numbers = true)]
        amount: Decimal,
    },
    /// List registered currencies with their rates
    List,
    /// Show one currency
    Get { code: String },
    /// Register a currency and show it
    Add {
        code: String,
        /// FIAT, CRYPTO or FICTITIOUS
        #[arg(long = "type")]
        kind: CurrencyKind,
        /// Fixed USD rate, required for FICTITIOUS
        #[arg(long)]
        rate: Option<Decimal>,
    },
    /// Unregister a currency, then list what remains
    Remove { code: String },
}

fn parse_fictitious(raw: &str) -> Result<(String, Decimal), String> {
    let (code, rate) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected CODE=RATE, got {}", raw))?;
    let rate = rate
        .trim()
        .parse::<Decimal>()
        .map_err(|e| format!("invalid rate {}: {}", rate, e))?;
    Ok((code.trim().to_string(), rate))
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    code: &'a str,
    upstream: bool,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(service: &CurrencyService, command: Command) -> Result<(), CurrencyError> {
    match command {
        Command::Convert { from, to, amount } => {
            let converted_amount = service.convert(from.as_str(), to.as_str(), amount).await?;
            let body = serde_json::json!({ "convertedAmount": converted_amount });
            println!("{}", body);
        }
        Command::List => {
            let currencies = service.list_currencies().await?;
            println!("{}", serde_json::json!(currencies));
        }
        Command::Get { code } => match service.get_currency(code.as_str()).await? {
            Some(snapshot) => println!("{}", serde_json::json!(snapshot)),
            None => println!("null"),
        },
        Command::Add { code, kind, rate } => {
            let snapshot = service.add_currency(&code, kind, rate).await?;
            println!("{}", serde_json::json!(snapshot));
        }
        Command::Remove { code } => {
            service.remove_currency(code.as_str())?;
            let currencies = service.list_currencies().await?;
            println!("{}", serde_json::json!(currencies));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(config.log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!config.log_json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    let args = Args::parse();

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let service = CurrencyService::from_config(&config)?;

    // A failed startup fetch is not fatal; commands refresh on demand.
    if let Err(e) = service.initialize().await {
        warn!(error = %e, "Initial rate fetch failed");
    }

    for (code, rate) in args.fictitious {
        let snapshot = service
            .add_currency(&code, CurrencyKind::Fictitious, Some(rate))
            .await?;
        info!(code = %snapshot.code, unit = %snapshot.unit, "Registered fictitious currency");
    }

    if let Err(e) = run(&service, args.command).await {
        print_json(&ErrorBody {
            error: e.to_string(),
            code: e.error_code(),
            upstream: e.is_upstream(),
        })?;
        return Err(e.into());
    }

    Ok(())
}
