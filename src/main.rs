//! lnredeem - Ecash to Lightning Redemption Service
//!
//! Run modes:
//!   lnredeem api [--port <port>]   - Start REST API
//!   lnredeem decode <token>        - Decode a token offline
//!   lnredeem validate <address>    - Check a Lightning address
//!   lnredeem check <token>         - Ask the mint about a token

use lnredeem::api::{self, AppState};
use lnredeem::common::init_from_config;
use lnredeem::types::sats_to_display;
use lnredeem::{LedgerSweeper, RedeemConfig, RedemptionService, SpendableReport};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return ExitCode::SUCCESS;
    }

    let config = match RedeemConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_from_config(&config) {
        eprintln!("Logging setup failed: {}", e);
    }

    match args[1].as_str() {
        "api" => run_api_server(config, &args[2..]).await,
        "decode" => cmd_decode(&config, &args[2..]),
        "validate" => cmd_validate(&config, &args[2..]).await,
        "check" => cmd_check(&config, &args[2..]).await,
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        _ => {
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    println!("lnredeem - Ecash to Lightning Redemption Service");
    println!();
    println!("Usage:");
    println!("  lnredeem api [--port <port>]   Start REST API server (default: 3001)");
    println!("  lnredeem decode <token>        Decode a token without contacting its mint");
    println!("  lnredeem validate <address>    Resolve a Lightning address");
    println!("  lnredeem check <token>         Check proof spendability at the mint");
    println!();
    println!("Environment Variables:");
    println!("  LNREDEEM_ALLOWED_DOMAINS      Comma-separated destination domains (default: *)");
    println!("  LNREDEEM_DEFAULT_ADDRESS      Destination when none is supplied");
    println!("  LNREDEEM_RATE_LIMIT           Requests per minute per client (default: 30)");
    println!("  LNREDEEM_PORT                 REST API port (default: 3001)");
    println!("  LNREDEEM_HTTP_TIMEOUT_SECS    Outbound request timeout (default: 10)");
    println!("  LNREDEEM_MELT_TIMEOUT_SECS    Melt submission timeout (default: 300)");
    println!("  LNREDEEM_RETENTION_HOURS      Attempt retention (default: 24)");
    println!("  LNREDEEM_SWEEP_INTERVAL_SECS  Sweep period (default: 3600)");
    println!("  LNREDEEM_INVOICE_COMMENT      Comment sent with invoice requests");
    println!("  LNREDEEM_LOG_LEVEL            trace|debug|info|warn|error (default: info)");
    println!("  LNREDEEM_LOG_JSON             1 for JSON logs");
}

/// Start REST API server with the ledger sweeper alongside
async fn run_api_server(config: RedeemConfig, args: &[String]) -> ExitCode {
    let mut port = config.port;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                match args[i + 1].parse() {
                    Ok(p) => port = p,
                    Err(_) => {
                        eprintln!("Invalid port: {}", args[i + 1]);
                        return ExitCode::FAILURE;
                    }
                }
                i += 2;
            }
            _ => i += 1,
        }
    }

    config.log_summary();

    let service = Arc::new(RedemptionService::from_config(&config));
    let state = AppState::from_config(service.clone(), &config);

    Arc::new(LedgerSweeper::new(service, config.sweep_interval)).spawn();

    let limiter = state.limiter.clone();
    let cleanup_period = config.sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cleanup_period);
        loop {
            ticker.tick().await;
            limiter.cleanup().await;
        }
    });

    match api::start_server(state, port).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("API server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_decode(config: &RedeemConfig, args: &[String]) -> ExitCode {
    let Some(token) = args.first() else {
        eprintln!("Usage: lnredeem decode <token>");
        return ExitCode::FAILURE;
    };

    let service = RedemptionService::from_config(config);
    match service.decode_token(token) {
        Ok(info) => {
            println!("=== Token ===");
            println!("Mint:          {}", info.mint_url);
            println!("Unit:          {}", info.unit);
            println!("Format:        {}", info.format_version);
            println!("Value:         {}", sats_to_display(info.total_value));
            println!("Proofs:        {}", info.proof_count);
            println!("Denominations: {:?}", info.denominations);
            if let Some(memo) = info.memo {
                println!("Memo:          {}", memo);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Decode failed [{}]: {}", e.error_code(), e.message());
            ExitCode::FAILURE
        }
    }
}

async fn cmd_validate(config: &RedeemConfig, args: &[String]) -> ExitCode {
    let Some(address) = args.first() else {
        eprintln!("Usage: lnredeem validate <address>");
        return ExitCode::FAILURE;
    };

    let service = RedemptionService::from_config(config);
    let report = service.validate_address(address).await;

    if report.valid {
        println!("=== {} ===", address);
        println!("Domain:   {}", report.domain.unwrap_or_default());
        println!(
            "Min:      {}",
            sats_to_display(report.min_amount.unwrap_or_default())
        );
        println!(
            "Max:      {}",
            sats_to_display(report.max_amount.unwrap_or_default())
        );
        println!("Comments: {} chars", report.comment_max_length.unwrap_or(0));
        ExitCode::SUCCESS
    } else {
        match report.error {
            Some(err) => eprintln!("Invalid address [{}]: {}", err.kind, err.message),
            None => eprintln!("Address is not payable"),
        }
        ExitCode::FAILURE
    }
}

async fn cmd_check(config: &RedeemConfig, args: &[String]) -> ExitCode {
    let Some(token) = args.first() else {
        eprintln!("Usage: lnredeem check <token>");
        return ExitCode::FAILURE;
    };

    let service = RedemptionService::from_config(config);
    match service.check_spendable(token).await {
        Ok(SpendableReport::Checked {
            spendable,
            pending,
            mint_url,
            total_value,
        }) => {
            let unspent = spendable.iter().filter(|s| **s).count();
            let in_flight = pending.iter().filter(|p| **p).count();
            println!("=== {} ===", mint_url);
            println!("Value:     {}", sats_to_display(total_value));
            println!("Spendable: {}/{}", unspent, spendable.len());
            println!("Pending:   {}", in_flight);
            ExitCode::SUCCESS
        }
        Ok(SpendableReport::Unsupported { reason, .. }) => {
            println!("Mint does not support spendability checks: {}", reason);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Check failed [{}]: {}", e.error_code(), e.message());
            ExitCode::FAILURE
        }
    }
}
