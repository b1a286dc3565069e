use anyhow::{Context, Result};
use chrono::Utc;
use std::env;
use std::path::Path;
use tracing::info;

use mail_ledger::{
    load_accounts_csv, run, upsert_accounts, EmlDirectory, LogNotifier, NoOpNotifier, Notifier,
    RunContext, RunOptions, ScannerConfig, Settings, SqliteLedger,
};

const USAGE: &str = "Usage:
  mail-ledger run [--dry-run] [--quiet]   Scan the mail directory and record transactions
  mail-ledger check                       Validate the configuration file
  mail-ledger import-accounts <csv>       Load ledger accounts (id,name,kind,active)";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().collect();
    let settings = Settings::from_env();

    match args.get(1).map(String::as_str) {
        Some("run") => {
            let flags = &args[2..];
            if let Some(unknown) = flags.iter().find(|f| *f != "--dry-run" && *f != "--quiet") {
                eprintln!("❌ Unknown option: {}\n\n{}", unknown, USAGE);
                std::process::exit(2);
            }
            let dry_run = flags.iter().any(|f| f == "--dry-run");
            let quiet = flags.iter().any(|f| f == "--quiet");
            run_scan(&settings, dry_run, quiet)?;
        }
        Some("check") => run_check(&settings)?,
        Some("import-accounts") => match args.get(2) {
            Some(csv_path) => run_import_accounts(&settings, Path::new(csv_path))?,
            None => {
                eprintln!("❌ Missing accounts CSV path\n\n{}", USAGE);
                std::process::exit(2);
            }
        },
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}

fn run_scan(settings: &Settings, dry_run: bool, quiet: bool) -> Result<()> {
    let config = ScannerConfig::from_file(&settings.config_path)?
        .compile()
        .context("Invalid configuration")?;

    let ledger = SqliteLedger::open(&settings.db_path)?;
    let mut source = EmlDirectory::open(&settings.maildir)?;

    let notifier: Box<dyn Notifier> = if quiet {
        Box::new(NoOpNotifier)
    } else {
        Box::new(LogNotifier)
    };

    let options = RunOptions {
        dry_run,
        ledger_url: settings.ledger_url.clone(),
    };

    let mut context = RunContext::load(&config, &ledger, Utc::now())?;
    let summary = run(&config, &mut context, &mut source, &ledger, notifier.as_ref(), &options)?;

    println!(
        "✓ {} emails: {} created, {} matched, {} unparsable, {} failed",
        summary.total(),
        summary.created,
        summary.duplicates,
        summary.unparsable,
        summary.failed
    );

    Ok(())
}

fn run_check(settings: &Settings) -> Result<()> {
    let config = ScannerConfig::from_file(&settings.config_path)?
        .compile()
        .context("Invalid configuration")?;

    for mailbox in &config.mailboxes {
        println!("📬 {}", mailbox.from_email);
        for rule in mailbox.rules.rules() {
            println!("   • {} ({} steps)", rule.name(), rule.steps().len());
        }
    }
    println!("✓ Configuration OK: {} rules", config.rule_count());

    Ok(())
}

fn run_import_accounts(settings: &Settings, csv_path: &Path) -> Result<()> {
    let accounts = load_accounts_csv(csv_path)?;
    let ledger = SqliteLedger::open(&settings.db_path)?;
    let count = upsert_accounts(ledger.connection(), &accounts)?;

    info!(path = %csv_path.display(), count, "accounts imported");
    println!("✓ Imported {} accounts", count);

    Ok(())
}
