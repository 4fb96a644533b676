use std::{fs::OpenOptions, path::PathBuf, process::exit, sync::Arc};

use clap::Parser;
use rusqlite::Connection;
use tracing_subscriber::{EnvFilter, Layer, filter, layer::SubscriberExt, util::SubscriberInitExt};

use daily_spend::{
    CategoryCatalog, Dashboard, DashboardConfig, Error, Identity, MemoryIdentityProvider,
    SessionBinder, SqliteDocumentStore, TransactionStore, TransactionType, UserScope,
    format_currency, format_percentage, format_timestamp, load_catalog,
};

/// Print the dashboard of a daily_spend user.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long)]
    db_path: String,

    /// The user ID whose transactions to summarise.
    #[arg(long, short)]
    user: String,

    /// File path to a JSON category catalog. Uses the built-in catalog if not given.
    #[arg(long)]
    catalog_path: Option<PathBuf>,

    /// The monthly budget to compare spending against.
    #[arg(long)]
    monthly_budget: Option<f64>,

    /// How many recent transactions to show.
    #[arg(long)]
    recent_limit: Option<usize>,
}

fn main() {
    setup_logging();

    let args = Args::parse();

    if let Err(error) = run(args) {
        tracing::error!("could not build the summary: {error}");
        eprintln!("{error}");
        exit(1);
    }
}

fn run(args: Args) -> Result<(), Error> {
    let mut config = DashboardConfig::from_env();
    if let Some(monthly_budget) = args.monthly_budget {
        config.monthly_budget = monthly_budget;
    }
    if let Some(recent_limit) = args.recent_limit {
        config.recent_limit = recent_limit;
    }

    let catalog = match &args.catalog_path {
        Some(path) => load_catalog(path)?,
        None => CategoryCatalog::reference(),
    };

    let connection = Connection::open(&args.db_path).map_err(daily_spend::StoreError::from)?;
    let identity = MemoryIdentityProvider::new();
    let binder = SessionBinder::new(
        TransactionStore::new(SqliteDocumentStore::new(connection)?, Arc::new(catalog)),
        Arc::new(identity.clone()),
    );
    let _listener = binder.start();

    identity.sign_in(Identity::new(UserScope::new(&args.user)?))?;

    let view = binder.view()?;
    if let Some(error) = view.last_error {
        return Err(error.into());
    }

    print_dashboard(&binder.dashboard(&config)?, &config)
}

fn print_dashboard(dashboard: &Dashboard, config: &DashboardConfig) -> Result<(), Error> {
    let summary = &dashboard.summary;

    println!("Balance:  {}", format_currency(summary.balance));
    println!("Income:   {}", format_currency(summary.total_income));
    println!("Expenses: {}", format_currency(summary.total_expense));
    println!();

    let budget = &dashboard.budget;
    println!(
        "Monthly budget: {} spent of {} ({}), {} {}",
        format_currency(budget.spent),
        format_currency(budget.budget),
        format_percentage(budget.progress * 100.0),
        format_currency(budget.remaining.abs()),
        if budget.is_over_budget() { "over" } else { "left" },
    );
    println!();

    println!("Spending by category:");
    for row in &dashboard.breakdown {
        println!(
            "  [{}] {:<12} {:>12} {:>5}",
            row.definition.icon,
            row.name,
            format_currency(row.total),
            format_percentage(row.percent),
        );
    }
    println!();

    println!("Recent transactions:");
    if dashboard.recent.is_empty() {
        println!("  No transactions yet.");
    }
    for record in &dashboard.recent {
        let amount = match record.type_ {
            TransactionType::Income => format_currency(record.amount),
            TransactionType::Expense => format_currency(-record.amount),
        };

        println!(
            "  {}  {:<12} {:>12}  {}",
            format_timestamp(record.created_at, &config.local_timezone)?,
            record.category,
            amount,
            record.description,
        );
    }

    Ok(())
}

fn setup_logging() {
    let stdout_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(std::io::stderr);

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .expect("Could not create log file");

    let debug_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(Arc::new(log_file));

    tracing_subscriber::registry()
        .with(
            stdout_log
                .with_filter(filter::LevelFilter::INFO)
                .and_then(debug_log)
                .with_filter(filter::LevelFilter::DEBUG)
                .with_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
                ),
        )
        .init();
}
