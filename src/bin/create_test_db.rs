use std::error::Error;
use std::path::Path;
use std::process::exit;
use std::sync::Arc;

use clap::Parser;
use rusqlite::Connection;

use daily_spend::{
    CategoryCatalog, SqliteDocumentStore, TransactionCandidate, TransactionStore, TransactionType,
    UserScope,
};

/// A utility for creating a test database for daily_spend.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to save the SQLite database to.
    #[arg(long, short)]
    output_path: String,

    /// The user ID to create the sample transactions for.
    #[arg(long, short, default_value = "test-user")]
    user: String,
}

const SAMPLE_TRANSACTIONS: [(f64, &str, &str, TransactionType); 8] = [
    (3200.0, "Salary", "Monthly pay", TransactionType::Income),
    (84.2, "Food", "Groceries", TransactionType::Expense),
    (12.5, "Food", "Lunch", TransactionType::Expense),
    (45.0, "Transport", "Bus pass top up", TransactionType::Expense),
    (129.99, "Shopping", "Running shoes", TransactionType::Expense),
    (150.0, "Other", "Sold old bike", TransactionType::Income),
    (30.0, "Other", "Birthday present", TransactionType::Expense),
    (18.0, "Transport", "Taxi", TransactionType::Expense),
];

/// Create and populate a database for manual testing.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let output_path = Path::new(&args.output_path);

    match output_path.extension() {
        None => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        Some(extension) if extension.is_empty() => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        _ => {}
    }

    if output_path.is_file() {
        eprintln!("File already exists at {output_path:#?}!");
        exit(1);
    }

    let scope = UserScope::new(&args.user)?;

    println!("Creating database at {output_path:#?}");
    let store = TransactionStore::new(
        SqliteDocumentStore::new(Connection::open(output_path)?)?,
        Arc::new(CategoryCatalog::reference()),
    );

    println!("Creating sample transactions for {scope}...");

    for (amount, category, description, type_) in SAMPLE_TRANSACTIONS {
        store.add(
            &scope,
            &TransactionCandidate::new(amount, category, type_).description(description),
        )?;
    }

    println!("Success!");

    Ok(())
}
