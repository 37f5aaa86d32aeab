use std::error::Error;
use std::path::Path;
use std::process::exit;

use clap::Parser;
use time::{Duration, OffsetDateTime};

use ledgerline::{
    EntryKind, NewRecurrenceTemplate, RecurrencePattern, SeedMode, create_category,
    create_template, create_trip, create_user, initialize_db, open_connection,
};

/// A utility for creating a test database for the REST API server of ledgerline.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to save the SQLite database to.
    #[arg(long, short)]
    output_path: String,
}

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

    println!("Creating database at {output_path:#?}");
    let conn = open_connection(output_path)?;

    initialize_db(&conn)?;

    println!("Creating test user...");
    let user = create_user("test", &conn)?;

    println!("Creating categories and a trip...");
    let housing = create_category("Housing", &conn)?;
    let salary = create_category("Salary", &conn)?;
    let subscriptions = create_category("Subscriptions", &conn)?;
    let trip = create_trip(user.id, "Lisbon", &conn)?;

    println!("Creating recurring transactions...");
    let today = OffsetDateTime::now_utc().date();
    let templates = [
        NewRecurrenceTemplate {
            amount: 1450.0,
            currency: "EUR".to_owned(),
            kind: EntryKind::Expense,
            category_id: housing.id,
            trip_id: None,
            description: "Rent".to_owned(),
            pattern: RecurrencePattern::Monthly,
            start_date: today - Duration::days(100),
            end_date: None,
            max_occurrences: None,
            seed_mode: SeedMode::Backfill,
        },
        NewRecurrenceTemplate {
            amount: 3200.0,
            currency: "EUR".to_owned(),
            kind: EntryKind::Income,
            category_id: salary.id,
            trip_id: None,
            description: "Wages".to_owned(),
            pattern: RecurrencePattern::Weekly,
            start_date: today - Duration::days(30),
            end_date: None,
            max_occurrences: None,
            seed_mode: SeedMode::Lazy,
        },
        NewRecurrenceTemplate {
            amount: 12.99,
            currency: "EUR".to_owned(),
            kind: EntryKind::Expense,
            category_id: subscriptions.id,
            trip_id: None,
            description: "Music streaming".to_owned(),
            pattern: RecurrencePattern::Monthly,
            start_date: today - Duration::days(60),
            end_date: None,
            max_occurrences: Some(12),
            seed_mode: SeedMode::Backfill,
        },
        NewRecurrenceTemplate {
            amount: 18.5,
            currency: "EUR".to_owned(),
            kind: EntryKind::Expense,
            category_id: subscriptions.id,
            trip_id: Some(trip.id),
            description: "Daily transit pass".to_owned(),
            pattern: RecurrencePattern::Daily,
            start_date: today - Duration::days(5),
            end_date: Some(today + Duration::days(5)),
            max_occurrences: None,
            seed_mode: SeedMode::Backfill,
        },
    ];

    for template in templates {
        create_template(user.id, template, today, &conn)?;
    }

    println!("Success!");
    println!("Send requests with the header 'x-user-id: {}'.", user.id);

    Ok(())
}
