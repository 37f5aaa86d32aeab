use std::{error::Error, process::exit, sync::Mutex};

use clap::Parser;
use time::{Date, macros::format_description};
use tracing_subscriber::EnvFilter;

use ledgerline::{
    Clock, FixedClock, LocalClock, MaterializeScope, TemplateLocks, UserId, materialize_due,
    open_connection,
};

/// Process due recurring transactions outside of the server, e.g. from cron or to backfill.
///
/// Safe to run while the server is running: the database's write lock keeps the two from
/// creating the same entries.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long)]
    db_path: String,

    /// Process occurrences up to and including this date (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    as_of: Option<String>,

    /// The canonical timezone that decides what "today" is.
    #[arg(long, default_value = "Etc/UTC")]
    timezone: String,

    /// Only process the recurring transactions of this user.
    #[arg(long, conflicts_with = "template")]
    user: Option<i64>,

    /// Only process this recurring transaction. Errors are reported instead of skipped.
    #[arg(long)]
    template: Option<i64>,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let clock: Box<dyn Clock> = match &args.as_of {
        Some(as_of) => match Date::parse(as_of, format_description!("[year]-[month]-[day]")) {
            Ok(date) => Box::new(FixedClock(date)),
            Err(error) => {
                eprintln!("Invalid --as-of date {as_of:?}: {error}");
                exit(1);
            }
        },
        None => Box::new(LocalClock::new(&args.timezone)?),
    };
    let as_of = clock.today()?;

    let scope = match (args.user, args.template) {
        (_, Some(template_id)) => MaterializeScope::Template(template_id),
        (Some(user_id), None) => MaterializeScope::User(UserId::new(user_id)),
        (None, None) => MaterializeScope::Global,
    };

    let connection = open_connection(&args.db_path)?;
    connection.pragma_update(None, "foreign_keys", true)?;
    let db_connection = Mutex::new(connection);

    let created = materialize_due(scope, as_of, &db_connection, &TemplateLocks::new())?;

    println!("Created {created} entries as of {as_of}");

    Ok(())
}
