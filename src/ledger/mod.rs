//! The ledger of income and expense entries.
//!
//! This module contains:
//! - The `LedgerEntry` model and the append-only ledger queries
//! - The endpoint for reading a user's ledger, which also catches up their recurring
//!   transactions

mod entry;
mod list;

pub use entry::{
    EntryKind, LedgerEntry, NewLedgerEntry, append_entry, create_entry_table, get_entries_for_user,
};
pub use list::get_entries_endpoint;

#[cfg(test)]
pub use entry::{count_entries, get_entries_for_template};
