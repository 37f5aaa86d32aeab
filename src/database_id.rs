//! Database ID type definitions.

/// Alias for the integer type used for mapping to database IDs.
pub type DatabaseId = i64;

/// Database identifier for a ledger entry.
pub type EntryId = DatabaseId;

/// Database identifier for a recurrence template.
pub type TemplateId = DatabaseId;
