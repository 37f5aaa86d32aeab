//! Recurring transactions.
//!
//! This module contains:
//! - Recurrence templates, their patterns and the schedule advancer
//! - The materialization engine that turns due occurrences into ledger entries
//! - The per-template locks that keep concurrent triggers from duplicating entries
//! - The scheduled, lazy and manual triggers
//! - The JSON endpoints for managing templates and triggering runs

mod create;
mod db;
mod delete;
mod edit;
mod engine;
mod guard;
mod list;
mod pattern;
mod process;
mod template;
mod triggers;

pub use create::create_template_endpoint;
pub use db::{create_template, create_template_table, get_template, get_templates_for_user};
pub use delete::delete_template_endpoint;
pub use edit::update_template_endpoint;
pub use engine::{MaterializeScope, materialize, materialize_due, materialize_template};
pub use guard::TemplateLocks;
pub use list::{get_template_endpoint, get_templates_endpoint};
pub use pattern::{RecurrencePattern, next_occurrence};
pub use process::{ProcessResponse, process_due_endpoint, process_template_endpoint};
pub use template::{
    NewRecurrenceTemplate, RecurrenceTemplate, SeedMode, TemplateStatus, TemplateUpdate,
};
pub use triggers::{
    MaterializationState, duration_until_next_run, run_lazy_check, run_manual,
    run_scheduled_batch, spawn_daily_materialization,
};
