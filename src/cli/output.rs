//! Table rendering for CLI reads (§4.1): `comfy-table` listings for runs,
//! tasks, providers, and models.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};

use crate::domain::models::run::{Run, RunStatus};
use crate::domain::models::task::{Task, TaskStatus};
use crate::domain::models::{Model, Provider};

fn base_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL).set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn run_status_color(status: RunStatus) -> Color {
    match status {
        RunStatus::Queued => Color::Grey,
        RunStatus::Running => Color::Yellow,
        RunStatus::Completed => Color::Green,
        RunStatus::Failed | RunStatus::DownloadFailed => Color::Red,
    }
}

fn task_status_color(status: TaskStatus) -> Color {
    match status {
        TaskStatus::Queued => Color::Grey,
        TaskStatus::Running => Color::Yellow,
        TaskStatus::Completed => Color::Green,
        TaskStatus::Failed | TaskStatus::DownloadFailed => Color::Red,
    }
}

/// Render a single Run as a key/value table.
#[must_use]
pub fn format_run(run: &Run) -> String {
    let mut table = base_table();
    table.set_header(vec![Cell::new("field").add_attribute(Attribute::Bold), Cell::new("value").add_attribute(Attribute::Bold)]);
    table.add_row(vec![Cell::new("id"), Cell::new(&run.id)]);
    table.add_row(vec![Cell::new("storyboard_id"), Cell::new(&run.storyboard_id)]);
    table.add_row(vec![Cell::new("status"), Cell::new(run.status.as_str()).fg(run_status_color(run.status))]);
    table.add_row(vec![Cell::new("total_tasks"), Cell::new(run.total_tasks)]);
    table.add_row(vec![Cell::new("completed"), Cell::new(run.completed)]);
    table.add_row(vec![Cell::new("failed"), Cell::new(run.failed)]);
    table.add_row(vec![Cell::new("download_failed"), Cell::new(run.download_failed)]);
    table.add_row(vec![Cell::new("provider"), Cell::new(run.provider_id.as_deref().unwrap_or("-"))]);
    table.to_string()
}

/// Render a list of Tasks.
#[must_use]
pub fn format_tasks(tasks: &[Task]) -> String {
    let mut table = base_table();
    table.set_header(vec![
        Cell::new("id").add_attribute(Attribute::Bold),
        Cell::new("segment").add_attribute(Attribute::Bold),
        Cell::new("version").add_attribute(Attribute::Bold),
        Cell::new("status").add_attribute(Attribute::Bold),
        Cell::new("provider").add_attribute(Attribute::Bold),
        Cell::new("error").add_attribute(Attribute::Bold),
    ]);
    for task in tasks {
        table.add_row(vec![
            Cell::new(short_id(&task.id)),
            Cell::new(task.segment_index),
            Cell::new(task.version_index),
            Cell::new(task.status.as_str()).fg(task_status_color(task.status)),
            Cell::new(task.provider_id.as_deref().unwrap_or("-")),
            Cell::new(task.error_code.as_deref().unwrap_or("-")),
        ]);
    }
    table.to_string()
}

/// Render the Provider catalog.
#[must_use]
pub fn format_providers(providers: &[Provider]) -> String {
    let mut table = base_table();
    table.set_header(vec![
        Cell::new("id").add_attribute(Attribute::Bold),
        Cell::new("enabled").add_attribute(Attribute::Bold),
        Cell::new("priority").add_attribute(Attribute::Bold),
        Cell::new("weight").add_attribute(Attribute::Bold),
    ]);
    for provider in providers {
        let enabled_cell = if provider.enabled { Cell::new("yes").fg(Color::Green) } else { Cell::new("no").fg(Color::Red) };
        table.add_row(vec![Cell::new(&provider.id), enabled_cell, Cell::new(provider.priority), Cell::new(provider.weight)]);
    }
    table.to_string()
}

/// Render the Model catalog.
#[must_use]
pub fn format_models(models: &[Model]) -> String {
    let mut table = base_table();
    table.set_header(vec![Cell::new("id").add_attribute(Attribute::Bold), Cell::new("enabled").add_attribute(Attribute::Bold), Cell::new("providers").add_attribute(Attribute::Bold)]);
    for model in models {
        let providers = model.provider_map.iter().map(|(id, _)| id.clone()).collect::<Vec<_>>().join(", ");
        let enabled_cell = if model.enabled { Cell::new("yes").fg(Color::Green) } else { Cell::new("no").fg(Color::Red) };
        table.add_row(vec![Cell::new(&model.id), enabled_cell, Cell::new(providers)]);
    }
    table.to_string()
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
