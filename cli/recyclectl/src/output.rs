//! Output formatting for CLI commands.

use colored::Colorize;
use recycle_core::{InflationState, RecycleReport, RestoreOutcome, RunStatus, TaskOutcome};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

/// Print rows in the specified format.
pub fn print_output<T: Serialize + Tabled>(data: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("{}", "No items found.".dimmed());
            } else {
                println!("{}", Table::new(data));
            }
        }
        OutputFormat::Json => print_json(&data),
    }
}

/// Print a single item as pretty JSON.
pub fn print_json<T: Serialize + ?Sized>(data: &T) {
    let json = serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string());
    println!("{}", json);
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "Info:".blue().bold(), message);
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    println!("{} {}", "Warning:".yellow().bold(), message);
}

/// One original task in the report table.
#[derive(Debug, Serialize, Tabled)]
pub struct TaskRow {
    #[tabled(rename = "Task")]
    task: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Replacement", display = "display_option")]
    replacement: Option<String>,
    #[tabled(rename = "Stopped", display = "display_option")]
    stopped_at: Option<String>,
    #[tabled(rename = "Stable", display = "display_option")]
    stabilized_at: Option<String>,
    #[tabled(rename = "Error", display = "display_option")]
    error: Option<String>,
}

impl From<&TaskOutcome> for TaskRow {
    fn from(outcome: &TaskOutcome) -> Self {
        Self {
            task: outcome.task_id.to_string(),
            status: outcome.status.to_string(),
            replacement: outcome.replacement_task_id.as_ref().map(ToString::to_string),
            stopped_at: outcome.stopped_at.map(|t| t.format("%H:%M:%S").to_string()),
            stabilized_at: outcome
                .stabilized_at
                .map(|t| t.format("%H:%M:%S").to_string()),
            error: outcome.error.clone(),
        }
    }
}

fn display_option(opt: &Option<String>) -> String {
    opt.as_deref().unwrap_or("-").to_string()
}

/// Print a finished run.
pub fn print_report(report: &RecycleReport, format: OutputFormat) {
    if format == OutputFormat::Json {
        print_json(report);
        return;
    }

    println!(
        "{} {}/{} (run {})",
        "Recycle".bold(),
        report.cluster_name,
        report.service_name,
        report.run_id
    );

    let rows: Vec<TaskRow> = report.tasks.iter().map(TaskRow::from).collect();
    if !rows.is_empty() {
        println!("{}", Table::new(&rows));
    }
    for task_id in &report.not_attempted {
        println!("  {} {}", "not attempted".dimmed(), task_id);
    }

    print_info(&format!("Capacity inflation: {}", describe_inflation(&report.inflation)));
    print_info(&format!("Capacity restore: {}", describe_restore(&report.capacity)));
    if report.settled_after_restore == Some(false) {
        print_warning("Service did not settle after restoring capacity");
    }
    if let Some(fatal) = &report.fatal_error {
        print_warning(&format!("{:?} error: {}", fatal.severity, fatal.message));
    }

    let summary = format!(
        "{} stable, {} failed, {} not attempted of {} in {:.1}s",
        report.counts.stable,
        report.counts.failed,
        report.counts.not_attempted,
        report.counts.total,
        report.elapsed_seconds
    );
    match report.overall_status {
        RunStatus::Succeeded => print_success(&summary),
        _ => println!("{} {}", "Failed:".red().bold(), summary),
    }

    if report.requires_manual_intervention {
        print_manual_intervention(report);
    }
}

fn print_manual_intervention(report: &RecycleReport) {
    let desired = match &report.capacity {
        RestoreOutcome::Failed { desired, .. } => *desired,
        _ => return,
    };
    let banner = format!(
        "MANUAL INTERVENTION REQUIRED: desired count of {}/{} was not restored; set it back to {}",
        report.cluster_name, report.service_name, desired
    );
    eprintln!("\n{}\n", banner.on_red().white().bold());
}

pub fn describe_inflation(state: &InflationState) -> String {
    match state {
        InflationState::NotRequested => "not requested".to_string(),
        InflationState::Skipped { decision } => format!("skipped ({:?})", decision),
        InflationState::Inflated { from, to } => format!("{} -> {}", from, to),
        InflationState::Failed { from, to, error } => {
            format!("{} -> {} failed: {}", from, to, error)
        }
    }
}

pub fn describe_restore(outcome: &RestoreOutcome) -> String {
    match outcome {
        RestoreOutcome::NotNeeded => "not needed".to_string(),
        RestoreOutcome::Restored => "restored".to_string(),
        RestoreOutcome::Failed { desired, error } => {
            format!("FAILED to restore {}: {}", desired, error)
        }
    }
}

#[cfg(test)]
mod tests {
    use recycle_core::{InflationDecision, TaskStatus};
    use recycle_id::TaskId;

    use super::*;

    #[test]
    fn test_task_row_placeholders() {
        let mut outcome = TaskOutcome::new(TaskId::parse("t1").unwrap());
        outcome.mark_failed("not found").unwrap();

        let row = TaskRow::from(&outcome);
        assert_eq!(row.status, TaskStatus::Failed.to_string());
        assert_eq!(display_option(&row.replacement), "-");
        assert_eq!(row.error.as_deref(), Some("not found"));

        let table = Table::new([row]).to_string();
        assert!(table.contains("Replacement"));
        assert!(table.contains("not found"));
    }

    #[test]
    fn test_describe_capacity() {
        assert_eq!(
            describe_inflation(&InflationState::Inflated { from: 3, to: 4 }),
            "3 -> 4"
        );
        assert!(describe_inflation(&InflationState::Skipped {
            decision: InflationDecision::SkipAboveMax { max_capacity: 3 }
        })
        .contains("SkipAboveMax"));
        assert!(describe_restore(&RestoreOutcome::Failed {
            desired: 3,
            error: "conflict".to_string()
        })
        .starts_with("FAILED"));
    }
}
