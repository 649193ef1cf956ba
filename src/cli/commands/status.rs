//! Status command implementation.
//!
//! Lists recorded operations or shows one with its steps.

use crate::core::recorder::OutcomeRecorder;
use crate::core::status::{format_duration, OperationView, StatusQuery};
use crate::models::config::Config;
use crate::models::operation::{OperationStatus, StepStatus};
use crate::Result;
use chrono::Utc;
use colored::{ColoredString, Colorize};

/// List the most recent operations.
pub async fn list_operations(config: &Config, limit: usize, json: bool) -> Result<()> {
    let query = StatusQuery::new(OutcomeRecorder::new(&config.state_dir));
    let views = query.list(limit)?;

    if json {
        let summaries: Vec<_> = views.iter().map(OperationView::summary).collect();
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    println!("{}", "[Operations]".bold().cyan());
    println!();

    if let Some(live) = query.in_flight()? {
        let step = live
            .operation
            .running_step()
            .map(|s| s.name.as_str())
            .unwrap_or("-");
        println!(
            "{} {} ({}, {})",
            "[IN PROGRESS]".bold().yellow(),
            live.operation.id,
            live.operation.status,
            step
        );
        println!();
    }

    if views.is_empty() {
        println!("No operations found.");
        return Ok(());
    }

    println!(
        "{:<40} {:<18} {:<16} {:<10} {}",
        "Operation ID".bold(),
        "Mode".bold(),
        "Status".bold(),
        "Duration".bold(),
        "Steps OK".bold()
    );
    println!("{}", "-".repeat(100));

    let now = Utc::now();
    for view in &views {
        let op = &view.operation;
        println!(
            "{:<40} {:<18} {:<16} {:<10} {:.0}%",
            op.id,
            op.mode.as_str(),
            paint_status(op.status),
            format_duration(view.elapsed(now)),
            view.success_ratio * 100.0
        );
    }

    println!();
    println!("State directory: {}", config.state_dir.display());
    Ok(())
}

/// Show one operation.
pub async fn show_operation(config: &Config, operation_id: &str, json: bool) -> Result<()> {
    let query = StatusQuery::new(OutcomeRecorder::new(&config.state_dir));
    let view = query.get(operation_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view.operation)?);
        return Ok(());
    }

    print_operation(&view);
    Ok(())
}

/// Print an operation with its steps.
pub fn print_operation(view: &OperationView) {
    let op = &view.operation;

    println!("{} {}", "[Operation]".bold().cyan(), op.id);
    println!("  {} {}", "Backup:".bold(), op.backup_reference);
    println!("  {} {}", "Mode:".bold(), op.mode);
    println!("  {} {}", "Status:".bold(), paint_status(op.status));
    println!("  {} {}", "Started:".bold(), op.started_at.to_rfc3339());
    if let Some(ended) = op.ended_at {
        println!("  {} {}", "Ended:".bold(), ended.to_rfc3339());
    }
    println!(
        "  {} {}",
        "Duration:".bold(),
        format_duration(view.elapsed(Utc::now()))
    );
    println!(
        "  {} {}/{} completed",
        "Steps:".bold(),
        view.completed_steps,
        op.steps.len()
    );
    if let Some(snapshot) = &op.snapshot {
        println!("  {} {}", "Snapshot:".bold(), snapshot.location.display());
    }
    println!();

    for (i, step) in op.steps.iter().enumerate() {
        let status = match step.status {
            StepStatus::Running => step.status.to_string().yellow(),
            StepStatus::Completed => step.status.to_string().green(),
            StepStatus::Failed => step.status.to_string().red(),
        };
        println!("  {}. {:<20} {}", i + 1, step.name.as_str(), status);
        for line in step.details.lines().filter(|l| !l.trim().is_empty()) {
            println!("       {}", line.dimmed());
        }
    }

    if op.rollback_failed() {
        println!();
        println!(
            "{}",
            "[CRITICAL] Rollback failed. The stack is in an unknown state; manual intervention required."
                .bold()
                .red()
        );
    }
}

fn paint_status(status: OperationStatus) -> ColoredString {
    match status {
        OperationStatus::Completed => status.as_str().green(),
        OperationStatus::RolledBack => status.as_str().yellow(),
        OperationStatus::Failed => status.as_str().red(),
        _ => status.as_str().cyan(),
    }
}
