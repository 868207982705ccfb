//! Apply - converge the host to the recipe

use anyhow::{Context as AnyhowContext, Result, bail};
use chrono::Utc;
use colored::Colorize;
use converge::{Engine, Outcome, ResourceKind, RunOptions, RunReport};
use dialoguer::Confirm;
use std::time::{Duration, Instant};

use crate::cli::ApplyArgs;
use crate::history::{self, RunRecord};
use crate::{Context, commands, provider, runner, ui};

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let prepared = commands::setup(args.recipe.as_deref(), &args.bind)?;

    if !args.json {
        ui::header(&format!("Converge: {}", prepared.name));
    }

    let needs_root = prepared.resources.iter().any(|r| {
        matches!(
            r.kind(),
            ResourceKind::Package | ResourceKind::AptRepository | ResourceKind::Service
        )
    });
    if needs_root && !runner::is_root() && !args.json {
        ui::warn("Not running as root; package, repository, and service changes may fail");
    }

    let options = RunOptions {
        timeout: args.timeout.map(Duration::from_secs),
    };
    let engine = Engine::with_options(provider::host_registry(), options);

    // Preview and confirm before mutating anything
    if !args.yes && !args.json {
        let changes = engine.plan(prepared.resources.clone(), &prepared.bindings)?;
        if changes.is_empty() {
            ui::success("Nothing to do - host matches the recipe");
            return Ok(());
        }
        super::plan::display_changes(&changes);
        println!();

        let confirmed = Confirm::new()
            .with_prompt(format!("Converge {} resource(s)?", changes.len()))
            .default(true)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            bail!("Converge cancelled");
        }
        println!();
    }

    let spinner = (!args.json && !ctx.quiet).then(|| ui::spinner("Converging..."));
    let started = Instant::now();
    let report = engine.run(prepared.resources, &prepared.bindings)?;
    let duration = started.elapsed();
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        display_report(ctx, &report);
        if ctx.verbose > 0 {
            ui::dim(&format!("Completed in {:.2}s", duration.as_secs_f64()));
        }
    }

    let summary = report.summary();
    let record = RunRecord {
        recipe: prepared.name.clone(),
        finished: Utc::now(),
        duration_secs: duration.as_secs_f64(),
        summary,
        notifications: report.notifications().count(),
    };
    if let Err(err) = history::record(record) {
        log::warn!("Failed to record run history: {err:#}");
    }

    if !report.is_success() {
        bail!("{} resource(s) failed to converge", summary.failed);
    }
    Ok(())
}

fn display_report(ctx: &Context, report: &RunReport) {
    for entry in report.entries() {
        if ctx.quiet && entry.outcome == Outcome::Unchanged {
            continue;
        }

        // Notification entries carry the fired action
        let id = match entry.action {
            Some(action) => format!("{} {action}", entry.id),
            None => entry.id.to_string(),
        };
        match &entry.outcome {
            Outcome::Converged => println!("  {} {id}", "✓".green()),
            Outcome::Unchanged => println!("  {} {}", "-".dimmed(), id.dimmed()),
            Outcome::Failed { kind, error } => {
                println!("  {} {id} {}", "✗".red(), format!("({kind})").dimmed());
                println!("      {}", error.red());
            }
            Outcome::Skipped { reason } => {
                println!("  {} {id} {}", "⚠".yellow(), format!("({reason})").dimmed());
            }
        }
    }

    println!();
    let summary = report.summary();
    let line = format!(
        "{} converged, {} unchanged, {} failed, {} skipped",
        summary.converged, summary.unchanged, summary.failed, summary.skipped
    );
    if report.is_success() {
        ui::success(&line);
    } else {
        ui::error(&line);
    }
}
