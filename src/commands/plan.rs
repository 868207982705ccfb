//! Plan - preview what apply would change

use anyhow::Result;
use colored::Colorize;
use converge::{Bindings, Engine, PlannedChange, Resource, ResourceKind, State};
use std::fs;

use crate::cli::PlanArgs;
use crate::render::{Render, VarRenderer};
use crate::{Context, commands, paths, provider, ui};

pub fn run(ctx: &Context, args: &PlanArgs) -> Result<()> {
    let prepared = commands::setup(args.recipe.as_deref(), &args.bind)?;

    ui::header(&format!("Plan: {}", prepared.name));

    let engine = Engine::new(provider::host_registry());
    let changes = engine.plan(prepared.resources.clone(), &prepared.bindings)?;

    if changes.is_empty() {
        ui::success("Nothing to do - host matches the recipe");
        return Ok(());
    }

    display_changes(&changes);
    if !ctx.quiet {
        show_template_diffs(&prepared.resources, &prepared.bindings, &changes);
    }

    println!();
    ui::info(&format!("{} resource(s) would change", changes.len()));
    Ok(())
}

/// Changes in execution order, one block per resource.
pub(crate) fn display_changes(changes: &[PlannedChange]) {
    ui::section("Changes");
    for change in changes {
        let symbol = match (&change.current, &change.desired) {
            (State::Absent, _) => "+".green(),
            (_, State::Absent) => "-".red(),
            _ => "~".yellow(),
        };
        println!("  {} {}", symbol, change.id.to_string().bold());
        println!("      {} {}", "current:".dimmed(), change.current);
        println!("      {} {}", "desired:".dimmed(), change.desired);
    }
}

/// Line diff of rendered template content against what is on disk.
fn show_template_diffs(resources: &[Resource], bindings: &Bindings, changes: &[PlannedChange]) {
    for planned in changes.iter().filter(|c| c.id.kind == ResourceKind::TemplateFile) {
        let Some(resource) = resources.iter().find(|r| *r.id() == planned.id) else {
            continue;
        };
        let Some(source) = resource.attr_str("source") else {
            continue;
        };

        let rendered = match VarRenderer.render(&paths::expand(source), bindings) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::debug!("No diff for {}: {err:#}", planned.id);
                continue;
            }
        };
        let desired = String::from_utf8_lossy(&rendered).to_string();
        let current = fs::read_to_string(provider::path_attr(resource, "path")).unwrap_or_default();

        println!();
        println!("  {} {}", "diff".bold(), planned.id);
        let diff = similar::TextDiff::from_lines(&current, &desired);
        for change in diff.iter_all_changes() {
            match change.tag() {
                similar::ChangeTag::Delete => print!("    {}", format!("- {change}").red()),
                similar::ChangeTag::Insert => print!("    {}", format!("+ {change}").green()),
                similar::ChangeTag::Equal => {}
            }
        }
    }
}
