//! Validate - check a recipe without touching the host

use anyhow::Result;
use converge::Engine;

use crate::cli::ValidateArgs;
use crate::{commands, provider, ui};

pub fn run(args: &ValidateArgs) -> Result<()> {
    let prepared = commands::setup(args.recipe.as_deref(), &[])?;
    let count = prepared.resources.len();

    let engine = Engine::new(provider::host_registry());
    engine.validate(prepared.resources)?;

    ui::success(&format!(
        "{}: {count} resource(s) valid",
        prepared.path.display()
    ));
    Ok(())
}
