//! Command implementations

pub mod apply;
pub mod history;
pub mod plan;
pub mod validate;

use anyhow::Result;
use converge::{Bindings, Resource};
use std::path::{Path, PathBuf};

use crate::recipe::{self, Recipe};

/// A recipe located, parsed, and resolved against CLI binds.
pub struct Prepared {
    pub path: PathBuf,
    pub name: String,
    pub resources: Vec<Resource>,
    pub bindings: Bindings,
}

pub fn setup(recipe_arg: Option<&Path>, binds: &[String]) -> Result<Prepared> {
    let path = recipe::resolve_path(recipe_arg)?;
    let loaded = Recipe::load(&path)?;
    let overrides = recipe::parse_binds(binds)?;
    let bindings = loaded.merged_bindings(&overrides);
    let resources = loaded.to_resources(&bindings)?;
    Ok(Prepared {
        name: loaded.display_name(&path),
        path,
        resources,
        bindings,
    })
}
