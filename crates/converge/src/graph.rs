//! Dependency graph: reference validation, cycle detection, execution order.
//!
//! Declaration sequence is the baseline order; explicit `requires` edges
//! constrain it. Kahn's algorithm with a smallest-declaration-index-first
//! ready set makes the traversal fully deterministic: among resources whose
//! dependencies are all satisfied, the one declared earliest converges
//! first. Notification edges are validated here but deliberately add no
//! ordering constraint; they fire after the apply pass.

use crate::error::{Error, Result};
use crate::resource::{Catalog, ResourceId};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Validated execution order over a catalog's declarations.
#[derive(Debug)]
pub struct Graph {
    /// Catalog indices in execution order
    order: Vec<usize>,
    /// Explicit dependency indices per resource
    deps: Vec<Vec<usize>>,
}

impl Graph {
    /// Build and validate the graph for a catalog.
    ///
    /// Pre-flight checks: every `requires` and `notifies` target is
    /// declared, no resource notifies itself, no dependency cycles.
    pub fn build(catalog: &Catalog) -> Result<Self> {
        let mut deps: Vec<Vec<usize>> = vec![Vec::new(); catalog.len()];

        for (i, resource) in catalog.resources().iter().enumerate() {
            for target in resource.requires() {
                let Some(j) = catalog.index_of(target) else {
                    return Err(Error::invalid_resource(
                        resource.id(),
                        format!("depends on undeclared resource {target}"),
                    ));
                };
                deps[i].push(j);
            }
            for notify in resource.notifies() {
                if notify.target == *resource.id() {
                    return Err(Error::invalid_resource(
                        resource.id(),
                        "resource notifies itself",
                    ));
                }
                if catalog.index_of(&notify.target).is_none() {
                    return Err(Error::invalid_resource(
                        resource.id(),
                        format!("notifies undeclared resource {}", notify.target),
                    ));
                }
            }
        }

        let order = topo_order(&deps, catalog)?;
        Ok(Self { order, deps })
    }

    /// Catalog indices in the order resources converge.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Explicit dependencies of the resource at catalog index `i`.
    pub fn deps_of(&self, i: usize) -> &[usize] {
        &self.deps[i]
    }
}

/// Kahn's algorithm; the ready set is a min-heap of declaration indices.
fn topo_order(deps: &[Vec<usize>], catalog: &Catalog) -> Result<Vec<usize>> {
    let n = deps.len();
    let mut indegree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, targets) in deps.iter().enumerate() {
        indegree[i] = targets.len();
        for &j in targets {
            dependents[j].push(i);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&i| indegree[i] == 0)
        .map(Reverse)
        .collect();
    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &j in &dependents[i] {
            indegree[j] -= 1;
            if indegree[j] == 0 {
                ready.push(Reverse(j));
            }
        }
    }

    if order.len() < n {
        return Err(Error::CycleDetected {
            ids: extract_cycle(deps, &order, catalog),
        });
    }
    Ok(order)
}

/// Walk `requires` edges among the unresolved remainder until a resource
/// repeats; the slice between the repeats is one concrete cycle.
fn extract_cycle(deps: &[Vec<usize>], resolved: &[usize], catalog: &Catalog) -> Vec<ResourceId> {
    let n = deps.len();
    let mut remaining = vec![true; n];
    for &i in resolved {
        remaining[i] = false;
    }

    let id_of = |i: usize| catalog.resources()[i].id().clone();
    let start = (0..n).find(|&i| remaining[i]).unwrap_or(0);

    let mut path: Vec<usize> = Vec::new();
    let mut visited_at = vec![usize::MAX; n];
    let mut current = start;
    loop {
        if visited_at[current] != usize::MAX {
            return path[visited_at[current]..].iter().copied().map(id_of).collect();
        }
        visited_at[current] = path.len();
        path.push(current);
        match deps[current].iter().find(|&&j| remaining[j]) {
            Some(&next) => current = next,
            // Unreachable: an unresolved resource keeps >= 1 unresolved edge
            None => return path.into_iter().map(id_of).collect(),
        }
    }
}
