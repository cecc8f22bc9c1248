//! Requirement set arithmetic: propagation from children and validation.
//!
//! A requirement set is keyed by `(type, value)` for propagation and by
//! `(name, type)` for validation. Propagation always visits the parent's own
//! requirements first, then each enabled child in execution order; the first
//! occurrence of a key wins and later ones are dropped without merging. The
//! result is sorted by `(name, type, value)`, which is also the order rows
//! come back from storage.

use std::collections::HashSet;

use crate::error::{ActionError, Result};
use crate::model::{Action, Requirement};
use crate::types::{HOSTNAME_REQUIREMENT, MODEL_REQUIREMENT};

/// Adds every requirement of `extra` whose `(type, value)` is not already in
/// `target`.
pub fn union_into(target: &mut Vec<Requirement>, extra: &[Requirement]) {
    let mut keys: HashSet<(String, String)> = target
        .iter()
        .map(|r| (r.kind.clone(), r.value.clone()))
        .collect();
    for r in extra {
        if keys.insert((r.kind.clone(), r.value.clone())) {
            target.push(r.clone());
        }
    }
}

pub fn sort(requirements: &mut [Requirement]) {
    requirements.sort_by(|a, b| {
        (&a.name, &a.kind, &a.value).cmp(&(&b.name, &b.kind, &b.value))
    });
}

/// Derives the effective requirement set of `action` from its declared
/// requirements and its bound children.
///
/// A disabled action requires nothing. An enabled one inherits the
/// requirements of every child whose binding is enabled.
pub fn propagate(action: &mut Action) {
    if !action.enabled {
        action.requirements.clear();
        return;
    }
    let mut merged = std::mem::take(&mut action.requirements);
    for child in action.children.iter().filter(|c| c.binding.enabled) {
        union_into(&mut merged, &child.action.requirements);
    }
    sort(&mut merged);
    action.requirements = merged;
}

/// Rejects duplicate `(name, type)` pairs and more than one model or
/// hostname requirement.
pub fn validate(requirements: &[Requirement]) -> Result<()> {
    let mut seen = HashSet::new();
    let mut models = 0;
    let mut hostnames = 0;
    for r in requirements {
        if !seen.insert((r.name.as_str(), r.kind.as_str())) {
            return Err(ActionError::DuplicateRequirement {
                name: r.name.clone(),
                kind: r.kind.clone(),
            });
        }
        match r.kind.as_str() {
            MODEL_REQUIREMENT => models += 1,
            HOSTNAME_REQUIREMENT => hostnames += 1,
            _ => {}
        }
    }
    if models > 1 {
        return Err(ActionError::DuplicateModelRequirement);
    }
    if hostnames > 1 {
        return Err(ActionError::DuplicateHostnameRequirement);
    }
    Ok(())
}

/// Rejects a requirement row with an empty name, type or value.
pub fn check_row(r: &Requirement) -> Result<()> {
    if r.name.is_empty() || r.kind.is_empty() || r.value.is_empty() {
        return Err(ActionError::InvalidRequirement(format!(
            "name, type and value are required (name='{}', type='{}', value='{}')",
            r.name, r.kind, r.value
        )));
    }
    Ok(())
}
