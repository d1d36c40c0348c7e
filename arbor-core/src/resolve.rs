//! Dependency-ordered load planning

use std::collections::{HashMap, HashSet};

use arbor_extension_api::ExtensionManifest;

/// Outcome of dependency resolution.
///
/// `order` always contains every candidate exactly once. Problem edges
/// are recorded rather than fatal: the caller warns and carries on.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Resolution {
    /// Candidate names in load order
    pub order: Vec<String>,
    /// `(extension, dependency)` edges pointing at names outside the
    /// candidate set
    pub missing: Vec<(String, String)>,
    /// `(extension, dependency)` edges that would close a cycle
    pub cycles: Vec<(String, String)>,
}

/// Compute a load order over candidate manifests.
///
/// Candidates are stably pre-sorted by priority (higher first), then
/// visited depth-first so every dependency lands before its dependents
/// regardless of input order. A cycle-closing edge is recorded and
/// skipped, as is an edge to an unknown name; resolution terminates
/// with each candidate in the order exactly once. Peer dependencies
/// are ignored here.
pub fn resolve_load_order(candidates: &[&ExtensionManifest]) -> Resolution {
    let mut sorted: Vec<&ExtensionManifest> = candidates.to_vec();
    sorted.sort_by_key(|m| std::cmp::Reverse(m.priority));

    let by_name: HashMap<&str, &ExtensionManifest> =
        sorted.iter().map(|m| (m.name.as_str(), *m)).collect();

    let mut resolution = Resolution::default();
    let mut visited = HashSet::new();
    let mut in_progress = HashSet::new();

    for manifest in &sorted {
        visit(
            manifest,
            &by_name,
            &mut visited,
            &mut in_progress,
            &mut resolution,
        );
    }

    resolution
}

fn visit(
    manifest: &ExtensionManifest,
    by_name: &HashMap<&str, &ExtensionManifest>,
    visited: &mut HashSet<String>,
    in_progress: &mut HashSet<String>,
    resolution: &mut Resolution,
) {
    if visited.contains(&manifest.name) {
        return;
    }
    in_progress.insert(manifest.name.clone());

    for dep in &manifest.dependencies {
        if in_progress.contains(dep) {
            resolution.cycles.push((manifest.name.clone(), dep.clone()));
            continue;
        }
        match by_name.get(dep.as_str()) {
            Some(dep_manifest) => visit(dep_manifest, by_name, visited, in_progress, resolution),
            None => resolution.missing.push((manifest.name.clone(), dep.clone())),
        }
    }

    in_progress.remove(&manifest.name);
    visited.insert(manifest.name.clone());
    resolution.order.push(manifest.name.clone());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(name: &str, deps: &[&str]) -> ExtensionManifest {
        ExtensionManifest {
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            ..ExtensionManifest::new(name, "1.0.0")
        }
    }

    fn with_priority(name: &str, deps: &[&str], priority: i64) -> ExtensionManifest {
        ExtensionManifest {
            priority,
            ..manifest(name, deps)
        }
    }

    fn position(resolution: &Resolution, name: &str) -> usize {
        resolution
            .order
            .iter()
            .position(|n| n == name)
            .unwrap_or_else(|| panic!("{name} missing from order"))
    }

    #[test]
    fn test_dependency_precedes_dependent() {
        let base = manifest("base", &[]);
        let feature = manifest("feature", &["base"]);

        let resolution = resolve_load_order(&[&base, &feature]);
        assert!(position(&resolution, "base") < position(&resolution, "feature"));
        assert!(resolution.cycles.is_empty());
        assert!(resolution.missing.is_empty());
    }

    #[test]
    fn test_reversed_input_still_orders_dependencies_first() {
        let base = manifest("base", &[]);
        let feature = manifest("feature", &["base"]);

        let resolution = resolve_load_order(&[&feature, &base]);
        assert_eq!(resolution.order, vec!["base", "feature"]);
    }

    #[test]
    fn test_chain_orders_transitively() {
        let a = manifest("a", &[]);
        let b = manifest("b", &["a"]);
        let c = manifest("c", &["b"]);

        let resolution = resolve_load_order(&[&c, &a, &b]);
        assert_eq!(resolution.order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cycle_terminates_with_each_name_once() {
        let a = manifest("a", &["b"]);
        let b = manifest("b", &["a"]);

        let resolution = resolve_load_order(&[&a, &b]);
        assert_eq!(resolution.order.len(), 2);
        assert_eq!(resolution.cycles.len(), 1);

        let mut sorted = resolution.order.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 2);
    }

    #[test]
    fn test_self_dependency_recorded_and_skipped() {
        let narcissist = manifest("loop", &["loop"]);

        let resolution = resolve_load_order(&[&narcissist]);
        assert_eq!(resolution.order, vec!["loop"]);
        assert_eq!(resolution.cycles, vec![("loop".to_string(), "loop".to_string())]);
    }

    #[test]
    fn test_unknown_dependency_recorded_dependent_still_ordered() {
        let orphan = manifest("orphan", &["ghost"]);

        let resolution = resolve_load_order(&[&orphan]);
        assert_eq!(resolution.order, vec!["orphan"]);
        assert_eq!(
            resolution.missing,
            vec![("orphan".to_string(), "ghost".to_string())]
        );
    }

    #[test]
    fn test_priority_orders_unconstrained_extensions() {
        let low = with_priority("low", &[], 1);
        let high = with_priority("high", &[], 50);
        let mid = with_priority("mid", &[], 10);

        let resolution = resolve_load_order(&[&low, &mid, &high]);
        assert_eq!(resolution.order, vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_priority_ties_keep_input_order() {
        let first = with_priority("first", &[], 10);
        let second = with_priority("second", &[], 10);

        let resolution = resolve_load_order(&[&first, &second]);
        assert_eq!(resolution.order, vec!["first", "second"]);
    }

    #[test]
    fn test_dependencies_outrank_priority() {
        // "flashy" claims high priority but depends on a low-priority base
        let base = with_priority("base", &[], 1);
        let flashy = with_priority("flashy", &["base"], 100);

        let resolution = resolve_load_order(&[&base, &flashy]);
        assert_eq!(resolution.order, vec!["base", "flashy"]);
    }

    #[test]
    fn test_diamond_dependency_each_once() {
        let base = manifest("base", &[]);
        let left = manifest("left", &["base"]);
        let right = manifest("right", &["base"]);
        let top = manifest("top", &["left", "right"]);

        let resolution = resolve_load_order(&[&top, &left, &right, &base]);
        assert_eq!(resolution.order.len(), 4);
        assert_eq!(position(&resolution, "base"), 0);
        assert!(position(&resolution, "top") == 3);
    }
}
