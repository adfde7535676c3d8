//! Step identifier assignment, dependency resolution, and cycle detection.

use std::collections::HashMap;

use mdflow_types::config::ConversionOptions;
use mdflow_types::document::Step;
use mdflow_types::error::{ConversionError, ConversionPhase};
use mdflow_types::graph::ConversionWarning;

use crate::ident::{self, ReferenceIndex};

/// Resolved dependencies for every step, by final identifier.
#[derive(Debug, Default)]
pub(crate) struct Resolution {
    /// `depends_on[i]` lists the identifiers step `i` depends on, deduplicated.
    pub depends_on: Vec<Vec<String>>,
    pub warnings: Vec<ConversionWarning>,
}

/// Assign the final identifier of every step.
///
/// Explicit ids win; otherwise an id is generated from the title when
/// enabled. Any collision is a hard error.
pub(crate) fn assign_ids(
    steps: &[Step],
    options: &ConversionOptions,
) -> Result<Vec<String>, ConversionError> {
    let mut ids = Vec::with_capacity(steps.len());
    let mut seen: HashMap<String, usize> = HashMap::with_capacity(steps.len());
    for step in steps {
        let id = match &step.id {
            Some(id) => id.clone(),
            None if options.auto_generate_ids => {
                ident::generated_id(&options.id_prefix, &step.name, step.position)
            }
            None => {
                return Err(ConversionError::MissingIdentifier {
                    position: step.position,
                    name: step.name.clone(),
                });
            }
        };
        if let Some(first) = seen.insert(id.clone(), step.position) {
            return Err(ConversionError::DuplicateIdentifier {
                id,
                first,
                second: step.position,
            });
        }
        ids.push(id);
    }
    Ok(ids)
}

/// Turn textual references into identifier edges. Dangling references are
/// dropped with a warning.
pub(crate) fn resolve(steps: &[Step], ids: &[String], prefix: &str) -> Resolution {
    let mut index = ReferenceIndex::new(prefix);
    for (i, step) in steps.iter().enumerate() {
        index.insert(i, &ids[i], &step.name, step.position);
    }

    let mut resolution = Resolution::default();
    for (i, step) in steps.iter().enumerate() {
        let mut deps: Vec<String> = Vec::with_capacity(step.depends_on.len());
        for reference in &step.depends_on {
            match index.resolve(reference) {
                Some(target) => {
                    let target = &ids[target];
                    if !deps.contains(target) {
                        deps.push(target.clone());
                    }
                }
                None => {
                    tracing::warn!(
                        step_id = %ids[i],
                        reference = %reference,
                        "dropping unresolved dependency"
                    );
                    resolution.warnings.push(
                        ConversionWarning::new(
                            ConversionPhase::DependencyResolution,
                            format!(
                                "dependency '{reference}' of step '{}' matches no step; edge dropped",
                                ids[i]
                            ),
                        )
                        .for_step(&ids[i]),
                    );
                }
            }
        }
        resolution.depends_on.push(deps);
    }
    resolution
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Active,
    Done,
}

/// Depth-first cycle search with an explicit frame stack.
///
/// Fails with the full cycle path, starting and ending at the same step.
pub(crate) fn detect_cycle(ids: &[String], depends_on: &[Vec<String>]) -> Result<(), ConversionError> {
    let position: HashMap<&str, usize> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let adjacency: Vec<Vec<usize>> = depends_on
        .iter()
        .map(|deps| {
            deps.iter()
                .filter_map(|d| position.get(d.as_str()).copied())
                .collect()
        })
        .collect();

    let mut marks = vec![Mark::Unvisited; ids.len()];
    for root in 0..ids.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }
        // (node, index of the next edge to follow)
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        marks[root] = Mark::Active;

        while let Some(frame) = stack.last_mut() {
            let (node, next) = *frame;
            let Some(&child) = adjacency[node].get(next) else {
                marks[node] = Mark::Done;
                stack.pop();
                continue;
            };
            frame.1 += 1;
            match marks[child] {
                Mark::Unvisited => {
                    marks[child] = Mark::Active;
                    stack.push((child, 0));
                }
                Mark::Active => {
                    let start = stack.iter().position(|&(n, _)| n == child).unwrap_or(0);
                    let mut path: Vec<String> =
                        stack[start..].iter().map(|&(n, _)| ids[n].clone()).collect();
                    path.push(ids[child].clone());
                    return Err(ConversionError::Cycle { path });
                }
                Mark::Done => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdflow_types::document::DependencyRef;

    fn step(name: &str, position: usize, deps: Vec<DependencyRef>) -> Step {
        let mut step = Step::named(name, position);
        step.depends_on = deps;
        step
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_assign_ids_explicit_and_generated() {
        let mut explicit = step("Build", 1, vec![]);
        explicit.id = Some("compile".into());
        let steps = vec![explicit, step("Run Tests", 2, vec![])];
        let options = ConversionOptions {
            id_prefix: "ci-".into(),
            ..ConversionOptions::default()
        };
        assert_eq!(assign_ids(&steps, &options).unwrap(), ids(&["compile", "ci-run-tests"]));
    }

    #[test]
    fn test_assign_ids_collision_after_generation() {
        let mut explicit = step("Other", 1, vec![]);
        explicit.id = Some("build".into());
        let steps = vec![explicit, step("Build", 2, vec![])];
        let err = assign_ids(&steps, &ConversionOptions::default()).unwrap_err();
        assert_eq!(
            err,
            ConversionError::DuplicateIdentifier {
                id: "build".into(),
                first: 1,
                second: 2
            }
        );
    }

    #[test]
    fn test_assign_ids_generation_disabled() {
        let options = ConversionOptions {
            auto_generate_ids: false,
            ..ConversionOptions::default()
        };
        let err = assign_ids(&[step("Build", 1, vec![])], &options).unwrap_err();
        assert!(matches!(err, ConversionError::MissingIdentifier { position: 1, .. }));
    }

    #[test]
    fn test_resolve_drops_dangling_reference() {
        let steps = vec![
            step("Build", 1, vec![]),
            step(
                "Deploy",
                2,
                vec![
                    DependencyRef::Id("Build".into()),
                    DependencyRef::Ordinal(1),
                    DependencyRef::Id("Lint".into()),
                ],
            ),
        ];
        let resolution = resolve(&steps, &ids(&["build", "deploy"]), "");
        assert_eq!(resolution.depends_on, vec![vec![], vec!["build".to_string()]]);
        assert_eq!(resolution.warnings.len(), 1);
        assert_eq!(resolution.warnings[0].step.as_deref(), Some("deploy"));
        assert!(resolution.warnings[0].message.contains("Lint"));
    }

    #[test]
    fn test_detect_two_step_cycle() {
        let err = detect_cycle(
            &ids(&["build", "deploy"]),
            &[vec!["deploy".into()], vec!["build".into()]],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConversionError::Cycle {
                path: ids(&["build", "deploy", "build"])
            }
        );
    }

    #[test]
    fn test_detect_self_cycle() {
        let err = detect_cycle(&ids(&["a"]), &[vec!["a".into()]]).unwrap_err();
        assert_eq!(err, ConversionError::Cycle { path: ids(&["a", "a"]) });
    }

    #[test]
    fn test_cycle_path_excludes_entry_prefix() {
        // a -> b -> c -> b
        let err = detect_cycle(
            &ids(&["a", "b", "c"]),
            &[vec!["b".into()], vec!["c".into()], vec!["b".into()]],
        )
        .unwrap_err();
        assert_eq!(err, ConversionError::Cycle { path: ids(&["b", "c", "b"]) });
    }

    #[test]
    fn test_diamond_is_acyclic() {
        let deps = vec![
            vec![],
            vec!["a".to_string()],
            vec!["a".to_string()],
            vec!["b".to_string(), "c".to_string()],
        ];
        assert!(detect_cycle(&ids(&["a", "b", "c", "d"]), &deps).is_ok());
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        let n = 50_000;
        let names: Vec<String> = (0..n).map(|i| format!("s{i}")).collect();
        let deps: Vec<Vec<String>> = (0..n)
            .map(|i| if i + 1 < n { vec![format!("s{}", i + 1)] } else { vec![] })
            .collect();
        assert!(detect_cycle(&names, &deps).is_ok());
    }
}
