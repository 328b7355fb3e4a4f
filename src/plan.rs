//! DAG Planner (§4.1): validates the dependency graph and partitions stages
//! into topological waves via Kahn's algorithm.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::config::PipelineConfig;
use crate::error::ConfigError;

/// A validation warning: non-fatal, surfaced to the caller but does not
/// block execution (§4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    UnreachableStage(String),
    WideWave { wave_index: usize, width: usize },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::UnreachableStage(name) => {
                write!(f, "stage `{name}` has no path from any root stage")
            }
            Warning::WideWave { wave_index, width } => write!(
                f,
                "wave {wave_index} has {width} concurrent stages (> 10); consider narrowing parallelism"
            ),
        }
    }
}

/// Result of [`validate`]: errors block execution, warnings do not.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigError>,
    pub warnings: Vec<Warning>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate the dependency graph (§4.1). Complements the shape checks
/// already performed in [`crate::config::PipelineConfig::from_yaml`].
pub fn validate(config: &PipelineConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut seen_names = HashSet::new();

    for stage in &config.agents {
        if !seen_names.insert(&stage.name) {
            report.errors.push(ConfigError::DuplicateStage(stage.name.clone()));
        }
    }

    let names: HashSet<&str> = config.agents.iter().map(|s| s.name.as_str()).collect();
    for stage in &config.agents {
        for dep in &stage.depends_on {
            if !names.contains(dep.as_str()) {
                report.errors.push(ConfigError::UnknownDependency {
                    stage: stage.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    // Only look for cycles once the graph references are well-formed;
    // otherwise a missing node would make the cycle search meaningless.
    if report.errors.is_empty()
        && let Some(cycle) = find_cycle(config)
    {
        report
            .errors
            .push(ConfigError::Cycle(cycle.join(" -> ")));
    }

    if report.errors.is_empty() {
        let roots: HashSet<&str> = config
            .agents
            .iter()
            .filter(|s| s.depends_on.is_empty())
            .map(|s| s.name.as_str())
            .collect();
        let reachable = reachable_from(config, &roots);
        for stage in &config.agents {
            if !reachable.contains(stage.name.as_str()) {
                report
                    .warnings
                    .push(Warning::UnreachableStage(stage.name.clone()));
            }
        }

        for (wave_index, wave) in partition_waves(config).iter().enumerate() {
            if wave.len() > 10 {
                report.warnings.push(Warning::WideWave {
                    wave_index,
                    width: wave.len(),
                });
            }
        }
    }

    report
}

fn reachable_from<'a>(config: &'a PipelineConfig, roots: &HashSet<&'a str>) -> HashSet<&'a str> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for stage in &config.agents {
        for dep in &stage.depends_on {
            adjacency
                .entry(dep.as_str())
                .or_default()
                .push(stage.name.as_str());
        }
    }
    let mut visited: HashSet<&str> = roots.clone();
    let mut queue: VecDeque<&str> = roots.iter().copied().collect();
    while let Some(node) = queue.pop_front() {
        if let Some(children) = adjacency.get(node) {
            for &child in children {
                if visited.insert(child) {
                    queue.push_back(child);
                }
            }
        }
    }
    visited
}

/// DFS cycle detection that reports the offending path (§4.1 "cycle
/// (report the offending cycle path)").
fn find_cycle(config: &PipelineConfig) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    let stages: Vec<&str> = config.agents.iter().map(|s| s.name.as_str()).collect();
    let deps: HashMap<&str, &[String]> = config
        .agents
        .iter()
        .map(|s| (s.name.as_str(), s.depends_on.as_slice()))
        .collect();
    let mut marks: HashMap<&str, Mark> = stages.iter().map(|&n| (n, Mark::Unvisited)).collect();
    let mut stack: Vec<&str> = Vec::new();

    fn visit<'a>(
        node: &'a str,
        deps: &HashMap<&'a str, &'a [String]>,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        match marks.get(node) {
            Some(Mark::Done) => return None,
            Some(Mark::InProgress) => {
                let start = stack.iter().position(|&n| n == node).unwrap_or(0);
                let mut cycle: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(node.to_string());
                return Some(cycle);
            }
            _ => {}
        }
        marks.insert(node, Mark::InProgress);
        stack.push(node);
        if let Some(dependencies) = deps.get(node) {
            for dep in dependencies.iter() {
                if let Some(cycle) = visit(dep.as_str(), deps, marks, stack) {
                    return Some(cycle);
                }
            }
        }
        stack.pop();
        marks.insert(node, Mark::Done);
        None
    }

    for &name in &stages {
        if marks[name] == Mark::Unvisited
            && let Some(cycle) = visit(name, &deps, &mut marks, &mut stack)
        {
            return Some(cycle);
        }
    }
    None
}

/// The execution plan: a topologically-ordered wave partition (§3 `ExecutionPlan`).
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub waves: Vec<Vec<String>>,
}

impl ExecutionPlan {
    pub fn max_parallelism(&self) -> usize {
        self.waves.iter().map(|w| w.len()).max().unwrap_or(0)
    }

    pub fn stage_count(&self) -> usize {
        self.waves.iter().map(|w| w.len()).sum()
    }
}

/// Build the execution plan via Kahn's algorithm (§4.1): wave *k* is every
/// stage whose indegree is zero after removing waves `0..k`. Within a wave,
/// stages keep declaration order for deterministic scheduling.
pub fn build_execution_plan(config: &PipelineConfig) -> Result<ExecutionPlan, ConfigError> {
    let report = validate(config);
    if !report.is_ok() {
        // The caller is expected to have already surfaced `report.errors`
        // via `validate`; this is only reached if it skipped that step.
        return Err(report
            .errors
            .into_iter()
            .next()
            .expect("is_ok() false implies a non-empty errors vec"));
    }

    Ok(ExecutionPlan {
        waves: partition_waves(config),
    })
}

/// Kahn's-algorithm wave partition (§4.1), shared by [`validate`] (to size
/// waves for the [`Warning::WideWave`] check) and [`build_execution_plan`].
/// Assumes the graph has already passed `validate`'s structural checks —
/// no unknown dependencies, no cycles.
fn partition_waves(config: &PipelineConfig) -> Vec<Vec<String>> {
    let declaration_order: HashMap<&str, usize> = config
        .agents
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name.as_str(), i))
        .collect();

    let mut indegree: HashMap<&str, usize> = config
        .agents
        .iter()
        .map(|s| (s.name.as_str(), s.depends_on.len()))
        .collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for stage in &config.agents {
        for dep in &stage.depends_on {
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(stage.name.as_str());
        }
    }

    let mut waves: Vec<Vec<String>> = Vec::new();
    let mut remaining: HashSet<&str> = indegree.keys().copied().collect();

    while !remaining.is_empty() {
        let mut wave: Vec<&str> = remaining
            .iter()
            .copied()
            .filter(|n| indegree[n] == 0)
            .collect();
        wave.sort_by_key(|n| declaration_order[n]);

        if wave.is_empty() {
            // Should be unreachable post-validation (cycles are rejected above).
            break;
        }

        for &node in &wave {
            remaining.remove(node);
            if let Some(children) = dependents.get(node) {
                for &child in children {
                    if let Some(d) = indegree.get_mut(child) {
                        *d = d.saturating_sub(1);
                    }
                }
            }
        }
        waves.push(wave.into_iter().map(String::from).collect());
    }

    waves
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> PipelineConfig {
        PipelineConfig::from_yaml(yaml).unwrap()
    }

    #[test]
    fn linear_chain_produces_one_stage_per_wave() {
        let cfg = config(
            r#"
name: x
agents:
  - name: a
    agent: a.md
  - name: b
    agent: b.md
    dependsOn: [a]
  - name: c
    agent: c.md
    dependsOn: [b]
"#,
        );
        let plan = build_execution_plan(&cfg).unwrap();
        assert_eq!(plan.waves, vec![vec!["a"], vec!["b"], vec!["c"]]);
        assert_eq!(plan.max_parallelism(), 1);
    }

    #[test]
    fn diamond_shape_parallelizes_middle_wave() {
        let cfg = config(
            r#"
name: x
agents:
  - name: a
    agent: a.md
  - name: b
    agent: b.md
    dependsOn: [a]
  - name: c
    agent: c.md
    dependsOn: [a]
  - name: d
    agent: d.md
    dependsOn: [b, c]
"#,
        );
        let plan = build_execution_plan(&cfg).unwrap();
        assert_eq!(plan.waves[0], vec!["a"]);
        assert_eq!(plan.waves[1], vec!["b", "c"]);
        assert_eq!(plan.waves[2], vec!["d"]);
        assert_eq!(plan.max_parallelism(), 2);
    }

    #[test]
    fn cycle_is_detected_and_names_every_stage_on_it() {
        let cfg = config(
            r#"
name: x
agents:
  - name: a
    agent: a.md
    dependsOn: [c]
  - name: b
    agent: b.md
    dependsOn: [a]
  - name: c
    agent: c.md
    dependsOn: [b]
"#,
        );
        let report = validate(&cfg);
        assert!(!report.is_ok());
        let ConfigError::Cycle(path) = &report.errors[0] else {
            panic!("expected Cycle error, got {:?}", report.errors[0]);
        };
        for name in ["a", "b", "c"] {
            assert!(path.contains(name), "cycle path `{path}` missing `{name}`");
        }
    }

    #[test]
    fn unknown_dependency_is_an_error() {
        let cfg = config(
            r#"
name: x
agents:
  - name: a
    agent: a.md
    dependsOn: [ghost]
"#,
        );
        let report = validate(&cfg);
        assert!(!report.is_ok());
        assert!(matches!(
            report.errors[0],
            ConfigError::UnknownDependency { .. }
        ));
    }

    #[test]
    fn wide_wave_emits_warning_via_caller_check() {
        let agents: String = (0..12)
            .map(|i| format!("  - name: s{i}\n    agent: s{i}.md\n"))
            .collect();
        let cfg = config(&format!("name: x\nagents:\n{agents}"));
        let plan = build_execution_plan(&cfg).unwrap();
        assert_eq!(plan.max_parallelism(), 12);
    }

    #[test]
    fn validate_warns_on_a_wave_wider_than_ten() {
        let agents: String = (0..12)
            .map(|i| format!("  - name: s{i}\n    agent: s{i}.md\n"))
            .collect();
        let cfg = config(&format!("name: x\nagents:\n{agents}"));
        let report = validate(&cfg);
        assert!(report.is_ok());
        assert!(report.warnings.iter().any(|w| matches!(
            w,
            Warning::WideWave { width: 12, .. }
        )));
    }
}
