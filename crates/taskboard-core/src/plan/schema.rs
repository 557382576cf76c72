//! `PlanResult` -- the Planner's output schema (§3) -- and its validation
//! (§8 invariant 9).
//!
//! Dependency-cycle detection reuses the host's Kahn's-algorithm shape from
//! its plan-TOML parser, adapted from named tasks to index-based
//! dependencies.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::PlanError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedTask {
    pub title: String,
    pub description: String,
    pub prompt: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    /// 0-based indices into the containing `PlanResult.tasks`.
    #[serde(default)]
    pub depends_on: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResult {
    pub workspace_name: String,
    #[serde(default)]
    pub workspace_context: String,
    pub max_concurrent: Option<i64>,
    pub tasks: Vec<PlannedTask>,
}

impl PlanResult {
    /// Validate against §3's rules: non-empty name, non-empty task list,
    /// every title/prompt non-empty, no self-loops, no out-of-range
    /// indices, and the dependency graph must be acyclic.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.workspace_name.trim().is_empty() {
            return Err(PlanError::EmptyName);
        }
        if self.tasks.is_empty() {
            return Err(PlanError::EmptyTasks);
        }

        let n = self.tasks.len();
        for (index, task) in self.tasks.iter().enumerate() {
            if task.title.trim().is_empty() {
                return Err(PlanError::EmptyTitle { index });
            }
            if task.prompt.trim().is_empty() {
                return Err(PlanError::EmptyPrompt { index });
            }
            for &dep_index in &task.depends_on {
                if dep_index >= n {
                    return Err(PlanError::DependencyOutOfRange { index, dep_index });
                }
                if dep_index == index {
                    return Err(PlanError::SelfDependency { index });
                }
            }
        }

        check_for_cycles(self)?;
        Ok(())
    }
}

fn check_for_cycles(plan: &PlanResult) -> Result<(), PlanError> {
    let n = plan.tasks.len();
    let mut in_degree = vec![0usize; n];
    let mut adj: Vec<Vec<usize>> = vec![vec![]; n];

    for (index, task) in plan.tasks.iter().enumerate() {
        for &dep_index in &task.depends_on {
            // Edge: dependency -> dependent.
            adj[dep_index].push(index);
            in_degree[index] += 1;
        }
    }

    let mut queue: VecDeque<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, deg)| **deg == 0)
        .map(|(i, _)| i)
        .collect();

    let mut sorted_count = 0usize;
    while let Some(node) = queue.pop_front() {
        sorted_count += 1;
        for &neighbor in &adj[node] {
            in_degree[neighbor] -= 1;
            if in_degree[neighbor] == 0 {
                queue.push_back(neighbor);
            }
        }
    }

    if sorted_count != n {
        let cycle: Vec<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, deg)| **deg > 0)
            .map(|(i, _)| i)
            .collect();
        return Err(PlanError::CycleDetected(cycle));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(title: &str, prompt: &str, depends_on: Vec<usize>) -> PlannedTask {
        PlannedTask {
            title: title.to_string(),
            description: String::new(),
            prompt: prompt.to_string(),
            priority: 2,
            tags: vec![],
            depends_on,
        }
    }

    #[test]
    fn rejects_empty_name() {
        let plan = PlanResult {
            workspace_name: "  ".to_string(),
            workspace_context: String::new(),
            max_concurrent: None,
            tasks: vec![task("t", "p", vec![])],
        };
        assert_eq!(plan.validate(), Err(PlanError::EmptyName));
    }

    #[test]
    fn rejects_empty_task_list() {
        let plan = PlanResult {
            workspace_name: "ws".to_string(),
            workspace_context: String::new(),
            max_concurrent: None,
            tasks: vec![],
        };
        assert_eq!(plan.validate(), Err(PlanError::EmptyTasks));
    }

    #[test]
    fn rejects_empty_title_and_prompt() {
        let plan = PlanResult {
            workspace_name: "ws".to_string(),
            workspace_context: String::new(),
            max_concurrent: None,
            tasks: vec![task("", "p", vec![])],
        };
        assert_eq!(plan.validate(), Err(PlanError::EmptyTitle { index: 0 }));

        let plan = PlanResult {
            tasks: vec![task("t", "  ", vec![])],
            ..plan
        };
        assert_eq!(plan.validate(), Err(PlanError::EmptyPrompt { index: 0 }));
    }

    #[test]
    fn rejects_out_of_range_dependency() {
        let plan = PlanResult {
            workspace_name: "ws".to_string(),
            workspace_context: String::new(),
            max_concurrent: None,
            tasks: vec![task("t", "p", vec![5])],
        };
        assert_eq!(
            plan.validate(),
            Err(PlanError::DependencyOutOfRange { index: 0, dep_index: 5 })
        );
    }

    #[test]
    fn rejects_self_dependency() {
        let plan = PlanResult {
            workspace_name: "ws".to_string(),
            workspace_context: String::new(),
            max_concurrent: None,
            tasks: vec![task("t", "p", vec![0])],
        };
        assert_eq!(plan.validate(), Err(PlanError::SelfDependency { index: 0 }));
    }

    #[test]
    fn rejects_cycles() {
        let plan = PlanResult {
            workspace_name: "ws".to_string(),
            workspace_context: String::new(),
            max_concurrent: None,
            tasks: vec![task("a", "p", vec![1]), task("b", "p", vec![0])],
        };
        assert!(matches!(plan.validate(), Err(PlanError::CycleDetected(_))));
    }

    #[test]
    fn accepts_diamond_dag() {
        let plan = PlanResult {
            workspace_name: "ws".to_string(),
            workspace_context: String::new(),
            max_concurrent: Some(2),
            tasks: vec![
                task("a", "p", vec![]),
                task("b", "p", vec![0]),
                task("c", "p", vec![0]),
                task("d", "p", vec![1, 2]),
            ],
        };
        assert!(plan.validate().is_ok());
    }
}
