//! Dependency Resolver (C6): orders `AgentSpec`s so every agent appears after
//! every agent named in its `dependencies`. Cycles are detected with a
//! three-colour DFS; independent agents keep their original relative order.

use std::collections::HashMap;

use crate::config::project::AgentSpec;
use crate::errors::NexousError;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Returns a permutation of `agents` in topological order, or a terminal
/// error if a dependency target is missing or a cycle exists.
pub fn resolve_order(agents: &[AgentSpec]) -> Result<Vec<AgentSpec>, NexousError> {
    let index_by_id: HashMap<&str, usize> =
        agents.iter().enumerate().map(|(i, a)| (a.id.as_str(), i)).collect();

    for agent in agents {
        for dep in &agent.dependencies {
            if !index_by_id.contains_key(dep.as_str()) {
                return Err(NexousError::DependencyNotFound { agent_id: agent.id.clone(), target: dep.clone() });
            }
        }
    }

    let mut colors = vec![Color::White; agents.len()];
    let mut order = Vec::with_capacity(agents.len());

    for start in 0..agents.len() {
        if colors[start] == Color::White {
            visit(start, agents, &index_by_id, &mut colors, &mut order)?;
        }
    }

    Ok(order.into_iter().map(|i| agents[i].clone()).collect())
}

fn visit(
    node: usize,
    agents: &[AgentSpec],
    index_by_id: &HashMap<&str, usize>,
    colors: &mut [Color],
    order: &mut Vec<usize>,
) -> Result<(), NexousError> {
    colors[node] = Color::Gray;
    for dep in &agents[node].dependencies {
        let dep_index = index_by_id[dep.as_str()];
        match colors[dep_index] {
            Color::White => visit(dep_index, agents, index_by_id, colors, order)?,
            Color::Gray => return Err(NexousError::DependencyCycle(agents[dep_index].id.clone())),
            Color::Black => {}
        }
    }
    colors[node] = Color::Black;
    order.push(node);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as Map;

    use super::*;

    fn spec(id: &str, deps: &[&str]) -> AgentSpec {
        AgentSpec {
            id: id.to_string(),
            preset: "p".to_string(),
            purpose: String::new(),
            inputs: Map::new(),
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            output_policy: None,
        }
    }

    #[test]
    fn orders_linear_chain() {
        let agents = vec![spec("b", &["a"]), spec("a", &[])];
        let ordered = resolve_order(&agents).unwrap();
        let ids: Vec<&str> = ordered.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn preserves_original_order_among_independent_agents() {
        let agents = vec![spec("a", &[]), spec("b", &[]), spec("c", &[])];
        let ordered = resolve_order(&agents).unwrap();
        let ids: Vec<&str> = ordered.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn detects_missing_dependency() {
        let agents = vec![spec("a", &["ghost"])];
        let err = resolve_order(&agents).unwrap_err();
        assert!(matches!(err, NexousError::DependencyNotFound { .. }));
    }

    #[test]
    fn detects_cycle() {
        let agents = vec![spec("a", &["b"]), spec("b", &["a"])];
        let err = resolve_order(&agents).unwrap_err();
        assert!(matches!(err, NexousError::DependencyCycle(_)));
    }
}
