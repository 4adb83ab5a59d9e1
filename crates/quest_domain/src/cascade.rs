//! Dependency-ordered quest refresh after a habit changed.

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tracing::{instrument, warn};

use crate::habit::Habit;
use crate::quest::{refresh_quest, Quest, QuestStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// Quests refreshed, in refresh order.
    pub refreshed: Vec<String>,
    /// Refreshed quests whose state changed.
    pub changed: Vec<String>,
    /// Quests on a dependency cycle; never refreshed.
    pub cycle: Vec<String>,
}

/// Quest dependency graph. Edges point from a quest to the quests that wait
/// on it.
#[derive(Debug, Default)]
pub struct QuestGraph {
    graph: DiGraph<String, ()>,
    index_by_id: HashMap<String, NodeIndex>,
}

impl QuestGraph {
    pub fn build(quests: &[Quest]) -> Self {
        let mut graph = QuestGraph::default();
        for quest in quests {
            let idx = graph.graph.add_node(quest.id.clone());
            graph.index_by_id.insert(quest.id.clone(), idx);
        }
        for quest in quests {
            let Some(&dependent) = graph.index_by_id.get(&quest.id) else {
                continue;
            };
            for dependency in quest.depends_on() {
                if let Some(&source) = graph.index_by_id.get(dependency) {
                    graph.graph.update_edge(source, dependent, ());
                }
            }
        }
        graph
    }

    pub fn dependents_of(&self, quest_id: &str) -> Vec<&str> {
        let Some(&idx) = self.index_by_id.get(quest_id) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(idx, Direction::Outgoing)
            .filter_map(|n| self.graph.node_weight(n).map(String::as_str))
            .collect()
    }

    /// `seeds` plus every quest that transitively waits on one of them.
    pub fn closure(&self, seeds: &[String]) -> BTreeSet<String> {
        let mut included: BTreeSet<String> = seeds
            .iter()
            .filter(|id| self.index_by_id.contains_key(*id))
            .cloned()
            .collect();
        let mut stack: Vec<String> = included.iter().cloned().collect();
        while let Some(current) = stack.pop() {
            for dependent in self.dependents_of(&current) {
                if included.insert(dependent.to_string()) {
                    stack.push(dependent.to_string());
                }
            }
        }
        included
    }

    /// Kahn ordering of `subset`, counting only edges inside it. Ties resolve
    /// by id. The second list holds the nodes that never reached in-degree
    /// zero, i.e. those on or behind a cycle.
    pub fn topological_order(&self, subset: &BTreeSet<String>) -> (Vec<String>, Vec<String>) {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        for id in subset {
            let Some(&idx) = self.index_by_id.get(id) else {
                continue;
            };
            let count = self
                .graph
                .neighbors_directed(idx, Direction::Incoming)
                .filter(|n| subset.contains(&self.graph[*n]))
                .count();
            in_degree.insert(id.as_str(), count);
        }

        let mut queue: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut ordered: Vec<String> = Vec::with_capacity(subset.len());
        while let Some(first) = queue.pop_first() {
            ordered.push(first.to_string());
            for dependent in self.dependents_of(first) {
                let Some(degree) = in_degree.get_mut(dependent) else {
                    continue;
                };
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    queue.insert(dependent);
                }
            }
        }

        let done: HashSet<&str> = ordered.iter().map(String::as_str).collect();
        let stuck: Vec<String> = in_degree
            .keys()
            .filter(|id| !done.contains(*id))
            .map(|id| id.to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        (ordered, stuck)
    }
}

/// Refreshes every quest that depends, directly or through other quests, on
/// `habit_id`, each after the quests it waits on. Quests on a dependency cycle
/// are skipped and reported.
#[instrument(skip(quests, habits), fields(quest_count = quests.len()))]
pub fn cascade_from_habit(
    habit_id: &str,
    quests: &mut [Quest],
    habits: &[Habit],
) -> CascadeReport {
    let seeds: Vec<String> = quests
        .iter()
        .filter(|quest| quest.watches_habit(habit_id))
        .map(|quest| quest.id.clone())
        .collect();
    if seeds.is_empty() {
        return CascadeReport::default();
    }

    let graph = QuestGraph::build(quests);
    let closed = graph.closure(&seeds);
    let (order, cycle) = graph.topological_order(&closed);
    if !cycle.is_empty() {
        warn!(?cycle, "quest dependency cycle; skipping these quests");
    }

    let habits_by_id: HashMap<String, Habit> = habits
        .iter()
        .map(|habit| (habit.id.clone(), habit.clone()))
        .collect();
    let mut statuses: HashMap<String, QuestStatus> = quests
        .iter()
        .map(|quest| (quest.id.clone(), quest.status))
        .collect();
    let position: HashMap<String, usize> = quests
        .iter()
        .enumerate()
        .map(|(idx, quest)| (quest.id.clone(), idx))
        .collect();

    let mut changed = Vec::new();
    for id in &order {
        let Some(&idx) = position.get(id) else {
            continue;
        };
        let quest = &mut quests[idx];
        if refresh_quest(quest, &habits_by_id, &statuses) {
            changed.push(id.clone());
        }
        statuses.insert(id.clone(), quest.status);
    }

    CascadeReport {
        refreshed: order,
        changed,
        cycle,
    }
}
