use std::collections::{BTreeMap, BTreeSet};

use crate::schema::DatabaseDefinition;

/// Summary of FK graph structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FkGraphSummary {
    pub nodes: usize,
    pub edges: usize,
}

/// Report for FK dependency ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FkGraphReport {
    pub summary: FkGraphSummary,
    /// Tables ordered so that referenced tables come before referencing ones.
    pub topo_order: Option<Vec<String>>,
    pub cycle: Option<Vec<String>>,
}

impl FkGraphReport {
    pub fn has_cycle(&self) -> bool {
        self.cycle.is_some()
    }
}

/// Build a deterministic FK dependency report for a database definition.
///
/// Foreign keys naming tables outside the definition still count as nodes.
pub fn build_fk_graph_report(database: &DatabaseDefinition) -> FkGraphReport {
    let graph = build_adjacency(database);
    let nodes = graph.len();
    let edges = graph.values().map(|targets| targets.len()).sum();
    let summary = FkGraphSummary { nodes, edges };

    match toposort(&graph) {
        Ok(order) => FkGraphReport {
            summary,
            topo_order: Some(order),
            cycle: None,
        },
        Err(cycle) => FkGraphReport {
            summary,
            topo_order: None,
            cycle: Some(cycle),
        },
    }
}

/// Edges point from referenced table to referencing table.
fn build_adjacency(database: &DatabaseDefinition) -> BTreeMap<String, BTreeSet<String>> {
    let mut graph: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for table in database.tables() {
        graph.entry(table.name().to_string()).or_default();

        for field in table.fields() {
            if let Some(referenced) = field.fk() {
                graph
                    .entry(referenced.to_string())
                    .or_default()
                    .insert(table.name().to_string());
            }
        }
    }

    graph
}

fn toposort(graph: &BTreeMap<String, BTreeSet<String>>) -> Result<Vec<String>, Vec<String>> {
    let mut indegree: BTreeMap<String, usize> =
        graph.keys().map(|node| (node.clone(), 0)).collect();

    for targets in graph.values() {
        for target in targets {
            *indegree.entry(target.clone()).or_insert(0) += 1;
        }
    }

    let mut ready: BTreeSet<String> = indegree
        .iter()
        .filter_map(|(node, count)| (*count == 0).then(|| node.clone()))
        .collect();

    let mut order = Vec::with_capacity(graph.len());

    while let Some(node) = ready.pop_first() {
        if let Some(targets) = graph.get(&node) {
            for target in targets {
                if let Some(count) = indegree.get_mut(target) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.insert(target.clone());
                    }
                }
            }
        }
        order.push(node);
    }

    if order.len() == graph.len() {
        Ok(order)
    } else {
        let cycle_nodes: Vec<String> = indegree
            .into_iter()
            .filter_map(|(node, count)| (count > 0).then_some(node))
            .collect();
        Err(cycle_nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDefinition;
    use crate::types::BaseType;

    fn column(name: &str) -> FieldDefinition {
        FieldDefinition::new(name, BaseType::Integer).expect("field")
    }

    #[test]
    fn toposort_reports_cycle() {
        let database = DatabaseDefinition::from_tables(
            "db",
            [(
                "employees",
                vec![column("id"), column("manager_id").with_fk("employees")],
                Vec::new(),
            )],
        )
        .expect("database");

        let report = build_fk_graph_report(&database);
        assert!(report.topo_order.is_none());
        assert!(report.has_cycle());
        assert!(
            report
                .cycle
                .as_ref()
                .unwrap()
                .contains(&"employees".to_string())
        );
    }

    #[test]
    fn toposort_orders_dependencies() {
        let database = DatabaseDefinition::from_tables(
            "db",
            [
                (
                    "orders",
                    vec![column("id"), column("user_id").with_fk("users")],
                    Vec::new(),
                ),
                ("users", vec![column("id")], Vec::new()),
            ],
        )
        .expect("database");

        let report = build_fk_graph_report(&database);
        assert_eq!(report.summary, FkGraphSummary { nodes: 2, edges: 1 });
        let order = report.topo_order.expect("expected toposort");
        let users_idx = order.iter().position(|item| item == "users").unwrap();
        let orders_idx = order.iter().position(|item| item == "orders").unwrap();
        assert!(users_idx < orders_idx);
    }
}
