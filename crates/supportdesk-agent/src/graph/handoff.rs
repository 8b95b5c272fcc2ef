use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use supportdesk_core::error::{Result, SupportError};

/// One node of a handoff graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    /// A participant that must hand off needs at least one outgoing edge.
    #[serde(default)]
    pub requires_handoff: bool,
}

impl Participant {
    pub fn new(name: impl Into<String>, requires_handoff: bool) -> Self {
        Self {
            name: name.into(),
            requires_handoff,
        }
    }
}

/// Directed graph of allowed control transfers between agents.
///
/// There are no implicit edges: a handoff is legal only if it was declared
/// with `add_edge`. Cycles are allowed; the orchestrator bounds traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffGraph {
    coordinator: String,
    participants: Vec<Participant>,
    edges: HashMap<String, Vec<String>>,
}

impl HandoffGraph {
    /// Declare the coordinator and the participants. Edges are added separately.
    pub fn declare(
        coordinator: impl Into<String>,
        participants: impl IntoIterator<Item = Participant>,
    ) -> Self {
        Self {
            coordinator: coordinator.into(),
            participants: participants.into_iter().collect(),
            edges: HashMap::new(),
        }
    }

    /// Allow `from` to hand off to each of `targets`.
    pub fn add_edge<I, S>(&mut self, from: impl Into<String>, targets: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.edges.entry(from.into()).or_default();
        for target in targets {
            let target = target.into();
            if !entry.contains(&target) {
                entry.push(target);
            }
        }
        self
    }

    /// Check the graph is well formed.
    pub fn validate(&self) -> Result<()> {
        if self.coordinator.trim().is_empty() {
            return Err(SupportError::Configuration(
                "handoff graph has no coordinator".into(),
            ));
        }
        if !self.is_participant(&self.coordinator) {
            return Err(SupportError::Configuration(format!(
                "coordinator '{}' is not a participant",
                self.coordinator
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for p in &self.participants {
            if !seen.insert(p.name.as_str()) {
                return Err(SupportError::Configuration(format!(
                    "participant '{}' is declared twice",
                    p.name
                )));
            }
        }

        // Sorted for deterministic error messages
        let mut sources: Vec<&String> = self.edges.keys().collect();
        sources.sort();
        for from in sources {
            if !self.is_participant(from) {
                return Err(SupportError::Configuration(format!(
                    "edge from unknown participant '{}'",
                    from
                )));
            }
            for to in &self.edges[from] {
                if !self.is_participant(to) {
                    return Err(SupportError::Configuration(format!(
                        "edge '{}' -> '{}' targets unknown participant",
                        from, to
                    )));
                }
            }
        }

        for p in &self.participants {
            if p.requires_handoff && self.targets(&p.name).is_empty() {
                return Err(SupportError::Configuration(format!(
                    "participant '{}' requires a handoff but has no outgoing edge",
                    p.name
                )));
            }
        }
        Ok(())
    }

    /// Whether `from` may hand off to `to`.
    pub fn allows(&self, from: &str, to: &str) -> bool {
        self.edges
            .get(from)
            .is_some_and(|targets| targets.iter().any(|t| t == to))
    }

    /// Declared targets of `from`, in declaration order.
    pub fn targets(&self, from: &str) -> &[String] {
        self.edges.get(from).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn coordinator(&self) -> &str {
        &self.coordinator
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn is_participant(&self, name: &str) -> bool {
        self.participants.iter().any(|p| p.name == name)
    }

    /// A participant with no outgoing edges.
    pub fn is_terminal(&self, name: &str) -> bool {
        self.targets(name).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> HandoffGraph {
        let mut graph = HandoffGraph::declare(
            "triage",
            [
                Participant::new("triage", true),
                Participant::new("fraud_detection", false),
                Participant::new("final_response", false),
            ],
        );
        graph.add_edge("triage", ["fraud_detection", "final_response"]);
        graph
    }

    #[test]
    fn test_valid_graph() {
        let graph = pipeline();
        assert!(graph.validate().is_ok());
        assert!(graph.allows("triage", "fraud_detection"));
        assert!(!graph.allows("fraud_detection", "triage"));
        assert_eq!(graph.targets("triage"), ["fraud_detection", "final_response"]);
        assert!(graph.targets("final_response").is_empty());
        assert!(graph.is_terminal("final_response"));
        assert_eq!(graph.coordinator(), "triage");
        assert_eq!(graph.participants().len(), 3);
    }

    #[test]
    fn test_no_implicit_edges() {
        let graph = pipeline();
        assert!(!graph.allows("triage", "triage"));
        assert!(!graph.allows("final_response", "fraud_detection"));
        assert!(!graph.allows("unknown", "triage"));
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let mut graph = pipeline();
        graph.add_edge("triage", ["final_response"]);
        assert_eq!(graph.targets("triage").len(), 2);
    }

    #[test]
    fn test_unknown_target_rejected() {
        let mut graph = pipeline();
        graph.add_edge("triage", ["billing"]);
        let err = graph.validate().unwrap_err();
        assert!(matches!(err, SupportError::Configuration(ref m) if m.contains("billing")));
    }

    #[test]
    fn test_unknown_source_rejected() {
        let mut graph = pipeline();
        graph.add_edge("ghost", ["triage"]);
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_missing_coordinator() {
        let graph = HandoffGraph::declare("", [Participant::new("a", false)]);
        assert!(graph.validate().is_err());

        let graph = HandoffGraph::declare("b", [Participant::new("a", false)]);
        let err = graph.validate().unwrap_err().to_string();
        assert!(err.contains("'b' is not a participant"));
    }

    #[test]
    fn test_required_handoff_without_edge() {
        let graph = HandoffGraph::declare("a", [Participant::new("a", true)]);
        let err = graph.validate().unwrap_err().to_string();
        assert!(err.contains("requires a handoff"));
    }

    #[test]
    fn test_cycles_allowed() {
        let mut graph = HandoffGraph::declare(
            "a",
            [Participant::new("a", true), Participant::new("b", true)],
        );
        graph.add_edge("a", ["b"]).add_edge("b", ["a"]);
        assert!(graph.validate().is_ok());
    }
}
