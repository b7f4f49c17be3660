//! Connectivity graph over implant hardware
//!
//! Attachment points are nodes, plates and links are edges. From that
//! multigraph we derive, per screw, the screws joined to it through exactly
//! one connection. Paths through control points are not flattened into
//! screw-to-screw relations: each edge is evaluated on its own.
//!
//! Malformed connections (unknown endpoint, endpoints in another case,
//! unknown owning case, self loops) never fail the build. They are kept
//! aside and attributed to the screws sitting on their known endpoints so
//! only those screws' checks report the problem.

use crate::hardware::{CaseId, ConnectionId, ConnectionKind, DotId, PlanSnapshot, ScrewId};
use crate::thresholds::ThresholdTable;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Hardware edge payload
#[derive(Debug, Clone, PartialEq)]
pub struct HardwareEdge {
    pub connection: ConnectionId,
    pub kind: ConnectionKind,
    /// Effective width after override clamping
    pub width: f64,
}

/// A screw directly joined to another through one connection
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub screw: ScrewId,
    pub kind: ConnectionKind,
    pub width: f64,
    pub connection: ConnectionId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedConnection {
    pub connection: ConnectionId,
    pub reason: String,
}

/// Screw-level view of one plan's hardware
#[derive(Debug, Default)]
pub struct ConnectivityGraph {
    graph: UnGraph<DotId, HardwareEdge>,
    dot_nodes: HashMap<DotId, NodeIndex>,
    screw_of_node: HashMap<NodeIndex, ScrewId>,
    neighbors: HashMap<ScrewId, Vec<Neighbor>>,
    case_screws: HashMap<CaseId, Vec<ScrewId>>,
    malformed: Vec<MalformedConnection>,
    screw_faults: HashMap<ScrewId, Vec<usize>>,
}

impl ConnectivityGraph {
    pub fn build(snapshot: &PlanSnapshot, thresholds: &ThresholdTable) -> Self {
        let mut this = Self::default();

        for dot in snapshot.attachment_points() {
            let idx = this.graph.add_node(dot.id.clone());
            this.dot_nodes.insert(dot.id.clone(), idx);
            if let Some(screw) = dot.screw() {
                if snapshot.screw(screw).is_some() {
                    this.screw_of_node.insert(idx, screw.clone());
                }
            }
        }

        for conn in snapshot.connections() {
            let reason = this.malformed_reason(snapshot, &conn.case, &conn.from, &conn.to);
            if let Some(reason) = reason {
                warn!("Skipping malformed connection '{}': {}", conn.id, reason);
                this.record_malformed(conn.id.clone(), reason, [&conn.from, &conn.to]);
                continue;
            }
            let Some(case) = snapshot.case(&conn.case) else {
                continue;
            };
            let a = this.dot_nodes[&conn.from];
            let b = this.dot_nodes[&conn.to];
            this.graph.add_edge(
                a,
                b,
                HardwareEdge {
                    connection: conn.id.clone(),
                    kind: conn.kind,
                    width: thresholds.effective_width(case, conn),
                },
            );
        }

        // Edge references come back in insertion order, which keeps neighbor
        // lists in connection order
        for edge in this.graph.edge_references() {
            let (Some(s), Some(t)) = (
                this.screw_of_node.get(&edge.source()),
                this.screw_of_node.get(&edge.target()),
            ) else {
                continue;
            };
            if s == t {
                continue;
            }
            let w = edge.weight();
            for (from, to) in [(s, t), (t, s)] {
                this.neighbors.entry(from.clone()).or_default().push(Neighbor {
                    screw: to.clone(),
                    kind: w.kind,
                    width: w.width,
                    connection: w.connection.clone(),
                });
            }
        }

        let attached: HashSet<&ScrewId> = this.screw_of_node.values().collect();
        let mut case_screws: HashMap<CaseId, Vec<ScrewId>> = HashMap::new();
        for screw in attached {
            case_screws
                .entry(screw.case.clone())
                .or_default()
                .push(screw.clone());
        }
        for list in case_screws.values_mut() {
            list.sort();
        }
        this.case_screws = case_screws;

        debug!(
            "Built connectivity graph: {} dots, {} connections, {} attached screws, {} malformed",
            this.graph.node_count(),
            this.graph.edge_count(),
            this.screw_of_node.len(),
            this.malformed.len()
        );

        this
    }

    fn malformed_reason(
        &self,
        snapshot: &PlanSnapshot,
        case: &CaseId,
        from: &DotId,
        to: &DotId,
    ) -> Option<String> {
        if snapshot.case(case).is_none() {
            return Some(format!("unknown implant case '{}'", case));
        }
        for dot in [from, to] {
            match snapshot.attachment_point(dot) {
                None => return Some(format!("unknown attachment point '{}'", dot)),
                Some(d) if &d.case != case => {
                    return Some(format!(
                        "attachment point '{}' belongs to case '{}', not '{}'",
                        dot, d.case, case
                    ))
                }
                Some(_) => {}
            }
        }
        if from == to {
            return Some(format!("joins attachment point '{}' to itself", from));
        }
        None
    }

    fn record_malformed(&mut self, connection: ConnectionId, reason: String, dots: [&DotId; 2]) {
        let slot = self.malformed.len();
        self.malformed.push(MalformedConnection { connection, reason });
        for dot in dots {
            let screw = self
                .dot_nodes
                .get(dot)
                .and_then(|idx| self.screw_of_node.get(idx))
                .cloned();
            if let Some(screw) = screw {
                let faults = self.screw_faults.entry(screw).or_default();
                if !faults.contains(&slot) {
                    faults.push(slot);
                }
            }
        }
    }

    /// Direct neighbors in connection order; empty for floating screws
    pub fn neighbors(&self, screw: &ScrewId) -> &[Neighbor] {
        self.neighbors.get(screw).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn plate_neighbors<'a>(&'a self, screw: &ScrewId) -> impl Iterator<Item = &'a Neighbor> {
        self.neighbors(screw)
            .iter()
            .filter(|n| n.kind == ConnectionKind::Plate)
    }

    pub fn is_plate_connected(&self, a: &ScrewId, b: &ScrewId) -> bool {
        self.plate_neighbors(a).any(|n| &n.screw == b)
    }

    /// Screw has no attachment point at all
    pub fn is_floating(&self, screw: &ScrewId) -> bool {
        !self.screw_of_node.values().any(|s| s == screw)
    }

    /// Attached screws of a case, ordered by index
    pub fn case_screws(&self, case: &CaseId) -> &[ScrewId] {
        self.case_screws.get(case).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn malformed(&self) -> &[MalformedConnection] {
        &self.malformed
    }

    /// Malformed connections touching one of the screw's attachment points
    pub fn malformed_for(&self, screw: &ScrewId) -> Vec<&MalformedConnection> {
        self.screw_faults
            .get(screw)
            .map(|slots| slots.iter().map(|&i| &self.malformed[i]).collect())
            .unwrap_or_default()
    }

    /// Connections joined at the given attachment point
    pub fn connections_at(&self, dot: &DotId) -> Vec<ConnectionId> {
        let Some(&idx) = self.dot_nodes.get(dot) else {
            return Vec::new();
        };
        let mut ids: Vec<ConnectionId> = self
            .graph
            .edges(idx)
            .map(|e| e.weight().connection.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn dot_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn connection_count(&self) -> usize {
        self.graph.edge_count()
    }
}
