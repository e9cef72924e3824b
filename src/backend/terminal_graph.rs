//! The terminal-graph service: holds terminal and route-segment records
//! and answers ranked path queries. `InProcessTerminalGraph` is a full
//! reference implementation (Yen's K shortest paths) used by tests and
//! the headless driver; production deployments talk to the remote
//! service through the same trait.

use crate::document::objects::Mode;
use crate::errors::{ErrorKind, PlanError, PlanResult};
use bimap::BiMap;
use log::*;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub const LAND_SIDE: &str = "LAND_SIDE";
pub const SEA_SIDE: &str = "SEA_SIDE";

#[derive(Clone, Debug, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct TerminalRecord {
    /// Aliases of the terminal; the unique id first, the display name
    /// second.
    pub names: Vec<String>,
    pub region: String,
    /// `LAND_SIDE`/`SEA_SIDE` to mode-name sets ("Truck", "Train",
    /// "Ship").
    pub interfaces: BTreeMap<String, BTreeSet<String>>,
    /// Optional `cost`, `dwell_time`, `capacity`, `customs` subobjects.
    pub config: serde_json::Value,
}

impl TerminalRecord {
    pub fn id(&self) -> &str {
        self.names.get(0).map(|s| s.as_str()).unwrap_or("")
    }

    /// Mean dwell seconds from the config block, if present.
    pub fn dwell_seconds(&self) -> f64 {
        self.config
            .get("dwell_time")
            .and_then(|d| d.get("parameters"))
            .and_then(|p| p.get("average"))
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentAttributes {
    pub distance: f64,
    pub travel_time: f64,
    pub cost: f64,
    pub carbon_emissions: f64,
    pub energy_consumption: f64,
    pub risk: f64,
}

#[derive(Clone, Debug, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct RouteSegmentRecord {
    pub id: String,
    pub start_terminal: String,
    pub end_terminal: String,
    /// "Truck", "Train" or "Ship".
    pub mode: String,
    pub attributes: SegmentAttributes,
}

impl RouteSegmentRecord {
    pub fn mode_enum(&self) -> Option<Mode> {
        match self.mode.as_str() {
            "Truck" => Some(Mode::Truck),
            "Train" => Some(Mode::Rail),
            "Ship" => Some(Mode::Ship),
            _ => None,
        }
    }
}

/// One ranked path: segments in traversal order (start/end oriented along
/// the traversal) plus accumulated metrics.
#[derive(Clone, Debug, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct PathRecord {
    pub segments: Vec<RouteSegmentRecord>,
    pub total_distance: f64,
    pub total_travel_time: f64,
    pub total_cost: f64,
}

impl PathRecord {
    /// Terminal ids visited, in order.
    pub fn terminal_sequence(&self) -> Vec<&str> {
        let mut seq = Vec::new();
        if let Some(first) = self.segments.first() {
            seq.push(first.start_terminal.as_str());
        }
        for s in &self.segments {
            seq.push(s.end_terminal.as_str());
        }
        seq
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ModeFilter {
    Any,
    Only(Mode),
}

/// The request/response surface of the terminal-graph service.
/// Implementations must honour the caller's timeout and map transport
/// failures to `ServiceUnavailable`.
pub trait TerminalGraphService: Send + Sync {
    fn reset_server(&self) -> PlanResult<bool>;
    fn add_terminal(&self, record: &TerminalRecord) -> PlanResult<bool>;
    fn add_route(&self, record: &RouteSegmentRecord) -> PlanResult<bool>;
    fn get_terminal_status(&self, id: &str) -> PlanResult<bool>;
    fn find_top_paths(
        &self,
        src: &str,
        dst: &str,
        k: usize,
        filter: ModeFilter,
        ignore_dwell: bool,
    ) -> PlanResult<Vec<PathRecord>>;
    fn has_command_queue_consumers(&self) -> PlanResult<bool>;
}

#[derive(Default)]
struct GraphState {
    terminals: BTreeMap<String, TerminalRecord>,
    routes: Vec<RouteSegmentRecord>,
}

/// In-process reference implementation.
pub struct InProcessTerminalGraph {
    state: Mutex<GraphState>,
    consumers: AtomicBool,
}

impl InProcessTerminalGraph {
    pub fn new() -> Self {
        InProcessTerminalGraph {
            state: Mutex::new(GraphState::default()),
            consumers: AtomicBool::new(true),
        }
    }

    /// Test hook: simulate the service losing its queue consumer.
    pub fn set_consumers(&self, present: bool) {
        self.consumers.store(present, Ordering::SeqCst);
    }

    pub fn terminal_count(&self) -> usize {
        self.state.lock().unwrap().terminals.len()
    }

    pub fn route_count(&self) -> usize {
        self.state.lock().unwrap().routes.len()
    }
}

impl Default for InProcessTerminalGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalGraphService for InProcessTerminalGraph {
    fn reset_server(&self) -> PlanResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.terminals.clear();
        state.routes.clear();
        Ok(true)
    }

    fn add_terminal(&self, record: &TerminalRecord) -> PlanResult<bool> {
        if record.id().is_empty() {
            return Ok(false);
        }
        let mut state = self.state.lock().unwrap();
        state
            .terminals
            .insert(record.id().to_string(), record.clone());
        Ok(true)
    }

    fn add_route(&self, record: &RouteSegmentRecord) -> PlanResult<bool> {
        let mut state = self.state.lock().unwrap();
        if !state.terminals.contains_key(&record.start_terminal)
            || !state.terminals.contains_key(&record.end_terminal)
        {
            return Ok(false);
        }
        if record.mode_enum().is_none() {
            return Ok(false);
        }
        state.routes.push(record.clone());
        Ok(true)
    }

    fn get_terminal_status(&self, id: &str) -> PlanResult<bool> {
        Ok(self.state.lock().unwrap().terminals.contains_key(id))
    }

    fn find_top_paths(
        &self,
        src: &str,
        dst: &str,
        k: usize,
        filter: ModeFilter,
        ignore_dwell: bool,
    ) -> PlanResult<Vec<PathRecord>> {
        let state = self.state.lock().unwrap();
        if !state.terminals.contains_key(src) || !state.terminals.contains_key(dst) {
            return Err(PlanError::new(
                ErrorKind::PathNotFound,
                "unknown endpoint terminal",
            ));
        }
        let search = Search::build(&state, filter, ignore_dwell);
        let paths = search.top_k(src, dst, k);
        debug!(
            "find_top_paths {} -> {}: {} of {} requested",
            src,
            dst,
            paths.len(),
            k
        );
        Ok(paths
            .into_iter()
            .map(|p| search.to_record(&state, p))
            .collect())
    }

    fn has_command_queue_consumers(&self) -> PlanResult<bool> {
        Ok(self.consumers.load(Ordering::SeqCst))
    }
}

type NodeSeq = SmallVec<[usize; 8]>;

#[derive(Clone, Debug)]
struct FoundPath {
    cost: f64,
    nodes: NodeSeq,
    /// Indices into `Search::edges`, one per hop.
    edges: SmallVec<[usize; 8]>,
}

/// A directed hop derived from an (undirected) route segment.
#[derive(Clone, Copy, Debug)]
struct Hop {
    route: usize,
    from: usize,
    to: usize,
    weight: f64,
}

struct Search {
    nodes: BiMap<String, usize>,
    edges: Vec<Hop>,
    adjacency: Vec<Vec<usize>>,
}

impl Search {
    fn build(state: &GraphState, filter: ModeFilter, ignore_dwell: bool) -> Search {
        let mut nodes = BiMap::new();
        for id in state.terminals.keys() {
            let n = nodes.len();
            nodes.insert(id.clone(), n);
        }
        let dwell: Vec<f64> = (0..nodes.len())
            .map(|n| {
                let id = nodes.get_by_right(&n).unwrap();
                if ignore_dwell {
                    0.0
                } else {
                    state.terminals[id].dwell_seconds()
                }
            })
            .collect();

        let mut edges = Vec::new();
        let mut adjacency = vec![Vec::new(); nodes.len()];
        for (ri, r) in state.routes.iter().enumerate() {
            let mode = match r.mode_enum() {
                Some(m) => m,
                None => continue,
            };
            if let ModeFilter::Only(want) = filter {
                if mode != want {
                    continue;
                }
            }
            let a = *nodes.get_by_left(&r.start_terminal).unwrap();
            let b = *nodes.get_by_left(&r.end_terminal).unwrap();
            // connection lines are undirected: one hop per direction,
            // dwell charged on entering the target terminal
            for &(from, to) in &[(a, b), (b, a)] {
                let e = edges.len();
                edges.push(Hop {
                    route: ri,
                    from,
                    to,
                    weight: r.attributes.distance + dwell[to],
                });
                adjacency[from].push(e);
            }
        }
        Search {
            nodes,
            edges,
            adjacency,
        }
    }

    fn dijkstra(
        &self,
        src: usize,
        dst: usize,
        banned_edges: &HashSet<usize>,
        banned_nodes: &HashSet<usize>,
    ) -> Option<FoundPath> {
        use std::cmp::Reverse;
        use std::collections::BinaryHeap;

        let n = self.adjacency.len();
        let mut dist = vec![std::f64::INFINITY; n];
        let mut prev: Vec<Option<usize>> = vec![None; n];
        let mut heap = BinaryHeap::new();
        dist[src] = 0.0;
        heap.push(Reverse((OrderedFloat(0.0), src)));
        while let Some(Reverse((OrderedFloat(d), u))) = heap.pop() {
            if d > dist[u] {
                continue;
            }
            if u == dst {
                break;
            }
            for &e in &self.adjacency[u] {
                if banned_edges.contains(&e) {
                    continue;
                }
                let hop = self.edges[e];
                if banned_nodes.contains(&hop.to) {
                    continue;
                }
                let nd = d + hop.weight;
                if nd < dist[hop.to] {
                    dist[hop.to] = nd;
                    prev[hop.to] = Some(e);
                    heap.push(Reverse((OrderedFloat(nd), hop.to)));
                }
            }
        }
        if !dist[dst].is_finite() {
            return None;
        }
        let mut edges: SmallVec<[usize; 8]> = SmallVec::new();
        let mut at = dst;
        while at != src {
            let e = prev[at]?;
            edges.push(e);
            at = self.edges[e].from;
        }
        edges.reverse();
        let mut nodes: NodeSeq = SmallVec::new();
        nodes.push(src);
        for &e in &edges {
            nodes.push(self.edges[e].to);
        }
        Some(FoundPath {
            cost: dist[dst],
            nodes,
            edges,
        })
    }

    /// Yen's algorithm for the K cheapest loop-free paths.
    fn top_k(&self, src: &str, dst: &str, k: usize) -> Vec<FoundPath> {
        let src = match self.nodes.get_by_left(src) {
            Some(&n) => n,
            None => return Vec::new(),
        };
        let dst = match self.nodes.get_by_left(dst) {
            Some(&n) => n,
            None => return Vec::new(),
        };
        let mut result: Vec<FoundPath> = Vec::new();
        let first = match self.dijkstra(src, dst, &HashSet::new(), &HashSet::new()) {
            Some(p) => p,
            None => return Vec::new(),
        };
        result.push(first);

        let mut candidates: Vec<FoundPath> = Vec::new();
        let mut seen: HashSet<NodeSeq> = HashSet::new();
        seen.insert(result[0].nodes.clone());

        while result.len() < k {
            let prev_path = result.last().unwrap().clone();
            for i in 0..prev_path.nodes.len() - 1 {
                let spur_node = prev_path.nodes[i];
                let root_edges = &prev_path.edges[..i];
                let root_cost: f64 = root_edges.iter().map(|&e| self.edges[e].weight).sum();

                let mut banned_edges = HashSet::new();
                for p in result.iter().chain(candidates.iter()) {
                    if p.nodes.len() > i && p.nodes[..i + 1] == prev_path.nodes[..i + 1] {
                        if let Some(&e) = p.edges.get(i) {
                            banned_edges.insert(e);
                            // also ban the reverse twin so the spur cannot
                            // reuse the same route segment backwards
                            banned_edges.insert(twin(e));
                        }
                    }
                }
                let banned_nodes: HashSet<usize> =
                    prev_path.nodes[..i].iter().cloned().collect();

                if let Some(spur) = self.dijkstra(spur_node, dst, &banned_edges, &banned_nodes) {
                    let mut nodes: NodeSeq = prev_path.nodes[..i].iter().cloned().collect();
                    nodes.extend(spur.nodes.iter().cloned());
                    if seen.contains(&nodes) {
                        continue;
                    }
                    let mut edges: SmallVec<[usize; 8]> =
                        root_edges.iter().cloned().collect();
                    edges.extend(spur.edges.iter().cloned());
                    seen.insert(nodes.clone());
                    candidates.push(FoundPath {
                        cost: root_cost + spur.cost,
                        nodes,
                        edges,
                    });
                }
            }
            if candidates.is_empty() {
                break;
            }
            candidates.sort_by_key(|p| OrderedFloat(p.cost));
            result.push(candidates.remove(0));
        }
        result
    }

    fn to_record(&self, state: &GraphState, path: FoundPath) -> PathRecord {
        let mut segments = Vec::new();
        let mut total = SegmentAttributes::default();
        for &e in &path.edges {
            let hop = self.edges[e];
            let route = &state.routes[hop.route];
            let mut seg = route.clone();
            // orient the segment along the traversal direction
            seg.start_terminal = self.nodes.get_by_right(&hop.from).unwrap().clone();
            seg.end_terminal = self.nodes.get_by_right(&hop.to).unwrap().clone();
            total.distance += seg.attributes.distance;
            total.travel_time += seg.attributes.travel_time;
            total.cost += seg.attributes.cost;
            segments.push(seg);
        }
        PathRecord {
            segments,
            total_distance: total.distance,
            total_travel_time: total.travel_time,
            total_cost: total.cost,
        }
    }
}

/// Index of the opposite-direction hop of the same route segment. Hops
/// are pushed in pairs.
fn twin(e: usize) -> usize {
    if e % 2 == 0 {
        e + 1
    } else {
        e - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terminal(id: &str) -> TerminalRecord {
        TerminalRecord {
            names: vec![id.to_string(), format!("Terminal {}", id)],
            region: "Default Region".into(),
            interfaces: BTreeMap::new(),
            config: serde_json::json!({}),
        }
    }

    fn segment(id: &str, from: &str, to: &str, mode: &str, distance: f64) -> RouteSegmentRecord {
        RouteSegmentRecord {
            id: id.to_string(),
            start_terminal: from.to_string(),
            end_terminal: to.to_string(),
            mode: mode.to_string(),
            attributes: SegmentAttributes {
                distance,
                ..Default::default()
            },
        }
    }

    fn diamond() -> InProcessTerminalGraph {
        // O -Truck-> X (10) -Train-> D (100)
        // O -Truck-> Y (5)  -Train-> D (120)
        let s = InProcessTerminalGraph::new();
        for t in &["O", "X", "Y", "D"] {
            assert!(s.add_terminal(&terminal(t)).unwrap());
        }
        assert!(s.add_route(&segment("s1", "O", "X", "Truck", 10.0)).unwrap());
        assert!(s.add_route(&segment("s2", "O", "Y", "Truck", 5.0)).unwrap());
        assert!(s.add_route(&segment("s3", "X", "D", "Train", 100.0)).unwrap());
        assert!(s.add_route(&segment("s4", "Y", "D", "Train", 120.0)).unwrap());
        s
    }

    #[test]
    fn top_k_ordering_and_totals() {
        let s = diamond();
        let paths = s
            .find_top_paths("O", "D", 3, ModeFilter::Any, false)
            .unwrap();
        // only two exist; sorted ascending by accumulated distance
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].terminal_sequence(), vec!["O", "X", "D"]);
        assert!((paths[0].total_distance - 110.0).abs() < 1e-9);
        assert_eq!(paths[1].terminal_sequence(), vec!["O", "Y", "D"]);
        assert!((paths[1].total_distance - 125.0).abs() < 1e-9);
    }

    #[test]
    fn segments_are_oriented_along_traversal() {
        let s = InProcessTerminalGraph::new();
        for t in &["A", "B"] {
            s.add_terminal(&terminal(t)).unwrap();
        }
        // stored B -> A, traversed A -> B
        s.add_route(&segment("s", "B", "A", "Ship", 7.0)).unwrap();
        let paths = s
            .find_top_paths("A", "B", 1, ModeFilter::Any, true)
            .unwrap();
        assert_eq!(paths[0].segments[0].start_terminal, "A");
        assert_eq!(paths[0].segments[0].end_terminal, "B");
    }

    #[test]
    fn mode_filter() {
        let s = diamond();
        let paths = s
            .find_top_paths("O", "D", 3, ModeFilter::Only(Mode::Truck), true)
            .unwrap();
        assert!(paths.is_empty());
    }

    #[test]
    fn dwell_participates_unless_ignored() {
        let s = InProcessTerminalGraph::new();
        for t in &["O", "D"] {
            s.add_terminal(&terminal(t)).unwrap();
        }
        let mut slow_hub = terminal("H1");
        slow_hub.config = serde_json::json!({
            "dwell_time": {"method": "fixed", "parameters": {"average": 1000.0}}
        });
        s.add_terminal(&slow_hub).unwrap();
        s.add_terminal(&terminal("H2")).unwrap();
        s.add_route(&segment("a1", "O", "H1", "Truck", 10.0)).unwrap();
        s.add_route(&segment("a2", "H1", "D", "Truck", 10.0)).unwrap();
        s.add_route(&segment("b1", "O", "H2", "Truck", 30.0)).unwrap();
        s.add_route(&segment("b2", "H2", "D", "Truck", 30.0)).unwrap();

        let with_dwell = s.find_top_paths("O", "D", 1, ModeFilter::Any, false).unwrap();
        assert_eq!(with_dwell[0].terminal_sequence(), vec!["O", "H2", "D"]);
        let without = s.find_top_paths("O", "D", 1, ModeFilter::Any, true).unwrap();
        assert_eq!(without[0].terminal_sequence(), vec!["O", "H1", "D"]);
    }

    #[test]
    fn reset_clears_everything() {
        let s = diamond();
        assert_eq!(s.terminal_count(), 4);
        assert!(s.reset_server().unwrap());
        assert_eq!(s.terminal_count(), 0);
        assert_eq!(s.route_count(), 0);
        assert!(!s.get_terminal_status("O").unwrap());
    }

    #[test]
    fn add_route_rejects_unknown_endpoints() {
        let s = InProcessTerminalGraph::new();
        s.add_terminal(&terminal("A")).unwrap();
        assert!(!s.add_route(&segment("s", "A", "missing", "Truck", 1.0)).unwrap());
        assert_eq!(s.route_count(), 0);
    }

    #[test]
    fn no_paths_between_disconnected_components() {
        let s = InProcessTerminalGraph::new();
        for t in &["A", "B", "C"] {
            s.add_terminal(&terminal(t)).unwrap();
        }
        s.add_route(&segment("s", "A", "B", "Truck", 1.0)).unwrap();
        let paths = s.find_top_paths("A", "C", 2, ModeFilter::Any, true).unwrap();
        assert!(paths.is_empty());
    }

    #[test]
    fn k_shortest_on_parallel_routes() {
        let s = InProcessTerminalGraph::new();
        for t in &["A", "M1", "M2", "M3", "B"] {
            s.add_terminal(&terminal(t)).unwrap();
        }
        for (i, (mid, d)) in [("M1", 1.0), ("M2", 2.0), ("M3", 3.0)].iter().enumerate() {
            s.add_route(&segment(&format!("in{}", i), "A", mid, "Truck", *d))
                .unwrap();
            s.add_route(&segment(&format!("out{}", i), mid, "B", "Truck", 10.0))
                .unwrap();
        }
        let paths = s.find_top_paths("A", "B", 2, ModeFilter::Any, true).unwrap();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].terminal_sequence(), vec!["A", "M1", "B"]);
        assert_eq!(paths[1].terminal_sequence(), vec!["A", "M2", "B"]);
        assert!(paths[0].total_distance <= paths[1].total_distance);
    }
}
