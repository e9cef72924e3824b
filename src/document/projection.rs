//! Flattens the edited graph into the terminal-graph service's records:
//! one terminal record per terminal referenced by any connection line in
//! either scene, one route segment per connection line.

use crate::backend::terminal_graph::{
    RouteSegmentRecord, SegmentAttributes, TerminalGraphService, TerminalRecord, LAND_SIDE,
    SEA_SIDE,
};
use crate::document::objects::*;
use crate::document::scene::Scene;
use crate::document::Document;
use crate::errors::{ErrorKind, PlanError, PlanResult};
use log::*;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProjectionOutput {
    pub terminals: Vec<TerminalRecord>,
    pub segments: Vec<RouteSegmentRecord>,
}

/// Resolve a connection-line endpoint to the underlying terminal id:
/// region-scene lines reference terminals directly, global-scene lines
/// reference mirrors.
fn endpoint_terminal(scene: &Scene, id: &str) -> Option<ItemId> {
    match scene.get_item_by_id(id)? {
        Entity::Terminal(_) => Some(id.to_string()),
        Entity::GlobalTerminal(g) => Some(g.terminal.clone()),
        _ => None,
    }
}

fn terminal_record(id: &str, t: &Terminal) -> TerminalRecord {
    let mode_names = |modes: &BTreeSet<Mode>| -> BTreeSet<String> {
        modes.iter().map(|m| m.service_name().to_string()).collect()
    };
    let mut interfaces = BTreeMap::new();
    interfaces.insert(LAND_SIDE.to_string(), mode_names(&t.interfaces.land_side));
    interfaces.insert(SEA_SIDE.to_string(), mode_names(&t.interfaces.sea_side));
    TerminalRecord {
        names: vec![id.to_string(), t.name.clone()],
        region: t.region.clone(),
        interfaces,
        config: serde_json::to_value(&t.blocks).unwrap_or(serde_json::Value::Null),
    }
}

fn segment_record(id: &str, line: &ConnectionLine, a: &str, b: &str) -> RouteSegmentRecord {
    RouteSegmentRecord {
        id: id.to_string(),
        start_terminal: a.to_string(),
        end_terminal: b.to_string(),
        mode: line.mode.service_name().to_string(),
        attributes: SegmentAttributes {
            distance: line.attrs.distance,
            travel_time: line.attrs.travel_time,
            cost: line.attrs.cost,
            carbon_emissions: line.attrs.carbon_emissions,
            energy_consumption: line.attrs.energy_consumption,
            risk: line.attrs.risk,
        },
    }
}

/// Pure flatten of the current graph. Deterministic: terminals sorted by
/// id, segments in scene order (region scene first), so projecting an
/// unchanged graph twice yields identical output.
pub fn project(doc: &Document) -> ProjectionOutput {
    let mut terminals: BTreeMap<ItemId, TerminalRecord> = BTreeMap::new();
    let mut segments = Vec::new();

    for scene in &[&doc.region_scene, &doc.global_scene] {
        for (line_id, line) in scene.connections() {
            let a = endpoint_terminal(scene, &line.a);
            let b = endpoint_terminal(scene, &line.b);
            let (a, b) = match (a, b) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    warn!("connection {} references a missing endpoint", line_id);
                    continue;
                }
            };
            for tid in &[&a, &b] {
                if !terminals.contains_key(tid.as_str()) {
                    if let Some(t) = doc.get_terminal(tid) {
                        terminals.insert(tid.to_string(), terminal_record(tid, t));
                    }
                }
            }
            segments.push(segment_record(&line_id, line, &a, &b));
        }
    }
    ProjectionOutput {
        terminals: terminals.into_iter().map(|(_, r)| r).collect(),
        segments,
    }
}

/// Reset the server, then push every record. Fails fast on the first
/// rejection.
pub fn emit(output: &ProjectionOutput, service: &dyn TerminalGraphService) -> PlanResult<usize> {
    if !service.reset_server()? {
        return Err(PlanError::new(
            ErrorKind::ResetFailed,
            "terminal-graph server rejected the reset",
        ));
    }
    for t in &output.terminals {
        if !service.add_terminal(t)? {
            return Err(PlanError::new(
                ErrorKind::ServiceUnavailable,
                format!("terminal record {} rejected", t.id()),
            ));
        }
    }
    let mut added = 0;
    for s in &output.segments {
        if !service.add_route(s)? {
            return Err(PlanError::new(
                ErrorKind::ServiceUnavailable,
                format!("route segment {} rejected", s.id),
            ));
        }
        added += 1;
    }
    Ok(added)
}
