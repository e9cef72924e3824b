//! Modal cursor states of the editor. One state variable decides what a
//! click does; entering any mode resets the others, Escape returns to
//! Idle, and switching between the region and global tabs resets
//! everything.

use crate::coords::PtS;
use crate::document::objects::{Entity, ItemId, Mode};
use crate::document::scene::SceneKind;
use crate::document::Document;
use crate::errors::{ErrorKind, PlanError, PlanResult};
use crate::measure::{MeasureTool, Measurement};
use log::*;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolMode {
    Idle,
    /// Pick two terminals to create a typed connection line. After a
    /// successful connection the second terminal becomes the first of
    /// the next one (chaining).
    Connect { first: Option<ItemId> },
    /// Pick a terminal, then a map node to link to it.
    LinkTerminalToNode { terminal: Option<ItemId> },
    /// Pick a map node to clear its linked terminal.
    UnlinkTerminalFromNode,
    /// Two-click distance measurement.
    Measure,
    /// Global scene: pick a mirror to edit its shared coordinates.
    SetGlobalPosition,
}

#[derive(Clone, Debug)]
pub enum ClickOutcome {
    Nothing,
    Selected(Vec<ItemId>),
    ConnectionStarted(ItemId),
    ConnectionCreated(ItemId),
    LinkArmed(ItemId),
    Linked { node: ItemId, terminal: ItemId },
    Unlinked(ItemId),
    MeasurementStarted,
    MeasurementCompleted(Measurement),
    /// The UI opens the coordinate editor for this mirror and writes the
    /// new shared position through `Document::set_global_position`.
    GlobalPositionPicked(ItemId),
}

pub struct Interaction {
    pub tab: SceneKind,
    pub mode: ToolMode,
    /// Type used for the next connection line.
    pub connection_type: Mode,
    pub measure: MeasureTool,
    pub hit_tolerance: f64,
}

impl Interaction {
    pub fn new() -> Self {
        Interaction {
            tab: SceneKind::Region,
            mode: ToolMode::Idle,
            connection_type: Mode::Truck,
            measure: MeasureTool::new(),
            hit_tolerance: 8.0,
        }
    }

    // -------------------------------------------------- mode toggles

    fn toggle(&mut self, mode: ToolMode) {
        self.measure.cancel();
        if std::mem::discriminant(&self.mode) == std::mem::discriminant(&mode) {
            self.mode = ToolMode::Idle;
        } else {
            self.mode = mode;
        }
    }

    pub fn toggle_connect(&mut self) {
        self.toggle(ToolMode::Connect { first: None });
    }

    pub fn toggle_link(&mut self) {
        self.toggle(ToolMode::LinkTerminalToNode { terminal: None });
    }

    pub fn toggle_unlink(&mut self) {
        self.toggle(ToolMode::UnlinkTerminalFromNode);
    }

    pub fn toggle_measure(&mut self) {
        self.toggle(ToolMode::Measure);
    }

    pub fn toggle_set_global_position(&mut self) {
        self.toggle(ToolMode::SetGlobalPosition);
    }

    /// Escape: back to Idle, partial selections dropped.
    pub fn escape(&mut self, doc: &mut Document) {
        self.mode = ToolMode::Idle;
        self.measure.cancel();
        self.scene_mut(doc).clear_selection();
    }

    /// Switching between the region and global tabs resets all modes.
    pub fn set_tab(&mut self, doc: &mut Document, tab: SceneKind) {
        if self.tab != tab {
            self.tab = tab;
            self.mode = ToolMode::Idle;
            self.measure.cancel();
            doc.region_scene.clear_selection();
            doc.global_scene.clear_selection();
        }
    }

    fn scene_mut<'a>(&self, doc: &'a mut Document) -> &'a mut crate::document::scene::Scene {
        match self.tab {
            SceneKind::Region => &mut doc.region_scene,
            SceneKind::Global => &mut doc.global_scene,
        }
    }

    fn scene<'a>(&self, doc: &'a Document) -> &'a crate::document::scene::Scene {
        match self.tab {
            SceneKind::Region => &doc.region_scene,
            SceneKind::Global => &doc.global_scene,
        }
    }

    fn hit_of(
        &self,
        doc: &Document,
        p: PtS,
        mut pred: impl FnMut(&Entity) -> bool,
    ) -> Option<ItemId> {
        let scene = self.scene(doc);
        scene
            .items_at(p, self.hit_tolerance)
            .into_iter()
            .find(|id| scene.get_item_by_id(id).map(&mut pred).unwrap_or(false))
    }

    /// A connectable endpoint on the current tab: terminals on the
    /// region scene, mirrors on the global scene.
    fn connectable_at(&self, doc: &Document, p: PtS) -> Option<ItemId> {
        match self.tab {
            SceneKind::Region => self.hit_of(doc, p, |e| e.as_terminal().is_some()),
            SceneKind::Global => self.hit_of(doc, p, |e| e.as_global_terminal().is_some()),
        }
    }

    // --------------------------------------------------------- click

    pub fn click(&mut self, doc: &mut Document, p: PtS) -> PlanResult<ClickOutcome> {
        match self.mode.clone() {
            ToolMode::Idle => {
                let hits = self.scene(doc).items_at(p, self.hit_tolerance);
                let scene = self.scene_mut(doc);
                scene.clear_selection();
                if let Some(top) = hits.first() {
                    scene.select(top);
                }
                Ok(if hits.is_empty() {
                    ClickOutcome::Nothing
                } else {
                    ClickOutcome::Selected(hits)
                })
            }

            ToolMode::Connect { first } => {
                let hit = match self.connectable_at(doc, p) {
                    Some(hit) => hit,
                    None => return Ok(ClickOutcome::Nothing),
                };
                match first {
                    None => {
                        self.mode = ToolMode::Connect {
                            first: Some(hit.clone()),
                        };
                        self.scene_mut(doc).select(&hit);
                        Ok(ClickOutcome::ConnectionStarted(hit))
                    }
                    Some(first) => {
                        let mode = self.connection_type;
                        match doc.connect_terminals(self.tab, &first, &hit, mode) {
                            Ok(line) => {
                                // chain: the second terminal starts the
                                // next connection
                                self.mode = ToolMode::Connect {
                                    first: Some(hit.clone()),
                                };
                                let scene = self.scene_mut(doc);
                                scene.clear_selection();
                                scene.select(&hit);
                                Ok(ClickOutcome::ConnectionCreated(line))
                            }
                            Err(e) => {
                                // the first endpoint stays selected so the
                                // operator can retry
                                self.mode = ToolMode::Connect { first: Some(first) };
                                Err(e)
                            }
                        }
                    }
                }
            }

            ToolMode::LinkTerminalToNode { terminal } => {
                if let Some(t) = self.hit_of(doc, p, |e| e.as_terminal().is_some()) {
                    self.mode = ToolMode::LinkTerminalToNode {
                        terminal: Some(t.clone()),
                    };
                    return Ok(ClickOutcome::LinkArmed(t));
                }
                if let Some(node) = self.hit_of(doc, p, |e| e.as_map_node().is_some()) {
                    let terminal = match terminal {
                        Some(t) => t,
                        None => {
                            return Err(PlanError::new(
                                ErrorKind::NoConnections,
                                "select a terminal before picking a map node",
                            ))
                        }
                    };
                    doc.link_terminal_to_node(&node, &terminal)?;
                    // automatic exit after a successful link
                    self.mode = ToolMode::Idle;
                    return Ok(ClickOutcome::Linked { node, terminal });
                }
                Ok(ClickOutcome::Nothing)
            }

            ToolMode::UnlinkTerminalFromNode => {
                if let Some(node) = self.hit_of(doc, p, |e| e.as_map_node().is_some()) {
                    doc.unlink_node(&node)?;
                    self.mode = ToolMode::Idle;
                    return Ok(ClickOutcome::Unlinked(node));
                }
                Ok(ClickOutcome::Nothing)
            }

            ToolMode::Measure => match self.measure.click(p) {
                None => Ok(ClickOutcome::MeasurementStarted),
                Some(m) => {
                    debug!("measured {}", m.label());
                    // the finished overlay stays in the scene
                    self.mode = ToolMode::Idle;
                    Ok(ClickOutcome::MeasurementCompleted(m))
                }
            },

            ToolMode::SetGlobalPosition => {
                if self.tab != SceneKind::Global {
                    return Ok(ClickOutcome::Nothing);
                }
                if let Some(mirror) = self.hit_of(doc, p, |e| e.as_global_terminal().is_some()) {
                    self.mode = ToolMode::Idle;
                    return Ok(ClickOutcome::GlobalPositionPicked(mirror));
                }
                Ok(ClickOutcome::Nothing)
            }
        }
    }
}

impl Default for Interaction {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::BackgroundJobs;
    use crate::document::objects::TerminalType;
    use crate::document::regions::DEFAULT_REGION;
    use nalgebra_glm as glm;

    fn setup() -> (Document, Interaction, ItemId, ItemId) {
        let mut doc = Document::empty(BackgroundJobs::new());
        let a = doc
            .add_terminal("A", TerminalType::SeaPort, DEFAULT_REGION, glm::vec2(0.0, 0.0))
            .unwrap();
        let b = doc
            .add_terminal("B", TerminalType::IntermodalLand, DEFAULT_REGION, glm::vec2(100.0, 0.0))
            .unwrap();
        (doc, Interaction::new(), a, b)
    }

    #[test]
    fn connect_two_terminals_then_duplicate_errors() {
        let (mut doc, mut ui, a, b) = setup();
        ui.connection_type = Mode::Rail;
        ui.toggle_connect();

        match ui.click(&mut doc, glm::vec2(0.0, 0.0)).unwrap() {
            ClickOutcome::ConnectionStarted(id) => assert_eq!(id, a),
            other => panic!("unexpected outcome {:?}", other),
        }
        match ui.click(&mut doc, glm::vec2(100.0, 0.0)).unwrap() {
            ClickOutcome::ConnectionCreated(_) => {}
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(doc.region_scene.connections().len(), 1);

        // clicking A then B again: chained first is currently B, so
        // restart the pair deliberately
        ui.toggle_connect();
        ui.toggle_connect();
        ui.click(&mut doc, glm::vec2(0.0, 0.0)).unwrap();
        let err = ui.click(&mut doc, glm::vec2(100.0, 0.0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateConnection);
        assert_eq!(doc.region_scene.connections().len(), 1);
        // first endpoint is retained for a retry
        assert_eq!(ui.mode, ToolMode::Connect { first: Some(a.clone()) });
        let _ = b;
    }

    #[test]
    fn connect_chains_through_terminals() {
        let (mut doc, mut ui, _, b) = setup();
        let c = doc
            .add_terminal("C", TerminalType::TruckParking, DEFAULT_REGION, glm::vec2(200.0, 0.0))
            .unwrap();
        ui.toggle_connect();
        ui.click(&mut doc, glm::vec2(0.0, 0.0)).unwrap();
        ui.click(&mut doc, glm::vec2(100.0, 0.0)).unwrap();
        // previous second terminal chains as the new first
        assert_eq!(ui.mode, ToolMode::Connect { first: Some(b.clone()) });
        ui.click(&mut doc, glm::vec2(200.0, 0.0)).unwrap();
        assert_eq!(doc.region_scene.connections().len(), 2);
        assert_eq!(ui.mode, ToolMode::Connect { first: Some(c) });
    }

    #[test]
    fn self_connection_keeps_first_selected() {
        let (mut doc, mut ui, a, _) = setup();
        ui.toggle_connect();
        ui.click(&mut doc, glm::vec2(0.0, 0.0)).unwrap();
        let err = ui.click(&mut doc, glm::vec2(0.0, 0.0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::SelfConnection);
        assert_eq!(ui.mode, ToolMode::Connect { first: Some(a.clone()) });
        assert_eq!(doc.region_scene.selected_items(), vec![a]);
    }

    #[test]
    fn link_flow_and_premature_node_click() {
        let (mut doc, mut ui, a, _) = setup();
        let file = crate::document::network::NetworkFile {
            nodes: vec![crate::document::network::NetworkFileNode {
                id: 7,
                lon: 0.5,
                lat: 0.0,
            }],
            links: vec![],
        };
        doc.import_network("rail1", Mode::Rail, DEFAULT_REGION, &file)
            .unwrap();
        let node_scene_id = doc.networks["rail1"].node_item(7).unwrap().clone();
        let node_pos = doc
            .region_scene
            .get_item_by_id(&node_scene_id)
            .unwrap()
            .pos()
            .unwrap();

        ui.toggle_link();
        // node before terminal is a user-visible error
        let err = ui.click(&mut doc, node_pos).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoConnections);

        match ui.click(&mut doc, glm::vec2(0.0, 0.0)).unwrap() {
            ClickOutcome::LinkArmed(id) => assert_eq!(id, a),
            other => panic!("unexpected outcome {:?}", other),
        }
        match ui.click(&mut doc, node_pos) {
            Ok(ClickOutcome::Linked { node, terminal }) => {
                assert_eq!(node, node_scene_id);
                assert_eq!(terminal, a);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(ui.mode, ToolMode::Idle);
        assert_eq!(doc.linked_nodes(&a, Mode::Rail), vec![("rail1".to_string(), 7)]);
    }

    #[test]
    fn unlink_clears_and_exits() {
        let (mut doc, mut ui, a, _) = setup();
        let file = crate::document::network::NetworkFile {
            nodes: vec![crate::document::network::NetworkFileNode {
                id: 1,
                lon: 0.02,
                lat: 0.0,
            }],
            links: vec![],
        };
        doc.import_network("r", Mode::Rail, DEFAULT_REGION, &file)
            .unwrap();
        let node_id = doc.networks["r"].node_item(1).unwrap().clone();
        doc.link_terminal_to_node(&node_id, &a).unwrap();

        let node_pos = doc
            .region_scene
            .get_item_by_id(&node_id)
            .unwrap()
            .pos()
            .unwrap();
        ui.toggle_unlink();
        match ui.click(&mut doc, node_pos).unwrap() {
            ClickOutcome::Unlinked(id) => assert_eq!(id, node_id),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(ui.mode, ToolMode::Idle);
        assert!(doc.linked_nodes(&a, Mode::Rail).is_empty());
    }

    #[test]
    fn modes_are_mutually_exclusive() {
        let (_, mut ui, _, _) = setup();
        ui.toggle_connect();
        assert!(matches!(ui.mode, ToolMode::Connect { .. }));
        ui.toggle_measure();
        assert_eq!(ui.mode, ToolMode::Measure);
        ui.toggle_measure();
        assert_eq!(ui.mode, ToolMode::Idle);
    }

    #[test]
    fn escape_resets_mode_and_selection() {
        let (mut doc, mut ui, _, _) = setup();
        ui.toggle_connect();
        ui.click(&mut doc, glm::vec2(0.0, 0.0)).unwrap();
        assert!(!doc.region_scene.selected_items().is_empty());
        ui.escape(&mut doc);
        assert_eq!(ui.mode, ToolMode::Idle);
        assert!(doc.region_scene.selected_items().is_empty());
    }

    #[test]
    fn tab_switch_resets_modes() {
        let (mut doc, mut ui, _, _) = setup();
        ui.toggle_connect();
        ui.set_tab(&mut doc, SceneKind::Global);
        assert_eq!(ui.mode, ToolMode::Idle);
        assert_eq!(ui.tab, SceneKind::Global);
    }

    #[test]
    fn measure_completes_and_keeps_overlay() {
        let (mut doc, mut ui, _, _) = setup();
        ui.toggle_measure();
        match ui.click(&mut doc, crate::coords::geodetic_to_scene(0.0, 0.0)).unwrap() {
            ClickOutcome::MeasurementStarted => {}
            other => panic!("unexpected outcome {:?}", other),
        }
        match ui.click(&mut doc, crate::coords::geodetic_to_scene(0.0, 1.0)).unwrap() {
            ClickOutcome::MeasurementCompleted(m) => assert_eq!(m.label(), "110.6 km"),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(ui.mode, ToolMode::Idle);
        assert_eq!(ui.measure.completed.len(), 1);
    }

    #[test]
    fn set_global_position_picks_mirror() {
        let (mut doc, mut ui, a, _) = setup();
        let mirror = doc.mirror_of(&a).unwrap();
        let pos = doc
            .global_scene
            .get_item_by_id(&mirror)
            .unwrap()
            .pos()
            .unwrap();
        ui.set_tab(&mut doc, SceneKind::Global);
        ui.toggle_set_global_position();
        match ui.click(&mut doc, pos).unwrap() {
            ClickOutcome::GlobalPositionPicked(id) => assert_eq!(id, mirror),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(ui.mode, ToolMode::Idle);
        doc.set_global_position(&mirror, 5.0, 6.0);
        let g = doc
            .global_scene
            .get_item_by_id(&mirror)
            .and_then(|e| e.as_global_terminal())
            .unwrap();
        assert_eq!((g.lon, g.lat), (5.0, 6.0));
    }
}
