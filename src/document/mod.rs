pub mod analysis;
pub mod fanout;
pub mod network;
pub mod objects;
pub mod pathfind;
pub mod projection;
pub mod regions;
pub mod scene;
pub mod vehicles;

use crate::app::BackgroundJobs;
use crate::coords::{self, PtS};
use crate::errors::{ErrorKind, PlanError, PlanResult};
use crate::measure::vincenty_distance;
use crate::util::{new_item_id, unordered_pair};
use log::*;
use std::collections::HashMap;

use network::{Network, NetworkFile};
use objects::*;
use regions::RegionRegistry;
use scene::{Scene, SceneKind};
use vehicles::VehicleRegistry;

/// The edited state of one planning project: regions, the two scenes,
/// the imported networks and the vehicle pool, plus the background
/// planning pipeline.
pub struct Document {
    pub regions: RegionRegistry,
    pub region_scene: Scene,
    pub global_scene: Scene,
    pub networks: HashMap<String, Network>,
    pub vehicles: VehicleRegistry,
    pub analysis: analysis::Analysis,
}

impl Document {
    pub fn empty(bg: BackgroundJobs) -> Self {
        Document {
            regions: RegionRegistry::new(),
            region_scene: Scene::new(SceneKind::Region),
            global_scene: Scene::new(SceneKind::Global),
            networks: HashMap::new(),
            vehicles: VehicleRegistry::with_defaults(),
            analysis: analysis::Analysis::new(bg),
        }
    }

    fn scene(&self, kind: SceneKind) -> &Scene {
        match kind {
            SceneKind::Region => &self.region_scene,
            SceneKind::Global => &self.global_scene,
        }
    }

    fn scene_mut(&mut self, kind: SceneKind) -> &mut Scene {
        match kind {
            SceneKind::Region => &mut self.region_scene,
            SceneKind::Global => &mut self.global_scene,
        }
    }

    pub fn refresh_visibility(&mut self) {
        let current = self.regions.current_region().to_string();
        self.region_scene.apply_region_filter(&current);
    }

    // ------------------------------------------------------- regions

    pub fn add_region(&mut self, name: &str) -> PlanResult<()> {
        self.regions.add_region(name)?;
        Ok(())
    }

    /// Remove a region, reassigning every entity that pointed at it to
    /// `fallback`.
    pub fn remove_region(&mut self, name: &str, fallback: &str) -> PlanResult<()> {
        self.regions.remove_region(name, fallback)?;
        for scene in &mut [&mut self.region_scene, &mut self.global_scene] {
            let affected: Vec<ItemId> = scene
                .iter()
                .filter(|(_, e)| e.region() == name)
                .map(|(id, _)| id.clone())
                .collect();
            for id in affected {
                if let Some(e) = scene.get_item_by_id_mut(&id) {
                    e.set_region(fallback);
                }
            }
        }
        for net in self.networks.values_mut() {
            if net.region == name {
                net.region = fallback.to_string();
            }
        }
        self.refresh_visibility();
        Ok(())
    }

    /// Rename a region; all entity references follow.
    pub fn rename_region(&mut self, old: &str, new: &str) -> PlanResult<()> {
        self.regions.rename_region(old, new)?;
        for scene in &mut [&mut self.region_scene, &mut self.global_scene] {
            let affected: Vec<ItemId> = scene
                .iter()
                .filter(|(_, e)| e.region() == old)
                .map(|(id, _)| id.clone())
                .collect();
            for id in affected {
                if let Some(e) = scene.get_item_by_id_mut(&id) {
                    e.set_region(new);
                }
            }
        }
        for net in self.networks.values_mut() {
            if net.region == old {
                net.region = new.to_string();
            }
        }
        self.refresh_visibility();
        Ok(())
    }

    pub fn set_current_region(&mut self, name: &str) -> bool {
        let ok = self.regions.set_current_region(name);
        if ok {
            self.refresh_visibility();
        }
        ok
    }

    /// Create or move the region's center point entity and store its
    /// coordinates on the region record.
    pub fn set_region_center(
        &mut self,
        region: &str,
        lon: f64,
        lat: f64,
        shared_lon: f64,
        shared_lat: f64,
    ) -> PlanResult<ItemId> {
        if !self.regions.contains(region) {
            return Err(PlanError::new(
                ErrorKind::InvalidConfig,
                format!("no region named \"{}\"", region),
            ));
        }
        let pos = coords::geodetic_to_scene(lon, lat);
        let existing = self
            .regions
            .get(region)
            .and_then(|r| r.center_point.clone());
        let id = match existing {
            Some(id) => {
                if let Some(c) = self
                    .region_scene
                    .get_item_by_id_mut(&id)
                    .and_then(|e| e.as_region_center_mut())
                {
                    c.lon = lon;
                    c.lat = lat;
                    c.shared_lon = shared_lon;
                    c.shared_lat = shared_lat;
                    c.pos = pos;
                }
                id
            }
            None => {
                let id = new_item_id();
                self.region_scene.add_item_with_id(
                    id.clone(),
                    Entity::RegionCenter(RegionCenter {
                        region: region.to_string(),
                        lon,
                        lat,
                        shared_lon,
                        shared_lat,
                        pos,
                    }),
                );
                id
            }
        };
        {
            let rec = self.regions.get_mut(region).unwrap();
            rec.center_point = Some(id.clone());
            rec.lon = lon;
            rec.lat = lat;
            rec.shared_lon = shared_lon;
            rec.shared_lat = shared_lat;
        }
        self.refresh_visibility();
        Ok(id)
    }

    /// Set or replace the region's background photo. At most one photo
    /// per region.
    pub fn set_background_photo(
        &mut self,
        region: &str,
        photo: BackgroundPhoto,
    ) -> PlanResult<ItemId> {
        if !self.regions.contains(region) {
            return Err(PlanError::new(
                ErrorKind::InvalidConfig,
                format!("no region named \"{}\"", region),
            ));
        }
        if let Some(old) = self.regions.get(region).and_then(|r| r.photo.clone()) {
            self.region_scene.remove_item_with_id(&old);
        }
        let id = new_item_id();
        let mut photo = photo;
        photo.region = region.to_string();
        self.region_scene
            .add_item_with_id(id.clone(), Entity::Photo(photo));
        self.regions.get_mut(region).unwrap().photo = Some(id.clone());
        self.refresh_visibility();
        Ok(id)
    }

    pub fn remove_background_photo(&mut self, region: &str) {
        if let Some(old) = self.regions.get(region).and_then(|r| r.photo.clone()) {
            self.region_scene.remove_item_with_id(&old);
        }
        if let Some(rec) = self.regions.get_mut(region) {
            rec.photo = None;
        }
    }

    // ----------------------------------------------------- terminals

    pub fn add_terminal(
        &mut self,
        name: &str,
        ttype: TerminalType,
        region: &str,
        pos: PtS,
    ) -> PlanResult<ItemId> {
        if !self.regions.contains(region) {
            return Err(PlanError::new(
                ErrorKind::InvalidConfig,
                format!("no region named \"{}\"", region),
            ));
        }
        if ttype == TerminalType::Origin && self.origin().is_some() {
            return Err(PlanError::new(
                ErrorKind::InvalidConfig,
                "an Origin terminal already exists",
            ));
        }
        if ttype == TerminalType::Destination && self.destination().is_some() {
            return Err(PlanError::new(
                ErrorKind::InvalidConfig,
                "a Destination terminal already exists",
            ));
        }
        let id = new_item_id();
        let terminal = Terminal::new(name, ttype, region, pos);
        let show = terminal.show_on_global;
        self.region_scene
            .add_item_with_id(id.clone(), Entity::Terminal(terminal));
        if show {
            self.create_mirror(&id);
        }
        self.refresh_visibility();
        Ok(id)
    }

    pub fn get_terminal(&self, id: &str) -> Option<&Terminal> {
        self.region_scene
            .get_item_by_id(id)
            .and_then(|e| e.as_terminal())
    }

    pub fn get_terminal_mut(&mut self, id: &str) -> Option<&mut Terminal> {
        self.region_scene
            .get_item_by_id_mut(id)
            .and_then(|e| e.as_terminal_mut())
    }

    pub fn origin(&self) -> Option<(ItemId, &Terminal)> {
        self.region_scene
            .find_terminal(|t| t.ttype == TerminalType::Origin)
    }

    pub fn destination(&self) -> Option<(ItemId, &Terminal)> {
        self.region_scene
            .find_terminal(|t| t.ttype == TerminalType::Destination)
    }

    pub fn remove_terminal(&mut self, id: &str) -> bool {
        if self.get_terminal(id).is_none() {
            return false;
        }
        // mirror follows the terminal
        if let Some(mid) = self.mirror_of(id) {
            self.global_scene.remove_item_with_id(&mid);
        }
        // connection lines referencing the terminal go with it
        for kind in &[SceneKind::Region, SceneKind::Global] {
            let doomed: Vec<ItemId> = self
                .scene(*kind)
                .connections()
                .into_iter()
                .filter(|(_, c)| c.a == id || c.b == id)
                .map(|(cid, _)| cid)
                .collect();
            for cid in doomed {
                self.scene_mut(*kind).remove_item_with_id(&cid);
            }
        }
        // unlink map nodes
        let nodes: Vec<ItemId> = self
            .region_scene
            .get_items_by_type(TypeTag::MapNode)
            .into_iter()
            .filter(|(_, e)| {
                e.as_map_node()
                    .map(|n| n.linked_terminal.as_deref() == Some(id))
                    .unwrap_or(false)
            })
            .map(|(nid, _)| nid.clone())
            .collect();
        for nid in nodes {
            if let Some(n) = self
                .region_scene
                .get_item_by_id_mut(&nid)
                .and_then(|e| e.as_map_node_mut())
            {
                n.linked_terminal = None;
            }
        }
        self.region_scene.remove_item_with_id(id)
    }

    pub fn move_terminal(&mut self, id: &str, pos: PtS) -> bool {
        let moved = match self.get_terminal_mut(id) {
            Some(t) => {
                t.pos = pos;
                true
            }
            None => false,
        };
        if moved {
            self.refresh_mirror(id);
        }
        moved
    }

    /// Toggle the terminal's presence on the global map. The mirror is
    /// created on the false→true edge and removed on true→false.
    pub fn set_show_on_global(&mut self, id: &str, show: bool) -> bool {
        let prev = match self.get_terminal_mut(id) {
            Some(t) => {
                let prev = t.show_on_global;
                t.show_on_global = show;
                prev
            }
            None => return false,
        };
        if show && !prev {
            self.create_mirror(id);
        } else if !show && prev {
            if let Some(mid) = self.mirror_of(id) {
                self.global_scene.remove_item_with_id(&mid);
            }
        }
        true
    }

    pub fn mirror_of(&self, terminal_id: &str) -> Option<ItemId> {
        self.global_scene
            .get_items_by_type(TypeTag::GlobalTerminal)
            .into_iter()
            .find(|(_, e)| {
                e.as_global_terminal()
                    .map(|g| g.terminal == terminal_id)
                    .unwrap_or(false)
            })
            .map(|(id, _)| id.clone())
    }

    /// Global position of a terminal: the owning region's shared
    /// coordinates plus the terminal's geodetic offset from the region
    /// center.
    fn mirror_geodetic(&self, terminal: &Terminal) -> (f64, f64) {
        let (t_lon, t_lat) = coords::scene_to_geodetic(terminal.pos);
        match self.regions.get(&terminal.region) {
            Some(rec) => (
                rec.shared_lon + (t_lon - rec.lon),
                rec.shared_lat + (t_lat - rec.lat),
            ),
            None => (t_lon, t_lat),
        }
    }

    fn create_mirror(&mut self, terminal_id: &str) {
        if self.mirror_of(terminal_id).is_some() {
            return;
        }
        let (region, lon, lat) = match self.get_terminal(terminal_id) {
            Some(t) => {
                let (lon, lat) = self.mirror_geodetic(t);
                (t.region.clone(), lon, lat)
            }
            None => return,
        };
        let id = new_item_id();
        self.global_scene.add_item_with_id(
            id,
            Entity::GlobalTerminal(GlobalTerminal {
                terminal: terminal_id.to_string(),
                region,
                lon,
                lat,
                pos: coords::geodetic_to_scene(lon, lat),
            }),
        );
    }

    /// Region-scene moves propagate to the mirror.
    fn refresh_mirror(&mut self, terminal_id: &str) {
        let mid = match self.mirror_of(terminal_id) {
            Some(mid) => mid,
            None => return,
        };
        let (lon, lat) = match self.get_terminal(terminal_id) {
            Some(t) => self.mirror_geodetic(t),
            None => return,
        };
        if let Some(g) = self
            .global_scene
            .get_item_by_id_mut(&mid)
            .and_then(|e| e.as_global_terminal_mut())
        {
            g.lon = lon;
            g.lat = lat;
            g.pos = coords::geodetic_to_scene(lon, lat);
        }
    }

    /// Write a mirror's shared coordinates directly (set-global-position
    /// tool).
    pub fn set_global_position(&mut self, mirror_id: &str, lon: f64, lat: f64) -> bool {
        match self
            .global_scene
            .get_item_by_id_mut(mirror_id)
            .and_then(|e| e.as_global_terminal_mut())
        {
            Some(g) => {
                g.lon = lon;
                g.lat = lat;
                g.pos = coords::geodetic_to_scene(lon, lat);
                true
            }
            None => false,
        }
    }

    // --------------------------------------------------- connections

    /// Create a typed connection line between two terminals (region
    /// scene) or two global terminal mirrors (global scene).
    pub fn connect_terminals(
        &mut self,
        kind: SceneKind,
        a: &str,
        b: &str,
        mode: Mode,
    ) -> PlanResult<ItemId> {
        if a == b {
            return Err(PlanError::new(
                ErrorKind::SelfConnection,
                "cannot connect a terminal to itself",
            ));
        }
        let scene = self.scene(kind);
        let (ea, eb) = match (scene.get_item_by_id(a), scene.get_item_by_id(b)) {
            (Some(ea), Some(eb)) => (ea, eb),
            _ => {
                return Err(PlanError::new(
                    ErrorKind::NoConnections,
                    "endpoint not found in scene",
                ))
            }
        };
        let region = match (kind, ea, eb) {
            (SceneKind::Region, Entity::Terminal(ta), Entity::Terminal(tb)) => {
                if ta.region != tb.region {
                    return Err(PlanError::new(
                        ErrorKind::CrossRegionConnection,
                        format!(
                            "\"{}\" is in {} but \"{}\" is in {}",
                            ta.name, ta.region, tb.name, tb.region
                        ),
                    ));
                }
                ta.region.clone()
            }
            (SceneKind::Global, Entity::GlobalTerminal(ga), Entity::GlobalTerminal(_)) => {
                ga.region.clone()
            }
            _ => {
                return Err(PlanError::new(
                    ErrorKind::SelfConnection,
                    "endpoints must both be terminals or both be global terminals",
                ))
            }
        };
        let pair = unordered_pair(a, b);
        let duplicate = scene
            .connections()
            .iter()
            .any(|(_, c)| c.mode == mode && unordered_pair(&c.a, &c.b) == pair);
        if duplicate {
            return Err(PlanError::new(
                ErrorKind::DuplicateConnection,
                format!("a {} connection already exists here", mode.display_name()),
            ));
        }
        let attrs = self.default_connection_attrs(kind, a, b, mode);
        let id = new_item_id();
        self.scene_mut(kind).add_item_with_id(
            id.clone(),
            Entity::Connection(ConnectionLine {
                mode,
                region,
                a: a.to_string(),
                b: b.to_string(),
                attrs,
            }),
        );
        self.refresh_visibility();
        Ok(id)
    }

    fn default_connection_attrs(
        &self,
        kind: SceneKind,
        a: &str,
        b: &str,
        mode: Mode,
    ) -> ConnectionAttrs {
        let scene = self.scene(kind);
        let geo = |id: &str| {
            scene
                .get_item_by_id(id)
                .and_then(|e| e.pos())
                .map(coords::scene_to_geodetic)
        };
        let mut attrs = ConnectionAttrs::default();
        if let (Some((lon1, lat1)), Some((lon2, lat2))) = (geo(a), geo(b)) {
            attrs.distance = vincenty_distance(lon1, lat1, lon2, lat2);
            let speed = match mode {
                Mode::Truck => 25.0,
                Mode::Rail => 33.0,
                Mode::Ship => 10.0,
            };
            attrs.travel_time = attrs.distance / speed;
        }
        attrs
    }

    pub fn get_connection_mut(&mut self, kind: SceneKind, id: &str) -> Option<&mut ConnectionLine> {
        self.scene_mut(kind)
            .get_item_by_id_mut(id)
            .and_then(|e| e.as_connection_mut())
    }

    // ----------------------------------------------------- networks

    pub fn import_network(
        &mut self,
        name: &str,
        mode: Mode,
        region: &str,
        file: &NetworkFile,
    ) -> PlanResult<()> {
        if self.networks.contains_key(name) {
            return Err(PlanError::new(
                ErrorKind::InvalidConfig,
                format!("a network named \"{}\" is already imported", name),
            ));
        }
        if !self.regions.contains(region) {
            return Err(PlanError::new(
                ErrorKind::InvalidConfig,
                format!("no region named \"{}\"", region),
            ));
        }
        let net = network::instantiate(&mut self.region_scene, name, mode, region, file)?;
        {
            let rec = self.regions.get_mut(region).unwrap();
            match mode {
                Mode::Rail => rec.rail_networks.insert(name.to_string()),
                _ => rec.truck_networks.insert(name.to_string()),
            };
        }
        self.networks.insert(name.to_string(), net);
        self.refresh_visibility();
        Ok(())
    }

    /// Link a map node to a terminal. Both must belong to the same
    /// region.
    pub fn link_terminal_to_node(&mut self, node_id: &str, terminal_id: &str) -> PlanResult<()> {
        let t_region = match self.get_terminal(terminal_id) {
            Some(t) => t.region.clone(),
            None => {
                return Err(PlanError::new(
                    ErrorKind::NoConnections,
                    "no such terminal",
                ))
            }
        };
        let node = match self
            .region_scene
            .get_item_by_id_mut(node_id)
            .and_then(|e| e.as_map_node_mut())
        {
            Some(n) => n,
            None => {
                return Err(PlanError::new(ErrorKind::NoConnections, "no such map node"))
            }
        };
        if node.region != t_region {
            return Err(PlanError::new(
                ErrorKind::CrossRegionConnection,
                "terminal and node belong to different regions",
            ));
        }
        node.linked_terminal = Some(terminal_id.to_string());
        debug!("linked node {} to terminal {}", node_id, terminal_id);
        Ok(())
    }

    pub fn unlink_node(&mut self, node_id: &str) -> PlanResult<()> {
        match self
            .region_scene
            .get_item_by_id_mut(node_id)
            .and_then(|e| e.as_map_node_mut())
        {
            Some(n) => {
                n.linked_terminal = None;
                Ok(())
            }
            None => Err(PlanError::new(ErrorKind::NoConnections, "no such map node")),
        }
    }

    /// Map nodes of the given mode's networks that are linked to the
    /// terminal, as (network name, file-local node id) pairs.
    pub fn linked_nodes(&self, terminal_id: &str, mode: Mode) -> Vec<(String, i64)> {
        self.region_scene
            .get_items_by_type(TypeTag::MapNode)
            .into_iter()
            .filter_map(|(_, e)| e.as_map_node())
            .filter(|n| n.net_mode == mode && n.linked_terminal.as_deref() == Some(terminal_id))
            .map(|n| (n.network.clone(), n.node_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::BackgroundJobs;
    use nalgebra_glm as glm;

    fn doc() -> Document {
        Document::empty(BackgroundJobs::new())
    }

    #[test]
    fn origin_destination_uniqueness() {
        let mut d = doc();
        d.add_terminal("O", TerminalType::Origin, regions::DEFAULT_REGION, glm::vec2(0.0, 0.0))
            .unwrap();
        let err = d
            .add_terminal("O2", TerminalType::Origin, regions::DEFAULT_REGION, glm::vec2(1.0, 0.0))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidConfig);
        d.add_terminal("D", TerminalType::Destination, regions::DEFAULT_REGION, glm::vec2(2.0, 0.0))
            .unwrap();
        assert!(d.origin().is_some());
        assert!(d.destination().is_some());
    }

    #[test]
    fn connect_rules() {
        let mut d = doc();
        d.add_region("R1").unwrap();
        d.add_region("R2").unwrap();
        let a = d
            .add_terminal("A", TerminalType::SeaPort, "R1", glm::vec2(0.0, 0.0))
            .unwrap();
        let b = d
            .add_terminal("B", TerminalType::IntermodalLand, "R1", glm::vec2(100.0, 0.0))
            .unwrap();
        let c = d
            .add_terminal("C", TerminalType::IntermodalLand, "R2", glm::vec2(200.0, 0.0))
            .unwrap();

        let err = d
            .connect_terminals(SceneKind::Region, &a, &a, Mode::Rail)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::SelfConnection);

        d.connect_terminals(SceneKind::Region, &a, &b, Mode::Rail)
            .unwrap();
        // same unordered pair, same mode
        let err = d
            .connect_terminals(SceneKind::Region, &b, &a, Mode::Rail)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateConnection);
        // other mode is fine
        d.connect_terminals(SceneKind::Region, &a, &b, Mode::Truck)
            .unwrap();

        let err = d
            .connect_terminals(SceneKind::Region, &a, &c, Mode::Rail)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::CrossRegionConnection);
    }

    #[test]
    fn region_scene_line_region_matches_endpoints() {
        let mut d = doc();
        d.add_region("R1").unwrap();
        let a = d
            .add_terminal("A", TerminalType::SeaPort, "R1", glm::vec2(0.0, 0.0))
            .unwrap();
        let b = d
            .add_terminal("B", TerminalType::IntermodalLand, "R1", glm::vec2(100.0, 0.0))
            .unwrap();
        let cid = d
            .connect_terminals(SceneKind::Region, &a, &b, Mode::Ship)
            .unwrap();
        let line = d
            .region_scene
            .get_item_by_id(&cid)
            .and_then(|e| e.as_connection())
            .unwrap();
        assert_eq!(line.region, "R1");
    }

    #[test]
    fn mirror_lifecycle() {
        let mut d = doc();
        d.add_region("R1").unwrap();
        d.set_region_center("R1", 10.0, 50.0, 30.0, 20.0).unwrap();
        let pos = coords::geodetic_to_scene(10.5, 50.25);
        let t = d
            .add_terminal("A", TerminalType::SeaPort, "R1", pos)
            .unwrap();
        let mid = d.mirror_of(&t).expect("sea ports show on the global map");
        let g = d
            .global_scene
            .get_item_by_id(&mid)
            .and_then(|e| e.as_global_terminal())
            .unwrap();
        // shared coordinates plus the terminal's offset from the center
        assert!((g.lon - 30.5).abs() < 1e-6, "lon {}", g.lon);
        assert!((g.lat - 20.25).abs() < 1e-6, "lat {}", g.lat);

        // flag off removes the mirror, back on reconstructs it at the
        // same offset
        d.set_show_on_global(&t, false);
        assert!(d.mirror_of(&t).is_none());
        d.set_show_on_global(&t, true);
        let mid2 = d.mirror_of(&t).unwrap();
        let g2 = d
            .global_scene
            .get_item_by_id(&mid2)
            .and_then(|e| e.as_global_terminal())
            .unwrap();
        assert!((g2.lon - 30.5).abs() < 1e-6);
        assert!((g2.lat - 20.25).abs() < 1e-6);
    }

    #[test]
    fn mirror_follows_moves() {
        let mut d = doc();
        d.add_region("R1").unwrap();
        d.set_region_center("R1", 0.0, 0.0, 100.0, 10.0).unwrap();
        let t = d
            .add_terminal("A", TerminalType::SeaPort, "R1", coords::geodetic_to_scene(0.0, 0.0))
            .unwrap();
        d.move_terminal(&t, coords::geodetic_to_scene(2.0, 1.0));
        let mid = d.mirror_of(&t).unwrap();
        let g = d
            .global_scene
            .get_item_by_id(&mid)
            .and_then(|e| e.as_global_terminal())
            .unwrap();
        assert!((g.lon - 102.0).abs() < 1e-6);
        assert!((g.lat - 11.0).abs() < 1e-6);
    }

    #[test]
    fn rename_region_keeps_entities() {
        let mut d = doc();
        d.add_region("R1").unwrap();
        let t = d
            .add_terminal("A", TerminalType::SeaPort, "R1", glm::vec2(0.0, 0.0))
            .unwrap();
        d.rename_region("R1", "Coast").unwrap();
        assert_eq!(d.get_terminal(&t).unwrap().region, "Coast");
        let mid = d.mirror_of(&t).unwrap();
        assert_eq!(
            d.global_scene.get_item_by_id(&mid).unwrap().region(),
            "Coast"
        );
    }

    #[test]
    fn remove_region_reassigns_to_fallback() {
        let mut d = doc();
        d.add_region("R1").unwrap();
        let t = d
            .add_terminal("A", TerminalType::SeaPort, "R1", glm::vec2(0.0, 0.0))
            .unwrap();
        d.remove_region("R1", regions::DEFAULT_REGION).unwrap();
        assert_eq!(d.get_terminal(&t).unwrap().region, regions::DEFAULT_REGION);
    }

    #[test]
    fn region_isolation_on_switch() {
        let mut d = doc();
        d.add_region("R1").unwrap();
        d.add_region("R2").unwrap();
        d.set_current_region("R1");
        let t1 = d
            .add_terminal("A", TerminalType::SeaPort, "R1", glm::vec2(0.0, 0.0))
            .unwrap();
        let t2 = d
            .add_terminal("B", TerminalType::IntermodalLand, "R2", glm::vec2(10.0, 0.0))
            .unwrap();
        assert!(d.region_scene.is_visible(&t1));
        assert!(!d.region_scene.is_visible(&t2));
        let mirrors = d.global_scene.len();
        d.set_current_region("R2");
        assert!(!d.region_scene.is_visible(&t1));
        assert!(d.region_scene.is_visible(&t2));
        // global scene content unaffected
        assert_eq!(d.global_scene.len(), mirrors);
    }

    #[test]
    fn link_requires_same_region() {
        let mut d = doc();
        d.add_region("R1").unwrap();
        d.add_region("R2").unwrap();
        let file = NetworkFile {
            nodes: vec![
                network::NetworkFileNode { id: 1, lon: 0.0, lat: 0.0 },
                network::NetworkFileNode { id: 2, lon: 1.0, lat: 0.0 },
            ],
            links: vec![network::NetworkFileLink {
                id: 1,
                from: 1,
                to: 2,
                length: None,
                free_speed: None,
                lanes: None,
                max_speed: None,
            }],
        };
        d.import_network("rail1", Mode::Rail, "R1", &file).unwrap();
        let t_ok = d
            .add_terminal("T", TerminalType::TrainDepot, "R1", glm::vec2(0.0, 0.0))
            .unwrap();
        let t_far = d
            .add_terminal("U", TerminalType::TruckParking, "R2", glm::vec2(0.0, 0.0))
            .unwrap();
        let node_id = d.networks["rail1"].node_item(1).unwrap().clone();

        d.link_terminal_to_node(&node_id, &t_ok).unwrap();
        let n = d
            .region_scene
            .get_item_by_id(&node_id)
            .and_then(|e| e.as_map_node())
            .unwrap();
        assert_eq!(n.linked_terminal.as_deref(), Some(t_ok.as_str()));
        assert_eq!(d.linked_nodes(&t_ok, Mode::Rail), vec![("rail1".to_string(), 1)]);

        let err = d.link_terminal_to_node(&node_id, &t_far).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CrossRegionConnection);

        d.unlink_node(&node_id).unwrap();
        assert!(d.linked_nodes(&t_ok, Mode::Rail).is_empty());
    }

    #[test]
    fn one_photo_per_region() {
        let mut d = doc();
        let photo = |path: &str| BackgroundPhoto {
            region: String::new(),
            path: path.to_string(),
            scale: 1.0,
            opacity: 0.8,
            anchor_lon: 10.0,
            anchor_lat: 50.0,
        };
        let p1 = d
            .set_background_photo(regions::DEFAULT_REGION, photo("a.png"))
            .unwrap();
        let p2 = d
            .set_background_photo(regions::DEFAULT_REGION, photo("b.png"))
            .unwrap();
        // the second photo replaces the first
        assert!(!d.region_scene.contains(&p1));
        let e = d.region_scene.get_item_by_id(&p2).unwrap();
        assert_eq!(e.as_photo().unwrap().path, "b.png");
        assert_eq!(e.region(), regions::DEFAULT_REGION);

        d.remove_background_photo(regions::DEFAULT_REGION);
        assert!(!d.region_scene.contains(&p2));
        assert!(d.regions.get(regions::DEFAULT_REGION).unwrap().photo.is_none());
    }

    #[test]
    fn removing_terminal_cleans_up() {
        let mut d = doc();
        let a = d
            .add_terminal("A", TerminalType::SeaPort, regions::DEFAULT_REGION, glm::vec2(0.0, 0.0))
            .unwrap();
        let b = d
            .add_terminal("B", TerminalType::IntermodalLand, regions::DEFAULT_REGION, glm::vec2(5.0, 0.0))
            .unwrap();
        d.connect_terminals(SceneKind::Region, &a, &b, Mode::Rail)
            .unwrap();
        assert_eq!(d.region_scene.connections().len(), 1);
        assert!(d.mirror_of(&a).is_some());
        d.remove_terminal(&a);
        assert!(d.region_scene.connections().is_empty());
        assert!(d.mirror_of(&a).is_none());
    }
}
