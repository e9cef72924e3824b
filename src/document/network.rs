//! Imported transportation networks. A network file is a JSON document
//! with node and link lists; importing materialises map node and map edge
//! entities in the owning region's scene.

use crate::coords;
use crate::document::objects::*;
use crate::document::scene::Scene;
use crate::errors::{ErrorKind, PlanError, PlanResult};
use crate::util::new_item_id;
use log::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkFileNode {
    pub id: i64,
    pub lon: f64,
    pub lat: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkFileLink {
    pub id: i64,
    pub from: i64,
    pub to: i64,
    #[serde(default)]
    pub length: Option<f64>,
    #[serde(default)]
    pub free_speed: Option<f64>,
    #[serde(default)]
    pub lanes: Option<u32>,
    #[serde(default)]
    pub max_speed: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkFile {
    pub nodes: Vec<NetworkFileNode>,
    pub links: Vec<NetworkFileLink>,
}

impl NetworkFile {
    pub fn from_reader(r: impl std::io::Read) -> PlanResult<Self> {
        let file: NetworkFile = serde_json::from_reader(r).map_err(|e| {
            PlanError::new(ErrorKind::InvalidConfig, format!("network file: {}", e))
        })?;
        file.validate()?;
        Ok(file)
    }

    pub fn load(path: &Path) -> PlanResult<Self> {
        let f = std::fs::File::open(path).map_err(|e| {
            PlanError::new(
                ErrorKind::InvalidConfig,
                format!("cannot open {}: {}", path.display(), e),
            )
        })?;
        Self::from_reader(f)
    }

    fn validate(&self) -> PlanResult<()> {
        let mut errors = Vec::new();
        if self.nodes.is_empty() {
            errors.push("no nodes".to_string());
        }
        let ids: BTreeMap<i64, ()> = self.nodes.iter().map(|n| (n.id, ())).collect();
        if ids.len() != self.nodes.len() {
            errors.push("duplicate node ids".to_string());
        }
        for l in &self.links {
            if !ids.contains_key(&l.from) || !ids.contains_key(&l.to) {
                errors.push(format!("link {} references an unknown node", l.id));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(PlanError::new(ErrorKind::InvalidConfig, errors.join("; ")))
        }
    }
}

/// One imported network. Map node and edge entities are stored in the
/// region scene; the network keeps their ids (non-owning handles).
#[derive(Clone, Debug)]
pub struct Network {
    pub name: String,
    pub mode: Mode,
    pub region: String,
    /// File-local node id to scene item id.
    pub node_items: BTreeMap<i64, ItemId>,
    pub edge_items: Vec<ItemId>,
}

impl Network {
    pub fn node_item(&self, node_id: i64) -> Option<&ItemId> {
        self.node_items.get(&node_id)
    }
}

/// Materialise a parsed network file into scene entities. `mode` must be
/// Rail or Truck; Ship legs are drawn as connection lines, not imported
/// networks.
pub fn instantiate(
    scene: &mut Scene,
    name: &str,
    mode: Mode,
    region: &str,
    file: &NetworkFile,
) -> PlanResult<Network> {
    if mode == Mode::Ship {
        return Err(PlanError::new(
            ErrorKind::InvalidConfig,
            "ship networks cannot be imported from files",
        ));
    }
    let mut node_items = BTreeMap::new();
    for n in &file.nodes {
        let id = new_item_id();
        let pos = coords::geodetic_to_scene(n.lon, n.lat);
        scene.add_item_with_id(
            id.clone(),
            Entity::MapNode(MapNode {
                network: name.to_string(),
                net_mode: mode,
                node_id: n.id,
                region: region.to_string(),
                lon: n.lon,
                lat: n.lat,
                pos,
                linked_terminal: None,
            }),
        );
        node_items.insert(n.id, id);
    }
    let mut edge_items = Vec::new();
    for l in &file.links {
        let from = node_items[&l.from].clone();
        let to = node_items[&l.to].clone();
        let length = l.length.unwrap_or_else(|| {
            let a = file.nodes.iter().find(|n| n.id == l.from).unwrap();
            let b = file.nodes.iter().find(|n| n.id == l.to).unwrap();
            let (ax, ay) = coords::to_projected(a.lon, a.lat);
            let (bx, by) = coords::to_projected(b.lon, b.lat);
            ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
        });
        let attrs = match mode {
            Mode::Rail => EdgeAttrs::Rail {
                length,
                max_speed: l.max_speed.unwrap_or(120.0),
            },
            _ => EdgeAttrs::Truck {
                length,
                free_speed: l.free_speed.unwrap_or(80.0),
                lanes: l.lanes.unwrap_or(2),
            },
        };
        let id = new_item_id();
        scene.add_item_with_id(
            id.clone(),
            Entity::MapEdge(MapEdge {
                network: name.to_string(),
                net_mode: mode,
                region: region.to_string(),
                from,
                to,
                attrs,
            }),
        );
        edge_items.push(id);
    }
    info!(
        "imported {} network \"{}\" into {}: {} nodes, {} links",
        mode.display_name(),
        name,
        region,
        node_items.len(),
        edge_items.len()
    );
    Ok(Network {
        name: name.to_string(),
        mode,
        region: region.to_string(),
        node_items,
        edge_items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::scene::SceneKind;

    const SAMPLE: &str = r#"{
        "nodes": [
            {"id": 1, "lon": 0.0, "lat": 0.0},
            {"id": 2, "lon": 0.1, "lat": 0.0}
        ],
        "links": [
            {"id": 10, "from": 1, "to": 2, "max_speed": 160.0}
        ]
    }"#;

    #[test]
    fn parse_and_instantiate() {
        let file = NetworkFile::from_reader(SAMPLE.as_bytes()).unwrap();
        let mut scene = Scene::new(SceneKind::Region);
        let net = instantiate(&mut scene, "main-line", Mode::Rail, "R1", &file).unwrap();
        assert_eq!(net.node_items.len(), 2);
        assert_eq!(net.edge_items.len(), 1);
        let node = scene
            .get_item_by_id(net.node_item(1).unwrap())
            .and_then(|e| e.as_map_node())
            .unwrap();
        assert_eq!(node.network, "main-line");
        assert_eq!(node.region, "R1");
        assert!(node.linked_terminal.is_none());
        let edge = scene
            .get_item_by_id(&net.edge_items[0])
            .and_then(|e| e.as_map_edge())
            .unwrap();
        match edge.attrs {
            EdgeAttrs::Rail { length, max_speed } => {
                // ~0.1 degree of longitude at the equator in mercator metres
                assert!((length - 11131.9).abs() < 1.0, "length {}", length);
                assert_eq!(max_speed, 160.0);
            }
            _ => panic!("expected rail attrs"),
        }
    }

    #[test]
    fn bad_link_rejected() {
        let bad = r#"{"nodes":[{"id":1,"lon":0,"lat":0}],"links":[{"id":5,"from":1,"to":9}]}"#;
        let err = NetworkFile::from_reader(bad.as_bytes()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidConfig);
        assert!(err.message.contains("unknown node"));
    }

    #[test]
    fn no_ship_networks() {
        let file = NetworkFile::from_reader(SAMPLE.as_bytes()).unwrap();
        let mut scene = Scene::new(SceneKind::Region);
        assert!(instantiate(&mut scene, "sea", Mode::Ship, "R1", &file).is_err());
    }
}
