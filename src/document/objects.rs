//! The typed entities of the planning graph: terminals, their global-map
//! mirrors, imported map nodes and edges, operator-drawn connection lines,
//! region center points and background photos.

use crate::coords::PtS;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub type ItemId = String;
pub type JsonMap = Map<String, Value>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize)]
pub enum Mode {
    Truck,
    Rail,
    Ship,
}

impl Mode {
    /// Mode name used by the terminal-graph service, which calls the rail
    /// mode "Train".
    pub fn service_name(&self) -> &'static str {
        match self {
            Mode::Truck => "Truck",
            Mode::Rail => "Train",
            Mode::Ship => "Ship",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Mode::Truck => "Truck",
            Mode::Rail => "Rail",
            Mode::Ship => "Ship",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize)]
pub enum TerminalType {
    Origin,
    Destination,
    SeaPort,
    IntermodalLand,
    TrainDepot,
    TruckParking,
}

impl TerminalType {
    pub fn display_name(&self) -> &'static str {
        match self {
            TerminalType::Origin => "Origin",
            TerminalType::Destination => "Destination",
            TerminalType::SeaPort => "Sea Port Terminal",
            TerminalType::IntermodalLand => "Intermodal Land Terminal",
            TerminalType::TrainDepot => "Train Stop/Depot",
            TerminalType::TruckParking => "Truck Parking",
        }
    }

    /// Interface capabilities bound at creation time.
    pub fn default_interfaces(&self) -> Interfaces {
        let mut i = Interfaces::default();
        match self {
            TerminalType::SeaPort => {
                i.land_side.insert(Mode::Truck);
                i.land_side.insert(Mode::Rail);
                i.sea_side.insert(Mode::Ship);
            }
            TerminalType::TrainDepot => {
                i.land_side.insert(Mode::Rail);
            }
            TerminalType::TruckParking => {
                i.land_side.insert(Mode::Truck);
            }
            TerminalType::Origin | TerminalType::Destination | TerminalType::IntermodalLand => {
                i.land_side.insert(Mode::Truck);
                i.land_side.insert(Mode::Rail);
            }
        }
        i
    }

    pub fn default_show_on_global(&self) -> bool {
        match self {
            TerminalType::TrainDepot | TerminalType::TruckParking => false,
            _ => true,
        }
    }

    /// Cost/dwell/customs/capacity blocks whose keys depend on the type.
    pub fn default_config(&self) -> TerminalBlocks {
        fn num(v: f64) -> Value {
            Value::from(v)
        }
        let mut blocks = TerminalBlocks::default();
        match self {
            TerminalType::SeaPort => {
                let mut cost = JsonMap::new();
                cost.insert("fixed_fees".into(), num(2500.0));
                cost.insert("customs_fees".into(), num(150.0));
                cost.insert("risk_factor".into(), num(0.05));
                blocks.cost = Some(cost);
                let mut p = JsonMap::new();
                p.insert("average".into(), num(48.0 * 3600.0));
                p.insert("std_dev".into(), num(8.0 * 3600.0));
                blocks.dwell_time = Some(DwellTime {
                    method: "normal".into(),
                    parameters: p,
                });
                let mut cap = JsonMap::new();
                cap.insert("max_capacity".into(), num(50_000.0));
                cap.insert("critical_threshold".into(), num(0.8));
                blocks.capacity = Some(cap);
                let mut cus = JsonMap::new();
                cus.insert("probability".into(), num(0.12));
                cus.insert("delay_mean".into(), num(12.0 * 3600.0));
                blocks.customs = Some(cus);
            }
            TerminalType::IntermodalLand => {
                let mut cost = JsonMap::new();
                cost.insert("fixed_fees".into(), num(900.0));
                cost.insert("risk_factor".into(), num(0.02));
                blocks.cost = Some(cost);
                let mut p = JsonMap::new();
                p.insert("average".into(), num(12.0 * 3600.0));
                p.insert("std_dev".into(), num(2.0 * 3600.0));
                blocks.dwell_time = Some(DwellTime {
                    method: "normal".into(),
                    parameters: p,
                });
                let mut cap = JsonMap::new();
                cap.insert("max_capacity".into(), num(10_000.0));
                blocks.capacity = Some(cap);
            }
            TerminalType::TrainDepot => {
                let mut p = JsonMap::new();
                p.insert("average".into(), num(4.0 * 3600.0));
                blocks.dwell_time = Some(DwellTime {
                    method: "fixed".into(),
                    parameters: p,
                });
                let mut cap = JsonMap::new();
                cap.insert("max_capacity".into(), num(2_000.0));
                blocks.capacity = Some(cap);
            }
            TerminalType::TruckParking => {
                let mut cap = JsonMap::new();
                cap.insert("max_capacity".into(), num(500.0));
                blocks.capacity = Some(cap);
            }
            TerminalType::Origin | TerminalType::Destination => {}
        }
        blocks
    }
}

/// Per-side interface capability sets of a terminal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub struct Interfaces {
    pub land_side: BTreeSet<Mode>,
    pub sea_side: BTreeSet<Mode>,
}

impl Interfaces {
    pub fn supports(&self, mode: Mode) -> bool {
        self.land_side.contains(&mode) || self.sea_side.contains(&mode)
    }
}

/// Optional parameter blocks of a terminal. Which blocks are present and
/// which keys they carry depends on the terminal type.
#[derive(Clone, Debug, Default, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct TerminalBlocks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<JsonMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dwell_time: Option<DwellTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<JsonMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customs: Option<JsonMap>,
}

#[derive(Clone, Debug, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct DwellTime {
    pub method: String,
    pub parameters: JsonMap,
}

/// A container waiting at an Origin terminal.
#[derive(Clone, Debug, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub size_teu: f64,
    /// Current location, a terminal or map node id.
    pub location: String,
    /// Visited/planned destinations, appended as the container advances.
    pub destinations: Vec<String>,
}

impl Container {
    pub fn new(id: impl Into<String>, location: impl Into<String>) -> Self {
        Container {
            id: id.into(),
            size_teu: 1.0,
            location: location.into(),
            destinations: Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
#[derive(Serialize, Deserialize)]
pub struct Terminal {
    pub name: String,
    pub ttype: TerminalType,
    pub region: String,
    pub pos: PtS,
    pub interfaces: Interfaces,
    pub show_on_global: bool,
    pub blocks: TerminalBlocks,
    /// Ordered container records; only Origins carry any.
    pub containers: Vec<Container>,
}

impl Terminal {
    pub fn new(name: impl Into<String>, ttype: TerminalType, region: impl Into<String>, pos: PtS) -> Self {
        Terminal {
            name: name.into(),
            ttype,
            region: region.into(),
            pos,
            interfaces: ttype.default_interfaces(),
            show_on_global: ttype.default_show_on_global(),
            blocks: ttype.default_config(),
            containers: Vec::new(),
        }
    }
}

/// Global-scene stand-in for a terminal, placed by the owning region's
/// shared coordinates plus the terminal's offset from the region center.
#[derive(Clone, Debug)]
#[derive(Serialize, Deserialize)]
pub struct GlobalTerminal {
    pub terminal: ItemId,
    pub region: String,
    pub lon: f64,
    pub lat: f64,
    pub pos: PtS,
}

/// A node of an imported rail or truck network.
#[derive(Clone, Debug)]
#[derive(Serialize, Deserialize)]
pub struct MapNode {
    pub network: String,
    pub net_mode: Mode,
    /// Node id within its network file.
    pub node_id: i64,
    pub region: String,
    pub lon: f64,
    pub lat: f64,
    pub pos: PtS,
    pub linked_terminal: Option<ItemId>,
}

#[derive(Clone, Debug, PartialEq)]
#[derive(Serialize, Deserialize)]
pub enum EdgeAttrs {
    Rail { length: f64, max_speed: f64 },
    Truck { length: f64, free_speed: f64, lanes: u32 },
}

/// A segment of an imported network between two map nodes.
#[derive(Clone, Debug)]
#[derive(Serialize, Deserialize)]
pub struct MapEdge {
    pub network: String,
    pub net_mode: Mode,
    pub region: String,
    pub from: ItemId,
    pub to: ItemId,
    pub attrs: EdgeAttrs,
}

/// Cost attributes carried by an operator-drawn connection line.
#[derive(Clone, Copy, Debug, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct ConnectionAttrs {
    pub distance: f64,
    pub travel_time: f64,
    pub cost: f64,
    pub carbon_emissions: f64,
    pub risk: f64,
    pub energy_consumption: f64,
}

impl Default for ConnectionAttrs {
    fn default() -> Self {
        ConnectionAttrs {
            distance: 0.0,
            travel_time: 0.0,
            cost: 0.0,
            carbon_emissions: 0.0,
            risk: 0.0,
            energy_consumption: 0.0,
        }
    }
}

/// Operator-drawn typed edge between two terminals (region scene) or two
/// global terminal mirrors (global scene).
#[derive(Clone, Debug)]
#[derive(Serialize, Deserialize)]
pub struct ConnectionLine {
    pub mode: Mode,
    pub region: String,
    pub a: ItemId,
    pub b: ItemId,
    pub attrs: ConnectionAttrs,
}

impl ConnectionLine {
    /// Sign of the orthogonal curve offset used when drawing. Rail and Ship
    /// curve on opposite sides so overlapping edges stay distinguishable;
    /// Truck is a straight line.
    pub fn curve_side(&self) -> f64 {
        match self.mode {
            Mode::Rail => 1.0,
            Mode::Ship => -1.0,
            Mode::Truck => 0.0,
        }
    }
}

/// One per region; carries the region-local latitude/longitude and the
/// shared coordinates used on the global map.
#[derive(Clone, Debug)]
#[derive(Serialize, Deserialize)]
pub struct RegionCenter {
    pub region: String,
    pub lon: f64,
    pub lat: f64,
    pub shared_lon: f64,
    pub shared_lat: f64,
    pub pos: PtS,
}

#[derive(Clone, Debug)]
#[derive(Serialize, Deserialize)]
pub struct BackgroundPhoto {
    pub region: String,
    pub path: String,
    pub scale: f64,
    pub opacity: f64,
    pub anchor_lon: f64,
    pub anchor_lat: f64,
}

/// Tag used by the scene type index.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize)]
pub enum TypeTag {
    Terminal,
    GlobalTerminal,
    MapNode,
    MapEdge,
    Connection,
    RegionCenter,
    Photo,
}

/// Tagged-variant scene entity. Hit-testing returns the variant and
/// callers match.
#[derive(Clone, Debug)]
#[derive(Serialize, Deserialize)]
pub enum Entity {
    Terminal(Terminal),
    GlobalTerminal(GlobalTerminal),
    MapNode(MapNode),
    MapEdge(MapEdge),
    Connection(ConnectionLine),
    RegionCenter(RegionCenter),
    Photo(BackgroundPhoto),
}

impl Entity {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Entity::Terminal(_) => TypeTag::Terminal,
            Entity::GlobalTerminal(_) => TypeTag::GlobalTerminal,
            Entity::MapNode(_) => TypeTag::MapNode,
            Entity::MapEdge(_) => TypeTag::MapEdge,
            Entity::Connection(_) => TypeTag::Connection,
            Entity::RegionCenter(_) => TypeTag::RegionCenter,
            Entity::Photo(_) => TypeTag::Photo,
        }
    }

    /// The owning region. Every entity belongs to exactly one region.
    pub fn region(&self) -> &str {
        match self {
            Entity::Terminal(t) => &t.region,
            Entity::GlobalTerminal(g) => &g.region,
            Entity::MapNode(n) => &n.region,
            Entity::MapEdge(e) => &e.region,
            Entity::Connection(c) => &c.region,
            Entity::RegionCenter(r) => &r.region,
            Entity::Photo(p) => &p.region,
        }
    }

    pub fn set_region(&mut self, region: &str) {
        match self {
            Entity::Terminal(t) => t.region = region.into(),
            Entity::GlobalTerminal(g) => g.region = region.into(),
            Entity::MapNode(n) => n.region = region.into(),
            Entity::MapEdge(e) => e.region = region.into(),
            Entity::Connection(c) => c.region = region.into(),
            Entity::RegionCenter(r) => r.region = region.into(),
            Entity::Photo(p) => p.region = region.into(),
        }
    }

    /// Scene position for point-like entities.
    pub fn pos(&self) -> Option<PtS> {
        match self {
            Entity::Terminal(t) => Some(t.pos),
            Entity::GlobalTerminal(g) => Some(g.pos),
            Entity::MapNode(n) => Some(n.pos),
            Entity::RegionCenter(r) => Some(r.pos),
            Entity::MapEdge(_) | Entity::Connection(_) | Entity::Photo(_) => None,
        }
    }

    pub fn as_terminal(&self) -> Option<&Terminal> {
        if let Entity::Terminal(t) = self {
            Some(t)
        } else {
            None
        }
    }
    pub fn as_terminal_mut(&mut self) -> Option<&mut Terminal> {
        if let Entity::Terminal(t) = self {
            Some(t)
        } else {
            None
        }
    }
    pub fn as_global_terminal(&self) -> Option<&GlobalTerminal> {
        if let Entity::GlobalTerminal(g) = self {
            Some(g)
        } else {
            None
        }
    }
    pub fn as_global_terminal_mut(&mut self) -> Option<&mut GlobalTerminal> {
        if let Entity::GlobalTerminal(g) = self {
            Some(g)
        } else {
            None
        }
    }
    pub fn as_map_node(&self) -> Option<&MapNode> {
        if let Entity::MapNode(n) = self {
            Some(n)
        } else {
            None
        }
    }
    pub fn as_map_node_mut(&mut self) -> Option<&mut MapNode> {
        if let Entity::MapNode(n) = self {
            Some(n)
        } else {
            None
        }
    }
    pub fn as_map_edge(&self) -> Option<&MapEdge> {
        if let Entity::MapEdge(e) = self {
            Some(e)
        } else {
            None
        }
    }
    pub fn as_connection(&self) -> Option<&ConnectionLine> {
        if let Entity::Connection(c) = self {
            Some(c)
        } else {
            None
        }
    }
    pub fn as_connection_mut(&mut self) -> Option<&mut ConnectionLine> {
        if let Entity::Connection(c) = self {
            Some(c)
        } else {
            None
        }
    }
    pub fn as_region_center(&self) -> Option<&RegionCenter> {
        if let Entity::RegionCenter(r) = self {
            Some(r)
        } else {
            None
        }
    }
    pub fn as_region_center_mut(&mut self) -> Option<&mut RegionCenter> {
        if let Entity::RegionCenter(r) = self {
            Some(r)
        } else {
            None
        }
    }
    pub fn as_photo(&self) -> Option<&BackgroundPhoto> {
        if let Entity::Photo(p) = self {
            Some(p)
        } else {
            None
        }
    }
}
