//! Scene containers. Entities live in an arena; the scene keeps an
//! insertion-order list for drawing plus a nested type/id index.
//! Cross-references between entities are plain ids resolved here.

use crate::coords::PtS;
use crate::document::objects::*;
use crate::util::dist_to_line_sqr;
use generational_arena::{Arena, Index};
use log::*;
use nalgebra_glm as glm;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SceneKind {
    Region,
    Global,
}

pub struct Scene {
    pub kind: SceneKind,
    arena: Arena<Entity>,
    order: Vec<(ItemId, Index)>,
    ids: HashMap<ItemId, Index>,
    by_type: HashMap<TypeTag, BTreeMap<ItemId, Index>>,
    selection: BTreeSet<ItemId>,
    hidden: HashSet<ItemId>,
}

impl Scene {
    pub fn new(kind: SceneKind) -> Self {
        Scene {
            kind,
            arena: Arena::new(),
            order: Vec::new(),
            ids: HashMap::new(),
            by_type: HashMap::new(),
            selection: BTreeSet::new(),
            hidden: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Insert under a caller-supplied id. Duplicate ids within one scene
    /// are rejected.
    pub fn add_item_with_id(&mut self, id: ItemId, entity: Entity) -> Option<Index> {
        if self.ids.contains_key(&id) {
            warn!("scene already contains an item with id {}", id);
            return None;
        }
        let tag = entity.type_tag();
        let idx = self.arena.insert(entity);
        self.order.push((id.clone(), idx));
        self.ids.insert(id.clone(), idx);
        self.by_type.entry(tag).or_insert_with(BTreeMap::new).insert(id, idx);
        Some(idx)
    }

    /// Remove by id; idempotent if the id is absent.
    pub fn remove_item_with_id(&mut self, id: &str) -> bool {
        let idx = match self.ids.remove(id) {
            Some(idx) => idx,
            None => return false,
        };
        let tag = self.arena[idx].type_tag();
        self.arena.remove(idx);
        self.order.retain(|(i, _)| i != id);
        if let Some(m) = self.by_type.get_mut(&tag) {
            m.remove(id);
        }
        self.selection.remove(id);
        self.hidden.remove(id);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    pub fn get_item_by_id(&self, id: &str) -> Option<&Entity> {
        self.ids.get(id).map(|idx| &self.arena[*idx])
    }

    pub fn get_item_by_id_mut(&mut self, id: &str) -> Option<&mut Entity> {
        let idx = *self.ids.get(id)?;
        Some(&mut self.arena[idx])
    }

    pub fn get_items_by_type(&self, tag: TypeTag) -> Vec<(&ItemId, &Entity)> {
        match self.by_type.get(&tag) {
            Some(m) => m.iter().map(|(id, idx)| (id, &self.arena[*idx])).collect(),
            None => Vec::new(),
        }
    }

    pub fn ids_by_type(&self, tag: TypeTag) -> Vec<ItemId> {
        match self.by_type.get(&tag) {
            Some(m) => m.keys().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Entities in drawing order.
    pub fn iter(&self) -> impl Iterator<Item = (&ItemId, &Entity)> {
        let arena = &self.arena;
        self.order.iter().map(move |(id, idx)| (id, &arena[*idx]))
    }

    pub fn terminals(&self) -> Vec<(ItemId, &Terminal)> {
        self.get_items_by_type(TypeTag::Terminal)
            .into_iter()
            .filter_map(|(id, e)| e.as_terminal().map(|t| (id.clone(), t)))
            .collect()
    }

    pub fn connections(&self) -> Vec<(ItemId, &ConnectionLine)> {
        self.get_items_by_type(TypeTag::Connection)
            .into_iter()
            .filter_map(|(id, e)| e.as_connection().map(|c| (id.clone(), c)))
            .collect()
    }

    pub fn find_terminal(
        &self,
        mut pred: impl FnMut(&Terminal) -> bool,
    ) -> Option<(ItemId, &Terminal)> {
        self.get_items_by_type(TypeTag::Terminal)
            .into_iter()
            .filter_map(|(id, e)| e.as_terminal().map(|t| (id.clone(), t)))
            .find(|(_, t)| pred(t))
    }

    /// Resolve an endpoint position: point entities directly, by id.
    fn endpoint_pos(&self, id: &str) -> Option<PtS> {
        self.get_item_by_id(id).and_then(|e| e.pos())
    }

    /// Hit-test at a scene point: visible entities within `tolerance`
    /// scene units, topmost (latest-drawn) first.
    pub fn items_at(&self, p: PtS, tolerance: f64) -> Vec<ItemId> {
        let tol2 = tolerance * tolerance;
        let mut hits = Vec::new();
        for (id, idx) in self.order.iter().rev() {
            if self.hidden.contains(id) {
                continue;
            }
            let e = &self.arena[*idx];
            let hit = match e {
                Entity::MapEdge(me) => self.segment_hit(&me.from, &me.to, p, tol2),
                Entity::Connection(c) => self.segment_hit(&c.a, &c.b, p, tol2),
                _ => match e.pos() {
                    Some(q) => glm::length2(&(q - p)) <= tol2,
                    None => false,
                },
            };
            if hit {
                hits.push(id.clone());
            }
        }
        hits
    }

    fn segment_hit(&self, a: &str, b: &str, p: PtS, tol2: f64) -> bool {
        match (self.endpoint_pos(a), self.endpoint_pos(b)) {
            (Some(pa), Some(pb)) => dist_to_line_sqr(p, pa, pb).0 <= tol2,
            _ => false,
        }
    }

    pub fn select(&mut self, id: &str) {
        if self.ids.contains_key(id) {
            self.selection.insert(id.to_string());
        }
    }

    pub fn selected_items(&self) -> Vec<ItemId> {
        self.selection.iter().cloned().collect()
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Hide every entity whose region is not `current`; show the rest.
    /// Applied to the region-edit scene whenever the current region
    /// changes. The global scene is never filtered.
    pub fn apply_region_filter(&mut self, current: &str) {
        self.hidden.clear();
        for (id, idx) in self.ids.iter() {
            if self.arena[*idx].region() != current {
                self.hidden.insert(id.clone());
            }
        }
    }

    pub fn show_all(&mut self) {
        self.hidden.clear();
    }

    pub fn is_visible(&self, id: &str) -> bool {
        self.ids.contains_key(id) && !self.hidden.contains(id)
    }

    /// Drop every entity. The scene owns its entities; clearing releases
    /// them all.
    pub fn clear(&mut self) {
        self.arena = Arena::new();
        self.order.clear();
        self.ids.clear();
        self.by_type.clear();
        self.selection.clear();
        self.hidden.clear();
    }
}
