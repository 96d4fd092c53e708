#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{EphemeralObject, ObjectId, ObjectKind, Position, ResourceType, Store, StructureKind, World};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimObject {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub pos: Position,
    #[serde(default)]
    pub store: Option<Store>,
}

impl SimObject {
    #[must_use]
    pub fn new(id: impl Into<ObjectId>, kind: ObjectKind, pos: Position) -> Self {
        Self {
            id: id.into(),
            kind,
            pos,
            store: None,
        }
    }

    #[must_use]
    pub fn with_store(mut self, store: Store) -> Self {
        self.store = Some(store);
        self
    }
}

/// In-memory world: objects keyed by id, range-based path lengths and a set
/// of blocked tiles that no path can reach.
#[derive(Debug, Clone, Default)]
pub struct SimWorld {
    objects: BTreeMap<ObjectId, SimObject>,
    blocked: BTreeSet<Position>,
}

impl SimWorld {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_objects(objects: impl IntoIterator<Item = SimObject>) -> Self {
        let mut world = Self::new();
        for obj in objects {
            world.insert(obj);
        }
        world
    }

    pub fn insert(&mut self, obj: SimObject) {
        self.objects.insert(obj.id.clone(), obj);
    }

    pub fn remove(&mut self, id: &str) -> Option<SimObject> {
        self.objects.remove(id)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&SimObject> {
        self.objects.get(id)
    }

    pub fn objects(&self) -> impl Iterator<Item = &SimObject> {
        self.objects.values()
    }

    #[must_use]
    pub fn rooms(&self) -> BTreeSet<String> {
        self.objects.values().map(|o| o.pos.room.clone()).collect()
    }

    pub fn block(&mut self, pos: Position) {
        self.blocked.insert(pos);
    }

    /// Moves up to `amount` of `resource` between two stores, returns what moved.
    ///
    /// Ground piles and tombstones that end up empty disappear, as they do in game.
    pub fn transfer(&mut self, from: &str, to: &str, resource: ResourceType, amount: u32) -> u32 {
        let available = self
            .objects
            .get(from)
            .and_then(|o| o.store.as_ref())
            .map_or(0, |s| s.used(resource));
        let room = self
            .objects
            .get(to)
            .and_then(|o| o.store.as_ref())
            .map_or(0, |s| s.free(resource));
        let moved = amount.min(available).min(room);
        if moved == 0 {
            return 0;
        }

        if let Some(store) = self.objects.get_mut(from).and_then(|o| o.store.as_mut()) {
            let left = store.used(resource) - moved;
            if left == 0 {
                store.used.remove(&resource);
            } else {
                store.used.insert(resource, left);
            }
        }
        if let Some(store) = self.objects.get_mut(to).and_then(|o| o.store.as_mut()) {
            *store.used.entry(resource).or_insert(0) += moved;
        }

        let drained = self.objects.get(from).is_some_and(|o| {
            matches!(o.kind, ObjectKind::DroppedResource | ObjectKind::Tombstone)
                && o.store.as_ref().is_none_or(|s| s.total_used() == 0)
        });
        if drained {
            self.objects.remove(from);
        }
        moved
    }

    pub fn set_position(&mut self, id: &str, pos: Position) -> bool {
        match self.objects.get_mut(id) {
            Some(obj) => {
                obj.pos = pos;
                true
            }
            None => false,
        }
    }

    /// Empties `resource` out of the holder onto a new ground pile at its feet.
    pub fn drop_resource(&mut self, holder: &str, resource: ResourceType, pile_id: impl Into<ObjectId>) -> u32 {
        let Some(obj) = self.objects.get_mut(holder) else {
            return 0;
        };
        let Some(amount) = obj.store.as_mut().and_then(|s| s.used.remove(&resource)) else {
            return 0;
        };
        let pos = obj.pos.clone();
        self.insert(
            SimObject::new(pile_id, ObjectKind::DroppedResource, pos)
                .with_store(Store::pile(resource, amount)),
        );
        amount
    }

    /// Replaces a construction site with the finished structure.
    pub fn complete_site(&mut self, site_id: &str, new_id: impl Into<ObjectId>, store: Option<Store>) -> bool {
        let Some(site) = self.objects.remove(site_id) else {
            return false;
        };
        let ObjectKind::ConstructionSite(kind) = site.kind else {
            self.objects.insert(site.id.clone(), site);
            return false;
        };
        self.insert(SimObject {
            id: new_id.into(),
            kind: ObjectKind::Structure(kind),
            pos: site.pos,
            store,
        });
        true
    }

    fn find_at(&self, pos: &Position, kind: ObjectKind) -> Option<ObjectId> {
        self.objects
            .values()
            .find(|o| o.pos == *pos && o.kind == kind)
            .map(|o| o.id.clone())
    }
}

impl World for SimWorld {
    fn object_exists(&self, id: &str) -> bool {
        self.objects.contains_key(id)
    }

    fn object_store(&self, id: &str) -> Option<Store> {
        self.objects.get(id).and_then(|o| o.store.clone())
    }

    fn object_position(&self, id: &str) -> Option<Position> {
        self.objects.get(id).map(|o| o.pos.clone())
    }

    fn path_distance(&self, from: &Position, to: &Position) -> Option<u32> {
        if self.blocked.contains(from) || self.blocked.contains(to) {
            return None;
        }
        from.range_to(to)
    }

    fn ephemeral_objects(&self, room: &str) -> Vec<EphemeralObject> {
        self.objects
            .values()
            .filter(|o| o.pos.room == room)
            .filter(|o| matches!(o.kind, ObjectKind::DroppedResource | ObjectKind::Tombstone))
            .filter_map(|o| {
                let store = o.store.as_ref()?;
                let resources: Vec<(ResourceType, u32)> = store
                    .used
                    .iter()
                    .filter(|(_, amount)| **amount > 0)
                    .map(|(r, amount)| (*r, *amount))
                    .collect();
                if resources.is_empty() {
                    return None;
                }
                Some(EphemeralObject {
                    id: o.id.clone(),
                    kind: o.kind,
                    pos: o.pos.clone(),
                    resources,
                })
            })
            .collect()
    }

    fn structure_at(&self, pos: &Position, kind: StructureKind) -> Option<ObjectId> {
        self.find_at(pos, ObjectKind::Structure(kind))
    }

    fn site_at(&self, pos: &Position, kind: StructureKind) -> Option<ObjectId> {
        self.find_at(pos, ObjectKind::ConstructionSite(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(x: u8, y: u8) -> Position {
        Position::new(x, y, "W1N1")
    }

    #[test]
    fn transfer_moves_resources_and_drops_empty_piles() {
        let mut world = SimWorld::from_objects([
            SimObject::new("pile", ObjectKind::DroppedResource, pos(1, 1))
                .with_store(Store::pile(ResourceType::Energy, 40)),
            SimObject::new("spawn", ObjectKind::Structure(StructureKind::Spawn), pos(2, 2))
                .with_store(Store::single(ResourceType::Energy, 300)),
        ]);

        assert_eq!(world.transfer("pile", "spawn", ResourceType::Energy, 100), 40);
        assert!(!world.object_exists("pile"));
        assert_eq!(
            world.object_store("spawn").unwrap().used(ResourceType::Energy),
            40
        );
    }

    #[test]
    fn blocked_tiles_are_unreachable() {
        let mut world = SimWorld::new();
        world.block(pos(5, 5));
        assert_eq!(world.path_distance(&pos(1, 1), &pos(5, 5)), None);
        assert_eq!(world.path_distance(&pos(1, 1), &pos(4, 5)), Some(4));
    }

    #[test]
    fn ephemeral_scan_skips_structures_and_empty_tombstones() {
        let world = SimWorld::from_objects([
            SimObject::new("tomb", ObjectKind::Tombstone, pos(3, 3)).with_store(Store::default()),
            SimObject::new("drop", ObjectKind::DroppedResource, pos(4, 4))
                .with_store(Store::pile(ResourceType::Oxygen, 5)),
            SimObject::new("box", ObjectKind::Structure(StructureKind::Container), pos(5, 5))
                .with_store(Store::shared(2000).with(ResourceType::Energy, 10)),
        ]);
        let found = world.ephemeral_objects("W1N1");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "drop");
    }

    #[test]
    fn dropping_creates_a_pile_under_the_holder() {
        let mut world = SimWorld::from_objects([SimObject::new("w1", ObjectKind::Creep, pos(6, 6))
            .with_store(Store::shared(50).with(ResourceType::Energy, 20))]);
        assert_eq!(world.drop_resource("w1", ResourceType::Energy, "pile1"), 20);
        assert_eq!(world.get("pile1").map(|o| o.pos.clone()), Some(pos(6, 6)));
        assert_eq!(world.drop_resource("w1", ResourceType::Energy, "pile2"), 0);
        assert!(world.get("pile2").is_none());
    }

    #[test]
    fn completing_a_site_swaps_ids() {
        let mut world = SimWorld::from_objects([SimObject::new(
            "site1",
            ObjectKind::ConstructionSite(StructureKind::Extension),
            pos(7, 7),
        )]);
        assert!(world.complete_site("site1", "ext1", None));
        assert_eq!(world.structure_at(&pos(7, 7), StructureKind::Extension).as_deref(), Some("ext1"));
        assert!(world.site_at(&pos(7, 7), StructureKind::Extension).is_none());
    }
}
