#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::world::{ObjectId, ObjectKind, Position, ResourceType, RoomName, StructureKind, World};

/// What supplies a resource. Fixed when the entry is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "structure", rename_all = "camelCase")]
pub enum ProviderKind {
    Structure(StructureKind),
    DroppedResource,
    Tombstone,
    Creep,
}

impl ProviderKind {
    /// Maps a world object kind; sites provide as the structure they will become.
    #[must_use]
    pub fn from_object(kind: ObjectKind) -> Option<Self> {
        match kind {
            ObjectKind::Structure(s) | ObjectKind::ConstructionSite(s) => Some(Self::Structure(s)),
            ObjectKind::DroppedResource => Some(Self::DroppedResource),
            ObjectKind::Tombstone => Some(Self::Tombstone),
            ObjectKind::Creep => Some(Self::Creep),
            ObjectKind::Source => None,
        }
    }

    /// Ground piles and tombstones come and go on their own.
    #[must_use]
    pub fn is_ephemeral(self) -> bool {
        matches!(self, Self::DroppedResource | Self::Tombstone)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structure(s) => write!(f, "{s}"),
            Self::DroppedResource => f.write_str("droppedResource"),
            Self::Tombstone => f.write_str("tombstone"),
            Self::Creep => f.write_str("creep"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "structure", rename_all = "camelCase")]
pub enum ConsumerKind {
    Structure(StructureKind),
    Creep,
}

impl ConsumerKind {
    #[must_use]
    pub fn from_object(kind: ObjectKind) -> Option<Self> {
        match kind {
            ObjectKind::Structure(s) | ObjectKind::ConstructionSite(s) => Some(Self::Structure(s)),
            ObjectKind::Creep => Some(Self::Creep),
            _ => None,
        }
    }
}

impl fmt::Display for ConsumerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structure(s) => write!(f, "{s}"),
            Self::Creep => f.write_str("creep"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderStatus {
    Ready,
    UnderConstruction,
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ready => "ready",
            Self::UnderConstruction => "underConstruction",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogisticsRole {
    Provider,
    Consumer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: ObjectId,
    pub kind: ProviderKind,
    pub pos: Position,
    pub resource: ResourceType,
    pub status: ProviderStatus,
    /// Last scanned amount. Display only, never trusted by matching.
    #[serde(skip)]
    pub amount: u32,
}

impl ProviderInfo {
    #[must_use]
    pub fn new(id: impl Into<ObjectId>, kind: ProviderKind, pos: Position, resource: ResourceType) -> Self {
        Self {
            id: id.into(),
            kind,
            pos,
            resource,
            status: ProviderStatus::Ready,
            amount: 0,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: ProviderStatus) -> Self {
        self.status = status;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerInfo {
    pub id: ObjectId,
    pub kind: ConsumerKind,
    pub pos: Position,
    pub resource: ResourceType,
    #[serde(skip)]
    pub needs: u32,
}

impl ConsumerInfo {
    #[must_use]
    pub fn new(id: impl Into<ObjectId>, kind: ConsumerKind, pos: Position, resource: ResourceType) -> Self {
        Self {
            id: id.into(),
            kind,
            pos,
            resource,
            needs: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticsNetwork {
    pub providers: BTreeMap<ObjectId, ProviderInfo>,
    pub consumers: BTreeMap<ObjectId, ConsumerInfo>,
    pub last_updated: u64,
}

impl LogisticsNetwork {
    /// Upserts by id, replacing whatever was there.
    pub fn set_provider(&mut self, provider: ProviderInfo) {
        debug!(id = %provider.id, kind = %provider.kind, resource = %provider.resource, status = %provider.status, "provider set");
        self.providers.insert(provider.id.clone(), provider);
    }

    pub fn set_consumer(&mut self, consumer: ConsumerInfo) {
        debug!(id = %consumer.id, kind = %consumer.kind, resource = %consumer.resource, "consumer set");
        self.consumers.insert(consumer.id.clone(), consumer);
    }

    pub fn remove_provider(&mut self, id: &str) -> Option<ProviderInfo> {
        self.providers.remove(id)
    }

    pub fn remove_consumer(&mut self, id: &str) -> Option<ConsumerInfo> {
        self.consumers.remove(id)
    }

    /// Registers dropped piles and tombstones not yet tracked. Returns how many were added.
    ///
    /// A tombstone holding several resources is tracked for the one it holds most of.
    pub fn scan_ephemeral(&mut self, world: &dyn World, room: &str, tick: u64) -> usize {
        let mut added = 0;
        for obj in world.ephemeral_objects(room) {
            if self.providers.contains_key(&obj.id) {
                continue;
            }
            let Some(kind) = ProviderKind::from_object(obj.kind) else {
                continue;
            };
            let Some((resource, amount)) = obj
                .resources
                .iter()
                .copied()
                .filter(|(_, amount)| *amount > 0)
                .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
            else {
                continue;
            };
            let mut provider = ProviderInfo::new(obj.id, kind, obj.pos, resource);
            provider.amount = amount;
            self.providers.insert(provider.id.clone(), provider);
            added += 1;
        }
        self.last_updated = tick;
        added
    }

    /// Drops entries whose object is gone. Ephemeral providers are always
    /// checked; everything else only when `full` is set.
    pub fn gc(&mut self, world: &dyn World, full: bool) -> usize {
        let before = self.providers.len() + self.consumers.len();
        self.providers
            .retain(|id, p| (!full && !p.kind.is_ephemeral()) || world.object_exists(id));
        if full {
            self.consumers.retain(|id, _| world.object_exists(id));
        }
        before - (self.providers.len() + self.consumers.len())
    }

    /// Moves the record of a finished construction site to the new structure id.
    pub fn migrate_construction(
        &mut self,
        old_id: &str,
        new_id: &str,
        pos: &Position,
        structure: StructureKind,
    ) -> Option<LogisticsRole> {
        if let Some(mut provider) = self.providers.remove(old_id) {
            provider.id = new_id.to_owned();
            provider.pos = pos.clone();
            provider.kind = ProviderKind::Structure(structure);
            if provider.status == ProviderStatus::UnderConstruction {
                provider.status = ProviderStatus::Ready;
            }
            self.providers.insert(new_id.to_owned(), provider);
            return Some(LogisticsRole::Provider);
        }
        if let Some(mut consumer) = self.consumers.remove(old_id) {
            consumer.id = new_id.to_owned();
            consumer.pos = pos.clone();
            consumer.kind = ConsumerKind::Structure(structure);
            self.consumers.insert(new_id.to_owned(), consumer);
            return Some(LogisticsRole::Consumer);
        }
        None
    }

    /// Recomputes the transient `amount` and `needs` fields from live stores.
    pub fn refresh(&mut self, world: &dyn World) {
        for p in self.providers.values_mut() {
            p.amount = world
                .object_store(&p.id)
                .map_or(0, |s| s.used(p.resource));
        }
        for c in self.consumers.values_mut() {
            c.needs = world
                .object_store(&c.id)
                .map_or(0, |s| s.free(c.resource));
        }
    }

    /// Nearest ready provider of `resource` that currently holds some, by path length.
    #[must_use]
    pub fn closest_provider(
        &self,
        world: &dyn World,
        pos: &Position,
        resource: ResourceType,
    ) -> Option<&ProviderInfo> {
        self.providers
            .values()
            .filter(|p| p.status == ProviderStatus::Ready && p.resource == resource)
            .filter(|p| world.object_store(&p.id).is_some_and(|s| s.used(resource) > 0))
            .filter_map(|p| world.path_distance(&p.pos, pos).map(|d| (d, p)))
            .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)))
            .map(|(_, p)| p)
    }
}

/// Logistics networks of every room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticsRegistry {
    pub rooms: BTreeMap<RoomName, LogisticsNetwork>,
}

impl LogisticsRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn network(&self, room: &str) -> Option<&LogisticsNetwork> {
        self.rooms.get(room)
    }

    pub fn network_mut(&mut self, room: &str) -> &mut LogisticsNetwork {
        self.rooms.entry(room.to_owned()).or_default()
    }

    #[must_use]
    pub fn providers(&self, room: &str) -> Vec<&ProviderInfo> {
        self.rooms
            .get(room)
            .map(|n| n.providers.values().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn consumers(&self, room: &str) -> Vec<&ConsumerInfo> {
        self.rooms
            .get(room)
            .map(|n| n.consumers.values().collect())
            .unwrap_or_default()
    }

    pub fn set_provider(&mut self, room: &str, provider: ProviderInfo) {
        self.network_mut(room).set_provider(provider);
    }

    pub fn set_consumer(&mut self, room: &str, consumer: ConsumerInfo) {
        self.network_mut(room).set_consumer(consumer);
    }

    pub fn remove_provider(&mut self, room: &str, id: &str) -> bool {
        self.rooms
            .get_mut(room)
            .and_then(|n| n.remove_provider(id))
            .is_some()
    }

    pub fn remove_consumer(&mut self, room: &str, id: &str) -> bool {
        self.rooms
            .get_mut(room)
            .and_then(|n| n.remove_consumer(id))
            .is_some()
    }

    #[must_use]
    pub fn closest_provider(
        &self,
        world: &dyn World,
        room: &str,
        pos: &Position,
        resource: ResourceType,
    ) -> Option<&ProviderInfo> {
        self.rooms.get(room)?.closest_provider(world, pos, resource)
    }

    /// Registers the site for a planned structure in its logistics role.
    ///
    /// A structure that already stands at the position is registered as
    /// ready instead. Returns false when nothing is there yet.
    pub fn register_plan(
        &mut self,
        world: &dyn World,
        room: &str,
        structure: StructureKind,
        pos: &Position,
        role: LogisticsRole,
        resource: ResourceType,
    ) -> bool {
        let (id, status) = if let Some(id) = world.site_at(pos, structure) {
            (id, ProviderStatus::UnderConstruction)
        } else if let Some(id) = world.structure_at(pos, structure) {
            (id, ProviderStatus::Ready)
        } else {
            debug!(room, %structure, %pos, "planned structure has no site yet");
            return false;
        };

        let network = self.network_mut(room);
        match role {
            LogisticsRole::Provider => network.set_provider(
                ProviderInfo::new(id, ProviderKind::Structure(structure), pos.clone(), resource)
                    .with_status(status),
            ),
            LogisticsRole::Consumer => network.set_consumer(ConsumerInfo::new(
                id,
                ConsumerKind::Structure(structure),
                pos.clone(),
                resource,
            )),
        }
        true
    }

    /// Follows a finished construction site to the structure that replaced it.
    pub fn construction_completed(
        &mut self,
        world: &dyn World,
        pos: &Position,
        structure: StructureKind,
        old_id: &str,
    ) -> bool {
        let Some(new_id) = world.structure_at(pos, structure) else {
            warn!(%pos, %structure, old_id, "completed structure not found");
            return false;
        };
        let Some(network) = self.rooms.get_mut(&pos.room) else {
            return false;
        };
        match network.migrate_construction(old_id, &new_id, pos, structure) {
            Some(role) => {
                info!(room = %pos.room, old_id, new_id = %new_id, ?role, "migrated logistics entry");
                true
            }
            None => {
                debug!(old_id, "completed site had no logistics entry");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{SimObject, SimWorld, Store};

    const ROOM: &str = "W1N1";

    fn pos(x: u8, y: u8) -> Position {
        Position::new(x, y, ROOM)
    }

    fn container(id: &str, at: Position, energy: u32) -> SimObject {
        SimObject::new(id, ObjectKind::Structure(StructureKind::Container), at)
            .with_store(Store::shared(2000).with(ResourceType::Energy, energy))
    }

    #[test]
    fn set_provider_is_an_upsert() {
        let mut net = LogisticsNetwork::default();
        let p = ProviderInfo::new("c1", ProviderKind::Structure(StructureKind::Container), pos(1, 1), ResourceType::Energy);
        net.set_provider(p.clone());
        net.set_provider(p.with_status(ProviderStatus::UnderConstruction));
        assert_eq!(net.providers.len(), 1);
        assert_eq!(net.providers["c1"].status, ProviderStatus::UnderConstruction);
        assert!(net.remove_provider("c1").is_some());
        assert!(net.remove_provider("c1").is_none());
    }

    #[test]
    fn scan_adds_piles_without_touching_registered_entries() {
        let world = SimWorld::from_objects([
            SimObject::new("drop", ObjectKind::DroppedResource, pos(2, 2))
                .with_store(Store::pile(ResourceType::Energy, 30)),
            SimObject::new("tomb", ObjectKind::Tombstone, pos(3, 3)).with_store(
                Store::default()
                    .with(ResourceType::Energy, 5)
                    .with(ResourceType::Hydrogen, 40),
            ),
        ]);
        let mut net = LogisticsNetwork::default();
        let manual = ProviderInfo::new("drop", ProviderKind::DroppedResource, pos(2, 2), ResourceType::Oxygen);
        net.set_provider(manual);

        assert_eq!(net.scan_ephemeral(&world, ROOM, 9), 1);
        assert_eq!(net.providers["drop"].resource, ResourceType::Oxygen);
        assert_eq!(net.providers["tomb"].resource, ResourceType::Hydrogen);
        assert_eq!(net.providers["tomb"].kind, ProviderKind::Tombstone);
        assert_eq!(net.last_updated, 9);
        assert_eq!(net.scan_ephemeral(&world, ROOM, 10), 0);
    }

    #[test]
    fn gc_cadences() {
        let world = SimWorld::new();
        let mut net = LogisticsNetwork::default();
        net.set_provider(ProviderInfo::new("pile", ProviderKind::DroppedResource, pos(1, 1), ResourceType::Energy));
        net.set_provider(ProviderInfo::new("box", ProviderKind::Structure(StructureKind::Container), pos(2, 2), ResourceType::Energy));
        net.set_consumer(ConsumerInfo::new("ext", ConsumerKind::Structure(StructureKind::Extension), pos(3, 3), ResourceType::Energy));

        assert_eq!(net.gc(&world, false), 1);
        assert!(net.providers.contains_key("box"));
        assert_eq!(net.gc(&world, true), 2);
        assert!(net.providers.is_empty());
        assert!(net.consumers.is_empty());
    }

    #[test]
    fn plan_then_completion_migrates_provider() {
        let mut world = SimWorld::from_objects([SimObject::new(
            "site",
            ObjectKind::ConstructionSite(StructureKind::Container),
            pos(8, 8),
        )]);
        let mut reg = LogisticsRegistry::new();
        assert!(reg.register_plan(&world, ROOM, StructureKind::Container, &pos(8, 8), LogisticsRole::Provider, ResourceType::Energy));
        assert_eq!(reg.providers(ROOM)[0].status, ProviderStatus::UnderConstruction);

        assert!(world.complete_site("site", "box", Some(Store::shared(2000))));
        assert!(reg.construction_completed(&world, &pos(8, 8), StructureKind::Container, "site"));

        let providers = reg.providers(ROOM);
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].id, "box");
        assert_eq!(providers[0].status, ProviderStatus::Ready);
        assert_eq!(providers[0].resource, ResourceType::Energy);
    }

    #[test]
    fn plan_without_site_is_skipped() {
        let world = SimWorld::new();
        let mut reg = LogisticsRegistry::new();
        assert!(!reg.register_plan(&world, ROOM, StructureKind::Tower, &pos(4, 4), LogisticsRole::Consumer, ResourceType::Energy));
        assert!(reg.consumers(ROOM).is_empty());
    }

    #[test]
    fn consumer_migration_keeps_role() {
        let mut net = LogisticsNetwork::default();
        net.set_consumer(ConsumerInfo::new("site", ConsumerKind::Structure(StructureKind::Tower), pos(4, 4), ResourceType::Energy));
        let role = net.migrate_construction("site", "tower1", &pos(4, 4), StructureKind::Tower);
        assert_eq!(role, Some(LogisticsRole::Consumer));
        assert!(net.consumers.contains_key("tower1"));
        assert!(!net.consumers.contains_key("site"));
    }

    #[test]
    fn closest_provider_skips_empty_and_unreachable() {
        let mut world = SimWorld::from_objects([
            container("near-empty", pos(11, 10), 0),
            container("blocked", pos(12, 10), 100),
            container("far", pos(20, 10), 100),
        ]);
        world.block(pos(12, 10));
        let mut reg = LogisticsRegistry::new();
        for (id, x) in [("near-empty", 11), ("blocked", 12), ("far", 20)] {
            reg.set_provider(ROOM, ProviderInfo::new(id, ProviderKind::Structure(StructureKind::Container), pos(x, 10), ResourceType::Energy));
        }

        let found = reg.closest_provider(&world, ROOM, &pos(10, 10), ResourceType::Energy);
        assert_eq!(found.map(|p| p.id.as_str()), Some("far"));
        assert!(reg.closest_provider(&world, ROOM, &pos(10, 10), ResourceType::Oxygen).is_none());
    }

    #[test]
    fn transient_fields_are_not_persisted() {
        let mut net = LogisticsNetwork::default();
        let mut p = ProviderInfo::new("box", ProviderKind::Structure(StructureKind::Container), pos(1, 1), ResourceType::Energy);
        p.amount = 500;
        net.set_provider(p);
        let json = serde_json::to_string(&net).unwrap();
        let back: LogisticsNetwork = serde_json::from_str(&json).unwrap();
        assert_eq!(back.providers["box"].amount, 0);
    }
}
