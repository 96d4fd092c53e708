#![forbid(unsafe_code)]

//! World oracle: everything the engine asks about the simulation it runs in.
//!
//! The engine never inspects world objects directly. Existence, inventories,
//! positions and path lengths all come through [`World`], which keeps the
//! task and logistics code testable against [`SimWorld`].

pub mod sim;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use sim::{SimObject, SimWorld};

pub type RoomName = String;
pub type ObjectId = String;
pub type WorkerId = String;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: u8,
    pub y: u8,
    pub room: RoomName,
}

impl Position {
    #[must_use]
    pub fn new(x: u8, y: u8, room: impl Into<RoomName>) -> Self {
        Self {
            x,
            y,
            room: room.into(),
        }
    }

    /// Chebyshev range; `None` when the positions are in different rooms.
    #[must_use]
    pub fn range_to(&self, other: &Position) -> Option<u32> {
        if self.room != other.room {
            return None;
        }
        let dx = u32::from(self.x.abs_diff(other.x));
        let dy = u32::from(self.y.abs_diff(other.y));
        Some(dx.max(dy))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{},{}", self.room, self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Energy,
    Power,
    Hydrogen,
    Oxygen,
    Utrium,
    Keanium,
    Lemergium,
    Zynthium,
    Catalyst,
    Ghodium,
}

impl ResourceType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Energy => "energy",
            Self::Power => "power",
            Self::Hydrogen => "hydrogen",
            Self::Oxygen => "oxygen",
            Self::Utrium => "utrium",
            Self::Keanium => "keanium",
            Self::Lemergium => "lemergium",
            Self::Zynthium => "zynthium",
            Self::Catalyst => "catalyst",
            Self::Ghodium => "ghodium",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StructureKind {
    Spawn,
    Extension,
    Tower,
    Link,
    PowerSpawn,
    Lab,
    Container,
    Storage,
    Terminal,
    Factory,
    Nuker,
    Road,
    Rampart,
    Wall,
    Controller,
    Extractor,
    Observer,
}

impl StructureKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spawn => "spawn",
            Self::Extension => "extension",
            Self::Tower => "tower",
            Self::Link => "link",
            Self::PowerSpawn => "powerSpawn",
            Self::Lab => "lab",
            Self::Container => "container",
            Self::Storage => "storage",
            Self::Terminal => "terminal",
            Self::Factory => "factory",
            Self::Nuker => "nuker",
            Self::Road => "road",
            Self::Rampart => "rampart",
            Self::Wall => "wall",
            Self::Controller => "controller",
            Self::Extractor => "extractor",
            Self::Observer => "observer",
        }
    }
}

impl fmt::Display for StructureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of world object a record points at. Fixed at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "structure", rename_all = "camelCase")]
pub enum ObjectKind {
    Structure(StructureKind),
    ConstructionSite(StructureKind),
    DroppedResource,
    Tombstone,
    Creep,
    Source,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structure(s) => write!(f, "{s}"),
            Self::ConstructionSite(s) => write!(f, "site({s})"),
            Self::DroppedResource => f.write_str("droppedResource"),
            Self::Tombstone => f.write_str("tombstone"),
            Self::Creep => f.write_str("creep"),
            Self::Source => f.write_str("source"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StoreCapacity {
    /// Piles on the ground have no capacity, only contents.
    #[default]
    None,
    Shared(u32),
    PerResource(BTreeMap<ResourceType, u32>),
}

/// Inventory snapshot of a world object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    #[serde(default)]
    pub used: BTreeMap<ResourceType, u32>,
    #[serde(default)]
    pub capacity: StoreCapacity,
}

impl Store {
    #[must_use]
    pub fn shared(capacity: u32) -> Self {
        Self {
            used: BTreeMap::new(),
            capacity: StoreCapacity::Shared(capacity),
        }
    }

    #[must_use]
    pub fn single(resource: ResourceType, capacity: u32) -> Self {
        Self {
            used: BTreeMap::new(),
            capacity: StoreCapacity::PerResource(BTreeMap::from([(resource, capacity)])),
        }
    }

    #[must_use]
    pub fn pile(resource: ResourceType, amount: u32) -> Self {
        Self {
            used: BTreeMap::from([(resource, amount)]),
            capacity: StoreCapacity::None,
        }
    }

    #[must_use]
    pub fn with(mut self, resource: ResourceType, amount: u32) -> Self {
        self.used.insert(resource, amount);
        self
    }

    #[must_use]
    pub fn used(&self, resource: ResourceType) -> u32 {
        self.used.get(&resource).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total_used(&self) -> u32 {
        self.used.values().sum()
    }

    #[must_use]
    pub fn capacity(&self, resource: ResourceType) -> Option<u32> {
        match &self.capacity {
            StoreCapacity::None => None,
            StoreCapacity::Shared(c) => Some(*c),
            StoreCapacity::PerResource(m) => m.get(&resource).copied(),
        }
    }

    #[must_use]
    pub fn free(&self, resource: ResourceType) -> u32 {
        match &self.capacity {
            StoreCapacity::None => 0,
            StoreCapacity::Shared(c) => c.saturating_sub(self.total_used()),
            StoreCapacity::PerResource(m) => m
                .get(&resource)
                .map_or(0, |c| c.saturating_sub(self.used(resource))),
        }
    }
}

/// A dropped pile or tombstone found by the per-tick scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EphemeralObject {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub pos: Position,
    pub resources: Vec<(ResourceType, u32)>,
}

/// Read-only view of the simulation.
pub trait World {
    fn object_exists(&self, id: &str) -> bool;

    fn object_store(&self, id: &str) -> Option<Store>;

    fn object_position(&self, id: &str) -> Option<Position>;

    /// Path length between two positions, or `None` when no path exists.
    fn path_distance(&self, from: &Position, to: &Position) -> Option<u32>;

    fn ephemeral_objects(&self, room: &str) -> Vec<EphemeralObject>;

    fn structure_at(&self, pos: &Position, kind: StructureKind) -> Option<ObjectId>;

    fn site_at(&self, pos: &Position, kind: StructureKind) -> Option<ObjectId>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_store_free_space_counts_every_resource() {
        let store = Store::shared(100)
            .with(ResourceType::Energy, 30)
            .with(ResourceType::Oxygen, 20);
        assert_eq!(store.free(ResourceType::Energy), 50);
        assert_eq!(store.capacity(ResourceType::Hydrogen), Some(100));
    }

    #[test]
    fn per_resource_store_rejects_other_resources() {
        let store = Store::single(ResourceType::Energy, 50).with(ResourceType::Energy, 49);
        assert_eq!(store.free(ResourceType::Energy), 1);
        assert_eq!(store.free(ResourceType::Oxygen), 0);
        assert_eq!(store.capacity(ResourceType::Oxygen), None);
    }

    #[test]
    fn piles_have_contents_but_no_capacity() {
        let pile = Store::pile(ResourceType::Energy, 75);
        assert_eq!(pile.used(ResourceType::Energy), 75);
        assert_eq!(pile.free(ResourceType::Energy), 0);
        assert_eq!(pile.capacity(ResourceType::Energy), None);
    }

    #[test]
    fn range_is_chebyshev_and_room_local() {
        let a = Position::new(10, 10, "W1N1");
        assert_eq!(a.range_to(&Position::new(13, 15, "W1N1")), Some(5));
        assert_eq!(a.range_to(&Position::new(10, 10, "W2N1")), None);
    }
}
