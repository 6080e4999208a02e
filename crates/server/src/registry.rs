use std::collections::{BTreeMap, HashMap};
use std::f32::consts::TAU;

use glam::Vec3;

use spacegame::net::PlayerRecord;
use spacegame::{ColliderId, KeyMap, Laser, PeerId, ShipMotion, Transform};

pub type EntityId = u32;

#[derive(Debug, Clone, Default)]
pub struct ShipState {
    pub id: EntityId,
    pub input: KeyMap,
    pub transform: Transform,
    pub motion: ShipMotion,
}

impl ShipState {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn record(&self) -> PlayerRecord {
        PlayerRecord {
            entity_id: self.id,
            position: self.transform.position().into(),
            linear_velocity: self.motion.linear_velocity.into(),
            reserved: Vec3::ZERO.into(),
            orientation: self.transform.orientation().into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnPoint {
    pub position: Vec3,
    pub owner: Option<EntityId>,
}

/// Authoritative players, lasers, spawn points and peer bindings.
pub struct Registry {
    next_entity_id: EntityId,
    connections: HashMap<PeerId, EntityId>,
    ships: BTreeMap<EntityId, ShipState>,
    lasers: BTreeMap<EntityId, Laser>,
    colliders: BTreeMap<EntityId, ColliderId>,
    spawn_points: Vec<SpawnPoint>,
}

impl Registry {
    pub fn new(spawn_point_count: usize, spawn_radius: f32) -> Self {
        let spawn_points = (0..spawn_point_count)
            .map(|i| {
                let angle = TAU * i as f32 / spawn_point_count as f32;
                SpawnPoint {
                    position: Vec3::new(angle.sin(), 0.0, angle.cos()) * spawn_radius,
                    owner: None,
                }
            })
            .collect();

        Self {
            next_entity_id: 1,
            connections: HashMap::new(),
            ships: BTreeMap::new(),
            lasers: BTreeMap::new(),
            colliders: BTreeMap::new(),
            spawn_points,
        }
    }

    pub fn allocate_id(&mut self) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    /// Fails if either side is already bound.
    pub fn bind(&mut self, peer: PeerId, entity: EntityId) -> bool {
        if self.connections.contains_key(&peer) || self.connections.values().any(|&e| e == entity)
        {
            return false;
        }
        self.connections.insert(peer, entity);
        true
    }

    pub fn unbind(&mut self, peer: PeerId) -> Option<EntityId> {
        self.connections.remove(&peer)
    }

    pub fn entity_for(&self, peer: PeerId) -> Option<EntityId> {
        self.connections.get(&peer).copied()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn insert_ship(&mut self, ship: ShipState) {
        self.ships.insert(ship.id, ship);
    }

    pub fn remove_ship(&mut self, id: EntityId) -> Option<ShipState> {
        self.ships.remove(&id)
    }

    pub fn ship(&self, id: EntityId) -> Option<&ShipState> {
        self.ships.get(&id)
    }

    pub fn ship_mut(&mut self, id: EntityId) -> Option<&mut ShipState> {
        self.ships.get_mut(&id)
    }

    pub fn ships(&self) -> impl Iterator<Item = &ShipState> {
        self.ships.values()
    }

    pub fn ship_ids(&self) -> Vec<EntityId> {
        self.ships.keys().copied().collect()
    }

    pub fn ship_count(&self) -> usize {
        self.ships.len()
    }

    pub fn insert_laser(&mut self, laser: Laser) {
        self.lasers.insert(laser.id, laser);
    }

    pub fn remove_laser(&mut self, id: EntityId) -> Option<Laser> {
        self.lasers.remove(&id)
    }

    pub fn laser(&self, id: EntityId) -> Option<&Laser> {
        self.lasers.get(&id)
    }

    pub fn lasers(&self) -> impl Iterator<Item = &Laser> {
        self.lasers.values()
    }

    pub fn lasers_mut(&mut self) -> impl Iterator<Item = &mut Laser> {
        self.lasers.values_mut()
    }

    pub fn laser_count(&self) -> usize {
        self.lasers.len()
    }

    pub fn set_collider(&mut self, entity: EntityId, collider: ColliderId) {
        self.colliders.insert(entity, collider);
    }

    pub fn collider(&self, entity: EntityId) -> Option<ColliderId> {
        self.colliders.get(&entity).copied()
    }

    pub fn remove_collider(&mut self, entity: EntityId) -> Option<ColliderId> {
        self.colliders.remove(&entity)
    }

    /// `None` means the collider belongs to the environment.
    pub fn entity_for_collider(&self, collider: ColliderId) -> Option<EntityId> {
        self.colliders
            .iter()
            .find(|&(_, &c)| c == collider)
            .map(|(&entity, _)| entity)
    }

    /// Claims the first free spawn point. An entity holds at most one.
    pub fn claim_spawn_point(&mut self, entity: EntityId) -> Option<usize> {
        if let Some(index) = self.spawn_point_index(entity) {
            return Some(index);
        }

        let index = self.spawn_points.iter().position(|p| p.owner.is_none())?;
        self.spawn_points[index].owner = Some(entity);
        Some(index)
    }

    /// Takes over the first point whose owner no longer has a ship.
    pub fn reclaim_spawn_point(&mut self, entity: EntityId) -> Option<usize> {
        if let Some(index) = self.spawn_point_index(entity) {
            return Some(index);
        }

        let index = self.spawn_points.iter().position(|p| match p.owner {
            Some(owner) => !self.ships.contains_key(&owner),
            None => true,
        })?;
        self.spawn_points[index].owner = Some(entity);
        Some(index)
    }

    pub fn spawn_point_index(&self, entity: EntityId) -> Option<usize> {
        self.spawn_points
            .iter()
            .position(|p| p.owner == Some(entity))
    }

    pub fn spawn_point_of(&self, entity: EntityId) -> Option<&SpawnPoint> {
        self.spawn_point_index(entity)
            .map(|index| &self.spawn_points[index])
    }

    pub fn free_spawn_point(&mut self, entity: EntityId) -> bool {
        match self.spawn_point_index(entity) {
            Some(index) => {
                self.spawn_points[index].owner = None;
                true
            }
            None => false,
        }
    }

    pub fn spawn_points(&self) -> &[SpawnPoint] {
        &self.spawn_points
    }

    pub fn player_records(&self) -> Vec<PlayerRecord> {
        self.ships.values().map(ShipState::record).collect()
    }
}
