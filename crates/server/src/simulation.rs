use std::collections::BTreeSet;

use glam::Vec3;

use spacegame::map::{AsteroidField, AsteroidFieldConfig};
use spacegame::math::facing;
use spacegame::net::protocol;
use spacegame::ship::hull_rays;
use spacegame::{
    Clock, ColliderMeshId, ColliderShape, CollisionWorld, KeyMap, Keys, Laser, Message,
    NetHandler, Outbound, PeerId, ShipConfig, Transform,
};

use crate::config::ServerConfig;
use crate::events::{EventQueue, GameEvent, ServerEvent};
use crate::registry::{EntityId, Registry, ShipState};

fn send_message(out: &mut dyn Outbound, peer: PeerId, message: &Message) {
    match message.encode() {
        Ok(data) => out.send(peer, &data),
        Err(e) => log::warn!("Failed to encode {:?}: {}", message.kind(), e),
    }
}

fn broadcast_message(out: &mut dyn Outbound, message: &Message) {
    match message.encode() {
        Ok(data) => out.broadcast(&data),
        Err(e) => log::warn!("Failed to encode {:?}: {}", message.kind(), e),
    }
}

/// Authoritative game state advanced one fixed tick at a time.
pub struct ServerSimulation<W: CollisionWorld> {
    config: ServerConfig,
    ship_config: ShipConfig,
    registry: Registry,
    events: EventQueue,
    world: W,
    clock: Box<dyn Clock>,
    ship_mesh: ColliderMeshId,
    lasers_to_remove: BTreeSet<EntityId>,
    notices: Vec<ServerEvent>,
    tick: u64,
}

impl<W: CollisionWorld> ServerSimulation<W> {
    pub fn new(config: ServerConfig, mut world: W, clock: Box<dyn Clock>) -> Self {
        let registry = Registry::new(config.spawn_point_count, config.spawn_radius);
        let ship_mesh = world.register_shape(ColliderShape::ship_hull());

        if let Some(seed) = config.asteroid_seed {
            let keep_clear: Vec<Vec3> =
                registry.spawn_points().iter().map(|p| p.position).collect();
            let field =
                AsteroidField::generate(&AsteroidFieldConfig::default(), seed, &keep_clear);
            field.populate(&mut world);
            log::info!("Placed {} asteroids", field.len());
        }

        Self {
            config,
            ship_config: ShipConfig::default(),
            registry,
            events: EventQueue::new(),
            world,
            clock,
            ship_mesh,
            lasers_to_remove: BTreeSet::new(),
            notices: Vec::new(),
            tick: 0,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn drain_notices(&mut self) -> Vec<ServerEvent> {
        std::mem::take(&mut self.notices)
    }

    /// Everything after the transport poll: collisions, lasers, ships, removals, broadcast.
    pub fn step(&mut self, out: &mut dyn Outbound) {
        let now = self.clock.now_ms();
        let dt = self.config.dt();

        self.world.sync();
        self.check_collisions();
        self.update_lasers(now, dt);
        self.update_ships(now, dt);
        self.remove_lasers();

        self.tick += 1;
        if self.tick % self.config.broadcast_interval_ticks.max(1) as u64 == 0 {
            self.flush(out, now);
        }
    }

    /// True if any hull probe of the ship touches something other than itself.
    pub fn ship_collides(&self, id: EntityId) -> bool {
        let Some(ship) = self.registry.ship(id) else {
            return false;
        };

        let own = self.registry.collider(id);
        let origin = ship.transform.position();
        hull_rays(&self.ship_config, ship.transform.orientation())
            .any(|(dir, len)| self.world.raycast(origin, dir, len, own).is_some())
    }

    fn check_collisions(&mut self) {
        let crashed: Vec<EntityId> = self
            .registry
            .ships()
            .map(|ship| ship.id)
            .filter(|&id| self.ship_collides(id))
            .collect();

        for id in crashed {
            log::debug!("Ship {} hit the environment", id);
            self.notices.push(ServerEvent::PlayerCrashed { entity_id: id });
            self.events.push(GameEvent::Respawn(id));
        }

        let mut hits = Vec::new();
        for laser in self.registry.lasers() {
            let sender = self.registry.collider(laser.sender_id);
            let (origin, dir, len) = laser.hit_ray(self.ship_config.laser_ray_length);
            if let Some(hit) = self.world.raycast(origin, dir, len, sender) {
                let target = self.registry.entity_for_collider(hit.collider);
                hits.push((laser.id, laser.sender_id, target));
            }
        }

        for (laser_id, shooter, target) in hits {
            match target {
                Some(victim) if victim == shooter => continue,
                Some(victim) => {
                    log::info!("Laser {} from ship {} hit ship {}", laser_id, shooter, victim);
                    self.notices.push(ServerEvent::PlayerHit { shooter, victim });
                    self.events.push(GameEvent::Collision { shooter, victim });
                    self.events.push(GameEvent::Respawn(victim));
                }
                None => log::debug!("Laser {} hit an asteroid", laser_id),
            }
            self.mark_laser_removed(laser_id);
        }
    }

    fn update_lasers(&mut self, now: u64, dt: f32) {
        let mut expired = Vec::new();
        for laser in self.registry.lasers_mut() {
            if laser.is_expired(now) {
                expired.push(laser.id);
            }
            laser.update(dt);
        }

        for id in expired {
            self.mark_laser_removed(id);
        }
    }

    fn mark_laser_removed(&mut self, id: EntityId) {
        if self.lasers_to_remove.insert(id) {
            self.events.push(GameEvent::DespawnLaser(id));
        }
    }

    fn update_ships(&mut self, now: u64, dt: f32) {
        for id in self.registry.ship_ids() {
            let Some(ship) = self.registry.ship_mut(id) else {
                continue;
            };

            let muzzle = ship.input.take_fire().then(|| ship.transform.clone());
            ship.motion
                .step(&self.ship_config, ship.input.keys, &mut ship.transform, dt);
            let transform = ship.transform.clone();

            if let Some(muzzle) = muzzle {
                self.spawn_laser(id, &muzzle, now);
            }
            if let Some(collider) = self.registry.collider(id) {
                self.world.set_transform(collider, &transform);
            }
        }
    }

    fn spawn_laser(&mut self, sender: EntityId, muzzle: &Transform, now: u64) {
        let id = self.registry.allocate_id();
        let laser = Laser::new(
            id,
            sender,
            muzzle,
            self.ship_config.laser_speed,
            now,
            self.config.laser_lifetime_ms,
        );

        log::debug!("Ship {} fired laser {}", sender, id);
        self.events.push(GameEvent::SpawnLaser(laser.record()));
        self.registry.insert_laser(laser);
    }

    fn remove_lasers(&mut self) {
        for id in std::mem::take(&mut self.lasers_to_remove) {
            self.registry.remove_laser(id);
        }
    }

    /// Moves the ship to its spawn point facing the origin and parks its collider there.
    fn place_at_spawn(&mut self, id: EntityId) -> bool {
        let Some(position) = self.registry.spawn_point_of(id).map(|p| p.position) else {
            log::warn!("Ship {} has no spawn point", id);
            return false;
        };
        let transform = Transform::new(position, facing(position, Vec3::ZERO));

        let Some(ship) = self.registry.ship_mut(id) else {
            return false;
        };
        ship.transform = transform.clone();
        ship.motion.reset();

        match self.registry.collider(id) {
            Some(collider) => self.world.set_transform(collider, &transform),
            None => {
                let collider = self.world.create_collider(self.ship_mesh, &transform);
                self.registry.set_collider(id, collider);
            }
        }
        true
    }

    fn flush(&mut self, out: &mut dyn Outbound, now: u64) {
        for event in self.events.drain() {
            match event {
                GameEvent::SpawnPlayer(id) => {
                    if let Some(ship) = self.registry.ship(id) {
                        broadcast_message(out, &Message::SpawnPlayer(ship.record()));
                    }
                }
                GameEvent::DespawnPlayer(id) => {
                    broadcast_message(out, &protocol::despawn_player(id));
                }
                GameEvent::Respawn(id) => {
                    if self.registry.ship(id).is_none() {
                        continue;
                    }
                    broadcast_message(out, &protocol::despawn_player(id));
                    self.place_at_spawn(id);
                    if let Some(ship) = self.registry.ship(id) {
                        broadcast_message(out, &Message::SpawnPlayer(ship.record()));
                    }
                }
                GameEvent::SpawnLaser(record) => {
                    broadcast_message(out, &Message::SpawnLaser(record));
                }
                GameEvent::DespawnLaser(id) => {
                    broadcast_message(out, &protocol::despawn_laser(id));
                }
                GameEvent::Collision { shooter, victim } => {
                    broadcast_message(out, &protocol::collision(shooter, victim));
                }
            }
        }

        for ship in self.registry.ships() {
            broadcast_message(out, &protocol::update_player(now, ship.record()));
        }
    }
}

impl<W: CollisionWorld> NetHandler for ServerSimulation<W> {
    fn on_connect(&mut self, out: &mut dyn Outbound, peer: PeerId) {
        if self.registry.entity_for(peer).is_some() {
            log::warn!("Peer {} connected twice", peer.0);
            return;
        }

        let id = self.registry.allocate_id();
        let claimed = self
            .registry
            .claim_spawn_point(id)
            .or_else(|| self.registry.reclaim_spawn_point(id));
        if claimed.is_none() {
            log::warn!("No free spawn point, refusing peer {}", peer.0);
            send_message(
                out,
                peer,
                &Message::TextToClient(protocol::TextMessage {
                    text: "Server is full".to_string(),
                }),
            );
            return;
        }

        let now = self.clock.now_ms();
        send_message(out, peer, &protocol::client_connect(id, now));

        let lasers = self.registry.lasers().map(Laser::record).collect();
        send_message(
            out,
            peer,
            &protocol::game_state(self.registry.player_records(), lasers),
        );

        self.registry.bind(peer, id);
        self.registry.insert_ship(ShipState::new(id));
        self.place_at_spawn(id);
        self.events.push(GameEvent::SpawnPlayer(id));

        log::info!("Peer {} joined as ship {}", peer.0, id);
        self.notices
            .push(ServerEvent::PlayerJoined { peer, entity_id: id });
    }

    fn on_receive(&mut self, out: &mut dyn Outbound, peer: PeerId, data: &[u8]) {
        let message = match Message::decode(data) {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(e) => {
                log::debug!("Dropping packet from peer {}: {}", peer.0, e);
                return;
            }
        };

        match message {
            Message::Input(sample) => {
                let Some(id) = self.registry.entity_for(peer) else {
                    return;
                };
                if let Some(ship) = self.registry.ship_mut(id) {
                    ship.input
                        .merge(KeyMap::new(Keys::from_wire(sample.keys), sample.client_time_ms));
                }
            }
            Message::TextToServer(text) => {
                let entity_id = self.registry.entity_for(peer);
                log::info!("Chat from {:?}: {}", entity_id, text.text);
                broadcast_message(out, &Message::TextToClient(text.clone()));
                self.notices.push(ServerEvent::Chat {
                    entity_id,
                    text: text.text,
                });
            }
            other => log::trace!("Ignoring {:?} from peer {}", other.kind(), peer.0),
        }
    }

    fn on_disconnect(&mut self, _out: &mut dyn Outbound, peer: PeerId) {
        let Some(id) = self.registry.unbind(peer) else {
            return;
        };

        if let Some(collider) = self.registry.remove_collider(id) {
            self.world.remove_collider(collider);
        }
        self.events.push(GameEvent::DespawnPlayer(id));
        self.registry.remove_ship(id);
        if self.config.free_spawn_point_on_disconnect {
            self.registry.free_spawn_point(id);
        }

        log::info!("Ship {} left", id);
        self.notices.push(ServerEvent::PlayerLeft { entity_id: id });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use glam::Quat;

    use spacegame::net::{GameState, PlayerRecord};
    use spacegame::{ColliderId, ManualClock, RayHit};

    use super::*;

    /// Every collider is a sphere; rays hit the nearest one.
    #[derive(Default)]
    struct SphereWorld {
        radii: Vec<f32>,
        spheres: HashMap<ColliderId, (Vec3, f32)>,
        next_id: u32,
        syncs: usize,
    }

    impl SphereWorld {
        fn add_obstacle(&mut self, center: Vec3, radius: f32) -> ColliderId {
            let mesh = self.register_shape(ColliderShape::Ball { radius });
            self.create_collider(mesh, &Transform::new(center, Quat::IDENTITY))
        }
    }

    impl CollisionWorld for SphereWorld {
        fn register_shape(&mut self, shape: ColliderShape) -> ColliderMeshId {
            let radius = match shape {
                ColliderShape::Ball { radius } => radius,
                ColliderShape::Cuboid { half_extents } => half_extents.max_element(),
            };
            self.radii.push(radius);
            ColliderMeshId(self.radii.len() as u32 - 1)
        }

        fn create_collider(&mut self, mesh: ColliderMeshId, transform: &Transform) -> ColliderId {
            self.next_id += 1;
            let id = ColliderId(self.next_id);
            self.spheres
                .insert(id, (transform.position(), self.radii[mesh.0 as usize]));
            id
        }

        fn set_transform(&mut self, collider: ColliderId, transform: &Transform) {
            if let Some(sphere) = self.spheres.get_mut(&collider) {
                sphere.0 = transform.position();
            }
        }

        fn remove_collider(&mut self, collider: ColliderId) {
            self.spheres.remove(&collider);
        }

        fn raycast(
            &self,
            origin: Vec3,
            direction: Vec3,
            max_distance: f32,
            exclude: Option<ColliderId>,
        ) -> Option<RayHit> {
            self.spheres
                .iter()
                .filter(|&(id, _)| Some(*id) != exclude)
                .filter_map(|(&id, &(center, radius))| {
                    let to_center = center - origin;
                    if to_center.length() <= radius {
                        return Some((id, 0.0));
                    }
                    let along = to_center.dot(direction);
                    let closest = (to_center - direction * along).length();
                    if along < 0.0 || closest > radius {
                        return None;
                    }
                    let distance = along - (radius * radius - closest * closest).sqrt();
                    (distance <= max_distance).then_some((id, distance))
                })
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(collider, distance)| RayHit {
                    point: origin + direction * distance,
                    distance,
                    collider,
                })
        }

        fn sync(&mut self) {
            self.syncs += 1;
        }
    }

    #[derive(Default)]
    struct RecordingOutbound {
        sent: Vec<(PeerId, Message)>,
        broadcasts: Vec<Message>,
    }

    impl Outbound for RecordingOutbound {
        fn send(&mut self, peer: PeerId, data: &[u8]) {
            if let Ok(Some(message)) = Message::decode(data) {
                self.sent.push((peer, message));
            }
        }

        fn broadcast(&mut self, data: &[u8]) {
            if let Ok(Some(message)) = Message::decode(data) {
                self.broadcasts.push(message);
            }
        }
    }

    impl RecordingOutbound {
        fn count(&self, pred: impl Fn(&Message) -> bool) -> usize {
            self.broadcasts.iter().filter(|&m| pred(m)).count()
        }
    }

    const START_MS: u64 = 1_000_000;
    const TICK_MS: u64 = 20;

    fn config() -> ServerConfig {
        ServerConfig {
            asteroid_seed: None,
            ..Default::default()
        }
    }

    fn simulation() -> (ServerSimulation<SphereWorld>, ManualClock) {
        simulation_with(config())
    }

    fn simulation_with(config: ServerConfig) -> (ServerSimulation<SphereWorld>, ManualClock) {
        let clock = ManualClock::new(START_MS);
        let sim = ServerSimulation::new(config, SphereWorld::default(), Box::new(clock.clone()));
        (sim, clock)
    }

    fn run_ticks(
        sim: &mut ServerSimulation<SphereWorld>,
        clock: &ManualClock,
        out: &mut RecordingOutbound,
        ticks: usize,
    ) {
        for _ in 0..ticks {
            clock.advance(TICK_MS);
            sim.step(out);
        }
    }

    fn send_input(sim: &mut ServerSimulation<SphereWorld>, peer: PeerId, keys: Keys, time: u64) {
        let data = protocol::input(time, keys.bits()).encode().unwrap();
        sim.on_receive(&mut RecordingOutbound::default(), peer, &data);
    }

    fn teleport(sim: &mut ServerSimulation<SphereWorld>, id: EntityId, transform: Transform) {
        let collider = sim.registry.collider(id).unwrap();
        sim.world.set_transform(collider, &transform);
        sim.registry.ship_mut(id).unwrap().transform = transform;
    }

    fn position(record: &PlayerRecord) -> Vec3 {
        record.position.into()
    }

    #[test]
    fn test_first_connect_sequence() {
        let (mut sim, clock) = simulation();
        let mut out = RecordingOutbound::default();

        sim.on_connect(&mut out, PeerId(1));

        assert_eq!(out.sent.len(), 2);
        assert_eq!(
            out.sent[0],
            (PeerId(1), protocol::client_connect(1, START_MS))
        );
        assert_eq!(out.sent[1], (PeerId(1), Message::GameState(GameState::default())));

        run_ticks(&mut sim, &clock, &mut out, 9);
        assert!(out.broadcasts.is_empty());

        run_ticks(&mut sim, &clock, &mut out, 1);
        let Message::SpawnPlayer(record) = &out.broadcasts[0] else {
            panic!("expected SpawnPlayer, got {:?}", out.broadcasts[0]);
        };
        assert_eq!(record.entity_id, 1);
        assert!((position(record) - Vec3::new(0.0, 0.0, 100.0)).length() < 1e-3);

        let forward = Quat::from(record.orientation) * Vec3::Z;
        assert!((forward - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-4);

        assert!(matches!(
            &out.broadcasts[1],
            Message::UpdatePlayer(s) if s.player.entity_id == 1 && s.server_time_ms == START_MS + 10 * TICK_MS
        ));
    }

    #[test]
    fn test_second_connect_sees_first_ship() {
        let (mut sim, clock) = simulation();
        let mut out = RecordingOutbound::default();

        sim.on_connect(&mut out, PeerId(1));
        run_ticks(&mut sim, &clock, &mut out, 3);
        sim.on_connect(&mut out, PeerId(2));

        let to_second: Vec<&Message> = out
            .sent
            .iter()
            .filter(|(peer, _)| *peer == PeerId(2))
            .map(|(_, m)| m)
            .collect();
        assert!(matches!(to_second[0], Message::ClientConnect(c) if c.entity_id == 2));
        let Message::GameState(state) = to_second[1] else {
            panic!("expected GameState");
        };
        assert_eq!(state.players.len(), 1);
        assert_eq!(state.players[0].entity_id, 1);
        assert!(state.lasers.is_empty());

        run_ticks(&mut sim, &clock, &mut out, 10);
        assert_eq!(
            out.count(|m| matches!(m, Message::SpawnPlayer(p) if p.entity_id == 2)),
            1
        );

        let first = sim.registry.spawn_point_index(1);
        let second = sim.registry.spawn_point_index(2);
        assert_eq!((first, second), (Some(0), Some(1)));
    }

    #[test]
    fn test_pending_fire_spawns_one_laser() {
        let (mut sim, clock) = simulation();
        let mut out = RecordingOutbound::default();
        sim.on_connect(&mut out, PeerId(1));

        send_input(&mut sim, PeerId(1), Keys::FIRE, 1);
        send_input(&mut sim, PeerId(1), Keys::empty(), 2);
        send_input(&mut sim, PeerId(1), Keys::YAW_LEFT, 3);
        assert!(sim.registry.ship(1).unwrap().input.contains(Keys::FIRE));

        run_ticks(&mut sim, &clock, &mut out, 1);
        assert_eq!(sim.registry.laser_count(), 1);
        let laser = sim.registry.lasers().next().unwrap();
        assert_eq!(laser.id, 2);
        assert_eq!(laser.sender_id, 1);
        assert_eq!(laser.end_time_ms, laser.start_time_ms + 10_000);
        assert!(!sim.registry.ship(1).unwrap().input.contains(Keys::FIRE));

        run_ticks(&mut sim, &clock, &mut out, 9);
        assert_eq!(sim.registry.laser_count(), 1);
        assert_eq!(out.count(|m| matches!(m, Message::SpawnLaser(l) if l.entity_id == 2)), 1);
    }

    #[test]
    fn test_laser_expires_after_lifetime() {
        let (mut sim, clock) = simulation();
        let mut out = RecordingOutbound::default();
        sim.on_connect(&mut out, PeerId(1));

        send_input(&mut sim, PeerId(1), Keys::FIRE, 1);
        run_ticks(&mut sim, &clock, &mut out, 1);
        let start = sim.registry.laser(2).unwrap().start_time_ms;

        clock.set(start + 10_000 - 1);
        sim.step(&mut out);
        assert!(sim.registry.laser(2).is_some());

        clock.set(start + 10_000 + 1);
        sim.step(&mut out);
        assert!(sim.registry.laser(2).is_none());

        run_ticks(&mut sim, &clock, &mut out, 30);
        assert_eq!(out.count(|m| matches!(m, Message::DespawnLaser(r) if r.entity_id == 2)), 1);
    }

    #[test]
    fn test_laser_hits_other_ship() {
        let (mut sim, clock) = simulation();
        let mut out = RecordingOutbound::default();
        sim.on_connect(&mut out, PeerId(1));
        sim.on_connect(&mut out, PeerId(2));

        let victim_spot = Transform::new(Vec3::new(0.0, 0.0, 90.0), Quat::IDENTITY);
        teleport(&mut sim, 2, victim_spot);

        send_input(&mut sim, PeerId(1), Keys::FIRE, 1);
        run_ticks(&mut sim, &clock, &mut out, 20);

        assert_eq!(sim.registry.laser_count(), 0);
        assert_eq!(
            out.count(|m| matches!(m, Message::Collision(c) if c.entity_a == 1 && c.entity_b == 2)),
            1
        );
        assert_eq!(out.count(|m| matches!(m, Message::DespawnLaser(_))), 1);

        let respawn = out
            .broadcasts
            .iter()
            .position(|m| matches!(m, Message::DespawnPlayer(r) if r.entity_id == 2))
            .unwrap();
        let Message::SpawnPlayer(record) = &out.broadcasts[respawn + 1] else {
            panic!("respawn must despawn then spawn");
        };
        assert_eq!(record.entity_id, 2);
        let spawn = sim.registry.spawn_point_of(2).unwrap().position;
        assert!((position(record) - spawn).length() < 1e-3);
        assert!(sim.registry.ship(1).is_some());
    }

    #[test]
    fn test_laser_ignores_its_sender() {
        let (mut sim, clock) = simulation();
        let mut out = RecordingOutbound::default();
        sim.on_connect(&mut out, PeerId(1));

        send_input(&mut sim, PeerId(1), Keys::FIRE, 1);
        run_ticks(&mut sim, &clock, &mut out, 20);

        assert_eq!(sim.registry.laser_count(), 1);
        assert_eq!(out.count(|m| matches!(m, Message::Collision(_))), 0);
        assert_eq!(out.count(|m| matches!(m, Message::DespawnPlayer(_))), 0);
    }

    #[test]
    fn test_laser_hitting_asteroid_is_removed() {
        let (mut sim, clock) = simulation();
        let mut out = RecordingOutbound::default();
        sim.on_connect(&mut out, PeerId(1));
        sim.world.add_obstacle(Vec3::new(0.0, 0.0, 80.0), 2.0);

        send_input(&mut sim, PeerId(1), Keys::FIRE, 1);
        run_ticks(&mut sim, &clock, &mut out, 30);

        assert_eq!(sim.registry.laser_count(), 0);
        assert_eq!(out.count(|m| matches!(m, Message::DespawnLaser(_))), 1);
        assert_eq!(out.count(|m| matches!(m, Message::Collision(_))), 0);
        assert_eq!(out.count(|m| matches!(m, Message::DespawnPlayer(_))), 0);
    }

    #[test]
    fn test_crash_respawns_once_per_window() {
        let (mut sim, clock) = simulation();
        let mut out = RecordingOutbound::default();
        sim.on_connect(&mut out, PeerId(1));

        let rock = Vec3::new(50.0, 0.0, 0.0);
        sim.world.add_obstacle(rock, 1.0);
        teleport(&mut sim, 1, Transform::new(rock, Quat::IDENTITY));

        assert!(sim.ship_collides(1));
        assert!(sim.ship_collides(1));

        run_ticks(&mut sim, &clock, &mut out, 10);

        assert_eq!(out.count(|m| matches!(m, Message::DespawnPlayer(_))), 1);
        assert_eq!(out.count(|m| matches!(m, Message::SpawnPlayer(_))), 2);
        let ship = sim.registry.ship(1).unwrap();
        assert!((ship.transform.position() - Vec3::new(0.0, 0.0, 100.0)).length() < 1e-3);
        assert_eq!(ship.motion.linear_velocity, Vec3::ZERO);
        assert!(!sim.ship_collides(1));
    }

    #[test]
    fn test_disconnect_cleans_up_once() {
        let (mut sim, clock) = simulation();
        let mut out = RecordingOutbound::default();
        sim.on_connect(&mut out, PeerId(1));
        run_ticks(&mut sim, &clock, &mut out, 10);

        let colliders_before = sim.world.spheres.len();
        sim.on_disconnect(&mut out, PeerId(1));
        sim.on_disconnect(&mut out, PeerId(1));
        send_input(&mut sim, PeerId(1), Keys::FIRE, 5);

        assert!(sim.registry.ship(1).is_none());
        assert_eq!(sim.registry.connection_count(), 0);
        assert!(sim.registry.spawn_point_of(1).is_none());
        assert_eq!(sim.world.spheres.len(), colliders_before - 1);

        out.broadcasts.clear();
        run_ticks(&mut sim, &clock, &mut out, 10);
        assert_eq!(out.broadcasts, vec![protocol::despawn_player(1)]);
    }

    #[test]
    fn test_spawn_point_kept_when_configured() {
        let (mut sim, _clock) = simulation_with(ServerConfig {
            free_spawn_point_on_disconnect: false,
            ..config()
        });
        let mut out = RecordingOutbound::default();
        sim.on_connect(&mut out, PeerId(1));
        sim.on_disconnect(&mut out, PeerId(1));
        sim.on_connect(&mut out, PeerId(2));

        assert_eq!(sim.registry.spawn_point_index(1), Some(0));
        assert_eq!(sim.registry.spawn_point_index(2), Some(1));
    }

    #[test]
    fn test_spawn_points_stay_exclusive_under_churn() {
        let (mut sim, clock) = simulation();
        let mut out = RecordingOutbound::default();

        for peer in 1..=3 {
            sim.on_connect(&mut out, PeerId(peer));
        }
        sim.on_disconnect(&mut out, PeerId(2));
        sim.on_connect(&mut out, PeerId(4));
        run_ticks(&mut sim, &clock, &mut out, 10);

        let owners: Vec<_> = sim
            .registry
            .spawn_points()
            .iter()
            .filter_map(|p| p.owner)
            .collect();
        assert_eq!(owners.len(), 3);
        for ship in sim.registry.ships() {
            assert_eq!(owners.iter().filter(|&&o| o == ship.id).count(), 1);
        }
        assert_eq!(sim.registry.spawn_point_index(4), Some(1));
    }

    #[test]
    fn test_kept_spawn_points_never_double_up() {
        let (mut sim, clock) = simulation_with(ServerConfig {
            free_spawn_point_on_disconnect: false,
            spawn_point_count: 3,
            ..config()
        });
        let mut out = RecordingOutbound::default();

        for peer in 1..=3 {
            sim.on_connect(&mut out, PeerId(peer));
        }
        // six more joins than points, each after someone leaves
        for peer in 4..=9 {
            sim.on_disconnect(&mut out, PeerId(peer - 3));
            sim.on_connect(&mut out, PeerId(peer));
            run_ticks(&mut sim, &clock, &mut out, 1);
        }
        run_ticks(&mut sim, &clock, &mut out, 10);

        let ships: Vec<_> = sim.registry.ships().collect();
        assert_eq!(ships.len(), 3);
        for ship in &ships {
            assert!(sim.registry.spawn_point_of(ship.id).is_some());
        }
        for (i, a) in ships.iter().enumerate() {
            for b in &ships[i + 1..] {
                assert_ne!(
                    sim.registry.spawn_point_index(a.id),
                    sim.registry.spawn_point_index(b.id)
                );
                assert!(a.transform.position().distance(b.transform.position()) > 1.0);
            }
        }
    }

    #[test]
    fn test_join_refused_without_spawn_point() {
        let (mut sim, _clock) = simulation_with(ServerConfig {
            spawn_point_count: 1,
            ..config()
        });
        let mut out = RecordingOutbound::default();
        sim.on_connect(&mut out, PeerId(1));
        sim.on_connect(&mut out, PeerId(2));

        assert_eq!(sim.registry.ship_count(), 1);
        assert_eq!(sim.registry.entity_for(PeerId(2)), None);
        assert_eq!(
            out.sent.last(),
            Some(&(
                PeerId(2),
                Message::TextToClient(protocol::TextMessage {
                    text: "Server is full".to_string()
                })
            ))
        );
    }

    #[test]
    fn test_text_is_broadcast_immediately() {
        let (mut sim, _clock) = simulation();
        let mut out = RecordingOutbound::default();
        sim.on_connect(&mut out, PeerId(1));

        let data = Message::TextToServer(protocol::TextMessage {
            text: "gg".to_string(),
        })
        .encode()
        .unwrap();
        sim.on_receive(&mut out, PeerId(1), &data);

        assert_eq!(
            out.broadcasts,
            vec![Message::TextToClient(protocol::TextMessage {
                text: "gg".to_string()
            })]
        );
        assert!(matches!(
            sim.drain_notices().last(),
            Some(ServerEvent::Chat { entity_id: Some(1), .. })
        ));
    }

    #[test]
    fn test_garbage_and_unbound_packets_are_ignored() {
        let (mut sim, clock) = simulation();
        let mut out = RecordingOutbound::default();

        sim.on_receive(&mut out, PeerId(9), &[1, 2, 3, 4]);
        send_input(&mut sim, PeerId(9), Keys::FIRE, 1);
        run_ticks(&mut sim, &clock, &mut out, 10);

        assert!(out.broadcasts.is_empty());
        assert_eq!(sim.registry.laser_count(), 0);
    }

    #[test]
    fn test_updates_follow_broadcast_interval() {
        let (mut sim, clock) = simulation_with(ServerConfig {
            broadcast_interval_ticks: 5,
            ..config()
        });
        let mut out = RecordingOutbound::default();
        sim.on_connect(&mut out, PeerId(1));

        run_ticks(&mut sim, &clock, &mut out, 20);
        assert_eq!(out.count(|m| matches!(m, Message::UpdatePlayer(_))), 4);
        assert_eq!(sim.tick(), 20);
        assert_eq!(sim.world.syncs, 20);
    }

    #[test]
    fn test_thrusting_ship_moves_and_reports_velocity() {
        let (mut sim, clock) = simulation();
        let mut out = RecordingOutbound::default();
        sim.on_connect(&mut out, PeerId(1));
        send_input(&mut sim, PeerId(1), Keys::FORWARD, 1);

        run_ticks(&mut sim, &clock, &mut out, 10);

        let update = out
            .broadcasts
            .iter()
            .find_map(|m| match m {
                Message::UpdatePlayer(s) => Some(s.player),
                _ => None,
            })
            .unwrap();
        assert!(position(&update).z < 100.0);
        assert!(Vec3::from(update.linear_velocity).z < 0.0);
        assert_eq!(Vec3::from(update.reserved), Vec3::ZERO);
    }
}
