use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use glam::Quat;

use spacegame::net::protocol::{self, TextMessage};
use spacegame::net::{LaserRecord, PlayerRecord};
use spacegame::{
    ClientHost, Clock, ConnectionState, KeyMap, Keys, Laser, Message, NetHandler, NetworkStats,
    Outbound, PeerId, ShipConfig, ShipMotion, SystemClock, Transform,
};

use super::config::ClientConfig;
use super::reckoning::{DeadReckoning, Observation};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("could not connect to {address}:{port}")]
    Connect { address: String, port: u16 },
    #[error("server did not assign a ship within {0}ms")]
    Timeout(u64),
    #[error("server closed the connection")]
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct ClientShip {
    pub id: u32,
    pub transform: Transform,
    /// Only advanced for the locally controlled ship.
    pub motion: ShipMotion,
    pub reckoning: DeadReckoning,
}

impl ClientShip {
    fn from_record(record: &PlayerRecord, config: &ClientConfig) -> Self {
        Self {
            id: record.entity_id,
            transform: Transform::new(record.position.into(), Quat::from(record.orientation)),
            motion: ShipMotion::default(),
            reckoning: DeadReckoning::new(config.reckoning.clone()),
        }
    }

    pub fn speed(&self) -> f32 {
        match self.reckoning.latest() {
            Some(latest) => latest.velocity.length(),
            None => self.motion.linear_velocity.length(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub hits: u32,
    pub deaths: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub received_ms: u64,
    pub text: String,
}

/// Client view of the game, driven only by decoded server messages and local input.
pub struct ClientWorld {
    config: ClientConfig,
    ship_config: ShipConfig,
    clock: Box<dyn Clock>,
    connected: bool,
    local_id: Option<u32>,
    server_offset_ms: i64,
    ships: BTreeMap<u32, ClientShip>,
    lasers: BTreeMap<u32, Laser>,
    tallies: BTreeMap<u32, Tally>,
    chat: VecDeque<ChatLine>,
    input: KeyMap,
}

impl ClientWorld {
    pub fn new(config: ClientConfig, clock: Box<dyn Clock>) -> Self {
        Self {
            config,
            ship_config: ShipConfig::default(),
            clock,
            connected: false,
            local_id: None,
            server_offset_ms: 0,
            ships: BTreeMap::new(),
            lasers: BTreeMap::new(),
            tallies: BTreeMap::new(),
            chat: VecDeque::new(),
            input: KeyMap::default(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn local_id(&self) -> Option<u32> {
        self.local_id
    }

    pub fn local_ship(&self) -> Option<&ClientShip> {
        self.local_id.and_then(|id| self.ships.get(&id))
    }

    pub fn ship(&self, id: u32) -> Option<&ClientShip> {
        self.ships.get(&id)
    }

    pub fn ships(&self) -> impl Iterator<Item = &ClientShip> {
        self.ships.values()
    }

    pub fn lasers(&self) -> impl Iterator<Item = &Laser> {
        self.lasers.values()
    }

    pub fn laser(&self, id: u32) -> Option<&Laser> {
        self.lasers.get(&id)
    }

    pub fn tally(&self, id: u32) -> Tally {
        self.tallies.get(&id).copied().unwrap_or_default()
    }

    pub fn chat(&self) -> impl Iterator<Item = &ChatLine> {
        self.chat.iter()
    }

    pub fn input(&self) -> KeyMap {
        self.input
    }

    /// Local clock shifted by the offset learned from ClientConnect.
    pub fn server_now_ms(&self) -> u64 {
        let now = self.clock.now_ms() as i64 + self.server_offset_ms;
        now.max(0) as u64
    }

    /// Records a key sample. Returns the Input packet to send if the mask changed.
    pub fn sample_input(&mut self, keys: Keys) -> Option<Message> {
        let now = self.clock.now_ms();
        self.input
            .set(keys, now)
            .then(|| protocol::input(now, keys.bits()))
    }

    pub fn update(&mut self, dt: f32) {
        let keys = self.input.keys;
        for ship in self.ships.values_mut() {
            if Some(ship.id) == self.local_id {
                ship.motion
                    .step(&self.ship_config, keys, &mut ship.transform, dt);
            } else if let Some((position, orientation)) = ship.reckoning.interpolate(dt) {
                ship.transform.set_position(position);
                ship.transform.set_orientation(orientation);
            }
        }

        for laser in self.lasers.values_mut() {
            laser.update(dt);
        }
        let now = self.server_now_ms();
        self.lasers.retain(|_, laser| !laser.is_expired(now));
    }

    pub fn apply(&mut self, message: Message) {
        match message {
            Message::ClientConnect(connect) => {
                let now = self.clock.now_ms();
                self.local_id = Some(connect.entity_id);
                self.server_offset_ms = connect.server_time_ms as i64 - now as i64;
                log::info!(
                    "Assigned ship {} (clock offset {}ms)",
                    connect.entity_id,
                    self.server_offset_ms
                );
            }
            Message::GameState(state) => {
                log::debug!(
                    "Game state: {} ships, {} lasers",
                    state.players.len(),
                    state.lasers.len()
                );
                for player in &state.players {
                    self.spawn_ship(player);
                }
                for laser in &state.lasers {
                    self.spawn_laser(laser);
                }
            }
            Message::SpawnPlayer(player) => self.spawn_ship(&player),
            Message::DespawnPlayer(entity) => {
                if self.ships.remove(&entity.entity_id).is_some() {
                    log::debug!("Despawned ship {}", entity.entity_id);
                }
            }
            Message::UpdatePlayer(snapshot) => {
                // the local ship runs on its own input
                if Some(snapshot.player.entity_id) == self.local_id {
                    return;
                }
                let now = self.clock.now_ms();
                if let Some(ship) = self.ships.get_mut(&snapshot.player.entity_id) {
                    let observation =
                        Observation::from_record(&snapshot.player, snapshot.server_time_ms, now);
                    ship.reckoning.observe(observation);
                } else {
                    log::trace!("Update for unknown ship {}", snapshot.player.entity_id);
                }
            }
            Message::TeleportPlayer(snapshot) => {
                let now = self.clock.now_ms();
                let is_local = Some(snapshot.player.entity_id) == self.local_id;
                if let Some(ship) = self.ships.get_mut(&snapshot.player.entity_id) {
                    let observation =
                        Observation::from_record(&snapshot.player, snapshot.server_time_ms, now);
                    ship.transform.set_position(observation.position);
                    ship.transform.set_orientation(observation.orientation);
                    if is_local {
                        ship.motion.reset();
                    } else {
                        ship.reckoning.seed(observation);
                    }
                }
            }
            Message::SpawnLaser(laser) => self.spawn_laser(&laser),
            Message::DespawnLaser(entity) => {
                self.lasers.remove(&entity.entity_id);
            }
            Message::Collision(pair) => {
                log::info!("Ship {} hit ship {}", pair.entity_a, pair.entity_b);
                self.tallies.entry(pair.entity_a).or_default().hits += 1;
                self.tallies.entry(pair.entity_b).or_default().deaths += 1;
            }
            Message::TextToClient(text) => self.push_chat(text.text),
            Message::Input(_) | Message::TextToServer(_) => {
                log::trace!("Ignoring server-bound {:?} packet", message.kind());
            }
        }
    }

    fn spawn_ship(&mut self, record: &PlayerRecord) {
        let mut ship = ClientShip::from_record(record, &self.config);
        if Some(record.entity_id) != self.local_id {
            // spawn records carry no server time, so use our estimate of it
            let observation =
                Observation::from_record(record, self.server_now_ms(), self.clock.now_ms());
            ship.reckoning.seed(observation);
        }
        log::debug!("Spawned ship {} at {}", ship.id, ship.transform.position());
        self.ships.insert(record.entity_id, ship);
    }

    fn spawn_laser(&mut self, record: &LaserRecord) {
        let mut laser = Laser::from_record(record, self.ship_config.laser_speed);
        laser.advance_to(self.server_now_ms());
        self.lasers.insert(laser.id, laser);
    }

    fn push_chat(&mut self, text: String) {
        if self.chat.len() >= self.config.max_chat_lines.max(1) {
            self.chat.pop_front();
        }
        self.chat.push_back(ChatLine {
            received_ms: self.clock.now_ms(),
            text,
        });
    }

    fn reset(&mut self) {
        self.connected = false;
        self.local_id = None;
        self.ships.clear();
        self.lasers.clear();
        self.input = KeyMap::default();
    }
}

impl NetHandler for ClientWorld {
    fn on_connect(&mut self, _out: &mut dyn Outbound, _peer: PeerId) {
        log::info!("Connected to server");
        self.connected = true;
    }

    fn on_receive(&mut self, _out: &mut dyn Outbound, _peer: PeerId, data: &[u8]) {
        match Message::decode(data) {
            Ok(Some(message)) => self.apply(message),
            Ok(None) => log::trace!("Ignoring packet with unknown tag"),
            Err(e) => log::debug!("Dropped packet: {}", e),
        }
    }

    fn on_disconnect(&mut self, _out: &mut dyn Outbound, _peer: PeerId) {
        log::info!("Disconnected from server");
        self.reset();
        self.push_chat("Disconnected from server".to_string());
    }
}

/// A connected client: transport host plus the world it feeds.
pub struct GameClient {
    host: ClientHost,
    world: ClientWorld,
}

impl GameClient {
    pub fn connect(address: &str, port: u16, config: ClientConfig) -> Result<Self, ClientError> {
        Self::connect_with_clock(address, port, config, Box::new(SystemClock))
    }

    pub fn connect_with_clock(
        address: &str,
        port: u16,
        config: ClientConfig,
        clock: Box<dyn Clock>,
    ) -> Result<Self, ClientError> {
        let mut host = ClientHost::new();
        if !host.create() || !host.connect(address, port) {
            return Err(ClientError::Connect {
                address: address.to_string(),
                port,
            });
        }

        Ok(Self {
            host,
            world: ClientWorld::new(config, clock),
        })
    }

    /// Polls until the server has assigned a ship.
    pub fn wait_for_join(&mut self) -> Result<u32, ClientError> {
        let timeout_ms = self.world.config.connect_timeout_ms;
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            self.host.poll(10, &mut self.world);
            if let Some(id) = self.world.local_id() {
                return Ok(id);
            }
            if !self.host.is_connected() {
                return Err(ClientError::Disconnected);
            }
            if Instant::now() >= deadline {
                return Err(ClientError::Timeout(timeout_ms));
            }
        }
    }

    pub fn poll(&mut self, timeout_ms: u32) -> usize {
        self.host.poll(timeout_ms, &mut self.world)
    }

    pub fn update(&mut self, dt: f32) {
        self.world.update(dt);
    }

    pub fn set_keys(&mut self, keys: Keys) {
        if let Some(message) = self.world.sample_input(keys) {
            self.send(&message);
        }
    }

    pub fn send_text(&mut self, text: impl Into<String>) {
        let message = Message::TextToServer(TextMessage { text: text.into() });
        self.send(&message);
    }

    fn send(&mut self, message: &Message) {
        match message.encode() {
            Ok(data) => self.host.send_packet(&data),
            Err(e) => log::warn!("Failed to encode {:?}: {}", message.kind(), e),
        }
    }

    pub fn world(&self) -> &ClientWorld {
        &self.world
    }

    pub fn status(&self) -> ConnectionState {
        self.host.status()
    }

    pub fn stats(&self) -> &NetworkStats {
        self.host.stats()
    }

    pub fn disconnect(&mut self) {
        self.host.disconnect();
        self.host.poll(0, &mut self.world);
    }
}
