use glam::{Quat, Vec3};
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize, rancor};

macro_rules! from_bytes {
    ($ty:ty, $bytes:expr) => {
        rkyv::from_bytes::<$ty, rancor::Error>($bytes).map_err(PacketError::Deserialize)?
    };
}

macro_rules! to_bytes {
    ($value:expr) => {
        rkyv::to_bytes::<rancor::Error>($value)
            .map_err(PacketError::Serialize)?
            .into_vec()
    };
}

pub const PROTOCOL_VERSION: u32 = 1;
pub const PROTOCOL_MAGIC: u32 = 0x5350_4143;
pub const DEFAULT_PORT: u16 = 6969;
pub const DEFAULT_TICK_RATE: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    ClientConnect = 1,
    GameState = 2,
    SpawnPlayer = 3,
    DespawnPlayer = 4,
    UpdatePlayer = 5,
    TeleportPlayer = 6,
    SpawnLaser = 7,
    DespawnLaser = 8,
    Collision = 9,
    TextToClient = 10,
    Input = 11,
    TextToServer = 12,
}

impl PacketKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => Self::ClientConnect,
            2 => Self::GameState,
            3 => Self::SpawnPlayer,
            4 => Self::DespawnPlayer,
            5 => Self::UpdatePlayer,
            6 => Self::TeleportPlayer,
            7 => Self::SpawnLaser,
            8 => Self::DespawnLaser,
            9 => Self::Collision,
            10 => Self::TextToClient,
            11 => Self::Input,
            12 => Self::TextToServer,
            _ => return None,
        })
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct WireVec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<Vec3> for WireVec3 {
    fn from(v: Vec3) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

impl From<WireVec3> for Vec3 {
    fn from(v: WireVec3) -> Self {
        Vec3::new(v.x, v.y, v.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct WireQuat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for WireQuat {
    fn default() -> Self {
        Quat::IDENTITY.into()
    }
}

impl From<Quat> for WireQuat {
    fn from(q: Quat) -> Self {
        Self {
            x: q.x,
            y: q.y,
            z: q.z,
            w: q.w,
        }
    }
}

impl From<WireQuat> for Quat {
    fn from(q: WireQuat) -> Self {
        let quat = Quat::from_xyzw(q.x, q.y, q.z, q.w);
        if quat.length_squared() > f32::EPSILON {
            quat.normalize()
        } else {
            Quat::IDENTITY
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct PlayerRecord {
    pub entity_id: u32,
    pub position: WireVec3,
    pub linear_velocity: WireVec3,
    /// Carried as acceleration by the client's dead reckoning; the server sends zero.
    pub reserved: WireVec3,
    pub orientation: WireQuat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct LaserRecord {
    pub entity_id: u32,
    pub start_time_ms: u64,
    pub end_time_ms: u64,
    pub origin: WireVec3,
    pub orientation: WireQuat,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct ClientConnect {
    pub entity_id: u32,
    pub server_time_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct GameState {
    pub players: Vec<PlayerRecord>,
    pub lasers: Vec<LaserRecord>,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct PlayerSnapshot {
    pub server_time_ms: u64,
    pub player: PlayerRecord,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct EntityRef {
    pub entity_id: u32,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct CollisionPair {
    pub entity_a: u32,
    pub entity_b: u32,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct InputSample {
    pub client_time_ms: u64,
    pub keys: u16,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct TextMessage {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
struct Envelope {
    magic: u32,
    version: u32,
    kind: u8,
    payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    ClientConnect(ClientConnect),
    GameState(GameState),
    SpawnPlayer(PlayerRecord),
    DespawnPlayer(EntityRef),
    UpdatePlayer(PlayerSnapshot),
    TeleportPlayer(PlayerSnapshot),
    SpawnLaser(LaserRecord),
    DespawnLaser(EntityRef),
    Collision(CollisionPair),
    TextToClient(TextMessage),
    Input(InputSample),
    TextToServer(TextMessage),
}

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
    #[error("bad envelope (magic {magic:#x}, version {version})")]
    BadEnvelope { magic: u32, version: u32 },
}

impl Message {
    pub fn kind(&self) -> PacketKind {
        match self {
            Self::ClientConnect(_) => PacketKind::ClientConnect,
            Self::GameState(_) => PacketKind::GameState,
            Self::SpawnPlayer(_) => PacketKind::SpawnPlayer,
            Self::DespawnPlayer(_) => PacketKind::DespawnPlayer,
            Self::UpdatePlayer(_) => PacketKind::UpdatePlayer,
            Self::TeleportPlayer(_) => PacketKind::TeleportPlayer,
            Self::SpawnLaser(_) => PacketKind::SpawnLaser,
            Self::DespawnLaser(_) => PacketKind::DespawnLaser,
            Self::Collision(_) => PacketKind::Collision,
            Self::TextToClient(_) => PacketKind::TextToClient,
            Self::Input(_) => PacketKind::Input,
            Self::TextToServer(_) => PacketKind::TextToServer,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let payload = match self {
            Self::ClientConnect(p) => to_bytes!(p),
            Self::GameState(p) => to_bytes!(p),
            Self::SpawnPlayer(p) => to_bytes!(p),
            Self::DespawnPlayer(p) => to_bytes!(p),
            Self::UpdatePlayer(p) => to_bytes!(p),
            Self::TeleportPlayer(p) => to_bytes!(p),
            Self::SpawnLaser(p) => to_bytes!(p),
            Self::DespawnLaser(p) => to_bytes!(p),
            Self::Collision(p) => to_bytes!(p),
            Self::TextToClient(p) => to_bytes!(p),
            Self::Input(p) => to_bytes!(p),
            Self::TextToServer(p) => to_bytes!(p),
        };

        let envelope = Envelope {
            magic: PROTOCOL_MAGIC,
            version: PROTOCOL_VERSION,
            kind: self.kind().tag(),
            payload,
        };

        rkyv::to_bytes::<rancor::Error>(&envelope)
            .map(|aligned| aligned.into_vec())
            .map_err(PacketError::Serialize)
    }

    /// Decodes one framed packet. Unknown kind tags yield `Ok(None)`.
    pub fn decode(data: &[u8]) -> Result<Option<Self>, PacketError> {
        let envelope = rkyv::from_bytes::<Envelope, rancor::Error>(&aligned(data))
            .map_err(PacketError::Deserialize)?;

        if envelope.magic != PROTOCOL_MAGIC || envelope.version != PROTOCOL_VERSION {
            return Err(PacketError::BadEnvelope {
                magic: envelope.magic,
                version: envelope.version,
            });
        }

        let Some(kind) = PacketKind::from_tag(envelope.kind) else {
            log::trace!("Ignoring packet with unknown kind {}", envelope.kind);
            return Ok(None);
        };

        let payload = aligned(&envelope.payload);
        let message = match kind {
            PacketKind::ClientConnect => {
                Self::ClientConnect(from_bytes!(ClientConnect, &payload))
            }
            PacketKind::GameState => Self::GameState(from_bytes!(GameState, &payload)),
            PacketKind::SpawnPlayer => Self::SpawnPlayer(from_bytes!(PlayerRecord, &payload)),
            PacketKind::DespawnPlayer => Self::DespawnPlayer(from_bytes!(EntityRef, &payload)),
            PacketKind::UpdatePlayer => {
                Self::UpdatePlayer(from_bytes!(PlayerSnapshot, &payload))
            }
            PacketKind::TeleportPlayer => {
                Self::TeleportPlayer(from_bytes!(PlayerSnapshot, &payload))
            }
            PacketKind::SpawnLaser => Self::SpawnLaser(from_bytes!(LaserRecord, &payload)),
            PacketKind::DespawnLaser => Self::DespawnLaser(from_bytes!(EntityRef, &payload)),
            PacketKind::Collision => Self::Collision(from_bytes!(CollisionPair, &payload)),
            PacketKind::TextToClient => Self::TextToClient(from_bytes!(TextMessage, &payload)),
            PacketKind::Input => Self::Input(from_bytes!(InputSample, &payload)),
            PacketKind::TextToServer => Self::TextToServer(from_bytes!(TextMessage, &payload)),
        };

        Ok(Some(message))
    }
}

/// rkyv validates alignment, and frames come off the wire at arbitrary offsets.
fn aligned(data: &[u8]) -> AlignedVec {
    let mut buffer: AlignedVec = AlignedVec::with_capacity(data.len());
    buffer.extend_from_slice(data);
    buffer
}

pub fn client_connect(entity_id: u32, server_time_ms: u64) -> Message {
    Message::ClientConnect(ClientConnect {
        entity_id,
        server_time_ms,
    })
}

pub fn game_state(players: Vec<PlayerRecord>, lasers: Vec<LaserRecord>) -> Message {
    Message::GameState(GameState { players, lasers })
}

pub fn despawn_player(entity_id: u32) -> Message {
    Message::DespawnPlayer(EntityRef { entity_id })
}

pub fn update_player(server_time_ms: u64, player: PlayerRecord) -> Message {
    Message::UpdatePlayer(PlayerSnapshot {
        server_time_ms,
        player,
    })
}

pub fn despawn_laser(entity_id: u32) -> Message {
    Message::DespawnLaser(EntityRef { entity_id })
}

pub fn collision(entity_a: u32, entity_b: u32) -> Message {
    Message::Collision(CollisionPair { entity_a, entity_b })
}

pub fn input(client_time_ms: u64, keys: u16) -> Message {
    Message::Input(InputSample {
        client_time_ms,
        keys,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_are_stable() {
        for tag in 1..=12u8 {
            let kind = PacketKind::from_tag(tag).unwrap();
            assert_eq!(kind.tag(), tag);
        }
        assert!(PacketKind::from_tag(0).is_none());
        assert!(PacketKind::from_tag(200).is_none());
    }

    #[test]
    fn test_player_update_transmission() {
        let player = PlayerRecord {
            entity_id: 7,
            position: Vec3::new(1.0, 2.0, 3.0).into(),
            linear_velocity: Vec3::new(0.0, 0.0, 10.0).into(),
            reserved: WireVec3::default(),
            orientation: Quat::from_rotation_y(0.5).into(),
        };

        let bytes = update_player(1234, player).encode().unwrap();
        let decoded = Message::decode(&bytes).unwrap().unwrap();

        match decoded {
            Message::UpdatePlayer(snapshot) => {
                assert_eq!(snapshot.server_time_ms, 1234);
                assert_eq!(snapshot.player, player);
                let q: Quat = snapshot.player.orientation.into();
                assert!(q.abs_diff_eq(Quat::from_rotation_y(0.5), 1e-6));
            }
            other => panic!("Expected UpdatePlayer, got {:?}", other),
        }
    }

    #[test]
    fn test_every_kind_survives_the_wire() {
        let ship = PlayerRecord {
            entity_id: 3,
            position: Vec3::new(-4.0, 0.5, 90.0).into(),
            linear_velocity: Vec3::new(0.0, 1.0, -2.0).into(),
            reserved: Vec3::new(0.25, 0.0, 0.0).into(),
            orientation: Quat::from_rotation_x(1.2).into(),
        };
        let laser = LaserRecord {
            entity_id: 11,
            start_time_ms: 5_000,
            end_time_ms: 15_000,
            origin: Vec3::new(1.0, 2.0, 3.0).into(),
            orientation: Quat::from_rotation_z(-0.3).into(),
        };

        let messages = [
            client_connect(1, 987_654_321),
            game_state(vec![ship, PlayerRecord::default()], vec![laser]),
            Message::SpawnPlayer(ship),
            despawn_player(3),
            update_player(40_000, ship),
            Message::TeleportPlayer(PlayerSnapshot {
                server_time_ms: 40_020,
                player: ship,
            }),
            Message::SpawnLaser(laser),
            despawn_laser(11),
            collision(3, 4),
            Message::TextToClient(TextMessage {
                text: "welcome, pilot".to_string(),
            }),
            input(77, 0x0101),
            Message::TextToServer(TextMessage {
                text: "héllo ✓".to_string(),
            }),
        ];

        let mut seen = Vec::new();
        for message in messages {
            let bytes = message.encode().unwrap();
            let decoded = Message::decode(&bytes).unwrap();
            assert_eq!(decoded.as_ref(), Some(&message));
            seen.push(message.kind().tag());
        }
        assert_eq!(seen, (1..=12u8).collect::<Vec<_>>());
    }

    #[test]
    fn test_game_state_with_lists() {
        let players = vec![PlayerRecord::default(); 3];
        let lasers = vec![LaserRecord {
            entity_id: 9,
            start_time_ms: 100,
            end_time_ms: 10_100,
            ..Default::default()
        }];

        let bytes = game_state(players, lasers).encode().unwrap();
        let Some(Message::GameState(state)) = Message::decode(&bytes).unwrap() else {
            panic!("Expected GameState");
        };
        assert_eq!(state.players.len(), 3);
        assert_eq!(state.lasers[0].end_time_ms, 10_100);
    }

    #[test]
    fn test_unknown_kind_is_ignored() {
        let envelope = Envelope {
            magic: PROTOCOL_MAGIC,
            version: PROTOCOL_VERSION,
            kind: 99,
            payload: vec![1, 2, 3],
        };
        let bytes = rkyv::to_bytes::<rancor::Error>(&envelope).unwrap();

        assert!(Message::decode(&bytes).unwrap().is_none());
    }

    #[test]
    fn test_garbage_and_foreign_magic_rejected() {
        assert!(Message::decode(&[0xde, 0xad]).is_err());

        let envelope = Envelope {
            magic: 0x1234,
            version: PROTOCOL_VERSION,
            kind: PacketKind::Input.tag(),
            payload: Vec::new(),
        };
        let bytes = rkyv::to_bytes::<rancor::Error>(&envelope).unwrap();
        assert!(matches!(
            Message::decode(&bytes),
            Err(PacketError::BadEnvelope { magic: 0x1234, .. })
        ));
    }

    #[test]
    fn test_decode_from_unaligned_offset() {
        let bytes = input(55, 0b1000_0001).encode().unwrap();
        let mut shifted = vec![0u8];
        shifted.extend_from_slice(&bytes);

        let decoded = Message::decode(&shifted[1..]).unwrap();
        assert_eq!(decoded, Some(input(55, 0b1000_0001)));
    }

    #[test]
    fn test_degenerate_quat_falls_back_to_identity() {
        let zero = WireQuat {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 0.0,
        };
        assert_eq!(Quat::from(zero), Quat::IDENTITY);
    }
}
