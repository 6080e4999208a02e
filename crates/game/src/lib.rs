pub mod clock;
pub mod map;
pub mod math;
pub mod net;
pub mod physics;
pub mod ship;

pub use clock::{Clock, ManualClock, SystemClock};
pub use map::{AsteroidField, AsteroidFieldConfig};
pub use math::Transform;
pub use net::{
    ClientHost, ConnectionState, Message, NetHandler, NetworkStats, Outbound, PacketError,
    PacketKind, PeerId, ServerHost, TransportError, DEFAULT_PORT, DEFAULT_TICK_RATE,
};
pub use physics::{
    ColliderId, ColliderMeshId, ColliderShape, CollisionWorld, PhysicsWorld, RayHit,
};
pub use ship::{KeyMap, Keys, Laser, ShipConfig, ShipMotion};
