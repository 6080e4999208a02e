pub mod protocol;
mod stats;
mod transport;

pub use protocol::{
    GameState, LaserRecord, Message, PacketError, PacketKind, PlayerRecord, PlayerSnapshot,
    WireQuat, WireVec3, DEFAULT_PORT, DEFAULT_TICK_RATE, PROTOCOL_MAGIC, PROTOCOL_VERSION,
};
pub use stats::NetworkStats;
pub use transport::{
    ClientHost, ConnectionState, NetEvent, NetHandler, Outbound, PeerId, ServerHost,
    TransportError, DEFAULT_MAX_PEERS, MAX_FRAME_SIZE, MAX_OUTBOUND_BUFFER, SERVER_PEER,
};
