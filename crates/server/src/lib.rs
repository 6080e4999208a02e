pub mod config;
pub mod events;
pub mod registry;
pub mod server;
pub mod simulation;
pub mod tui;

pub use config::ServerConfig;
pub use events::{EventQueue, GameEvent, ServerEvent};
pub use registry::{EntityId, Registry, ShipState, SpawnPoint};
pub use server::{GameServer, ServerError, ServerHandle, ServerStats};
pub use simulation::ServerSimulation;
