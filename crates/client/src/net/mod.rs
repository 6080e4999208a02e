pub mod client;
pub mod config;
pub mod reckoning;

pub use client::{ChatLine, ClientError, ClientShip, ClientWorld, GameClient, Tally};
pub use config::{ClientConfig, ReckoningConfig};
pub use reckoning::{DeadReckoning, Observation};
