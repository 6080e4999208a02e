pub mod app;
pub mod input;
pub mod net;
pub mod tui;

pub use app::{App, Mode};
pub use input::InputSampler;
pub use net::{ClientConfig, ClientWorld, DeadReckoning, GameClient, ReckoningConfig};
