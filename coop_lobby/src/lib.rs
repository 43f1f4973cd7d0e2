pub mod config;
pub mod events;
pub mod host;
pub mod menu;
pub mod preload;
pub mod scheduler;
pub mod seats;
pub mod session;
pub mod sim;

pub use config::LobbyConfig;
pub use events::GameEvent;
pub use host::{ActorId, Airport, GameHost, MissionNumber, PlayerId};
pub use session::{Lobby, MissionState};
