use std::fmt;

use coop_formats::SectionFile;
use serde::Serialize;

use crate::menu::{MenuEntry, MenuId};

/// Stable identity for a connected player, assigned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player#{}", self.0)
    }
}

/// Handle to an engine-side actor (an aircraft, for our purposes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ActorId(pub u32);

/// Engine army identifier.
pub type Army = i32;

/// Engine-assigned mission number; `0` is reserved for the lobby
/// mission whose aircraft park idle players.
pub type MissionNumber = u32;

pub const LOBBY_MISSION_NUMBER: MissionNumber = 0;

/// An airfield the preload transform can rebase airstarts onto.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Airport {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub landing_queue: usize,
    pub takeoff_queue: usize,
}

impl Airport {
    pub fn queues_empty(&self) -> bool {
        self.landing_queue == 0 && self.takeoff_queue == 0
    }

    pub fn distance_sq(&self, x: f64, y: f64) -> f64 {
        let dx = self.x - x;
        let dy = self.y - y;
        dx * dx + dy * dy
    }
}

/// One crew position of an aircraft as the engine reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct CrewPlace {
    pub role: String,
    pub occupant: Option<PlayerId>,
}

/// Live view of one aircraft instance.
#[derive(Debug, Clone, PartialEq)]
pub struct AircraftSnapshot {
    pub actor: ActorId,
    /// Engine name, `"<missionNumber>:<baseName>"`.
    pub name: String,
    pub type_name: String,
    pub places: Vec<CrewPlace>,
}

impl AircraftSnapshot {
    /// Base name with the mission-number prefix stripped.
    pub fn base_name(&self) -> &str {
        match self.name.split_once(':') {
            Some((_, base)) => base,
            None => &self.name,
        }
    }
}

/// Live view of one air group and its aircraft.
#[derive(Debug, Clone, PartialEq)]
pub struct AirGroupSnapshot {
    pub name: String,
    pub army: Army,
    pub aircraft: Vec<AircraftSnapshot>,
}

impl AirGroupSnapshot {
    pub fn mission_number(&self) -> Option<MissionNumber> {
        self.name.split_once(':').and_then(|(n, _)| n.parse().ok())
    }
}

/// Everything the lobby asks of the simulation engine. The real game
/// adapter and the in-memory `SimHost` both sit behind this trait.
pub trait GameHost {
    fn is_dedicated(&self) -> bool;
    fn primary_player(&self) -> Option<PlayerId>;
    fn connected_players(&self) -> Vec<PlayerId>;
    fn player_name(&self, player: PlayerId) -> Option<String>;
    fn player_army(&self, player: PlayerId) -> Option<Army>;
    fn armies(&self) -> Vec<Army>;
    fn air_groups(&self, army: Army) -> Vec<AirGroupSnapshot>;
    fn airports(&self) -> Vec<Airport>;
    fn actor_by_name(&self, name: &str) -> Option<ActorId>;
    fn aircraft_by_actor(&self, actor: ActorId) -> Option<AircraftSnapshot>;

    fn next_mission_number(&mut self) -> MissionNumber;
    /// Hand a (transformed) mission description to the engine loader.
    /// The engine owns the loaded copy; spawned actors are reported
    /// back through `GameEvent::ActorCreated`.
    fn post_mission_load(&mut self, file: &SectionFile, mission_number: MissionNumber);
    fn place_enter(&mut self, player: PlayerId, actor: ActorId, place: usize);
    fn destroy_actor(&mut self, actor: ActorId);
    fn set_group_idle(&mut self, group_name: &str, idle: bool);
    fn set_order_menu(&mut self, player: PlayerId, submenu: bool, menu: MenuId, entries: &[MenuEntry]);
    fn log_to(&mut self, players: &[PlayerId], message: &str);
}
