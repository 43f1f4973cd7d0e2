use std::collections::{BTreeMap, VecDeque};

use coop_formats::SectionFile;
use log::debug;

use crate::events::GameEvent;
use crate::host::{
    ActorId, AirGroupSnapshot, AircraftSnapshot, Airport, Army, CrewPlace, GameHost,
    MissionNumber, PlayerId,
};
use crate::menu::{MenuEntry, MenuId};
use crate::preload::AIR_GROUPS_SECTION;
use crate::session::Lobby;

#[derive(Debug, Clone)]
struct SimPlayer {
    name: String,
    army: Army,
}

#[derive(Debug, Clone)]
struct SimAircraft {
    actor: ActorId,
    name: String,
    type_name: String,
    places: Vec<CrewPlace>,
}

#[derive(Debug, Clone)]
struct SimGroup {
    name: String,
    army: Army,
    idle: bool,
    aircraft: Vec<SimAircraft>,
}

/// A menu render captured by the simulated host.
#[derive(Debug, Clone)]
pub struct MenuCapture {
    pub player: PlayerId,
    pub submenu: bool,
    pub menu: MenuId,
    pub entries: Vec<MenuEntry>,
}

/// In-memory stand-in for the simulation engine. Mission loads spawn
/// one aircraft per flight slot; everything observable from the
/// outside (menus, chat lines, occupancy) is recorded for inspection.
#[derive(Debug, Default)]
pub struct SimHost {
    dedicated: bool,
    primary: Option<PlayerId>,
    players: BTreeMap<PlayerId, SimPlayer>,
    airports: Vec<Airport>,
    groups: Vec<SimGroup>,
    /// Snapshots of destroyed aircraft, still answerable while the
    /// destruction event is in flight.
    destroyed: BTreeMap<ActorId, AircraftSnapshot>,
    next_actor: u32,
    next_mission: MissionNumber,
    pub events: VecDeque<GameEvent>,
    pub menus: Vec<MenuCapture>,
    pub log_lines: Vec<(Vec<PlayerId>, String)>,
}

impl SimHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_dedicated(&mut self, dedicated: bool) {
        self.dedicated = dedicated;
    }

    pub fn add_player(&mut self, id: u32, name: &str, army: Army) -> PlayerId {
        let player = PlayerId(id);
        self.players.insert(
            player,
            SimPlayer {
                name: name.to_string(),
                army,
            },
        );
        player
    }

    pub fn set_primary(&mut self, player: PlayerId) {
        self.primary = Some(player);
    }

    pub fn remove_player(&mut self, player: PlayerId) {
        self.players.remove(&player);
        for group in &mut self.groups {
            for aircraft in &mut group.aircraft {
                for place in &mut aircraft.places {
                    if place.occupant == Some(player) {
                        place.occupant = None;
                    }
                }
            }
        }
    }

    pub fn add_airport(&mut self, name: &str, x: f64, y: f64) {
        self.airports.push(Airport {
            name: name.to_string(),
            x,
            y,
            landing_queue: 0,
            takeoff_queue: 0,
        });
    }

    /// Spawn a lobby air group (mission number `0`) whose places park
    /// idle players.
    pub fn spawn_lobby_group(&mut self, army: Army, base: &str, aircraft: usize, places: usize) {
        let mut group = SimGroup {
            name: format!("0:{base}"),
            army,
            idle: true,
            aircraft: Vec::new(),
        };
        for slot in 0..aircraft {
            let actor = self.allocate_actor();
            group.aircraft.push(SimAircraft {
                actor,
                name: format!("0:{base}{slot}"),
                type_name: "LobbyTransport".to_string(),
                places: (0..places)
                    .map(|index| CrewPlace {
                        role: crew_role(index).to_string(),
                        occupant: None,
                    })
                    .collect(),
            });
        }
        self.groups.push(group);
    }

    fn allocate_actor(&mut self) -> ActorId {
        self.next_actor += 1;
        ActorId(self.next_actor)
    }

    fn snapshot(aircraft: &SimAircraft) -> AircraftSnapshot {
        AircraftSnapshot {
            actor: aircraft.actor,
            name: aircraft.name.clone(),
            type_name: aircraft.type_name.clone(),
            places: aircraft.places.clone(),
        }
    }

    fn vacate(&mut self, player: PlayerId) {
        for group in &mut self.groups {
            for aircraft in &mut group.aircraft {
                for place in &mut aircraft.places {
                    if place.occupant == Some(player) {
                        place.occupant = None;
                    }
                }
            }
        }
    }

    // ---- inspection helpers ------------------------------------------------

    pub fn occupant_of(&self, aircraft_name: &str, place: usize) -> Option<PlayerId> {
        self.groups
            .iter()
            .flat_map(|g| g.aircraft.iter())
            .find(|a| a.name == aircraft_name)
            .and_then(|a| a.places.get(place))
            .and_then(|p| p.occupant)
    }

    pub fn group_idle(&self, group_name: &str) -> Option<bool> {
        self.groups
            .iter()
            .find(|g| g.name == group_name)
            .map(|g| g.idle)
    }

    pub fn aircraft_names(&self, mission_number: MissionNumber) -> Vec<String> {
        let prefix = format!("{mission_number}:");
        self.groups
            .iter()
            .filter(|g| g.name.starts_with(&prefix))
            .flat_map(|g| g.aircraft.iter().map(|a| a.name.clone()))
            .collect()
    }

    pub fn last_menu_for(&self, player: PlayerId) -> Option<&MenuCapture> {
        self.menus.iter().rev().find(|m| m.player == player)
    }
}

fn crew_role(index: usize) -> &'static str {
    match index {
        0 => "Pilot",
        1 => "Gunner",
        2 => "Bombardier",
        3 => "Navigator",
        _ => "Crew",
    }
}

fn mission_prefix_of(name: &str) -> MissionNumber {
    name.split_once(':')
        .and_then(|(n, _)| n.parse().ok())
        .unwrap_or(0)
}

impl GameHost for SimHost {
    fn is_dedicated(&self) -> bool {
        self.dedicated
    }

    fn primary_player(&self) -> Option<PlayerId> {
        self.primary
    }

    fn connected_players(&self) -> Vec<PlayerId> {
        self.players.keys().copied().collect()
    }

    fn player_name(&self, player: PlayerId) -> Option<String> {
        self.players.get(&player).map(|p| p.name.clone())
    }

    fn player_army(&self, player: PlayerId) -> Option<Army> {
        self.players.get(&player).map(|p| p.army)
    }

    fn armies(&self) -> Vec<Army> {
        let mut armies: Vec<Army> = self.groups.iter().map(|g| g.army).collect();
        armies.sort_unstable();
        armies.dedup();
        armies
    }

    fn air_groups(&self, army: Army) -> Vec<AirGroupSnapshot> {
        self.groups
            .iter()
            .filter(|g| g.army == army)
            .map(|g| AirGroupSnapshot {
                name: g.name.clone(),
                army: g.army,
                aircraft: g.aircraft.iter().map(Self::snapshot).collect(),
            })
            .collect()
    }

    fn airports(&self) -> Vec<Airport> {
        self.airports.clone()
    }

    fn actor_by_name(&self, name: &str) -> Option<ActorId> {
        self.groups
            .iter()
            .flat_map(|g| g.aircraft.iter())
            .find(|a| a.name == name)
            .map(|a| a.actor)
    }

    fn aircraft_by_actor(&self, actor: ActorId) -> Option<AircraftSnapshot> {
        self.groups
            .iter()
            .flat_map(|g| g.aircraft.iter())
            .find(|a| a.actor == actor)
            .map(Self::snapshot)
            .or_else(|| self.destroyed.get(&actor).cloned())
    }

    fn next_mission_number(&mut self) -> MissionNumber {
        self.next_mission += 1;
        self.next_mission
    }

    /// Spawn the groups a mission description declares. One aircraft
    /// per `Flight0` token, crew size from the `Crew` record.
    fn post_mission_load(&mut self, file: &SectionFile, mission_number: MissionNumber) {
        for index in 0..file.lines(AIR_GROUPS_SECTION) {
            let Ok((key, _)) = file.get(AIR_GROUPS_SECTION, index) else {
                continue;
            };
            let key = key.to_string();

            let army = file
                .value_of(&key, "Army")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);
            let idle = file.value_of(&key, "Idle").map(|v| v == "1").unwrap_or(false);
            let type_name = file
                .value_of(&key, "Class")
                .map(|v| v.strip_prefix("Aircraft.").unwrap_or(v).to_string())
                .unwrap_or_else(|_| "Unknown".to_string());
            let crew: usize = file
                .value_of(&key, "Crew")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);
            let flight = file
                .value_of(&key, "Flight0")
                .map(|v| v.split_whitespace().count().max(1))
                .unwrap_or(1);

            let mut group = SimGroup {
                name: format!("{mission_number}:{key}"),
                army,
                idle,
                aircraft: Vec::new(),
            };
            for slot in 0..flight {
                let actor = self.allocate_actor();
                let name = format!("{mission_number}:{key}{slot}");
                group.aircraft.push(SimAircraft {
                    actor,
                    name: name.clone(),
                    type_name: type_name.clone(),
                    places: (0..crew)
                        .map(|place| CrewPlace {
                            role: crew_role(place).to_string(),
                            occupant: None,
                        })
                        .collect(),
                });
                self.events.push_back(GameEvent::ActorCreated {
                    mission_number,
                    name,
                    actor,
                });
            }
            self.groups.push(group);
        }
    }

    fn place_enter(&mut self, player: PlayerId, actor: ActorId, place: usize) {
        self.vacate(player);

        let mut entered = false;
        'search: for group in &mut self.groups {
            for aircraft in &mut group.aircraft {
                if aircraft.actor != actor {
                    continue;
                }
                match aircraft.places.get_mut(place) {
                    Some(slot) if slot.occupant.is_none() => {
                        slot.occupant = Some(player);
                        entered = true;
                    }
                    Some(_) => debug!("{player} bounced off occupied place {place}"),
                    None => debug!("{player} asked for missing place {place}"),
                }
                break 'search;
            }
        }

        if entered {
            self.events.push_back(GameEvent::PlaceEnter {
                player,
                actor,
                place,
            });
        }
    }

    fn destroy_actor(&mut self, actor: ActorId) {
        let mut removed: Option<SimAircraft> = None;
        for group in &mut self.groups {
            if let Some(index) = group.aircraft.iter().position(|a| a.actor == actor) {
                removed = Some(group.aircraft.remove(index));
                break;
            }
        }
        self.groups.retain(|g| !g.aircraft.is_empty());

        let Some(aircraft) = removed else {
            return;
        };
        self.destroyed.insert(actor, Self::snapshot(&aircraft));
        self.events.push_back(GameEvent::ActorDestroyed {
            mission_number: mission_prefix_of(&aircraft.name),
            name: aircraft.name,
            actor,
        });
    }

    fn set_group_idle(&mut self, group_name: &str, idle: bool) {
        if let Some(group) = self.groups.iter_mut().find(|g| g.name == group_name) {
            group.idle = idle;
        }
    }

    fn set_order_menu(
        &mut self,
        player: PlayerId,
        submenu: bool,
        menu: MenuId,
        entries: &[MenuEntry],
    ) {
        self.menus.push(MenuCapture {
            player,
            submenu,
            menu,
            entries: entries.to_vec(),
        });
    }

    fn log_to(&mut self, players: &[PlayerId], message: &str) {
        self.log_lines.push((players.to_vec(), message.to_string()));
    }
}

/// Deliver every event the simulated host queued back into the lobby,
/// including the ones produced while handling earlier ones.
pub fn pump(lobby: &mut Lobby<SimHost>) {
    while let Some(event) = lobby.host_mut().events.pop_front() {
        lobby.handle(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mission_text() -> String {
        [
            "[AirGroups]",
            "  BoB_RAF.01",
            "[BoB_RAF.01]",
            "  Class Aircraft.SpitfireMkI",
            "  Army 1",
            "  Crew 1",
            "  Flight0 1 2",
            "[BoB_RAF.01_Way]",
            "  NORMFLY 28000.0 19000.0 500.0 300.0",
        ]
        .join("\n")
    }

    #[test]
    fn mission_load_spawns_one_aircraft_per_flight_slot() {
        let mut host = SimHost::new();
        let file = SectionFile::parse(&mission_text()).expect("parse");
        let number = host.next_mission_number();
        host.post_mission_load(&file, number);

        assert_eq!(
            host.aircraft_names(number),
            vec!["1:BoB_RAF.010".to_string(), "1:BoB_RAF.011".to_string()]
        );
        assert_eq!(host.events.len(), 2);
        assert!(matches!(
            host.events.front(),
            Some(GameEvent::ActorCreated { mission_number: 1, .. })
        ));
    }

    #[test]
    fn place_enter_vacates_the_previous_place() {
        let mut host = SimHost::new();
        let player = host.add_player(1, "pilot", 1);
        host.spawn_lobby_group(1, "Lobby.01", 1, 2);

        let actor = host.actor_by_name("0:Lobby.010").expect("lobby aircraft");
        host.place_enter(player, actor, 0);
        host.place_enter(player, actor, 1);

        assert_eq!(host.occupant_of("0:Lobby.010", 0), None);
        assert_eq!(host.occupant_of("0:Lobby.010", 1), Some(player));
    }

    #[test]
    fn destroyed_aircraft_stay_queryable_for_the_event() {
        let mut host = SimHost::new();
        let player = host.add_player(1, "pilot", 1);
        host.spawn_lobby_group(1, "Lobby.01", 1, 1);
        let actor = host.actor_by_name("0:Lobby.010").expect("lobby aircraft");
        host.place_enter(player, actor, 0);

        host.destroy_actor(actor);
        assert_eq!(host.actor_by_name("0:Lobby.010"), None);
        let snapshot = host.aircraft_by_actor(actor).expect("graveyard snapshot");
        assert_eq!(snapshot.places[0].occupant, Some(player));
    }
}
