use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use coop_formats::{scan_missions, MissionFileEntry, SectionFile};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::config::LobbyConfig;
use crate::events::GameEvent;
use crate::host::{ActorId, GameHost, MissionNumber, PlayerId, LOBBY_MISSION_NUMBER};
use crate::menu::{self, classify_selection, MenuAction, MenuEntry, MenuId};
use crate::preload::{force_idle_for_start, prepare_preload};
use crate::scheduler::{ActionQueue, DeferredAction, DeferredCommand};
use crate::seats::{SeatError, SeatKey, SeatRegistry};

/// Delay between an actor spawning and the seat placement, giving the
/// engine time to fully initialize the aircraft.
const PLACE_DELAY: f64 = 3.0;
/// Delay between promoting a mission and releasing its forced-idle
/// groups.
const IDLE_RELEASE_DELAY: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MissionState {
    Pending,
    Running,
    Finished,
}

impl fmt::Display for MissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MissionState::Pending => "Pending",
            MissionState::Running => "Running",
            MissionState::Finished => "Finished",
        };
        f.write_str(label)
    }
}

/// One opened mission instance and everything it owns.
#[derive(Debug)]
pub struct CoopMission {
    pub number: MissionNumber,
    pub source: PathBuf,
    pub display_name: String,
    pub state: MissionState,
    /// Air groups this system forced idle at promotion, released again
    /// a few seconds after the running copy loads.
    pub forced_idle_groups: Vec<String>,
    pub seats: SeatRegistry,
    pub owned_actors: Vec<ActorId>,
}

impl CoopMission {
    pub fn display_label(&self) -> String {
        format!("{} ({})", self.display_name, self.state)
    }
}

/// Per-player lobby state: the displayed menu, its page offset and the
/// mission the player picked.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSession {
    pub menu: MenuId,
    pub page_offset: i64,
    pub selected_mission: Option<MissionNumber>,
}

impl Default for PlayerSession {
    fn default() -> Self {
        PlayerSession {
            menu: MenuId::ClientMain,
            page_offset: 0,
            selected_mission: None,
        }
    }
}

/// The lobby proper: owns the open missions, the per-player sessions
/// and the deferred-action queue, and drives the host through the
/// `GameHost` trait. Everything runs on the single engine callback
/// thread; timers re-validate their targets when they fire.
pub struct Lobby<H: GameHost> {
    host: H,
    config: LobbyConfig,
    missions: Vec<CoopMission>,
    players: BTreeMap<PlayerId, PlayerSession>,
    queue: ActionQueue,
    clock: f64,
    rng: StdRng,
}

impl<H: GameHost> Lobby<H> {
    pub fn new(host: H, config: LobbyConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Lobby {
            host,
            config,
            missions: Vec::new(),
            players: BTreeMap::new(),
            queue: ActionQueue::new(),
            clock: 0.0,
            rng,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn missions(&self) -> &[CoopMission] {
        &self.missions
    }

    pub fn player_session(&self, player: PlayerId) -> Option<&PlayerSession> {
        self.players.get(&player)
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn pending_actions(&self) -> &[DeferredAction] {
        self.queue.pending()
    }

    pub fn action_history(&self) -> &[DeferredAction] {
        self.queue.history()
    }

    /// Advance simulated time and run every deferred command that came
    /// due, in order.
    pub fn advance(&mut self, dt: f64) {
        self.clock += dt;
        while let Some(command) = self.queue.next_due(self.clock) {
            self.run_deferred(command);
        }
    }

    /// Entry point for engine-originated events.
    pub fn handle(&mut self, event: GameEvent) {
        match event {
            GameEvent::BattleStarted => {
                if self.host.is_dedicated() || self.config.force_random {
                    self.open_random_mission();
                }
            }
            GameEvent::ActorCreated {
                mission_number,
                name,
                actor,
            } => self.on_actor_created(mission_number, &name, actor),
            GameEvent::ActorDestroyed { actor, .. } => self.on_actor_destroyed(actor),
            GameEvent::PlaceEnter { player, .. } => self.set_main_menu(player),
            GameEvent::PlayerArmy { player, .. } => self.assign_to_lobby_aircraft(player),
            GameEvent::PlayerDisconnected { player, .. } => self.on_player_disconnected(player),
            GameEvent::MenuSelected { player, menu, item } => {
                self.on_menu_selected(player, menu, item)
            }
        }
    }

    fn run_deferred(&mut self, command: DeferredCommand) {
        match command {
            DeferredCommand::StartMission(number) => {
                if self.mission_state(number) == Some(MissionState::Pending) {
                    self.start_mission(number);
                } else {
                    debug!("deferred start: mission #{number} no longer pending");
                }
            }
            DeferredCommand::CloseMission(number) => {
                if self.mission_index(number).is_some() {
                    self.close_mission(number);
                }
            }
            DeferredCommand::OpenRandomMission => self.open_random_mission(),
            DeferredCommand::PlacePlayer(player) => {
                if self.players.contains_key(&player) {
                    self.place_player(player);
                } else {
                    debug!("deferred placement: {player} left before the timer fired");
                }
            }
            DeferredCommand::ReleaseIdle(number) => {
                if self.mission_state(number) == Some(MissionState::Running) {
                    self.release_forced_idle(number);
                }
            }
        }
    }

    // ---- mission lifecycle -------------------------------------------------

    fn mission_index(&self, number: MissionNumber) -> Option<usize> {
        self.missions.iter().position(|m| m.number == number)
    }

    pub fn mission(&self, number: MissionNumber) -> Option<&CoopMission> {
        self.missions.iter().find(|m| m.number == number)
    }

    fn mission_mut(&mut self, number: MissionNumber) -> Option<&mut CoopMission> {
        self.missions.iter_mut().find(|m| m.number == number)
    }

    fn mission_state(&self, number: MissionNumber) -> Option<MissionState> {
        self.mission(number).map(|m| m.state)
    }

    /// Current list of selectable mission files, rescanned on every
    /// call so menus never show a stale folder.
    pub fn mission_files(&self) -> Vec<MissionFileEntry> {
        scan_missions(
            &self.config.missions_root,
            self.config.missions_subfolder.as_deref(),
            &self.config.map_name,
        )
    }

    /// Open a mission file as a pending co-op mission: run the preload
    /// transform and hand the inert copy to the engine loader.
    pub fn open_mission(&mut self, entry: &MissionFileEntry) -> Option<MissionNumber> {
        let text = match fs::read_to_string(&entry.path) {
            Ok(text) => text,
            Err(err) => {
                warn!("cannot read mission {}: {err}", entry.path.display());
                return None;
            }
        };
        let mut file = match SectionFile::parse(&text) {
            Ok(file) => file,
            Err(err) => {
                warn!("cannot parse mission {}: {err}", entry.path.display());
                return None;
            }
        };

        let airports = self.host.airports();
        prepare_preload(&mut file, &airports);

        let number = self.host.next_mission_number();
        self.host.post_mission_load(&file, number);
        info!("mission {} pending as #{number}", entry.display_name);

        self.missions.push(CoopMission {
            number,
            source: entry.path.clone(),
            display_name: entry.display_name.clone(),
            state: MissionState::Pending,
            forced_idle_groups: Vec::new(),
            seats: SeatRegistry::new(),
            owned_actors: Vec::new(),
        });
        Some(number)
    }

    /// Promote a pending mission to running: replace the inert preload
    /// actors with a fresh load of the original description, forced
    /// idle, and schedule the idle release.
    pub fn start_mission(&mut self, number: MissionNumber) -> bool {
        let Some(index) = self.mission_index(number) else {
            debug!("start requested for unknown mission #{number}");
            return false;
        };
        if self.missions[index].state != MissionState::Pending {
            info!("mission #{number} is not pending, ignoring start");
            return false;
        }

        let source = self.missions[index].source.clone();
        let text = match fs::read_to_string(&source) {
            Ok(text) => text,
            Err(err) => {
                warn!("cannot read mission {}: {err}", source.display());
                return false;
            }
        };
        let mut file = match SectionFile::parse(&text) {
            Ok(file) => file,
            Err(err) => {
                warn!("cannot parse mission {}: {err}", source.display());
                return false;
            }
        };

        self.remove_actors(number);

        let forced = force_idle_for_start(&mut file);
        self.host.post_mission_load(&file, number);

        let mission = &mut self.missions[index];
        mission.forced_idle_groups = forced;
        mission.state = MissionState::Running;
        info!("mission #{number} running");

        self.queue
            .schedule(self.clock, IDLE_RELEASE_DELAY, DeferredCommand::ReleaseIdle(number));
        true
    }

    /// Close a mission and release everything it owns. No-op when the
    /// mission is already gone.
    pub fn close_mission(&mut self, number: MissionNumber) {
        let Some(index) = self.mission_index(number) else {
            debug!("close requested for unknown mission #{number}");
            return;
        };
        if self.missions[index].state == MissionState::Finished {
            return;
        }

        self.remove_actors(number);

        let mission = &mut self.missions[index];
        mission.seats.clear();
        mission.state = MissionState::Finished;

        let affected: Vec<PlayerId> = self
            .players
            .iter()
            .filter(|(_, session)| session.selected_mission == Some(number))
            .map(|(&player, _)| player)
            .collect();
        for &player in &affected {
            if let Some(session) = self.players.get_mut(&player) {
                session.selected_mission = None;
            }
        }

        self.missions.remove(index);
        info!("mission #{number} closed");

        for player in affected {
            self.set_main_menu(player);
        }
    }

    /// Open a random catalog mission and schedule its whole lifecycle:
    /// start after the pending delay, close after the duration, next
    /// random mission after the cycle delay.
    pub fn open_random_mission(&mut self) {
        let files = self.mission_files();
        if files.is_empty() {
            warn!("no mission files available for the random cycle");
            return;
        }
        let index = self.rng.gen_range(0..files.len());
        let Some(number) = self.open_mission(&files[index]) else {
            return;
        };

        let everyone = self.host.connected_players();
        self.host.log_to(&everyone, "New random mission.");

        self.queue.schedule(
            self.clock,
            self.config.pending_delay(),
            DeferredCommand::StartMission(number),
        );
        self.queue.schedule(
            self.clock,
            self.config.duration(),
            DeferredCommand::CloseMission(number),
        );
        self.queue
            .schedule(self.clock, self.config.cycle_delay(), DeferredCommand::OpenRandomMission);
    }

    fn remove_actors(&mut self, number: MissionNumber) {
        let Some(mission) = self.mission_mut(number) else {
            return;
        };
        let actors: Vec<ActorId> = mission.owned_actors.drain(..).collect();
        for actor in actors {
            self.host.destroy_actor(actor);
        }
    }

    fn release_forced_idle(&mut self, number: MissionNumber) {
        let Some(mission) = self.mission(number) else {
            return;
        };
        let forced = mission.forced_idle_groups.clone();
        let prefix = format!("{number}:");
        for army in self.host.armies() {
            for group in self.host.air_groups(army) {
                let Some(base) = group.name.strip_prefix(&prefix) else {
                    continue;
                };
                if forced.iter().any(|g| g == base) {
                    self.host.set_group_idle(&group.name, false);
                }
            }
        }
    }

    // ---- engine events -----------------------------------------------------

    fn on_actor_created(&mut self, mission_number: MissionNumber, name: &str, actor: ActorId) {
        let Some(index) = self.mission_index(mission_number) else {
            return;
        };

        let mission = &mut self.missions[index];
        let placements: Vec<PlayerId> = mission
            .seats
            .iter()
            .filter(|(seat, _)| format!("{mission_number}:{}", seat.aircraft) == name)
            .map(|(_, player)| player)
            .collect();
        mission.owned_actors.push(actor);

        for player in placements {
            self.queue
                .schedule(self.clock, PLACE_DELAY, DeferredCommand::PlacePlayer(player));
        }
    }

    fn on_actor_destroyed(&mut self, actor: ActorId) {
        let Some(aircraft) = self.host.aircraft_by_actor(actor) else {
            return;
        };
        let stranded: Vec<PlayerId> = aircraft.places.iter().filter_map(|p| p.occupant).collect();
        for player in stranded {
            self.assign_to_lobby_aircraft(player);
        }
    }

    fn on_player_disconnected(&mut self, player: PlayerId) {
        if let Some(session) = self.players.remove(&player) {
            if let Some(number) = session.selected_mission {
                if let Some(mission) = self.mission_mut(number) {
                    mission.seats.release(player);
                }
            }
        }
    }

    /// Park a player in the first unoccupied place of a lobby aircraft
    /// (the groups of the reserved mission number `0`).
    fn assign_to_lobby_aircraft(&mut self, player: PlayerId) {
        let prefix = format!("{LOBBY_MISSION_NUMBER}:");
        if let Some(army) = self.host.player_army(player) {
            for group in self.host.air_groups(army) {
                if !group.name.starts_with(&prefix) {
                    continue;
                }
                for aircraft in &group.aircraft {
                    for (place_index, place) in aircraft.places.iter().enumerate() {
                        if place.occupant.is_none() {
                            let actor = aircraft.actor;
                            self.host.place_enter(player, actor, place_index);
                            return;
                        }
                    }
                }
            }
        }
        self.host
            .log_to(&[player], "No unoccupied place available in the lobby aircraft.");
    }

    /// Put a player into their reserved seat, if the aircraft exists
    /// by now. Quietly does nothing otherwise; the next actor spawn
    /// schedules another attempt.
    fn place_player(&mut self, player: PlayerId) {
        let Some(number) = self.players.get(&player).and_then(|s| s.selected_mission) else {
            return;
        };
        let Some(mission) = self.mission(number) else {
            return;
        };
        let Some(seat) = mission.seats.seat_of(player).cloned() else {
            return;
        };

        let actor_name = format!("{number}:{}", seat.aircraft);
        let Some(actor) = self.host.actor_by_name(&actor_name) else {
            debug!("aircraft {actor_name} not spawned yet, placement skipped");
            return;
        };
        let Some(aircraft) = self.host.aircraft_by_actor(actor) else {
            return;
        };
        if seat.place < aircraft.places.len() {
            self.host.place_enter(player, actor, seat.place);
        }
    }

    // ---- menus -------------------------------------------------------------

    fn is_host_player(&self, player: PlayerId) -> bool {
        if self.host.primary_player() == Some(player) {
            return true;
        }
        match self.host.player_name(player) {
            Some(name) if !name.is_empty() => {
                self.config.host_players.iter().any(|n| n == &name)
            }
            _ => false,
        }
    }

    /// Render the main menu: the host variant for the primary player
    /// and allow-listed names, the reduced client variant otherwise.
    /// Always resets the page offset.
    pub fn set_main_menu(&mut self, player: PlayerId) {
        let is_host = self.is_host_player(player);
        let menu = if is_host {
            MenuId::HostMain
        } else {
            MenuId::ClientMain
        };
        {
            let session = self.players.entry(player).or_default();
            session.page_offset = 0;
            session.menu = menu;
        }

        let selected = self.players.get(&player).and_then(|s| s.selected_mission);
        let mission_label = selected
            .and_then(|n| self.mission(n))
            .map(|m| m.display_label());
        let seat = selected
            .and_then(|n| self.mission(n))
            .and_then(|m| m.seats.seat_of(player).cloned());
        let seat_label = seat.map(|s| {
            self.seat_display(player, &s)
                .unwrap_or_else(|| s.to_string())
        });

        let select_mission = format!(
            "Select Mission (Selected Mission: {})",
            mission_label.as_deref().unwrap_or("None")
        );
        let select_aircraft = format!(
            "Select Aircraft (Selected Aircraft: {})",
            seat_label.as_deref().unwrap_or("None")
        );

        let mut entries = if is_host {
            vec![
                MenuEntry::new("Open Mission"),
                MenuEntry::new("Close Mission"),
                MenuEntry::new("Start Mission"),
                MenuEntry::new(select_mission),
            ]
        } else {
            vec![MenuEntry::new(select_mission)]
        };
        if selected.is_some() {
            entries.push(MenuEntry::new(select_aircraft));
            entries.push(MenuEntry::new("Players"));
        } else {
            entries.push(MenuEntry::blank());
            entries.push(MenuEntry::blank());
        }

        self.host.set_order_menu(player, false, menu, &entries);
    }

    /// Render a paginated submenu from the freshly recomputed backing
    /// list and remember the clamped page offset for dispatch.
    fn show_submenu(&mut self, player: PlayerId, menu: MenuId) {
        let items: Vec<String> = match menu {
            MenuId::OpenMission => self
                .mission_files()
                .into_iter()
                .map(|entry| entry.display_name)
                .collect(),
            MenuId::CloseMission | MenuId::StartMission | MenuId::SelectMission => self
                .missions
                .iter()
                .map(|m| m.display_label())
                .collect(),
            MenuId::SelectAircraft => self.aircraft_seat_items(player),
            MenuId::Players => self.player_items(player),
            MenuId::HostMain | MenuId::ClientMain => {
                self.set_main_menu(player);
                return;
            }
        };

        let count = items.len();
        let offset = {
            let session = self.players.entry(player).or_default();
            session.menu = menu;
            session.page_offset = menu::clamp_offset(session.page_offset, count) as i64;
            session.page_offset as usize
        };

        let entries = menu::paged_entries(&items, offset);
        self.host.set_order_menu(player, true, menu, &entries);
    }

    /// Seats of the selected mission reachable from the player's army,
    /// in stable group/aircraft/place order.
    fn aircraft_seats(&self, player: PlayerId) -> Vec<(SeatKey, String)> {
        let Some(number) = self.players.get(&player).and_then(|s| s.selected_mission) else {
            return Vec::new();
        };
        let Some(army) = self.host.player_army(player) else {
            return Vec::new();
        };

        let prefix = format!("{number}:");
        let mut seats = Vec::new();
        for group in self.host.air_groups(army) {
            if !group.name.starts_with(&prefix) {
                continue;
            }
            for aircraft in &group.aircraft {
                for (place_index, place) in aircraft.places.iter().enumerate() {
                    let key = SeatKey::new(aircraft.base_name(), place_index);
                    let label =
                        format!("{} {} | {}", aircraft.name, aircraft.type_name, place.role);
                    seats.push((key, label));
                }
            }
        }
        seats
    }

    fn aircraft_seat_items(&self, player: PlayerId) -> Vec<String> {
        let mission = self
            .players
            .get(&player)
            .and_then(|s| s.selected_mission)
            .and_then(|n| self.mission(n));
        self.aircraft_seats(player)
            .into_iter()
            .map(|(key, label)| {
                match mission.and_then(|m| m.seats.player_of(&key)) {
                    Some(holder) => {
                        let name = self
                            .host
                            .player_name(holder)
                            .unwrap_or_else(|| holder.to_string());
                        format!("{label}: {name}")
                    }
                    None => label,
                }
            })
            .collect()
    }

    fn player_items(&self, player: PlayerId) -> Vec<String> {
        let Some(number) = self.players.get(&player).and_then(|s| s.selected_mission) else {
            return Vec::new();
        };
        let mission = self.mission(number);

        let mut items = Vec::new();
        for (&other, session) in &self.players {
            if session.selected_mission != Some(number) {
                continue;
            }
            let name = self
                .host
                .player_name(other)
                .unwrap_or_else(|| other.to_string());
            let seat_label = mission
                .and_then(|m| m.seats.seat_of(other).cloned())
                .map(|seat| {
                    self.seat_display(player, &seat)
                        .unwrap_or_else(|| seat.to_string())
                })
                .unwrap_or_else(|| "None".to_string());
            items.push(format!("{name} ({seat_label})"));
        }
        items
    }

    fn seat_display(&self, player: PlayerId, seat: &SeatKey) -> Option<String> {
        let number = self.players.get(&player)?.selected_mission?;
        let army = self.host.player_army(player)?;
        let prefix = format!("{number}:");
        for group in self.host.air_groups(army) {
            if !group.name.starts_with(&prefix) {
                continue;
            }
            for aircraft in &group.aircraft {
                if aircraft.base_name() == seat.aircraft {
                    let role = aircraft.places.get(seat.place)?.role.clone();
                    return Some(format!(
                        "{} {} | {}",
                        aircraft.name, aircraft.type_name, role
                    ));
                }
            }
        }
        None
    }

    fn on_menu_selected(&mut self, player: PlayerId, menu: MenuId, item: usize) {
        match menu {
            MenuId::HostMain => match item {
                1 => self.show_submenu(player, MenuId::OpenMission),
                2 => self.show_submenu(player, MenuId::CloseMission),
                3 => self.show_submenu(player, MenuId::StartMission),
                4 => self.show_submenu(player, MenuId::SelectMission),
                5 => self.show_submenu(player, MenuId::SelectAircraft),
                6 => self.show_submenu(player, MenuId::Players),
                _ => {}
            },
            MenuId::ClientMain => match item {
                1 => self.show_submenu(player, MenuId::SelectMission),
                2 => self.show_submenu(player, MenuId::SelectAircraft),
                3 => self.show_submenu(player, MenuId::Players),
                _ => {}
            },
            submenu => self.on_submenu_selected(player, submenu, item),
        }
    }

    fn on_submenu_selected(&mut self, player: PlayerId, menu: MenuId, item: usize) {
        let offset = self
            .players
            .get(&player)
            .map(|s| s.page_offset.max(0) as usize)
            .unwrap_or(0);

        match classify_selection(item, offset) {
            MenuAction::Back => self.set_main_menu(player),
            MenuAction::PageUp => {
                self.players.entry(player).or_default().page_offset -= 1;
                self.show_submenu(player, menu);
            }
            MenuAction::PageDown => {
                self.players.entry(player).or_default().page_offset += 1;
                self.show_submenu(player, menu);
            }
            MenuAction::Pick(index) => self.pick(player, menu, index),
            MenuAction::Ignore => {}
        }
    }

    /// Execute a content selection. Indices past the end of the
    /// freshly recomputed backing list were rendered blank; the race
    /// with a concurrent mutation is expected and absorbed with a
    /// redraw of the current list.
    fn pick(&mut self, player: PlayerId, menu: MenuId, index: usize) {
        match menu {
            MenuId::SelectMission => {
                let Some(number) = self.missions.get(index).map(|m| m.number) else {
                    self.show_submenu(player, menu);
                    return;
                };
                self.players.entry(player).or_default().selected_mission = Some(number);
                self.set_main_menu(player);
            }
            MenuId::OpenMission => {
                let files = self.mission_files();
                let Some(entry) = files.get(index) else {
                    self.show_submenu(player, menu);
                    return;
                };
                if let Some(number) = self.open_mission(entry) {
                    let label = self
                        .mission(number)
                        .map(|m| m.display_label())
                        .unwrap_or_default();
                    self.host
                        .log_to(&[player], &format!("Mission pending: {label}"));
                }
                self.set_main_menu(player);
            }
            MenuId::CloseMission => {
                let Some((number, label)) = self
                    .missions
                    .get(index)
                    .map(|m| (m.number, m.display_label()))
                else {
                    self.show_submenu(player, menu);
                    return;
                };
                self.close_mission(number);
                self.host
                    .log_to(&[player], &format!("Mission closed: {label}"));
                self.set_main_menu(player);
            }
            MenuId::StartMission => {
                let Some(number) = self.missions.get(index).map(|m| m.number) else {
                    self.show_submenu(player, menu);
                    return;
                };
                if self.start_mission(number) {
                    let label = self
                        .mission(number)
                        .map(|m| m.display_label())
                        .unwrap_or_default();
                    self.host
                        .log_to(&[player], &format!("Mission started: {label}"));
                } else {
                    self.host.log_to(&[player], "Mission is not pending.");
                }
                self.set_main_menu(player);
            }
            MenuId::SelectAircraft => self.pick_seat(player, index),
            MenuId::Players => self.show_submenu(player, MenuId::Players),
            MenuId::HostMain | MenuId::ClientMain => {}
        }
    }

    fn pick_seat(&mut self, player: PlayerId, index: usize) {
        let seats = self.aircraft_seats(player);
        let Some((seat, label)) = seats.get(index).cloned() else {
            self.show_submenu(player, MenuId::SelectAircraft);
            return;
        };
        let Some(number) = self.players.get(&player).and_then(|s| s.selected_mission) else {
            return;
        };
        let result = match self.mission_mut(number) {
            Some(mission) => mission.seats.reserve(seat, player),
            None => return,
        };

        match result {
            Ok(()) => {
                self.place_player(player);
                self.host
                    .log_to(&[player], &format!("Aircraft selected: {label}"));
                self.set_main_menu(player);
            }
            Err(SeatError::AlreadyOccupied(_)) => {
                self.host.log_to(&[player], "Aircraft is already occupied.");
                self.show_submenu(player, MenuId::SelectAircraft);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use crate::sim::{pump, SimHost};

    const MAP: &str = "Land$English_Channel_1940";

    fn write_mission(dir: &Path, name: &str) {
        let text = [
            "[MAIN]",
            &format!("  MAP {MAP}"),
            "[PARTS]",
            "  core.100",
            "[AirGroups]",
            "  BoB_RAF.01",
            "[BoB_RAF.01]",
            "  Class Aircraft.SpitfireMkI",
            "  Army 1",
            "  Crew 1",
            "  Flight0 1",
            "[BoB_RAF.01_Way]",
            "  TAKEOFF 28000.0 19000.0 0 0",
            "  NORMFLY 31000.0 21000.0 500.0 300.0",
        ]
        .join("\n");
        std::fs::write(dir.join(name), text).expect("write mission");
    }

    fn test_config(root: &Path) -> LobbyConfig {
        LobbyConfig {
            missions_root: root.to_path_buf(),
            map_name: MAP.to_string(),
            pending_minutes: 1,
            duration_minutes: 2,
            cycle_minutes: 3,
            force_random: false,
            rng_seed: Some(7),
            ..LobbyConfig::default()
        }
    }

    fn lobby_with_mission() -> (Lobby<SimHost>, tempfile::TempDir, PlayerId) {
        let dir = tempfile::tempdir().expect("tempdir");
        write_mission(dir.path(), "channel.mis");

        let mut host = SimHost::new();
        let player = host.add_player(1, "skipper", 1);
        host.set_primary(player);
        host.spawn_lobby_group(1, "Lobby.01", 1, 2);

        let lobby = Lobby::new(host, test_config(dir.path()));
        (lobby, dir, player)
    }

    fn select_mission(lobby: &mut Lobby<SimHost>, player: PlayerId) {
        lobby.handle(GameEvent::MenuSelected {
            player,
            menu: MenuId::HostMain,
            item: 4,
        });
        lobby.handle(GameEvent::MenuSelected {
            player,
            menu: MenuId::SelectMission,
            item: 1,
        });
    }

    fn reserve_first_seat(lobby: &mut Lobby<SimHost>, player: PlayerId) {
        lobby.handle(GameEvent::MenuSelected {
            player,
            menu: MenuId::HostMain,
            item: 5,
        });
        lobby.handle(GameEvent::MenuSelected {
            player,
            menu: MenuId::SelectAircraft,
            item: 1,
        });
    }

    #[test]
    fn open_select_reserve_places_the_player() {
        let (mut lobby, _dir, player) = lobby_with_mission();

        let files = lobby.mission_files();
        let number = lobby.open_mission(&files[0]).expect("open");
        pump(&mut lobby);

        select_mission(&mut lobby, player);
        assert_eq!(
            lobby.player_session(player).unwrap().selected_mission,
            Some(number)
        );

        reserve_first_seat(&mut lobby, player);
        pump(&mut lobby);
        assert_eq!(
            lobby.host().occupant_of("1:BoB_RAF.010", 0),
            Some(player)
        );
        assert!(lobby
            .host()
            .log_lines
            .iter()
            .any(|(_, line)| line.starts_with("Aircraft selected: ")));
    }

    #[test]
    fn close_clears_seats_selections_and_actors() {
        let (mut lobby, _dir, player) = lobby_with_mission();

        let files = lobby.mission_files();
        let number = lobby.open_mission(&files[0]).expect("open");
        pump(&mut lobby);
        select_mission(&mut lobby, player);
        reserve_first_seat(&mut lobby, player);
        pump(&mut lobby);

        lobby.close_mission(number);
        pump(&mut lobby);

        assert!(lobby.missions().is_empty());
        assert_eq!(lobby.player_session(player).unwrap().selected_mission, None);
        assert!(lobby.host().aircraft_names(number).is_empty());
        // The displaced player lands back in a lobby aircraft.
        assert_eq!(lobby.host().occupant_of("0:Lobby.010", 0), Some(player));

        // Closing again is a no-op.
        lobby.close_mission(number);
        assert!(lobby.missions().is_empty());
    }

    #[test]
    fn second_player_cannot_take_a_reserved_seat() {
        let (mut lobby, _dir, host_player) = lobby_with_mission();
        let rival = lobby.host_mut().add_player(2, "wingman", 1);

        let files = lobby.mission_files();
        lobby.open_mission(&files[0]).expect("open");
        pump(&mut lobby);

        select_mission(&mut lobby, host_player);
        reserve_first_seat(&mut lobby, host_player);
        pump(&mut lobby);

        // The rival picks the same mission and the same (only) seat.
        lobby.handle(GameEvent::MenuSelected {
            player: rival,
            menu: MenuId::ClientMain,
            item: 1,
        });
        lobby.handle(GameEvent::MenuSelected {
            player: rival,
            menu: MenuId::SelectMission,
            item: 1,
        });
        lobby.handle(GameEvent::MenuSelected {
            player: rival,
            menu: MenuId::ClientMain,
            item: 2,
        });
        lobby.handle(GameEvent::MenuSelected {
            player: rival,
            menu: MenuId::SelectAircraft,
            item: 1,
        });

        assert!(lobby
            .host()
            .log_lines
            .iter()
            .any(|(players, line)| players == &vec![rival]
                && line == "Aircraft is already occupied."));
        assert_eq!(
            lobby.host().occupant_of("1:BoB_RAF.010", 0),
            Some(host_player)
        );
    }

    #[test]
    fn start_forces_groups_idle_then_releases_them() {
        let (mut lobby, _dir, player) = lobby_with_mission();

        let files = lobby.mission_files();
        let number = lobby.open_mission(&files[0]).expect("open");
        pump(&mut lobby);
        select_mission(&mut lobby, player);
        reserve_first_seat(&mut lobby, player);
        pump(&mut lobby);

        assert!(lobby.start_mission(number));
        pump(&mut lobby);
        assert_eq!(lobby.mission(number).unwrap().state, MissionState::Running);
        assert_eq!(lobby.host().group_idle("1:BoB_RAF.01"), Some(true));

        // The reserved player is re-placed shortly after the running
        // copy spawns, the idle hold is released a little later.
        lobby.advance(3.0);
        pump(&mut lobby);
        assert_eq!(lobby.host().occupant_of("1:BoB_RAF.010", 0), Some(player));

        lobby.advance(2.0);
        assert_eq!(lobby.host().group_idle("1:BoB_RAF.01"), Some(false));

        // A second start is rejected.
        assert!(!lobby.start_mission(number));
    }

    #[test]
    fn random_cycle_runs_start_close_and_reopen() {
        let (mut lobby, _dir, _player) = lobby_with_mission();
        lobby.host_mut().set_dedicated(true);

        lobby.handle(GameEvent::BattleStarted);
        pump(&mut lobby);
        assert_eq!(lobby.missions().len(), 1);
        let first = lobby.missions()[0].number;
        assert_eq!(lobby.mission(first).unwrap().state, MissionState::Pending);
        assert!(lobby
            .host()
            .log_lines
            .iter()
            .any(|(_, line)| line == "New random mission."));

        // Pending delay elapses: the mission starts.
        lobby.advance(60.0);
        pump(&mut lobby);
        assert_eq!(lobby.mission(first).unwrap().state, MissionState::Running);

        // Duration elapses: the mission closes.
        lobby.advance(60.0);
        pump(&mut lobby);
        assert!(lobby.mission(first).is_none());

        // Cycle delay elapses: the next random mission opens.
        lobby.advance(60.0);
        pump(&mut lobby);
        assert_eq!(lobby.missions().len(), 1);
        assert_ne!(lobby.missions()[0].number, first);
        assert_eq!(
            lobby.missions()[0].state,
            MissionState::Pending
        );
    }

    #[test]
    fn disconnect_frees_the_seat_and_stale_timers_noop() {
        let (mut lobby, _dir, player) = lobby_with_mission();

        let files = lobby.mission_files();
        let number = lobby.open_mission(&files[0]).expect("open");
        pump(&mut lobby);
        select_mission(&mut lobby, player);
        reserve_first_seat(&mut lobby, player);
        pump(&mut lobby);

        // Starting schedules a deferred placement for the reserved seat.
        assert!(lobby.start_mission(number));
        pump(&mut lobby);

        lobby.host_mut().remove_player(player);
        lobby.handle(GameEvent::PlayerDisconnected {
            player,
            reason: "left".to_string(),
        });
        assert!(lobby.mission(number).unwrap().seats.is_empty());
        assert!(lobby.player_session(player).is_none());

        // The placement timer fires against a player who is gone.
        lobby.advance(10.0);
        pump(&mut lobby);
        assert_eq!(lobby.host().occupant_of("1:BoB_RAF.010", 0), None);
    }

    #[test]
    fn destroyed_aircraft_sends_its_crew_to_the_lobby() {
        let (mut lobby, _dir, player) = lobby_with_mission();

        let files = lobby.mission_files();
        lobby.open_mission(&files[0]).expect("open");
        pump(&mut lobby);
        select_mission(&mut lobby, player);
        reserve_first_seat(&mut lobby, player);
        pump(&mut lobby);
        assert_eq!(lobby.host().occupant_of("1:BoB_RAF.010", 0), Some(player));

        let actor = lobby.host().actor_by_name("1:BoB_RAF.010").expect("actor");
        lobby.host_mut().destroy_actor(actor);
        pump(&mut lobby);

        assert_eq!(lobby.host().occupant_of("0:Lobby.010", 0), Some(player));
    }

    #[test]
    fn main_menu_shape_differs_for_host_and_client() {
        let (mut lobby, _dir, host_player) = lobby_with_mission();
        let guest = lobby.host_mut().add_player(2, "guest", 1);

        lobby.set_main_menu(host_player);
        lobby.set_main_menu(guest);

        let host_menu = lobby.host().last_menu_for(host_player).unwrap();
        assert_eq!(host_menu.menu, MenuId::HostMain);
        assert_eq!(host_menu.entries.len(), 6);
        assert_eq!(host_menu.entries[0].label, "Open Mission");
        // No selection yet: the dependent entries render blank.
        assert_eq!(host_menu.entries[4].label, "");
        assert_eq!(host_menu.entries[5].label, "");

        let guest_menu = lobby.host().last_menu_for(guest).unwrap();
        assert_eq!(guest_menu.menu, MenuId::ClientMain);
        assert_eq!(guest_menu.entries.len(), 3);
        assert!(guest_menu.entries[0]
            .label
            .starts_with("Select Mission (Selected Mission: None"));
    }

    #[test]
    fn back_returns_to_main_and_resets_the_page_offset() {
        let (mut lobby, dir, player) = lobby_with_mission();
        for index in 0..9 {
            write_mission(dir.path(), &format!("extra{index}.mis"));
        }

        lobby.handle(GameEvent::MenuSelected {
            player,
            menu: MenuId::HostMain,
            item: 1,
        });
        lobby.handle(GameEvent::MenuSelected {
            player,
            menu: MenuId::OpenMission,
            item: 9,
        });
        assert_eq!(lobby.player_session(player).unwrap().page_offset, 1);

        lobby.handle(GameEvent::MenuSelected {
            player,
            menu: MenuId::OpenMission,
            item: 0,
        });
        let session = lobby.player_session(player).unwrap();
        assert_eq!(session.page_offset, 0);
        assert_eq!(session.menu, MenuId::HostMain);
    }

    #[test]
    fn stale_submenu_pick_is_silently_absorbed() {
        let (mut lobby, _dir, player) = lobby_with_mission();

        let files = lobby.mission_files();
        let number = lobby.open_mission(&files[0]).expect("open");
        pump(&mut lobby);

        // The mission list menu is on screen when the mission vanishes.
        lobby.handle(GameEvent::MenuSelected {
            player,
            menu: MenuId::HostMain,
            item: 4,
        });
        lobby.close_mission(number);
        pump(&mut lobby);

        lobby.handle(GameEvent::MenuSelected {
            player,
            menu: MenuId::SelectMission,
            item: 1,
        });
        assert_eq!(lobby.player_session(player).unwrap().selected_mission, None);
        // The emptied list is redrawn instead of erroring out.
        let redraw = lobby.host().last_menu_for(player).unwrap();
        assert_eq!(redraw.menu, MenuId::SelectMission);
        assert_eq!(redraw.entries[0].label, "");
    }
}
