use crate::host::{ActorId, Army, MissionNumber, PlayerId};
use crate::menu::MenuId;

/// Engine-originated events, delivered one at a time in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    BattleStarted,
    ActorCreated {
        mission_number: MissionNumber,
        name: String,
        actor: ActorId,
    },
    ActorDestroyed {
        mission_number: MissionNumber,
        name: String,
        actor: ActorId,
    },
    PlaceEnter {
        player: PlayerId,
        actor: ActorId,
        place: usize,
    },
    PlayerArmy {
        player: PlayerId,
        army: Army,
    },
    PlayerDisconnected {
        player: PlayerId,
        reason: String,
    },
    MenuSelected {
        player: PlayerId,
        menu: MenuId,
        item: usize,
    },
}
