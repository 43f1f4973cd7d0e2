use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::host::PlayerId;

/// One crew position inside one aircraft of a mission, in the text
/// form `"<aircraftBaseName>@<placeIndex>"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeatKey {
    pub aircraft: String,
    pub place: usize,
}

impl SeatKey {
    pub fn new(aircraft: impl Into<String>, place: usize) -> Self {
        SeatKey {
            aircraft: aircraft.into(),
            place,
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        let (aircraft, place) = text.rsplit_once('@')?;
        Some(SeatKey {
            aircraft: aircraft.to_string(),
            place: place.parse().ok()?,
        })
    }
}

impl fmt::Display for SeatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.aircraft, self.place)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SeatError {
    #[error("seat {0} is already occupied")]
    AlreadyOccupied(SeatKey),
}

/// Seat reservations of one mission. The mapping is a partial
/// bijection: a seat holds at most one player and a player holds at
/// most one seat.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SeatRegistry {
    selections: BTreeMap<SeatKey, PlayerId>,
}

impl SeatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a seat. Fails when another player already holds it; on
    /// success any seat previously held by `player` is released first.
    pub fn reserve(&mut self, seat: SeatKey, player: PlayerId) -> Result<(), SeatError> {
        if let Some(&holder) = self.selections.get(&seat) {
            if holder != player {
                return Err(SeatError::AlreadyOccupied(seat));
            }
        }
        self.release(player);
        self.selections.insert(seat, player);
        Ok(())
    }

    /// Release whatever seat `player` holds; no-op otherwise.
    pub fn release(&mut self, player: PlayerId) -> Option<SeatKey> {
        let held = self
            .selections
            .iter()
            .find(|(_, &holder)| holder == player)
            .map(|(seat, _)| seat.clone())?;
        self.selections.remove(&held);
        Some(held)
    }

    pub fn seat_of(&self, player: PlayerId) -> Option<&SeatKey> {
        self.selections
            .iter()
            .find(|(_, &holder)| holder == player)
            .map(|(seat, _)| seat)
    }

    pub fn player_of(&self, seat: &SeatKey) -> Option<PlayerId> {
        self.selections.get(seat).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SeatKey, PlayerId)> {
        self.selections.iter().map(|(seat, &player)| (seat, player))
    }

    pub fn clear(&mut self) {
        self.selections.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.selections.len()
    }
}
