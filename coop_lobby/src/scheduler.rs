use serde::Serialize;

use crate::host::{MissionNumber, PlayerId};

/// Deferred work captured as a plain value instead of a closure, so a
/// fired command can re-validate its target before acting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DeferredCommand {
    StartMission(MissionNumber),
    CloseMission(MissionNumber),
    OpenRandomMission,
    PlacePlayer(PlayerId),
    ReleaseIdle(MissionNumber),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeferredAction {
    pub fire_at: f64,
    pub command: DeferredCommand,
}

/// One-shot timer queue for the single-threaded run loop. Commands
/// fire in `fire_at` order; ties fire in scheduling order.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ActionQueue {
    pending: Vec<DeferredAction>,
    history: Vec<DeferredAction>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, now: f64, delay: f64, command: DeferredCommand) {
        self.pending.push(DeferredAction {
            fire_at: now + delay,
            command,
        });
    }

    /// Pop the earliest command due at `now`, if any.
    pub fn next_due(&mut self, now: f64) -> Option<DeferredCommand> {
        let mut due: Option<usize> = None;
        for (index, action) in self.pending.iter().enumerate() {
            if action.fire_at > now {
                continue;
            }
            match due {
                Some(best) if self.pending[best].fire_at <= action.fire_at => {}
                _ => due = Some(index),
            }
        }
        let index = due?;
        let action = self.pending.remove(index);
        self.history.push(action.clone());
        Some(action.command)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self) -> &[DeferredAction] {
        &self.pending
    }

    pub fn history(&self) -> &[DeferredAction] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_fire_in_time_order() {
        let mut queue = ActionQueue::new();
        queue.schedule(0.0, 10.0, DeferredCommand::CloseMission(1));
        queue.schedule(0.0, 3.0, DeferredCommand::PlacePlayer(PlayerId(7)));
        queue.schedule(0.0, 5.0, DeferredCommand::ReleaseIdle(1));

        assert_eq!(queue.next_due(2.0), None);
        assert_eq!(
            queue.next_due(10.0),
            Some(DeferredCommand::PlacePlayer(PlayerId(7)))
        );
        assert_eq!(queue.next_due(10.0), Some(DeferredCommand::ReleaseIdle(1)));
        assert_eq!(queue.next_due(10.0), Some(DeferredCommand::CloseMission(1)));
        assert!(queue.is_empty());
        assert_eq!(queue.history().len(), 3);
    }

    #[test]
    fn ties_fire_in_scheduling_order() {
        let mut queue = ActionQueue::new();
        queue.schedule(0.0, 5.0, DeferredCommand::StartMission(1));
        queue.schedule(0.0, 5.0, DeferredCommand::StartMission(2));

        assert_eq!(queue.next_due(5.0), Some(DeferredCommand::StartMission(1)));
        assert_eq!(queue.next_due(5.0), Some(DeferredCommand::StartMission(2)));
    }
}
