use std::collections::VecDeque;

use crate::engine::EngineEvent;
use crate::topology::TopologyChange;

/// Submitted events and topology reactions waiting for the next tick.
#[derive(Debug, Default)]
pub struct Scheduler {
    event_queue: VecDeque<EngineEvent>,
    topology_queue: VecDeque<TopologyChange>,
}

impl Scheduler {
    pub fn push_event(&mut self, event: EngineEvent) {
        self.event_queue.push_back(event);
    }

    pub fn push_topology(&mut self, change: TopologyChange) {
        self.topology_queue.push_back(change);
    }

    pub fn pop_event(&mut self) -> Option<EngineEvent> {
        self.event_queue.pop_front()
    }

    /// Topology changes queued before this call. Changes pushed afterwards wait for the
    /// following tick.
    pub fn take_due_topology(&mut self) -> VecDeque<TopologyChange> {
        std::mem::take(&mut self.topology_queue)
    }

    pub fn pending_events(&self) -> usize {
        self.event_queue.len()
    }

    pub fn pending_topology(&self) -> usize {
        self.topology_queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.event_queue.is_empty() && self.topology_queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.event_queue.clear();
        self.topology_queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{PlayerId, StructureId};

    #[test]
    fn topology_pushed_after_take_waits() {
        let mut scheduler = Scheduler::default();
        scheduler.push_topology(TopologyChange::Merged {
            absorbed: StructureId(1),
            survivor: StructureId(2),
        });
        let due = scheduler.take_due_topology();
        scheduler.push_topology(TopologyChange::Split {
            original: StructureId(2),
            created: StructureId(3),
        });
        assert_eq!(due.len(), 1);
        assert_eq!(scheduler.pending_topology(), 1);
    }

    #[test]
    fn events_drain_in_order() {
        let mut scheduler = Scheduler::default();
        scheduler.push_event(EngineEvent::PlayerConnected { player: PlayerId(1) });
        scheduler.push_event(EngineEvent::PlayerConnected { player: PlayerId(2) });
        assert_eq!(
            scheduler.pop_event(),
            Some(EngineEvent::PlayerConnected { player: PlayerId(1) })
        );
        scheduler.clear();
        assert!(scheduler.is_empty());
    }
}
