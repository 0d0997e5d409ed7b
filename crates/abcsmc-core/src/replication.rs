//! Replicates the first-node event subset for `ldata`-target generations, so
//! one simulator trajectory yields `n` particles in parallel (spec §4.4,
//! §5, §8 scenario 2). Pairs with `SimulatorHandle::replicate_first_node`,
//! which clones the handle's own `u0`/`v0`/`ldata` state; this adapter owns
//! only the `EventTable` side of the replication.

use crate::event_table::Event;
use abcsmc_common::{EventKind, Error, Result};

pub struct ReplicationAdapter;

impl ReplicationAdapter {
    /// Replicates every event scheduled on node 1 (the "first node") `n`
    /// times, offsetting `node` by `0, 1, ..., n-1` and leaving every other
    /// field — including `dest` — untouched. External-transfer events on
    /// node 1 are rejected, since a `dest` offset would be required but is
    /// explicitly disallowed under this replication mode (spec §4.4).
    pub fn replicate_events(events: &[Event], n: usize) -> Result<Vec<Event>> {
        if n == 0 {
            return Err(Error::EventTable("replicate_first_node requires n >= 1".into()));
        }

        let first_node_events: Vec<&Event> = events.iter().filter(|e| e.node == 1).collect();
        if first_node_events.iter().any(|e| e.kind == EventKind::ExtTransfer) {
            return Err(Error::EventTable(
                "replicate_first_node forbids extTrans events on the first node".into(),
            ));
        }

        let mut replicated = Vec::with_capacity(first_node_events.len() * n);
        for offset in 0..n as i64 {
            for event in &first_node_events {
                let mut replica = **event;
                replica.node += offset;
                replicated.push(replica);
            }
        }
        Ok(replicated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_table::Event;

    fn first_node_event() -> Event {
        Event { kind: EventKind::Enter, time: 5, node: 1, dest: 0, n: 2, proportion: 0.0, select: 1, shift: 0 }
    }

    #[test]
    fn replicates_first_node_event_with_node_offsets() {
        let events = vec![first_node_event()];
        let replicated = ReplicationAdapter::replicate_events(&events, 3).unwrap();
        assert_eq!(replicated.len(), 3);
        let nodes: Vec<i64> = replicated.iter().map(|e| e.node).collect();
        assert_eq!(nodes, vec![1, 2, 3]);
        for event in &replicated {
            assert_eq!(event.time, 5);
            assert_eq!(event.dest, 0);
            assert_eq!(event.n, 2);
            assert_eq!(event.select, 1);
            assert_eq!(event.shift, 0);
        }
    }

    #[test]
    fn ignores_events_on_other_nodes() {
        let mut other = first_node_event();
        other.node = 2;
        let events = vec![first_node_event(), other];
        let replicated = ReplicationAdapter::replicate_events(&events, 2).unwrap();
        assert_eq!(replicated.len(), 2);
    }

    #[test]
    fn rejects_ext_transfer_on_first_node() {
        let mut ext = first_node_event();
        ext.kind = EventKind::ExtTransfer;
        ext.dest = 4;
        assert!(ReplicationAdapter::replicate_events(&[ext], 2).is_err());
    }

    #[test]
    fn rejects_zero_replication_count() {
        assert!(ReplicationAdapter::replicate_events(&[first_node_event()], 0).is_err());
    }
}
