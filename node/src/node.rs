//! Node identity, finger table, and the pure Chord ring-state logic.
//!
//! Everything here is free of I/O: methods that would require a network
//! call in the Chord paper return a routing decision instead, leaving the
//! actual RPC to `ring_service`.

use serde::{Deserialize, Serialize};

use crate::identifier::{hash_key, in_arc, in_arc_open};

/// Network address of a node. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddr {
    pub host: String,
    pub port: u16,
}

impl NodeAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        NodeAddr { host: host.into(), port }
    }

    pub fn label(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn to_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// A node's identity: its ring id plus its address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: u64,
    #[serde(flatten)]
    pub addr: NodeAddr,
}

impl Identity {
    pub fn new(addr: NodeAddr, m_bits: u32) -> Self {
        let id = hash_key(addr.label(), m_bits);
        Identity { id, addr }
    }
}

/// Routing cache of `m_bits` exponentially spaced probe points.
///
/// Entry `i` (1-based) targets the node responsible for
/// `(node_id + 2^(i-1)) mod 2^m_bits`. Entry 1 is always the successor.
#[derive(Debug, Clone)]
pub struct FingerTable {
    node_id: u64,
    m_bits: u32,
    entries: Vec<Identity>,
}

impl FingerTable {
    pub fn new(self_identity: &Identity, m_bits: u32) -> Self {
        FingerTable {
            node_id: self_identity.id,
            m_bits,
            entries: vec![self_identity.clone(); m_bits as usize],
        }
    }

    /// Set every slot to `node`. Used right after a fresh join to
    /// bootstrap routing before stabilize has a chance to refine things.
    pub fn fill(&mut self, node: Identity) {
        self.entries = vec![node; self.m_bits as usize];
    }

    /// Write slot `index` (1-based).
    pub fn set(&mut self, index: u32, node: Identity) {
        self.entries[(index - 1) as usize] = node;
    }

    /// Read slot `index` (1-based).
    pub fn get(&self, index: u32) -> &Identity {
        &self.entries[(index - 1) as usize]
    }

    /// Slot 1 is always the current successor.
    pub fn successor(&self) -> &Identity {
        &self.entries[0]
    }

    /// Scan slots from `m_bits` down to `1` and return the first entry
    /// strictly between `self` and `key` on the ring. Falls back to the
    /// successor if nothing qualifies.
    pub fn closest_preceding(&self, key: u64) -> Identity {
        for entry in self.entries.iter().rev() {
            if in_arc_open(self.node_id, key, entry.id) {
                return entry.clone();
            }
        }
        self.successor().clone()
    }

    /// `(index, target_key)` pairs to resolve and install, one per slot.
    pub fn refresh_targets(&self) -> Vec<(u32, u64)> {
        let modulus = if self.m_bits >= 64 { u64::MAX } else { 1u64 << self.m_bits };
        (1..=self.m_bits)
            .map(|i| {
                let offset = 1u64 << (i - 1);
                let target = if self.m_bits >= 64 {
                    self.node_id.wrapping_add(offset)
                } else {
                    (self.node_id.wrapping_add(offset)) % modulus
                };
                (i, target)
            })
            .collect()
    }

    pub fn ids(&self) -> Vec<u64> {
        self.entries.iter().map(|e| e.id).collect()
    }
}

/// Pure Chord node state: identity, predecessor, and finger table.
///
/// No network or storage I/O lives here; `RingService` drives this type
/// and performs the RPCs its methods call for.
#[derive(Debug, Clone)]
pub struct ChordNode {
    pub identity: Identity,
    pub predecessor: Option<Identity>,
    pub finger_table: FingerTable,
}

impl ChordNode {
    pub fn new(addr: NodeAddr, m_bits: u32) -> Self {
        let identity = Identity::new(addr, m_bits);
        let finger_table = FingerTable::new(&identity, m_bits);
        ChordNode { identity, predecessor: None, finger_table }
    }

    pub fn id(&self) -> u64 {
        self.identity.id
    }

    pub fn successor(&self) -> &Identity {
        self.finger_table.successor()
    }

    pub fn is_alone(&self) -> bool {
        self.successor().id == self.identity.id
    }

    /// A key `k` is owned by this node iff `k ∈ (predecessor.id, self.id]`.
    ///
    /// If `predecessor` is unset: own everything when alone, otherwise
    /// own nothing (defer to lookup/forwarding until stabilize repairs
    /// `predecessor`).
    pub fn is_responsible_for(&self, key: u64) -> bool {
        match &self.predecessor {
            Some(pred) => in_arc(pred.id, self.identity.id, key),
            None => self.is_alone(),
        }
    }

    pub fn closest_preceding_node(&self, key: u64) -> Identity {
        self.finger_table.closest_preceding(key)
    }

    /// If `key ∈ (self, successor]`, answer locally; otherwise `None`
    /// means the caller must forward.
    pub fn find_successor_local(&self, key: u64) -> Option<Identity> {
        if in_arc(self.identity.id, self.successor().id, key) {
            Some(self.successor().clone())
        } else {
            None
        }
    }

    /// Called after learning the successor's predecessor during
    /// stabilize: should we adopt it as our new successor?
    pub fn should_update_successor(&self, successors_predecessor: Option<&Identity>) -> bool {
        let Some(candidate) = successors_predecessor else {
            return false;
        };
        if self.is_alone() {
            return candidate.id != self.identity.id;
        }
        in_arc_open(self.identity.id, self.successor().id, candidate.id)
    }

    /// A candidate claims to be our predecessor. Accept iff we have none
    /// or the candidate is strictly closer than our current one.
    pub fn notify(&mut self, candidate: Identity) -> bool {
        match &self.predecessor {
            None => {
                self.predecessor = Some(candidate);
                true
            }
            Some(pred) => {
                if in_arc_open(pred.id, self.identity.id, candidate.id) {
                    self.predecessor = Some(candidate);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn set_successor(&mut self, successor: Identity) {
        self.finger_table.set(1, successor);
    }

    pub fn clear_predecessor(&mut self) {
        self.predecessor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_at(n: u64) -> Identity {
        Identity { id: n, addr: NodeAddr::new("h", n as u16) }
    }

    #[test]
    fn fresh_finger_table_is_all_self() {
        let node = ChordNode::new(NodeAddr::new("localhost", 5000), 10);
        for i in 1..=10 {
            assert_eq!(node.finger_table.get(i).id, node.id());
        }
    }

    #[test]
    fn refresh_targets_covers_all_slots() {
        let node = ChordNode::new(NodeAddr::new("localhost", 5000), 10);
        let targets = node.finger_table.refresh_targets();
        assert_eq!(targets.len(), 10);
        for (i, k) in targets {
            let expected = (node.id().wrapping_add(1u64 << (i - 1))) % 1024;
            assert_eq!(k, expected);
        }
    }

    #[test]
    fn closest_preceding_never_overshoots() {
        let mut node = ChordNode::new(NodeAddr::new("localhost", 5000), 10);
        node.identity.id = 100;
        node.finger_table = FingerTable::new(&node.identity, 10);
        node.finger_table.set(1, id_at(900)); // successor
        node.finger_table.set(2, id_at(150));
        node.finger_table.set(3, id_at(700));

        let result = node.closest_preceding_node(800);
        assert_eq!(result.id, 700);

        // no finger strictly precedes 120, so fall back to the successor
        let result = node.closest_preceding_node(120);
        assert_eq!(result.id, node.finger_table.successor().id);
    }

    #[test]
    fn solo_node_owns_all_keys() {
        let node = ChordNode::new(NodeAddr::new("localhost", 5000), 10);
        assert!(node.is_alone());
        assert!(node.predecessor.is_none());
        for k in [0, 1, 500, 1023] {
            assert!(node.is_responsible_for(k));
        }
    }

    #[test]
    fn notify_rejects_farther_and_accepts_closer_candidate() {
        let mut node = ChordNode::new(NodeAddr::new("localhost", 5000), 10);
        node.identity.id = 100;
        node.predecessor = Some(id_at(50));

        assert!(!node.notify(id_at(40)));
        assert_eq!(node.predecessor.as_ref().unwrap().id, 50);

        assert!(node.notify(id_at(75)));
        assert_eq!(node.predecessor.as_ref().unwrap().id, 75);
    }

    #[test]
    fn wraparound_ownership() {
        let mut node = ChordNode::new(NodeAddr::new("localhost", 5000), 10);
        node.identity.id = 50;
        node.predecessor = Some(id_at(900));

        for k in [950, 0, 50] {
            assert!(node.is_responsible_for(k));
        }
        assert!(!node.is_responsible_for(500));
    }
}
