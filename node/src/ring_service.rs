//! The ring service: owns ring state, serves the inbound protocol
//! handlers, drives the stabilize background loop, and resolves
//! outbound lookups.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::FIND_SUCCESSOR_HOP_LIMIT;
use crate::error::{ChordError, ChordResult};
use crate::node::{ChordNode, Identity, NodeAddr};
use crate::transport::Transport;

/// Diagnostic snapshot returned by the `/chord/info` endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RingSnapshot {
    pub identity: Identity,
    pub successor: Identity,
    pub predecessor: Option<Identity>,
    pub finger_ids: Vec<u64>,
}

pub struct RingService {
    node: RwLock<ChordNode>,
    transport: Arc<dyn Transport>,
    m_bits: u32,
    stabilize_interval: Duration,
    join_retry_interval: Duration,
    stabilize_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl RingService {
    pub fn new(
        addr: NodeAddr,
        m_bits: u32,
        transport: Arc<dyn Transport>,
        stabilize_interval: Duration,
        join_retry_interval: Duration,
    ) -> Self {
        RingService {
            node: RwLock::new(ChordNode::new(addr, m_bits)),
            transport,
            m_bits,
            stabilize_interval,
            join_retry_interval,
            stabilize_task: std::sync::Mutex::new(None),
        }
    }

    pub async fn identity(&self) -> Identity {
        self.node.read().await.identity.clone()
    }

    pub async fn info(&self) -> RingSnapshot {
        let node = self.node.read().await;
        RingSnapshot {
            identity: node.identity.clone(),
            successor: node.successor().clone(),
            predecessor: node.predecessor.clone(),
            finger_ids: node.finger_table.ids(),
        }
    }

    pub async fn is_responsible_for(&self, key: u64) -> bool {
        self.node.read().await.is_responsible_for(key)
    }

    pub async fn get_predecessor(&self) -> Option<Identity> {
        self.node.read().await.predecessor.clone()
    }

    /// Entry point for a node joining through us.
    ///
    /// Routes via the finger table rather than blindly through the
    /// successor: this guarantees `O(log N)` join hops instead of `O(N)`.
    pub async fn handle_join(&self, joining: Identity, hops: u32) -> ChordResult<Identity> {
        let (alone, belongs_here, forward_target) = {
            let node = self.node.read().await;
            if node.is_alone() {
                (true, false, None)
            } else if node.find_successor_local(joining.id).is_some() {
                (false, true, None)
            } else {
                (false, false, Some(node.closest_preceding_node(joining.id)))
            }
        };

        if alone {
            let mut node = self.node.write().await;
            let me = node.identity.clone();
            node.set_successor(joining);
            return Ok(me);
        }

        if belongs_here {
            let mut node = self.node.write().await;
            let old_successor = node.successor().clone();
            node.set_successor(joining);
            return Ok(old_successor);
        }

        let Some(next) = forward_target else {
            error!("join: routing decision produced neither a local answer nor a forward target");
            return Err(ChordError::Internal("join routing decision missing a forward target".into()));
        };
        let me = self.node.read().await.identity.clone();
        if next.id == me.id || hops >= FIND_SUCCESSOR_HOP_LIMIT {
            // nothing closer known, or the chain is too long: answer with
            // our own successor so the join makes progress anyway
            return Ok(self.node.read().await.successor().clone());
        }
        self.transport.join(&next.addr, &joining, hops + 1).await
    }

    /// Inbound `find_successor`: answers locally if the key falls in our
    /// arc, otherwise forwards to the closest node we know of.
    pub async fn handle_find_successor(
        &self,
        key: u64,
        requester: &NodeAddr,
        hops: u32,
    ) -> ChordResult<Identity> {
        let (local, next) = {
            let node = self.node.read().await;
            match node.find_successor_local(key) {
                Some(successor) => (Some(successor), None),
                None => (None, Some(node.closest_preceding_node(key))),
            }
        };
        if let Some(successor) = local {
            return Ok(successor);
        }
        let Some(next) = next else {
            error!("find_successor: routing decision produced neither a local answer nor a forward target");
            return Err(ChordError::Internal("find_successor routing decision missing a forward target".into()));
        };
        let me = self.identity().await;
        if next.id == me.id || hops >= FIND_SUCCESSOR_HOP_LIMIT {
            return Ok(self.node.read().await.successor().clone());
        }
        match self.transport.find_successor(&next.addr, key, requester, hops + 1).await {
            Ok(answer) => Ok(answer),
            Err(e) => {
                warn!(target = %next.addr.label(), error = %e, "find_successor hop failed, returning our successor");
                Ok(self.node.read().await.successor().clone())
            }
        }
    }

    /// Inbound `notify`: a candidate claims to be our predecessor. Returns
    /// whether the predecessor actually changed.
    pub async fn handle_notify(&self, candidate: Identity) -> bool {
        self.node.write().await.notify(candidate)
    }

    /// Inbound `leave`. `departing` is leaving the ring; if we held it as
    /// our predecessor we adopt its predecessor instead, and if we held
    /// it as our successor we adopt its successor instead. No data
    /// migrates; the next stabilize/lookup cycle repairs routing.
    pub async fn handle_leave(
        &self,
        departing: &Identity,
        departing_predecessor: Option<Identity>,
        departing_successor: Identity,
    ) {
        let mut node = self.node.write().await;
        if node.predecessor.as_ref().map(|p| p.id) == Some(departing.id) {
            node.predecessor = departing_predecessor;
        }
        if node.successor().id == departing.id {
            node.set_successor(departing_successor);
        }
    }

    /// Resolves the owner of `key`, hopping through the ring via
    /// `find_successor` calls until an answer stabilizes or the hop
    /// budget runs out.
    pub async fn lookup(&self, key: u64) -> ChordResult<Identity> {
        let (local, next, me, successor) = {
            let node = self.node.read().await;
            match node.find_successor_local(key) {
                Some(successor) => (Some(successor), None, node.identity.clone(), None),
                None => {
                    let next = node.closest_preceding_node(key);
                    (None, Some(next), node.identity.clone(), Some(node.successor().clone()))
                }
            }
        };
        if let Some(successor) = local {
            return Ok(successor);
        }
        let Some(mut current) = next else {
            error!("lookup: routing decision produced neither a local answer nor a forward target");
            return Err(ChordError::Internal("lookup routing decision missing a forward target".into()));
        };
        let Some(fallback) = successor else {
            error!("lookup: forward target set without a fallback successor");
            return Err(ChordError::Internal("lookup forward target missing a fallback successor".into()));
        };
        if current.id == me.id {
            return Ok(fallback);
        }

        for _ in 0..FIND_SUCCESSOR_HOP_LIMIT.max(self.m_bits) {
            match self.transport.find_successor(&current.addr, key, &me.addr, 0).await {
                Ok(answer) => {
                    if answer.id == current.id {
                        return Ok(answer);
                    }
                    current = answer;
                }
                Err(e) => {
                    warn!(target = %current.addr.label(), error = %e, "lookup hop failed, falling back to successor");
                    return Ok(fallback);
                }
            }
        }
        Ok(current)
    }

    /// Outbound join protocol. Retries against the bootstrap node with a
    /// fixed backoff until it succeeds.
    pub async fn join_ring(&self, bootstrap: NodeAddr) {
        let me = self.identity().await;
        loop {
            info!(bootstrap = %bootstrap.label(), "attempting to join ring");
            match self.transport.join(&bootstrap, &me, 0).await {
                Ok(successor) => {
                    {
                        let mut node = self.node.write().await;
                        node.set_successor(successor.clone());
                        node.finger_table.fill(successor.clone());
                    }
                    info!(successor = successor.id, "joined ring");
                    if let Err(e) = self.transport.notify(&successor.addr, &me).await {
                        warn!(error = %e, "notify after join failed, stabilize will retry");
                    }
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "join attempt failed, retrying");
                    tokio::time::sleep(self.join_retry_interval).await;
                }
            }
        }
    }

    /// Starts the periodic stabilize loop as a background task.
    pub fn spawn_stabilize_loop(self: &Arc<Self>) {
        let service = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(service.stabilize_interval).await;
                if let Err(e) = service.stabilize().await {
                    debug!(error = %e, "stabilize iteration failed");
                }
            }
        });
        *self.stabilize_task.lock().expect("stabilize task lock poisoned") = Some(handle);
    }

    /// Cancels the stabilize task. Safe to call more than once.
    pub fn stop(&self) {
        if let Some(handle) = self.stabilize_task.lock().expect("stabilize task lock poisoned").take() {
            handle.abort();
        }
    }

    /// One stabilize iteration: checks predecessor liveness, asks the
    /// successor for its own predecessor and adopts it if closer,
    /// re-notifies the successor, and refreshes the finger table.
    async fn stabilize(&self) -> ChordResult<()> {
        let (alone, me, successor) = {
            let node = self.node.read().await;
            (node.is_alone(), node.identity.clone(), node.successor().clone())
        };
        if alone {
            return Ok(());
        }

        self.check_predecessor_liveness().await;

        if let Ok(maybe_x) = self.transport.get_predecessor(&successor.addr).await {
            let should_update = self.node.read().await.should_update_successor(maybe_x.as_ref());
            if should_update {
                let x = maybe_x.expect("should_update_successor implies Some");
                debug!(new_successor = x.id, "stabilize: adopting closer successor");
                self.node.write().await.set_successor(x);
            }
        }

        let successor = self.node.read().await.successor().clone();
        if let Err(e) = self.transport.notify(&successor.addr, &me).await {
            debug!(error = %e, "stabilize: notify failed");
        }

        self.refresh_fingers().await;
        Ok(())
    }

    /// Pings our predecessor and clears it if unreachable, so a dead
    /// predecessor doesn't block `notify` from installing a live one.
    async fn check_predecessor_liveness(&self) {
        let predecessor = self.node.read().await.predecessor.clone();
        let Some(pred) = predecessor else {
            return;
        };
        match self.transport.ping(&pred.addr).await {
            Ok(true) => {}
            Ok(false) | Err(_) => {
                debug!(predecessor = pred.id, "predecessor unreachable, clearing");
                self.node.write().await.clear_predecessor();
            }
        }
    }

    async fn refresh_fingers(&self) {
        let targets = self.node.read().await.finger_table.refresh_targets();
        for (index, target_key) in targets {
            match self.lookup(target_key).await {
                Ok(resolved) => self.node.write().await.finger_table.set(index, resolved),
                Err(e) => debug!(index, target_key, error = %e, "finger refresh lookup failed, leaving slot stale"),
            }
        }
    }

    /// Outbound graceful leave: tells our successor and predecessor we're
    /// departing so they can splice us out of the ring.
    pub async fn leave_ring(&self) {
        let (alone, me, successor, predecessor) = {
            let node = self.node.read().await;
            (node.is_alone(), node.identity.clone(), node.successor().clone(), node.predecessor.clone())
        };
        if alone {
            return;
        }
        if let Err(e) = self.transport.leave(&successor.addr, &me, predecessor.clone(), successor.clone()).await {
            warn!(error = %e, "leave notification to successor failed");
        }
        if let Some(pred) = predecessor.clone()
            && let Err(e) = self.transport.leave(&pred.addr, &me, predecessor, successor).await
        {
            warn!(error = %e, "leave notification to predecessor failed");
        }
    }
}
