//! Fan-in Join
//!
//! A node with several incoming edges must observe a transaction once, not
//! once per edge. The [`Join`] turns per-edge Enter/Leave deliveries into a
//! single Enter/Leave for the node:
//!
//! - the first edge to enter under a token enters the node and latches the
//!   token; later edges only bump the count;
//! - each Leave ORs the edge's changed flag into the aggregate;
//! - when the last entered edge leaves, the node is done: it recomputes if
//!   any edge reported a change and then leaves itself.
//!
//! Edges follow `Idle -> Entered -> LeftChanged | LeftUnchanged -> Idle`,
//! tracked independently so that a diamond reaching the node through two
//! paths is still forwarded exactly once.
//!
//! LoopSearch probes use a separate counter so their bracket opens and
//! closes once per probe regardless of the Update counters.

use smallvec::SmallVec;

use super::node::NodeId;
use crate::error::ProtocolFault;
use crate::reactive::Token;

/// State of one incoming edge within the current transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EdgeState {
    #[default]
    Idle,
    Entered,
    LeftChanged,
    LeftUnchanged,
}

/// How an edge took part in the transaction being recomputed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visited {
    /// The edge has never taken part in an update.
    #[default]
    NotVisited,
    VisitedWithChange,
    VisitedWithoutChange,
}

#[derive(Debug, Clone, Default)]
struct EdgeSlot {
    state: EdgeState,
    /// Set once the edge has completed at least one update.
    seen: bool,
    in_loop_search: bool,
    /// Report the next Leave on this edge as Changed regardless of the source.
    force_changed: bool,
}

/// Aggregates the incoming edges of one node.
#[derive(Debug, Default)]
pub struct Join {
    edges: SmallVec<[EdgeSlot; 4]>,
    entered: usize,
    loop_entered: usize,
    changed: bool,
    token: Token,
    loop_token: Token,
}

impl Join {
    pub fn with_edges(count: usize) -> Self {
        Self {
            edges: (0..count).map(|_| EdgeSlot::default()).collect(),
            ..Self::default()
        }
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge_state(&self, edge: usize) -> EdgeState {
        self.edges[edge].state
    }

    /// Number of edges currently entered.
    pub fn entered(&self) -> usize {
        self.entered
    }

    /// The latched token while any edge is entered.
    pub fn token(&self) -> Option<Token> {
        (self.entered > 0).then_some(self.token)
    }

    /// Enter one edge. Returns `true` if this is the first edge for the
    /// token, in which case the caller enters the node and forwards.
    pub fn enter(&mut self, node: NodeId, edge: usize, token: Token) -> Result<bool, ProtocolFault> {
        let token = token.require_live()?;
        if self.entered > 0 && self.token != token {
            return Err(ProtocolFault::Occupied {
                node,
                held: self.token,
                offered: token,
            });
        }
        let slot = &mut self.edges[edge];
        if slot.state != EdgeState::Idle {
            return Err(ProtocolFault::EnterOutOfSequence {
                node,
                edge,
                state: slot.state,
            });
        }
        slot.state = EdgeState::Entered;
        self.entered += 1;
        if self.entered == 1 {
            self.token = token;
            self.changed = false;
            return Ok(true);
        }
        Ok(false)
    }

    /// Leave one edge. Returns `Some(any_changed)` when the last entered
    /// edge has left.
    pub fn leave(
        &mut self,
        node: NodeId,
        edge: usize,
        token: Token,
        changed: bool,
    ) -> Result<Option<bool>, ProtocolFault> {
        let slot = &mut self.edges[edge];
        if slot.state != EdgeState::Entered {
            return Err(ProtocolFault::LeaveOutOfSequence {
                node,
                edge,
                state: slot.state,
            });
        }
        if self.token != token {
            return Err(ProtocolFault::TokenMismatch {
                node,
                held: Some(self.token),
                offered: token,
            });
        }
        let forced = std::mem::take(&mut slot.force_changed);
        let changed = changed || forced;
        slot.state = if changed {
            EdgeState::LeftChanged
        } else {
            EdgeState::LeftUnchanged
        };
        self.changed |= changed;
        self.entered -= 1;
        Ok((self.entered == 0).then_some(self.changed))
    }

    /// Make the next Leave on `edge` count as a change.
    pub fn force_changed(&mut self, edge: usize) {
        self.edges[edge].force_changed = true;
    }

    /// Per-edge participation in the transaction being completed.
    pub fn visits(&self) -> SmallVec<[Visited; 4]> {
        self.edges
            .iter()
            .map(|slot| match slot.state {
                EdgeState::LeftChanged => Visited::VisitedWithChange,
                EdgeState::LeftUnchanged => Visited::VisitedWithoutChange,
                EdgeState::Idle | EdgeState::Entered if slot.seen => Visited::VisitedWithoutChange,
                EdgeState::Idle | EdgeState::Entered => Visited::NotVisited,
            })
            .collect()
    }

    /// Close the transaction: remember which edges took part and return
    /// every edge to `Idle`.
    pub fn settle(&mut self) {
        for slot in &mut self.edges {
            if matches!(slot.state, EdgeState::LeftChanged | EdgeState::LeftUnchanged) {
                slot.seen = true;
            }
            slot.state = EdgeState::Idle;
        }
        self.changed = false;
        self.token = Token::NONE;
    }

    /// Move an edge's in-flight state to another slot, leaving the source
    /// slot `Idle`. Used to drain a subscription that still owes a Leave.
    pub fn move_edge(&mut self, from: usize, to: usize) {
        let moved = std::mem::take(&mut self.edges[from]);
        let target = &mut self.edges[to];
        target.state = moved.state;
        target.force_changed = moved.force_changed;
        self.edges[from].seen = moved.seen;
    }

    /// Forget a settled edge whose source has been unsubscribed.
    pub fn detach_edge(&mut self, edge: usize) {
        let slot = &mut self.edges[edge];
        slot.state = EdgeState::Idle;
        slot.force_changed = false;
        slot.seen = false;
    }

    /// Enter the LoopSearch bracket on one edge. Returns `true` for the
    /// first edge of the probe.
    pub fn enter_loop(&mut self, node: NodeId, edge: usize, token: Token) -> Result<bool, ProtocolFault> {
        let token = token.require_live()?;
        if self.loop_entered > 0 && self.loop_token != token {
            return Err(ProtocolFault::LoopSearchActive { node });
        }
        let slot = &mut self.edges[edge];
        if slot.in_loop_search {
            return Err(ProtocolFault::LoopSearchActive { node });
        }
        slot.in_loop_search = true;
        self.loop_entered += 1;
        if self.loop_entered == 1 {
            self.loop_token = token;
            return Ok(true);
        }
        Ok(false)
    }

    /// Leave the LoopSearch bracket on one edge. Returns `true` for the
    /// last edge of the probe.
    pub fn leave_loop(&mut self, node: NodeId, edge: usize, token: Token) -> Result<bool, ProtocolFault> {
        let slot = &mut self.edges[edge];
        if !slot.in_loop_search || self.loop_token != token {
            return Err(ProtocolFault::LoopSearchNotActive { node, token });
        }
        slot.in_loop_search = false;
        self.loop_entered -= 1;
        if self.loop_entered == 0 {
            self.loop_token = Token::NONE;
            return Ok(true);
        }
        Ok(false)
    }
}
