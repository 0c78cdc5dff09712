//! Visit Protocol
//!
//! Each node moves through a two-phase state machine per transaction:
//!
//! ```text
//!   Idle --EnterUpdate(t)--> Entered(t) --LeaveUpdate(t)--> Idle
//! ```
//!
//! A LoopSearch bracket is tracked independently. It may open from Idle or
//! from inside an Update, never while another LoopSearch is open, and an
//! Update cannot be left while a LoopSearch is still open. Anything else is
//! a [`ProtocolFault`].

use serde::Serialize;

use super::node::NodeId;
use crate::error::ProtocolFault;
use crate::reactive::Token;

/// An event on a node's visit stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VisitEvent {
    EnterUpdate,
    LeaveChanged,
    LeaveUnchanged,
    EnterLoopSearch,
    LeaveLoopSearch,
}

impl VisitEvent {
    pub fn leave(changed: bool) -> Self {
        if changed {
            Self::LeaveChanged
        } else {
            Self::LeaveUnchanged
        }
    }

    pub fn is_loop_search(&self) -> bool {
        matches!(self, Self::EnterLoopSearch | Self::LeaveLoopSearch)
    }
}

/// One recorded visit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TraceRecord {
    pub node: NodeId,
    pub event: VisitEvent,
    pub token: Token,
}

/// Per-node visit state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisitState {
    update: Option<Token>,
    loop_search: Option<Token>,
}

impl VisitState {
    pub fn is_idle(&self) -> bool {
        self.update.is_none() && self.loop_search.is_none()
    }

    /// The token of the in-flight update, if any.
    pub fn update_token(&self) -> Option<Token> {
        self.update
    }

    pub fn loop_search_token(&self) -> Option<Token> {
        self.loop_search
    }

    pub fn enter_update(&mut self, node: NodeId, token: Token) -> Result<(), ProtocolFault> {
        let token = token.require_live()?;
        if let Some(held) = self.update {
            return Err(ProtocolFault::Occupied {
                node,
                held,
                offered: token,
            });
        }
        if self.loop_search.is_some() {
            return Err(ProtocolFault::EnterDuringLoopSearch { node });
        }
        self.update = Some(token);
        Ok(())
    }

    pub fn leave_update(&mut self, node: NodeId, token: Token) -> Result<(), ProtocolFault> {
        if self.update != Some(token) {
            return Err(ProtocolFault::TokenMismatch {
                node,
                held: self.update,
                offered: token,
            });
        }
        if self.loop_search.is_some() {
            return Err(ProtocolFault::LeaveDuringLoopSearch { node });
        }
        self.update = None;
        Ok(())
    }

    pub fn enter_loop_search(&mut self, node: NodeId, token: Token) -> Result<(), ProtocolFault> {
        let token = token.require_live()?;
        if self.loop_search.is_some() {
            return Err(ProtocolFault::LoopSearchActive { node });
        }
        self.loop_search = Some(token);
        Ok(())
    }

    pub fn leave_loop_search(&mut self, node: NodeId, token: Token) -> Result<(), ProtocolFault> {
        if self.loop_search != Some(token) {
            return Err(ProtocolFault::LoopSearchNotActive { node, token });
        }
        self.loop_search = None;
        Ok(())
    }
}
