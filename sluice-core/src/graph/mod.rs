//! Dependency Graph
//!
//! This module implements the arena behind every [`Graph`](crate::Graph) and
//! the protocol that keeps propagation glitch-free.
//!
//! # Overview
//!
//! Nodes subscribe to the nodes they read. A subscription is a directed edge
//! from source to subscriber, attached to one numbered incoming edge of the
//! subscriber:
//!
//! - every node has a root edge (edge 0), used when it starts a transaction
//!   itself;
//! - computed nodes read their sources on edges `1..=n`;
//! - sockets read their target on edge 1;
//! - switches read their selector on edge 1 and their target on edge 3, with
//!   edge 2 reserved for a previous target that still owes a Leave.
//!
//! Per transaction each node runs the two-phase visit protocol from
//! [`visit`](VisitState), and per edge the fan-in bookkeeping of [`Join`].
//!
//! # Design Decisions
//!
//! 1. Nodes live in one arena indexed by [`NodeId`] rather than pointing at
//!    each other, so subscriptions are plain indices and there are no
//!    reference cycles between nodes.
//!
//! 2. Both directions are stored: the downstream list drives propagation and
//!    the upstream list is what a node reads through.
//!
//! 3. The arena never runs user code. Recomputation happens in the driver
//!    with the arena borrow released.

mod join;
mod node;
mod scheduler;
mod visit;

pub use join::{EdgeState, Join, Visited};
pub use node::{NodeId, NodeKind};
pub use visit::{TraceRecord, VisitEvent, VisitState};

pub(crate) use node::{
    Listener, ObserverFn, Recompute, Role, Select, Slot, ROOT_EDGE, SOCKET_TARGET_EDGE, SWITCH_SELECTOR_EDGE,
    SWITCH_TARGET_EDGE,
};
pub(crate) use scheduler::{Listeners, Resolution, UpdateScheduler};
