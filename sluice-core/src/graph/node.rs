//! Graph Nodes
//!
//! This module defines the per-node storage that lives in the scheduler's
//! arena. Typed, user-facing handles live in [`crate::reactive`]; here every
//! node is a [`Slot`] addressed by a stable [`NodeId`] and holding its
//! content type-erased.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use smallvec::SmallVec;

use super::join::{Join, Visited};
use super::visit::{VisitEvent, VisitState};
use crate::error::{raise, NodeError, ProtocolFault};
use crate::reactive::{Graph, ObserverId, Token};

/// Stable identifier of a node within its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn from_index(index: usize) -> Self {
        match u32::try_from(index) {
            Ok(raw) => Self(raw),
            Err(_) => raise(ProtocolFault::ArenaExhausted(index)),
        }
    }

    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeKind {
    /// A mutable root.
    Input,

    /// A fixed leaf. Never enters a transaction.
    Constant,

    /// A pure combination of its sources.
    Computed,

    /// A placeholder bound once to another node.
    Socket,

    /// A node mirroring whichever node its selector currently points at.
    Switch,
}

/// Edge through which a node enters when it is itself the origin of a
/// transaction (an input being set, a socket being bound).
pub(crate) const ROOT_EDGE: usize = 0;

pub(crate) const SOCKET_TARGET_EDGE: usize = 1;

pub(crate) const SWITCH_SELECTOR_EDGE: usize = 1;
pub(crate) const SWITCH_DRAIN_EDGE: usize = 2;
pub(crate) const SWITCH_TARGET_EDGE: usize = 3;

/// One subscription: deliveries go to `edge` of `node`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Listener {
    pub node: NodeId,
    pub edge: usize,
}

/// Recomputes a node's content at the end of a transaction.
pub(crate) trait Recompute {
    /// Returns whether the content changed.
    fn recompute(&self, graph: &Graph, node: NodeId, visits: &[Visited]) -> bool;
}

/// Resolves a switch's selector to the node it points at.
pub(crate) trait Select {
    fn select(&self, graph: &Graph) -> Result<Option<NodeId>, NodeError>;
}

pub(crate) type ObserverFn = Rc<RefCell<dyn FnMut(VisitEvent, Token)>>;

pub(crate) struct SocketWiring {
    /// The node this socket was bound to.
    pub target: Option<NodeId>,
    /// First non-socket node down the chain, once known.
    pub terminal: Cell<Option<NodeId>>,
}

pub(crate) struct SwitchWiring {
    pub selector: Rc<dyn Select>,
    /// What the selector last pointed at.
    pub selected: Option<NodeId>,
    /// The subscribed target. `None` when nothing is selected or the
    /// selection was rejected as a loop.
    pub target: Option<NodeId>,
    /// A previous target whose in-flight Leave is still owed.
    pub draining: Option<NodeId>,
    pub looped: bool,
}

pub(crate) enum Role {
    Input,
    Constant,
    Computed,
    Socket(SocketWiring),
    Switch(SwitchWiring),
}

impl Role {
    pub fn kind(&self) -> NodeKind {
        match self {
            Role::Input => NodeKind::Input,
            Role::Constant => NodeKind::Constant,
            Role::Computed => NodeKind::Computed,
            Role::Socket(_) => NodeKind::Socket,
            Role::Switch(_) => NodeKind::Switch,
        }
    }

    pub fn socket(target: Option<NodeId>) -> Self {
        Role::Socket(SocketWiring {
            target,
            terminal: Cell::new(None),
        })
    }

    pub fn switch(selector: Rc<dyn Select>) -> Self {
        Role::Switch(SwitchWiring {
            selector,
            selected: None,
            target: None,
            draining: None,
            looped: false,
        })
    }
}

/// A node in the arena.
pub(crate) struct Slot {
    pub role: Role,

    pub visit: VisitState,

    /// Incoming edges; edge 0 is the root edge.
    pub join: Join,

    /// Source of each incoming edge.
    pub upstream: SmallVec<[Option<NodeId>; 4]>,

    /// Subscriptions on this node.
    pub downstream: SmallVec<[Listener; 4]>,

    /// The node's `Content<T>`. Sockets keep an unused `Empty`.
    pub content: Box<dyn Any>,

    pub behavior: Option<Rc<dyn Recompute>>,

    pub observers: Vec<(ObserverId, ObserverFn)>,
}

impl Slot {
    pub fn new(
        role: Role,
        content: Box<dyn Any>,
        sources: usize,
        behavior: Option<Rc<dyn Recompute>>,
    ) -> Self {
        Self {
            role,
            visit: VisitState::default(),
            join: Join::with_edges(sources + 1),
            upstream: SmallVec::from_elem(None, sources + 1),
            downstream: SmallVec::new(),
            content,
            behavior,
            observers: Vec::new(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.role.kind()
    }

    /// Add a subscription (a node that reads from this node).
    pub fn add_dependent(&mut self, listener: Listener) {
        self.downstream.push(listener);
    }

    /// Remove a subscription.
    pub fn remove_dependent(&mut self, listener: Listener) {
        self.downstream.retain(|existing| *existing != listener);
    }

    pub fn dependents(&self) -> &[Listener] {
        &self.downstream
    }
}
