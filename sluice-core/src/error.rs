//! Error Types
//!
//! The engine distinguishes three kinds of failure:
//!
//! - [`NodeError`]: content errors. These are ordinary values that flow
//!   through the graph like any other content and only surface as `Err` when
//!   a caller asks for "value or error".
//! - [`BindError`]: a socket bind that was refused. Nothing is applied.
//! - [`ProtocolFault`]: a violation of the propagation protocol (out of
//!   sequence Enter/Leave, a second token entering an occupied node, ...).
//!   Faults are fatal: they are logged and raised as a panic.

use std::rc::Rc;

use thiserror::Error;

use crate::graph::{EdgeState, NodeId};
use crate::reactive::Token;

/// Boxed error returned by user computations.
pub type BoxError = Box<dyn std::error::Error>;

/// Result type of user computations.
///
/// Returning a [`NodeError`] (boxed) stores it verbatim; any other error is
/// wrapped as [`NodeError::Evaluation`].
pub type EvalResult<T> = Result<T, BoxError>;

/// An error carried as node content.
#[derive(Debug, Clone, Error)]
pub enum NodeError {
    /// The node has never produced a value.
    #[error("no value has been produced")]
    Empty,

    /// An error set explicitly on an input.
    #[error("{0}")]
    Message(Rc<str>),

    /// A user computation failed.
    #[error("evaluation failed: {0}")]
    Evaluation(Rc<dyn std::error::Error>),

    /// One or more sources of a computation hold errors.
    #[error("{} upstream error(s)", .0.len())]
    Aggregate(Rc<[NodeError]>),

    /// An unbound socket, or a switch with nothing selected.
    #[error("not connected to a source")]
    Disconnected,

    /// A switch selection that would have created a cycle.
    #[error("selection would create a cycle")]
    Looped,
}

impl NodeError {
    /// Create a message error.
    pub fn message(message: impl AsRef<str>) -> Self {
        Self::Message(Rc::from(message.as_ref()))
    }

    /// Convert an error returned by a user computation.
    pub fn from_eval(error: BoxError) -> Self {
        match error.downcast::<NodeError>() {
            Ok(node_error) => *node_error,
            Err(other) => Self::Evaluation(Rc::from(other)),
        }
    }

    /// The wrapped source errors of an aggregate, empty otherwise.
    pub fn inner_errors(&self) -> &[NodeError] {
        match self {
            Self::Aggregate(errors) => errors,
            _ => &[],
        }
    }

    pub fn is_empty_sentinel(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl PartialEq for NodeError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Empty, Self::Empty)
            | (Self::Disconnected, Self::Disconnected)
            | (Self::Looped, Self::Looped) => true,
            (Self::Message(a), Self::Message(b)) => a == b,
            (Self::Evaluation(a), Self::Evaluation(b)) => Rc::ptr_eq(a, b),
            (Self::Aggregate(a), Self::Aggregate(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for NodeError {
    fn from(message: &str) -> Self {
        Self::message(message)
    }
}

impl From<String> for NodeError {
    fn from(message: String) -> Self {
        Self::message(message)
    }
}

/// A refused socket bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("socket {socket} cannot be bound to itself")]
    SelfBinding { socket: NodeId },

    #[error("socket {socket} is already bound to {target}")]
    AlreadyBound { socket: NodeId, target: NodeId },

    #[error("binding socket {socket} to {target} would create a cycle")]
    Cycle { socket: NodeId, target: NodeId },

    #[error("node {target} belongs to a different graph")]
    ForeignNode { target: NodeId },
}

/// A violation of the propagation protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolFault {
    #[error("the default token cannot drive a transaction")]
    DefaultToken,

    #[error("transaction {0} has already been disposed")]
    TransactionDisposed(Token),

    #[error("leave hook registered on disposed token source {0}")]
    HookAfterDispose(Token),

    #[error("node {node} is occupied by {held}, cannot enter for {offered}")]
    Occupied {
        node: NodeId,
        held: Token,
        offered: Token,
    },

    #[error("node {node} cannot enter an update while a loop search is open")]
    EnterDuringLoopSearch { node: NodeId },

    #[error("edge {edge} of node {node} entered out of sequence ({state:?})")]
    EnterOutOfSequence {
        node: NodeId,
        edge: usize,
        state: EdgeState,
    },

    #[error("edge {edge} of node {node} left out of sequence ({state:?})")]
    LeaveOutOfSequence {
        node: NodeId,
        edge: usize,
        state: EdgeState,
    },

    #[error("node {node} held by {held:?} cannot leave for {offered}")]
    TokenMismatch {
        node: NodeId,
        held: Option<Token>,
        offered: Token,
    },

    #[error("node {node} cannot leave an update while a loop search is open")]
    LeaveDuringLoopSearch { node: NodeId },

    #[error("node {node} is already in a loop search")]
    LoopSearchActive { node: NodeId },

    #[error("node {node} has no open loop search for {token}")]
    LoopSearchNotActive { node: NodeId, token: Token },

    #[error("graph mutated while a propagation sweep is running")]
    ReentrantMutation,

    #[error("node {0} outlived its graph")]
    GraphDropped(NodeId),

    #[error("node {0} belongs to a different graph")]
    ForeignNode(NodeId),

    #[error("node {0} is not a switch")]
    NotASwitch(NodeId),

    #[error("node arena is full, cannot allocate index {0}")]
    ArenaExhausted(usize),

    #[error("node {0} does not hold content of the requested type")]
    ContentType(NodeId),
}

/// Log a protocol fault and abort the current operation.
#[track_caller]
pub(crate) fn raise(fault: ProtocolFault) -> ! {
    tracing::error!(%fault, "protocol fault");
    panic!("protocol fault: {fault}");
}

pub(crate) trait OrRaise<T> {
    fn or_raise(self) -> T;
}

impl<T> OrRaise<T> for Result<T, ProtocolFault> {
    #[track_caller]
    fn or_raise(self) -> T {
        match self {
            Ok(value) => value,
            Err(fault) => raise(fault),
        }
    }
}

/// An invalid [`GraphConfig`](crate::GraphConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid graph configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("trace_capacity must be greater than zero when record_trace is enabled")]
    ZeroTraceCapacity,
}
