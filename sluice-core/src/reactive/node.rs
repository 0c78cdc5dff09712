//! Node Handles
//!
//! A [`Node<T>`] is a typed, cheaply clonable handle to one node of a
//! [`Graph`]. It only holds a weak reference to its graph; using a handle
//! after the graph is gone is a protocol fault.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use super::content::Content;
use super::observer::ObserverId;
use super::runtime::Graph;
use super::token::Token;
use crate::error::{raise, NodeError, ProtocolFault};
use crate::graph::{NodeId, NodeKind, ObserverFn, UpdateScheduler, VisitEvent};

/// A typed handle to a node holding `Content<T>`.
pub struct Node<T> {
    id: NodeId,
    graph: Weak<RefCell<UpdateScheduler>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Node<T> {
    pub(crate) fn new(graph: &Graph, id: NodeId) -> Self {
        Self {
            id,
            graph: graph.downgrade(),
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The graph this node belongs to.
    pub fn graph(&self) -> Graph {
        match self.graph.upgrade() {
            Some(inner) => Graph::from_shared(inner),
            None => raise(ProtocolFault::GraphDropped(self.id)),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.graph().kind(self.id)
    }

    pub(crate) fn belongs_to(&self, graph: &Rc<RefCell<UpdateScheduler>>) -> bool {
        std::ptr::eq(self.graph.as_ptr(), Rc::as_ptr(graph))
    }

    /// Attach a callback receiving every visit event of this node.
    ///
    /// If the node is in the middle of an update, the callback immediately
    /// receives the `EnterUpdate` it missed.
    pub fn observe(&self, observer: impl FnMut(VisitEvent, Token) + 'static) -> ObserverId {
        let graph = self.graph();
        let id = ObserverId::next();
        let observer: ObserverFn = Rc::new(RefCell::new(observer));
        graph.add_observer(self.id, id, observer);
        id
    }

    /// Detach an observer. Returns whether it was attached.
    pub fn unobserve(&self, observer: ObserverId) -> bool {
        self.graph().remove_observer(self.id, observer)
    }
}

impl<T: Clone + 'static> Node<T> {
    /// The node's current content.
    pub fn content(&self) -> Content<T> {
        self.graph().content(self.id)
    }

    /// The value, or `fallback` for errors and `Empty`.
    pub fn get_or(&self, fallback: T) -> T {
        self.content().get_or(fallback)
    }

    /// The value, or the stored error. `Empty` yields [`NodeError::Empty`].
    pub fn value(&self) -> Result<T, NodeError> {
        self.content().into_result()
    }

    pub fn match_content<R>(
        &self,
        on_value: impl FnOnce(&T) -> R,
        on_error: impl FnOnce(&NodeError) -> R,
    ) -> R {
        self.content().match_content(on_value, on_error)
    }

    pub fn try_value(&self) -> Option<T> {
        self.content().into_value()
    }

    pub fn try_error(&self) -> Option<NodeError> {
        match self.content() {
            Content::Error(error) => Some(error),
            _ => None,
        }
    }
}

impl<T> Clone for Node<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            graph: Weak::clone(&self.graph),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for Node<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Weak::ptr_eq(&self.graph, &other.graph)
    }
}

impl<T> Eq for Node<T> {}

impl<T> Hash for Node<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.id)
    }
}
