//! Socket Nodes
//!
//! A [`Socket`] is a placeholder that can be read and depended on before the
//! node it stands for exists. It is bound exactly once; from then on it reads
//! as its target (following chains of sockets) and its dependents see the
//! target's changes. An unbound socket reads as
//! [`NodeError::Disconnected`](crate::NodeError::Disconnected).
//!
//! Binding is refused, with nothing applied, when it would bind the socket
//! to itself, rebind it, or close a cycle through the socket's dependents.

use std::fmt;
use std::ops::Deref;

use super::content::Content;
use super::node::Node;
use super::runtime::Graph;
use super::token::TokenSource;
use crate::error::BindError;
use crate::graph::{Listener, NodeId, Resolution, Role, SOCKET_TARGET_EDGE};

impl Graph {
    /// Create an unbound socket.
    pub fn socket<T: Clone + 'static>(&self) -> Socket<T> {
        self.check_mutable();
        let id = self.add_node(Role::socket(None), Content::<T>::Empty, 1, None);
        Socket {
            node: Node::new(self, id),
        }
    }

    fn bind_socket(&self, socket: NodeId, target: NodeId, tx: Option<&TokenSource>) -> Result<(), BindError> {
        self.check_mutable();
        let checked = self.check_bind(socket, target);
        if let Err(error) = checked {
            tracing::warn!(%socket, %target, %error, "socket bind rejected");
            self.flush();
            return Err(error);
        }

        let in_flight = self.attach_socket(socket, target);
        tracing::debug!(%socket, %target, in_flight = in_flight.is_some(), "socket bound");
        match in_flight {
            // The target is mid-transaction: join it, and make sure the
            // socket reports a change when that transaction ends.
            Some(token) => {
                self.force_changed(socket, SOCKET_TARGET_EDGE);
                self.catch_up(
                    target,
                    Listener {
                        node: socket,
                        edge: SOCKET_TARGET_EDGE,
                    },
                    Some(token),
                );
            }
            None => {
                self.mutate_root(socket, tx, |_| true);
            }
        }
        Ok(())
    }
}

/// A bind-once placeholder node.
pub struct Socket<T> {
    node: Node<T>,
}

impl<T: Clone + 'static> Socket<T> {
    /// A plain handle to the node, for use as a source.
    pub fn node(&self) -> Node<T> {
        self.node.clone()
    }

    /// Bind to `target` in a transaction of its own.
    pub fn bind(&self, target: &Node<T>) -> Result<(), BindError> {
        self.bind_with(None, target)
    }

    /// Bind to `target` as part of the batch `tx`.
    ///
    /// If `target` is already part of another transaction, the socket joins
    /// that transaction instead and `tx` is not used.
    pub fn bind_in(&self, tx: &TokenSource, target: &Node<T>) -> Result<(), BindError> {
        self.bind_with(Some(tx), target)
    }

    fn bind_with(&self, tx: Option<&TokenSource>, target: &Node<T>) -> Result<(), BindError> {
        let graph = self.node.graph();
        if !graph.owns(target) {
            return Err(BindError::ForeignNode { target: target.id() });
        }
        graph.bind_socket(self.node.id(), target.id(), tx)
    }

    pub fn is_bound(&self) -> bool {
        self.target().is_some()
    }

    /// The node this socket was bound to.
    pub fn target(&self) -> Option<Node<T>> {
        let graph = self.node.graph();
        graph
            .socket_target(self.node.id())
            .map(|id| Node::new(&graph, id))
    }

    /// The first non-socket node down the chain of bindings.
    pub fn deep_target(&self) -> Option<Node<T>> {
        let graph = self.node.graph();
        match graph.resolve(self.node.id()) {
            Resolution::Node(id) => Some(Node::new(&graph, id)),
            Resolution::Unbound(_) => None,
        }
    }
}

impl<T> Deref for Socket<T> {
    type Target = Node<T>;

    fn deref(&self) -> &Node<T> {
        &self.node
    }
}

impl<T> Clone for Socket<T> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
        }
    }
}

impl<T> fmt::Debug for Socket<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Socket({})", self.node.id())
    }
}
