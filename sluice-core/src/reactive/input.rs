//! Input Nodes
//!
//! An [`Input`] is the mutable root of the graph. Setting it starts a
//! transaction rooted at the input; dependents recompute when the
//! transaction commits.
//!
//! # Batching
//!
//! Every mutator has an `_in` variant taking a [`TokenSource`]. Mutations
//! under the same source are applied immediately to the inputs themselves,
//! but nothing downstream recomputes until the source is committed or
//! dropped, and then each affected node recomputes once.
//!
//! ```rust
//! use sluice_core::Graph;
//!
//! let graph = Graph::new();
//! let width = graph.input_with(2);
//! let height = graph.input_with(3);
//! let area = graph.zip(&width, &height, |w, h| w * h);
//!
//! let tx = graph.transaction();
//! width.set_value_in(&tx, 4);
//! height.set_value_in(&tx, 5);
//! assert_eq!(area.value(), Ok(6));
//! tx.commit();
//! assert_eq!(area.value(), Ok(20));
//! ```

use std::fmt;
use std::ops::Deref;

use super::content::{Comparer, Content};
use super::node::Node;
use super::runtime::Graph;
use super::token::TokenSource;
use crate::error::NodeError;
use crate::graph::Role;

impl Graph {
    /// Create an input holding `Empty`.
    pub fn input<T: Clone + 'static>(&self) -> Input<T> {
        self.new_input(Content::Empty, None)
    }

    /// Create an input holding `value`.
    pub fn input_with<T: Clone + 'static>(&self, value: T) -> Input<T> {
        self.new_input(Content::Value(value), None)
    }

    /// Create an input whose mutations are dropped when `comparer` reports
    /// them as the same as the current content.
    pub fn input_with_comparer<T: Clone + 'static>(&self, initial: Content<T>, comparer: Comparer<T>) -> Input<T> {
        self.new_input(initial, Some(comparer))
    }

    /// Create a node that holds `value` forever.
    pub fn constant<T: Clone + 'static>(&self, value: T) -> Node<T> {
        self.check_mutable();
        let id = self.add_node(Role::Constant, Content::Value(value), 0, None);
        Node::new(self, id)
    }

    fn new_input<T: Clone + 'static>(&self, initial: Content<T>, comparer: Option<Comparer<T>>) -> Input<T> {
        self.check_mutable();
        let id = self.add_node(Role::Input, initial, 0, None);
        Input {
            node: Node::new(self, id),
            comparer,
        }
    }
}

/// A mutable root node.
pub struct Input<T> {
    node: Node<T>,
    comparer: Option<Comparer<T>>,
}

impl<T: Clone + 'static> Input<T> {
    /// A plain handle to the node, for use as a source.
    pub fn node(&self) -> Node<T> {
        self.node.clone()
    }

    /// Store a value. Returns whether the content changed.
    pub fn set_value(&self, value: T) -> bool {
        self.apply(None, Content::Value(value))
    }

    pub fn set_value_in(&self, tx: &TokenSource, value: T) -> bool {
        self.apply(Some(tx), Content::Value(value))
    }

    /// Store an error.
    pub fn set_error(&self, error: impl Into<NodeError>) -> bool {
        self.apply(None, Content::Error(error.into()))
    }

    pub fn set_error_in(&self, tx: &TokenSource, error: impl Into<NodeError>) -> bool {
        self.apply(Some(tx), Content::Error(error.into()))
    }

    /// Return to `Empty`.
    pub fn reset(&self) -> bool {
        self.apply(None, Content::Empty)
    }

    pub fn reset_in(&self, tx: &TokenSource) -> bool {
        self.apply(Some(tx), Content::Empty)
    }

    /// Replace the current value with `f(value)`. Does nothing unless the
    /// input holds a value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        match self.node.try_value() {
            Some(current) => self.set_value(f(&current)),
            None => false,
        }
    }

    fn apply(&self, tx: Option<&TokenSource>, next: Content<T>) -> bool {
        let id = self.node.id();
        let comparer = self.comparer.as_ref();
        self.node
            .graph()
            .mutate_root(id, tx, |graph| graph.replace_content(id, next, comparer))
    }
}

impl<T> Deref for Input<T> {
    type Target = Node<T>;

    fn deref(&self) -> &Node<T> {
        &self.node
    }
}

impl<T> Clone for Input<T> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            comparer: self.comparer.clone(),
        }
    }
}

impl<T> fmt::Debug for Input<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Input({})", self.node.id())
    }
}
