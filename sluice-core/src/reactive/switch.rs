//! Switch Nodes
//!
//! A switch mirrors the content of whichever node its selector currently
//! points at. The selector is itself a node holding `Option<Node<T>>`; when
//! it changes, the switch moves its subscription to the new target inside
//! the same transaction, so dependents never see a mix of old and new.
//!
//! | selector content | switch content                 |
//! |------------------|--------------------------------|
//! | `Some(node)`     | the content of `node`          |
//! | `None`           | `Error(Disconnected)`          |
//! | `Error(e)`       | `Error(e)`                     |
//! | `Empty`          | `Empty`                        |
//!
//! A selection that would make the switch depend on itself is not
//! subscribed; the switch holds `Error(Looped)` until the selector moves on.

use std::marker::PhantomData;
use std::rc::Rc;

use super::computed::SourceState;
use super::content::{Comparer, Content};
use super::node::Node;
use super::runtime::Graph;
use crate::error::{EvalResult, NodeError};
use crate::graph::{Listener, NodeId, Recompute, Role, Select, Visited, SWITCH_SELECTOR_EDGE};

/// The selector type of a switch over `T`.
pub type Selection<T> = Option<Node<T>>;

struct SwitchBehavior<T> {
    selector: NodeId,
    comparer: Option<Comparer<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Clone + 'static> Select for SwitchBehavior<T> {
    fn select(&self, graph: &Graph) -> Result<Option<NodeId>, NodeError> {
        match graph.content::<Selection<T>>(self.selector) {
            Content::Value(Some(node)) => {
                graph.check_owned(&node);
                Ok(Some(node.id()))
            }
            Content::Value(None) => Ok(None),
            Content::Error(error) => Err(error),
            Content::Empty => Err(NodeError::Empty),
        }
    }
}

impl<T: Clone + 'static> Recompute for SwitchBehavior<T> {
    fn recompute(&self, graph: &Graph, node: NodeId, _visits: &[Visited]) -> bool {
        let next = match self.select(graph) {
            Err(NodeError::Empty) => Content::Empty,
            Err(error) => Content::Error(error),
            Ok(None) => Content::Error(NodeError::Disconnected),
            Ok(Some(_)) if graph.is_looped(node) => Content::Error(NodeError::Looped),
            Ok(Some(_)) => match graph.switch_target(node) {
                Some(target) => graph.content::<T>(target),
                None => Content::Error(NodeError::Disconnected),
            },
        };
        graph.replace_content(node, next, self.comparer.as_ref())
    }
}

impl Graph {
    /// Create a switch following `selector`.
    pub fn switch<T: Clone + 'static>(&self, selector: &Node<Selection<T>>) -> Node<T> {
        self.switch_node(selector, None)
    }

    /// Like [`switch`](Self::switch), dropping updates that `comparer`
    /// reports as unchanged.
    pub fn switch_with_comparer<T: Clone + 'static>(
        &self,
        selector: &Node<Selection<T>>,
        comparer: Comparer<T>,
    ) -> Node<T> {
        self.switch_node(selector, Some(comparer))
    }

    /// A switch whose selection is computed from the values of `sources`.
    pub fn switch_from_values<S, T, F>(&self, sources: &[Node<S>], select: F) -> Node<T>
    where
        S: Clone + 'static,
        T: Clone + 'static,
        F: Fn(&[S]) -> EvalResult<Selection<T>> + 'static,
    {
        let selector = self.computed_from_values_with(sources, Comparer::equality(), select);
        self.switch(&selector)
    }

    /// A switch whose selection is computed from the states of `sources`.
    pub fn switch_from_states<S, T, F>(&self, sources: &[Node<S>], select: F) -> Node<T>
    where
        S: Clone + 'static,
        T: Clone + 'static,
        F: Fn(&[SourceState<S>]) -> EvalResult<Selection<T>> + 'static,
    {
        let selector = self.computed_from_states_with(sources, Comparer::equality(), select);
        self.switch(&selector)
    }

    fn switch_node<T: Clone + 'static>(&self, selector: &Node<Selection<T>>, comparer: Option<Comparer<T>>) -> Node<T> {
        self.check_mutable();
        self.check_owned(selector);
        let behavior = Rc::new(SwitchBehavior::<T> {
            selector: selector.id(),
            comparer,
            _marker: PhantomData,
        });
        let id = self.add_node(
            Role::switch(behavior.clone()),
            Content::<T>::Empty,
            3,
            Some(behavior.clone()),
        );
        self.attach(
            selector.id(),
            Listener {
                node: id,
                edge: SWITCH_SELECTOR_EDGE,
            },
        );
        self.reselect(id);
        behavior.recompute(self, id, &[]);
        Node::new(self, id)
    }
}
