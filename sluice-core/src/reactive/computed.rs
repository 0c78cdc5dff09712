//! Computed Nodes
//!
//! A computed node holds a pure function of its sources and recomputes it
//! once per transaction in which at least one source changed.
//!
//! # Flavors
//!
//! - From values: the function sees plain source values. Before it is
//!   called, source content is triaged: if any source holds an error the
//!   node holds an aggregate of exactly those errors; otherwise, if any
//!   source is `Empty`, the node is `Empty`. The function only runs when
//!   every source holds a value.
//!
//! - From states: the function sees each source's full [`Content`] plus
//!   whether that source took part in the transaction, and is always
//!   called.
//!
//! A function returning `Err` stores the error as the node's content; an
//! error that is already a [`NodeError`] is kept as is.

use std::marker::PhantomData;
use std::rc::Rc;

use smallvec::SmallVec;

use super::content::{Comparer, Content};
use super::node::Node;
use super::runtime::Graph;
use crate::error::{EvalResult, NodeError};
use crate::graph::{Listener, NodeId, Recompute, Role, Visited};

/// A source as seen by a from-states computation.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceState<T> {
    pub content: Content<T>,
    pub visited: Visited,
}

/// Outcome of triaging source contents before a from-values computation.
enum Triage<T> {
    Values(Vec<T>),
    Errors(Vec<NodeError>),
    Empty,
}

fn triage<T>(contents: impl IntoIterator<Item = Content<T>>) -> Triage<T> {
    let mut values = Vec::new();
    let mut errors = Vec::new();
    let mut empty = false;
    for content in contents {
        match content {
            Content::Value(value) => values.push(value),
            Content::Error(error) => errors.push(error),
            Content::Empty => empty = true,
        }
    }
    if !errors.is_empty() {
        Triage::Errors(errors)
    } else if empty {
        Triage::Empty
    } else {
        Triage::Values(values)
    }
}

fn evaluated<U>(result: EvalResult<U>) -> Content<U> {
    match result {
        Ok(value) => Content::Value(value),
        Err(error) => Content::from(Err(NodeError::from_eval(error))),
    }
}

type ValuesFn<T, U> = Box<dyn Fn(&[T]) -> EvalResult<U>>;
type StatesFn<T, U> = Box<dyn Fn(&[SourceState<T>]) -> EvalResult<U>>;

struct FromValues<T, U> {
    sources: SmallVec<[NodeId; 4]>,
    compute: ValuesFn<T, U>,
    comparer: Option<Comparer<U>>,
}

impl<T: Clone + 'static, U: 'static> Recompute for FromValues<T, U> {
    fn recompute(&self, graph: &Graph, node: NodeId, _visits: &[Visited]) -> bool {
        let contents = self.sources.iter().map(|source| graph.content::<T>(*source));
        let next = match triage(contents) {
            Triage::Errors(errors) => Content::Error(NodeError::Aggregate(Rc::from(errors))),
            Triage::Empty => Content::Empty,
            Triage::Values(values) => evaluated((self.compute)(&values)),
        };
        graph.replace_content(node, next, self.comparer.as_ref())
    }
}

struct FromStates<T, U> {
    sources: SmallVec<[NodeId; 4]>,
    compute: StatesFn<T, U>,
    comparer: Option<Comparer<U>>,
}

impl<T: Clone + 'static, U: 'static> Recompute for FromStates<T, U> {
    fn recompute(&self, graph: &Graph, node: NodeId, visits: &[Visited]) -> bool {
        let states: Vec<SourceState<T>> = self
            .sources
            .iter()
            .enumerate()
            .map(|(index, source)| SourceState {
                content: graph.content::<T>(*source),
                visited: visits.get(index + 1).copied().unwrap_or_default(),
            })
            .collect();
        let next = evaluated((self.compute)(&states));
        graph.replace_content(node, next, self.comparer.as_ref())
    }
}

/// Two sources of different types.
struct Zip<A, B, U> {
    left: NodeId,
    right: NodeId,
    compute: Box<dyn Fn(&A, &B) -> U>,
    comparer: Option<Comparer<U>>,
    _marker: PhantomData<fn(&A, &B)>,
}

impl<A: Clone + 'static, B: Clone + 'static, U: 'static> Recompute for Zip<A, B, U> {
    fn recompute(&self, graph: &Graph, node: NodeId, _visits: &[Visited]) -> bool {
        let left = graph.content::<A>(self.left);
        let right = graph.content::<B>(self.right);
        let next = match (left, right) {
            (Content::Value(a), Content::Value(b)) => Content::Value((self.compute)(&a, &b)),
            (left, right) => {
                let errors: Vec<NodeError> = [left.try_error(), right.try_error()]
                    .into_iter()
                    .flatten()
                    .cloned()
                    .collect();
                if errors.is_empty() {
                    Content::Empty
                } else {
                    Content::Error(NodeError::Aggregate(Rc::from(errors)))
                }
            }
        };
        graph.replace_content(node, next, self.comparer.as_ref())
    }
}

impl Graph {
    /// Create a node computed from the values of `sources`.
    pub fn computed_from_values<T, U, F>(&self, sources: &[Node<T>], compute: F) -> Node<U>
    where
        T: Clone + 'static,
        U: Clone + 'static,
        F: Fn(&[T]) -> EvalResult<U> + 'static,
    {
        self.values_node(sources, None, Box::new(compute))
    }

    /// Like [`computed_from_values`](Self::computed_from_values), dropping
    /// results that `comparer` reports as unchanged.
    pub fn computed_from_values_with<T, U, F>(&self, sources: &[Node<T>], comparer: Comparer<U>, compute: F) -> Node<U>
    where
        T: Clone + 'static,
        U: Clone + 'static,
        F: Fn(&[T]) -> EvalResult<U> + 'static,
    {
        self.values_node(sources, Some(comparer), Box::new(compute))
    }

    /// Create a node computed from the full state of `sources`.
    pub fn computed_from_states<T, U, F>(&self, sources: &[Node<T>], compute: F) -> Node<U>
    where
        T: Clone + 'static,
        U: Clone + 'static,
        F: Fn(&[SourceState<T>]) -> EvalResult<U> + 'static,
    {
        self.states_node(sources, None, Box::new(compute))
    }

    pub fn computed_from_states_with<T, U, F>(&self, sources: &[Node<T>], comparer: Comparer<U>, compute: F) -> Node<U>
    where
        T: Clone + 'static,
        U: Clone + 'static,
        F: Fn(&[SourceState<T>]) -> EvalResult<U> + 'static,
    {
        self.states_node(sources, Some(comparer), Box::new(compute))
    }

    /// A node holding `f(value)` of one source.
    pub fn map<T, U>(&self, source: &Node<T>, f: impl Fn(&T) -> U + 'static) -> Node<U>
    where
        T: Clone + 'static,
        U: Clone + 'static,
    {
        self.computed_from_values(std::slice::from_ref(source), move |values| Ok(f(&values[0])))
    }

    /// A node holding `f(left, right)`.
    pub fn zip<A, B, U>(&self, left: &Node<A>, right: &Node<B>, f: impl Fn(&A, &B) -> U + 'static) -> Node<U>
    where
        A: Clone + 'static,
        B: Clone + 'static,
        U: Clone + 'static,
    {
        self.zip_node(left, right, None, Box::new(f))
    }

    /// Like [`zip`](Self::zip), dropping results that `comparer` reports as
    /// unchanged.
    pub fn zip_with<A, B, U>(
        &self,
        left: &Node<A>,
        right: &Node<B>,
        comparer: Comparer<U>,
        f: impl Fn(&A, &B) -> U + 'static,
    ) -> Node<U>
    where
        A: Clone + 'static,
        B: Clone + 'static,
        U: Clone + 'static,
    {
        self.zip_node(left, right, Some(comparer), Box::new(f))
    }

    fn zip_node<A, B, U>(
        &self,
        left: &Node<A>,
        right: &Node<B>,
        comparer: Option<Comparer<U>>,
        compute: Box<dyn Fn(&A, &B) -> U>,
    ) -> Node<U>
    where
        A: Clone + 'static,
        B: Clone + 'static,
        U: Clone + 'static,
    {
        self.check_owned(left);
        self.check_owned(right);
        let behavior = Rc::new(Zip {
            left: left.id(),
            right: right.id(),
            compute,
            comparer,
            _marker: PhantomData,
        });
        self.computed_node::<U>(&[left.id(), right.id()], behavior)
    }

    fn values_node<T, U>(&self, sources: &[Node<T>], comparer: Option<Comparer<U>>, compute: ValuesFn<T, U>) -> Node<U>
    where
        T: Clone + 'static,
        U: Clone + 'static,
    {
        let ids = self.source_ids(sources);
        let behavior = Rc::new(FromValues {
            sources: ids.clone(),
            compute,
            comparer,
        });
        self.computed_node::<U>(&ids, behavior)
    }

    fn states_node<T, U>(&self, sources: &[Node<T>], comparer: Option<Comparer<U>>, compute: StatesFn<T, U>) -> Node<U>
    where
        T: Clone + 'static,
        U: Clone + 'static,
    {
        let ids = self.source_ids(sources);
        let behavior = Rc::new(FromStates {
            sources: ids.clone(),
            compute,
            comparer,
        });
        self.computed_node::<U>(&ids, behavior)
    }

    fn source_ids<T>(&self, sources: &[Node<T>]) -> SmallVec<[NodeId; 4]> {
        sources
            .iter()
            .map(|source| {
                self.check_owned(source);
                source.id()
            })
            .collect()
    }

    /// Add the node, compute its initial content, then subscribe it to its
    /// sources (catching up with any that are in flight).
    fn computed_node<U: Clone + 'static>(&self, sources: &[NodeId], behavior: Rc<dyn Recompute>) -> Node<U> {
        self.check_mutable();
        let id = self.add_node(Role::Computed, Content::<U>::Empty, sources.len(), Some(Rc::clone(&behavior)));
        let visits: SmallVec<[Visited; 4]> = SmallVec::from_elem(Visited::NotVisited, sources.len() + 1);
        behavior.recompute(self, id, &visits);
        for (index, source) in sources.iter().enumerate() {
            self.attach(
                *source,
                Listener {
                    node: id,
                    edge: index + 1,
                },
            );
        }
        Node::new(self, id)
    }
}
