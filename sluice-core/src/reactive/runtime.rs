//! Graph Runtime
//!
//! [`Graph`] is the driver that connects typed node handles to the arena in
//! [`crate::graph`]. It owns the transaction lifecycle and runs the sweep
//! loop that carries Enter and Leave deliveries along subscriptions.
//!
//! # How It Works
//!
//! 1. A mutation (input set, socket bind) enters its node as a root of a
//!    transaction. Enter is forwarded to everything downstream right away,
//!    so every affected node is latched to the transaction's token before
//!    any of them recomputes.
//!
//! 2. When the transaction's [`TokenSource`] is disposed, every root
//!    leaves. Leave deliveries travel downstream; a node that has received
//!    Leave on all of its entered edges recomputes (only if something
//!    changed) and forwards Leave with its own changed flag.
//!
//! 3. User code (computations, comparers, observers) always runs with the
//!    arena borrow released. Mutating the graph from inside it is a
//!    protocol fault.
//!
//! The sweep uses an explicit worklist rather than recursion, so deep
//! chains do not grow the call stack.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::content::{Comparer, Content};
use super::node::Node;
use super::observer::ObserverId;
use super::token::{Token, TokenSource};
use crate::config::GraphConfig;
use crate::error::{raise, BindError, ConfigError, NodeError, OrRaise, ProtocolFault};
use crate::graph::{
    Listener, Listeners, NodeId, NodeKind, ObserverFn, Recompute, Resolution, Role, Slot, TraceRecord,
    UpdateScheduler, ROOT_EDGE, SWITCH_SELECTOR_EDGE, SWITCH_TARGET_EDGE,
};

pub(crate) type Shared = Rc<RefCell<UpdateScheduler>>;

#[derive(Debug, Clone, Copy)]
enum Pulse {
    Enter,
    Leave(bool),
}

/// One pending step of a sweep.
#[derive(Debug, Clone, Copy)]
struct Delivery {
    to: Listener,
    from: NodeId,
    pulse: Pulse,
    token: Token,
}

impl Delivery {
    fn enter(to: Listener, from: NodeId, token: Token) -> Self {
        Self {
            to,
            from,
            pulse: Pulse::Enter,
            token,
        }
    }
}

/// Marks the arena as sweeping for as long as it lives.
struct SweepGuard<'a>(&'a RefCell<UpdateScheduler>);

impl<'a> SweepGuard<'a> {
    fn enter(inner: &'a RefCell<UpdateScheduler>) -> Self {
        inner.borrow_mut().begin_sweep();
        Self(inner)
    }
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut arena) = self.0.try_borrow_mut() {
            arena.end_sweep();
        }
    }
}

/// A dataflow graph.
///
/// Cloning a `Graph` clones the handle; both refer to the same nodes. Node
/// handles only hold a weak reference, so the graph is freed when the last
/// `Graph` handle is dropped.
///
/// # Example
///
/// ```rust
/// use sluice_core::Graph;
///
/// let graph = Graph::new();
/// let count = graph.input::<i32>();
/// let doubled = graph.map(&count, |n| n * 2);
///
/// assert!(doubled.content().is_empty());
/// count.set_value(5);
/// assert_eq!(doubled.value(), Ok(10));
/// ```
#[derive(Clone)]
pub struct Graph {
    inner: Shared,
}

impl Graph {
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    /// Validate `config`, then create a graph with it.
    pub fn try_with_config(config: GraphConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    /// Create a graph without validating `config`. A zero `trace_capacity`
    /// records nothing.
    pub fn with_config(config: GraphConfig) -> Self {
        tracing::debug!(graph = %config.label, record_trace = config.record_trace, "graph created");
        Self {
            inner: Rc::new(RefCell::new(UpdateScheduler::new(config))),
        }
    }

    pub fn config(&self) -> GraphConfig {
        self.inner.borrow().config().clone()
    }

    /// Get the number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.inner.borrow().node_count()
    }

    /// Start a batch. Mutations made with the `_in` variants under the
    /// returned source propagate together when it is committed or dropped.
    pub fn transaction(&self) -> TokenSource {
        TokenSource::new()
    }

    /// Drain the recorded visit trace. Empty unless
    /// [`GraphConfig::record_trace`] is set.
    pub fn take_trace(&self) -> Vec<TraceRecord> {
        self.inner.borrow_mut().take_trace()
    }

    pub(crate) fn kind(&self, node: NodeId) -> NodeKind {
        self.inner.borrow().slot(node).kind()
    }

    /// The node a switch currently mirrors. `None` when nothing is
    /// selected, the selection looped, or `switch` is not a switch.
    pub fn active_target<T>(&self, switch: &Node<T>) -> Option<Node<T>> {
        self.check_owned(switch);
        self.switch_target(switch.id()).map(|id| Node::new(self, id))
    }

    pub(crate) fn switch_target(&self, switch: NodeId) -> Option<NodeId> {
        self.inner
            .borrow()
            .try_switch_wiring(switch)
            .and_then(|wiring| wiring.target)
    }

    pub(crate) fn from_shared(inner: Shared) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<RefCell<UpdateScheduler>> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn owns<T>(&self, node: &Node<T>) -> bool {
        node.belongs_to(&self.inner)
    }

    pub(crate) fn check_owned<T>(&self, node: &Node<T>) {
        if !self.owns(node) {
            raise(ProtocolFault::ForeignNode(node.id()));
        }
    }

    /// Mutations are refused while a sweep is running.
    pub(crate) fn check_mutable(&self) {
        if self.inner.borrow().is_sweeping() {
            raise(ProtocolFault::ReentrantMutation);
        }
    }

    // Content

    pub(crate) fn add_node<T: 'static>(
        &self,
        role: Role,
        content: Content<T>,
        sources: usize,
        behavior: Option<Rc<dyn Recompute>>,
    ) -> NodeId {
        let kind = role.kind();
        let slot = Slot::new(role, Box::new(content), sources, behavior);
        let id = self.inner.borrow_mut().add_node(slot);
        tracing::trace!(graph = %self.inner.borrow().config().label, node = %id, ?kind, "node added");
        id
    }

    /// Read a node's content, following socket bindings.
    pub(crate) fn content<T: Clone + 'static>(&self, node: NodeId) -> Content<T> {
        let arena = self.inner.borrow();
        match arena.resolve(node) {
            Resolution::Unbound(_) => Content::Error(NodeError::Disconnected),
            Resolution::Node(terminal) => match arena.slot(terminal).content.downcast_ref::<Content<T>>() {
                Some(content) => content.clone(),
                None => raise(ProtocolFault::ContentType(terminal)),
            },
        }
    }

    /// Replace a node's content through `comparer`.
    ///
    /// The content is taken out of the arena while the comparer runs.
    pub(crate) fn replace_content<T: 'static>(
        &self,
        node: NodeId,
        next: Content<T>,
        comparer: Option<&Comparer<T>>,
    ) -> bool {
        let mut current = self.take_content::<T>(node);
        let changed = current.replace(next, comparer);
        self.put_content(node, current);
        changed
    }

    fn take_content<T: 'static>(&self, node: NodeId) -> Content<T> {
        let mut arena = self.inner.borrow_mut();
        match arena.slot_mut(node).content.downcast_mut::<Content<T>>() {
            Some(content) => std::mem::take(content),
            None => raise(ProtocolFault::ContentType(node)),
        }
    }

    fn put_content<T: 'static>(&self, node: NodeId, content: Content<T>) {
        let mut arena = self.inner.borrow_mut();
        match arena.slot_mut(node).content.downcast_mut::<Content<T>>() {
            Some(slot) => *slot = content,
            None => raise(ProtocolFault::ContentType(node)),
        }
    }

    // Transactions

    /// Enter `node` as a root, apply a mutation, and record whether it
    /// changed anything. Without `tx` the mutation runs in its own
    /// transaction and commits immediately.
    pub(crate) fn mutate_root(
        &self,
        node: NodeId,
        tx: Option<&TokenSource>,
        apply: impl FnOnce(&Graph) -> bool,
    ) -> bool {
        self.check_mutable();
        let Some(tx) = tx else {
            let own = TokenSource::new();
            let changed = self.mutate_root(node, Some(&own), apply);
            own.commit();
            return changed;
        };
        let token = tx.live_token().or_raise();
        self.enter_root(node, token, tx);
        let changed = apply(self);
        self.inner.borrow_mut().mark_root_changed(node, token, changed);
        changed
    }

    fn enter_root(&self, node: NodeId, token: Token, tx: &TokenSource) {
        let (new_token, forward) = self.inner.borrow_mut().enter_root(node, token);
        if new_token {
            let graph = self.downgrade();
            tx.on_leave(move |token| {
                if let Some(inner) = graph.upgrade() {
                    Graph::from_shared(inner).commit(token);
                }
            });
        }
        if let Some(listeners) = forward {
            let mut stack = Vec::new();
            push_all(&mut stack, node, &listeners, Pulse::Enter, token);
            self.run(stack);
        }
    }

    /// Leave every root of `token`.
    fn commit(&self, token: Token) {
        self.check_mutable();
        let roots = self.inner.borrow_mut().take_roots(token);
        tracing::debug!(
            graph = %self.inner.borrow().config().label,
            %token,
            roots = roots.len(),
            "transaction committed"
        );
        let stack = roots
            .into_iter()
            .rev()
            .map(|(node, changed)| Delivery {
                to: Listener {
                    node,
                    edge: ROOT_EDGE,
                },
                from: node,
                pulse: Pulse::Leave(changed),
                token,
            })
            .collect();
        self.run(stack);
    }

    /// Subscribe `listener` to `source` and catch it up if `source` is in
    /// flight.
    pub(crate) fn attach(&self, source: NodeId, listener: Listener) {
        let catch_up = self.inner.borrow_mut().subscribe(source, listener);
        self.catch_up(source, listener, catch_up);
    }

    pub(crate) fn catch_up(&self, source: NodeId, listener: Listener, token: Option<Token>) {
        if let Some(token) = token {
            tracing::trace!(%source, node = %listener.node, %token, "catch-up enter");
            self.run(vec![Delivery::enter(listener, source, token)]);
        }
    }

    /// Deliver pending observer notifications.
    pub(crate) fn flush(&self) {
        self.run(Vec::new());
    }

    pub(crate) fn add_observer(&self, node: NodeId, id: ObserverId, observer: ObserverFn) {
        self.inner.borrow_mut().add_observer(node, id, observer);
        self.flush();
    }

    pub(crate) fn remove_observer(&self, node: NodeId, id: ObserverId) -> bool {
        self.inner.borrow_mut().remove_observer(node, id)
    }

    // Sockets

    pub(crate) fn resolve(&self, node: NodeId) -> Resolution {
        self.inner.borrow().resolve(node)
    }

    pub(crate) fn socket_target(&self, socket: NodeId) -> Option<NodeId> {
        self.inner
            .borrow()
            .socket_wiring(socket)
            .and_then(|wiring| wiring.target)
    }

    pub(crate) fn check_bind(&self, socket: NodeId, target: NodeId) -> Result<(), BindError> {
        self.inner.borrow_mut().check_bind(socket, target)
    }

    pub(crate) fn attach_socket(&self, socket: NodeId, target: NodeId) -> Option<Token> {
        self.inner.borrow_mut().attach_socket(socket, target)
    }

    pub(crate) fn force_changed(&self, node: NodeId, edge: usize) {
        self.inner.borrow_mut().force_changed(node, edge);
    }

    // Sweep

    fn run(&self, mut stack: Vec<Delivery>) {
        let _sweep = SweepGuard::enter(&self.inner);
        self.dispatch();
        while let Some(delivery) = stack.pop() {
            let Delivery {
                to,
                from,
                pulse,
                token,
            } = delivery;
            match pulse {
                Pulse::Enter => {
                    let forward = self.inner.borrow_mut().enter_edge(to, token);
                    if let Some(listeners) = forward {
                        push_all(&mut stack, to.node, &listeners, Pulse::Enter, token);
                    }
                }
                Pulse::Leave(changed) => {
                    if changed && self.is_selector_edge(to) {
                        self.reselect(to.node);
                    }
                    let done = self.inner.borrow_mut().leave_edge(to, from, token, changed);
                    if let Some(any_changed) = done {
                        let node_changed = any_changed && self.recompute(to.node);
                        let listeners = self.inner.borrow_mut().finish_leave(to.node, token, node_changed);
                        push_all(&mut stack, to.node, &listeners, Pulse::Leave(node_changed), token);
                    }
                }
            }
            self.dispatch();
        }
    }

    fn recompute(&self, node: NodeId) -> bool {
        let (behavior, visits) = {
            let arena = self.inner.borrow();
            let slot = arena.slot(node);
            (slot.behavior.clone(), slot.join.visits())
        };
        match behavior {
            Some(behavior) => behavior.recompute(self, node, &visits),
            None => true,
        }
    }

    fn is_selector_edge(&self, to: Listener) -> bool {
        to.edge == SWITCH_SELECTOR_EDGE
            && self.inner.borrow().slot(to.node).kind() == NodeKind::Switch
    }

    /// Re-read a switch's selector and move its subscription.
    pub(crate) fn reselect(&self, switch: NodeId) {
        let selector = Rc::clone(&self.inner.borrow().switch_wiring(switch).selector);
        let next = selector.select(self).ok().flatten();
        let catch_up = self.inner.borrow_mut().rewire_switch(switch, next);
        if let Some(target) = next {
            self.catch_up(
                target,
                Listener {
                    node: switch,
                    edge: SWITCH_TARGET_EDGE,
                },
                catch_up,
            );
        }
    }

    /// Whether a switch's current selection was rejected as a cycle.
    pub(crate) fn is_looped(&self, switch: NodeId) -> bool {
        self.inner.borrow().switch_wiring(switch).looped
    }

    fn dispatch(&self) {
        loop {
            let batch = self.inner.borrow_mut().take_notifications();
            if batch.is_empty() {
                break;
            }
            for (callbacks, event, token) in batch {
                for callback in callbacks {
                    let mut callback = callback.borrow_mut();
                    (&mut *callback)(event, token);
                }
            }
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(arena) => f
                .debug_struct("Graph")
                .field("label", &arena.config().label)
                .field("nodes", &arena.node_count())
                .finish(),
            Err(_) => f.write_str("Graph { .. }"),
        }
    }
}

/// Push one delivery per listener so they are processed in subscription
/// order.
fn push_all(stack: &mut Vec<Delivery>, from: NodeId, listeners: &Listeners, pulse: Pulse, token: Token) {
    stack.extend(listeners.iter().rev().map(|&to| Delivery {
        to,
        from,
        pulse,
        token,
    }));
}
