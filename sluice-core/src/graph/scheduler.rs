//! Update Scheduler
//!
//! The scheduler owns every node of a graph in an arena and implements the
//! bookkeeping half of propagation: subscriptions, per-edge Enter/Leave,
//! transaction roots, socket resolution, switch rewiring and reachability
//! probes. Running user computations is left to the driver in
//! [`crate::reactive::Graph`], which never holds a borrow of the scheduler
//! while user code runs.
//!
//! # Algorithm
//!
//! A transaction is two sweeps over the live subscriptions:
//!
//! 1. Enter: every root enters through its root edge. A node entered for the
//!    first time under a token enters itself and forwards Enter to each
//!    subscriber. Later edges only add to the node's [`Join`].
//! 2. Leave: on commit every root leaves. When the last entered edge of a
//!    node leaves, the node recomputes if anything changed and then forwards
//!    Leave with its own changed flag.
//!
//! Because a node only leaves after all of its entered edges have, every
//! source it reads is already final when it recomputes.
//!
//! [`Join`]: super::Join

use std::collections::VecDeque;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::join::EdgeState;
use super::node::{
    Listener, NodeId, ObserverFn, Role, Slot, SocketWiring, SwitchWiring, ROOT_EDGE,
    SOCKET_TARGET_EDGE, SWITCH_DRAIN_EDGE, SWITCH_TARGET_EDGE,
};
use super::visit::{TraceRecord, VisitEvent};
use crate::config::GraphConfig;
use crate::error::{raise, BindError, OrRaise, ProtocolFault};
use crate::reactive::{ObserverId, Token};

pub(crate) type Listeners = SmallVec<[Listener; 4]>;

/// What a node reads through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolution {
    /// A node holding content.
    Node(NodeId),
    /// The chain ends in this unbound socket.
    Unbound(NodeId),
}

/// An observer call waiting for the scheduler borrow to be released.
struct Notification {
    node: NodeId,
    /// `None` notifies every observer of the node.
    observer: Option<ObserverId>,
    event: VisitEvent,
    token: Token,
}

/// The update scheduler manages the node arena and coordinates updates.
pub(crate) struct UpdateScheduler {
    /// All nodes in the graph, indexed by ID.
    nodes: Vec<Slot>,

    /// Root nodes of each open transaction and whether each one changed.
    roots: IndexMap<Token, IndexMap<NodeId, bool>>,

    /// Depth of running sweeps.
    sweeping: usize,

    config: GraphConfig,

    trace: VecDeque<TraceRecord>,

    pending: Vec<Notification>,
}

impl UpdateScheduler {
    pub fn new(config: GraphConfig) -> Self {
        Self {
            nodes: Vec::new(),
            roots: IndexMap::new(),
            sweeping: 0,
            config,
            trace: VecDeque::new(),
            pending: Vec::new(),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Get the number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Add a node to the graph.
    pub fn add_node(&mut self, slot: Slot) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        self.nodes.push(slot);
        id
    }

    /// Get a reference to a node.
    pub fn slot(&self, id: NodeId) -> &Slot {
        match self.nodes.get(id.index()) {
            Some(slot) => slot,
            None => raise(ProtocolFault::ForeignNode(id)),
        }
    }

    /// Get a mutable reference to a node.
    pub fn slot_mut(&mut self, id: NodeId) -> &mut Slot {
        match self.nodes.get_mut(id.index()) {
            Some(slot) => slot,
            None => raise(ProtocolFault::ForeignNode(id)),
        }
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeping > 0
    }

    pub fn begin_sweep(&mut self) {
        self.sweeping += 1;
    }

    pub fn end_sweep(&mut self) {
        self.sweeping = self.sweeping.saturating_sub(1);
    }

    // Subscriptions

    /// Subscribe `listener` to `source`.
    ///
    /// Returns the token of the transaction `source` is currently part of,
    /// if any. The caller owes the listener a catch-up Enter for it.
    pub fn subscribe(&mut self, source: NodeId, listener: Listener) -> Option<Token> {
        self.slot_mut(source).add_dependent(listener);
        self.slot_mut(listener.node).upstream[listener.edge] = Some(source);
        self.slot(source).visit.update_token()
    }

    /// Remove a subscription.
    pub fn unsubscribe(&mut self, source: NodeId, listener: Listener) {
        self.slot_mut(source).remove_dependent(listener);
        let upstream = &mut self.slot_mut(listener.node).upstream[listener.edge];
        if *upstream == Some(source) {
            *upstream = None;
        }
    }

    // Update sweep

    /// Deliver Enter on one edge.
    ///
    /// Returns the listeners to forward to when this is the node's first
    /// edge for the token.
    pub fn enter_edge(&mut self, to: Listener, token: Token) -> Option<Listeners> {
        let slot = self.slot_mut(to.node);
        if !slot.join.enter(to.node, to.edge, token).or_raise() {
            return None;
        }
        slot.visit.enter_update(to.node, token).or_raise();
        let listeners = Listeners::from_slice(slot.dependents());
        self.emit(to.node, VisitEvent::EnterUpdate, token);
        Some(listeners)
    }

    /// Deliver Leave on one edge.
    ///
    /// Returns `Some(any_changed)` when this was the node's last entered
    /// edge; the caller then recomputes and calls [`finish_leave`].
    ///
    /// [`finish_leave`]: Self::finish_leave
    pub fn leave_edge(&mut self, to: Listener, from: NodeId, token: Token, changed: bool) -> Option<bool> {
        let edge = self.route(to, from);
        let done = self
            .slot_mut(to.node)
            .join
            .leave(to.node, edge, token, changed)
            .or_raise();
        if edge == SWITCH_DRAIN_EDGE {
            self.release_drain(to.node);
        }
        done
    }

    /// Leave the node itself and return the listeners to forward to.
    pub fn finish_leave(&mut self, node: NodeId, token: Token, changed: bool) -> Listeners {
        let slot = self.slot_mut(node);
        slot.visit.leave_update(node, token).or_raise();
        slot.join.settle();
        let listeners = Listeners::from_slice(slot.dependents());
        self.emit(node, VisitEvent::leave(changed), token);
        listeners
    }

    /// Make the next Leave on `edge` of `node` count as a change.
    pub fn force_changed(&mut self, node: NodeId, edge: usize) {
        self.slot_mut(node).join.force_changed(edge);
    }

    /// Redirect a delivery from a switch's previous target to its drain edge.
    fn route(&self, to: Listener, from: NodeId) -> usize {
        match &self.slot(to.node).role {
            Role::Switch(wiring)
                if to.edge == SWITCH_TARGET_EDGE
                    && wiring.draining == Some(from)
                    && wiring.target != Some(from) =>
            {
                SWITCH_DRAIN_EDGE
            }
            _ => to.edge,
        }
    }

    fn release_drain(&mut self, switch: NodeId) {
        let Role::Switch(wiring) = &mut self.slot_mut(switch).role else {
            return;
        };
        if let Some(old) = wiring.draining.take() {
            tracing::debug!(%switch, drained = %old, "released previous switch target");
            self.unsubscribe(
                old,
                Listener {
                    node: switch,
                    edge: SWITCH_DRAIN_EDGE,
                },
            );
        }
    }

    // Transactions

    /// Enter `node` as a root of the transaction `token`.
    ///
    /// Returns whether `token` is new to this graph, and the listeners to
    /// forward Enter to if the node was not yet a root of it.
    pub fn enter_root(&mut self, node: NodeId, token: Token) -> (bool, Option<Listeners>) {
        let new_token = !self.roots.contains_key(&token);
        let roots = self.roots.entry(token).or_default();
        if roots.contains_key(&node) {
            return (new_token, None);
        }
        roots.insert(node, false);
        if new_token {
            tracing::debug!(graph = %self.config.label, %token, "transaction opened");
        }
        let forward = self.enter_edge(
            Listener {
                node,
                edge: ROOT_EDGE,
            },
            token,
        );
        (new_token, forward)
    }

    pub fn mark_root_changed(&mut self, node: NodeId, token: Token, changed: bool) {
        if let Some(flag) = self.roots.get_mut(&token).and_then(|roots| roots.get_mut(&node)) {
            *flag |= changed;
        }
    }

    /// Remove and return the roots of a transaction, in the order they
    /// entered.
    pub fn take_roots(&mut self, token: Token) -> Vec<(NodeId, bool)> {
        self.roots
            .shift_remove(&token)
            .map(|roots| roots.into_iter().collect())
            .unwrap_or_default()
    }

    // Sockets

    /// Follow socket bindings from `id` to the node that holds content.
    ///
    /// The terminal is cached on every socket walked; bindings never change
    /// once made, so the cache stays valid.
    pub fn resolve(&self, id: NodeId) -> Resolution {
        let mut current = id;
        let mut walked: SmallVec<[NodeId; 4]> = SmallVec::new();
        while let Role::Socket(wiring) = &self.slot(current).role {
            if let Some(terminal) = wiring.terminal.get() {
                current = terminal;
                break;
            }
            match wiring.target {
                Some(next) => {
                    walked.push(current);
                    current = next;
                }
                None => return Resolution::Unbound(current),
            }
        }
        for socket in walked {
            if let Role::Socket(wiring) = &self.slot(socket).role {
                wiring.terminal.set(Some(current));
            }
        }
        Resolution::Node(current)
    }

    pub fn socket_wiring(&self, socket: NodeId) -> Option<&SocketWiring> {
        match &self.slot(socket).role {
            Role::Socket(wiring) => Some(wiring),
            _ => None,
        }
    }

    /// Check that `socket` may be bound to `target`.
    pub fn check_bind(&mut self, socket: NodeId, target: NodeId) -> Result<(), BindError> {
        if socket == target {
            return Err(BindError::SelfBinding { socket });
        }
        if let Some(bound) = self.socket_wiring(socket).and_then(|wiring| wiring.target) {
            return Err(BindError::AlreadyBound {
                socket,
                target: bound,
            });
        }
        if self.reaches(socket, target) {
            return Err(BindError::Cycle { socket, target });
        }
        Ok(())
    }

    /// Record the binding and subscribe the socket to its target.
    ///
    /// Returns the target's in-flight token, if any.
    pub fn attach_socket(&mut self, socket: NodeId, target: NodeId) -> Option<Token> {
        if let Role::Socket(wiring) = &mut self.slot_mut(socket).role {
            wiring.target = Some(target);
        }
        self.subscribe(
            target,
            Listener {
                node: socket,
                edge: SOCKET_TARGET_EDGE,
            },
        )
    }

    // Switches

    /// The wiring of `node`, or `None` if it is not a switch.
    pub fn try_switch_wiring(&self, node: NodeId) -> Option<&SwitchWiring> {
        match &self.slot(node).role {
            Role::Switch(wiring) => Some(wiring),
            _ => None,
        }
    }

    pub fn switch_wiring(&self, switch: NodeId) -> &SwitchWiring {
        match self.try_switch_wiring(switch) {
            Some(wiring) => wiring,
            None => raise(ProtocolFault::NotASwitch(switch)),
        }
    }

    fn switch_wiring_mut(&mut self, switch: NodeId) -> &mut SwitchWiring {
        match &mut self.slot_mut(switch).role {
            Role::Switch(wiring) => wiring,
            _ => raise(ProtocolFault::NotASwitch(switch)),
        }
    }

    /// Point a switch at `next`.
    ///
    /// A previous target that still owes this switch a Leave is moved to
    /// the drain edge and released once that Leave arrives. A selection that
    /// would close a cycle is recorded as looped and not subscribed.
    ///
    /// Returns the new target's in-flight token, if any.
    pub fn rewire_switch(&mut self, switch: NodeId, next: Option<NodeId>) -> Option<Token> {
        let wiring = self.switch_wiring(switch);
        if wiring.selected == next {
            return None;
        }
        let previous = wiring.target;
        let target_listener = Listener {
            node: switch,
            edge: SWITCH_TARGET_EDGE,
        };

        if let Some(old) = previous {
            let in_flight = self.slot(switch).join.edge_state(SWITCH_TARGET_EDGE) == EdgeState::Entered;
            if in_flight {
                let slot = self.slot_mut(switch);
                slot.join.move_edge(SWITCH_TARGET_EDGE, SWITCH_DRAIN_EDGE);
                slot.upstream[SWITCH_TARGET_EDGE] = None;
                slot.upstream[SWITCH_DRAIN_EDGE] = Some(old);
                for listener in self.slot_mut(old).downstream.iter_mut() {
                    if *listener == target_listener {
                        listener.edge = SWITCH_DRAIN_EDGE;
                    }
                }
                self.switch_wiring_mut(switch).draining = Some(old);
            } else {
                self.unsubscribe(old, target_listener);
                self.slot_mut(switch).join.detach_edge(SWITCH_TARGET_EDGE);
            }
        }

        let wiring = self.switch_wiring_mut(switch);
        wiring.selected = next;
        wiring.target = None;
        wiring.looped = false;

        let next = next?;
        tracing::debug!(%switch, from = ?previous, to = %next, "switch reselected");
        if next == switch || self.reaches(switch, next) {
            tracing::warn!(%switch, target = %next, "switch selection rejected: would create a cycle");
            self.switch_wiring_mut(switch).looped = true;
            return None;
        }
        self.switch_wiring_mut(switch).target = Some(next);
        self.subscribe(next, target_listener)
    }

    // Reachability

    /// Probe whether `to` can be reached from `from` along subscriptions.
    ///
    /// Runs a full LoopSearch sweep under a single-pass token: every node
    /// reached opens its LoopSearch bracket, and every bracket is closed
    /// again before returning.
    pub fn reaches(&mut self, from: NodeId, to: NodeId) -> bool {
        let token = Token::single_pass();
        let mut found = from == to;
        let mut opened: Vec<Listener> = Vec::new();
        let mut stack = vec![Listener {
            node: from,
            edge: ROOT_EDGE,
        }];

        while let Some(at) = stack.pop() {
            let slot = self.slot_mut(at.node);
            let first = slot.join.enter_loop(at.node, at.edge, token).or_raise();
            opened.push(at);
            if !first {
                continue;
            }
            slot.visit.enter_loop_search(at.node, token).or_raise();
            let downstream = slot.downstream.clone();
            self.emit(at.node, VisitEvent::EnterLoopSearch, token);
            found |= at.node == to;
            if !found {
                stack.extend(downstream.into_iter().rev());
            }
        }

        for at in opened.into_iter().rev() {
            let slot = self.slot_mut(at.node);
            if slot.join.leave_loop(at.node, at.edge, token).or_raise() {
                slot.visit.leave_loop_search(at.node, token).or_raise();
                self.emit(at.node, VisitEvent::LeaveLoopSearch, token);
            }
        }

        tracing::trace!(%from, %to, found, "reachability probe");
        found
    }

    // Events

    fn emit(&mut self, node: NodeId, event: VisitEvent, token: Token) {
        tracing::trace!(graph = %self.config.label, %node, ?event, %token, "visit");
        if self.config.record_trace && self.config.trace_capacity > 0 {
            if self.trace.len() >= self.config.trace_capacity {
                self.trace.pop_front();
            }
            self.trace.push_back(TraceRecord { node, event, token });
        }
        if !self.slot(node).observers.is_empty() {
            self.pending.push(Notification {
                node,
                observer: None,
                event,
                token,
            });
        }
    }

    pub fn take_trace(&mut self) -> Vec<TraceRecord> {
        self.trace.drain(..).collect()
    }

    pub fn add_observer(&mut self, node: NodeId, id: ObserverId, observer: ObserverFn) {
        let slot = self.slot_mut(node);
        slot.observers.push((id, observer));
        // A node already in flight owes its new observer the Enter it missed.
        if let Some(token) = slot.visit.update_token() {
            self.pending.push(Notification {
                node,
                observer: Some(id),
                event: VisitEvent::EnterUpdate,
                token,
            });
        }
    }

    pub fn remove_observer(&mut self, node: NodeId, id: ObserverId) -> bool {
        let observers = &mut self.slot_mut(node).observers;
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    /// Drain pending notifications, resolved to the callbacks to run.
    pub fn take_notifications(&mut self) -> Vec<(SmallVec<[ObserverFn; 2]>, VisitEvent, Token)> {
        let pending = std::mem::take(&mut self.pending);
        pending
            .into_iter()
            .map(|notification| {
                let callbacks = self
                    .slot(notification.node)
                    .observers
                    .iter()
                    .filter(|(id, _)| notification.observer.map_or(true, |only| only == *id))
                    .map(|(_, callback)| callback.clone())
                    .collect();
                (callbacks, notification.event, notification.token)
            })
            .collect()
    }
}
