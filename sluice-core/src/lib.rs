//! Sluice Core
//!
//! This crate provides a synchronous, single-threaded dataflow engine. Nodes
//! hold values, errors, or nothing yet; derived nodes recompute when their
//! sources change, and every change propagates glitch-free: a node never
//! observes a mix of old and new source values, and recomputes at most once
//! per transaction.
//!
//! It implements:
//!
//! - Inputs, constants and computed nodes
//! - Sockets, bound once to a node that may not exist yet
//! - Switches, which mirror whichever node a selector points at
//! - Batched transactions driven by [`TokenSource`]
//! - Cycle rejection for socket binds and switch selections
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `graph`: the node arena, the visit protocol and the fan-in join
//! - `reactive`: the [`Graph`] driver and the typed node handles
//!
//! # Example
//!
//! ```rust
//! use sluice_core::{Graph, NodeError};
//!
//! let graph = Graph::new();
//! let price = graph.input::<f64>();
//! let quantity = graph.input_with(2.0);
//! let total = graph.zip(&price, &quantity, |p, q| p * q);
//!
//! // Nothing to compute from yet.
//! assert_eq!(total.value(), Err(NodeError::Empty));
//!
//! price.set_value(1.5);
//! assert_eq!(total.value(), Ok(3.0));
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::GraphConfig;
pub use error::{BindError, BoxError, ConfigError, EvalResult, NodeError, ProtocolFault};
pub use graph::{EdgeState, NodeId, NodeKind, TraceRecord, VisitEvent, Visited};
pub use reactive::{
    Comparer, Content, Graph, Input, Node, ObserverId, Selection, Socket, SourceState, Token,
    TokenSource,
};
