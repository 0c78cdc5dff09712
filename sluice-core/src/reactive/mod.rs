//! Dataflow Primitives
//!
//! This module implements the typed surface of the engine: the [`Graph`]
//! driver, node handles, and the node kinds built on them.
//!
//! # Concepts
//!
//! ## Inputs and constants
//!
//! An [`Input`] is the only node that can be set from outside. A constant
//! holds one value forever and never takes part in a transaction.
//!
//! ## Computed nodes
//!
//! A computed node is a pure function of its sources. It recomputes once per
//! transaction, after all of its sources are final, and only if at least one
//! of them changed.
//!
//! ## Sockets and switches
//!
//! A [`Socket`] is bound once to a node that may not exist yet when the
//! socket is first read. A switch mirrors whichever node its selector points
//! at and can change targets inside a transaction.
//!
//! # Implementation Notes
//!
//! Content is tri-state ([`Content`]): a value, an error, or `Empty`. Errors
//! are ordinary content and flow downstream.
//!
//! Mutations are grouped into transactions identified by a [`Token`] and
//! owned by a [`TokenSource`]. A mutation without an explicit source gets a
//! source of its own that commits immediately.

mod computed;
mod content;
mod input;
mod node;
mod observer;
mod runtime;
mod socket;
mod switch;
mod token;

pub use computed::SourceState;
pub use content::{Comparer, Content};
pub use input::Input;
pub use node::Node;
pub use observer::ObserverId;
pub use runtime::Graph;
pub use socket::Socket;
pub use switch::Selection;
pub use token::{Token, TokenSource};
