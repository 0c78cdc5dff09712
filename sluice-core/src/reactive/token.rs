//! Transaction Tokens
//!
//! A [`Token`] identifies one propagation transaction. Every node entered
//! during the transaction is latched to its token until the matching Leave,
//! which is how a node reached through several paths is only processed once.
//!
//! A [`TokenSource`] owns exactly one token and its one-shot "leave"
//! notification. Disposing the source (explicitly, or by dropping it) fires
//! the leave hooks once; after that no new hooks can be registered. Graphs
//! register their commit as a leave hook, so disposing a source is what
//! commits a batch.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::error::{raise, ProtocolFault};

/// Identity of one propagation transaction.
///
/// `Token::NONE` (also the `Default`) is never issued and is rejected
/// wherever a live token is required.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Token(u64);

impl Token {
    pub const NONE: Token = Token(0);

    /// Issue a fresh token.
    ///
    /// Uses an atomic counter so tokens stay unique across graphs.
    fn issue() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// A token whose source is already disposed.
    ///
    /// Used where a token identity is needed without a real transaction,
    /// such as reachability probes.
    pub fn single_pass() -> Self {
        let source = TokenSource::new();
        let token = source.token();
        source.dispose();
        token
    }

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Reject the default token.
    pub(crate) fn require_live(self) -> Result<Self, ProtocolFault> {
        if self.is_none() {
            Err(ProtocolFault::DefaultToken)
        } else {
            Ok(self)
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

type LeaveHook = Box<dyn FnOnce(Token)>;

/// Scoped owner of one token and its leave notification.
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use sluice_core::TokenSource;
///
/// let fired = Rc::new(Cell::new(0));
/// let source = TokenSource::new();
/// let counter = fired.clone();
/// source.on_leave(move |_| counter.set(counter.get() + 1));
///
/// source.dispose();
/// source.dispose();
/// assert_eq!(fired.get(), 1);
/// ```
pub struct TokenSource {
    token: Token,
    /// Pending leave hooks; `None` once disposed.
    hooks: RefCell<Option<Vec<LeaveHook>>>,
}

impl TokenSource {
    pub fn new() -> Self {
        Self {
            token: Token::issue(),
            hooks: RefCell::new(Some(Vec::new())),
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn is_disposed(&self) -> bool {
        self.hooks.borrow().is_none()
    }

    /// Register a hook to run when the source is disposed.
    ///
    /// Registering on a disposed source is a protocol fault.
    pub fn on_leave(&self, hook: impl FnOnce(Token) + 'static) {
        match self.hooks.borrow_mut().as_mut() {
            Some(hooks) => hooks.push(Box::new(hook)),
            None => raise(ProtocolFault::HookAfterDispose(self.token)),
        }
    }

    /// Fire the leave hooks. Repeat calls do nothing.
    pub fn dispose(&self) {
        let hooks = self.hooks.borrow_mut().take();
        if let Some(hooks) = hooks {
            tracing::debug!(token = %self.token, hooks = hooks.len(), "token source disposed");
            for hook in hooks {
                hook(self.token);
            }
        }
    }

    /// Dispose and consume the source.
    pub fn commit(self) {
        self.dispose();
    }

    /// The token, if the source can still carry mutations.
    pub(crate) fn live_token(&self) -> Result<Token, ProtocolFault> {
        if self.is_disposed() {
            Err(ProtocolFault::TransactionDisposed(self.token))
        } else {
            Ok(self.token)
        }
    }
}

impl Default for TokenSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSource")
            .field("token", &self.token)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Drop for TokenSource {
    fn drop(&mut self) {
        // A fault is already unwinding; committing now would only raise another.
        if std::thread::panicking() {
            return;
        }
        self.dispose();
    }
}
