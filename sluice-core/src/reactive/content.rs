//! Node Content
//!
//! Every node holds a [`Content`]: a value, an error, or the `Empty`
//! sentinel meaning "never produced a value". Errors are ordinary content;
//! they flow downstream like values and only become an `Err` when a caller
//! asks for one with [`Content::value`].
//!
//! Replacing content goes through an optional [`Comparer`]. Without one,
//! every replacement counts as a change. With one, a replacement that
//! compares equal is dropped and reported as unchanged, which is what lets
//! a node leave a transaction with `LeaveUnchanged` and spare its dependents
//! a recompute.

use std::fmt::{self, Debug};
use std::rc::Rc;

use crate::error::NodeError;

/// The tri-state content of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Content<T> {
    Value(T),
    Error(NodeError),
    Empty,
}

impl<T> Default for Content<T> {
    fn default() -> Self {
        Self::Empty
    }
}

impl<T> Content<T> {
    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The value, if there is one.
    pub fn try_value(&self) -> Option<&T> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    /// The error, if there is one. `Empty` is not reported as an error here.
    pub fn try_error(&self) -> Option<&NodeError> {
        match self {
            Self::Error(error) => Some(error),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Convert into a `Result`, mapping `Empty` to [`NodeError::Empty`].
    pub fn into_result(self) -> Result<T, NodeError> {
        match self {
            Self::Value(value) => Ok(value),
            Self::Error(error) => Err(error),
            Self::Empty => Err(NodeError::Empty),
        }
    }

    /// Run exactly one of the two branches. `Empty` takes the error branch
    /// with [`NodeError::Empty`].
    pub fn match_content<R>(
        &self,
        on_value: impl FnOnce(&T) -> R,
        on_error: impl FnOnce(&NodeError) -> R,
    ) -> R {
        match self {
            Self::Value(value) => on_value(value),
            Self::Error(error) => on_error(error),
            Self::Empty => {
                let empty = NodeError::Empty;
                on_error(&empty)
            }
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Content<U> {
        match self {
            Self::Value(value) => Content::Value(f(value)),
            Self::Error(error) => Content::Error(error),
            Self::Empty => Content::Empty,
        }
    }

    /// Replace the content unless the comparer reports it as unchanged.
    ///
    /// Returns whether the content changed.
    pub fn replace(&mut self, next: Content<T>, comparer: Option<&Comparer<T>>) -> bool {
        if let Some(comparer) = comparer {
            if comparer.same(self, &next) {
                return false;
            }
        }
        *self = next;
        true
    }

    pub fn set_value(&mut self, value: T, comparer: Option<&Comparer<T>>) -> bool {
        self.replace(Self::Value(value), comparer)
    }

    pub fn set_error(&mut self, error: NodeError, comparer: Option<&Comparer<T>>) -> bool {
        self.replace(Self::Error(error), comparer)
    }
}

impl<T: Clone> Content<T> {
    /// The value, or `fallback` for errors and `Empty`. Never fails.
    pub fn get_or(&self, fallback: T) -> T {
        match self {
            Self::Value(value) => value.clone(),
            _ => fallback,
        }
    }

    /// The value, or the stored error. `Empty` yields [`NodeError::Empty`].
    pub fn value(&self) -> Result<T, NodeError> {
        self.clone().into_result()
    }
}

impl<T> From<Result<T, NodeError>> for Content<T> {
    fn from(result: Result<T, NodeError>) -> Self {
        match result {
            Ok(value) => Self::Value(value),
            Err(NodeError::Empty) => Self::Empty,
            Err(error) => Self::Error(error),
        }
    }
}

/// Decides whether a replacement value is the same as the current one.
pub struct Comparer<T> {
    same_value: Rc<dyn Fn(&T, &T) -> bool>,
}

impl<T> Comparer<T> {
    pub fn new(same_value: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self {
            same_value: Rc::new(same_value),
        }
    }

    /// Compare two contents. Values go through the comparer; `Empty` equals
    /// `Empty`; errors compare with [`NodeError`]'s equality.
    pub fn same(&self, current: &Content<T>, next: &Content<T>) -> bool {
        match (current, next) {
            (Content::Value(a), Content::Value(b)) => (self.same_value)(a, b),
            (Content::Error(a), Content::Error(b)) => a == b,
            (Content::Empty, Content::Empty) => true,
            _ => false,
        }
    }
}

impl<T: PartialEq + 'static> Comparer<T> {
    /// Compare values with `PartialEq`.
    pub fn equality() -> Self {
        Self::new(|a: &T, b: &T| a == b)
    }
}

impl<T> Clone for Comparer<T> {
    fn clone(&self) -> Self {
        Self {
            same_value: Rc::clone(&self.same_value),
        }
    }
}

impl<T> Debug for Comparer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Comparer")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_surface() {
        let value: Content<i32> = Content::Value(7);
        let error: Content<i32> = Content::Error(NodeError::message("boom"));
        let empty: Content<i32> = Content::Empty;

        assert_eq!(value.get_or(0), 7);
        assert_eq!(error.get_or(0), 0);
        assert_eq!(empty.get_or(0), 0);

        assert_eq!(value.value(), Ok(7));
        assert_eq!(error.value(), Err(NodeError::message("boom")));
        assert_eq!(empty.value(), Err(NodeError::Empty));

        assert_eq!(empty.try_value(), None);
        assert_eq!(empty.try_error(), None);
        assert!(error.try_error().is_some());
    }

    #[test]
    fn match_runs_exactly_one_branch() {
        let empty: Content<i32> = Content::Empty;
        let seen = empty.match_content(|_| "value", |e| {
            assert!(e.is_empty_sentinel());
            "error"
        });
        assert_eq!(seen, "error");

        let value = Content::Value(3);
        assert_eq!(value.match_content(|v| v * 2, |_| -1), 6);
    }

    #[test]
    fn replace_without_comparer_always_changes() {
        let mut content = Content::Value(1);
        assert!(content.set_value(1, None));
        assert!(content.replace(Content::Empty, None));
        assert!(content.replace(Content::Empty, None));
    }

    #[test]
    fn replace_with_comparer_suppresses_equal_content() {
        let comparer = Comparer::equality();
        let mut content = Content::Value(1);
        assert!(!content.set_value(1, Some(&comparer)));
        assert!(content.set_value(2, Some(&comparer)));
        assert!(content.set_error(NodeError::message("x"), Some(&comparer)));
        assert!(!content.set_error(NodeError::message("x"), Some(&comparer)));
        assert!(content.replace(Content::Empty, Some(&comparer)));
        assert!(!content.replace(Content::Empty, Some(&comparer)));
    }

    #[test]
    fn custom_comparer() {
        let comparer = Comparer::new(|a: &f64, b: &f64| (a - b).abs() < 0.01);
        let mut content = Content::Value(1.0);
        assert!(!content.set_value(1.001, Some(&comparer)));
        assert_eq!(content.get_or(0.0), 1.0);
        assert!(content.set_value(1.5, Some(&comparer)));
    }
}
