//! Predicate fragments built from optional search fields
//!
//! Each factory takes one optional input and returns a [`Fragment`]: `Some`
//! with a comparison when the input is set, `None` when it is not. Feed the
//! results straight into [`compose`](super::filter::compose).
//!
//! # Example
//!
//! ```rust
//! use acton_query::query::{compose, fragment, Column};
//!
//! const USERNAME: Column = Column::new("member", "username");
//! const AGE: Column = Column::new("member", "age");
//!
//! let filter = compose([
//!     fragment::text_eq(USERNAME, Some("   ")),
//!     fragment::goe(AGE, Some(0)),
//!     fragment::loe(AGE, None::<i32>),
//! ]);
//!
//! // Whitespace-only text is absent, a zero bound is present.
//! assert_eq!(filter.len(), 1);
//! ```

use super::expr::{Expr, Value};
use super::filter::Predicate;

/// One optional predicate; `None` places no constraint
pub type Fragment = Option<Predicate>;

/// Whether the text is set and has a non-whitespace character
pub fn has_text(text: Option<&str>) -> bool {
    text.is_some_and(|t| !t.trim().is_empty())
}

/// Equality on text, present only when [`has_text`] holds.
///
/// The comparison uses the value exactly as supplied; trimming only decides
/// presence.
pub fn text_eq(expr: impl Into<Expr>, text: Option<&str>) -> Fragment {
    match text {
        Some(t) if has_text(Some(t)) => Some(Predicate::eq(expr, t)),
        _ => None,
    }
}

/// `expr >= bound` when the bound is set (zero included)
pub fn goe<V: Into<Value>>(expr: impl Into<Expr>, bound: Option<V>) -> Fragment {
    bound.map(|b| Predicate::gte(expr, Expr::Literal(b.into())))
}

/// `expr <= bound` when the bound is set (zero included)
pub fn loe<V: Into<Value>>(expr: impl Into<Expr>, bound: Option<V>) -> Fragment {
    bound.map(|b| Predicate::lte(expr, Expr::Literal(b.into())))
}

/// `expr = value` when the value is set
pub fn eq_opt<V: Into<Value>>(expr: impl Into<Expr>, value: Option<V>) -> Fragment {
    value.map(|v| Predicate::eq(expr, Expr::Literal(v.into())))
}
