//! Predicates and their AND-composition
//!
//! A [`Predicate`] is one comparison. A [`FilterExpression`] is the
//! conjunction of zero or more predicates; the empty expression matches every
//! row. [`compose`] folds a list of optional fragments into a filter,
//! skipping the absent ones.
//!
//! # Example
//!
//! ```rust
//! use acton_query::query::{compose, Column, Predicate};
//!
//! const USERNAME: Column = Column::new("member", "username");
//! const AGE: Column = Column::new("member", "age");
//!
//! let filter = compose([
//!     Some(Predicate::eq(USERNAME, "member1")),
//!     None,
//!     Some(Predicate::between(AGE, 10, 30)),
//! ]);
//! assert_eq!(filter.len(), 2);
//!
//! assert!(compose([None, None]).is_match_all());
//! ```

use std::fmt;

use super::expr::{Expr, Value};
use super::subquery::SubQuery;

/// Comparison operators for predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    /// Equal to (=)
    Equal,
    /// Not equal to (!=)
    NotEqual,
    /// Greater than (>)
    GreaterThan,
    /// Greater than or equal to (>=)
    GreaterThanOrEqual,
    /// Less than (<)
    LessThan,
    /// Less than or equal to (<=)
    LessThanOrEqual,
    /// Inclusive range (BETWEEN)
    Between,
    /// Pattern matching (LIKE)
    Like,
    /// Value is in a list (IN)
    In,
    /// Value is null (IS NULL)
    IsNull,
    /// Value is not null (IS NOT NULL)
    IsNotNull,
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "="),
            Self::NotEqual => write!(f, "!="),
            Self::GreaterThan => write!(f, ">"),
            Self::GreaterThanOrEqual => write!(f, ">="),
            Self::LessThan => write!(f, "<"),
            Self::LessThanOrEqual => write!(f, "<="),
            Self::Between => write!(f, "BETWEEN"),
            Self::Like => write!(f, "LIKE"),
            Self::In => write!(f, "IN"),
            Self::IsNull => write!(f, "IS NULL"),
            Self::IsNotNull => write!(f, "IS NOT NULL"),
        }
    }
}

/// Right-hand side of a predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand (IS NULL / IS NOT NULL)
    None,
    /// A single expression (binary comparisons, LIKE)
    Expr(Expr),
    /// Inclusive lower and upper bound (BETWEEN)
    Range(Value, Value),
    /// Candidate values (IN); a subquery operand is an [`Operand::Expr`]
    List(Vec<Value>),
}

/// A single comparison
///
/// Build predicates with the constructors; they always pair an operator with
/// the operand shape it needs. Hand-assembled predicates with a mismatched
/// operand are rejected when the query is planned.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Left-hand expression
    pub expr: Expr,
    /// The comparison operator
    pub operator: FilterOperator,
    /// Right-hand operand
    pub operand: Operand,
}

impl Predicate {
    /// Create a binary comparison
    pub fn compare(
        lhs: impl Into<Expr>,
        operator: FilterOperator,
        rhs: impl Into<Expr>,
    ) -> Self {
        Self {
            expr: lhs.into(),
            operator,
            operand: Operand::Expr(rhs.into()),
        }
    }

    /// Create an equality predicate (lhs = rhs)
    ///
    /// # Example
    ///
    /// ```rust
    /// use acton_query::query::{Column, Expr, Predicate};
    ///
    /// const USERNAME: Column = Column::new("member", "username");
    ///
    /// let by_name = Predicate::eq(USERNAME, "member1");
    /// let already_lower = Predicate::eq(USERNAME, Expr::lower(USERNAME));
    /// ```
    pub fn eq(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Self {
        Self::compare(lhs, FilterOperator::Equal, rhs)
    }

    /// Create a not-equal predicate (lhs != rhs)
    pub fn ne(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Self {
        Self::compare(lhs, FilterOperator::NotEqual, rhs)
    }

    /// Create a greater-than predicate (lhs > rhs)
    pub fn gt(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Self {
        Self::compare(lhs, FilterOperator::GreaterThan, rhs)
    }

    /// Create a greater-than-or-equal predicate (lhs >= rhs)
    pub fn gte(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Self {
        Self::compare(lhs, FilterOperator::GreaterThanOrEqual, rhs)
    }

    /// Create a less-than predicate (lhs < rhs)
    pub fn lt(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Self {
        Self::compare(lhs, FilterOperator::LessThan, rhs)
    }

    /// Create a less-than-or-equal predicate (lhs <= rhs)
    pub fn lte(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Self {
        Self::compare(lhs, FilterOperator::LessThanOrEqual, rhs)
    }

    /// Create an inclusive range predicate (expr BETWEEN low AND high)
    pub fn between(expr: impl Into<Expr>, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self {
            expr: expr.into(),
            operator: FilterOperator::Between,
            operand: Operand::Range(low.into(), high.into()),
        }
    }

    /// Create a LIKE pattern predicate
    pub fn like(expr: impl Into<Expr>, pattern: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            operator: FilterOperator::Like,
            operand: Operand::Expr(Expr::Literal(Value::String(pattern.into()))),
        }
    }

    /// Create a set-membership predicate. An empty list matches nothing.
    pub fn in_list<V: Into<Value>>(expr: impl Into<Expr>, values: impl IntoIterator<Item = V>) -> Self {
        Self {
            expr: expr.into(),
            operator: FilterOperator::In,
            operand: Operand::List(values.into_iter().map(Into::into).collect()),
        }
    }

    /// Create a set-membership predicate over the rows of a subquery
    pub fn in_subquery(expr: impl Into<Expr>, subquery: SubQuery) -> Self {
        Self {
            expr: expr.into(),
            operator: FilterOperator::In,
            operand: Operand::Expr(subquery.into()),
        }
    }

    /// Create an IS NULL predicate
    pub fn is_null(expr: impl Into<Expr>) -> Self {
        Self {
            expr: expr.into(),
            operator: FilterOperator::IsNull,
            operand: Operand::None,
        }
    }

    /// Create an IS NOT NULL predicate
    pub fn is_not_null(expr: impl Into<Expr>) -> Self {
        Self {
            expr: expr.into(),
            operator: FilterOperator::IsNotNull,
            operand: Operand::None,
        }
    }

    /// Whether the operand shape fits the operator
    pub fn is_well_formed(&self) -> bool {
        match self.operator {
            FilterOperator::Equal
            | FilterOperator::NotEqual
            | FilterOperator::GreaterThan
            | FilterOperator::GreaterThanOrEqual
            | FilterOperator::LessThan
            | FilterOperator::LessThanOrEqual
            | FilterOperator::Like => matches!(self.operand, Operand::Expr(_)),
            FilterOperator::Between => matches!(self.operand, Operand::Range(..)),
            FilterOperator::In => matches!(
                self.operand,
                Operand::List(_) | Operand::Expr(Expr::Subquery(_))
            ),
            FilterOperator::IsNull | FilterOperator::IsNotNull => {
                matches!(self.operand, Operand::None)
            }
        }
    }

    /// Visit every expression the predicate reads
    pub fn for_each_expr<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(&self.expr);
        if let Operand::Expr(rhs) = &self.operand {
            visit(rhs);
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operand {
            Operand::None => write!(f, "{} {}", self.expr, self.operator),
            Operand::Expr(rhs) => write!(f, "{} {} {}", self.expr, self.operator, rhs),
            Operand::Range(low, high) => {
                write!(f, "{} {} {} AND {}", self.expr, self.operator, low, high)
            }
            Operand::List(values) => {
                let rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "{} {} ({})", self.expr, self.operator, rendered.join(", "))
            }
        }
    }
}

/// Conjunction of predicates; empty means "match every row"
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterExpression {
    predicates: Vec<Predicate>,
}

impl FilterExpression {
    /// The filter that matches every row
    #[must_use]
    pub fn match_all() -> Self {
        Self::default()
    }

    /// Append a predicate with AND
    #[must_use]
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Append an optional predicate with AND; `None` leaves the filter unchanged
    #[must_use]
    pub fn and_opt(self, fragment: Option<Predicate>) -> Self {
        match fragment {
            Some(predicate) => self.and(predicate),
            None => self,
        }
    }

    /// Append every predicate of another filter
    #[must_use]
    pub fn and_all(mut self, other: FilterExpression) -> Self {
        self.predicates.extend(other.predicates);
        self
    }

    /// Whether the filter places no constraint
    pub fn is_match_all(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Number of predicates
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Same as [`is_match_all`](Self::is_match_all)
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// The predicates in the order they were added
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Visit every expression any predicate reads
    pub fn for_each_expr<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        for predicate in &self.predicates {
            predicate.for_each_expr(visit);
        }
    }
}

impl From<Predicate> for FilterExpression {
    fn from(predicate: Predicate) -> Self {
        Self::match_all().and(predicate)
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.predicates.is_empty() {
            return write!(f, "TRUE");
        }
        let rendered: Vec<String> = self.predicates.iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join(" AND "))
    }
}

/// Fold optional fragments into one filter with AND semantics.
///
/// Absent fragments are skipped; present ones are kept in order. An input with
/// no present fragment yields [`FilterExpression::match_all`].
pub fn compose<I>(fragments: I) -> FilterExpression
where
    I: IntoIterator<Item = Option<Predicate>>,
{
    fragments
        .into_iter()
        .fold(FilterExpression::match_all(), FilterExpression::and_opt)
}
