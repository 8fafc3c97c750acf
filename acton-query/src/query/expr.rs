//! Scalar values, column references and expressions
//!
//! An [`Expr`] is what predicates compare, what projections select and what
//! sort keys order by. Expressions only ever name columns through a
//! [`Column`], which pairs the relation alias (the root entity alias or a
//! reference name) with a declared column name.
//!
//! # Example
//!
//! ```rust
//! use acton_query::query::{Column, Expr, Value};
//!
//! const USERNAME: Column = Column::new("member", "username");
//! const AGE: Column = Column::new("member", "age");
//!
//! // {username}_{age}
//! let label = Expr::concat([USERNAME.into(), Expr::from("_"), Expr::text(AGE)]);
//! assert_eq!(label.relations(), vec!["member"]);
//!
//! let literal: Expr = 42_i64.into();
//! assert_eq!(literal, Expr::Literal(Value::Integer(42)));
//! ```

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{QueryError, QueryResult};
use super::filter::Predicate;
use super::subquery::SubQuery;

/// A scalar value flowing into predicates and out of rows
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL
    #[default]
    Null,
    /// 64-bit integer value
    Integer(i64),
    /// 64-bit floating point value
    Float(f64),
    /// String value
    String(String),
    /// Boolean value
    Boolean(bool),
}

impl Value {
    /// Whether this is SQL NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Compare two values the way a relational store would.
    ///
    /// Returns `None` when either side is NULL or the types are not
    /// comparable. Integers and floats compare numerically.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Integer(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Render the value as text, the way a `CAST(.. AS TEXT)` would
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Integer(n) => Some(n.to_string()),
            Self::Float(n) => Some(n.to_string()),
            Self::String(s) => Some(s.clone()),
            Self::Boolean(b) => Some(b.to_string()),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Boolean(_) => "boolean",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(n) => write!(f, "{}", n),
            Self::Float(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "'{}'", s),
            Self::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Integer(n) => n.into(),
            Value::Float(n) => n.into(),
            Value::String(s) => s.into(),
            Value::Boolean(b) => b.into(),
        }
    }
}

/// Conversion from a row [`Value`] into a Rust type
///
/// Implemented for the scalar types entities and DTOs are made of. `Option<T>`
/// maps NULL to `None`; every other target rejects NULL with a mapping error.
pub trait FromValue: Sized {
    /// Convert a borrowed value
    fn from_value(value: &Value) -> QueryResult<Self>;
}

fn type_mismatch(expected: &str, value: &Value) -> QueryError {
    QueryError::mapping_failed(format!(
        "expected {}, found {} value {}",
        expected,
        value.type_name(),
        value
    ))
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> QueryResult<Self> {
        match value {
            Value::Integer(n) => Ok(*n),
            other => Err(type_mismatch("integer", other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> QueryResult<Self> {
        let n = i64::from_value(value)?;
        i32::try_from(n)
            .map_err(|_| QueryError::mapping_failed(format!("integer {} out of range for i32", n)))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> QueryResult<Self> {
        match value {
            Value::Float(n) => Ok(*n),
            Value::Integer(n) => Ok(*n as f64),
            other => Err(type_mismatch("float", other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> QueryResult<Self> {
        match value {
            Value::String(s) => Ok(s.clone()),
            other => Err(type_mismatch("string", other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> QueryResult<Self> {
        match value {
            Value::Boolean(b) => Ok(*b),
            other => Err(type_mismatch("boolean", other)),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> QueryResult<Self> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> QueryResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// A column of the root entity or of a joined reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Column {
    /// Root entity alias or reference name
    pub relation: &'static str,
    /// Declared column name
    pub name: &'static str,
}

impl Column {
    /// Create a column reference
    pub const fn new(relation: &'static str, name: &'static str) -> Self {
        Self { relation, name }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.relation, self.name)
    }
}

/// Aggregate functions usable in projections and sort keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregate {
    /// Number of non-null values
    Count,
    /// Integer sum
    Sum,
    /// Floating point mean
    Avg,
    /// Largest value
    Max,
    /// Smallest value
    Min,
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => write!(f, "count"),
            Self::Sum => write!(f, "sum"),
            Self::Avg => write!(f, "avg"),
            Self::Max => write!(f, "max"),
            Self::Min => write!(f, "min"),
        }
    }
}

/// A scalar expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column value
    Column(Column),
    /// Constant value
    Literal(Value),
    /// Lower-cased text
    Lower(Box<Expr>),
    /// Text concatenation; NULL if any part is NULL
    Concat(Vec<Expr>),
    /// Value cast to text
    Text(Box<Expr>),
    /// Integer addition
    Add(Box<Expr>, Box<Expr>),
    /// Aggregate over the rows of a group
    Aggregate(Aggregate, Box<Expr>),
    /// Number of rows in a group
    CountAll,
    /// Text with every occurrence of a substring replaced
    Replace(Box<Expr>, Box<Expr>, Box<Expr>),
    /// First branch whose condition holds, else the fallback
    Case(Box<Case>),
    /// Scalar subquery
    Subquery(Box<SubQuery>),
}

/// Searched `CASE WHEN .. THEN .. ELSE .. END`
///
/// A simple `CASE operand WHEN value` is a searched case of `operand = value`
/// conditions; see [`Expr::case_on`].
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    /// Conditions and their results, tried in order
    pub branches: Vec<(Predicate, Expr)>,
    /// Result when no condition holds
    pub otherwise: Expr,
}

/// Builder for a searched CASE, started by [`Expr::case`]
#[derive(Debug, Clone, Default)]
pub struct CaseBuilder {
    branches: Vec<(Predicate, Expr)>,
}

impl CaseBuilder {
    /// `WHEN condition THEN result`
    #[must_use]
    pub fn when(mut self, condition: Predicate, result: impl Into<Expr>) -> Self {
        self.branches.push((condition, result.into()));
        self
    }

    /// `ELSE result END`
    pub fn otherwise(self, result: impl Into<Expr>) -> Expr {
        Expr::Case(Box::new(Case {
            branches: self.branches,
            otherwise: result.into(),
        }))
    }

    /// `END` with no ELSE; unmatched rows read NULL
    pub fn end(self) -> Expr {
        self.otherwise(Value::Null)
    }
}

/// Builder for a simple CASE, started by [`Expr::case_on`]
#[derive(Debug, Clone)]
pub struct SimpleCaseBuilder {
    operand: Expr,
    searched: CaseBuilder,
}

impl SimpleCaseBuilder {
    /// `WHEN value THEN result`
    #[must_use]
    pub fn when(mut self, value: impl Into<Expr>, result: impl Into<Expr>) -> Self {
        let condition = Predicate::eq(self.operand.clone(), value);
        self.searched = self.searched.when(condition, result);
        self
    }

    /// `ELSE result END`
    pub fn otherwise(self, result: impl Into<Expr>) -> Expr {
        self.searched.otherwise(result)
    }

    /// `END` with no ELSE
    pub fn end(self) -> Expr {
        self.searched.end()
    }
}

impl Expr {
    /// `lower(expr)`
    pub fn lower(expr: impl Into<Expr>) -> Self {
        Self::Lower(Box::new(expr.into()))
    }

    /// Concatenate parts in order
    pub fn concat(parts: impl IntoIterator<Item = Expr>) -> Self {
        Self::Concat(parts.into_iter().collect())
    }

    /// Cast to text
    pub fn text(expr: impl Into<Expr>) -> Self {
        Self::Text(Box::new(expr.into()))
    }

    /// `lhs + rhs`
    pub fn add(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Self {
        Self::Add(Box::new(lhs.into()), Box::new(rhs.into()))
    }

    /// `count(*)`
    pub fn count_all() -> Self {
        Self::CountAll
    }

    /// `count(expr)`
    pub fn count(expr: impl Into<Expr>) -> Self {
        Self::Aggregate(Aggregate::Count, Box::new(expr.into()))
    }

    /// `sum(expr)`
    pub fn sum(expr: impl Into<Expr>) -> Self {
        Self::Aggregate(Aggregate::Sum, Box::new(expr.into()))
    }

    /// `avg(expr)`
    pub fn avg(expr: impl Into<Expr>) -> Self {
        Self::Aggregate(Aggregate::Avg, Box::new(expr.into()))
    }

    /// `max(expr)`
    pub fn max(expr: impl Into<Expr>) -> Self {
        Self::Aggregate(Aggregate::Max, Box::new(expr.into()))
    }

    /// `min(expr)`
    pub fn min(expr: impl Into<Expr>) -> Self {
        Self::Aggregate(Aggregate::Min, Box::new(expr.into()))
    }

    /// `replace(text, from, to)`
    pub fn replace(
        text: impl Into<Expr>,
        from: impl Into<Expr>,
        to: impl Into<Expr>,
    ) -> Self {
        Self::Replace(
            Box::new(text.into()),
            Box::new(from.into()),
            Box::new(to.into()),
        )
    }

    /// Start a searched `CASE WHEN condition THEN ..`
    ///
    /// # Example
    ///
    /// ```rust
    /// use acton_query::query::{Column, Expr, Predicate};
    ///
    /// const AGE: Column = Column::new("member", "age");
    ///
    /// let band = Expr::case()
    ///     .when(Predicate::between(AGE, 0, 20), "0~20")
    ///     .when(Predicate::between(AGE, 21, 30), "21~30")
    ///     .otherwise("other");
    /// assert_eq!(band.relations(), vec!["member"]);
    /// ```
    pub fn case() -> CaseBuilder {
        CaseBuilder::default()
    }

    /// Start a simple `CASE operand WHEN value THEN ..`
    pub fn case_on(operand: impl Into<Expr>) -> SimpleCaseBuilder {
        SimpleCaseBuilder {
            operand: operand.into(),
            searched: CaseBuilder::default(),
        }
    }

    /// Visit the direct sub-expressions, condition operands included.
    /// Subqueries are opaque.
    pub fn for_each_child<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        match self {
            Self::Column(_) | Self::Literal(_) | Self::CountAll | Self::Subquery(_) => {}
            Self::Lower(inner) | Self::Text(inner) | Self::Aggregate(_, inner) => visit(inner),
            Self::Concat(parts) => parts.iter().for_each(|part| visit(part)),
            Self::Add(lhs, rhs) => {
                visit(lhs);
                visit(rhs);
            }
            Self::Replace(text, from, to) => {
                visit(text);
                visit(from);
                visit(to);
            }
            Self::Case(case) => {
                for (condition, result) in &case.branches {
                    condition.for_each_expr(visit);
                    visit(result);
                }
                visit(&case.otherwise);
            }
        }
    }

    /// Visit every column this expression reads, outside of subqueries
    pub fn for_each_column(&self, visit: &mut impl FnMut(&Column)) {
        if let Self::Column(column) = self {
            visit(column);
        }
        self.for_each_child(&mut |child| child.for_each_column(visit));
    }

    /// Visit every subquery this expression contains, outermost first
    pub fn for_each_subquery(&self, visit: &mut impl FnMut(&SubQuery)) {
        if let Self::Subquery(subquery) = self {
            visit(subquery);
        }
        self.for_each_child(&mut |child| child.for_each_subquery(visit));
    }

    /// Relation aliases this expression reads, deduplicated in first-seen order
    pub fn relations(&self) -> Vec<&'static str> {
        let mut relations = Vec::new();
        self.for_each_column(&mut |column| {
            if !relations.contains(&column.relation) {
                relations.push(column.relation);
            }
        });
        relations
    }

    /// Whether the expression aggregates over a group
    ///
    /// A subquery is a scalar of the outer query, even when it aggregates.
    pub fn is_aggregate(&self) -> bool {
        match self {
            Self::Aggregate(..) | Self::CountAll => true,
            Self::Subquery(_) => false,
            _ => {
                let mut aggregate = false;
                self.for_each_child(&mut |child| aggregate |= child.is_aggregate());
                aggregate
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(column) => write!(f, "{}", column),
            Self::Literal(value) => write!(f, "{}", value),
            Self::Lower(inner) => write!(f, "lower({})", inner),
            Self::Concat(parts) => {
                let rendered: Vec<String> = parts.iter().map(ToString::to_string).collect();
                write!(f, "concat({})", rendered.join(", "))
            }
            Self::Text(inner) => write!(f, "text({})", inner),
            Self::Add(lhs, rhs) => write!(f, "({} + {})", lhs, rhs),
            Self::Aggregate(function, inner) => write!(f, "{}({})", function, inner),
            Self::CountAll => write!(f, "count(*)"),
            Self::Replace(text, from, to) => write!(f, "replace({}, {}, {})", text, from, to),
            Self::Case(case) => {
                write!(f, "case")?;
                for (condition, result) in &case.branches {
                    write!(f, " when {} then {}", condition, result)?;
                }
                write!(f, " else {} end", case.otherwise)
            }
            Self::Subquery(subquery) => write!(f, "{}", subquery),
        }
    }
}

impl From<Column> for Expr {
    fn from(column: Column) -> Self {
        Self::Column(column)
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Self::Literal(s.into())
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Self::Literal(s.into())
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Self::Literal(n.into())
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Self::Literal(n.into())
    }
}

impl From<f64> for Expr {
    fn from(n: f64) -> Self {
        Self::Literal(n.into())
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Self::Literal(b.into())
    }
}
