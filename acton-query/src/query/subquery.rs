//! Uncorrelated subqueries
//!
//! A [`SubQuery`] ranges over one entity under its own alias and selects a
//! single expression. As an [`Expr`] it is a scalar: an aggregate select
//! yields exactly one value, any other select must match at most one row
//! (none reads as NULL). As the right-hand side of
//! [`Predicate::in_subquery`](super::Predicate::in_subquery) it yields the
//! candidate set.
//!
//! Subqueries are self-contained: every column they read must belong to their
//! own alias.
//!
//! # Example
//!
//! ```rust
//! use acton_query::members::{member, MEMBER};
//! use acton_query::query::{Column, Expr, Predicate, SubQuery};
//!
//! const SUB_AGE: Column = Column::new("member_sub", "age");
//!
//! // members whose age is the maximum age
//! let oldest = Predicate::eq(
//!     member::AGE,
//!     SubQuery::new(&MEMBER, "member_sub", Expr::max(SUB_AGE)),
//! );
//! assert_eq!(
//!     oldest.to_string(),
//!     "member.age = (select max(member_sub.age) from member member_sub)"
//! );
//! ```

use std::fmt;

use super::error::{QueryError, QueryResult};
use super::expr::{Column, Expr};
use super::filter::{FilterExpression, Predicate};
use super::join::EntityDef;

/// A single-expression select over one entity
#[derive(Debug, Clone, PartialEq)]
pub struct SubQuery {
    /// Entity the subquery reads
    pub source: &'static EntityDef,
    /// Relation alias for the subquery's columns; distinct from the outer query's
    pub alias: &'static str,
    /// The selected expression
    pub select: Expr,
    /// WHERE conditions, reading `alias` columns only
    pub filter: FilterExpression,
}

impl SubQuery {
    /// Select `select` from every row of `source`, aliased as `alias`
    pub fn new(source: &'static EntityDef, alias: &'static str, select: impl Into<Expr>) -> Self {
        Self {
            source,
            alias,
            select: select.into(),
            filter: FilterExpression::match_all(),
        }
    }

    /// AND a predicate into the subquery's filter
    #[must_use]
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.filter = self.filter.and(predicate);
        self
    }

    /// Column of the subquery's relation
    pub const fn column(&self, name: &'static str) -> Column {
        Column::new(self.alias, name)
    }

    /// Whether the select collapses every row into one value
    pub fn is_aggregate(&self) -> bool {
        self.select.is_aggregate()
    }

    /// Check columns, predicate shapes and nested subqueries
    pub fn validate(&self) -> QueryResult<()> {
        let mut invalid: Option<QueryError> = None;
        let mut check = |column: &Column| {
            if invalid.is_some() {
                return;
            }
            if column.relation != self.alias {
                invalid = Some(QueryError::validation_failed(format!(
                    "subquery over `{}` reads {}; only `{}` columns are in scope",
                    self.source.alias, column, self.alias
                )));
            } else if !self.source.has_column(column.name) {
                invalid = Some(QueryError::validation_failed(format!(
                    "`{}` does not declare column `{}`",
                    self.source.alias, column.name
                )));
            }
        };
        self.select.for_each_column(&mut check);
        self.filter
            .for_each_expr(&mut |expr| expr.for_each_column(&mut check));
        if let Some(e) = invalid {
            return Err(e);
        }

        for predicate in self.filter.predicates() {
            if !predicate.is_well_formed() {
                return Err(QueryError::validation_failed(format!(
                    "malformed predicate in subquery: {}",
                    predicate
                )));
            }
            let mut aggregate = false;
            predicate.for_each_expr(&mut |expr| aggregate |= expr.is_aggregate());
            if aggregate {
                return Err(QueryError::validation_failed(format!(
                    "aggregate in subquery filter: {}",
                    predicate
                )));
            }
        }

        validate_nested(&self.select)?;
        let mut result = Ok(());
        self.filter.for_each_expr(&mut |expr| {
            if result.is_ok() {
                result = validate_nested(expr);
            }
        });
        result
    }
}

/// Validate every subquery `expr` contains
pub(crate) fn validate_nested(expr: &Expr) -> QueryResult<()> {
    let mut result = Ok(());
    expr.for_each_subquery(&mut |sub| {
        if result.is_ok() {
            result = sub.validate();
        }
    });
    result
}

impl fmt::Display for SubQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(select {} from {} {}",
            self.select, self.source.alias, self.alias
        )?;
        if !self.filter.is_match_all() {
            write!(f, " where {}", self.filter)?;
        }
        write!(f, ")")
    }
}

impl From<SubQuery> for Expr {
    fn from(subquery: SubQuery) -> Self {
        Self::Subquery(Box::new(subquery))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::members::{member, MEMBER};
    use crate::query::error::QueryErrorKind;

    const SUB_AGE: Column = Column::new("member_sub", "age");

    #[test]
    fn test_display_with_filter() {
        let sub = SubQuery::new(&MEMBER, "member_sub", SUB_AGE).and(Predicate::gt(SUB_AGE, 10));
        assert_eq!(
            sub.to_string(),
            "(select member_sub.age from member member_sub where member_sub.age > 10)"
        );
        assert!(!sub.is_aggregate());
        assert!(Expr::from(sub).relations().is_empty());
    }

    #[test]
    fn test_column_uses_subquery_alias() {
        let sub = SubQuery::new(&MEMBER, "member_sub", Expr::avg(SUB_AGE));
        assert_eq!(sub.column("age"), SUB_AGE);
        assert!(sub.is_aggregate());
        assert!(sub.validate().is_ok());
    }

    #[test]
    fn test_outer_column_is_rejected() {
        let correlated = SubQuery::new(&MEMBER, "member_sub", Expr::max(SUB_AGE))
            .and(Predicate::eq(SUB_AGE, member::AGE));
        let error = correlated.validate().unwrap_err();
        assert_eq!(error.kind, QueryErrorKind::ValidationFailed);
        assert!(error.message.contains("member.age"));
    }

    #[test]
    fn test_undeclared_column_is_rejected() {
        let sub = SubQuery::new(&MEMBER, "member_sub", Column::new("member_sub", "email"));
        assert!(sub.validate().unwrap_err().message.contains("email"));
    }

    #[test]
    fn test_nested_subquery_is_validated() {
        let inner = SubQuery::new(&MEMBER, "inner_sub", Expr::max(Column::new("inner_sub", "city")));
        let outer = SubQuery::new(&MEMBER, "member_sub", SUB_AGE).and(Predicate::eq(SUB_AGE, inner));
        assert!(outer.validate().unwrap_err().message.contains("city"));
    }

    #[test]
    fn test_aggregate_filter_is_rejected() {
        let sub = SubQuery::new(&MEMBER, "member_sub", SUB_AGE)
            .and(Predicate::gt(Expr::count_all(), 1));
        assert!(sub.validate().unwrap_err().message.contains("aggregate"));
    }
}
