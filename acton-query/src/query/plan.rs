//! Fully planned queries handed to the storage collaborator

use std::fmt;

use super::expr::Expr;
use super::filter::FilterExpression;
use super::join::{EntityDef, JoinDirective};
use super::projection::SelectItem;
use super::sort::{Pagination, SortSpec};

/// A validated row query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    /// Root entity
    pub root: &'static EntityDef,
    /// Joins in reference declaration order
    pub joins: Vec<JoinDirective>,
    /// WHERE conditions
    pub filter: FilterExpression,
    /// Select list; record aliases follow it
    pub select: Vec<SelectItem>,
    /// GROUP BY expressions; empty means no grouping unless the select list aggregates
    pub group_by: Vec<Expr>,
    /// ORDER BY keys
    pub sort: SortSpec,
    /// Row window, applied after sorting
    pub window: Option<Pagination>,
}

impl QueryPlan {
    /// Whether rows collapse into groups
    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty() || self.select.iter().any(|item| item.expr.is_aggregate())
    }

    /// The count query matching this plan's rows
    pub fn count_plan(&self) -> CountPlan {
        CountPlan {
            root: self.root,
            joins: self.joins.clone(),
            filter: self.filter.clone(),
            group_by: self.group_by.clone(),
            grouped: self.is_grouped(),
        }
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let select: Vec<String> = self
            .select
            .iter()
            .map(|item| format!("{} as {}", item.expr, item.alias))
            .collect();
        write!(f, "select {} from {}", select.join(", "), self.root.alias)?;
        for join in &self.joins {
            write!(f, " {} {}", join.kind, join.alias())?;
            if join.is_eager() {
                write!(f, " fetch")?;
            }
            if !join.on.is_match_all() {
                write!(f, " on {}", join.on)?;
            }
        }
        if !self.filter.is_match_all() {
            write!(f, " where {}", self.filter)?;
        }
        if !self.group_by.is_empty() {
            let group: Vec<String> = self.group_by.iter().map(ToString::to_string).collect();
            write!(f, " group by {}", group.join(", "))?;
        }
        if !self.sort.is_empty() {
            write!(f, " order by {}", self.sort)?;
        }
        if let Some(window) = self.window {
            write!(f, " {}", window)?;
        }
        Ok(())
    }
}

/// Counts the rows (or groups) a [`QueryPlan`] would return, ignoring sort
/// and window
#[derive(Debug, Clone, PartialEq)]
pub struct CountPlan {
    /// Root entity
    pub root: &'static EntityDef,
    /// Joins, same as the row query
    pub joins: Vec<JoinDirective>,
    /// WHERE conditions
    pub filter: FilterExpression,
    /// GROUP BY expressions of the row query
    pub group_by: Vec<Expr>,
    /// The row query yields one row per group; an aggregate select without
    /// GROUP BY is a single group
    pub grouped: bool,
}
