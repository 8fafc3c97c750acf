//! Storage collaborator seams
//!
//! The query core never touches data itself. It hands a planned query to a
//! [`Storage`] and interprets the records that come back. Writes, including
//! bulk update and delete, go through [`Persistence`].
//!
//! Two collaborators ship with the crate:
//!
//! - [`MemoryStore`]: in-process tables, used by tests and embedding
//! - `PgStorage` (feature `database`): PostgreSQL via `sqlx`, rendering plans
//!   with [`SqlRenderer`]
//!
//! Traits use RPITIT (Return Position Impl Trait In Traits) for async methods
//! without `async_trait`.

use std::fmt;
use std::future::Future;

use crate::query::{
    CountPlan, EntityDef, Expr, FilterExpression, QueryPlan, QueryResult, Record, Value,
};

mod memory;
#[cfg(feature = "database")]
mod postgres;
mod sql;

pub use memory::MemoryStore;
#[cfg(feature = "database")]
pub use postgres::PgStorage;
pub use sql::{SqlRenderer, SqlStatement};

/// Executes planned reads
pub trait Storage: Send + Sync {
    /// Run a row query; one record per row (or group), aliased per the select list
    fn fetch(&self, plan: &QueryPlan) -> impl Future<Output = QueryResult<Vec<Record>>> + Send;

    /// Count the rows (or groups) a query matches
    fn count(&self, plan: &CountPlan) -> impl Future<Output = QueryResult<u64>> + Send;
}

/// One `SET column = expr` of a bulk update
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Column of the updated entity
    pub column: &'static str,
    /// New value, evaluated against the row's current values
    pub value: Expr,
}

impl Assignment {
    /// `column = value`
    pub fn set(column: &'static str, value: impl Into<Expr>) -> Self {
        Self {
            column,
            value: value.into(),
        }
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.column, self.value)
    }
}

/// Writes delegated to the collaborator
///
/// Bulk operations act on stored rows directly. Entity values a caller
/// already holds are not refreshed and must be re-read.
pub trait Persistence: Send + Sync {
    /// Insert one row and return the identity the collaborator assigned
    fn insert(
        &self,
        def: &'static EntityDef,
        values: Vec<(&'static str, Value)>,
    ) -> impl Future<Output = QueryResult<i64>> + Send;

    /// Update every row of `def` matching `filter`; returns the affected row count
    fn bulk_update(
        &self,
        def: &'static EntityDef,
        filter: &FilterExpression,
        assignments: &[Assignment],
    ) -> impl Future<Output = QueryResult<u64>> + Send;

    /// Delete every row of `def` matching `filter`; returns the affected row count
    fn bulk_delete(
        &self,
        def: &'static EntityDef,
        filter: &FilterExpression,
    ) -> impl Future<Output = QueryResult<u64>> + Send;
}
