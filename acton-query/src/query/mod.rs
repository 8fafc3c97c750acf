//! Query composition, planning and execution
//!
//! A read is described by three independent parts:
//!
//! - a [`Query`]: root entity, [`FilterExpression`], explicit joins and grouping
//! - an [`OutputShape`]: whole entities, DTO fields, tuples or a scalar
//! - a [`SortSpec`] and, for paged reads, an offset and limit
//!
//! [`QueryExecutor`] validates them together into a [`QueryPlan`], asks the
//! storage collaborator for records and maps them into the requested shape.
//!
//! Optional search criteria become filters through [`fragment`] helpers, which
//! return `None` for absent criteria, and [`compose`], which drops the `None`s:
//!
//! ```rust
//! use acton_query::members::{member, team};
//! use acton_query::query::{compose, fragment};
//!
//! let filter = compose([
//!     fragment::text_eq(member::USERNAME, None),
//!     fragment::text_eq(team::NAME, Some("teamB")),
//!     fragment::goe(member::AGE, Some(31)),
//!     fragment::loe(member::AGE, None::<i32>),
//! ]);
//! assert_eq!(filter.len(), 2);
//! ```

mod error;
mod executor;
mod expr;
mod filter;
pub mod fragment;
mod join;
mod page;
mod plan;
mod projection;
mod sort;
mod subquery;

pub use error::{QueryError, QueryErrorKind, QueryOperation, QueryResult};
pub use executor::{Query, QueryExecutor};
pub use expr::{Aggregate, Case, CaseBuilder, Column, Expr, FromValue, SimpleCaseBuilder, Value};
pub use filter::{compose, FilterExpression, FilterOperator, Operand, Predicate};
pub use join::{
    EntityDef, FetchMode, JoinDirective, JoinKind, JoinPlanner, JoinRequest, Reference,
};
pub use page::PageResult;
pub use plan::{CountPlan, QueryPlan};
pub use projection::{
    project, Binding, Entity, EntityShape, FieldsShape, FromRecord, OutputShape, Projection,
    Record, ScalarShape, SelectItem, Tuple, TupleShape,
};
pub use sort::{plan_page, NullPlacement, OrderDirection, Pagination, SortKey, SortSpec};
pub use subquery::SubQuery;
