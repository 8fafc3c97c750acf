//! # acton-query
//!
//! Composable optional-predicate queries with typed projections, deterministic
//! sorting and paging over a pluggable storage collaborator.
//!
//! ## Features
//!
//! - **Predicate composition**: optional search fields become filter fragments;
//!   absent fields never constrain the result
//! - **Join planning**: references are joined only when a filter, projection,
//!   sort key or grouping reads them, or when a fetch join asks for it
//! - **Projections**: whole entities, flat DTOs, tuples and scalars
//! - **Sort and page**: multi-key sorts with explicit null placement, offset/limit
//!   windows with a total count
//! - **Storage collaborators**: an in-process [`storage::MemoryStore`] and, with
//!   the `database` feature, PostgreSQL through `sqlx`
//!
//! ## Example
//!
//! ```rust,no_run
//! use acton_query::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Load configuration
//!     let config = Config::load()?;
//!
//!     // Initialize tracing
//!     init_tracing(&config)?;
//!
//!     let repo = MemberRepository::with_executor(QueryExecutor::with_config(
//!         MemoryStore::new(),
//!         config.query,
//!     ));
//!
//!     let condition = MemberSearchCondition::default()
//!         .with_team_name("teamB")
//!         .with_age_goe(20);
//!     let page = repo
//!         .page(&condition, &SortKey::desc(member::AGE).into(), 0, 10)
//!         .await?;
//!     println!("{} of {} members", page.items.len(), page.total);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
#[cfg(feature = "database")]
pub mod database;
pub mod error;
pub mod members;
pub mod observability;
pub mod query;
pub mod storage;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, DatabaseConfig, QueryConfig, ServiceConfig};
    #[cfg(feature = "database")]
    pub use crate::database::{connect_storage, create_pool};
    pub use crate::error::{Error, Result};
    pub use crate::members::{
        member, team, Member, MemberId, MemberRepository, MemberSearchCondition, MemberTeamDto,
        NewMember, NewTeam, SearchRepository, Team, TeamId, TeamRef, MEMBER, TEAM,
    };
    pub use crate::observability::init_tracing;
    pub use crate::query::{
        compose, fragment, EntityShape, Expr, FieldsShape, FilterExpression, JoinRequest,
        NullPlacement, OrderDirection, PageResult, Predicate, Query, QueryError, QueryErrorKind,
        QueryExecutor, QueryResult, ScalarShape, SortKey, SortSpec, TupleShape, Value,
    };
    #[cfg(feature = "database")]
    pub use crate::storage::PgStorage;
    pub use crate::storage::{Assignment, MemoryStore, Persistence, Storage};
}
