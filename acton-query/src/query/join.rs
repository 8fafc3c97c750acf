//! Entity metadata and join planning
//!
//! Entities describe themselves with a static [`EntityDef`]: table, alias,
//! declared columns and many-to-one [`Reference`]s. The [`JoinPlanner`] reads
//! every expression a query touches and decides which references to join.
//! It adds only the joins those expressions or explicit [`JoinRequest`]s need,
//! and never joins the same reference twice.
//!
//! # Example
//!
//! ```rust
//! use acton_query::query::{Column, EntityDef, Expr, FetchMode, JoinPlanner, Reference};
//!
//! static TEAM: EntityDef = EntityDef {
//!     alias: "team",
//!     table: "team",
//!     key: "id",
//!     columns: &["id", "name"],
//!     references: &[],
//! };
//! static MEMBER: EntityDef = EntityDef {
//!     alias: "member",
//!     table: "member",
//!     key: "id",
//!     columns: &["id", "username", "age", "team_id"],
//!     references: &[Reference { name: "team", foreign_key: "team_id", target: &TEAM }],
//! };
//!
//! let team_name: Expr = Column::new("team", "name").into();
//! let joins = JoinPlanner::new(&MEMBER).plan(&[], [&team_name], false).unwrap();
//! assert_eq!(joins.len(), 1);
//! assert_eq!(joins[0].fetch, FetchMode::FilterOnly);
//! ```

use std::fmt;

use tracing::debug;

use super::error::{QueryError, QueryResult};
use super::expr::{Column, Expr};
use super::filter::{FilterExpression, Predicate};
use super::subquery::validate_nested;

/// Static description of a persisted entity type
#[derive(Debug)]
pub struct EntityDef {
    /// Relation alias used by [`Column`]s of this entity when it is the query root
    pub alias: &'static str,
    /// Table name in the storage collaborator
    pub table: &'static str,
    /// Identity column, assigned by the collaborator on insert
    pub key: &'static str,
    /// Declared columns, identity and foreign keys included
    pub columns: &'static [&'static str],
    /// Many-to-one references to other entities
    pub references: &'static [Reference],
}

impl EntityDef {
    /// Whether the entity declares a column
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains(&name)
    }

    /// Column reference rooted at this entity
    pub const fn column(&self, name: &'static str) -> Column {
        Column::new(self.alias, name)
    }

    /// Look up a reference by name
    pub fn reference(&self, name: &str) -> Option<&'static Reference> {
        self.references.iter().find(|r| r.name == name)
    }

    /// Resolve a relation alias to the entity it names: the root itself or
    /// the target of one of its references.
    pub fn relation(&'static self, alias: &str) -> Option<&'static EntityDef> {
        if alias == self.alias {
            return Some(self);
        }
        self.reference(alias).map(|r| r.target)
    }

    /// Validate that a column names a declared column of a known relation
    pub fn validate_column(&'static self, column: &Column) -> QueryResult<()> {
        let Some(def) = self.relation(column.relation) else {
            return Err(QueryError::validation_failed(format!(
                "unknown relation `{}` in column {} (root `{}`)",
                column.relation, column, self.alias
            ))
            .with_entity(self.alias));
        };
        if !def.has_column(column.name) {
            return Err(QueryError::validation_failed(format!(
                "`{}` does not declare column `{}`",
                def.alias, column.name
            ))
            .with_entity(self.alias));
        }
        Ok(())
    }
}

impl PartialEq for EntityDef {
    fn eq(&self, other: &Self) -> bool {
        self.alias == other.alias && self.table == other.table
    }
}

impl Eq for EntityDef {}

/// Named, nullable many-to-one relation
#[derive(Debug)]
pub struct Reference {
    /// Relation alias used by [`Column`]s of the joined entity
    pub name: &'static str,
    /// Foreign key column on the owning entity
    pub foreign_key: &'static str,
    /// Referenced entity
    pub target: &'static EntityDef,
}

/// How a joined relation treats rows with no related entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    /// Drop rows with no related entity
    Inner,
    /// Keep rows with no related entity; related columns read as NULL
    #[default]
    Left,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inner => write!(f, "INNER JOIN"),
            Self::Left => write!(f, "LEFT JOIN"),
        }
    }
}

/// Whether a join materializes the related entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Related entity is selected and arrives loaded
    Eager,
    /// Related columns are only read by filters, projections and sort keys
    #[default]
    FilterOnly,
}

/// A join the caller asks for explicitly
///
/// Joins implied by a column reference are added by the planner on their own;
/// explicit requests exist to choose an inner join, fetch the related entity
/// eagerly, or attach an `ON` filter.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinRequest {
    /// Reference name
    pub reference: &'static str,
    /// Join kind
    pub kind: JoinKind,
    /// Fetch mode
    pub fetch: FetchMode,
    /// Extra join condition
    pub on: FilterExpression,
}

impl JoinRequest {
    /// Inner join on a reference
    pub fn inner(reference: &'static str) -> Self {
        Self {
            reference,
            kind: JoinKind::Inner,
            fetch: FetchMode::FilterOnly,
            on: FilterExpression::match_all(),
        }
    }

    /// Left join on a reference
    pub fn left(reference: &'static str) -> Self {
        Self {
            reference,
            kind: JoinKind::Left,
            fetch: FetchMode::FilterOnly,
            on: FilterExpression::match_all(),
        }
    }

    /// Materialize the related entity in the same round trip
    #[must_use]
    pub fn fetch(mut self) -> Self {
        self.fetch = FetchMode::Eager;
        self
    }

    /// Add a join condition
    #[must_use]
    pub fn on(mut self, predicate: Predicate) -> Self {
        self.on = self.on.and(predicate);
        self
    }
}

/// One planned join
#[derive(Debug, Clone, PartialEq)]
pub struct JoinDirective {
    /// The traversed reference
    pub reference: &'static Reference,
    /// Join kind
    pub kind: JoinKind,
    /// Fetch mode
    pub fetch: FetchMode,
    /// Extra join condition, match-all when none
    pub on: FilterExpression,
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.foreign_key == other.foreign_key
    }
}

impl JoinDirective {
    /// Relation alias of the joined entity
    pub fn alias(&self) -> &'static str {
        self.reference.name
    }

    /// Whether the related entity arrives loaded
    pub fn is_eager(&self) -> bool {
        self.fetch == FetchMode::Eager
    }
}

/// Decides the joins one query needs
#[derive(Debug, Clone, Copy)]
pub struct JoinPlanner {
    root: &'static EntityDef,
}

impl JoinPlanner {
    /// Planner for queries rooted at `root`
    pub fn new(root: &'static EntityDef) -> Self {
        Self { root }
    }

    /// Plan joins for a query.
    ///
    /// `exprs` are every expression the query reads (filter, projection, sort
    /// and grouping). Each column is validated against the entity metadata,
    /// and each subquery against its own entity.
    /// A reference is joined when an expression reads it or a request names
    /// it. Requests for the same reference merge: inner wins over left, eager
    /// wins over filter-only and `ON` conditions accumulate. Directives come
    /// back in reference declaration order.
    ///
    /// `entity_output` tells whether the query materializes whole entities;
    /// an eager fetch with any other output shape is a mapping error. An
    /// eager fetch cannot carry `ON` conditions, since a left fetch would
    /// then load a missing related row for a set foreign key.
    pub fn plan<'a>(
        &self,
        requests: &[JoinRequest],
        exprs: impl IntoIterator<Item = &'a Expr>,
        entity_output: bool,
    ) -> QueryResult<Vec<JoinDirective>> {
        let mut implied: Vec<&'static str> = Vec::new();
        let mut invalid: Option<QueryError> = None;
        let mut check = |column: &Column| {
            if invalid.is_some() {
                return;
            }
            match self.root.validate_column(column) {
                Ok(()) if column.relation != self.root.alias => {
                    if !implied.contains(&column.relation) {
                        implied.push(column.relation);
                    }
                }
                Ok(()) => {}
                Err(e) => invalid = Some(e),
            }
        };

        let exprs: Vec<&Expr> = exprs.into_iter().collect();
        for expr in &exprs {
            expr.for_each_column(&mut check);
        }
        for request in requests {
            request
                .on
                .for_each_expr(&mut |expr| expr.for_each_column(&mut check));
        }
        if let Some(e) = invalid {
            return Err(e);
        }

        let mut nested = Ok(());
        for expr in exprs {
            if nested.is_ok() {
                nested = validate_nested(expr);
            }
        }
        for request in requests {
            request.on.for_each_expr(&mut |expr| {
                if nested.is_ok() {
                    nested = validate_nested(expr);
                }
            });
        }
        nested.map_err(|e| e.with_entity(self.root.alias))?;

        for request in requests {
            if self.root.reference(request.reference).is_none() {
                return Err(QueryError::validation_failed(format!(
                    "`{}` has no reference named `{}`",
                    self.root.alias, request.reference
                ))
                .with_entity(self.root.alias));
            }
            if request.fetch == FetchMode::Eager && !entity_output {
                return Err(QueryError::mapping_failed(format!(
                    "fetch join on `{}` requires an entity output shape",
                    request.reference
                ))
                .with_entity(self.root.alias));
            }
        }

        let mut directives = Vec::new();
        for reference in self.root.references {
            let mut directive: Option<JoinDirective> = None;
            for request in requests.iter().filter(|r| r.reference == reference.name) {
                let merged = directive.get_or_insert_with(|| JoinDirective {
                    reference,
                    kind: request.kind,
                    fetch: request.fetch,
                    on: FilterExpression::match_all(),
                });
                if request.kind == JoinKind::Inner {
                    merged.kind = JoinKind::Inner;
                }
                if request.fetch == FetchMode::Eager {
                    merged.fetch = FetchMode::Eager;
                }
                for predicate in request.on.predicates() {
                    merged.on = std::mem::take(&mut merged.on).and(predicate.clone());
                }
            }
            if directive.is_none() && implied.contains(&reference.name) {
                directive = Some(JoinDirective {
                    reference,
                    kind: JoinKind::Left,
                    fetch: FetchMode::FilterOnly,
                    on: FilterExpression::match_all(),
                });
            }
            if let Some(directive) = directive {
                if directive.is_eager() && !directive.on.is_match_all() {
                    return Err(QueryError::validation_failed(format!(
                        "fetch join on `{}` cannot have an ON condition: {}",
                        directive.alias(),
                        directive.on
                    ))
                    .with_entity(self.root.alias));
                }
                debug!(
                    root = self.root.alias,
                    reference = directive.alias(),
                    kind = %directive.kind,
                    eager = directive.is_eager(),
                    "planned join"
                );
                directives.push(directive);
            }
        }
        Ok(directives)
    }
}
