//! Query execution facade
//!
//! [`QueryExecutor`] turns a [`Query`], an [`OutputShape`] and a [`SortSpec`]
//! into one validated [`QueryPlan`], sends it to the storage collaborator and
//! maps the records it gets back. It holds no mutable state; share it freely
//! between callers.
//!
//! # Example
//!
//! ```rust
//! use acton_query::members::{member, Member, MEMBER};
//! use acton_query::query::{EntityShape, Predicate, Query, QueryExecutor, SortSpec};
//! use acton_query::storage::MemoryStore;
//!
//! let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! let executor = QueryExecutor::new(MemoryStore::new());
//!
//! let query = Query::select_from(&MEMBER).and(Predicate::gte(member::AGE, 20));
//! let members = rt
//!     .block_on(executor.fetch_list(&EntityShape::<Member>::new(), &query, &SortSpec::new()))
//!     .unwrap();
//! assert!(members.is_empty());
//! ```

use tracing::{debug, error, instrument, warn};

use super::error::{QueryError, QueryOperation, QueryResult};
use super::expr::{Expr, Value};
use super::filter::{FilterExpression, Predicate};
use super::join::{EntityDef, JoinPlanner, JoinRequest};
use super::page::PageResult;
use super::plan::QueryPlan;
use super::projection::{project, OutputShape};
use super::sort::{plan_page, Pagination, SortSpec};
use super::subquery::validate_nested;
use crate::config::QueryConfig;
use crate::storage::{Assignment, Persistence, Storage};

/// What to read: root entity, filter, joins and grouping
///
/// Immutable once built; each builder method returns a new value.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    root: &'static EntityDef,
    filter: FilterExpression,
    joins: Vec<JoinRequest>,
    group_by: Vec<Expr>,
}

impl Query {
    /// Read rows of `root`
    pub fn select_from(root: &'static EntityDef) -> Self {
        Self {
            root,
            filter: FilterExpression::match_all(),
            joins: Vec::new(),
            group_by: Vec::new(),
        }
    }

    /// AND a whole filter into the query
    #[must_use]
    pub fn filter(mut self, filter: FilterExpression) -> Self {
        self.filter = self.filter.and_all(filter);
        self
    }

    /// AND one predicate into the query
    #[must_use]
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.filter = self.filter.and(predicate);
        self
    }

    /// Request a join explicitly
    #[must_use]
    pub fn join(mut self, request: JoinRequest) -> Self {
        self.joins.push(request);
        self
    }

    /// Group rows by an expression
    #[must_use]
    pub fn group_by(mut self, expr: impl Into<Expr>) -> Self {
        self.group_by.push(expr.into());
        self
    }

    /// Root entity
    pub fn root(&self) -> &'static EntityDef {
        self.root
    }

    /// Current filter
    pub fn filter_expression(&self) -> &FilterExpression {
        &self.filter
    }
}

fn aggregate_free(filter: &FilterExpression, clause: &str) -> QueryResult<()> {
    for predicate in filter.predicates() {
        if !predicate.is_well_formed() {
            return Err(QueryError::validation_failed(format!(
                "malformed predicate in {}: {}",
                clause, predicate
            )));
        }
        let mut aggregate = false;
        predicate.for_each_expr(&mut |expr| aggregate |= expr.is_aggregate());
        if aggregate {
            return Err(QueryError::validation_failed(format!(
                "aggregate in {}: {}",
                clause, predicate
            )));
        }
    }
    Ok(())
}

/// Plans and runs queries against a storage collaborator
#[derive(Debug, Clone)]
pub struct QueryExecutor<S> {
    storage: S,
    config: QueryConfig,
}

impl<S: Storage> QueryExecutor<S> {
    /// Executor with default limits
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, QueryConfig::default())
    }

    /// Executor with explicit limits
    pub fn with_config(storage: S, config: QueryConfig) -> Self {
        Self { storage, config }
    }

    /// The storage collaborator
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Planning limits
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Validate a request and build its plan without running it.
    ///
    /// Rejects malformed predicates, aggregates in filters, unknown columns or
    /// references, and non-aggregated select items or sort keys outside the
    /// grouping. An entity shape must match the query root; an eager fetch
    /// needs an entity shape.
    pub fn plan<Sh: OutputShape>(
        &self,
        shape: &Sh,
        query: &Query,
        sort: &SortSpec,
        window: Option<Pagination>,
    ) -> QueryResult<QueryPlan> {
        let root = query.root;
        let result = self.build_plan(shape, query, sort, window);
        match &result {
            Ok(plan) => debug!(%plan, "planned query"),
            Err(e) => warn!(root = root.alias, error = %e, "rejected query"),
        }
        result.map_err(|e| if e.entity_type.is_none() { e.with_entity(root.alias) } else { e })
    }

    fn build_plan<Sh: OutputShape>(
        &self,
        shape: &Sh,
        query: &Query,
        sort: &SortSpec,
        window: Option<Pagination>,
    ) -> QueryResult<QueryPlan> {
        let root = query.root;

        if let Some(entity) = shape.entity() {
            if entity != root {
                return Err(QueryError::mapping_failed(format!(
                    "entity shape `{}` cannot map rows of `{}`",
                    entity.alias, root.alias
                )));
            }
        }

        aggregate_free(&query.filter, "filter")?;
        for request in &query.joins {
            aggregate_free(&request.on, "join condition")?;
        }

        let mut exprs = filter_exprs(&query.filter);
        exprs.extend(shape.exprs());
        exprs.extend(sort.keys().iter().map(|key| &key.expr));
        exprs.extend(query.group_by.iter());

        let joins =
            JoinPlanner::new(root).plan(&query.joins, exprs, shape.entity().is_some())?;
        let select = shape.select(root, &joins);

        let plan = QueryPlan {
            root,
            joins,
            filter: query.filter.clone(),
            select,
            group_by: query.group_by.clone(),
            sort: sort.clone(),
            window,
        };

        if plan.is_grouped() {
            let grouped = |expr: &Expr| {
                expr.is_aggregate()
                    || expr.relations().is_empty()
                    || plan.group_by.iter().any(|g| g == expr)
            };
            if let Some(item) = plan.select.iter().find(|item| !grouped(&item.expr)) {
                return Err(QueryError::validation_failed(format!(
                    "select item {} must be aggregated or appear in group by",
                    item.expr
                )));
            }
            if let Some(key) = plan.sort.keys().iter().find(|key| !grouped(&key.expr)) {
                return Err(QueryError::validation_failed(format!(
                    "sort key {} must be aggregated or appear in group by",
                    key.expr
                )));
            }
        }

        Ok(plan)
    }

    async fn run<Sh: OutputShape>(
        &self,
        shape: &Sh,
        plan: &QueryPlan,
        operation: QueryOperation,
    ) -> QueryResult<Vec<Sh::Output>> {
        let records = self.storage.fetch(plan).await.map_err(|e| {
            let e = e.with_operation(operation);
            error!(root = plan.root.alias, error = %e, "storage fetch failed");
            e
        })?;
        project(shape, &records)
    }

    /// Fetch at most one row.
    ///
    /// Fails with an ambiguous-result error when more than one row matches;
    /// narrow the filter first.
    #[instrument(skip_all, fields(root = query.root.alias))]
    pub async fn fetch_one<Sh: OutputShape>(
        &self,
        shape: &Sh,
        query: &Query,
    ) -> QueryResult<Option<Sh::Output>> {
        let plan = self.plan(shape, query, &SortSpec::new(), Some(Pagination::first_page(2)))?;
        let mut rows = self.run(shape, &plan, QueryOperation::FetchOne).await?;
        if rows.len() > 1 {
            let e = QueryError::ambiguous_result(
                QueryOperation::FetchOne,
                "more than one row matched a single-result fetch",
            )
            .with_entity(query.root.alias);
            warn!(error = %e, "ambiguous single-result fetch");
            return Err(e);
        }
        Ok(rows.pop())
    }

    /// Fetch the first row in sort order, if any
    #[instrument(skip_all, fields(root = query.root.alias))]
    pub async fn fetch_first<Sh: OutputShape>(
        &self,
        shape: &Sh,
        query: &Query,
        sort: &SortSpec,
    ) -> QueryResult<Option<Sh::Output>> {
        let plan = self.plan(shape, query, sort, Some(Pagination::first_page(1)))?;
        let rows = self.run(shape, &plan, QueryOperation::FetchFirst).await?;
        Ok(rows.into_iter().next())
    }

    /// Fetch every matching row
    #[instrument(skip_all, fields(root = query.root.alias))]
    pub async fn fetch_list<Sh: OutputShape>(
        &self,
        shape: &Sh,
        query: &Query,
        sort: &SortSpec,
    ) -> QueryResult<Vec<Sh::Output>> {
        let plan = self.plan(shape, query, sort, None)?;
        self.run(shape, &plan, QueryOperation::FetchList).await
    }

    /// Fetch one window plus the total number of matching rows.
    ///
    /// Negative `offset` or `limit` is rejected before any round trip. The
    /// limit is capped at `max_limit`. A limit of zero skips the row query but
    /// still counts. The count ignores sort and window.
    #[instrument(skip_all, fields(root = query.root.alias, offset = offset, limit = limit))]
    pub async fn fetch_page<Sh: OutputShape>(
        &self,
        shape: &Sh,
        query: &Query,
        sort: &SortSpec,
        offset: i64,
        limit: i64,
    ) -> QueryResult<PageResult<Sh::Output>> {
        let window = plan_page(offset, limit, self.config.max_limit).map_err(|e| {
            warn!(error = %e, "rejected page window");
            e.with_entity(query.root.alias)
        })?;
        let plan = self.plan(shape, query, sort, Some(window))?;

        let items = if window.limit == 0 {
            Vec::new()
        } else {
            self.run(shape, &plan, QueryOperation::FetchPage).await?
        };
        let total = self.count_plan(&plan, QueryOperation::FetchPage).await?;

        Ok(PageResult::new(items, total, window.offset, window.limit))
    }

    /// First window of `default_limit` rows
    pub async fn fetch_first_page<Sh: OutputShape>(
        &self,
        shape: &Sh,
        query: &Query,
        sort: &SortSpec,
    ) -> QueryResult<PageResult<Sh::Output>> {
        let limit = i64::try_from(self.config.default_limit).unwrap_or(i64::MAX);
        self.fetch_page(shape, query, sort, 0, limit).await
    }

    /// Count matching rows (or groups, when the query groups)
    #[instrument(skip_all, fields(root = query.root.alias))]
    pub async fn count(&self, query: &Query) -> QueryResult<u64> {
        let plan = self.build_count(query).map_err(|e| {
            warn!(error = %e, "rejected count");
            e.with_entity(query.root.alias)
        })?;
        self.count_plan(&plan, QueryOperation::Count).await
    }

    fn build_count(&self, query: &Query) -> QueryResult<QueryPlan> {
        aggregate_free(&query.filter, "filter")?;
        for request in &query.joins {
            aggregate_free(&request.on, "join condition")?;
        }
        let mut exprs = filter_exprs(&query.filter);
        exprs.extend(query.group_by.iter());
        let joins = JoinPlanner::new(query.root).plan(&query.joins, exprs, false)?;

        Ok(QueryPlan {
            root: query.root,
            joins,
            filter: query.filter.clone(),
            select: Vec::new(),
            group_by: query.group_by.clone(),
            sort: SortSpec::new(),
            window: None,
        })
    }

    async fn count_plan(&self, plan: &QueryPlan, operation: QueryOperation) -> QueryResult<u64> {
        self.storage.count(&plan.count_plan()).await.map_err(|e| {
            let e = e.with_operation(operation);
            error!(root = plan.root.alias, error = %e, "storage count failed");
            e
        })
    }
}

fn root_only<'a>(
    def: &'static EntityDef,
    exprs: impl IntoIterator<Item = &'a Expr>,
) -> QueryResult<()> {
    let mut invalid = None;
    for expr in exprs {
        expr.for_each_column(&mut |column| {
            if invalid.is_some() {
                return;
            }
            if column.relation != def.alias {
                invalid = Some(QueryError::validation_failed(format!(
                    "bulk operations may only read `{}`, found {}",
                    def.alias, column
                )));
            } else if let Err(e) = def.validate_column(column) {
                invalid = Some(e);
            }
        });
        if invalid.is_none() {
            validate_nested(expr)?;
        }
    }
    invalid.map_or(Ok(()), Err)
}

fn filter_exprs(filter: &FilterExpression) -> Vec<&Expr> {
    let mut exprs = Vec::new();
    filter.for_each_expr(&mut |expr| exprs.push(expr));
    exprs
}

impl<S: Storage + Persistence> QueryExecutor<S> {
    /// Insert a row; returns the identity the collaborator assigned
    #[instrument(skip_all, fields(entity = def.alias))]
    pub async fn insert(
        &self,
        def: &'static EntityDef,
        values: Vec<(&'static str, Value)>,
    ) -> QueryResult<i64> {
        self.storage.insert(def, values).await.map_err(|e| {
            error!(error = %e, "insert failed");
            e.with_operation(QueryOperation::Insert)
        })
    }

    /// Update every row of `def` matching `filter`.
    ///
    /// Runs directly against stored rows. Entities loaded earlier keep their
    /// old values; read them again to observe the update.
    #[instrument(skip_all, fields(entity = def.alias))]
    pub async fn bulk_update(
        &self,
        def: &'static EntityDef,
        filter: &FilterExpression,
        assignments: &[Assignment],
    ) -> QueryResult<u64> {
        let checked = aggregate_free(filter, "filter")
            .and_then(|()| {
                root_only(
                    def,
                    filter_exprs(filter)
                        .into_iter()
                        .chain(assignments.iter().map(|a| &a.value)),
                )
            })
            .and_then(|()| match assignments.iter().find(|a| a.value.is_aggregate()) {
                Some(a) => Err(QueryError::validation_failed(format!(
                    "aggregate in assignment {}",
                    a
                ))),
                None => Ok(()),
            });
        checked.map_err(|e| {
            warn!(error = %e, "rejected bulk update");
            e.with_operation(QueryOperation::BulkUpdate).with_entity(def.alias)
        })?;
        let affected = self
            .storage
            .bulk_update(def, filter, assignments)
            .await
            .map_err(|e| {
                error!(error = %e, "bulk update failed");
                e.with_operation(QueryOperation::BulkUpdate)
            })?;
        debug!(affected, "bulk update");
        Ok(affected)
    }

    /// Delete every row of `def` matching `filter`.
    ///
    /// Entities loaded earlier are not invalidated.
    #[instrument(skip_all, fields(entity = def.alias))]
    pub async fn bulk_delete(
        &self,
        def: &'static EntityDef,
        filter: &FilterExpression,
    ) -> QueryResult<u64> {
        aggregate_free(filter, "filter")
            .and_then(|()| root_only(def, filter_exprs(filter)))
            .map_err(|e| {
                warn!(error = %e, "rejected bulk delete");
                e.with_operation(QueryOperation::BulkDelete).with_entity(def.alias)
            })?;
        let affected = self.storage.bulk_delete(def, filter).await.map_err(|e| {
            error!(error = %e, "bulk delete failed");
            e.with_operation(QueryOperation::BulkDelete)
        })?;
        debug!(affected, "bulk delete");
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::members::{member, team, Member, MEMBER, TEAM};
    use crate::query::error::QueryErrorKind;
    use crate::query::projection::{EntityShape, ScalarShape, TupleShape};
    use crate::query::sort::SortKey;
    use crate::query::{Column, SubQuery};
    use crate::storage::MemoryStore;

    async fn executor() -> QueryExecutor<MemoryStore> {
        let executor = QueryExecutor::new(MemoryStore::new());
        let team_a = executor
            .insert(&TEAM, vec![("name", "teamA".into())])
            .await
            .unwrap();
        for (name, age) in [("member1", 10), ("member2", 20)] {
            executor
                .insert(
                    &MEMBER,
                    vec![
                        ("username", name.into()),
                        ("age", age.into()),
                        ("team_id", team_a.into()),
                    ],
                )
                .await
                .unwrap();
        }
        executor
    }

    #[tokio::test]
    async fn test_fetch_one_ambiguous() {
        let executor = executor().await;
        let error = executor
            .fetch_one(&EntityShape::<Member>::new(), &Query::select_from(&MEMBER))
            .await
            .unwrap_err();
        assert_eq!(error.kind, QueryErrorKind::AmbiguousResult);
        assert_eq!(error.entity_type.as_deref(), Some("member"));
    }

    #[tokio::test]
    async fn test_fetch_one_absent_and_present() {
        let executor = executor().await;
        let shape = ScalarShape::<i32>::new(member::AGE);

        let none = Query::select_from(&MEMBER).and(Predicate::eq(member::USERNAME, "nobody"));
        assert_eq!(executor.fetch_one(&shape, &none).await.unwrap(), None);

        let one = Query::select_from(&MEMBER).and(Predicate::eq(member::USERNAME, "member2"));
        assert_eq!(executor.fetch_one(&shape, &one).await.unwrap(), Some(20));
    }

    #[tokio::test]
    async fn test_fetch_first_never_ambiguous() {
        let executor = executor().await;
        let first = executor
            .fetch_first(
                &ScalarShape::<String>::new(member::USERNAME),
                &Query::select_from(&MEMBER),
                &SortKey::desc(member::AGE).into(),
            )
            .await
            .unwrap();
        assert_eq!(first.as_deref(), Some("member2"));
    }

    #[tokio::test]
    async fn test_negative_window_rejected_before_round_trip() {
        let executor = executor().await;
        let error = executor
            .fetch_page(
                &EntityShape::<Member>::new(),
                &Query::select_from(&MEMBER),
                &SortSpec::new(),
                -1,
                10,
            )
            .await
            .unwrap_err();
        assert_eq!(error.kind, QueryErrorKind::ValidationFailed);
        assert_eq!(error.operation, QueryOperation::Plan);
    }

    #[tokio::test]
    async fn test_zero_limit_still_counts() {
        let executor = executor().await;
        let page = executor
            .fetch_page(
                &EntityShape::<Member>::new(),
                &Query::select_from(&MEMBER),
                &SortSpec::new(),
                0,
                0,
            )
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 2);
        assert_eq!(page.limit, 0);
    }

    #[tokio::test]
    async fn test_limit_is_clamped() {
        let executor = QueryExecutor::with_config(
            MemoryStore::new(),
            QueryConfig {
                default_limit: 1,
                max_limit: 1,
            },
        );
        executor
            .insert(&MEMBER, vec![("username", "a".into()), ("age", 1.into())])
            .await
            .unwrap();
        executor
            .insert(&MEMBER, vec![("username", "b".into()), ("age", 2.into())])
            .await
            .unwrap();
        let page = executor
            .fetch_page(
                &ScalarShape::<String>::new(member::USERNAME),
                &Query::select_from(&MEMBER),
                &SortSpec::new(),
                0,
                50,
            )
            .await
            .unwrap();
        assert_eq!(page.limit, 1);
        assert_eq!(page.items, vec!["a".to_string()]);
        assert_eq!(page.total, 2);

        let first = executor
            .fetch_first_page(
                &ScalarShape::<String>::new(member::USERNAME),
                &Query::select_from(&MEMBER),
                &SortSpec::new(),
            )
            .await
            .unwrap();
        assert_eq!(first.limit, 1);
    }

    #[tokio::test]
    async fn test_unknown_column_rejected() {
        let executor = executor().await;
        let query = Query::select_from(&MEMBER)
            .and(Predicate::eq(crate::query::Column::new("member", "email"), "x"));
        let error = executor
            .fetch_list(&EntityShape::<Member>::new(), &query, &SortSpec::new())
            .await
            .unwrap_err();
        assert_eq!(error.kind, QueryErrorKind::ValidationFailed);
    }

    #[tokio::test]
    async fn test_aggregate_in_filter_rejected() {
        let executor = executor().await;
        let query = Query::select_from(&MEMBER).and(Predicate::gt(Expr::count_all(), 1));
        let error = executor.count(&query).await.unwrap_err();
        assert_eq!(error.kind, QueryErrorKind::ValidationFailed);
    }

    #[tokio::test]
    async fn test_ungrouped_select_item_rejected() {
        let executor = executor().await;
        let shape = TupleShape::new([member::USERNAME.into(), Expr::avg(member::AGE)]);
        let query = Query::select_from(&MEMBER).group_by(team::NAME);
        let error = executor
            .fetch_list(&shape, &query, &SortSpec::new())
            .await
            .unwrap_err();
        assert_eq!(error.kind, QueryErrorKind::ValidationFailed);
        assert!(error.message.contains("group by"));
    }

    #[tokio::test]
    async fn test_eager_fetch_with_scalar_shape_is_mapping_error() {
        let executor = executor().await;
        let query = Query::select_from(&MEMBER).join(JoinRequest::inner("team").fetch());
        let error = executor
            .fetch_list(&ScalarShape::<i64>::new(member::ID), &query, &SortSpec::new())
            .await
            .unwrap_err();
        assert_eq!(error.kind, QueryErrorKind::MappingFailed);
    }

    #[tokio::test]
    async fn test_fetch_join_with_on_condition_rejected_before_round_trip() {
        let executor = executor().await;
        let query = Query::select_from(&MEMBER)
            .join(JoinRequest::left("team").fetch().on(Predicate::eq(team::NAME, "teamA")));
        let error = executor
            .fetch_list(&EntityShape::<Member>::new(), &query, &SortSpec::new())
            .await
            .unwrap_err();
        assert_eq!(error.kind, QueryErrorKind::ValidationFailed);
        assert_eq!(error.operation, QueryOperation::Plan);
        assert_eq!(error.entity_type.as_deref(), Some("member"));
    }

    #[tokio::test]
    async fn test_entity_shape_must_match_root() {
        let executor = executor().await;
        let error = executor
            .fetch_list(
                &EntityShape::<Member>::new(),
                &Query::select_from(&TEAM),
                &SortSpec::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(error.kind, QueryErrorKind::MappingFailed);
    }

    #[tokio::test]
    async fn test_bulk_filter_must_read_root_only() {
        let executor = executor().await;
        let error = executor
            .bulk_delete(&MEMBER, &Predicate::eq(team::NAME, "teamA").into())
            .await
            .unwrap_err();
        assert_eq!(error.kind, QueryErrorKind::ValidationFailed);
        assert_eq!(error.operation, QueryOperation::BulkDelete);
    }

    #[tokio::test]
    async fn test_count_with_grouping_counts_groups() {
        let executor = executor().await;
        let query = Query::select_from(&MEMBER).group_by(team::NAME);
        assert_eq!(executor.count(&query).await.unwrap(), 1);
        assert_eq!(executor.count(&Query::select_from(&MEMBER)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_page_of_ungrouped_aggregate_counts_one_row() {
        let executor = executor().await;
        let shape = TupleShape::new([Expr::count_all(), Expr::sum(member::AGE)]);
        let page = executor
            .fetch_page(&shape, &Query::select_from(&MEMBER), &SortSpec::new(), 0, 10)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].at::<i64>(0).unwrap(), 2);
        assert_eq!(page.items[0].at::<i64>(1).unwrap(), 30);
    }

    #[tokio::test]
    async fn test_subquery_filter_and_case_projection() {
        let executor = executor().await;
        let sub_age = Column::new("member_sub", "age");
        let query = Query::select_from(&MEMBER).and(Predicate::eq(
            member::AGE,
            SubQuery::new(&MEMBER, "member_sub", Expr::max(sub_age)),
        ));
        let label = Expr::case_on(member::AGE).when(10, "ten").otherwise("other");
        let shape = TupleShape::new([member::USERNAME.into(), label.clone()]);
        let rows = executor
            .fetch_list(&shape, &query, &SortSpec::new())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].at::<String>(0).unwrap(), "member2");
        assert_eq!(rows[0].get::<String>(&label).unwrap(), "other");
    }

    #[tokio::test]
    async fn test_subquery_reading_outer_column_rejected() {
        let executor = executor().await;
        let sub_age = Column::new("member_sub", "age");
        let correlated = SubQuery::new(&MEMBER, "member_sub", Expr::max(sub_age))
            .and(Predicate::eq(sub_age, member::AGE));
        let query = Query::select_from(&MEMBER).and(Predicate::eq(member::AGE, correlated));
        let error = executor.count(&query).await.unwrap_err();
        assert_eq!(error.kind, QueryErrorKind::ValidationFailed);
        assert_eq!(error.entity_type.as_deref(), Some("member"));
    }

    #[test]
    fn test_plan_display() {
        let executor = QueryExecutor::new(MemoryStore::new());
        let query = Query::select_from(&MEMBER).and(Predicate::eq(team::NAME, "teamB"));
        let plan = executor
            .plan(
                &ScalarShape::<String>::new(member::USERNAME),
                &query,
                &SortSpec::new(),
                None,
            )
            .unwrap();
        assert_eq!(
            plan.to_string(),
            "select member.username as value from member LEFT JOIN team where team.name = 'teamB'"
        );
    }
}
