//! PostgreSQL storage collaborator

use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::{Query, QueryScalar};
use sqlx::{Column as _, PgPool, Postgres, Row, TypeInfo};
use tracing::debug;

use super::{Assignment, Persistence, SqlRenderer, SqlStatement, Storage};
use crate::query::{
    CountPlan, EntityDef, FilterExpression, QueryError, QueryOperation, QueryPlan, QueryResult,
    Record, Value,
};

/// Runs planned queries against a `PgPool`
///
/// # Example
///
/// ```rust,ignore
/// use acton_query::storage::PgStorage;
///
/// let pool = acton_query::database::create_pool(&config).await?;
/// let executor = QueryExecutor::new(PgStorage::new(pool));
/// ```
#[derive(Debug, Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    /// Wrap an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn bind<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Integer(n) => query.bind(*n),
        Value::Float(n) => query.bind(*n),
        Value::String(s) => query.bind(s.clone()),
        Value::Boolean(b) => query.bind(*b),
    }
}

fn bind_scalar<'q>(
    query: QueryScalar<'q, Postgres, i64, PgArguments>,
    value: &Value,
) -> QueryScalar<'q, Postgres, i64, PgArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Integer(n) => query.bind(*n),
        Value::Float(n) => query.bind(*n),
        Value::String(s) => query.bind(s.clone()),
        Value::Boolean(b) => query.bind(*b),
    }
}

fn prepare(statement: &SqlStatement) -> Query<'_, Postgres, PgArguments> {
    statement
        .params
        .iter()
        .fold(sqlx::query(&statement.sql), bind)
}

fn prepare_scalar(statement: &SqlStatement) -> QueryScalar<'_, Postgres, i64, PgArguments> {
    statement
        .params
        .iter()
        .fold(sqlx::query_scalar(&statement.sql), bind_scalar)
}

/// Decode one column by its PostgreSQL type name
fn decode(row: &PgRow, index: usize) -> QueryResult<Value> {
    let column = &row.columns()[index];
    let type_name = column.type_info().name();
    let value: Value = match type_name {
        "INT2" => row.try_get::<Option<i16>, _>(index)?.map(i64::from).into(),
        "INT4" => row.try_get::<Option<i32>, _>(index)?.map(i64::from).into(),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.into(),
        "FLOAT4" => row.try_get::<Option<f32>, _>(index)?.map(f64::from).into(),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.into(),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => row.try_get::<Option<String>, _>(index)?.into(),
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.into(),
        other => {
            return Err(QueryError::mapping_failed(format!(
                "column `{}` has unsupported type {}",
                column.name(),
                other
            )))
        }
    };
    Ok(value)
}

fn collaborator_error(operation: QueryOperation) -> impl Fn(sqlx::Error) -> QueryError {
    move |e| QueryError::from(e).with_operation(operation)
}

impl Storage for PgStorage {
    async fn fetch(&self, plan: &QueryPlan) -> QueryResult<Vec<Record>> {
        let statement = SqlRenderer::select(plan)?;
        debug!(sql = %statement.sql, params = statement.params.len(), "postgres fetch");

        let rows = prepare(&statement)
            .fetch_all(&self.pool)
            .await
            .map_err(collaborator_error(QueryOperation::FetchList))?;

        rows.iter()
            .map(|row| {
                plan.select
                    .iter()
                    .enumerate()
                    .map(|(index, item)| Ok((item.alias.clone(), decode(row, index)?)))
                    .collect::<QueryResult<Record>>()
            })
            .collect()
    }

    async fn count(&self, plan: &CountPlan) -> QueryResult<u64> {
        let statement = SqlRenderer::count(plan)?;
        debug!(sql = %statement.sql, "postgres count");

        let count = prepare_scalar(&statement)
            .fetch_one(&self.pool)
            .await
            .map_err(collaborator_error(QueryOperation::Count))?;
        u64::try_from(count)
            .map_err(|_| QueryError::mapping_failed(format!("negative count {}", count)))
    }
}

impl Persistence for PgStorage {
    async fn insert(
        &self,
        def: &'static EntityDef,
        values: Vec<(&'static str, Value)>,
    ) -> QueryResult<i64> {
        let statement = SqlRenderer::insert(def, &values)?;
        debug!(sql = %statement.sql, "postgres insert");

        prepare_scalar(&statement)
            .fetch_one(&self.pool)
            .await
            .map_err(collaborator_error(QueryOperation::Insert))
    }

    async fn bulk_update(
        &self,
        def: &'static EntityDef,
        filter: &FilterExpression,
        assignments: &[Assignment],
    ) -> QueryResult<u64> {
        let statement = SqlRenderer::update(def, filter, assignments)?;
        debug!(sql = %statement.sql, "postgres bulk update");

        let result = prepare(&statement)
            .execute(&self.pool)
            .await
            .map_err(collaborator_error(QueryOperation::BulkUpdate))?;
        Ok(result.rows_affected())
    }

    async fn bulk_delete(
        &self,
        def: &'static EntityDef,
        filter: &FilterExpression,
    ) -> QueryResult<u64> {
        let statement = SqlRenderer::delete(def, filter)?;
        debug!(sql = %statement.sql, "postgres bulk delete");

        let result = prepare(&statement)
            .execute(&self.pool)
            .await
            .map_err(collaborator_error(QueryOperation::BulkDelete))?;
        Ok(result.rows_affected())
    }
}
