//! In-process storage collaborator
//!
//! Tables live behind a tokio `RwLock` and keep rows in insertion order, so
//! unsorted queries come back in the order rows were saved. Evaluation follows
//! SQL: comparisons with NULL are unknown, unknown filters reject the row,
//! aggregates skip NULLs and left joins read NULL for a missing related row.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use super::{Assignment, Persistence, Storage};
use crate::query::{
    Aggregate, Column, CountPlan, EntityDef, Expr, FilterExpression, FilterOperator, JoinDirective,
    JoinKind, Operand, Predicate, QueryError, QueryOperation, QueryPlan, QueryResult, Record,
    SubQuery, Value,
};

type Row = HashMap<&'static str, Value>;

/// Relation alias to the row it contributes; `None` for an unmatched left join
type Env<'a> = Vec<(&'static str, Option<&'a Row>)>;

type Tables = HashMap<&'static str, Table>;

#[derive(Debug, Default)]
struct Table {
    next_id: i64,
    rows: Vec<Row>,
}

/// In-memory tables implementing [`Storage`] and [`Persistence`]
///
/// Cloning is cheap; clones share the same tables.
///
/// # Example
///
/// ```rust
/// use acton_query::storage::{MemoryStore, Persistence};
/// use acton_query::members::TEAM;
///
/// let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// let store = MemoryStore::new();
/// let id = rt
///     .block_on(store.insert(&TEAM, vec![("name", "teamA".into())]))
///     .unwrap();
/// assert_eq!(id, 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// An empty store
    pub fn new() -> Self {
        Self::default()
    }
}

fn storage_error(message: impl Into<String>) -> QueryError {
    QueryError::database_error(QueryOperation::FetchList, message)
}

enum Scope<'s, 'a> {
    Row(&'s Env<'a>),
    Group(&'s [Env<'a>]),
}

fn lookup(env: &Env<'_>, column: &Column) -> QueryResult<Value> {
    match env.iter().find(|(alias, _)| *alias == column.relation) {
        Some((_, Some(row))) => Ok(row.get(column.name).cloned().unwrap_or_default()),
        Some((_, None)) => Ok(Value::Null),
        None => Err(storage_error(format!(
            "missing relation `{}` for column {}",
            column.relation, column
        ))),
    }
}

fn as_f64(value: &Value) -> QueryResult<f64> {
    match value {
        Value::Integer(n) => Ok(*n as f64),
        Value::Float(n) => Ok(*n),
        other => Err(storage_error(format!("{} is not numeric", other))),
    }
}

fn add(lhs: Value, rhs: Value) -> QueryResult<Value> {
    match (lhs, rhs) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Integer(a), Value::Integer(b)) => a
            .checked_add(b)
            .map(Value::Integer)
            .ok_or_else(|| storage_error("integer out of range")),
        (a, b) => Ok(Value::Float(as_f64(&a)? + as_f64(&b)?)),
    }
}

fn aggregate(
    function: Aggregate,
    inner: &Expr,
    rows: &[Env<'_>],
    tables: &Tables,
) -> QueryResult<Value> {
    let mut values = Vec::with_capacity(rows.len());
    for env in rows {
        let value = eval(inner, &Scope::Row(env), tables)?;
        if !value.is_null() {
            values.push(value);
        }
    }
    if values.is_empty() {
        return Ok(match function {
            Aggregate::Count => Value::Integer(0),
            _ => Value::Null,
        });
    }
    match function {
        Aggregate::Count => Ok(Value::Integer(values.len() as i64)),
        Aggregate::Sum => {
            if values.iter().all(|v| matches!(v, Value::Integer(_))) {
                let mut total: i64 = 0;
                for value in &values {
                    if let Value::Integer(n) = value {
                        total = total
                            .checked_add(*n)
                            .ok_or_else(|| storage_error("integer out of range in sum"))?;
                    }
                }
                Ok(Value::Integer(total))
            } else {
                let mut total = 0.0;
                for value in &values {
                    total += as_f64(value)?;
                }
                Ok(Value::Float(total))
            }
        }
        Aggregate::Avg => {
            let mut total = 0.0;
            for value in &values {
                total += as_f64(value)?;
            }
            Ok(Value::Float(total / values.len() as f64))
        }
        Aggregate::Max | Aggregate::Min => {
            let wanted = if function == Aggregate::Max {
                Ordering::Greater
            } else {
                Ordering::Less
            };
            let mut best = values[0].clone();
            for value in values.into_iter().skip(1) {
                if compare(&value, &best)? == Some(wanted) {
                    best = value;
                }
            }
            Ok(best)
        }
    }
}

fn replace(text: Value, from: Value, to: Value) -> Value {
    match (text.to_text(), from.to_text(), to.to_text()) {
        (Some(text), Some(from), _) if from.is_empty() => Value::String(text),
        (Some(text), Some(from), Some(to)) => Value::String(text.replace(&from, &to)),
        _ => Value::Null,
    }
}

/// One value per matching row, or exactly one for an aggregate select
fn subquery_values(subquery: &SubQuery, tables: &Tables) -> QueryResult<Vec<Value>> {
    let mut envs: Vec<Env<'_>> = Vec::new();
    if let Some(table) = tables.get(subquery.source.table) {
        for row in &table.rows {
            let env: Env<'_> = vec![(subquery.alias, Some(row))];
            if matches(&subquery.filter, &env, tables)? {
                envs.push(env);
            }
        }
    }
    if subquery.is_aggregate() {
        return Ok(vec![eval(&subquery.select, &Scope::Group(&envs), tables)?]);
    }
    envs.iter()
        .map(|env| eval(&subquery.select, &Scope::Row(env), tables))
        .collect()
}

fn eval(expr: &Expr, scope: &Scope<'_, '_>, tables: &Tables) -> QueryResult<Value> {
    match expr {
        Expr::Column(column) => match scope {
            Scope::Row(env) => lookup(env, column),
            Scope::Group(rows) => rows.first().map_or(Ok(Value::Null), |env| lookup(env, column)),
        },
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Lower(inner) => Ok(eval(inner, scope, tables)?
            .to_text()
            .map_or(Value::Null, |text| Value::String(text.to_lowercase()))),
        Expr::Concat(parts) => {
            let mut out = String::new();
            for part in parts {
                match eval(part, scope, tables)?.to_text() {
                    Some(text) => out.push_str(&text),
                    None => return Ok(Value::Null),
                }
            }
            Ok(Value::String(out))
        }
        Expr::Text(inner) => Ok(eval(inner, scope, tables)?
            .to_text()
            .map_or(Value::Null, Value::String)),
        Expr::Add(lhs, rhs) => add(eval(lhs, scope, tables)?, eval(rhs, scope, tables)?),
        Expr::Replace(text, from, to) => Ok(replace(
            eval(text, scope, tables)?,
            eval(from, scope, tables)?,
            eval(to, scope, tables)?,
        )),
        Expr::Case(case) => {
            for (condition, result) in &case.branches {
                if eval_predicate(condition, scope, tables)? == Some(true) {
                    return eval(result, scope, tables);
                }
            }
            eval(&case.otherwise, scope, tables)
        }
        Expr::Subquery(subquery) => {
            let mut values = subquery_values(subquery, tables)?;
            if values.len() > 1 {
                return Err(storage_error(format!(
                    "subquery {} returned {} rows where one value was expected",
                    subquery,
                    values.len()
                )));
            }
            Ok(values.pop().unwrap_or_default())
        }
        Expr::CountAll => match scope {
            Scope::Group(rows) => Ok(Value::Integer(rows.len() as i64)),
            Scope::Row(_) => Err(storage_error(format!("aggregate {} outside a group", expr))),
        },
        Expr::Aggregate(function, inner) => match scope {
            Scope::Group(rows) => aggregate(*function, inner, rows, tables),
            Scope::Row(_) => Err(storage_error(format!("aggregate {} outside a group", expr))),
        },
    }
}

fn compare(a: &Value, b: &Value) -> QueryResult<Option<Ordering>> {
    if a.is_null() || b.is_null() {
        return Ok(None);
    }
    a.compare(b)
        .map(Some)
        .ok_or_else(|| storage_error(format!("cannot compare {} with {}", a, b)))
}

fn like(text: &[char], pattern: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('%', rest)) => (0..=text.len()).any(|i| like(&text[i..], rest)),
        Some(('_', rest)) => !text.is_empty() && like(&text[1..], rest),
        Some(('\\', rest)) if !rest.is_empty() => {
            text.first() == Some(&rest[0]) && like(&text[1..], &rest[1..])
        }
        Some((c, rest)) => text.first() == Some(c) && like(&text[1..], rest),
    }
}

fn holds(operator: FilterOperator, ordering: Ordering) -> bool {
    match operator {
        FilterOperator::Equal => ordering == Ordering::Equal,
        FilterOperator::NotEqual => ordering != Ordering::Equal,
        FilterOperator::GreaterThan => ordering == Ordering::Greater,
        FilterOperator::GreaterThanOrEqual => ordering != Ordering::Less,
        FilterOperator::LessThan => ordering == Ordering::Less,
        FilterOperator::LessThanOrEqual => ordering != Ordering::Greater,
        _ => false,
    }
}

/// SQL `IN`: true on a match, unknown if any comparison was unknown
fn in_values(lhs: &Value, values: &[Value]) -> QueryResult<Option<bool>> {
    if values.is_empty() {
        return Ok(Some(false));
    }
    let mut unknown = false;
    for value in values {
        match compare(lhs, value)? {
            Some(Ordering::Equal) => return Ok(Some(true)),
            None => unknown = true,
            Some(_) => {}
        }
    }
    Ok(if unknown { None } else { Some(false) })
}

/// Three-valued predicate result; `None` is SQL unknown
fn eval_predicate(
    predicate: &Predicate,
    scope: &Scope<'_, '_>,
    tables: &Tables,
) -> QueryResult<Option<bool>> {
    let lhs = eval(&predicate.expr, scope, tables)?;
    match (predicate.operator, &predicate.operand) {
        (FilterOperator::IsNull, Operand::None) => Ok(Some(lhs.is_null())),
        (FilterOperator::IsNotNull, Operand::None) => Ok(Some(!lhs.is_null())),
        (FilterOperator::Between, Operand::Range(low, high)) => {
            match (compare(&lhs, low)?, compare(&lhs, high)?) {
                (Some(lower), Some(upper)) => {
                    Ok(Some(lower != Ordering::Less && upper != Ordering::Greater))
                }
                _ => Ok(None),
            }
        }
        (FilterOperator::In, Operand::List(values)) => in_values(&lhs, values),
        (FilterOperator::In, Operand::Expr(Expr::Subquery(subquery))) => {
            in_values(&lhs, &subquery_values(subquery, tables)?)
        }
        (FilterOperator::Like, Operand::Expr(pattern)) => {
            match (lhs.to_text(), eval(pattern, scope, tables)?.to_text()) {
                (Some(text), Some(pattern)) => {
                    let text: Vec<char> = text.chars().collect();
                    let pattern: Vec<char> = pattern.chars().collect();
                    Ok(Some(like(&text, &pattern)))
                }
                _ => Ok(None),
            }
        }
        (
            operator @ (FilterOperator::Equal
            | FilterOperator::NotEqual
            | FilterOperator::GreaterThan
            | FilterOperator::GreaterThanOrEqual
            | FilterOperator::LessThan
            | FilterOperator::LessThanOrEqual),
            Operand::Expr(rhs),
        ) => {
            let rhs = eval(rhs, scope, tables)?;
            Ok(compare(&lhs, &rhs)?.map(|ordering| holds(operator, ordering)))
        }
        (operator, _) => Err(storage_error(format!(
            "malformed predicate for operator {}: {}",
            operator, predicate
        ))),
    }
}

fn matches(filter: &FilterExpression, env: &Env<'_>, tables: &Tables) -> QueryResult<bool> {
    for predicate in filter.predicates() {
        if eval_predicate(predicate, &Scope::Row(env), tables)? != Some(true) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn join_rows<'a>(
    tables: &'a Tables,
    root: &'static EntityDef,
    joins: &[JoinDirective],
) -> QueryResult<Vec<Env<'a>>> {
    let Some(table) = tables.get(root.table) else {
        return Ok(Vec::new());
    };
    let mut envs = Vec::with_capacity(table.rows.len());
    'rows: for row in &table.rows {
        let mut env: Env<'a> = vec![(root.alias, Some(row))];
        for join in joins {
            let reference = join.reference;
            let candidate = match row.get(reference.foreign_key) {
                Some(key) if !key.is_null() => tables.get(reference.target.table).and_then(|t| {
                    t.rows
                        .iter()
                        .find(|r| r.get(reference.target.key) == Some(key))
                }),
                _ => None,
            };
            let related = match candidate {
                Some(related) => {
                    let mut candidate_env = env.clone();
                    candidate_env.push((join.alias(), Some(related)));
                    if matches(&join.on, &candidate_env, tables)? {
                        Some(related)
                    } else {
                        None
                    }
                }
                None => None,
            };
            if related.is_none() && join.kind == JoinKind::Inner {
                continue 'rows;
            }
            env.push((join.alias(), related));
        }
        envs.push(env);
    }
    Ok(envs)
}

fn filter_rows<'a>(
    envs: Vec<Env<'a>>,
    filter: &FilterExpression,
    tables: &Tables,
) -> QueryResult<Vec<Env<'a>>> {
    let mut kept = Vec::with_capacity(envs.len());
    for env in envs {
        if matches(filter, &env, tables)? {
            kept.push(env);
        }
    }
    Ok(kept)
}

/// Partition rows by the grouping key, groups in first-seen order.
/// Without grouping keys every row (possibly none) forms a single group.
fn group<'a>(
    envs: Vec<Env<'a>>,
    group_by: &[Expr],
    tables: &Tables,
) -> QueryResult<Vec<Vec<Env<'a>>>> {
    if group_by.is_empty() {
        return Ok(vec![envs]);
    }
    let mut groups: Vec<(Vec<Value>, Vec<Env<'a>>)> = Vec::new();
    for env in envs {
        let key = group_by
            .iter()
            .map(|expr| eval(expr, &Scope::Row(&env), tables))
            .collect::<QueryResult<Vec<_>>>()?;
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(env),
            None => groups.push((key, vec![env])),
        }
    }
    Ok(groups.into_iter().map(|(_, members)| members).collect())
}

fn project_row(
    plan: &QueryPlan,
    scope: &Scope<'_, '_>,
    tables: &Tables,
) -> QueryResult<(Vec<Value>, Record)> {
    let keys = plan
        .sort
        .keys()
        .iter()
        .map(|key| eval(&key.expr, scope, tables))
        .collect::<QueryResult<Vec<_>>>()?;
    let record = plan
        .select
        .iter()
        .map(|item| Ok((item.alias.clone(), eval(&item.expr, scope, tables)?)))
        .collect::<QueryResult<Record>>()?;
    Ok((keys, record))
}

fn window_bounds(offset: u64, limit: u64) -> (usize, usize) {
    (
        usize::try_from(offset).unwrap_or(usize::MAX),
        usize::try_from(limit).unwrap_or(usize::MAX),
    )
}

fn check_columns<'c>(
    def: &'static EntityDef,
    columns: impl IntoIterator<Item = &'c &'static str>,
    operation: QueryOperation,
) -> QueryResult<()> {
    for column in columns {
        if !def.has_column(column) || *column == def.key {
            return Err(QueryError::validation_failed(format!(
                "`{}` has no writable column `{}`",
                def.alias, column
            ))
            .with_operation(operation)
            .with_entity(def.alias));
        }
    }
    Ok(())
}

impl Storage for MemoryStore {
    async fn fetch(&self, plan: &QueryPlan) -> QueryResult<Vec<Record>> {
        let tables = self.tables.read().await;
        let envs = filter_rows(
            join_rows(&tables, plan.root, &plan.joins)?,
            &plan.filter,
            &tables,
        )?;

        let mut rows = if plan.is_grouped() {
            group(envs, &plan.group_by, &tables)?
                .iter()
                .map(|members| project_row(plan, &Scope::Group(members), &tables))
                .collect::<QueryResult<Vec<_>>>()?
        } else {
            envs.iter()
                .map(|env| project_row(plan, &Scope::Row(env), &tables))
                .collect::<QueryResult<Vec<_>>>()?
        };

        // Stable, so ties keep insertion order
        rows.sort_by(|(a, _), (b, _)| plan.sort.compare_rows(a, b));

        let (skip, take) = plan
            .window
            .map_or((0, usize::MAX), |w| window_bounds(w.offset, w.limit));
        let records: Vec<Record> = rows
            .into_iter()
            .map(|(_, record)| record)
            .skip(skip)
            .take(take)
            .collect();

        debug!(root = plan.root.alias, rows = records.len(), "memory fetch");
        Ok(records)
    }

    async fn count(&self, plan: &CountPlan) -> QueryResult<u64> {
        let tables = self.tables.read().await;
        let envs = filter_rows(
            join_rows(&tables, plan.root, &plan.joins)?,
            &plan.filter,
            &tables,
        )?;
        let count = if plan.grouped {
            group(envs, &plan.group_by, &tables)?.len()
        } else {
            envs.len()
        };
        debug!(root = plan.root.alias, count, "memory count");
        Ok(count as u64)
    }
}

impl Persistence for MemoryStore {
    async fn insert(
        &self,
        def: &'static EntityDef,
        values: Vec<(&'static str, Value)>,
    ) -> QueryResult<i64> {
        check_columns(def, values.iter().map(|(column, _)| column), QueryOperation::Insert)?;

        let mut tables = self.tables.write().await;
        for reference in def.references {
            let Some((_, key)) = values.iter().find(|(c, _)| *c == reference.foreign_key) else {
                continue;
            };
            if key.is_null() {
                continue;
            }
            let exists = tables.get(reference.target.table).is_some_and(|t| {
                t.rows
                    .iter()
                    .any(|r| r.get(reference.target.key) == Some(key))
            });
            if !exists {
                return Err(QueryError::constraint_violation(
                    QueryOperation::Insert,
                    format!(
                        "{}.{} = {} has no matching `{}` row",
                        def.alias, reference.foreign_key, key, reference.target.alias
                    ),
                )
                .with_entity(def.alias));
            }
        }

        let table = tables.entry(def.table).or_default();
        table.next_id += 1;
        let id = table.next_id;

        let mut row: Row = def.columns.iter().map(|c| (*c, Value::Null)).collect();
        row.insert(def.key, Value::Integer(id));
        row.extend(values);
        table.rows.push(row);

        debug!(entity = def.alias, id, "memory insert");
        Ok(id)
    }

    async fn bulk_update(
        &self,
        def: &'static EntityDef,
        filter: &FilterExpression,
        assignments: &[Assignment],
    ) -> QueryResult<u64> {
        check_columns(
            def,
            assignments.iter().map(|a| &a.column),
            QueryOperation::BulkUpdate,
        )?;

        let mut tables = self.tables.write().await;
        let Some(table) = tables.get(def.table) else {
            return Ok(0);
        };

        // Evaluate every assignment against pre-update values before writing
        let mut updates = Vec::new();
        for (index, row) in table.rows.iter().enumerate() {
            let env: Env<'_> = vec![(def.alias, Some(row))];
            if !matches(filter, &env, &tables)? {
                continue;
            }
            let values = assignments
                .iter()
                .map(|a| Ok((a.column, eval(&a.value, &Scope::Row(&env), &tables)?)))
                .collect::<QueryResult<Vec<_>>>()?;
            updates.push((index, values));
        }

        let affected = updates.len() as u64;
        if let Some(table) = tables.get_mut(def.table) {
            for (index, values) in updates {
                if let Some(row) = table.rows.get_mut(index) {
                    row.extend(values);
                }
            }
        }

        debug!(entity = def.alias, affected, "memory bulk update");
        Ok(affected)
    }

    async fn bulk_delete(
        &self,
        def: &'static EntityDef,
        filter: &FilterExpression,
    ) -> QueryResult<u64> {
        let mut tables = self.tables.write().await;
        let Some(table) = tables.get(def.table) else {
            return Ok(0);
        };

        let doomed = table
            .rows
            .iter()
            .map(|row| matches(filter, &vec![(def.alias, Some(row))], &tables))
            .collect::<QueryResult<Vec<bool>>>()?;
        let affected = doomed.iter().filter(|d| **d).count() as u64;

        if let Some(table) = tables.get_mut(def.table) {
            let mut flags = doomed.into_iter();
            table.rows.retain(|_| !flags.next().unwrap_or(false));
        }

        debug!(entity = def.alias, affected, "memory bulk delete");
        Ok(affected)
    }
}
