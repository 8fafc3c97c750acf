//! PostgreSQL rendering of planned queries
//!
//! Plans become parameterized SQL: identifiers are double-quoted, values
//! travel as `$n` parameters and never appear in the SQL text. NULL literals
//! render as `NULL` so parameters are always typed.
//!
//! Identity columns are expected to be `BIGINT` (`BIGSERIAL` or
//! `GENERATED ... AS IDENTITY`); inserts return the key with `RETURNING`.
//!
//! # Example
//!
//! ```rust
//! use acton_query::members::{member, MEMBER};
//! use acton_query::query::{FilterExpression, Predicate};
//! use acton_query::storage::SqlRenderer;
//!
//! let filter = FilterExpression::match_all().and(Predicate::gte(member::AGE, 20));
//! let statement = SqlRenderer::delete(&MEMBER, &filter).unwrap();
//! assert_eq!(statement.sql, r#"DELETE FROM "member" AS "member" WHERE "member"."age" >= $1"#);
//! assert_eq!(statement.params, vec![20.into()]);
//! ```

use std::fmt::Write as _;

use super::Assignment;
use crate::query::{
    Aggregate, CountPlan, EntityDef, Expr, FilterExpression, FilterOperator, JoinDirective,
    NullPlacement, Operand, OrderDirection, Predicate, QueryError, QueryOperation, QueryPlan,
    QueryResult, SubQuery, Value,
};

/// SQL text plus its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    /// SQL with `$1..$n` placeholders
    pub sql: String,
    /// Parameter values, `$1` first
    pub params: Vec<Value>,
}

/// Renders plans as PostgreSQL statements
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlRenderer;

/// Quote an identifier, doubling embedded quotes
fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

struct Writer {
    sql: String,
    params: Vec<Value>,
}

impl Writer {
    fn new() -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn param(&mut self, value: Value) {
        if value.is_null() {
            self.push("NULL");
            return;
        }
        self.params.push(value);
        // Writing to a String cannot fail
        let _ = write!(self.sql, "${}", self.params.len());
    }

    fn list<T>(
        &mut self,
        items: &[T],
        separator: &str,
        mut each: impl FnMut(&mut Self, &T) -> QueryResult<()>,
    ) -> QueryResult<()> {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(separator);
            }
            each(self, item)?;
        }
        Ok(())
    }

    fn expr(&mut self, expr: &Expr) -> QueryResult<()> {
        match expr {
            Expr::Column(column) => {
                let rendered = format!("{}.{}", quote(column.relation), quote(column.name));
                self.push(&rendered);
            }
            Expr::Literal(value) => self.param(value.clone()),
            Expr::Lower(inner) => {
                self.push("LOWER(");
                self.expr(inner)?;
                self.push(")");
            }
            Expr::Concat(parts) => {
                if parts.is_empty() {
                    self.push("''");
                    return Ok(());
                }
                self.push("(");
                self.list(parts, " || ", |w, part| w.expr(part))?;
                self.push(")");
            }
            Expr::Text(inner) => {
                self.push("CAST(");
                self.expr(inner)?;
                self.push(" AS TEXT)");
            }
            Expr::Add(lhs, rhs) => {
                self.push("(");
                self.expr(lhs)?;
                self.push(" + ");
                self.expr(rhs)?;
                self.push(")");
            }
            Expr::CountAll => self.push("COUNT(*)"),
            Expr::Replace(text, from, to) => {
                self.push("REPLACE(");
                self.expr(text)?;
                self.push(", ");
                self.expr(from)?;
                self.push(", ");
                self.expr(to)?;
                self.push(")");
            }
            Expr::Case(case) => {
                if case.branches.is_empty() {
                    return self.expr(&case.otherwise);
                }
                self.push("CASE");
                for (condition, result) in &case.branches {
                    self.push(" WHEN ");
                    self.predicate(condition)?;
                    self.push(" THEN ");
                    self.expr(result)?;
                }
                self.push(" ELSE ");
                self.expr(&case.otherwise)?;
                self.push(" END");
            }
            Expr::Subquery(subquery) => {
                self.push("(");
                self.subquery(subquery)?;
                self.push(")");
            }
            Expr::Aggregate(function, inner) => {
                let (open, close) = match function {
                    Aggregate::Count => ("COUNT(", ")"),
                    Aggregate::Sum => ("CAST(SUM(", ") AS BIGINT)"),
                    Aggregate::Avg => ("CAST(AVG(", ") AS DOUBLE PRECISION)"),
                    Aggregate::Max => ("MAX(", ")"),
                    Aggregate::Min => ("MIN(", ")"),
                };
                self.push(open);
                self.expr(inner)?;
                self.push(close);
            }
        }
        Ok(())
    }

    fn subquery(&mut self, subquery: &SubQuery) -> QueryResult<()> {
        self.push("SELECT ");
        self.expr(&subquery.select)?;
        let _ = write!(
            self.sql,
            " FROM {} AS {}",
            quote(subquery.source.table),
            quote(subquery.alias)
        );
        self.where_clause(&subquery.filter)
    }

    fn predicate(&mut self, predicate: &Predicate) -> QueryResult<()> {
        match (predicate.operator, &predicate.operand) {
            (FilterOperator::IsNull | FilterOperator::IsNotNull, Operand::None) => {
                self.expr(&predicate.expr)?;
                let _ = write!(self.sql, " {}", predicate.operator);
            }
            (FilterOperator::Between, Operand::Range(low, high)) => {
                self.expr(&predicate.expr)?;
                self.push(" BETWEEN ");
                self.param(low.clone());
                self.push(" AND ");
                self.param(high.clone());
            }
            (FilterOperator::In, Operand::List(values)) => {
                if values.is_empty() {
                    self.push("FALSE");
                    return Ok(());
                }
                self.expr(&predicate.expr)?;
                self.push(" IN (");
                self.list(values, ", ", |w, value| {
                    w.param(value.clone());
                    Ok(())
                })?;
                self.push(")");
            }
            (FilterOperator::In, Operand::Expr(rhs @ Expr::Subquery(_))) => {
                self.expr(&predicate.expr)?;
                self.push(" IN ");
                self.expr(rhs)?;
            }
            (
                operator @ (FilterOperator::Equal
                | FilterOperator::NotEqual
                | FilterOperator::GreaterThan
                | FilterOperator::GreaterThanOrEqual
                | FilterOperator::LessThan
                | FilterOperator::LessThanOrEqual
                | FilterOperator::Like),
                Operand::Expr(rhs),
            ) => {
                self.expr(&predicate.expr)?;
                let token = match operator {
                    FilterOperator::NotEqual => "<>".to_string(),
                    other => other.to_string(),
                };
                let _ = write!(self.sql, " {} ", token);
                self.expr(rhs)?;
            }
            (operator, _) => {
                return Err(QueryError::validation_failed(format!(
                    "malformed predicate for operator {}: {}",
                    operator, predicate
                )))
            }
        }
        Ok(())
    }

    fn conjunction(&mut self, filter: &FilterExpression) -> QueryResult<()> {
        self.list(filter.predicates(), " AND ", |w, p| w.predicate(p))
    }

    fn from(&mut self, root: &EntityDef, joins: &[JoinDirective]) -> QueryResult<()> {
        let _ = write!(self.sql, " FROM {} AS {}", quote(root.table), quote(root.alias));
        for join in joins {
            let target = join.reference.target;
            let _ = write!(
                self.sql,
                " {} {} AS {} ON {}.{} = {}.{}",
                join.kind,
                quote(target.table),
                quote(join.alias()),
                quote(root.alias),
                quote(join.reference.foreign_key),
                quote(join.alias()),
                quote(target.key),
            );
            if !join.on.is_match_all() {
                self.push(" AND ");
                self.conjunction(&join.on)?;
            }
        }
        Ok(())
    }

    fn where_clause(&mut self, filter: &FilterExpression) -> QueryResult<()> {
        if !filter.is_match_all() {
            self.push(" WHERE ");
            self.conjunction(filter)?;
        }
        Ok(())
    }

    fn group_by(&mut self, group_by: &[Expr]) -> QueryResult<()> {
        if !group_by.is_empty() {
            self.push(" GROUP BY ");
            self.list(group_by, ", ", |w, e| w.expr(e))?;
        }
        Ok(())
    }

    fn finish(self) -> SqlStatement {
        SqlStatement {
            sql: self.sql,
            params: self.params,
        }
    }
}

fn window_param(value: u64) -> QueryResult<Value> {
    i64::try_from(value)
        .map(Value::Integer)
        .map_err(|_| QueryError::validation_failed(format!("window value {} out of range", value)))
}

impl SqlRenderer {
    /// `SELECT ... FROM ... [JOIN ...] [WHERE ...] [GROUP BY ...] [ORDER BY ...] [LIMIT .. OFFSET ..]`
    pub fn select(plan: &QueryPlan) -> QueryResult<SqlStatement> {
        let mut w = Writer::new();
        w.push("SELECT ");
        w.list(&plan.select, ", ", |w, item| {
            w.expr(&item.expr)?;
            let _ = write!(w.sql, " AS {}", quote(&item.alias));
            Ok(())
        })?;
        w.from(plan.root, &plan.joins)?;
        w.where_clause(&plan.filter)?;
        w.group_by(&plan.group_by)?;
        if !plan.sort.is_empty() {
            w.push(" ORDER BY ");
            w.list(plan.sort.keys(), ", ", |w, key| {
                w.expr(&key.expr)?;
                w.push(match key.direction {
                    OrderDirection::Ascending => " ASC",
                    OrderDirection::Descending => " DESC",
                });
                match key.nulls {
                    Some(NullPlacement::First) => w.push(" NULLS FIRST"),
                    Some(NullPlacement::Last) => w.push(" NULLS LAST"),
                    None => {}
                }
                Ok(())
            })?;
        }
        if let Some(window) = plan.window {
            w.push(" LIMIT ");
            w.param(window_param(window.limit)?);
            w.push(" OFFSET ");
            w.param(window_param(window.offset)?);
        }
        Ok(w.finish())
    }

    /// `SELECT COUNT(*)` over the same rows; grouped plans count groups
    pub fn count(plan: &CountPlan) -> QueryResult<SqlStatement> {
        let mut w = Writer::new();
        if !plan.grouped {
            w.push("SELECT COUNT(*)");
            w.from(plan.root, &plan.joins)?;
            w.where_clause(&plan.filter)?;
        } else {
            // One inner row per group, or exactly one without GROUP BY
            w.push("SELECT COUNT(*) FROM (SELECT COUNT(*)");
            w.from(plan.root, &plan.joins)?;
            w.where_clause(&plan.filter)?;
            w.group_by(&plan.group_by)?;
            w.push(") AS \"grouped\"");
        }
        Ok(w.finish())
    }

    /// `INSERT ... RETURNING key`
    pub fn insert(def: &EntityDef, values: &[(&'static str, Value)]) -> QueryResult<SqlStatement> {
        let mut w = Writer::new();
        let _ = write!(w.sql, "INSERT INTO {}", quote(def.table));
        if values.is_empty() {
            w.push(" DEFAULT VALUES");
        } else {
            w.push(" (");
            w.list(values, ", ", |w, (column, _)| {
                w.push(&quote(column));
                Ok(())
            })?;
            w.push(") VALUES (");
            w.list(values, ", ", |w, (_, value)| {
                w.param(value.clone());
                Ok(())
            })?;
            w.push(")");
        }
        let _ = write!(w.sql, " RETURNING {}", quote(def.key));
        Ok(w.finish())
    }

    /// `UPDATE ... SET ... [WHERE ...]`
    ///
    /// The filter may only read columns of `def`.
    pub fn update(
        def: &EntityDef,
        filter: &FilterExpression,
        assignments: &[Assignment],
    ) -> QueryResult<SqlStatement> {
        if assignments.is_empty() {
            return Err(QueryError::validation_failed("bulk update needs at least one assignment")
                .with_operation(QueryOperation::BulkUpdate));
        }
        let mut w = Writer::new();
        let _ = write!(w.sql, "UPDATE {} AS {} SET ", quote(def.table), quote(def.alias));
        w.list(assignments, ", ", |w, assignment| {
            let _ = write!(w.sql, "{} = ", quote(assignment.column));
            w.expr(&assignment.value)
        })?;
        w.where_clause(filter)?;
        Ok(w.finish())
    }

    /// `DELETE FROM ... [WHERE ...]`
    pub fn delete(def: &EntityDef, filter: &FilterExpression) -> QueryResult<SqlStatement> {
        let mut w = Writer::new();
        let _ = write!(w.sql, "DELETE FROM {} AS {}", quote(def.table), quote(def.alias));
        w.where_clause(filter)?;
        Ok(w.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::members::{member, team, MEMBER, TEAM};
    use crate::query::{
        Column, FetchMode, JoinKind, Pagination, SelectItem, SortKey, SortSpec,
    };

    fn team_join(kind: JoinKind, fetch: FetchMode) -> JoinDirective {
        JoinDirective {
            reference: &MEMBER.references[0],
            kind,
            fetch,
            on: FilterExpression::match_all(),
        }
    }

    fn plan() -> QueryPlan {
        QueryPlan {
            root: &MEMBER,
            joins: Vec::new(),
            filter: FilterExpression::match_all(),
            select: vec![SelectItem::new(member::USERNAME, "username")],
            group_by: Vec::new(),
            sort: SortSpec::new(),
            window: None,
        }
    }

    #[test]
    fn test_select_with_join_filter_sort_and_window() {
        let mut plan = plan();
        plan.joins = vec![team_join(JoinKind::Left, FetchMode::FilterOnly)];
        plan.filter = FilterExpression::match_all()
            .and(Predicate::eq(team::NAME, "teamB"))
            .and(Predicate::gte(member::AGE, 20));
        plan.sort = SortSpec::new()
            .then(SortKey::desc(member::AGE))
            .then(SortKey::asc(member::USERNAME).nulls_last());
        plan.window = Some(Pagination::new(1, 2));

        let statement = SqlRenderer::select(&plan).unwrap();
        assert_eq!(
            statement.sql,
            concat!(
                r#"SELECT "member"."username" AS "username" FROM "member" AS "member" "#,
                r#"LEFT JOIN "team" AS "team" ON "member"."team_id" = "team"."id" "#,
                r#"WHERE "team"."name" = $1 AND "member"."age" >= $2 "#,
                r#"ORDER BY "member"."age" DESC, "member"."username" ASC NULLS LAST "#,
                r#"LIMIT $3 OFFSET $4"#
            )
        );
        assert_eq!(
            statement.params,
            vec!["teamB".into(), 20.into(), 2.into(), 1.into()]
        );
    }

    #[test]
    fn test_join_on_condition() {
        let mut plan = plan();
        let mut join = team_join(JoinKind::Left, FetchMode::FilterOnly);
        join.on = Predicate::eq(team::NAME, "teamA").into();
        plan.joins = vec![join];
        let sql = SqlRenderer::select(&plan).unwrap().sql;
        assert!(sql.ends_with(
            r#"LEFT JOIN "team" AS "team" ON "member"."team_id" = "team"."id" AND "team"."name" = $1"#
        ));
    }

    #[test]
    fn test_expressions() {
        let mut plan = plan();
        plan.select = vec![
            SelectItem::new(
                Expr::concat([member::USERNAME.into(), Expr::from("_"), Expr::text(member::AGE)]),
                "label",
            ),
            SelectItem::new(Expr::lower(member::USERNAME), "lower"),
            SelectItem::new(Expr::add(member::AGE, 1), "next"),
        ];
        let sql = SqlRenderer::select(&plan).unwrap().sql;
        assert!(sql.starts_with(concat!(
            r#"SELECT ("member"."username" || $1 || CAST("member"."age" AS TEXT)) AS "label", "#,
            r#"LOWER("member"."username") AS "lower", ("member"."age" + $2) AS "next""#
        )));
    }

    #[test]
    fn test_aggregates_and_group_by() {
        let mut plan = plan();
        plan.joins = vec![team_join(JoinKind::Inner, FetchMode::FilterOnly)];
        plan.select = vec![
            SelectItem::new(team::NAME, "name"),
            SelectItem::new(Expr::avg(member::AGE), "avg"),
            SelectItem::new(Expr::sum(member::AGE), "sum"),
            SelectItem::new(Expr::count_all(), "count"),
        ];
        plan.group_by = vec![team::NAME.into()];
        let sql = SqlRenderer::select(&plan).unwrap().sql;
        assert!(sql.contains(r#"CAST(AVG("member"."age") AS DOUBLE PRECISION) AS "avg""#));
        assert!(sql.contains(r#"CAST(SUM("member"."age") AS BIGINT) AS "sum""#));
        assert!(sql.contains(r#"COUNT(*) AS "count""#));
        assert!(sql.contains("INNER JOIN"));
        assert!(sql.ends_with(r#"GROUP BY "team"."name""#));
    }

    #[test]
    fn test_case_and_replace() {
        let mut plan = plan();
        plan.select = vec![
            SelectItem::new(
                Expr::case()
                    .when(Predicate::between(member::AGE, 0, 20), "0~20")
                    .otherwise("other"),
                "band",
            ),
            SelectItem::new(Expr::case_on(member::AGE).when(10, "ten").end(), "word"),
            SelectItem::new(Expr::replace(member::USERNAME, "member", "M"), "short"),
        ];
        let statement = SqlRenderer::select(&plan).unwrap();
        assert_eq!(
            statement.sql,
            concat!(
                r#"SELECT CASE WHEN "member"."age" BETWEEN $1 AND $2 THEN $3 ELSE $4 END AS "band", "#,
                r#"CASE WHEN "member"."age" = $5 THEN $6 ELSE NULL END AS "word", "#,
                r#"REPLACE("member"."username", $7, $8) AS "short" FROM "member" AS "member""#
            )
        );
        assert_eq!(
            statement.params,
            vec![
                0.into(),
                20.into(),
                "0~20".into(),
                "other".into(),
                10.into(),
                "ten".into(),
                "member".into(),
                "M".into()
            ]
        );
    }

    #[test]
    fn test_subqueries() {
        let sub_age = Column::new("member_sub", "age");
        let mut plan = plan();
        plan.filter = FilterExpression::match_all()
            .and(Predicate::gte(
                member::AGE,
                SubQuery::new(&MEMBER, "member_sub", Expr::avg(sub_age)),
            ))
            .and(Predicate::in_subquery(
                member::AGE,
                SubQuery::new(&MEMBER, "member_sub", sub_age).and(Predicate::gt(sub_age, 10)),
            ));
        let statement = SqlRenderer::select(&plan).unwrap();
        assert_eq!(
            statement.sql,
            concat!(
                r#"SELECT "member"."username" AS "username" FROM "member" AS "member" "#,
                r#"WHERE "member"."age" >= (SELECT CAST(AVG("member_sub"."age") AS DOUBLE PRECISION) "#,
                r#"FROM "member" AS "member_sub") "#,
                r#"AND "member"."age" IN (SELECT "member_sub"."age" FROM "member" AS "member_sub" "#,
                r#"WHERE "member_sub"."age" > $1)"#
            )
        );
        assert_eq!(statement.params, vec![10.into()]);
    }

    #[test]
    fn test_predicate_forms() {
        let filter = FilterExpression::match_all()
            .and(Predicate::between(member::AGE, 10, 30))
            .and(Predicate::in_list(member::AGE, [10, 20]))
            .and(Predicate::is_not_null(member::USERNAME))
            .and(Predicate::ne(member::USERNAME, "x"))
            .and(Predicate::like(member::USERNAME, "member%"));
        let statement = SqlRenderer::delete(&MEMBER, &filter).unwrap();
        assert_eq!(
            statement.sql,
            concat!(
                r#"DELETE FROM "member" AS "member" WHERE "member"."age" BETWEEN $1 AND $2 "#,
                r#"AND "member"."age" IN ($3, $4) AND "member"."username" IS NOT NULL "#,
                r#"AND "member"."username" <> $5 AND "member"."username" LIKE $6"#
            )
        );
        assert_eq!(statement.params.len(), 6);
    }

    #[test]
    fn test_empty_in_list_renders_false() {
        let filter: FilterExpression = Predicate::in_list(member::AGE, Vec::<i64>::new()).into();
        let statement = SqlRenderer::delete(&MEMBER, &filter).unwrap();
        assert!(statement.sql.ends_with("WHERE FALSE"));
        assert!(statement.params.is_empty());
    }

    #[test]
    fn test_null_literal_is_not_a_parameter() {
        let statement = SqlRenderer::insert(
            &MEMBER,
            &[("username", Value::Null), ("age", 10.into())],
        )
        .unwrap();
        assert_eq!(
            statement.sql,
            r#"INSERT INTO "member" ("username", "age") VALUES (NULL, $1) RETURNING "id""#
        );
        assert_eq!(statement.params, vec![10.into()]);
    }

    #[test]
    fn test_insert_without_values() {
        let statement = SqlRenderer::insert(&TEAM, &[]).unwrap();
        assert_eq!(statement.sql, r#"INSERT INTO "team" DEFAULT VALUES RETURNING "id""#);
    }

    #[test]
    fn test_update() {
        let statement = SqlRenderer::update(
            &MEMBER,
            &Predicate::lt(member::AGE, 28).into(),
            &[Assignment::set("age", Expr::add(member::AGE, 1))],
        )
        .unwrap();
        assert_eq!(
            statement.sql,
            r#"UPDATE "member" AS "member" SET "age" = ("member"."age" + $1) WHERE "member"."age" < $2"#
        );
        assert!(SqlRenderer::update(&MEMBER, &FilterExpression::match_all(), &[]).is_err());
    }

    #[test]
    fn test_count_plain_and_grouped() {
        let mut plan = plan();
        plan.filter = Predicate::gte(member::AGE, 20).into();
        plan.sort = SortKey::desc(member::AGE).into();
        plan.window = Some(Pagination::new(0, 2));
        let statement = SqlRenderer::count(&plan.count_plan()).unwrap();
        assert_eq!(
            statement.sql,
            r#"SELECT COUNT(*) FROM "member" AS "member" WHERE "member"."age" >= $1"#
        );

        plan.group_by = vec![member::AGE.into()];
        let sql = SqlRenderer::count(&plan.count_plan()).unwrap().sql;
        assert_eq!(
            sql,
            concat!(
                r#"SELECT COUNT(*) FROM (SELECT COUNT(*) FROM "member" AS "member" "#,
                r#"WHERE "member"."age" >= $1 GROUP BY "member"."age") AS "grouped""#
            )
        );
    }

    #[test]
    fn test_count_of_ungrouped_aggregate_is_one_row() {
        let mut plan = plan();
        plan.select = vec![
            SelectItem::new(Expr::count_all(), "count"),
            SelectItem::new(Expr::sum(member::AGE), "sum"),
        ];
        plan.filter = Predicate::gte(member::AGE, 20).into();
        let sql = SqlRenderer::count(&plan.count_plan()).unwrap().sql;
        assert_eq!(
            sql,
            concat!(
                r#"SELECT COUNT(*) FROM (SELECT COUNT(*) FROM "member" AS "member" "#,
                r#"WHERE "member"."age" >= $1) AS "grouped""#
            )
        );
    }

    #[test]
    fn test_quote_escapes_embedded_quotes() {
        assert_eq!(quote(r#"we"ird"#), r#""we""ird""#);
    }
}
