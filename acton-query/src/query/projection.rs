//! Output shapes and row mapping
//!
//! Storage collaborators return [`Record`]s: ordered `(alias, value)` pairs,
//! one per select item. An [`OutputShape`] decides which select items a query
//! asks for and how a record becomes the caller's output type:
//!
//! - [`EntityShape`]: the root entity, with eager-fetched references loaded
//! - [`FieldsShape`]: a flat DTO whose fields are each bound to one expression
//! - [`TupleShape`]: an ordered tuple of scalars, looked up by expression
//! - [`ScalarShape`]: a single typed value per row
//!
//! # Example
//!
//! ```rust
//! use acton_query::query::{Binding, Column, FieldsShape, FromRecord, Projection, QueryResult, Record};
//!
//! struct UserDto {
//!     name: Option<String>,
//!     age: i32,
//! }
//!
//! impl FromRecord for UserDto {
//!     fn from_record(record: &Record) -> QueryResult<Self> {
//!         Ok(Self { name: record.get("name")?, age: record.get("age")? })
//!     }
//! }
//!
//! impl Projection for UserDto {
//!     const FIELDS: &'static [&'static str] = &["name", "age"];
//! }
//!
//! const USERNAME: Column = Column::new("member", "username");
//! const AGE: Column = Column::new("member", "age");
//!
//! let shape = FieldsShape::<UserDto>::new([Binding::new(USERNAME, "name"), AGE.into()]);
//! assert!(shape.is_ok());
//!
//! let unbound = FieldsShape::<UserDto>::new([AGE.into()]);
//! assert!(unbound.is_err());
//! ```

use std::marker::PhantomData;

use super::error::{QueryError, QueryResult};
use super::expr::{Column, Expr, FromValue, Value};
use super::join::{EntityDef, JoinDirective};

/// One selected expression and the name its value comes back under
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    /// Selected expression
    pub expr: Expr,
    /// Output alias
    pub alias: String,
}

impl SelectItem {
    /// Select `expr` as `alias`
    pub fn new(expr: impl Into<Expr>, alias: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            alias: alias.into(),
        }
    }
}

/// One result row: ordered `(alias, value)` pairs
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    columns: Vec<(String, Value)>,
}

impl Record {
    /// An empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column
    pub fn push(&mut self, alias: impl Into<String>, value: Value) {
        self.columns.push((alias.into(), value));
    }

    /// Append a column, builder style
    #[must_use]
    pub fn with(mut self, alias: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(alias, value.into());
        self
    }

    /// Raw value of a column
    pub fn value(&self, alias: &str) -> QueryResult<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == alias)
            .map(|(_, value)| value)
            .ok_or_else(|| QueryError::mapping_failed(format!("row has no column `{}`", alias)))
    }

    /// Typed value of a column
    pub fn get<T: FromValue>(&self, alias: &str) -> QueryResult<T> {
        T::from_value(self.value(alias)?).map_err(|e| {
            QueryError::mapping_failed(format!("column `{}`: {}", alias, e.message))
        })
    }

    /// Whether the record carries a column
    pub fn contains(&self, alias: &str) -> bool {
        self.columns.iter().any(|(name, _)| name == alias)
    }

    /// Columns selected under `prefix.`, with the prefix stripped
    pub fn nested(&self, prefix: &str) -> Record {
        let columns = self
            .columns
            .iter()
            .filter_map(|(name, value)| {
                name.strip_prefix(prefix)
                    .and_then(|rest| rest.strip_prefix('.'))
                    .map(|rest| (rest.to_string(), value.clone()))
            })
            .collect();
        Record { columns }
    }

    /// Column aliases and values in select order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the record has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// The record as a JSON object
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .columns
            .iter()
            .map(|(name, value)| (name.clone(), value.clone().into()))
            .collect();
        serde_json::Value::Object(map)
    }

    /// Values in select order
    pub fn into_values(self) -> Vec<Value> {
        self.columns.into_iter().map(|(_, value)| value).collect()
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

/// Build a value from a record
pub trait FromRecord: Sized {
    /// Read every field from the record
    fn from_record(record: &Record) -> QueryResult<Self>;
}

/// A persisted entity type
///
/// Entity records carry every declared column under its own name. Columns of
/// an eager-fetched reference arrive under `reference.column`; use
/// [`Record::nested`] to read them.
pub trait Entity: FromRecord + Send {
    /// Static metadata
    fn def() -> &'static EntityDef;
}

/// A flat DTO filled from bound expressions
pub trait Projection: FromRecord + Send {
    /// Every field the DTO reads; each must be bound exactly once
    const FIELDS: &'static [&'static str];
}

/// How a query selects columns and maps rows into outputs
pub trait OutputShape: Send + Sync {
    /// The mapped output type
    type Output: Send;

    /// Select list for a query rooted at `root` with the planned joins
    fn select(&self, root: &'static EntityDef, joins: &[JoinDirective]) -> Vec<SelectItem>;

    /// Expressions the shape reads, for join planning
    fn exprs(&self) -> Vec<&Expr>;

    /// The entity the shape materializes, if it is an entity shape
    fn entity(&self) -> Option<&'static EntityDef> {
        None
    }

    /// Convert one record
    fn map(&self, record: &Record) -> QueryResult<Self::Output>;
}

/// Map every record through a shape, failing on the first bad row
pub fn project<S: OutputShape>(shape: &S, records: &[Record]) -> QueryResult<Vec<S::Output>> {
    records.iter().map(|record| shape.map(record)).collect()
}

/// The root entity itself
#[derive(Debug)]
pub struct EntityShape<E> {
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> EntityShape<E> {
    /// Shape for entity `E`
    pub fn new() -> Self {
        Self {
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Default for EntityShape<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> OutputShape for EntityShape<E> {
    type Output = E;

    fn select(&self, root: &'static EntityDef, joins: &[JoinDirective]) -> Vec<SelectItem> {
        let mut items: Vec<SelectItem> = root
            .columns
            .iter()
            .map(|name| SelectItem::new(Column::new(root.alias, name), *name))
            .collect();
        for join in joins.iter().filter(|j| j.is_eager()) {
            let target = join.reference.target;
            items.extend(target.columns.iter().map(|name| {
                SelectItem::new(
                    Column::new(join.alias(), name),
                    format!("{}.{}", join.alias(), name),
                )
            }));
        }
        items
    }

    fn exprs(&self) -> Vec<&Expr> {
        Vec::new()
    }

    fn entity(&self) -> Option<&'static EntityDef> {
        Some(E::def())
    }

    fn map(&self, record: &Record) -> QueryResult<E> {
        E::from_record(record).map_err(|e| e.with_entity(E::def().alias))
    }
}

/// Binds one source expression to one DTO field
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    /// Source expression
    pub source: Expr,
    /// Destination field
    pub field: &'static str,
}

impl Binding {
    /// Bind `source` to `field`
    pub fn new(source: impl Into<Expr>, field: &'static str) -> Self {
        Self {
            source: source.into(),
            field,
        }
    }
}

/// A column bound to the field of the same name
impl From<Column> for Binding {
    fn from(column: Column) -> Self {
        Self::new(column, column.name)
    }
}

/// A flat DTO, one binding per field
#[derive(Debug)]
pub struct FieldsShape<T> {
    bindings: Vec<Binding>,
    _dto: PhantomData<fn() -> T>,
}

impl<T: Projection> FieldsShape<T> {
    /// Validate bindings against `T::FIELDS`.
    ///
    /// Fails with a mapping error when two bindings share a destination, a
    /// binding names a field `T` does not declare, or a declared field has no
    /// binding.
    pub fn new(bindings: impl IntoIterator<Item = Binding>) -> QueryResult<Self> {
        let bindings: Vec<Binding> = bindings.into_iter().collect();
        for (i, binding) in bindings.iter().enumerate() {
            if !T::FIELDS.contains(&binding.field) {
                return Err(QueryError::mapping_failed(format!(
                    "no destination field `{}` (expected one of {:?})",
                    binding.field,
                    T::FIELDS
                )));
            }
            if let Some(other) = bindings[..i].iter().find(|b| b.field == binding.field) {
                return Err(QueryError::mapping_failed(format!(
                    "field `{}` bound twice: {} and {}",
                    binding.field, other.source, binding.source
                )));
            }
        }
        if let Some(unbound) = T::FIELDS
            .iter()
            .find(|field| !bindings.iter().any(|b| b.field == **field))
        {
            return Err(QueryError::mapping_failed(format!(
                "field `{}` has no bound source expression",
                unbound
            )));
        }
        Ok(Self {
            bindings,
            _dto: PhantomData,
        })
    }

    /// The bindings in select order
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }
}

impl<T: Projection> OutputShape for FieldsShape<T> {
    type Output = T;

    fn select(&self, _root: &'static EntityDef, _joins: &[JoinDirective]) -> Vec<SelectItem> {
        self.bindings
            .iter()
            .map(|b| SelectItem::new(b.source.clone(), b.field))
            .collect()
    }

    fn exprs(&self) -> Vec<&Expr> {
        self.bindings.iter().map(|b| &b.source).collect()
    }

    fn map(&self, record: &Record) -> QueryResult<T> {
        T::from_record(record)
    }
}

/// Ordered tuple of scalars
#[derive(Debug, Clone, PartialEq)]
pub struct TupleShape {
    exprs: Vec<Expr>,
}

impl TupleShape {
    /// Select `exprs` in order
    pub fn new(exprs: impl IntoIterator<Item = Expr>) -> Self {
        Self {
            exprs: exprs.into_iter().collect(),
        }
    }
}

impl OutputShape for TupleShape {
    type Output = Tuple;

    fn select(&self, _root: &'static EntityDef, _joins: &[JoinDirective]) -> Vec<SelectItem> {
        self.exprs
            .iter()
            .enumerate()
            .map(|(i, expr)| SelectItem::new(expr.clone(), format!("c{}", i)))
            .collect()
    }

    fn exprs(&self) -> Vec<&Expr> {
        self.exprs.iter().collect()
    }

    fn map(&self, record: &Record) -> QueryResult<Tuple> {
        let items = self
            .exprs
            .iter()
            .enumerate()
            .map(|(i, expr)| Ok((expr.clone(), record.value(&format!("c{}", i))?.clone())))
            .collect::<QueryResult<Vec<_>>>()?;
        Ok(Tuple { items })
    }
}

/// One tuple row, in the order the expressions were requested
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    items: Vec<(Expr, Value)>,
}

impl Tuple {
    /// Typed value of the first item selected for `expr`
    pub fn get<T: FromValue>(&self, expr: &Expr) -> QueryResult<T> {
        let value = self
            .items
            .iter()
            .find(|(e, _)| e == expr)
            .map(|(_, v)| v)
            .ok_or_else(|| QueryError::mapping_failed(format!("tuple has no item {}", expr)))?;
        T::from_value(value)
    }

    /// Typed value by position
    pub fn at<T: FromValue>(&self, index: usize) -> QueryResult<T> {
        let (_, value) = self.items.get(index).ok_or_else(|| {
            QueryError::mapping_failed(format!(
                "tuple index {} out of range for {} items",
                index,
                self.items.len()
            ))
        })?;
        T::from_value(value)
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the tuple is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A single typed value per row
#[derive(Debug)]
pub struct ScalarShape<V> {
    expr: Expr,
    _value: PhantomData<fn() -> V>,
}

impl<V: FromValue + Send> ScalarShape<V> {
    /// Select one expression
    pub fn new(expr: impl Into<Expr>) -> Self {
        Self {
            expr: expr.into(),
            _value: PhantomData,
        }
    }
}

impl<V: FromValue + Send> OutputShape for ScalarShape<V> {
    type Output = V;

    fn select(&self, _root: &'static EntityDef, _joins: &[JoinDirective]) -> Vec<SelectItem> {
        vec![SelectItem::new(self.expr.clone(), "value")]
    }

    fn exprs(&self) -> Vec<&Expr> {
        vec![&self.expr]
    }

    fn map(&self, record: &Record) -> QueryResult<V> {
        record.get("value")
    }
}
