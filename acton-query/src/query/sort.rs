//! Sort keys, null placement and page windows
//!
//! A [`SortSpec`] is an ordered list of [`SortKey`]s; rows that tie on one key
//! are ordered by the next. [`Pagination`] is the offset/limit window, and
//! [`plan_page`] validates caller-supplied values into one.
//!
//! # Example
//!
//! ```rust
//! use acton_query::query::{Column, SortKey, SortSpec};
//!
//! const AGE: Column = Column::new("member", "age");
//! const USERNAME: Column = Column::new("member", "username");
//!
//! let sort = SortSpec::new()
//!     .then(SortKey::desc(AGE))
//!     .then(SortKey::asc(USERNAME).nulls_last());
//! assert_eq!(sort.to_string(), "member.age desc, member.username asc nulls last");
//! ```

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{QueryError, QueryResult};
use super::expr::{Expr, Value};

/// Direction for ordering results
///
/// # Example
///
/// ```rust
/// use acton_query::query::OrderDirection;
///
/// assert_eq!(format!("{}", OrderDirection::Ascending), "asc");
/// assert_eq!(format!("{}", OrderDirection::Descending), "desc");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    /// Sort in ascending order (A-Z, 0-9)
    #[default]
    #[serde(alias = "asc")]
    Ascending,
    /// Sort in descending order (Z-A, 9-0)
    #[serde(alias = "desc")]
    Descending,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

/// Where NULL values sort relative to non-null values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullPlacement {
    /// NULLs before every non-null value
    First,
    /// NULLs after every non-null value
    Last,
}

impl NullPlacement {
    /// Placement a PostgreSQL-style store uses when none is requested:
    /// NULL is the largest value, so last ascending and first descending.
    pub fn native(direction: OrderDirection) -> Self {
        match direction {
            OrderDirection::Ascending => Self::Last,
            OrderDirection::Descending => Self::First,
        }
    }
}

impl fmt::Display for NullPlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => write!(f, "nulls first"),
            Self::Last => write!(f, "nulls last"),
        }
    }
}

/// One ordering key
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    /// Expression to order by
    pub expr: Expr,
    /// Direction
    pub direction: OrderDirection,
    /// Explicit null placement; `None` leaves it to the store
    pub nulls: Option<NullPlacement>,
}

impl SortKey {
    /// Ascending key with store-native null placement
    pub fn asc(expr: impl Into<Expr>) -> Self {
        Self {
            expr: expr.into(),
            direction: OrderDirection::Ascending,
            nulls: None,
        }
    }

    /// Descending key with store-native null placement
    pub fn desc(expr: impl Into<Expr>) -> Self {
        Self {
            expr: expr.into(),
            direction: OrderDirection::Descending,
            nulls: None,
        }
    }

    /// Put NULLs before non-null values
    #[must_use]
    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(NullPlacement::First);
        self
    }

    /// Put NULLs after non-null values
    #[must_use]
    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(NullPlacement::Last);
        self
    }

    /// The placement that applies: explicit if set, native otherwise
    pub fn effective_nulls(&self) -> NullPlacement {
        self.nulls
            .unwrap_or_else(|| NullPlacement::native(self.direction))
    }

    /// Order two values of this key.
    ///
    /// Null placement is independent of direction. Values that cannot be
    /// compared count as equal so the next key decides.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let nulls = self.effective_nulls();
        match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => match nulls {
                NullPlacement::First => Ordering::Less,
                NullPlacement::Last => Ordering::Greater,
            },
            (false, true) => match nulls {
                NullPlacement::First => Ordering::Greater,
                NullPlacement::Last => Ordering::Less,
            },
            (false, false) => {
                let ordering = a.compare(b).unwrap_or(Ordering::Equal);
                match self.direction {
                    OrderDirection::Ascending => ordering,
                    OrderDirection::Descending => ordering.reverse(),
                }
            }
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.expr, self.direction)?;
        if let Some(nulls) = self.nulls {
            write!(f, " {}", nulls)?;
        }
        Ok(())
    }
}

/// Ordered list of sort keys; earlier keys take precedence
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SortSpec {
    keys: Vec<SortKey>,
}

impl SortSpec {
    /// No keys; row order is left to the store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tie-breaking key
    #[must_use]
    pub fn then(mut self, key: SortKey) -> Self {
        self.keys.push(key);
        self
    }

    /// The keys in precedence order
    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    /// Whether no key is set
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Compare two rows given their key values in key order
    pub fn compare_rows(&self, a: &[Value], b: &[Value]) -> Ordering {
        self.keys
            .iter()
            .zip(a.iter().zip(b))
            .map(|(key, (x, y))| key.compare(x, y))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl FromIterator<SortKey> for SortSpec {
    fn from_iter<I: IntoIterator<Item = SortKey>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

impl From<SortKey> for SortSpec {
    fn from(key: SortKey) -> Self {
        Self { keys: vec![key] }
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.keys.iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join(", "))
    }
}

/// Pagination parameters for limiting query results
///
/// # Example
///
/// ```rust
/// use acton_query::query::Pagination;
///
/// let page1 = Pagination::first_page(20);
/// assert_eq!(page1.offset, 0);
///
/// let page3 = Pagination::page(3, 20);
/// assert_eq!(page3.offset, 40);
/// assert_eq!(page3.limit, 20);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Number of results to skip
    pub offset: u64,
    /// Maximum number of results to return
    pub limit: u64,
}

impl Pagination {
    /// Create new pagination parameters
    #[must_use]
    pub const fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    /// Create pagination for the first page with the given limit
    #[must_use]
    pub const fn first_page(limit: u64) -> Self {
        Self { offset: 0, limit }
    }

    /// Create pagination for a specific page number (1-indexed). The offset
    /// saturates at `u64::MAX`.
    #[must_use]
    pub const fn page(page_number: u64, page_size: u64) -> Self {
        let offset = page_number.saturating_sub(1).saturating_mul(page_size);
        Self {
            offset,
            limit: page_size,
        }
    }

    /// Cap the limit
    #[must_use]
    pub fn clamp(self, max_limit: u64) -> Self {
        Self {
            offset: self.offset,
            limit: self.limit.min(max_limit),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 20,
        }
    }
}

impl fmt::Display for Pagination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "offset {} limit {}", self.offset, self.limit)
    }
}

/// Validate a caller-supplied window.
///
/// Negative values are rejected; the limit is capped at `max_limit`. A limit
/// of zero is valid and selects no rows.
///
/// # Example
///
/// ```rust
/// use acton_query::query::{plan_page, Pagination};
///
/// assert_eq!(plan_page(1, 2, 1000).unwrap(), Pagination::new(1, 2));
/// assert_eq!(plan_page(0, 5000, 1000).unwrap(), Pagination::new(0, 1000));
/// assert!(plan_page(-1, 2, 1000).is_err());
/// ```
pub fn plan_page(offset: i64, limit: i64, max_limit: u64) -> QueryResult<Pagination> {
    let offset = u64::try_from(offset).map_err(|_| {
        QueryError::validation_failed(format!("offset must be non-negative, got {}", offset))
    })?;
    let limit = u64::try_from(limit).map_err(|_| {
        QueryError::validation_failed(format!("limit must be non-negative, got {}", limit))
    })?;
    Ok(Pagination::new(offset, limit).clamp(max_limit))
}
