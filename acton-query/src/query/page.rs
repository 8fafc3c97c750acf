//! Windowed results with a total count

use serde::{Deserialize, Serialize};

/// One window of results plus the size of the full filtered set
///
/// `offset` and `limit` are the values actually applied, after clamping.
///
/// # Example
///
/// ```rust
/// use acton_query::query::PageResult;
///
/// let page = PageResult::new(vec!["member2", "member3"], 4, 1, 2);
/// assert_eq!(page.total_pages(), 2);
/// assert!(page.has_next());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult<T> {
    /// Rows in the window
    pub items: Vec<T>,
    /// Matching rows across all windows
    pub total: u64,
    /// Rows skipped
    pub offset: u64,
    /// Window size
    pub limit: u64,
}

impl<T> PageResult<T> {
    /// Assemble a page
    #[must_use]
    pub fn new(items: Vec<T>, total: u64, offset: u64, limit: u64) -> Self {
        Self {
            items,
            total,
            offset,
            limit,
        }
    }

    /// Number of windows of `limit` rows; zero when the limit is zero
    pub fn total_pages(&self) -> u64 {
        if self.limit == 0 {
            return 0;
        }
        self.total.div_ceil(self.limit)
    }

    /// Whether rows exist past this window
    pub fn has_next(&self) -> bool {
        self.offset.saturating_add(self.items.len() as u64) < self.total
    }

    /// Whether rows exist before this window
    pub fn has_prev(&self) -> bool {
        self.offset > 0
    }

    /// Map the items to a new type
    pub fn map<U, F>(self, f: F) -> PageResult<U>
    where
        F: FnMut(T) -> U,
    {
        PageResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            offset: self.offset,
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages_rounds_up() {
        assert_eq!(PageResult::new(vec![1, 2], 5, 0, 2).total_pages(), 3);
        assert_eq!(PageResult::new(vec![1, 2], 4, 0, 2).total_pages(), 2);
        assert_eq!(PageResult::<i32>::new(vec![], 0, 0, 2).total_pages(), 0);
    }

    #[test]
    fn test_zero_limit_keeps_total() {
        let page = PageResult::<i32>::new(vec![], 4, 0, 0);
        assert_eq!(page.total, 4);
        assert_eq!(page.total_pages(), 0);
        assert!(page.has_next());
    }

    #[test]
    fn test_has_next_and_prev() {
        let last = PageResult::new(vec![4], 4, 3, 2);
        assert!(!last.has_next());
        assert!(last.has_prev());
    }

    #[test]
    fn test_map() {
        let page = PageResult::new(vec![10, 20], 4, 0, 2).map(|age| age + 1);
        assert_eq!(page.items, vec![11, 21]);
        assert_eq!(page.total, 4);
    }

    #[test]
    fn test_serialize() {
        let json = serde_json::to_value(PageResult::new(vec!["a"], 1, 0, 20)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"items": ["a"], "total": 1, "offset": 0, "limit": 20})
        );
    }
}
