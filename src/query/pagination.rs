use serde::{Deserialize, Serialize};

/// LIMIT/OFFSET fragment for assembled SQL.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl Pagination {
    /// Page-based pagination, 1-indexed.
    pub fn new(page: u32, per_page: u32) -> Self {
        let offset = if page > 0 {
            Some((page - 1) * per_page)
        } else {
            None
        };
        Self {
            limit: Some(per_page),
            offset,
        }
    }

    pub fn limit_only(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            offset: None,
        }
    }

    pub fn offset_only(offset: u32) -> Self {
        Self {
            limit: None,
            offset: Some(offset),
        }
    }

    pub fn to_sql(&self) -> String {
        let mut sql = String::new();

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        sql
    }
}

/// Caller-facing pagination request.
///
/// `limit` must be at least 1; a zero limit makes the derived page count
/// undefined and is a contract violation, not a validated input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
    /// Explicit row offset; overrides the page-derived skip when set.
    pub offset: Option<u32>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            offset: None,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page,
            limit,
            offset: None,
        }
    }

    /// Rows to skip: the explicit offset when given, otherwise `(page-1)*limit`.
    pub fn skip(&self) -> u32 {
        self.offset
            .unwrap_or_else(|| self.page.saturating_sub(1) * self.limit)
    }
}

/// One page of results with derived page metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

impl<T> Page<T> {
    /// Derive page metadata from a data slice and total count.
    pub fn from_parts(data: Vec<T>, total: u64, page: u32, limit: u32) -> Self {
        let total_pages = total.div_ceil(u64::from(limit)) as u32;
        Self {
            data,
            total,
            page,
            limit,
            total_pages,
            has_next_page: page < total_pages,
            has_previous_page: page > 1,
        }
    }

    /// Wrap a full, unpaginated result set as a single page.
    pub fn unpaginated(data: Vec<T>) -> Self {
        let total = data.len() as u64;
        let limit = data.len().max(1) as u32;
        Self {
            data,
            total,
            page: 1,
            limit,
            total_pages: 1,
            has_next_page: false,
            has_previous_page: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn page_based_pagination() {
        let pagination = Pagination::new(2, 10);
        assert_eq!(pagination.limit, Some(10));
        assert_eq!(pagination.offset, Some(10));
        assert_eq!(pagination.to_sql(), " LIMIT 10 OFFSET 10");
    }

    #[test]
    fn limit_only_pagination() {
        let pagination = Pagination::limit_only(5);
        assert_eq!(pagination.to_sql(), " LIMIT 5");
    }

    #[test]
    fn offset_only_pagination() {
        let pagination = Pagination::offset_only(15);
        assert_eq!(pagination.to_sql(), " OFFSET 15");
    }

    #[test]
    fn skip_defaults_to_page_math() {
        assert_eq!(PageRequest::new(3, 20).skip(), 40);
    }

    #[test]
    fn explicit_offset_overrides_page_math() {
        let request = PageRequest {
            page: 3,
            limit: 20,
            offset: Some(7),
        };
        assert_eq!(request.skip(), 7);
    }

    #[test]
    fn twenty_five_rows_page_two_of_ten() {
        let data: Vec<u32> = (10..20).collect();
        let page = Page::from_parts(data, 25, 2, 10);
        assert_eq!(page.data.len(), 10);
        assert_eq!(page.total, 25);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next_page);
        assert!(page.has_previous_page);
    }

    #[test]
    fn unpaginated_wraps_everything_in_one_page() {
        let page = Page::unpaginated(vec![1, 2, 3]);
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 1);
        assert!(!page.has_next_page);
        assert!(!page.has_previous_page);
    }

    #[test]
    fn empty_unpaginated_page_has_nonzero_limit() {
        let page = Page::<u32>::unpaginated(vec![]);
        assert_eq!(page.total, 0);
        assert_eq!(page.limit, 1);
    }

    proptest! {
        #[test]
        fn page_metadata_invariants(
            page in 1u32..500,
            limit in 1u32..200,
            total in 0u64..100_000,
        ) {
            let result = Page::<u32>::from_parts(vec![], total, page, limit);
            let expected_pages = total.div_ceil(u64::from(limit)) as u32;
            prop_assert_eq!(result.total_pages, expected_pages);
            prop_assert_eq!(result.has_next_page, page < expected_pages);
            prop_assert_eq!(result.has_previous_page, page > 1);
        }
    }
}
