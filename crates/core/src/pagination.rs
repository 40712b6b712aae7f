use serde::{Deserialize, Serialize};

use crate::config::PaginationConfig;

/// Raw `page`/`size` query values as supplied by a caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

/// A normalized page window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    /// Sizes outside `1..=max_page_size` fall back to the default; pages below 1 become 1.
    pub fn normalize(query: PageQuery, limits: &PaginationConfig) -> Self {
        let size = match query.size {
            Some(size) if size >= 1 && size <= i64::from(limits.max_page_size) => size as u32,
            _ => limits.default_page_size,
        };
        let page = match query.page {
            Some(page) if page >= 1 => u32::try_from(page).unwrap_or(u32::MAX),
            _ => 1,
        };
        Self { page, size }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub page: u32,
    pub size: u32,
    pub total: i64,
    pub previous_page: Option<String>,
    pub next_page: Option<String>,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(request: PageRequest, total: i64, items: Vec<T>, endpoint: &str) -> Self {
        let previous_page = (request.page > 1)
            .then(|| page_url(endpoint, request.page - 1, request.size));
        let shown = i64::from(request.page) * i64::from(request.size);
        let next_page = (shown < total).then(|| page_url(endpoint, request.page + 1, request.size));

        Self { page: request.page, size: request.size, total, previous_page, next_page, items }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            page: self.page,
            size: self.size,
            total: self.total,
            previous_page: self.previous_page,
            next_page: self.next_page,
            items: self.items.into_iter().map(f).collect(),
        }
    }
}

fn page_url(endpoint: &str, page: u32, size: u32) -> String {
    format!("{endpoint}?page={page}&size={size}")
}

#[cfg(test)]
mod tests {
    use super::{Page, PageQuery, PageRequest};
    use crate::config::PaginationConfig;

    fn limits() -> PaginationConfig {
        PaginationConfig { default_page_size: 20, max_page_size: 20 }
    }

    #[test]
    fn out_of_range_values_fall_back() {
        let request =
            PageRequest::normalize(PageQuery { page: Some(0), size: Some(50) }, &limits());
        assert_eq!(request, PageRequest { page: 1, size: 20 });

        let request =
            PageRequest::normalize(PageQuery { page: Some(-3), size: Some(0) }, &limits());
        assert_eq!(request, PageRequest { page: 1, size: 20 });

        let request = PageRequest::normalize(PageQuery::default(), &limits());
        assert_eq!(request, PageRequest { page: 1, size: 20 });
    }

    #[test]
    fn valid_values_are_kept_and_offset_follows() {
        let request = PageRequest::normalize(PageQuery { page: Some(3), size: Some(5) }, &limits());

        assert_eq!(request, PageRequest { page: 3, size: 5 });
        assert_eq!(request.offset(), 10);
        assert_eq!(request.limit(), 5);
    }

    #[test]
    fn page_links_only_point_at_existing_pages() {
        let middle = Page::new(PageRequest { page: 2, size: 5 }, 12, vec![1, 2, 3, 4, 5], "/v1/requests");
        assert_eq!(middle.previous_page.as_deref(), Some("/v1/requests?page=1&size=5"));
        assert_eq!(middle.next_page.as_deref(), Some("/v1/requests?page=3&size=5"));

        let last = Page::new(PageRequest { page: 3, size: 5 }, 12, vec![11, 12], "/v1/requests");
        assert_eq!(last.next_page, None);

        let only = Page::<i32>::new(PageRequest { page: 1, size: 20 }, 0, Vec::new(), "/v1/groups");
        assert_eq!(only.previous_page, None);
        assert_eq!(only.next_page, None);
    }

    #[test]
    fn map_keeps_the_window() {
        let page = Page::new(PageRequest { page: 1, size: 2 }, 3, vec![1, 2], "/v1/comments")
            .map(|value| value * 10);

        assert_eq!(page.items, vec![10, 20]);
        assert_eq!(page.total, 3);
        assert!(page.next_page.is_some());
    }
}
