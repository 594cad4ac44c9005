use serde::Deserialize;
use utoipa::IntoParams;

use crate::models::Page;

/// Number of posts on one page of every post listing.
pub const POSTS_PER_PAGE: u32 = 10;

/// PageQuery
///
/// The `?page=` query parameter. Kept as a raw string so that garbage input
/// falls back to the first page instead of rejecting the request.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// 1-based page number. Non-numeric values serve page 1, values past the end serve the last page.
    pub page: Option<String>,
}

/// Paginator
///
/// Resolves a requested page number against a total item count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    pub count: u64,
    pub per_page: u32,
}

/// PageWindow
///
/// The resolved slice to fetch: `limit` rows starting at `offset`, served as page `number`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: u32,
    pub num_pages: u32,
    pub limit: i64,
    pub offset: i64,
}

impl Paginator {
    pub fn new(count: u64, per_page: u32) -> Self {
        Self {
            count,
            per_page: per_page.max(1),
        }
    }

    /// An empty listing still has one (empty) page.
    pub fn num_pages(&self) -> u32 {
        let pages = self.count.div_ceil(u64::from(self.per_page));
        u32::try_from(pages).unwrap_or(u32::MAX).max(1)
    }

    /// Clamps the raw `page` value into `1..=num_pages`.
    pub fn window(&self, requested: Option<&str>) -> PageWindow {
        let num_pages = self.num_pages();
        let number = match requested.map(str::trim).map(str::parse::<i64>) {
            Some(Ok(n)) if n < 1 => 1,
            Some(Ok(n)) => u32::try_from(n).unwrap_or(u32::MAX).min(num_pages),
            _ => 1,
        };

        PageWindow {
            number,
            num_pages,
            limit: i64::from(self.per_page),
            offset: i64::from(number - 1) * i64::from(self.per_page),
        }
    }
}

impl PageWindow {
    /// Wraps the fetched rows into a serializable page.
    pub fn into_page<T>(self, items: Vec<T>, count: u64) -> Page<T> {
        Page {
            items,
            number: self.number,
            num_pages: self.num_pages,
            count,
            has_next: self.number < self.num_pages,
            has_previous: self.number > 1,
        }
    }
}
