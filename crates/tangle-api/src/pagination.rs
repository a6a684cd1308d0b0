//! Page math shared by every listing path, cached or not.

use tangle_types::models::Pagination;

use crate::error::ApiError;

pub const PAGE_SIZE: i64 = 10;

/// A missing, non-numeric, or non-positive page collapses to 1.
pub fn parse_page(raw: &str) -> i64 {
    raw.parse::<i64>().ok().filter(|p| *p >= 1).unwrap_or(1)
}

/// (limit, offset) for a page.
pub fn window(page: i64) -> (i64, i64) {
    (PAGE_SIZE, (page - 1) * PAGE_SIZE)
}

pub fn total_pages(total_items: i64) -> i64 {
    (total_items + PAGE_SIZE - 1) / PAGE_SIZE
}

pub fn build(total_items: i64, page: i64) -> Pagination {
    Pagination {
        total_items,
        total_pages: total_pages(total_items),
        current_page: page,
        page_size: PAGE_SIZE,
    }
}

/// Out-of-range pages are a visible 404, never a silently empty page. An
/// empty collection has zero pages, so even page 1 is out of range.
pub fn ensure_in_range(page: i64, total_pages: i64) -> Result<(), ApiError> {
    if page > total_pages {
        return Err(ApiError::NotFound("Page not found".into()));
    }
    Ok(())
}
