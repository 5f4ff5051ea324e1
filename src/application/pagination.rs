//! Offset pagination metadata.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

/// Pagination block attached to collection envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u64,
    pub page_size: u32,
    pub page_count: u64,
    pub total: u64,
}

impl Pagination {
    /// Compute metadata for the window `skip..skip + take` over `total` rows.
    ///
    /// `page` is `skip / take + 1` with integer division, so a window that does
    /// not start on a page boundary reports the page it starts in.
    pub fn new(skip: u32, take: NonZeroU32, total: u64) -> Self {
        let take_wide = u64::from(take.get());
        Self {
            page: u64::from(skip) / take_wide + 1,
            page_size: take.get(),
            page_count: total.div_ceil(take_wide),
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn take(value: u32) -> NonZeroU32 {
        NonZeroU32::new(value).expect("non-zero")
    }

    #[test]
    fn last_partial_page() {
        let pagination = Pagination::new(20, take(10), 25);
        assert_eq!(pagination.page, 3);
        assert_eq!(pagination.page_count, 3);
        assert_eq!(pagination.page_size, 10);
        assert_eq!(pagination.total, 25);
    }

    #[test]
    fn first_page_of_twelve() {
        let pagination = Pagination::new(0, take(5), 12);
        assert_eq!(
            pagination,
            Pagination {
                page: 1,
                page_size: 5,
                page_count: 3,
                total: 12,
            }
        );
    }

    #[test]
    fn empty_collection_has_no_pages() {
        let pagination = Pagination::new(0, take(25), 0);
        assert_eq!(pagination.page, 1);
        assert_eq!(pagination.page_count, 0);
    }

    #[test]
    fn unaligned_skip_rounds_down() {
        assert_eq!(Pagination::new(15, take(10), 40).page, 2);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(Pagination::new(0, take(5), 12)).expect("serialize");
        assert_eq!(json["pageSize"], 5);
        assert_eq!(json["pageCount"], 3);
    }
}
