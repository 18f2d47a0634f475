//! Page size and offset from `per_page`, `page`, `_get_all` and `_limit`.

use serde::{Deserialize, Serialize};

use crate::builder::QueryBuilder;
use crate::config::ParamNames;
use crate::request::Request;

const MAX_OFFSET: u64 = i64::MAX as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    pub default_per_page: u64,
    pub max_per_page: u64,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            default_per_page: 10,
            max_per_page: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// Everything, optionally capped.
    All { limit: Option<u64> },
    /// One page. Without a total, one extra row is fetched to tell whether
    /// a next page exists.
    Page {
        page: u64,
        per_page: u64,
        with_total: bool,
    },
}

impl Pagination {
    pub fn from_request(request: &dyn Request, params: &ParamNames, config: &PageConfig) -> Self {
        if request.input_flag(&params.get_all) {
            let limit = request
                .input_i64(&params.limit)
                .filter(|n| *n > 0)
                .map(|n| n as u64);
            return Pagination::All { limit };
        }

        let default = config.default_per_page.max(1);
        let per_page = request
            .input_i64(&params.per_page)
            .filter(|n| *n > 0)
            .map_or(default, |n| n as u64)
            .min(config.max_per_page.max(1));

        let requested_page = request.input_i64(&params.page);
        let page = requested_page.filter(|p| *p > 1).map_or(1, |p| p as u64);

        Pagination::Page {
            page,
            per_page,
            with_total: requested_page == Some(1),
        }
    }

    pub fn with_total(&self) -> bool {
        matches!(self, Pagination::Page { with_total: true, .. })
    }

    /// Rows skipped before this page, capped at the largest `BIGINT`.
    pub fn offset(&self) -> u64 {
        match self {
            Pagination::All { .. } => 0,
            Pagination::Page { page, per_page, .. } => page
                .saturating_sub(1)
                .saturating_mul(*per_page)
                .min(MAX_OFFSET),
        }
    }

    /// Whether more rows exist past this page, given how many were fetched.
    pub fn has_more(&self, fetched: usize) -> bool {
        match self {
            Pagination::All { .. } => false,
            Pagination::Page { per_page, .. } => fetched as u64 > *per_page,
        }
    }

    pub fn apply(&self, builder: &mut dyn QueryBuilder) {
        match *self {
            Pagination::All { limit: Some(limit) } => builder.limit(limit),
            Pagination::All { limit: None } => {}
            Pagination::Page {
                per_page,
                with_total,
                ..
            } => {
                builder.limit(if with_total {
                    per_page
                } else {
                    per_page.saturating_add(1)
                });
                let offset = self.offset();
                if offset > 0 {
                    builder.offset(offset);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Directive, DirectiveLog};
    use crate::request::JsonRequest;
    use serde_json::json;

    fn paginate(request: serde_json::Value) -> Pagination {
        Pagination::from_request(
            &JsonRequest::from_value(request),
            &ParamNames::default(),
            &PageConfig::default(),
        )
    }

    #[test]
    fn test_defaults_and_caps() {
        assert_eq!(
            paginate(json!({})),
            Pagination::Page {
                page: 1,
                per_page: 10,
                with_total: false,
            }
        );
        assert_eq!(
            paginate(json!({"per_page": "100", "page": "0"})),
            Pagination::Page {
                page: 1,
                per_page: 30,
                with_total: false,
            }
        );
        assert_eq!(
            paginate(json!({"per_page": -4, "page": 3})),
            Pagination::Page {
                page: 3,
                per_page: 10,
                with_total: false,
            }
        );
    }

    #[test]
    fn test_first_page_asks_for_total() {
        let pagination = paginate(json!({"page": "1", "per_page": 5}));
        assert!(pagination.with_total());

        let mut log = DirectiveLog::new();
        pagination.apply(&mut log);
        assert_eq!(log.directives, vec![Directive::Limit(5)]);
    }

    #[test]
    fn test_later_pages_fetch_one_extra_row() {
        let pagination = paginate(json!({"page": 3, "per_page": 5}));
        assert!(!pagination.with_total());
        assert!(pagination.has_more(6));
        assert!(!pagination.has_more(5));

        let mut log = DirectiveLog::new();
        pagination.apply(&mut log);
        assert_eq!(log.directives, vec![Directive::Limit(6), Directive::Offset(10)]);
    }

    #[test]
    fn test_get_all_with_optional_limit() {
        assert_eq!(
            paginate(json!({"_get_all": "1", "page": 4})),
            Pagination::All { limit: None }
        );

        let pagination = paginate(json!({"_get_all": true, "_limit": "50"}));
        let mut log = DirectiveLog::new();
        pagination.apply(&mut log);
        assert_eq!(log.directives, vec![Directive::Limit(50)]);
    }

    #[test]
    fn test_huge_page_number_saturates() {
        let pagination = paginate(json!({"page": "9223372036854775807", "per_page": 30}));
        assert_eq!(pagination.offset(), i64::MAX as u64);

        let mut log = DirectiveLog::new();
        pagination.apply(&mut log);
        assert_eq!(
            log.directives,
            vec![Directive::Limit(31), Directive::Offset(i64::MAX as u64)]
        );
    }
}
