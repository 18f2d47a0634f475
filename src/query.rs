//! Entry point: resolve one request against one schema.

use std::sync::Arc;

use crate::ast::{FilterClause, SortClause};
use crate::builder::QueryBuilder;
use crate::config::QueryConfig;
use crate::error::QueryError;
use crate::filter::{self, FilterOptions};
use crate::group::{self, GroupOptions};
use crate::lexer::parse_fields;
use crate::paginate::Pagination;
use crate::planner::{self, SelectionPlan};
use crate::request::Request;
use crate::schema::Schema;
use crate::sort::{self, SortOptions};
use crate::token::{ParsedFields, RawList};
use crate::visibility::{self, Record};

/// Per-endpoint overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Names never selected, loaded or made visible.
    pub ignore_fields: Vec<String>,
    pub filter: FilterOptions,
    pub sort: SortOptions,
    pub group: GroupOptions,
    /// Leave limit and offset to the caller.
    pub skip_pagination: bool,
}

/// A schema bound to its configuration.
#[derive(Debug, Clone)]
pub struct DynamicQuery {
    schema: Arc<Schema>,
    config: QueryConfig,
    options: QueryOptions,
}

/// Everything decided for one request, kept for the post-fetch step.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedQuery {
    pub fields: ParsedFields,
    pub selection: SelectionPlan,
    pub filters: Vec<FilterClause>,
    pub sorts: Vec<SortClause>,
    pub groups: Vec<String>,
    pub pagination: Option<Pagination>,
    ignore_fields: Vec<String>,
}

impl DynamicQuery {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            config: QueryConfig::default(),
            options: QueryOptions::default(),
        }
    }

    pub fn with_config(mut self, config: QueryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Parse the request and drive `builder`: select, filter, sort, group,
    /// then paginate.
    pub fn resolve(
        &self,
        request: &dyn Request,
        builder: &mut dyn QueryBuilder,
    ) -> Result<ResolvedQuery, QueryError> {
        let schema = self.schema.as_ref();
        let params = &self.config.params;
        let options = &self.options;

        let fields = parse_fields(&RawList::from_json(request.input(&params.fields)));
        let selection = planner::plan_selection(schema, &fields, &options.ignore_fields);
        planner::apply_selection(schema, &selection, builder)?;

        let filters = filter::parse_filters(schema, request, params, &options.filter);
        filter::apply_filters(schema, &filters, builder)?;

        let sorts = sort::parse_sorts(schema, request, params, &options.sort);
        sort::apply_sorts(&sorts, builder);

        let groups = group::parse_groups(schema, request, params, &options.group);
        group::apply_groups(&groups, builder);

        let pagination = (!options.skip_pagination)
            .then(|| Pagination::from_request(request, params, &self.config.pagination));
        if let Some(pagination) = &pagination {
            pagination.apply(builder);
        }

        tracing::debug!(
            schema = schema.name(),
            filters = filters.len(),
            sorts = sorts.len(),
            groups = groups.len(),
            "resolved query"
        );

        Ok(ResolvedQuery {
            fields,
            selection,
            filters,
            sorts,
            groups,
            pagination,
            ignore_fields: options.ignore_fields.clone(),
        })
    }
}

impl ResolvedQuery {
    /// Narrow fetched records to the requested fields.
    pub fn apply_visibility<'a, I>(&self, records: I)
    where
        I: IntoIterator<Item = &'a mut dyn Record>,
    {
        for record in records {
            visibility::apply_visibility(record, &self.fields, &self.ignore_fields);
        }
    }

    pub fn with_total(&self) -> bool {
        self.pagination.is_some_and(|p| p.with_total())
    }
}
