//! 配置模块，负责从JSON文件加载请求参数名、分页限制和声明式schema

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::{AggregateFn, Direction};
use crate::dependency::Deps;
use crate::error::SchemaError;
use crate::paginate::PageConfig;
use crate::relations::RelationDef;
use crate::schema::{Aggregate, Schema, SchemaBuilder};

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("cannot read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("aggregate `{aggregate}`: `{function}` needs a column")]
    MissingAggregateColumn { aggregate: String, function: AggregateFn },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// 读取并解析JSON文件
fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    // 检查文件是否存在
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    // 读取文件内容
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    // 解析JSON
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// 各引擎读取的请求参数名
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamNames {
    pub fields: String,
    pub logic: String,
    pub clause: String,
    pub clauses: String,
    pub operators: String,
    pub sort: String,
    pub group: String,
    pub get_all: String,
    pub limit: String,
    pub per_page: String,
    pub page: String,
}

impl Default for ParamNames {
    fn default() -> Self {
        Self {
            fields: "_fields".to_string(),
            logic: "_logic".to_string(),
            clause: "_clause".to_string(),
            clauses: "_clauses".to_string(),
            operators: "_operators".to_string(),
            sort: "_sort".to_string(),
            group: "_group".to_string(),
            get_all: "_get_all".to_string(),
            limit: "_limit".to_string(),
            per_page: "per_page".to_string(),
            page: "page".to_string(),
        }
    }
}

/// 查询配置：参数名与分页
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub params: ParamNames,
    pub pagination: PageConfig,
}

impl QueryConfig {
    /// 从JSON文件加载查询配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        load_json(path.as_ref())
    }
}

/// JSON中声明的关联聚合：
/// `{"function": "sum", "relation": "orders", "column": "total"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateConfig {
    pub function: AggregateFn,
    pub relation: String,
    #[serde(default)]
    pub column: Option<String>,
}

/// JSON中声明的 [`Schema`]。scope 和自定义过滤器需要代码，
/// 在返回的 builder 上追加
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub storage_columns: Vec<String>,
    pub always_select: Vec<String>,
    /// 显式声明的关联依赖，为空时从 `relation_defs` 推导
    pub relations: BTreeMap<String, Deps>,
    pub relation_defs: Vec<RelationDef>,
    pub appends: BTreeMap<String, Deps>,
    pub aggregates: BTreeMap<String, AggregateConfig>,
    /// 过滤键 → 允许的操作符（`null` 表示不限）
    pub filters: BTreeMap<String, Deps>,
    pub sorts: Vec<String>,
    /// 与 `_sort` 相同的 `[-]column` 写法
    pub default_sort: Vec<String>,
    pub groups: Vec<String>,
    pub default_group: Vec<String>,
}

impl SchemaConfig {
    /// 从JSON文件加载schema声明
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        load_json(path.as_ref())
    }

    pub fn into_builder(self) -> Result<SchemaBuilder, ConfigError> {
        let mut builder = Schema::builder(self.name, self.table)
            .columns(self.columns)
            .storage_columns(self.storage_columns)
            .always_select(self.always_select)
            .sorts(self.sorts)
            .groups(self.groups)
            .default_group(self.default_group);

        for (name, deps) in self.relations {
            builder = builder.relation(&name, deps.into_vec());
        }
        for def in self.relation_defs {
            builder = builder.relation_def(def);
        }
        for (name, deps) in self.appends {
            builder = builder.append(&name, deps.into_vec());
        }
        for (name, aggregate) in self.aggregates {
            let AggregateConfig {
                function,
                relation,
                column,
            } = aggregate;
            if function != AggregateFn::Count && column.is_none() {
                return Err(ConfigError::MissingAggregateColumn {
                    aggregate: name,
                    function,
                });
            }
            builder = builder.aggregate(&name, Aggregate::relation(function, &relation, column.as_deref()));
        }
        for (key, operators) in self.filters {
            builder = builder.filter(&key, operators.into_vec());
        }
        for token in self.default_sort {
            let (column, direction) = match token.strip_prefix('-') {
                Some(column) => (column.to_string(), Direction::Desc),
                None => (token, Direction::Asc),
            };
            builder = builder.default_sort(&column, direction);
        }

        Ok(builder)
    }

    pub fn build(self) -> Result<Arc<Schema>, ConfigError> {
        Ok(self.into_builder()?.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "{}", content).unwrap();
        path
    }

    #[test]
    fn test_load_query_config_with_defaults() {
        let path = temp_file(
            "dynamic_query_test_query_config.json",
            r#"{"params": {"fields": "fields"}, "pagination": {"max_per_page": 100}}"#,
        );

        let config = QueryConfig::from_json_file(&path).unwrap();
        assert_eq!(config.params.fields, "fields");
        assert_eq!(config.params.sort, "_sort");
        assert_eq!(config.pagination.max_per_page, 100);
        assert_eq!(config.pagination.default_per_page, 10);

        fs::remove_file(path).ok();
    }

    #[test]
    fn test_invalid_json_config() {
        let path = temp_file("dynamic_query_test_invalid.json", "invalid json");
        let result = QueryConfig::from_json_file(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_file() {
        let result = QueryConfig::from_json_file("non_existent_file.json");
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_schema_from_json() {
        let config: SchemaConfig = serde_json::from_str(
            r#"{
                "name": "config-test-product",
                "table": "products",
                "columns": ["id", "name", "price", "category_id"],
                "relation_defs": [
                    {"name": "category", "related": "categories", "type": "belongs_to",
                     "foreign_key": "category_id", "owner_key": "id"}
                ],
                "appends": {"discounted_price": "price", "label": null},
                "aggregates": {
                    "reviews_count": {"function": "count", "relation": "reviews"}
                },
                "filters": {"price": ["=", ">", "<"], "name": null, "id": "="},
                "sorts": ["name", "price"],
                "default_sort": ["-price"]
            }"#,
        )
        .unwrap();

        let schema = config.build().unwrap();
        assert_eq!(schema.relations().get("category").unwrap(), ["category_id"]);
        assert_eq!(schema.appends().get("discounted_price").unwrap(), ["price"]);
        assert!(schema.appends().get("label").unwrap().is_empty());
        assert_eq!(schema.aggregate_names(), ["reviews_count"]);
        assert_eq!(schema.default_sort()[0].direction, Direction::Desc);
        assert!(matches!(
            schema.filter_rule("name"),
            Some(crate::schema::FilterRule::Column { operators }) if operators.is_empty()
        ));
        assert!(matches!(
            schema.filter_rule("id"),
            Some(crate::schema::FilterRule::Column { operators }) if operators == &["="]
        ));
    }

    #[test]
    fn test_aggregate_without_column_is_rejected() {
        let config: SchemaConfig = serde_json::from_str(
            r#"{
                "name": "config-test-bad",
                "table": "orders",
                "aggregates": {"items_sum": {"function": "sum", "relation": "items"}}
            }"#,
        )
        .unwrap();
        assert!(matches!(
            config.build(),
            Err(ConfigError::MissingAggregateColumn { .. })
        ));
    }
}
