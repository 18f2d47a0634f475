//! 交互式控制台：输入请求查询串，查看为示例 `products` schema
//! （或从JSON加载的schema）生成的SQL

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde_json::json;
use tracing::{info, warn};

use dynamic_query::ast::Direction;
use dynamic_query::paginate::Pagination;
use dynamic_query::relations::RelationDef;
use dynamic_query::{
    Aggregate, DynamicQuery, JsonRequest, QueryConfig, QueryError, Schema, SchemaConfig, SqlCompiler,
};

/// 动态查询控制台
#[derive(Parser, Debug)]
#[command(name = "dynamic_query", about = "Compile request query strings to SQL")]
struct Cli {
    /// 查询参数与分页配置文件
    #[arg(short = 'c', long = "config", default_value = "query_config.json")]
    config: PathBuf,

    /// 替代内置 products 的schema声明文件
    #[arg(short = 's', long = "schema")]
    schema: Option<PathBuf>,

    /// 编译一条查询串后退出
    #[arg(short = 'q', long = "query")]
    query: Option<String>,
}

/// 加载查询配置，失败时使用默认配置
fn load_query_config(path: &Path) -> QueryConfig {
    match QueryConfig::from_json_file(path) {
        Ok(config) => {
            info!("✅ 成功从JSON配置文件加载查询配置: {}", path.display());
            config
        }
        Err(e) => {
            warn!("⚠️ 无法加载JSON配置文件 ({}), 使用默认配置", e);
            QueryConfig::default()
        }
    }
}

/// 内置示例schema
fn demo_schema() -> anyhow::Result<Arc<Schema>> {
    let schema = Schema::builder("product", "products")
        .columns(["id", "name", "price", "status", "stock", "category_id", "meta", "created_at"])
        .always_select(["id"])
        .relation_def(RelationDef::belongs_to("category", "categories", "category_id"))
        .relation_def(RelationDef::has_many("reviews", "reviews", "product_id"))
        .relation_def(RelationDef::belongs_to_many(
            "tags",
            "tags",
            "product_tag",
            "product_id",
            "tag_id",
        ))
        .append_with("discounted_price", ["price"], |attrs| {
            json!(attrs.get("price").and_then(|p| p.as_f64()).unwrap_or_default() * 0.9)
        })
        .append_with("in_stock", ["stock"], |attrs| {
            json!(attrs.get("stock").and_then(|s| s.as_i64()).unwrap_or_default() > 0)
        })
        .aggregate("reviews_count", Aggregate::count("reviews"))
        .aggregate("reviews_avg_rating", Aggregate::avg("reviews", "rating"))
        .filter("name", ["like", "%like", "like%", "ilike"])
        .filter("price", ["=", ">", "<", ">=", "<=", "between"])
        .filter("status", ["=", "in"])
        .filter("stock", ["=", ">", "null"])
        .filter("meta", ["json_contains", "json_contains_key"])
        .filter("reviews", ["has"])
        .filter("tags", ["has"])
        .sorts(["id", "name", "price", "created_at", "reviews_count"])
        .groups(["status", "category_id"])
        .default_sort("created_at", Direction::Desc)
        .build()?;
    Ok(schema)
}

fn compile(query: &DynamicQuery, line: &str) -> Result<(), QueryError> {
    let request = JsonRequest::from_query_string(line);
    let mut compiler = SqlCompiler::new(query.schema());
    let resolved = query.resolve(&request, &mut compiler)?;
    let result = compiler.compile(resolved.with_total());

    println!("\n[生成的 SQL]:\n{}", result.sql);
    if let Some(count_sql) = &result.count_sql {
        println!("\n[计数 SQL]:\n{}", count_sql);
    }
    if !result.eager_loads.is_empty() {
        println!("\n[预加载关联]:");
        for load in &result.eager_loads {
            match &load.nested {
                Some(nested) => println!("  • {} ({})", load.relation, nested.items().join("|")),
                None => println!("  • {}", load.relation),
            }
        }
    }
    if !resolved.selection.appends.is_empty() {
        println!("\n[追加属性]: {}", resolved.selection.appends.join(", "));
    }
    match resolved.pagination {
        Some(Pagination::Page {
            page,
            per_page,
            with_total,
        }) => println!("\n[分页]: 第 {} 页, 每页 {} 条 (统计总数: {})", page, per_page, with_total),
        Some(Pagination::All { limit }) => println!("\n[全部]: 上限 {:?}", limit),
        None => {}
    }
    println!();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = load_query_config(&cli.config);
    let schema = match &cli.schema {
        Some(path) => SchemaConfig::from_json_file(path)
            .and_then(SchemaConfig::build)
            .with_context(|| format!("加载schema失败: {}", path.display()))?,
        None => demo_schema()?,
    };
    info!(schema = schema.name(), table = schema.table(), "schema 就绪");

    let query = DynamicQuery::new(schema).with_config(config);

    if let Some(line) = &cli.query {
        compile(&query, line)?;
        return Ok(());
    }

    println!("--- dynamic_query: 请求参数到 SQL 编译器 ---");
    println!("示例: _fields=name,discounted_price,category:title&status[]=open&_operators[status]=in&_sort=-price&page=1");
    println!("输入 `exit` 退出\n");

    let mut rl = DefaultEditor::new()?;
    loop {
        match rl.readline(">> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" || line == "quit" {
                    break;
                }
                rl.add_history_entry(line)?;
                if let Err(e) = compile(&query, line) {
                    println!("❌ {}", e);
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
