//! Applies a field selection to records that have already been fetched.

use crate::planner::WILDCARD;
use crate::schema::Schema;
use crate::token::ParsedFields;
use crate::whitelist;

/// A fetched record whose serialized shape can be narrowed.
pub trait Record {
    fn schema(&self) -> &Schema;

    /// Restrict serialization to exactly these attributes.
    fn set_visible(&mut self, fields: Vec<String>);

    /// Computed attributes to materialize on serialization.
    fn set_appends(&mut self, appends: Vec<String>);

    /// The loaded relation, `None` when absent or null.
    fn related_mut(&mut self, relation: &str) -> Option<RelatedMut<'_>>;
}

pub enum RelatedMut<'a> {
    One(&'a mut dyn Record),
    Many(Vec<&'a mut dyn Record>),
}

/// Narrow `record` to `fields` and recurse into relations that carried a
/// nested selection. `ignore` applies to the top-level record only.
pub fn apply_visibility(record: &mut dyn Record, fields: &ParsedFields, ignore: &[String]) {
    let (visible, appends) = {
        let schema = record.schema();
        let visible: Vec<String> = schema
            .dependencies()
            .closure(&fields.names)
            .into_iter()
            .filter(|name| !ignore.contains(name))
            .collect();
        let appends = whitelist::intersect(&visible, schema.append_names(), &[]);
        (visible, appends)
    };

    if !visible.is_empty() && !visible.iter().any(|f| f == WILDCARD) {
        record.set_visible(visible);
    }
    record.set_appends(appends);

    for (relation, nested) in &fields.nested {
        let nested = nested.parse();
        match record.related_mut(relation) {
            Some(RelatedMut::One(child)) => apply_visibility(child, &nested, &[]),
            Some(RelatedMut::Many(children)) => {
                for child in children {
                    apply_visibility(child, &nested, &[]);
                }
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::parse_fields;
    use crate::record::{Related, Row};
    use crate::token::RawList;
    use serde_json::json;
    use std::sync::Arc;

    fn category_schema() -> Arc<Schema> {
        Schema::builder("visibility-test-category", "categories")
            .columns(["id", "title", "slug"])
            .append_with("url", ["slug"], |attrs| {
                json!(format!("/c/{}", attrs.get("slug").and_then(|s| s.as_str()).unwrap_or_default()))
            })
            .build()
            .unwrap()
    }

    fn product_schema() -> Arc<Schema> {
        Schema::builder("visibility-test-product", "products")
            .columns(["id", "name", "price", "category_id"])
            .relation("category", ["category_id"])
            .relation("reviews", ["id"])
            .append_with("discounted_price", ["price"], |attrs| {
                json!(attrs.get("price").and_then(|p| p.as_f64()).unwrap_or_default() * 0.9)
            })
            .build()
            .unwrap()
    }

    fn product() -> Row {
        let category = Row::new(
            category_schema(),
            json!({"id": 3, "title": "Shoes", "slug": "shoes"}),
        );
        let reviews = vec![
            Row::new(category_schema(), json!({"id": 1, "title": "a", "slug": "x"})),
            Row::new(category_schema(), json!({"id": 2, "title": "b", "slug": "y"})),
        ];
        Row::new(
            product_schema(),
            json!({"id": 1, "name": "Runner", "price": 100.0, "category_id": 3}),
        )
        .with_relation("category", Related::One(Box::new(category)))
        .with_relation("reviews", Related::Many(reviews))
    }

    #[test]
    fn test_visible_and_appends_follow_closure() {
        let mut row = product();
        apply_visibility(&mut row, &parse_fields(&RawList::from("name,discounted_price")), &[]);
        assert_eq!(
            row.visible().unwrap(),
            ["name", "discounted_price", "price"]
        );
        assert_eq!(row.appends(), ["discounted_price"]);
        assert_eq!(
            row.to_json(),
            json!({"name": "Runner", "price": 100.0, "discounted_price": 90.0})
        );
    }

    #[test]
    fn test_nested_specs_reach_loaded_relations() {
        let mut row = product();
        apply_visibility(
            &mut row,
            &parse_fields(&RawList::from("name,category:title|url,reviews:id")),
            &[],
        );
        assert_eq!(
            row.to_json(),
            json!({
                "id": 1,
                "name": "Runner",
                "category_id": 3,
                "category": {"title": "Shoes", "slug": "shoes", "url": "/c/shoes"},
                "reviews": [{"id": 1}, {"id": 2}],
            })
        );
    }

    #[test]
    fn test_empty_selection_only_clears_appends() {
        let mut row = product();
        apply_visibility(&mut row, &ParsedFields::default(), &[]);
        assert!(row.visible().is_none());
        assert!(row.appends().is_empty());
    }

    #[test]
    fn test_wildcard_keeps_everything_visible() {
        let mut row = product();
        apply_visibility(&mut row, &parse_fields(&RawList::from("*,discounted_price")), &[]);
        assert!(row.visible().is_none());
        assert_eq!(row.appends(), ["discounted_price"]);
    }

    #[test]
    fn test_null_relation_is_skipped() {
        let mut row = Row::new(product_schema(), json!({"id": 1, "category_id": null}))
            .with_relation("category", Related::Null);
        apply_visibility(&mut row, &parse_fields(&RawList::from("id,category:title")), &[]);
        assert_eq!(row.to_json(), json!({"id": 1, "category_id": null, "category": null}));
    }
}
