use ormlink::prelude::*;
use serde_json::json;
use std::sync::Arc;

fn row(value: serde_json::Value) -> Row {
    let serde_json::Value::Object(map) = value else {
        panic!("fixture rows must be objects");
    };
    Row::from_pairs(map.into_iter().map(|(k, v)| (k, Value::from(v))))
}

fn blog() -> (Arc<Schema>, MemoryStore) {
    let schema = Schema::builder()
        .register(
            RecordType::builder("Post")
                .table("posts")
                .attributes(["id", "title", "author_id"])
                .relation(
                    RelationDescriptor::has_many("tags", "Tag")
                        .via_table(PivotTable::new("post_tags").link("id", "post_id"))
                        .link("tag_id", "id"),
                )
                .relation(
                    RelationDescriptor::has_many("comments", "Comment")
                        .link("id", "post_id")
                        .condition(Expr::col("approved").eq(true))
                        .order_by(OrderBy::asc("id")),
                )
                .build(),
        )
        .register(
            RecordType::builder("Tag")
                .table("tags")
                .attributes(["id", "label"])
                .build(),
        )
        .register(
            RecordType::builder("Comment")
                .table("comments")
                .attributes(["id", "post_id", "body", "approved"])
                .build(),
        )
        .build();

    let store = MemoryStore::new();
    store.insert("posts", row(json!({"id": 1, "title": "Hello", "author_id": 9})));
    store.insert("posts", row(json!({"id": 2, "title": "Again", "author_id": 9})));
    for (post, tag) in [(1, 30), (1, 10), (2, 20)] {
        store.insert("post_tags", row(json!({"post_id": post, "tag_id": tag})));
    }
    for (id, label) in [(10, "rust"), (20, "sql"), (30, "orm")] {
        store.insert("tags", row(json!({"id": id, "label": label})));
    }
    store.insert("comments", row(json!({"id": 1, "post_id": 1, "body": "nice", "approved": true})));
    store.insert("comments", row(json!({"id": 2, "post_id": 1, "body": "spam", "approved": false})));
    store.insert("comments", row(json!({"id": 3, "post_id": 2, "body": "ok", "approved": true})));
    (schema, store)
}

fn labels(value: &RelationValue) -> Vec<String> {
    value
        .rows()
        .iter()
        .map(|r| r.get_named::<String>("label").expect("label"))
        .collect()
}

#[test]
fn pivot_table_and_condition_through_the_facade() {
    let (schema, store) = blog();
    let posts = schema.records("Post", store.rows("posts")).expect("posts");

    let resolver = RelationResolver::new(Arc::clone(&schema), &store);
    resolver
        .resolve_names(&posts, &["tags", "comments"])
        .expect("resolve");

    // pivot + tags + comments
    assert_eq!(store.query_count(), 3);
    let tags = posts[0].relation("tags").expect("tags");
    assert_eq!(labels(&tags), vec!["orm", "rust"]);

    let comments = posts[0].relation("comments").expect("comments");
    assert_eq!(comments.len(), 1);
    assert_eq!(comments.to_json(), json!([{"id": 1, "post_id": 1, "body": "nice", "approved": true}]));
}

#[test]
fn lazy_proxy_loads_once() {
    let (schema, store) = blog();
    let posts = schema.records("Post", store.rows("posts")).expect("posts");
    let resolver = RelationResolver::new(schema, &store);

    let proxy = posts[1].lazy(&resolver, "tags");
    assert!(!proxy.is_loaded());
    let first = proxy.get().expect("first load");
    let second = proxy.get().expect("cached");
    assert_eq!(labels(&first), vec!["sql"]);
    assert_eq!(labels(&first), labels(&second));
    assert_eq!(store.query_count(), 2);

    assert!(proxy.reset());
    proxy.get().expect("reload");
    assert_eq!(store.query_count(), 4);
}

#[test]
fn config_is_read_from_json() {
    let config = ResolverConfig::from_json_str(r#"{"as_array": true, "n1_threshold": null}"#)
        .expect("config");
    assert!(config.as_array);
    assert_eq!(config.n1_threshold, None);
    assert!(config.populate_inverse);
}
