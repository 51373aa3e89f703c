#![allow(dead_code)]

use ormlink_core::{Row, Value};
use ormlink_query::{MemoryStore, OrderBy};
use ormlink_relations::{IndexBy, PivotTable, RecordRef, RecordType, RelationDescriptor, Schema};
use serde_json::json;
use std::sync::Arc;

pub fn row(value: serde_json::Value) -> Row {
    match value {
        serde_json::Value::Object(map) => Row::from_pairs(map.into_iter().map(|(k, v)| (k, Value::from(v)))),
        other => panic!("fixture rows must be objects, got {other}"),
    }
}

pub fn schema() -> Arc<Schema> {
    Schema::builder()
        .register(
            RecordType::builder("Customer")
                .table("customers")
                .attributes(["id", "name", "group_id"])
                .relation(
                    RelationDescriptor::has_many("orders", "Order")
                        .link("id", "customer_id")
                        .inverse_of("customer")
                        .order_by(OrderBy::asc("id")),
                )
                .relation(
                    RelationDescriptor::has_one("latest_order", "Order")
                        .link("id", "customer_id")
                        .order_by(OrderBy::desc("id")),
                )
                .relation(
                    RelationDescriptor::has_many("group_members", "Customer").link("group_id", "group_id"),
                )
                .build(),
        )
        .register(
            RecordType::builder("Order")
                .table("orders")
                .attributes(["id", "customer_id", "total"])
                .relation(RelationDescriptor::has_one("customer", "Customer").link("customer_id", "id"))
                .relation(RelationDescriptor::has_many("lines", "OrderLine").link("id", "order_id"))
                .relation(
                    RelationDescriptor::has_many("items", "Item")
                        .via_relation("lines")
                        .link("item_id", "id"),
                )
                .relation(
                    RelationDescriptor::has_many("pivot_items", "Item")
                        .via_table(PivotTable::new("order_lines").link("id", "order_id"))
                        .link("item_id", "id"),
                )
                .relation(
                    RelationDescriptor::has_many("items_by_sku", "Item")
                        .via_relation("lines")
                        .link("item_id", "id")
                        .index_by(IndexBy::attribute("sku")),
                )
                .build(),
        )
        .register(
            RecordType::builder("OrderLine")
                .table("order_lines")
                .attributes(["order_id", "item_id"])
                .primary_key(["order_id", "item_id"])
                .relation(RelationDescriptor::has_one("item", "Item").link("item_id", "id"))
                .build(),
        )
        .register(
            RecordType::builder("Item")
                .table("items")
                .attributes(["id", "name", "sku"])
                .build(),
        )
        .register(
            RecordType::builder("Employee")
                .table("employees")
                .attributes(["id", "dept_id", "emp_id"])
                .relation(
                    RelationDescriptor::has_many("assignments", "Assignment")
                        .link("dept_id", "dept_id")
                        .link("emp_id", "emp_id"),
                )
                .build(),
        )
        .register(
            RecordType::builder("Assignment")
                .table("assignments")
                .attributes(["id", "dept_id", "emp_id", "task"])
                .build(),
        )
        .build()
}

pub fn store() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_rows(
        "customers",
        [
            row(json!({"id": 1, "name": "Alice", "group_id": 7})),
            row(json!({"id": 2, "name": "Bob", "group_id": null})),
            row(json!({"id": 3, "name": "Cara", "group_id": 7})),
            row(json!({"id": 4, "name": "Dan", "group_id": null})),
        ],
    );
    store.insert_rows(
        "orders",
        [
            row(json!({"id": 10, "customer_id": 1, "total": 50})),
            row(json!({"id": 11, "customer_id": 1, "total": 150})),
            row(json!({"id": 12, "customer_id": 2, "total": 20})),
        ],
    );
    // Junction rows deliberately out of item id order.
    store.insert_rows(
        "order_lines",
        [
            row(json!({"order_id": 10, "item_id": 5})),
            row(json!({"order_id": 10, "item_id": 3})),
            row(json!({"order_id": 10, "item_id": 4})),
            row(json!({"order_id": 11, "item_id": 3})),
        ],
    );
    store.insert_rows(
        "items",
        [
            row(json!({"id": 3, "name": "bolt", "sku": "a"})),
            row(json!({"id": 4, "name": "nut", "sku": "b"})),
            row(json!({"id": 5, "name": "screw", "sku": "a"})),
        ],
    );
    store.insert_rows("employees", [row(json!({"id": 1, "dept_id": 1, "emp_id": 2}))]);
    store.insert_rows(
        "assignments",
        [
            row(json!({"id": 100, "dept_id": 1, "emp_id": 2, "task": "a"})),
            row(json!({"id": 101, "dept_id": 1, "emp_id": 3, "task": "b"})),
            row(json!({"id": 102, "dept_id": 2, "emp_id": 2, "task": "c"})),
        ],
    );
    store
}

/// Fresh record instances for every row of a table.
pub fn load(schema: &Schema, store: &MemoryStore, type_name: &str) -> Vec<RecordRef> {
    let table = schema.record_type(type_name).expect("known type").table().to_string();
    schema
        .records(type_name, store.rows(&table))
        .expect("records")
}

pub fn ids(rows: &[Row]) -> Vec<i64> {
    rows.iter()
        .map(|r| r.get_named::<i64>("id").expect("id column"))
        .collect()
}
