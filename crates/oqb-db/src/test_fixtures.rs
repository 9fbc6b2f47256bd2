//! Shared registry used by unit tests.

use crate::entity::{Column, ColumnType, Entity};
use crate::registry::Registry;

fn int(name: &str) -> Column {
    Column::new(name).of_type(ColumnType::Integer)
}

/// Customers with a value, orders, soft-deleting companies, and friends.
pub fn registry() -> Registry {
    let mut b = Registry::builder();
    b.define(
        Entity::new("customer")
            .column(int("id").primary())
            .column(Column::new("name"))
            .column(Column::new("active").of_type(ColumnType::Boolean)),
    )
    .unwrap()
    .define(
        Entity::new("customer_value")
            .column(int("customer_id").primary())
            .column(int("value")),
    )
    .unwrap()
    .define(
        Entity::new("company")
            .column(int("id").primary())
            .column(Column::new("name"))
            .column(int("customer_id"))
            .soft_deletes(),
    )
    .unwrap()
    .define(
        Entity::new("order")
            .column(int("id").primary())
            .column(Column::new("status"))
            .column(Column::new("order_date").of_type(ColumnType::DateTime))
            .column(int("customer_id")),
    )
    .unwrap()
    .define(
        Entity::new("friend")
            .column(int("first_customer_id").primary())
            .column(int("second_customer_id").primary()),
    )
    .unwrap()
    .has_one("customer", "value", "customer_value", "customer_id")
    .unwrap()
    .has_many("customer", "orders", "order", "customer_id")
    .unwrap()
    .has_many("customer", "companies", "company", "customer_id")
    .unwrap()
    .belongs_to_many(
        "customer",
        "friends",
        "customer",
        "friend",
        "first_customer_id",
        "second_customer_id",
    )
    .unwrap()
    .belongs_to("order", "customer", "customer", "customer_id")
    .unwrap()
    .belongs_to("company", "customer", "customer", "customer_id")
    .unwrap();
    b.build()
}
