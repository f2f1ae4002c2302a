//! Shared fixtures for integration tests

#![allow(dead_code)]

use querycraft::config::CompilerConfig;
use querycraft::cqm::{AllowAll, CanonicalQuery, CqmBuilder};
use querycraft::path::parse_path;
use querycraft::query::{Query, QueryBuilder};
use querycraft::schema::{EntitySchema, FieldDef, FieldRef, RelationDef, SchemaCatalog, SchemaView};
use querycraft::value::FieldType;

/// orders -> customers -> regions, plus an accounts entity for projection tests
pub fn catalog() -> SchemaCatalog {
    SchemaCatalog::new(vec![
        EntitySchema::new("orders")
            .field("id", FieldDef::identifier())
            .field("status", FieldDef::string().indexed())
            .field("total_amount", FieldDef::float())
            .field("customer_id", FieldDef::identifier().indexed())
            .field("created_at", FieldDef::timestamp())
            .field("title", FieldDef::string().nullable())
            .field("embedding", FieldDef::array(FieldType::Float32))
            .field(
                "customer",
                FieldDef::relation(RelationDef::new("customers", "customer_id", "id")),
            ),
        EntitySchema::new("customers")
            .field("id", FieldDef::identifier())
            .field("name", FieldDef::string())
            .field("tier", FieldDef::string().nullable())
            .field("region_id", FieldDef::identifier())
            .field(
                "region",
                FieldDef::relation(RelationDef::new("regions", "region_id", "id")),
            ),
        EntitySchema::new("regions")
            .field("id", FieldDef::identifier())
            .field("name", FieldDef::string()),
        EntitySchema::new("accounts")
            .field("id", FieldDef::identifier())
            .field("password", FieldDef::string())
            .field(
                "user",
                FieldDef::object([
                    ("name", FieldDef::string()),
                    ("email", FieldDef::string()),
                    ("password", FieldDef::string()),
                ]),
            )
            .field("settings", FieldDef::object([("theme", FieldDef::string())])),
    ])
}

pub fn field(entity: &str, path: &str) -> FieldRef {
    catalog()
        .resolve(entity, &parse_path(path).unwrap())
        .unwrap()
}

pub fn query(builder: QueryBuilder) -> Query {
    builder.tenant("acme").build()
}

pub fn canonical(builder: QueryBuilder) -> CanonicalQuery {
    let catalog = catalog();
    let config = CompilerConfig::default();
    CqmBuilder::new(&catalog, &AllowAll, &config)
        .build(&query(builder))
        .unwrap_or_else(|errors| panic!("query rejected: {:?}", errors))
}
