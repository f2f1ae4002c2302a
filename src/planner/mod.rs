//! Query planning
//!
//! `LogicalPlan::from_canonical` lays out relational operators for a
//! canonical query; `Optimizer` picks physical algorithms using whatever
//! statistics are available; `explain` renders the result. Nothing here
//! reads the client query model.

pub mod cost;
mod errors;
mod explain;
mod logical;
mod optimizer;
mod physical;
mod stats;

pub use errors::{PlannerError, PlannerErrorCode, PlannerResult};
pub use explain::{explain, ExecutionStats, ExplainConfig, ExplainNode, ExplainReport, Recommendation};
pub use logical::{JoinSpec, LogicalNode, LogicalPlan, ScanAccess, ScanNode};
pub use optimizer::{Optimizer, OptimizerConfig};
pub use physical::{BuildSide, NodeId, PhysicalNode, PhysicalOperator, PhysicalPlan};
pub use stats::{
    EntityStatistics, FieldStatistics, InMemoryStatistics, NoStatistics, StatisticsRegistry,
    StatisticsView,
};

#[cfg(test)]
pub(crate) mod testing {
    use crate::config::CompilerConfig;
    use crate::cqm::{AllowAll, CanonicalQuery, CqmBuilder};
    use crate::query::QueryBuilder;
    use crate::schema::{EntitySchema, FieldDef, RelationDef, SchemaCatalog};
    use crate::value::FieldType;

    pub fn catalog() -> SchemaCatalog {
        SchemaCatalog::new(vec![
            EntitySchema::new("orders")
                .field("id", FieldDef::identifier())
                .field("status", FieldDef::string().indexed())
                .field("total_amount", FieldDef::float())
                .field("customer_id", FieldDef::identifier().indexed())
                .field("created_at", FieldDef::timestamp())
                .field("title", FieldDef::string())
                .field("embedding", FieldDef::array(FieldType::Float32))
                .field(
                    "customer",
                    FieldDef::relation(RelationDef::new("customers", "customer_id", "id")),
                ),
            EntitySchema::new("customers")
                .field("id", FieldDef::identifier())
                .field("name", FieldDef::string())
                .field("tier", FieldDef::string())
                .field("region_id", FieldDef::identifier())
                .field(
                    "region",
                    FieldDef::relation(RelationDef::new("regions", "region_id", "id")),
                ),
            EntitySchema::new("regions")
                .field("id", FieldDef::identifier())
                .field("name", FieldDef::string()),
        ])
    }

    /// Resolves `path` on `entity` in `catalog()`
    pub fn catalog_field(entity: &str, path: &str) -> crate::schema::FieldRef {
        use crate::schema::SchemaView;
        let path = crate::path::parse_path(path).unwrap();
        catalog().resolve(entity, &path).unwrap()
    }

    /// Builds a canonical query against `catalog()`, panicking on rejection
    pub fn compile_canonical(builder: QueryBuilder) -> CanonicalQuery {
        let catalog = catalog();
        let config = CompilerConfig::default();
        let query = builder.tenant("acme").build();
        match CqmBuilder::new(&catalog, &AllowAll, &config).build(&query) {
            Ok(canonical) => canonical,
            Err(errors) => panic!("query rejected: {:?}", errors),
        }
    }
}
