#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use persistkit_core::config::{Backend, RepoSettings, RelationalSettings};
use persistkit_core::errors::{ExErrorKind, PersistError};
use persistkit_core::mapper::{EntitySchema, FieldKind};
use persistkit_core::registry::{EntityConfig, EntityRegistry, Relation};
use persistkit_core::repository::{ListQuery, Repository};
use persistkit_core::value::Record;
use persistkit_core::Criteria;
use persistkit_engine::{BackendHandles, PersistenceContext};
use persistkit_store::document::InProcessDatabase;
use persistkit_store::relational::schema_evolve::index_names;
use persistkit_store::relational::SqliteEngine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

fn rec(v: Value) -> Record {
    v.as_object().cloned().unwrap()
}

/// Orders on SQLite, customers in the document store, products in memory
fn shop_registry() -> EntityRegistry {
    EntityRegistry::builder()
        .register(
            "customer",
            EntityConfig::new(
                EntitySchema::new("Customer")
                    .field("id", FieldKind::Integer)
                    .field("name", FieldKind::Text)
                    .optional_field("email", FieldKind::Text),
                "customers",
            )
            .unique("email", "email")
            .backend(Backend::Document),
        )
        .register(
            "product",
            EntityConfig::new(EntitySchema::new("Product").field("title", FieldKind::Text), "products")
                .backend(Backend::Memory),
        )
        .register(
            "order",
            EntityConfig::new(
                EntitySchema::new("Order")
                    .field("id", FieldKind::Integer)
                    .field("customerId", FieldKind::Integer)
                    .field("total", FieldKind::Real)
                    .optional_field("productIds", FieldKind::UuidList),
                "orders",
            )
            .backend(Backend::Relational)
            .relation("customer", Relation::one("customerId", "customer"))
            .relation("products", Relation::many("productIds", "product")),
        )
        .build()
        .unwrap()
}

fn shop() -> (PersistenceContext, SqliteEngine, Arc<InProcessDatabase>) {
    let engine = SqliteEngine::open_in_memory(true).unwrap();
    let db = Arc::new(InProcessDatabase::new("shop"));
    let handles = BackendHandles::none()
        .with_relational(engine.clone())
        .with_document(db.clone());
    let ctx = PersistenceContext::new(shop_registry(), RepoSettings::default(), handles);
    (ctx, engine, db)
}

#[tokio::test]
async fn test_missing_customer_populates_as_null_across_backends() {
    // GIVEN an order on SQLite whose customer 42 is absent from the document store
    let (ctx, _, _) = shop();
    let orders = ctx.populating_repository("order").unwrap();
    orders
        .add(rec(json!({"id": 1, "customerId": 42, "total": 9.99})))
        .await
        .unwrap();

    // WHEN populating the customer
    let populated = orders.get_with(&json!(1), &["customer"]).await.unwrap().unwrap();

    // THEN the relation is null and the rest of the row is intact
    assert_eq!(populated["customer"], Value::Null);
    assert_eq!(populated["customerId"], json!(42));
    assert_eq!(populated["total"], json!(9.99));
}

#[tokio::test]
async fn test_relations_resolve_on_their_own_backends() {
    // GIVEN a customer (document), products (memory) and an order (relational)
    let (ctx, _, _) = shop();
    ctx.repository("customer")
        .unwrap()
        .add(rec(json!({"id": 7, "name": "Ada", "email": "ada@x.io"})))
        .await
        .unwrap();
    let products = ctx.repository("product").unwrap();
    products.add(rec(json!({"id": "p1", "title": "Lamp"}))).await.unwrap();
    products.add(rec(json!({"id": "p3", "title": "Desk"}))).await.unwrap();

    let orders = ctx.populating_repository("order").unwrap();
    orders
        .add(rec(json!({"id": 1, "customerId": 7, "total": 30.0, "productIds": ["p3", "p2", "p1"]})))
        .await
        .unwrap();

    // WHEN listing orders with both relations
    let listed = orders
        .list_by_fields_with(
            &Criteria::new().eq("customerId", 7),
            &ListQuery::default(),
            &["customer", "products"],
        )
        .await
        .unwrap();

    // THEN the customer is embedded and the missing product is dropped
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["customer"], json!({"id": 7, "name": "Ada", "email": "ada@x.io"}));
    assert_eq!(
        listed[0]["products"],
        json!([{"id": "p3", "title": "Desk"}, {"id": "p1", "title": "Lamp"}])
    );
}

#[tokio::test]
async fn test_nested_include_without_bare_root() {
    let registry = EntityRegistry::builder()
        .register(
            "company",
            EntityConfig::new(EntitySchema::new("Company").field("name", FieldKind::Text), "companies"),
        )
        .register(
            "user",
            EntityConfig::new(
                EntitySchema::new("User").field("companyId", FieldKind::Text),
                "users",
            )
            .backend(Backend::Document)
            .relation("company", Relation::one("companyId", "company")),
        )
        .register(
            "post",
            EntityConfig::new(EntitySchema::new("Post").field("authorId", FieldKind::Text), "posts")
                .backend(Backend::Relational)
                .relation("author", Relation::one("authorId", "user")),
        )
        .build()
        .unwrap();
    let handles = BackendHandles::in_process(&RepoSettings::default()).unwrap();
    let ctx = PersistenceContext::new(registry, RepoSettings::default(), handles);

    ctx.repository("company")
        .unwrap()
        .add(rec(json!({"id": "c1", "name": "Initech"})))
        .await
        .unwrap();
    ctx.repository("user")
        .unwrap()
        .add(rec(json!({"id": "u1", "companyId": "c1"})))
        .await
        .unwrap();
    let posts = ctx.populating_repository("post").unwrap();
    posts.add(rec(json!({"id": "x1", "authorId": "u1"}))).await.unwrap();

    let post = posts.get_with(&json!("x1"), &["author.company"]).await.unwrap().unwrap();

    assert_eq!(post["author"]["id"], json!("u1"));
    assert_eq!(post["author"]["company"], json!({"id": "c1", "name": "Initech"}));
}

#[tokio::test]
async fn test_repositories_are_cached_per_entity() {
    let (ctx, _, _) = shop();
    let first = ctx.repository("order").unwrap();
    let second = ctx.repository("order").unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.backend(), Backend::Relational);
    assert_eq!(ctx.cached_repositories(), 1);
}

#[tokio::test]
async fn test_initialize_prepares_every_backend() {
    // GIVEN a context over all three backends
    let (ctx, engine, db) = shop();

    // WHEN initializing eagerly
    ctx.initialize().await.unwrap();

    // THEN each entity has a repository and storage-side indexes exist
    assert_eq!(ctx.cached_repositories(), 3);
    let order_indexes = engine
        .run("inspect", |conn| index_names(conn, "orders"))
        .await
        .unwrap();
    assert_eq!(order_indexes, vec!["idx_orders_customerId".to_string()]);
    assert_eq!(
        db.in_process_collection("customers").index_names().await,
        vec!["uniq_email".to_string()]
    );
}

#[tokio::test]
async fn test_foreign_key_skipped_for_non_relational_target() {
    // GIVEN customers live in the document store
    let (ctx, _, _) = shop();
    let orders = ctx.ready_repository("order").await.unwrap();

    // WHEN adding an order for a customer SQLite has never seen
    let result = orders
        .add(rec(json!({"id": 1, "customerId": 99, "total": 1.0})))
        .await;

    // THEN no foreign key blocks it
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_shutdown_refuses_resolution() {
    let (ctx, _, _) = shop();
    ctx.repository("product").unwrap();

    ctx.shutdown();

    assert!(ctx.is_shut_down());
    assert_eq!(ctx.cached_repositories(), 0);
    assert!(matches!(ctx.repository("product"), Err(PersistError::ContextShutdown)));
}

#[tokio::test]
async fn test_unknown_entity_and_missing_handle() {
    let ctx = PersistenceContext::new(shop_registry(), RepoSettings::default(), BackendHandles::none());

    let unknown = ctx.repository("invoice").err().unwrap();
    assert_eq!(unknown.kind(), ExErrorKind::UnknownEntity);

    let unavailable = ctx.repository("order").err().unwrap();
    assert!(matches!(
        unavailable,
        PersistError::BackendUnavailable { ref entity_key, ref backend }
            if entity_key == "order" && backend == "relational"
    ));

    assert!(ctx.repository("product").is_ok());
}

#[tokio::test]
async fn test_population_surfaces_unavailable_target_backend() {
    // GIVEN orders reachable but customers on a backend with no handle
    let engine = SqliteEngine::open_in_memory(false).unwrap();
    let ctx = PersistenceContext::new(
        shop_registry(),
        RepoSettings::default(),
        BackendHandles::none().with_relational(engine),
    );
    let orders = ctx.populating_repository("order").unwrap();
    orders
        .add(rec(json!({"id": 1, "customerId": 7, "total": 1.0})))
        .await
        .unwrap();

    // WHEN populating the customer, THEN the failure propagates
    let err = orders.get_with(&json!(1), &["customer"]).await.unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::BackendUnavailable);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Order {
    id: i64,
    customer_id: i64,
    total: f64,
    product_ids: Option<Vec<String>>,
}

#[tokio::test]
async fn test_typed_repository_over_sqlite_file() {
    // GIVEN settings pointing at a database file
    let dir = tempfile::tempdir().unwrap();
    let settings = RepoSettings {
        backend: Backend::Relational,
        relational: RelationalSettings {
            path: Some(dir.path().join("shop.db")),
            foreign_keys: false,
        },
        ..RepoSettings::default()
    };
    let handles = BackendHandles::in_process(&settings).unwrap();
    let ctx = PersistenceContext::new(shop_registry(), settings, handles);

    // WHEN storing a typed order
    let orders = ctx.typed::<Order>("order").unwrap();
    let order = Order {
        id: 1,
        customer_id: 42,
        total: 9.99,
        product_ids: Some(vec!["p1".into()]),
    };
    orders.add(&order).await.unwrap();

    // THEN it reads back as the same value
    assert_eq!(orders.get(1).await.unwrap(), Some(order));
    let none = Order {
        id: 2,
        customer_id: 1,
        total: 0.5,
        product_ids: None,
    };
    orders.add(&none).await.unwrap();
    assert_eq!(orders.get(2).await.unwrap(), Some(none));
}

#[tokio::test]
async fn test_default_backend_comes_from_settings() {
    let registry = EntityRegistry::builder()
        .register(
            "note",
            EntityConfig::new(EntitySchema::new("Note").field("body", FieldKind::Text), "notes"),
        )
        .build()
        .unwrap();
    let settings = RepoSettings {
        backend: Backend::Document,
        ..RepoSettings::default()
    };
    let handles = BackendHandles::in_process(&settings).unwrap();
    let ctx = PersistenceContext::new(registry, settings, handles);

    assert_eq!(ctx.repository("note").unwrap().backend(), Backend::Document);
}

#[tokio::test]
async fn test_references_of_the_wrong_kind_resolve_as_missing() {
    // GIVEN relational customers keyed by integer, referenced from memory by text
    let registry = EntityRegistry::builder()
        .register(
            "customer",
            EntityConfig::new(
                EntitySchema::new("Customer")
                    .field("id", FieldKind::Integer)
                    .field("name", FieldKind::Text),
                "customers",
            )
            .backend(Backend::Relational),
        )
        .register(
            "review",
            EntityConfig::new(
                EntitySchema::new("Review")
                    .optional_field("authorRef", FieldKind::Text)
                    .optional_field("mentions", FieldKind::Json),
                "reviews",
            )
            .relation("author", Relation::one("authorRef", "customer"))
            .relation("mentioned", Relation::many("mentions", "customer")),
        )
        .build()
        .unwrap();
    let engine = SqliteEngine::open_in_memory(false).unwrap();
    let ctx = PersistenceContext::new(
        registry,
        RepoSettings::default(),
        BackendHandles::none().with_relational(engine),
    );
    ctx.repository("customer")
        .unwrap()
        .add(rec(json!({"id": 7, "name": "Ada"})))
        .await
        .unwrap();
    let reviews = ctx.populating_repository("review").unwrap();
    reviews
        .add(rec(json!({"id": "r1", "authorRef": "abc", "mentions": ["abc", 7]})))
        .await
        .unwrap();

    // WHEN populating both relations
    let review = reviews
        .get_with(&json!("r1"), &["author", "mentioned"])
        .await
        .unwrap()
        .unwrap();

    // THEN the unusable references behave like missing ones
    assert_eq!(review["author"], Value::Null);
    assert_eq!(review["mentioned"], json!([{"id": 7, "name": "Ada"}]));
}
