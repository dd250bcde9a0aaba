//! Eager loading against a real SQLite database file.

use leanrow_query::{
    AssociationRef, EagerLoad, EagerLoadBuilder, ErrorCode, JoinTable, ModelQuery, ModelSpec,
    OrderByField, QueryLog, RawQuery, SchemaRegistry, Session, Value,
};
use leanrow_sqlite::{SqliteConfig, SqlitePool, SqliteRunner};
use pretty_assertions::assert_eq;

const SCHEMA: &str = "
    CREATE TABLE categories (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
    CREATE TABLE widgets (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        cat_id INTEGER REFERENCES categories(id),
        active BOOLEAN NOT NULL DEFAULT 1
    );
    CREATE TABLE parts (
        id INTEGER PRIMARY KEY,
        widget_id INTEGER NOT NULL REFERENCES widgets(id),
        name TEXT NOT NULL,
        position INTEGER NOT NULL
    );
    CREATE TABLE tags (id INTEGER PRIMARY KEY, label TEXT NOT NULL);
    CREATE TABLE widgets_tags (widget_id INTEGER NOT NULL, tag_id INTEGER NOT NULL);

    INSERT INTO categories VALUES (5, 'A'), (6, 'B');
    INSERT INTO widgets VALUES (1, 'gear', 5, 1), (2, 'cog', NULL, 0), (3, 'lever', 5, 1);
    INSERT INTO parts VALUES
        (10, 1, 'bolt', 2),
        (11, 1, 'nut', 1),
        (12, 3, 'pin', 1);
    INSERT INTO tags VALUES (50, 'red'), (51, 'blue');
    INSERT INTO widgets_tags VALUES (1, 51), (1, 50), (3, 50);
";

fn schema() -> SchemaRegistry {
    SchemaRegistry::new()
        .model(
            ModelSpec::new("Widget", "widgets")
                .primary_key("id")
                .association(AssociationRef::belongs_to("category", "Category").foreign_key("cat_id"))
                .association(AssociationRef::has_many("parts", "Part").foreign_key("widget_id"))
                .association(AssociationRef::has_and_belongs_to_many(
                    "tags",
                    "Tag",
                    JoinTable::new("widgets_tags", "widget_id", "tag_id"),
                )),
        )
        .model(
            ModelSpec::new("Category", "categories")
                .primary_key("id")
                .association(AssociationRef::has_many("widgets", "Widget").foreign_key("cat_id")),
        )
        .model(ModelSpec::new("Part", "parts").primary_key("id"))
        .model(ModelSpec::new("Tag", "tags").primary_key("id"))
}

async fn setup() -> (tempfile::TempDir, Session<SqliteRunner>) {
    let dir = tempfile::tempdir().unwrap();
    let pool = SqlitePool::new(SqliteConfig::file(dir.path().join("leanrow.db")))
        .await
        .unwrap();
    let runner = SqliteRunner::new(pool);
    runner.execute_batch(SCHEMA).await.unwrap();
    (dir, Session::new(runner).with_schema(schema()))
}

#[tokio::test]
async fn test_belongs_to_and_has_many() {
    let (_dir, session) = setup().await;
    let log = QueryLog::new();

    let widgets = ModelQuery::new("Widget")
        .order_by(OrderByField::asc("id"))
        .eager_load("category")
        .eager_load_with(EagerLoad::new("parts").order_by(OrderByField::asc("position")))
        .query_log(log.clone())
        .run(&session)
        .await
        .unwrap();

    assert_eq!(widgets.len(), 3);
    assert_eq!(widgets[0].one("category").unwrap().get_str("name"), Some("A"));
    assert!(widgets[1].one("category").is_none());
    assert_eq!(widgets[2].one("category").unwrap().get_str("name"), Some("A"));

    let parts: Vec<&str> = widgets[0]
        .many("parts")
        .iter()
        .filter_map(|p| p.get_str("name"))
        .collect();
    assert_eq!(parts, vec!["nut", "bolt"]);
    assert!(widgets[1].many("parts").is_empty());

    // Declared BOOLEAN columns come back as booleans.
    assert_eq!(widgets[1].get("active"), Some(&Value::Bool(false)));
    assert_eq!(log.len(), 3);
}

#[tokio::test]
async fn test_many_to_many_and_nested() {
    let (_dir, session) = setup().await;

    let categories = RawQuery::new("SELECT * FROM categories WHERE id = %{id}")
        .bind("id", 5)
        .model("Category")
        .eager_load_with(
            EagerLoad::new("widgets")
                .order_by(OrderByField::asc("id"))
                .eager_load_with(EagerLoad::new("tags").order_by(OrderByField::asc("label"))),
        )
        .run(&session)
        .await
        .unwrap();

    let widgets = categories[0].many("widgets");
    assert_eq!(widgets.len(), 2);

    let labels: Vec<&str> = widgets[0]
        .many("tags")
        .iter()
        .filter_map(|t| t.get_str("label"))
        .collect();
    assert_eq!(labels, vec!["blue", "red"]);
    assert_eq!(widgets[1].many("tags")[0].get_str("label"), Some("red"));
}

#[tokio::test]
async fn test_scope_select_keeps_key_column() {
    let (_dir, session) = setup().await;

    let widgets = ModelQuery::new("Widget")
        .select(["name"])
        .filter("active = %{on}")
        .bind("on", true)
        .order_by(OrderByField::asc("id"))
        .eager_load_with(EagerLoad::new("parts").select(["name"]))
        .run(&session)
        .await
        .unwrap();

    assert_eq!(widgets.len(), 2);
    assert_eq!(widgets[0].columns(), ["name".to_string(), "id".to_string()]);
    let part = &widgets[0].many("parts")[0];
    assert!(part.has_column("widget_id"));
    assert!(!part.has_column("position"));
}

#[tokio::test]
async fn test_ad_hoc_load() {
    let (_dir, session) = setup().await;

    let err = RawQuery::new("SELECT id, name FROM widgets ORDER BY id")
        .eager_load_one(
            "first_part",
            "SELECT widget_id, name FROM parts WHERE widget_id IN (%{ids}) AND position = %{pos}",
            "id",
            "widget_id",
        )
        .run(&session)
        .await
        .unwrap_err();
    // `pos` is unbound on the node.
    assert_eq!(err.code, ErrorCode::MissingBind);

    let widgets = RawQuery::new("SELECT id, name FROM widgets ORDER BY id")
        .eager_load_with(
            EagerLoad::one(
                "first_part",
                "SELECT widget_id, name FROM parts WHERE widget_id IN (%{ids}) AND position = %{pos}",
                "id",
                "widget_id",
            )
            .bind("pos", 1),
        )
        .run(&session)
        .await
        .unwrap();

    assert_eq!(widgets[0].one("first_part").unwrap().get_str("name"), Some("nut"));
    assert!(widgets[1].one("first_part").is_none());
    assert_eq!(widgets[2].one("first_part").unwrap().get_str("name"), Some("pin"));
}

#[tokio::test]
async fn test_driver_error_aborts() {
    let (_dir, session) = setup().await;
    let schema = schema().model(
        ModelSpec::new("Widget", "widgets")
            .primary_key("id")
            .association(AssociationRef::has_many("gizmos", "Gizmo").foreign_key("widget_id")),
    )
    .model(ModelSpec::new("Gizmo", "gizmos").primary_key("id"));
    let session = Session::new(session.runner().clone()).with_schema(schema);

    let err = ModelQuery::new("Widget")
        .eager_load("gizmos")
        .run(&session)
        .await
        .unwrap_err();
    assert!(err.is_execution_error());
}
