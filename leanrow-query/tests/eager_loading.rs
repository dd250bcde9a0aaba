//! End-to-end eager loading through the in-memory runner.

use leanrow_query::testing::MockRunner;
use leanrow_query::{
    AssociationRef, EagerLoad, EagerLoadBuilder, JoinTable, LoaderConfig, ModelQuery, ModelSpec,
    OrderByField, QueryLog, RawQuery, SchemaRegistry, Scope, Session, TabularResult, Value,
};
use pretty_assertions::assert_eq;

fn int(v: i64) -> Value {
    Value::Int(v)
}

fn text(v: &str) -> Value {
    Value::from(v)
}

fn schema() -> SchemaRegistry {
    SchemaRegistry::new()
        .model(
            ModelSpec::new("Widget", "widgets")
                .primary_key("id")
                .association(AssociationRef::belongs_to("category", "Category").foreign_key("cat_id"))
                .association(AssociationRef::has_many("parts", "Part").foreign_key("widget_id"))
                .association(
                    AssociationRef::has_many("active_parts", "Part")
                        .foreign_key("widget_id")
                        .scope(Scope::new().filter("active = %{flag}").bind("flag", true)),
                )
                .association(AssociationRef::has_one("manual", "Manual").foreign_key("widget_id"))
                .association(AssociationRef::has_and_belongs_to_many(
                    "tags",
                    "Tag",
                    JoinTable::new("widgets_tags", "widget_id", "tag_id"),
                ))
                .association(AssociationRef::through("suppliers", "parts", "supplier")),
        )
        .model(ModelSpec::new("Category", "categories").primary_key("id"))
        .model(
            ModelSpec::new("Part", "parts")
                .primary_key("id")
                .association(AssociationRef::belongs_to("supplier", "Supplier").foreign_key("supplier_id"))
                .association(AssociationRef::has_many("screws", "Screw").foreign_key("part_id")),
        )
        .model(ModelSpec::new("Supplier", "suppliers").primary_key("id"))
        .model(ModelSpec::new("Screw", "screws").primary_key("id"))
        .model(ModelSpec::new("Manual", "manuals").primary_key("id"))
        .model(ModelSpec::new("Tag", "tags").primary_key("id"))
        .model(
            ModelSpec::new("Comment", "comments")
                .primary_key("id")
                .association(AssociationRef::polymorphic_belongs_to(
                    "subject",
                    "subject_id",
                    "subject_type",
                )),
        )
}

fn widgets() -> TabularResult {
    TabularResult::new(
        ["id", "cat_id"],
        vec![
            vec![int(1), int(5)],
            vec![int(2), Value::Null],
            vec![int(3), int(5)],
        ],
    )
}

fn parts() -> TabularResult {
    TabularResult::new(
        ["id", "widget_id", "supplier_id", "name"],
        vec![
            vec![int(10), int(1), int(100), text("bolt")],
            vec![int(11), int(3), int(101), text("nut")],
            vec![int(12), int(1), int(100), text("axle")],
        ],
    )
}

fn runner() -> MockRunner {
    MockRunner::new()
        .with_table("widgets", widgets())
        .with_table(
            "categories",
            TabularResult::new(["id", "name"], vec![vec![int(5), text("A")]]),
        )
        .with_table("parts", parts())
        .with_table(
            "suppliers",
            TabularResult::new(
                ["id", "name"],
                vec![vec![int(100), text("Acme")], vec![int(101), text("Globex")]],
            ),
        )
        .with_table(
            "screws",
            TabularResult::new(
                ["id", "part_id"],
                vec![vec![int(1000), int(10)], vec![int(1001), int(10)]],
            ),
        )
}

fn session(runner: MockRunner) -> Session<MockRunner> {
    Session::new(runner).with_schema(schema())
}

#[tokio::test]
async fn test_belongs_to_round_trip() {
    let session = session(runner());
    let rows = RawQuery::new("SELECT * FROM widgets")
        .model("Widget")
        .eager_load("category")
        .run(&session)
        .await
        .unwrap();

    assert_eq!(rows.len(), 3);
    let category = rows[0].one("category").unwrap();
    assert_eq!(category.get_i64("id"), Some(5));
    assert_eq!(category.get_str("name"), Some("A"));
    assert!(rows[1].is_loaded("category"));
    assert!(rows[1].one("category").is_none());
    assert_eq!(rows[2].one("category").unwrap().get_str("name"), Some("A"));

    let lookups = session.runner().statements_for("categories");
    assert_eq!(lookups.len(), 1);
    assert_eq!(lookups[0].params, vec![int(5)]);
}

#[tokio::test]
async fn test_has_many_keeps_database_order() {
    let runner = MockRunner::new()
        .with_table("parents", TabularResult::new(["id"], vec![vec![int(1)]]))
        .with_table(
            "children",
            TabularResult::new(
                ["id", "parent_id", "seq"],
                vec![vec![int(10), int(1), int(2)], vec![int(11), int(1), int(1)]],
            ),
        );
    let schema = SchemaRegistry::new()
        .model(
            ModelSpec::new("Parent", "parents")
                .primary_key("id")
                .association(AssociationRef::has_many("children", "Child").foreign_key("parent_id")),
        )
        .model(ModelSpec::new("Child", "children").primary_key("id"));
    let session = Session::new(runner).with_schema(schema);

    let rows = ModelQuery::new("Parent")
        .eager_load("children")
        .run(&session)
        .await
        .unwrap();

    let ids: Vec<i64> = rows[0]
        .many("children")
        .iter()
        .filter_map(|c| c.get_i64("id"))
        .collect();
    assert_eq!(ids, vec![10, 11]);
}

#[tokio::test]
async fn test_one_lookup_per_association_regardless_of_batch_size() {
    let session = session(runner());
    RawQuery::new("SELECT * FROM widgets")
        .model("Widget")
        .eager_load("category")
        .eager_load("parts")
        .run(&session)
        .await
        .unwrap();
    // root + categories + parts
    assert_eq!(session.runner().statement_count(), 3);
}

#[tokio::test]
async fn test_empty_parent_batch_issues_no_lookups() {
    let session = session(MockRunner::new().with_table("widgets", TabularResult::new(["id", "cat_id"], vec![])));
    let rows = RawQuery::new("SELECT * FROM widgets")
        .model("Widget")
        .eager_load("category")
        .eager_load_path("parts.supplier")
        .run(&session)
        .await
        .unwrap();
    assert!(rows.is_empty());
    assert_eq!(session.runner().statement_count(), 1);
}

#[tokio::test]
async fn test_all_null_foreign_keys_skip_lookup() {
    let runner = runner().with_table(
        "widgets",
        TabularResult::new(["id", "cat_id"], vec![vec![int(1), Value::Null], vec![int(2), Value::Null]]),
    );
    let session = session(runner);
    let rows = RawQuery::new("SELECT * FROM widgets")
        .model("Widget")
        .eager_load("category")
        .run(&session)
        .await
        .unwrap();

    assert!(rows.iter().all(|r| r.is_loaded("category") && r.one("category").is_none()));
    assert_eq!(session.runner().statement_count(), 1);
}

#[tokio::test]
async fn test_no_cross_contamination() {
    let session = session(runner());
    let rows = RawQuery::new("SELECT * FROM widgets")
        .model("Widget")
        .eager_load("parts")
        .run(&session)
        .await
        .unwrap();

    let names = |i: usize| -> Vec<String> {
        rows[i]
            .many("parts")
            .iter()
            .filter_map(|p| p.get_str("name").map(str::to_string))
            .collect()
    };
    assert_eq!(names(0), vec!["bolt", "axle"]);
    assert!(names(1).is_empty());
    assert_eq!(names(2), vec!["nut"]);
    for part in rows[0].many("parts") {
        assert_eq!(part.get_i64("widget_id"), Some(1));
    }
}

#[tokio::test]
async fn test_nested_loads_attach_under_correct_child() {
    let session = session(runner());
    let rows = RawQuery::new("SELECT * FROM widgets")
        .model("Widget")
        .eager_load_with(EagerLoad::new("parts").eager_load("supplier").eager_load("screws"))
        .run(&session)
        .await
        .unwrap();

    let bolt = &rows[0].many("parts")[0];
    let axle = &rows[0].many("parts")[1];
    let nut = &rows[2].many("parts")[0];

    assert_eq!(bolt.one("supplier").unwrap().get_str("name"), Some("Acme"));
    assert_eq!(nut.one("supplier").unwrap().get_str("name"), Some("Globex"));
    assert_eq!(bolt.many("screws").len(), 2);
    assert!(axle.is_loaded("screws"));
    assert!(axle.many("screws").is_empty());
    assert!(nut.many("screws").is_empty());

    // root + parts + suppliers + screws
    assert_eq!(session.runner().statement_count(), 4);
}

#[tokio::test]
async fn test_single_association_keeps_first_match() {
    let runner = runner().with_table(
        "manuals",
        TabularResult::new(
            ["id", "widget_id", "title"],
            vec![
                vec![int(7), int(1), text("first")],
                vec![int(8), int(1), text("second")],
            ],
        ),
    );
    let session = session(runner);
    let rows = RawQuery::new("SELECT * FROM widgets")
        .model("Widget")
        .eager_load("manual")
        .run(&session)
        .await
        .unwrap();

    assert_eq!(rows[0].one("manual").unwrap().get_str("title"), Some("first"));
    assert!(rows[1].one("manual").is_none());
}

#[tokio::test]
async fn test_has_and_belongs_to_many() {
    let runner = runner()
        .with_table(
            "widgets_tags",
            TabularResult::new(
                ["widget_id", "tag_id"],
                vec![
                    vec![int(1), int(50)],
                    vec![int(1), int(51)],
                    vec![int(3), int(51)],
                ],
            ),
        )
        .with_table(
            "tags",
            TabularResult::new(
                ["id", "label"],
                vec![vec![int(50), text("red")], vec![int(51), text("blue")]],
            ),
        );
    let session = session(runner);
    let rows = RawQuery::new("SELECT * FROM widgets")
        .model("Widget")
        .eager_load("tags")
        .run(&session)
        .await
        .unwrap();

    let labels = |i: usize| -> Vec<String> {
        rows[i]
            .many("tags")
            .iter()
            .filter_map(|t| t.get_str("label").map(str::to_string))
            .collect()
    };
    assert_eq!(labels(0), vec!["red", "blue"]);
    assert!(labels(1).is_empty());
    assert_eq!(labels(2), vec!["blue"]);
    // root + join table + tags
    assert_eq!(session.runner().statement_count(), 3);
}

#[tokio::test]
async fn test_through_association() {
    let session = session(runner());
    let rows = RawQuery::new("SELECT * FROM widgets")
        .model("Widget")
        .eager_load("suppliers")
        .run(&session)
        .await
        .unwrap();

    let names: Vec<Option<&str>> = rows[0].many("suppliers").iter().map(|s| s.get_str("name")).collect();
    // Both parts of widget 1 come from Acme; duplicates are kept.
    assert_eq!(names, vec![Some("Acme"), Some("Acme")]);
    assert!(rows[1].many("suppliers").is_empty());
    assert_eq!(rows[2].many("suppliers")[0].get_str("name"), Some("Globex"));
    // root + parts + suppliers
    assert_eq!(session.runner().statement_count(), 3);
}

#[tokio::test]
async fn test_polymorphic_belongs_to_one_lookup_per_type() {
    let runner = runner().with_table(
        "comments",
        TabularResult::new(
            ["id", "subject_type", "subject_id"],
            vec![
                vec![int(1), text("Widget"), int(3)],
                vec![int(2), text("Part"), int(11)],
                vec![int(3), Value::Null, Value::Null],
                vec![int(4), text("Widget"), int(1)],
            ],
        ),
    );
    let session = session(runner);
    let rows = RawQuery::new("SELECT * FROM comments")
        .model("Comment")
        .eager_load("subject")
        .run(&session)
        .await
        .unwrap();

    assert_eq!(rows[0].one("subject").unwrap().get_i64("id"), Some(3));
    assert_eq!(rows[1].one("subject").unwrap().get_str("name"), Some("nut"));
    assert!(rows[2].one("subject").is_none());
    assert_eq!(rows[3].one("subject").unwrap().get_i64("cat_id"), Some(5));

    assert_eq!(session.runner().statements_for("widgets").len(), 1);
    assert_eq!(session.runner().statements_for("parts").len(), 1);
}

#[tokio::test]
async fn test_ad_hoc_loads_need_no_metadata() {
    let runner = runner().with_table(
        "notes",
        TabularResult::new(
            ["id", "widget_id", "body"],
            vec![vec![int(1), int(3), text("hi")], vec![int(2), int(3), text("there")]],
        ),
    );
    let session = Session::new(runner);
    let rows = RawQuery::new("SELECT * FROM widgets")
        .eager_load_many(
            "notes",
            "SELECT * FROM notes WHERE widget_id IN (%{ids})",
            "id",
            "widget_id",
        )
        .run(&session)
        .await
        .unwrap();

    assert!(rows[0].many("notes").is_empty());
    assert_eq!(rows[2].many("notes").len(), 2);
    let lookup = &session.runner().statements_for("notes")[0];
    assert_eq!(lookup.sql, "SELECT * FROM notes WHERE widget_id IN (?, ?, ?)");
    assert_eq!(lookup.params, vec![int(1), int(2), int(3)]);
}

#[tokio::test]
async fn test_alias_and_scope() {
    let session = session(runner());
    let rows = RawQuery::new("SELECT * FROM widgets")
        .model("Widget")
        .eager_load_with(
            EagerLoad::new("parts")
                .alias("components")
                .filter("name <> %{skip}")
                .bind("skip", "gear")
                .order_by(OrderByField::asc("name")),
        )
        .run(&session)
        .await
        .unwrap();

    assert!(!rows[0].is_loaded("parts"));
    let names: Vec<Option<&str>> = rows[0].many("components").iter().map(|p| p.get_str("name")).collect();
    assert_eq!(names, vec![Some("axle"), Some("bolt")]);

    let lookup = &session.runner().statements_for("parts")[0];
    assert_eq!(
        lookup.sql,
        "SELECT * FROM \"parts\" WHERE \"widget_id\" IN (?, ?, ?) AND (name <> ?) ORDER BY \"name\" ASC"
    );
    assert_eq!(lookup.params, vec![int(1), int(2), int(3), text("gear")]);
}

#[tokio::test]
async fn test_refinement_does_not_rebind_declared_scope() {
    let session = session(runner());
    RawQuery::new("SELECT * FROM widgets")
        .model("Widget")
        .eager_load_with(
            EagerLoad::new("active_parts")
                .filter("archived = %{flag}")
                .bind("flag", false),
        )
        .run(&session)
        .await
        .unwrap();

    let lookup = &session.runner().statements_for("parts")[0];
    assert_eq!(
        lookup.sql,
        "SELECT * FROM \"parts\" WHERE \"widget_id\" IN (?, ?, ?) AND (active = ?) AND (archived = ?)"
    );
    assert_eq!(
        lookup.params,
        vec![int(1), int(2), int(3), Value::Bool(true), Value::Bool(false)]
    );
}

#[tokio::test]
async fn test_alias_taken_by_other_association_fails_before_querying() {
    let session = session(runner());
    let err = RawQuery::new("SELECT * FROM widgets")
        .model("Widget")
        .eager_load("parts")
        .eager_load_with(EagerLoad::new("manual").alias("parts"))
        .run(&session)
        .await
        .unwrap_err();

    assert!(err.is_configuration_error());
    assert_eq!(session.runner().statement_count(), 0);
}

#[tokio::test]
async fn test_query_log_records_statements_in_order() {
    let session = session(runner());
    let log = QueryLog::new();
    RawQuery::new("SELECT * FROM widgets")
        .model("Widget")
        .eager_load_path("parts.supplier")
        .query_log(log.clone())
        .run(&session)
        .await
        .unwrap();

    let entries = log.entries();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0], "SELECT * FROM widgets");
    assert!(entries[1].contains("FROM \"parts\""));
    assert!(entries[2].contains("FROM \"suppliers\""));
}

#[tokio::test]
async fn test_sequential_matches_concurrent() {
    let load = |session: Session<MockRunner>| async move {
        let rows = RawQuery::new("SELECT * FROM widgets")
            .model("Widget")
            .eager_load("category")
            .eager_load_path("parts.supplier")
            .run(&session)
            .await
            .unwrap();
        rows.iter().map(|r| r.to_json()).collect::<Vec<_>>()
    };

    let concurrent = load(session(runner())).await;
    let sequential = load(session(runner()).with_config(LoaderConfig::sequential())).await;
    assert_eq!(concurrent, sequential);
}

#[tokio::test]
async fn test_execution_error_aborts_whole_load() {
    let session = session(runner().fail_on("\"suppliers\""));
    let err = RawQuery::new("SELECT * FROM widgets")
        .model("Widget")
        .eager_load("category")
        .eager_load_path("parts.supplier")
        .run(&session)
        .await
        .unwrap_err();
    assert!(err.is_execution_error());
}

#[tokio::test]
async fn test_unknown_association_runs_nothing() {
    let session = session(runner());
    let err = RawQuery::new("SELECT * FROM widgets")
        .model("Widget")
        .eager_load_path("parts.colour")
        .run(&session)
        .await
        .unwrap_err();
    assert!(err.is_unknown_association());
    assert_eq!(session.runner().statement_count(), 0);
}
