use sqlgate::prelude::*;
use sqlgate::{
    DatabaseConfig, FetchMode, Fetched, OnConflict, Operator, SqliteAdapter, Statement, SubQuery,
};
use tempfile::TempDir;

/// 在临时目录中建立一个带数据的 SQLite 库
async fn setup() -> (TempDir, SqliteAdapter) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("builders.db");
    let adapter = SqliteAdapter::new(DatabaseConfig::sqlite(path.to_string_lossy()));

    adapter
        .query(
            "CREATE TABLE users (\
             id INTEGER PRIMARY KEY AUTOINCREMENT, \
             name TEXT NOT NULL UNIQUE, \
             age INTEGER NOT NULL, \
             status TEXT NOT NULL, \
             team_id INTEGER)",
            &[],
        )
        .await
        .unwrap();
    adapter
        .query(
            "CREATE TABLE teams (team_id INTEGER PRIMARY KEY, title TEXT NOT NULL)",
            &[],
        )
        .await
        .unwrap();

    Insert::new()
        .into("teams")
        .batch_values([
            row! { "team_id" => 1, "title" => "core" },
            row! { "team_id" => 2, "title" => "ops" },
        ])
        .execute(&adapter)
        .await
        .unwrap();

    Insert::new()
        .into("users")
        .batch_values([
            row! { "name" => "ann", "age" => 31, "status" => "active", "team_id" => Some(1) },
            row! { "name" => "bob", "age" => 17, "status" => "active", "team_id" => Some(2) },
            row! { "name" => "cid", "age" => 45, "status" => "banned", "team_id" => Some(1) },
            row! { "name" => "dee", "age" => 22, "status" => "active", "team_id" => Option::<i64>::None },
        ])
        .execute(&adapter)
        .await
        .unwrap();

    (dir, adapter)
}

fn names(rows: &[Row]) -> Vec<String> {
    rows.iter()
        .map(|row| row.get_as::<String>("name").unwrap())
        .collect()
}

#[tokio::test]
async fn test_select_filters_order_and_paging() {
    let (_dir, adapter) = setup().await;

    let rows = Select::new()
        .from("users")
        .where_eq("status", "active")
        .where_ge("age", 18)
        .order("age DESC")
        .execute(&adapter)
        .await
        .unwrap();
    assert_eq!(names(&rows), vec!["ann", "dee"]);

    let page = Select::new()
        .from("users")
        .order("id")
        .limit(2)
        .offset(1)
        .execute(&adapter)
        .await
        .unwrap();
    assert_eq!(names(&page), vec!["bob", "cid"]);

    let offset_only = Select::new()
        .from("users")
        .order("id")
        .offset(3)
        .execute(&adapter)
        .await
        .unwrap();
    assert_eq!(names(&offset_only), vec!["dee"]);

    let nothing = Select::new()
        .from("users")
        .where_in("id", Vec::<i64>::new())
        .execute(&adapter)
        .await
        .unwrap();
    assert!(nothing.is_empty());
}

#[tokio::test]
async fn test_join_group_having() {
    let (_dir, adapter) = setup().await;

    let rows = Select::new()
        .from_alias("users", "u")
        .columns(["t.title", "COUNT(*) AS members"])
        .join("teams AS t", "t.team_id = u.team_id")
        .group("t.title")
        .having_bind("COUNT(*) >= ?", 2)
        .execute(&adapter)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_as::<String>("title").unwrap(), "core");
    assert_eq!(rows[0].get_as::<i64>("members").unwrap(), 2);

    let left = Select::new()
        .from_alias("users", "u")
        .columns(["u.name", "t.title"])
        .left_join("teams AS t", "t.team_id = u.team_id")
        .where_null("t.title")
        .execute(&adapter)
        .await
        .unwrap();
    assert_eq!(names(&left), vec!["dee"]);
}

#[tokio::test]
async fn test_subqueries_and_groups() {
    let (_dir, adapter) = setup().await;

    let in_core = Select::new()
        .from("users")
        .where_in_query(
            "team_id",
            Select::new()
                .from("teams")
                .column("team_id")
                .where_bind("title = ?", "core"),
        )
        .where_group(|g| g.where_eq("status", "banned").or_where_op("age", Operator::Lt, 40))
        .order("name")
        .execute(&adapter)
        .await
        .unwrap();
    assert_eq!(names(&in_core), vec!["ann", "cid"]);

    let with_team = Select::new()
        .from_alias("teams", "t")
        .where_exists(SubQuery::raw(
            "SELECT 1 FROM users u WHERE u.team_id = t.team_id AND u.age < ?",
            vec![BindValue::from(18)],
        ))
        .execute(&adapter)
        .await
        .unwrap();
    assert_eq!(with_team.len(), 1);
    assert_eq!(with_team[0].get_as::<String>("title").unwrap(), "ops");
}

#[tokio::test]
async fn test_union_on_sqlite() {
    let (_dir, adapter) = setup().await;

    let rows = UnionSelect::new(false)
        .add(
            Select::new()
                .from("users")
                .column("name")
                .where_bind("age > ?", 40),
            None,
        )
        .unwrap()
        .union(
            Select::new()
                .from("teams")
                .column("title AS name")
                .where_bind("team_id = ?", 2),
        )
        .unwrap()
        .union_all(SubQuery::raw("SELECT name FROM users WHERE name = $1", vec!["ann".into()]))
        .unwrap()
        .order("name")
        .unwrap()
        .execute(&adapter)
        .await
        .unwrap();
    assert_eq!(names(&rows), vec!["ann", "cid", "ops"]);
}

#[tokio::test]
async fn test_insert_reports_id_and_upserts() {
    let (_dir, adapter) = setup().await;

    let inserted = Insert::new()
        .into("users")
        .values(row! { "name" => "eve", "age" => 28, "status" => "active" })
        .execute(&adapter)
        .await
        .unwrap();
    assert!(inserted.success);
    assert_eq!(inserted.inserted_id, Some(BindValue::Int64(5)));

    let ignored = Insert::new()
        .into("users")
        .values(row! { "name" => "eve", "age" => 99, "status" => "x" })
        .on_conflict(OnConflict::ignore())
        .execute(&adapter)
        .await
        .unwrap();
    assert_eq!(ignored.affected_rows, 0);

    Insert::new()
        .into("users")
        .values(row! { "name" => "eve", "age" => 29, "status" => "active" })
        .on_conflict(OnConflict::update(row! { "age" => 29 }).on_columns(["name"]))
        .execute(&adapter)
        .await
        .unwrap();
    let age = adapter
        .fetch_one("SELECT age FROM users WHERE name = ?", &["eve".into()])
        .await
        .unwrap();
    assert_eq!(i64::from_value(age).unwrap(), 29);

    let err = Insert::new()
        .into("users")
        .execute(&adapter)
        .await
        .unwrap_err();
    assert!(err.is_builder_error());
}

#[tokio::test]
async fn test_update_and_delete() {
    let (_dir, adapter) = setup().await;

    let updated = Update::new()
        .table("users")
        .increment("age", 1)
        .set("status", "senior")
        .where_gt("age", 30)
        .execute(&adapter)
        .await
        .unwrap();
    assert_eq!(updated.affected_rows, 2);

    let none = Update::new()
        .table("users")
        .set("status", "x")
        .where_eq("name", "nobody")
        .execute(&adapter)
        .await
        .unwrap();
    assert!(!none.success);

    // 空 IN 列表在写语句中是错误，不会执行
    let err = Update::new()
        .table("users")
        .set("status", "x")
        .where_in("id", Vec::<i64>::new())
        .execute(&adapter)
        .await
        .unwrap_err();
    assert!(err.is_builder_error());

    let deleted = Delete::new()
        .from("users")
        .where_eq("status", "senior")
        .execute(&adapter)
        .await
        .unwrap();
    assert_eq!(deleted.affected_rows, 2);

    let joined = Delete::new()
        .from("users")
        .join("teams", "t", "t.team_id = users.team_id")
        .where_eq("status", "active")
        .build(adapter.dialect());
    assert!(joined.unwrap_err().is_builder_error());

    let cleared = Delete::new().from("users").truncate(&adapter).await.unwrap();
    assert!(cleared.success);
    let count = adapter
        .fetch_one("SELECT COUNT(*) FROM users", &[])
        .await
        .unwrap();
    assert_eq!(i64::from_value(count).unwrap(), 0);
}

#[tokio::test]
async fn test_prepared_statement_named_parameters() {
    let (_dir, adapter) = setup().await;

    let mut stmt = Statement::new(
        "SELECT name, age FROM users WHERE status = :status AND age >= :min ORDER BY age",
    );
    stmt.bind_named("status", "active")
        .bind_named("min", 18)
        .fetch_mode(FetchMode::Array);
    assert_eq!(stmt.execute(&adapter).await.unwrap(), 2);
    assert_eq!(
        stmt.fetch(),
        Some(Fetched::Array(vec![BindValue::from("dee"), BindValue::Int64(22)]))
    );
    assert_eq!(stmt.fetch_column(0), Some(BindValue::from("ann")));
    assert_eq!(stmt.fetch(), None);

    let mut insert = adapter.prepare("INSERT INTO teams (title) VALUES (?)");
    insert.bind(0, "qa");
    assert_eq!(insert.execute(&adapter).await.unwrap(), 1);
    assert_eq!(insert.last_insert_id(), Some(BindValue::Int64(3)));
}

#[tokio::test]
async fn test_schema_introspection_and_reconnect() {
    let (_dir, adapter) = setup().await;

    assert_eq!(adapter.list_tables().await.unwrap(), vec!["teams", "users"]);
    assert!(adapter.table_exists("USERS").await.unwrap());
    assert!(!adapter.table_exists("missing").await.unwrap());
    assert!(!adapter.server_version().await.unwrap().is_empty());

    adapter.disconnect().await.unwrap();
    assert!(!adapter.is_connected());

    // 断开后下一次查询重新建立连接池
    let count = adapter
        .fetch_one("SELECT COUNT(*) FROM users", &[])
        .await
        .unwrap();
    assert_eq!(i64::from_value(count).unwrap(), 4);
    assert!(adapter.is_connected());
}

#[tokio::test]
async fn test_writes_to_output_column_report_affected_rows() {
    let (_dir, adapter) = setup().await;
    adapter
        .query("CREATE TABLE jobs (id INTEGER PRIMARY KEY, output TEXT)", &[])
        .await
        .unwrap();
    adapter
        .insert("jobs", &row! { "id" => 1, "output" => "pending" })
        .await
        .unwrap();

    let updated = Update::new()
        .table("jobs")
        .set("output", "done")
        .where_eq("id", 1)
        .execute(&adapter)
        .await
        .unwrap();
    assert_eq!(updated.affected_rows, 1);
    assert!(updated.success);

    let deleted = Delete::new()
        .from("jobs")
        .where_eq("output", "done")
        .execute(&adapter)
        .await
        .unwrap();
    assert_eq!(deleted.affected_rows, 1);
    assert!(deleted.success);
}

#[tokio::test]
async fn test_table_info_describes_columns() {
    let (_dir, adapter) = setup().await;

    let info = adapter.table_info("users").await.unwrap();
    assert_eq!(info.table, "users");
    let columns: Vec<&str> = info.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(columns, vec!["id", "name", "age", "status", "team_id"]);
    assert_eq!(info.primary_key(), vec!["id"]);

    let id = info.column("id").unwrap();
    assert!(id.primary_key);
    assert!(id.auto_increment);
    assert_eq!(id.data_type, "INTEGER");

    let name = info.column("name").unwrap();
    assert!(!name.nullable);
    assert!(!name.auto_increment);
    assert!(info.column("team_id").unwrap().nullable);

    let missing = adapter.table_info("missing").await.unwrap();
    assert!(missing.columns.is_empty());
}

#[tokio::test]
async fn test_insert_batch_reports_count_and_first_id() {
    let (_dir, adapter) = setup().await;

    let result = adapter
        .insert_batch(
            "teams",
            &[row! { "title" => "data" }, row! { "title" => "infra" }],
        )
        .await
        .unwrap();
    assert_eq!(result.inserted_count, 2);
    assert_eq!(result.first_inserted_id, Some(BindValue::Int64(3)));
    assert!(result.success);

    let err = adapter.insert_batch("teams", &[]).await.unwrap_err();
    assert!(err.is_builder_error());

    // 中途失败时整批回滚
    let failed = adapter
        .insert_batch(
            "users",
            &[
                row! { "name" => "eve", "age" => 28, "status" => "active" },
                row! { "name" => "ann", "age" => 50, "status" => "active" },
            ],
        )
        .await;
    assert!(failed.is_err());
    let count = adapter
        .fetch_one("SELECT COUNT(*) FROM users", &[])
        .await
        .unwrap();
    assert_eq!(i64::from_value(count).unwrap(), 4);
}
