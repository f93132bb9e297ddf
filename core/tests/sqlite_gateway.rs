use std::sync::Arc;

use sqlgate::prelude::*;
use sqlgate::{
    ClassMethodsHydrator, DatabaseConfig, HydratingResultSet, PrimaryKey, ResultSet,
    SqliteAdapter,
};
use tempfile::TempDir;

#[derive(Debug, Default, Clone, PartialEq, Entity)]
struct Folder {
    folder_id: i64,
    #[entity(column = "folder_name")]
    name: String,
    #[entity(setter)]
    file_count: i64,
    parent_id: Option<i64>,
    #[entity(skip)]
    loaded: bool,
}

impl Folder {
    fn set_file_count(&mut self, count: i64) {
        self.file_count = count.max(0);
        self.loaded = true;
    }
}

async fn setup() -> (TempDir, Arc<dyn DatabaseAdapter>) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gateway.db");
    let adapter: Arc<dyn DatabaseAdapter> =
        Arc::new(SqliteAdapter::new(DatabaseConfig::sqlite(path.to_string_lossy())));
    adapter
        .query(
            "CREATE TABLE folders (\
             folder_id INTEGER PRIMARY KEY AUTOINCREMENT, \
             folder_name TEXT NOT NULL, \
             file_count INTEGER NOT NULL DEFAULT 0, \
             parent_id INTEGER)",
            &[],
        )
        .await
        .unwrap();
    adapter
        .query(
            "CREATE TABLE shares (folder_id INTEGER NOT NULL, user_id INTEGER NOT NULL, \
             role TEXT NOT NULL, PRIMARY KEY (folder_id, user_id))",
            &[],
        )
        .await
        .unwrap();
    (dir, adapter)
}

fn folder_gateway(adapter: Arc<dyn DatabaseAdapter>) -> TableGateway<Folder> {
    TableGateway::with_hydrator(
        "folders",
        adapter,
        "folder_id",
        Arc::new(ClassMethodsHydrator::new()),
        Arc::new(Folder::default),
    )
}

#[test]
fn test_derived_columns_and_snapshot() {
    assert_eq!(
        Folder::COLUMNS,
        &["folder_id", "folder_name", "file_count", "parent_id"]
    );
    let folder = Folder {
        folder_id: 3,
        name: "docs".into(),
        file_count: 2,
        parent_id: None,
        loaded: true,
    };
    let row = folder.extract();
    assert_eq!(row.columns().collect::<Vec<_>>(), Folder::COLUMNS.to_vec());
    assert_eq!(row.get("folder_name"), Some(&BindValue::from("docs")));
    assert_eq!(row.get("parent_id"), Some(&BindValue::Null));
}

#[test]
fn test_derived_target_with_hydrator() {
    let hydrator = ClassMethodsHydrator::new();
    let row = row! {
        "folder_id" => 9i64,
        "folder_name" => "music",
        "file_count" => -4i64,
        "parent_id" => 1i64,
        "unknown" => "ignored",
    };
    let folder = hydrator.hydrate(&row, Folder::default()).unwrap();
    assert_eq!(folder.folder_id, 9);
    assert_eq!(folder.name, "music");
    // 通过 setter 填充
    assert_eq!(folder.file_count, 0);
    assert!(folder.loaded);
    assert_eq!(folder.parent_id, Some(1));
}

#[tokio::test]
async fn test_gateway_crud_with_hydration() {
    let (_dir, adapter) = setup().await;
    let folders = folder_gateway(adapter.clone());

    let root = folders
        .insert(&row! { "folder_name" => "root" })
        .await
        .unwrap();
    let root_id = i64::from_value(root.inserted_id.clone().unwrap()).unwrap();
    for name in ["a", "b", "c"] {
        folders
            .insert(&row! { "folder_name" => name, "parent_id" => root_id, "file_count" => 1 })
            .await
            .unwrap();
    }

    let fetched = folders.get(root_id).await.unwrap().unwrap();
    assert_eq!(fetched.name, "root");
    assert_eq!(fetched.parent_id, None);
    assert!(folders.get(999).await.unwrap().is_none());

    let children = folders
        .select(
            WhereMap::new().eq("parent_id", root_id).into(),
            SelectOptions::new().order("folder_name DESC").limit(2),
        )
        .await
        .unwrap();
    assert_eq!(
        children.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
        vec!["c", "b"]
    );

    let top_level = folders
        .select(WhereMap::new().null("parent_id").into(), SelectOptions::new())
        .await
        .unwrap();
    assert_eq!(top_level.len(), 1);

    let picked = folders
        .select(
            WhereMap::new().any("folder_name", ["a", "c", "zzz"]).into(),
            SelectOptions::new().order("folder_id"),
        )
        .await
        .unwrap();
    assert_eq!(picked.len(), 2);

    let none = folders
        .select(
            WhereMap::new().any("folder_name", Vec::<String>::new()).into(),
            SelectOptions::new(),
        )
        .await
        .unwrap();
    assert!(none.is_empty());

    let updated = folders
        .update(
            WhereSpec::callback(move |u: Update| {
                u.where_eq("parent_id", root_id).where_ne("folder_name", "b")
            }),
            row! { "file_count" => 10 },
        )
        .await
        .unwrap();
    assert_eq!(updated.affected_rows, 2);

    let err = folders
        .update(WhereSpec::All, row! { "file_count" => 0 })
        .await
        .unwrap_err();
    assert!(matches!(err, SqlGateError::MissingWhere { .. }));

    let deleted = folders
        .delete(WhereSpec::Builder(
            Delete::new().from("folders").where_eq("folder_name", "a"),
        ))
        .await
        .unwrap();
    assert_eq!(deleted.affected_rows, 1);

    let remaining = folders
        .select(WhereSpec::All, SelectOptions::new())
        .await
        .unwrap();
    assert_eq!(remaining.len(), 3);
}

#[tokio::test]
async fn test_insert_entity_and_factory() {
    let (_dir, adapter) = setup().await;
    let folders = folder_gateway(adapter.clone());
    let entity = Folder {
        folder_id: 40,
        name: "explicit".into(),
        file_count: 1,
        parent_id: None,
        loaded: false,
    };
    let result = folders.insert_entity(&entity).await.unwrap();
    assert_eq!(result.inserted_id, Some(BindValue::Int64(40)));

    let names: TableGateway<String> =
        TableGateway::with_factory("folders", adapter, "folder_id", |row| {
            row.get_as::<String>("folder_name")
        });
    assert_eq!(names.get(40).await.unwrap(), Some("explicit".to_string()));
}

#[tokio::test]
async fn test_composite_key_gateway() {
    let (_dir, adapter) = setup().await;
    let shares = TableGateway::new("shares", adapter, vec!["folder_id", "user_id"]);
    assert_eq!(
        shares.primary_key(),
        &PrimaryKey::Composite(vec!["folder_id".into(), "user_id".into()])
    );

    shares
        .insert(&row! { "folder_id" => 1, "user_id" => 7, "role" => "owner" })
        .await
        .unwrap();
    shares
        .insert(&row! { "folder_id" => 1, "user_id" => 8, "role" => "viewer" })
        .await
        .unwrap();

    assert!(shares.get(1).await.unwrap_err().is_builder_error());
    let owner = shares
        .get_by_key(vec![1.into(), 7.into()])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(owner.get_as::<String>("role").unwrap(), "owner");

    let removed = shares
        .delete(WhereMap::new().eq("folder_id", 1).eq("user_id", 8).into())
        .await
        .unwrap();
    assert!(removed.success);
}

#[tokio::test]
async fn test_transaction_commits_and_rolls_back() {
    let (_dir, adapter) = setup().await;

    adapter
        .transaction(|tx| {
            Box::pin(async move {
                Insert::new()
                    .into("folders")
                    .values(row! { "folder_name" => "kept" })
                    .execute(tx)
                    .await?;
                Ok::<_, SqlGateError>(())
            })
        })
        .await
        .unwrap();

    let failed: Result<()> = adapter
        .transaction(|tx| {
            Box::pin(async move {
                Insert::new()
                    .into("folders")
                    .values(row! { "folder_name" => "discarded" })
                    .execute(tx)
                    .await?;
                Err(SqlGateError::Other("abort".into()))
            })
        })
        .await;
    assert!(matches!(failed, Err(SqlGateError::Other(message)) if message == "abort"));

    let names: Vec<String> = Select::new()
        .from("folders")
        .column("folder_name")
        .execute(adapter.as_ref())
        .await
        .unwrap()
        .iter()
        .map(|row| row.get_as("folder_name").unwrap())
        .collect();
    assert_eq!(names, vec!["kept"]);
}

#[tokio::test]
async fn test_result_sets_over_live_rows() {
    let (_dir, adapter) = setup().await;
    for name in ["x", "y"] {
        adapter
            .insert("folders", &row! { "folder_name" => name })
            .await
            .unwrap();
    }
    let rows = Select::new()
        .from("folders")
        .order("folder_id")
        .execute(adapter.as_ref())
        .await
        .unwrap();

    let mut plain: ResultSet = ResultSet::new();
    plain.initialize(rows.clone());
    assert_eq!(plain.count(), 2);
    assert_eq!(plain.to_array().unwrap(), rows);

    let mut hydrating: HydratingResultSet<Folder> = HydratingResultSet::new(
        Arc::new(ClassMethodsHydrator::new()),
        Arc::new(Folder::default),
    );
    hydrating.initialize(rows);
    assert_eq!(hydrating.first().unwrap().map(|f| f.name.clone()), Some("x".into()));
    let all = hydrating.to_array().unwrap();
    assert_eq!(all[1].name, "y");
    assert!(all.iter().all(|f| f.loaded));
}
