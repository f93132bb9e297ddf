use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sqlgate::prelude::*;
use sqlgate::{
    create_adapter, ClassMethodsHydrator, DatabaseConfig, FetchMode, OnConflict, TableGateway,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sqlite-demo")]
#[command(about = "Walk through sqlgate builders and table gateways on SQLite")]
#[command(version)]
struct Args {
    /// SQLite database file (`:memory:` for an in-memory database)
    #[arg(short, long, default_value = ":memory:")]
    database: String,

    /// Number of sample files to insert
    #[arg(short, long, default_value_t = 5)]
    files: u32,
}

#[derive(Debug, Default, Clone, Entity)]
struct File {
    file_id: i64,
    #[entity(column = "file_name")]
    name: String,
    #[entity(setter)]
    size: i64,
    folder_id: Option<i64>,
}

impl File {
    fn set_size(&mut self, size: i64) {
        self.size = size.max(0);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlgate=debug")),
        )
        .init();

    let args = Args::parse();
    let adapter = create_adapter(DatabaseConfig::sqlite(&args.database))?;
    adapter.connect().await.context("failed to open the SQLite database")?;
    let version = adapter.server_version().await?;
    info!(%version, "connected");

    adapter
        .query(
            "CREATE TABLE IF NOT EXISTS folders (folder_id INTEGER PRIMARY KEY, title TEXT NOT NULL)",
            &[],
        )
        .await?;
    adapter
        .query(
            "CREATE TABLE IF NOT EXISTS files (\
             file_id INTEGER PRIMARY KEY AUTOINCREMENT, \
             file_name TEXT NOT NULL UNIQUE, \
             size INTEGER NOT NULL DEFAULT 0, \
             folder_id INTEGER)",
            &[],
        )
        .await?;

    // ========== 1. 插入 ==========
    adapter.insert("folders", &row! { "folder_id" => 1, "title" => "docs" }).await?;
    let files = TableGateway::new("files", adapter.clone(), "file_id");
    for i in 0..args.files {
        let result = files
            .insert(&row! {
                "file_name" => format!("report_{}.txt", i),
                "size" => i64::from(i) * 100,
                "folder_id" => if i % 2 == 0 { Some(1i64) } else { None },
            })
            .await?;
        info!(id = ?result.inserted_id, "inserted file");
    }

    // 冲突时更新
    let upsert = Insert::new()
        .into("files")
        .values(row! { "file_name" => "report_0.txt", "size" => 999 })
        .on_conflict(OnConflict::update(row! { "size" => 999 }).on_columns(["file_name"]))
        .execute(adapter.as_ref())
        .await?;
    info!(affected = upsert.affected_rows, "upsert done");

    // ========== 2. 查询并填充实体 ==========
    let typed: TableGateway<File> = TableGateway::with_hydrator(
        "files",
        adapter.clone(),
        "file_id",
        Arc::new(ClassMethodsHydrator::new()),
        Arc::new(File::default),
    );
    let in_folder = typed
        .select(
            WhereMap::new().eq("folder_id", 1).into(),
            SelectOptions::new().order("file_id DESC").limit(10),
        )
        .await?;
    for file in &in_folder {
        info!(id = file.file_id, name = %file.name, size = file.size, "file in folder 1");
    }

    let loose = typed
        .select(
            WhereSpec::callback(|select: Select| select.where_null("folder_id")),
            SelectOptions::new(),
        )
        .await?;
    info!(count = loose.len(), columns = ?File::COLUMNS, "files without a folder");

    // ========== 3. JOIN 与 UNION ==========
    let joined = Select::new()
        .from_alias("files", "f")
        .columns(["f.file_name", "d.title"])
        .join("folders AS d", "d.folder_id = f.folder_id")
        .where_bind("f.size >= ?", 100)
        .execute(adapter.as_ref())
        .await?;
    info!(rows = joined.len(), "joined rows");

    let union = UnionSelect::new(false)
        .add(
            Select::new().from("files").column("file_name AS name").where_bind("size > ?", 200),
            None,
        )?
        .union(Select::new().from("folders").column("title AS name").where_bind("folder_id = ?", 1))?
        .order("name")?;
    let names = union.execute(adapter.as_ref()).await?;
    info!(rows = names.len(), "union rows");

    // ========== 4. 预处理语句 ==========
    let mut stmt = adapter.prepare("SELECT file_name FROM files WHERE size BETWEEN :low AND :high");
    stmt.bind_named("low", 100).bind_named("high", 300).fetch_mode(FetchMode::Column);
    stmt.execute(adapter.as_ref()).await?;
    while let Some(name) = stmt.fetch() {
        info!(?name, "statement row");
    }
    stmt.close();

    // ========== 5. 事务 ==========
    adapter
        .transaction(|tx| {
            Box::pin(async move {
                Update::new()
                    .table("files")
                    .increment("size", 1)
                    .where_not_null("folder_id")
                    .execute(tx)
                    .await?;
                Ok::<_, SqlGateError>(())
            })
        })
        .await?;

    // ========== 6. 更新与删除 ==========
    let updated = files
        .update(
            WhereMap::new().any("file_name", ["report_1.txt", "report_3.txt"]).into(),
            row! { "folder_id" => 1 },
        )
        .await?;
    info!(affected = updated.affected_rows, "moved files into folder 1");

    match files.delete(WhereSpec::All).await {
        Err(err) => info!(error = %err, "unconditioned delete refused"),
        Ok(_) => anyhow::bail!("a delete without a where specification must be refused"),
    }
    let deleted = files.delete(WhereSpec::raw("size > 300")).await?;
    info!(affected = deleted.affected_rows, "deleted large files");

    adapter.disconnect().await?;
    Ok(())
}
