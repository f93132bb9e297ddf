//! SQLite 适配器
//!
//! PRAGMA 写在连接选项里，每个新建的物理连接都会执行，不经过 `query()`。

use super::{decode, log_query, normalize_placeholders, query_error, statement_returns_rows, LazySlot};
use crate::adapter::DatabaseAdapter;
use crate::config::DatabaseConfig;
use crate::dialect::{Dialect, SQLITE};
use crate::error::{Result, SqlGateError};
use crate::executor::DbExecutor;
use crate::result::{BatchInsertResult, ConnectionInfo, QueryResult};
use crate::sql::Insert;
use crate::transaction::{TransactionConn, TransactionScope};
use crate::value::{BindValue, Row};
use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use sqlx::Sqlite;
use std::borrow::Cow;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

const MEMORY: &str = ":memory:";

fn bind_params<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[BindValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    // SQLite 没有 DECIMAL / JSON 存储类型，按文本保存
    for param in params {
        crate::apply_bind_value!(query, param, d => d.to_string(), j => j.to_string());
    }
    query
}

fn is_insert(sql: &str) -> bool {
    let first = sql.split_whitespace().next().unwrap_or("");
    first.eq_ignore_ascii_case("INSERT") || first.eq_ignore_ascii_case("REPLACE")
}

/// 在任意 SQLite 执行器（连接池或事务连接）上执行
pub(crate) async fn run<'e, E>(executor: E, sql: &str, params: &[BindValue]) -> Result<QueryResult>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let (sql, params) = normalize_placeholders(&SQLITE, sql, params)?;
    log_query(&SQLITE, &sql, &params);

    let query = bind_params(sqlx::query(&sql), &params);
    if statement_returns_rows(&sql) {
        let rows = query
            .fetch_all(executor)
            .await
            .map_err(|e| query_error(&SQLITE, e, &sql))?;
        Ok(QueryResult::from_rows(
            rows.iter().map(decode::sqlite::decode_row).collect(),
        ))
    } else {
        let done = query
            .execute(executor)
            .await
            .map_err(|e| query_error(&SQLITE, e, &sql))?;
        // last_insert_rowid 是连接级别的值，只对本次插入有意义
        let inserted_id = (is_insert(&sql) && done.rows_affected() > 0)
            .then(|| BindValue::Int64(done.last_insert_rowid()));
        Ok(QueryResult::affected(done.rows_affected(), inserted_id))
    }
}

pub struct SqliteAdapter {
    config: DatabaseConfig,
    pool: LazySlot<SqlitePool>,
}

impl SqliteAdapter {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            pool: LazySlot::new(),
        }
    }

    /// 使用已有的连接池
    pub async fn with_pool(config: DatabaseConfig, pool: SqlitePool) -> Result<Self> {
        let adapter = Self::new(config);
        adapter.pool.get_or_try_init(|| async move { Ok(pool) }).await?;
        Ok(adapter)
    }

    fn in_memory(&self) -> bool {
        self.config.database.is_empty() || self.config.database == MEMORY
    }

    async fn pool(&self) -> Result<SqlitePool> {
        self.pool.get_or_try_init(|| self.open()).await
    }

    fn connect_options(&self) -> Result<SqliteConnectOptions> {
        let sqlite = &self.config.sqlite;
        let options = if self.in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| SqlGateError::connection(SQLITE.name, e))?
        } else {
            let options = SqliteConnectOptions::new()
                .filename(&self.config.database)
                .create_if_missing(sqlite.create_if_missing);
            if sqlite.journal_wal {
                options.journal_mode(SqliteJournalMode::Wal)
            } else {
                options
            }
        };

        Ok(options
            .foreign_keys(sqlite.foreign_keys)
            .busy_timeout(Duration::from_millis(sqlite.busy_timeout_ms))
            .pragma("cache_size", Cow::Owned(sqlite.cache_size.to_string()))
            .pragma("temp_store", Cow::Owned(sqlite.temp_store.clone()))
            .pragma("synchronous", Cow::Owned(sqlite.synchronous.clone())))
    }

    async fn open(&self) -> Result<SqlitePool> {
        let config = &self.config;
        let options = self.connect_options()?;

        let mut pool_options = SqlitePoolOptions::new()
            .acquire_timeout(config.pool.acquire_timeout());
        // 内存库随最后一个连接关闭而消失，只能固定使用一个常驻连接
        pool_options = if self.in_memory() {
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options
                .max_connections(config.pool.max_connections)
                .min_connections(config.pool.min_connections)
                .idle_timeout(Some(config.pool.idle_timeout()))
        };

        let session_setup = config.session_setup.clone();
        let connecting = pool_options
            .after_connect(move |conn, _meta| {
                let statements = session_setup.clone();
                Box::pin(async move {
                    for statement in &statements {
                        sqlx::query(statement).execute(&mut *conn).await?;
                    }
                    Ok(())
                })
            })
            .connect_with(options);

        let pool = tokio::time::timeout(config.pool.connect_timeout(), connecting)
            .await
            .map_err(|_| SqlGateError::connection(SQLITE.name, "connect timed out"))?
            .map_err(|e| SqlGateError::connection(SQLITE.name, e))?;

        info!(
            dialect = SQLITE.name,
            database = %if self.in_memory() { MEMORY } else { config.database.as_str() },
            "connection pool established"
        );
        Ok(pool)
    }
}

#[async_trait]
impl DbExecutor for SqliteAdapter {
    fn dialect(&self) -> &'static Dialect {
        &SQLITE
    }

    async fn query(&self, sql: &str, params: &[BindValue]) -> Result<QueryResult> {
        let pool = self.pool().await?;
        run(&pool, sql, params).await
    }
}

#[async_trait]
impl DatabaseAdapter for SqliteAdapter {
    async fn connect(&self) -> Result<()> {
        self.pool().await.map(|_| ())
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            info!(dialect = SQLITE.name, "connection pool closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.pool.is_set()
    }

    async fn begin(&self) -> Result<TransactionScope> {
        let pool = self.pool().await?;
        let tx = pool.begin().await.map_err(SqlGateError::DatabaseError)?;
        Ok(TransactionScope::new(&SQLITE, TransactionConn::Sqlite(tx)))
    }

    /// 在一个事务中逐行插入，以便拿到第一行的 rowid
    async fn insert_batch(&self, table: &str, rows: &[Row]) -> Result<BatchInsertResult> {
        if rows.is_empty() {
            return Err(SqlGateError::builder("insert_batch() requires at least one row"));
        }
        let statements = rows
            .iter()
            .map(|row| Insert::new().into(table).values(row.clone()).build(&SQLITE))
            .collect::<Result<Vec<_>>>()?;

        let tx = self.begin().await?;
        let mut inserted_count = 0;
        let mut first_inserted_id = None;
        for built in &statements {
            match tx.query(&built.sql, &built.params).await {
                Ok(result) => {
                    inserted_count += result.row_count;
                    if first_inserted_id.is_none() {
                        first_inserted_id = result.inserted_id;
                    }
                }
                Err(err) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(
                            dialect = SQLITE.name,
                            error = %rollback_err,
                            "rollback after failed batch insert failed"
                        );
                    }
                    return Err(err);
                }
            }
        }
        tx.commit().await?;
        Ok(BatchInsertResult::new(inserted_count, first_inserted_id))
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            driver: SQLITE.driver,
            dialect: SQLITE.name,
            host: String::new(),
            database: self.config.database.clone(),
            connected: self.is_connected(),
            max_connections: if self.in_memory() {
                1
            } else {
                self.config.pool.max_connections
            },
        }
    }
}
