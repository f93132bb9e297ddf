//! 数据库适配器
//!
//! 每个方言一个适配器，都实现 `DatabaseAdapter`。连接池在第一次使用时建立，
//! 建立失败时不保留任何半成品，下一次调用会重新尝试。

pub(crate) mod decode;
#[cfg(feature = "mssql")]
pub mod mssql;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "mssql")]
pub use mssql::MsSqlAdapter;
#[cfg(feature = "mysql")]
pub use mysql::MySqlAdapter;
#[cfg(feature = "postgres")]
pub use postgres::PostgresAdapter;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteAdapter;

use crate::config::DatabaseConfig;
use crate::dialect::{DbDriver, Dialect, PlaceholderStyle};
use crate::error::{Result, SqlGateError};
use crate::executor::DbExecutor;
use crate::placeholder;
use crate::result::{BatchInsertResult, ColumnInfo, ConnectionInfo, QueryResult, TableInfo};
use crate::sql::{Delete, Insert, Select, Update};
use crate::statement::Statement;
use crate::transaction::TransactionScope;
use crate::value::{BindValue, FromValue, Row};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

/// 把绑定值应用到 sqlx 查询上
///
/// DECIMAL 与 JSON 的绑定方式因数据库而异，由调用方给出表达式。
#[doc(hidden)]
#[macro_export]
macro_rules! apply_bind_value {
    ($query:ident, $bind:expr, $dec:ident => $dec_expr:expr, $json:ident => $json_expr:expr) => {
        $query = match $bind {
            $crate::value::BindValue::Null => $query.bind(Option::<String>::None),
            $crate::value::BindValue::Bool(b) => $query.bind(*b),
            $crate::value::BindValue::Int64(i) => $query.bind(*i),
            $crate::value::BindValue::Int32(i) => $query.bind(*i),
            $crate::value::BindValue::Int16(i) => $query.bind(*i),
            $crate::value::BindValue::Float64(f) => $query.bind(*f),
            $crate::value::BindValue::Float32(f) => $query.bind(*f),
            $crate::value::BindValue::String(s) => $query.bind(s.clone()),
            $crate::value::BindValue::Bytes(b) => $query.bind(b.clone()),
            $crate::value::BindValue::DateTime(d) => $query.bind(*d),
            $crate::value::BindValue::Date(d) => $query.bind(*d),
            $crate::value::BindValue::Time(t) => $query.bind(*t),
            $crate::value::BindValue::Decimal($dec) => $query.bind($dec_expr),
            $crate::value::BindValue::Json($json) => $query.bind($json_expr),
        };
    };
}

/// 数据库适配器契约
#[async_trait]
pub trait DatabaseAdapter: DbExecutor {
    /// 建立连接池；已连接时直接返回
    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// 开启事务，事务期间固定使用同一个连接
    async fn begin(&self) -> Result<TransactionScope>;

    fn connection_info(&self) -> ConnectionInfo;

    async fn server_version(&self) -> Result<String> {
        let value = self.fetch_one(self.dialect().version_query, &[]).await?;
        String::from_value(value)
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows = self.fetch_all(self.dialect().list_tables_query, &[]).await?;
        rows.into_iter()
            .filter_map(|row| row.first_value().cloned())
            .map(String::from_value)
            .collect()
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let tables = self.list_tables().await?;
        Ok(tables.iter().any(|t| t.eq_ignore_ascii_case(table)))
    }

    /// 表的列信息，表不存在时列为空
    async fn table_info(&self, table: &str) -> Result<TableInfo> {
        let rows = self
            .fetch_all(self.dialect().table_info_query, &[BindValue::from(table)])
            .await?;
        Ok(TableInfo {
            table: table.to_string(),
            columns: rows.iter().filter_map(ColumnInfo::from_row).collect(),
        })
    }

    /// 插入一行
    async fn insert(&self, table: &str, data: &Row) -> Result<QueryResult> {
        let built = Insert::new().into(table).values(data.clone()).build(self.dialect())?;
        self.query(&built.sql, &built.params).await
    }

    /// 一条多行 INSERT 插入全部数据
    ///
    /// 列以第一行为准，后续行按列名对齐。`first_inserted_id` 取驱动报告的自增值，
    /// MySQL 报告的正是本批第一行。
    async fn insert_batch(&self, table: &str, rows: &[Row]) -> Result<BatchInsertResult> {
        if rows.is_empty() {
            return Err(SqlGateError::builder("insert_batch() requires at least one row"));
        }
        let built = Insert::new()
            .into(table)
            .batch_values(rows.iter().cloned())
            .build(self.dialect())?;
        let result = self.query(&built.sql, &built.params).await?;
        Ok(BatchInsertResult::new(result.row_count, result.inserted_id))
    }

    /// 更新满足 `where_clause` 的行
    ///
    /// `where_clause` 中的 `$n` 相对于 `where_params` 编号，会整体后移 SET 值的个数。
    async fn update(
        &self,
        table: &str,
        data: &Row,
        where_clause: &str,
        where_params: &[BindValue],
    ) -> Result<QueryResult> {
        if data.is_empty() {
            return Err(SqlGateError::builder("update() requires at least one column"));
        }
        let dialect = self.dialect();
        let set_clause = data
            .columns()
            .enumerate()
            .map(|(i, col)| format!("{} = ${}", dialect.quote_identifier(col), i + 1))
            .collect::<Vec<_>>()
            .join(", ");

        let where_numbered = if placeholder::has_numbered(where_clause) {
            where_clause.to_string()
        } else {
            placeholder::positional_to_numbered(where_clause)
        };
        let where_sql = placeholder::rebase_placeholders(&where_numbered, data.len());

        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            dialect.quote_identifier(table),
            set_clause,
            where_sql
        );
        let mut params: Vec<BindValue> = data.values().cloned().collect();
        params.extend_from_slice(where_params);

        let (sql, params) = match dialect.placeholder {
            PlaceholderStyle::Numbered => (sql, params),
            _ => placeholder::normalize_for(dialect, &sql, &params)?,
        };
        self.query(&sql, &params).await
    }

    async fn delete(
        &self,
        table: &str,
        where_clause: &str,
        where_params: &[BindValue],
    ) -> Result<QueryResult> {
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            self.dialect().quote_identifier(table),
            where_clause
        );
        self.query(&sql, where_params).await
    }
}

/// 在适配器上直接取得构建器和事务
pub trait DatabaseAdapterExt: DatabaseAdapter {
    fn select(&self) -> Select {
        Select::new()
    }

    fn insert_query(&self) -> Insert {
        Insert::new()
    }

    fn update_query(&self) -> Update {
        Update::new()
    }

    fn delete_query(&self) -> Delete {
        Delete::new()
    }

    fn prepare(&self, sql: impl Into<String>) -> Statement {
        Statement::new(sql)
    }

    /// 在事务中执行闭包函数
    /// 如果闭包返回 Ok，则自动提交事务
    /// 如果闭包返回 Err，则自动回滚事务并返回原始错误
    ///
    /// ```ignore
    /// adapter.transaction(|tx| {
    ///     Box::pin(async move {
    ///         tx.query("UPDATE accounts SET balance = balance - 10 WHERE id = ?", &[1.into()]).await?;
    ///         Ok::<_, SqlGateError>(())
    ///     })
    /// }).await?;
    /// ```
    fn transaction<'s, F, T, E>(
        &'s self,
        f: F,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<T, E>> + Send + 's>>
    where
        F: for<'a> FnOnce(
                &'a TransactionScope,
            )
                -> Pin<Box<dyn Future<Output = std::result::Result<T, E>> + Send + 'a>>
            + Send
            + 's,
        T: Send + 's,
        E: From<SqlGateError> + Send + 's,
    {
        Box::pin(async move {
            let tx = self.begin().await.map_err(E::from)?;

            match f(&tx).await {
                Ok(result) => {
                    tx.commit().await.map_err(E::from)?;
                    Ok(result)
                }
                Err(e) => {
                    // 回滚失败只记录日志，返回原始错误
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(
                            dialect = self.dialect().name,
                            error = %rollback_err,
                            "rollback after failed transaction callback failed"
                        );
                    }
                    Err(e)
                }
            }
        })
    }
}

impl<A: DatabaseAdapter + ?Sized> DatabaseAdapterExt for A {}

/// 根据配置创建适配器（连接在第一次使用时建立）
pub fn create_adapter(config: DatabaseConfig) -> Result<Arc<dyn DatabaseAdapter>> {
    match config.driver {
        #[cfg(feature = "mysql")]
        DbDriver::MySql => Ok(Arc::new(MySqlAdapter::new(config))),
        #[cfg(feature = "postgres")]
        DbDriver::Postgres => Ok(Arc::new(PostgresAdapter::new(config))),
        #[cfg(feature = "sqlite")]
        DbDriver::Sqlite => Ok(Arc::new(SqliteAdapter::new(config))),
        #[cfg(feature = "mssql")]
        DbDriver::MsSql => Ok(Arc::new(MsSqlAdapter::new(config))),
        #[allow(unreachable_patterns)]
        driver => Err(SqlGateError::UnsupportedDatabase(format!(
            "driver {:?} is not enabled in this build",
            driver
        ))),
    }
}

/// 语句是否返回结果行
///
/// 只看引号和注释之外的代码：以查询关键字开头，或带有 `RETURNING` 子句、
/// SQL Server 的 `OUTPUT INSERTED.` / `OUTPUT DELETED.` 子句。
pub fn statement_returns_rows(sql: &str) -> bool {
    let code = placeholder::code_only(sql);
    let tokens = tokenize(&code);

    let leading = tokens.iter().find(|t| t.as_str() != "(");
    if let Some(first) = leading {
        if matches!(
            first.as_str(),
            "SELECT" | "WITH" | "PRAGMA" | "SHOW" | "EXPLAIN" | "VALUES" | "DESCRIBE" | "DESC"
        ) {
            return true;
        }
    }

    tokens.iter().enumerate().any(|(i, token)| match token.as_str() {
        "RETURNING" => true,
        "OUTPUT" => {
            matches!(
                tokens.get(i + 1).map(String::as_str),
                Some("INSERTED") | Some("DELETED")
            ) && tokens.get(i + 2).map(String::as_str) == Some(".")
        }
        _ => false,
    })
}

/// 大写的单词与单个标点，空白被丢弃
fn tokenize(code: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    for c in code.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            word.push(c.to_ascii_uppercase());
            continue;
        }
        if !word.is_empty() {
            tokens.push(std::mem::take(&mut word));
        }
        if !c.is_whitespace() {
            tokens.push(c.to_string());
        }
    }
    if !word.is_empty() {
        tokens.push(word);
    }
    tokens
}

/// 把原始 SQL 的占位符调整为方言可执行的形式
pub fn normalize_placeholders(
    dialect: &Dialect,
    sql: &str,
    params: &[BindValue],
) -> Result<(String, Vec<BindValue>)> {
    placeholder::normalize_for(dialect, sql, params)
}

/// 延迟建立的连接池
///
/// 读写都只在同步代码中持有 `RwLock`；建立连接期间由异步互斥锁保证只有一个任务在建立。
pub(crate) struct LazySlot<P: Clone> {
    slot: RwLock<Option<P>>,
    init: tokio::sync::Mutex<()>,
}

impl<P: Clone> LazySlot<P> {
    pub(crate) fn new() -> Self {
        Self {
            slot: RwLock::new(None),
            init: tokio::sync::Mutex::new(()),
        }
    }

    pub(crate) fn get(&self) -> Option<P> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn is_set(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub(crate) fn take(&self) -> Option<P> {
        self.slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// 取出已有的池，或者调用 `init` 建立一个新的
    pub(crate) async fn get_or_try_init<F, Fut>(&self, init: F) -> Result<P>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<P>>,
    {
        if let Some(pool) = self.get() {
            return Ok(pool);
        }

        let _guard = self.init.lock().await;
        if let Some(pool) = self.get() {
            return Ok(pool);
        }

        let pool = init().await?;
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(pool.clone());
        Ok(pool)
    }
}

/// 查询日志，统一 target 方便过滤
pub(crate) fn log_query(dialect: &Dialect, sql: &str, params: &[BindValue]) {
    tracing::debug!(
        target: "sqlgate::query",
        dialect = dialect.name,
        sql = %sql,
        params = ?params,
        "executing query"
    );
}

pub(crate) fn query_error(
    dialect: &Dialect,
    err: impl std::fmt::Display,
    sql: &str,
) -> SqlGateError {
    tracing::error!(
        target: "sqlgate::query",
        dialect = dialect.name,
        sql = %sql,
        error = %err,
        "query failed"
    );
    SqlGateError::query(dialect.name, err, sql)
}

/// 记录执行器同时充当一个不连接数据库的适配器
#[cfg(test)]
#[async_trait]
impl DatabaseAdapter for crate::executor::testing::RecordingExecutor {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn begin(&self) -> Result<TransactionScope> {
        Err(SqlGateError::NoPoolAvailable)
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            driver: self.dialect().driver,
            dialect: self.dialect().name,
            host: "recording".to_string(),
            database: "recording".to_string(),
            connected: true,
            max_connections: 1,
        }
    }
}
