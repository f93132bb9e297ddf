use crate::dialect::Dialect;
use crate::error::{Result, SqlGateError};
use crate::executor::DbExecutor;
use crate::result::QueryResult;
use crate::value::BindValue;
use async_trait::async_trait;
use tokio::sync::Mutex;

/// 宏：简化事务闭包的写法，自动处理 `Box::pin`
///
/// 使用示例：
/// ```ignore
/// // 使用引用
/// sqlgate::transaction!(&adapter, |tx| async move {
///     tx.query("DELETE FROM sessions", &[]).await?;
///     Ok::<_, sqlgate::SqlGateError>(())
/// }).await?;
///
/// // 或直接使用值（会自动借用）
/// sqlgate::transaction!(adapter, |tx| async move {
///     Ok::<_, sqlgate::SqlGateError>(42)
/// }).await?;
/// ```
#[macro_export]
macro_rules! transaction {
    // 匹配引用形式：&adapter
    (&$adapter:expr, |$tx:ident| async move $body:block) => {{
        use $crate::adapter::DatabaseAdapterExt as _;
        $adapter.transaction(|$tx| Box::pin(async move $body))
    }};
    // 匹配值形式：adapter（会自动借用）
    ($adapter:expr, |$tx:ident| async move $body:block) => {{
        use $crate::adapter::DatabaseAdapterExt as _;
        $adapter.transaction(|$tx| Box::pin(async move $body))
    }};
}

/// 事务持有的连接
pub(crate) enum TransactionConn {
    #[cfg(feature = "mysql")]
    MySql(sqlx::Transaction<'static, sqlx::MySql>),
    #[cfg(feature = "postgres")]
    Postgres(sqlx::Transaction<'static, sqlx::Postgres>),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlx::Transaction<'static, sqlx::Sqlite>),
    #[cfg(feature = "mssql")]
    MsSql(crate::adapter::mssql::PooledClient),
}

/// 数据库事务
///
/// 事务期间固定占用一个连接；提交或回滚之后再使用会返回 `AlreadyConsumed`。
/// 未提交就被丢弃时，连接上的事务会被回滚。
pub struct TransactionScope {
    dialect: &'static Dialect,
    conn: Mutex<Option<TransactionConn>>,
}

impl std::fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionScope")
            .field("dialect", &self.dialect.name)
            .finish()
    }
}

impl TransactionScope {
    pub(crate) fn new(dialect: &'static Dialect, conn: TransactionConn) -> Self {
        Self {
            dialect,
            conn: Mutex::new(Some(conn)),
        }
    }

    /// 是否仍可使用（尚未提交或回滚）
    pub async fn is_active(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    /// 提交事务
    pub async fn commit(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .await
            .take()
            .ok_or(SqlGateError::AlreadyConsumed)?;

        match conn {
            #[cfg(feature = "mysql")]
            TransactionConn::MySql(tx) => tx.commit().await.map_err(SqlGateError::DatabaseError)?,
            #[cfg(feature = "postgres")]
            TransactionConn::Postgres(tx) => {
                tx.commit().await.map_err(SqlGateError::DatabaseError)?
            }
            #[cfg(feature = "sqlite")]
            TransactionConn::Sqlite(tx) => tx.commit().await.map_err(SqlGateError::DatabaseError)?,
            #[cfg(feature = "mssql")]
            TransactionConn::MsSql(mut client) => client.finish("COMMIT TRANSACTION").await?,
        }
        tracing::debug!(dialect = self.dialect.name, "transaction committed");
        Ok(())
    }

    /// 回滚事务
    pub async fn rollback(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .await
            .take()
            .ok_or(SqlGateError::AlreadyConsumed)?;

        match conn {
            #[cfg(feature = "mysql")]
            TransactionConn::MySql(tx) => {
                tx.rollback().await.map_err(SqlGateError::DatabaseError)?
            }
            #[cfg(feature = "postgres")]
            TransactionConn::Postgres(tx) => {
                tx.rollback().await.map_err(SqlGateError::DatabaseError)?
            }
            #[cfg(feature = "sqlite")]
            TransactionConn::Sqlite(tx) => {
                tx.rollback().await.map_err(SqlGateError::DatabaseError)?
            }
            #[cfg(feature = "mssql")]
            TransactionConn::MsSql(mut client) => client.finish("ROLLBACK TRANSACTION").await?,
        }
        tracing::debug!(dialect = self.dialect.name, "transaction rolled back");
        Ok(())
    }
}

#[async_trait]
impl DbExecutor for TransactionScope {
    fn dialect(&self) -> &'static Dialect {
        self.dialect
    }

    #[allow(unused_variables)]
    async fn query(&self, sql: &str, params: &[BindValue]) -> Result<QueryResult> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(SqlGateError::AlreadyConsumed)?;

        match conn {
            #[cfg(feature = "mysql")]
            TransactionConn::MySql(tx) => crate::adapter::mysql::run(&mut **tx, sql, params).await,
            #[cfg(feature = "postgres")]
            TransactionConn::Postgres(tx) => {
                crate::adapter::postgres::run(&mut **tx, sql, params).await
            }
            #[cfg(feature = "sqlite")]
            TransactionConn::Sqlite(tx) => crate::adapter::sqlite::run(&mut **tx, sql, params).await,
            #[cfg(feature = "mssql")]
            TransactionConn::MsSql(client) => client.run(sql, params).await,
            #[allow(unreachable_patterns)]
            _ => Err(SqlGateError::NoPoolAvailable),
        }
    }
}
