//! MySQL 适配器

use super::{decode, log_query, normalize_placeholders, query_error, statement_returns_rows, LazySlot};
use crate::adapter::DatabaseAdapter;
use crate::config::DatabaseConfig;
use crate::dialect::{Dialect, MYSQL};
use crate::error::{Result, SqlGateError};
use crate::executor::DbExecutor;
use crate::result::{ConnectionInfo, QueryResult};
use crate::transaction::{TransactionConn, TransactionScope};
use crate::value::BindValue;
use async_trait::async_trait;
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::query::Query;
use sqlx::MySql;
use tracing::info;

fn bind_params<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &[BindValue],
) -> Query<'q, MySql, MySqlArguments> {
    for param in params {
        crate::apply_bind_value!(query, param, d => d.clone(), j => j.clone());
    }
    query
}

/// 在任意 MySQL 执行器（连接池或事务连接）上执行
pub(crate) async fn run<'e, E>(executor: E, sql: &str, params: &[BindValue]) -> Result<QueryResult>
where
    E: sqlx::Executor<'e, Database = MySql>,
{
    let (sql, params) = normalize_placeholders(&MYSQL, sql, params)?;
    log_query(&MYSQL, &sql, &params);

    let query = bind_params(sqlx::query(&sql), &params);
    if statement_returns_rows(&sql) {
        let rows = query
            .fetch_all(executor)
            .await
            .map_err(|e| query_error(&MYSQL, e, &sql))?;
        Ok(QueryResult::from_rows(
            rows.iter().map(decode::mysql::decode_row).collect(),
        ))
    } else {
        let done = query
            .execute(executor)
            .await
            .map_err(|e| query_error(&MYSQL, e, &sql))?;
        // 0 表示语句没有生成自增值
        let inserted_id = match done.last_insert_id() {
            0 => None,
            id => i64::try_from(id).ok().map(BindValue::Int64),
        };
        Ok(QueryResult::affected(done.rows_affected(), inserted_id))
    }
}

pub struct MySqlAdapter {
    config: DatabaseConfig,
    pool: LazySlot<MySqlPool>,
}

impl MySqlAdapter {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            pool: LazySlot::new(),
        }
    }

    /// 使用已有的连接池
    pub async fn with_pool(config: DatabaseConfig, pool: MySqlPool) -> Result<Self> {
        let adapter = Self::new(config);
        adapter.pool.get_or_try_init(|| async move { Ok(pool) }).await?;
        Ok(adapter)
    }

    async fn pool(&self) -> Result<MySqlPool> {
        self.pool.get_or_try_init(|| self.open()).await
    }

    async fn open(&self) -> Result<MySqlPool> {
        let config = &self.config;
        let mut options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port_or_default())
            .database(&config.database)
            .charset(&config.mysql.charset);
        if let Some(user) = &config.user {
            options = options.username(user);
        }
        if let Some(password) = &config.password {
            options = options.password(password);
        }
        if let Some(timezone) = &config.mysql.timezone {
            options = options.timezone(Some(timezone.clone()));
        }

        let session_setup = config.session_setup.clone();
        let connecting = MySqlPoolOptions::new()
            .max_connections(config.pool.max_connections)
            .min_connections(config.pool.min_connections)
            .acquire_timeout(config.pool.acquire_timeout())
            .idle_timeout(Some(config.pool.idle_timeout()))
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
            .map_err(|_| SqlGateError::connection(MYSQL.name, "connect timed out"))?
            .map_err(|e| SqlGateError::connection(MYSQL.name, e))?;

        info!(
            dialect = MYSQL.name,
            host = %config.host,
            database = %config.database,
            charset = %config.mysql.charset,
            "connection pool established"
        );
        Ok(pool)
    }
}

#[async_trait]
impl DbExecutor for MySqlAdapter {
    fn dialect(&self) -> &'static Dialect {
        &MYSQL
    }

    async fn query(&self, sql: &str, params: &[BindValue]) -> Result<QueryResult> {
        let pool = self.pool().await?;
        run(&pool, sql, params).await
    }
}

#[async_trait]
impl DatabaseAdapter for MySqlAdapter {
    async fn connect(&self) -> Result<()> {
        self.pool().await.map(|_| ())
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            info!(dialect = MYSQL.name, "connection pool closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.pool.is_set()
    }

    async fn begin(&self) -> Result<TransactionScope> {
        let pool = self.pool().await?;
        let tx = pool.begin().await.map_err(SqlGateError::DatabaseError)?;
        Ok(TransactionScope::new(&MYSQL, TransactionConn::MySql(tx)))
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            driver: MYSQL.driver,
            dialect: MYSQL.name,
            host: self.config.host.clone(),
            database: self.config.database.clone(),
            connected: self.is_connected(),
            max_connections: self.config.pool.max_connections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_adapter_is_lazy() {
        let adapter = MySqlAdapter::new(DatabaseConfig::mysql("127.0.0.1", "app"));
        assert!(!adapter.is_connected());
        let info = adapter.connection_info();
        assert_eq!(info.dialect, "MySQL");
        assert_eq!(info.database, "app");
        assert!(!info.connected);
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_adapter_retryable() {
        let mut config = DatabaseConfig::mysql("127.0.0.1", "app").with_port(1);
        config.pool.connect_timeout_ms = 500;
        let adapter = MySqlAdapter::new(config);

        let err = adapter.connect().await.unwrap_err();
        assert!(matches!(err, SqlGateError::Connection { dialect: "MySQL", .. }));
        assert!(!adapter.is_connected());
        assert!(adapter.connect().await.is_err());
    }
}
