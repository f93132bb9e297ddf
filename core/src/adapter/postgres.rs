//! PostgreSQL 适配器

use super::{decode, log_query, normalize_placeholders, query_error, statement_returns_rows, LazySlot};
use crate::adapter::DatabaseAdapter;
use crate::config::DatabaseConfig;
use crate::dialect::{Dialect, POSTGRES};
use crate::error::{Result, SqlGateError};
use crate::executor::DbExecutor;
use crate::result::{ConnectionInfo, QueryResult};
use crate::transaction::{TransactionConn, TransactionScope};
use crate::value::BindValue;
use async_trait::async_trait;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{
    PgArgumentBuffer, PgArguments, PgConnectOptions, PgPool, PgPoolOptions, PgTypeInfo,
};
use sqlx::query::Query;
use sqlx::Postgres;
use tracing::info;

/// 不声明类型的 NULL，由服务端根据上下文推断参数类型
struct UntypedNull;

impl sqlx::Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(sqlx::postgres::types::Oid(0))
    }
}

impl sqlx::Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> std::result::Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[BindValue],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        match param {
            BindValue::Null => query = query.bind(UntypedNull),
            other => {
                crate::apply_bind_value!(query, other, d => d.clone(), j => j.clone());
            }
        }
    }
    query
}

/// 在任意 PostgreSQL 执行器（连接池或事务连接）上执行
pub(crate) async fn run<'e, E>(executor: E, sql: &str, params: &[BindValue]) -> Result<QueryResult>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let (sql, params) = normalize_placeholders(&POSTGRES, sql, params)?;
    log_query(&POSTGRES, &sql, &params);

    let query = bind_params(sqlx::query(&sql), &params);
    if statement_returns_rows(&sql) {
        let rows = query
            .fetch_all(executor)
            .await
            .map_err(|e| query_error(&POSTGRES, e, &sql))?;
        Ok(QueryResult::from_rows(
            rows.iter().map(decode::postgres::decode_row).collect(),
        ))
    } else {
        let done = query
            .execute(executor)
            .await
            .map_err(|e| query_error(&POSTGRES, e, &sql))?;
        Ok(QueryResult::affected(done.rows_affected(), None))
    }
}

pub struct PostgresAdapter {
    config: DatabaseConfig,
    pool: LazySlot<PgPool>,
}

impl PostgresAdapter {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            pool: LazySlot::new(),
        }
    }

    /// 使用已有的连接池
    pub async fn with_pool(config: DatabaseConfig, pool: PgPool) -> Result<Self> {
        let adapter = Self::new(config);
        adapter.pool.get_or_try_init(|| async move { Ok(pool) }).await?;
        Ok(adapter)
    }

    async fn pool(&self) -> Result<PgPool> {
        self.pool.get_or_try_init(|| self.open()).await
    }

    async fn open(&self) -> Result<PgPool> {
        let config = &self.config;
        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port_or_default())
            .database(&config.database);
        if let Some(user) = &config.user {
            options = options.username(user);
        }
        if let Some(password) = &config.password {
            options = options.password(password);
        }

        let session_setup = config.session_setup.clone();
        let connecting = PgPoolOptions::new()
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
            .map_err(|_| SqlGateError::connection(POSTGRES.name, "connect timed out"))?
            .map_err(|e| SqlGateError::connection(POSTGRES.name, e))?;

        info!(
            dialect = POSTGRES.name,
            host = %config.host,
            database = %config.database,
            "connection pool established"
        );
        Ok(pool)
    }
}

#[async_trait]
impl DbExecutor for PostgresAdapter {
    fn dialect(&self) -> &'static Dialect {
        &POSTGRES
    }

    async fn query(&self, sql: &str, params: &[BindValue]) -> Result<QueryResult> {
        let pool = self.pool().await?;
        run(&pool, sql, params).await
    }
}

#[async_trait]
impl DatabaseAdapter for PostgresAdapter {
    async fn connect(&self) -> Result<()> {
        self.pool().await.map(|_| ())
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            info!(dialect = POSTGRES.name, "connection pool closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.pool.is_set()
    }

    async fn begin(&self) -> Result<TransactionScope> {
        let pool = self.pool().await?;
        let tx = pool.begin().await.map_err(SqlGateError::DatabaseError)?;
        Ok(TransactionScope::new(&POSTGRES, TransactionConn::Postgres(tx)))
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            driver: POSTGRES.driver,
            dialect: POSTGRES.name,
            host: self.config.host.clone(),
            database: self.config.database.clone(),
            connected: self.is_connected(),
            max_connections: self.config.pool.max_connections,
        }
    }
}
