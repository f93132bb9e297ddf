//! SQL Server 适配器
//!
//! 基于 tiberius。构建器输出 `@paramN`（从 0 开始），tiberius 需要 `@P1..`，
//! 在执行前统一改写。连接池由 deadpool 管理。

use super::{log_query, normalize_placeholders, query_error, statement_returns_rows, LazySlot};
use crate::adapter::DatabaseAdapter;
use crate::config::DatabaseConfig;
use crate::dialect::{Dialect, MSSQL};
use crate::error::{Result, SqlGateError};
use crate::executor::DbExecutor;
use crate::placeholder::{self, SqlPart};
use crate::result::{ConnectionInfo, QueryResult};
use crate::transaction::{TransactionConn, TransactionScope};
use crate::value::{BindValue, Row};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use deadpool::managed::{self, Metrics, Object, Pool, PoolError, RecycleError, RecycleResult};
use deadpool::Runtime;
use std::str::FromStr;
use std::time::Duration;
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, FromSql, Query};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

type TdsClient = Client<Compat<TcpStream>>;

/// `@paramN` 改写为 tiberius 的 `@P{N+1}`
///
/// 输入应当已经是命名形式；残留的 `$k` 与 `?` 也一并处理。
pub(crate) fn to_tiberius(sql: &str) -> String {
    let mut positional = 0;
    placeholder::parse(sql)
        .into_iter()
        .map(|part| match part {
            SqlPart::Text(t) => t,
            SqlPart::Named(n) => format!("@P{}", n + 1),
            SqlPart::Numbered(k) => format!("@P{}", k),
            SqlPart::Positional => {
                positional += 1;
                format!("@P{}", positional)
            }
        })
        .collect()
}

fn bind_params<'a>(query: &mut Query<'a>, params: &'a [BindValue]) {
    for param in params {
        match param {
            BindValue::Null => query.bind(Option::<String>::None),
            BindValue::Bool(b) => query.bind(*b),
            BindValue::Int64(i) => query.bind(*i),
            BindValue::Int32(i) => query.bind(*i),
            BindValue::Int16(i) => query.bind(*i),
            BindValue::Float64(f) => query.bind(*f),
            BindValue::Float32(f) => query.bind(*f),
            BindValue::String(s) => query.bind(s.as_str()),
            BindValue::Bytes(b) => query.bind(b.as_slice()),
            // 服务端会把字符串隐式转换为 DECIMAL
            BindValue::Decimal(d) => query.bind(d.to_string()),
            BindValue::DateTime(d) => query.bind(*d),
            BindValue::Date(d) => query.bind(*d),
            BindValue::Time(t) => query.bind(*t),
            BindValue::Json(j) => query.bind(j.to_string()),
        }
    }
}

fn decode_value(data: &ColumnData<'static>) -> tiberius::Result<BindValue> {
    let value = match data {
        ColumnData::U8(v) => v.map(|v| BindValue::Int64(v as i64)),
        ColumnData::I16(v) => v.map(|v| BindValue::Int64(v as i64)),
        ColumnData::I32(v) => v.map(|v| BindValue::Int64(v as i64)),
        ColumnData::I64(v) => v.map(BindValue::Int64),
        ColumnData::F32(v) => v.map(|v| BindValue::Float64(v as f64)),
        ColumnData::F64(v) => v.map(BindValue::Float64),
        ColumnData::Bit(v) => v.map(BindValue::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| BindValue::String(s.to_string())),
        ColumnData::Binary(v) => v.as_ref().map(|b| BindValue::Bytes(b.to_vec())),
        ColumnData::Guid(v) => v.as_ref().map(|g| BindValue::String(g.to_string())),
        ColumnData::Numeric(v) => v.as_ref().map(|n| {
            let text = n.to_string();
            BigDecimal::from_str(&text)
                .map(BindValue::Decimal)
                .unwrap_or(BindValue::String(text))
        }),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)?.map(BindValue::DateTime)
        }
        ColumnData::Date(_) => NaiveDate::from_sql(data)?.map(BindValue::Date),
        ColumnData::Time(_) => NaiveTime::from_sql(data)?.map(BindValue::Time),
        ColumnData::DateTimeOffset(_) => {
            DateTime::<Utc>::from_sql(data)?.map(|v| BindValue::DateTime(v.naive_utc()))
        }
        other => {
            debug!(column_type = ?other, "unsupported SQL Server column type, using NULL");
            None
        }
    };
    Ok(value.unwrap_or(BindValue::Null))
}

fn decode_row(row: tiberius::Row) -> tiberius::Result<Row> {
    let names: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let mut out = Row::with_capacity(names.len());
    for (name, data) in names.into_iter().zip(row) {
        out.insert(name, decode_value(&data)?);
    }
    Ok(out)
}

/// 为 deadpool 建立并检查 tiberius 连接
///
/// 每个新建的连接都会执行 `session_setup`；复用前检查空闲时长、连通性以及是否残留事务。
pub(crate) struct TdsManager {
    config: Config,
    idle_timeout: Duration,
    session_setup: Vec<String>,
}

impl managed::Manager for TdsManager {
    type Type = TdsClient;
    type Error = SqlGateError;

    async fn create(&self) -> Result<TdsClient> {
        let tcp = TcpStream::connect(self.config.get_addr())
            .await
            .map_err(|e| SqlGateError::connection(MSSQL.name, e))?;
        tcp.set_nodelay(true)
            .map_err(|e| SqlGateError::connection(MSSQL.name, e))?;
        let mut client = Client::connect(self.config.clone(), tcp.compat_write())
            .await
            .map_err(|e| SqlGateError::connection(MSSQL.name, e))?;

        for statement in &self.session_setup {
            log_query(&MSSQL, statement, &[]);
            client
                .execute(statement.as_str(), &[])
                .await
                .map_err(|e| SqlGateError::connection(MSSQL.name, e))?;
        }
        Ok(client)
    }

    async fn recycle(&self, client: &mut TdsClient, metrics: &Metrics) -> RecycleResult<SqlGateError> {
        if metrics.last_used() > self.idle_timeout {
            debug!(dialect = MSSQL.name, "closing idle connection");
            return Err(RecycleError::Backend(SqlGateError::connection(
                MSSQL.name,
                "idle connection expired",
            )));
        }

        let row = client
            .simple_query("SELECT @@TRANCOUNT")
            .await
            .map_err(|e| RecycleError::Backend(SqlGateError::connection(MSSQL.name, e)))?
            .into_row()
            .await
            .map_err(|e| RecycleError::Backend(SqlGateError::connection(MSSQL.name, e)))?;
        let depth = row
            .and_then(|row| row.try_get::<i32, _>(0).ok().flatten())
            .unwrap_or(0);
        if depth > 0 {
            warn!(dialect = MSSQL.name, "discarding connection left in an unfinished transaction");
            return Err(RecycleError::Backend(SqlGateError::connection(
                MSSQL.name,
                "connection returned with an open transaction",
            )));
        }
        Ok(())
    }
}

pub(crate) type TdsPool = Pool<TdsManager>;

fn pool_error(err: PoolError<SqlGateError>) -> SqlGateError {
    match err {
        PoolError::Backend(e) => e,
        PoolError::Timeout(kind) => SqlGateError::connection(
            MSSQL.name,
            format!("timed out waiting for a pooled connection ({:?})", kind),
        ),
        PoolError::Closed => SqlGateError::NoPoolAvailable,
        other => SqlGateError::connection(MSSQL.name, other),
    }
}

/// 从池中借出的连接，丢弃时归还
///
/// 未提交的事务会在下一次借出前的检查中被发现，连接随之关闭，服务端回滚事务。
pub(crate) struct PooledClient {
    conn: Object<TdsManager>,
}

impl PooledClient {
    /// 执行一条 SQL
    pub(crate) async fn run(&mut self, sql: &str, params: &[BindValue]) -> Result<QueryResult> {
        let (sql, params) = normalize_placeholders(&MSSQL, sql, params)?;
        log_query(&MSSQL, &sql, &params);

        let tds_sql = to_tiberius(&sql);
        let mut query = Query::new(tds_sql.as_str());
        bind_params(&mut query, &params);

        let client: &mut TdsClient = &mut self.conn;
        let outcome = if statement_returns_rows(&sql) {
            match query.query(client).await {
                Ok(stream) => match stream.into_first_result().await {
                    Ok(rows) => rows
                        .into_iter()
                        .map(decode_row)
                        .collect::<tiberius::Result<Vec<_>>>()
                        .map(QueryResult::from_rows),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            }
        } else {
            query
                .execute(client)
                .await
                .map(|done| QueryResult::affected(done.total(), None))
        };

        outcome.map_err(|e| query_error(&MSSQL, e, &sql))
    }

    /// 执行不带参数的控制语句（BEGIN / COMMIT / ROLLBACK）
    async fn control(&mut self, statement: &str) -> Result<()> {
        log_query(&MSSQL, statement, &[]);
        let client: &mut TdsClient = &mut self.conn;
        client
            .execute(statement, &[])
            .await
            .map_err(|e| query_error(&MSSQL, e, statement))?;
        Ok(())
    }

    pub(crate) async fn start(&mut self, statement: &str) -> Result<()> {
        self.control(statement).await
    }

    /// 提交或回滚
    pub(crate) async fn finish(&mut self, statement: &str) -> Result<()> {
        self.control(statement).await
    }
}

pub struct MsSqlAdapter {
    config: DatabaseConfig,
    pool: LazySlot<TdsPool>,
}

impl MsSqlAdapter {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            pool: LazySlot::new(),
        }
    }

    fn tds_config(&self) -> Config {
        let config = &self.config;
        let mut tds = Config::new();
        tds.host(&config.host);
        tds.port(config.port_or_default());
        tds.database(&config.database);
        tds.authentication(AuthMethod::sql_server(
            config.user.as_deref().unwrap_or_default(),
            config.password.as_deref().unwrap_or_default(),
        ));
        if config.mssql.trust_server_certificate {
            tds.trust_cert();
        }
        tds.encryption(if config.mssql.encrypt {
            EncryptionLevel::Required
        } else {
            EncryptionLevel::Off
        });
        tds
    }

    fn manager(&self) -> TdsManager {
        TdsManager {
            config: self.tds_config(),
            idle_timeout: self.config.pool.idle_timeout(),
            session_setup: self.config.session_setup.clone(),
        }
    }

    /// 按配置建立连接池，此时还没有任何连接
    fn build_pool(&self) -> Result<TdsPool> {
        let pool = &self.config.pool;
        Pool::builder(self.manager())
            .max_size(pool.max_connections.max(1) as usize)
            .runtime(Runtime::Tokio1)
            .wait_timeout(Some(pool.acquire_timeout()))
            .create_timeout(Some(pool.connect_timeout()))
            .recycle_timeout(Some(pool.connect_timeout()))
            .build()
            .map_err(|e| SqlGateError::Config(e.to_string()))
    }

    async fn pool(&self) -> Result<TdsPool> {
        self.pool.get_or_try_init(|| self.open()).await
    }

    async fn open(&self) -> Result<TdsPool> {
        let pool = self.build_pool()?;

        // 先借出一个连接验证配置，失败时不保留连接池
        if let Err(err) = pool.get().await {
            pool.close();
            return Err(pool_error(err));
        }

        info!(
            dialect = MSSQL.name,
            host = %self.config.host,
            database = %self.config.database,
            "connection pool established"
        );
        Ok(pool)
    }

    async fn checkout(&self) -> Result<PooledClient> {
        let pool = self.pool().await?;
        let conn = pool.get().await.map_err(pool_error)?;
        Ok(PooledClient { conn })
    }
}

#[async_trait]
impl DbExecutor for MsSqlAdapter {
    fn dialect(&self) -> &'static Dialect {
        &MSSQL
    }

    async fn query(&self, sql: &str, params: &[BindValue]) -> Result<QueryResult> {
        let mut client = self.checkout().await?;
        client.run(sql, params).await
    }
}

#[async_trait]
impl DatabaseAdapter for MsSqlAdapter {
    async fn connect(&self) -> Result<()> {
        self.pool().await.map(|_| ())
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(pool) = self.pool.take() {
            pool.close();
            info!(dialect = MSSQL.name, "connection pool closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.pool.is_set()
    }

    async fn begin(&self) -> Result<TransactionScope> {
        let mut client = self.checkout().await?;
        client.start("BEGIN TRANSACTION").await?;
        Ok(TransactionScope::new(&MSSQL, TransactionConn::MsSql(client)))
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            driver: MSSQL.driver,
            dialect: MSSQL.name,
            host: self.config.host.clone(),
            database: self.config.database.clone(),
            connected: self.is_connected(),
            max_connections: self.config.pool.max_connections,
        }
    }
}
