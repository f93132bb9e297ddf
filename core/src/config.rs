//! 连接配置
//!
//! 配置只通过构造函数显式注入，没有全局默认连接。

use crate::dialect::DbDriver;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub driver: DbDriver,
    pub host: String,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// SQLite 时为数据库文件路径（`:memory:` 表示内存库）
    pub database: String,
    pub pool: PoolConfig,
    pub sqlite: SqliteConfig,
    pub mysql: MySqlConfig,
    pub mssql: MsSqlConfig,
    /// 每个新建连接上执行的语句
    pub session_setup: Vec<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DbDriver::Sqlite,
            host: "localhost".to_string(),
            port: None,
            user: None,
            password: None,
            database: String::new(),
            pool: PoolConfig::default(),
            sqlite: SqliteConfig::default(),
            mysql: MySqlConfig::default(),
            mssql: MsSqlConfig::default(),
            session_setup: Vec::new(),
        }
    }
}

impl DatabaseConfig {
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            driver: DbDriver::Sqlite,
            database: path.into(),
            ..Self::default()
        }
    }

    pub fn postgres(host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            driver: DbDriver::Postgres,
            host: host.into(),
            database: database.into(),
            ..Self::default()
        }
    }

    pub fn mysql(host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            driver: DbDriver::MySql,
            host: host.into(),
            database: database.into(),
            ..Self::default()
        }
    }

    pub fn mssql(host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            driver: DbDriver::MsSql,
            host: host.into(),
            database: database.into(),
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_session_setup(mut self, statement: impl Into<String>) -> Self {
        self.session_setup.push(statement.into());
        self
    }

    /// 未显式配置时使用各驱动的默认端口
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(match self.driver {
            DbDriver::MySql => 3306,
            DbDriver::Postgres => 5432,
            DbDriver::MsSql => 1433,
            DbDriver::Sqlite => 0,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout_ms: 60_000,
            idle_timeout_ms: 30_000,
            connect_timeout_ms: 2_000,
        }
    }
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    pub busy_timeout_ms: u64,
    /// 负数表示 KiB
    pub cache_size: i64,
    pub temp_store: String,
    pub synchronous: String,
    pub journal_wal: bool,
    pub foreign_keys: bool,
    pub create_if_missing: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 10_000,
            cache_size: -2000,
            temp_store: "MEMORY".to_string(),
            synchronous: "NORMAL".to_string(),
            journal_wal: true,
            foreign_keys: true,
            create_if_missing: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MySqlConfig {
    pub charset: String,
    /// 例如 `+00:00`
    pub timezone: Option<String>,
}

impl Default for MySqlConfig {
    fn default() -> Self {
        Self {
            charset: "utf8mb4".to_string(),
            timezone: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MsSqlConfig {
    pub encrypt: bool,
    pub trust_server_certificate: bool,
}

impl Default for MsSqlConfig {
    fn default() -> Self {
        Self {
            encrypt: true,
            trust_server_certificate: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DatabaseConfig::sqlite("/tmp/app.db");
        assert_eq!(config.pool.max_connections, 10);
        assert_eq!(config.pool.min_connections, 0);
        assert_eq!(config.pool.acquire_timeout(), Duration::from_secs(60));
        assert_eq!(config.sqlite.busy_timeout_ms, 10_000);
        assert_eq!(config.sqlite.cache_size, -2000);
        assert!(config.sqlite.journal_wal);
        assert_eq!(config.mysql.charset, "utf8mb4");
    }

    #[test]
    fn test_deserialize_partial_config() {
        let json = r#"{
            "driver": "postgresql",
            "host": "db.internal",
            "database": "app",
            "pool": { "max_connections": 4 }
        }"#;
        let config: DatabaseConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.driver, DbDriver::Postgres);
        assert_eq!(config.pool.max_connections, 4);
        assert_eq!(config.pool.idle_timeout_ms, 30_000);
        assert_eq!(config.port_or_default(), 5432);
    }
}
