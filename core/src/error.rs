use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlGateError {
    #[error("Unsupported database: {0}")]
    UnsupportedDatabase(String),
    /// 建立连接失败，适配器回到未连接状态，可以再次尝试
    #[error("{dialect} connection failed: {message}")]
    Connection {
        dialect: &'static str,
        message: String,
    },
    /// 查询失败，携带原始 SQL 便于排查
    #[error("{dialect} query failed: {message}\nSQL: {sql}")]
    Query {
        dialect: &'static str,
        message: String,
        sql: String,
    },
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    /// 构建器使用错误（缺少表名、空的列/值、空的 IN 列表等），在任何 I/O 之前抛出
    #[error("Invalid query: {0}")]
    Builder(String),
    /// 网关的 update/delete 缺少 WHERE 条件
    #[error("{table}.{operation}() requires a where specification")]
    MissingWhere {
        table: String,
        operation: &'static str,
    },
    #[error("No connection pool available for driver")]
    NoPoolAvailable,
    /// Transaction has already been consumed (committed or rolled back)
    #[error("Transaction has already been consumed")]
    AlreadyConsumed,
    /// Invalid field error
    #[error("Invalid field: {0}")]
    InvalidField(String),
    #[error("Hydration failed: {0}")]
    Hydration(String),
    #[error("Configuration error: {0}")]
    Config(String),
    /// Generic error message for compatibility
    #[error("{0}")]
    Other(String),
}

impl SqlGateError {
    pub fn builder(message: impl Into<String>) -> Self {
        SqlGateError::Builder(message.into())
    }

    pub fn connection(dialect: &'static str, err: impl std::fmt::Display) -> Self {
        SqlGateError::Connection {
            dialect,
            message: err.to_string(),
        }
    }

    pub fn query(dialect: &'static str, err: impl std::fmt::Display, sql: &str) -> Self {
        SqlGateError::Query {
            dialect,
            message: err.to_string(),
            sql: sql.to_string(),
        }
    }

    /// 是否为构建器使用错误（这类错误不会触达数据库）
    pub fn is_builder_error(&self) -> bool {
        matches!(
            self,
            SqlGateError::Builder(_) | SqlGateError::MissingWhere { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SqlGateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_carries_sql() {
        let err = SqlGateError::query("SQLite", "no such table: users", "SELECT * FROM users");
        assert_eq!(
            err.to_string(),
            "SQLite query failed: no such table: users\nSQL: SELECT * FROM users"
        );
    }

    #[test]
    fn test_missing_where_message() {
        let err = SqlGateError::MissingWhere {
            table: "files".to_string(),
            operation: "delete",
        };
        assert_eq!(err.to_string(), "files.delete() requires a where specification");
        assert!(err.is_builder_error());
    }
}
