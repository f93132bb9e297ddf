//! 方言描述
//!
//! 构建器在渲染阶段只依赖 `Dialect`，与具体连接无关。

use crate::error::{Result, SqlGateError};
use crate::value::BindValue;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbDriver {
    #[serde(alias = "mariadb")]
    MySql,
    #[serde(alias = "postgresql", alias = "pgsql")]
    Postgres,
    #[serde(alias = "sqlite3")]
    Sqlite,
    #[serde(alias = "sqlserver")]
    MsSql,
}

impl DbDriver {
    /// 从驱动名解析（大小写不敏感）
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(DbDriver::MySql),
            "postgres" | "postgresql" | "pgsql" => Ok(DbDriver::Postgres),
            "sqlite" | "sqlite3" => Ok(DbDriver::Sqlite),
            "mssql" | "sqlserver" => Ok(DbDriver::MsSql),
            other => Err(SqlGateError::UnsupportedDatabase(other.to_string())),
        }
    }

    pub fn dialect(&self) -> &'static Dialect {
        match self {
            DbDriver::MySql => &MYSQL,
            DbDriver::Postgres => &POSTGRES,
            DbDriver::Sqlite => &SQLITE,
            DbDriver::MsSql => &MSSQL,
        }
    }
}

/// 占位符风格
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?`
    Positional,
    /// `$1, $2, ...`
    Numbered,
    /// `@param0, @param1, ...`
    Named,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    Backtick,
    DoubleQuote,
    Bracket,
}

impl QuoteStyle {
    fn open(&self) -> char {
        match self {
            QuoteStyle::Backtick => '`',
            QuoteStyle::DoubleQuote => '"',
            QuoteStyle::Bracket => '[',
        }
    }

    fn close(&self) -> char {
        match self {
            QuoteStyle::Backtick => '`',
            QuoteStyle::DoubleQuote => '"',
            QuoteStyle::Bracket => ']',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStyle {
    /// `ON CONFLICT ... DO NOTHING | DO UPDATE SET`
    OnConflict,
    /// `INSERT IGNORE` / `ON DUPLICATE KEY UPDATE`
    OnDuplicateKey,
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturningStyle {
    /// 语句末尾的 `RETURNING cols`
    Returning,
    /// `OUTPUT INSERTED.col` / `OUTPUT DELETED.col`
    Output,
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitStyle {
    LimitOffset,
    /// `OFFSET n ROWS FETCH NEXT m ROWS ONLY`，要求存在 ORDER BY
    OffsetFetch,
}

/// UPDATE 带 JOIN 时的写法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateJoinStyle {
    /// `UPDATE t JOIN j ON ... SET ...`
    Inline,
    /// `UPDATE t SET ... FROM j WHERE <on> AND ...`
    FromClause,
    /// `UPDATE alias SET ... FROM t AS alias JOIN j ON ...`
    TargetAlias,
}

/// DELETE 带 JOIN 时的写法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteJoinStyle {
    /// `DELETE FROM t USING j WHERE <on> AND ...`
    Using,
    /// `DELETE alias FROM t AS alias JOIN j ON ...`
    Inline,
    /// 只能删除单表，JOIN 需要改写为子查询
    Unsupported,
}

/// 二进制字面量的写法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BytesLiteral {
    /// `X'dead'`
    HexString,
    /// `'\xdead'`
    PgEscape,
    /// `0xdead`
    HexPrefix,
}

/// 值渲染为 SQL 字面量时的方言差异
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiteralStyle {
    pub true_literal: &'static str,
    pub false_literal: &'static str,
    /// 字符串中的反斜杠是否为转义符，需要双写
    pub backslash_escapes: bool,
    pub bytes: BytesLiteral,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Dialect {
    pub driver: DbDriver,
    pub name: &'static str,
    pub placeholder: PlaceholderStyle,
    pub quote: QuoteStyle,
    pub upsert: UpsertStyle,
    pub returning: ReturningStyle,
    pub limit: LimitStyle,
    pub update_join: UpdateJoinStyle,
    pub delete_join: DeleteJoinStyle,
    pub supports_update_limit: bool,
    pub supports_truncate: bool,
    /// UNION 分支能否加括号
    pub compound_parens: bool,
    /// 只有 OFFSET 时用来补齐的 LIMIT 值
    pub unbounded_limit: Option<&'static str>,
    pub version_query: &'static str,
    pub list_tables_query: &'static str,
    /// 列信息查询，唯一参数为表名
    ///
    /// 结果列依次为 column_name、data_type、is_nullable、column_default、
    /// is_primary_key、is_auto_increment。
    pub table_info_query: &'static str,
    pub literal: LiteralStyle,
}

pub static POSTGRES: Dialect = Dialect {
    driver: DbDriver::Postgres,
    name: "PostgreSQL",
    placeholder: PlaceholderStyle::Numbered,
    quote: QuoteStyle::DoubleQuote,
    upsert: UpsertStyle::OnConflict,
    returning: ReturningStyle::Returning,
    limit: LimitStyle::LimitOffset,
    update_join: UpdateJoinStyle::FromClause,
    delete_join: DeleteJoinStyle::Using,
    supports_update_limit: false,
    supports_truncate: true,
    compound_parens: true,
    unbounded_limit: None,
    version_query: "SELECT version()",
    list_tables_query: "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' ORDER BY table_name",
    table_info_query: "SELECT c.column_name::text AS column_name, c.data_type::text AS data_type, \
         c.is_nullable::text AS is_nullable, c.column_default::text AS column_default, \
         CASE WHEN EXISTS (SELECT 1 FROM information_schema.table_constraints tc \
         JOIN information_schema.key_column_usage k ON k.constraint_name = tc.constraint_name \
         AND k.table_schema = tc.table_schema AND k.table_name = tc.table_name \
         WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = c.table_schema \
         AND tc.table_name = c.table_name AND k.column_name = c.column_name) THEN 1 ELSE 0 END AS is_primary_key, \
         CASE WHEN c.is_identity = 'YES' OR c.column_default LIKE 'nextval(%' THEN 1 ELSE 0 END AS is_auto_increment \
         FROM information_schema.columns c \
         WHERE c.table_schema = current_schema() AND c.table_name::text = $1 ORDER BY c.ordinal_position",
    literal: LiteralStyle {
        true_literal: "TRUE",
        false_literal: "FALSE",
        backslash_escapes: false,
        bytes: BytesLiteral::PgEscape,
    },
};

pub static MYSQL: Dialect = Dialect {
    driver: DbDriver::MySql,
    name: "MySQL",
    placeholder: PlaceholderStyle::Positional,
    quote: QuoteStyle::Backtick,
    upsert: UpsertStyle::OnDuplicateKey,
    returning: ReturningStyle::Unsupported,
    limit: LimitStyle::LimitOffset,
    update_join: UpdateJoinStyle::Inline,
    delete_join: DeleteJoinStyle::Inline,
    supports_update_limit: true,
    supports_truncate: true,
    compound_parens: true,
    unbounded_limit: Some("18446744073709551615"),
    version_query: "SELECT VERSION()",
    list_tables_query: "SELECT table_name AS table_name FROM information_schema.tables \
         WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' ORDER BY table_name",
    table_info_query: "SELECT COLUMN_NAME AS column_name, DATA_TYPE AS data_type, \
         IS_NULLABLE AS is_nullable, COLUMN_DEFAULT AS column_default, \
         CASE WHEN COLUMN_KEY = 'PRI' THEN 1 ELSE 0 END AS is_primary_key, \
         CASE WHEN EXTRA LIKE '%auto_increment%' THEN 1 ELSE 0 END AS is_auto_increment \
         FROM INFORMATION_SCHEMA.COLUMNS \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION",
    literal: LiteralStyle {
        true_literal: "1",
        false_literal: "0",
        backslash_escapes: true,
        bytes: BytesLiteral::HexString,
    },
};

pub static SQLITE: Dialect = Dialect {
    driver: DbDriver::Sqlite,
    name: "SQLite",
    placeholder: PlaceholderStyle::Positional,
    quote: QuoteStyle::DoubleQuote,
    upsert: UpsertStyle::OnConflict,
    returning: ReturningStyle::Unsupported,
    limit: LimitStyle::LimitOffset,
    update_join: UpdateJoinStyle::FromClause,
    delete_join: DeleteJoinStyle::Unsupported,
    supports_update_limit: true,
    supports_truncate: false,
    compound_parens: false,
    unbounded_limit: Some("-1"),
    version_query: "SELECT sqlite_version()",
    list_tables_query: "SELECT name AS table_name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    table_info_query: "SELECT name AS column_name, type AS data_type, \
         CASE WHEN \"notnull\" = 0 THEN 'YES' ELSE 'NO' END AS is_nullable, \
         dflt_value AS column_default, \
         CASE WHEN pk > 0 THEN 1 ELSE 0 END AS is_primary_key, \
         CASE WHEN pk = 1 AND upper(type) = 'INTEGER' AND SUM(pk > 0) OVER () = 1 \
         THEN 1 ELSE 0 END AS is_auto_increment \
         FROM pragma_table_info(?) ORDER BY cid",
    literal: LiteralStyle {
        true_literal: "1",
        false_literal: "0",
        backslash_escapes: false,
        bytes: BytesLiteral::HexString,
    },
};

pub static MSSQL: Dialect = Dialect {
    driver: DbDriver::MsSql,
    name: "SQL Server",
    placeholder: PlaceholderStyle::Named,
    quote: QuoteStyle::Bracket,
    upsert: UpsertStyle::Unsupported,
    returning: ReturningStyle::Output,
    limit: LimitStyle::OffsetFetch,
    update_join: UpdateJoinStyle::TargetAlias,
    delete_join: DeleteJoinStyle::Inline,
    supports_update_limit: false,
    supports_truncate: true,
    compound_parens: true,
    unbounded_limit: None,
    version_query: "SELECT @@VERSION",
    list_tables_query: "SELECT TABLE_NAME AS table_name FROM INFORMATION_SCHEMA.TABLES \
         WHERE TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME",
    table_info_query: "SELECT c.COLUMN_NAME AS column_name, c.DATA_TYPE AS data_type, \
         c.IS_NULLABLE AS is_nullable, c.COLUMN_DEFAULT AS column_default, \
         CASE WHEN EXISTS (SELECT 1 FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
         JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE k ON k.CONSTRAINT_NAME = tc.CONSTRAINT_NAME \
         AND k.TABLE_SCHEMA = tc.TABLE_SCHEMA AND k.TABLE_NAME = tc.TABLE_NAME \
         WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY' AND tc.TABLE_SCHEMA = c.TABLE_SCHEMA \
         AND tc.TABLE_NAME = c.TABLE_NAME AND k.COLUMN_NAME = c.COLUMN_NAME) THEN 1 ELSE 0 END AS is_primary_key, \
         COLUMNPROPERTY(OBJECT_ID(QUOTENAME(c.TABLE_SCHEMA) + '.' + QUOTENAME(c.TABLE_NAME)), \
         c.COLUMN_NAME, 'IsIdentity') AS is_auto_increment \
         FROM INFORMATION_SCHEMA.COLUMNS c WHERE c.TABLE_NAME = @param0 ORDER BY c.ORDINAL_POSITION",
    literal: LiteralStyle {
        true_literal: "1",
        false_literal: "0",
        backslash_escapes: false,
        bytes: BytesLiteral::HexPrefix,
    },
};

impl Dialect {
    /// 第 `index` 个占位符（从 0 开始）
    pub fn placeholder(&self, index: usize) -> String {
        match self.placeholder {
            PlaceholderStyle::Positional => "?".to_string(),
            PlaceholderStyle::Numbered => format!("${}", index + 1),
            PlaceholderStyle::Named => format!("@param{}", index),
        }
    }

    /// 转义 SQL 标识符
    ///
    /// `schema.table` 按段分别加引号，`*` 保持原样；
    /// 含括号或空白的表达式（如 `COUNT(*)`）原样返回。
    pub fn quote_identifier(&self, name: &str) -> String {
        let name = name.trim();
        if name.is_empty() || name == "*" {
            return name.to_string();
        }
        if name.contains(|c: char| c == '(' || c == ')' || c.is_whitespace()) {
            return name.to_string();
        }

        name.split('.')
            .map(|part| self.quote_part(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn quote_part(&self, part: &str) -> String {
        let (open, close) = (self.quote.open(), self.quote.close());
        if part == "*" {
            return part.to_string();
        }
        if part.len() >= 2 && part.starts_with(open) && part.ends_with(close) {
            return part.to_string();
        }
        let escaped = part.replace(close, &format!("{}{}", close, close));
        format!("{}{}{}", open, escaped, close)
    }

    /// 转义字符串字面量（不含两侧引号）
    pub fn escape_string(&self, value: &str) -> String {
        let escaped = value.replace('\'', "''");
        if self.literal.backslash_escapes {
            escaped.replace('\\', "\\\\")
        } else {
            escaped
        }
    }

    /// 把值渲染为 SQL 字面量
    pub fn escape(&self, value: &BindValue) -> String {
        match value {
            BindValue::Null => "NULL".to_string(),
            BindValue::Bool(b) => {
                let literal = if *b {
                    self.literal.true_literal
                } else {
                    self.literal.false_literal
                };
                literal.to_string()
            }
            BindValue::Int64(i) => i.to_string(),
            BindValue::Int32(i) => i.to_string(),
            BindValue::Int16(i) => i.to_string(),
            BindValue::Float64(f) => f.to_string(),
            BindValue::Float32(f) => f.to_string(),
            BindValue::Decimal(d) => d.to_string(),
            BindValue::String(s) => format!("'{}'", self.escape_string(s)),
            BindValue::Bytes(b) => {
                let hex = b.iter().fold(String::with_capacity(b.len() * 2), |mut acc, byte| {
                    let _ = write!(acc, "{:02x}", byte);
                    acc
                });
                match self.literal.bytes {
                    BytesLiteral::PgEscape => format!("'\\x{}'", hex),
                    BytesLiteral::HexPrefix => format!("0x{}", hex),
                    BytesLiteral::HexString => format!("X'{}'", hex),
                }
            }
            BindValue::DateTime(d) => format!("'{}'", d.format("%Y-%m-%d %H:%M:%S%.f")),
            BindValue::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
            BindValue::Time(t) => format!("'{}'", t.format("%H:%M:%S%.f")),
            BindValue::Json(v) => format!("'{}'", self.escape_string(&v.to_string())),
        }
    }

    /// LIMIT / OFFSET 子句（带前导空格）
    ///
    /// `has_order` 为 false 且方言使用 OFFSET..FETCH 时，会补上 `ORDER BY (SELECT NULL)`。
    pub fn limit_clause(&self, has_order: bool, limit: Option<u64>, offset: Option<u64>) -> String {
        let mut sql = String::new();
        if limit.is_none() && offset.is_none() {
            return sql;
        }

        match self.limit {
            LimitStyle::LimitOffset => {
                match (limit, offset, self.unbounded_limit) {
                    (Some(limit), _, _) => {
                        let _ = write!(sql, " LIMIT {}", limit);
                    }
                    (None, Some(_), Some(unbounded)) => {
                        let _ = write!(sql, " LIMIT {}", unbounded);
                    }
                    _ => {}
                }
                if let Some(offset) = offset {
                    let _ = write!(sql, " OFFSET {}", offset);
                }
            }
            LimitStyle::OffsetFetch => {
                if !has_order {
                    sql.push_str(" ORDER BY (SELECT NULL)");
                }
                let _ = write!(sql, " OFFSET {} ROWS", offset.unwrap_or(0));
                if let Some(limit) = limit {
                    let _ = write!(sql, " FETCH NEXT {} ROWS ONLY", limit);
                }
            }
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(MYSQL.placeholder(3), "?");
        assert_eq!(SQLITE.placeholder(0), "?");
        assert_eq!(POSTGRES.placeholder(0), "$1");
        assert_eq!(POSTGRES.placeholder(4), "$5");
        assert_eq!(MSSQL.placeholder(0), "@param0");
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(MYSQL.quote_identifier("users"), "`users`");
        assert_eq!(POSTGRES.quote_identifier("public.users"), "\"public\".\"users\"");
        assert_eq!(MSSQL.quote_identifier("dbo.users"), "[dbo].[users]");
        assert_eq!(SQLITE.quote_identifier("t.*"), "\"t\".*");
        assert_eq!(POSTGRES.quote_identifier("*"), "*");
        assert_eq!(POSTGRES.quote_identifier("COUNT(*)"), "COUNT(*)");
    }

    #[test]
    fn test_quote_identifier_escapes_quote_char() {
        assert_eq!(POSTGRES.quote_identifier("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(MYSQL.quote_identifier("we`ird"), "`we``ird`");
        assert_eq!(MSSQL.quote_identifier("we]ird"), "[we]]ird]");
    }

    #[test]
    fn test_escape_literals() {
        assert_eq!(POSTGRES.escape(&BindValue::from("O'Brien")), "'O''Brien'");
        assert_eq!(MYSQL.escape(&BindValue::from("a\\b")), "'a\\\\b'");
        assert_eq!(POSTGRES.escape(&BindValue::Bool(true)), "TRUE");
        assert_eq!(SQLITE.escape(&BindValue::Bool(true)), "1");
        assert_eq!(SQLITE.escape(&BindValue::Null), "NULL");
        assert_eq!(SQLITE.escape(&BindValue::Bytes(vec![0xde, 0xad])), "X'dead'");
    }

    #[test]
    fn test_escape_follows_literal_style() {
        let custom = Dialect {
            literal: LiteralStyle {
                true_literal: "TRUE",
                false_literal: "FALSE",
                backslash_escapes: true,
                bytes: BytesLiteral::HexPrefix,
            },
            ..SQLITE
        };
        assert_eq!(custom.driver, DbDriver::Sqlite);
        assert_eq!(custom.escape(&BindValue::Bool(false)), "FALSE");
        assert_eq!(custom.escape(&BindValue::from("a\\b")), "'a\\\\b'");
        assert_eq!(custom.escape(&BindValue::Bytes(vec![0xbe, 0xef])), "0xbeef");
        assert_eq!(MSSQL.escape(&BindValue::Bytes(vec![0xbe, 0xef])), "0xbeef");
        assert_eq!(POSTGRES.escape(&BindValue::Bytes(vec![0xbe])), "'\\xbe'");
    }

    #[test]
    fn test_limit_clause() {
        assert_eq!(POSTGRES.limit_clause(true, Some(10), Some(20)), " LIMIT 10 OFFSET 20");
        assert_eq!(POSTGRES.limit_clause(true, None, Some(5)), " OFFSET 5");
        assert_eq!(SQLITE.limit_clause(false, None, Some(5)), " LIMIT -1 OFFSET 5");
        assert_eq!(MYSQL.limit_clause(false, None, None), "");
        assert_eq!(
            MSSQL.limit_clause(false, Some(10), None),
            " ORDER BY (SELECT NULL) OFFSET 0 ROWS FETCH NEXT 10 ROWS ONLY"
        );
        assert_eq!(MSSQL.limit_clause(true, None, Some(3)), " OFFSET 3 ROWS");
    }

    #[test]
    fn test_driver_from_name() {
        assert_eq!(DbDriver::from_name("PostgreSQL").unwrap(), DbDriver::Postgres);
        assert_eq!(DbDriver::from_name("sqlserver").unwrap(), DbDriver::MsSql);
        assert!(matches!(
            DbDriver::from_name("oracle"),
            Err(SqlGateError::UnsupportedDatabase(_))
        ));
    }
}
