//! 结果行解码
//!
//! 两步：先按列类型名归类，再由各数据库的解码函数取值。

use crate::value::{BindValue, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    DateTime,
    DateTimeTz,
    Date,
    Time,
    Null,
    Unknown,
}

/// 按类型名归类列
pub(crate) fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_ascii_lowercase();

    if lower.is_empty() || lower == "null" {
        return TypeCategory::Null;
    }
    if lower.contains("decimal") || lower.contains("numeric") || lower == "money" {
        return TypeCategory::Decimal;
    }
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }
    if lower.contains("int") || lower.contains("serial") {
        return TypeCategory::Integer;
    }
    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }
    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }
    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }
    if lower == "timestamptz" {
        return TypeCategory::DateTimeTz;
    }
    if lower.contains("timestamp") || lower.contains("datetime") {
        return TypeCategory::DateTime;
    }
    if lower == "date" {
        return TypeCategory::Date;
    }
    if lower == "time" {
        return TypeCategory::Time;
    }
    if lower.contains("char") || lower.contains("text") || lower == "name" || lower == "uuid" {
        return TypeCategory::Text;
    }
    TypeCategory::Unknown
}

fn lift<T, F: FnOnce(T) -> BindValue>(value: Option<T>, f: F) -> BindValue {
    value.map(f).unwrap_or(BindValue::Null)
}

#[cfg(any(feature = "mysql", feature = "postgres", feature = "sqlite"))]
fn try_get<'r, R, T>(row: &'r R, idx: usize) -> Option<Option<T>>
where
    R: sqlx::Row,
    usize: sqlx::ColumnIndex<R>,
    T: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    row.try_get::<Option<T>, _>(idx).ok()
}

/// 依次尝试多个 Rust 类型，第一个解码成功的生效
#[cfg(any(feature = "mysql", feature = "postgres", feature = "sqlite"))]
macro_rules! decode_first {
    ($row:expr, $idx:expr, $( $ty:ty => $map:expr ),+ $(,)?) => {{
        let mut decoded = None;
        $(
            if decoded.is_none() {
                if let Some(v) = try_get::<_, $ty>($row, $idx) {
                    decoded = Some(lift::<$ty, _>(v, $map));
                }
            }
        )+
        decoded
    }};
}

#[cfg(feature = "postgres")]
pub(crate) mod postgres {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use sqlx::postgres::PgRow;
    use sqlx::{Column, Row as _, TypeInfo};

    pub(crate) fn decode_row(row: &PgRow) -> Row {
        row.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name());
                (col.name().to_string(), decode_column(row, idx, category))
            })
            .collect()
    }

    fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> BindValue {
        let decoded = match category {
            TypeCategory::Integer => decode_first!(row, idx,
                i64 => BindValue::Int64,
                i32 => |v| BindValue::Int64(v as i64),
                i16 => |v| BindValue::Int64(v as i64),
            ),
            TypeCategory::Float => decode_first!(row, idx,
                f64 => BindValue::Float64,
                f32 => |v| BindValue::Float64(v as f64),
            ),
            TypeCategory::Decimal => decode_first!(row, idx, BigDecimal => BindValue::Decimal),
            TypeCategory::Boolean => decode_first!(row, idx, bool => BindValue::Bool),
            TypeCategory::Binary => decode_first!(row, idx, Vec<u8> => BindValue::Bytes),
            TypeCategory::Json => decode_first!(row, idx, serde_json::Value => BindValue::Json),
            TypeCategory::DateTime => {
                decode_first!(row, idx, NaiveDateTime => BindValue::DateTime)
            }
            TypeCategory::DateTimeTz => decode_first!(row, idx,
                DateTime<Utc> => |v| BindValue::DateTime(v.naive_utc()),
            ),
            TypeCategory::Date => decode_first!(row, idx, NaiveDate => BindValue::Date),
            TypeCategory::Time => decode_first!(row, idx, NaiveTime => BindValue::Time),
            _ => decode_first!(row, idx, String => BindValue::String),
        };

        decoded.unwrap_or_else(|| {
            tracing::debug!(column = idx, ?category, "unsupported postgres column type, using NULL");
            BindValue::Null
        })
    }
}

#[cfg(feature = "mysql")]
pub(crate) mod mysql {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use sqlx::mysql::MySqlRow;
    use sqlx::{Column, Row as _, TypeInfo};

    pub(crate) fn decode_row(row: &MySqlRow) -> Row {
        row.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name());
                (col.name().to_string(), decode_column(row, idx, category))
            })
            .collect()
    }

    fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> BindValue {
        let decoded = match category {
            TypeCategory::Integer => decode_first!(row, idx,
                i64 => BindValue::Int64,
                u64 => |v: u64| match i64::try_from(v) {
                    Ok(i) => BindValue::Int64(i),
                    Err(_) => BindValue::Decimal(BigDecimal::from(v)),
                },
                i32 => |v| BindValue::Int64(v as i64),
                u32 => |v| BindValue::Int64(v as i64),
                i16 => |v| BindValue::Int64(v as i64),
                i8 => |v| BindValue::Int64(v as i64),
            ),
            TypeCategory::Float => decode_first!(row, idx,
                f64 => BindValue::Float64,
                f32 => |v| BindValue::Float64(v as f64),
            ),
            TypeCategory::Decimal => decode_first!(row, idx, BigDecimal => BindValue::Decimal),
            TypeCategory::Boolean => decode_first!(row, idx,
                bool => BindValue::Bool,
                i8 => |v| BindValue::Bool(v != 0),
            ),
            TypeCategory::Binary => decode_first!(row, idx,
                Vec<u8> => BindValue::Bytes,
            ),
            TypeCategory::Json => decode_first!(row, idx, serde_json::Value => BindValue::Json),
            TypeCategory::DateTime | TypeCategory::DateTimeTz => decode_first!(row, idx,
                NaiveDateTime => BindValue::DateTime,
                DateTime<Utc> => |v| BindValue::DateTime(v.naive_utc()),
            ),
            TypeCategory::Date => decode_first!(row, idx, NaiveDate => BindValue::Date),
            TypeCategory::Time => decode_first!(row, idx, NaiveTime => BindValue::Time),
            // 部分文本列以二进制排序规则返回
            _ => decode_first!(row, idx,
                String => BindValue::String,
                Vec<u8> => |v| match String::from_utf8(v) {
                    Ok(s) => BindValue::String(s),
                    Err(e) => BindValue::Bytes(e.into_bytes()),
                },
            ),
        };

        decoded.unwrap_or_else(|| {
            tracing::debug!(column = idx, ?category, "unsupported mysql column type, using NULL");
            BindValue::Null
        })
    }
}

#[cfg(feature = "sqlite")]
pub(crate) mod sqlite {
    use super::*;
    use sqlx::sqlite::SqliteRow;
    use sqlx::{Column, Row as _, TypeInfo, ValueRef};

    pub(crate) fn decode_row(row: &SqliteRow) -> Row {
        row.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| (col.name().to_string(), decode_column(row, idx, col.type_info().name())))
            .collect()
    }

    fn decode_column(row: &SqliteRow, idx: usize, declared: &str) -> BindValue {
        let raw = match row.try_get_raw(idx) {
            Ok(raw) => raw,
            Err(_) => return BindValue::Null,
        };
        if raw.is_null() {
            return BindValue::Null;
        }
        // 表达式列没有声明类型，按存储类型解码
        let storage = raw.type_info().name().to_string();

        let category = match categorize_type(declared) {
            TypeCategory::Null | TypeCategory::Unknown => categorize_type(&storage),
            other => other,
        };

        let decoded = match category {
            TypeCategory::Integer => decode_first!(row, idx, i64 => BindValue::Int64),
            TypeCategory::Float => decode_first!(row, idx, f64 => BindValue::Float64),
            // SQLite 的 NUMERIC 实际按整数或浮点数保存
            TypeCategory::Decimal => decode_first!(row, idx,
                i64 => BindValue::Int64,
                f64 => BindValue::Float64,
                String => BindValue::String,
            ),
            TypeCategory::Boolean => decode_first!(row, idx,
                bool => BindValue::Bool,
                i64 => |v| BindValue::Bool(v != 0),
            ),
            TypeCategory::Binary => decode_first!(row, idx, Vec<u8> => BindValue::Bytes),
            _ => None,
        };

        decoded
            .or_else(|| match storage.as_str() {
                "INTEGER" => decode_first!(row, idx, i64 => BindValue::Int64),
                "REAL" => decode_first!(row, idx, f64 => BindValue::Float64),
                "BLOB" => decode_first!(row, idx, Vec<u8> => BindValue::Bytes),
                _ => decode_first!(row, idx, String => BindValue::String),
            })
            .unwrap_or(BindValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type() {
        assert_eq!(categorize_type("INT4"), TypeCategory::Integer);
        assert_eq!(categorize_type("BIGINT UNSIGNED"), TypeCategory::Integer);
        assert_eq!(categorize_type("NUMERIC"), TypeCategory::Decimal);
        assert_eq!(categorize_type("BOOLEAN"), TypeCategory::Boolean);
        assert_eq!(categorize_type("FLOAT8"), TypeCategory::Float);
        assert_eq!(categorize_type("jsonb"), TypeCategory::Json);
        assert_eq!(categorize_type("BYTEA"), TypeCategory::Binary);
        assert_eq!(categorize_type("TIMESTAMPTZ"), TypeCategory::DateTimeTz);
        assert_eq!(categorize_type("DATETIME"), TypeCategory::DateTime);
        assert_eq!(categorize_type("VARCHAR"), TypeCategory::Text);
        assert_eq!(categorize_type("NULL"), TypeCategory::Null);
        assert_eq!(categorize_type("geometry"), TypeCategory::Unknown);
    }

    #[test]
    fn test_lift_maps_none_to_null() {
        assert_eq!(lift(None::<i64>, BindValue::Int64), BindValue::Null);
        assert_eq!(lift(Some(2i64), BindValue::Int64), BindValue::Int64(2));
    }
}
