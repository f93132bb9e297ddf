//! 归一化的执行结果

use crate::dialect::DbDriver;
use crate::value::{BindValue, Row};
use serde::Serialize;

/// 所有适配器和构建器最终汇聚到的结果形式
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    /// 读语句为返回行数，写语句为影响行数
    pub row_count: u64,
    pub inserted_id: Option<BindValue>,
}

impl QueryResult {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let row_count = rows.len() as u64;
        Self {
            rows,
            row_count,
            inserted_id: None,
        }
    }

    pub fn affected(row_count: u64, inserted_id: Option<BindValue>) -> Self {
        Self {
            rows: Vec::new(),
            row_count,
            inserted_id,
        }
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub driver: DbDriver,
    pub dialect: &'static str,
    pub host: String,
    pub database: String,
    pub connected: bool,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InsertResult {
    pub inserted_id: Option<BindValue>,
    /// 带 RETURNING / OUTPUT 时返回的第一行
    pub inserted_record: Option<Row>,
    pub affected_rows: u64,
    pub success: bool,
}

impl InsertResult {
    pub(crate) fn from_query(result: QueryResult, key_column: Option<&str>) -> Self {
        let inserted_record = result.rows.into_iter().next();
        let inserted_id = match (&inserted_record, key_column) {
            (Some(row), Some(key)) => row.get(key).cloned().or(result.inserted_id),
            _ => result.inserted_id,
        };
        // 带 RETURNING 的语句返回的是行数而不是影响行数，二者在插入场景下一致
        Self {
            inserted_id,
            inserted_record,
            affected_rows: result.row_count,
            success: result.row_count > 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateResult {
    pub affected_rows: u64,
    pub updated_records: Vec<Row>,
    pub success: bool,
}

impl UpdateResult {
    pub(crate) fn from_query(result: QueryResult) -> Self {
        Self {
            affected_rows: result.row_count,
            success: result.row_count > 0,
            updated_records: result.rows,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeleteResult {
    pub affected_rows: u64,
    pub deleted_records: Vec<Row>,
    pub success: bool,
}

impl DeleteResult {
    pub(crate) fn from_query(result: QueryResult) -> Self {
        Self {
            affected_rows: result.row_count,
            success: result.row_count > 0,
            deleted_records: result.rows,
        }
    }
}

/// 表的列信息
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableInfo {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableInfo {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub primary_key: bool,
    pub auto_increment: bool,
}

impl ColumnInfo {
    /// 从列信息查询的一行读取，标志列接受布尔、整数或 `YES` / `NO`
    pub fn from_row(row: &Row) -> Option<Self> {
        let name = row.get("column_name").and_then(text)?;
        Some(Self {
            name,
            data_type: row.get("data_type").and_then(text).unwrap_or_default(),
            nullable: row.get("is_nullable").is_some_and(flag),
            default: row.get("column_default").and_then(text),
            primary_key: row.get("is_primary_key").is_some_and(flag),
            auto_increment: row.get("is_auto_increment").is_some_and(flag),
        })
    }
}

fn text(value: &BindValue) -> Option<String> {
    match value {
        BindValue::Null => None,
        BindValue::String(s) => Some(s.clone()),
        other => serde_json::to_string(other).ok(),
    }
}

fn flag(value: &BindValue) -> bool {
    match value {
        BindValue::String(s) if s.eq_ignore_ascii_case("yes") => true,
        other => other.as_i64().is_some_and(|i| i != 0),
    }
}

/// 批量插入的结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchInsertResult {
    pub inserted_count: u64,
    /// 本批第一行的自增主键；驱动不提供时为 None
    pub first_inserted_id: Option<BindValue>,
    pub success: bool,
}

impl BatchInsertResult {
    pub fn new(inserted_count: u64, first_inserted_id: Option<BindValue>) -> Self {
        Self {
            inserted_count,
            first_inserted_id,
            success: inserted_count > 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_result_prefers_returned_key() {
        let mut returned = QueryResult::from_rows(vec![crate::row! { "id" => 42i64, "name" => "x" }]);
        returned.inserted_id = Some(BindValue::Int64(1));
        let result = InsertResult::from_query(returned, Some("id"));
        assert_eq!(result.inserted_id, Some(BindValue::Int64(42)));
        assert!(result.success);
        assert_eq!(result.affected_rows, 1);
    }

    #[test]
    fn test_insert_result_without_rows_uses_last_insert_id() {
        let result = InsertResult::from_query(
            QueryResult::affected(1, Some(BindValue::Int64(9))),
            Some("id"),
        );
        assert_eq!(result.inserted_id, Some(BindValue::Int64(9)));
        assert!(result.inserted_record.is_none());
    }

    #[test]
    fn test_update_result_zero_rows_is_not_success() {
        let result = UpdateResult::from_query(QueryResult::affected(0, None));
        assert!(!result.success);
    }

    #[test]
    fn test_column_info_reads_mixed_flag_types() {
        let column = ColumnInfo::from_row(&crate::row! {
            "column_name" => "id",
            "data_type" => "int",
            "is_nullable" => "NO",
            "column_default" => BindValue::Null,
            "is_primary_key" => 1i64,
            "is_auto_increment" => true,
        })
        .unwrap();
        assert_eq!(column.name, "id");
        assert!(!column.nullable);
        assert!(column.primary_key);
        assert!(column.auto_increment);
        assert!(column.default.is_none());

        let column = ColumnInfo::from_row(&crate::row! {
            "column_name" => "score",
            "data_type" => "integer",
            "is_nullable" => "YES",
            "column_default" => 0i64,
            "is_primary_key" => 0i64,
            "is_auto_increment" => BindValue::Null,
        })
        .unwrap();
        assert!(column.nullable);
        assert_eq!(column.default.as_deref(), Some("0"));
        assert!(!column.auto_increment);

        assert!(ColumnInfo::from_row(&crate::row! { "data_type" => "int" }).is_none());
    }
}
