//! 绑定值与结果行
//!
//! `BindValue` 既用于构建器的参数列表，也用于解码后的结果列值；
//! `Row` 是按列顺序保存的一行数据。

use crate::error::{Result, SqlGateError};
use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::str::FromStr;

/// 绑定值，用于安全地传递参数
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BindValue {
    Null,
    Bool(bool),
    Int64(i64),
    Int32(i32),
    Int16(i16),
    Float64(f64),
    Float32(f32),
    String(String),
    Bytes(Vec<u8>),
    Decimal(BigDecimal),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
    Json(serde_json::Value),
}

impl BindValue {
    pub fn is_null(&self) -> bool {
        matches!(self, BindValue::Null)
    }

    /// 以 i64 读取整数类的值
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            BindValue::Int64(i) => Some(*i),
            BindValue::Int32(i) => Some(*i as i64),
            BindValue::Int16(i) => Some(*i as i64),
            BindValue::Bool(b) => Some(*b as i64),
            BindValue::Decimal(d) if d.is_integer() => d.to_i64(),
            BindValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            BindValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            BindValue::Null => "null",
            BindValue::Bool(_) => "bool",
            BindValue::Int64(_) => "i64",
            BindValue::Int32(_) => "i32",
            BindValue::Int16(_) => "i16",
            BindValue::Float64(_) => "f64",
            BindValue::Float32(_) => "f32",
            BindValue::String(_) => "string",
            BindValue::Bytes(_) => "bytes",
            BindValue::Decimal(_) => "decimal",
            BindValue::DateTime(_) => "datetime",
            BindValue::Date(_) => "date",
            BindValue::Time(_) => "time",
            BindValue::Json(_) => "json",
        }
    }
}

impl From<String> for BindValue {
    fn from(s: String) -> Self {
        BindValue::String(s)
    }
}

impl From<&str> for BindValue {
    fn from(s: &str) -> Self {
        BindValue::String(s.to_string())
    }
}

impl From<&String> for BindValue {
    fn from(s: &String) -> Self {
        BindValue::String(s.clone())
    }
}

impl From<i64> for BindValue {
    fn from(i: i64) -> Self {
        BindValue::Int64(i)
    }
}

impl From<i32> for BindValue {
    fn from(i: i32) -> Self {
        BindValue::Int32(i)
    }
}

impl From<i16> for BindValue {
    fn from(i: i16) -> Self {
        BindValue::Int16(i)
    }
}

impl From<u32> for BindValue {
    fn from(i: u32) -> Self {
        BindValue::Int64(i as i64)
    }
}

impl From<f64> for BindValue {
    fn from(f: f64) -> Self {
        BindValue::Float64(f)
    }
}

impl From<f32> for BindValue {
    fn from(f: f32) -> Self {
        BindValue::Float32(f)
    }
}

impl From<bool> for BindValue {
    fn from(b: bool) -> Self {
        BindValue::Bool(b)
    }
}

impl From<Vec<u8>> for BindValue {
    fn from(b: Vec<u8>) -> Self {
        BindValue::Bytes(b)
    }
}

impl From<BigDecimal> for BindValue {
    fn from(d: BigDecimal) -> Self {
        BindValue::Decimal(d)
    }
}

impl From<NaiveDateTime> for BindValue {
    fn from(d: NaiveDateTime) -> Self {
        BindValue::DateTime(d)
    }
}

impl From<NaiveDate> for BindValue {
    fn from(d: NaiveDate) -> Self {
        BindValue::Date(d)
    }
}

impl From<NaiveTime> for BindValue {
    fn from(t: NaiveTime) -> Self {
        BindValue::Time(t)
    }
}

impl From<serde_json::Value> for BindValue {
    fn from(v: serde_json::Value) -> Self {
        BindValue::Json(v)
    }
}

impl<T: Into<BindValue>> From<Option<T>> for BindValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => BindValue::Null,
        }
    }
}

/// 从 `BindValue` 还原 Rust 类型，供 hydrator 使用
pub trait FromValue: Sized {
    fn from_value(value: BindValue) -> Result<Self>;
}

fn mismatch<T>(value: &BindValue, target: &str) -> Result<T> {
    Err(SqlGateError::Hydration(format!(
        "cannot convert {} value {:?} into {}",
        value.type_name(),
        value,
        target
    )))
}

impl FromValue for BindValue {
    fn from_value(value: BindValue) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for i64 {
    fn from_value(value: BindValue) -> Result<Self> {
        match value.as_i64() {
            Some(i) => Ok(i),
            None => mismatch(&value, "i64"),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: BindValue) -> Result<Self> {
        match value.as_i64().and_then(|i| i32::try_from(i).ok()) {
            Some(i) => Ok(i),
            None => mismatch(&value, "i32"),
        }
    }
}

impl FromValue for i16 {
    fn from_value(value: BindValue) -> Result<Self> {
        match value.as_i64().and_then(|i| i16::try_from(i).ok()) {
            Some(i) => Ok(i),
            None => mismatch(&value, "i16"),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: BindValue) -> Result<Self> {
        match &value {
            BindValue::Float64(f) => Ok(*f),
            BindValue::Float32(f) => Ok(*f as f64),
            BindValue::Decimal(d) => d.to_f64().map_or_else(|| mismatch(&value, "f64"), Ok),
            BindValue::String(s) => s.parse().or_else(|_| mismatch(&value, "f64")),
            other => other
                .as_i64()
                .map_or_else(|| mismatch(&value, "f64"), |i| Ok(i as f64)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: BindValue) -> Result<Self> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl FromValue for bool {
    fn from_value(value: BindValue) -> Result<Self> {
        match &value {
            BindValue::Bool(b) => Ok(*b),
            // SQLite / MySQL 用整数保存布尔值
            other => other
                .as_i64()
                .map_or_else(|| mismatch(&value, "bool"), |i| Ok(i != 0)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: BindValue) -> Result<Self> {
        match value {
            BindValue::String(s) => Ok(s),
            BindValue::Int64(i) => Ok(i.to_string()),
            BindValue::Int32(i) => Ok(i.to_string()),
            BindValue::Int16(i) => Ok(i.to_string()),
            BindValue::Decimal(d) => Ok(d.to_string()),
            BindValue::Json(v) => Ok(v.to_string()),
            BindValue::Bytes(b) => {
                String::from_utf8(b).map_err(|e| SqlGateError::Hydration(e.to_string()))
            }
            other => mismatch(&other, "String"),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: BindValue) -> Result<Self> {
        match value {
            BindValue::Bytes(b) => Ok(b),
            BindValue::String(s) => Ok(s.into_bytes()),
            other => mismatch(&other, "Vec<u8>"),
        }
    }
}

impl FromValue for BigDecimal {
    fn from_value(value: BindValue) -> Result<Self> {
        match &value {
            BindValue::Decimal(d) => Ok(d.clone()),
            BindValue::String(s) => {
                BigDecimal::from_str(s).or_else(|_| mismatch(&value, "BigDecimal"))
            }
            BindValue::Float64(f) => {
                BigDecimal::try_from(*f).or_else(|_| mismatch(&value, "BigDecimal"))
            }
            other => other
                .as_i64()
                .map_or_else(|| mismatch(&value, "BigDecimal"), |i| Ok(BigDecimal::from(i))),
        }
    }
}

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];

impl FromValue for NaiveDateTime {
    fn from_value(value: BindValue) -> Result<Self> {
        match &value {
            BindValue::DateTime(d) => Ok(*d),
            BindValue::Date(d) => Ok(d.and_time(NaiveTime::MIN)),
            // SQLite 以文本保存时间
            BindValue::String(s) => DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map_or_else(|| mismatch(&value, "NaiveDateTime"), Ok),
            _ => mismatch(&value, "NaiveDateTime"),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: BindValue) -> Result<Self> {
        match &value {
            BindValue::Date(d) => Ok(*d),
            BindValue::DateTime(d) => Ok(d.date()),
            BindValue::String(s) => {
                NaiveDate::parse_from_str(s, "%Y-%m-%d").or_else(|_| mismatch(&value, "NaiveDate"))
            }
            _ => mismatch(&value, "NaiveDate"),
        }
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: BindValue) -> Result<Self> {
        match &value {
            BindValue::Time(t) => Ok(*t),
            BindValue::String(s) => NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
                .or_else(|_| mismatch(&value, "NaiveTime")),
            _ => mismatch(&value, "NaiveTime"),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: BindValue) -> Result<Self> {
        match value {
            BindValue::Json(v) => Ok(v),
            BindValue::String(s) => {
                serde_json::from_str(&s).map_err(|e| SqlGateError::Hydration(e.to_string()))
            }
            other => serde_json::to_value(&other).map_err(|e| SqlGateError::Hydration(e.to_string())),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: BindValue) -> Result<Self> {
        match value {
            BindValue::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// 一行结果：保持列顺序的 (列名, 值) 列表
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, BindValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
        }
    }

    /// 写入一列；同名列会被替换而不是重复追加
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<BindValue>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((column, value)),
        }
    }

    /// 链式写入
    pub fn with(mut self, column: impl Into<String>, value: impl Into<BindValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&BindValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// 读取并转换某一列
    pub fn get_as<T: FromValue>(&self, column: &str) -> Result<T> {
        let value = self
            .get(column)
            .cloned()
            .ok_or_else(|| SqlGateError::InvalidField(format!("column '{}' not found", column)))?;
        T::from_value(value)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn remove(&mut self, column: &str) -> Option<BindValue> {
        let pos = self.columns.iter().position(|(name, _)| name == column)?;
        Some(self.columns.remove(pos).1)
    }

    /// 第一列的值
    pub fn first_value(&self) -> Option<&BindValue> {
        self.columns.first().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &BindValue> {
        self.columns.iter().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BindValue)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl IntoIterator for Row {
    type Item = (String, BindValue);
    type IntoIter = std::vec::IntoIter<(String, BindValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

impl<K: Into<String>, V: Into<BindValue>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// 快速构造一行数据
///
/// ```ignore
/// let data = sqlgate::row! { "name" => "alice", "age" => 30 };
/// ```
#[macro_export]
macro_rules! row {
    () => {
        $crate::value::Row::new()
    };
    ($($column:expr => $value:expr),+ $(,)?) => {{
        let mut row = $crate::value::Row::new();
        $(row.insert($column, $value);)+
        row
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_insert_replaces_existing_column() {
        let mut row = Row::new();
        row.insert("name", "a");
        row.insert("age", 3);
        row.insert("name", "b");
        assert_eq!(row.len(), 2);
        assert_eq!(row.get("name"), Some(&BindValue::String("b".to_string())));
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["name", "age"]);
    }

    #[test]
    fn test_row_macro_and_get_as() {
        let row = crate::row! { "id" => 7i64, "active" => 1i64, "note" => Option::<String>::None };
        assert_eq!(row.get_as::<i64>("id").unwrap(), 7);
        assert!(row.get_as::<bool>("active").unwrap());
        assert_eq!(row.get_as::<Option<String>>("note").unwrap(), None);
        assert!(row.get_as::<i64>("missing").is_err());
    }

    #[test]
    fn test_row_serializes_as_object() {
        let row = crate::row! { "id" => 1i64, "name" => "x", "gone" => BindValue::Null };
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"id":1,"name":"x","gone":null}"#);
    }

    #[test]
    fn test_datetime_from_sqlite_text() {
        let value = BindValue::String("2024-05-01 10:20:30".to_string());
        let dt = NaiveDateTime::from_value(value).unwrap();
        assert_eq!(dt.to_string(), "2024-05-01 10:20:30");
    }

    #[test]
    fn test_option_into_bind_value() {
        assert_eq!(BindValue::from(Option::<i32>::None), BindValue::Null);
        assert_eq!(BindValue::from(Some(5i32)), BindValue::Int32(5));
    }
}
