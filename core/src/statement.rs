//! 预处理语句
//!
//! 参数可以按位置（`?` / `$n`）或按名字（`:name`）绑定。结果在 `execute` 时一次性取回，
//! 之后通过游标逐行读取。

use crate::dialect::Dialect;
use crate::error::{Result, SqlGateError};
use crate::executor::DbExecutor;
use crate::result::QueryResult;
use crate::value::{BindValue, Row};

/// 行的返回形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// 列名到值的映射
    #[default]
    Object,
    /// 只保留值，按列顺序
    Array,
    /// 只取第一列
    Column,
}

/// 按 `FetchMode` 格式化后的一行
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Object(Row),
    Array(Vec<BindValue>),
    Column(BindValue),
}

impl Fetched {
    fn format(row: Row, mode: FetchMode) -> Self {
        match mode {
            FetchMode::Object => Fetched::Object(row),
            FetchMode::Array => Fetched::Array(row.into_iter().map(|(_, v)| v).collect()),
            FetchMode::Column => Fetched::Column(
                row.into_iter()
                    .next()
                    .map(|(_, v)| v)
                    .unwrap_or(BindValue::Null),
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Statement {
    sql: String,
    positional: Vec<Option<BindValue>>,
    named: Vec<(String, BindValue)>,
    fetch_mode: FetchMode,
    key_column: Option<String>,
    result: Option<QueryResult>,
    cursor: usize,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            positional: Vec::new(),
            named: Vec::new(),
            fetch_mode: FetchMode::default(),
            key_column: None,
            result: None,
            cursor: 0,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// 绑定第 `index` 个参数（从 0 开始）
    pub fn bind(&mut self, index: usize, value: impl Into<BindValue>) -> &mut Self {
        if self.positional.len() <= index {
            self.positional.resize(index + 1, None);
        }
        self.positional[index] = Some(value.into());
        self
    }

    /// 绑定 `:name` 参数，名字可以带或不带冒号
    pub fn bind_named(&mut self, name: &str, value: impl Into<BindValue>) -> &mut Self {
        let name = name.trim_start_matches(':').to_string();
        let value = value.into();
        match self.named.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.named.push((name, value)),
        }
        self
    }

    pub fn fetch_mode(&mut self, mode: FetchMode) -> &mut Self {
        self.fetch_mode = mode;
        self
    }

    /// 从返回行中读取 `last_insert_id` 的列
    pub fn key_column(&mut self, column: impl Into<String>) -> &mut Self {
        self.key_column = Some(column.into());
        self
    }

    /// 渲染为方言可执行的 SQL 与参数
    pub fn prepared(&self, dialect: &Dialect) -> Result<(String, Vec<BindValue>)> {
        if !self.named.is_empty() {
            if !self.positional.is_empty() {
                return Err(SqlGateError::builder(
                    "a statement cannot mix positional and named parameters",
                ));
            }
            return rewrite_named(&self.sql, &self.named, dialect);
        }

        let params = self
            .positional
            .iter()
            .enumerate()
            .map(|(i, value)| {
                value
                    .clone()
                    .ok_or_else(|| SqlGateError::builder(format!("parameter {} is not bound", i)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((self.sql.clone(), params))
    }

    /// 执行并缓存结果，返回行数（写语句为影响行数）
    pub async fn execute<E: DbExecutor + ?Sized>(&mut self, executor: &E) -> Result<u64> {
        let (sql, params) = self.prepared(executor.dialect())?;
        let result = executor.query(&sql, &params).await?;
        let count = result.row_count;
        self.result = Some(result);
        self.cursor = 0;
        Ok(count)
    }

    fn rows(&self) -> &[Row] {
        self.result.as_ref().map(|r| r.rows.as_slice()).unwrap_or(&[])
    }

    fn next_row(&mut self) -> Option<Row> {
        let row = self.rows().get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(row)
    }

    /// 下一行；没有更多行时返回 `None`
    pub fn fetch(&mut self) -> Option<Fetched> {
        let mode = self.fetch_mode;
        self.next_row().map(|row| Fetched::format(row, mode))
    }

    /// 剩余的所有行
    pub fn fetch_all(&mut self) -> Vec<Fetched> {
        let mode = self.fetch_mode;
        let rest = self.rows().get(self.cursor..).unwrap_or(&[]).to_vec();
        self.cursor += rest.len();
        rest.into_iter().map(|row| Fetched::format(row, mode)).collect()
    }

    /// 下一行的第 `index` 列
    pub fn fetch_column(&mut self, index: usize) -> Option<BindValue> {
        self.next_row()
            .and_then(|row| row.into_iter().nth(index).map(|(_, v)| v))
    }

    /// 剩余行中的第一行，并消费其余行
    pub fn fetch_row(&mut self) -> Option<Fetched> {
        self.fetch_all().into_iter().next()
    }

    pub fn row_count(&self) -> u64 {
        self.result.as_ref().map(|r| r.row_count).unwrap_or(0)
    }

    pub fn last_insert_id(&self) -> Option<BindValue> {
        let result = self.result.as_ref()?;
        if let Some(id) = &result.inserted_id {
            return Some(id.clone());
        }
        let key = self.key_column.as_deref()?;
        result.rows.first()?.get(key).cloned()
    }

    /// 释放缓存的结果，绑定的参数保留
    pub fn close(&mut self) {
        self.result = None;
        self.cursor = 0;
    }
}

/// 把 `:name` 改写为方言占位符，按出现顺序排列参数
///
/// 引号内的内容和 PostgreSQL 的 `::type` 转换不受影响。
fn rewrite_named(
    sql: &str,
    named: &[(String, BindValue)],
    dialect: &Dialect,
) -> Result<(String, Vec<BindValue>)> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut params = Vec::new();
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                out.push(c);
                i += 1;
            }
            ':' if i + 1 < chars.len()
                && (chars[i + 1].is_ascii_alphabetic() || chars[i + 1] == '_')
                && (i == 0 || chars[i - 1] != ':') =>
            {
                let name: String = chars[i + 1..]
                    .iter()
                    .take_while(|c| c.is_ascii_alphanumeric() || **c == '_')
                    .collect();
                let value = named
                    .iter()
                    .find(|(n, _)| *n == name)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| {
                        SqlGateError::builder(format!("named parameter :{} is not bound", name))
                    })?;
                out.push_str(&dialect.placeholder(params.len()));
                params.push(value);
                i += 1 + name.chars().count();
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    Ok((out, params))
}
