//! 结果集
//!
//! `ResultSet` 持有原始行，可选地按原型逐行转成对象；`HydratingResultSet`
//! 通过 `Hydrator` 转换并缓存结果。

mod hydrating;

pub use hydrating::HydratingResultSet;

use crate::error::Result;
use crate::hydrator::{HydrationTarget, Prototype};
use crate::value::Row;

/// 原始行的容器
///
/// 没有原型时，每行被复制到 `T::default()` 中；对 `ResultSet<Row>` 来说就是原样返回。
/// 列名不做任何转换，需要 setter 或命名转换时使用 [`HydratingResultSet`]。
pub struct ResultSet<T = Row> {
    rows: Vec<Row>,
    prototype: Option<Prototype<T>>,
}

impl<T> Default for ResultSet<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            prototype: None,
        }
    }
}

impl<T> std::fmt::Debug for ResultSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("rows", &self.rows.len())
            .field("prototype", &self.prototype.is_some())
            .finish()
    }
}

impl<T: HydrationTarget + Default> ResultSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prototype(prototype: Prototype<T>) -> Self {
        Self {
            rows: Vec::new(),
            prototype: Some(prototype),
        }
    }

    pub fn set_prototype(&mut self, prototype: Prototype<T>) -> &mut Self {
        self.prototype = Some(prototype);
        self
    }

    pub fn initialize(&mut self, rows: Vec<Row>) -> &mut Self {
        self.rows = rows;
        self
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    fn convert(&self, row: &Row) -> Result<T> {
        let mut target = match &self.prototype {
            Some(prototype) => prototype(),
            None => T::default(),
        };
        for (column, value) in row.iter() {
            target.assign(column, value)?;
        }
        Ok(target)
    }

    pub fn to_array(&self) -> Result<Vec<T>> {
        self.iter().collect()
    }

    /// 第一行
    pub fn current(&self) -> Result<Option<T>> {
        self.rows.first().map(|row| self.convert(row)).transpose()
    }

    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<T>> + '_ {
        self.rows.iter().map(move |row| self.convert(row))
    }
}
