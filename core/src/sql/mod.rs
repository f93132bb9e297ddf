//! SQL 构建器
//!
//! 构建器在调用 `build(dialect)` 之前与方言无关；占位符只在渲染时按出现顺序生成，
//! 因此参数个数总是等于占位符个数。

mod condition;
mod delete;
mod fragment;
mod insert;
mod select;
mod union_select;
mod update;

pub use condition::{ConditionType, Conditions, Filter, Operator, SubQuery};
pub use delete::Delete;
pub use fragment::BuiltQuery;
pub use insert::{ConflictTarget, Insert, OnConflict};
pub use select::{Select, SelectPart};
pub use union_select::{UnionPart, UnionSelect};
pub use update::Update;

pub(crate) use fragment::Fragment;

/// 排序方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
}

impl JoinType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
        }
    }
}

/// 一个 JOIN（或 USING）表
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Join {
    pub kind: JoinType,
    pub table: String,
    pub alias: Option<String>,
    /// 连接条件，原样输出
    pub on: Option<String>,
}

impl Join {
    pub(crate) fn new(kind: JoinType, table: &str, alias: Option<&str>, on: Option<&str>) -> Self {
        Self {
            kind,
            table: table.to_string(),
            alias: alias.map(str::to_string),
            on: on.map(str::to_string),
        }
    }

    /// `table [AS alias]`，表名和别名都加引号
    pub(crate) fn push_quoted_table(&self, out: &mut Fragment) {
        out.push_ident(&self.table);
        if let Some(alias) = &self.alias {
            out.push_text(" AS ");
            out.push_ident(alias);
        }
    }

    /// ` KIND JOIN table [AS alias] ON cond`，没有条件时写成 CROSS JOIN
    pub(crate) fn push_quoted(&self, out: &mut Fragment) {
        match &self.on {
            Some(on) => {
                out.push_text(" ");
                out.push_text(self.kind.as_sql());
                out.push_text(" ");
                self.push_quoted_table(out);
                out.push_text(" ON ");
                out.push_text(on);
            }
            None => {
                out.push_text(" CROSS JOIN ");
                self.push_quoted_table(out);
            }
        }
    }
}

/// `"col" ASC, "other" DESC`
pub(crate) fn push_quoted_order(out: &mut Fragment, order: &[(String, Order)]) {
    for (i, (column, direction)) in order.iter().enumerate() {
        if i > 0 {
            out.push_text(", ");
        }
        out.push_ident(column);
        out.push_text(" ");
        out.push_text(direction.as_sql());
    }
}

/// 用逗号连接多个加引号的标识符
pub(crate) fn push_ident_list(out: &mut Fragment, names: &[String]) {
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            out.push_text(", ");
        }
        out.push_ident(name);
    }
}

/// SQL Server 的 `OUTPUT INSERTED.col` / `OUTPUT DELETED.col`
pub(crate) fn push_output(out: &mut Fragment, source: &str, columns: &[String]) {
    out.push_text(" OUTPUT ");
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            out.push_text(", ");
        }
        out.push_text(source);
        out.push_text(".");
        out.push_ident(column);
    }
}
