use super::condition::{Conditions, Filter, SubQuery};
use super::fragment::{BuiltQuery, Fragment};
use super::{Join, JoinType, Order};
use crate::dialect::Dialect;
use crate::error::{Result, SqlGateError};
use crate::executor::DbExecutor;
use crate::result::QueryResult;
use crate::value::{BindValue, Row};

/// 可以单独清空的部分，见 [`Select::reset_part`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectPart {
    Columns,
    From,
    Joins,
    Where,
    Group,
    Having,
    Order,
    Limit,
    Offset,
    Unions,
}

/// SELECT 构建器
///
/// FROM、列、JOIN、GROUP BY、ORDER BY 等文本原样输出，由调用方负责书写；
/// 只有 `where_eq` 这类按列名生成的条件会给列名加引号。
///
/// ```ignore
/// let built = Select::new()
///     .from("users")
///     .where_bind("status = ?", "active")
///     .limit(10)
///     .build(&POSTGRES)?;
/// assert_eq!(built.sql, "SELECT * FROM users WHERE status = $1 LIMIT 10");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Select {
    columns: Vec<String>,
    from: Option<String>,
    joins: Vec<Join>,
    conditions: Conditions,
    group_by: Vec<String>,
    having: Conditions,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    unions: Vec<(bool, SubQuery)>,
}

impl Filter for Select {
    fn conditions_mut(&mut self) -> &mut Conditions {
        &mut self.conditions
    }
}

impl Select {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.from = Some(table.into());
        self
    }

    /// `FROM table AS alias`
    pub fn from_alias(mut self, table: &str, alias: &str) -> Self {
        self.from = Some(format!("{} AS {}", table, alias));
        self
    }

    /// 设置 FROM 并替换列列表
    pub fn from_columns<S: Into<String>>(
        mut self,
        table: impl Into<String>,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        self.columns.clear();
        self.from(table).columns(columns)
    }

    /// 追加列；重复的列被忽略，出现 `*` 后只保留 `*`
    pub fn columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        for column in columns {
            self.add_column(column.into());
        }
        self
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.add_column(column.into());
        self
    }

    /// `expr AS alias`
    pub fn column_as(mut self, expr: &str, alias: &str) -> Self {
        self.add_column(format!("{} AS {}", expr, alias));
        self
    }

    fn add_column(&mut self, column: String) {
        let column = column.trim().to_string();
        if column.is_empty() || self.columns.iter().any(|c| c == "*") {
            return;
        }
        if column == "*" {
            self.columns = vec![column];
        } else if !self.columns.contains(&column) {
            self.columns.push(column);
        }
    }

    pub fn join(self, table: &str, on: &str) -> Self {
        self.push_join(JoinType::Inner, table, None, on, Vec::<String>::new())
    }

    pub fn left_join(self, table: &str, on: &str) -> Self {
        self.push_join(JoinType::Left, table, None, on, Vec::<String>::new())
    }

    pub fn right_join(self, table: &str, on: &str) -> Self {
        self.push_join(JoinType::Right, table, None, on, Vec::<String>::new())
    }

    /// 带别名的 JOIN，同时追加投影列
    pub fn join_as<S: Into<String>>(
        self,
        table: &str,
        alias: &str,
        on: &str,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        self.push_join(JoinType::Inner, table, Some(alias), on, columns)
    }

    pub fn left_join_as<S: Into<String>>(
        self,
        table: &str,
        alias: &str,
        on: &str,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        self.push_join(JoinType::Left, table, Some(alias), on, columns)
    }

    pub fn right_join_as<S: Into<String>>(
        self,
        table: &str,
        alias: &str,
        on: &str,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        self.push_join(JoinType::Right, table, Some(alias), on, columns)
    }

    fn push_join<S: Into<String>>(
        mut self,
        kind: JoinType,
        table: &str,
        alias: Option<&str>,
        on: &str,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        self.joins.push(Join::new(kind, table, alias, Some(on)));
        self.columns(columns)
    }

    pub fn group(mut self, expr: impl Into<String>) -> Self {
        self.group_by.push(expr.into());
        self
    }

    pub fn having_raw(mut self, sql: impl Into<String>) -> Self {
        self.having = std::mem::take(&mut self.having).where_raw(sql);
        self
    }

    pub fn having_bind(mut self, sql: &str, value: impl Into<BindValue>) -> Self {
        self.having = std::mem::take(&mut self.having).where_bind(sql, value);
        self
    }

    pub fn having_values(mut self, sql: &str, values: Vec<BindValue>) -> Self {
        self.having = std::mem::take(&mut self.having).where_values(sql, values);
        self
    }

    /// 原样追加排序表达式，如 `"created_at DESC"`
    pub fn order(mut self, expr: impl Into<String>) -> Self {
        self.order_by.push(expr.into());
        self
    }

    pub fn order_desc(mut self, column: &str) -> Self {
        self.order_by.push(format!("{} DESC", column));
        self
    }

    pub fn order_by(mut self, column: &str, direction: Order) -> Self {
        self.order_by.push(format!("{} {}", column, direction.as_sql()));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// `(this) UNION (other)`；`other` 的 ORDER BY / LIMIT / OFFSET 被忽略
    pub fn union(mut self, other: Select) -> Self {
        self.unions.push((false, other.into()));
        self
    }

    pub fn union_all(mut self, other: Select) -> Self {
        self.unions.push((true, other.into()));
        self
    }

    /// 以原始 SQL 作为 UNION 分支，其中的 `?` / `$n` 相对于 `params` 编号
    pub fn union_raw(mut self, sql: impl Into<String>, params: Vec<BindValue>) -> Self {
        self.unions.push((false, SubQuery::raw(sql, params)));
        self
    }

    pub fn union_all_raw(mut self, sql: impl Into<String>, params: Vec<BindValue>) -> Self {
        self.unions.push((true, SubQuery::raw(sql, params)));
        self
    }

    pub(crate) fn push_union(mut self, part: SubQuery, all: bool) -> Self {
        self.unions.push((all, part));
        self
    }

    pub fn reset(self) -> Self {
        Self::new()
    }

    pub fn reset_part(mut self, part: SelectPart) -> Self {
        match part {
            SelectPart::Columns => self.columns.clear(),
            SelectPart::From => self.from = None,
            SelectPart::Joins => self.joins.clear(),
            SelectPart::Where => self.conditions.clear(),
            SelectPart::Group => self.group_by.clear(),
            SelectPart::Having => self.having.clear(),
            SelectPart::Order => self.order_by.clear(),
            SelectPart::Limit => self.limit = None,
            SelectPart::Offset => self.offset = None,
            SelectPart::Unions => self.unions.clear(),
        }
        self
    }

    pub fn has_unions(&self) -> bool {
        !self.unions.is_empty()
    }

    /// 渲染；`include_tail` 为 false 时省略 ORDER BY / LIMIT / OFFSET（作为 UNION 分支时）
    pub(crate) fn to_fragment(&self, include_tail: bool) -> Result<Fragment> {
        self.conditions.check()?;
        self.having.check()?;
        let from = self
            .from
            .as_deref()
            .ok_or_else(|| SqlGateError::builder("Select requires a FROM clause"))?;

        let mut body = Fragment::text("SELECT ");
        if self.columns.is_empty() {
            body.push_text("*");
        } else {
            body.push_text(&self.columns.join(", "));
        }
        body.push_text(" FROM ");
        body.push_text(from);

        for join in &self.joins {
            body.push_text(" ");
            body.push_text(join.kind.as_sql());
            body.push_text(" ");
            body.push_text(&join.table);
            if let Some(alias) = &join.alias {
                body.push_text(" AS ");
                body.push_text(alias);
            }
            if let Some(on) = &join.on {
                body.push_text(" ON ");
                body.push_text(on);
            }
        }

        if !self.conditions.is_empty() {
            body.push_text(" WHERE ");
            body.append(self.conditions.to_fragment());
        }
        if !self.group_by.is_empty() {
            body.push_text(" GROUP BY ");
            body.push_text(&self.group_by.join(", "));
        }
        if !self.having.is_empty() {
            body.push_text(" HAVING ");
            body.append(self.having.to_fragment());
        }

        if !self.unions.is_empty() {
            let mut composed = Fragment::new();
            composed.push_compound_paren(true);
            composed.append(body);
            composed.push_compound_paren(false);
            for (all, part) in &self.unions {
                composed.push_text(if *all { " UNION ALL " } else { " UNION " });
                composed.push_compound_paren(true);
                composed.append(union_branch(part)?);
                composed.push_compound_paren(false);
            }
            body = composed;
        }

        if include_tail {
            if !self.order_by.is_empty() {
                body.push_text(" ORDER BY ");
                body.push_text(&self.order_by.join(", "));
            }
            body.push_limit(!self.order_by.is_empty(), self.limit, self.offset);
        }
        Ok(body)
    }

    pub fn build(&self, dialect: &Dialect) -> Result<BuiltQuery> {
        Ok(self.to_fragment(true)?.build(dialect))
    }

    /// 执行并返回结果行
    pub async fn execute<E: DbExecutor + ?Sized>(&self, executor: &E) -> Result<Vec<Row>> {
        Ok(self.execute_raw(executor).await?.rows)
    }

    pub async fn execute_raw<E: DbExecutor + ?Sized>(&self, executor: &E) -> Result<QueryResult> {
        let built = self.build(executor.dialect())?;
        executor.query(&built.sql, &built.params).await
    }
}

/// UNION 分支不带自己的 ORDER BY / LIMIT / OFFSET
fn union_branch(part: &SubQuery) -> Result<Fragment> {
    match part {
        SubQuery::Select(select) => select.to_fragment(false),
        raw => raw.to_fragment(),
    }
}
