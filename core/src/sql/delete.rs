use super::condition::{Conditions, Filter};
use super::fragment::{BuiltQuery, Fragment};
use super::update::push_where;
use super::{push_ident_list, push_output, push_quoted_order, Join, JoinType, Order};
use crate::dialect::{DeleteJoinStyle, Dialect, ReturningStyle};
use crate::error::{Result, SqlGateError};
use crate::executor::DbExecutor;
use crate::result::DeleteResult;

/// DELETE 构建器
///
/// 与 Update 一样，空的 IN 列表是错误。
#[derive(Debug, Clone)]
pub struct Delete {
    table: Option<String>,
    alias: Option<String>,
    joins: Vec<Join>,
    using: Vec<Join>,
    conditions: Conditions,
    order_by: Vec<(String, Order)>,
    limit: Option<u64>,
    returning: Vec<String>,
}

impl Default for Delete {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for Delete {
    fn conditions_mut(&mut self) -> &mut Conditions {
        &mut self.conditions
    }
}

impl Delete {
    pub fn new() -> Self {
        Self {
            table: None,
            alias: None,
            joins: Vec::new(),
            using: Vec::new(),
            conditions: Conditions::strict(),
            order_by: Vec::new(),
            limit: None,
            returning: Vec::new(),
        }
    }

    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn from_alias(mut self, table: impl Into<String>, alias: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self.alias = Some(alias.into());
        self
    }

    pub fn join(self, table: &str, alias: &str, on: &str) -> Self {
        self.push_join(JoinType::Inner, table, alias, on)
    }

    pub fn left_join(self, table: &str, alias: &str, on: &str) -> Self {
        self.push_join(JoinType::Left, table, alias, on)
    }

    pub fn right_join(self, table: &str, alias: &str, on: &str) -> Self {
        self.push_join(JoinType::Right, table, alias, on)
    }

    fn push_join(mut self, kind: JoinType, table: &str, alias: &str, on: &str) -> Self {
        let alias = (!alias.is_empty()).then_some(alias);
        self.joins.push(Join::new(kind, table, alias, Some(on)));
        self
    }

    /// PostgreSQL 的 `USING table`；条件为空字符串时不加连接谓词
    pub fn using(mut self, table: &str, alias: &str, on: &str) -> Self {
        let alias = (!alias.is_empty()).then_some(alias);
        let on = (!on.trim().is_empty()).then_some(on);
        self.using.push(Join::new(JoinType::Inner, table, alias, on));
        self
    }

    /// 只与 `limit` 一起使用
    pub fn order_by(mut self, column: &str, direction: Order) -> Self {
        self.order_by.push((column.to_string(), direction));
        self
    }

    /// 只在支持 DELETE ... LIMIT 的方言上可用
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn returning<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.returning = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn reset(self) -> Self {
        Self::new()
    }

    pub fn has_conditions(&self) -> bool {
        !self.conditions.is_empty()
    }

    fn has_joins(&self) -> bool {
        !self.joins.is_empty() || !self.using.is_empty()
    }

    fn push_target(&self, out: &mut Fragment, table: &str) {
        out.push_ident(table);
        if let Some(alias) = &self.alias {
            out.push_text(" AS ");
            out.push_ident(alias);
        }
    }

    pub fn build(&self, dialect: &Dialect) -> Result<BuiltQuery> {
        self.conditions.check()?;
        let table = self
            .table
            .as_deref()
            .ok_or_else(|| SqlGateError::builder("Delete requires a table"))?;
        if self.limit.is_some() && !dialect.supports_update_limit {
            return Err(SqlGateError::builder(format!(
                "{} does not support DELETE ... LIMIT",
                dialect.name
            )));
        }
        let output = !self.returning.is_empty() && dialect.returning == ReturningStyle::Output;
        let mut predicates: Vec<&str> = Vec::new();
        let mut out = Fragment::new();

        match dialect.delete_join {
            DeleteJoinStyle::Using => {
                out.push_text("DELETE FROM ");
                self.push_target(&mut out, table);
                for (i, join) in self.using.iter().chain(&self.joins).enumerate() {
                    out.push_text(if i == 0 { " USING " } else { ", " });
                    join.push_quoted_table(&mut out);
                    predicates.extend(join.on.as_deref());
                }
            }
            DeleteJoinStyle::Inline if self.alias.is_some() || self.has_joins() => {
                if self.limit.is_some() {
                    return Err(SqlGateError::builder(
                        "a multi-table DELETE cannot use ORDER BY / LIMIT",
                    ));
                }
                out.push_text("DELETE ");
                out.push_ident(self.alias.as_deref().unwrap_or(table));
                if output {
                    push_output(&mut out, "DELETED", &self.returning);
                }
                out.push_text(" FROM ");
                self.push_target(&mut out, table);
                for join in self.using.iter().chain(&self.joins) {
                    join.push_quoted(&mut out);
                }
            }
            DeleteJoinStyle::Unsupported if self.has_joins() => {
                return Err(SqlGateError::builder(format!(
                    "{} cannot DELETE with joins; use where_exists or where_in_query",
                    dialect.name
                )));
            }
            DeleteJoinStyle::Inline | DeleteJoinStyle::Unsupported => {
                out.push_text("DELETE FROM ");
                self.push_target(&mut out, table);
                if output {
                    push_output(&mut out, "DELETED", &self.returning);
                }
            }
        }

        push_where(&mut out, &predicates, &self.conditions);

        if let Some(limit) = self.limit {
            if !self.order_by.is_empty() {
                out.push_text(" ORDER BY ");
                push_quoted_order(&mut out, &self.order_by);
            }
            out.push_text(&format!(" LIMIT {}", limit));
        }
        if !self.returning.is_empty() && dialect.returning == ReturningStyle::Returning {
            out.push_text(" RETURNING ");
            push_ident_list(&mut out, &self.returning);
        }
        Ok(out.build(dialect))
    }

    pub async fn execute<E: DbExecutor + ?Sized>(&self, executor: &E) -> Result<DeleteResult> {
        let built = self.build(executor.dialect())?;
        let result = executor.query(&built.sql, &built.params).await?;
        Ok(DeleteResult::from_query(result))
    }

    /// 清空整张表，忽略已有的条件
    ///
    /// 不支持 TRUNCATE 的方言（SQLite）退化为 `DELETE FROM table`。
    pub async fn truncate<E: DbExecutor + ?Sized>(&self, executor: &E) -> Result<DeleteResult> {
        let table = self
            .table
            .as_deref()
            .ok_or_else(|| SqlGateError::builder("truncate() requires a table"))?;
        let dialect = executor.dialect();
        let sql = if dialect.supports_truncate {
            format!("TRUNCATE TABLE {}", dialect.quote_identifier(table))
        } else {
            format!("DELETE FROM {}", dialect.quote_identifier(table))
        };
        let result = executor.query(&sql, &[]).await?;
        Ok(DeleteResult {
            affected_rows: result.row_count,
            deleted_records: Vec::new(),
            success: true,
        })
    }
}
