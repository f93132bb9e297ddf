use super::condition::{Conditions, Filter};
use super::fragment::{BuiltQuery, Fragment};
use super::{push_ident_list, push_output, Join, JoinType};
use crate::dialect::{Dialect, ReturningStyle, UpdateJoinStyle};
use crate::error::{Result, SqlGateError};
use crate::executor::DbExecutor;
use crate::result::UpdateResult;
use crate::value::{BindValue, Row};

#[derive(Debug, Clone)]
enum SetValue {
    Bind(BindValue),
    /// 原样输出的表达式
    Raw(String),
    /// `col = col + n`
    Delta(i64),
}

/// UPDATE 构建器
///
/// 空的 IN 列表在这里是错误，避免误更新。
#[derive(Debug, Clone)]
pub struct Update {
    table: Option<String>,
    alias: Option<String>,
    sets: Vec<(String, SetValue)>,
    joins: Vec<Join>,
    conditions: Conditions,
    returning: Vec<String>,
    limit: Option<u64>,
    /// 链式调用中记录的第一个错误，在 build 时返回
    error: Option<String>,
}

impl Default for Update {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for Update {
    fn conditions_mut(&mut self) -> &mut Conditions {
        &mut self.conditions
    }
}

impl Update {
    pub fn new() -> Self {
        Self {
            table: None,
            alias: None,
            sets: Vec::new(),
            joins: Vec::new(),
            conditions: Conditions::strict(),
            returning: Vec::new(),
            limit: None,
            error: None,
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn table_alias(mut self, table: impl Into<String>, alias: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self.alias = Some(alias.into());
        self
    }

    pub fn set(self, column: &str, value: impl Into<BindValue>) -> Self {
        self.push_set(column, SetValue::Bind(value.into()))
    }

    pub fn set_row(self, row: Row) -> Self {
        row.into_iter()
            .fold(self, |update, (column, value)| update.set(&column, value))
    }

    /// 不绑定参数的表达式，如 `NOW()`
    pub fn set_raw(self, column: &str, expr: impl Into<String>) -> Self {
        self.push_set(column, SetValue::Raw(expr.into()))
    }

    pub fn increment(self, column: &str, amount: i64) -> Self {
        self.push_set(column, SetValue::Delta(amount))
    }

    pub fn decrement(mut self, column: &str, amount: i64) -> Self {
        match amount.checked_neg() {
            Some(delta) => self.push_set(column, SetValue::Delta(delta)),
            None => {
                self.error.get_or_insert_with(|| {
                    format!("decrement amount for column '{}' overflows", column)
                });
                self
            }
        }
    }

    fn push_set(mut self, column: &str, value: SetValue) -> Self {
        match self.sets.iter_mut().find(|(name, _)| name == column) {
            Some(slot) => slot.1 = value,
            None => self.sets.push((column.to_string(), value)),
        }
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

    pub fn returning<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.returning = columns.into_iter().map(Into::into).collect();
        self
    }

    /// 只在支持 UPDATE ... LIMIT 的方言上可用
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn has_conditions(&self) -> bool {
        !self.conditions.is_empty()
    }

    fn push_target(&self, out: &mut Fragment, table: &str) {
        out.push_ident(table);
        if let Some(alias) = &self.alias {
            out.push_text(" AS ");
            out.push_ident(alias);
        }
    }

    fn push_sets(&self, out: &mut Fragment) {
        for (i, (column, value)) in self.sets.iter().enumerate() {
            if i > 0 {
                out.push_text(", ");
            }
            out.push_ident(column);
            out.push_text(" = ");
            match value {
                SetValue::Bind(v) => out.push_param(v.clone()),
                SetValue::Raw(expr) => out.push_text(expr),
                SetValue::Delta(n) => {
                    out.push_ident(column);
                    if *n < 0 {
                        out.push_text(&format!(" - {}", n.unsigned_abs()));
                    } else {
                        out.push_text(&format!(" + {}", n));
                    }
                }
            }
        }
    }

    pub fn build(&self, dialect: &Dialect) -> Result<BuiltQuery> {
        if let Some(message) = &self.error {
            return Err(SqlGateError::builder(message.clone()));
        }
        self.conditions.check()?;
        let table = self
            .table
            .as_deref()
            .ok_or_else(|| SqlGateError::builder("Update requires a table"))?;
        if self.sets.is_empty() {
            return Err(SqlGateError::builder("Update requires at least one SET column"));
        }
        if self.limit.is_some() && !dialect.supports_update_limit {
            return Err(SqlGateError::builder(format!(
                "{} does not support UPDATE ... LIMIT",
                dialect.name
            )));
        }

        let output = !self.returning.is_empty() && dialect.returning == ReturningStyle::Output;
        // 由 JOIN 条件转成的 WHERE 谓词
        let mut join_predicates: Vec<&str> = Vec::new();
        let mut out = Fragment::text("UPDATE ");

        match dialect.update_join {
            UpdateJoinStyle::Inline => {
                self.push_target(&mut out, table);
                for join in &self.joins {
                    join.push_quoted(&mut out);
                }
                out.push_text(" SET ");
                self.push_sets(&mut out);
            }
            UpdateJoinStyle::FromClause => {
                self.push_target(&mut out, table);
                out.push_text(" SET ");
                self.push_sets(&mut out);
                if let Some((first, rest)) = self.joins.split_first() {
                    out.push_text(" FROM ");
                    first.push_quoted_table(&mut out);
                    join_predicates.extend(first.on.as_deref());
                    for join in rest {
                        join.push_quoted(&mut out);
                    }
                }
            }
            UpdateJoinStyle::TargetAlias => {
                if self.joins.is_empty() && self.alias.is_none() {
                    out.push_ident(table);
                    out.push_text(" SET ");
                    self.push_sets(&mut out);
                    if output {
                        push_output(&mut out, "INSERTED", &self.returning);
                    }
                } else {
                    out.push_ident(self.alias.as_deref().unwrap_or(table));
                    out.push_text(" SET ");
                    self.push_sets(&mut out);
                    if output {
                        push_output(&mut out, "INSERTED", &self.returning);
                    }
                    out.push_text(" FROM ");
                    self.push_target(&mut out, table);
                    for join in &self.joins {
                        join.push_quoted(&mut out);
                    }
                }
            }
        }

        push_where(&mut out, &join_predicates, &self.conditions);

        if !self.returning.is_empty() && dialect.returning == ReturningStyle::Returning {
            out.push_text(" RETURNING ");
            push_ident_list(&mut out, &self.returning);
        }
        if let Some(limit) = self.limit {
            out.push_text(&format!(" LIMIT {}", limit));
        }
        Ok(out.build(dialect))
    }

    pub async fn execute<E: DbExecutor + ?Sized>(&self, executor: &E) -> Result<UpdateResult> {
        let built = self.build(executor.dialect())?;
        let result = executor.query(&built.sql, &built.params).await?;
        Ok(UpdateResult::from_query(result))
    }
}

/// ` WHERE p1 AND p2 AND (conds)`；没有前置谓词时条件不加括号
pub(crate) fn push_where(out: &mut Fragment, predicates: &[&str], conditions: &Conditions) {
    if predicates.is_empty() && conditions.is_empty() {
        return;
    }
    out.push_text(" WHERE ");
    out.push_text(&predicates.join(" AND "));
    if conditions.is_empty() {
        return;
    }
    if predicates.is_empty() {
        out.append(conditions.to_fragment());
    } else {
        out.push_text(" AND (");
        out.append(conditions.to_fragment());
        out.push_text(")");
    }
}
