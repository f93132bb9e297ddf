//! WHERE / HAVING 条件

use super::fragment::Fragment;
use super::select::Select;
use crate::error::{Result, SqlGateError};
use crate::value::BindValue;

/// 条件类型：AND 或 OR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionType {
    And,
    Or,
}

impl ConditionType {
    fn as_sql(&self) -> &'static str {
        match self {
            ConditionType::And => " AND ",
            ConditionType::Or => " OR ",
        }
    }
}

/// 比较操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// =
    Eq,
    /// <>
    Ne,
    /// >
    Gt,
    /// >=
    Ge,
    /// <
    Lt,
    /// <=
    Le,
    Like,
    NotLike,
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
        }
    }
}

/// 子查询：构建器或原始 SQL
#[derive(Debug, Clone)]
pub enum SubQuery {
    Select(Box<Select>),
    Raw { sql: String, params: Vec<BindValue> },
}

impl SubQuery {
    pub fn raw(sql: impl Into<String>, params: Vec<BindValue>) -> Self {
        SubQuery::Raw {
            sql: sql.into(),
            params,
        }
    }

    pub(crate) fn to_fragment(&self) -> Result<Fragment> {
        match self {
            SubQuery::Select(select) => select.to_fragment(true),
            SubQuery::Raw { sql, params } => Fragment::from_sql(sql, params),
        }
    }
}

impl From<Select> for SubQuery {
    fn from(select: Select) -> Self {
        SubQuery::Select(Box::new(select))
    }
}

/// 一组以 AND / OR 连接的条件
///
/// 使用错误（例如严格模式下的空 IN 列表）不会立即返回，而是记录下来，
/// 在 `build()` 时统一报告。
#[derive(Debug, Clone, Default)]
pub struct Conditions {
    items: Vec<(ConditionType, Fragment)>,
    strict_in: bool,
    error: Option<String>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// 空 IN 列表视为错误（UPDATE / DELETE 使用）
    pub(crate) fn strict() -> Self {
        Self {
            strict_in: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
        self.error = None;
    }

    pub(crate) fn check(&self) -> Result<()> {
        match &self.error {
            Some(message) => Err(SqlGateError::builder(message.clone())),
            None => Ok(()),
        }
    }

    fn fail(&mut self, message: String) {
        // 只保留第一个错误
        if self.error.is_none() {
            self.error = Some(message);
        }
    }

    pub(crate) fn push(&mut self, glue: ConditionType, body: Fragment) {
        if !body.is_empty() {
            self.items.push((glue, body));
        }
    }

    fn push_raw(&mut self, glue: ConditionType, sql: String) {
        if !sql.trim().is_empty() {
            self.push(glue, Fragment::text(sql));
        }
    }

    fn push_values(&mut self, glue: ConditionType, sql: &str, values: &[BindValue]) {
        match Fragment::from_sql(sql, values) {
            Ok(body) => self.push(glue, body),
            Err(e) => self.fail(e.to_string()),
        }
    }

    fn push_compare(&mut self, glue: ConditionType, column: &str, op: Operator, value: BindValue) {
        let mut body = Fragment::new();
        body.push_ident(column);
        body.push_text(" ");
        body.push_text(op.as_sql());
        body.push_text(" ");
        body.push_param(value);
        self.push(glue, body);
    }

    fn push_null(&mut self, glue: ConditionType, column: &str, negate: bool) {
        let mut body = Fragment::new();
        body.push_ident(column);
        body.push_text(if negate { " IS NOT NULL" } else { " IS NULL" });
        self.push(glue, body);
    }

    fn push_between(
        &mut self,
        glue: ConditionType,
        column: &str,
        low: BindValue,
        high: BindValue,
        negate: bool,
    ) {
        let mut body = Fragment::new();
        body.push_ident(column);
        body.push_text(if negate { " NOT BETWEEN " } else { " BETWEEN " });
        body.push_param(low);
        body.push_text(" AND ");
        body.push_param(high);
        self.push(glue, body);
    }

    fn push_in(&mut self, glue: ConditionType, column: &str, values: Vec<BindValue>, negate: bool) {
        if values.is_empty() {
            if self.strict_in {
                let method = if negate { "where_not_in" } else { "where_in" };
                self.fail(format!("{}({}) requires at least one value", method, column));
            } else if !negate {
                // 空 IN 列表匹配不到任何行；空 NOT IN 不加条件
                self.push(glue, Fragment::text("1 = 0"));
            }
            return;
        }
        let mut body = Fragment::new();
        body.push_ident(column);
        body.push_text(if negate { " NOT IN (" } else { " IN (" });
        body.push_param_list(values);
        body.push_text(")");
        self.push(glue, body);
    }

    fn push_subquery(&mut self, glue: ConditionType, prefix: Fragment, sub: SubQuery) {
        match sub.to_fragment() {
            Ok(inner) => {
                let mut body = prefix;
                body.push_text("(");
                body.append(inner);
                body.push_text(")");
                self.push(glue, body);
            }
            Err(e) => self.fail(e.to_string()),
        }
    }

    fn push_group(&mut self, glue: ConditionType, build: impl FnOnce(Conditions) -> Conditions) {
        let group = build(Conditions {
            strict_in: self.strict_in,
            ..Conditions::default()
        });
        if let Some(message) = group.error {
            self.fail(message);
            return;
        }
        if group.items.is_empty() {
            return;
        }
        let mut body = Fragment::text("(");
        body.append(group.to_fragment());
        body.push_text(")");
        self.push(glue, body);
    }

    pub(crate) fn to_fragment(&self) -> Fragment {
        let mut out = Fragment::new();
        for (i, (glue, body)) in self.items.iter().enumerate() {
            if i > 0 {
                out.push_text(glue.as_sql());
            }
            out.append(body.clone());
        }
        out
    }
}

/// 条件 API，由 Select / Update / Delete 以及条件分组共享
///
/// 列名会按方言加引号；`where_raw` 原样输出。`where_values` 等带参数的片段中，
/// `?` / `$n` 占位符相对于自己的参数编号，渲染时统一重新编号。
pub trait Filter: Sized {
    fn conditions_mut(&mut self) -> &mut Conditions;

    /// 原始条件，不带参数
    fn where_raw(mut self, sql: impl Into<String>) -> Self {
        self.conditions_mut().push_raw(ConditionType::And, sql.into());
        self
    }

    fn or_where_raw(mut self, sql: impl Into<String>) -> Self {
        self.conditions_mut().push_raw(ConditionType::Or, sql.into());
        self
    }

    /// 带一个参数的原始条件
    ///
    /// 传入 `BindValue::Null` 会绑定 NULL，而不是忽略参数。
    fn where_bind(self, sql: &str, value: impl Into<BindValue>) -> Self {
        self.where_values(sql, vec![value.into()])
    }

    fn or_where_bind(self, sql: &str, value: impl Into<BindValue>) -> Self {
        self.or_where_values(sql, vec![value.into()])
    }

    fn where_values(mut self, sql: &str, values: Vec<BindValue>) -> Self {
        self.conditions_mut()
            .push_values(ConditionType::And, sql, &values);
        self
    }

    fn or_where_values(mut self, sql: &str, values: Vec<BindValue>) -> Self {
        self.conditions_mut()
            .push_values(ConditionType::Or, sql, &values);
        self
    }

    fn where_op(mut self, column: &str, op: Operator, value: impl Into<BindValue>) -> Self {
        self.conditions_mut()
            .push_compare(ConditionType::And, column, op, value.into());
        self
    }

    fn or_where_op(mut self, column: &str, op: Operator, value: impl Into<BindValue>) -> Self {
        self.conditions_mut()
            .push_compare(ConditionType::Or, column, op, value.into());
        self
    }

    fn where_eq(self, column: &str, value: impl Into<BindValue>) -> Self {
        self.where_op(column, Operator::Eq, value)
    }

    fn or_where_eq(self, column: &str, value: impl Into<BindValue>) -> Self {
        self.or_where_op(column, Operator::Eq, value)
    }

    fn where_ne(self, column: &str, value: impl Into<BindValue>) -> Self {
        self.where_op(column, Operator::Ne, value)
    }

    fn where_gt(self, column: &str, value: impl Into<BindValue>) -> Self {
        self.where_op(column, Operator::Gt, value)
    }

    fn where_ge(self, column: &str, value: impl Into<BindValue>) -> Self {
        self.where_op(column, Operator::Ge, value)
    }

    fn where_lt(self, column: &str, value: impl Into<BindValue>) -> Self {
        self.where_op(column, Operator::Lt, value)
    }

    fn where_le(self, column: &str, value: impl Into<BindValue>) -> Self {
        self.where_op(column, Operator::Le, value)
    }

    fn where_like(self, column: &str, pattern: impl Into<BindValue>) -> Self {
        self.where_op(column, Operator::Like, pattern)
    }

    fn where_null(mut self, column: &str) -> Self {
        self.conditions_mut()
            .push_null(ConditionType::And, column, false);
        self
    }

    fn or_where_null(mut self, column: &str) -> Self {
        self.conditions_mut()
            .push_null(ConditionType::Or, column, false);
        self
    }

    fn where_not_null(mut self, column: &str) -> Self {
        self.conditions_mut()
            .push_null(ConditionType::And, column, true);
        self
    }

    fn where_between(
        mut self,
        column: &str,
        low: impl Into<BindValue>,
        high: impl Into<BindValue>,
    ) -> Self {
        self.conditions_mut().push_between(
            ConditionType::And,
            column,
            low.into(),
            high.into(),
            false,
        );
        self
    }

    fn where_not_between(
        mut self,
        column: &str,
        low: impl Into<BindValue>,
        high: impl Into<BindValue>,
    ) -> Self {
        self.conditions_mut().push_between(
            ConditionType::And,
            column,
            low.into(),
            high.into(),
            true,
        );
        self
    }

    fn where_in<V: Into<BindValue>>(
        mut self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.conditions_mut()
            .push_in(ConditionType::And, column, values, false);
        self
    }

    fn or_where_in<V: Into<BindValue>>(
        mut self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.conditions_mut()
            .push_in(ConditionType::Or, column, values, false);
        self
    }

    fn where_not_in<V: Into<BindValue>>(
        mut self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.conditions_mut()
            .push_in(ConditionType::And, column, values, true);
        self
    }

    /// `column IN (子查询)`
    fn where_in_query(mut self, column: &str, sub: impl Into<SubQuery>) -> Self {
        let mut prefix = Fragment::new();
        prefix.push_ident(column);
        prefix.push_text(" IN ");
        self.conditions_mut()
            .push_subquery(ConditionType::And, prefix, sub.into());
        self
    }

    fn where_exists(mut self, sub: impl Into<SubQuery>) -> Self {
        self.conditions_mut()
            .push_subquery(ConditionType::And, Fragment::text("EXISTS "), sub.into());
        self
    }

    fn where_not_exists(mut self, sub: impl Into<SubQuery>) -> Self {
        self.conditions_mut().push_subquery(
            ConditionType::And,
            Fragment::text("NOT EXISTS "),
            sub.into(),
        );
        self
    }

    /// 括号分组，空分组被忽略
    ///
    /// ```ignore
    /// select.where_eq("status", "active")
    ///     .where_group(|g| g.where_eq("role", "admin").or_where_op("score", Operator::Gt, 90));
    /// ```
    fn where_group(mut self, build: impl FnOnce(Conditions) -> Conditions) -> Self {
        self.conditions_mut().push_group(ConditionType::And, build);
        self
    }

    fn or_where_group(mut self, build: impl FnOnce(Conditions) -> Conditions) -> Self {
        self.conditions_mut().push_group(ConditionType::Or, build);
        self
    }
}

impl Filter for Conditions {
    fn conditions_mut(&mut self) -> &mut Conditions {
        self
    }
}
