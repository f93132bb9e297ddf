use super::fragment::{BuiltQuery, Fragment};
use super::{push_ident_list, push_output};
use crate::dialect::{Dialect, ReturningStyle, UpsertStyle};
use crate::error::{Result, SqlGateError};
use crate::executor::DbExecutor;
use crate::result::InsertResult;
use crate::value::{BindValue, Row};

/// 冲突目标
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ConflictTarget {
    #[default]
    None,
    Columns(Vec<String>),
    Constraint(String),
}

/// 冲突处理方式
#[derive(Debug, Clone, PartialEq)]
pub enum OnConflict {
    Ignore { target: ConflictTarget },
    Update { target: ConflictTarget, set: Row },
}

impl OnConflict {
    pub fn ignore() -> Self {
        OnConflict::Ignore {
            target: ConflictTarget::None,
        }
    }

    pub fn update(set: Row) -> Self {
        OnConflict::Update {
            target: ConflictTarget::None,
            set,
        }
    }

    /// 指定冲突列（MySQL 忽略此项）
    pub fn on_columns<S: Into<String>>(self, columns: impl IntoIterator<Item = S>) -> Self {
        self.with_target(ConflictTarget::Columns(
            columns.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn on_constraint(self, name: impl Into<String>) -> Self {
        self.with_target(ConflictTarget::Constraint(name.into()))
    }

    fn with_target(self, target: ConflictTarget) -> Self {
        match self {
            OnConflict::Ignore { .. } => OnConflict::Ignore { target },
            OnConflict::Update { set, .. } => OnConflict::Update { target, set },
        }
    }
}

/// INSERT 构建器
///
/// 第一行决定列顺序，后续行按列名对齐。
#[derive(Debug, Clone, Default)]
pub struct Insert {
    table: Option<String>,
    columns: Vec<String>,
    rows: Vec<Vec<BindValue>>,
    on_conflict: Option<OnConflict>,
    returning: Vec<String>,
    key_column: Option<String>,
    error: Option<String>,
}

impl Insert {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// 追加一行
    pub fn values(mut self, row: Row) -> Self {
        if self.columns.is_empty() {
            self.columns = row.columns().map(str::to_string).collect();
        }
        match self.align(&row) {
            Ok(values) => self.rows.push(values),
            Err(message) => self.fail(message),
        }
        self
    }

    /// 按 `columns` 的顺序追加一组值
    pub fn values_list(mut self, values: Vec<BindValue>) -> Self {
        self.rows.push(values);
        self
    }

    pub fn batch_values(self, rows: impl IntoIterator<Item = Row>) -> Self {
        rows.into_iter().fold(self, Insert::values)
    }

    /// 以一行数据替换列和值
    pub fn set(mut self, row: Row) -> Self {
        self.columns = row.columns().map(str::to_string).collect();
        self.rows = vec![row.values().cloned().collect()];
        self
    }

    pub fn on_conflict(mut self, action: OnConflict) -> Self {
        self.on_conflict = Some(action);
        self
    }

    /// 需要返回的列（PostgreSQL RETURNING / SQL Server OUTPUT）
    pub fn returning<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.returning = columns.into_iter().map(Into::into).collect();
        self
    }

    /// 从返回行中读取 `inserted_id` 时使用的列
    pub fn key_column(mut self, column: impl Into<String>) -> Self {
        self.key_column = Some(column.into());
        self
    }

    fn align(&self, row: &Row) -> std::result::Result<Vec<BindValue>, String> {
        if row.len() != self.columns.len() {
            return Err(format!(
                "row has {} values but the insert has {} columns",
                row.len(),
                self.columns.len()
            ));
        }
        self.columns
            .iter()
            .map(|column| {
                row.get(column)
                    .cloned()
                    .ok_or_else(|| format!("row is missing column {}", column))
            })
            .collect()
    }

    fn fail(&mut self, message: String) {
        if self.error.is_none() {
            self.error = Some(message);
        }
    }

    pub fn build(&self, dialect: &Dialect) -> Result<BuiltQuery> {
        if let Some(message) = &self.error {
            return Err(SqlGateError::builder(message.clone()));
        }
        let table = self
            .table
            .as_deref()
            .ok_or_else(|| SqlGateError::builder("Insert requires a table"))?;
        if self.columns.is_empty() {
            return Err(SqlGateError::builder("Insert requires at least one column"));
        }
        if self.rows.is_empty() {
            return Err(SqlGateError::builder("Insert requires at least one row of values"));
        }
        if let Some(row) = self.rows.iter().find(|r| r.len() != self.columns.len()) {
            return Err(SqlGateError::builder(format!(
                "value tuple has {} values but the insert has {} columns",
                row.len(),
                self.columns.len()
            )));
        }

        let mut out = Fragment::new();
        match (dialect.upsert, &self.on_conflict) {
            (UpsertStyle::OnDuplicateKey, Some(OnConflict::Ignore { .. })) => {
                out.push_text("INSERT IGNORE INTO ")
            }
            (UpsertStyle::Unsupported, Some(_)) => {
                return Err(SqlGateError::builder(format!(
                    "{} has no upsert form; on_conflict is not supported",
                    dialect.name
                )))
            }
            _ => out.push_text("INSERT INTO "),
        }
        out.push_ident(table);
        out.push_text(" (");
        push_ident_list(&mut out, &self.columns);
        out.push_text(")");

        if !self.returning.is_empty() && dialect.returning == ReturningStyle::Output {
            push_output(&mut out, "INSERTED", &self.returning);
        }

        out.push_text(" VALUES ");
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                out.push_text(", ");
            }
            out.push_text("(");
            out.push_param_list(row.iter().cloned());
            out.push_text(")");
        }

        match (dialect.upsert, &self.on_conflict) {
            (UpsertStyle::OnConflict, Some(action)) => {
                let target = match action {
                    OnConflict::Ignore { target } | OnConflict::Update { target, .. } => target,
                };
                out.push_text(" ON CONFLICT");
                match target {
                    ConflictTarget::None => {}
                    ConflictTarget::Columns(columns) => {
                        out.push_text(" (");
                        push_ident_list(&mut out, columns);
                        out.push_text(")");
                    }
                    ConflictTarget::Constraint(name) => {
                        out.push_text(" ON CONSTRAINT ");
                        out.push_ident(name);
                    }
                }
                match action {
                    OnConflict::Ignore { .. } => out.push_text(" DO NOTHING"),
                    OnConflict::Update { target, set } => {
                        if *target == ConflictTarget::None {
                            return Err(SqlGateError::builder(
                                "ON CONFLICT DO UPDATE requires conflict columns or a constraint",
                            ));
                        }
                        out.push_text(" DO UPDATE SET ");
                        push_assignments(&mut out, set)?;
                    }
                }
            }
            (UpsertStyle::OnDuplicateKey, Some(OnConflict::Update { set, .. })) => {
                out.push_text(" ON DUPLICATE KEY UPDATE ");
                push_assignments(&mut out, set)?;
            }
            _ => {}
        }

        if !self.returning.is_empty() && dialect.returning == ReturningStyle::Returning {
            out.push_text(" RETURNING ");
            push_ident_list(&mut out, &self.returning);
        }

        Ok(out.build(dialect))
    }

    pub async fn execute<E: DbExecutor + ?Sized>(&self, executor: &E) -> Result<InsertResult> {
        let built = self.build(executor.dialect())?;
        let result = executor.query(&built.sql, &built.params).await?;
        Ok(InsertResult::from_query(result, self.key_column.as_deref()))
    }
}

/// `"a" = p, "b" = p`
fn push_assignments(out: &mut Fragment, set: &Row) -> Result<()> {
    if set.is_empty() {
        return Err(SqlGateError::builder("conflict update requires at least one column"));
    }
    for (i, (column, value)) in set.iter().enumerate() {
        if i > 0 {
            out.push_text(", ");
        }
        out.push_ident(column);
        out.push_text(" = ");
        out.push_param(value.clone());
    }
    Ok(())
}
