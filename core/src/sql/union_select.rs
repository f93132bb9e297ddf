use super::condition::SubQuery;
use super::fragment::BuiltQuery;
use super::select::Select;
use super::Order;
use crate::dialect::Dialect;
use crate::error::{Result, SqlGateError};
use crate::executor::DbExecutor;
use crate::result::QueryResult;
use crate::value::Row;

/// UNION 的一个分支
pub type UnionPart = SubQuery;

/// 以第一个 Select 为基础、依次追加分支的 UNION 查询
///
/// 第一个分支必须是 `Select`，排序和分页作用在整个 UNION 结果上。
#[derive(Debug, Clone, Default)]
pub struct UnionSelect {
    all_default: bool,
    base: Option<Select>,
}

impl UnionSelect {
    /// `all_default` 为 true 时，`add(part, None)` 使用 UNION ALL
    pub fn new(all_default: bool) -> Self {
        Self {
            all_default,
            base: None,
        }
    }

    pub fn add(mut self, part: impl Into<UnionPart>, all: Option<bool>) -> Result<Self> {
        let all = all.unwrap_or(self.all_default);
        self.base = Some(match (self.base.take(), part.into()) {
            (None, SubQuery::Select(select)) => *select,
            (None, SubQuery::Raw { .. }) => {
                return Err(SqlGateError::builder(
                    "a union must start with a Select, not raw SQL",
                ))
            }
            (Some(base), part) => base.push_union(part, all),
        });
        Ok(self)
    }

    pub fn union(self, part: impl Into<UnionPart>) -> Result<Self> {
        self.add(part, Some(false))
    }

    pub fn union_all(self, part: impl Into<UnionPart>) -> Result<Self> {
        self.add(part, Some(true))
    }

    pub fn order(self, expr: impl Into<String>) -> Result<Self> {
        self.map_base(|base| base.order(expr))
    }

    pub fn order_by(self, column: &str, direction: Order) -> Result<Self> {
        self.map_base(|base| base.order_by(column, direction))
    }

    pub fn limit(self, limit: u64) -> Result<Self> {
        self.map_base(|base| base.limit(limit))
    }

    pub fn offset(self, offset: u64) -> Result<Self> {
        self.map_base(|base| base.offset(offset))
    }

    fn map_base(mut self, f: impl FnOnce(Select) -> Select) -> Result<Self> {
        let base = self.base.take().ok_or_else(empty_union)?;
        self.base = Some(f(base));
        Ok(self)
    }

    pub fn base_select(&self) -> Result<&Select> {
        self.base.as_ref().ok_or_else(empty_union)
    }

    pub fn build(&self, dialect: &Dialect) -> Result<BuiltQuery> {
        self.base_select()?.build(dialect)
    }

    pub async fn execute<E: DbExecutor + ?Sized>(&self, executor: &E) -> Result<Vec<Row>> {
        self.base_select()?.execute(executor).await
    }

    pub async fn execute_raw<E: DbExecutor + ?Sized>(&self, executor: &E) -> Result<QueryResult> {
        self.base_select()?.execute_raw(executor).await
    }
}

fn empty_union() -> SqlGateError {
    SqlGateError::builder("union has no Select yet; add one first")
}
