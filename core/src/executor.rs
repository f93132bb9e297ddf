use crate::dialect::Dialect;
use crate::error::{Result, SqlGateError};
use crate::result::QueryResult;
use crate::value::{BindValue, Row};
use async_trait::async_trait;

/// 数据库执行器 trait，统一适配器和事务的接口
///
/// 构建器、预处理语句和网关都只依赖这个 trait，因此既可以直接在连接池上执行，
/// 也可以在事务中执行。
///
/// 注意：此 trait 要求 `Send + Sync`，因为异步方法需要在不同线程之间传递 Future
#[async_trait]
pub trait DbExecutor: Send + Sync {
    /// 方言描述
    fn dialect(&self) -> &'static Dialect;

    /// 执行一条 SQL
    ///
    /// 读语句返回行，写语句返回影响行数与插入 id。
    async fn query(&self, sql: &str, params: &[BindValue]) -> Result<QueryResult>;

    /// 第 `index` 个占位符（从 0 开始）
    fn placeholder(&self, index: usize) -> String {
        self.dialect().placeholder(index)
    }

    fn quote_identifier(&self, name: &str) -> String {
        self.dialect().quote_identifier(name)
    }

    /// 把值转义为 SQL 字面量
    fn escape(&self, value: &BindValue) -> String {
        self.dialect().escape(value)
    }

    async fn fetch_all(&self, sql: &str, params: &[BindValue]) -> Result<Vec<Row>> {
        Ok(self.query(sql, params).await?.rows)
    }

    async fn fetch_row(&self, sql: &str, params: &[BindValue]) -> Result<Option<Row>> {
        Ok(self.query(sql, params).await?.rows.into_iter().next())
    }

    /// 第一行第一列
    async fn fetch_one(&self, sql: &str, params: &[BindValue]) -> Result<BindValue> {
        let row = self
            .fetch_row(sql, params)
            .await?
            .ok_or_else(|| SqlGateError::Other(format!("query returned no rows: {}", sql)))?;
        row.first_value()
            .cloned()
            .ok_or_else(|| SqlGateError::Other(format!("query returned no columns: {}", sql)))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingExecutor;
    use super::*;
    use crate::dialect::{MSSQL, POSTGRES};

    #[tokio::test]
    async fn test_fetch_one_returns_first_column() {
        let exec = RecordingExecutor::new(&POSTGRES)
            .respond(QueryResult::from_rows(vec![crate::row! { "n" => 3i64, "m" => 4i64 }]));
        let value = exec.fetch_one("SELECT 3, 4", &[]).await.unwrap();
        assert_eq!(value, BindValue::Int64(3));
    }

    #[tokio::test]
    async fn test_fetch_one_without_rows_is_error() {
        let exec = RecordingExecutor::new(&POSTGRES);
        assert!(exec.fetch_one("SELECT 1 WHERE 1 = 0", &[]).await.is_err());
    }

    #[test]
    fn test_default_helpers_follow_dialect() {
        let exec = RecordingExecutor::new(&MSSQL);
        assert_eq!(exec.placeholder(2), "@param2");
        assert_eq!(exec.quote_identifier("users"), "[users]");
        assert_eq!(exec.escape(&BindValue::from("x")), "'x'");
    }
}
