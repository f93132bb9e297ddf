//! 单表网关
//!
//! 绑定表名、适配器与主键，在构建器之上提供 CRUD。where 规格可以是现成的构建器、
//! 接收构建器的闭包、列值映射或原始条件；update/delete 拒绝空的规格。

use crate::adapter::DatabaseAdapter;
use crate::dialect::ReturningStyle;
use crate::error::{Result, SqlGateError};
use crate::hydrator::{HydrationTarget, Hydrator, Prototype};
use crate::result::{DeleteResult, InsertResult, UpdateResult};
use crate::result_set::HydratingResultSet;
use crate::sql::{Delete, Filter, Insert, Select, Update};
use crate::value::{BindValue, Row};
use std::sync::Arc;
use tracing::debug;

/// 网关查询时主表的别名
pub const TABLE_ALIAS: &str = "t";

/// 把一行转换为实体
pub type EntityFactory<T> = Arc<dyn Fn(Row) -> Result<T> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryKey {
    Single(String),
    Composite(Vec<String>),
}

impl PrimaryKey {
    pub fn columns(&self) -> Vec<&str> {
        match self {
            PrimaryKey::Single(column) => vec![column.as_str()],
            PrimaryKey::Composite(columns) => columns.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for PrimaryKey {
    fn from(column: &str) -> Self {
        PrimaryKey::Single(column.to_string())
    }
}

impl From<String> for PrimaryKey {
    fn from(column: String) -> Self {
        PrimaryKey::Single(column)
    }
}

impl From<Vec<&str>> for PrimaryKey {
    fn from(columns: Vec<&str>) -> Self {
        match columns.as_slice() {
            [single] => PrimaryKey::Single(single.to_string()),
            _ => PrimaryKey::Composite(columns.into_iter().map(str::to_string).collect()),
        }
    }
}

#[derive(Debug, Clone)]
enum MapValue {
    Eq(BindValue),
    Any(Vec<BindValue>),
}

/// 列值映射形式的 where 规格
///
/// 标量生成 `=`，`Null` 生成 `IS NULL`，列表生成 `IN`，空列表生成永假条件 `1 = 0`。
#[derive(Debug, Clone, Default)]
pub struct WhereMap {
    entries: Vec<(String, MapValue)>,
}

impl WhereMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<BindValue>) -> Self {
        self.entries.push((column.into(), MapValue::Eq(value.into())));
        self
    }

    pub fn null(self, column: impl Into<String>) -> Self {
        self.eq(column, BindValue::Null)
    }

    pub fn any<V: Into<BindValue>>(
        mut self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.entries.push((column.into(), MapValue::Any(values)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 把每一项作为 AND 条件加到构建器上
    pub fn apply<F: Filter>(self, mut target: F) -> F {
        for (column, value) in self.entries {
            target = match value {
                MapValue::Eq(BindValue::Null) => target.where_null(&column),
                MapValue::Eq(value) => target.where_eq(&column, value),
                MapValue::Any(values) if values.is_empty() => target.where_raw("1 = 0"),
                MapValue::Any(values) => target.where_in(&column, values),
            };
        }
        target
    }
}

impl From<Row> for WhereMap {
    fn from(row: Row) -> Self {
        row.into_iter()
            .fold(WhereMap::new(), |map, (column, value)| map.eq(column, value))
    }
}

/// where 规格
pub enum WhereSpec<B> {
    /// 不加条件，只允许用于 select
    All,
    /// 直接使用调用方构建好的构建器
    Builder(B),
    /// 接收网关准备好的构建器
    Callback(Box<dyn FnOnce(B) -> B + Send>),
    Map(WhereMap),
    Raw(String),
}

impl<B> WhereSpec<B> {
    pub fn callback(f: impl FnOnce(B) -> B + Send + 'static) -> Self {
        WhereSpec::Callback(Box::new(f))
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        WhereSpec::Raw(sql.into())
    }

    fn kind(&self) -> &'static str {
        match self {
            WhereSpec::All => "all",
            WhereSpec::Builder(_) => "builder",
            WhereSpec::Callback(_) => "callback",
            WhereSpec::Map(_) => "map",
            WhereSpec::Raw(_) => "raw",
        }
    }

    /// 规格本身能否判断为空
    fn is_blank(&self) -> bool {
        match self {
            WhereSpec::All => true,
            WhereSpec::Map(map) => map.is_empty(),
            WhereSpec::Raw(sql) => sql.trim().is_empty(),
            WhereSpec::Builder(_) | WhereSpec::Callback(_) => false,
        }
    }

    /// 把规格应用到网关准备的 `base` 上；`Builder` 直接替换 `base`
    fn prepare(self, base: B) -> B
    where
        B: Filter,
    {
        match self {
            WhereSpec::All => base,
            WhereSpec::Builder(builder) => builder,
            WhereSpec::Callback(f) => f(base),
            WhereSpec::Map(map) => map.apply(base),
            WhereSpec::Raw(sql) if sql.trim().is_empty() => base,
            WhereSpec::Raw(sql) => base.where_raw(sql),
        }
    }
}

impl<B> Default for WhereSpec<B> {
    fn default() -> Self {
        WhereSpec::All
    }
}

impl<B> From<WhereMap> for WhereSpec<B> {
    fn from(map: WhereMap) -> Self {
        WhereSpec::Map(map)
    }
}

impl<B> std::fmt::Debug for WhereSpec<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WhereSpec::{}", self.kind())
    }
}

/// select 的排序与分页
#[derive(Debug, Clone, Default)]
pub struct SelectOptions {
    pub order: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(mut self, expr: impl Into<String>) -> Self {
        self.order.push(expr.into());
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

    fn apply(self, mut select: Select) -> Select {
        for expr in self.order {
            select = select.order(expr);
        }
        if let Some(limit) = self.limit {
            select = select.limit(limit);
        }
        if let Some(offset) = self.offset {
            select = select.offset(offset);
        }
        select
    }
}

/// 单表网关
///
/// 结果的转换顺序：实体工厂优先，其次是 hydrator 与原型，最后原样返回行
/// （只有 `TableGateway<Row>` 可以不配置转换）。
pub struct TableGateway<T = Row> {
    table: String,
    adapter: Arc<dyn DatabaseAdapter>,
    primary_key: PrimaryKey,
    entity_factory: Option<EntityFactory<T>>,
    hydration: Option<(Arc<dyn Hydrator<T>>, Prototype<T>)>,
    raw: Option<fn(Row) -> T>,
}

impl<T> std::fmt::Debug for TableGateway<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableGateway")
            .field("table", &self.table)
            .field("dialect", &self.adapter.dialect().name)
            .field("primary_key", &self.primary_key)
            .field("entity_factory", &self.entity_factory.is_some())
            .field("hydrator", &self.hydration.is_some())
            .finish()
    }
}

impl TableGateway<Row> {
    /// 返回原始行的网关
    pub fn new(
        table: impl Into<String>,
        adapter: Arc<dyn DatabaseAdapter>,
        primary_key: impl Into<PrimaryKey>,
    ) -> Self {
        Self {
            table: table.into(),
            adapter,
            primary_key: primary_key.into(),
            entity_factory: None,
            hydration: None,
            raw: Some(|row| row),
        }
    }
}

impl<T: Send + 'static> TableGateway<T> {
    /// 通过实体工厂转换每一行
    pub fn with_factory(
        table: impl Into<String>,
        adapter: Arc<dyn DatabaseAdapter>,
        primary_key: impl Into<PrimaryKey>,
        factory: impl Fn(Row) -> Result<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            table: table.into(),
            adapter,
            primary_key: primary_key.into(),
            entity_factory: Some(Arc::new(factory)),
            hydration: None,
            raw: None,
        }
    }

    /// 通过 hydrator 与原型转换每一行
    pub fn with_hydrator(
        table: impl Into<String>,
        adapter: Arc<dyn DatabaseAdapter>,
        primary_key: impl Into<PrimaryKey>,
        hydrator: Arc<dyn Hydrator<T>>,
        prototype: Prototype<T>,
    ) -> Self {
        Self {
            table: table.into(),
            adapter,
            primary_key: primary_key.into(),
            entity_factory: None,
            hydration: Some((hydrator, prototype)),
            raw: None,
        }
    }

    /// 追加实体工厂，它优先于 hydrator
    pub fn entity_factory(
        mut self,
        factory: impl Fn(Row) -> Result<T> + Send + Sync + 'static,
    ) -> Self {
        self.entity_factory = Some(Arc::new(factory));
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn adapter(&self) -> &Arc<dyn DatabaseAdapter> {
        &self.adapter
    }

    pub fn primary_key(&self) -> &PrimaryKey {
        &self.primary_key
    }

    fn shape(&self, rows: Vec<Row>) -> Result<Vec<T>> {
        if let Some(factory) = &self.entity_factory {
            return rows.into_iter().map(|row| factory(row)).collect();
        }
        if let Some((hydrator, prototype)) = &self.hydration {
            let mut set = HydratingResultSet::new(hydrator.clone(), prototype.clone());
            set.initialize(rows);
            return set.into_vec();
        }
        match self.raw {
            Some(convert) => Ok(rows.into_iter().map(convert).collect()),
            None => Err(SqlGateError::Config(format!(
                "table gateway for {} has no entity factory or hydrator",
                self.table
            ))),
        }
    }

    /// 按规格构建 SELECT，不执行
    pub fn build_select(&self, spec: WhereSpec<Select>, options: SelectOptions) -> Select {
        let base = Select::new().from_alias(&self.table, TABLE_ALIAS);
        let select = spec.prepare(base);
        options.apply(select)
    }

    pub async fn select(&self, spec: WhereSpec<Select>, options: SelectOptions) -> Result<Vec<T>> {
        debug!(table = %self.table, spec = spec.kind(), "gateway select");
        let select = self.build_select(spec, options);
        let rows = select.execute(self.adapter.as_ref()).await?;
        self.shape(rows)
    }

    /// 按单列主键取一行
    pub async fn get(&self, id: impl Into<BindValue>) -> Result<Option<T>> {
        match &self.primary_key {
            PrimaryKey::Single(_) => self.get_by_key(vec![id.into()]).await,
            PrimaryKey::Composite(columns) => Err(SqlGateError::builder(format!(
                "{} has a composite primary key ({}), use get_by_key()",
                self.table,
                columns.join(", ")
            ))),
        }
    }

    /// 按主键取一行，值的顺序与主键列一致
    pub async fn get_by_key(&self, values: Vec<BindValue>) -> Result<Option<T>> {
        let columns = self.primary_key.columns();
        if columns.len() != values.len() {
            return Err(SqlGateError::builder(format!(
                "{} expects {} key values, got {}",
                self.table,
                columns.len(),
                values.len()
            )));
        }
        let map = columns
            .into_iter()
            .zip(values)
            .fold(WhereMap::new(), |map, (column, value)| map.eq(column, value));
        let rows = self
            .select(WhereSpec::Map(map), SelectOptions::new().limit(1))
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn insert(&self, data: &Row) -> Result<InsertResult> {
        let mut insert = Insert::new().into(self.table.as_str()).values(data.clone());
        if let PrimaryKey::Single(key) = &self.primary_key {
            if self.adapter.dialect().returning != ReturningStyle::Unsupported {
                insert = insert.returning([key.as_str()]);
            }
            insert = insert.key_column(key.as_str());
        }
        debug!(table = %self.table, columns = data.len(), "gateway insert");
        insert.execute(self.adapter.as_ref()).await
    }

    /// 插入实体的快照，配置了 hydrator 时由它导出
    pub async fn insert_entity(&self, entity: &T) -> Result<InsertResult>
    where
        T: HydrationTarget,
    {
        let data = match &self.hydration {
            Some((hydrator, _)) => hydrator.extract(entity),
            None => entity.extract(),
        };
        self.insert(&data).await
    }

    /// 按规格构建 UPDATE，不执行
    ///
    /// 规格为空或构建后没有任何条件时返回 `MissingWhere`。
    pub fn build_update(&self, spec: WhereSpec<Update>, data: Row) -> Result<Update> {
        if spec.is_blank() {
            return Err(self.missing_where("update"));
        }
        let base = Update::new().table(self.table.as_str());
        let update = spec.prepare(base);
        if !update.has_conditions() {
            return Err(self.missing_where("update"));
        }
        Ok(update.set_row(data))
    }

    pub async fn update(&self, spec: WhereSpec<Update>, data: Row) -> Result<UpdateResult> {
        debug!(table = %self.table, spec = spec.kind(), "gateway update");
        let update = self.build_update(spec, data)?;
        update.execute(self.adapter.as_ref()).await
    }

    /// 按规格构建 DELETE，不执行
    pub fn build_delete(&self, spec: WhereSpec<Delete>) -> Result<Delete> {
        if spec.is_blank() {
            return Err(self.missing_where("delete"));
        }
        let base = Delete::new().from(self.table.as_str());
        let delete = spec.prepare(base);
        if !delete.has_conditions() {
            return Err(self.missing_where("delete"));
        }
        Ok(delete)
    }

    pub async fn delete(&self, spec: WhereSpec<Delete>) -> Result<DeleteResult> {
        debug!(table = %self.table, spec = spec.kind(), "gateway delete");
        let delete = self.build_delete(spec)?;
        delete.execute(self.adapter.as_ref()).await
    }

    fn missing_where(&self, operation: &'static str) -> SqlGateError {
        SqlGateError::MissingWhere {
            table: self.table.clone(),
            operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{Dialect, MSSQL, MYSQL, POSTGRES, SQLITE};
    use crate::executor::testing::RecordingExecutor;
    use crate::hydrator::ClassMethodsHydrator;
    use crate::result::QueryResult;
    use crate::row;
    use crate::value::FromValue;

    fn recording(dialect: &'static Dialect) -> (Arc<RecordingExecutor>, Arc<dyn DatabaseAdapter>) {
        let exec = Arc::new(RecordingExecutor::new(dialect));
        let adapter: Arc<dyn DatabaseAdapter> = exec.clone();
        (exec, adapter)
    }

    fn recording_with(
        exec: RecordingExecutor,
    ) -> (Arc<RecordingExecutor>, Arc<dyn DatabaseAdapter>) {
        let exec = Arc::new(exec);
        let adapter: Arc<dyn DatabaseAdapter> = exec.clone();
        (exec, adapter)
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct File {
        file_id: i64,
        name: String,
    }

    impl HydrationTarget for File {
        fn assign(&mut self, property: &str, value: &BindValue) -> Result<bool> {
            match property {
                "fileId" => self.file_id = i64::from_value(value.clone())?,
                "name" => self.name = String::from_value(value.clone())?,
                _ => return Ok(false),
            }
            Ok(true)
        }

        fn extract(&self) -> Row {
            row! { "file_id" => self.file_id, "name" => self.name.clone() }
        }
    }

    #[test]
    fn test_where_map_semantics() {
        let (_, adapter) = recording(&POSTGRES);
        let gateway = TableGateway::new("files", adapter, "file_id");
        let map = WhereMap::new()
            .eq("owner", 3)
            .null("deleted_at")
            .any("kind", ["a", "b"]);
        let built = gateway
            .build_select(map.into(), SelectOptions::new().order("name").limit(5))
            .build(&POSTGRES)
            .unwrap();
        assert_eq!(
            built.sql,
            "SELECT * FROM files AS t WHERE \"owner\" = $1 AND \"deleted_at\" IS NULL \
             AND \"kind\" IN ($2, $3) ORDER BY name LIMIT 5"
        );
        assert_eq!(built.params.len(), 3);
    }

    #[test]
    fn test_empty_list_forces_no_match() {
        let (_, adapter) = recording(&MYSQL);
        let gateway = TableGateway::new("files", adapter, "file_id");
        let map = WhereMap::new().any("file_id", Vec::<i64>::new());
        let built = gateway
            .build_select(WhereSpec::Map(map), SelectOptions::new())
            .build(&MYSQL)
            .unwrap();
        assert_eq!(built.sql, "SELECT * FROM files AS t WHERE 1 = 0");
        assert!(built.params.is_empty());
    }

    #[test]
    fn test_callback_receives_prepared_select() {
        let (_, adapter) = recording(&SQLITE);
        let gateway = TableGateway::new("files", adapter, "file_id");
        let spec = WhereSpec::callback(|select: Select| {
            select
                .columns(["t.file_id", "f.name AS folder"])
                .left_join("folders AS f", "f.folder_id = t.folder_id")
                .where_bind("t.size > ?", 10)
        });
        let built = gateway
            .build_select(spec, SelectOptions::new())
            .build(&SQLITE)
            .unwrap();
        assert_eq!(
            built.sql,
            "SELECT t.file_id, f.name AS folder FROM files AS t \
             LEFT JOIN folders AS f ON f.folder_id = t.folder_id WHERE t.size > ?"
        );
    }

    #[test]
    fn test_builder_spec_used_as_is() {
        let (_, adapter) = recording(&SQLITE);
        let gateway = TableGateway::new("files", adapter, "file_id");
        let own = Select::new().from("archive").where_eq("id", 1);
        let built = gateway
            .build_select(WhereSpec::Builder(own), SelectOptions::new())
            .build(&SQLITE)
            .unwrap();
        assert_eq!(built.sql, "SELECT * FROM archive WHERE \"id\" = ?");
    }

    #[test]
    fn test_update_and_delete_require_where() {
        let (exec, adapter) = recording(&POSTGRES);
        let gateway = TableGateway::new("files", adapter, "file_id");

        let blanks: Vec<WhereSpec<Update>> = vec![
            WhereSpec::All,
            WhereSpec::Map(WhereMap::new()),
            WhereSpec::raw("  "),
            WhereSpec::callback(|u: Update| u),
            WhereSpec::Builder(Update::new().table("files")),
        ];
        for spec in blanks {
            let err = gateway
                .build_update(spec, row! { "name" => "x" })
                .unwrap_err();
            assert!(matches!(err, SqlGateError::MissingWhere { operation: "update", .. }));
        }

        let err = gateway.build_delete(WhereSpec::All).unwrap_err();
        assert_eq!(err.to_string(), "files.delete() requires a where specification");
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_where_never_reaches_database() {
        let (exec, adapter) = recording(&MYSQL);
        let gateway = TableGateway::new("files", adapter, "file_id");
        assert!(gateway
            .update(WhereSpec::All, row! { "name" => "x" })
            .await
            .unwrap_err()
            .is_builder_error());
        assert!(gateway.delete(WhereSpec::raw("")).await.is_err());
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_by_map() {
        let (exec, adapter) = recording_with(
            RecordingExecutor::new(&MYSQL).respond(QueryResult::affected(1, None)),
        );
        let gateway = TableGateway::new("files", adapter, "file_id");
        let result = gateway
            .update(WhereMap::new().eq("file_id", 5).into(), row! { "name" => "x" })
            .await
            .unwrap();
        assert!(result.success);
        let calls = exec.calls();
        assert_eq!(calls[0].0, "UPDATE `files` SET `name` = ? WHERE `file_id` = ?");
        assert_eq!(calls[0].1, vec![BindValue::from("x"), BindValue::from(5)]);
    }

    #[tokio::test]
    async fn test_delete_by_raw() {
        let (exec, adapter) = recording_with(
            RecordingExecutor::new(&SQLITE).respond(QueryResult::affected(2, None)),
        );
        let gateway = TableGateway::new("files", adapter, "file_id");
        let result = gateway
            .delete(WhereSpec::raw("size = 0"))
            .await
            .unwrap();
        assert_eq!(result.affected_rows, 2);
        assert_eq!(exec.last_sql(), "DELETE FROM \"files\" WHERE size = 0");
    }

    #[tokio::test]
    async fn test_get_adds_limit_one() {
        let (exec, adapter) = recording_with(RecordingExecutor::new(&MSSQL).respond(
            QueryResult::from_rows(vec![row! { "file_id" => 4i64, "name" => "a.txt" }]),
        ));
        let gateway = TableGateway::new("files", adapter, "file_id");
        let row = gateway.get(4).await.unwrap().unwrap();
        assert_eq!(row.get("name"), Some(&BindValue::from("a.txt")));
        assert_eq!(
            exec.last_sql(),
            "SELECT * FROM files AS t WHERE [file_id] = @param0 \
             ORDER BY (SELECT NULL) OFFSET 0 ROWS FETCH NEXT 1 ROWS ONLY"
        );
    }

    #[tokio::test]
    async fn test_composite_key_requires_get_by_key() {
        let (exec, adapter) = recording(&POSTGRES);
        let gateway = TableGateway::new("members", adapter, vec!["group_id", "user_id"]);
        assert!(gateway.get(1).await.is_err());
        assert!(gateway.get_by_key(vec![1.into()]).await.is_err());
        assert!(exec.calls().is_empty());

        let found = gateway
            .get_by_key(vec![1.into(), 2.into()])
            .await
            .unwrap();
        assert!(found.is_none());
        assert_eq!(
            exec.last_sql(),
            "SELECT * FROM members AS t WHERE \"group_id\" = $1 AND \"user_id\" = $2 LIMIT 1"
        );
    }

    #[tokio::test]
    async fn test_insert_uses_primary_key_as_returned_column() {
        let (exec, adapter) = recording_with(
            RecordingExecutor::new(&POSTGRES)
                .respond(QueryResult::from_rows(vec![row! { "file_id" => 11i64 }])),
        );
        let gateway = TableGateway::new("files", adapter, "file_id");
        let result = gateway.insert(&row! { "name" => "a" }).await.unwrap();
        assert_eq!(result.inserted_id, Some(BindValue::Int64(11)));
        assert_eq!(
            exec.last_sql(),
            "INSERT INTO \"files\" (\"name\") VALUES ($1) RETURNING \"file_id\""
        );

        let (exec, adapter) = recording_with(
            RecordingExecutor::new(&SQLITE).respond(QueryResult::affected(1, Some(9i64.into()))),
        );
        let gateway = TableGateway::new("files", adapter, "file_id");
        let result = gateway.insert(&row! { "name" => "a" }).await.unwrap();
        assert_eq!(result.inserted_id, Some(BindValue::Int64(9)));
        assert_eq!(exec.last_sql(), "INSERT INTO \"files\" (\"name\") VALUES (?)");
    }

    #[tokio::test]
    async fn test_hydrator_shapes_rows() {
        let (_, adapter) = recording_with(RecordingExecutor::new(&SQLITE).respond(
            QueryResult::from_rows(vec![
                row! { "file_id" => 1i64, "name" => "a" },
                row! { "file_id" => 2i64, "name" => "b" },
            ]),
        ));
        let gateway: TableGateway<File> = TableGateway::with_hydrator(
            "files",
            adapter,
            "file_id",
            Arc::new(ClassMethodsHydrator::new()),
            Arc::new(File::default),
        );
        let files = gateway
            .select(WhereSpec::All, SelectOptions::new())
            .await
            .unwrap();
        assert_eq!(
            files,
            vec![
                File { file_id: 1, name: "a".into() },
                File { file_id: 2, name: "b".into() },
            ]
        );
    }

    #[tokio::test]
    async fn test_entity_factory_takes_precedence() {
        let (_, adapter) = recording_with(RecordingExecutor::new(&SQLITE).respond(
            QueryResult::from_rows(vec![row! { "file_id" => 1i64, "name" => "a" }]),
        ));
        let gateway: TableGateway<File> = TableGateway::with_hydrator(
            "files",
            adapter,
            "file_id",
            Arc::new(ClassMethodsHydrator::new()),
            Arc::new(File::default),
        )
        .entity_factory(|row| {
            Ok(File {
                file_id: row.get_as("file_id")?,
                name: "from factory".to_string(),
            })
        });
        let files = gateway
            .select(WhereSpec::All, SelectOptions::new())
            .await
            .unwrap();
        assert_eq!(files[0].name, "from factory");
    }

    #[tokio::test]
    async fn test_insert_entity_uses_snapshot() {
        let (exec, adapter) = recording_with(
            RecordingExecutor::new(&MYSQL).respond(QueryResult::affected(1, Some(3i64.into()))),
        );
        let gateway: TableGateway<File> =
            TableGateway::with_factory("files", adapter, "file_id", |row| {
                Ok(File {
                    file_id: row.get_as("file_id")?,
                    name: row.get_as("name")?,
                })
            });
        let file = File {
            file_id: 3,
            name: "c".into(),
        };
        let result = gateway.insert_entity(&file).await.unwrap();
        assert_eq!(result.inserted_id, Some(BindValue::Int64(3)));
        assert_eq!(
            exec.last_sql(),
            "INSERT INTO `files` (`file_id`, `name`) VALUES (?, ?)"
        );
    }
}
