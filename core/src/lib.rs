//! 多方言 SQL 构建与执行
//!
//! 构建器（`Select` / `Insert` / `Update` / `Delete` / `UnionSelect`）只依赖方言描述生成
//! SQL 与参数；适配器负责连接池、执行与结果归一；`TableGateway` 在二者之上提供单表 CRUD，
//! 并通过 `Hydrator` 把行转换为实体。

// 让 derive 生成的 `::sqlgate::...` 路径在本 crate 内也可用
extern crate self as sqlgate;

pub mod adapter;
pub mod config;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod hydrator;
pub mod placeholder;
pub mod result;
pub mod result_set;
pub mod sql;
pub mod statement;
pub mod table_gateway;
pub mod transaction;
pub mod value;

pub use adapter::{create_adapter, DatabaseAdapter, DatabaseAdapterExt};
#[cfg(feature = "mssql")]
pub use adapter::MsSqlAdapter;
#[cfg(feature = "mysql")]
pub use adapter::MySqlAdapter;
#[cfg(feature = "postgres")]
pub use adapter::PostgresAdapter;
#[cfg(feature = "sqlite")]
pub use adapter::SqliteAdapter;
pub use config::DatabaseConfig;
pub use dialect::{BytesLiteral, DbDriver, Dialect, LiteralStyle};
pub use error::{Result, SqlGateError};
pub use executor::DbExecutor;
pub use hydrator::{ClassMethodsHydrator, HydrationTarget, Hydrator, Prototype};
pub use result::{
    BatchInsertResult, ColumnInfo, ConnectionInfo, DeleteResult, InsertResult, QueryResult, TableInfo,
    UpdateResult,
};
pub use result_set::{HydratingResultSet, ResultSet};
pub use sql::{
    BuiltQuery, ConflictTarget, Delete, Filter, Insert, OnConflict, Operator, Select, SubQuery,
    UnionSelect, Update,
};
pub use statement::{FetchMode, Fetched, Statement};
pub use table_gateway::{PrimaryKey, SelectOptions, TableGateway, WhereMap, WhereSpec};
pub use transaction::TransactionScope;
pub use value::{BindValue, FromValue, Row};

// 重新导出 derive 宏
pub use sqlgate_derive::Entity;

/// 常用的 trait 与类型
pub mod prelude {
    pub use crate::adapter::{DatabaseAdapter, DatabaseAdapterExt};
    pub use crate::executor::DbExecutor;
    pub use crate::hydrator::{HydrationTarget, Hydrator};
    pub use crate::sql::{Delete, Filter, Insert, Order, Select, UnionSelect, Update};
    pub use crate::table_gateway::{SelectOptions, TableGateway, WhereMap, WhereSpec};
    pub use crate::value::{BindValue, FromValue, Row};
    pub use crate::{row, Entity, Result, SqlGateError};
}
