//! 行到对象的转换（hydration）
//!
//! `Hydrator` 决定字段映射策略，`HydrationTarget` 由目标类型实现（通常由
//! `#[derive(Entity)]` 生成），提供按名字调用 setter、赋值属性和导出快照的能力。

mod class_methods;

pub use class_methods::ClassMethodsHydrator;

use crate::error::Result;
use crate::value::{BindValue, Row};
use std::sync::Arc;

/// 为每一行创建新的目标对象；共享的原型本身永远不会被修改
pub type Prototype<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// 可以被填充的目标类型
pub trait HydrationTarget: Send + Sync {
    /// 按名字调用 setter，例如 `setUserId`；不存在时返回 `Ok(false)`
    fn call_setter(&mut self, setter: &str, value: &BindValue) -> Result<bool> {
        let _ = (setter, value);
        Ok(false)
    }

    /// 直接给属性赋值；不存在的属性返回 `Ok(false)`
    fn assign(&mut self, property: &str, value: &BindValue) -> Result<bool>;

    /// 扁平的列名到值的快照，用于持久化
    fn extract(&self) -> Row;
}

impl HydrationTarget for Row {
    fn assign(&mut self, property: &str, value: &BindValue) -> Result<bool> {
        self.insert(property, value.clone());
        Ok(true)
    }

    fn extract(&self) -> Row {
        self.clone()
    }
}

/// 字段映射策略
pub trait Hydrator<T>: Send + Sync {
    /// 用一行数据填充 `target` 并返回
    fn hydrate(&self, row: &Row, target: T) -> Result<T>;

    fn extract(&self, source: &T) -> Row;
}

/// `user_id` -> `userId`
///
/// 只有下划线后紧跟小写字母时才合并，其余字符保持不变。
pub fn to_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut chars = key.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('_', Some(next)) if next.is_ascii_lowercase() => {
                out.push(next.to_ascii_uppercase());
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

/// `userId` -> `setUserId`
pub fn setter_name(property: &str) -> String {
    let mut chars = property.chars();
    match chars.next() {
        Some(first) => format!("set{}{}", first.to_uppercase(), chars.as_str()),
        None => "set".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_camel_case() {
        assert_eq!(to_camel_case("user_id"), "userId");
        assert_eq!(to_camel_case("created_at_utc"), "createdAtUtc");
        assert_eq!(to_camel_case("name"), "name");
        assert_eq!(to_camel_case("_private"), "Private");
        assert_eq!(to_camel_case("a_1"), "a_1");
        assert_eq!(to_camel_case("trailing_"), "trailing_");
    }

    #[test]
    fn test_setter_name() {
        assert_eq!(setter_name("userId"), "setUserId");
        assert_eq!(setter_name("x"), "setX");
    }

    #[test]
    fn test_row_is_a_target() {
        let mut row = Row::new();
        assert!(!row.call_setter("setA", &BindValue::from(1)).unwrap());
        assert!(row.assign("a", &BindValue::from(1)).unwrap());
        assert_eq!(row.extract().get("a"), Some(&BindValue::from(1)));
    }
}
