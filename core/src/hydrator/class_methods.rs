use super::{setter_name, to_camel_case, HydrationTarget, Hydrator};
use crate::error::Result;
use crate::value::Row;

/// 优先调用 setter，否则直接赋值属性
///
/// 列名默认从 snake_case 转为 camelCase：`user_id` 先尝试 `setUserId`，再尝试属性
/// `userId`。目标上不存在的属性被忽略。
#[derive(Debug, Clone, Copy)]
pub struct ClassMethodsHydrator {
    underscore_separated_keys: bool,
}

impl Default for ClassMethodsHydrator {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassMethodsHydrator {
    pub fn new() -> Self {
        Self {
            underscore_separated_keys: true,
        }
    }

    /// 列名原样作为属性名
    pub fn without_key_conversion() -> Self {
        Self {
            underscore_separated_keys: false,
        }
    }

    fn property_name(&self, key: &str) -> String {
        if self.underscore_separated_keys {
            to_camel_case(key)
        } else {
            key.to_string()
        }
    }
}

impl<T: HydrationTarget> Hydrator<T> for ClassMethodsHydrator {
    fn hydrate(&self, row: &Row, mut target: T) -> Result<T> {
        for (key, value) in row.iter() {
            let property = self.property_name(key);
            if !target.call_setter(&setter_name(&property), value)? {
                target.assign(&property, value)?;
            }
        }
        Ok(target)
    }

    fn extract(&self, source: &T) -> Row {
        source.extract()
    }
}
