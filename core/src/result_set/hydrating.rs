use crate::error::Result;
use crate::hydrator::{Hydrator, Prototype};
use crate::value::Row;
use std::collections::HashMap;
use std::sync::Arc;

/// 通过 `Hydrator` 把每行转换为 `T` 的结果集
///
/// 单行访问的结果按下标缓存，同一下标两次访问得到同一个对象。`to_array` 的结果被
/// 记住，之后的调用不再转换；此时单行缓存被并入并丢弃。
pub struct HydratingResultSet<T> {
    hydrator: Arc<dyn Hydrator<T>>,
    prototype: Prototype<T>,
    rows: Vec<Row>,
    hydrated: Option<Vec<T>>,
    index_cache: Option<HashMap<usize, T>>,
}

impl<T> std::fmt::Debug for HydratingResultSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HydratingResultSet")
            .field("rows", &self.rows.len())
            .field("hydrated", &self.hydrated.is_some())
            .finish()
    }
}

impl<T> HydratingResultSet<T> {
    pub fn new(hydrator: Arc<dyn Hydrator<T>>, prototype: Prototype<T>) -> Self {
        Self {
            hydrator,
            prototype,
            rows: Vec::new(),
            hydrated: None,
            index_cache: None,
        }
    }

    /// 载入新的行，清空所有缓存
    pub fn initialize(&mut self, rows: Vec<Row>) -> &mut Self {
        self.rows = rows;
        self.reset_cache();
        self
    }

    pub fn set_hydrator(&mut self, hydrator: Arc<dyn Hydrator<T>>) -> &mut Self {
        self.hydrator = hydrator;
        self.reset_cache();
        self
    }

    pub fn set_prototype(&mut self, prototype: Prototype<T>) -> &mut Self {
        self.prototype = prototype;
        self.reset_cache();
        self
    }

    pub fn hydrator(&self) -> &Arc<dyn Hydrator<T>> {
        &self.hydrator
    }

    fn reset_cache(&mut self) {
        self.hydrated = None;
        self.index_cache = None;
    }

    fn hydrate_row(&self, row: &Row) -> Result<T> {
        self.hydrator.hydrate(row, (self.prototype)())
    }

    /// 第 `index` 行转换后的对象，越界时返回 `None`
    pub fn get(&mut self, index: usize) -> Result<Option<&T>> {
        if index >= self.rows.len() {
            return Ok(None);
        }
        if self.hydrated.is_some() {
            return Ok(self.hydrated.as_ref().and_then(|all| all.get(index)));
        }

        let cache = self.index_cache.get_or_insert_with(HashMap::new);
        if !cache.contains_key(&index) {
            let object = self.hydrator.hydrate(&self.rows[index], (self.prototype)())?;
            cache.insert(index, object);
        }
        Ok(cache.get(&index))
    }

    pub fn current(&mut self) -> Result<Option<&T>> {
        self.get(0)
    }

    pub fn first(&mut self) -> Result<Option<&T>> {
        self.get(0)
    }

    /// 所有行转换后的对象
    pub fn to_array(&mut self) -> Result<&[T]> {
        if self.hydrated.is_none() {
            let mut cache = self.index_cache.take().unwrap_or_default();
            let mut all = Vec::with_capacity(self.rows.len());
            for (index, row) in self.rows.iter().enumerate() {
                let object = match cache.remove(&index) {
                    Some(object) => object,
                    None => match self.hydrate_row(row) {
                        Ok(object) => object,
                        Err(err) => {
                            // 已转换的对象放回单行缓存
                            cache.extend(all.into_iter().enumerate());
                            self.index_cache = Some(cache);
                            return Err(err);
                        }
                    },
                };
                all.push(object);
            }
            self.hydrated = Some(all);
        }
        Ok(self.hydrated.as_deref().unwrap_or(&[]))
    }

    /// 取走全部对象
    pub fn into_vec(mut self) -> Result<Vec<T>> {
        self.to_array()?;
        Ok(self.hydrated.take().unwrap_or_default())
    }

    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SqlGateError;
    use crate::hydrator::{ClassMethodsHydrator, HydrationTarget};
    use crate::row;
    use crate::value::{BindValue, FromValue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Item {
        item_id: i64,
        title: String,
    }

    impl HydrationTarget for Item {
        fn assign(&mut self, property: &str, value: &BindValue) -> Result<bool> {
            match property {
                "itemId" => self.item_id = i64::from_value(value.clone())?,
                "title" => self.title = String::from_value(value.clone())?,
                _ => return Ok(false),
            }
            Ok(true)
        }

        fn extract(&self) -> Row {
            row! { "item_id" => self.item_id, "title" => self.title.clone() }
        }
    }

    struct CountingHydrator {
        calls: Arc<AtomicUsize>,
    }

    impl Hydrator<Item> for CountingHydrator {
        fn hydrate(&self, row: &Row, target: Item) -> Result<Item> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ClassMethodsHydrator::new().hydrate(row, target)
        }

        fn extract(&self, source: &Item) -> Row {
            source.extract()
        }
    }

    fn rows() -> Vec<Row> {
        vec![
            row! { "item_id" => 1i64, "title" => "a" },
            row! { "item_id" => 2i64, "title" => "b" },
            row! { "item_id" => 3i64, "title" => "c" },
        ]
    }

    fn counting_set() -> (HydratingResultSet<Item>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut set: HydratingResultSet<Item> = HydratingResultSet::new(
            Arc::new(CountingHydrator {
                calls: calls.clone(),
            }),
            Arc::new(Item::default),
        );
        set.initialize(rows());
        (set, calls)
    }

    #[test]
    fn test_same_index_returns_same_object() {
        let (mut set, calls) = counting_set();
        let first = set.get(1).unwrap().map(|item| item as *const Item);
        let second = set.get(1).unwrap().map(|item| item as *const Item);
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(set.get(1).unwrap().map(|i| i.title.as_str()), Some("b"));
        assert!(set.get(9).unwrap().is_none());
    }

    #[test]
    fn test_to_array_is_memoized_and_reuses_index_cache() {
        let (mut set, calls) = counting_set();
        set.current().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let ids: Vec<i64> = set.to_array().unwrap().iter().map(|i| i.item_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let again = set.to_array().unwrap().as_ptr();
        let again_2 = set.to_array().unwrap().as_ptr();
        assert_eq!(again, again_2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // 数组建立后单行访问直接取数组元素
        assert_eq!(set.get(2).unwrap().map(|i| i.item_id), Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_reinitialize_drops_cache() {
        let (mut set, calls) = counting_set();
        set.to_array().unwrap();
        set.initialize(vec![row! { "item_id" => 10i64, "title" => "z" }]);
        assert_eq!(set.count(), 1);
        assert_eq!(set.first().unwrap().map(|i| i.item_id), Some(10));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_prototype_is_never_mutated() {
        let mut set: HydratingResultSet<Item> = HydratingResultSet::new(
            Arc::new(ClassMethodsHydrator::new()),
            Arc::new(|| Item {
                item_id: 0,
                title: "proto".to_string(),
            }),
        );
        set.initialize(vec![row! { "item_id" => 5i64 }, row! { "title" => "only" }]);
        let items = set.into_vec().unwrap();
        assert_eq!(items[0].title, "proto");
        assert_eq!(items[1].item_id, 0);
        assert_eq!(items[1].title, "only");
    }

    #[test]
    fn test_failed_to_array_keeps_index_cache() {
        let (mut set, calls) = counting_set();
        set.initialize(vec![
            row! { "item_id" => 1i64, "title" => "a" },
            row! { "item_id" => 2i64, "title" => "b" },
            row! { "item_id" => "bad", "title" => "c" },
        ]);
        set.get(0).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(set.to_array().is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // 失败前转换过的行不再重复转换
        assert_eq!(set.get(0).unwrap().map(|i| i.item_id), Some(1));
        assert_eq!(set.get(1).unwrap().map(|i| i.item_id), Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_hydration_error_surfaces() {
        let mut set: HydratingResultSet<Item> =
            HydratingResultSet::new(Arc::new(ClassMethodsHydrator::new()), Arc::new(Item::default));
        set.initialize(vec![row! { "item_id" => "x" }]);
        let err = set.to_array().unwrap_err();
        assert!(matches!(err, SqlGateError::Hydration(_)));
    }
}
