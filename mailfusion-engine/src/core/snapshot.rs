//! 分类注册表不可变快照
//! 预测路径只读快照，不触碰注册表锁；按id升序排列，保证遍历顺序确定

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::category::Category;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    version: u64,
    categories: Vec<Category>,
    by_name: FxHashMap<String, usize>,
    by_id: FxHashMap<u32, usize>,
    fallback_idx: usize,
}

impl RegistrySnapshot {
    /// 构建快照（要求兜底分类存在）
    pub fn new(
        version: u64,
        categories: impl IntoIterator<Item = Category>,
        fallback_name: &str,
    ) -> CoreResult<Self> {
        let mut categories: Vec<Category> = categories.into_iter().collect();
        categories.sort_by_key(|c| c.id);

        let mut by_name = FxHashMap::default();
        let mut by_id = FxHashMap::default();
        for (idx, cat) in categories.iter().enumerate() {
            if by_name.insert(cat.name.clone(), idx).is_some() {
                return Err(CoreError::InvalidInput(format!(
                    "duplicate category name: {}",
                    cat.name
                )));
            }
            if by_id.insert(cat.id, idx).is_some() {
                return Err(CoreError::InvalidInput(format!(
                    "duplicate category id: {}",
                    cat.id
                )));
            }
        }

        let fallback_idx = *by_name
            .get(fallback_name)
            .ok_or_else(|| CoreError::FallbackMissing(fallback_name.to_string()))?;

        Ok(Self {
            version,
            categories,
            by_name,
            by_id,
            fallback_idx,
        })
    }

    /// 只含一个分类（即兜底分类）的快照，构建不会失败
    pub fn single(version: u64, fallback: Category) -> Self {
        let mut by_name = FxHashMap::default();
        let mut by_id = FxHashMap::default();
        by_name.insert(fallback.name.clone(), 0);
        by_id.insert(fallback.id, 0);
        Self {
            version,
            categories: vec![fallback],
            by_name,
            by_id,
            fallback_idx: 0,
        }
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// 按id升序的分类列表
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Category> {
        self.by_name.get(name).map(|&idx| &self.categories[idx])
    }

    pub fn get_by_id(&self, id: u32) -> Option<&Category> {
        self.by_id.get(&id).map(|&idx| &self.categories[idx])
    }

    pub fn contains_id(&self, id: u32) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.get(name).map(|c| c.id)
    }

    /// 按名称查找，精确匹配失败时退化为ASCII大小写不敏感匹配
    pub fn find_loose(&self, name: &str) -> Option<&Category> {
        self.get(name).or_else(|| {
            self.categories
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
        })
    }

    pub fn fallback(&self) -> &Category {
        &self.categories[self.fallback_idx]
    }

    pub fn fallback_name(&self) -> &str {
        &self.fallback().name
    }

    pub fn fallback_id(&self) -> u32 {
        self.fallback().id
    }

    /// 配置了有效策略的分类（id升序）
    pub fn strategy_bearing(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter().filter(|c| c.has_strategy())
    }
}
