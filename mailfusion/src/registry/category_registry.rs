//! 动态分类注册表
//! 核心职责：
//! 1. 分类增删改查，name 为对外主键，id 为模型侧主键
//! 2. id 单调分配，持久化高水位 next_id，删除后不复用
//! 3. 每次变更整体持久化并递增版本号，同时重建不可变快照
//! 4. 读写共用一把互斥锁；读方拿到的是快照/深拷贝，不会看到写一半的状态

use chrono::Utc;
use mailfusion_engine::core::{fallback_category, get_default_categories};
use mailfusion_engine::{Category, CategoryPatch, RegistrySnapshot};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::document::{RegistryDocument, RegistryMetadata};
use super::draft::{normalize_color, CategoryDraft};
use super::store::RegistryStore;
use crate::error::RegistryError;

/// 锁内状态
#[derive(Debug)]
struct RegistryState {
    /// name → Category
    categories: BTreeMap<String, Category>,
    version: u64,
    next_id: u32,
    snapshot: Arc<RegistrySnapshot>,
}

#[derive(Debug)]
pub struct CategoryRegistry {
    state: Mutex<RegistryState>,
    store: Arc<dyn RegistryStore>,
    fallback_name: String,
}

impl CategoryRegistry {
    /// 打开注册表
    /// - 后端无文档：seed_defaults 为真时写入内置种子分类，否则仅创建兜底分类
    /// - 文档损坏：退化为单个兜底分类并告警，不覆盖原文件直到下一次变更；
    ///   新id从后端可恢复的高水位起分配
    /// - 单个分类条目损坏：仅跳过该条目，其余分类照常加载
    pub fn open(store: Arc<dyn RegistryStore>, fallback_name: &str, seed_defaults: bool) -> Self {
        let fallback_name = fallback_name.trim().to_string();
        let (categories, version, next_id, persist) = match store.load() {
            Ok(Some(document)) => {
                let (categories, version, next_id) = Self::from_document(document, &fallback_name);
                log::info!(
                    "Category registry loaded from {} | categories={} version={}",
                    store.describe(),
                    categories.len(),
                    version
                );
                (categories, version, next_id, false)
            }
            Ok(None) => {
                let seeded: Vec<Category> = if seed_defaults {
                    get_default_categories()
                } else {
                    Vec::new()
                };
                let mut categories: BTreeMap<String, Category> =
                    seeded.into_iter().map(|c| (c.name.clone(), c)).collect();
                let next_id = Self::max_id(&categories).map_or(0, |id| id.saturating_add(1));
                let next_id = Self::ensure_fallback(&mut categories, &fallback_name, next_id);
                log::info!(
                    "No registry document in {}, initialized {} categories",
                    store.describe(),
                    categories.len()
                );
                (categories, 0, next_id, true)
            }
            Err(e) => {
                // 新id从残留内容中的高水位起分配，避免与旧文档中的id冲突
                let id_floor = store.recover_id_floor();
                log::warn!(
                    "Category registry in {} is unreadable ({}), falling back to '{}' only | id_floor={:?}",
                    store.describe(),
                    e,
                    fallback_name,
                    id_floor
                );
                if id_floor.is_none() {
                    log::warn!(
                        "No id high-water mark recoverable from {}, ids may repeat those of the unreadable document",
                        store.describe()
                    );
                }
                let mut categories = BTreeMap::new();
                let next_id =
                    Self::ensure_fallback(&mut categories, &fallback_name, id_floor.unwrap_or(0));
                (categories, 0, next_id, false)
            }
        };

        let snapshot = Self::build_snapshot(version, &categories, &fallback_name)
            .unwrap_or_else(|| Self::emergency_snapshot(version, &fallback_name));
        let registry = Self {
            state: Mutex::new(RegistryState {
                categories,
                version,
                next_id,
                snapshot,
            }),
            store,
            fallback_name,
        };
        if persist {
            let state = registry.lock();
            registry.persist(&state);
        }
        registry
    }

    /// 文档 → 锁内状态；丢弃重复id，补齐兜底分类，推导next_id
    fn from_document(
        document: RegistryDocument,
        fallback_name: &str,
    ) -> (BTreeMap<String, Category>, u64, u32) {
        let version = document.metadata.version;
        let stored_next = document.metadata.next_id;
        let mut categories: BTreeMap<String, Category> = BTreeMap::new();
        let mut seen_ids = rustc_hash::FxHashSet::default();

        let mut loaded = document.into_categories();
        loaded.sort_by_key(|c| c.id);
        for category in loaded {
            if category.name.trim().is_empty() {
                log::warn!("Skipping category with empty name (id={})", category.id);
                continue;
            }
            if !seen_ids.insert(category.id) {
                log::warn!(
                    "Skipping category '{}' with duplicate id {}",
                    category.name,
                    category.id
                );
                continue;
            }
            categories.insert(category.name.clone(), category);
        }

        let derived = Self::max_id(&categories).map_or(0, |id| id.saturating_add(1));
        let next_id = stored_next.map_or(derived, |n| n.max(derived));
        let next_id = Self::ensure_fallback(&mut categories, fallback_name, next_id);
        (categories, version, next_id)
    }

    /// 兜底分类缺失时补齐，返回更新后的next_id
    fn ensure_fallback(
        categories: &mut BTreeMap<String, Category>,
        fallback_name: &str,
        next_id: u32,
    ) -> u32 {
        if categories.contains_key(fallback_name) {
            return next_id;
        }
        log::warn!(
            "Fallback category '{}' missing, creating it with id {}",
            fallback_name,
            next_id
        );
        categories.insert(
            fallback_name.to_string(),
            fallback_category(fallback_name, next_id),
        );
        next_id.saturating_add(1)
    }

    fn max_id(categories: &BTreeMap<String, Category>) -> Option<u32> {
        categories.values().map(|c| c.id).max()
    }

    fn build_snapshot(
        version: u64,
        categories: &BTreeMap<String, Category>,
        fallback_name: &str,
    ) -> Option<Arc<RegistrySnapshot>> {
        match RegistrySnapshot::new(version, categories.values().cloned(), fallback_name) {
            Ok(snapshot) => Some(snapshot.into_shared()),
            Err(e) => {
                log::error!("Failed to build registry snapshot (version={}): {}", version, e);
                None
            }
        }
    }

    /// 只含兜底分类的快照
    fn emergency_snapshot(version: u64, fallback_name: &str) -> Arc<RegistrySnapshot> {
        RegistrySnapshot::single(version, fallback_category(fallback_name, 0)).into_shared()
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 变更收尾：递增版本、重建快照、整体持久化
    fn commit(&self, state: &mut RegistryState) {
        state.version += 1;
        if let Some(snapshot) = Self::build_snapshot(state.version, &state.categories, &self.fallback_name)
        {
            state.snapshot = snapshot;
        }
        self.persist(state);
    }

    /// 持久化失败只记录日志，内存中的变更保留
    fn persist(&self, state: &RegistryState) {
        let document = Self::document_of(state, &self.fallback_name);
        if let Err(e) = self.store.save(&document) {
            log::error!(
                "Failed to persist category registry to {} (version={}): {}",
                self.store.describe(),
                state.version,
                e
            );
        }
    }

    fn document_of(state: &RegistryState, fallback_name: &str) -> RegistryDocument {
        RegistryDocument {
            categories: state.categories.clone(),
            metadata: RegistryMetadata {
                version: state.version,
                next_id: Some(state.next_id),
                fallback_category: fallback_name.to_string(),
                total_categories: state.categories.len(),
            },
            last_updated: Utc::now(),
        }
    }

    // ===================== 变更操作 =====================

    /// 新增分类；新id = max(最大id + 1, next_id)
    pub fn add(&self, draft: CategoryDraft) -> Result<Category, RegistryError> {
        let name = draft.name.trim().to_string();
        if name.is_empty() {
            return Err(RegistryError::InvalidName("name must not be empty".into()));
        }

        let mut state = self.lock();
        if state.categories.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }

        let id = Self::max_id(&state.categories)
            .map_or(0, |max| max.saturating_add(1))
            .max(state.next_id);
        let next_id = id.checked_add(1).ok_or(RegistryError::IdExhausted)?;

        let category = Category {
            name: name.clone(),
            id,
            description: draft.description,
            keywords: draft.keywords,
            color: normalize_color(&draft.color),
            classification_strategy: draft.classification_strategy,
            is_default: false,
            created_at: Utc::now(),
            updated_at: None,
        };
        state.categories.insert(name, category.clone());
        state.next_id = next_id;
        self.commit(&mut state);

        log::info!(
            "Category added: {} (id={}, version={})",
            category.name,
            category.id,
            state.version
        );
        Ok(category)
    }

    /// 删除分类；默认分类与兜底分类不可删除
    pub fn remove(&self, name: &str) -> Result<Category, RegistryError> {
        let mut state = self.lock();
        let category = state
            .categories
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        if category.is_default || category.name == self.fallback_name {
            return Err(RegistryError::DefaultProtected(name.to_string()));
        }

        let removed = state
            .categories
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        self.commit(&mut state);

        log::info!(
            "Category removed: {} (id={}, version={})",
            removed.name,
            removed.id,
            state.version
        );
        Ok(removed)
    }

    /// 局部更新分类
    pub fn update(&self, name: &str, patch: CategoryPatch) -> Result<Category, RegistryError> {
        let mut state = self.lock();
        let category = state
            .categories
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        let mut patch = patch;
        if let Some(color) = patch.color.take() {
            patch.color = Some(normalize_color(&color));
        }
        patch.apply(category, Utc::now());
        let updated = category.clone();
        self.commit(&mut state);

        log::info!(
            "Category updated: {} (id={}, version={})",
            updated.name,
            updated.id,
            state.version
        );
        Ok(updated)
    }

    // ===================== 只读操作 =====================

    /// 不可变快照（id升序，携带版本号）
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.lock().snapshot.clone()
    }

    /// 全部分类的深拷贝（id升序）
    pub fn get_all(&self) -> Vec<Category> {
        self.snapshot().categories().to_vec()
    }

    pub fn get(&self, name: &str) -> Option<Category> {
        self.lock().categories.get(name).cloned()
    }

    pub fn get_by_id(&self, id: u32) -> Option<String> {
        self.snapshot().get_by_id(id).map(|c| c.name.clone())
    }

    pub fn get_id_by_name(&self, name: &str) -> Option<u32> {
        self.lock().categories.get(name).map(|c| c.id)
    }

    pub fn names(&self) -> Vec<String> {
        self.snapshot().names().map(str::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().categories.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.lock().version
    }

    pub fn next_id(&self) -> u32 {
        self.lock().next_id
    }

    pub fn fallback_name(&self) -> &str {
        &self.fallback_name
    }

    /// 当前状态对应的持久化文档
    pub fn document(&self) -> RegistryDocument {
        let state = self.lock();
        Self::document_of(&state, &self.fallback_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MfResult;
    use crate::registry::store::{JsonFileStore, MemoryStore};
    use mailfusion_engine::core::{BodyAnalysis, DEFAULT_COLOR};
    use mailfusion_engine::ClassificationStrategy;

    fn memory_registry() -> (Arc<MemoryStore>, CategoryRegistry) {
        let store = Arc::new(MemoryStore::new());
        let registry = CategoryRegistry::open(store.clone(), "Other", true);
        (store, registry)
    }

    /// 保存必定失败的后端
    #[derive(Debug)]
    struct BrokenStore;

    impl RegistryStore for BrokenStore {
        fn load(&self) -> MfResult<Option<RegistryDocument>> {
            Ok(None)
        }
        fn save(&self, _document: &RegistryDocument) -> MfResult<()> {
            Err(crate::error::MailFusionError::Persistence("disk full".into()))
        }
        fn describe(&self) -> String {
            "broken".into()
        }
    }

    #[test]
    fn test_seeded_defaults() {
        let (store, registry) = memory_registry();
        assert_eq!(registry.len(), 5);
        assert_eq!(registry.get_id_by_name("Other"), Some(4));
        assert_eq!(registry.get_by_id(0).as_deref(), Some("Academic"));
        assert_eq!(registry.next_id(), 5);
        assert!(store.document().is_some());
    }

    #[test]
    fn test_no_seed_creates_fallback_only() {
        let registry = CategoryRegistry::open(Arc::new(MemoryStore::new()), "Misc", false);
        assert_eq!(registry.names(), vec!["Misc".to_string()]);
        assert!(registry.get("Misc").unwrap().is_default);
    }

    #[test]
    fn test_add_size_invariant_and_persist() {
        let (store, registry) = memory_registry();
        let before = registry.len();
        let v0 = registry.version();
        let cat = registry
            .add(CategoryDraft::new("Invoices").keywords(["invoice"]).color("#abcdef"))
            .unwrap();
        assert_eq!(cat.id, 5);
        assert_eq!(cat.color, "#ABCDEF");
        assert!(!cat.is_default);
        assert_eq!(registry.len(), before + 1);
        assert_eq!(registry.version(), v0 + 1);

        let doc = store.document().unwrap();
        assert!(doc.categories.contains_key("Invoices"));
        assert_eq!(doc.metadata.version, v0 + 1);
        assert_eq!(doc.metadata.next_id, Some(6));
    }

    #[test]
    fn test_add_duplicate_and_invalid() {
        let (_, registry) = memory_registry();
        let err = registry.add(CategoryDraft::new("Spam")).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("Spam".into()));
        assert_eq!(err.to_string(), "Category 'Spam' already exists");
        assert!(matches!(
            registry.add(CategoryDraft::new("   ")),
            Err(RegistryError::InvalidName(_))
        ));
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_ids_strictly_increasing() {
        let (_, registry) = memory_registry();
        let ids: Vec<u32> = (0..5)
            .map(|i| registry.add(CategoryDraft::new(format!("C{}", i))).unwrap().id)
            .collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_removed_max_id_not_reused() {
        let (_, registry) = memory_registry();
        let a = registry.add(CategoryDraft::new("A")).unwrap();
        registry.remove("A").unwrap();
        let b = registry.add(CategoryDraft::new("B")).unwrap();
        assert!(b.id > a.id);
    }

    #[test]
    fn test_remove_rules() {
        let (_, registry) = memory_registry();
        let before = registry.len();
        assert_eq!(
            registry.remove("Academic").unwrap_err(),
            RegistryError::DefaultProtected("Academic".into())
        );
        assert_eq!(registry.len(), before);
        assert_eq!(
            registry.remove("Nope").unwrap_err(),
            RegistryError::NotFound("Nope".into())
        );

        registry.add(CategoryDraft::new("Temp")).unwrap();
        registry.remove("Temp").unwrap();
        assert_eq!(registry.len(), before);
        assert!(registry.get("Temp").is_none());
    }

    #[test]
    fn test_update_patch() {
        let (_, registry) = memory_registry();
        registry.add(CategoryDraft::new("Invoices")).unwrap();
        let strategy = ClassificationStrategy::default().with_body(BodyAnalysis {
            keywords: vec!["invoice".into()],
            ..Default::default()
        });
        let updated = registry
            .update(
                "Invoices",
                CategoryPatch::new().description("bills").color("nope").strategy(strategy),
            )
            .unwrap();
        assert_eq!(updated.description, "bills");
        assert_eq!(updated.color, DEFAULT_COLOR);
        assert!(updated.updated_at.is_some());
        assert!(updated.has_strategy());

        let cleared = registry
            .update("Invoices", CategoryPatch::new().clear_strategy())
            .unwrap();
        assert!(!cleared.has_strategy());
        assert_eq!(
            registry.update("Missing", CategoryPatch::new()).unwrap_err(),
            RegistryError::NotFound("Missing".into())
        );
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_mutation() {
        let (_, registry) = memory_registry();
        let before = registry.snapshot();
        registry.add(CategoryDraft::new("Later")).unwrap();
        assert!(before.get("Later").is_none());
        assert_eq!(registry.snapshot().version(), before.version() + 1);
        assert!(registry.snapshot().get("Later").is_some());
    }

    #[test]
    fn test_reload_preserves_next_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categories.json");
        {
            let registry = CategoryRegistry::open(Arc::new(JsonFileStore::new(&path)), "Other", true);
            registry.add(CategoryDraft::new("A")).unwrap();
            registry.remove("A").unwrap();
        }
        let registry = CategoryRegistry::open(Arc::new(JsonFileStore::new(&path)), "Other", true);
        assert_eq!(registry.len(), 5);
        assert_eq!(registry.version(), 2);
        let b = registry.add(CategoryDraft::new("B")).unwrap();
        assert_eq!(b.id, 6);
    }

    #[test]
    fn test_corrupt_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categories.json");
        std::fs::write(&path, "{{{ definitely not json").unwrap();
        let registry = CategoryRegistry::open(Arc::new(JsonFileStore::new(&path)), "Other", true);
        assert_eq!(registry.names(), vec!["Other".to_string()]);
        // 损坏文件在下一次变更前保持原样
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "{{{ definitely not json"
        );
        registry.add(CategoryDraft::new("New")).unwrap();
        let reopened = CategoryRegistry::open(Arc::new(JsonFileStore::new(&path)), "Other", true);
        assert_eq!(reopened.len(), 2);
    }

    #[test]
    fn test_legacy_document_missing_fallback() {
        let mut categories = BTreeMap::new();
        categories.insert("Work".to_string(), Category::new(7, "Work"));
        categories.insert("Dup".to_string(), Category::new(7, "Dup"));
        let store = Arc::new(MemoryStore::with_document(RegistryDocument {
            categories,
            metadata: RegistryMetadata::default(),
            last_updated: Utc::now(),
        }));
        let registry = CategoryRegistry::open(store, "Other", true);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get_id_by_name("Other"), Some(8));
        assert_eq!(registry.next_id(), 9);
    }

    #[test]
    fn test_malformed_strategy_does_not_drop_registry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categories.json");
        std::fs::write(
            &path,
            r##"{
                "categories": {
                    "Other": {"id": 0, "is_default": true},
                    "Invoices": {"id": 1, "keywords": ["invoice"]},
                    "Travel": {"id": 2, "classification_strategy": "bogus"},
                    "Broken": {"id": 5, "keywords": "not-a-list"}
                },
                "metadata": {"version": 3, "next_id": 3}
            }"##,
        )
        .unwrap();

        let registry = CategoryRegistry::open(Arc::new(JsonFileStore::new(&path)), "Other", true);
        assert_eq!(
            registry.names(),
            vec!["Other".to_string(), "Invoices".to_string(), "Travel".to_string()]
        );
        assert_eq!(registry.version(), 3);
        assert!(registry.get("Travel").unwrap().classification_strategy.is_none());

        // Broken 的 id 5 被保留，新分类不复用任何已出现过的id
        let added = registry.add(CategoryDraft::new("New")).unwrap();
        assert_eq!(added.id, 6);

        let reopened = CategoryRegistry::open(Arc::new(JsonFileStore::new(&path)), "Other", true);
        assert_eq!(reopened.get_id_by_name("Invoices"), Some(1));
        assert_eq!(reopened.get_id_by_name("New"), Some(6));
        assert_eq!(reopened.next_id(), 7);
    }

    #[test]
    fn test_corrupt_file_keeps_id_high_water() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categories.json");
        std::fs::write(
            &path,
            r#"{"metadata": {"version": 9, "next_id": 7}, "categories": {"Invoices": {"id": 6,"#,
        )
        .unwrap();
        let registry = CategoryRegistry::open(Arc::new(JsonFileStore::new(&path)), "Other", true);
        assert_eq!(registry.names(), vec!["Other".to_string()]);
        assert_eq!(registry.get_id_by_name("Other"), Some(7));
        let added = registry.add(CategoryDraft::new("New")).unwrap();
        assert_eq!(added.id, 8);
    }

    #[test]
    fn test_save_failure_keeps_mutation() {
        let registry = CategoryRegistry::open(Arc::new(BrokenStore), "Other", true);
        let cat = registry.add(CategoryDraft::new("Kept")).unwrap();
        assert_eq!(registry.get_id_by_name("Kept"), Some(cat.id));
    }

    #[test]
    fn test_concurrent_adds_unique_ids() {
        let (_, registry) = memory_registry();
        let registry = Arc::new(registry);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    (0..10)
                        .map(|i| registry.add(CategoryDraft::new(format!("T{}-{}", t, i))).unwrap().id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut ids: Vec<u32> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 80);
        assert_eq!(registry.len(), 85);
    }
}
