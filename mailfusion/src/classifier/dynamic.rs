//! 动态分类器
//! 核心职责：
//! 1. 分类注册表、打分器、融合引擎、缓存的统一入口
//! 2. 分类变更/打分器重载后：清空缓存 → 重建标签映射 → 广播事件
//! 3. 同步预测直接在调用线程执行；异步预测投递到阻塞线程池并施加请求级超时
//! 特性：
//! - 预测开始时先读缓存代际再取快照，保证与并发变更竞争时不会回填陈旧结果
//! - 打分全程不持有注册表锁；模型状态整体原子替换

use mailfusion_engine::{
    Category, CategoryPatch, EmailInput, FusionEngine, ModelLabelMap, PredictionResult,
    RegistrySnapshot,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use super::batch::BatchCoordinator;
use super::context::{ModelState, ScoringContext};
use super::events::{ClassifierEvent, EventBus};
use super::stats::{ModelInfo, ModelStatus, PerformanceStats, StatsCollector};
use crate::cache::{CacheStats, PredictionCache};
use crate::config::ClassifierConfig;
use crate::error::{MfResult, RegistryError, ScorerError};
use crate::registry::{
    CategoryDraft, CategoryRegistry, JsonFileStore, MemoryStore, RegistryStore, TemplateCatalog,
};
use crate::scorer::{EmailFeatureExtractor, FeaturePipeline, FeatureScorer, MlScorer};

/// 分类管理操作的对外结果：成功标记 + 分类 或 可读原因
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryOperation {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<Result<Category, RegistryError>> for CategoryOperation {
    fn from(result: Result<Category, RegistryError>) -> Self {
        match result {
            Ok(category) => Self {
                success: true,
                category: Some(category),
                message: None,
            },
            Err(e) => Self {
                success: false,
                category: None,
                message: Some(e.to_string()),
            },
        }
    }
}

pub struct DynamicClassifier {
    config: ClassifierConfig,
    registry: Arc<CategoryRegistry>,
    templates: TemplateCatalog,
    engine: Arc<FusionEngine>,
    model: RwLock<Option<ModelState>>,
    features: RwLock<Option<FeaturePipeline>>,
    label_map_version: AtomicU64,
    cache: Arc<PredictionCache>,
    coordinator: BatchCoordinator,
    events: EventBus,
    stats: StatsCollector,
}

impl std::fmt::Debug for DynamicClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicClassifier")
            .field("registry", &self.registry)
            .field("model", &self.read_model())
            .field("cache", &self.cache.stats())
            .finish()
    }
}

impl DynamicClassifier {
    /// 按配置创建：registry_path 为空时注册表仅驻留内存
    pub fn new(config: ClassifierConfig) -> MfResult<Self> {
        let store: Arc<dyn RegistryStore> = match &config.registry_path {
            Some(path) => Arc::new(JsonFileStore::new(path.clone())),
            None => Arc::new(MemoryStore::new()),
        };
        Self::with_store(config, store)
    }

    /// 使用自定义持久化后端创建
    pub fn with_store(config: ClassifierConfig, store: Arc<dyn RegistryStore>) -> MfResult<Self> {
        config.validate()?;
        let engine = FusionEngine::new(config.fusion.clone())?;
        let templates = match &config.templates_path {
            Some(path) => TemplateCatalog::from_json_file(path)?,
            None => TemplateCatalog::builtin().clone(),
        };
        let registry = CategoryRegistry::open(store, &config.fallback_category, config.seed_defaults);

        log::info!(
            "Dynamic classifier ready | categories={} templates={} batch_size={} cache_capacity={}",
            registry.len(),
            templates.keys().count(),
            config.batch_size,
            config.cache_capacity
        );

        Ok(Self {
            registry: Arc::new(registry),
            templates,
            engine: Arc::new(engine),
            model: RwLock::new(None),
            features: RwLock::new(None),
            label_map_version: AtomicU64::new(0),
            cache: Arc::new(PredictionCache::new(config.cache_capacity)),
            coordinator: BatchCoordinator::new(config.batch_size),
            events: EventBus::new(config.event_capacity),
            stats: StatsCollector::new(),
            config,
        })
    }

    // ===================== 内部工具 =====================

    fn read_model(&self) -> Option<ModelState> {
        self.model.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn read_features(&self) -> Option<FeaturePipeline> {
        self.features.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn next_label_map_version(&self) -> u64 {
        self.label_map_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// 捕获打分上下文：代际 → 快照 → 模型
    fn context(&self) -> ScoringContext {
        let generation = self.cache.generation();
        let snapshot = self.registry.snapshot();
        let model = self.read_model().map(|state| {
            if state.label_map.registry_version() == snapshot.version() {
                return state;
            }
            // 映射表尚未跟上最新快照，本次请求使用局部重建的映射
            log::debug!(
                "Label map registry_version {} behind snapshot {}, rebuilding for request",
                state.label_map.registry_version(),
                snapshot.version()
            );
            let label_map = ModelLabelMap::build(
                state.scorer.id2label().as_ref(),
                &snapshot,
                state.label_map.version(),
            );
            ModelState {
                scorer: state.scorer,
                label_map: Arc::new(label_map),
            }
        });
        ScoringContext {
            generation,
            snapshot,
            model,
            features: self.read_features(),
            engine: Arc::clone(&self.engine),
        }
    }

    /// 分类变更后的统一收尾
    fn after_registry_change(&self, event: ClassifierEvent, reason: &str) {
        let generation = self.cache.clear();
        self.rebuild_label_map();
        self.events.publish(event);
        self.events.publish(ClassifierEvent::CacheCleared {
            generation,
            reason: reason.to_string(),
        });
    }

    /// 按最新快照重建当前模型的标签映射
    fn rebuild_label_map(&self) {
        let mut guard = self.model.write().unwrap_or_else(|e| e.into_inner());
        if let Some(state) = guard.as_mut() {
            let snapshot = self.registry.snapshot();
            let version = self.next_label_map_version();
            state.label_map = Arc::new(ModelLabelMap::build(
                state.scorer.id2label().as_ref(),
                &snapshot,
                version,
            ));
        }
    }

    // ===================== 打分器管理 =====================

    /// 加载/替换模型打分器：重建标签映射并清空缓存
    /// 映射在模型写锁内构建，与变更后的 rebuild_label_map 串行，不会以旧快照覆盖新映射
    pub fn load_scorer(&self, scorer: Arc<dyn MlScorer>) -> ModelInfo {
        let name = scorer.name().to_string();
        let (version, mode) = {
            let mut guard = self.model.write().unwrap_or_else(|e| e.into_inner());
            let snapshot = self.registry.snapshot();
            let version = self.next_label_map_version();
            let label_map = Arc::new(ModelLabelMap::build(
                scorer.id2label().as_ref(),
                &snapshot,
                version,
            ));
            let mode = label_map.mode();
            *guard = Some(ModelState { scorer, label_map });
            (version, mode)
        };
        let generation = self.cache.clear();

        log::info!(
            "Scorer loaded: {} | label_map_version={} mode={:?}",
            name,
            version,
            mode
        );
        self.events.publish(ClassifierEvent::ScorerLoaded {
            name,
            label_map_version: version,
            mode,
        });
        self.events.publish(ClassifierEvent::CacheCleared {
            generation,
            reason: "scorer reloaded".to_string(),
        });
        self.model_info()
    }

    /// 设置/移除特征打分器（启用双打分器集成）
    pub fn set_feature_scorer(&self, pipeline: Option<FeaturePipeline>) {
        let name = pipeline.as_ref().map(|p| p.name().to_string());
        *self.features.write().unwrap_or_else(|e| e.into_inner()) = pipeline;
        let generation = self.cache.clear();

        match &name {
            Some(name) => log::info!("Feature scorer enabled: {}", name),
            None => log::info!("Feature scorer disabled"),
        }
        self.events.publish(ClassifierEvent::FeatureScorerChanged { name });
        self.events.publish(ClassifierEvent::CacheCleared {
            generation,
            reason: "feature scorer changed".to_string(),
        });
    }

    /// 使用内置邮件特征提取器挂载特征打分器
    pub fn use_feature_scorer(&self, scorer: Arc<dyn FeatureScorer>) {
        let pipeline = FeaturePipeline::new(Arc::new(EmailFeatureExtractor::new()), scorer);
        self.set_feature_scorer(Some(pipeline));
    }

    // ===================== 分类管理 =====================

    pub fn add_category(&self, draft: CategoryDraft) -> Result<Category, RegistryError> {
        let category = self.registry.add(draft)?;
        self.after_registry_change(
            ClassifierEvent::CategoryAdded {
                name: category.name.clone(),
                id: category.id,
                version: self.registry.version(),
            },
            "category added",
        );
        Ok(category)
    }

    /// 从模板目录新增分类
    pub fn add_from_template(&self, key: &str) -> Result<Category, RegistryError> {
        let draft = self.templates.get(key)?.clone();
        log::debug!("Adding category from template '{}'", key);
        self.add_category(draft)
    }

    pub fn remove_category(&self, name: &str) -> Result<Category, RegistryError> {
        let category = self.registry.remove(name)?;
        self.after_registry_change(
            ClassifierEvent::CategoryRemoved {
                name: category.name.clone(),
                id: category.id,
                version: self.registry.version(),
            },
            "category removed",
        );
        Ok(category)
    }

    pub fn update_category(
        &self,
        name: &str,
        patch: CategoryPatch,
    ) -> Result<Category, RegistryError> {
        let category = self.registry.update(name, patch)?;
        self.after_registry_change(
            ClassifierEvent::CategoryUpdated {
                name: category.name.clone(),
                id: category.id,
                version: self.registry.version(),
            },
            "category updated",
        );
        Ok(category)
    }

    pub fn get_categories(&self) -> Vec<Category> {
        self.registry.get_all()
    }

    pub fn get_category(&self, name: &str) -> Option<Category> {
        self.registry.get(name)
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.registry.snapshot()
    }

    pub fn template_keys(&self) -> Vec<String> {
        self.templates.keys().map(str::to_string).collect()
    }

    // ===================== 预测 =====================

    /// 单封同步预测
    pub fn predict(&self, email: &EmailInput) -> PredictionResult {
        let ctx = self.context();
        let mut results = self
            .coordinator
            .run(&ctx, &self.cache, std::slice::from_ref(email));
        self.stats.record(&results, false);
        results
            .pop()
            .unwrap_or_else(|| ctx.failure(&ScorerError::Malformed("empty result".to_string())))
    }

    /// 批量同步预测（输出顺序与输入一致）
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(count = emails.len()))
    )]
    pub fn predict_batch(&self, emails: &[EmailInput]) -> Vec<PredictionResult> {
        if emails.is_empty() {
            return Vec::new();
        }
        let ctx = self.context();
        let results = self.coordinator.run(&ctx, &self.cache, emails);
        self.stats.record(&results, true);
        results
    }

    /// 单封异步预测
    pub async fn classify(&self, email: EmailInput) -> PredictionResult {
        let ctx = self.context();
        let mut results = self.dispatch(&ctx, vec![email]).await;
        self.stats.record(&results, false);
        results
            .pop()
            .unwrap_or_else(|| ctx.failure(&ScorerError::Malformed("empty result".to_string())))
    }

    /// 批量异步预测
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(count = emails.len()))
    )]
    pub async fn classify_batch(&self, emails: Vec<EmailInput>) -> Vec<PredictionResult> {
        if emails.is_empty() {
            return Vec::new();
        }
        let ctx = self.context();
        let results = self.dispatch(&ctx, emails).await;
        self.stats.record(&results, true);
        results
    }

    /// 投递到阻塞线程池执行；超时/工作线程异常按打分失败处理
    /// 超时后进行中的打分调用继续跑完，其结果仍可能写入缓存（代际校验保证不会陈旧）
    async fn dispatch(&self, ctx: &ScoringContext, emails: Vec<EmailInput>) -> Vec<PredictionResult> {
        let count = emails.len();
        let timeout = self.config.request_timeout();
        let task_ctx = ctx.clone();
        let cache = Arc::clone(&self.cache);
        let coordinator = self.coordinator;
        let handle =
            tokio::task::spawn_blocking(move || coordinator.run(&task_ctx, &cache, &emails));

        let error = match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(results)) => return results,
            Ok(Err(join_error)) => ScorerError::WorkerAborted(join_error.to_string()),
            Err(_) => ScorerError::Timeout(timeout.as_millis()),
        };
        log::warn!("Async prediction of {} email(s) failed: {}", count, error);
        (0..count).map(|_| ctx.failure(&error)).collect()
    }

    // ===================== 缓存 / 事件 / 统计 =====================

    /// 手动清空预测缓存
    pub fn clear_cache(&self) -> u64 {
        let generation = self.cache.clear();
        log::info!("Prediction cache cleared manually (generation={})", generation);
        self.events.publish(ClassifierEvent::CacheCleared {
            generation,
            reason: "manual".to_string(),
        });
        generation
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ClassifierEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> PerformanceStats {
        self.stats.snapshot(self.cache.stats(), self.registry.len())
    }

    pub fn model_info(&self) -> ModelInfo {
        let model = self.read_model();
        let features = self.read_features();
        let cache = self.cache.stats();
        ModelInfo {
            scorer: model.as_ref().map(|m| m.scorer.name().to_string()),
            feature_scorer: features.as_ref().map(|f| f.name().to_string()),
            label_map_mode: model.as_ref().map(|m| m.label_map.mode()),
            label_map_version: model.as_ref().map_or(0, |m| m.label_map.version()),
            unmatched_labels: model
                .as_ref()
                .map(|m| m.label_map.unmatched_labels().to_vec())
                .unwrap_or_default(),
            category_count: self.registry.len(),
            registry_version: self.registry.version(),
            batch_size: self.coordinator.batch_size(),
            cache_size: cache.size,
            cache_capacity: cache.capacity,
            status: if model.is_some() {
                ModelStatus::Ready
            } else {
                ModelStatus::NotLoaded
            },
        }
    }

    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }
}
