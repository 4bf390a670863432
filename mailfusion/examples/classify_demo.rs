//! Dynamic category classification demonstration for mailfusion
//! mailfusion 动态分类演示程序
//! 功能说明：
//! 1. 演示注册表持久化、模板新增分类、打分器加载
//! 2. 展示规则策略覆盖模型结果的融合流程
//! 3. 输出结构化JSON结果、模型信息与性能统计
//!
//! 运行命令：
//! cargo run --example classify_demo

use env_logger::{Builder, Env, Target};
use mailfusion::{
    CategoryOperation, ClassifierEvent, CustomConfigBuilder, DynamicClassifier, EmailInput,
    MlScorer, ScorerError,
};
use serde_json::to_string_pretty;
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;
use std::time::Instant;

/// 模型标签及其关键词
const LABELS: [(&str, &[&str]); 5] = [
    ("Academic", &["lecture", "course", "exam"]),
    ("Promotions", &["sale", "discount", "offer"]),
    ("Placement", &["interview", "hiring", "job"]),
    ("Spam", &["winner", "prize", "lottery"]),
    ("Other", &[]),
];

/// 关键词计数的玩具模型：按标签关键词命中数输出概率
struct KeywordModel;

impl MlScorer for KeywordModel {
    fn name(&self) -> &str {
        "keyword-model"
    }

    fn id2label(&self) -> Option<BTreeMap<usize, String>> {
        Some(
            LABELS
                .iter()
                .enumerate()
                .map(|(idx, (label, _))| (idx, label.to_string()))
                .collect(),
        )
    }

    fn score_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, ScorerError> {
        Ok(texts
            .iter()
            .map(|text| {
                let text = text.to_lowercase();
                let hits: Vec<f64> = LABELS
                    .iter()
                    .map(|(_, words)| 1.0 + words.iter().filter(|w| text.contains(*w)).count() as f64)
                    .collect();
                let total: f64 = hits.iter().sum();
                hits.iter().map(|h| h / total).collect()
            })
            .collect())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // ========== 1. 日志系统初始化 ==========
    Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Stdout)
        .init();

    // ========== 2. 初始化分类器（注册表写入临时目录） ==========
    let workdir = std::env::temp_dir().join("mailfusion-demo");
    let config = CustomConfigBuilder::new()
        .registry_path(workdir.join("categories.json"))
        .batch_size(8)
        .build()?;
    let classifier = DynamicClassifier::new(config)?;
    let mut events = classifier.subscribe();
    println!("✅ 分类器初始化完成 | 分类数: {}", classifier.get_categories().len());

    // ========== 3. 模板新增分类 + 加载打分器 ==========
    let op: CategoryOperation = classifier.add_from_template("invoices").into();
    println!("📁 模板新增分类: {}", to_string_pretty(&op)?);
    let info = classifier.load_scorer(Arc::new(KeywordModel));
    println!("🧠 模型信息: {}", to_string_pretty(&info)?);

    while let Ok(event) = events.try_recv() {
        if let ClassifierEvent::CacheCleared { generation, reason } = &event {
            println!("🔔 缓存清空 | generation={} reason={}", generation, reason);
        } else {
            println!("🔔 事件: {:?}", event);
        }
    }

    // ========== 4. 批量预测（含耗时统计） ==========
    let emails = vec![
        EmailInput::new("Invoice #2024-118", "Please complete the payment by Friday"),
        EmailInput::new("Weekend sale", "Get a 40% discount on every offer"),
        EmailInput::new("Interview schedule", "We are hiring and would like to invite you"),
        EmailInput::new("", ""),
    ];
    let start = Instant::now();
    let results = classifier.classify_batch(emails).await;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    println!("\n======================================= 预测结果 =======================================");
    println!("✅ 批量预测完成 | 总耗时: {:.3} 毫秒", elapsed_ms);
    for result in &results {
        println!("  → {}", result);
    }
    println!("📊 结构化JSON:\n{}", to_string_pretty(&results)?);

    // ========== 5. 运行统计 ==========
    println!("📈 性能统计:\n{}", to_string_pretty(&classifier.stats())?);

    Ok(())
}
