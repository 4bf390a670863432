//! tracing 日志桥接演示
//! 功能说明：
//! 1. 安装 tracing 订阅器并将 log 记录桥接过去
//! 2. 展示无打分器时的兜底结果与手动清空缓存
//!
//! 运行命令：
//! RUST_LOG=debug cargo run --example tracing_demo --features="tracing"

use mailfusion::{init_tracing_bridge, ClassifierConfig, DynamicClassifier, EmailInput};
use std::error::Error;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error>> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    init_tracing_bridge()?;

    let classifier = DynamicClassifier::new(ClassifierConfig::default())?;
    let result = classifier.predict(&EmailInput::new("Hello", "No scorer has been loaded yet"));
    println!("{}", result);

    let generation = classifier.clear_cache();
    println!("cache generation -> {}", generation);
    println!("{}", serde_json::to_string_pretty(&classifier.model_info())?);
    Ok(())
}
