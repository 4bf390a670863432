//! 动态分类器：打分上下文、批量协调、变更事件与运行统计
pub mod batch;
pub mod context;
pub mod dynamic;
pub mod events;
pub mod stats;

pub use batch::BatchCoordinator;
pub use context::{ModelState, ScoringContext};
pub use dynamic::{CategoryOperation, DynamicClassifier};
pub use events::{ClassifierEvent, EventBus};
pub use stats::{ModelInfo, ModelStatus, PerformanceStats, StatsCollector};
