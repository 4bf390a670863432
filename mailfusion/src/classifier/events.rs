//! 分类器变更事件
//! 每次分类变更/打分器重载后广播，订阅方（前端推送、审计日志等）自行消费

use mailfusion_engine::LabelMapMode;
use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClassifierEvent {
    CategoryAdded { name: String, id: u32, version: u64 },
    CategoryRemoved { name: String, id: u32, version: u64 },
    CategoryUpdated { name: String, id: u32, version: u64 },
    ScorerLoaded {
        name: String,
        label_map_version: u64,
        mode: LabelMapMode,
    },
    FeatureScorerChanged { name: Option<String> },
    CacheCleared { generation: u64, reason: String },
}

/// 事件广播器
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ClassifierEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClassifierEvent> {
        self.sender.subscribe()
    }

    /// 广播事件；无订阅者时直接丢弃
    pub fn publish(&self, event: ClassifierEvent) {
        if let Err(broadcast::error::SendError(event)) = self.sender.send(event) {
            log::trace!("No event subscribers, dropped {:?}", event);
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
