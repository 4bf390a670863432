//! 批量预测协调器
//! 特性：
//! 1. 先查缓存，命中项不进入打分器
//! 2. 未命中项按固定大小分块，每块调用一次打分器；单块失败不影响其他块
//! 3. 输出顺序与输入顺序严格一致
//! 4. 成功结果携带上下文代际写回缓存

use mailfusion_engine::{EmailInput, PredictionResult};

use super::context::ScoringContext;
use crate::cache::{CacheInsert, PredictionCache};
use crate::error::ScorerError;

#[derive(Debug, Clone, Copy)]
pub struct BatchCoordinator {
    batch_size: usize,
}

impl BatchCoordinator {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// 执行批量预测
    pub fn run(
        &self,
        ctx: &ScoringContext,
        cache: &PredictionCache,
        emails: &[EmailInput],
    ) -> Vec<PredictionResult> {
        let keys: Vec<String> = emails.iter().map(EmailInput::cache_key).collect();
        let mut results: Vec<Option<PredictionResult>> =
            keys.iter().map(|key| cache.get(key)).collect();

        let pending: Vec<usize> = results
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.is_none().then_some(idx))
            .collect();
        log::debug!(
            "[Batch] {} email(s) | cache hits={} pending={} chunk_size={}",
            emails.len(),
            emails.len() - pending.len(),
            pending.len(),
            self.batch_size
        );

        let mut stored = 0usize;
        for (chunk_no, indices) in pending.chunks(self.batch_size).enumerate() {
            let chunk: Vec<EmailInput> = indices.iter().map(|&i| emails[i].clone()).collect();
            let scored = ctx.score_chunk(&chunk);
            let failed = scored.iter().filter(|r| r.is_failure()).count();
            if failed > 0 {
                log::warn!(
                    "[Batch] chunk {} finished with {}/{} failed item(s)",
                    chunk_no,
                    failed,
                    indices.len()
                );
            }

            for (&idx, result) in indices.iter().zip(scored) {
                if cache.insert(&keys[idx], ctx.generation, &result) == CacheInsert::Stored {
                    stored += 1;
                }
                results[idx] = Some(result);
            }
        }
        if stored > 0 {
            log::trace!("[Batch] cached {} new result(s)", stored);
        }

        results
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    ctx.failure(&ScorerError::Malformed("missing batch result".to_string()))
                })
            })
            .collect()
    }
}

impl Default for BatchCoordinator {
    fn default() -> Self {
        Self::new(crate::config::classifier::DEFAULT_BATCH_SIZE)
    }
}
