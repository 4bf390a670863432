pub mod matcher;
pub mod strategy_scorer;

pub use matcher::Matcher;
pub use strategy_scorer::{EmailView, GroupScore, StrategyCandidate, StrategyScore, StrategyScorer};
