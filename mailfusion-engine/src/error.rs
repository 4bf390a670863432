//! mailfusion-engine 内核错误定义
//! 封装内核层所有核心错误，与业务层错误解耦，基于thiserror实现类型安全处理
use thiserror::Error;

/// 内核核心错误枚举
/// 内核层只做纯计算（策略打分/标签映射/融合决策），不涉及IO
#[derive(Error, Debug)]
pub enum CoreError {
    // ===================== 策略相关错误 =====================
    /// 分类策略解析失败（JSON结构与规则组定义不符）
    #[error("Strategy parse failed: {0}")]
    StrategyParseError(String),

    // ===================== 打分器输出错误 =====================
    /// 模型输出格式错误（行数不一致/空向量/NaN等）
    #[error("Malformed scorer output: {0}")]
    MalformedScores(String),

    // ===================== 融合相关错误 =====================
    /// 融合权重非法（负数或总和为0）
    #[error("Invalid fusion weights: ml={ml}, feature={feature}")]
    InvalidWeights { ml: f64, feature: f64 },

    /// 分类快照中缺失兜底分类（违反"至少存在一个兜底分类"约束）
    #[error("Fallback category missing: {0}")]
    FallbackMissing(String),

    // ===================== 内核基础错误 =====================
    /// 无效输入参数
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// 内核层全局Result类型别名
pub type CoreResult<T> = Result<T, CoreError>;
