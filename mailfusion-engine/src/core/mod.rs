mod category;
mod email;
mod prediction;
mod snapshot;
mod strategy;

// 导出常用项
pub use category::{
    fallback_category, get_default_categories, Category, CategoryPatch, DEFAULT_COLOR,
    FALLBACK_CATEGORY,
};
pub use email::{Attachment, EmailInput, EMPTY_EMAIL_TEXT, TEXT_SEPARATOR};
pub use prediction::PredictionResult;
pub use snapshot::RegistrySnapshot;
pub use strategy::{
    BodyAnalysis, ClassificationStrategy, EntityPatterns, HeaderAnalysis, LengthPattern,
    MetadataAnalysis, TagThresholds, TagsAnalysis, DEFAULT_CONFIDENCE_THRESHOLD,
};
