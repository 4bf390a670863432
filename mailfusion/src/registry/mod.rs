//! 分类注册表：增删改查 + 持久化 + 模板
pub mod category_registry;
pub mod document;
pub mod draft;
pub mod store;
pub mod templates;

pub use category_registry::CategoryRegistry;
pub use document::{RegistryDocument, RegistryMetadata};
pub use draft::CategoryDraft;
pub use store::{JsonFileStore, MemoryStore, RegistryStore};
pub use templates::TemplateCatalog;
