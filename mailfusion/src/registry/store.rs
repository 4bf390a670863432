//! 注册表持久化后端
//! 核心职责：
//! 1. 定义统一的加载/保存接口，注册表不关心具体后端
//! 2. JSON文件后端：临时文件 + rename 原子替换，读方不会看到写一半的文件
//! 3. 内存后端：测试与无持久化场景

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use once_cell::sync::Lazy;
use regex::Regex;

use super::document::RegistryDocument;
use crate::error::{MailFusionError, MfResult};

/// 持久化接口
pub trait RegistryStore: Send + Sync + std::fmt::Debug {
    /// 读取文档；后端中不存在文档时返回 Ok(None)
    fn load(&self) -> MfResult<Option<RegistryDocument>>;
    /// 整体写入文档
    fn save(&self, document: &RegistryDocument) -> MfResult<()>;
    /// 描述后端位置（日志用）
    fn describe(&self) -> String;
    /// 文档无法解析时，从残留内容中尽量恢复id高水位
    /// 返回值为新分配id的下界；无法恢复时为None
    fn recover_id_floor(&self) -> Option<u32> {
        None
    }
}

/// 损坏文档中残留的 "next_id": N 与 "id": N 片段
static ID_FIELD_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#""(next_id|id)"\s*:\s*(\d+)"#).ok());

/// JSON文件后端
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl RegistryStore for JsonFileStore {
    fn load(&self) -> MfResult<Option<RegistryDocument>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path)?;
        let document: RegistryDocument = serde_json::from_slice(&data)?;
        Ok(Some(document))
    }

    fn save(&self, document: &RegistryDocument) -> MfResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(document)?;
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path).map_err(|e| {
            MailFusionError::Persistence(format!(
                "rename {} -> {} failed: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }

    fn recover_id_floor(&self) -> Option<u32> {
        let data = fs::read(&self.path).ok()?;
        let text = String::from_utf8_lossy(&data);
        let re = ID_FIELD_RE.as_ref()?;
        re.captures_iter(&text)
            .filter_map(|caps| {
                let value: u32 = caps.get(2)?.as_str().parse().ok()?;
                match caps.get(1)?.as_str() {
                    "next_id" => Some(value),
                    _ => Some(value.saturating_add(1)),
                }
            })
            .max()
    }
}

/// 内存后端
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: Mutex<Option<RegistryDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置文档
    pub fn with_document(document: RegistryDocument) -> Self {
        Self {
            document: Mutex::new(Some(document)),
        }
    }

    /// 最近一次保存的文档
    pub fn document(&self) -> Option<RegistryDocument> {
        self.document
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl RegistryStore for MemoryStore {
    fn load(&self) -> MfResult<Option<RegistryDocument>> {
        Ok(self.document())
    }

    fn save(&self, document: &RegistryDocument) -> MfResult<()> {
        *self.document.lock().unwrap_or_else(|e| e.into_inner()) = Some(document.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
