//! 键值设置存储
//!
//! 提供内存和 JSON 文件两种后端，写入后通过广播通道通知订阅者。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, RwLock};

use crate::rewrite::error::{RewriteError, RewriteResult};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// 存储变更通知
#[derive(Debug, Clone, PartialEq)]
pub struct StoreChange {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// 设置存储接口
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> RewriteResult<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> RewriteResult<()>;

    async fn remove(&self, key: &str) -> RewriteResult<()>;

    /// 订阅后续的变更
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// 带变更广播的键值表
struct Entries {
    values: RwLock<Map<String, Value>>,
    changes: broadcast::Sender<StoreChange>,
}

impl Entries {
    fn new(values: Map<String, Value>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            values: RwLock::new(values),
            changes,
        }
    }

    async fn get(&self, key: &str) -> Option<Value> {
        self.values.read().await.get(key).cloned()
    }

    /// 更新键值并返回更新后的快照，值未变化时返回 `None`
    async fn update(&self, key: &str, value: Option<Value>) -> Option<Map<String, Value>> {
        let mut values = self.values.write().await;
        let old_value = values.get(key).cloned();
        if old_value == value {
            return None;
        }

        match &value {
            Some(v) => {
                values.insert(key.to_string(), v.clone());
            }
            None => {
                values.remove(key);
            }
        }
        let snapshot = values.clone();
        drop(values);

        // 没有订阅者时发送失败是正常情况
        let _ = self.changes.send(StoreChange {
            key: key.to_string(),
            old_value,
            new_value: value,
        });
        Some(snapshot)
    }
}

/// 内存存储
pub struct MemoryStore {
    entries: Entries,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Entries::new(Map::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get(&self, key: &str) -> RewriteResult<Option<Value>> {
        Ok(self.entries.get(key).await)
    }

    async fn set(&self, key: &str, value: Value) -> RewriteResult<()> {
        self.entries.update(key, Some(value)).await;
        Ok(())
    }

    async fn remove(&self, key: &str) -> RewriteResult<()> {
        self.entries.update(key, None).await;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.entries.changes.subscribe()
    }
}

/// JSON 文件存储
///
/// 每次写入都把完整对象写到临时文件再重命名；写入按顺序串行执行。
pub struct FileStore {
    path: PathBuf,
    entries: Entries,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    /// 打开存储文件，不存在时以空对象开始
    pub async fn open(path: impl AsRef<Path>) -> RewriteResult<Self> {
        let path = path.as_ref().to_path_buf();

        let values = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => Map::new(),
            Ok(content) => match serde_json::from_str::<Value>(&content)? {
                Value::Object(map) => map,
                _ => {
                    return Err(RewriteError::StorageError(format!(
                        "存储文件不是 JSON 对象: {}",
                        path.display()
                    )))
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("存储文件不存在，将在首次写入时创建: {}", path.display());
                Map::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            entries: Entries::new(values),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, snapshot: &Map<String, Value>) -> RewriteResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(snapshot)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| RewriteError::StorageError(format!("写入存储文件失败: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for FileStore {
    async fn get(&self, key: &str) -> RewriteResult<Option<Value>> {
        Ok(self.entries.get(key).await)
    }

    async fn set(&self, key: &str, value: Value) -> RewriteResult<()> {
        let _guard = self.write_lock.lock().await;
        if let Some(snapshot) = self.entries.update(key, Some(value)).await {
            self.persist(&snapshot).await?;
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> RewriteResult<()> {
        let _guard = self.write_lock.lock().await;
        if let Some(snapshot) = self.entries.update(key, None).await {
            self.persist(&snapshot).await?;
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.entries.changes.subscribe()
    }
}
