//! 类型化的设置访问

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::broadcast;

use super::store::{SettingsStore, StoreChange};
use crate::env::{analyzer, EnvVar};
use crate::rewrite::config::constants;
use crate::rewrite::error::{RewriteError, RewriteResult};
use crate::rewrite::rules::RuleList;

/// 设置存储之上的类型化访问器
#[derive(Clone)]
pub struct Settings {
    store: Arc<dyn SettingsStore>,
}

impl Settings {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn SettingsStore> {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.store.subscribe()
    }

    /// API 凭据；环境变量优先于存储值
    pub async fn api_key(&self) -> RewriteResult<Option<String>> {
        if let Some(key) = analyzer::ApiKey::override_value() {
            return Ok(Some(key));
        }

        Ok(self
            .store
            .get(constants::KEY_API_KEY)
            .await?
            .and_then(|value| value.as_str().map(str::trim).map(str::to_string))
            .filter(|key| !key.is_empty()))
    }

    /// 获取 API 凭据，缺失时返回配置错误
    pub async fn require_api_key(&self) -> RewriteResult<String> {
        self.api_key()
            .await?
            .ok_or_else(|| RewriteError::ConfigError("API key not set".to_string()))
    }

    pub async fn set_api_key(&self, key: &str) -> RewriteResult<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(RewriteError::InvalidInput("API key 不能为空".to_string()));
        }
        self.store.set(constants::KEY_API_KEY, Value::from(key)).await
    }

    /// 读取规则列表，缺失时返回空列表
    pub async fn rules(&self) -> RewriteResult<RuleList> {
        match self.store.get(constants::KEY_RULES).await? {
            None | Some(Value::Null) => Ok(RuleList::new()),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| RewriteError::StorageError(format!("规则数据无效: {}", e))),
        }
    }

    /// 验证后保存规则列表
    pub async fn save_rules(&self, rules: &RuleList) -> RewriteResult<()> {
        rules.validate()?;
        self.store
            .set(constants::KEY_RULES, serde_json::to_value(rules)?)
            .await
    }

    pub async fn auto_process(&self) -> RewriteResult<bool> {
        Ok(self
            .store
            .get(constants::KEY_AUTO_PROCESS)
            .await?
            .and_then(|value| value.as_bool())
            .unwrap_or(false))
    }

    pub async fn set_auto_process(&self, enabled: bool) -> RewriteResult<()> {
        self.store
            .set(constants::KEY_AUTO_PROCESS, Value::Bool(enabled))
            .await
    }

    async fn processed_tabs(&self) -> RewriteResult<Map<String, Value>> {
        Ok(match self.store.get(constants::KEY_PROCESSED_TABS).await? {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        })
    }

    /// 标签页是否已处理过
    pub async fn is_tab_processed(&self, tab_id: &str) -> RewriteResult<bool> {
        Ok(self
            .processed_tabs()
            .await?
            .get(tab_id)
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    pub async fn set_tab_processed(&self, tab_id: &str) -> RewriteResult<()> {
        let mut tabs = self.processed_tabs().await?;
        tabs.insert(tab_id.to_string(), Value::Bool(true));
        self.store
            .set(constants::KEY_PROCESSED_TABS, Value::Object(tabs))
            .await
    }

    pub async fn clear_tab_processed(&self, tab_id: &str) -> RewriteResult<()> {
        let mut tabs = self.processed_tabs().await?;
        if tabs.remove(tab_id).is_some() {
            self.store
                .set(constants::KEY_PROCESSED_TABS, Value::Object(tabs))
                .await?;
        }
        Ok(())
    }
}
