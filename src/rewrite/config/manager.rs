//! 简化的配置管理器
//!
//! 提供统一的配置接口，支持文件配置、环境变量和默认值

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;
use crate::rewrite::error::{RewriteError, RewriteResult};

/// 改写配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RewriteConfig {
    // 分析服务
    pub api_url: String,
    pub analyzer_timeout_secs: u64,
    pub temperature: f32,
    pub batch_max_output_tokens: u32,
    pub single_max_output_tokens: u32,
    pub concept_max_output_tokens: u32,
    pub max_concepts: usize,

    // 批次与页面
    pub chunk_size: usize,
    pub block_tags: Vec<String>,
    pub marker_class: String,

    // 缓存配置
    pub cache_enabled: bool,
    pub cache_size: usize,

    // 自动处理
    pub auto_process_debounce_ms: u64,
    pub initial_delay_ms: u64,

    // 设置存储
    pub store_path: String,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            api_url: constants::DEFAULT_API_URL.to_string(),
            analyzer_timeout_secs: constants::DEFAULT_ANALYZER_TIMEOUT.as_secs(),
            temperature: constants::DEFAULT_TEMPERATURE,
            batch_max_output_tokens: constants::DEFAULT_BATCH_MAX_OUTPUT_TOKENS,
            single_max_output_tokens: constants::DEFAULT_SINGLE_MAX_OUTPUT_TOKENS,
            concept_max_output_tokens: constants::DEFAULT_CONCEPT_MAX_OUTPUT_TOKENS,
            max_concepts: constants::DEFAULT_MAX_CONCEPTS,

            chunk_size: constants::CHUNK_SIZE,
            block_tags: constants::BLOCK_TAGS.iter().map(|t| t.to_string()).collect(),
            marker_class: constants::MARKER_CLASS.to_string(),

            cache_enabled: true,
            cache_size: constants::DEFAULT_CACHE_SIZE,

            auto_process_debounce_ms: constants::AUTO_PROCESS_DEBOUNCE.as_millis() as u64,
            initial_delay_ms: constants::INITIAL_PROCESS_DELAY.as_millis() as u64,

            store_path: constants::DEFAULT_STORE_PATH.to_string(),
        }
    }
}

impl RewriteConfig {
    /// 验证配置
    pub fn validate(&self) -> RewriteResult<()> {
        if self.chunk_size == 0 {
            return Err(RewriteError::ConfigError("批次大小不能为0".to_string()));
        }

        if self.block_tags.iter().all(|tag| tag.trim().is_empty()) {
            return Err(RewriteError::ConfigError("段落元素列表不能为空".to_string()));
        }

        if self.marker_class.trim().is_empty() || self.marker_class.contains(char::is_whitespace) {
            return Err(RewriteError::ConfigError(format!(
                "替换标记类名无效: '{}'",
                self.marker_class
            )));
        }

        if self.cache_enabled && self.cache_size == 0 {
            return Err(RewriteError::ConfigError("启用缓存时缓存大小不能为0".to_string()));
        }

        match url::Url::parse(&self.api_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            _ => {
                return Err(RewriteError::ConfigError(format!(
                    "API URL 无效: {}",
                    self.api_url
                )))
            }
        }

        Ok(())
    }

    /// 应用环境变量覆盖，无效取值记录警告后忽略
    pub fn apply_env_overrides(&mut self) {
        use crate::env::{analyzer, cache, storage, EnvVar};

        if let Some(api_url) = analyzer::ApiUrl::override_value() {
            tracing::info!("环境变量覆盖 API URL: {}", api_url);
            self.api_url = api_url;
        }
        if let Some(chunk_size) = analyzer::ChunkSize::override_value() {
            self.chunk_size = chunk_size;
        }
        if let Some(timeout) = analyzer::Timeout::override_value() {
            self.analyzer_timeout_secs = timeout.as_secs();
        }

        if let Some(enabled) = cache::Enabled::override_value() {
            self.cache_enabled = enabled;
        }
        if let Some(size) = cache::Size::override_value() {
            self.cache_size = size;
        }

        if let Some(store_path) = storage::StorePath::override_value() {
            self.store_path = store_path;
        }
    }

    /// 分析请求超时，0 表示不限制
    pub fn analyzer_timeout(&self) -> Option<Duration> {
        (self.analyzer_timeout_secs > 0).then(|| Duration::from_secs(self.analyzer_timeout_secs))
    }

    pub fn auto_process_debounce(&self) -> Duration {
        Duration::from_millis(self.auto_process_debounce_ms)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// 展开 `~` 后的存储路径
    pub fn expanded_store_path(&self) -> String {
        shellexpand::tilde(&self.store_path).into_owned()
    }
}

/// 简化的配置管理器
pub struct ConfigManager {
    config: RewriteConfig,
}

impl ConfigManager {
    /// 创建新的配置管理器
    pub fn new() -> RewriteResult<Self> {
        let mut config = Self::load_config()?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config })
    }

    /// 使用已有配置创建管理器
    pub fn with_config(config: RewriteConfig) -> RewriteResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// 获取配置
    pub fn get_config(&self) -> &RewriteConfig {
        &self.config
    }

    /// 从文件加载配置
    fn load_config() -> RewriteResult<RewriteConfig> {
        // 首先尝试加载 .env 文件
        Self::load_dotenv();

        // 查找配置文件
        for path in constants::CONFIG_PATHS {
            let expanded_path = shellexpand::tilde(path);
            if Path::new(expanded_path.as_ref()).exists() {
                tracing::info!("加载配置文件: {}", expanded_path);
                return Self::load_from_file(&expanded_path);
            }
        }

        tracing::info!("未找到配置文件，使用默认配置");
        Ok(RewriteConfig::default())
    }

    /// 从指定文件加载配置
    pub fn load_from_file(path: &str) -> RewriteResult<RewriteConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RewriteError::ConfigError(format!("读取配置文件失败: {}", e)))?;

        if path.ends_with(".toml") {
            toml::from_str(&content)
                .map_err(|e| RewriteError::ConfigError(format!("解析TOML配置失败: {}", e)))
        } else {
            serde_json::from_str(&content)
                .map_err(|e| RewriteError::ConfigError(format!("解析JSON配置失败: {}", e)))
        }
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        let env_files = [".env.local", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }

    /// 生成示例配置文件
    pub fn generate_example_config(path: &str) -> RewriteResult<()> {
        let config = RewriteConfig::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| RewriteError::ConfigError(format!("序列化配置失败: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| RewriteError::ConfigError(format!("写入配置文件失败: {}", e)))?;

        Ok(())
    }
}
