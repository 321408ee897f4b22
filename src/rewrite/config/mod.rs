//! 改写配置管理模块
//!
//! 提供简化的配置管理，支持环境变量、配置文件和默认值

pub mod manager;

// 重新导出主要类型
pub use manager::{ConfigManager, RewriteConfig};

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 批次处理相关
    pub const CHUNK_SIZE: usize = 5;

    // 候选过滤相关
    pub const MIN_TOKEN_LEN: usize = 3;
    pub const FALLBACK_PREFIX_LEN: usize = 4;

    // 默认API设置
    pub const DEFAULT_API_URL: &str =
        "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";
    pub const DEFAULT_TEMPERATURE: f32 = 0.1;
    pub const DEFAULT_BATCH_MAX_OUTPUT_TOKENS: u32 = 2048;
    pub const DEFAULT_SINGLE_MAX_OUTPUT_TOKENS: u32 = 1024;
    pub const DEFAULT_CONCEPT_MAX_OUTPUT_TOKENS: u32 = 512;
    pub const DEFAULT_MAX_CONCEPTS: usize = 10;
    pub const DEFAULT_ANALYZER_TIMEOUT: Duration = Duration::from_secs(60);

    // 缓存设置
    pub const DEFAULT_CACHE_SIZE: usize = 100;

    // 自动处理
    pub const AUTO_PROCESS_DEBOUNCE: Duration = Duration::from_millis(2000);
    pub const INITIAL_PROCESS_DELAY: Duration = Duration::from_millis(1000);

    // 替换标记
    pub const MARKER_CLASS: &str = "lexa-replacement";
    pub const ORIGINAL_ATTR: &str = "data-lexa-original";
    pub const STYLE_ELEMENT_ID: &str = "lexa-styles";

    // 段落级元素
    pub const BLOCK_TAGS: &[&str] = &["p"];

    // 不参与布局的元素
    pub const SKIP_ELEMENTS: &[&str] = &["head", "script", "style", "template", "noscript"];

    // 不允许改写的页面协议
    pub const RESTRICTED_SCHEMES: &[&str] = &[
        "chrome",
        "chrome-extension",
        "about",
        "edge",
        "moz-extension",
        "safari-extension",
    ];

    // 设置存储键
    pub const KEY_API_KEY: &str = "apiKey";
    pub const KEY_RULES: &str = "replacements";
    pub const KEY_AUTO_PROCESS: &str = "autoProcess";
    pub const KEY_PROCESSED_TABS: &str = "processedTabs";

    pub const DEFAULT_STORE_PATH: &str = "~/.config/lexa/store.json";

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "lexa.toml",
        ".lexa.toml",
        "lexa.json",
        "~/.config/lexa/config.toml",
        "/etc/lexa/config.toml",
    ];
}

/// 便利函数
pub fn config_file_exists() -> bool {
    constants::CONFIG_PATHS
        .iter()
        .any(|path| std::path::Path::new(shellexpand::tilde(path).as_ref()).exists())
}

/// 加载配置，失败时回退到默认配置
pub fn load_rewrite_config() -> RewriteConfig {
    match ConfigManager::new() {
        Ok(manager) => manager.get_config().clone(),
        Err(e) => {
            tracing::warn!("配置加载失败，使用默认配置: {}", e);
            RewriteConfig::default()
        }
    }
}
