//! 环境变量
//!
//! 每个变量是一个实现 [`EnvVar`] 的零尺寸类型，名称、默认值、说明与解析规则放在一起，
//! `lexa env-docs` 输出的文档也由同一份定义生成。

use std::env;
use std::time::Duration;

use thiserror::Error;

/// 环境变量取值无效
#[derive(Debug, Clone, Error)]
#[error("Environment variable '{variable}': {message}")]
pub struct EnvError {
    pub variable: &'static str,
    pub message: String,
}

impl EnvError {
    fn new(variable: &'static str, message: impl Into<String>) -> Self {
        Self {
            variable,
            message: message.into(),
        }
    }
}

pub type EnvResult<T> = Result<T, EnvError>;

pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    /// 读取变量；未设置时退回默认值，没有默认值则报错
    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => Self::DEFAULT
                .ok_or_else(|| EnvError::new(Self::NAME, "Required environment variable not set")),
        }
    }

    /// 仅在变量被显式设置时返回值
    fn get_if_set() -> Option<EnvResult<T>> {
        env::var(Self::NAME).ok().map(|value| Self::parse(&value))
    }

    /// 覆盖型读取：未设置返回 `None`，取值无效时记录警告并忽略
    fn override_value() -> Option<T> {
        match Self::get_if_set()? {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("忽略无效的环境变量: {}", e);
                None
            }
        }
    }
}

pub mod core {
    use super::*;

    pub struct LogLevel;
    impl EnvVar<&'static str> for LogLevel {
        const NAME: &'static str = "LEXA_LOG_LEVEL";
        const DEFAULT: Option<&'static str> = Some("info");
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

        fn parse(value: &str) -> EnvResult<&'static str> {
            const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
            let lowered = value.trim().to_ascii_lowercase();
            LEVELS
                .iter()
                .copied()
                .find(|level| *level == lowered)
                .ok_or_else(|| {
                    EnvError::new(
                        Self::NAME,
                        format!("Invalid log level '{}'. Use: {}", value, LEVELS.join(", ")),
                    )
                })
        }
    }

    /// 任何非空值都表示禁用颜色
    pub struct NoColor;
    impl EnvVar<bool> for NoColor {
        const NAME: &'static str = "NO_COLOR";
        const DEFAULT: Option<bool> = Some(false);
        const DESCRIPTION: &'static str = "Disable colored output when set to any value";

        fn parse(value: &str) -> EnvResult<bool> {
            Ok(!value.is_empty())
        }
    }
}

/// 分析服务
pub mod analyzer {
    use super::*;

    /// 优先于存储中的密钥
    pub struct ApiKey;
    impl EnvVar<String> for ApiKey {
        const NAME: &'static str = "LEXA_API_KEY";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Language model API key (overrides the stored key)";

        fn parse(value: &str) -> EnvResult<String> {
            non_empty(value, Self::NAME, "API key must not be empty")
        }
    }

    pub struct ApiUrl;
    impl EnvVar<String> for ApiUrl {
        const NAME: &'static str = "LEXA_API_URL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Language model generateContent endpoint URL";

        fn parse(value: &str) -> EnvResult<String> {
            let parsed = url::Url::parse(value.trim())
                .map_err(|e| EnvError::new(Self::NAME, format!("Invalid URL: {}", e)))?;
            match parsed.scheme() {
                "http" | "https" => Ok(parsed.to_string()),
                other => Err(EnvError::new(
                    Self::NAME,
                    format!("Unsupported scheme '{}', expected http or https", other),
                )),
            }
        }
    }

    pub struct ChunkSize;
    impl EnvVar<usize> for ChunkSize {
        const NAME: &'static str = "LEXA_CHUNK_SIZE";
        const DEFAULT: Option<usize> = Some(5);
        const DESCRIPTION: &'static str = "Paragraphs per analysis request";

        fn parse(value: &str) -> EnvResult<usize> {
            bounded_usize(value, Self::NAME, 1..=50)
        }
    }

    /// 0 表示不限制
    pub struct Timeout;
    impl EnvVar<Duration> for Timeout {
        const NAME: &'static str = "LEXA_ANALYZER_TIMEOUT";
        const DEFAULT: Option<Duration> = Some(Duration::from_secs(60));
        const DESCRIPTION: &'static str = "Analysis request timeout in seconds (0 disables)";

        fn parse(value: &str) -> EnvResult<Duration> {
            bounded_usize(value, Self::NAME, 0..=600).map(|secs| Duration::from_secs(secs as u64))
        }
    }
}

pub mod cache {
    use super::*;

    pub struct Enabled;
    impl EnvVar<bool> for Enabled {
        const NAME: &'static str = "LEXA_CACHE_ENABLED";
        const DEFAULT: Option<bool> = Some(true);
        const DESCRIPTION: &'static str = "Cache analysis results in memory";

        fn parse(value: &str) -> EnvResult<bool> {
            match value.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(EnvError::new(
                    Self::NAME,
                    format!("Invalid boolean '{}'. Use true/false, 1/0, yes/no, on/off", value),
                )),
            }
        }
    }

    pub struct Size;
    impl EnvVar<usize> for Size {
        const NAME: &'static str = "LEXA_CACHE_SIZE";
        const DEFAULT: Option<usize> = Some(100);
        const DESCRIPTION: &'static str = "Analysis cache capacity (entries)";

        fn parse(value: &str) -> EnvResult<usize> {
            bounded_usize(value, Self::NAME, 1..=100_000)
        }
    }
}

pub mod storage {
    use super::*;

    pub struct StorePath;
    impl EnvVar<String> for StorePath {
        const NAME: &'static str = "LEXA_STORE_PATH";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Path of the JSON settings store";

        fn parse(value: &str) -> EnvResult<String> {
            non_empty(value, Self::NAME, "Store path must not be empty")
        }
    }
}

fn non_empty(value: &str, name: &'static str, message: &str) -> EnvResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EnvError::new(name, message));
    }
    Ok(trimmed.to_string())
}

fn bounded_usize(
    value: &str,
    name: &'static str,
    range: std::ops::RangeInclusive<usize>,
) -> EnvResult<usize> {
    let num: usize = value
        .trim()
        .parse()
        .map_err(|_| EnvError::new(name, format!("'{}' is not a non-negative integer", value)))?;
    if !range.contains(&num) {
        return Err(EnvError::new(
            name,
            format!("Value must be between {} and {}", range.start(), range.end()),
        ));
    }
    Ok(num)
}

/// 文档中的一行
fn doc_line<T: std::fmt::Debug, V: EnvVar<T>>() -> String {
    match V::DEFAULT {
        Some(default) => format!("- `{}`: {} (default: {:?})\n", V::NAME, V::DESCRIPTION, default),
        None => format!("- `{}`: {}\n", V::NAME, V::DESCRIPTION),
    }
}

/// 生成环境变量文档
pub fn generate_env_docs() -> String {
    let sections = [
        (
            "Logging",
            vec![doc_line::<&str, core::LogLevel>(), doc_line::<bool, core::NoColor>()],
        ),
        (
            "Analyzer",
            vec![
                doc_line::<String, analyzer::ApiKey>(),
                doc_line::<String, analyzer::ApiUrl>(),
                doc_line::<usize, analyzer::ChunkSize>(),
                doc_line::<Duration, analyzer::Timeout>(),
            ],
        ),
        (
            "Cache",
            vec![doc_line::<bool, cache::Enabled>(), doc_line::<usize, cache::Size>()],
        ),
        ("Storage", vec![doc_line::<String, storage::StorePath>()]),
    ];

    let mut docs = String::from("# Lexa Environment Variables\n");
    for (title, lines) in sections {
        docs.push_str(&format!("\n## {}\n\n", title));
        for line in lines {
            docs.push_str(&line);
        }
    }
    docs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(core::LogLevel::parse("DEBUG").unwrap(), "debug");
        assert!(core::LogLevel::parse("verbose").is_err());
    }

    #[test]
    fn test_boolean_parsing() {
        assert!(cache::Enabled::parse("YES").unwrap());
        assert!(!cache::Enabled::parse("off").unwrap());
        assert!(cache::Enabled::parse("maybe").is_err());
    }

    #[test]
    fn test_api_url_requires_http_scheme() {
        assert!(analyzer::ApiUrl::parse("https://generativelanguage.googleapis.com").is_ok());
        assert!(analyzer::ApiUrl::parse("ftp://example.com").is_err());
        assert!(analyzer::ApiUrl::parse("not a url").is_err());
    }

    #[test]
    fn test_numeric_bounds() {
        assert_eq!(analyzer::ChunkSize::parse("5").unwrap(), 5);
        assert!(analyzer::ChunkSize::parse("0").is_err());
        assert!(analyzer::ChunkSize::parse("abc").is_err());
        assert_eq!(analyzer::Timeout::parse("0").unwrap(), Duration::ZERO);
        assert!(analyzer::Timeout::parse("601").is_err());
    }

    #[test]
    fn test_env_docs_lists_variables() {
        let docs = generate_env_docs();
        assert!(docs.contains("## Analyzer"));
        assert!(docs.contains("`LEXA_API_KEY`: Language model API key"));
        assert!(docs.contains("`LEXA_CHUNK_SIZE`: Paragraphs per analysis request (default: 5)"));
    }
}
