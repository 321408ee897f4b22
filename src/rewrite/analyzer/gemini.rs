//! Gemini 分析服务客户端

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde_json::{json, Value};

use super::prompts;
use super::{AnalysisResult, Analyzer, ConceptExtractor, PhrasePair};
use crate::rewrite::config::RewriteConfig;
use crate::rewrite::error::{RewriteError, RewriteResult};
use crate::rewrite::rules::ReplacementRule;
use crate::rewrite::storage::{AnalysisCache, Settings};

/// 基于 `generateContent` 接口的分析服务
pub struct GeminiAnalyzer {
    client: Client,
    settings: Settings,
    api_url: String,
    temperature: f32,
    batch_max_output_tokens: u32,
    single_max_output_tokens: u32,
    concept_max_output_tokens: u32,
    max_concepts: usize,
    cache: Option<AnalysisCache>,
}

impl GeminiAnalyzer {
    /// 创建客户端；凭据在每次请求时从设置中读取
    pub fn new(config: &RewriteConfig, settings: Settings) -> RewriteResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.analyzer_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| RewriteError::ConfigError(format!("创建HTTP客户端失败: {}", e)))?;

        let cache = config
            .cache_enabled
            .then(|| AnalysisCache::new(config.cache_size));

        Ok(Self {
            client,
            settings,
            api_url: config.api_url.clone(),
            temperature: config.temperature,
            batch_max_output_tokens: config.batch_max_output_tokens,
            single_max_output_tokens: config.single_max_output_tokens,
            concept_max_output_tokens: config.concept_max_output_tokens,
            max_concepts: config.max_concepts,
            cache,
        })
    }

    pub fn cache(&self) -> Option<&AnalysisCache> {
        self.cache.as_ref()
    }

    /// 发送提示词并返回模型生成的文本
    async fn generate(&self, prompt: &str, max_output_tokens: u32) -> RewriteResult<String> {
        let api_key = self.settings.require_api_key().await?;
        let body = request_body(prompt, self.temperature, max_output_tokens);

        let response = self
            .client
            .post(&self.api_url)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-goog-api-key", api_key)
            .body(body.to_string())
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RewriteError::RateLimitExceeded);
        }
        if !status.is_success() {
            return Err(RewriteError::ServiceError(format!(
                "API request failed: {}",
                status.as_u16()
            )));
        }

        let payload: Value = serde_json::from_str(&response.text().await?)
            .map_err(|e| RewriteError::ParseError(format!("响应不是有效JSON: {}", e)))?;
        candidate_text(&payload)
    }
}

fn request_body(prompt: &str, temperature: f32, max_output_tokens: u32) -> Value {
    json!({
        "contents": [{ "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "temperature": temperature,
            "topK": 1,
            "topP": 1,
            "maxOutputTokens": max_output_tokens,
            "responseMimeType": "application/json"
        }
    })
}

/// 读取 `candidates[0].content.parts[0].text`
pub fn candidate_text(payload: &Value) -> RewriteResult<String> {
    payload
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RewriteError::ParseError("Invalid API response structure".to_string()))
}

fn parse_json_text(text: &str) -> RewriteResult<Value> {
    serde_json::from_str(text.trim())
        .map_err(|_| RewriteError::ParseError("Invalid JSON response from API".to_string()))
}

/// 解析批量分析响应文本
pub fn parse_batch_payload(text: &str) -> RewriteResult<AnalysisResult> {
    Ok(AnalysisResult::from_json(&parse_json_text(text)?))
}

/// 解析单规则响应文本
pub fn parse_single_payload(text: &str) -> RewriteResult<Vec<PhrasePair>> {
    let payload = parse_json_text(text)?;
    let replacements = payload
        .get("replacements")
        .and_then(Value::as_array)
        .ok_or_else(|| RewriteError::ParseError("响应缺少 replacements 数组".to_string()))?;

    Ok(replacements
        .iter()
        .filter_map(|item| {
            let original = item.get("original_phrase")?.as_str()?;
            let replacement = item.get("replacement_form")?.as_str()?;
            (!original.is_empty() && !replacement.is_empty())
                .then(|| PhrasePair::new(original, replacement))
        })
        .collect())
}

/// 解析概念列表
///
/// 先去掉整体包裹的引号，再按 JSON 数组解析；无法解析时把整段文本当作一个概念，
/// 结果为空时回退到替换词本身。
pub fn parse_concepts(text: &str, word: &str, max_concepts: usize) -> Vec<String> {
    let mut raw = text.trim().to_string();
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        raw = raw[1..raw.len() - 1].replace("\\\"", "\"");
    }

    let mut concepts: Vec<String> = match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect(),
        Ok(Value::String(single)) if !single.trim().is_empty() => vec![single.trim().to_string()],
        Ok(_) => Vec::new(),
        Err(_) => {
            tracing::warn!("概念列表解析失败，按单个概念处理: {}", raw);
            let fallback = raw.trim();
            if fallback.is_empty() {
                Vec::new()
            } else {
                vec![fallback.to_string()]
            }
        }
    };

    if concepts.is_empty() {
        tracing::warn!("未提取到概念，使用替换词本身: {}", word);
        concepts.push(word.to_string());
    }
    concepts.truncate(max_concepts.max(1));
    concepts
}

#[async_trait]
impl Analyzer for GeminiAnalyzer {
    async fn check_ready(&self) -> RewriteResult<()> {
        self.settings.require_api_key().await.map(|_| ())
    }

    async fn analyze_batch(
        &self,
        blocks: &[String],
        rules: &[ReplacementRule],
    ) -> RewriteResult<AnalysisResult> {
        let cache_key = AnalysisCache::generate_key(blocks, rules);
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(&cache_key).await {
                tracing::debug!(
                    "使用缓存的批量分析结果 ({} 个段落，命中率 {:.0}%)",
                    blocks.len(),
                    cache.get_stats().hit_rate() * 100.0
                );
                return Ok(cached);
            }
        }

        let prompt = prompts::batch_prompt(blocks, rules);
        let text = self.generate(&prompt, self.batch_max_output_tokens).await?;
        let result = parse_batch_payload(&text)?;
        tracing::debug!("批量分析返回 {} 条匹配", result.results.len());

        if let Some(cache) = &self.cache {
            cache.set(cache_key, result.clone()).await;
        }
        Ok(result)
    }

    async fn analyze_one(
        &self,
        text: &str,
        concepts: &[String],
        replacement: &str,
    ) -> RewriteResult<Vec<PhrasePair>> {
        let prompt = prompts::single_prompt(text, concepts, replacement);
        let response = self.generate(&prompt, self.single_max_output_tokens).await?;
        parse_single_payload(&response)
    }
}

#[async_trait]
impl ConceptExtractor for GeminiAnalyzer {
    async fn extract_concepts(&self, word: &str) -> RewriteResult<Vec<String>> {
        let prompt = prompts::concept_prompt(word, self.max_concepts);
        let text = self.generate(&prompt, self.concept_max_output_tokens).await?;
        let concepts = parse_concepts(&text, word, self.max_concepts);
        tracing::info!("为 '{}' 提取到 {} 个概念", word, concepts.len());
        Ok(concepts)
    }
}
