//! 模糊匹配服务边界
//!
//! 把页面文本与用户给定的目标示例发给外部大模型服务，取回页面中
//! 与目标等价的原文子串（全半角、空白、敬称、音译等变体）。不同
//! 提供方实现统一的 `FuzzyProvider` 契约，流水线只认这个 trait。

mod anthropic;
mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 单次请求携带的页面文本上限（字符数），超限按行切块
pub const MAX_CHUNK_CHARS: usize = 12_000;

/// 线性退避的基础间隔
const BACKOFF_BASE_MS: u64 = 500;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("请求失败: {0}")]
    Http(#[from] reqwest::Error),

    #[error("服务返回状态码 {0}")]
    Status(u16),

    #[error("响应无法解析: {0}")]
    Parse(String),
}

impl AiError {
    /// 是否值得重试：限流、服务端错误、超时与连接失败
    pub fn is_retryable(&self) -> bool {
        match self {
            AiError::Status(code) => *code == 429 || *code >= 500,
            AiError::Http(e) => e.is_timeout() || e.is_connect(),
            AiError::Parse(_) => false,
        }
    }
}

/// 模糊匹配提供方的统一契约
///
/// `send` 是同步阻塞调用，实现必须线程安全：批处理会在多个工作
/// 线程上共享同一个实例。
pub trait FuzzyProvider: Send + Sync {
    /// 提供方名称，日志用
    fn name(&self) -> &'static str;

    /// 发送一页文本与目标列表，返回页面原文中逐字出现的等价子串
    fn send(&self, page_text: &str, targets: &[String]) -> Result<Vec<String>, AiError>;
}

/// 模糊匹配关闭时的空实现，永远不产生候选
pub struct Disabled;

impl FuzzyProvider for Disabled {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn send(&self, _page_text: &str, _targets: &[String]) -> Result<Vec<String>, AiError> {
        Ok(Vec::new())
    }
}

/// 服务提供方种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Anthropic,
    #[serde(rename = "openai")]
    OpenAi,
}

impl ProviderKind {
    /// 按配置构造具体提供方
    pub fn build(
        &self,
        model: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Box<dyn FuzzyProvider>, AiError> {
        match self {
            ProviderKind::Anthropic => {
                Ok(Box::new(AnthropicProvider::new(model, api_key, timeout)?))
            }
            ProviderKind::OpenAi => Ok(Box::new(OpenAiProvider::new(model, api_key, timeout)?)),
        }
    }
}

/// 整页请求入口：超长页面按行切块，逐块请求并合并结果
pub fn request_candidates(
    provider: &dyn FuzzyProvider,
    page_text: &str,
    targets: &[String],
    max_retries: u32,
) -> Result<Vec<String>, AiError> {
    let chunks = chunk_text(page_text);
    if chunks.len() > 1 {
        log::debug!(
            "[AI] 页面文本 {} 字符，切成 {} 块",
            page_text.chars().count(),
            chunks.len()
        );
    }
    let mut candidates = Vec::new();
    for chunk in chunks {
        candidates.extend(send_with_retry(provider, chunk, targets, max_retries)?);
    }
    Ok(candidates)
}

/// 有界重试，线性退避；不可重试的错误立即返回
pub fn send_with_retry(
    provider: &dyn FuzzyProvider,
    text: &str,
    targets: &[String],
    max_retries: u32,
) -> Result<Vec<String>, AiError> {
    let mut attempt = 0u32;
    loop {
        match provider.send(text, targets) {
            Ok(candidates) => return Ok(candidates),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                let backoff = Duration::from_millis(BACKOFF_BASE_MS * u64::from(attempt));
                log::warn!(
                    "[AI] {} 请求失败（{}），{}ms 后第 {} 次重试",
                    provider.name(),
                    e,
                    backoff.as_millis(),
                    attempt
                );
                thread::sleep(backoff);
            }
            Err(e) => return Err(e),
        }
    }
}

/// 组装单次请求的提示词
///
/// 要求模型只输出 JSON 数组，元素必须是页面原文中逐字出现的子串，
/// 否则后续无法按归一化搜索落位。
pub(crate) fn build_prompt(page_text: &str, targets: &[String]) -> String {
    let target_list = targets
        .iter()
        .map(|t| format!("- {}", t))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are helping redact personal information from a document.\n\
         Find every substring of the page text below that refers to the same \
         information as any of these target examples, including variants with \
         different width forms, spacing, honorifics or transliteration:\n\
         {target_list}\n\n\
         Reply with a JSON array of strings and nothing else. Every element must \
         be an exact, verbatim substring of the page text. Reply [] if nothing \
         matches.\n\n\
         Page text:\n{page_text}"
    )
}

/// 从模型回答中取第一个能解析的 JSON 字符串数组，忽略前后散文
pub(crate) fn parse_answer(answer: &str) -> Result<Vec<String>, AiError> {
    let mut search = 0usize;
    while let Some(pos) = answer[search..].find('[') {
        let start = search + pos;
        let mut stream =
            serde_json::Deserializer::from_str(&answer[start..]).into_iter::<Vec<String>>();
        if let Some(Ok(items)) = stream.next() {
            return Ok(items
                .into_iter()
                .filter(|s| !s.trim().is_empty())
                .collect());
        }
        search = start + 1;
    }
    Err(AiError::Parse("回答中没有可解析的 JSON 数组".to_string()))
}

/// 按行边界把文本切成不超过 MAX_CHUNK_CHARS 个字符的块
///
/// 单行超限时对该行按字符数硬切。
pub(crate) fn chunk_text(text: &str) -> Vec<&str> {
    if text.chars().count() <= MAX_CHUNK_CHARS {
        return vec![text];
    }
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut chunk_chars = 0usize;
    let mut cursor = 0usize;
    for line in text.split_inclusive('\n') {
        let line_chars = line.chars().count();
        if line_chars > MAX_CHUNK_CHARS {
            if chunk_chars > 0 {
                chunks.push(&text[start..cursor]);
            }
            let mut piece_start = cursor;
            let mut piece_chars = 0usize;
            for (offset, _) in line.char_indices() {
                if piece_chars == MAX_CHUNK_CHARS {
                    chunks.push(&text[piece_start..cursor + offset]);
                    piece_start = cursor + offset;
                    piece_chars = 0;
                }
                piece_chars += 1;
            }
            cursor += line.len();
            start = piece_start;
            chunk_chars = piece_chars;
            continue;
        }
        if chunk_chars + line_chars > MAX_CHUNK_CHARS {
            chunks.push(&text[start..cursor]);
            start = cursor;
            chunk_chars = 0;
        }
        chunk_chars += line_chars;
        cursor += line.len();
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}
