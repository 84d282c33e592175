//! 对外结果结构
//!
//! 这里是唯一允许跨进传输层（HTTP 响应、前端事件）的形状。命中
//! 片段一律先打码，原文不出现在结果、日志或错误消息里。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::matcher::MatchSource;

/// 单条命中的对外描述
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// 页号，从 1 开始
    pub page: usize,
    /// 打码后的命中片段
    pub snippet: String,
    pub source: MatchSource,
}

/// 输出产物，保存在内存里交给调用方落盘或传输
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Artifact {
    /// 与输入同几何的 PDF 字节流
    Pdf(Vec<u8>),
    /// 每页一张 PNG
    PageImages(Vec<Vec<u8>>),
}

/// 单个文档的处理结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResult {
    pub original_name: String,
    /// 实际执行的脱敏区域数
    pub redaction_count: usize,
    pub findings: Vec<Finding>,
    /// 非致命的降级信息（模糊匹配失败、候选定位失败等）
    pub warnings: Vec<String>,
    /// 预览模式与失败时为空
    pub artifact: Option<Artifact>,
    /// 失败原因，成功时为空
    pub error: Option<String>,
}

impl DocumentResult {
    pub fn failed(original_name: String, error: String) -> Self {
        Self {
            original_name,
            redaction_count: 0,
            findings: Vec::new(),
            warnings: Vec::new(),
            artifact: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// 一次批处理的汇总
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub results: Vec<DocumentResult>,
    /// 成功文档的脱敏区域总数
    pub total_redacted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub(crate) fn collect(
        results: Vec<DocumentResult>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let total_redacted = results
            .iter()
            .filter(|r| r.is_success())
            .map(|r| r.redaction_count)
            .sum();
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let failed = results.len() - succeeded;
        Self {
            results,
            total_redacted,
            succeeded,
            failed,
            started_at,
            finished_at,
        }
    }
}

/// 打码展示片段：保留首尾少量字符，中间以 **** 代替
pub fn mask_snippet(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    if len <= 4 {
        "*".repeat(len)
    } else {
        let visible = (len / 3).min(4).max(1);
        let prefix: String = chars[..visible].iter().collect();
        let suffix: String = chars[len - visible..].iter().collect();
        format!("{}****{}", prefix, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_hides_middle() {
        let masked = mask_snippet("090-1234-5678");
        assert!(masked.starts_with("090-"));
        assert!(masked.ends_with("5678"));
        assert!(masked.contains("****"));
        assert!(!masked.contains("1234-"));
    }

    #[test]
    fn mask_short_text_entirely() {
        assert_eq!(mask_snippet("太郎"), "**");
        assert_eq!(mask_snippet(""), "");
    }

    #[test]
    fn mask_is_char_aware() {
        // 多字节字符不能按字节切
        let masked = mask_snippet("田中太郎之介殿");
        assert!(masked.starts_with("田中"));
        assert!(masked.contains("****"));
    }

    #[test]
    fn summary_counts_only_successes() {
        let results = vec![
            DocumentResult {
                original_name: "a.pdf".to_string(),
                redaction_count: 3,
                findings: Vec::new(),
                warnings: Vec::new(),
                artifact: None,
                error: None,
            },
            DocumentResult::failed("b.pdf".to_string(), "壊れた".to_string()),
        ];
        let now = Utc::now();
        let summary = RunSummary::collect(results, now, now);
        assert_eq!(summary.total_redacted, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn result_serializes_camel_case() {
        let result = DocumentResult::failed("x.pdf".to_string(), "err".to_string());
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("originalName"));
        assert!(json.contains("redactionCount"));
    }
}
