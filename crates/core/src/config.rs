//! 运行配置与校验
//!
//! 配置一旦进入流水线即不可变。`validate` 在任何文档打开之前执行
//! 全部检查并编译正则，之后的阶段不再出现配置类失败。

use regex::Regex;
use serde::{Deserialize, Serialize};
use sumi_ai::ProviderKind;

use crate::error::{RedactError, Result};

/// 缺省模型
const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";

/// 输出形态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// 与输入同几何的 PDF
    #[default]
    Pdf,
    /// 每页一张 PNG
    Image,
}

/// 运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// 只报告命中，不产生输出文件
    Preview,
    /// 物理脱敏并产出结果
    #[default]
    Commit,
}

/// 模糊匹配（外部大模型）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AiConfig {
    /// 是否启用模糊匹配
    pub enabled: bool,
    pub provider: ProviderKind,
    pub model: String,
    pub api_key: String,
    /// 单次请求超时（秒）
    pub timeout_secs: u64,
    /// 可重试错误的重试次数上限
    pub max_retries: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: ProviderKind::Anthropic,
            model: DEFAULT_MODEL.to_string(),
            api_key: String::new(),
            timeout_secs: 30,
            max_retries: 2,
        }
    }
}

/// 一次运行的全部配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunConfig {
    /// 字面量目标示例，交给模糊匹配找变体
    pub literal_target_patterns: Vec<String>,
    /// 正则表达式，精确匹配用
    pub regex_patterns: Vec<String>,
    pub ai: AiConfig,
    pub output_mode: OutputMode,
    pub mode: RunMode,
    /// 图像输出的渲染 DPI
    pub raster_dpi: u32,
    /// 并行处理的文档数上限，0 表示线程池缺省值
    pub max_parallel_documents: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            literal_target_patterns: Vec::new(),
            regex_patterns: Vec::new(),
            ai: AiConfig::default(),
            output_mode: OutputMode::default(),
            mode: RunMode::default(),
            raster_dpi: 300,
            max_parallel_documents: 0,
        }
    }
}

impl RunConfig {
    /// 内置的常用正则：邮编、县市地址、连字符分隔的号码
    pub fn default_regex_patterns() -> Vec<String> {
        vec![
            r"〒\d{3}-\d{4}".to_string(),
            "神奈川県".to_string(),
            r"横浜市[^。、\s\n]*".to_string(),
            r"\d+[-−]\d+[-−]\d+[-−]\d+".to_string(),
        ]
    }

    /// 校验配置并一次性编译全部正则
    ///
    /// 两类问题直接拒绝运行：没有任何可用的检测来源；启用了模糊
    /// 匹配却没有密钥。正则编译失败也在这里报出，不会拖到扫描阶段。
    pub fn validate(&self) -> Result<CompiledPatterns> {
        let exact_usable = !self.regex_patterns.is_empty();
        let fuzzy_usable = self.ai.enabled && !self.literal_target_patterns.is_empty();
        if !exact_usable && !fuzzy_usable {
            return Err(RedactError::Config(
                "没有可用的检测来源：正则列表为空，且模糊匹配不可用".to_string(),
            ));
        }
        if self.ai.enabled && self.ai.api_key.trim().is_empty() {
            return Err(RedactError::Config(
                "启用了模糊匹配但没有提供 API 密钥".to_string(),
            ));
        }
        if self.output_mode == OutputMode::Image && self.raster_dpi == 0 {
            return Err(RedactError::Config("图像输出的 DPI 不能为 0".to_string()));
        }

        let mut regexes = Vec::with_capacity(self.regex_patterns.len());
        for pattern in &self.regex_patterns {
            let regex = Regex::new(pattern).map_err(|e| {
                RedactError::Config(format!("正则 {:?} 无法编译: {}", pattern, e))
            })?;
            regexes.push(regex);
        }
        Ok(CompiledPatterns { regexes })
    }
}

/// 校验阶段编译好的正则集合
#[derive(Debug, Clone)]
pub struct CompiledPatterns {
    pub(crate) regexes: Vec<Regex>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_safe() {
        let config = RunConfig::default();
        assert!(!config.ai.enabled);
        assert_eq!(config.ai.provider, ProviderKind::Anthropic);
        assert_eq!(config.ai.model, DEFAULT_MODEL);
        assert_eq!(config.ai.timeout_secs, 30);
        assert_eq!(config.ai.max_retries, 2);
        assert_eq!(config.output_mode, OutputMode::Pdf);
        assert_eq!(config.mode, RunMode::Commit);
        assert_eq!(config.raster_dpi, 300);
        assert_eq!(config.max_parallel_documents, 0);
    }

    #[test]
    fn builtin_patterns_compile() {
        let config = RunConfig {
            regex_patterns: RunConfig::default_regex_patterns(),
            ..Default::default()
        };
        let compiled = config.validate().unwrap();
        assert_eq!(compiled.regexes.len(), 4);
    }

    #[test]
    fn rejects_empty_detection_sources() {
        let config = RunConfig::default();
        assert!(matches!(
            config.validate(),
            Err(RedactError::Config(_))
        ));
    }

    #[test]
    fn literal_targets_without_ai_are_not_usable() {
        // 字面量目标只有模糊通道会用，AI 关闭时等于没有来源
        let config = RunConfig {
            literal_target_patterns: vec!["田中太郎".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn enabled_ai_requires_api_key() {
        let config = RunConfig {
            literal_target_patterns: vec!["田中太郎".to_string()],
            ai: AiConfig {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("密钥"));
    }

    #[test]
    fn rejects_invalid_regex() {
        let config = RunConfig {
            regex_patterns: vec!["([unclosed".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_dpi_for_image_output() {
        let config = RunConfig {
            regex_patterns: vec![r"\d+".to_string()],
            output_mode: OutputMode::Image,
            raster_dpi: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_deserializes_from_camel_case() {
        let json = r#"{
            "literalTargetPatterns": ["田中太郎"],
            "regexPatterns": ["\\d{3}"],
            "ai": { "enabled": true, "provider": "openai", "apiKey": "sk-test" },
            "outputMode": "image",
            "mode": "preview",
            "rasterDpi": 150
        }"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.literal_target_patterns, vec!["田中太郎"]);
        assert!(config.ai.enabled);
        assert_eq!(config.ai.provider, ProviderKind::OpenAi);
        assert_eq!(config.ai.api_key, "sk-test");
        // 未给出的字段回落到缺省值
        assert_eq!(config.ai.max_retries, 2);
        assert_eq!(config.output_mode, OutputMode::Image);
        assert_eq!(config.mode, RunMode::Preview);
        assert_eq!(config.raster_dpi, 150);
        assert_eq!(config.max_parallel_documents, 0);
    }
}
