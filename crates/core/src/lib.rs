//! 检测与脱敏编排
//!
//! 精确匹配、模糊匹配、区域解析与结果聚合都在这一层，底层的
//! PDF 几何与物理清除由 sumi-pdf 提供，模糊匹配客户端由 sumi-ai
//! 提供。对外入口是 [`Pipeline`]。

pub mod config;
pub mod error;
pub mod matcher;
pub mod pipeline;
pub mod resolver;
pub mod result;

pub use config::{AiConfig, CompiledPatterns, OutputMode, RunConfig, RunMode};
pub use error::{RedactError, Result};
pub use matcher::{MatchCandidate, MatchSource, PatternMatcher};
pub use pipeline::Pipeline;
pub use resolver::{resolve_spans, RedactionSpan};
pub use result::{mask_snippet, Artifact, DocumentResult, Finding, RunSummary};
