//! 精确匹配
//!
//! 编译好的正则直接在页面文本上扫描。这一路不做任何大小写或宽度
//! 归一化，命中什么就是什么，换取的是字节级的精确区间。

use std::ops::Range;

use serde::{Deserialize, Serialize};
use sumi_pdf::PageText;

use crate::config::CompiledPatterns;
use crate::result::mask_snippet;

/// 候选来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    /// 正则命中，自带字节区间
    Exact,
    /// 外部服务返回的等价子串，需要回头定位
    Fuzzy,
}

/// 尚未落到页面几何上的命中候选
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub source: MatchSource,
    /// 命中的原文文本
    pub matched_text: String,
    pub page_index: usize,
    /// 页面文本中的字节区间，模糊候选没有
    pub range: Option<Range<usize>>,
}

/// 持有编译结果的精确匹配器
pub struct PatternMatcher {
    patterns: CompiledPatterns,
}

impl PatternMatcher {
    pub fn new(patterns: CompiledPatterns) -> Self {
        Self { patterns }
    }

    /// 扫描一页，返回带精确区间的候选
    ///
    /// `find_iter` 保证同一条正则的命中互不重叠；不同正则之间的
    /// 重叠交给后续解析阶段合并。
    pub fn find(&self, page: &PageText) -> Vec<MatchCandidate> {
        let mut candidates = Vec::new();
        for regex in &self.patterns.regexes {
            for m in regex.find_iter(&page.text) {
                log::debug!(
                    "[Detect] 页 {} 正则 {:?} 命中: {}",
                    page.page_index + 1,
                    regex.as_str(),
                    mask_snippet(m.as_str())
                );
                candidates.push(MatchCandidate {
                    source: MatchSource::Exact,
                    matched_text: m.as_str().to_string(),
                    page_index: page.page_index,
                    range: Some(m.range()),
                });
            }
        }
        if !candidates.is_empty() {
            log::info!(
                "[Detect] 页 {} 精确命中 {} 处",
                page.page_index + 1,
                candidates.len()
            );
        }
        candidates
    }
}
