//! 候选到几何区域的解析
//!
//! 精确候选自带字节区间，直接落位。模糊候选只有字符串：页面文本
//! 与候选都经过 NFKC 折叠、去空白、小写化后做子串搜索，再把命中
//! 映射回原文的字节区间。定位不到的模糊候选丢弃并记警告，绝不
//! 猜测位置。最后把同页重叠的区域合并去重。

use std::ops::Range;

use sumi_pdf::{BBox, PageText};
use unicode_normalization::UnicodeNormalization;

use crate::matcher::{MatchCandidate, MatchSource};
use crate::result::mask_snippet;

/// 区域合并阈值：相交面积超过较小区域面积的该比例时视为同一命中
const MERGE_OVERLAP_RATIO: f32 = 0.25;

/// 解析完成的几何脱敏单元
#[derive(Debug, Clone)]
pub struct RedactionSpan {
    pub page_index: usize,
    pub bbox: BBox,
    /// 产生该区域的候选；精确与模糊撞到同一区域时保留精确来源
    pub origin: MatchCandidate,
}

/// 归一化文本及归一化字节到原文字节的映射
struct NormalizedText {
    text: String,
    /// 下标为归一化文本的字节偏移，值为 (原文字节偏移, 原字符字节长度)
    offsets: Vec<(usize, usize)>,
}

/// NFKC 折叠 + 去空白 + 小写化
///
/// 全角数字、全角连字符等经 NFKC 统一成半角，空白一律丢弃，这样
/// "０９０−１２３４" 和 "090-1234" 归一化后相等。
fn normalize(input: &str) -> NormalizedText {
    let mut text = String::new();
    let mut offsets = Vec::new();
    for (byte_offset, ch) in input.char_indices() {
        if ch.is_whitespace() {
            continue;
        }
        for folded in std::iter::once(ch).nfkc() {
            if folded.is_whitespace() {
                continue;
            }
            for lower in folded.to_lowercase() {
                for _ in 0..lower.len_utf8() {
                    offsets.push((byte_offset, ch.len_utf8()));
                }
                text.push(lower);
            }
        }
    }
    NormalizedText { text, offsets }
}

/// 在页面文本中定位候选的全部出现位置，返回原文字节区间
fn locate_all(page_text: &str, needle: &str) -> Vec<Range<usize>> {
    let page = normalize(page_text);
    let target = normalize(needle);
    if target.text.is_empty() {
        return Vec::new();
    }
    let mut ranges = Vec::new();
    let mut search = 0usize;
    while let Some(pos) = page.text[search..].find(&target.text) {
        let start = search + pos;
        let end = start + target.text.len();
        let origin_start = page.offsets[start].0;
        let (last_offset, last_len) = page.offsets[end - 1];
        ranges.push(origin_start..last_offset + last_len);
        search = end;
    }
    ranges
}

/// 把一页的全部候选解析成去重后的几何区域
///
/// 返回 (区域列表, 警告列表)。同一候选在页面上出现多处时全部落位。
pub fn resolve_spans(
    page: &PageText,
    candidates: Vec<MatchCandidate>,
) -> (Vec<RedactionSpan>, Vec<String>) {
    let mut spans = Vec::new();
    let mut warnings = Vec::new();

    for candidate in candidates {
        let ranges: Vec<Range<usize>> = match &candidate.range {
            Some(range) => vec![range.clone()],
            None => {
                let found = locate_all(&page.text, &candidate.matched_text);
                if found.is_empty() {
                    log::warn!(
                        "[Resolve] 页 {} 无法定位候选 {}，已丢弃",
                        page.page_index + 1,
                        mask_snippet(&candidate.matched_text)
                    );
                    warnings.push(format!(
                        "页 {}: 候选 {} 无法在页面文本中定位，已跳过",
                        page.page_index + 1,
                        mask_snippet(&candidate.matched_text)
                    ));
                    continue;
                }
                if found.len() > 1 {
                    log::debug!(
                        "[Resolve] 候选 {} 在页 {} 出现 {} 处，全部脱敏",
                        mask_snippet(&candidate.matched_text),
                        page.page_index + 1,
                        found.len()
                    );
                }
                found
            }
        };
        for range in &ranges {
            for bbox in page.boxes_for_range(range) {
                spans.push(RedactionSpan {
                    page_index: page.page_index,
                    bbox,
                    origin: candidate.clone(),
                });
            }
        }
    }

    let spans = merge_overlapping(spans);
    if !spans.is_empty() {
        log::info!(
            "[Resolve] 页 {} 解析出 {} 个脱敏区域",
            page.page_index + 1,
            spans.len()
        );
    }
    (spans, warnings)
}

/// 合并重叠区域直到不动点，合并时精确来源优先保留
fn merge_overlapping(mut spans: Vec<RedactionSpan>) -> Vec<RedactionSpan> {
    let mut merged = true;
    while merged {
        merged = false;
        'scan: for i in 0..spans.len() {
            for j in i + 1..spans.len() {
                if spans[i].bbox.overlap_ratio(&spans[j].bbox) > MERGE_OVERLAP_RATIO {
                    let removed = spans.swap_remove(j);
                    spans[i].bbox = spans[i].bbox.union(&removed.bbox);
                    if spans[i].origin.source == MatchSource::Fuzzy
                        && removed.origin.source == MatchSource::Exact
                    {
                        spans[i].origin = removed.origin;
                    }
                    merged = true;
                    break 'scan;
                }
            }
        }
    }
    spans
}
