//! 流水线编排
//!
//! 单文档依次经过：打开 → 提取 → 匹配 → 解析 → 提交或预览。任何
//! 阶段失败立即终止该文档并把错误写进结果，批处理层面互不影响。
//! 同一个流水线实例可以跨工作线程共享。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use lopdf::Document;
use rayon::prelude::*;
use sumi_ai::{Disabled, FuzzyProvider};
use sumi_pdf::{BBox, PageText};

use crate::config::{OutputMode, RunConfig, RunMode};
use crate::error::{RedactError, Result};
use crate::matcher::{MatchCandidate, MatchSource, PatternMatcher};
use crate::resolver::{resolve_spans, RedactionSpan};
use crate::result::{mask_snippet, Artifact, DocumentResult, Finding, RunSummary};

pub struct Pipeline {
    config: RunConfig,
    matcher: PatternMatcher,
    provider: Box<dyn FuzzyProvider>,
}

impl Pipeline {
    /// 校验配置并组装流水线，配置问题在任何文档打开之前失败
    pub fn new(config: RunConfig) -> Result<Self> {
        let patterns = config.validate()?;
        let provider: Box<dyn FuzzyProvider> = if config.ai.enabled {
            let timeout = Duration::from_secs(config.ai.timeout_secs);
            config
                .ai
                .provider
                .build(&config.ai.model, &config.ai.api_key, timeout)
                .map_err(|e| RedactError::Config(format!("无法构造模糊匹配客户端: {}", e)))?
        } else {
            Box::new(Disabled)
        };
        Ok(Self {
            config,
            matcher: PatternMatcher::new(patterns),
            provider,
        })
    }

    /// 注入自定义模糊匹配实现（嵌入与测试场景）
    ///
    /// 是否调用注入的实现仍由 `ai.enabled` 与目标列表决定。
    pub fn with_provider(config: RunConfig, provider: Box<dyn FuzzyProvider>) -> Result<Self> {
        let patterns = config.validate()?;
        Ok(Self {
            config,
            matcher: PatternMatcher::new(patterns),
            provider,
        })
    }

    /// 处理磁盘上的单个 PDF
    pub fn process(&self, path: &Path) -> DocumentResult {
        let name = display_name(path);
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("[Pipeline] 无法读取 {}: {}", path.display(), e);
                return DocumentResult::failed(name, format!("无法读取文件: {}", e));
            }
        };
        self.process_bytes(&name, &bytes)
    }

    /// 处理内存中的单个 PDF，名称只用于结果与日志
    pub fn process_bytes(&self, name: &str, bytes: &[u8]) -> DocumentResult {
        log::info!("[Pipeline] 开始处理 {}（{} 字节）", name, bytes.len());
        match self.run_document(name, bytes) {
            Ok(result) => result,
            Err(e) => {
                log::error!("[Pipeline] {} 处理失败: {}", name, e);
                DocumentResult::failed(name.to_string(), e.to_string())
            }
        }
    }

    /// 批量处理，单个文档失败不影响其它文档
    pub fn process_all(&self, files: &[PathBuf]) -> RunSummary {
        self.process_all_with_cancel(files, &AtomicBool::new(false))
    }

    /// 带取消标志的批量处理
    ///
    /// 已开始的文档跑完为止；标志置位后尚未开始的文档直接记为失败，
    /// 不再调度。
    pub fn process_all_with_cancel(&self, files: &[PathBuf], cancel: &AtomicBool) -> RunSummary {
        let started_at = Utc::now();
        log::info!("[Pipeline] 批处理 {} 个文档", files.len());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_parallel_documents)
            .build();
        let results: Vec<DocumentResult> = match pool {
            Ok(pool) => pool.install(|| {
                files
                    .par_iter()
                    .map(|path| self.process_unless_cancelled(path, cancel))
                    .collect()
            }),
            Err(e) => {
                log::warn!("[Pipeline] 线程池创建失败（{}），退回串行处理", e);
                files
                    .iter()
                    .map(|path| self.process_unless_cancelled(path, cancel))
                    .collect()
            }
        };
        let summary = RunSummary::collect(results, started_at, Utc::now());
        log::info!(
            "[Pipeline] 批处理结束：成功 {}，失败 {}，共脱敏 {} 处",
            summary.succeeded,
            summary.failed,
            summary.total_redacted
        );
        summary
    }

    fn process_unless_cancelled(&self, path: &Path, cancel: &AtomicBool) -> DocumentResult {
        if cancel.load(Ordering::SeqCst) {
            let name = display_name(path);
            log::warn!("[Pipeline] 批处理已取消，跳过 {}", name);
            return DocumentResult::failed(name, "批处理已取消，文档未处理".to_string());
        }
        self.process(path)
    }

    fn run_document(&self, name: &str, bytes: &[u8]) -> Result<DocumentResult> {
        let mut doc =
            sumi_pdf::load_document(bytes).map_err(|e| RedactError::Document(e.to_string()))?;
        let pages =
            sumi_pdf::extract_pages(&doc).map_err(|e| RedactError::Document(e.to_string()))?;
        log::info!("[Pipeline] {}: {} 页", name, pages.len());

        let mut warnings = Vec::new();
        let mut spans_by_page: BTreeMap<usize, Vec<RedactionSpan>> = BTreeMap::new();
        for page in &pages {
            let mut candidates = self.matcher.find(page);
            candidates.extend(self.fuzzy_candidates(page, &mut warnings));
            if candidates.is_empty() {
                continue;
            }
            let (spans, mut page_warnings) = resolve_spans(page, candidates);
            warnings.append(&mut page_warnings);
            validate_spans(page, &spans)?;
            if !spans.is_empty() {
                spans_by_page.insert(page.page_index, spans);
            }
        }

        let redaction_count: usize = spans_by_page.values().map(|s| s.len()).sum();
        let findings = collect_findings(&spans_by_page);

        let artifact = match self.config.mode {
            RunMode::Preview => {
                log::info!(
                    "[Pipeline] {} 预览完成：{} 处命中，不产生输出",
                    name,
                    redaction_count
                );
                None
            }
            RunMode::Commit => Some(self.commit(name, bytes, &mut doc, &spans_by_page)?),
        };

        Ok(DocumentResult {
            original_name: name.to_string(),
            redaction_count,
            findings,
            warnings,
            artifact,
            error: None,
        })
    }

    /// 模糊通道：未启用或没有目标时静默短路
    ///
    /// 请求失败不是文档错误，该页降级为仅精确匹配并记警告。
    fn fuzzy_candidates(&self, page: &PageText, warnings: &mut Vec<String>) -> Vec<MatchCandidate> {
        if !self.config.ai.enabled || self.config.literal_target_patterns.is_empty() {
            return Vec::new();
        }
        if page.text.trim().is_empty() {
            return Vec::new();
        }
        match sumi_ai::request_candidates(
            self.provider.as_ref(),
            &page.text,
            &self.config.literal_target_patterns,
            self.config.ai.max_retries,
        ) {
            Ok(list) => {
                if !list.is_empty() {
                    log::info!(
                        "[AI] 页 {} 返回 {} 个模糊候选",
                        page.page_index + 1,
                        list.len()
                    );
                }
                list.into_iter()
                    .map(|matched_text| MatchCandidate {
                        source: MatchSource::Fuzzy,
                        matched_text,
                        page_index: page.page_index,
                        range: None,
                    })
                    .collect()
            }
            Err(e) => {
                log::warn!(
                    "[AI] 页 {} 模糊匹配失败，该页降级为仅精确匹配: {}",
                    page.page_index + 1,
                    e
                );
                warnings.push(format!(
                    "页 {}: 模糊匹配失败（{}），该页仅使用精确匹配",
                    page.page_index + 1,
                    e
                ));
                Vec::new()
            }
        }
    }

    /// 提交：PDF 模式逐页清除并校验，图像模式整体栅格化
    fn commit(
        &self,
        name: &str,
        bytes: &[u8],
        doc: &mut Document,
        spans_by_page: &BTreeMap<usize, Vec<RedactionSpan>>,
    ) -> Result<Artifact> {
        match self.config.output_mode {
            OutputMode::Pdf => {
                for (page_index, spans) in spans_by_page {
                    let boxes: Vec<BBox> = spans.iter().map(|s| s.bbox).collect();
                    sumi_pdf::redact_page(doc, *page_index, &boxes).map_err(|e| {
                        RedactError::Integrity(format!("页 {} 清除失败: {}", page_index + 1, e))
                    })?;
                    let survivors =
                        sumi_pdf::verify_page(doc, *page_index, &boxes).map_err(|e| {
                            RedactError::Integrity(format!(
                                "页 {} 校验失败: {}",
                                page_index + 1,
                                e
                            ))
                        })?;
                    if survivors > 0 {
                        return Err(RedactError::Integrity(format!(
                            "页 {} 的命中区域内仍有 {} 个字符未清除",
                            page_index + 1,
                            survivors
                        )));
                    }
                }
                let out = sumi_pdf::save_document(doc)
                    .map_err(|e| RedactError::Document(e.to_string()))?;
                log::info!("[Pipeline] {} 输出 PDF（{} 字节）", name, out.len());
                Ok(Artifact::Pdf(out))
            }
            OutputMode::Image => {
                let masks: BTreeMap<usize, Vec<BBox>> = spans_by_page
                    .iter()
                    .map(|(page_index, spans)| {
                        (*page_index, spans.iter().map(|s| s.bbox).collect())
                    })
                    .collect();
                let images = sumi_pdf::render_pages_png(bytes, &masks, self.config.raster_dpi)
                    .map_err(|e| RedactError::Document(format!("栅格化失败: {}", e)))?;
                log::info!("[Pipeline] {} 输出 {} 张页面图像", name, images.len());
                Ok(Artifact::PageImages(images))
            }
        }
    }
}

/// 区域必须与页面范围相交，完全落在页面外说明几何已不可信
fn validate_spans(page: &PageText, spans: &[RedactionSpan]) -> Result<()> {
    for span in spans {
        if !span.bbox.intersects(&page.bounds, 0.0) {
            return Err(RedactError::Integrity(format!(
                "页 {} 的脱敏区域落在页面范围外",
                page.page_index + 1
            )));
        }
    }
    Ok(())
}

fn collect_findings(spans_by_page: &BTreeMap<usize, Vec<RedactionSpan>>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for spans in spans_by_page.values() {
        for span in spans {
            findings.push(Finding {
                page: span.page_index + 1,
                snippet: mask_snippet(&span.origin.matched_text),
                source: span.origin.source,
            });
        }
    }
    findings
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span_at(bbox: BBox) -> RedactionSpan {
        RedactionSpan {
            page_index: 0,
            bbox,
            origin: MatchCandidate {
                source: MatchSource::Exact,
                matched_text: "0123456789".to_string(),
                page_index: 0,
                range: Some(0..10),
            },
        }
    }

    fn blank_page() -> PageText {
        PageText {
            page_index: 0,
            text: String::new(),
            glyphs: Vec::new(),
            bounds: BBox::new(0.0, 0.0, 612.0, 792.0),
        }
    }

    #[test]
    fn in_bounds_span_passes_validation() {
        let page = blank_page();
        let spans = vec![span_at(BBox::new(100.0, 700.0, 50.0, 12.0))];
        assert!(validate_spans(&page, &spans).is_ok());
    }

    #[test]
    fn out_of_bounds_span_is_integrity_error() {
        let page = blank_page();
        let spans = vec![span_at(BBox::new(1000.0, 1000.0, 50.0, 12.0))];
        assert!(matches!(
            validate_spans(&page, &spans),
            Err(RedactError::Integrity(_))
        ));
    }

    #[test]
    fn findings_mask_the_matched_text() {
        let mut spans_by_page = BTreeMap::new();
        spans_by_page.insert(0usize, vec![span_at(BBox::new(0.0, 0.0, 1.0, 1.0))]);
        let findings = collect_findings(&spans_by_page);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].page, 1);
        assert!(!findings[0].snippet.contains("0123456789"));
        assert!(findings[0].snippet.contains("****"));
    }
}
