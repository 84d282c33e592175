//! 提交后校验
//!
//! 重新提取页面，统计命中区域内残留的可见字符数。清除与校验使用
//! 同一套几何估算，正常流程下残留数应为 0；非 0 说明该页的清除
//! 不可信，调用方必须拒绝输出。

use lopdf::Document;

use crate::error::PdfError;
use crate::extract::extract_page;
use crate::types::BBox;

/// 校验单页的命中区域内是否还有可见字符
pub fn verify_page(doc: &Document, page_index: usize, boxes: &[BBox]) -> Result<usize, PdfError> {
    let page = extract_page(doc, page_index)?;
    let survivors = page
        .glyphs
        .iter()
        .filter(|g| boxes.iter().any(|b| b.intersects(&g.bbox, 0.0)))
        .count();
    if survivors > 0 {
        log::warn!(
            "[Apply] 页 {} 的命中区域内仍有 {} 个可见字符",
            page_index + 1,
            survivors
        );
    }
    Ok(survivors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redact::redact_page;
    use crate::testdoc;

    #[test]
    fn untouched_page_reports_survivors() {
        let doc = testdoc::single_page(&[(100.0, 700.0, "secret")]);
        let page = extract_page(&doc, 0).unwrap();
        let boxes = page.boxes_for_range(&(0..page.text.len()));
        let survivors = verify_page(&doc, 0, &boxes).unwrap();
        assert_eq!(survivors, 6);
    }

    #[test]
    fn redacted_page_is_clean() {
        let mut doc = testdoc::single_page(&[(100.0, 700.0, "secret value")]);
        let page = extract_page(&doc, 0).unwrap();
        let start = page.text.find("secret").unwrap();
        let boxes = page.boxes_for_range(&(start..start + "secret".len()));
        redact_page(&mut doc, 0, &boxes).unwrap();
        assert_eq!(verify_page(&doc, 0, &boxes).unwrap(), 0);
    }

    #[test]
    fn empty_boxes_always_clean() {
        let doc = testdoc::single_page(&[(100.0, 700.0, "anything")]);
        assert_eq!(verify_page(&doc, 0, &[]).unwrap(), 0);
    }
}
