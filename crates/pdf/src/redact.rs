//! 物理脱敏
//!
//! 两步：先把命中区域内的字符按原编码方式替换为空格（保持字符串
//! 字节长度不变），再在区域上追加不透明黑色矩形，最后整体换掉页面
//! 内容流。原字符的字节不会留在输出文档里。

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, StringFormat};

use crate::error::PdfError;
use crate::extract::{
    char_bbox, decode_pdf_string, estimate_char_width, TextEncoding, TextState,
};
use crate::types::BBox;
use crate::utils::{get_number, get_page_content, page_id_at};

/// 黑色覆盖矩形相对命中区域的外扩量（pt）
const OVERLAY_MARGIN: f32 = 1.0;

/// 对单页执行物理脱敏，返回清除的字符数
///
/// 清除以命中区域原框判定，覆盖矩形外扩 1pt 绘制。区域列表为空时
/// 不改动页面。
pub fn redact_page(
    doc: &mut Document,
    page_index: usize,
    boxes: &[BBox],
) -> Result<usize, PdfError> {
    if boxes.is_empty() {
        return Ok(0);
    }
    let page_id = page_id_at(doc, page_index)?;
    let content_data = get_page_content(doc, page_id)?;

    let (mut operations, cleared) = clear_operations(&content_data, boxes)?;
    append_overlay(&mut operations, boxes);
    let encoded = Content { operations }
        .encode()
        .map_err(|e| PdfError::Content(e.to_string()))?;

    let new_content_id = doc.add_object(Stream::new(Dictionary::new(), encoded));
    match doc.get_object_mut(page_id) {
        Ok(Object::Dictionary(dict)) => {
            dict.set("Contents", Object::Reference(new_content_id));
        }
        _ => {
            return Err(PdfError::Content(format!(
                "页 {} 的页面字典不可写",
                page_index + 1
            )));
        }
    }
    log::info!(
        "[Apply] 页 {} 清除 {} 个字符，追加 {} 个覆盖矩形",
        page_index + 1,
        cleared,
        boxes.len()
    );
    Ok(cleared)
}

/// 清除侧状态：与提取侧共用 `TextState`，保证字符落点判定一致
struct Clearer<'a> {
    state: TextState,
    boxes: &'a [BBox],
    cleared: usize,
}

impl Clearer<'_> {
    /// 字符是否落在任一命中区域内，空白字符无需清除
    fn hit(&self, ch: char, x: f32, y: f32, width: f32) -> bool {
        if ch.is_whitespace() {
            return false;
        }
        let bbox = char_bbox(x, y, width, self.state.font_size);
        self.boxes.iter().any(|b| b.intersects(&bbox, 0.0))
    }

    /// 重写一个字符串对象：命中字符替换为空格，其余原样保留
    fn clear_string(&mut self, bytes: &[u8], format: StringFormat) -> Vec<u8> {
        let (x, y) = self.state.origin();
        let (chars, encoding) = decode_pdf_string(bytes, format);
        let mut out = Vec::with_capacity(bytes.len());
        let mut dx = 0.0f32;
        match encoding {
            TextEncoding::Latin1 => {
                for (i, ch) in chars.iter().enumerate() {
                    let width = estimate_char_width(*ch, self.state.font_size);
                    if self.hit(*ch, x + dx, y, width) {
                        out.push(b' ');
                        self.cleared += 1;
                    } else {
                        out.push(bytes[i]);
                    }
                    dx += width;
                }
            }
            TextEncoding::Utf16Be => {
                for ch in chars.iter() {
                    let width = estimate_char_width(*ch, self.state.font_size);
                    if self.hit(*ch, x + dx, y, width) {
                        // 保持 UTF-16 码元数不变
                        for _ in 0..ch.len_utf16() {
                            out.extend_from_slice(&0x0020u16.to_be_bytes());
                        }
                        self.cleared += 1;
                    } else {
                        let mut buf = [0u16; 2];
                        for unit in ch.encode_utf16(&mut buf) {
                            out.extend_from_slice(&unit.to_be_bytes());
                        }
                    }
                    dx += width;
                }
            }
        }
        self.state.advance(dx);
        out
    }
}

/// 重写第 index 个操作数（字符串）
fn rewrite_string_operand(clearer: &mut Clearer, mut op: Operation, index: usize) -> Operation {
    let (new_bytes, format) = match op.operands.get(index) {
        Some(Object::String(bytes, format)) => (clearer.clear_string(bytes, *format), *format),
        _ => return op,
    };
    op.operands[index] = Object::String(new_bytes, format);
    op
}

/// 重写 TJ 数组：字符串逐个清除，间距调整照常推进状态
fn rewrite_array_operand(clearer: &mut Clearer, mut op: Operation) -> Operation {
    let rebuilt = match op.operands.first() {
        Some(Object::Array(items)) => {
            let mut rebuilt = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Object::String(bytes, format) => {
                        rebuilt.push(Object::String(
                            clearer.clear_string(bytes, *format),
                            *format,
                        ));
                    }
                    other => {
                        if let Some(adjustment) = get_number(other) {
                            clearer.state.kern(adjustment);
                        }
                        rebuilt.push(other.clone());
                    }
                }
            }
            rebuilt
        }
        _ => return op,
    };
    op.operands[0] = Object::Array(rebuilt);
    op
}

fn clear_operations(
    content_data: &[u8],
    boxes: &[BBox],
) -> Result<(Vec<Operation>, usize), PdfError> {
    let content = Content::decode(content_data).map_err(|e| PdfError::Content(e.to_string()))?;
    let mut clearer = Clearer {
        state: TextState::new(),
        boxes,
        cleared: 0,
    };
    let mut operations = Vec::with_capacity(content.operations.len());
    for op in content.operations {
        if clearer.state.apply(&op) {
            operations.push(op);
            continue;
        }
        if !clearer.state.in_text {
            operations.push(op);
            continue;
        }
        let rewritten = match op.operator.as_str() {
            "Tj" => rewrite_string_operand(&mut clearer, op, 0),
            "TJ" => rewrite_array_operand(&mut clearer, op),
            "'" => {
                clearer.state.next_line();
                rewrite_string_operand(&mut clearer, op, 0)
            }
            "\"" => {
                clearer.state.next_line();
                rewrite_string_operand(&mut clearer, op, 2)
            }
            _ => op,
        };
        operations.push(rewritten);
    }
    Ok((operations, clearer.cleared))
}

/// 在内容流末尾追加黑色覆盖矩形，每个矩形独立包在 q/Q 里
fn append_overlay(operations: &mut Vec<Operation>, boxes: &[BBox]) {
    for b in boxes {
        let rect = b.inflate(OVERLAY_MARGIN);
        operations.push(Operation::new("q", vec![]));
        operations.push(Operation::new(
            "rg",
            vec![Object::Real(0.0), Object::Real(0.0), Object::Real(0.0)],
        ));
        operations.push(Operation::new(
            "re",
            vec![
                Object::Real(rect.x),
                Object::Real(rect.y),
                Object::Real(rect.w),
                Object::Real(rect.h),
            ],
        ));
        operations.push(Operation::new("f", vec![]));
        operations.push(Operation::new("Q", vec![]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_page;
    use crate::testdoc;
    use crate::utils::{get_stream_content, load_document, save_document};

    fn boxes_for(doc: &lopdf::Document, needle: &str) -> Vec<BBox> {
        let page = extract_page(doc, 0).unwrap();
        let start = page.text.find(needle).unwrap();
        page.boxes_for_range(&(start..start + needle.len()))
    }

    #[test]
    fn clears_ascii_target() {
        let mut doc = testdoc::single_page(&[(100.0, 700.0, "Tel: 090-1234-5678")]);
        let boxes = boxes_for(&doc, "090-1234-5678");
        let cleared = redact_page(&mut doc, 0, &boxes).unwrap();
        assert_eq!(cleared, 13);

        let page = extract_page(&doc, 0).unwrap();
        assert!(!page.text.contains("090-1234-5678"));
        assert!(page.text.starts_with("Tel:"));
    }

    #[test]
    fn clears_utf16_target() {
        let mut doc = testdoc::single_page(&[(100.0, 700.0, "担当: 田中太郎")]);
        let boxes = boxes_for(&doc, "田中太郎");
        let cleared = redact_page(&mut doc, 0, &boxes).unwrap();
        assert_eq!(cleared, 4);

        let page = extract_page(&doc, 0).unwrap();
        assert!(!page.text.contains("田中"));
        assert!(page.text.starts_with("担当:"));
    }

    #[test]
    fn leaves_neighbours_untouched() {
        let mut doc = testdoc::single_page(&[(100.0, 700.0, "id=ABCD rest")]);
        let boxes = boxes_for(&doc, "ABCD");
        redact_page(&mut doc, 0, &boxes).unwrap();

        let page = extract_page(&doc, 0).unwrap();
        assert!(page.text.contains("id="));
        assert!(page.text.contains("rest"));
        assert!(!page.text.contains("ABCD"));
    }

    #[test]
    fn appends_overlay_rectangles() {
        let mut doc = testdoc::single_page(&[(100.0, 700.0, "secret")]);
        let boxes = boxes_for(&doc, "secret");
        redact_page(&mut doc, 0, &boxes).unwrap();

        let page_id = doc.page_iter().next().unwrap();
        let content_data = get_page_content(&doc, page_id).unwrap();
        let content = Content::decode(&content_data).unwrap();
        let fills: Vec<_> = content
            .operations
            .iter()
            .filter(|op| op.operator == "re")
            .collect();
        assert_eq!(fills.len(), 1);
        // 覆盖矩形外扩 1pt
        let x = get_number(&fills[0].operands[0]).unwrap();
        assert!((x - (boxes[0].x - 1.0)).abs() < 0.01);
        assert!(content.operations.iter().any(|op| op.operator == "f"));
    }

    #[test]
    fn empty_boxes_do_nothing() {
        let mut doc = testdoc::single_page(&[(100.0, 700.0, "text")]);
        let before = {
            let page_id = doc.page_iter().next().unwrap();
            get_page_content(&doc, page_id).unwrap()
        };
        let cleared = redact_page(&mut doc, 0, &[]).unwrap();
        assert_eq!(cleared, 0);
        let after = {
            let page_id = doc.page_iter().next().unwrap();
            get_page_content(&doc, page_id).unwrap()
        };
        assert_eq!(before, after);
    }

    #[test]
    fn saved_output_drops_replaced_stream() {
        let mut doc = testdoc::single_page(&[(100.0, 700.0, "Tel: 090-1234-5678")]);
        let boxes = boxes_for(&doc, "090-1234-5678");
        redact_page(&mut doc, 0, &boxes).unwrap();

        // 换下来的旧内容流不允许出现在写出的任何对象里
        let bytes = save_document(&mut doc).unwrap();
        let reloaded = load_document(&bytes).unwrap();
        let needle = b"090-1234-5678";
        for object in reloaded.objects.values() {
            if let Object::Stream(stream) = object {
                let data = get_stream_content(stream);
                assert!(!data.windows(needle.len()).any(|w| w == needle));
            }
        }
    }

    #[test]
    fn string_byte_length_is_preserved() {
        let mut doc = testdoc::single_page(&[(100.0, 700.0, "連絡先 090")]);
        let page = extract_page(&doc, 0).unwrap();
        let start = page.text.find("連絡先").unwrap();
        let boxes = page.boxes_for_range(&(start..start + "連絡先".len()));
        redact_page(&mut doc, 0, &boxes).unwrap();

        let page_id = doc.page_iter().next().unwrap();
        let content_data = get_page_content(&doc, page_id).unwrap();
        let content = Content::decode(&content_data).unwrap();
        for op in &content.operations {
            if op.operator == "Tj" {
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    // 原串 7 个字符，UTF-16BE 下 14 字节
                    assert_eq!(bytes.len(), "連絡先 090".encode_utf16().count() * 2);
                }
            }
        }
    }
}
