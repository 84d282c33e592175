//! 页面文本提取
//!
//! 逐操作符解释内容流，跟踪 CTM 与文本矩阵，为每个可见字符估算
//! 页面坐标下的边界框。宽度是估算值：ASCII 取 0.55 倍字号，其余
//! 字符取 1.0 倍。清除阶段使用同一套模型，两侧判定自洽。

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, StringFormat};

use crate::error::PdfError;
use crate::types::{BBox, GlyphBox, PageText};
use crate::utils::{get_number, get_page_bounds, get_page_content, page_id_at};

/// 换行判定的基线 y 变化阈值（pt）
const LINE_BREAK_TOLERANCE: f32 = 0.5;

/// 行内空格判定：x 间距超过字号的该比例时补一个空格
const WORD_GAP_RATIO: f32 = 0.35;

/// 未出现 Tf 时的缺省字号
const DEFAULT_FONT_SIZE: f32 = 12.0;

pub(crate) const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// 字符串对象的解码方式，清除阶段按原方式回写
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum TextEncoding {
    /// 每字节一个字符（Latin-1）
    Latin1,
    /// 双字节大端 UTF-16，CID 字体常见
    Utf16Be,
}

/// 估算单个字符的宽度
pub(crate) fn estimate_char_width(ch: char, font_size: f32) -> f32 {
    if ch.is_ascii() {
        font_size * 0.55
    } else {
        font_size
    }
}

/// 字符边界框：以基线起点为左下角，高度取字号
pub(crate) fn char_bbox(x: f32, y: f32, width: f32, font_size: f32) -> BBox {
    BBox::new(x, y, width, font_size.abs().max(1.0))
}

/// 解码 PDF 字符串对象
///
/// 十六进制字符串优先按 UTF-16BE 解码，失败时与字面量字符串一样
/// 按 Latin-1 逐字节处理。
pub(crate) fn decode_pdf_string(bytes: &[u8], format: StringFormat) -> (Vec<char>, TextEncoding) {
    if matches!(format, StringFormat::Hexadecimal) {
        if let Some(chars) = decode_utf16be(bytes) {
            return (chars, TextEncoding::Utf16Be);
        }
    }
    (
        bytes.iter().map(|&b| char::from(b)).collect(),
        TextEncoding::Latin1,
    )
}

/// 尝试把字节序列按 UTF-16BE 解码，产生控制字符时视为失败
fn decode_utf16be(bytes: &[u8]) -> Option<Vec<char>> {
    if bytes.len() < 2 || bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    let decoded = String::from_utf16(&units).ok()?;
    if decoded
        .chars()
        .any(|c| c.is_control() && c != '\n' && c != '\r' && c != '\t')
    {
        return None;
    }
    Some(decoded.chars().collect())
}

/// 从操作数读 6 元矩阵
pub(crate) fn matrix_from_operands(operands: &[Object]) -> Option<[f32; 6]> {
    if operands.len() < 6 {
        return None;
    }
    let mut m = [0.0f32; 6];
    for (i, slot) in m.iter_mut().enumerate() {
        *slot = get_number(&operands[i])?;
    }
    Some(m)
}

/// 矩阵左乘：`m × ctm`
pub(crate) fn concat_matrix(m: &[f32; 6], ctm: &[f32; 6]) -> [f32; 6] {
    [
        m[0] * ctm[0] + m[1] * ctm[2],
        m[0] * ctm[1] + m[1] * ctm[3],
        m[2] * ctm[0] + m[3] * ctm[2],
        m[2] * ctm[1] + m[3] * ctm[3],
        m[4] * ctm[0] + m[5] * ctm[2] + ctm[4],
        m[4] * ctm[1] + m[5] * ctm[3] + ctm[5],
    ]
}

/// 文本定位状态机，提取与清除两侧共用
///
/// 只跟踪与字符落点有关的操作符。`apply` 消化状态类操作符并返回
/// true，文本显示类操作符返回 false 交由调用方处理。
pub(crate) struct TextState {
    pub ctm: [f32; 6],
    stack: Vec<[f32; 6]>,
    pub tm: [f32; 6],
    lm: [f32; 6],
    pub font_size: f32,
    pub leading: f32,
    pub in_text: bool,
}

impl TextState {
    pub fn new() -> Self {
        Self {
            ctm: IDENTITY,
            stack: Vec::new(),
            tm: IDENTITY,
            lm: IDENTITY,
            font_size: DEFAULT_FONT_SIZE,
            leading: 0.0,
            in_text: false,
        }
    }

    pub fn apply(&mut self, op: &Operation) -> bool {
        match op.operator.as_str() {
            "q" => self.stack.push(self.ctm),
            "Q" => {
                if let Some(prev) = self.stack.pop() {
                    self.ctm = prev;
                }
            }
            "cm" => {
                if let Some(m) = matrix_from_operands(&op.operands) {
                    self.ctm = concat_matrix(&m, &self.ctm);
                }
            }
            "BT" => {
                self.in_text = true;
                self.tm = IDENTITY;
                self.lm = IDENTITY;
            }
            "ET" => self.in_text = false,
            "Tf" => {
                if let Some(size) = op.operands.get(1).and_then(get_number) {
                    self.font_size = size;
                }
            }
            "TL" => {
                if let Some(leading) = op.operands.first().and_then(get_number) {
                    self.leading = leading;
                }
            }
            "Tm" => {
                if let Some(m) = matrix_from_operands(&op.operands) {
                    self.tm = m;
                    self.lm = m;
                }
            }
            "Td" => {
                let tx = op.operands.first().and_then(get_number).unwrap_or(0.0);
                let ty = op.operands.get(1).and_then(get_number).unwrap_or(0.0);
                self.move_line(tx, ty);
            }
            "TD" => {
                let tx = op.operands.first().and_then(get_number).unwrap_or(0.0);
                let ty = op.operands.get(1).and_then(get_number).unwrap_or(0.0);
                self.leading = -ty;
                self.move_line(tx, ty);
            }
            "T*" => self.next_line(),
            _ => return false,
        }
        true
    }

    /// Td/TD/T* 的行移动，同时重置文本矩阵
    fn move_line(&mut self, tx: f32, ty: f32) {
        let e = tx * self.lm[0] + ty * self.lm[2] + self.lm[4];
        let f = tx * self.lm[1] + ty * self.lm[3] + self.lm[5];
        self.lm[4] = e;
        self.lm[5] = f;
        self.tm = self.lm;
    }

    pub fn next_line(&mut self) {
        let leading = self.leading;
        self.move_line(0.0, -leading);
    }

    /// 文本矩阵原点变换到用户空间
    pub fn origin(&self) -> (f32, f32) {
        (
            self.ctm[0] * self.tm[4] + self.ctm[2] * self.tm[5] + self.ctm[4],
            self.ctm[1] * self.tm[4] + self.ctm[3] * self.tm[5] + self.ctm[5],
        )
    }

    /// 显示一串字符后推进文本矩阵
    ///
    /// 简化模型：推进量按用户空间宽度累加，忽略矩阵缩放。
    pub fn advance(&mut self, dx: f32) {
        self.tm[4] += dx;
    }

    /// TJ 数组中的间距调整，单位为千分之一字号
    pub fn kern(&mut self, adjustment: f32) {
        self.tm[4] -= adjustment / 1000.0 * self.font_size;
    }
}

/// 提取侧的输出积累
struct Extractor {
    state: TextState,
    text: String,
    glyphs: Vec<GlyphBox>,
    /// 上一个文本串在用户空间的终点，用于行与词分隔判定
    last_end: Option<(f32, f32)>,
}

impl Extractor {
    fn new() -> Self {
        Self {
            state: TextState::new(),
            text: String::new(),
            glyphs: Vec::new(),
            last_end: None,
        }
    }

    /// 新文本串开始前补上行或词分隔符，合成分隔符不产生几何
    fn mark_run_start(&mut self) {
        let (x, y) = self.state.origin();
        if let Some((last_x, last_y)) = self.last_end {
            if (y - last_y).abs() > LINE_BREAK_TOLERANCE {
                self.text.push('\n');
            } else if x - last_x > self.state.font_size * WORD_GAP_RATIO {
                self.text.push(' ');
            }
        }
    }

    /// 追加一个字符串片段的字符与几何
    fn append_chars(&mut self, bytes: &[u8], format: StringFormat) {
        let (x, y) = self.state.origin();
        let (chars, _) = decode_pdf_string(bytes, format);
        let mut dx = 0.0f32;
        for ch in chars {
            let width = estimate_char_width(ch, self.state.font_size);
            if !ch.is_whitespace() {
                self.glyphs.push(GlyphBox {
                    offset: self.text.len(),
                    bbox: char_bbox(x + dx, y, width, self.state.font_size),
                });
            }
            self.text.push(ch);
            dx += width;
        }
        self.state.advance(dx);
        self.last_end = Some((x + dx, y));
    }
}

/// 提取全文档的页面文本与字符几何
pub fn extract_pages(doc: &Document) -> Result<Vec<PageText>, PdfError> {
    let page_ids: Vec<_> = doc.page_iter().collect();
    let mut pages = Vec::with_capacity(page_ids.len());
    for (page_index, page_id) in page_ids.into_iter().enumerate() {
        let page = extract_page_inner(doc, page_id, page_index)?;
        log::debug!(
            "[Extract] 页 {} 提取 {} 个字符，{} 个可见字形",
            page_index + 1,
            page.text.chars().count(),
            page.glyphs.len()
        );
        pages.push(page);
    }
    Ok(pages)
}

/// 提取单页
pub fn extract_page(doc: &Document, page_index: usize) -> Result<PageText, PdfError> {
    let page_id = page_id_at(doc, page_index)?;
    extract_page_inner(doc, page_id, page_index)
}

fn extract_page_inner(
    doc: &Document,
    page_id: lopdf::ObjectId,
    page_index: usize,
) -> Result<PageText, PdfError> {
    let bounds = get_page_bounds(doc, page_id);
    let content_data = get_page_content(doc, page_id)?;
    if content_data.is_empty() {
        return Ok(PageText {
            page_index,
            text: String::new(),
            glyphs: Vec::new(),
            bounds,
        });
    }
    let content = Content::decode(&content_data).map_err(|e| PdfError::Content(e.to_string()))?;

    let mut extractor = Extractor::new();
    for op in &content.operations {
        if extractor.state.apply(op) {
            continue;
        }
        if !extractor.state.in_text {
            continue;
        }
        match op.operator.as_str() {
            "Tj" => {
                if let Some(Object::String(bytes, format)) = op.operands.first() {
                    extractor.mark_run_start();
                    extractor.append_chars(bytes, *format);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = op.operands.first() {
                    extractor.mark_run_start();
                    for item in items {
                        match item {
                            Object::String(bytes, format) => {
                                extractor.append_chars(bytes, *format)
                            }
                            other => {
                                if let Some(adjustment) = get_number(other) {
                                    extractor.state.kern(adjustment);
                                }
                            }
                        }
                    }
                }
            }
            "'" => {
                if let Some(Object::String(bytes, format)) = op.operands.first() {
                    extractor.state.next_line();
                    extractor.mark_run_start();
                    extractor.append_chars(bytes, *format);
                }
            }
            "\"" => {
                if let Some(Object::String(bytes, format)) = op.operands.get(2) {
                    extractor.state.next_line();
                    extractor.mark_run_start();
                    extractor.append_chars(bytes, *format);
                }
            }
            _ => {}
        }
    }

    Ok(PageText {
        page_index,
        text: extractor.text,
        glyphs: extractor.glyphs,
        bounds,
    })
}
