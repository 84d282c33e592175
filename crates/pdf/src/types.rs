//! 页面几何数据结构
//!
//! 所有坐标都使用 PDF 用户空间（单位 pt，原点在页面左下角）。
//! 提取与脱敏两侧共用同一套结构，保证命中区域的判定一致。

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// 同一行内字符的基线 y 容差（pt）
const LINE_JOIN_TOLERANCE: f32 = 1.0;

/// 矩形区域
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    /// 左下角 x 坐标
    pub x: f32,
    /// 左下角 y 坐标
    pub y: f32,
    /// 宽度
    pub w: f32,
    /// 高度
    pub h: f32,
}

impl BBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// 右边界 x 坐标
    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    /// 上边界 y 坐标
    pub fn top(&self) -> f32 {
        self.y + self.h
    }

    pub fn area(&self) -> f32 {
        self.w * self.h
    }

    /// 带余量的相交判定，margin 为 0 时要求真实重叠（边缘相切不算）
    pub fn intersects(&self, other: &BBox, margin: f32) -> bool {
        let x_overlap = self.x - margin < other.right() && self.right() + margin > other.x;
        let y_overlap = self.y - margin < other.top() && self.top() + margin > other.y;
        x_overlap && y_overlap
    }

    /// 两个矩形的外接并集
    pub fn union(&self, other: &BBox) -> BBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let top = self.top().max(other.top());
        BBox::new(x, y, right - x, top - y)
    }

    /// 相交面积占较小矩形面积的比例，范围 0.0 到 1.0
    pub fn overlap_ratio(&self, other: &BBox) -> f32 {
        let ix = (self.right().min(other.right()) - self.x.max(other.x)).max(0.0);
        let iy = (self.top().min(other.top()) - self.y.max(other.y)).max(0.0);
        let min_area = self.area().min(other.area());
        if min_area <= 0.0 {
            return 0.0;
        }
        (ix * iy / min_area).min(1.0)
    }

    /// 四周外扩 margin
    pub fn inflate(&self, margin: f32) -> BBox {
        BBox::new(
            self.x - margin,
            self.y - margin,
            self.w + margin * 2.0,
            self.h + margin * 2.0,
        )
    }
}

/// 单个字符的几何信息
#[derive(Debug, Clone, Copy)]
pub struct GlyphBox {
    /// 对应 `PageText::text` 中的字节偏移
    pub offset: usize,
    /// 字符在页面上的边界框
    pub bbox: BBox,
}

/// 一页的提取结果：纯文本加每个可见字符的几何位置
///
/// `text` 中行与行之间以 `\n` 分隔，行内的大间距以空格表示；
/// 这些合成分隔符没有对应的 `GlyphBox`。空白字符一律不记录几何。
#[derive(Debug, Clone)]
pub struct PageText {
    /// 页面索引，从 0 开始
    pub page_index: usize,
    /// 提取出的纯文本
    pub text: String,
    /// 可见字符的几何信息，按字节偏移升序
    pub glyphs: Vec<GlyphBox>,
    /// 页面范围（CropBox 优先于 MediaBox）
    pub bounds: BBox,
}

impl PageText {
    /// 把 `text` 的一个字节区间落到页面几何上，按行聚合为外接框
    ///
    /// 跨行的区间返回多个框，每行一个。区间内没有可见字符时返回空。
    pub fn boxes_for_range(&self, range: &Range<usize>) -> Vec<BBox> {
        let mut boxes = Vec::new();
        let mut current: Option<BBox> = None;
        for glyph in self.glyphs.iter().filter(|g| range.contains(&g.offset)) {
            current = match current {
                None => Some(glyph.bbox),
                Some(acc) if (acc.y - glyph.bbox.y).abs() <= LINE_JOIN_TOLERANCE => {
                    Some(acc.union(&glyph.bbox))
                }
                Some(acc) => {
                    boxes.push(acc);
                    Some(glyph.bbox)
                }
            };
        }
        if let Some(acc) = current {
            boxes.push(acc);
        }
        boxes
    }
}
