//! PDF 处理底层：文本几何提取、物理脱敏、校验与栅格化
//!
//! 本 crate 不做任何检测决策，只负责把字节区间与矩形区域落到页面
//! 上执行。坐标统一使用 PDF 用户空间（单位 pt，原点在页面左下角）。

mod error;
mod extract;
mod redact;
mod render;
#[cfg(test)]
pub(crate) mod testdoc;
mod types;
mod utils;
mod verify;

pub use error::PdfError;
pub use extract::{extract_page, extract_pages};
pub use redact::redact_page;
pub use render::render_pages_png;
pub use types::{BBox, GlyphBox, PageText};
pub use utils::{load_document, save_document};
pub use verify::verify_page;

pub type Result<T> = std::result::Result<T, PdfError>;
