//! PDF 处理错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("无法加载 PDF: {0}")]
    Open(#[from] lopdf::Error),

    #[error("写出失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("内容流处理失败: {0}")]
    Content(String),

    #[error("页面 {0} 不存在")]
    PageNotFound(usize),

    #[error("渲染失败: {0}")]
    Render(String),

    #[error("图像编码失败: {0}")]
    Encode(#[from] image::ImageError),
}
