//! 流水线错误类型
//!
//! 三类致命问题：配置错误在任何文档打开前失败；文档错误只波及
//! 单个文档；完整性错误表示已解析的区域没有被物理清除，对应文档
//! 绝不能当作成功。检测降级不属于错误，以警告附在结果上。

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RedactError>;

#[derive(Debug, Error)]
pub enum RedactError {
    #[error("配置无效: {0}")]
    Config(String),

    #[error("文档处理失败: {0}")]
    Document(String),

    #[error("脱敏完整性受损: {0}")]
    Integrity(String),
}
