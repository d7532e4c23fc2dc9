//! 错误类型 (Error types)

use thiserror::Error;

/// 数字卫兵错误
#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("I/O错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON解析错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("图像错误: {0}")]
    Image(#[from] image::ImageError),

    #[error("配置无效: {0}")]
    Config(String),

    /// 单个区域配置无效 (只拒绝该区域)
    #[error("区域 '{name}' 无效: {reason}")]
    Zone { name: String, reason: String },

    #[error("检测器错误: {0}")]
    Detector(String),

    /// 硬件信号线写入失败
    #[error("信号线写入失败: {0}")]
    Signal(String),

    /// 通知发送失败
    #[error("通知发送失败: {0}")]
    Notify(String),

    #[error("传输错误: {0}")]
    Transport(String),

    /// 视频源已结束
    #[error("视频源 {0} 已结束")]
    SourceExhausted(String),
}

pub type Result<T> = std::result::Result<T, SentinelError>;
