/// 输出 (Output)
///
/// - Compose: 左右画面拼接 + 检测框/距离/区域标注 + 底部信息面板
/// - Packet:  JSON 头 + JPEG 图像
/// - Framing: 4字节大端长度前缀分帧, TCP 推送
pub mod compose;
pub mod framing;
pub mod packet;

pub use compose::FrameComposer;
pub use framing::{FrameReader, FrameWriter, OverlaySink, TcpFrameSink};
pub use packet::{decode_packet, encode_packet, OverlayHeader};

use serde::{Deserialize, Serialize};

/// 输出参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// 底部面板高度 (像素)
    pub panel_height: u32,
    pub jpeg_quality: u8,
    /// 字体文件 (TTF/OTF), 未配置时不绘制文字
    pub font_path: Option<String>,
    /// 消费端地址 (host:port), 未配置时不推送
    pub address: Option<String>,
    /// 连接/写入超时 (毫秒)
    pub timeout_ms: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            panel_height: 300,
            jpeg_quality: 80,
            font_path: None,
            address: None,
            timeout_ms: 500,
        }
    }
}
