//! 叠加画面数据包 (Overlay packet)
//!
//! 布局: `u32 大端 JSON头长度` + JSON头 + JPEG字节

use std::io::Cursor;

use chrono::Local;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SentinelError};
use crate::pipeline::StepReport;

/// 数据包头
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlayHeader {
    /// 本地时间 (RFC 3339)
    pub wallclock: String,
    pub width: u32,
    pub height: u32,
    pub report: StepReport,
}

/// 编码: 画布压成 JPEG, 与步结果打包
pub fn encode_packet(report: &StepReport, canvas: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let header = OverlayHeader {
        wallclock: Local::now().to_rfc3339(),
        width: canvas.width(),
        height: canvas.height(),
        report: report.clone(),
    };
    let header = serde_json::to_vec(&header)?;

    let mut jpeg = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100));
    canvas.write_with_encoder(encoder)?;
    let jpeg = jpeg.into_inner();

    let header_len = u32::try_from(header.len())
        .map_err(|_| SentinelError::Transport("数据包头过大".into()))?;
    let mut payload = Vec::with_capacity(4 + header.len() + jpeg.len());
    payload.extend_from_slice(&header_len.to_be_bytes());
    payload.extend_from_slice(&header);
    payload.extend_from_slice(&jpeg);
    Ok(payload)
}

/// 解码: 返回包头与 JPEG 字节
pub fn decode_packet(payload: &[u8]) -> Result<(OverlayHeader, &[u8])> {
    if payload.len() < 4 {
        return Err(SentinelError::Transport("数据包过短".into()));
    }
    let header_len = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
    let rest = &payload[4..];
    if rest.len() < header_len {
        return Err(SentinelError::Transport(format!(
            "包头长度 {} 超出数据包 ({} 字节)",
            header_len,
            rest.len()
        )));
    }
    let header: OverlayHeader = serde_json::from_slice(&rest[..header_len])?;
    Ok((header, &rest[header_len..]))
}
