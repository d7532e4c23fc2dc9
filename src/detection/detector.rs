//! 检测器 (Detector)
//! 职责: 帧 → 检测框列表. 神经网络检测器在进程外运行, 这里只定义边界.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use super::types::Detection;
use crate::error::{Result, SentinelError};
use crate::input::Frame;

/// 检测器统一接口
///
/// 每帧返回原始检测结果 (类别, 置信度, 检测框), 类别/置信度过滤由调用方完成
pub trait PersonDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// JSON Lines 中的一行: 一帧的检测结果
#[derive(Debug, Deserialize)]
struct ReplayLine {
    frame: u64,
    #[serde(default)]
    detections: Vec<Detection>,
}

/// 回放检测器: 读取外部检测器预先导出的逐帧结果
pub struct ReplayDetector {
    name: String,
    frames: HashMap<u64, Vec<Detection>>,
}

impl ReplayDetector {
    /// 从 JSON Lines 文件加载; 格式错误的行被跳过
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let name = path.display().to_string();
        let detector = Self::parse(&name, &text);
        info!(
            "✅ 检测回放已加载: {} ({} 帧)",
            detector.name,
            detector.frames.len()
        );
        Ok(detector)
    }

    pub fn parse(name: &str, text: &str) -> Self {
        let mut frames = HashMap::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<ReplayLine>(line) {
                Ok(entry) => {
                    frames.insert(entry.frame, entry.detections);
                }
                Err(e) => warn!("⚠️ {}:{} 检测记录解析失败: {}", name, lineno + 1, e),
            }
        }
        Self {
            name: name.to_string(),
            frames,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl PersonDetector for ReplayDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        // 没有记录的帧视为空结果
        Ok(self.frames.get(&frame.index).cloned().unwrap_or_default())
    }
}

/// 将任意闭包包装成检测器 (用于测试与嵌入式集成)
pub struct FnDetector<F>(pub F);

impl<F> PersonDetector for FnDetector<F>
where
    F: FnMut(&Frame) -> std::result::Result<Vec<Detection>, String> + Send,
{
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        (self.0)(frame).map_err(SentinelError::Detector)
    }
}
