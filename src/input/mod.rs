/// 视频输入系统 (Video Input System)
///
/// 每个相机一个独立采集线程, 通过有界队列把帧交给主循环
/// - Sequence: 图像序列回放 (按文件名排序, 缩放到工作尺寸, 按帧率节拍)
/// - Queue:    丢弃最旧帧的有界队列 + 采集线程
pub mod queue;
pub mod sequence;

pub use queue::{frame_queue, spawn_capture_worker, CaptureStats, FrameConsumer, FrameProducer};
pub use sequence::ImageSequenceSource;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// 相机位置
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraId {
    Left,
    Right,
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraId::Left => write!(f, "left"),
            CameraId::Right => write!(f, "right"),
        }
    }
}

/// 一帧图像 (RGB, 已缩放到工作尺寸)
#[derive(Clone, Debug)]
pub struct Frame {
    pub camera: CameraId,
    /// 本相机内的帧序号, 从0开始
    pub index: u64,
    /// 相对采集开始的时间
    pub timestamp: Duration,
    /// Arc包装避免在线程间复制像素
    pub image: Arc<RgbImage>,
}

impl Frame {
    pub fn new(camera: CameraId, index: u64, timestamp: Duration, image: RgbImage) -> Self {
        Self {
            camera,
            index,
            timestamp,
            image: Arc::new(image),
        }
    }

    /// 黑色空帧
    pub fn blank(camera: CameraId, index: u64, width: u32, height: u32) -> Self {
        Self::new(camera, index, Duration::ZERO, RgbImage::new(width, height))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// 帧来源: 返回 Ok(None) 表示已结束
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn camera(&self) -> CameraId;
}

/// 输入参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// 工作分辨率
    pub frame_width: u32,
    pub frame_height: u32,
    /// 每个相机队列容量, 满了丢弃最旧帧
    pub queue_capacity: usize,
    /// 回放帧率, 0 表示不限速
    pub fps: f32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            frame_width: 640,
            frame_height: 360,
            queue_capacity: 10,
            fps: 20.0,
        }
    }
}
