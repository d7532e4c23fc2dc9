//! 图像序列输入 (Image sequence source)
//!
//! 把相机录制导出的逐帧图片当作实时流回放.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use image::imageops::{self, FilterType};
use tracing::{info, warn};

use super::{CameraId, Frame, FrameSource, InputConfig};
use crate::error::{Result, SentinelError};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// 目录中的图片按文件名排序依次输出
pub struct ImageSequenceSource {
    camera: CameraId,
    files: Vec<PathBuf>,
    cursor: usize,
    width: u32,
    height: u32,
    fps: f32,
    started: Option<Instant>,
    /// 无法解码而跳过的文件数
    pub dropped_frames: usize,
}

impl ImageSequenceSource {
    pub fn open<P: AsRef<Path>>(dir: P, camera: CameraId, config: &InputConfig) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image(p))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(SentinelError::SourceExhausted(format!(
                "{} 中没有图片",
                dir.display()
            )));
        }
        info!(
            "📹 {} 相机: {} 帧 ({})",
            camera,
            files.len(),
            dir.display()
        );

        Ok(Self {
            camera,
            files,
            cursor: 0,
            width: config.frame_width,
            height: config.frame_height,
            fps: config.fps,
            started: None,
            dropped_frames: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// 第 index 帧的标称时间; 不限速时用实际经过时间
    fn timestamp(&self, index: u64, started: Instant) -> Duration {
        if self.fps > 0.0 {
            Duration::try_from_secs_f64(index as f64 / self.fps as f64).unwrap_or(Duration::MAX)
        } else {
            started.elapsed()
        }
    }

    fn pace(&self, due: Duration, started: Instant) {
        if self.fps <= 0.0 {
            return;
        }
        let elapsed = started.elapsed();
        if due > elapsed {
            thread::sleep(due - elapsed);
        }
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let started = *self.started.get_or_insert_with(Instant::now);

        while self.cursor < self.files.len() {
            // 帧序号取文件位置, 跳过的文件也占一个序号
            let index = self.cursor as u64;
            let path = &self.files[self.cursor];
            self.cursor += 1;

            let img = match image::open(path) {
                Ok(img) => img.to_rgb8(),
                Err(e) => {
                    self.dropped_frames += 1;
                    warn!("⚠️ 丢弃帧 {}: {}", path.display(), e);
                    continue;
                }
            };
            let img = if img.dimensions() == (self.width, self.height) {
                img
            } else {
                imageops::resize(&img, self.width, self.height, FilterType::Triangle)
            };

            let timestamp = self.timestamp(index, started);
            self.pace(timestamp, started);
            return Ok(Some(Frame::new(self.camera, index, timestamp, img)));
        }
        Ok(None)
    }

    fn camera(&self) -> CameraId {
        self.camera
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
