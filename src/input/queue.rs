//! 帧队列与采集线程 (Frame queue & capture worker)
//!
//! 队列满时丢弃最旧的帧, 保证主循环总是拿到较新的画面.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use super::{Frame, FrameSource};
use crate::error::Result;

/// 生产端: 持有一个接收端副本, 用于在队列满时弹出最旧帧
#[derive(Clone)]
pub struct FrameProducer {
    tx: Sender<Frame>,
    drain: Receiver<Frame>,
    dropped: Arc<AtomicU64>,
}

/// 消费端
pub struct FrameConsumer {
    rx: Receiver<Frame>,
    dropped: Arc<AtomicU64>,
}

/// 创建丢弃最旧帧的有界队列
pub fn frame_queue(capacity: usize) -> (FrameProducer, FrameConsumer) {
    let (tx, rx) = bounded(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        FrameProducer {
            tx,
            drain: rx.clone(),
            dropped: dropped.clone(),
        },
        FrameConsumer { rx, dropped },
    )
}

impl FrameProducer {
    /// 入队, 满了先弹出最旧帧; 通道断开时返回 false
    pub fn push(&self, frame: Frame) -> bool {
        let mut frame = frame;
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return true,
                Err(TrySendError::Full(back)) => {
                    if self.drain.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    frame = back;
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }
}

impl FrameConsumer {
    /// 阻塞等待下一帧; 所有生产端关闭且队列为空时返回 None
    pub fn recv(&self) -> Option<Frame> {
        self.rx.recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// 因队列满被丢弃的帧数
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// 采集统计
#[derive(Clone, Debug, Default)]
pub struct CaptureStats {
    pub frames: u64,
    pub errors: u64,
    pub current_fps: f64,
}

/// 启动采集线程: 从 source 读帧推入队列, 直到来源结束或 running 被清除
pub fn spawn_capture_worker(
    mut source: Box<dyn FrameSource>,
    producer: FrameProducer,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<CaptureStats>> {
    let camera = source.camera();
    let handle = thread::Builder::new()
        .name(format!("capture-{}", camera))
        .spawn(move || {
            let mut stats = CaptureStats::default();
            let mut count = 0u32;
            let mut last = Instant::now();

            info!("✅ {} 采集线程启动", camera);
            while running.load(Ordering::Relaxed) {
                match source.next_frame() {
                    Ok(Some(frame)) => {
                        stats.frames += 1;
                        if !producer.push(frame) {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("🏁 {} 输入结束 ({} 帧)", camera, stats.frames);
                        break;
                    }
                    Err(e) => {
                        stats.errors += 1;
                        warn!("❌ {} 读帧失败: {}", camera, e);
                        break;
                    }
                }

                // 每秒统计一次帧率
                count += 1;
                let elapsed = last.elapsed();
                if elapsed >= Duration::from_secs(1) {
                    stats.current_fps = count as f64 / elapsed.as_secs_f64();
                    debug!("📊 {} 采集 {:.1} fps", camera, stats.current_fps);
                    count = 0;
                    last = Instant::now();
                }
            }
            stats
        })?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::CameraId;

    fn frame(index: u64) -> Frame {
        Frame::blank(CameraId::Left, index, 4, 4)
    }

    #[test]
    fn test_drops_oldest_when_full() {
        let (producer, consumer) = frame_queue(3);
        for i in 0..5 {
            assert!(producer.push(frame(i)));
        }
        assert_eq!(consumer.len(), 3);
        assert_eq!(consumer.dropped(), 2);
        let indices: Vec<u64> = (0..3).filter_map(|_| consumer.recv()).map(|f| f.index).collect();
        assert_eq!(indices, vec![2, 3, 4]);
    }

    #[test]
    fn test_consumer_sees_end_after_producer_dropped() {
        let (producer, consumer) = frame_queue(2);
        producer.push(frame(0));
        drop(producer);
        assert_eq!(consumer.recv().map(|f| f.index), Some(0));
        assert!(consumer.recv().is_none());
    }

    struct Counting {
        left: u64,
        next: u64,
    }

    impl FrameSource for Counting {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            if self.left == 0 {
                return Ok(None);
            }
            self.left -= 1;
            let f = frame(self.next);
            self.next += 1;
            Ok(Some(f))
        }

        fn camera(&self) -> CameraId {
            CameraId::Left
        }
    }

    #[test]
    fn test_worker_runs_until_source_exhausted() {
        let (producer, consumer) = frame_queue(16);
        let running = Arc::new(AtomicBool::new(true));
        let worker = spawn_capture_worker(
            Box::new(Counting { left: 6, next: 0 }),
            producer,
            running,
        )
        .unwrap();
        let stats = worker.join().unwrap();
        assert_eq!(stats.frames, 6);

        let mut seen = Vec::new();
        while let Some(f) = consumer.recv() {
            seen.push(f.index);
        }
        assert_eq!(seen, (0..6).collect::<Vec<_>>());
    }
}
