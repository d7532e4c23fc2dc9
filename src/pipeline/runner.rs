//! 主循环 (Runner)
//! 职责: 两路采集线程 → 检测 → 单步处理 → 画面合成 → 推送

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::{RunStats, SentinelPipeline, StepReport};
use crate::detection::{Detection, PersonDetector};
use crate::error::Result;
use crate::input::{frame_queue, spawn_capture_worker, Frame, FrameSource};
use crate::output::{encode_packet, FrameComposer, OverlaySink};

/// 主循环需要的外部组件
pub struct RunnerParts {
    pub left_source: Box<dyn FrameSource>,
    pub right_source: Box<dyn FrameSource>,
    pub left_detector: Box<dyn PersonDetector>,
    pub right_detector: Box<dyn PersonDetector>,
    pub composer: Option<FrameComposer>,
    pub sink: Option<Box<dyn OverlaySink>>,
    pub queue_capacity: usize,
    pub jpeg_quality: u8,
    /// 区域文件轮询间隔, None 表示不热加载
    pub zone_poll: Option<Duration>,
}

/// 运行直到任一输入结束或 running 被清除, 返回统计
pub fn run(
    pipeline: &mut SentinelPipeline,
    parts: RunnerParts,
    running: Arc<AtomicBool>,
) -> Result<RunStats> {
    let RunnerParts {
        left_source,
        right_source,
        mut left_detector,
        mut right_detector,
        composer,
        mut sink,
        queue_capacity,
        jpeg_quality,
        zone_poll,
    } = parts;

    let (left_tx, left_rx) = frame_queue(queue_capacity);
    let (right_tx, right_rx) = frame_queue(queue_capacity);
    let left_worker = spawn_capture_worker(left_source, left_tx, running.clone())?;
    let right_worker = spawn_capture_worker(right_source, right_tx, running.clone())?;

    info!("🚀 主循环启动");
    let mut last_now = Duration::ZERO;
    let mut last_poll = Instant::now();
    let mut count = 0u64;
    let mut last = Instant::now();

    while running.load(Ordering::Relaxed) {
        let Some(left) = left_rx.recv() else {
            info!("🏁 左路输入结束");
            break;
        };
        let Some(right) = right_rx.recv() else {
            info!("🏁 右路输入结束");
            break;
        };

        let left_dets = detect(left_detector.as_mut(), &left);
        let right_dets = detect(right_detector.as_mut(), &right);

        // 时间取两帧中较晚者, 保证单调
        let now = left.timestamp.max(right.timestamp).max(last_now);
        last_now = now;
        let report = pipeline.process_step(&left_dets, &right_dets, now);

        if let (Some(composer), Some(sink)) = (composer.as_ref(), sink.as_mut()) {
            emit(composer, sink.as_mut(), &left, &right, &report, jpeg_quality);
        }

        if let Some(poll) = zone_poll {
            if last_poll.elapsed() >= poll {
                last_poll = Instant::now();
                if let Err(e) = pipeline.refresh_zones() {
                    warn!("⚠️ 区域热加载失败, 保留原区域: {}", e);
                }
            }
        }

        count += 1;
        let elapsed = last.elapsed();
        if elapsed >= Duration::from_secs(5) {
            info!(
                "📊 处理 {:.1} 步/秒, 轨迹 {} 条, 丢帧 L{} R{}",
                count as f64 / elapsed.as_secs_f64(),
                pipeline.tracker().track_count(),
                left_rx.dropped(),
                right_rx.dropped()
            );
            count = 0;
            last = Instant::now();
        }
    }

    // 停止采集线程
    running.store(false, Ordering::Relaxed);
    drop(left_rx);
    drop(right_rx);
    for (name, worker) in [("left", left_worker), ("right", right_worker)] {
        match worker.join() {
            Ok(stats) => info!("📷 {} 采集 {} 帧, 错误 {}", name, stats.frames, stats.errors),
            Err(_) => warn!("❌ {} 采集线程异常退出", name),
        }
    }

    pipeline.shutdown();
    let stats = pipeline.stats().clone();
    stats.log_summary();
    Ok(stats)
}

/// 检测失败按空结果处理
fn detect(detector: &mut dyn PersonDetector, frame: &Frame) -> Vec<Detection> {
    detector.detect(frame).unwrap_or_else(|e| {
        warn!("❌ {} 帧 {} 检测失败: {}", frame.camera, frame.index, e);
        Vec::new()
    })
}

fn emit(
    composer: &FrameComposer,
    sink: &mut dyn OverlaySink,
    left: &Frame,
    right: &Frame,
    report: &StepReport,
    quality: u8,
) {
    let canvas = composer.compose(left, right, report);
    let payload = match encode_packet(report, &canvas, quality) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("❌ 画面编码失败: {}", e);
            return;
        }
    };
    if let Err(e) = sink.send(&payload) {
        warn!("⚠️ 画面推送失败: {}", e);
    }
}
