/// 双目数字卫兵 (Stereo Sentinel)
///
/// 双相机入侵监测: 测距 + 电子围栏 + 告警
///
/// 系统架构:
/// 1. 采集线程: 左右两路图像序列 (各自独立工作线程, 丢弃最旧帧)
/// 2. 主线程:   检测 → 匹配 → 跟踪 → 测距 → 区域判定 → 告警 → 画面推送
/// 3. 通知线程: 告警通知异步发送
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stereo_sentinel::alert::{
    AlertStateMachine, LogNotifier, NotificationDispatcher, Notifier, NullSignalLine, SignalLine,
    StreamSignalLine, WebhookNotifier,
};
use stereo_sentinel::detection::{IdentityTracker, ReplayDetector};
use stereo_sentinel::geofence::{GeofenceClassifier, ZoneStore};
use stereo_sentinel::input::{CameraId, ImageSequenceSource};
use stereo_sentinel::output::{FrameComposer, OverlaySink, TcpFrameSink};
use stereo_sentinel::pipeline::{self, RunnerParts, SentinelPipeline};
use stereo_sentinel::stereo::{CrossViewMatcher, DistanceEstimator};
use stereo_sentinel::SentinelConfig;

const DEFAULT_LOG_FILTER: &str = "stereo_sentinel=info,sentinel=info";

/// 数字卫兵参数
#[derive(Parser, Debug)]
#[command(author, version, about = "双目数字卫兵 - 测距与区域入侵告警", long_about = None)]
struct Args {
    /// 配置文件 (不存在时创建默认配置)
    #[arg(short, long, default_value = "sentinel.json")]
    config: String,

    /// 区域文件 (不存在时创建默认区域)
    #[arg(short, long, default_value = "zones.json")]
    zones: String,

    /// 左相机图像目录
    #[arg(long)]
    left_frames: String,

    /// 右相机图像目录
    #[arg(long)]
    right_frames: String,

    /// 左相机检测结果 (JSON Lines)
    #[arg(long)]
    left_detections: String,

    /// 右相机检测结果 (JSON Lines)
    #[arg(long)]
    right_detections: String,

    /// 信号线串口设备, 例如 /dev/ttyACM0.
    /// 不设置波特率, 需预先配置为 9600 8N1: stty -F /dev/ttyACM0 9600 raw -echo
    #[arg(long)]
    serial: Option<String>,

    /// 信号线 TCP 转发地址 host:port
    #[arg(long)]
    signal_addr: Option<String>,

    /// 画面消费端地址 host:port
    #[arg(short, long)]
    output: Option<String>,

    /// 通知网关 URL
    #[arg(long)]
    webhook: Option<String>,

    /// 标注字体 (TTF/OTF)
    #[arg(long)]
    font: Option<String>,

    /// 回放帧率 (0 表示不限速)
    #[arg(long)]
    fps: Option<f32>,

    /// 日志过滤, 例如 "stereo_sentinel=debug"
    #[arg(long)]
    log: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = match &args.log {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚀 双目数字卫兵启动");

    // ========== 配置 ==========
    let mut config = SentinelConfig::load(&args.config);
    apply_overrides(&mut config, &args);
    config.validate().context("配置无效")?;
    config.print_summary();

    let zones = ZoneStore::open(&args.zones, config.geofence.clone())
        .with_context(|| format!("无法打开区域文件 {}", args.zones))?;

    // ========== 告警出口 ==========
    let line: Box<dyn SignalLine> = match (&config.serial_device, &config.signal_address) {
        (Some(device), _) => Box::new(StreamSignalLine::device(device.clone())),
        (None, Some(addr)) => Box::new(StreamSignalLine::tcp(addr.clone(), Duration::from_secs(1))),
        (None, None) => {
            info!("📴 未配置信号线, 仅记录告警");
            Box::new(NullSignalLine)
        }
    };
    info!("🔌 信号线: {}", line.name());

    let mut notifiers: Vec<Box<dyn Notifier>> = vec![Box::new(LogNotifier)];
    if let Some(url) = &config.webhook_url {
        info!("📣 通知网关: {}", url);
        notifiers.push(Box::new(WebhookNotifier::new(url.clone(), Duration::from_secs(10))));
    }
    let dispatcher = NotificationDispatcher::spawn(notifiers, 16).context("无法启动通知线程")?;
    let alerts = AlertStateMachine::new(config.alert.clone(), line, Box::new(dispatcher));

    // ========== 核心 ==========
    let mut sentinel = SentinelPipeline::new(
        config.detection.clone(),
        CrossViewMatcher::new(config.matcher.clone()),
        DistanceEstimator::new(config.stereo.clone()),
        IdentityTracker::new(config.tracker.clone()),
        GeofenceClassifier::new(config.geofence.clone()),
        zones,
        alerts,
    );

    // ========== 输入 / 输出 ==========
    let left_source = ImageSequenceSource::open(&args.left_frames, CameraId::Left, &config.input)
        .with_context(|| format!("无法打开左相机目录 {}", args.left_frames))?;
    let right_source = ImageSequenceSource::open(&args.right_frames, CameraId::Right, &config.input)
        .with_context(|| format!("无法打开右相机目录 {}", args.right_frames))?;
    let left_detector = ReplayDetector::load(&args.left_detections)
        .with_context(|| format!("无法读取 {}", args.left_detections))?;
    let right_detector = ReplayDetector::load(&args.right_detections)
        .with_context(|| format!("无法读取 {}", args.right_detections))?;

    let (composer, sink) = match &config.output.address {
        Some(addr) => {
            info!("📡 画面推送到 {}", addr);
            let composer = FrameComposer::new(&config.output).context("无法创建画面合成器")?;
            let sink: Box<dyn OverlaySink> = Box::new(TcpFrameSink::new(
                addr.clone(),
                Duration::from_millis(config.output.timeout_ms),
            ));
            (Some(composer), Some(sink))
        }
        None => (None, None),
    };

    let zone_poll = (config.zone_poll_secs > 0.0)
        .then(|| Duration::try_from_secs_f32(config.zone_poll_secs).ok())
        .flatten();
    let parts = RunnerParts {
        left_source: Box::new(left_source),
        right_source: Box::new(right_source),
        left_detector: Box::new(left_detector),
        right_detector: Box::new(right_detector),
        composer,
        sink,
        queue_capacity: config.input.queue_capacity,
        jpeg_quality: config.output.jpeg_quality,
        zone_poll,
    };

    let running = Arc::new(AtomicBool::new(true));
    pipeline::run(&mut sentinel, parts, running).context("主循环异常退出")?;

    // 释放告警出口 (等待排队中的通知发完)
    drop(sentinel);
    info!("👋 数字卫兵退出");
    Ok(())
}

/// 命令行参数覆盖配置文件
fn apply_overrides(config: &mut SentinelConfig, args: &Args) {
    if args.serial.is_some() {
        config.serial_device = args.serial.clone();
    }
    if args.signal_addr.is_some() {
        config.signal_address = args.signal_addr.clone();
    }
    if args.output.is_some() {
        config.output.address = args.output.clone();
    }
    if args.webhook.is_some() {
        config.webhook_url = args.webhook.clone();
    }
    if args.font.is_some() {
        config.output.font_path = args.font.clone();
    }
    if let Some(fps) = args.fps {
        config.input.fps = fps;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use stereo_sentinel::alert::SERIAL_BAUD;

    #[test]
    fn test_serial_help_names_baud_rate() {
        let help = Args::command().render_long_help().to_string();
        assert!(help.contains(&SERIAL_BAUD.to_string()));
        assert!(help.contains("stty"));
    }

    #[test]
    fn test_serial_override() {
        let args = Args::parse_from([
            "sentinel",
            "--left-frames",
            "l",
            "--right-frames",
            "r",
            "--left-detections",
            "l.jsonl",
            "--right-detections",
            "r.jsonl",
            "--serial",
            "/dev/ttyACM0",
        ]);
        let mut config = SentinelConfig::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.serial_device.as_deref(), Some("/dev/ttyACM0"));
    }
}
