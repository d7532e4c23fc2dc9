//! 系统配置 - 通过JSON文件调整参数
//!
//! 文件不存在时写入默认配置; 解析失败时使用默认值并给出警告.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::alert::AlertConfig;
use crate::detection::{DetectionConfig, TrackerConfig};
use crate::error::{Result, SentinelError};
use crate::geofence::GeofenceConfig;
use crate::input::InputConfig;
use crate::output::OutputConfig;
use crate::stereo::{MatcherConfig, StereoConfig};

/// 时间类参数 (秒) 的上限
pub const MAX_INTERVAL_SECS: f32 = 86_400.0;

/// 全部参数, 每个组件一节
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    pub detection: DetectionConfig,
    pub matcher: MatcherConfig,
    pub stereo: StereoConfig,
    pub tracker: TrackerConfig,
    pub geofence: GeofenceConfig,
    pub alert: AlertConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
    /// 信号线: 串口设备路径
    pub serial_device: Option<String>,
    /// 信号线: TCP 转发地址 (与串口二选一, 串口优先)
    pub signal_address: Option<String>,
    /// 通知网关 (HTTP POST JSON)
    pub webhook_url: Option<String>,
    /// 区域文件轮询间隔 (秒), 0 表示不热加载
    pub zone_poll_secs: f32,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            matcher: MatcherConfig::default(),
            stereo: StereoConfig::default(),
            tracker: TrackerConfig::default(),
            geofence: GeofenceConfig::default(),
            alert: AlertConfig::default(),
            input: InputConfig::default(),
            output: OutputConfig::default(),
            serial_device: None,
            signal_address: None,
            webhook_url: None,
            zone_poll_secs: 2.0,
        }
    }
}

impl SentinelConfig {
    /// 从JSON文件加载配置
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str::<Self>(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️  配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    warn!("❌ 保存配置失败: {}", e);
                }
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        info!("💾 配置已保存到 {}", path.as_ref().display());
        Ok(())
    }

    /// 跨节一致性检查
    pub fn validate(&self) -> Result<()> {
        if self.stereo.history_capacity == 0 {
            return Err(SentinelError::Config("stereo.history_capacity 必须大于0".into()));
        }
        if self.stereo.min_history == 0 || self.stereo.min_history > self.stereo.history_capacity {
            return Err(SentinelError::Config(format!(
                "stereo.min_history 必须在 1..={} 之间",
                self.stereo.history_capacity
            )));
        }
        if !(self.stereo.focal_length_px > 0.0 && self.stereo.baseline_m > 0.0) {
            return Err(SentinelError::Config("焦距与基线必须为正".into()));
        }
        check_interval("alert.cooldown_secs", self.alert.cooldown_secs)?;
        check_interval("tracker.timeout_secs", self.tracker.timeout_secs)?;
        check_interval("zone_poll_secs", self.zone_poll_secs)?;
        let fps = self.input.fps;
        if !(fps == 0.0 || (0.1..=1000.0).contains(&fps)) {
            return Err(SentinelError::Config(format!(
                "input.fps 必须为 0 或在 0.1..=1000 之间, 实际 {}",
                self.input.fps
            )));
        }
        if self.input.frame_width == 0 || self.input.frame_height == 0 {
            return Err(SentinelError::Config("输入分辨率不能为0".into()));
        }
        if self.input.frame_width as f32 != self.geofence.image_width_px {
            warn!(
                "⚠️  geofence.image_width_px ({}) 与输入宽度 ({}) 不一致",
                self.geofence.image_width_px, self.input.frame_width
            );
        }
        Ok(())
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("\n🎛️  当前配置:");
        info!("  检测置信度: {:.2}", self.detection.confidence_threshold);
        info!(
            "  焦距/基线: {:.0}px / {:.4}m",
            self.stereo.focal_length_px, self.stereo.baseline_m
        );
        info!(
            "  跟踪: 距离<{:.0}px 高度差<{:.0}px 超时{:.1}s",
            self.tracker.max_center_distance_px,
            self.tracker.max_height_diff_px,
            self.tracker.timeout_secs
        );
        info!("  通知冷却: {:.0}s", self.alert.cooldown_secs);
        info!(
            "  输入: {}x{} @ {} fps",
            self.input.frame_width, self.input.frame_height, self.input.fps
        );
    }
}

/// 有限, 非负, 不超过上限
fn check_interval(name: &str, secs: f32) -> Result<()> {
    if secs.is_finite() && (0.0..=MAX_INTERVAL_SECS).contains(&secs) {
        Ok(())
    } else {
        Err(SentinelError::Config(format!(
            "{} 必须在 0..={} 秒之间, 实际 {}",
            name, MAX_INTERVAL_SECS, secs
        )))
    }
}
