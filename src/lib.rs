#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod alert; // 告警状态机 / 信号线 / 通知
pub mod config; // 系统配置参数
pub mod detection; // 检测边界与身份跟踪
pub mod error; // 错误类型
pub mod geofence; // 电子围栏
pub mod input; // 视频输入系统
pub mod output; // 画面合成与推送
pub mod pipeline; // 单步处理与主循环
pub mod stereo; // 双目匹配与测距

pub use crate::config::SentinelConfig;
pub use crate::error::{Result, SentinelError};
pub use crate::pipeline::{PersonReport, RunStats, SentinelPipeline, StepReport};
