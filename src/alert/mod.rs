/// 告警 (Alerting)
///
/// - Signal: 硬件信号线 (串口/TCP), 电平变化时写令牌
/// - Notify: 通知通道 + 后台发送线程
/// - 状态机: 每个告警等级独立的 CLEAR / ACTIVE, 共用一个通知冷却时钟
pub mod notify;
pub mod signal;

pub use notify::{
    AlertMessage, LogNotifier, NotificationDispatcher, NotificationSink, Notifier, WebhookNotifier,
};
pub use signal::{LineLevel, NullSignalLine, SignalLine, StreamSignalLine, SERIAL_BAUD};

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::geofence::Severity;

/// 单个等级的响应策略
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TierPolicy {
    /// 激活时拉高信号线
    pub drive_signal: bool,
    /// 激活时发送通知
    pub notify: bool,
}

/// 告警参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// 两次通知之间的最短间隔 (秒)
    pub cooldown_secs: f32,
    /// 持续入侵期间每个冷却周期重复通知
    pub repeat_while_active: bool,
    pub on_token: String,
    pub off_token: String,
    pub alarm: TierPolicy,
    pub warning: TierPolicy,
    pub subject: String,
    pub message: String,
    pub recipients: Vec<String>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 30.0,
            repeat_while_active: false,
            on_token: "RED_ON\n".into(),
            off_token: "RED_OFF\n".into(),
            alarm: TierPolicy {
                drive_signal: true,
                notify: true,
            },
            warning: TierPolicy {
                drive_signal: false,
                notify: false,
            },
            subject: "Intrusion Alert".into(),
            message: "Intrusion Detected!".into(),
            recipients: Vec::new(),
        }
    }
}

impl AlertConfig {
    pub fn cooldown(&self) -> Duration {
        // 超出 Duration 范围时视为永不冷却完毕
        Duration::try_from_secs_f32(self.cooldown_secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    pub fn policy(&self, severity: Severity) -> TierPolicy {
        match severity {
            Severity::Alarm => self.alarm,
            Severity::Warning => self.warning,
        }
    }
}

/// 告警阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPhase {
    Clear,
    Active,
}

/// 本步处在某等级区域内的一个目标
#[derive(Clone, Debug, PartialEq)]
pub struct Occupant {
    pub track_id: u32,
    pub zone: String,
    pub severity: Severity,
}

/// 本步状态机的输出
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AlertOutcome {
    /// 处于激活状态的等级
    pub active: Vec<Severity>,
    /// 本步进入激活的等级
    pub raised: Vec<Severity>,
    /// 本步恢复为 CLEAR 的等级
    pub cleared: Vec<Severity>,
    /// 本步发出的通知
    pub notified: Vec<Severity>,
    /// 电平变化 (None 表示不变)
    pub line_change: Option<LineLevel>,
}

impl AlertOutcome {
    pub fn intrusion(&self) -> bool {
        !self.active.is_empty()
    }
}

#[derive(Clone, Copy, Debug)]
struct TierState {
    phase: AlertPhase,
    notified_this_episode: bool,
}

/// 告警状态机: 拥有信号线与通知出口
pub struct AlertStateMachine {
    config: AlertConfig,
    tiers: BTreeMap<Severity, TierState>,
    line_level: LineLevel,
    last_notification: Option<Duration>,
    line: Box<dyn SignalLine>,
    sink: Box<dyn NotificationSink>,
}

impl AlertStateMachine {
    pub fn new(
        config: AlertConfig,
        line: Box<dyn SignalLine>,
        sink: Box<dyn NotificationSink>,
    ) -> Self {
        let tiers = Severity::ALL
            .iter()
            .map(|s| {
                (
                    *s,
                    TierState {
                        phase: AlertPhase::Clear,
                        notified_this_episode: false,
                    },
                )
            })
            .collect();
        Self {
            config,
            tiers,
            line_level: LineLevel::Low,
            last_notification: None,
            line,
            sink,
        }
    }

    pub fn phase(&self, severity: Severity) -> AlertPhase {
        self.tiers
            .get(&severity)
            .map_or(AlertPhase::Clear, |t| t.phase)
    }

    pub fn line_level(&self) -> LineLevel {
        self.line_level
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    /// 每步调用一次; occupants 为本步所有在区域内的目标
    pub fn evaluate(&mut self, now: Duration, occupants: &[Occupant]) -> AlertOutcome {
        let mut outcome = AlertOutcome::default();
        let cooldown = self.config.cooldown();

        for severity in Severity::ALL {
            let members: Vec<&Occupant> =
                occupants.iter().filter(|o| o.severity == severity).collect();
            let policy = self.config.policy(severity);
            let Some(tier) = self.tiers.get_mut(&severity) else {
                continue;
            };

            if members.is_empty() {
                if tier.phase == AlertPhase::Active {
                    tier.phase = AlertPhase::Clear;
                    tier.notified_this_episode = false;
                    outcome.cleared.push(severity);
                    info!("✅ {} 解除", severity.as_str());
                }
                continue;
            }

            outcome.active.push(severity);
            if tier.phase == AlertPhase::Clear {
                tier.phase = AlertPhase::Active;
                tier.notified_this_episode = false;
                outcome.raised.push(severity);
                info!("🚨 {} 触发: {} 个目标", severity.as_str(), members.len());
            }

            if !policy.notify {
                continue;
            }
            let eligible = !tier.notified_this_episode || self.config.repeat_while_active;
            let cooled = self
                .last_notification
                .map_or(true, |t| now.saturating_sub(t) >= cooldown);
            if eligible && cooled {
                let mut zones: Vec<String> = members.iter().map(|m| m.zone.clone()).collect();
                zones.sort();
                zones.dedup();
                let track_ids = members.iter().map(|m| m.track_id).collect();
                let message = AlertMessage::new(
                    self.config.subject.clone(),
                    &self.config.message,
                    severity,
                    zones,
                    track_ids,
                    self.config.recipients.clone(),
                );
                // 投递失败也计入冷却
                self.sink.dispatch(message);
                self.last_notification = Some(now);
                tier.notified_this_episode = true;
                outcome.notified.push(severity);
            }
        }

        let desired = if outcome
            .active
            .iter()
            .any(|s| self.config.policy(*s).drive_signal)
        {
            LineLevel::High
        } else {
            LineLevel::Low
        };
        if desired != self.line_level {
            let token = match desired {
                LineLevel::High => self.config.on_token.as_bytes(),
                LineLevel::Low => self.config.off_token.as_bytes(),
            };
            if !signal::drive(self.line.as_mut(), token) {
                warn!("⚠️ 信号线写入失败, 软件状态仍为 {:?}", desired);
            }
            self.line_level = desired;
            outcome.line_change = Some(desired);
        }
        outcome
    }

    /// 关闭前拉低信号线
    pub fn release(&mut self) {
        if self.line_level == LineLevel::High {
            signal::drive(self.line.as_mut(), self.config.off_token.as_bytes());
            self.line_level = LineLevel::Low;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SentinelError};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct MockLine {
        writes: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl SignalLine for MockLine {
        fn write_token(&mut self, token: &[u8]) -> Result<()> {
            if self.fail {
                return Err(SentinelError::Signal("unplugged".into()));
            }
            self.writes
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(token).into_owned());
            Ok(())
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    #[derive(Clone, Default)]
    struct MockSink(Arc<Mutex<Vec<AlertMessage>>>);

    impl NotificationSink for MockSink {
        fn dispatch(&self, message: AlertMessage) -> bool {
            self.0.lock().unwrap().push(message);
            true
        }
    }

    fn machine(config: AlertConfig) -> (AlertStateMachine, MockLine, MockSink) {
        let line = MockLine::default();
        let sink = MockSink::default();
        let m = AlertStateMachine::new(config, Box::new(line.clone()), Box::new(sink.clone()));
        (m, line, sink)
    }

    fn red(id: u32) -> Occupant {
        Occupant {
            track_id: id,
            zone: "red".into(),
            severity: Severity::Alarm,
        }
    }

    fn blue(id: u32) -> Occupant {
        Occupant {
            track_id: id,
            zone: "blue".into(),
            severity: Severity::Warning,
        }
    }

    fn at(step: u32) -> Duration {
        Duration::from_millis(100 * step as u64)
    }

    #[test]
    fn test_dwell_holds_line_and_notifies_once() {
        let (mut m, line, sink) = machine(AlertConfig::default());
        // 在红区停留 50 步 (5 秒)
        for step in 0..50 {
            let out = m.evaluate(at(step), &[red(1)]);
            assert!(out.intrusion());
            assert_eq!(m.line_level(), LineLevel::High);
        }
        let out = m.evaluate(at(50), &[]);
        assert_eq!(out.line_change, Some(LineLevel::Low));
        assert_eq!(out.cleared, vec![Severity::Alarm]);
        assert_eq!(m.phase(Severity::Alarm), AlertPhase::Clear);

        assert_eq!(*line.writes.lock().unwrap(), vec!["RED_ON\n", "RED_OFF\n"]);
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_cooldown_suppresses_rapid_reentry() {
        let (mut m, line, sink) = machine(AlertConfig::default());
        m.evaluate(at(0), &[red(1)]);
        m.evaluate(at(1), &[]);
        m.evaluate(at(2), &[red(2)]);
        m.evaluate(at(3), &[]);
        assert_eq!(sink.0.lock().unwrap().len(), 1);
        // 线电平每次都跟随
        assert_eq!(line.writes.lock().unwrap().len(), 4);

        // 冷却结束后再次进入 → 新通知
        let later = at(3) + Duration::from_secs(31);
        let out = m.evaluate(later, &[red(3)]);
        assert_eq!(out.notified, vec![Severity::Alarm]);
        assert_eq!(sink.0.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_repeat_while_active_once_per_window() {
        let config = AlertConfig {
            cooldown_secs: 1.0,
            repeat_while_active: true,
            ..Default::default()
        };
        let (mut m, _line, sink) = machine(config);
        // 持续 3.5 秒 → t=0, 1.0, 2.0, 3.0 各一次
        for step in 0..=35 {
            m.evaluate(at(step), &[red(1)]);
        }
        assert_eq!(sink.0.lock().unwrap().len(), 4);
    }

    #[test]
    fn test_warning_tier_does_not_drive_line() {
        let (mut m, line, sink) = machine(AlertConfig::default());
        let out = m.evaluate(at(0), &[blue(1)]);
        assert_eq!(out.active, vec![Severity::Warning]);
        assert_eq!(out.line_change, None);
        assert_eq!(m.line_level(), LineLevel::Low);
        assert!(line.writes.lock().unwrap().is_empty());
        assert!(sink.0.lock().unwrap().is_empty());
        assert_eq!(m.phase(Severity::Warning), AlertPhase::Active);
    }

    #[test]
    fn test_tiers_are_independent() {
        let (mut m, line, _sink) = machine(AlertConfig::default());
        m.evaluate(at(0), &[blue(1), red(2)]);
        let out = m.evaluate(at(1), &[blue(1)]);
        assert_eq!(out.cleared, vec![Severity::Alarm]);
        assert_eq!(m.phase(Severity::Warning), AlertPhase::Active);
        assert_eq!(m.line_level(), LineLevel::Low);
        assert_eq!(*line.writes.lock().unwrap(), vec!["RED_ON\n", "RED_OFF\n"]);
    }

    #[test]
    fn test_write_failure_keeps_software_state() {
        let line = MockLine {
            fail: true,
            ..Default::default()
        };
        let sink = MockSink::default();
        let mut m = AlertStateMachine::new(
            AlertConfig::default(),
            Box::new(line),
            Box::new(sink.clone()),
        );
        let out = m.evaluate(at(0), &[red(1)]);
        assert_eq!(out.line_change, Some(LineLevel::High));
        assert_eq!(m.line_level(), LineLevel::High);
        assert_eq!(m.phase(Severity::Alarm), AlertPhase::Active);
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_huge_cooldown_saturates() {
        let config = AlertConfig {
            cooldown_secs: 1e30,
            ..Default::default()
        };
        assert_eq!(config.cooldown(), Duration::MAX);
        assert_eq!(
            AlertConfig {
                cooldown_secs: f32::INFINITY,
                ..Default::default()
            }
            .cooldown(),
            Duration::MAX
        );

        let (mut m, line, sink) = machine(config);
        let out = m.evaluate(Duration::ZERO, &[red(1)]);
        assert_eq!(out.notified, vec![Severity::Alarm]);
        m.evaluate(at(1), &[]);
        m.evaluate(at(2), &[red(1)]);
        assert_eq!(sink.0.lock().unwrap().len(), 1);
        assert_eq!(line.writes.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_release_lowers_line() {
        let (mut m, line, _sink) = machine(AlertConfig::default());
        m.evaluate(at(0), &[red(1)]);
        m.release();
        m.release();
        assert_eq!(*line.writes.lock().unwrap(), vec!["RED_ON\n", "RED_OFF\n"]);
    }
}
