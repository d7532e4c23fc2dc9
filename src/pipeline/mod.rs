/// 处理流水线 (Processing Pipeline)
///
/// 每个时间步: 过滤 → 跨视角匹配 → 身份关联 → 测距 → 区域判定 → 告警
/// - SentinelPipeline: 单步核心逻辑, 不做任何 I/O (告警出口除外)
/// - Runner:           采集线程 + 检测 + 合成 + 输出的阻塞主循环
pub mod runner;

pub use runner::{run, RunnerParts};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::alert::{AlertOutcome, AlertStateMachine, LineLevel, Occupant};
use crate::detection::{Association, BBox, Detection, DetectionConfig, IdentityTracker, Observation};
use crate::error::Result;
use crate::geofence::{GeofenceClassifier, LoadReport, Severity, ZoneStore};
use crate::stereo::{CrossViewMatcher, DistanceEstimator, RangeBand};

// ========== 步结果 ==========

/// 一个人在本步的结果
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersonReport {
    pub track_id: u32,
    /// 本步新建的轨迹
    pub new_track: bool,
    pub left: BBox,
    pub right: BBox,
    /// 本步原始视差 (像素)
    pub disparity: f32,
    /// 历史中位数视差, 历史不足时为空
    pub smoothed_disparity: Option<f32>,
    /// 最终距离 (英尺), 历史不足时为空
    pub distance_ft: Option<f32>,
    pub band: Option<RangeBand>,
    /// 地面坐标 (英尺)
    pub ground: Option<(f32, f32)>,
    /// 决定告警的区域
    pub zone: Option<String>,
    pub severity: Option<Severity>,
    pub color: (u8, u8, u8),
}

/// 一个时间步的完整结果
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: u64,
    /// 相对运行开始的秒数
    pub timestamp_secs: f64,
    pub persons: Vec<PersonReport>,
    /// 本步淘汰的轨迹
    pub evicted: Vec<u32>,
    pub intrusion: bool,
    pub active_tiers: Vec<Severity>,
    pub line_level: LineLevel,
}

/// 运行统计
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub steps: u64,
    pub pairs_matched: u64,
    pub estimates: u64,
    pub tracks_created: u64,
    pub intrusion_steps: u64,
    pub notifications_sent: u64,
}

impl RunStats {
    pub fn log_summary(&self) {
        info!("\n📊 ============ 运行统计 ============");
        info!("  处理步数: {}", self.steps);
        info!("  匹配人数: {}", self.pairs_matched);
        info!("  有效测距: {}", self.estimates);
        info!("  新建轨迹: {}", self.tracks_created);
        info!("  入侵步数: {}", self.intrusion_steps);
        info!("  发送通知: {}", self.notifications_sent);
    }
}

// ========== 核心 ==========

/// 单步处理器, 独占跟踪器/区域/告警状态
pub struct SentinelPipeline {
    detection: DetectionConfig,
    matcher: CrossViewMatcher,
    estimator: DistanceEstimator,
    tracker: IdentityTracker,
    classifier: GeofenceClassifier,
    zones: ZoneStore,
    alerts: AlertStateMachine,
    stats: RunStats,
    step: u64,
}

impl SentinelPipeline {
    pub fn new(
        detection: DetectionConfig,
        matcher: CrossViewMatcher,
        estimator: DistanceEstimator,
        tracker: IdentityTracker,
        classifier: GeofenceClassifier,
        zones: ZoneStore,
        alerts: AlertStateMachine,
    ) -> Self {
        Self {
            detection,
            matcher,
            estimator,
            tracker,
            classifier,
            zones,
            alerts,
            stats: RunStats::default(),
            step: 0,
        }
    }

    /// 处理一个时间步. now 必须单调不减
    pub fn process_step(&mut self, left: &[Detection], right: &[Detection], now: Duration) -> StepReport {
        let evicted = self.tracker.begin_step(now);

        let left = self.detection.filter(left);
        let right = self.detection.filter(right);
        let pairs = self.matcher.match_views(&left, &right);

        let mut persons = Vec::with_capacity(pairs.len());
        let mut occupants = Vec::new();

        for pair in &pairs {
            let obs = Observation {
                center: pair.left.center(),
                height: pair.left.height(),
            };
            let association = self
                .tracker
                .associate(obs, now, || self.estimator.new_state());
            let id = association.id();
            let Some(track) = self.tracker.get_mut(id) else {
                continue;
            };

            let mut report = PersonReport {
                track_id: id,
                new_track: matches!(association, Association::Created(_)),
                left: pair.left.bbox,
                right: pair.right.bbox,
                disparity: pair.disparity,
                smoothed_disparity: None,
                distance_ft: None,
                band: None,
                ground: None,
                zone: None,
                severity: None,
                color: track.color,
            };

            match self.estimator.estimate(&mut track.stereo, pair) {
                Ok(estimate) => {
                    let hit = self.classifier.classify(
                        pair.left.bbox.center_x(),
                        estimate.distance_ft,
                        self.zones.zones(),
                    );
                    report.distance_ft = Some(estimate.distance_ft);
                    report.smoothed_disparity = Some(estimate.disparity);
                    report.band = Some(estimate.band);
                    report.ground = Some(hit.ground);
                    if let Some((zone, severity)) = hit.governing.clone() {
                        occupants.push(Occupant {
                            track_id: id,
                            zone: zone.clone(),
                            severity,
                        });
                        report.zone = Some(zone);
                        report.severity = Some(severity);
                    }
                    track.zone = Some(hit);
                }
                Err(reason) => {
                    debug!("#{} 暂无距离: {:?}", id, reason);
                }
            }
            persons.push(report);
        }

        let outcome = self.alerts.evaluate(now, &occupants);
        for occupant in &occupants {
            if let Some(track) = self.tracker.get_mut(occupant.track_id) {
                track.alerting = true;
            }
        }

        self.record(&persons, &outcome);
        let report = StepReport {
            step: self.step,
            timestamp_secs: now.as_secs_f64(),
            persons,
            evicted,
            intrusion: outcome.intrusion(),
            active_tiers: outcome.active.clone(),
            line_level: self.alerts.line_level(),
        };
        debug!(
            "步 {}: {} 人, 入侵={}",
            report.step,
            report.persons.len(),
            report.intrusion
        );
        self.step += 1;
        report
    }

    fn record(&mut self, persons: &[PersonReport], outcome: &AlertOutcome) {
        self.stats.steps += 1;
        self.stats.pairs_matched += persons.len() as u64;
        self.stats.estimates += persons.iter().filter(|p| p.distance_ft.is_some()).count() as u64;
        self.stats.tracks_created = self.tracker.created_total();
        self.stats.notifications_sent += outcome.notified.len() as u64;
        if outcome.intrusion() {
            self.stats.intrusion_steps += 1;
        }
    }

    /// 区域文件变化时重新加载; 失败保留原区域
    pub fn refresh_zones(&mut self) -> Result<Option<LoadReport>> {
        self.zones.reload_if_changed()
    }

    /// 关闭: 拉低信号线
    pub fn shutdown(&mut self) {
        self.alerts.release();
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn tracker(&self) -> &IdentityTracker {
        &self.tracker
    }

    pub fn zones(&self) -> &ZoneStore {
        &self.zones
    }

    pub fn alerts(&self) -> &AlertStateMachine {
        &self.alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertConfig, AlertMessage, NotificationSink, NullSignalLine};
    use crate::detection::TrackerConfig;
    use crate::geofence::{default_zones, GeofenceConfig};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Collect(Arc<Mutex<Vec<AlertMessage>>>);

    impl NotificationSink for Collect {
        fn dispatch(&self, message: AlertMessage) -> bool {
            self.0.lock().unwrap().push(message);
            true
        }
    }

    fn pipeline() -> (SentinelPipeline, Collect) {
        let sink = Collect::default();
        let alerts = AlertStateMachine::new(
            AlertConfig::default(),
            Box::new(NullSignalLine),
            Box::new(sink.clone()),
        );
        let p = SentinelPipeline::new(
            DetectionConfig::default(),
            CrossViewMatcher::default(),
            DistanceEstimator::default(),
            IdentityTracker::new(TrackerConfig::default()),
            GeofenceClassifier::default(),
            ZoneStore::in_memory(default_zones(), GeofenceConfig::default()),
            alerts,
        );
        (p, sink)
    }

    fn person(l: f32, t: f32, r: f32, b: f32) -> Detection {
        Detection::person(BBox::new(l, t, r, b), 0.9)
    }

    fn at(step: u64) -> Duration {
        Duration::from_millis(50 * step)
    }

    #[test]
    fn test_scenario_far_person_no_intrusion() {
        let (mut p, sink) = pipeline();
        let left = [person(100.0, 200.0, 140.0, 260.0)];
        let right = [person(96.0, 204.0, 136.0, 264.0)];

        let first = p.process_step(&left, &right, at(0));
        assert_eq!(first.persons.len(), 1);
        assert!(first.persons[0].new_track);
        assert!((first.persons[0].disparity - 4.0).abs() < 1e-4);
        assert_eq!(first.persons[0].distance_ft, None);
        assert_eq!(first.persons[0].smoothed_disparity, None);

        p.process_step(&left, &right, at(1));
        let third = p.process_step(&left, &right, at(2));
        let person = &third.persons[0];
        assert_eq!(person.track_id, 1);
        assert!(!person.new_track);
        assert_eq!(person.band, Some(RangeBand::Far));
        assert!(person.distance_ft.unwrap() > 100.0);
        assert!((person.smoothed_disparity.unwrap() - 4.0).abs() < 1e-4);
        assert!(!third.intrusion);
        assert!(sink.0.lock().unwrap().is_empty());
        assert_eq!(p.stats().estimates, 1);
    }

    #[test]
    fn test_bad_pair_does_not_block_good_pair() {
        let (mut p, sink) = pipeline();
        // 画面中央, 视差 96 → 约 12 英尺 (红区)
        let good = (
            person(295.0, 50.0, 345.0, 300.0),
            person(199.0, 50.0, 249.0, 300.0),
        );
        // 左右完全相同: 视差为 0
        let flat = person(500.0, 100.0, 540.0, 200.0);

        let mut last = None;
        for step in 0..3 {
            last = Some(p.process_step(&[good.0, flat], &[flat, good.1], at(step)));
        }
        let report = last.unwrap();
        assert_eq!(report.persons.len(), 2);

        let ok = report.persons.iter().find(|r| r.left == good.0.bbox).unwrap();
        assert!((ok.distance_ft.unwrap() - 12.0).abs() < 0.1);
        assert_eq!(ok.zone.as_deref(), Some("red"));
        assert!((ok.smoothed_disparity.unwrap() - 96.0).abs() < 1e-3);

        let bad = report.persons.iter().find(|r| r.left == flat.bbox).unwrap();
        assert_eq!(bad.disparity, 0.0);
        assert_eq!(bad.distance_ft, None);
        assert_eq!(bad.zone, None);
        assert_ne!(bad.track_id, ok.track_id);

        assert!(report.intrusion);
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_smoothed_disparity_is_history_median() {
        let (mut p, _) = pipeline();
        let left = person(300.0, 100.0, 340.0, 250.0);
        let mut last = None;
        for (step, d) in [30.0, 31.0, 50.0].into_iter().enumerate() {
            let right = person(300.0 - d, 100.0, 340.0 - d, 250.0);
            last = Some(p.process_step(&[left], &[right], at(step as u64)));
        }
        let person = &last.unwrap().persons[0];
        assert!((person.disparity - 50.0).abs() < 1e-4);
        assert!((person.smoothed_disparity.unwrap() - 31.0).abs() < 1e-4);
    }

    #[test]
    fn test_low_confidence_and_other_classes_ignored() {
        let (mut p, _) = pipeline();
        let weak = Detection::person(BBox::new(0.0, 0.0, 40.0, 100.0), 0.3);
        let car = Detection {
            class_id: 2,
            confidence: 0.9,
            bbox: BBox::new(0.0, 0.0, 40.0, 100.0),
        };
        let report = p.process_step(&[weak, car], &[weak, car], at(0));
        assert!(report.persons.is_empty());
        assert_eq!(p.tracker().track_count(), 0);
    }

    #[test]
    fn test_empty_step_evicts_and_clears() {
        let (mut p, _) = pipeline();
        let left = [person(100.0, 200.0, 140.0, 260.0)];
        let right = [person(96.0, 204.0, 136.0, 264.0)];
        p.process_step(&left, &right, at(0));
        let report = p.process_step(&[], &[], Duration::from_secs(2));
        assert_eq!(report.evicted, vec![1]);
        assert!(report.persons.is_empty());
        assert_eq!(p.stats().steps, 2);
    }
}
