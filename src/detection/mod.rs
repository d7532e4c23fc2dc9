/// 检测系统 (Detection System)
///
/// - Types:    检测框 / 检测结果 / person 过滤
/// - Detector: 检测器边界 (外部检测器, 回放)
/// - Tracker:  跨帧身份跟踪
pub mod detector;
pub mod tracker;
pub mod types;

pub use detector::{FnDetector, PersonDetector, ReplayDetector};
pub use tracker::{Association, IdentityTracker, Observation, Track, TrackerConfig};
pub use types::{filter_persons, BBox, Detection, PERSON_CLASS_ID};

use serde::{Deserialize, Serialize};

/// 检测过滤参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// 置信度阈值 (大于等于)
    pub confidence_threshold: f32,
    pub person_class_id: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            person_class_id: PERSON_CLASS_ID,
        }
    }
}

impl DetectionConfig {
    pub fn filter(&self, detections: &[Detection]) -> Vec<Detection> {
        filter_persons(detections, self.person_class_id, self.confidence_threshold)
    }
}
