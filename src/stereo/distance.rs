//! 双目测距 (Stereo distance estimator)
//!
//! 流水线:
//! 1. 原始视差 → 轨迹视差历史 (定长, 至少3个样本才输出)
//! 2. 历史中位数 → 几何距离 focal * baseline / disparity
//! 3. 校正表分段线性校正
//! 4. 与单目高度估计 K / h 融合
//! 5. 极端框高偏差补偿
//! 6. 时间平滑 (跳变拒绝 + 低通)
//! 7. 最终比例系数

use serde::{Deserialize, Serialize};

use super::calibration::CalibrationTable;
use super::disparity::DisparityHistory;
use super::matcher::MatchedPair;

/// 测距参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoConfig {
    /// 焦距 (像素)
    pub focal_length_px: f32,
    /// 两相机光心距离 (米)
    pub baseline_m: f32,
    /// 视差历史容量
    pub history_capacity: usize,
    /// 输出距离前所需的最少样本数
    pub min_history: usize,
    /// 校正表
    pub calibration: CalibrationTable,
    /// 单目估计常数 K (distance ≈ K / box_height)
    pub pixel_height_constant: f32,
    /// 双目权重, 单目权重 = 1 - stereo_weight
    pub stereo_weight: f32,
    /// 小框阈值与系数
    pub small_box_px: f32,
    pub small_box_factor: f32,
    /// 大框阈值与系数
    pub large_box_px: f32,
    pub large_box_factor: f32,
    /// 单帧最大允许跳变 (英尺), 超过则沿用上一帧
    pub max_jump_ft: f32,
    /// 低通滤波中上一帧的权重
    pub previous_weight: f32,
    /// 最终比例系数
    pub final_scale: f32,
    /// 近距离阈值 (英尺)
    pub near_threshold_ft: f32,
}

impl Default for StereoConfig {
    fn default() -> Self {
        Self {
            focal_length_px: 700.0,
            baseline_m: 18.0 * 0.0254,
            history_capacity: 10,
            min_history: 3,
            calibration: CalibrationTable::default(),
            pixel_height_constant: 2000.0,
            stereo_weight: 0.6,
            small_box_px: 100.0,
            small_box_factor: 0.9,
            large_box_px: 250.0,
            large_box_factor: 1.05,
            max_jump_ft: 5.0,
            previous_weight: 0.8,
            final_scale: 2.0,
            near_threshold_ft: 20.0,
        }
    }
}

/// 距离分档
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeBand {
    Near,
    Far,
}

impl RangeBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            RangeBand::Near => "near",
            RangeBand::Far => "far",
        }
    }
}

/// 一次测距结果
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DistanceEstimate {
    /// 最终距离 (英尺)
    pub distance_ft: f32,
    /// 平滑后视差 (像素)
    pub disparity: f32,
    /// 几何公式原始距离
    pub raw_distance: f32,
    pub band: RangeBand,
}

/// 测距不可用的原因
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unavailable {
    /// 历史样本不足
    InsufficientHistory { have: usize, need: usize },
    /// 视差非正
    NonPositiveDisparity,
    /// 检测框高度非正
    DegenerateBox,
}

/// 每条轨迹独立的测距状态
#[derive(Clone, Debug)]
pub struct StereoState {
    history: DisparityHistory,
    /// 上一次平滑后的距离 (最终比例之前)
    previous: Option<f32>,
    last_estimate: Option<DistanceEstimate>,
}

impl StereoState {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: DisparityHistory::new(capacity),
            previous: None,
            last_estimate: None,
        }
    }

    pub fn history(&self) -> &DisparityHistory {
        &self.history
    }

    pub fn last_estimate(&self) -> Option<&DistanceEstimate> {
        self.last_estimate.as_ref()
    }
}

/// 双目测距器 (无状态, 状态保存在轨迹中)
#[derive(Clone, Debug, Default)]
pub struct DistanceEstimator {
    config: StereoConfig,
}

impl DistanceEstimator {
    pub fn new(config: StereoConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StereoConfig {
        &self.config
    }

    pub fn new_state(&self) -> StereoState {
        StereoState::new(self.config.history_capacity)
    }

    /// 几何距离 + 校正表; 视差非正时返回 None
    pub fn corrected_distance(&self, disparity: f32) -> Option<(f32, f32)> {
        if disparity <= 0.0 || !disparity.is_finite() {
            return None;
        }
        let raw = self.config.focal_length_px * self.config.baseline_m / disparity;
        Some((raw, self.config.calibration.correct(raw)))
    }

    /// 单目估计 K / h
    pub fn pixel_estimate(&self, box_height: f32) -> Option<f32> {
        (box_height > 0.0).then(|| self.config.pixel_height_constant / box_height)
    }

    /// 极端框高补偿
    pub fn height_bias(&self, box_height: f32) -> f32 {
        if box_height < self.config.small_box_px {
            self.config.small_box_factor
        } else if box_height > self.config.large_box_px {
            self.config.large_box_factor
        } else {
            1.0
        }
    }

    /// 对一个匹配对测距, 更新轨迹的测距状态
    pub fn estimate(
        &self,
        state: &mut StereoState,
        pair: &MatchedPair,
    ) -> Result<DistanceEstimate, Unavailable> {
        state.history.push(pair.disparity);

        let need = self.config.min_history.max(1);
        if state.history.len() < need {
            return Err(Unavailable::InsufficientHistory {
                have: state.history.len(),
                need,
            });
        }

        let disparity = state
            .history
            .median()
            .ok_or(Unavailable::InsufficientHistory { have: 0, need })?;
        let (raw, corrected) = self
            .corrected_distance(disparity)
            .ok_or(Unavailable::NonPositiveDisparity)?;

        let box_height = pair.left.height();
        let pixel = self
            .pixel_estimate(box_height)
            .ok_or(Unavailable::DegenerateBox)?;

        let w = self.config.stereo_weight;
        let mut distance = w * corrected + (1.0 - w) * pixel;
        distance *= self.height_bias(box_height);

        // 时间平滑: 大跳变视为离群值
        if let Some(prev) = state.previous {
            distance = if (prev - distance).abs() > self.config.max_jump_ft {
                prev
            } else {
                let p = self.config.previous_weight;
                p * prev + (1.0 - p) * distance
            };
        }
        state.previous = Some(distance);

        let distance_ft = distance * self.config.final_scale;
        let band = if distance_ft <= self.config.near_threshold_ft {
            RangeBand::Near
        } else {
            RangeBand::Far
        };

        let estimate = DistanceEstimate {
            distance_ft,
            disparity,
            raw_distance: raw,
            band,
        };
        state.last_estimate = Some(estimate);
        Ok(estimate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::{BBox, Detection};

    fn pair(left: BBox, right: BBox) -> MatchedPair {
        MatchedPair::new(Detection::person(left, 0.9), Detection::person(right, 0.9))
    }

    fn scenario_pair() -> MatchedPair {
        pair(
            BBox::new(100.0, 200.0, 140.0, 260.0),
            BBox::new(96.0, 204.0, 136.0, 264.0),
        )
    }

    #[test]
    fn test_requires_three_samples() {
        let est = DistanceEstimator::default();
        let mut state = est.new_state();
        let p = scenario_pair();

        assert_eq!(
            est.estimate(&mut state, &p),
            Err(Unavailable::InsufficientHistory { have: 1, need: 3 })
        );
        assert!(est.estimate(&mut state, &p).is_err());
        assert!(est.estimate(&mut state, &p).is_ok());
    }

    #[test]
    fn test_scenario_is_far() {
        let est = DistanceEstimator::default();
        let mut state = est.new_state();
        let p = scenario_pair();
        let mut last = None;
        for _ in 0..3 {
            last = est.estimate(&mut state, &p).ok();
        }
        let e = last.unwrap();
        assert!((e.disparity - 4.0).abs() < 1e-4);
        // 原始距离远超校正表最远点, 使用表尾系数
        assert!(est.config().calibration.beyond_range(e.raw_distance));
        assert_eq!(e.band, RangeBand::Far);

        // 700 * 0.4572 / 4 = 80.01; *1.43 - 0.6 = 113.81
        // 0.6*113.81 + 0.4*(2000/60) = 81.62; 小框 *0.9 = 73.46; *2 = 146.92
        assert!((e.distance_ft - 146.92).abs() < 0.05);
    }

    #[test]
    fn test_zero_disparity_unavailable() {
        let est = DistanceEstimator::default();
        let mut state = est.new_state();
        let b = BBox::new(100.0, 100.0, 140.0, 200.0);
        let p = pair(b, b);
        for _ in 0..2 {
            let _ = est.estimate(&mut state, &p);
        }
        assert_eq!(
            est.estimate(&mut state, &p),
            Err(Unavailable::NonPositiveDisparity)
        );
    }

    #[test]
    fn test_deterministic_given_same_history() {
        let est = DistanceEstimator::default();
        let seq = [30.0, 31.0, 29.5, 30.5];
        let run = || {
            let mut state = est.new_state();
            let mut out = None;
            for d in seq {
                let p = pair(
                    BBox::new(300.0, 100.0, 340.0, 250.0),
                    BBox::new(300.0 - d, 100.0, 340.0 - d, 250.0),
                );
                out = est.estimate(&mut state, &p).ok();
            }
            out
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_constant_stream_converges() {
        let est = DistanceEstimator::default();
        let mut state = est.new_state();
        let p = pair(
            BBox::new(300.0, 100.0, 340.0, 250.0),
            BBox::new(270.0, 100.0, 310.0, 250.0),
        );
        let outputs: Vec<f32> = (0..25)
            .filter_map(|_| est.estimate(&mut state, &p).ok())
            .map(|e| e.distance_ft)
            .collect();
        assert_eq!(outputs.len(), 23);
        let tail = &outputs[outputs.len() - 10..];
        assert!(tail.iter().all(|d| (d - tail[0]).abs() < 1e-4));
    }

    #[test]
    fn test_jump_rejected_then_low_pass() {
        let est = DistanceEstimator::default();
        let mut state = est.new_state();
        state.previous = Some(5.0);
        state.history.push(30.0);
        state.history.push(30.0);

        // 框高 150: 无偏差补偿
        let p = pair(
            BBox::new(300.0, 100.0, 340.0, 250.0),
            BBox::new(270.0, 100.0, 310.0, 250.0),
        );
        let e = est.estimate(&mut state, &p).unwrap();
        // 新值 (约 14.6) 与 5 相差超过 5, 沿用 5
        assert!((e.distance_ft - 10.0).abs() < 1e-4);

        state.previous = Some(18.0);
        let e = est.estimate(&mut state, &p).unwrap();
        let fresh = {
            let (_, corrected) = est.corrected_distance(30.0).unwrap();
            0.6 * corrected + 0.4 * (2000.0 / 150.0)
        };
        let expected = (0.8 * 18.0 + 0.2 * fresh) * 2.0;
        assert!((e.distance_ft - expected).abs() < 1e-3);
    }

    #[test]
    fn test_height_bias() {
        let est = DistanceEstimator::default();
        assert_eq!(est.height_bias(60.0), 0.9);
        assert_eq!(est.height_bias(150.0), 1.0);
        assert_eq!(est.height_bias(300.0), 1.05);
    }
}
