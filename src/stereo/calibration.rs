//! 距离校正表 (Distance calibration table)
//!
//! 几何公式在不同距离上的偏差由实测得到, 按 (距离, 比例, 偏移) 三元组分段线性插值.
//! 超出表格范围时保持端点值.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SentinelError};

/// 校正表中的一个采样点
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub distance: f32,
    pub scale: f32,
    pub offset: f32,
}

impl CalibrationPoint {
    pub const fn new(distance: f32, scale: f32, offset: f32) -> Self {
        Self {
            distance,
            scale,
            offset,
        }
    }
}

/// 分段线性校正表 (按距离升序)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CalibrationPoint>", into = "Vec<CalibrationPoint>")]
pub struct CalibrationTable {
    points: Vec<CalibrationPoint>,
}

impl Default for CalibrationTable {
    /// 18英寸基线 + OV5647 双目实测值
    fn default() -> Self {
        Self {
            points: vec![
                CalibrationPoint::new(6.0, 1.49, -0.3),
                CalibrationPoint::new(10.0, 1.48, -0.3),
                CalibrationPoint::new(15.0, 1.46, -0.4),
                CalibrationPoint::new(20.0, 1.44, -0.5),
                CalibrationPoint::new(25.0, 1.43, -0.6),
            ],
        }
    }
}

impl CalibrationTable {
    pub fn new(mut points: Vec<CalibrationPoint>) -> Result<Self> {
        if points.is_empty() {
            return Err(SentinelError::Config("校正表不能为空".into()));
        }
        if points
            .iter()
            .any(|p| !p.distance.is_finite() || !p.scale.is_finite() || !p.offset.is_finite())
        {
            return Err(SentinelError::Config("校正表包含非有限数值".into()));
        }
        points.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        if points.windows(2).any(|w| w[0].distance == w[1].distance) {
            return Err(SentinelError::Config("校正表距离重复".into()));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    /// 插值得到 (scale, offset)
    pub fn lookup(&self, distance: f32) -> (f32, f32) {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];
        if distance <= first.distance {
            return (first.scale, first.offset);
        }
        if distance >= last.distance {
            return (last.scale, last.offset);
        }
        for w in self.points.windows(2) {
            let (lo, hi) = (w[0], w[1]);
            if distance <= hi.distance {
                let t = (distance - lo.distance) / (hi.distance - lo.distance);
                return (
                    lo.scale + t * (hi.scale - lo.scale),
                    lo.offset + t * (hi.offset - lo.offset),
                );
            }
        }
        (last.scale, last.offset)
    }

    /// corrected = raw * scale + offset
    pub fn correct(&self, raw_distance: f32) -> f32 {
        let (scale, offset) = self.lookup(raw_distance);
        raw_distance * scale + offset
    }

    /// 原始距离是否超出表格最远采样点
    pub fn beyond_range(&self, raw_distance: f32) -> bool {
        raw_distance > self.points[self.points.len() - 1].distance
    }
}

impl TryFrom<Vec<CalibrationPoint>> for CalibrationTable {
    type Error = SentinelError;

    fn try_from(points: Vec<CalibrationPoint>) -> Result<Self> {
        Self::new(points)
    }
}

impl From<CalibrationTable> for Vec<CalibrationPoint> {
    fn from(table: CalibrationTable) -> Self {
        table.points
    }
}
