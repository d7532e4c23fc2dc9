//! 跨视角匹配器 (Cross-view matcher)
//!
//! 贪心最近邻: 对左视角的每个检测, 在右视角未使用的检测中选代价最小者.
//! 代价 = 中心欧氏距离 + height_weight * |高度差|.
//! 不做全局最优二分图匹配.

use serde::{Deserialize, Serialize};

use super::disparity::raw_disparity;
use crate::detection::types::Detection;

/// 匹配参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// 高度差权重 (惩罚跨尺度误匹配)
    pub height_weight: f32,
    /// 高度差硬阈值 (像素), 超过则不作为候选
    pub max_height_diff_px: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            height_weight: 2.0,
            max_height_diff_px: 50.0,
        }
    }
}

/// 同一时刻两个视角中同一个人的检测对
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchedPair {
    pub left: Detection,
    pub right: Detection,
    /// 原始视差 (像素)
    pub disparity: f32,
}

impl MatchedPair {
    pub fn new(left: Detection, right: Detection) -> Self {
        Self {
            left,
            right,
            disparity: raw_disparity(&left.bbox, &right.bbox),
        }
    }
}

/// 跨视角匹配器
#[derive(Clone, Debug, Default)]
pub struct CrossViewMatcher {
    config: MatcherConfig,
}

impl CrossViewMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// 匹配代价
    pub fn cost(&self, a: &Detection, b: &Detection) -> f32 {
        let (ax, ay) = a.center();
        let (bx, by) = b.center();
        let center_dist = (ax - bx).hypot(ay - by);
        center_dist + self.config.height_weight * (a.height() - b.height()).abs()
    }

    /// 贪心匹配, 每个检测在每个视角中最多使用一次
    pub fn match_views(&self, left: &[Detection], right: &[Detection]) -> Vec<MatchedPair> {
        if left.is_empty() || right.is_empty() {
            return Vec::new();
        }

        let mut used = vec![false; right.len()];
        let mut pairs = Vec::with_capacity(left.len().min(right.len()));

        for a in left {
            let mut best: Option<(usize, f32)> = None;
            for (idx, b) in right.iter().enumerate() {
                if used[idx] {
                    continue;
                }
                // 高度差过大: 一近一远, 不可能是同一个人
                if (a.height() - b.height()).abs() > self.config.max_height_diff_px {
                    continue;
                }
                let cost = self.cost(a, b);
                // 严格小于: 代价相同时保留先遇到的
                if best.map_or(true, |(_, c)| cost < c) {
                    best = Some((idx, cost));
                }
            }

            if let Some((idx, _)) = best {
                used[idx] = true;
                pairs.push(MatchedPair::new(*a, right[idx]));
            }
        }

        pairs
    }
}
