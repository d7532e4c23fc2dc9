//! 视差计算与历史缓冲 (Disparity measurement & history)

use std::collections::VecDeque;

use crate::detection::types::BBox;

/// 三个数的中位数
pub fn median3(a: f32, b: f32, c: f32) -> f32 {
    a.max(b).min(a.min(b).max(c))
}

/// 任意长度切片的中位数 (偶数个取中间两数均值), 空切片返回 None
pub fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// 原始视差: 左边缘差, 右边缘差, 中心差 三者取中位数 (抗单边抖动)
pub fn raw_disparity(a: &BBox, b: &BBox) -> f32 {
    let left = (a.x1 - b.x1).abs();
    let right = (a.x2 - b.x2).abs();
    let center = (a.center_x() - b.center_x()).abs();
    median3(left, right, center)
}

/// 定长视差历史 (满了丢弃最旧样本)
#[derive(Clone, Debug)]
pub struct DisparityHistory {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl DisparityHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, disparity: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(disparity);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 平滑视差 = 历史中位数
    pub fn median(&self) -> Option<f32> {
        let values: Vec<f32> = self.samples.iter().copied().collect();
        median(&values)
    }
}
