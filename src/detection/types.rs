// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 双目检测系统数据结构定义
/// Data structures for the stereo detection system
use serde::{Deserialize, Serialize};

// ========== 公共常量 ==========

/// COCO "person" 类别ID
pub const PERSON_CLASS_ID: u32 = 0;

// ========== 数据结构 ==========

/// 检测框 (Detection bounding box), 像素坐标 (left, top, right, bottom)
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// 获取中心点
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn center_x(&self) -> f32 {
        (self.x1 + self.x2) / 2.0
    }
}

/// 单个相机在单帧中的一次检测
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: BBox,
}

impl Detection {
    pub fn person(bbox: BBox, confidence: f32) -> Self {
        Self {
            class_id: PERSON_CLASS_ID,
            confidence,
            bbox,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        self.bbox.center()
    }

    pub fn height(&self) -> f32 {
        self.bbox.height()
    }
}

/// 只保留 person 类别且置信度达到阈值的检测
pub fn filter_persons(detections: &[Detection], person_class: u32, threshold: f32) -> Vec<Detection> {
    detections
        .iter()
        .filter(|d| d.class_id == person_class && d.confidence >= threshold)
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_geometry() {
        let b = BBox::new(100.0, 200.0, 140.0, 260.0);
        assert_eq!(b.width(), 40.0);
        assert_eq!(b.height(), 60.0);
        assert_eq!(b.center(), (120.0, 230.0));
    }

    #[test]
    fn test_filter_persons() {
        let dets = vec![
            Detection::person(BBox::new(0.0, 0.0, 10.0, 10.0), 0.9),
            Detection::person(BBox::new(0.0, 0.0, 10.0, 10.0), 0.49),
            Detection::person(BBox::new(0.0, 0.0, 10.0, 10.0), 0.5),
            Detection {
                class_id: 2,
                confidence: 0.99,
                bbox: BBox::new(0.0, 0.0, 10.0, 10.0),
            },
        ];
        let kept = filter_persons(&dets, PERSON_CLASS_ID, 0.5);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|d| d.confidence >= 0.5));
    }
}
