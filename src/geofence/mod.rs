/// 电子围栏 (Geofence)
///
/// - Zone:       地面坐标多边形 + 告警等级
/// - Store:      区域配置文件加载/保存/热加载
/// - Classifier: 像素中心 + 距离 → 地面坐标 → 区域归属
pub mod store;
pub mod zone;

pub use store::{default_zones, parse_zones, LoadReport, ZoneStore};
pub use zone::{Severity, ZonePolygon};

use serde::{Deserialize, Serialize};

/// 围栏参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GeofenceConfig {
    /// 相机水平视场角 (度)
    pub horizontal_fov_deg: f32,
    /// 图像宽度 (像素)
    pub image_width_px: f32,
    /// 每个区域要求的顶点数, None 表示任意 (≥3)
    pub expected_vertices: Option<usize>,
    /// 未指定等级时按名称判定为告警级的区域
    pub alarm_zones: Vec<String>,
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            horizontal_fov_deg: 70.0,
            image_width_px: 640.0,
            expected_vertices: Some(4),
            alarm_zones: vec!["red".to_string()],
        }
    }
}

impl GeofenceConfig {
    pub fn default_severity(&self, zone_name: &str) -> Severity {
        if self.alarm_zones.iter().any(|z| z == zone_name) {
            Severity::Alarm
        } else {
            Severity::Warning
        }
    }
}

/// 区域命中结果
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ZoneHit {
    /// 地面坐标 (横向, 纵深), 英尺
    pub ground: (f32, f32),
    /// 所有包含该点的区域 (按配置顺序)
    pub zones: Vec<String>,
    /// 最严重的区域 (决定告警)
    pub governing: Option<(String, Severity)>,
}

impl ZoneHit {
    pub fn severity(&self) -> Option<Severity> {
        self.governing.as_ref().map(|(_, s)| *s)
    }

    pub fn zone_name(&self) -> Option<&str> {
        self.governing.as_ref().map(|(name, _)| name.as_str())
    }
}

/// 区域分类器
#[derive(Clone, Debug, Default)]
pub struct GeofenceClassifier {
    config: GeofenceConfig,
}

impl GeofenceClassifier {
    pub fn new(config: GeofenceConfig) -> Self {
        Self { config }
    }

    /// 像素中心x + 距离 → 地面坐标.
    /// 角度与像素偏移成线性关系: 画面边缘对应 ±fov/2
    pub fn project(&self, center_x: f32, distance_ft: f32) -> (f32, f32) {
        let half_width = self.config.image_width_px / 2.0;
        let half_fov = (self.config.horizontal_fov_deg / 2.0).to_radians();
        let angle = (center_x - half_width) / half_width * half_fov;
        (distance_ft * angle.tan(), distance_ft)
    }

    /// 在所有区域中测试地面点
    pub fn classify_ground(&self, ground: (f32, f32), zones: &[ZonePolygon]) -> ZoneHit {
        let mut hit = ZoneHit {
            ground,
            zones: Vec::new(),
            governing: None,
        };
        for zone in zones.iter().filter(|z| z.contains(ground)) {
            hit.zones.push(zone.name.clone());
            // 等级相同保留先出现的区域
            let more_severe = hit
                .governing
                .as_ref()
                .map_or(true, |(_, s)| zone.severity > *s);
            if more_severe {
                hit.governing = Some((zone.name.clone(), zone.severity));
            }
        }
        hit
    }

    pub fn classify(&self, center_x: f32, distance_ft: f32, zones: &[ZonePolygon]) -> ZoneHit {
        self.classify_ground(self.project(center_x, distance_ft), zones)
    }
}
