//! 区域多边形 (Zone polygon)

use serde::{Deserialize, Serialize};

use crate::error::{Result, SentinelError};

/// 告警等级, 越大越严重
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 预警 (例如只发短信)
    Warning,
    /// 立即告警 (驱动硬件信号线)
    Alarm,
}

impl Severity {
    pub const ALL: [Severity; 2] = [Severity::Warning, Severity::Alarm];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Alarm => "alarm",
        }
    }
}

/// 地面坐标中的命名多边形 (英尺), 顶点按顺序首尾相连
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ZonePolygon {
    pub name: String,
    pub vertices: Vec<(f32, f32)>,
    pub severity: Severity,
}

impl ZonePolygon {
    pub fn new(name: impl Into<String>, vertices: Vec<(f32, f32)>, severity: Severity) -> Result<Self> {
        let name = name.into();
        if vertices.len() < 3 {
            return Err(SentinelError::Zone {
                name,
                reason: format!("至少需要3个顶点, 实际 {}", vertices.len()),
            });
        }
        if vertices.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(SentinelError::Zone {
                name,
                reason: "顶点包含非有限数值".into(),
            });
        }
        Ok(Self {
            name,
            vertices,
            severity,
        })
    }

    /// 点是否在多边形内 (射线交叉法, 边界上视为在内)
    pub fn contains(&self, point: (f32, f32)) -> bool {
        let (px, py) = point;
        let n = self.vertices.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.vertices[i];
            let (xj, yj) = self.vertices[j];

            if on_segment((xi, yi), (xj, yj), point) {
                return true;
            }
            if (yi > py) != (yj > py) {
                let x_cross = xi + (py - yi) * (xj - xi) / (yj - yi);
                if px < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

fn on_segment(a: (f32, f32), b: (f32, f32), p: (f32, f32)) -> bool {
    const EPS: f32 = 1e-4;
    let cross = (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0);
    if cross.abs() > EPS * ((b.0 - a.0).abs() + (b.1 - a.1).abs()).max(1.0) {
        return false;
    }
    p.0 >= a.0.min(b.0) - EPS
        && p.0 <= a.0.max(b.0) + EPS
        && p.1 >= a.1.min(b.1) - EPS
        && p.1 <= a.1.max(b.1) + EPS
}
