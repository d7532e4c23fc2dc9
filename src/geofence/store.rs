//! 区域配置文件 (Zone store)
//!
//! 文件格式: 区域名 → 顶点列表 `[[x, y], ...]`,
//! 或 `{ "vertices": [[x, y], ...], "severity": "alarm" }`.
//! 单个区域格式错误只拒绝该区域, 不影响其它区域.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde_json::{Map, Value};
use tracing::{info, warn};

use super::zone::{Severity, ZonePolygon};
use super::GeofenceConfig;
use crate::error::{Result, SentinelError};

/// 区域加载报告
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub rejected: Vec<SentinelError>,
}

/// 区域存储: 持久化配置, 启动时加载, 可按需重新加载
pub struct ZoneStore {
    path: PathBuf,
    config: GeofenceConfig,
    zones: Vec<ZonePolygon>,
    /// 最近一次加载/保存时文件的修改时间
    modified: Option<SystemTime>,
}

impl ZoneStore {
    /// 打开区域文件; 文件不存在时写入默认区域
    pub fn open<P: AsRef<Path>>(path: P, config: GeofenceConfig) -> Result<Self> {
        let mut store = Self {
            path: path.as_ref().to_path_buf(),
            config,
            zones: Vec::new(),
            modified: None,
        };
        if store.path.exists() {
            store.reload()?;
        } else {
            info!("📝 区域文件不存在, 创建默认区域: {}", store.path.display());
            store.zones = default_zones();
            store.save()?;
        }
        Ok(store)
    }

    /// 仅在内存中使用的区域集合
    pub fn in_memory(zones: Vec<ZonePolygon>, config: GeofenceConfig) -> Self {
        Self {
            path: PathBuf::new(),
            config,
            zones,
            modified: None,
        }
    }

    pub fn zones(&self) -> &[ZonePolygon] {
        &self.zones
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 重新加载; 整个文件无法解析时保留原区域并返回错误
    pub fn reload(&mut self) -> Result<LoadReport> {
        let text = fs::read_to_string(&self.path)?;
        let (zones, report) = parse_zones(&text, &self.config)?;
        for err in &report.rejected {
            warn!("⚠️ 区域被拒绝: {}", err);
        }
        info!(
            "✅ 区域已加载: {} 个 ({})",
            zones.len(),
            self.path.display()
        );
        self.zones = zones;
        self.modified = file_modified(&self.path);
        Ok(report)
    }

    /// 文件修改时间变化时重新加载; 未变化返回 Ok(None)
    pub fn reload_if_changed(&mut self) -> Result<Option<LoadReport>> {
        if self.path.as_os_str().is_empty() {
            return Ok(None);
        }
        let current = file_modified(&self.path);
        if current.is_none() || current == self.modified {
            return Ok(None);
        }
        // 解析失败也记下时间, 避免每次轮询重复报错
        self.modified = current;
        self.reload().map(Some)
    }

    /// 保存为 JSON (带等级的对象格式)
    pub fn save(&mut self) -> Result<()> {
        let mut map = Map::new();
        for zone in &self.zones {
            let vertices: Vec<Value> = zone
                .vertices
                .iter()
                .map(|(x, y)| serde_json::json!([x, y]))
                .collect();
            map.insert(
                zone.name.clone(),
                serde_json::json!({
                    "vertices": vertices,
                    "severity": zone.severity,
                }),
            );
        }
        let json = serde_json::to_string_pretty(&Value::Object(map))?;
        fs::write(&self.path, json)?;
        self.modified = file_modified(&self.path);
        info!("💾 区域已保存到 {}", self.path.display());
        Ok(())
    }

    /// 新增或替换区域
    pub fn upsert(&mut self, zone: ZonePolygon) {
        match self.zones.iter_mut().find(|z| z.name == zone.name) {
            Some(existing) => *existing = zone,
            None => self.zones.push(zone),
        }
    }

    /// 删除区域, 返回是否存在
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.zones.len();
        self.zones.retain(|z| z.name != name);
        self.zones.len() != before
    }
}

fn file_modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// 默认区域: 红区 (告警) 在前, 蓝区 (预警) 在后
pub fn default_zones() -> Vec<ZonePolygon> {
    let square = |y0: f32, y1: f32| vec![(-3.0, y0), (3.0, y0), (3.0, y1), (-3.0, y1)];
    vec![
        ZonePolygon {
            name: "red".into(),
            vertices: square(10.0, 14.0),
            severity: Severity::Alarm,
        },
        ZonePolygon {
            name: "blue".into(),
            vertices: square(14.0, 18.0),
            severity: Severity::Warning,
        },
    ]
}

/// 解析区域 JSON. 顶层不是对象时报错, 单个区域出错只记入报告
pub fn parse_zones(text: &str, config: &GeofenceConfig) -> Result<(Vec<ZonePolygon>, LoadReport)> {
    let root: Value = serde_json::from_str(text)?;
    let Value::Object(entries) = root else {
        return Err(SentinelError::Config("区域文件顶层必须是对象".into()));
    };

    // BTreeMap 保证加载顺序稳定
    let entries: BTreeMap<String, Value> = entries.into_iter().collect();
    let mut zones = Vec::new();
    let mut report = LoadReport::default();

    for (name, value) in entries {
        match parse_zone(&name, &value, config) {
            Ok(zone) => {
                report.loaded.push(name);
                zones.push(zone);
            }
            Err(e) => report.rejected.push(e),
        }
    }
    Ok((zones, report))
}

fn parse_zone(name: &str, value: &Value, config: &GeofenceConfig) -> Result<ZonePolygon> {
    let reject = |reason: String| SentinelError::Zone {
        name: name.to_string(),
        reason,
    };

    let (raw_vertices, severity) = match value {
        Value::Array(items) => (items, config.default_severity(name)),
        Value::Object(obj) => {
            let items = obj
                .get("vertices")
                .and_then(Value::as_array)
                .ok_or_else(|| reject("缺少 vertices 数组".into()))?;
            let severity = match obj.get("severity") {
                None => config.default_severity(name),
                Some(v) => serde_json::from_value(v.clone())
                    .map_err(|e| reject(format!("severity 无效: {}", e)))?,
            };
            (items, severity)
        }
        _ => return Err(reject("必须是顶点数组或对象".into())),
    };

    if let Some(expected) = config.expected_vertices {
        if raw_vertices.len() != expected {
            return Err(reject(format!(
                "需要 {} 个顶点, 实际 {}",
                expected,
                raw_vertices.len()
            )));
        }
    }

    let mut vertices = Vec::with_capacity(raw_vertices.len());
    for (i, v) in raw_vertices.iter().enumerate() {
        let pair = v
            .as_array()
            .filter(|p| p.len() == 2)
            .ok_or_else(|| reject(format!("顶点 {} 必须是 [x, y]", i)))?;
        let x = pair[0].as_f64();
        let y = pair[1].as_f64();
        match (x, y) {
            (Some(x), Some(y)) => vertices.push((x as f32, y as f32)),
            _ => return Err(reject(format!("顶点 {} 不是数值", i))),
        }
    }

    ZonePolygon::new(name, vertices, severity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_and_object_forms() {
        let text = r#"{
            "red": [[-3, 10], [3, 10], [3, 14], [-3, 14]],
            "gate": {"vertices": [[0, 0], [1, 0], [1, 1], [0, 1]], "severity": "alarm"}
        }"#;
        let (zones, report) = parse_zones(text, &GeofenceConfig::default()).unwrap();
        assert_eq!(zones.len(), 2);
        assert!(report.rejected.is_empty());
        // "red" 在 alarm_zones 默认名单中
        assert!(zones.iter().all(|z| z.severity == Severity::Alarm));
    }

    #[test]
    fn test_malformed_zones_rejected_individually() {
        let text = r#"{
            "ok": [[0, 0], [1, 0], [1, 1], [0, 1]],
            "three": [[0, 0], [1, 0], [1, 1]],
            "text": [[0, 0], ["a", 0], [1, 1], [0, 1]],
            "scalar": 42
        }"#;
        let (zones, report) = parse_zones(text, &GeofenceConfig::default()).unwrap();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].name, "ok");
        assert_eq!(zones[0].severity, Severity::Warning);
        assert_eq!(report.rejected.len(), 3);
    }

    #[test]
    fn test_any_vertex_count_when_unset() {
        let config = GeofenceConfig {
            expected_vertices: None,
            ..Default::default()
        };
        let text = r#"{"tri": [[0, 0], [2, 0], [1, 2]]}"#;
        let (zones, _) = parse_zones(text, &config).unwrap();
        assert_eq!(zones.len(), 1);
    }

    #[test]
    fn test_non_object_root_is_error() {
        assert!(parse_zones("[1, 2]", &GeofenceConfig::default()).is_err());
        assert!(parse_zones("not json", &GeofenceConfig::default()).is_err());
    }

    #[test]
    fn test_open_creates_defaults_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zones.json");

        let mut store = ZoneStore::open(&path, GeofenceConfig::default()).unwrap();
        assert!(path.exists());
        assert_eq!(store.zones().len(), 2);

        store.upsert(
            ZonePolygon::new(
                "yard",
                vec![(10.0, 10.0), (12.0, 10.0), (12.0, 12.0), (10.0, 12.0)],
                Severity::Warning,
            )
            .unwrap(),
        );
        assert!(store.remove("blue"));
        assert!(!store.remove("missing"));
        store.save().unwrap();

        let reopened = ZoneStore::open(&path, GeofenceConfig::default()).unwrap();
        let names: Vec<&str> = reopened.zones().iter().map(|z| z.name.as_str()).collect();
        assert_eq!(names, vec!["red", "yard"]);
        let red = &reopened.zones()[0];
        assert_eq!(red.severity, Severity::Alarm);
    }

    #[test]
    fn test_reload_if_changed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zones.json");
        let mut store = ZoneStore::open(&path, GeofenceConfig::default()).unwrap();
        assert!(store.reload_if_changed().unwrap().is_none());

        fs::write(&path, r#"{"gate": [[0, 0], [1, 0], [1, 1], [0, 1]]}"#).unwrap();
        // 部分文件系统的时间精度较粗, 强制与记录的时间不同
        store.modified = Some(SystemTime::UNIX_EPOCH);
        let report = store.reload_if_changed().unwrap().unwrap();
        assert_eq!(report.loaded, vec!["gate".to_string()]);
        assert_eq!(store.zones().len(), 1);
        assert!(store.reload_if_changed().unwrap().is_none());
    }

    #[test]
    fn test_reload_keeps_zones_on_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zones.json");
        let mut store = ZoneStore::open(&path, GeofenceConfig::default()).unwrap();

        fs::write(&path, "{ broken").unwrap();
        assert!(store.reload().is_err());
        assert_eq!(store.zones().len(), 2);
    }
}
