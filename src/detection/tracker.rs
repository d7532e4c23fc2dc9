//! 身份跟踪器 (Identity tracker)
//!
//! 单假设最近邻跟踪: 每个观测在存活轨迹中找中心距离最近、且高度差在阈值内的轨迹.
//! 没有卡尔曼预测; 两人近距离交叉时可能交换ID.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geofence::ZoneHit;
use crate::stereo::StereoState;

/// 跟踪器参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// 关联的最大中心距离 (像素, 严格小于)
    pub max_center_distance_px: f32,
    /// 关联的最大高度差 (像素, 严格小于)
    pub max_height_diff_px: f32,
    /// 轨迹超时 (秒), 超时未更新即淘汰
    pub timeout_secs: f32,
    /// 轨迹点保留数量 (用于绘制)
    pub trajectory_len: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_center_distance_px: 60.0,
            max_height_diff_px: 30.0,
            timeout_secs: 1.0,
            trajectory_len: 30,
        }
    }
}

impl TrackerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f32(self.timeout_secs.max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// 跟踪点 (用于绘制轨迹)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackPoint {
    pub x: f32,
    pub y: f32,
}

/// 一个观测: 左视角检测框中心与高度
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Observation {
    pub center: (f32, f32),
    pub height: f32,
}

/// 跟踪对象 (一个真实的人)
#[derive(Clone, Debug)]
pub struct Track {
    /// 唯一跟踪ID, 本次运行内不复用
    pub id: u32,

    /// 最近一次中心点与框高 (像素)
    pub center: (f32, f32),
    pub height: f32,

    /// 最近一次更新时间 (相对运行开始)
    pub last_update: Duration,

    /// 历史轨迹 (中心点)
    pub trajectory: Vec<TrackPoint>,

    /// 测距状态 (视差历史 + 上一帧距离)
    pub stereo: StereoState,

    /// 当前区域归属 (本步未测距时为 None)
    pub zone: Option<ZoneHit>,

    /// 本步是否贡献了告警
    pub alerting: bool,

    /// 显示颜色 (每个ID不同颜色)
    pub color: (u8, u8, u8),

    /// 总共被跟踪的帧数
    pub total_frames: u32,
}

impl Track {
    fn new(id: u32, obs: Observation, now: Duration, stereo: StereoState) -> Self {
        Self {
            id,
            center: obs.center,
            height: obs.height,
            last_update: now,
            trajectory: vec![TrackPoint {
                x: obs.center.0,
                y: obs.center.1,
            }],
            stereo,
            zone: None,
            alerting: false,
            color: id_to_color(id),
            total_frames: 1,
        }
    }

    fn update(&mut self, obs: Observation, now: Duration, trajectory_len: usize) {
        self.center = obs.center;
        self.height = obs.height;
        self.last_update = now;
        self.total_frames += 1;

        self.trajectory.push(TrackPoint {
            x: obs.center.0,
            y: obs.center.1,
        });
        // 限制轨迹长度
        if self.trajectory.len() > trajectory_len {
            self.trajectory.remove(0);
        }
    }

    /// 距离上次更新的时长
    pub fn age(&self, now: Duration) -> Duration {
        now.saturating_sub(self.last_update)
    }
}

/// 关联结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Association {
    Existing(u32),
    Created(u32),
}

impl Association {
    pub fn id(&self) -> u32 {
        match *self {
            Association::Existing(id) | Association::Created(id) => id,
        }
    }
}

/// 身份跟踪器: 独占轨迹表, 负责创建/关联/淘汰
pub struct IdentityTracker {
    config: TrackerConfig,
    tracks: BTreeMap<u32, Track>,
    next_id: u32,
    /// 本步已被认领的轨迹
    claimed: Vec<u32>,
    created_total: u64,
}

impl IdentityTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: BTreeMap::new(),
            next_id: 1,
            claimed: Vec::new(),
            created_total: 0,
        }
    }

    /// 开始新的一步: 淘汰超时轨迹, 清空认领表, 清除上一步的区域结果.
    /// 返回被淘汰的ID
    pub fn begin_step(&mut self, now: Duration) -> Vec<u32> {
        let timeout = self.config.timeout();
        let expired: Vec<u32> = self
            .tracks
            .values()
            .filter(|t| t.age(now) > timeout)
            .map(|t| t.id)
            .collect();
        for id in &expired {
            self.tracks.remove(id);
            debug!("🗑️ 轨迹 #{} 超时淘汰", id);
        }

        self.claimed.clear();
        for track in self.tracks.values_mut() {
            track.zone = None;
            track.alerting = false;
        }
        expired
    }

    /// 将观测关联到存活轨迹, 没有合格轨迹则新建.
    /// 每条轨迹每步最多被一个观测认领.
    pub fn associate(
        &mut self,
        obs: Observation,
        now: Duration,
        new_state: impl FnOnce() -> StereoState,
    ) -> Association {
        let timeout = self.config.timeout();
        let mut best: Option<(u32, f32)> = None;

        for track in self.tracks.values() {
            if track.age(now) > timeout || self.claimed.contains(&track.id) {
                continue;
            }
            if (obs.height - track.height).abs() >= self.config.max_height_diff_px {
                continue;
            }
            let dist = (obs.center.0 - track.center.0).hypot(obs.center.1 - track.center.1);
            if dist >= self.config.max_center_distance_px {
                continue;
            }
            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((track.id, dist));
            }
        }

        let association = match best {
            Some((id, _)) => {
                if let Some(track) = self.tracks.get_mut(&id) {
                    track.update(obs, now, self.config.trajectory_len);
                }
                Association::Existing(id)
            }
            None => {
                let id = self.next_id;
                self.next_id += 1;
                self.created_total += 1;
                self.tracks.insert(id, Track::new(id, obs, now, new_state()));
                debug!("🆕 新轨迹 #{}", id);
                Association::Created(id)
            }
        };
        self.claimed.push(association.id());
        association
    }

    pub fn get(&self, id: u32) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Track> {
        self.tracks.get_mut(&id)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    /// 获取当前跟踪数量
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// 累计创建的轨迹数
    pub fn created_total(&self) -> u64 {
        self.created_total
    }

    /// 重置跟踪器 (清除所有跟踪, ID 计数器不回退)
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.claimed.clear();
    }
}

// ========== 工具函数 ==========

/// 根据ID生成不同颜色
pub fn id_to_color(id: u32) -> (u8, u8, u8) {
    let hue = (id as f32 * 137.508) % 360.0; // 黄金角度采样
    hsv_to_rgb(hue, 0.8, 0.9)
}

/// HSV转RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (u8, u8, u8) {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    (
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(x: f32, y: f32, h: f32) -> Observation {
        Observation {
            center: (x, y),
            height: h,
        }
    }

    fn secs(s: f32) -> Duration {
        Duration::from_secs_f32(s)
    }

    fn tracker() -> IdentityTracker {
        IdentityTracker::new(TrackerConfig::default())
    }

    fn state() -> StereoState {
        StereoState::new(10)
    }

    #[test]
    fn test_nearest_track_is_reused() {
        let mut t = tracker();
        t.begin_step(secs(0.0));
        let a = t.associate(obs(100.0, 100.0, 80.0), secs(0.0), state);
        assert_eq!(a, Association::Created(1));

        t.begin_step(secs(0.1));
        let b = t.associate(obs(120.0, 110.0, 85.0), secs(0.1), state);
        assert_eq!(b, Association::Existing(1));
        assert_eq!(t.get(1).unwrap().total_frames, 2);
    }

    #[test]
    fn test_gates_reject_far_or_rescaled() {
        let mut t = tracker();
        t.begin_step(secs(0.0));
        t.associate(obs(100.0, 100.0, 80.0), secs(0.0), state);

        t.begin_step(secs(0.1));
        // 中心距离 60 (不小于阈值)
        assert_eq!(
            t.associate(obs(160.0, 100.0, 80.0), secs(0.1), state),
            Association::Created(2)
        );
        t.begin_step(secs(0.2));
        // 高度差 30 (不小于阈值)
        assert_eq!(
            t.associate(obs(100.0, 100.0, 110.0), secs(0.2), state),
            Association::Created(3)
        );
    }

    #[test]
    fn test_one_claim_per_track_per_step() {
        let mut t = tracker();
        t.begin_step(secs(0.0));
        t.associate(obs(100.0, 100.0, 80.0), secs(0.0), state);

        t.begin_step(secs(0.1));
        let a = t.associate(obs(101.0, 100.0, 80.0), secs(0.1), state);
        let b = t.associate(obs(102.0, 100.0, 80.0), secs(0.1), state);
        assert_eq!(a, Association::Existing(1));
        assert_eq!(b, Association::Created(2));
    }

    #[test]
    fn test_eviction_after_timeout_and_ids_not_reused() {
        let mut t = tracker();
        t.begin_step(secs(0.0));
        t.associate(obs(100.0, 100.0, 80.0), secs(0.0), state);

        // 恰好 1.0s 仍存活
        assert!(t.begin_step(secs(1.0)).is_empty());
        assert_eq!(t.track_count(), 1);

        let evicted = t.begin_step(secs(1.5));
        assert_eq!(evicted, vec![1]);
        assert_eq!(t.track_count(), 0);

        // 同一位置重新出现, 分配新ID
        let again = t.associate(obs(100.0, 100.0, 80.0), secs(1.5), state);
        assert_eq!(again, Association::Created(2));
    }

    #[test]
    fn test_huge_timeout_never_evicts() {
        let config = TrackerConfig {
            timeout_secs: 1e30,
            ..Default::default()
        };
        assert_eq!(config.timeout(), Duration::MAX);
        let nan = TrackerConfig {
            timeout_secs: f32::NAN,
            ..Default::default()
        };
        assert_eq!(nan.timeout(), Duration::ZERO);

        let mut t = IdentityTracker::new(config);
        t.begin_step(secs(0.0));
        t.associate(obs(100.0, 100.0, 80.0), secs(0.0), state);
        assert!(t.begin_step(secs(3600.0)).is_empty());
        assert_eq!(t.track_count(), 1);
    }

    #[test]
    fn test_ids_strictly_increasing() {
        let mut t = tracker();
        let mut last = 0;
        for step in 0..20 {
            let now = secs(step as f32 * 2.0);
            t.begin_step(now);
            let id = t.associate(obs(50.0 * step as f32, 10.0, 80.0), now, state).id();
            assert!(id > last);
            last = id;
        }
        assert_eq!(t.created_total(), 20);
    }

    #[test]
    fn test_trajectory_is_bounded() {
        let mut t = IdentityTracker::new(TrackerConfig {
            trajectory_len: 5,
            ..Default::default()
        });
        for step in 0..20 {
            let now = secs(step as f32 * 0.05);
            t.begin_step(now);
            t.associate(obs(100.0 + step as f32, 100.0, 80.0), now, state);
        }
        assert_eq!(t.track_count(), 1);
        assert_eq!(t.get(1).unwrap().trajectory.len(), 5);
    }
}
