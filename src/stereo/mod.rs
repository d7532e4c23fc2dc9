/// 双目系统 (Stereo System)
///
/// 两路相机检测结果的融合:
/// - Matcher:     跨视角配对同一个人
/// - Disparity:   视差测量与历史缓冲
/// - Calibration: 距离分段线性校正表
/// - Distance:    视差 → 平滑后的真实距离
pub mod calibration;
pub mod disparity;
pub mod distance;
pub mod matcher;

pub use calibration::{CalibrationPoint, CalibrationTable};
pub use disparity::{raw_disparity, DisparityHistory};
pub use distance::{DistanceEstimate, DistanceEstimator, RangeBand, StereoConfig, StereoState, Unavailable};
pub use matcher::{CrossViewMatcher, MatchedPair, MatcherConfig};
