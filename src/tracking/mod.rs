/// 跟踪系统 (Tracking System)
///
/// IoU 关联 + 一步线性运动预测, 为检测框分配跨帧稳定的ID
/// - Track:         单条轨迹及生命周期
/// - association:   代价矩阵与匹配算法
/// - ObjectTracker: 轨迹注册表与周期更新
pub mod association;
pub mod track;
pub mod tracker;

pub use association::AssociationStrategy;
pub use track::{Track, TrackId, TrackSnapshot, TrackState, Velocity};
pub use tracker::{CycleOutput, DetectionOutcome, ObjectTracker, TrackerConfig, TrackerStats};
