/// 指标系统 (Metrics System)
///
/// 旁路统计, 不影响主流水线
/// - FrameCounters:   接收/处理/丢弃帧计数
/// - MetricsRecorder: 帧计时样本滚动窗口
/// - MetricsReport:   JSON 导出格式
pub mod counters;
pub mod recorder;
pub mod report;

pub use counters::FrameCounters;
pub use recorder::{FrameSample, MetricsConfig, MetricsRecorder};
pub use report::{
    Bandwidth, DetectionStats, FpsStats, FrameCounts, LatencyReport, LatencyStats, MetricsReport,
};
