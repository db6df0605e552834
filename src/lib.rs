// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 流水线配置参数
pub mod detection; // 检测器接口与实现
pub mod error; // 错误类型
pub mod ingest; // 帧输入队列
pub mod metrics; // 延迟/吞吐统计
pub mod pipeline; // 调度线程与流水线句柄
pub mod tracking; // 多目标跟踪

pub use crate::config::PipelineConfig;
pub use crate::detection::{BBox, Detector, FnDetector, HttpDetector, RawDetection};
pub use crate::error::{ConfigError, DetectorError, MalformedDetection, PipelineError, TrackerError};
pub use crate::ingest::{Frame, FrameId, FrameIngestQueue};
pub use crate::metrics::{FrameSample, MetricsRecorder, MetricsReport};
pub use crate::pipeline::{DetectionEntry, DetectionRecord, Pipeline, SchedulerConfig};
pub use crate::tracking::{ObjectTracker, TrackId, TrackSnapshot, TrackState, TrackerConfig};

/// 当前 Unix 时间 (ms)
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
