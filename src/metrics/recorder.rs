//! 指标记录器 (MetricsRecorder)
//!
//! 滚动窗口保存最近 `window_seconds × target_fps` 个帧样本,
//! 快照时按显示时间过滤并计算延迟分位数。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::counters::FrameCounters;
use super::report::{
    Bandwidth, DetectionStats, FpsStats, FrameCounts, LatencyReport, LatencyStats, MetricsReport,
};
use crate::ingest::FrameId;
use crate::pipeline::DetectionRecord;

/// 单帧计时样本 (ms)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameSample {
    pub frame_id: FrameId,
    pub capture_ts: i64,
    pub recv_ts: i64,
    pub inference_complete_ts: i64,
    pub display_ts: i64,
    pub detection_count: usize,
}

impl FrameSample {
    /// 由检测记录和观看端的显示时间构造
    pub fn from_record(record: &DetectionRecord, display_ts: i64) -> Self {
        Self {
            frame_id: record.frame_id.clone(),
            capture_ts: record.capture_ts,
            recv_ts: record.recv_ts,
            inference_complete_ts: record.inference_ts,
            display_ts,
            detection_count: record.detections.len(),
        }
    }

    fn e2e_ms(&self) -> f64 {
        (self.display_ts - self.capture_ts) as f64
    }

    fn server_ms(&self) -> f64 {
        (self.inference_complete_ts - self.recv_ts) as f64
    }

    fn network_ms(&self) -> f64 {
        (self.recv_ts - self.capture_ts) as f64
    }
}

/// 指标参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 滚动窗口长度 (秒)
    pub window_seconds: u32,
    /// 运行模式标签 (导出时原样输出)
    pub mode: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window_seconds: 30,
            mode: String::from("server"),
        }
    }
}

#[derive(Default)]
struct WindowState {
    samples: VecDeque<FrameSample>,
    bandwidth: Bandwidth,
}

pub struct MetricsRecorder {
    mode: String,
    target_fps: f64,
    capacity: usize,
    window: Mutex<WindowState>,
    counters: Arc<FrameCounters>,
}

impl MetricsRecorder {
    pub fn new(config: &MetricsConfig, target_fps: f64, counters: Arc<FrameCounters>) -> Self {
        let capacity = ((config.window_seconds as f64 * target_fps).ceil() as usize).max(1);
        Self {
            mode: config.mode.clone(),
            target_fps,
            capacity,
            window: Mutex::new(WindowState {
                samples: VecDeque::with_capacity(capacity),
                bandwidth: Bandwidth::default(),
            }),
            counters,
        }
    }

    fn window(&self) -> MutexGuard<'_, WindowState> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.window().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window().samples.is_empty()
    }

    pub fn counters(&self) -> &Arc<FrameCounters> {
        &self.counters
    }

    /// 记录一帧样本, 窗口满时淘汰最旧的样本
    pub fn record(&self, sample: FrameSample) {
        let mut window = self.window();
        while window.samples.len() >= self.capacity {
            window.samples.pop_front();
        }
        window.samples.push_back(sample);
    }

    /// 写入外部估算的带宽
    pub fn set_bandwidth(&self, uplink_kbps: f64, downlink_kbps: f64) {
        self.window().bandwidth = Bandwidth {
            uplink_kbps,
            downlink_kbps,
        };
    }

    /// 最近 `duration_seconds` 秒的统计
    pub fn snapshot(&self, duration_seconds: f64) -> MetricsReport {
        self.snapshot_at(duration_seconds, crate::now_ms())
    }

    /// 以 `now_ms` 为窗口终点计算统计
    pub fn snapshot_at(&self, duration_seconds: f64, now_ms: i64) -> MetricsReport {
        let duration_seconds = duration_seconds.max(0.0);
        let cutoff = now_ms - (duration_seconds * 1000.0) as i64;

        let window = self.window();
        let selected: Vec<&FrameSample> = window
            .samples
            .iter()
            .filter(|s| s.display_ts >= cutoff && s.display_ts <= now_ms)
            .collect();

        let count = selected.len();
        let fps = match selected.iter().map(|s| s.display_ts).min() {
            Some(first) => {
                let elapsed = ((now_ms - first) as f64 / 1000.0).min(duration_seconds);
                if elapsed > 0.0 {
                    count as f64 / elapsed
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        let latency = LatencyReport {
            e2e: LatencyStats::from_values(selected.iter().map(|s| s.e2e_ms()).collect()),
            server: LatencyStats::from_values(selected.iter().map(|s| s.server_ms()).collect()),
            network: LatencyStats::from_values(selected.iter().map(|s| s.network_ms()).collect()),
        };

        let detections_total: u64 = selected.iter().map(|s| s.detection_count as u64).sum();
        let detections = DetectionStats {
            total: detections_total,
            average: if count > 0 {
                detections_total as f64 / count as f64
            } else {
                0.0
            },
        };

        MetricsReport {
            duration: duration_seconds,
            mode: self.mode.clone(),
            frames: FrameCounts {
                total: self.counters.received(),
                processed: self.counters.processed(),
                dropped: self.counters.dropped(),
            },
            fps: FpsStats {
                processed: fps,
                target: self.target_fps,
            },
            latency,
            bandwidth: window.bandwidth,
            detections,
        }
    }

    /// 清空样本和计数器; 持有窗口锁期间完成, 与 `record` 互斥
    pub fn reset(&self) {
        let mut window = self.window();
        window.samples.clear();
        window.bandwidth = Bandwidth::default();
        self.counters.clear();
        debug!("指标已重置");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: i64, capture: i64, display: i64) -> FrameSample {
        FrameSample {
            frame_id: FrameId::Int(id),
            capture_ts: capture,
            recv_ts: capture + 10,
            inference_complete_ts: capture + 30,
            display_ts: display,
            detection_count: 2,
        }
    }

    fn recorder(window_seconds: u32, fps: f64) -> MetricsRecorder {
        let config = MetricsConfig {
            window_seconds,
            ..Default::default()
        };
        MetricsRecorder::new(&config, fps, Arc::new(FrameCounters::default()))
    }

    #[test]
    fn window_is_bounded() {
        let rec = recorder(1, 5.0);
        assert_eq!(rec.capacity(), 5);
        for i in 0..12 {
            rec.record(sample(i, i * 100, i * 100 + 50));
        }
        assert_eq!(rec.len(), 5);
    }

    #[test]
    fn snapshot_computes_latencies() {
        let rec = recorder(10, 30.0);
        for i in 0..10 {
            rec.record(sample(i, i * 100, i * 100 + 50));
        }

        let report = rec.snapshot_at(10.0, 1000);
        assert_eq!(report.latency.e2e.median, 50.0);
        assert_eq!(report.latency.e2e.min, 50.0);
        assert_eq!(report.latency.server.avg, 20.0);
        assert_eq!(report.latency.network.max, 10.0);
        assert_eq!(report.detections.total, 20);
        assert_eq!(report.detections.average, 2.0);
        assert_eq!(report.fps.target, 30.0);
        // 10 帧, 首帧显示于 50ms, 到 1000ms 共 0.95s
        assert!((report.fps.processed - 10.0 / 0.95).abs() < 1e-9);
    }

    #[test]
    fn snapshot_filters_by_display_time() {
        let rec = recorder(60, 30.0);
        rec.record(sample(1, 0, 100));
        rec.record(sample(2, 4_000, 4_100));
        rec.record(sample(3, 9_000, 9_100));

        let report = rec.snapshot_at(2.0, 10_000);
        assert_eq!(report.detections.total, 2);
        assert_eq!(report.duration, 2.0);

        let report = rec.snapshot_at(10.0, 10_000);
        assert_eq!(report.detections.total, 6);
    }

    #[test]
    fn empty_snapshot() {
        let rec = recorder(10, 30.0);
        let report = rec.snapshot_at(5.0, 1_000);
        assert_eq!(report.fps.processed, 0.0);
        assert_eq!(report.latency.e2e, LatencyStats::default());
        assert_eq!(report.mode, "server");
    }

    #[test]
    fn reset_clears_samples_and_counters() {
        let rec = recorder(10, 30.0);
        rec.counters().frame_received();
        rec.counters().frame_dropped();
        rec.set_bandwidth(800.0, 12.0);
        rec.record(sample(1, 0, 40));

        let report = rec.snapshot_at(10.0, 100);
        assert_eq!(report.frames.total, 1);
        assert_eq!(report.bandwidth.uplink_kbps, 800.0);

        rec.reset();
        assert!(rec.is_empty());
        let report = rec.snapshot_at(10.0, 100);
        assert_eq!(report.frames, FrameCounts::default());
        assert_eq!(report.bandwidth, Bandwidth::default());
    }

    #[test]
    fn concurrent_record_and_reset() {
        let rec = Arc::new(recorder(10, 30.0));
        let writer = {
            let rec = rec.clone();
            std::thread::spawn(move || {
                for i in 0..2_000 {
                    rec.record(sample(i, i, i + 5));
                }
            })
        };
        for _ in 0..50 {
            rec.reset();
        }
        writer.join().unwrap();
        assert!(rec.len() <= rec.capacity());
    }
}
