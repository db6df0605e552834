//! 指标快照 (导出为 JSON)

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    /// 统计窗口 (秒)
    pub duration: f64,
    pub mode: String,
    pub frames: FrameCounts,
    pub fps: FpsStats,
    pub latency: LatencyReport,
    pub bandwidth: Bandwidth,
    pub detections: DetectionStats,
}

impl MetricsReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameCounts {
    pub total: u64,
    pub processed: u64,
    pub dropped: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FpsStats {
    pub processed: f64,
    pub target: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyReport {
    pub e2e: LatencyStats,
    pub server: LatencyStats,
    pub network: LatencyStats,
}

/// 延迟统计 (ms)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub median: f64,
    pub p95: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

impl LatencyStats {
    /// 排序后按下标取分位数, 空集合全为 0
    pub fn from_values(mut values: Vec<f64>) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        values.sort_by(f64::total_cmp);

        let n = values.len();
        let p95_idx = (n * 95 / 100).min(n - 1);
        let sum: f64 = values.iter().sum();

        Self {
            median: values[n / 2],
            p95: values[p95_idx],
            min: values[0],
            max: values[n - 1],
            avg: sum / n as f64,
        }
    }
}

/// 带宽估计, 由外部根据平均负载大小 × fps 计算后写入
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Bandwidth {
    pub uplink_kbps: f64,
    pub downlink_kbps: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionStats {
    pub total: u64,
    pub average: f64,
}
