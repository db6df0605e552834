//! 流水线配置 - 通过JSON文件调整参数

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;
use crate::metrics::MetricsConfig;
use crate::pipeline::SchedulerConfig;
use crate::tracking::TrackerConfig;

/// 单路视频流的全部参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // === 调度参数 ===
    pub scheduler: SchedulerConfig,

    // === 跟踪参数 ===
    pub tracker: TrackerConfig,
    pub tracking_enabled: bool, // 关闭后输出不带 trackId
    pub trajectory: bool,       // 已确认轨迹附带历史框

    // === 指标参数 ===
    pub metrics: MetricsConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            tracker: TrackerConfig::default(),
            tracking_enabled: true,
            trajectory: false,
            metrics: MetricsConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// 从JSON文件加载配置, 文件不存在时写入默认配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            info!("📝 配置文件不存在, 创建默认配置: {}", path.display());
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }

        let json = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        info!("✅ 配置已从 {} 加载", path.display());
        Ok(config)
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scheduler;
        if !(s.target_fps.is_finite() && s.target_fps > 0.0) {
            return Err(invalid(format!("target_fps must be > 0, got {}", s.target_fps)));
        }
        if s.detector_timeout_ms == 0 {
            return Err(invalid("detector_timeout_ms must be > 0"));
        }
        if s.queue_capacity == 0 {
            return Err(invalid("queue_capacity must be >= 1"));
        }
        if s.output_capacity == 0 {
            return Err(invalid("output_capacity must be >= 1"));
        }

        let t = &self.tracker;
        if !(0.0..=1.0).contains(&t.iou_threshold) {
            return Err(invalid(format!(
                "iou_threshold must be within [0, 1], got {}",
                t.iou_threshold
            )));
        }
        if t.history_cap == 0 {
            return Err(invalid("history_cap must be >= 1"));
        }

        if self.metrics.window_seconds == 0 {
            return Err(invalid("window_seconds must be >= 1"));
        }
        Ok(())
    }

    /// 打印当前配置
    pub fn log_summary(&self) {
        info!("🎛️  当前流水线配置:");
        info!(
            "  目标帧率: {:.1} | 检测超时: {}ms | 队列容量: {}",
            self.scheduler.target_fps, self.scheduler.detector_timeout_ms, self.scheduler.queue_capacity
        );
        if self.tracking_enabled {
            info!(
                "  跟踪: max_age={} min_hits={} iou={:.2} 历史={} 匹配={:?}",
                self.tracker.max_age,
                self.tracker.min_hits,
                self.tracker.iou_threshold,
                self.tracker.history_cap,
                self.tracker.association
            );
        } else {
            info!("  跟踪: 关闭");
        }
        info!(
            "  指标窗口: {}s ({})",
            self.metrics.window_seconds, self.metrics.mode
        );
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}
