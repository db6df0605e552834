//! 错误类型定义 (Error types)
//!
//! 队列溢出不是错误,只计数;其余错误都在模块边界内恢复,
//! 只有跟踪器不变量破坏会通过 `confirmed_tracks()` 向调用方暴露。

use std::time::Duration;

use thiserror::Error;

use crate::tracking::TrackId;

/// 检测器调用失败
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DetectorError {
    #[error("detector call exceeded {0:?}")]
    Timeout(Duration),
    #[error("detector failed: {0}")]
    Failed(String),
    #[error("detector transport error: {0}")]
    Transport(String),
    #[error("detector returned an undecodable response: {0}")]
    Decode(String),
}

/// 跟踪器入口处被拒绝的检测框
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MalformedDetection {
    #[error("detection has an empty label")]
    MissingLabel,
    #[error("score {0} is outside [0, 1]")]
    ScoreOutOfRange(f32),
    #[error("coordinate {name}={value} is outside [0, 1]")]
    CoordinateOutOfRange { name: &'static str, value: f32 },
    #[error("degenerate box: min {min} >= max {max} on axis {axis}")]
    Degenerate {
        axis: &'static str,
        min: f32,
        max: f32,
    },
}

/// 跟踪子系统的致命错误,直到 `restart()` 前一直有效
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TrackerError {
    #[error("duplicate track id {0}")]
    DuplicateTrackId(TrackId),
    #[error("track index corrupted: id {id} maps to slot {slot}")]
    IndexCorrupted { id: TrackId, slot: usize },
    #[error("track {id} history holds {len} boxes, cap is {cap}")]
    HistoryOverflow { id: TrackId, len: usize, cap: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline already stopped")]
    AlreadyStopped,
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}
