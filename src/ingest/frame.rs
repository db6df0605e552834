//! 输入帧 (Frame)

use std::fmt;

use serde::{Deserialize, Serialize};

/// 调用方提供的帧标识 (整数或字符串, 可比较)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrameId {
    Int(i64),
    Text(String),
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameId::Int(v) => write!(f, "{}", v),
            FrameId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for FrameId {
    fn from(v: i64) -> Self {
        FrameId::Int(v)
    }
}

impl From<u32> for FrameId {
    fn from(v: u32) -> Self {
        FrameId::Int(v as i64)
    }
}

impl From<&str> for FrameId {
    fn from(v: &str) -> Self {
        FrameId::Text(v.to_string())
    }
}

impl From<String> for FrameId {
    fn from(v: String) -> Self {
        FrameId::Text(v)
    }
}

/// 帧元数据 (负载交给检测器后仍需保留)
#[derive(Clone, Debug, PartialEq)]
pub struct FrameMeta {
    pub id: FrameId,
    /// 发送端采集时间 (ms)
    pub capture_ts: i64,
    /// 到达队列时间 (ms)
    pub enqueue_ts: i64,
}

/// 一帧待处理数据, 创建后不可变
#[derive(Clone, Debug)]
pub struct Frame {
    meta: FrameMeta,
    payload: Vec<u8>,
}

impl Frame {
    pub fn new(id: impl Into<FrameId>, payload: Vec<u8>, capture_ts: i64, enqueue_ts: i64) -> Self {
        Self {
            meta: FrameMeta {
                id: id.into(),
                capture_ts,
                enqueue_ts,
            },
            payload,
        }
    }

    pub fn id(&self) -> &FrameId {
        &self.meta.id
    }

    pub fn capture_ts(&self) -> i64 {
        self.meta.capture_ts
    }

    pub fn enqueue_ts(&self) -> i64 {
        self.meta.enqueue_ts
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn meta(&self) -> &FrameMeta {
        &self.meta
    }

    /// 拆分为元数据和负载 (负载移交给检测线程)
    pub fn into_parts(self) -> (FrameMeta, Vec<u8>) {
        (self.meta, self.payload)
    }
}
