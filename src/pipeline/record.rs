//! 检测记录 (发送给观看端的 JSON)
//!
//! ```json
//! { "frame_id": 12, "capture_ts": 0, "recv_ts": 0, "inference_ts": 0,
//!   "detections": [ { "label": "person", "score": 0.9,
//!                     "xmin": 0.1, "ymin": 0.1, "xmax": 0.3, "ymax": 0.4,
//!                     "trackId": 3, "trajectory": [[0.1, 0.1, 0.3, 0.4]] } ] }
//! ```

use serde::{Deserialize, Serialize};

use crate::detection::{BBox, RawDetection};
use crate::ingest::{FrameId, FrameMeta};
use crate::tracking::TrackId;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionEntry {
    pub label: String,
    pub score: f32,
    #[serde(flatten)]
    pub bbox: BBox,
    /// 仅已确认轨迹携带
    #[serde(rename = "trackId", default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<TrackId>,
    /// 历史框 [xmin, ymin, xmax, ymax], 最新的在末尾
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trajectory: Option<Vec<[f32; 4]>>,
}

impl DetectionEntry {
    pub fn untracked(det: &RawDetection) -> Self {
        Self {
            label: det.label.clone(),
            score: det.score,
            bbox: det.bbox,
            track_id: None,
            trajectory: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub frame_id: FrameId,
    /// 发送端采集时间 (ms)
    pub capture_ts: i64,
    /// 服务端接收时间 (ms)
    pub recv_ts: i64,
    /// 推理完成时间 (ms)
    pub inference_ts: i64,
    pub detections: Vec<DetectionEntry>,
}

impl DetectionRecord {
    pub fn new(meta: &FrameMeta, inference_ts: i64, detections: Vec<DetectionEntry>) -> Self {
        Self {
            frame_id: meta.id.clone(),
            capture_ts: meta.capture_ts,
            recv_ts: meta.enqueue_ts,
            inference_ts,
            detections,
        }
    }

    /// 单行 JSON
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
