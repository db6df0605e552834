//! 跟踪对象 (Track)
//! 生命周期: Tentative → Confirmed → Deleted

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::detection::{BBox, RawDetection};

/// 跟踪ID, 进程生命周期内单调递增且不复用
pub type TrackId = u64;

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_track_id() -> TrackId {
    NEXT_TRACK_ID.fetch_add(1, Ordering::SeqCst)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackState {
    Tentative,
    Confirmed,
    /// 终态, 随即从活动集合中移除
    Deleted,
}

/// 每帧位移 (左上角差分)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub dx: f32,
    pub dy: f32,
}

/// 活动轨迹, 仅由 ObjectTracker 持有
#[derive(Clone, Debug)]
pub struct Track {
    /// 唯一跟踪ID
    id: TrackId,

    label: String,

    /// 最近一次关联的检测框
    current_box: BBox,

    /// 关联前按速度外推的框
    predicted_box: BBox,

    velocity: Velocity,

    /// 确认更新次数 (创建计 1 次)
    hits: u32,

    /// 创建以来经过的周期数
    age: u32,

    /// 连续丢失周期数
    frames_since_update: u32,

    state: TrackState,

    /// 历史框 (最新的在末尾)
    history: VecDeque<BBox>,

    /// 最近一次检测置信度
    score: f32,
}

impl Track {
    pub(crate) fn new(id: TrackId, det: &RawDetection, min_hits: u32, history_cap: usize) -> Self {
        let mut history = VecDeque::with_capacity(history_cap.min(64));
        if history_cap > 0 {
            history.push_back(det.bbox);
        }

        let state = if min_hits <= 1 {
            TrackState::Confirmed
        } else {
            TrackState::Tentative
        };

        Self {
            id,
            label: det.label.clone(),
            current_box: det.bbox,
            predicted_box: det.bbox,
            velocity: Velocity::default(),
            hits: 1,
            age: 0,
            frames_since_update: 0,
            state,
            history,
            score: det.score,
        }
    }

    /// 一步线性外推
    pub(crate) fn predict(&mut self) {
        self.predicted_box = self
            .current_box
            .translated(self.velocity.dx, self.velocity.dy);
    }

    /// 关联成功后更新, 返回本次是否刚刚确认
    pub(crate) fn update(&mut self, det: &RawDetection, min_hits: u32, history_cap: usize) -> bool {
        let (x0, y0) = self.current_box.top_left();
        let (x1, y1) = det.bbox.top_left();
        self.velocity = Velocity {
            dx: x1 - x0,
            dy: y1 - y0,
        };

        self.current_box = det.bbox;
        self.label = det.label.clone();
        self.score = det.score;

        self.history.push_back(det.bbox);
        while self.history.len() > history_cap {
            self.history.pop_front();
        }

        self.hits += 1;
        self.frames_since_update = 0;

        if self.state == TrackState::Tentative && self.hits >= min_hits {
            self.state = TrackState::Confirmed;
            return true;
        }
        false
    }

    pub(crate) fn mark_missed(&mut self) {
        self.frames_since_update += 1;
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.state = TrackState::Deleted;
    }

    pub(crate) fn grow_older(&mut self) {
        self.age += 1;
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn current_box(&self) -> BBox {
        self.current_box
    }

    pub fn predicted_box(&self) -> BBox {
        self.predicted_box
    }

    pub fn velocity(&self) -> Velocity {
        self.velocity
    }

    pub fn hits(&self) -> u32 {
        self.hits
    }

    pub fn age(&self) -> u32 {
        self.age
    }

    pub fn frames_since_update(&self) -> u32 {
        self.frames_since_update
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn history(&self) -> impl Iterator<Item = &BBox> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == TrackState::Confirmed
    }

    /// 对外输出的拷贝
    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            track_id: self.id,
            label: self.label.clone(),
            current_box: self.current_box,
            velocity: self.velocity,
            history: self.history.iter().copied().collect(),
        }
    }
}

/// 已确认轨迹的只读拷贝
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub track_id: TrackId,
    pub label: String,
    pub current_box: BBox,
    pub velocity: Velocity,
    pub history: Vec<BBox>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(xmin: f32, ymin: f32) -> RawDetection {
        RawDetection::new("person", 0.9, BBox::new(xmin, ymin, xmin + 0.2, ymin + 0.2))
    }

    #[test]
    fn ids_are_monotonic() {
        let a = next_track_id();
        let b = next_track_id();
        assert!(b > a);
    }

    #[test]
    fn velocity_is_top_left_difference() {
        let mut track = Track::new(1, &det(0.1, 0.1), 3, 50);
        assert_eq!(track.velocity(), Velocity::default());

        track.update(&det(0.15, 0.12), 3, 50);
        let v = track.velocity();
        assert!((v.dx - 0.05).abs() < 1e-6);
        assert!((v.dy - 0.02).abs() < 1e-6);

        track.predict();
        let p = track.predicted_box();
        assert!((p.xmin - 0.2).abs() < 1e-6);
        assert!((p.ymin - 0.14).abs() < 1e-6);
    }

    #[test]
    fn history_is_capped() {
        let mut track = Track::new(1, &det(0.0, 0.0), 3, 4);
        for i in 1..10 {
            track.update(&det(i as f32 * 0.01, 0.0), 3, 4);
        }
        assert_eq!(track.history_len(), 4);
        let last = track.history().last().copied().unwrap();
        assert_eq!(last, track.current_box());
    }

    #[test]
    fn new_track_respects_zero_history_cap() {
        let mut track = Track::new(1, &det(0.1, 0.1), 3, 0);
        assert_eq!(track.history_len(), 0);
        track.update(&det(0.12, 0.1), 3, 0);
        assert_eq!(track.history_len(), 0);
    }

    #[test]
    fn confirms_once_at_min_hits() {
        let mut track = Track::new(1, &det(0.1, 0.1), 3, 50);
        assert_eq!(track.state(), TrackState::Tentative);
        assert!(!track.update(&det(0.1, 0.1), 3, 50));
        assert!(track.update(&det(0.1, 0.1), 3, 50));
        assert_eq!(track.state(), TrackState::Confirmed);
        assert!(!track.update(&det(0.1, 0.1), 3, 50));
    }

    #[test]
    fn min_hits_one_confirms_on_creation() {
        let track = Track::new(1, &det(0.1, 0.1), 1, 50);
        assert!(track.is_confirmed());
    }
}
