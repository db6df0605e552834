//! 多目标跟踪器 (ObjectTracker)
//!
//! 每个周期依次执行:
//! 1. 预测: predicted_box = current_box + velocity
//! 2. 关联: 1 - IoU 代价矩阵, 贪心 (或 Hungarian) 匹配
//! 3. 更新已匹配轨迹
//! 4. 未匹配轨迹 frames_since_update += 1
//! 5. 未匹配检测创建新的 Tentative 轨迹
//! 6. 清理过期轨迹, 存活轨迹 age += 1
//!
//! 轨迹存放在紧凑数组中, 通过 `HashMap<TrackId, usize>` 索引, 删除用 `swap_remove`。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::association::{associate, cost_matrix, AssociationStrategy};
use super::track::{next_track_id, Track, TrackId, TrackSnapshot, TrackState};
use crate::detection::{BBox, RawDetection};
use crate::error::TrackerError;

/// 跟踪参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// 连续丢失多少帧后删除轨迹
    pub max_age: u32,
    /// 确认轨迹所需的命中次数
    pub min_hits: u32,
    /// 关联所需的最小 IoU
    pub iou_threshold: f32,
    /// 历史框数量上限
    pub history_cap: usize,
    /// Tentative 轨迹的最大存活周期
    pub age_limit: u32,
    /// 关联算法
    pub association: AssociationStrategy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_age: 30,
            min_hits: 3,
            iou_threshold: 0.3,
            history_cap: 50,
            age_limit: 10,
            association: AssociationStrategy::Greedy,
        }
    }
}

/// 跟踪统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerStats {
    pub cycles: u64,
    pub created: u64,
    pub deleted: u64,
    pub rejected_detections: u64,
    pub live: usize,
    pub confirmed: usize,
}

/// 单个输入检测在本周期的结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionOutcome {
    /// 格式错误, 已丢弃
    Rejected,
    /// 关联到 (或新建) 的轨迹及其周期结束时的状态
    Tracked { track_id: TrackId, state: TrackState },
}

impl DetectionOutcome {
    /// 仅在轨迹已确认时返回ID
    pub fn confirmed_id(&self) -> Option<TrackId> {
        match self {
            DetectionOutcome::Tracked {
                track_id,
                state: TrackState::Confirmed,
            } => Some(*track_id),
            _ => None,
        }
    }
}

/// 一个跟踪周期的输出, 与输入检测一一对应
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CycleOutput {
    pub outcomes: Vec<DetectionOutcome>,
}

pub struct ObjectTracker {
    config: TrackerConfig,
    tracks: Vec<Track>,
    index: HashMap<TrackId, usize>,
    stats: TrackerStats,
    /// 不变量被破坏后保存错误, 直到 restart()
    failure: Option<TrackerError>,
}

impl ObjectTracker {
    /// history_cap 至少为 1
    pub fn new(mut config: TrackerConfig) -> Self {
        config.history_cap = config.history_cap.max(1);
        Self {
            config,
            tracks: Vec::new(),
            index: HashMap::new(),
            stats: TrackerStats::default(),
            failure: None,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            live: self.tracks.len(),
            confirmed: self.tracks.iter().filter(|t| t.is_confirmed()).count(),
            ..self.stats
        }
    }

    pub fn is_halted(&self) -> bool {
        self.failure.is_some()
    }

    pub fn live_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.index.get(&id).and_then(|&slot| self.tracks.get(slot))
    }

    /// 执行一个跟踪周期; 跟踪器已停机时直接返回错误
    pub fn update(&mut self, detections: &[RawDetection]) -> Result<CycleOutput, TrackerError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        self.stats.cycles += 1;

        let mut outcomes = vec![DetectionOutcome::Rejected; detections.len()];

        // 过滤格式错误的检测框
        let valid: Vec<usize> = detections
            .iter()
            .enumerate()
            .filter_map(|(i, det)| match det.validate() {
                Ok(()) => Some(i),
                Err(e) => {
                    warn!("⚠️ 丢弃异常检测 #{} ({}): {}", i, det.label, e);
                    self.stats.rejected_detections += 1;
                    None
                }
            })
            .collect();

        // 1. 预测
        for track in self.tracks.iter_mut() {
            track.predict();
        }

        // 2. 关联
        let predicted: Vec<BBox> = self.tracks.iter().map(|t| t.predicted_box()).collect();
        let boxes: Vec<BBox> = valid.iter().map(|&i| detections[i].bbox).collect();
        let costs = cost_matrix(&predicted, &boxes);
        let pairs = associate(
            &costs,
            1.0 - self.config.iou_threshold,
            self.config.association,
        );

        let mut track_matched = vec![false; self.tracks.len()];
        let mut det_matched = vec![false; valid.len()];
        let mut assigned: Vec<(usize, TrackId)> = Vec::with_capacity(valid.len());

        // 3. 更新已匹配轨迹
        for (t, d) in pairs {
            track_matched[t] = true;
            det_matched[d] = true;

            let det_idx = valid[d];
            let track = &mut self.tracks[t];
            if track.update(
                &detections[det_idx],
                self.config.min_hits,
                self.config.history_cap,
            ) {
                debug!("✅ 轨迹 #{} 已确认 ({})", track.id(), track.label());
            }
            assigned.push((det_idx, track.id()));
        }

        // 4. 未匹配的轨迹
        for (track, matched) in self.tracks.iter_mut().zip(&track_matched) {
            if !matched {
                track.mark_missed();
            }
        }

        // 5. 未匹配的检测创建新轨迹
        for (d, matched) in det_matched.iter().enumerate() {
            if *matched {
                continue;
            }
            let det_idx = valid[d];
            let id = next_track_id();
            if self.index.contains_key(&id) {
                return Err(self.halt(TrackerError::DuplicateTrackId(id)));
            }

            let track = Track::new(
                id,
                &detections[det_idx],
                self.config.min_hits,
                self.config.history_cap,
            );
            self.index.insert(id, self.tracks.len());
            self.tracks.push(track);
            self.stats.created += 1;
            debug!("🆕 新轨迹 #{} ({})", id, detections[det_idx].label);
            assigned.push((det_idx, id));
        }

        // 6. 清理, 存活的轨迹 age += 1
        self.prune();
        for track in self.tracks.iter_mut() {
            track.grow_older();
        }

        if let Err(e) = self.verify_invariants() {
            return Err(self.halt(e));
        }

        for (det_idx, track_id) in assigned {
            let state = self
                .track(track_id)
                .map(|t| t.state())
                .unwrap_or(TrackState::Deleted);
            outcomes[det_idx] = DetectionOutcome::Tracked { track_id, state };
        }

        Ok(CycleOutput { outcomes })
    }

    fn should_remove(&self, track: &Track) -> bool {
        track.frames_since_update() > self.config.max_age
            || (track.state() == TrackState::Tentative
                && track.age() > self.config.age_limit
                && track.hits() < self.config.min_hits)
    }

    fn prune(&mut self) {
        // 倒序遍历: swap_remove 换进来的元素已经检查过
        for slot in (0..self.tracks.len()).rev() {
            if !self.should_remove(&self.tracks[slot]) {
                continue;
            }
            let mut removed = self.tracks.swap_remove(slot);
            removed.mark_deleted();
            self.index.remove(&removed.id());
            if let Some(moved) = self.tracks.get(slot) {
                self.index.insert(moved.id(), slot);
            }
            self.stats.deleted += 1;
            debug!(
                "🗑️ 删除轨迹 #{} ({}), 丢失 {} 帧",
                removed.id(),
                removed.label(),
                removed.frames_since_update()
            );
        }
    }

    /// 检查索引与轨迹数组一致, 历史长度不超限
    pub fn verify_invariants(&self) -> Result<(), TrackerError> {
        for (slot, track) in self.tracks.iter().enumerate() {
            match self.index.get(&track.id()) {
                Some(&s) if s == slot => {}
                Some(_) => return Err(TrackerError::DuplicateTrackId(track.id())),
                None => {
                    return Err(TrackerError::IndexCorrupted {
                        id: track.id(),
                        slot,
                    })
                }
            }
            if track.history_len() > self.config.history_cap {
                return Err(TrackerError::HistoryOverflow {
                    id: track.id(),
                    len: track.history_len(),
                    cap: self.config.history_cap,
                });
            }
        }
        if self.index.len() != self.tracks.len() {
            if let Some((&id, &slot)) = self
                .index
                .iter()
                .find(|(id, slot)| self.tracks.get(**slot).map(|t| t.id()) != Some(**id))
            {
                return Err(TrackerError::IndexCorrupted { id, slot });
            }
        }
        Ok(())
    }

    fn halt(&mut self, err: TrackerError) -> TrackerError {
        error!("❌ 跟踪器不变量被破坏, 停止跟踪: {}", err);
        self.failure = Some(err.clone());
        err
    }

    /// 所有已确认轨迹的拷贝
    pub fn confirmed_tracks(&self) -> Result<Vec<TrackSnapshot>, TrackerError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        Ok(self
            .tracks
            .iter()
            .filter(|t| t.is_confirmed())
            .map(Track::snapshot)
            .collect())
    }

    /// 清空全部轨迹并解除停机状态; 轨迹ID继续递增
    pub fn restart(&mut self) {
        self.tracks.clear();
        self.index.clear();
        self.failure = None;
        info!("🔄 跟踪器已重启");
    }
}
