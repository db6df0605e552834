//! 帧输入队列 (FrameIngestQueue)
//!
//! 实时叠加只需要最新一帧: 队列满时丢弃最旧的帧 (drop-oldest),
//! 取帧时只返回最新的一帧, 更旧的帧同样计为丢帧。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use super::frame::{Frame, FrameId};
use crate::metrics::FrameCounters;

pub struct FrameIngestQueue {
    slots: Mutex<VecDeque<Frame>>,
    capacity: usize,
    counters: Arc<FrameCounters>,
}

impl FrameIngestQueue {
    /// 容量至少为 1
    pub fn new(capacity: usize, counters: Arc<FrameCounters>) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            counters,
        }
    }

    /// 保留最新一帧的队列
    pub fn keep_latest(counters: Arc<FrameCounters>) -> Self {
        Self::new(1, counters)
    }

    fn slots(&self) -> MutexGuard<'_, VecDeque<Frame>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 入队, 返回被挤掉的旧帧 id
    pub fn enqueue(&self, frame: Frame) -> Vec<FrameId> {
        self.counters.frame_received();

        let mut evicted = Vec::new();
        let mut slots = self.slots();
        while slots.len() >= self.capacity {
            if let Some(old) = slots.pop_front() {
                evicted.push(old.id().clone());
            }
        }
        slots.push_back(frame);
        drop(slots);

        if !evicted.is_empty() {
            self.counters.frames_dropped(evicted.len() as u64);
            trace!("队列已满, 丢弃旧帧 {:?}", evicted);
        }
        evicted
    }

    /// 取出最新一帧; 更旧的待处理帧一并丢弃
    pub fn try_dequeue_latest(&self) -> Option<Frame> {
        let mut slots = self.slots();
        let latest = slots.pop_back()?;
        let stale = slots.len() as u64;
        slots.clear();
        drop(slots);

        if stale > 0 {
            self.counters.frames_dropped(stale);
        }
        Some(latest)
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn counters(&self) -> &Arc<FrameCounters> {
        &self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: i64) -> Frame {
        Frame::new(id, vec![id as u8], id * 33, id * 33)
    }

    #[test]
    fn keeps_only_the_latest_frame() {
        let counters = Arc::new(FrameCounters::default());
        let queue = FrameIngestQueue::keep_latest(counters.clone());

        for n in 1..=10 {
            queue.enqueue(frame(n));
        }

        let latest = queue.try_dequeue_latest().unwrap();
        assert_eq!(latest.id(), &FrameId::Int(10));
        assert!(queue.try_dequeue_latest().is_none());
        assert_eq!(counters.dropped(), 9);
        assert_eq!(counters.received(), 10);
    }

    #[test]
    fn enqueue_reports_evicted_ids() {
        let queue = FrameIngestQueue::keep_latest(Arc::new(FrameCounters::default()));
        assert!(queue.enqueue(frame(1)).is_empty());
        assert_eq!(queue.enqueue(frame(2)), vec![FrameId::Int(1)]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn larger_capacity_evicts_oldest_first() {
        let counters = Arc::new(FrameCounters::default());
        let queue = FrameIngestQueue::new(3, counters.clone());

        for n in 1..=5 {
            queue.enqueue(frame(n));
        }
        // 1, 2 被挤出
        assert_eq!(counters.dropped(), 2);
        assert_eq!(queue.len(), 3);

        // 取最新帧时 3, 4 作废
        let latest = queue.try_dequeue_latest().unwrap();
        assert_eq!(latest.id(), &FrameId::Int(5));
        assert_eq!(counters.dropped(), 4);
        assert!(queue.is_empty());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let queue = FrameIngestQueue::new(0, Arc::new(FrameCounters::default()));
        assert_eq!(queue.capacity(), 1);
        queue.enqueue(frame(1));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn single_producer_single_consumer() {
        let counters = Arc::new(FrameCounters::default());
        let queue = Arc::new(FrameIngestQueue::keep_latest(counters.clone()));

        let producer = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                for n in 0..1000 {
                    queue.enqueue(frame(n));
                }
            })
        };

        let mut taken = 0u64;
        let mut last_seen = -1i64;
        while !producer.is_finished() || !queue.is_empty() {
            if let Some(f) = queue.try_dequeue_latest() {
                if let FrameId::Int(id) = f.id() {
                    // 取到的帧号单调递增
                    assert!(*id > last_seen);
                    last_seen = *id;
                }
                taken += 1;
            }
        }
        producer.join().unwrap();

        assert_eq!(last_seen, 999);
        assert_eq!(taken + counters.dropped(), 1000);
    }
}
