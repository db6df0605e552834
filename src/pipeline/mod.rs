/// 实时检测流水线 (Real-time Detection Pipeline)
///
/// 每路视频流一个实例, 两个线程通过 channel 通信:
/// - 传输线程: on_frame → FrameIngestQueue (只保留最新帧)
/// - 调度线程: 节拍取帧 → 检测器 → 跟踪器 → 检测记录
///
/// 检测记录从 `results()` 读出; 观看端带上显示时间后写回 `metrics()`。
pub mod record;
pub mod scheduler;

pub use record::{DetectionEntry, DetectionRecord};
pub use scheduler::{
    Completion, InferenceScheduler, OutputOptions, SchedulerConfig, SchedulerStats, TickOutcome,
};

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::detection::Detector;
use crate::error::{PipelineError, TrackerError};
use crate::ingest::{Frame, FrameId, FrameIngestQueue};
use crate::metrics::{FrameCounters, MetricsRecorder};
use crate::tracking::{ObjectTracker, TrackSnapshot, TrackerStats};

/// 流水线句柄; 停止后跟踪器和指标仍可读取
pub struct Pipeline {
    queue: Arc<FrameIngestQueue>,
    tracker: Option<Arc<Mutex<ObjectTracker>>>,
    metrics: Arc<MetricsRecorder>,
    stats: Arc<Mutex<SchedulerStats>>,
    results: Receiver<DetectionRecord>,
    shutdown: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// 校验配置并启动调度线程
    pub fn start(config: PipelineConfig, detector: Arc<dyn Detector>) -> Result<Self, PipelineError> {
        config.validate()?;

        let counters = Arc::new(FrameCounters::default());
        let queue = Arc::new(FrameIngestQueue::new(
            config.scheduler.queue_capacity,
            counters.clone(),
        ));
        let tracker = config
            .tracking_enabled
            .then(|| Arc::new(Mutex::new(ObjectTracker::new(config.tracker.clone()))));
        let metrics = Arc::new(MetricsRecorder::new(
            &config.metrics,
            config.scheduler.target_fps,
            counters,
        ));

        let (tx_results, rx_results) = bounded(config.scheduler.output_capacity);
        let (tx_shutdown, rx_shutdown) = bounded::<()>(1);

        let scheduler = InferenceScheduler::new(
            &config.scheduler,
            detector,
            queue.clone(),
            tracker.clone(),
            OutputOptions {
                trajectory: config.trajectory,
            },
            tx_results,
        )?;
        let stats = scheduler.stats_handle();

        let worker = thread::Builder::new()
            .name("scheduler".into())
            .spawn(move || scheduler.run(rx_shutdown))
            .map_err(|source| PipelineError::Spawn {
                name: "scheduler",
                source,
            })?;

        info!(
            "✅ 流水线已启动 (目标 {:.1}fps, 跟踪{})",
            config.scheduler.target_fps,
            if config.tracking_enabled { "开启" } else { "关闭" }
        );

        Ok(Self {
            queue,
            tracker,
            metrics,
            stats,
            results: rx_results,
            shutdown: Some(tx_shutdown),
            worker: Some(worker),
        })
    }

    /// 传输层回调: 新帧入队, 返回被挤出的帧ID
    pub fn on_frame(
        &self,
        frame_id: impl Into<FrameId>,
        payload: Vec<u8>,
        capture_ts: i64,
    ) -> Result<Vec<FrameId>, PipelineError> {
        if !self.is_running() {
            return Err(PipelineError::AlreadyStopped);
        }
        let frame = Frame::new(frame_id, payload, capture_ts, crate::now_ms());
        Ok(self.queue.enqueue(frame))
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_some()
    }

    /// 检测记录输出 (有界, 读取过慢时新记录被丢弃)
    pub fn results(&self) -> &Receiver<DetectionRecord> {
        &self.results
    }

    /// 已确认轨迹; 关闭跟踪时为空
    pub fn confirmed_tracks(&self) -> Result<Vec<TrackSnapshot>, TrackerError> {
        match &self.tracker {
            Some(tracker) => tracker
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .confirmed_tracks(),
            None => Ok(Vec::new()),
        }
    }

    pub fn tracker_stats(&self) -> Option<TrackerStats> {
        self.tracker
            .as_ref()
            .map(|t| t.lock().unwrap_or_else(PoisonError::into_inner).stats())
    }

    /// 清除跟踪器停机状态
    pub fn restart_tracker(&self) {
        if let Some(tracker) = &self.tracker {
            tracker
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .restart();
        }
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    pub fn counters(&self) -> &Arc<FrameCounters> {
        self.queue.counters()
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 停止节拍并等待调度线程退出; 在途的检测调用不等待
    pub fn stop(&mut self) {
        let Some(shutdown) = self.shutdown.take() else {
            return;
        };
        let _ = shutdown.send(());

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("⚠️ 调度线程异常退出");
            }
        }
        info!("⏹️ 流水线已停止");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
