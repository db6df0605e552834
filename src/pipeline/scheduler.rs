//! 推理调度器 (InferenceScheduler)
//! 职责: 固定节拍取最新帧 → 检测线程调用检测器 → 完成后送入跟踪器 → 发送检测记录
//!
//! 调度线程是唯一的 actor: 它持有在途标志和跟踪器的写权限。
//! 检测器只在一个常驻检测线程上运行, 帧通过 bounded(1) channel 送达,
//! 结果通过 channel 回到调度线程。同一时刻最多一个检测调用在途:
//! 超时只丢弃帧, 检测线程真正返回之前不会派发下一帧。

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{
    after, bounded, never, select, tick, unbounded, Receiver, Sender, TrySendError,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::record::{DetectionEntry, DetectionRecord};
use crate::detection::{Detector, RawDetection};
use crate::error::{DetectorError, PipelineError};
use crate::ingest::{FrameId, FrameIngestQueue, FrameMeta};
use crate::metrics::FrameCounters;
use crate::tracking::{DetectionOutcome, ObjectTracker};

/// 调度参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 目标推理帧率
    pub target_fps: f64,
    /// 单次检测调用超时 (ms)
    pub detector_timeout_ms: u64,
    /// 输入队列容量 (1 = 只保留最新帧)
    pub queue_capacity: usize,
    /// 输出 channel 容量, 满时丢弃新记录
    pub output_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            target_fps: 30.0,
            detector_timeout_ms: 1000,
            queue_capacity: 1,
            output_capacity: 64,
        }
    }
}

impl SchedulerConfig {
    /// 节拍周期 = 1000ms / target_fps
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(f64::MIN_POSITIVE))
    }

    pub fn detector_timeout(&self) -> Duration {
        Duration::from_millis(self.detector_timeout_ms)
    }
}

/// 调度统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub dispatched: u64,
    pub completed: u64,
    /// 检测器报错或检测线程不可用 (不含超时)
    pub failed: u64,
    /// 调度器判定超时或检测器自身返回超时
    pub timed_out: u64,
    /// 检测线程忙 (含已超时但尚未返回的调用) 而跳过的节拍
    pub busy_ticks: u64,
    /// 队列为空而跳过的节拍
    pub idle_ticks: u64,
    /// 被放弃的调用迟到的结果
    pub discarded_late: u64,
    /// 最近一秒的推理帧率
    pub inference_fps: f64,
    /// 最近一次检测调用耗时 (ms)
    pub last_inference_ms: f64,
}

/// 单个节拍的结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Busy,
    Idle,
    Dispatched(FrameId),
    /// 检测线程不可用, 帧已丢弃
    Failed(FrameId),
}

/// 送往检测线程的任务
struct Job {
    generation: u64,
    payload: Vec<u8>,
}

/// 检测线程回传的检测结果
#[derive(Debug)]
pub struct Completion {
    generation: u64,
    result: Result<Vec<RawDetection>, DetectorError>,
    elapsed: Duration,
}

struct InFlight {
    generation: u64,
    meta: FrameMeta,
    deadline: Instant,
}

/// 记录输出选项
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OutputOptions {
    /// 已确认轨迹附带历史框
    pub trajectory: bool,
}

pub struct InferenceScheduler {
    period: Duration,
    timeout: Duration,
    detector: Arc<dyn Detector>,
    queue: Arc<FrameIngestQueue>,
    counters: Arc<FrameCounters>,
    /// None 表示关闭跟踪
    tracker: Option<Arc<Mutex<ObjectTracker>>>,
    options: OutputOptions,
    output: Sender<DetectionRecord>,

    /// 仍在等待结果的帧; 超时后清空
    in_flight: Option<InFlight>,
    /// 检测线程正在执行的调用, 直到它真正返回
    pending: Option<u64>,
    generation: u64,
    jobs: Sender<Job>,
    completion_rx: Receiver<Completion>,

    stats: Arc<Mutex<SchedulerStats>>,

    // 每秒统计
    count: u64,
    last: Instant,
}

/// 常驻检测线程: 逐个执行任务, 调度器释放任务端后退出
fn spawn_detector_thread(
    detector: Arc<dyn Detector>,
    timeout: Duration,
    jobs: Receiver<Job>,
    completions: Sender<Completion>,
) -> std::io::Result<()> {
    thread::Builder::new()
        .name("detector".into())
        .spawn(move || {
            while let Ok(job) = jobs.recv() {
                let start = Instant::now();
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    detector.detect(&job.payload, timeout)
                }))
                .unwrap_or_else(|_| Err(DetectorError::Failed("detector panicked".into())));

                let completion = Completion {
                    generation: job.generation,
                    result,
                    elapsed: start.elapsed(),
                };
                if completions.send(completion).is_err() {
                    break;
                }
            }
            debug!("检测线程退出");
        })
        .map(|_| ())
}

impl InferenceScheduler {
    /// 创建调度器并启动常驻检测线程
    pub fn new(
        config: &SchedulerConfig,
        detector: Arc<dyn Detector>,
        queue: Arc<FrameIngestQueue>,
        tracker: Option<Arc<Mutex<ObjectTracker>>>,
        options: OutputOptions,
        output: Sender<DetectionRecord>,
    ) -> Result<Self, PipelineError> {
        let timeout = config.detector_timeout();
        let (jobs, job_rx) = bounded(1);
        let (completion_tx, completion_rx) = unbounded();
        spawn_detector_thread(detector.clone(), timeout, job_rx, completion_tx).map_err(
            |source| PipelineError::Spawn {
                name: "detector",
                source,
            },
        )?;

        let counters = queue.counters().clone();
        Ok(Self {
            period: config.period(),
            timeout,
            detector,
            queue,
            counters,
            tracker,
            options,
            output,
            in_flight: None,
            pending: None,
            generation: 0,
            jobs,
            completion_rx,
            stats: Arc::new(Mutex::new(SchedulerStats::default())),
            count: 0,
            last: Instant::now(),
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// 检测线程是否仍在执行调用 (包括已超时的调用)
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// 在途调用的超时时刻
    pub fn deadline(&self) -> Option<Instant> {
        self.in_flight.as_ref().map(|f| f.deadline)
    }

    pub fn completions(&self) -> &Receiver<Completion> {
        &self.completion_rx
    }

    pub fn stats(&self) -> SchedulerStats {
        *self.stats_mut()
    }

    pub fn stats_handle(&self) -> Arc<Mutex<SchedulerStats>> {
        self.stats.clone()
    }

    fn stats_mut(&self) -> MutexGuard<'_, SchedulerStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 节拍处理: 检测线程忙则跳过, 否则取最新帧并派发
    pub fn on_tick(&mut self, now: Instant) -> TickOutcome {
        self.expire_if_due(now);

        if self.pending.is_some() {
            self.stats_mut().busy_ticks += 1;
            return TickOutcome::Busy;
        }

        let frame = match self.queue.try_dequeue_latest() {
            Some(frame) => frame,
            None => {
                self.stats_mut().idle_ticks += 1;
                return TickOutcome::Idle;
            }
        };

        let (meta, payload) = frame.into_parts();
        self.generation += 1;
        let generation = self.generation;

        // 检测线程空闲时任务槽必然为空, 失败只可能是线程已退出
        match self.jobs.try_send(Job { generation, payload }) {
            Ok(()) => {
                debug!("🔍 派发帧 {} (第 {} 次调用)", meta.id, generation);
                let id = meta.id.clone();
                self.pending = Some(generation);
                self.in_flight = Some(InFlight {
                    generation,
                    meta,
                    deadline: now + self.timeout,
                });
                self.stats_mut().dispatched += 1;
                TickOutcome::Dispatched(id)
            }
            Err(_) => {
                error!("❌ 检测线程不可用, 丢弃帧 {}", meta.id);
                self.counters.frame_dropped();
                self.stats_mut().failed += 1;
                TickOutcome::Failed(meta.id)
            }
        }
    }

    /// 在途调用超时: 丢弃帧, 返回是否发生超时
    ///
    /// 检测线程仍然忙, 直到被放弃的调用返回才会派发下一帧。
    pub fn expire_if_due(&mut self, now: Instant) -> bool {
        let expired = matches!(&self.in_flight, Some(f) if now >= f.deadline);
        if !expired {
            return false;
        }
        if let Some(flight) = self.in_flight.take() {
            warn!(
                "⏱️ 检测超时 ({:?}), 丢弃帧 {}, 等待检测器返回",
                self.timeout, flight.meta.id
            );
            self.counters.frame_dropped();
            self.stats_mut().timed_out += 1;
        }
        true
    }

    /// 处理检测线程回传的结果; 成功时返回发送出去的检测记录
    pub fn on_completion(&mut self, completion: Completion) -> Option<DetectionRecord> {
        if self.pending == Some(completion.generation) {
            self.pending = None;
        }
        let current = matches!(&self.in_flight, Some(f) if f.generation == completion.generation);
        if !current {
            debug!(
                "丢弃已放弃调用 #{} 的迟到结果",
                completion.generation
            );
            self.stats_mut().discarded_late += 1;
            return None;
        }
        let flight = self.in_flight.take()?;
        let inference_ms = completion.elapsed.as_secs_f64() * 1000.0;
        self.stats_mut().last_inference_ms = inference_ms;

        let detections = match completion.result {
            Ok(detections) => detections,
            Err(e) => {
                warn!("⚠️ 检测失败, 丢弃帧 {}: {}", flight.meta.id, e);
                self.counters.frame_dropped();
                let mut stats = self.stats_mut();
                if matches!(e, DetectorError::Timeout(_)) {
                    stats.timed_out += 1;
                } else {
                    stats.failed += 1;
                }
                return None;
            }
        };

        let inference_ts = crate::now_ms();
        let entries = self.track(&detections);
        let record = DetectionRecord::new(&flight.meta, inference_ts, entries);

        self.counters.frame_processed();
        self.stats_mut().completed += 1;
        self.log_throughput(inference_ms);

        match self.output.try_send(record.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!("输出队列已满, 丢弃帧 {} 的检测记录", record.frame_id);
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("输出端已关闭");
            }
        }

        Some(record)
    }

    /// 跟踪并生成输出条目; 跟踪器停机时输出为空
    fn track(&self, detections: &[RawDetection]) -> Vec<DetectionEntry> {
        let tracker = match &self.tracker {
            Some(tracker) => tracker,
            None => {
                return detections
                    .iter()
                    .filter(|det| match det.validate() {
                        Ok(()) => true,
                        Err(e) => {
                            warn!("⚠️ 丢弃异常检测 ({}): {}", det.label, e);
                            false
                        }
                    })
                    .map(DetectionEntry::untracked)
                    .collect();
            }
        };

        let mut tracker = tracker.lock().unwrap_or_else(PoisonError::into_inner);
        let cycle = match tracker.update(detections) {
            Ok(cycle) => cycle,
            Err(e) => {
                debug!("跟踪器已停机, 输出空检测: {}", e);
                return Vec::new();
            }
        };

        detections
            .iter()
            .zip(&cycle.outcomes)
            .filter(|(_, outcome)| !matches!(outcome, DetectionOutcome::Rejected))
            .map(|(det, outcome)| {
                let mut entry = DetectionEntry::untracked(det);
                if let Some(id) = outcome.confirmed_id() {
                    entry.track_id = Some(id);
                    if self.options.trajectory {
                        entry.trajectory = tracker
                            .track(id)
                            .map(|t| t.history().map(|b| b.as_array()).collect());
                    }
                }
                entry
            })
            .collect()
    }

    fn log_throughput(&mut self, inference_ms: f64) {
        self.count += 1;
        let elapsed = self.last.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            let fps = self.count as f64 / elapsed;
            self.stats_mut().inference_fps = fps;
            info!(
                "📊 推理统计: 处理{}帧 | 实际{:.1}fps | 每帧{:.1}ms | 队列{}",
                self.count,
                fps,
                inference_ms,
                self.queue.len()
            );
            self.last = Instant::now();
            self.count = 0;
        }
    }

    /// 调度线程主循环, 收到停止信号 (或发送端全部关闭) 后退出
    ///
    /// 退出时不等待检测线程; 它在当前调用返回后自行退出, 结果被丢弃。
    pub fn run(mut self, shutdown: Receiver<()>) {
        info!(
            "🚀 调度线程启动: 周期 {:?}, 检测器 {}, 超时 {:?}",
            self.period,
            self.detector.name(),
            self.timeout
        );

        let ticker = tick(self.period);
        let completions = self.completion_rx.clone();

        loop {
            let deadline = match self.deadline() {
                Some(at) => after(at.saturating_duration_since(Instant::now())),
                None => never(),
            };

            select! {
                recv(shutdown) -> _ => break,
                recv(ticker) -> _ => {
                    self.on_tick(Instant::now());
                }
                recv(completions) -> msg => {
                    if let Ok(completion) = msg {
                        self.on_completion(completion);
                    }
                }
                recv(deadline) -> _ => {
                    self.expire_if_due(Instant::now());
                }
            }
        }

        if let Some(generation) = self.pending.take() {
            debug!("放弃在途调用 #{}", generation);
        }
        info!("✅ 调度线程退出");
    }
}
