use rtdetect_rs::metrics::FrameSample;
use rtdetect_rs::{
    now_ms, BBox, DetectionRecord, DetectorError, FnDetector, FrameId, Pipeline, PipelineConfig,
    RawDetection,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn config(timeout_ms: u64) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.scheduler.target_fps = 50.0;
    config.scheduler.detector_timeout_ms = timeout_ms;
    config
}

fn next_record(pipeline: &Pipeline) -> DetectionRecord {
    pipeline
        .results()
        .recv_timeout(Duration::from_secs(3))
        .expect("no detection record within 3s")
}

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(3) {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

/// payload[0] 作为帧序号, 目标每帧右移 0.01
fn walking_person(image: &[u8]) -> Result<Vec<RawDetection>, DetectorError> {
    let step = image.first().copied().unwrap_or(0) as f32 * 0.01;
    Ok(vec![
        RawDetection::new("person", 0.9, BBox::new(0.1 + step, 0.2, 0.3 + step, 0.6)),
        // 越界坐标, 应被跟踪器拒绝
        RawDetection::new("ghost", 0.4, BBox::new(0.5, 0.5, 1.2, 0.9)),
    ])
}

#[test]
fn track_is_confirmed_on_third_frame() {
    let detector = Arc::new(FnDetector::new("walker", walking_person));
    let mut pipeline = Pipeline::start(config(1000), detector).unwrap();

    let mut records = Vec::new();
    for i in 0..3u8 {
        pipeline.on_frame(i as i64, vec![i], now_ms()).unwrap();
        records.push(next_record(&pipeline));
    }

    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.frame_id, FrameId::Int(i as i64));
        assert_eq!(record.detections.len(), 1, "malformed detection leaked");
        assert_eq!(record.detections[0].label, "person");
    }
    assert_eq!(records[0].detections[0].track_id, None);
    assert_eq!(records[1].detections[0].track_id, None);
    let id = records[2].detections[0]
        .track_id
        .expect("track confirmed at min_hits");

    let confirmed = pipeline.confirmed_tracks().unwrap();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].track_id, id);
    assert_eq!(confirmed[0].label, "person");
    assert_eq!(confirmed[0].history.len(), 3);
    assert!((confirmed[0].velocity.dx - 0.01).abs() < 1e-5);

    let stats = pipeline.tracker_stats().unwrap();
    assert_eq!(stats.rejected_detections, 3);
    assert_eq!(stats.created, 1);

    pipeline.stop();
    // 停止后仍可读取
    assert_eq!(pipeline.confirmed_tracks().unwrap().len(), 1);
}

#[test]
fn trajectory_is_attached_when_enabled() {
    let detector = Arc::new(FnDetector::new("walker", walking_person));
    let mut config = config(1000);
    config.trajectory = true;
    let pipeline = Pipeline::start(config, detector).unwrap();

    let mut last = None;
    for i in 0..4u8 {
        pipeline.on_frame(i as i64, vec![i], now_ms()).unwrap();
        last = Some(next_record(&pipeline));
    }

    let record = last.unwrap();
    let trajectory = record.detections[0].trajectory.as_ref().unwrap();
    assert_eq!(trajectory.len(), 4);
    assert_eq!(trajectory[3], record.detections[0].bbox.as_array());
}

#[test]
fn timeout_drops_frame_and_next_frame_is_processed() {
    let calls = Arc::new(AtomicUsize::new(0));
    let detector = {
        let calls = calls.clone();
        Arc::new(FnDetector::new("sometimes-slow", move |image: &[u8]| {
            calls.fetch_add(1, Ordering::SeqCst);
            if image.first() == Some(&1) {
                thread::sleep(Duration::from_millis(400));
            }
            walking_person(image)
        }))
    };
    let pipeline = Pipeline::start(config(100), detector).unwrap();

    pipeline.on_frame("slow", vec![1], now_ms()).unwrap();
    assert!(wait_until(|| pipeline.scheduler_stats().timed_out == 1));

    pipeline.on_frame("fast", vec![2], now_ms()).unwrap();
    let record = next_record(&pipeline);
    assert_eq!(record.frame_id, FrameId::from("fast"));
    assert_eq!(record.detections.len(), 1);

    // 被放弃调用的结果迟到后被丢弃, 不会产生记录
    assert!(wait_until(|| pipeline.scheduler_stats().discarded_late == 1));
    assert!(pipeline.results().try_recv().is_err());

    let counters = pipeline.counters();
    assert_eq!(counters.received(), 2);
    assert_eq!(counters.dropped(), 1);
    assert_eq!(counters.processed(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn hanging_detector_never_runs_concurrently() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let detector = {
        let (active, peak, calls) = (active.clone(), peak.clone(), calls.clone());
        Arc::new(FnDetector::new("hanging", move |image: &[u8]| {
            calls.fetch_add(1, Ordering::SeqCst);
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(300));
            active.fetch_sub(1, Ordering::SeqCst);
            walking_person(image)
        }))
    };
    let pipeline = Pipeline::start(config(20), detector).unwrap();

    for i in 0..20u8 {
        pipeline.on_frame(i as i64, vec![i], now_ms()).unwrap();
        thread::sleep(Duration::from_millis(25));
    }
    assert!(wait_until(|| pipeline.scheduler_stats().discarded_late >= 2));

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    let stats = pipeline.scheduler_stats();
    assert!(calls.load(Ordering::SeqCst) < 20);
    assert!(stats.timed_out >= 2);
    assert!(stats.busy_ticks > 0);
    assert!(pipeline.results().try_recv().is_err());
}

#[test]
fn only_latest_frame_survives_while_busy() {
    let detector = Arc::new(FnDetector::new("slow", |image: &[u8]| {
        thread::sleep(Duration::from_millis(150));
        walking_person(image)
    }));
    let pipeline = Pipeline::start(config(1000), detector).unwrap();

    pipeline.on_frame(0i64, vec![0], now_ms()).unwrap();
    assert!(wait_until(|| pipeline.scheduler_stats().dispatched == 1));

    // 在途期间到达 5 帧, 只保留最后一帧
    let mut evicted = Vec::new();
    for i in 1..=5u8 {
        evicted.extend(pipeline.on_frame(i as i64, vec![i], now_ms()).unwrap());
    }
    assert_eq!(
        evicted,
        (1..=4).map(FrameId::Int).collect::<Vec<_>>()
    );

    let first = next_record(&pipeline);
    let second = next_record(&pipeline);
    assert_eq!(first.frame_id, FrameId::Int(0));
    assert_eq!(second.frame_id, FrameId::Int(5));

    let counters = pipeline.counters();
    assert_eq!(counters.received(), 6);
    assert_eq!(counters.dropped(), 4);
    assert_eq!(counters.processed(), 2);
    assert!(pipeline.scheduler_stats().busy_ticks > 0);
}

#[test]
fn viewer_samples_feed_metrics_report() {
    let detector = Arc::new(FnDetector::new("walker", walking_person));
    let pipeline = Pipeline::start(config(1000), detector).unwrap();

    for i in 0..5u8 {
        let capture_ts = now_ms() - 20;
        pipeline.on_frame(i as i64, vec![i], capture_ts).unwrap();
        let record = next_record(&pipeline);
        pipeline
            .metrics()
            .record(FrameSample::from_record(&record, now_ms()));
    }
    pipeline.metrics().set_bandwidth(1200.0, 8.0);

    let report = pipeline.metrics().snapshot(30.0);
    assert_eq!(report.frames.total, 5);
    assert_eq!(report.frames.processed, 5);
    assert_eq!(report.frames.dropped, 0);
    assert_eq!(report.detections.total, 5);
    assert_eq!(report.fps.target, 50.0);
    assert!(report.latency.e2e.min >= 20.0);
    assert!(report.latency.network.min >= 20.0);
    assert!(report.latency.e2e.p95 >= report.latency.e2e.median);
    assert_eq!(report.bandwidth.uplink_kbps, 1200.0);

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["mode"], "server");
    assert_eq!(json["frames"]["processed"], 5);

    pipeline.metrics().reset();
    assert_eq!(pipeline.metrics().snapshot(30.0).frames.total, 0);
}

#[test]
fn tracking_can_be_disabled() {
    let detector = Arc::new(FnDetector::new("walker", walking_person));
    let mut config = config(1000);
    config.tracking_enabled = false;
    let pipeline = Pipeline::start(config, detector).unwrap();

    for i in 0..4u8 {
        pipeline.on_frame(i as i64, vec![i], now_ms()).unwrap();
        let record = next_record(&pipeline);
        assert!(record.detections.iter().all(|d| d.track_id.is_none()));
    }
    assert!(pipeline.confirmed_tracks().unwrap().is_empty());
    assert!(pipeline.tracker_stats().is_none());
}
