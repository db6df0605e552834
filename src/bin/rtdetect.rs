use anyhow::{bail, Context, Result};
/// 图片序列回放检测
/// 把目录中的图片按固定帧率当作实时视频流送入流水线,
/// 检测记录以 JSON 行输出到 stdout, 退出时输出指标报告; 日志输出到 stderr。
///
/// 直接运行: cargo run --bin rtdetect -- --frames ./frames --url http://127.0.0.1:8000/detect
use clap::Parser;
use crossbeam_channel::tick;
use rtdetect_rs::metrics::FrameSample;
use rtdetect_rs::tracking::AssociationStrategy;
use rtdetect_rs::{now_ms, HttpDetector, Pipeline, PipelineConfig};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// 实时检测回放程序
#[derive(Parser, Debug)]
#[command(author, version, about = "实时检测与跟踪 (图片序列回放)", long_about = None)]
struct Args {
    /// 图片目录 (按文件名排序回放)
    #[arg(short, long)]
    frames: PathBuf,

    /// 推理服务地址
    #[arg(short, long, default_value = "http://127.0.0.1:8000/detect")]
    url: String,

    /// 配置文件 (不存在时自动创建)
    #[arg(short, long, default_value = "rtdetect.json")]
    config: PathBuf,

    /// 目标帧率 (覆盖配置文件)
    #[arg(long)]
    fps: Option<f64>,

    /// 检测超时 ms (覆盖配置文件)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// 输出已确认轨迹的历史框
    #[arg(long)]
    trajectory: bool,

    /// 关闭跟踪
    #[arg(long)]
    no_tracking: bool,

    /// 匹配算法: greedy 或 hungarian
    #[arg(long)]
    association: Option<AssociationStrategy>,

    /// 回放次数
    #[arg(long, default_value_t = 1)]
    loops: u32,

    /// 日志级别 (RUST_LOG 优先)
    #[arg(long, default_value = "info")]
    log_level: String,
}

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("无法读取目录 {}", dir.display()))? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false);
        if is_image {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = PipelineConfig::load(&args.config)
        .with_context(|| format!("加载配置失败: {}", args.config.display()))?;
    if let Some(fps) = args.fps {
        config.scheduler.target_fps = fps;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.scheduler.detector_timeout_ms = timeout_ms;
    }
    if args.trajectory {
        config.trajectory = true;
    }
    if args.no_tracking {
        config.tracking_enabled = false;
    }
    if let Some(association) = args.association {
        config.tracker.association = association;
    }
    config.validate().context("命令行参数无效")?;
    config.log_summary();

    let frames = list_frames(&args.frames)?;
    if frames.is_empty() {
        bail!("目录 {} 中没有图片", args.frames.display());
    }
    info!("📂 {} 帧, 回放 {} 次", frames.len(), args.loops);
    info!("📡 推理服务: {}", args.url);

    let detector = Arc::new(HttpDetector::new(
        args.url.clone(),
        config.scheduler.detector_timeout(),
    ));
    let period = config.scheduler.period();
    let window_seconds = config.metrics.window_seconds as f64;
    let drain = config.scheduler.detector_timeout() + period;

    let mut pipeline = Pipeline::start(config, detector).context("启动流水线失败")?;

    // 观看端: 打印检测记录, 带上显示时间写回指标
    let results = pipeline.results().clone();
    let metrics = pipeline.metrics().clone();
    let viewer = std::thread::Builder::new()
        .name("viewer".into())
        .spawn(move || {
            let stdout = std::io::stdout();
            let mut downlink_bytes = 0usize;
            for record in results.iter() {
                let line = match record.to_json_line() {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("⚠️ 序列化检测记录失败: {}", e);
                        continue;
                    }
                };
                downlink_bytes += line.len() + 1;
                let mut out = stdout.lock();
                if writeln!(out, "{}", line).is_err() {
                    break;
                }
                metrics.record(FrameSample::from_record(&record, now_ms()));
            }
            downlink_bytes
        })
        .context("启动观看线程失败")?;

    // 传输端: 按帧率送入图片
    let started = Instant::now();
    let ticker = tick(period);
    let mut uplink_bytes = 0usize;
    let mut frame_id: i64 = 0;
    for _ in 0..args.loops {
        for path in &frames {
            ticker.recv().context("节拍器已关闭")?;
            let payload =
                std::fs::read(path).with_context(|| format!("读取帧失败: {}", path.display()))?;
            uplink_bytes += payload.len();
            let evicted = pipeline.on_frame(frame_id, payload, now_ms())?;
            if !evicted.is_empty() {
                info!("丢弃 {} 帧 (检测跟不上)", evicted.len());
            }
            frame_id += 1;
        }
    }

    // 等待最后一次检测完成
    std::thread::sleep(drain);
    pipeline.stop();
    let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);

    let downlink_bytes = viewer.join().unwrap_or_else(|_| {
        warn!("⚠️ 观看线程异常退出");
        0
    });
    pipeline.metrics().set_bandwidth(
        uplink_bytes as f64 * 8.0 / 1000.0 / elapsed,
        downlink_bytes as f64 * 8.0 / 1000.0 / elapsed,
    );

    let stats = pipeline.scheduler_stats();
    info!(
        "📊 调度统计: 派发{} 完成{} 失败{} 超时{} 忙碌跳过{}",
        stats.dispatched, stats.completed, stats.failed, stats.timed_out, stats.busy_ticks
    );
    if let Some(tracker) = pipeline.tracker_stats() {
        info!(
            "🎯 跟踪统计: 新建{} 删除{} 异常检测{} 存活{} 已确认{}",
            tracker.created, tracker.deleted, tracker.rejected_detections, tracker.live, tracker.confirmed
        );
    }

    let report = pipeline
        .metrics()
        .snapshot(window_seconds.min(elapsed.ceil()));
    println!("{}", report.to_json().context("序列化指标失败")?);

    Ok(())
}
