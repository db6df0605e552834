/// 帧输入系统 (Frame Ingest System)
///
/// 传输层回调 `on_frame` 是进入队列的唯一入口
/// - Frame:            输入帧与帧标识
/// - FrameIngestQueue: 丢弃最旧帧的有界队列
pub mod frame;
pub mod queue;

pub use frame::{Frame, FrameId, FrameMeta};
pub use queue::FrameIngestQueue;
