/// 检测系统 (Detection System)
///
/// 外部检测能力的抽象: 图像字节 → 原始检测框
/// - Detector:     检测器接口
/// - FnDetector:   闭包适配器
/// - HttpDetector: 远程推理服务
pub mod detector;
pub mod remote;
pub mod types;

pub use detector::{Detector, FnDetector};
pub use remote::HttpDetector;
pub use types::{BBox, RawDetection};
