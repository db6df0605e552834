//! 检测器接口 (Detector)
//! 职责: 图像字节 → 原始检测框列表
//!
//! 调度器在一个常驻检测线程上逐个调用检测器, 同一时刻最多一个调用,
//! 因此实现可以是阻塞的 (本地模型或远程 RPC), 也不需要可重入。

use std::time::Duration;

use crate::error::DetectorError;

use super::types::RawDetection;

/// 统一的检测器接口
///
/// 调度器超时后只丢弃该帧, 在调用真正返回之前不会派发下一帧,
/// 所以实现应当在 `timeout` 内返回 (超时可返回 `DetectorError::Timeout`)。
pub trait Detector: Send + Sync {
    /// 执行一次检测
    ///
    /// # Arguments
    /// * `image` - 编码后的图像字节 (格式由检测器自行约定)
    /// * `timeout` - 本次调用的时间上限
    fn detect(&self, image: &[u8], timeout: Duration) -> Result<Vec<RawDetection>, DetectorError>;

    /// 检测器名称 (用于日志)
    fn name(&self) -> &str {
        "detector"
    }
}

/// 闭包适配器; 闭包不接收超时参数, 需自行保证及时返回
pub struct FnDetector<F> {
    name: String,
    f: F,
}

impl<F> FnDetector<F>
where
    F: Fn(&[u8]) -> Result<Vec<RawDetection>, DetectorError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Detector for FnDetector<F>
where
    F: Fn(&[u8]) -> Result<Vec<RawDetection>, DetectorError> + Send + Sync,
{
    fn detect(&self, image: &[u8], _timeout: Duration) -> Result<Vec<RawDetection>, DetectorError> {
        (self.f)(image)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
