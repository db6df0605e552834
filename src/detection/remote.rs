//! 远程检测器 (HTTP)
//!
//! POST 原始图像字节到推理服务, 响应为 JSON 数组:
//! `[{"label": "person", "score": 0.9, "xmin": 0.1, "ymin": 0.1, "xmax": 0.4, "ymax": 0.4}]`

use std::time::{Duration, Instant};

use tracing::debug;

use super::detector::Detector;
use super::types::RawDetection;
use crate::error::DetectorError;

pub struct HttpDetector {
    agent: ureq::Agent,
    url: String,
    /// 请求超时上限, 单次调用取它与调用方超时中较小者
    timeout: Duration,
}

impl HttpDetector {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Detector for HttpDetector {
    fn detect(&self, image: &[u8], timeout: Duration) -> Result<Vec<RawDetection>, DetectorError> {
        let timeout = timeout.min(self.timeout);
        let start = Instant::now();
        let response = self
            .agent
            .post(&self.url)
            .timeout(timeout)
            .set("Content-Type", "application/octet-stream")
            .send_bytes(image)
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => {
                    DetectorError::Failed(format!("inference service returned HTTP {}", code))
                }
                // ureq 不单独区分超时, 按耗时判断
                ureq::Error::Transport(t) if start.elapsed() >= timeout => {
                    debug!("检测请求超时: {}", t);
                    DetectorError::Timeout(timeout)
                }
                ureq::Error::Transport(t) => DetectorError::Transport(t.to_string()),
            })?;

        serde_json::from_reader(response.into_reader())
            .map_err(|e| DetectorError::Decode(e.to_string()))
    }

    fn name(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_service_is_a_recoverable_error() {
        // 端口 9 (discard) 通常无人监听
        let detector = HttpDetector::new("http://127.0.0.1:9/detect", Duration::from_millis(200));
        let err = detector
            .detect(&[0u8; 4], Duration::from_millis(200))
            .unwrap_err();
        assert!(matches!(
            err,
            DetectorError::Transport(_) | DetectorError::Timeout(_)
        ));
    }
}
