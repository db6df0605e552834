/// 检测数据结构定义
/// Data structures for detector output
use serde::{Deserialize, Serialize};

use crate::error::MalformedDetection;

/// 归一化边界框 (xmin, ymin, xmax, ymax 均在 [0,1])
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl BBox {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// 左上角
    pub fn top_left(&self) -> (f32, f32) {
        (self.xmin, self.ymin)
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.xmin + self.xmax) / 2.0,
            (self.ymin + self.ymax) / 2.0,
        )
    }

    /// 平移 (用于线性运动预测)
    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        Self {
            xmin: self.xmin + dx,
            ymin: self.ymin + dy,
            xmax: self.xmax + dx,
            ymax: self.ymax + dy,
        }
    }

    pub fn intersection_area(&self, another: &BBox) -> f32 {
        let l = self.xmin.max(another.xmin);
        let r = self.xmax.min(another.xmax);
        let t = self.ymin.max(another.ymin);
        let b = self.ymax.min(another.ymax);
        (r - l).max(0.) * (b - t).max(0.)
    }

    pub fn union(&self, another: &BBox) -> f32 {
        self.area() + another.area() - self.intersection_area(another)
    }

    /// 交并比, 不相交时为 0
    pub fn iou(&self, another: &BBox) -> f32 {
        let union = self.union(another);
        if union <= 0.0 {
            return 0.0;
        }
        (self.intersection_area(another) / union).clamp(0.0, 1.0)
    }

    pub fn as_array(&self) -> [f32; 4] {
        [self.xmin, self.ymin, self.xmax, self.ymax]
    }

    /// 校验归一化坐标
    pub fn validate(&self) -> Result<(), MalformedDetection> {
        for (name, value) in [
            ("xmin", self.xmin),
            ("ymin", self.ymin),
            ("xmax", self.xmax),
            ("ymax", self.ymax),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MalformedDetection::CoordinateOutOfRange { name, value });
            }
        }
        if self.xmin >= self.xmax {
            return Err(MalformedDetection::Degenerate {
                axis: "x",
                min: self.xmin,
                max: self.xmax,
            });
        }
        if self.ymin >= self.ymax {
            return Err(MalformedDetection::Degenerate {
                axis: "y",
                min: self.ymin,
                max: self.ymax,
            });
        }
        Ok(())
    }
}

/// 检测器原始输出
///
/// 序列化格式与检测记录中的单个检测项一致 (label/score/xmin/ymin/xmax/ymax)。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub label: String,
    pub score: f32,
    #[serde(flatten)]
    pub bbox: BBox,
}

impl RawDetection {
    pub fn new(label: impl Into<String>, score: f32, bbox: BBox) -> Self {
        Self {
            label: label.into(),
            score,
            bbox,
        }
    }

    pub fn validate(&self) -> Result<(), MalformedDetection> {
        if self.label.trim().is_empty() {
            return Err(MalformedDetection::MissingLabel);
        }
        // NaN 也会落在这里
        if !(0.0..=1.0).contains(&self.score) {
            return Err(MalformedDetection::ScoreOutOfRange(self.score));
        }
        self.bbox.validate()
    }
}
