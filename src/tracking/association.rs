//! 轨迹与检测框的关联
//!
//! 代价矩阵 (tracks × detections): cost = 1 - IoU(predicted, detection)。
//! 默认贪心匹配: 反复取剩余最小代价且低于阈值的格子, 同代价按扫描顺序;
//! 也可选用 Hungarian 最优匹配, 两者都只输出满足阈值的一对一匹配。

use munkres::{solve_assignment, WeightMatrix};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::detection::BBox;

/// 超过阈值或补齐行列时使用的代价
const INELIGIBLE_COST: f32 = 1.0e6;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssociationStrategy {
    #[default]
    Greedy,
    Hungarian,
}

impl std::str::FromStr for AssociationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "greedy" => Ok(AssociationStrategy::Greedy),
            "hungarian" | "munkres" => Ok(AssociationStrategy::Hungarian),
            other => Err(format!("unknown association strategy: {}", other)),
        }
    }
}

/// 计算 IOU 代价矩阵
pub fn cost_matrix(predicted: &[BBox], detections: &[BBox]) -> Array2<f32> {
    Array2::from_shape_fn((predicted.len(), detections.len()), |(t, d)| {
        1.0 - predicted[t].iou(&detections[d])
    })
}

/// 返回 (track_idx, detection_idx) 匹配对, 只包含 cost < max_cost 的格子
pub fn associate(
    costs: &Array2<f32>,
    max_cost: f32,
    strategy: AssociationStrategy,
) -> Vec<(usize, usize)> {
    if costs.is_empty() {
        return Vec::new();
    }
    match strategy {
        AssociationStrategy::Greedy => greedy(costs, max_cost),
        AssociationStrategy::Hungarian => hungarian(costs, max_cost),
    }
}

fn greedy(costs: &Array2<f32>, max_cost: f32) -> Vec<(usize, usize)> {
    let (rows, cols) = costs.dim();

    // 按行优先扫描收集候选, 稳定排序保留扫描顺序作为同代价的次序
    let mut candidates: Vec<(f32, usize, usize)> = costs
        .indexed_iter()
        .filter(|(_, cost)| **cost < max_cost)
        .map(|((r, c), &cost)| (cost, r, c))
        .collect();
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut used_row = vec![false; rows];
    let mut used_col = vec![false; cols];
    let mut pairs = Vec::new();

    for (_, r, c) in candidates {
        if !used_row[r] && !used_col[c] {
            used_row[r] = true;
            used_col[c] = true;
            pairs.push((r, c));
        }
    }

    pairs
}

fn hungarian(costs: &Array2<f32>, max_cost: f32) -> Vec<(usize, usize)> {
    let (rows, cols) = costs.dim();
    let n = rows.max(cols);

    let mut weights = WeightMatrix::from_fn(n, |(r, c)| {
        if r < rows && c < cols && costs[[r, c]] < max_cost {
            costs[[r, c]]
        } else {
            INELIGIBLE_COST
        }
    });

    match solve_assignment(&mut weights) {
        Ok(positions) => positions
            .into_iter()
            .filter(|p| p.row < rows && p.column < cols)
            .filter(|p| costs[[p.row, p.column]] < max_cost)
            .map(|p| (p.row, p.column))
            .collect(),
        Err(e) => {
            warn!("⚠️ Hungarian 匹配求解失败 ({:?}), 回退到贪心匹配", e);
            greedy(costs, max_cost)
        }
    }
}
