// 该文件是 Liaowang（瞭望）项目的一部分。
// src/detector/dfl.rs - DFL 分布回归解码
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use ndarray::ArrayView3;
use tracing::warn;

use super::Candidate;

pub fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 对一段 bin logits 做 softmax 后取 bin 序号的期望，得到连续距离估计
fn distribution_expectation(logits: &[f32]) -> f32 {
  let max = logits.iter().cloned().fold(f32::MIN, f32::max);
  let mut sum = 0.0f32;
  let mut weighted = 0.0f32;
  for (bin, &logit) in logits.iter().enumerate() {
    let e = (logit - max).exp();
    sum += e;
    weighted += e * bin as f32;
  }
  weighted / sum
}

/// 解码单个检测头
///
/// `reg` 形状 (Hs, Ws, 4B)：每格四边各 B 个 bin 的分布 logits；
/// `cls` 形状 (Hs, Ws, 1)：每格单类 logit。
/// 置信度等于阈值的格保留。网格尺寸不一致时该头产出为空，不影响其它头。
pub fn decode_head(
  reg: ArrayView3<f32>,
  cls: ArrayView3<f32>,
  stride: u32,
  num_bins: usize,
  score_threshold: f32,
  out: &mut Vec<Candidate>,
) {
  let (hs, ws, reg_c) = reg.dim();
  let (cls_h, cls_w, _) = cls.dim();
  if reg_c != 4 * num_bins {
    warn!("回归张量通道数异常: 期望 {}, 实际 {}", 4 * num_bins, reg_c);
    return;
  }
  if cls_h != hs || cls_w != ws {
    warn!(
      "回归与分类网格不一致: {}x{} 与 {}x{}",
      hs, ws, cls_h, cls_w
    );
    return;
  }

  let stride = stride as f32;
  let mut logits = vec![0.0f32; num_bins];
  for gy in 0..hs {
    for gx in 0..ws {
      let score = sigmoid(cls[[gy, gx, 0]]);
      if score < score_threshold {
        continue;
      }

      // 每边分布的期望，单位为步长
      let mut dist = [0.0f32; 4];
      for (side, d) in dist.iter_mut().enumerate() {
        for bin in 0..num_bins {
          logits[bin] = reg[[gy, gx, side * num_bins + bin]];
        }
        *d = distribution_expectation(&logits);
      }

      // 格中心在网络输入坐标系中的位置
      let cx = (gx as f32 + 0.5) * stride;
      let cy = (gy as f32 + 0.5) * stride;

      out.push(Candidate {
        x1: cx - dist[0] * stride,
        y1: cy - dist[1] * stride,
        x2: cx + dist[2] * stride,
        y2: cy + dist[3] * stride,
        score,
      });
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::Array3;

  const B: usize = 16;

  /// 构造期望值为 target 的 bin logits：整数部分与相邻 bin 按小数拆分权重
  pub(crate) fn dist_logits(target: f32) -> Vec<f32> {
    let mut logits = vec![-50.0f32; B];
    let k = target.floor() as usize;
    let frac = target - target.floor();
    if frac < 1e-6 {
      logits[k] = 50.0;
    } else {
      logits[k] = (1.0 - frac).ln();
      logits[k + 1] = frac.ln();
    }
    logits
  }

  fn head_with_cell(
    hs: usize,
    ws: usize,
    cell: (usize, usize),
    dists: [f32; 4],
    logit: f32,
  ) -> (Array3<f32>, Array3<f32>) {
    let mut reg = Array3::<f32>::zeros((hs, ws, 4 * B));
    let mut cls = Array3::<f32>::from_elem((hs, ws, 1), -20.0);
    let (gy, gx) = cell;
    cls[[gy, gx, 0]] = logit;
    for side in 0..4 {
      for (bin, &l) in dist_logits(dists[side]).iter().enumerate() {
        reg[[gy, gx, side * B + bin]] = l;
      }
    }
    (reg, cls)
  }

  #[test]
  fn expectation_recovers_encoded_distance() {
    assert!((distribution_expectation(&dist_logits(4.0)) - 4.0).abs() < 1e-3);
    assert!((distribution_expectation(&dist_logits(1.75)) - 1.75).abs() < 1e-3);
    assert!((distribution_expectation(&dist_logits(0.0))).abs() < 1e-3);
  }

  #[test]
  fn decodes_single_cell_box() {
    // 格 (5, 5)，步长 8：中心 (44, 44)，四边各 2 个步长
    let (reg, cls) = head_with_cell(8, 8, (5, 5), [2.0, 2.0, 2.0, 2.0], 5.0);
    let mut out = Vec::new();
    decode_head(reg.view(), cls.view(), 8, B, 0.5, &mut out);
    assert_eq!(out.len(), 1);
    let c = &out[0];
    assert!((c.x1 - 28.0).abs() < 0.1);
    assert!((c.y1 - 28.0).abs() < 0.1);
    assert!((c.x2 - 60.0).abs() < 0.1);
    assert!((c.y2 - 60.0).abs() < 0.1);
    assert!(c.score > 0.99);
  }

  /// sigmoid(0) 恰为 0.5：等于阈值保留，低于阈值丢弃
  #[test]
  fn score_threshold_boundary_is_inclusive() {
    let (reg, cls) = head_with_cell(4, 4, (1, 1), [1.0, 1.0, 1.0, 1.0], 0.0);
    let mut out = Vec::new();
    decode_head(reg.view(), cls.view(), 8, B, 0.5, &mut out);
    assert_eq!(out.len(), 1, "等于阈值的候选应保留");

    let (reg, cls) = head_with_cell(4, 4, (1, 1), [1.0, 1.0, 1.0, 1.0], -0.05);
    let mut out = Vec::new();
    decode_head(reg.view(), cls.view(), 8, B, 0.5, &mut out);
    assert!(out.is_empty(), "略低于阈值的候选应丢弃");
  }

  #[test]
  fn wrong_channel_count_yields_nothing() {
    let reg = Array3::<f32>::zeros((4, 4, 4 * B - 1));
    let cls = Array3::<f32>::from_elem((4, 4, 1), 10.0);
    let mut out = Vec::new();
    decode_head(reg.view(), cls.view(), 8, B, 0.5, &mut out);
    assert!(out.is_empty());
  }

  #[test]
  fn mismatched_grids_yield_nothing() {
    let reg = Array3::<f32>::zeros((4, 4, 4 * B));
    let cls = Array3::<f32>::from_elem((8, 8, 1), 10.0);
    let mut out = Vec::new();
    decode_head(reg.view(), cls.view(), 8, B, 0.5, &mut out);
    assert!(out.is_empty());
  }
}
