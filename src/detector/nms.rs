// 该文件是 Liaowang（瞭望）项目的一部分。
// src/detector/nms.rs - 贪心非极大值抑制
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::cmp::Ordering;

use super::Candidate;

/// 退化框面积为零时避免除零
const IOU_EPSILON: f32 = 1e-6;

/// 轴对齐框的交并比
pub fn iou(a: &Candidate, b: &Candidate) -> f32 {
  let x1 = a.x1.max(b.x1);
  let y1 = a.y1.max(b.y1);
  let x2 = a.x2.min(b.x2);
  let y2 = a.y2.min(b.y2);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
  let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);

  intersection / (area_a + area_b - intersection + IOU_EPSILON)
}

/// 贪心抑制：按置信度降序选取，剔除与已选框 IoU 超过阈值的候选
///
/// 稳定排序保证同分候选保持输入顺序，重复运行结果一致。
pub fn suppress(mut candidates: Vec<Candidate>, iou_threshold: f32, max_detections: usize) -> Vec<Candidate> {
  candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

  let mut suppressed = vec![false; candidates.len()];
  let mut keep = Vec::new();
  for i in 0..candidates.len() {
    if suppressed[i] {
      continue;
    }
    keep.push(candidates[i].clone());
    if keep.len() >= max_detections {
      break;
    }
    for j in (i + 1)..candidates.len() {
      if !suppressed[j] && iou(&candidates[i], &candidates[j]) > iou_threshold {
        suppressed[j] = true;
      }
    }
  }
  keep
}

#[cfg(test)]
mod tests {
  use super::*;

  fn candidate(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Candidate {
    Candidate { x1, y1, x2, y2, score }
  }

  #[test]
  fn overlapping_boxes_collapse_to_best() {
    let input = vec![
      candidate(10.0, 10.0, 50.0, 50.0, 0.8),
      candidate(12.0, 12.0, 52.0, 52.0, 0.9),
      candidate(11.0, 9.0, 51.0, 49.0, 0.7),
    ];
    let kept = suppress(input, 0.5, 100);
    assert_eq!(kept.len(), 1);
    assert!((kept[0].score - 0.9).abs() < 1e-6);
  }

  #[test]
  fn disjoint_boxes_all_survive() {
    let input = vec![
      candidate(0.0, 0.0, 10.0, 10.0, 0.6),
      candidate(100.0, 100.0, 110.0, 110.0, 0.7),
      candidate(200.0, 0.0, 210.0, 10.0, 0.8),
    ];
    let kept = suppress(input, 0.5, 100);
    assert_eq!(kept.len(), 3);
    // 输出按分数降序
    assert!(kept[0].score >= kept[1].score && kept[1].score >= kept[2].score);
  }

  #[test]
  fn max_detections_caps_output() {
    let input: Vec<Candidate> = (0..10)
      .map(|i| candidate(i as f32 * 100.0, 0.0, i as f32 * 100.0 + 10.0, 10.0, 0.9))
      .collect();
    let kept = suppress(input, 0.5, 3);
    assert_eq!(kept.len(), 3);
  }

  /// 同分候选按原始顺序取舍，重复运行结果一致
  #[test]
  fn suppression_is_idempotent_with_score_ties() {
    let input = vec![
      candidate(0.0, 0.0, 40.0, 40.0, 0.7),
      candidate(2.0, 2.0, 42.0, 42.0, 0.7),
      candidate(60.0, 60.0, 100.0, 100.0, 0.7),
    ];
    let first = suppress(input.clone(), 0.5, 100);
    let second = suppress(first.clone(), 0.5, 100);
    assert_eq!(first.len(), 2);
    // 第一个同分候选胜出
    assert!((first[0].x1 - 0.0).abs() < 1e-6);
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
      assert_eq!(a.x1.to_bits(), b.x1.to_bits());
      assert_eq!(a.score.to_bits(), b.score.to_bits());
    }
  }

  /// 面积为零的退化框不会造成除零
  #[test]
  fn degenerate_box_has_zero_iou() {
    let point = candidate(10.0, 10.0, 10.0, 10.0, 0.9);
    let other = candidate(0.0, 0.0, 20.0, 20.0, 0.8);
    let value = iou(&point, &other);
    assert!(value.is_finite());
    assert!(value.abs() < 1e-3);
  }
}
