// 该文件是 Liaowang（瞭望）项目的一部分。
// src/detector.rs - 多尺度解码、合并与坐标还原
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::collections::HashMap;

use ndarray::ArrayView3;
use tracing::{debug, warn};

use crate::config::DecodeConfig;
use crate::frame::LetterboxTransform;
use crate::model::OutputMap;

pub mod dfl;
pub mod nms;

/// 网络输入坐标系中的候选框，解码器产出，合并器消费
#[derive(Debug, Clone)]
pub struct Candidate {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
  pub score: f32,
}

/// 原始帧像素坐标系中的最终检测
///
/// 恒有 `x1 <= x2`、`y1 <= y2`，两角均裁剪到图像范围内。
#[derive(Debug, Clone)]
pub struct Detection {
  pub x1: i32,
  pub y1: i32,
  pub x2: i32,
  pub y2: i32,
  pub score: f32,
  pub class_id: u32,
}

/// 层名解析后的检测头
#[derive(Debug, Clone)]
struct ResolvedHead {
  stride: u32,
  reg_layer: String,
  cls_layer: String,
}

/// 检测解码器：逐头 DFL 解码、跨尺度 NMS、信箱逆变换
pub struct Detector {
  heads: Vec<ResolvedHead>,
  num_bins: usize,
  score_threshold: f32,
  iou_threshold: f32,
  max_detections: usize,
}

impl Detector {
  /// 从配置与模型实际输出层名构建
  ///
  /// 配置中的层名可能带有与模型不同的前缀，按 `/` 分隔的末段
  /// 后缀匹配到实际层名；匹配不到时保留配置原名，缺失在解码时处理。
  pub fn new(config: &DecodeConfig, output_names: &[String]) -> Self {
    let suffix_map: HashMap<&str, &String> = output_names
      .iter()
      .map(|full| (full.rsplit('/').next().unwrap_or(full), full))
      .collect();
    let resolve = |name: &str| -> String {
      let suffix = name.rsplit('/').next().unwrap_or(name);
      suffix_map
        .get(suffix)
        .map(|full| (*full).clone())
        .unwrap_or_else(|| name.to_string())
    };

    let heads = config
      .heads
      .iter()
      .map(|head| {
        let resolved = ResolvedHead {
          stride: head.stride,
          reg_layer: resolve(&head.reg_layer),
          cls_layer: resolve(&head.cls_layer),
        };
        debug!(
          "检测头解析: stride={}, reg={}, cls={}",
          resolved.stride, resolved.reg_layer, resolved.cls_layer
        );
        resolved
      })
      .collect();

    Self {
      heads,
      num_bins: config.regression_length,
      score_threshold: config.score_threshold,
      iou_threshold: config.iou_threshold,
      max_detections: config.max_detections,
    }
  }

  /// 解码全部检测头并做跨尺度贪心抑制，输出网络输入坐标系的候选
  ///
  /// 单个头缺失或形状异常只使该头产出为空，不中断当前帧。
  pub fn decode(&self, outputs: &OutputMap) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for head in &self.heads {
      let reg = head_tensor(outputs, &head.reg_layer, 4 * self.num_bins, head.stride, "回归");
      let cls = head_tensor(outputs, &head.cls_layer, 1, head.stride, "分类");
      if let (Some(reg), Some(cls)) = (reg, cls) {
        let before = candidates.len();
        dfl::decode_head(
          reg,
          cls,
          head.stride,
          self.num_bins,
          self.score_threshold,
          &mut candidates,
        );
        debug!(
          "检测头 stride={} 产出 {} 个候选",
          head.stride,
          candidates.len() - before
        );
      }
    }
    nms::suppress(candidates, self.iou_threshold, self.max_detections)
  }

  /// 完整后处理：解码合并后还原到原始帧坐标
  ///
  /// 单类模型，合并结果统一标记 `class_id = 0`。
  pub fn detect(
    &self,
    outputs: &OutputMap,
    transform: &LetterboxTransform,
    frame_width: u32,
    frame_height: u32,
  ) -> Vec<Detection> {
    self
      .decode(outputs)
      .iter()
      .map(|candidate| remap_candidate(candidate, transform, frame_width, frame_height, 0))
      .collect()
  }
}

/// 取出指定层并归一化为 (H, W, C) 视图
///
/// 末维与期望通道数一致时原样返回；首维一致时视为 (C, H, W)
/// 转置为 (H, W, C)；两者都不符视为形状异常，该头产出为空。
fn head_tensor<'a>(
  outputs: &'a OutputMap,
  name: &str,
  expected_c: usize,
  stride: u32,
  kind: &str,
) -> Option<ArrayView3<'a, f32>> {
  let Some(tensor) = outputs.get(name) else {
    warn!("检测头 stride={} 缺少{}输出层 {}", stride, kind, name);
    return None;
  };
  let (a, _, c) = tensor.dim();
  if c == expected_c {
    Some(tensor.view())
  } else if a == expected_c {
    Some(tensor.view().permuted_axes([1, 2, 0]))
  } else {
    warn!(
      "检测头 stride={} 的{}输出层 {} 通道数异常: 期望 {}, 形状 {:?}",
      stride,
      kind,
      name,
      expected_c,
      tensor.dim()
    );
    None
  }
}

/// 将网络输入坐标系的候选还原到原始帧像素坐标
///
/// 逆变换可能颠倒角点顺序，输出前重新排序并裁剪到图像范围。
pub fn remap_candidate(
  candidate: &Candidate,
  transform: &LetterboxTransform,
  frame_width: u32,
  frame_height: u32,
  class_id: u32,
) -> Detection {
  let (ax, ay) = transform.invert(candidate.x1, candidate.y1);
  let (bx, by) = transform.invert(candidate.x2, candidate.y2);

  let clamp_x = |v: f32| (v.round() as i32).clamp(0, frame_width as i32 - 1);
  let clamp_y = |v: f32| (v.round() as i32).clamp(0, frame_height as i32 - 1);

  let (x1, x2) = (clamp_x(ax.min(bx)), clamp_x(ax.max(bx)));
  let (y1, y2) = (clamp_y(ay.min(by)), clamp_y(ay.max(by)));

  Detection {
    x1,
    y1,
    x2,
    y2,
    score: candidate.score,
    class_id,
  }
}
