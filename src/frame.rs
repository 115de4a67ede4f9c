// 该文件是 Liaowang（瞭望）项目的一部分。
// src/frame.rs - 帧与张量定义
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use image::RgbImage;
use ndarray::Array3;

pub const RGB_CHANNELS: usize = 3;

/// 摄像头捕获的一帧图像
#[derive(Debug, Clone)]
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧序号
  pub index: u64,
  /// 自捕获开始的时间戳（毫秒）
  pub timestamp_ms: u64,
}

/// 模型输入张量，固定为 (N, N, 3) 的 RGB uint8 数据
///
/// 由预处理器创建后不再修改，推理完成后即丢弃。
#[derive(Debug, Clone)]
pub struct ImageTensor {
  data: Array3<u8>,
}

impl ImageTensor {
  /// 从 (N, N, 3) 数组创建张量
  ///
  /// 形状不是方形 RGB 时 panic，由调用方（预处理器）保证形状正确。
  pub fn new(data: Array3<u8>) -> Self {
    let (h, w, c) = data.dim();
    if h != w || c != RGB_CHANNELS {
      panic!("张量形状不合法: 期望 (N, N, 3), 实际 ({}, {}, {})", h, w, c);
    }
    Self { data }
  }

  /// 网络输入边长 N
  pub fn size(&self) -> usize {
    self.data.dim().0
  }

  pub fn as_array(&self) -> &Array3<u8> {
    &self.data
  }
}

/// 信箱（letterbox）变换参数
///
/// 记录原始帧如何被缩放并裁剪/填充到网络输入尺寸，
/// 每帧创建一次，仅用于该帧检测框的坐标还原。
/// `pad_left`/`pad_top` 为网络窗口在缩放图中的裁剪偏移，
/// 缩放结果不足 N 需要填充时为负值。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
  /// 统一缩放比例，恒大于 0
  pub scale: f32,
  pub pad_left: i32,
  pub pad_top: i32,
}

impl LetterboxTransform {
  /// 将网络输入坐标还原到原始帧坐标（未裁剪到图像范围）
  pub fn invert(&self, x_net: f32, y_net: f32) -> (f32, f32) {
    (
      (x_net + self.pad_left as f32) / self.scale,
      (y_net + self.pad_top as f32) / self.scale,
    )
  }
}
