// 该文件是 Liaowang（瞭望）项目的一部分。
// src/model.rs - 推理模型接口
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::collections::HashMap;

use ndarray::Array3;

use crate::frame::ImageTensor;

/// 推理结果：输出层名到张量的映射
///
/// 张量已去掉 batch 维，保留三维 (H, W, C) 或后端原始的 (C, H, W)，
/// 布局由解码器按期望通道数识别。
pub type OutputMap = HashMap<String, Array3<f32>>;

/// 推理后端接口
///
/// 对相同权重与输入，输出必须确定；设备错误通过 `Error` 上报，
/// 由主循环跳过当前帧，不会中止流水线。
pub trait Model {
  type Error: std::error::Error + Send + Sync + 'static;

  /// 模型全部输出层名，启动时用于检测头配置的层名解析
  fn output_names(&self) -> Vec<String>;

  fn infer(&mut self, input: &ImageTensor) -> Result<OutputMap, Self::Error>;
}

#[cfg(feature = "model_onnx")]
mod onnx;
#[cfg(feature = "model_onnx")]
pub use self::onnx::{OnnxModel, OnnxModelError};
