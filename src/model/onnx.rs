// 该文件是 Liaowang（瞭望）项目的一部分。
// src/model/onnx.rs - ONNX Runtime 推理后端
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::collections::HashMap;
use std::path::Path;

use ndarray::Array3;
use ort::inputs;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::frame::ImageTensor;
use crate::model::{Model, OutputMap};

#[derive(Error, Debug)]
pub enum OnnxModelError {
  #[error("模型加载错误: {0}")]
  ModelLoad(ort::Error),
  #[error("模型无输出层")]
  NoOutputs,
  #[error("推理设备错误: {0}")]
  Device(ort::Error),
}

/// ONNX Runtime 推理后端
///
/// 输入为 (1, 3, N, N) 的 f32 NCHW 张量，像素归一化到 [0, 1]；
/// 输出按层名返回去掉 batch 维后的三维张量。
pub struct OnnxModel {
  session: Session,
  input_name: String,
  output_names: Vec<String>,
}

impl OnnxModel {
  pub fn new(model_path: &Path) -> Result<Self, OnnxModelError> {
    info!("加载模型文件: {}", model_path.display());
    let session = Session::builder()
      .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
      .and_then(|builder| builder.with_intra_threads(4))
      .and_then(|builder| builder.commit_from_file(model_path))
      .map_err(OnnxModelError::ModelLoad)?;

    let input_name = session
      .inputs
      .first()
      .map(|input| input.name.clone())
      .unwrap_or_else(|| "images".to_string());
    let output_names: Vec<String> = session
      .outputs
      .iter()
      .map(|output| output.name.clone())
      .collect();
    if output_names.is_empty() {
      return Err(OnnxModelError::NoOutputs);
    }

    info!("模型加载完成，输入层: {}", input_name);
    for name in &output_names {
      debug!("输出层: {}", name);
    }

    Ok(Self {
      session,
      input_name,
      output_names,
    })
  }

  /// (N, N, 3) uint8 -> (1, 3, N, N) f32，像素值归一化到 [0, 1]
  fn to_nchw(input: &ImageTensor) -> (usize, Vec<f32>) {
    let n = input.size();
    let array = input.as_array();
    let plane = n * n;
    let mut data = vec![0f32; 3 * plane];
    for y in 0..n {
      for x in 0..n {
        for c in 0..3 {
          data[c * plane + y * n + x] = array[[y, x, c]] as f32 / 255.0;
        }
      }
    }
    (n, data)
  }
}

impl Model for OnnxModel {
  type Error = OnnxModelError;

  fn output_names(&self) -> Vec<String> {
    self.output_names.clone()
  }

  fn infer(&mut self, input: &ImageTensor) -> Result<OutputMap, Self::Error> {
    let (n, data) = Self::to_nchw(input);
    let input_tensor =
      Tensor::from_array(([1usize, 3, n, n], data)).map_err(OnnxModelError::Device)?;

    let outputs = self
      .session
      .run(inputs![self.input_name.as_str() => input_tensor])
      .map_err(OnnxModelError::Device)?;

    let mut map: OutputMap = HashMap::with_capacity(self.output_names.len());
    for name in &self.output_names {
      let (shape, values) = match outputs[name.as_str()].try_extract_tensor::<f32>() {
        Ok(extracted) => extracted,
        Err(e) => {
          warn!("输出层 {} 不是 f32 张量，跳过: {}", name, e);
          continue;
        }
      };

      // 去掉前导 batch 维，保留三维
      let mut dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
      while dims.len() > 3 && dims[0] == 1 {
        dims.remove(0);
      }
      let array = match dims.len() {
        3 => Array3::from_shape_vec((dims[0], dims[1], dims[2]), values.to_vec()),
        2 => Array3::from_shape_vec((dims[0], dims[1], 1), values.to_vec()),
        _ => {
          warn!("输出层 {} 形状异常 {:?}，跳过", name, dims);
          continue;
        }
      };
      match array {
        Ok(array) => {
          map.insert(name.clone(), array);
        }
        Err(e) => {
          warn!("输出层 {} 数据长度与形状不符，跳过: {}", name, e);
        }
      }
    }

    Ok(map)
  }
}
