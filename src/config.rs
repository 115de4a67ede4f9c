// 该文件是 Liaowang（瞭望）项目的一部分。
// src/config.rs - 解码与标签配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("无法读取配置文件 {path}: {source}")]
  Io {
    path: String,
    source: std::io::Error,
  },
  #[error("配置文件 {path} 解析失败: {source}")]
  Parse {
    path: String,
    source: serde_json::Error,
  },
  #[error("配置中没有任何检测头（bbox_decoders 为空）")]
  NoHeads,
}

/// 单个检测头的配置：步长与该头的回归/分类输出层名
#[derive(Debug, Clone, Deserialize)]
pub struct HeadConfig {
  pub stride: u32,
  pub reg_layer: String,
  pub cls_layer: String,
}

/// 后处理配置，沿用模型编译工具导出的 NMS 配置文件字段名
#[derive(Debug, Clone, Deserialize)]
pub struct DecodeConfig {
  /// DFL 每边的分布 bin 数
  #[serde(default = "default_regression_length")]
  pub regression_length: usize,
  /// 置信度阈值（等于阈值的候选保留）
  #[serde(rename = "nms_scores_th", default = "default_score_threshold")]
  pub score_threshold: f32,
  /// NMS IoU 阈值
  #[serde(rename = "nms_iou_th", default = "default_iou_threshold")]
  pub iou_threshold: f32,
  /// NMS 后保留的最大检测数
  #[serde(rename = "max_proposals_per_class", default = "default_max_detections")]
  pub max_detections: usize,
  /// 各尺度检测头
  #[serde(rename = "bbox_decoders")]
  pub heads: Vec<HeadConfig>,
}

fn default_regression_length() -> usize {
  16
}

fn default_score_threshold() -> f32 {
  0.5
}

fn default_iou_threshold() -> f32 {
  0.5
}

fn default_max_detections() -> usize {
  100
}

impl DecodeConfig {
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.display().to_string(),
      source,
    })?;
    let config: DecodeConfig = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
      path: path.display().to_string(),
      source,
    })?;
    if config.heads.is_empty() {
      return Err(ConfigError::NoHeads);
    }
    Ok(config)
  }

  /// 命令行参数覆盖配置文件中的阈值
  pub fn with_overrides(
    mut self,
    score_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    max_detections: Option<usize>,
  ) -> Self {
    if let Some(v) = score_threshold {
      self.score_threshold = v;
    }
    if let Some(v) = iou_threshold {
      self.iou_threshold = v;
    }
    if let Some(v) = max_detections {
      self.max_detections = v;
    }
    self
  }
}

#[derive(Debug, Deserialize)]
struct LabelsFile {
  labels: Vec<String>,
}

/// 读取标签文件，格式为 {"labels": ["fire", "smoke", ...]}
pub fn load_labels(path: &Path) -> Result<Vec<String>, ConfigError> {
  let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
    path: path.display().to_string(),
    source,
  })?;
  let file: LabelsFile = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
    path: path.display().to_string(),
    source,
  })?;
  Ok(file.labels)
}

/// 按 class_id 查标签，越界时退化为 "id:N"
pub fn label_name(labels: &[String], class_id: u32) -> String {
  labels
    .get(class_id as usize)
    .cloned()
    .unwrap_or_else(|| format!("id:{}", class_id))
}
