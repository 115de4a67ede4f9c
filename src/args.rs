// 该文件是 Liaowang（瞭望）项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::Parser;

/// Liaowang 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型文件路径
  #[arg(long, value_name = "FILE")]
  pub model: PathBuf,

  /// 后处理配置文件路径（JSON，含检测头与 NMS 阈值）
  #[arg(long, value_name = "FILE")]
  pub config: PathBuf,

  /// 标签文件路径（JSON，{"labels": [...]}）
  #[arg(long, value_name = "FILE")]
  pub labels: PathBuf,

  /// V4L2 摄像头设备路径
  #[arg(long, default_value = "/dev/video0", value_name = "DEVICE")]
  pub camera: String,

  /// 摄像头采集宽度
  #[arg(long, default_value = "1280", value_name = "PIXELS")]
  pub width: u32,

  /// 摄像头采集高度
  #[arg(long, default_value = "720", value_name = "PIXELS")]
  pub height: u32,

  /// 网络输入边长（正方形）
  #[arg(long, default_value = "640", value_name = "PIXELS")]
  pub net_size: u32,

  /// 置信度阈值 (0.0 - 1.0)，覆盖配置文件
  #[arg(long, value_name = "THRESHOLD")]
  pub score_thr: Option<f32>,

  /// NMS IOU 阈值 (0.0 - 1.0)，覆盖配置文件
  #[arg(long, value_name = "THRESHOLD")]
  pub iou_thr: Option<f32>,

  /// NMS 后最大检测数，覆盖配置文件
  #[arg(long, value_name = "COUNT")]
  pub max_det: Option<usize>,

  /// HTTP 预览服务端口
  #[arg(long, default_value = "5055", value_name = "PORT")]
  pub http_port: u16,

  /// MQTT 服务器地址
  #[arg(long, default_value = "localhost", value_name = "HOST")]
  pub mqtt_host: String,

  /// MQTT 服务器端口
  #[arg(long, default_value = "1883", value_name = "PORT")]
  pub mqtt_port: u16,

  /// 同类告警的冷却时长（秒）
  #[arg(long, default_value = "20", value_name = "SECONDS")]
  pub cooldown: u64,

  /// 标注字体文件路径（缺省时标注不含文字）
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,
}
