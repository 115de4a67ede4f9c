// 该文件是 Liaowang（瞭望）项目的一部分。
// src/pipeline.rs - 主检测循环
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! 采集、预处理、推理、解码、告警、发布的单线程主循环。
//!
//! 单帧内任何一步失败都只丢弃该帧，循环继续；
//! 只有停机标志或输入源耗尽会结束循环。

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::alert::AlertDispatcher;
use crate::config::label_name;
use crate::detector::Detector;
use crate::draw::Annotator;
use crate::frame::Frame;
use crate::lifecycle::Shutdown;
use crate::model::Model;
use crate::notify::MqttChannel;
use crate::preprocess::letterbox;
use crate::publish::{DetectionSummary, FramePacket, FramePublisher, encode_jpeg};

/// 帧率指数平滑系数
const FPS_SMOOTHING: f32 = 0.9;

/// 主循环的固定协作方；模型与输入源在 `run` 时传入
pub struct Pipeline {
  pub detector: Detector,
  pub labels: Vec<String>,
  pub annotator: Annotator,
  pub dispatcher: AlertDispatcher,
  /// None 时不发送告警，仅检测与发布
  pub alert_channel: Option<MqttChannel>,
  pub publisher: FramePublisher,
  pub shutdown: Shutdown,
  pub net_size: u32,
}

impl Pipeline {
  /// 运行主循环直到停机或输入耗尽
  pub fn run<E, I, M>(&mut self, input: I, mut model: M)
  where
    E: std::error::Error,
    I: Iterator<Item = Result<Frame, E>>,
    M: Model,
  {
    info!("主循环启动");
    let mut fps = 0.0f32;
    let mut last_tick = Instant::now();

    for item in input {
      if self.shutdown.is_requested() {
        break;
      }

      let frame = match item {
        Ok(frame) => frame,
        Err(e) => {
          warn!("采集失败，跳过: {}", e);
          continue;
        }
      };
      let frame_index = frame.index;
      let (frame_width, frame_height) = frame.image.dimensions();

      let stage_start = Instant::now();
      let (tensor, transform) = match letterbox(&frame.image, self.net_size) {
        Ok(pair) => pair,
        Err(e) => {
          warn!("第 {} 帧预处理失败，跳过: {}", frame_index, e);
          continue;
        }
      };
      let preprocess_elapsed = stage_start.elapsed();

      let stage_start = Instant::now();
      let outputs = match model.infer(&tensor) {
        Ok(outputs) => outputs,
        Err(e) => {
          warn!("第 {} 帧推理失败，跳过: {}", frame_index, e);
          continue;
        }
      };
      let infer_elapsed = stage_start.elapsed();

      let stage_start = Instant::now();
      let detections = self
        .detector
        .detect(&outputs, &transform, frame_width, frame_height);
      let decode_elapsed = stage_start.elapsed();

      if let Some(ref channel) = self.alert_channel {
        let now = Instant::now();
        for detection in &detections {
          let label = label_name(&self.labels, detection.class_id);
          self.dispatcher.dispatch(&label, now, channel);
        }
      }

      let dt = last_tick.elapsed().as_secs_f32();
      last_tick = Instant::now();
      if dt > 0.0 {
        let instant_fps = 1.0 / dt;
        fps = if fps == 0.0 {
          instant_fps
        } else {
          fps * FPS_SMOOTHING + instant_fps * (1.0 - FPS_SMOOTHING)
        };
      }

      let mut annotated = frame.image;
      self
        .annotator
        .annotate(&mut annotated, &detections, &self.labels, fps);

      let jpeg = match encode_jpeg(&annotated) {
        Ok(jpeg) => jpeg,
        Err(e) => {
          warn!("第 {} 帧 JPEG 编码失败，跳过: {}", frame_index, e);
          continue;
        }
      };

      self.publisher.publish(FramePacket {
        jpeg,
        detections: detections
          .iter()
          .map(|d| DetectionSummary::from_detection(d, &self.labels))
          .collect(),
        timestamp_ms: chrono::Local::now().timestamp_millis(),
        frame_number: frame_index,
        fps,
      });

      debug!(
        "第 {} 帧: 检测 {} 个, 预处理 {:.2?} / 推理 {:.2?} / 解码 {:.2?}",
        frame_index,
        detections.len(),
        preprocess_elapsed,
        infer_elapsed,
        decode_elapsed,
      );
    }

    info!("主循环结束");
  }
}
