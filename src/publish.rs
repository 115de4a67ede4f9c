// 该文件是 Liaowang（瞭望）项目的一部分。
// src/publish.rs - 最新帧发布
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

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use image::{ImageFormat, RgbImage};
use serde::Serialize;

use crate::config::label_name;
use crate::detector::Detection;

/// 随帧发布的检测摘要，供预览服务的 JSON 接口使用
#[derive(Clone, Serialize)]
pub struct DetectionSummary {
  pub label: String,
  pub score: f32,
  pub bbox: [i32; 4],
}

impl DetectionSummary {
  pub fn from_detection(detection: &Detection, labels: &[String]) -> Self {
    Self {
      label: label_name(labels, detection.class_id),
      score: detection.score,
      bbox: [detection.x1, detection.y1, detection.x2, detection.y2],
    }
  }
}

/// 一帧标注后的发布数据
#[derive(Clone)]
pub struct FramePacket {
  /// JPEG 编码后的标注帧
  pub jpeg: Vec<u8>,
  pub detections: Vec<DetectionSummary>,
  pub timestamp_ms: i64,
  pub frame_number: u64,
  pub fps: f32,
}

/// 仅保留最新一帧：写方整体替换，读方克隆快照，互不阻塞等待历史
pub type SharedFrame = Arc<Mutex<Option<FramePacket>>>;

/// 帧发布器，主循环持有的唯一写入端
#[derive(Default)]
pub struct FramePublisher {
  shared: SharedFrame,
}

impl FramePublisher {
  pub fn new() -> Self {
    Self::default()
  }

  /// 供读方（预览服务）持有的句柄
  pub fn handle(&self) -> SharedFrame {
    self.shared.clone()
  }

  /// 覆盖发布最新帧，不保留历史
  pub fn publish(&self, packet: FramePacket) {
    if let Ok(mut guard) = self.shared.lock() {
      *guard = Some(packet);
    }
  }
}

/// 读取最新帧快照，尚无帧时为 None
pub fn latest_frame(shared: &SharedFrame) -> Option<FramePacket> {
  shared.lock().ok().and_then(|guard| guard.clone())
}

/// 将标注帧编码为 JPEG
pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
  let mut buffer = Vec::new();
  image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Jpeg)?;
  Ok(buffer)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn packet(frame_number: u64) -> FramePacket {
    FramePacket {
      jpeg: vec![0xff, 0xd8],
      detections: Vec::new(),
      timestamp_ms: 0,
      frame_number,
      fps: 30.0,
    }
  }

  #[test]
  fn no_frame_yet_reads_none() {
    let publisher = FramePublisher::new();
    assert!(latest_frame(&publisher.handle()).is_none());
  }

  #[test]
  fn reader_sees_only_latest_frame() {
    let publisher = FramePublisher::new();
    let handle = publisher.handle();
    publisher.publish(packet(1));
    publisher.publish(packet(2));
    let latest = latest_frame(&handle).unwrap();
    assert_eq!(latest.frame_number, 2);
    // 读取是快照，随后的写入不影响已取出的帧
    publisher.publish(packet(3));
    assert_eq!(latest.frame_number, 2);
    assert_eq!(latest_frame(&handle).unwrap().frame_number, 3);
  }

  #[test]
  fn jpeg_encoding_produces_marker() {
    let image = RgbImage::new(16, 16);
    let jpeg = encode_jpeg(&image).unwrap();
    assert_eq!(&jpeg[0..2], &[0xff, 0xd8]);
  }
}
