// 该文件是 Liaowang（瞭望）项目的一部分。
// src/capture.rs - V4L2 摄像头采集
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::pin::Pin;
use std::time::Instant;

use image::RgbImage;
use thiserror::Error;
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use crate::frame::Frame;

/// 采集缓冲区数量
const BUFFER_COUNT: u32 = 4;

#[derive(Debug, Error)]
pub enum CaptureError {
  #[error("无法打开设备 {path}: {source}")]
  Open {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("无法设置视频格式: {0}")]
  Format(#[source] std::io::Error),
  #[error("无法创建捕获流: {0}")]
  Stream(#[source] std::io::Error),
  #[error("无法捕获帧: {0}")]
  Read(#[source] std::io::Error),
  #[error("帧数据与 {width}x{height} 分辨率不符")]
  BadFrame { width: u32, height: u32 },
}

/// V4L2 摄像头采集源
///
/// v4l 库的 Stream 需要引用 Device。Device 用 Pin<Box> 固定在堆上保证
/// 地址稳定，Stream 存在同一个结构体里并在 Drop 时先行释放。
pub struct Camera {
  /// V4L2 设备（Pin<Box> 固定内存位置）
  device: Pin<Box<Device>>,
  /// 捕获流（生命周期与 device 关联）
  stream: Option<Stream<'static>>,
  frame_index: u64,
  width: u32,
  height: u32,
  start_time: Instant,
}

impl Camera {
  /// 打开摄像头并协商 YUYV 采集格式
  ///
  /// 实际分辨率以驱动返回为准，可能与请求值不同。
  pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CaptureError> {
    let device = Box::pin(Device::with_path(device_path).map_err(|e| CaptureError::Open {
      path: device_path.to_string(),
      source: e,
    })?);

    let mut format = device.format().map_err(CaptureError::Format)?;
    format.width = width;
    format.height = height;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device.set_format(&format).map_err(CaptureError::Format)?;

    let width = format.width;
    let height = format.height;

    let mut camera = Self {
      device,
      stream: None,
      frame_index: 0,
      width,
      height,
      start_time: Instant::now(),
    };

    // SAFETY: device 被 Pin<Box> 固定，不会移动，所以引用始终有效。
    // stream 存储在同一个结构体中，Drop 里先 take 掉 stream 再释放 device。
    let device_ref: &Device = &camera.device;
    let stream = unsafe {
      let device_static: &'static Device = std::mem::transmute(device_ref);
      Stream::with_buffers(device_static, Type::VideoCapture, BUFFER_COUNT)
        .map_err(CaptureError::Stream)?
    };

    camera.stream = Some(stream);
    Ok(camera)
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  /// 将 YUYV 像素对转换为 RGB
  fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);

    for chunk in yuyv.chunks(4) {
      if chunk.len() < 4 {
        break;
      }

      let y0 = chunk[0] as f32;
      let u = chunk[1] as f32 - 128.0;
      let y1 = chunk[2] as f32;
      let v = chunk[3] as f32 - 128.0;

      let r = (y0 + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y0 - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y0 + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);

      let r = (y1 + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y1 - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y1 + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);
    }

    rgb
  }
}

impl Drop for Camera {
  fn drop(&mut self) {
    // stream 必须在 device 之前释放
    self.stream.take();
  }
}

impl Iterator for Camera {
  type Item = Result<Frame, CaptureError>;

  fn next(&mut self) -> Option<Self::Item> {
    let stream = self.stream.as_mut()?;

    match stream.next() {
      Ok((buffer, _meta)) => {
        let rgb_data = Self::yuyv_to_rgb(buffer, self.width, self.height);

        let image = match RgbImage::from_raw(self.width, self.height, rgb_data) {
          Some(img) => img,
          None => {
            return Some(Err(CaptureError::BadFrame {
              width: self.width,
              height: self.height,
            }));
          }
        };

        let frame = Frame {
          image,
          index: self.frame_index,
          timestamp_ms: self.start_time.elapsed().as_millis() as u64,
        };

        self.frame_index += 1;
        Some(Ok(frame))
      }
      Err(e) => Some(Err(CaptureError::Read(e))),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  /// 2x2 纯灰 YUYV（Y=128, U=V=128）应转换为 RGB(128,128,128)
  #[test]
  fn yuyv_gray_converts_to_gray_rgb() {
    let yuyv = [128u8; 8];
    let rgb = Camera::yuyv_to_rgb(&yuyv, 2, 2);
    assert_eq!(rgb.len(), 12);
    assert!(rgb.iter().all(|&v| v == 128));
  }

  /// 尾部不足一对像素的数据被截断而非越界
  #[test]
  fn truncated_yuyv_is_dropped() {
    let yuyv = [128u8; 6];
    let rgb = Camera::yuyv_to_rgb(&yuyv, 2, 2);
    assert_eq!(rgb.len(), 6);
  }
}
