// 该文件是 Liaowang（瞭望）项目的一部分。
// src/preprocess.rs - 信箱预处理
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

use image::{RgbImage, imageops};
use ndarray::Array3;
use thiserror::Error;

use crate::frame::{ImageTensor, LetterboxTransform, RGB_CHANNELS};

#[derive(Error, Debug)]
pub enum PreprocessError {
  #[error("无效帧: {width}x{height}")]
  InvalidFrame { width: u32, height: u32 },
}

/// 将任意尺寸的 RGB 帧转换为 N x N 网络输入张量
///
/// 短边对齐到 N 等比缩放，再居中裁剪到 N x N；
/// 因取整导致缩放结果不足 N 时居中零填充。
/// 同时返回该帧的信箱变换参数，供检测框坐标还原使用。
pub fn letterbox(image: &RgbImage, net_size: u32) -> Result<(ImageTensor, LetterboxTransform), PreprocessError> {
  let (w0, h0) = image.dimensions();
  if w0 == 0 || h0 == 0 {
    return Err(PreprocessError::InvalidFrame { width: w0, height: h0 });
  }

  // 短边对齐到网络输入边长
  let scale = net_size as f32 / w0.min(h0) as f32;
  let (new_w, new_h) = if h0 < w0 {
    ((w0 as f32 * scale).round() as u32, net_size)
  } else {
    (net_size, (h0 as f32 * scale).round() as u32)
  };

  let resized = imageops::resize(image, new_w, new_h, imageops::FilterType::Triangle);

  // 网络窗口在缩放图中的偏移；不足 N 时为负，即需要填充
  let left = (new_w as i32 - net_size as i32) / 2;
  let top = (new_h as i32 - net_size as i32) / 2;

  let n = net_size as usize;
  let mut canvas = Array3::<u8>::zeros((n, n, RGB_CHANNELS));
  for y in 0..n {
    let sy = y as i32 + top;
    if sy < 0 || sy >= new_h as i32 {
      continue;
    }
    for x in 0..n {
      let sx = x as i32 + left;
      if sx < 0 || sx >= new_w as i32 {
        continue;
      }
      let pixel = resized.get_pixel(sx as u32, sy as u32);
      for c in 0..RGB_CHANNELS {
        canvas[[y, x, c]] = pixel.0[c];
      }
    }
  }

  Ok((
    ImageTensor::new(canvas),
    LetterboxTransform { scale, pad_left: left, pad_top: top },
  ))
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn solid_image(w: u32, h: u32, color: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(w, h, Rgb(color))
  }

  #[test]
  fn output_is_always_square() {
    for (w, h) in [(1280, 720), (720, 1280), (640, 640), (333, 917), (31, 47)] {
      let (tensor, transform) = letterbox(&solid_image(w, h, [10, 20, 30]), 640).unwrap();
      assert_eq!(tensor.size(), 640);
      assert_eq!(tensor.as_array().dim(), (640, 640, 3));
      assert!(transform.scale > 0.0);
    }
  }

  #[test]
  fn degenerate_frame_is_rejected() {
    let empty = RgbImage::new(0, 0);
    assert!(matches!(
      letterbox(&empty, 640),
      Err(PreprocessError::InvalidFrame { .. })
    ));
  }

  #[test]
  fn square_input_has_no_offset() {
    let (_, transform) = letterbox(&solid_image(640, 640, [1, 2, 3]), 640).unwrap();
    assert_eq!(transform.pad_left, 0);
    assert_eq!(transform.pad_top, 0);
    assert!((transform.scale - 1.0).abs() < 1e-6);
  }

  #[test]
  fn deterministic_for_identical_input() {
    let image = solid_image(800, 600, [7, 7, 7]);
    let (a, ta) = letterbox(&image, 640).unwrap();
    let (b, tb) = letterbox(&image, 640).unwrap();
    assert_eq!(a.as_array(), b.as_array());
    assert_eq!(ta, tb);
  }

  /// 裁剪区域内的框经正变换再逆变换后应在 ±1 像素内还原
  #[test]
  fn box_round_trip_within_one_pixel() {
    for (w0, h0) in [(1280u32, 720u32), (720, 1280), (1920, 1080)] {
      let (_, transform) = letterbox(&solid_image(w0, h0, [0, 0, 0]), 640).unwrap();
      for (x, y) in [(400.0f32, 300.0f32), (600.0, 500.0), (640.0, 360.0)] {
        // 原始坐标 -> 网络坐标
        let x_net = x * transform.scale - transform.pad_left as f32;
        let y_net = y * transform.scale - transform.pad_top as f32;
        if x_net < 0.0 || y_net < 0.0 || x_net >= 640.0 || y_net >= 640.0 {
          continue; // 该点落在裁剪区域之外
        }
        let (x_back, y_back) = transform.invert(x_net, y_net);
        assert!((x_back - x).abs() <= 1.0, "x: {} -> {}", x, x_back);
        assert!((y_back - y).abs() <= 1.0, "y: {} -> {}", y, y_back);
      }
    }
  }
}
