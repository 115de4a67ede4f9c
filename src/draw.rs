// 该文件是 Liaowang（瞭望）项目的一部分。
// src/draw.rs - 检测结果标注
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

#[cfg(feature = "draw_label")]
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
#[cfg(feature = "draw_label")]
use imageproc::drawing::draw_text_mut;
#[cfg(feature = "draw_label")]
use tracing::warn;

use crate::config::label_name;
use crate::detector::Detection;

const BOX_COLOR: [u8; 3] = [255, 0, 0];
const CENTER_COLOR: [u8; 3] = [0, 255, 0];
const TEXT_COLOR: [u8; 3] = [255, 255, 255];
const BOX_THICKNESS: i32 = 2;
const CENTER_RADIUS: i32 = 4;
#[cfg(feature = "draw_label")]
const LABEL_FONT_SIZE: f32 = 20.0;

/// 检测框标注器
///
/// 字体文件在运行时加载；没有字体时只画几何图形，不画文字。
pub struct Annotator {
  #[cfg(feature = "draw_label")]
  font: Option<FontVec>,
}

impl Default for Annotator {
  fn default() -> Self {
    Self {
      #[cfg(feature = "draw_label")]
      font: None,
    }
  }
}

impl Annotator {
  /// 尝试加载标签字体，失败时降级为纯几何标注
  #[cfg(feature = "draw_label")]
  pub fn with_font(mut self, path: &std::path::Path) -> Self {
    match std::fs::read(path).map_err(anyhow::Error::from).and_then(|data| {
      FontVec::try_from_vec(data).map_err(anyhow::Error::from)
    }) {
      Ok(font) => {
        self.font = Some(font);
      }
      Err(e) => {
        warn!("字体 {} 加载失败，标注不含文字: {}", path.display(), e);
      }
    }
    self
  }

  /// 在原始帧上绘制检测框、中心点、标签与帧率
  pub fn annotate(&self, image: &mut RgbImage, detections: &[Detection], labels: &[String], fps: f32) {
    for detection in detections {
      draw_rect(image, detection.x1, detection.y1, detection.x2, detection.y2, BOX_COLOR);

      let cx = (detection.x1 + detection.x2) / 2;
      let cy = (detection.y1 + detection.y2) / 2;
      draw_dot(image, cx, cy, CENTER_RADIUS, CENTER_COLOR);

      let label = format!("{} {:.2}", label_name(labels, detection.class_id), detection.score);
      self.draw_text(image, &label, detection.x1, (detection.y1 - 24).max(0));
    }

    self.draw_text(image, &format!("FPS: {:.2}", fps), 10, 10);
  }

  #[cfg(feature = "draw_label")]
  fn draw_text(&self, image: &mut RgbImage, text: &str, x: i32, y: i32) {
    if let Some(font) = &self.font {
      draw_text_mut(
        image,
        Rgb(TEXT_COLOR),
        x,
        y,
        PxScale::from(LABEL_FONT_SIZE),
        font,
        text,
      );
    }
  }

  #[cfg(not(feature = "draw_label"))]
  fn draw_text(&self, _image: &mut RgbImage, _text: &str, _x: i32, _y: i32) {
    let _ = TEXT_COLOR;
  }
}

/// 逐像素描边矩形，坐标可越界，越界部分忽略
fn draw_rect(image: &mut RgbImage, x1: i32, y1: i32, x2: i32, y2: i32, color: [u8; 3]) {
  let (w, h) = (image.width() as i32, image.height() as i32);
  for t in 0..BOX_THICKNESS {
    let (xa, ya) = (x1 + t, y1 + t);
    let (xb, yb) = (x2 - t, y2 - t);
    if xa > xb || ya > yb {
      break;
    }
    for x in xa..=xb {
      put_pixel(image, x, ya, w, h, color);
      put_pixel(image, x, yb, w, h, color);
    }
    for y in ya..=yb {
      put_pixel(image, xa, y, w, h, color);
      put_pixel(image, xb, y, w, h, color);
    }
  }
}

fn draw_dot(image: &mut RgbImage, cx: i32, cy: i32, radius: i32, color: [u8; 3]) {
  let (w, h) = (image.width() as i32, image.height() as i32);
  for dy in -radius..=radius {
    for dx in -radius..=radius {
      if dx * dx + dy * dy <= radius * radius {
        put_pixel(image, cx + dx, cy + dy, w, h, color);
      }
    }
  }
}

fn put_pixel(image: &mut RgbImage, x: i32, y: i32, w: i32, h: i32, color: [u8; 3]) {
  if x >= 0 && x < w && y >= 0 && y < h {
    image.put_pixel(x as u32, y as u32, Rgb(color));
  }
}
