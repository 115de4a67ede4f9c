// 该文件是 Liaowang（瞭望）项目的一部分。
// src/server.rs - HTTP 预览服务
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

//! MJPEG 预览服务。
//!
//! 服务跑在独立线程上，主循环的热路径不接触 Actix 运行时；
//! 处理函数只读 [`SharedFrame`] 里的最新帧，读不到就返回空响应。

use std::time::Duration;

use actix_web::{
  App, HttpResponse, HttpServer,
  http::header,
  web::{self, Bytes},
};
use anyhow::{Context, Result};
use async_stream::stream;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::lifecycle::Shutdown;
use crate::publish::{DetectionSummary, SharedFrame, latest_frame};

/// 流式推送的帧间隔
const STREAM_INTERVAL: Duration = Duration::from_millis(50);

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>瞭望</title></head>
<body style="margin:0;background:#111;text-align:center">
<img src="/video" style="max-width:100%;height:auto" alt="live">
</body>
</html>
"#;

/// HTTP 处理函数共享的状态
struct ServerState {
  latest: SharedFrame,
  shutdown: Shutdown,
}

/// 预览服务线程的句柄
pub struct PreviewServer {
  stop_tx: Option<oneshot::Sender<()>>,
  handle: Option<std::thread::JoinHandle<()>>,
}

impl PreviewServer {
  /// 通知服务退出并等待线程结束
  pub fn stop(mut self) {
    if let Some(tx) = self.stop_tx.take() {
      let _ = tx.send(());
    }
    if let Some(handle) = self.handle.take() {
      let _ = handle.join();
    }
  }
}

/// `/detections` 的响应体
#[derive(Serialize)]
struct DetectionsResponse<'a> {
  timestamp_ms: i64,
  frame_number: u64,
  fps: f32,
  detections: &'a [DetectionSummary],
}

/// 启动预览服务线程
pub fn spawn_preview_server(
  shared: SharedFrame,
  port: u16,
  shutdown: Shutdown,
) -> Result<PreviewServer> {
  let (stop_tx, stop_rx) = oneshot::channel::<()>();
  let handle = std::thread::Builder::new()
    .name("liaowang-http".into())
    .spawn(move || {
      if let Err(e) = actix_web::rt::System::new().block_on(async move {
        let server = HttpServer::new(move || {
          App::new()
            .app_data(web::Data::new(ServerState {
              latest: shared.clone(),
              shutdown: shutdown.clone(),
            }))
            .route("/", web::get().to(index_route))
            .route("/frame.jpg", web::get().to(frame_handler))
            .route("/video", web::get().to(video_handler))
            .route("/detections", web::get().to(detections_handler))
        })
        .bind(("0.0.0.0", port))?
        .run();

        info!("预览服务已监听 0.0.0.0:{}", port);
        let srv_handle = server.handle();
        actix_web::rt::spawn(async move {
          let _ = stop_rx.await;
          srv_handle.stop(true).await;
        });

        server.await
      }) {
        error!("预览服务异常退出: {}", e);
      }
    })
    .context("无法启动预览服务线程")?;
  Ok(PreviewServer {
    stop_tx: Some(stop_tx),
    handle: Some(handle),
  })
}

async fn index_route() -> HttpResponse {
  HttpResponse::Ok()
    .content_type("text/html; charset=utf-8")
    .body(INDEX_HTML)
}

/// 返回最新的单张 JPEG；尚无帧时返回 204
async fn frame_handler(state: web::Data<ServerState>) -> HttpResponse {
  match latest_frame(&state.latest) {
    Some(packet) => HttpResponse::Ok()
      .content_type("image/jpeg")
      .body(packet.jpeg),
    None => HttpResponse::NoContent().finish(),
  }
}

/// multipart/x-mixed-replace 形式的 MJPEG 推流
async fn video_handler(state: web::Data<ServerState>) -> HttpResponse {
  let state = state.clone();
  let stream = stream! {
    let mut interval = actix_web::rt::time::interval(STREAM_INTERVAL);
    loop {
      interval.tick().await;
      if state.shutdown.is_requested() {
        break;
      }
      if let Some(packet) = latest_frame(&state.latest) {
        let mut payload = Vec::with_capacity(packet.jpeg.len() + 64);
        payload.extend_from_slice(b"--frame\r\n");
        payload.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
        payload.extend_from_slice(&packet.jpeg);
        payload.extend_from_slice(b"\r\n");
        yield Ok::<Bytes, actix_web::Error>(Bytes::from(payload));
      }
    }
  };

  HttpResponse::Ok()
    .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
    .append_header(("Cache-Control", "no-cache"))
    .append_header(("Content-Type", "multipart/x-mixed-replace; boundary=frame"))
    .streaming(stream)
}

/// 最新一帧的检测结果快照
async fn detections_handler(state: web::Data<ServerState>) -> HttpResponse {
  match latest_frame(&state.latest) {
    Some(packet) => HttpResponse::Ok().json(DetectionsResponse {
      timestamp_ms: packet.timestamp_ms,
      frame_number: packet.frame_number,
      fps: packet.fps,
      detections: &packet.detections,
    }),
    None => HttpResponse::NoContent().finish(),
  }
}
