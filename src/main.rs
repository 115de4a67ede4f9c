// 该文件是 Liaowang（瞭望）项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use liaowang::alert::{AlertDispatcher, default_rules};
use liaowang::args::Args;
use liaowang::capture::Camera;
use liaowang::config::{DecodeConfig, load_labels};
use liaowang::detector::Detector;
use liaowang::draw::Annotator;
use liaowang::lifecycle::Shutdown;
use liaowang::model::{Model, OnnxModel};
use liaowang::notify::MqttChannel;
use liaowang::pipeline::Pipeline;
use liaowang::publish::FramePublisher;
use liaowang::server::spawn_preview_server;
use liaowang::telemetry::spawn_telemetry;

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();
  let args = Args::parse();

  info!("瞭望 火焰烟雾检测");
  info!("模型文件: {}", args.model.display());
  info!("摄像头: {} ({}x{})", args.camera, args.width, args.height);
  info!("MQTT 服务器: {}:{}", args.mqtt_host, args.mqtt_port);

  let shutdown = Shutdown::new();
  shutdown.install_signal_handler()?;

  // 配置、标签、模型、摄像头任一失败都是启动致命错误
  let config = DecodeConfig::load(&args.config)
    .with_context(|| format!("无法加载后处理配置: {}", args.config.display()))?
    .with_overrides(args.score_thr, args.iou_thr, args.max_det);
  let labels = load_labels(&args.labels)
    .with_context(|| format!("无法加载标签文件: {}", args.labels.display()))?;
  info!(
    "后处理配置: {} 个检测头, 置信度 {}, IOU {}",
    config.heads.len(),
    config.score_threshold,
    config.iou_threshold,
  );

  let model = OnnxModel::new(&args.model).context("模型加载失败")?;
  let detector = Detector::new(&config, &model.output_names());
  info!("模型加载完成");

  let camera = Camera::open(&args.camera, args.width, args.height)
    .with_context(|| format!("无法打开摄像头: {}", args.camera))?;
  info!("摄像头已打开: {}x{}", camera.width(), camera.height());

  let publisher = FramePublisher::new();
  let server = spawn_preview_server(publisher.handle(), args.http_port, shutdown.clone())?;
  let telemetry = spawn_telemetry(args.mqtt_host.clone(), args.mqtt_port, shutdown.clone());

  let alert_channel = MqttChannel::connect(
    "liaowang_alert",
    &args.mqtt_host,
    args.mqtt_port,
    shutdown.clone(),
  );

  let mut annotator = Annotator::default();
  #[cfg(feature = "draw_label")]
  if let Some(ref font) = args.font {
    annotator = annotator.with_font(font);
  }

  let mut pipeline = Pipeline {
    detector,
    labels,
    annotator,
    dispatcher: AlertDispatcher::new(default_rules(), Duration::from_secs(args.cooldown)),
    alert_channel: Some(alert_channel),
    publisher,
    shutdown: shutdown.clone(),
    net_size: args.net_size,
  };
  pipeline.run(camera, model);

  // 主循环退出后统一收尾
  shutdown.request("主循环退出");
  if let Some(channel) = pipeline.alert_channel.take() {
    channel.shutdown();
  }
  server.stop();
  if let Some(handle) = telemetry {
    let _ = handle.join();
  }

  info!("退出完成");
  Ok(())
}
