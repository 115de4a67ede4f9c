// 该文件是 Liaowang（瞭望）项目的一部分。
// src/telemetry.rs - 主机遥测发布
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::thread;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::lifecycle::Shutdown;
use crate::notify::MqttChannel;

const PUBLISH_INTERVAL: Duration = Duration::from_secs(30);
const THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 启动 CPU 温度遥测线程
///
/// 遥测持有独立的 MQTT 连接，断线重连由通道自理，
/// 任何情况下都不会反压主流水线。
pub fn spawn_telemetry(host: String, port: u16, shutdown: Shutdown) -> Option<thread::JoinHandle<()>> {
  thread::Builder::new()
    .name("telemetry".to_string())
    .spawn(move || {
      let node = hostname();
      let client_id = format!("liaowang_temp_{}", node);
      let topic = format!("system/temperature/{}", node);
      let channel = MqttChannel::connect(&client_id, &host, port, shutdown.clone());
      info!("遥测循环启动，主题: {}", topic);

      while !shutdown.is_requested() {
        let payload = json!({
          "sensor_id": format!("cpu_temp_{}", node),
          "value": read_cpu_temperature(),
          "timestamp": chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
        });
        match channel.publish_json(&topic, &payload) {
          Ok(()) => debug!("温度遥测已发送: {}", payload),
          Err(e) => warn!("温度遥测发送失败: {}", e),
        }
        if !shutdown.sleep_while(PUBLISH_INTERVAL) {
          break;
        }
      }

      channel.shutdown();
      info!("遥测循环退出");
    })
    .map_err(|e| warn!("遥测线程启动失败: {}", e))
    .ok()
}

/// 读取 CPU 温度（摄氏度），传感器缺失时返回 0.0
fn read_cpu_temperature() -> f32 {
  match std::fs::read_to_string(THERMAL_ZONE) {
    Ok(text) => parse_millidegrees(&text).unwrap_or(0.0),
    Err(_) => {
      warn!("找不到 CPU 温度传感器，使用默认值 0");
      0.0
    }
  }
}

fn parse_millidegrees(text: &str) -> Option<f32> {
  text.trim().parse::<f32>().ok().map(|v| v / 1000.0)
}

fn hostname() -> String {
  std::fs::read_to_string("/proc/sys/kernel/hostname")
    .map(|s| s.trim().to_string())
    .unwrap_or_else(|_| "liaowang".to_string())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn millidegrees_parse() {
    assert_eq!(parse_millidegrees("48500\n"), Some(48.5));
    assert_eq!(parse_millidegrees("0"), Some(0.0));
    assert_eq!(parse_millidegrees("not a number"), None);
  }

  #[test]
  fn hostname_is_never_empty() {
    assert!(!hostname().is_empty());
  }
}
