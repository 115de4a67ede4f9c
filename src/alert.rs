// 该文件是 Liaowang（瞭望）项目的一部分。
// src/alert.rs - 告警分发与冷却
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, info, warn};

use crate::notify::MqttChannel;

/// 默认告警冷却时长
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(20);

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 一类告警的路由规则：类别名到 MQTT 主题与负载字段
#[derive(Debug, Clone)]
pub struct AlertRule {
  pub class: String,
  pub topic: String,
  pub sensor_id: String,
  pub event: String,
}

/// 内置的火焰与烟雾告警路由
pub fn default_rules() -> Vec<AlertRule> {
  vec![
    AlertRule {
      class: "fire".to_string(),
      topic: "AI_fire_alert".to_string(),
      sensor_id: "AI_D_fire".to_string(),
      event: "fire_detected".to_string(),
    },
    AlertRule {
      class: "smoke".to_string(),
      topic: "AI_smoke_alert".to_string(),
      sensor_id: "AI_D_smoke".to_string(),
      event: "smoke_detected".to_string(),
    },
  ]
}

/// 告警分发器
///
/// 每个告警类别独立冷却：距上次发送不足冷却时长的检测直接丢弃，
/// 不排队不重试。冷却状态只由主循环内的本结构修改。
pub struct AlertDispatcher {
  rules: HashMap<String, AlertRule>,
  last_fired: HashMap<String, Instant>,
  cooldown: Duration,
}

impl AlertDispatcher {
  pub fn new(rules: Vec<AlertRule>, cooldown: Duration) -> Self {
    Self {
      rules: rules
        .into_iter()
        .map(|rule| (rule.class.clone(), rule))
        .collect(),
      last_fired: HashMap::new(),
      cooldown,
    }
  }

  /// 类别此刻是否允许发送：从未发送过，或冷却已过
  ///
  /// 标签匹配忽略大小写与首尾空白；没有对应规则的类别返回 None。
  pub fn ready(&self, label: &str, now: Instant) -> Option<&AlertRule> {
    let key = label.trim().to_lowercase();
    let rule = self.rules.get(&key)?;
    match self.last_fired.get(&key) {
      Some(&last) if now.duration_since(last) < self.cooldown => None,
      _ => Some(rule),
    }
  }

  /// 记录一次成功发送；发送失败时不调用，冷却窗口保持开放
  pub fn mark_fired(&mut self, label: &str, now: Instant) {
    self.last_fired.insert(label.trim().to_lowercase(), now);
  }

  /// 对一个检测类别做完整的告警决策与发送
  pub fn dispatch(&mut self, label: &str, now: Instant, channel: &MqttChannel) {
    let key = label.trim().to_lowercase();
    if !self.rules.contains_key(&key) {
      return;
    }
    let Some(rule) = self.ready(&key, now) else {
      debug!("{} 告警冷却中，丢弃本次检测", key);
      return;
    };

    let payload = json!({
      "sensor_id": rule.sensor_id.clone(),
      "event": rule.event.clone(),
      "timestamp": chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
    });
    let topic = rule.topic.clone();
    match channel.publish_json(&topic, &payload) {
      Ok(()) => {
        info!("告警已发送 -> 主题: {}, 负载: {}", topic, payload);
        self.mark_fired(&key, now);
      }
      Err(e) => {
        // 未记录发送时间，下一次满足条件的检测可以立即重试
        warn!("{} 告警发送失败，已丢弃: {}", key, e);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn dispatcher(cooldown_secs: u64) -> AlertDispatcher {
    AlertDispatcher::new(default_rules(), Duration::from_secs(cooldown_secs))
  }

  /// 冷却 10 秒：t=0 与 t=5 的两次检测只发一次，t=0 与 t=11 发两次
  #[test]
  fn cooldown_gates_repeat_detections() {
    let base = Instant::now();
    let mut d = dispatcher(10);

    assert!(d.ready("fire", base).is_some());
    d.mark_fired("fire", base);
    assert!(d.ready("fire", base + Duration::from_secs(5)).is_none());

    let mut d = dispatcher(10);
    assert!(d.ready("fire", base).is_some());
    d.mark_fired("fire", base);
    assert!(d.ready("fire", base + Duration::from_secs(11)).is_some());
  }

  /// 冷却边界：恰好等于冷却时长时允许发送
  #[test]
  fn cooldown_boundary_is_inclusive() {
    let base = Instant::now();
    let mut d = dispatcher(10);
    d.mark_fired("fire", base);
    assert!(d.ready("fire", base + Duration::from_secs(10)).is_some());
  }

  /// 各类别独立冷却，互不影响
  #[test]
  fn classes_cool_down_independently() {
    let base = Instant::now();
    let mut d = dispatcher(10);
    d.mark_fired("fire", base);
    assert!(d.ready("fire", base + Duration::from_secs(1)).is_none());
    assert!(d.ready("smoke", base + Duration::from_secs(1)).is_some());
  }

  /// 发送失败不记录时间戳，窗口保持开放
  #[test]
  fn failed_delivery_keeps_window_open() {
    let base = Instant::now();
    let mut d = dispatcher(10);
    assert!(d.ready("fire", base).is_some());
    // 发送失败：不调用 mark_fired，下一次检测仍然允许
    assert!(d.ready("fire", base + Duration::from_secs(1)).is_some());
    d.mark_fired("fire", base + Duration::from_secs(1));
    assert!(d.ready("fire", base + Duration::from_secs(2)).is_none());
  }

  #[test]
  fn unknown_label_never_fires() {
    let d = dispatcher(10);
    assert!(d.ready("person", Instant::now()).is_none());
  }

  #[test]
  fn label_matching_ignores_case_and_whitespace() {
    let base = Instant::now();
    let mut d = dispatcher(10);
    assert!(d.ready(" Fire ", base).is_some());
    d.mark_fired(" Fire ", base);
    assert!(d.ready("fire", base + Duration::from_secs(1)).is_none());
  }
}
