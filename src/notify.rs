// 该文件是 Liaowang（瞭望）项目的一部分。
// src/notify.rs - MQTT 通知通道
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

use std::thread;
use std::time::Duration;

use rumqttc::{Client, Connection, Event, MqttOptions, QoS};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::lifecycle::Shutdown;

const KEEP_ALIVE: Duration = Duration::from_secs(15);
const RECONNECT_WAIT: Duration = Duration::from_secs(10);
const RECV_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum NotifyError {
  #[error("MQTT 发布失败: {0}")]
  Publish(#[from] rumqttc::ClientError),
  #[error("负载序列化失败: {0}")]
  Encode(#[from] serde_json::Error),
}

/// MQTT 通道封装
///
/// 发布为 QoS 0 即发即弃，不等待确认；连接事件由独立线程消化，
/// 断线后以固定间隔重连，不会阻塞调用方。
pub struct MqttChannel {
  client: Client,
  drain: Option<thread::JoinHandle<()>>,
}

impl MqttChannel {
  pub fn connect(client_id: &str, host: &str, port: u16, shutdown: Shutdown) -> Self {
    let mut options = MqttOptions::new(client_id, host, port);
    options.set_keep_alive(KEEP_ALIVE);
    let (client, connection) = Client::new(options, 16);

    let id = client_id.to_string();
    let drain = thread::Builder::new()
      .name(format!("mqtt-{}", client_id))
      .spawn(move || drain_loop(connection, shutdown, id))
      .ok();
    if drain.is_none() {
      warn!("MQTT 事件线程启动失败 (client_id={})", client_id);
    }

    Self { client, drain }
  }

  /// 序列化并发布 JSON 负载，即发即弃
  pub fn publish_json(&self, topic: &str, payload: &serde_json::Value) -> Result<(), NotifyError> {
    let body = serde_json::to_vec(payload)?;
    self.client.publish(topic, QoS::AtMostOnce, false, body)?;
    Ok(())
  }

  /// 断开连接并等待事件线程退出
  pub fn shutdown(mut self) {
    let _ = self.client.disconnect();
    if let Some(handle) = self.drain.take() {
      let _ = handle.join();
    }
  }
}

/// 消化连接事件；出错时等待重连间隔后继续，停机时退出
fn drain_loop(mut connection: Connection, shutdown: Shutdown, client_id: String) {
  loop {
    if shutdown.is_requested() {
      break;
    }
    match connection.recv_timeout(RECV_TIMEOUT) {
      Ok(Ok(Event::Incoming(packet))) => trace!("MQTT 收到 ({}): {:?}", client_id, packet),
      Ok(Ok(Event::Outgoing(packet))) => trace!("MQTT 发出 ({}): {:?}", client_id, packet),
      Ok(Err(e)) => {
        warn!("MQTT 连接异常 ({}): {}，{}s 后重试", client_id, e, RECONNECT_WAIT.as_secs());
        if !shutdown.sleep_while(RECONNECT_WAIT) {
          break;
        }
      }
      // 超时无事件，回到循环顶部检查停机标志
      Err(_) => continue,
    }
  }
  debug!("MQTT 事件线程退出 ({})", client_id);
}
