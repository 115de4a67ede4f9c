// 该文件是 Liaowang（瞭望）项目的一部分。
// src/lifecycle.rs - 进程级停机协调
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

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

/// 协作式停机检查的时间片上限，保证各循环亚秒级响应停机
const SLEEP_SLICE: Duration = Duration::from_millis(250);

/// 优雅停机等待上限，超时强制退出进程
const FORCE_EXIT_AFTER: Duration = Duration::from_secs(30);

/// 进程级停机标志
///
/// 唯一的取消机制：信号处理器或不可恢复错误置位，
/// 各循环（主流水线、预览服务、遥测）在迭代边界读取并退出。
#[derive(Clone, Default)]
pub struct Shutdown {
  flag: Arc<AtomicBool>,
}

impl Shutdown {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn request(&self, reason: &str) {
    info!("收到停机请求: {}", reason);
    self.flag.store(true, Ordering::SeqCst);
  }

  pub fn is_requested(&self) -> bool {
    self.flag.load(Ordering::SeqCst)
  }

  /// 安装 Ctrl-C / SIGTERM 处理器
  ///
  /// 置位后若优雅停机迟迟未完成，另起线程强制退出进程。
  pub fn install_signal_handler(&self) -> anyhow::Result<()> {
    let shutdown = self.clone();
    ctrlc::set_handler(move || {
      shutdown.request("终止信号");
      thread::spawn(|| {
        thread::sleep(FORCE_EXIT_AFTER);
        warn!("优雅停机超时，强制退出程序");
        std::process::exit(1);
      });
    })?;
    Ok(())
  }

  /// 分片睡眠，期间持续观察停机标志
  ///
  /// 返回 false 表示睡眠被停机请求打断。
  pub fn sleep_while(&self, total: Duration) -> bool {
    let mut remaining = total;
    while remaining > Duration::ZERO {
      if self.is_requested() {
        return false;
      }
      let slice = remaining.min(SLEEP_SLICE);
      thread::sleep(slice);
      remaining = remaining.saturating_sub(slice);
    }
    !self.is_requested()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Instant;

  #[test]
  fn flag_is_visible_across_threads() {
    let shutdown = Shutdown::new();
    let observer = shutdown.clone();
    let handle = thread::spawn(move || {
      let start = Instant::now();
      while !observer.is_requested() {
        assert!(start.elapsed() < Duration::from_secs(5), "停机标志未被观察到");
        thread::sleep(Duration::from_millis(10));
      }
      start.elapsed()
    });
    thread::sleep(Duration::from_millis(50));
    shutdown.request("测试");
    let observed_after = handle.join().unwrap();
    // 各循环必须在亚秒内观察到停机
    assert!(observed_after < Duration::from_secs(1));
  }

  #[test]
  fn sleep_is_interrupted_by_shutdown() {
    let shutdown = Shutdown::new();
    let sleeper = shutdown.clone();
    let handle = thread::spawn(move || {
      let start = Instant::now();
      let completed = sleeper.sleep_while(Duration::from_secs(30));
      (completed, start.elapsed())
    });
    thread::sleep(Duration::from_millis(100));
    shutdown.request("测试");
    let (completed, elapsed) = handle.join().unwrap();
    assert!(!completed);
    assert!(elapsed < Duration::from_secs(1));
  }
}
