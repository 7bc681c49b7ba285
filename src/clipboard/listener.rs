use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clipboard_master::{CallbackResult, ClipboardHandler, Master};

use super::ClipboardPort;

const MONITOR_RESTART_BASE_DELAY_MS: u64 = 100;
const MONITOR_RESTART_MAX_DELAY_MS: u64 = 5_000;

/// 变化回调：参数为本次变化的序号。
pub type ChangeCallback = Arc<dyn Fn(u64) + Send + Sync>;

fn compute_restart_backoff_ms(restart_attempt: u32) -> u64 {
    let exp = 1_u64 << restart_attempt.saturating_sub(1).min(6);
    MONITOR_RESTART_BASE_DELAY_MS
        .saturating_mul(exp)
        .min(MONITOR_RESTART_MAX_DELAY_MS)
}

/// 剪贴板事件处理器（内部实现）
///
/// 每次系统通知都会投递，包括本进程自己的写入；
/// 是否忽略由流水线按序号判断。
struct Handler {
    port: Arc<dyn ClipboardPort>,
    on_change: ChangeCallback,
}

impl ClipboardHandler for Handler {
    fn on_clipboard_change(&mut self) -> CallbackResult {
        let sequence_id = self.port.observe_change();
        log::trace!("📋 剪贴板变化 seq={}", sequence_id);
        (self.on_change)(sequence_id);
        CallbackResult::Next
    }

    fn on_clipboard_error(&mut self, error: std::io::Error) -> CallbackResult {
        log::error!("剪贴板错误：{}", error);
        CallbackResult::Next
    }
}

/// 订阅剪贴板变化：在后台线程运行监听器，退出后按指数退避重启。
///
/// # 参数
/// * `port` - 用于获取变化序号的剪贴板端口
/// * `on_change` - 变化回调，运行在监听线程上，应尽快返回
pub fn subscribe<F>(port: Arc<dyn ClipboardPort>, on_change: F)
where
    F: Fn(u64) + Send + Sync + 'static,
{
    let on_change: ChangeCallback = Arc::new(on_change);

    let spawned = thread::Builder::new()
        .name("clipboard-monitor".to_string())
        .spawn(move || {
            let mut restart_attempt: u32 = 0;
            loop {
                let handler = Handler {
                    port: Arc::clone(&port),
                    on_change: Arc::clone(&on_change),
                };
                match Master::new(handler) {
                    Ok(mut master) => {
                        restart_attempt = 0;
                        log::info!("📋 剪贴板监听已启动");
                        if let Err(err) = master.run() {
                            log::warn!("📋 剪贴板监听异常退出: {}", err);
                        } else {
                            log::warn!("📋 剪贴板监听已退出，将尝试重启");
                        }
                    }
                    Err(err) => {
                        log::error!("📋 创建剪贴板监听失败: {}", err);
                    }
                }

                restart_attempt = restart_attempt.saturating_add(1);
                let backoff_ms = compute_restart_backoff_ms(restart_attempt);
                log::warn!("📋 剪贴板监听 {}ms 后重试（attempt={}）", backoff_ms, restart_attempt);
                thread::sleep(Duration::from_millis(backoff_ms));
            }
        });

    if let Err(err) = spawned {
        log::error!("📋 启动剪贴板监听线程失败: {}", err);
    }
}
