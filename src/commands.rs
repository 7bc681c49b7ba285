//! # 命令层与事件转发（桌面端）
//!
//! - 前端命令：`hide_progress` / `revert_clipboard` / `get_auto_start` / `set_auto_start`
//! - `forward_events`：把核心层事件通道转发为前端事件，并在开始时弹出浮层
//! - `shutdown_and_exit`：托盘“退出”在后台等待工作线程结束后退出

use std::sync::Arc;

use tauri::{AppHandle, Emitter, Manager, State};
use tauri_plugin_autostart::ManagerExt as _;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::AppError;
use crate::optimizer::{OptimizerEvent, OptimizerService, RevertOutcome};
use crate::overlay;

/// 隐藏进度浮层（前端 5 秒计时结束或用户关闭时调用）。
#[tauri::command]
pub fn hide_progress(app: AppHandle) -> Result<(), AppError> {
    overlay::hide_progress_overlay(&app)
}

/// 撤销最近一次优化。没有可撤销内容时静默成功。
///
/// 撤销要等进行中的优化结束才能拿到流水线锁，放到阻塞线程池执行，不占用主线程。
#[tauri::command]
pub async fn revert_clipboard(
    app: AppHandle,
    service: State<'_, Arc<OptimizerService>>,
) -> Result<(), AppError> {
    let service = Arc::clone(&service);
    let outcome = tauri::async_runtime::spawn_blocking(move || service.revert())
        .await
        .map_err(|e| AppError::Task(format!("撤销线程执行失败：{}", e)))??;
    if outcome != RevertOutcome::Reverted {
        log::debug!("撤销请求未执行：{:?}", outcome);
    }
    overlay::hide_progress_overlay(&app)
}

#[tauri::command]
pub fn get_auto_start(app: AppHandle) -> Result<bool, AppError> {
    app.autolaunch()
        .is_enabled()
        .map_err(|e| AppError::Autostart(e.to_string()))
}

#[tauri::command]
pub fn set_auto_start(app: AppHandle, enabled: bool) -> Result<(), AppError> {
    let manager = app.autolaunch();
    let result = if enabled {
        manager.enable()
    } else {
        manager.disable()
    };
    result.map_err(|e| AppError::Autostart(e.to_string()))?;
    log::info!("开机自启已{}", if enabled { "开启" } else { "关闭" });
    Ok(())
}

/// 在后台停止优化服务后退出应用（等待工作线程不占用主线程）。
pub fn shutdown_and_exit(app: AppHandle) {
    tauri::async_runtime::spawn_blocking(move || {
        if let Some(service) = app.try_state::<Arc<OptimizerService>>() {
            service.shutdown();
        }
        app.exit(0);
    });
}

/// 将核心事件转发到前端。
pub fn forward_events(app: AppHandle, mut receiver: UnboundedReceiver<OptimizerEvent>) {
    tauri::async_runtime::spawn(async move {
        while let Some(event) = receiver.recv().await {
            let emitted = match event {
                OptimizerEvent::Started => {
                    if let Err(err) = overlay::show_progress_overlay(&app) {
                        log::warn!("显示进度浮层失败: {}", err);
                    }
                    app.emit(event.name(), ())
                }
                OptimizerEvent::Completed(payload) => app.emit(event.name(), payload),
            };
            if let Err(err) = emitted {
                log::warn!("发送前端事件 {} 失败: {}", event.name(), err);
            }
        }
        log::info!("事件通道已关闭，停止转发");
    });
}
