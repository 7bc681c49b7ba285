//! 进度浮层定位
//!
//! # 设计思路
//!
//! - 浮层固定出现在主显示器右下角，预留任务栏高度，不抢占焦点。
//! - 几何计算是纯函数，不依赖 `tauri::Monitor`，可直接单元测试；
//!   窗口显示/隐藏只在桌面构建中编译。

/// 浮层与屏幕边缘的间距
pub const OVERLAY_MARGIN: i32 = 20;
/// 底部任务栏预留高度
pub const TASKBAR_ALLOWANCE: i32 = 48;
/// 浮层窗口标签（见 `tauri.conf.json`）
pub const PROGRESS_WINDOW_LABEL: &str = "progress";

/// 计算浮层在显示器右下角的全局坐标。
///
/// 窗口大于可用区域时贴显示器左/上边界。
///
/// # 参数
/// * `monitor_pos`  - 显示器左上角的全局坐标
/// * `monitor_size` - 显示器尺寸（宽、高）
/// * `window_size`  - 浮层尺寸（宽、高）
pub fn lower_right_position(
    monitor_pos: (i32, i32),
    monitor_size: (u32, u32),
    window_size: (u32, u32),
) -> (i32, i32) {
    let (mx, my) = monitor_pos;
    let right = mx.saturating_add(monitor_size.0 as i32);
    let bottom = my.saturating_add(monitor_size.1 as i32);

    let x = right - window_size.0 as i32 - OVERLAY_MARGIN;
    let y = bottom - window_size.1 as i32 - OVERLAY_MARGIN - TASKBAR_ALLOWANCE;

    (x.max(mx), y.max(my))
}

#[cfg(feature = "desktop")]
mod window {
    use tauri::{AppHandle, Manager, PhysicalPosition};

    use super::{PROGRESS_WINDOW_LABEL, lower_right_position};
    use crate::error::AppError;

    /// 在主显示器右下角显示浮层（不抢焦点）。
    pub fn show_progress_overlay(app: &AppHandle) -> Result<(), AppError> {
        let window = app
            .get_webview_window(PROGRESS_WINDOW_LABEL)
            .ok_or_else(|| AppError::Window("找不到进度浮层窗口".to_string()))?;

        let monitor = window
            .primary_monitor()
            .map_err(|e| AppError::Window(format!("获取主显示器失败: {}", e)))?;
        let window_size = window
            .outer_size()
            .map_err(|e| AppError::Window(format!("获取浮层尺寸失败: {}", e)))?;

        if let Some(monitor) = monitor {
            let (x, y) = lower_right_position(
                (monitor.position().x, monitor.position().y),
                (monitor.size().width, monitor.size().height),
                (window_size.width, window_size.height),
            );
            window
                .set_position(PhysicalPosition::new(x, y))
                .map_err(|e| AppError::Window(format!("设置浮层位置失败: {}", e)))?;
        } else {
            log::warn!("未检测到主显示器，浮层使用默认位置");
        }

        window
            .show()
            .map_err(|e| AppError::Window(format!("显示浮层失败: {}", e)))?;
        Ok(())
    }

    pub fn hide_progress_overlay(app: &AppHandle) -> Result<(), AppError> {
        if let Some(window) = app.get_webview_window(PROGRESS_WINDOW_LABEL) {
            window
                .hide()
                .map_err(|e| AppError::Window(format!("隐藏浮层失败: {}", e)))?;
        }
        Ok(())
    }
}

#[cfg(feature = "desktop")]
pub use window::{hide_progress_overlay, show_progress_overlay};
