// 防止在 Windows 发布版本中显示额外的控制台窗口，不要删除！
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

//! # 剪贴板图片优化工具 — 应用入口
//!
//! 本文件仅负责应用初始化与插件/命令注册。
//! 业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use std::sync::Arc;

use clipboard_optimizer::clipboard::{self, ClipboardPort, SystemClipboard};
use clipboard_optimizer::optimizer::{EventSink, OptimizerService};
use clipboard_optimizer::{commands, settings};
use tauri::Manager;
use tauri::image::Image;
use tauri::menu::{Menu, MenuItem};
use tauri::tray::{
    MouseButton as TauriMouseButton, MouseButtonState, TrayIconBuilder, TrayIconEvent,
};
use tauri_plugin_autostart::MacosLauncher;

fn show_settings_window(app: &tauri::AppHandle, context: &str) {
    if let Some(w) = app.get_webview_window("main") {
        if let Err(err) = w.unminimize() {
            log::warn!("{}显示窗口失败（unminimize）: {err}", context);
        }
        if let Err(err) = w.show() {
            log::warn!("{}显示窗口失败（show）: {err}", context);
        }
        if let Err(err) = w.set_focus() {
            log::warn!("{}显示窗口失败（focus）: {err}", context);
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    tauri::Builder::default()
        .plugin(tauri_plugin_autostart::init(
            MacosLauncher::LaunchAgent,
            Some(vec!["--hidden"]),
        ))
        .setup(|app| {
            log::info!("setup: begin");
            let app_icon = Image::from_bytes(include_bytes!("../icons/icon.png"))?;
            let handle = app.handle().clone();

            let config = match settings::config_path(&handle) {
                Ok(path) => settings::load_config(&path),
                Err(err) => {
                    log::error!("setup: 配置目录不可用，使用默认配置: {err}");
                    Default::default()
                }
            };

            // 启动优化服务并注册为托管状态
            let system_clipboard: Arc<dyn ClipboardPort> = Arc::new(SystemClipboard::new());
            let (events, receiver) = EventSink::channel();
            let service = Arc::new(OptimizerService::start(
                Arc::clone(&system_clipboard),
                config,
                events,
            )?);
            app.manage(Arc::clone(&service));
            commands::forward_events(handle.clone(), receiver);
            log::info!("setup: optimizer service managed");

            // 启动剪贴板监控
            clipboard::listener::subscribe(system_clipboard, move |sequence_id| {
                service.notify_change(sequence_id);
            });
            log::info!("setup: clipboard monitor stage done");

            if let Some(main_window) = app.get_webview_window("main") {
                let _ = main_window.set_icon(app_icon.clone());
            }

            // 创建托盘菜单
            let settings_i = MenuItem::with_id(app, "settings", "设置", true, None::<&str>)?;
            let quit_i = MenuItem::with_id(app, "quit", "退出", true, None::<&str>)?;
            let menu = Menu::with_items(app, &[&settings_i, &quit_i])?;

            // 创建托盘图标（失败时回退显示设置窗口，避免进程在后台无入口）
            let tray_result = TrayIconBuilder::new()
                .icon(app_icon)
                .tooltip("剪贴板图片优化")
                .menu(&menu)
                .on_menu_event(|app, event| match event.id.as_ref() {
                    "quit" => commands::shutdown_and_exit(app.clone()),
                    "settings" => show_settings_window(app, "托盘菜单"),
                    _ => {}
                })
                .on_tray_icon_event(|tray, event| {
                    if let TrayIconEvent::Click {
                        button: TauriMouseButton::Left,
                        button_state: MouseButtonState::Up,
                        ..
                    } = event
                    {
                        show_settings_window(tray.app_handle(), "托盘点击");
                    }
                })
                .build(app);

            if let Err(err) = tray_result {
                log::warn!("托盘图标创建失败，回退为显示设置窗口: {err}");
                show_settings_window(&handle, "托盘失败回退");
            }

            log::info!("setup: complete");
            Ok(())
        })
        // 窗口关闭时隐藏而非退出
        .on_window_event(|window, event| {
            if let tauri::WindowEvent::CloseRequested { api, .. } = event {
                if let Err(err) = window.hide() {
                    log::warn!("窗口关闭转隐藏失败: {err}");
                }
                api.prevent_close();
            }
        })
        .invoke_handler(tauri::generate_handler![
            commands::hide_progress,
            commands::revert_clipboard,
            commands::get_auto_start,
            commands::set_auto_start,
        ])
        .run(tauri::generate_context!())
        .expect("运行 Tauri 应用时出错");
}
