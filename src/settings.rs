//! 优化配置文件
//!
//! 读取 `<app_data_dir>/optimizer.json` 中的可选覆盖项（camelCase 键），
//! 缺省项沿用 `OptimizerConfig::default()`。只读不写。

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::optimizer::{OptimizeError, OptimizerConfig};

pub const CONFIG_FILE_NAME: &str = "optimizer.json";

/// 配置文件中允许出现的键。
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SettingsOverrides {
    jpeg_quality: Option<u8>,
    min_source_bytes: Option<u64>,
    jpeg_min_source_bytes: Option<u64>,
    /// 0 表示不过期。
    revert_window_ms: Option<u64>,
    enabled: Option<bool>,
}

/// 将 JSON 覆盖项合并到基础配置上并校验。
pub fn apply_settings(
    base: OptimizerConfig,
    settings: &serde_json::Value,
) -> Result<OptimizerConfig, OptimizeError> {
    let overrides = SettingsOverrides::deserialize(settings)
        .map_err(|e| OptimizeError::InvalidFormat(format!("解析优化配置失败: {}", e)))?;

    let mut config = base;
    if let Some(quality) = overrides.jpeg_quality {
        config.jpeg_quality = quality;
    }
    if let Some(floor) = overrides.min_source_bytes {
        config.min_source_bytes = floor;
    }
    if let Some(floor) = overrides.jpeg_min_source_bytes {
        config.jpeg_min_source_bytes = floor;
    }
    if let Some(window_ms) = overrides.revert_window_ms {
        config.revert_window = (window_ms > 0).then(|| Duration::from_millis(window_ms));
    }
    if let Some(enabled) = overrides.enabled {
        config.enabled = enabled;
    }

    config.validate()?;
    Ok(config)
}

/// 读取配置文件；文件不存在用默认值，内容非法时记录错误并回退默认值。
pub fn load_config(path: &Path) -> OptimizerConfig {
    if !path.exists() {
        log::info!("未找到优化配置 {}，使用默认配置", path.display());
        return OptimizerConfig::default();
    }

    let parsed = fs::read_to_string(path)
        .map_err(|e| OptimizeError::InvalidFormat(format!("读取优化配置失败: {}", e)))
        .and_then(|content| {
            serde_json::from_str::<serde_json::Value>(&content)
                .map_err(|e| OptimizeError::InvalidFormat(format!("解析优化配置失败: {}", e)))
        })
        .and_then(|value| apply_settings(OptimizerConfig::default(), &value));

    match parsed {
        Ok(config) => {
            log::info!("✅ 已加载优化配置 {}", path.display());
            config
        }
        Err(err) => {
            log::error!("优化配置无效 {}，使用默认配置: {}", path.display(), err);
            OptimizerConfig::default()
        }
    }
}

/// 桌面端配置文件路径。
#[cfg(feature = "desktop")]
pub fn config_path(app: &tauri::AppHandle) -> Result<std::path::PathBuf, crate::error::AppError> {
    use tauri::Manager;

    let app_data_dir = app
        .path()
        .app_data_dir()
        .map_err(|e| crate::error::AppError::Storage(format!("获取应用数据目录失败: {}", e)))?;

    fs::create_dir_all(&app_data_dir)?;
    Ok(app_data_dir.join(CONFIG_FILE_NAME))
}
