//! # 系统剪贴板实现
//!
//! ## 设计思路
//!
//! - 读取：位图与文件列表走 `arboard`；Windows 上 PNG/JPEG 以注册格式
//!   （`PNG`、`image/png`、`image/jpeg`、`JFIF`）原样读取。
//! - 写入（Windows）：先算好写入计划，再在一次 Open→Empty→Set…→Close 中全部放入。
//!   提交 JPEG 时同时放入 `CF_DIB`，只认位图的应用也能粘贴；
//!   撤销时快照里的每个格式都写回（位图→`CF_DIB`，文件列表→`CF_HDROP`）。
//! - 其他平台 `arboard` 只能写入像素，无法放入压缩后的字节：
//!   `supports_write(Png | Jpeg)` 为 `false`，流水线据此不做优化。
//!
//! ## 变化序号
//!
//! Windows 使用 `GetClipboardSequenceNumber`；其余平台没有原生序号，
//! 由监听器在每次变化通知时自增计数，写入时返回“下一次通知将携带的序号”。
//!
//! ## 错误日志字段约定（Windows）
//!
//! 失败消息统一包含 `format`、`hr`、`code`、`hint` 字段，便于检索。

use std::borrow::Cow;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use image::{DynamicImage, ImageFormat, RgbaImage};

use super::{ClipboardError, ClipboardFormat, ClipboardPort, ClipboardSnapshot};
#[cfg(not(target_os = "windows"))]
use super::IMAGE_FORMATS;

/// BMP 文件头长度；`CF_DIB` 负载是去掉文件头后的部分。
const BITMAP_FILE_HEADER_LEN: usize = 14;

/// `DROPFILES` 结构体长度（pFiles、pt.x、pt.y、fNC、fWide）。
const DROPFILES_HEADER_LEN: u32 = 20;

/// Windows 注册格式名：读取时按顺序尝试，写入时全部写入。
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn raw_format_names(format: ClipboardFormat) -> &'static [&'static str] {
    match format {
        ClipboardFormat::Png => &["PNG", "image/png"],
        ClipboardFormat::Jpeg => &["image/jpeg", "JFIF"],
        ClipboardFormat::Bitmap | ClipboardFormat::FileList => &[],
    }
}

/// Windows 剪贴板上的一个原生格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
enum RawFormat {
    Registered(&'static str),
    Dib,
    FileDrop,
}

impl RawFormat {
    #[cfg_attr(not(target_os = "windows"), allow(dead_code))]
    fn name(self) -> &'static str {
        match self {
            Self::Registered(name) => name,
            Self::Dib => "CF_DIB",
            Self::FileDrop => "CF_HDROP",
        }
    }
}

/// 一次剪贴板会话中要放入的全部条目。
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
type WritePlan<'a> = Vec<(RawFormat, Cow<'a, [u8]>)>;

/// 单一格式在 Windows 上对应的原生条目。
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn plan_entries<'a>(
    format: ClipboardFormat,
    payload: &'a [u8],
    plan: &mut WritePlan<'a>,
) -> Result<(), ClipboardError> {
    match format {
        ClipboardFormat::Png | ClipboardFormat::Jpeg => {
            for name in raw_format_names(format) {
                plan.push((RawFormat::Registered(name), Cow::Borrowed(payload)));
            }
        }
        ClipboardFormat::Bitmap => {
            plan.push((RawFormat::Dib, Cow::Owned(dib_from_image(payload)?)));
        }
        ClipboardFormat::FileList => {
            let paths = super::decode_file_list(payload);
            plan.push((RawFormat::FileDrop, Cow::Owned(encode_drop_files(&paths))));
        }
    }
    Ok(())
}

/// 提交写入计划：压缩格式额外附带一份 `CF_DIB`。
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn commit_plan(format: ClipboardFormat, payload: &[u8]) -> Result<WritePlan<'_>, ClipboardError> {
    let mut plan = Vec::new();
    plan_entries(format, payload, &mut plan)?;
    if matches!(format, ClipboardFormat::Png | ClipboardFormat::Jpeg) {
        plan.push((RawFormat::Dib, Cow::Owned(dib_from_image(payload)?)));
    }
    Ok(plan)
}

/// 撤销写入计划：快照中的每个格式都写回，不额外合成。
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn restore_plan(snapshot: &ClipboardSnapshot) -> Result<WritePlan<'_>, ClipboardError> {
    let mut plan = Vec::new();
    for (format, payload) in snapshot.entries() {
        plan_entries(format, payload, &mut plan)?;
    }
    if plan.is_empty() {
        return Err(ClipboardError::Unsupported("快照为空，无可恢复内容".to_string()));
    }
    Ok(plan)
}

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn hresult_to_win32_code(hr: i32) -> Option<u32> {
    let value = hr as u32;
    if (value & 0xFFFF_0000) == 0x8007_0000 {
        Some(value & 0xFFFF)
    } else {
        None
    }
}

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn win32_error_hint(code: Option<u32>) -> &'static str {
    match code {
        Some(5) => "剪贴板被其他进程占用或权限不足",
        Some(1418) => "剪贴板句柄未打开或已失效",
        Some(170) => "系统忙，资源暂不可用",
        Some(8) | Some(14) => "内存不足",
        Some(_) => "未分类 Win32 错误",
        None => "无法从 HRESULT 解析 Win32 错误码",
    }
}

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn format_win32_error_message(operation: &str, format_name: &str, hr: i32, detail: &str) -> String {
    let code = hresult_to_win32_code(hr);
    let code_str = code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "{}失败: format={} hr=0x{:08X} code={} hint={} detail={}",
        operation,
        format_name,
        hr as u32,
        code_str,
        win32_error_hint(code),
        detail
    )
}

fn map_arboard_error(operation: &str, error: arboard::Error) -> ClipboardError {
    match error {
        arboard::Error::ClipboardOccupied => {
            ClipboardError::Unavailable(format!("{}失败：剪贴板被占用", operation))
        }
        arboard::Error::ClipboardNotSupported => {
            ClipboardError::Unsupported(format!("{}失败：当前环境不支持剪贴板", operation))
        }
        other => ClipboardError::Unavailable(format!("{}失败：{}", operation, other)),
    }
}

/// RGBA 像素 → BMP 字节，作为 `Bitmap` 格式的统一负载。
fn encode_bitmap(width: usize, height: usize, rgba: Vec<u8>) -> Result<Vec<u8>, ClipboardError> {
    let image = RgbaImage::from_raw(width as u32, height as u32, rgba)
        .ok_or_else(|| ClipboardError::Unsupported("位图像素长度与尺寸不符".to_string()))?;
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image)
        .write_to(&mut cursor, ImageFormat::Bmp)
        .map_err(|e| ClipboardError::Unsupported(format!("位图编码失败：{}", e)))?;
    Ok(cursor.into_inner())
}

/// 任意可解码图片 → 24 位 `BITMAPINFOHEADER` DIB（`CF_DIB` 负载）。
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn dib_from_image(payload: &[u8]) -> Result<Vec<u8>, ClipboardError> {
    let decoded = image::load_from_memory(payload)
        .map_err(|e| ClipboardError::Unsupported(format!("无法解码待写入图片：{}", e)))?;
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(decoded.to_rgb8())
        .write_to(&mut cursor, ImageFormat::Bmp)
        .map_err(|e| ClipboardError::Unsupported(format!("DIB 编码失败：{}", e)))?;
    let mut bmp = cursor.into_inner();
    if bmp.len() <= BITMAP_FILE_HEADER_LEN {
        return Err(ClipboardError::Unsupported("DIB 编码结果为空".to_string()));
    }
    Ok(bmp.split_off(BITMAP_FILE_HEADER_LEN))
}

/// 文件路径 → `CF_HDROP` 负载（`DROPFILES` 头 + UTF-16 路径，双零结尾）。
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn encode_drop_files(paths: &[PathBuf]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(DROPFILES_HEADER_LEN as usize + paths.len() * 64);
    bytes.extend_from_slice(&DROPFILES_HEADER_LEN.to_le_bytes());
    bytes.extend_from_slice(&0i32.to_le_bytes());
    bytes.extend_from_slice(&0i32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&1u32.to_le_bytes());
    for path in paths {
        let wide = path.to_string_lossy();
        for unit in wide.encode_utf16().chain(std::iter::once(0)) {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
    }
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes
}

#[cfg_attr(target_os = "windows", allow(dead_code))]
fn decode_to_rgba(payload: &[u8]) -> Result<arboard::ImageData<'static>, ClipboardError> {
    let decoded = image::load_from_memory(payload)
        .map_err(|e| ClipboardError::Unsupported(format!("无法解码待写入图片：{}", e)))?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(arboard::ImageData {
        width: width as usize,
        height: height as usize,
        bytes: rgba.into_raw().into(),
    })
}

/// 操作系统剪贴板。
#[derive(Debug, Default)]
pub struct SystemClipboard {
    /// 无原生序号平台上的变化计数。
    changes: AtomicU64,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn open() -> Result<arboard::Clipboard, ClipboardError> {
        arboard::Clipboard::new().map_err(|e| map_arboard_error("打开剪贴板", e))
    }

    fn read_bitmap(clipboard: &mut arboard::Clipboard) -> Result<Option<Vec<u8>>, ClipboardError> {
        match clipboard.get_image() {
            Ok(image) => {
                let rgba = image.bytes.into_owned();
                encode_bitmap(image.width, image.height, rgba).map(Some)
            }
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(arboard::Error::ClipboardOccupied) => Err(ClipboardError::Unavailable(
                "读取位图失败：剪贴板被占用".to_string(),
            )),
            Err(other) => {
                log::debug!("📋 读取位图跳过：{}", other);
                Ok(None)
            }
        }
    }

    fn read_file_list(clipboard: &mut arboard::Clipboard) -> Result<Option<Vec<u8>>, ClipboardError> {
        match clipboard.get().file_list() {
            Ok(paths) if !paths.is_empty() => Ok(Some(super::encode_file_list(&paths))),
            Ok(_) | Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(arboard::Error::ClipboardOccupied) => Err(ClipboardError::Unavailable(
                "读取文件列表失败：剪贴板被占用".to_string(),
            )),
            Err(other) => {
                log::debug!("📋 读取文件列表跳过：{}", other);
                Ok(None)
            }
        }
    }

    #[cfg(target_os = "windows")]
    fn read_encoded(format: ClipboardFormat) -> Result<Option<Vec<u8>>, ClipboardError> {
        win32::read_raw(raw_format_names(format))
    }

    #[cfg(not(target_os = "windows"))]
    fn read_encoded(_format: ClipboardFormat) -> Result<Option<Vec<u8>>, ClipboardError> {
        Ok(None)
    }

    #[cfg(target_os = "windows")]
    fn write_native(format: ClipboardFormat, payload: &[u8]) -> Result<(), ClipboardError> {
        let plan = commit_plan(format, payload)?;
        win32::write_raw(&plan)
    }

    #[cfg(not(target_os = "windows"))]
    fn write_native(format: ClipboardFormat, payload: &[u8]) -> Result<(), ClipboardError> {
        match format {
            ClipboardFormat::Bitmap => {
                let image = decode_to_rgba(payload)?;
                let mut clipboard = Self::open()?;
                clipboard
                    .set_image(image)
                    .map_err(|e| map_arboard_error("写入图片", e))
            }
            ClipboardFormat::FileList => {
                let paths = super::decode_file_list(payload);
                let mut clipboard = Self::open()?;
                clipboard
                    .set()
                    .file_list(paths.as_slice())
                    .map_err(|e| map_arboard_error("写入文件列表", e))
            }
            ClipboardFormat::Png | ClipboardFormat::Jpeg => Err(ClipboardError::Unsupported(
                format!("当前平台无法原样写入 {}", format.as_str()),
            )),
        }
    }

    #[cfg(target_os = "windows")]
    fn restore_native(&self, snapshot: &ClipboardSnapshot) -> Result<(), ClipboardError> {
        let plan = restore_plan(snapshot)?;
        win32::write_raw(&plan)
    }

    /// `arboard` 每次设置都会替换全部内容，只能写回可写格式中优先级最高的一个。
    #[cfg(not(target_os = "windows"))]
    fn restore_native(&self, snapshot: &ClipboardSnapshot) -> Result<(), ClipboardError> {
        let format = IMAGE_FORMATS
            .iter()
            .copied()
            .find(|format| snapshot.contains(*format) && self.supports_write(*format))
            .ok_or_else(|| ClipboardError::Unsupported("快照中没有可写回的格式".to_string()))?;
        let dropped: Vec<_> = snapshot.formats().filter(|other| *other != format).collect();
        if !dropped.is_empty() {
            log::debug!("📋 当前平台只写回 {}，放弃 {:?}", format.as_str(), dropped);
        }
        Self::write_native(format, snapshot.payload(format).unwrap_or_default())
    }

    #[cfg(target_os = "windows")]
    fn sequence_after_write(&self) -> u64 {
        win32::sequence_number()
    }

    #[cfg(not(target_os = "windows"))]
    fn sequence_after_write(&self) -> u64 {
        self.changes.load(Ordering::SeqCst) + 1
    }
}

impl ClipboardPort for SystemClipboard {
    fn read(&self, formats: &[ClipboardFormat]) -> Result<ClipboardSnapshot, ClipboardError> {
        let mut snapshot = ClipboardSnapshot::empty(self.sequence_id());

        for format in formats {
            let payload = match format {
                ClipboardFormat::Png | ClipboardFormat::Jpeg => Self::read_encoded(*format)?,
                ClipboardFormat::Bitmap => {
                    let mut clipboard = Self::open()?;
                    Self::read_bitmap(&mut clipboard)?
                }
                ClipboardFormat::FileList => {
                    let mut clipboard = Self::open()?;
                    Self::read_file_list(&mut clipboard)?
                }
            };
            if let Some(bytes) = payload {
                snapshot.insert(*format, bytes);
            }
        }

        log::trace!(
            "📋 读取剪贴板 seq={} formats={:?}",
            snapshot.sequence_id,
            snapshot.formats().collect::<Vec<_>>()
        );
        Ok(snapshot)
    }

    fn write(&self, format: ClipboardFormat, payload: &[u8]) -> Result<u64, ClipboardError> {
        Self::write_native(format, payload)?;
        let sequence_id = self.sequence_after_write();
        log::debug!(
            "📋 写入剪贴板 format={} bytes={} seq={}",
            format.as_str(),
            payload.len(),
            sequence_id
        );
        Ok(sequence_id)
    }

    fn sequence_id(&self) -> u64 {
        #[cfg(target_os = "windows")]
        {
            win32::sequence_number()
        }
        #[cfg(not(target_os = "windows"))]
        {
            self.changes.load(Ordering::SeqCst)
        }
    }

    #[cfg(target_os = "windows")]
    fn observe_change(&self) -> u64 {
        win32::sequence_number()
    }

    #[cfg(not(target_os = "windows"))]
    fn observe_change(&self) -> u64 {
        self.changes.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn supports_write(&self, format: ClipboardFormat) -> bool {
        cfg!(target_os = "windows") || matches!(format, ClipboardFormat::Bitmap | ClipboardFormat::FileList)
    }

    fn restore(&self, snapshot: &ClipboardSnapshot) -> Result<u64, ClipboardError> {
        self.restore_native(snapshot)?;
        let sequence_id = self.sequence_after_write();
        log::debug!(
            "📋 写回快照 formats={:?} seq={}",
            snapshot.formats().collect::<Vec<_>>(),
            sequence_id
        );
        Ok(sequence_id)
    }
}

// ============================================================================
// Windows 原生注册格式读写
// ============================================================================

#[cfg(target_os = "windows")]
mod win32 {
    use std::ptr::copy_nonoverlapping;

    use windows::Win32::Foundation::{GlobalFree, HANDLE, HGLOBAL};
    use windows::Win32::System::DataExchange::{
        CloseClipboard, EmptyClipboard, GetClipboardData, GetClipboardSequenceNumber,
        IsClipboardFormatAvailable, OpenClipboard, RegisterClipboardFormatW, SetClipboardData,
    };
    use std::borrow::Cow;

    use windows::Win32::System::Memory::{GMEM_MOVEABLE, GlobalAlloc, GlobalLock, GlobalSize, GlobalUnlock};
    use windows::Win32::System::Ole::{CF_DIB, CF_HDROP};
    use windows::core::PCWSTR;

    use super::{ClipboardError, RawFormat, format_win32_error_message};

    pub(super) fn sequence_number() -> u64 {
        unsafe { GetClipboardSequenceNumber() as u64 }
    }

    fn unavailable(operation: &str, format_name: &str, err: &windows::core::Error) -> ClipboardError {
        ClipboardError::Unavailable(format_win32_error_message(
            operation,
            format_name,
            err.code().0,
            &format!("{:?}", err),
        ))
    }

    fn register_format(name: &str) -> Result<u32, ClipboardError> {
        let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
        let format_id = unsafe { RegisterClipboardFormatW(PCWSTR(wide.as_ptr())) };
        if format_id == 0 {
            return Err(ClipboardError::Unsupported(format!("注册格式 '{}' 失败", name)));
        }
        Ok(format_id)
    }

    fn format_id(format: RawFormat) -> Result<u32, ClipboardError> {
        match format {
            RawFormat::Registered(name) => register_format(name),
            RawFormat::Dib => Ok(u32::from(CF_DIB.0)),
            RawFormat::FileDrop => Ok(u32::from(CF_HDROP.0)),
        }
    }

    /// 按顺序读取第一个存在的注册格式。
    pub(super) fn read_raw(names: &[&str]) -> Result<Option<Vec<u8>>, ClipboardError> {
        if names.is_empty() {
            return Ok(None);
        }

        let ids = names
            .iter()
            .map(|name| register_format(name).map(|id| (*name, id)))
            .collect::<Result<Vec<_>, _>>()?;

        unsafe {
            OpenClipboard(None).map_err(|e| unavailable("打开剪贴板", "N/A", &e))?;

            let result = (|| -> Result<Option<Vec<u8>>, ClipboardError> {
                for (name, id) in &ids {
                    if IsClipboardFormatAvailable(*id).is_err() {
                        continue;
                    }
                    let handle = match GetClipboardData(*id) {
                        Ok(handle) => handle,
                        Err(e) => {
                            log::debug!("📋 读取格式 {} 失败：{:?}", name, e);
                            continue;
                        }
                    };

                    let hglobal = HGLOBAL(handle.0);
                    let size = GlobalSize(hglobal);
                    let ptr = GlobalLock(hglobal) as *const u8;
                    if ptr.is_null() || size == 0 {
                        continue;
                    }
                    let bytes = std::slice::from_raw_parts(ptr, size).to_vec();
                    let _ = GlobalUnlock(hglobal);
                    return Ok(Some(bytes));
                }
                Ok(None)
            })();

            let _ = CloseClipboard();
            result
        }
    }

    /// Open→Empty→Set…→Close，持有剪贴板期间只做内存拷贝。
    pub(super) fn write_raw(entries: &[(RawFormat, Cow<'_, [u8]>)]) -> Result<(), ClipboardError> {
        let ids = entries
            .iter()
            .map(|(format, data)| format_id(*format).map(|id| (format.name(), id, data.as_ref())))
            .collect::<Result<Vec<_>, _>>()?;

        unsafe {
            OpenClipboard(None).map_err(|e| unavailable("打开剪贴板", "N/A", &e))?;

            if let Err(e) = EmptyClipboard() {
                let _ = CloseClipboard();
                return Err(unavailable("清空剪贴板", "N/A", &e));
            }

            for (name, id, data) in &ids {
                if let Err(err) = set_global_data(*id, name, data) {
                    let _ = CloseClipboard();
                    return Err(err);
                }
            }

            let _ = CloseClipboard();
        }

        Ok(())
    }

    unsafe fn set_global_data(format_id: u32, format_name: &str, data: &[u8]) -> Result<(), ClipboardError> {
        unsafe {
            let hglobal = GlobalAlloc(GMEM_MOVEABLE, data.len())
                .map_err(|e| unavailable("GlobalAlloc", format_name, &e))?;

            let ptr = GlobalLock(hglobal) as *mut u8;
            if ptr.is_null() {
                let _ = GlobalFree(Some(hglobal));
                return Err(ClipboardError::Unavailable("GlobalLock 返回空指针".to_string()));
            }

            copy_nonoverlapping(data.as_ptr(), ptr, data.len());
            let _ = GlobalUnlock(hglobal);

            if let Err(e) = SetClipboardData(format_id, Some(HANDLE(hglobal.0))) {
                let _ = GlobalFree(Some(hglobal));
                return Err(unavailable("SetClipboardData", format_name, &e));
            }
        }

        Ok(())
    }
}
