//! C ABI 接口
//!
//! 托管语言运行时通过这些函数管理句柄：
//!
//! | 函数 | 说明 |
//! |---|---|
//! | `audio_decoder_alloc` | 分配句柄，内存不足返回空指针 |
//! | `audio_decoder_sizeof` | 句柄字节大小 |
//! | `audio_decoder_free` | 释放句柄，空指针无操作 |
//! | `audio_decoder_get_output_info` | 读取输出格式/声道数/采样率，空指针安全 |
//! | `audio_decoder_init_file` / `_init_memory` / `_uninit` | 后端状态生命周期 |
//! | `audio_decoder_read_pcm_frames` / `_seek_to_pcm_frame` | 解码路径 |
//! | `audio_decoder_get_length_in_pcm_frames` / `_get_cursor_in_pcm_frames` | 位置查询 |
//!
//! 除前四个函数外，其余函数返回 [`result_codes`] 中的结果码。

use crate::audio::{Decoder, DecoderConfig};
use crate::error::{AudioError, ErrorCategory};
use crate::handle::{DecoderHandle, alloc_handle, free_handle, get_output_info};
use log::error;
use std::ffi::{CStr, c_char, c_int, c_void};
use std::ptr;

/// 结果码定义（数值沿用经典C解码库的约定）
pub mod result_codes {
    use std::ffi::c_int;

    pub const SUCCESS: c_int = 0;
    /// 通用错误
    pub const ERROR: c_int = -1;
    /// 空指针或参数非法
    pub const INVALID_ARGS: c_int = -2;
    pub const OUT_OF_MEMORY: c_int = -4;
    pub const IO_ERROR: c_int = -5;
    /// 无法识别或损坏的音频数据
    pub const INVALID_FILE: c_int = -10;
    pub const DECODE_ERROR: c_int = -11;
    /// 句柄未持有后端状态
    pub const NOT_INITIALIZED: c_int = -12;
    /// 流结束，本次没有读到任何帧
    pub const AT_END: c_int = -17;
}

use result_codes::*;

/// 错误类别到结果码的映射
pub fn result_code(err: &AudioError) -> c_int {
    match ErrorCategory::from_audio_error(err) {
        ErrorCategory::Input => INVALID_ARGS,
        ErrorCategory::Io => IO_ERROR,
        ErrorCategory::Format => INVALID_FILE,
        ErrorCategory::Decoding => DECODE_ERROR,
        ErrorCategory::Memory => OUT_OF_MEMORY,
    }
}

fn report(context: &str, err: AudioError) -> c_int {
    error!("{context}: {err}");
    result_code(&err)
}

/// 取出已初始化句柄的后端状态
///
/// # Safety
///
/// `handle` 必须为空，或指向有效的句柄内存且当前没有其他引用。
unsafe fn decoder_from<'a>(handle: *mut DecoderHandle) -> Result<&'a mut Decoder, c_int> {
    // SAFETY: 由调用方保证
    let handle = unsafe { handle.as_mut() }.ok_or(INVALID_ARGS)?;
    handle.decoder_mut().ok_or(NOT_INITIALIZED)
}

// ====================================================================
// 句柄内存管理
// ====================================================================

/// 分配一个句柄（内存已清零），内存不足返回空指针
#[unsafe(no_mangle)]
pub extern "C" fn audio_decoder_alloc() -> *mut DecoderHandle {
    match alloc_handle() {
        Some(handle) => handle.as_ptr(),
        None => {
            error!("句柄分配失败: 内存不足");
            ptr::null_mut()
        }
    }
}

/// 句柄字节大小，供在自有内存中嵌入句柄的调用方使用
#[unsafe(no_mangle)]
pub extern "C" fn audio_decoder_sizeof() -> usize {
    DecoderHandle::size()
}

/// 释放句柄；空指针为无操作
///
/// # Safety
///
/// `handle` 必须为空，或是 `audio_decoder_alloc` 返回且尚未释放的指针。
/// 重复释放、释放非本库分配的指针均为未定义行为。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_decoder_free(handle: *mut DecoderHandle) {
    // SAFETY: 由调用方保证
    unsafe { free_handle(handle) };
}

/// 读取句柄的输出格式、声道数与采样率
///
/// 句柄为空时什么都不写；为空的输出槽被跳过。
///
/// # Safety
///
/// 非空指针必须指向有效、可写（输出槽）的内存。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_decoder_get_output_info(
    handle: *const DecoderHandle,
    format: *mut u32,
    channels: *mut u32,
    sample_rate: *mut u32,
) {
    // SAFETY: 由调用方保证非空指针有效；空指针经 as_ref/as_mut 变为 None
    unsafe {
        get_output_info(
            handle.as_ref(),
            format.as_mut(),
            channels.as_mut(),
            sample_rate.as_mut(),
        );
    }
}

// ====================================================================
// 后端状态生命周期
// ====================================================================

/// 用文件初始化句柄
///
/// `format`/`channels`/`sample_rate` 为0表示沿用原生参数。
/// 初始化会直接覆盖句柄内容：对已初始化的句柄应先调用 `audio_decoder_uninit`。
///
/// # Safety
///
/// `handle` 必须指向至少 `audio_decoder_sizeof()` 字节的可写内存；
/// `path` 必须是以NUL结尾的UTF-8字符串。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_decoder_init_file(
    handle: *mut DecoderHandle,
    path: *const c_char,
    format: u32,
    channels: u32,
    sample_rate: u32,
) -> c_int {
    if handle.is_null() || path.is_null() {
        return INVALID_ARGS;
    }

    // SAFETY: 非空且由调用方保证以NUL结尾
    let Ok(path) = unsafe { CStr::from_ptr(path) }.to_str() else {
        error!("init_file: 路径不是合法的UTF-8");
        return INVALID_ARGS;
    };

    match DecoderConfig::from_raw(format, channels, sample_rate)
        .and_then(|config| Decoder::from_file(path, &config))
    {
        Ok(decoder) => {
            // SAFETY: 非空，内存由调用方保证
            unsafe { DecoderHandle::init_in_place(handle, decoder) };
            SUCCESS
        }
        Err(e) => report(&format!("init_file失败 ({path})"), e),
    }
}

/// 用内存数据初始化句柄（数据会被复制，调用返回后即可释放）
///
/// # Safety
///
/// `handle` 同 `audio_decoder_init_file`；`data` 必须指向 `data_len` 字节的可读内存。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_decoder_init_memory(
    handle: *mut DecoderHandle,
    data: *const u8,
    data_len: usize,
    format: u32,
    channels: u32,
    sample_rate: u32,
) -> c_int {
    if handle.is_null() || data.is_null() || data_len == 0 {
        return INVALID_ARGS;
    }

    // SAFETY: 非空，长度由调用方保证
    let bytes = unsafe { std::slice::from_raw_parts(data, data_len) }.to_vec();

    match DecoderConfig::from_raw(format, channels, sample_rate)
        .and_then(|config| Decoder::from_memory(bytes, &config))
    {
        Ok(decoder) => {
            // SAFETY: 非空，内存由调用方保证
            unsafe { DecoderHandle::init_in_place(handle, decoder) };
            SUCCESS
        }
        Err(e) => report("init_memory失败", e),
    }
}

/// 释放句柄的后端状态（句柄内存本身保留）
///
/// # Safety
///
/// `handle` 必须为空，或是已分配/已初始化的句柄。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_decoder_uninit(handle: *mut DecoderHandle) -> c_int {
    // SAFETY: 由调用方保证
    match unsafe { handle.as_mut() } {
        Some(handle) => {
            handle.uninit();
            SUCCESS
        }
        None => INVALID_ARGS,
    }
}

// ====================================================================
// 解码路径
// ====================================================================

/// 读取PCM帧
///
/// `frames_out` 为空时丢弃相应帧数（用于快进）。
/// 一帧都没读到时返回 `AT_END`。
///
/// # Safety
///
/// `frames_out` 非空时必须至少有 `frame_count × 每帧字节数` 的可写空间；
/// `frames_read` 可为空。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_decoder_read_pcm_frames(
    handle: *mut DecoderHandle,
    frames_out: *mut c_void,
    frame_count: u64,
    frames_read: *mut u64,
) -> c_int {
    // SAFETY: 可为空，非空时由调用方保证可写
    let mut frames_read = unsafe { frames_read.as_mut() };
    if let Some(frames_read) = frames_read.as_deref_mut() {
        *frames_read = 0;
    }

    // SAFETY: 由调用方保证
    let decoder = match unsafe { decoder_from(handle) } {
        Ok(decoder) => decoder,
        Err(code) => return code,
    };

    if frame_count == 0 {
        return SUCCESS;
    }

    let result = if frames_out.is_null() {
        decoder.discard_frames(frame_count)
    } else {
        let frame_bytes = decoder.output_info().bytes_per_frame();
        let Some(len) = usize::try_from(frame_count)
            .ok()
            .and_then(|count| count.checked_mul(frame_bytes))
        else {
            return INVALID_ARGS;
        };
        // SAFETY: 长度由调用方保证
        let out = unsafe { std::slice::from_raw_parts_mut(frames_out.cast::<u8>(), len) };
        decoder.read_pcm_frames(out).map(|read| read as u64)
    };

    match result {
        Ok(0) => AT_END,
        Ok(read) => {
            if let Some(frames_read) = frames_read {
                *frames_read = read;
            }
            SUCCESS
        }
        Err(e) => report("read_pcm_frames失败", e),
    }
}

/// 定位到指定帧
///
/// # Safety
///
/// `handle` 必须为空，或是已分配/已初始化的句柄。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_decoder_seek_to_pcm_frame(
    handle: *mut DecoderHandle,
    frame_index: u64,
) -> c_int {
    // SAFETY: 由调用方保证
    let decoder = match unsafe { decoder_from(handle) } {
        Ok(decoder) => decoder,
        Err(code) => return code,
    };

    match decoder.seek_to_pcm_frame(frame_index) {
        Ok(()) => SUCCESS,
        Err(e) => report(&format!("seek到帧{frame_index}失败"), e),
    }
}

/// 总帧数；容器未声明长度时写入0
///
/// # Safety
///
/// `length` 必须非空且可写。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_decoder_get_length_in_pcm_frames(
    handle: *mut DecoderHandle,
    length: *mut u64,
) -> c_int {
    // SAFETY: 由调用方保证
    let Some(length) = (unsafe { length.as_mut() }) else {
        return INVALID_ARGS;
    };
    *length = 0;

    // SAFETY: 由调用方保证
    match unsafe { decoder_from(handle) } {
        Ok(decoder) => {
            *length = decoder.length_in_pcm_frames().unwrap_or(0);
            SUCCESS
        }
        Err(code) => code,
    }
}

/// 当前读取位置（帧）
///
/// # Safety
///
/// `cursor` 必须非空且可写。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_decoder_get_cursor_in_pcm_frames(
    handle: *mut DecoderHandle,
    cursor: *mut u64,
) -> c_int {
    // SAFETY: 由调用方保证
    let Some(cursor) = (unsafe { cursor.as_mut() }) else {
        return INVALID_ARGS;
    };
    *cursor = 0;

    // SAFETY: 由调用方保证
    match unsafe { decoder_from(handle) } {
        Ok(decoder) => {
            *cursor = decoder.cursor_in_pcm_frames();
            SUCCESS
        }
        Err(code) => code,
    }
}
