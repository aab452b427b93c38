//! 解码器句柄管理
//!
//! 句柄是一块固定大小的不透明内存：三个输出字段加一个指向解码后端状态的指针。
//! 内存来自宿主分配器（`calloc`/`free`），因此可以把裸指针交给其他语言的运行时，
//! 也可以由调用方按 [`DecoderHandle::size`] 在自己的内存里预留。
//!
//! 两层接口：
//! - 裸接口：[`alloc_handle`] / [`free_handle`] / [`get_output_info`]，空指针安全
//! - 所有权接口：[`DecoderBox`]，析构时保证释放，并保留裸指针出口
//!
//! 句柄不做有效性追踪：非本模块分配的指针、重复释放均为未定义行为。

use crate::audio::{Decoder, DecoderConfig, OutputInfo, SampleFormat};
use crate::error::{AudioError, AudioResult};
use log::debug;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::ptr::{self, NonNull};

/// 不透明解码器句柄
///
/// 输出字段以原始 `u32` 存放，因为句柄内存可能由外部写入，
/// 读取时不能假定其中是合法的枚举值。
#[repr(C)]
pub struct DecoderHandle {
    output_format: u32,
    output_channels: u32,
    output_sample_rate: u32,
    decoder: Option<Box<Decoder>>,
}

// 宿主分配器至少保证指针对齐
const _: () = assert!(mem::align_of::<DecoderHandle>() <= mem::align_of::<usize>());

impl DecoderHandle {
    /// 句柄字节大小（运行期查询，同一构建内恒定）
    #[inline]
    pub const fn size() -> usize {
        mem::size_of::<Self>()
    }

    /// 在原地完成初始化
    ///
    /// 直接覆盖目标内存，不读取也不释放其旧内容。
    /// 若目标句柄此前已初始化且未调用 uninit，旧的后端状态会泄漏。
    ///
    /// # Safety
    ///
    /// `this` 必须非空、按 `DecoderHandle` 对齐，且至少有 [`DecoderHandle::size`] 字节可写。
    pub unsafe fn init_in_place(this: *mut Self, decoder: Decoder) {
        let info = decoder.output_info();
        let handle = Self {
            output_format: info.format.as_raw(),
            output_channels: info.channels,
            output_sample_rate: info.sample_rate,
            decoder: Some(Box::new(decoder)),
        };
        // SAFETY: 由调用方保证目标内存可写且对齐
        unsafe { ptr::write(this, handle) };
    }

    /// 已初始化的句柄替换后端状态（旧状态先释放）
    pub fn init(&mut self, decoder: Decoder) {
        self.uninit();
        let info = decoder.output_info();
        self.output_format = info.format.as_raw();
        self.output_channels = info.channels;
        self.output_sample_rate = info.sample_rate;
        self.decoder = Some(Box::new(decoder));
    }

    /// 释放后端状态，输出字段保持最后一次协商的值
    pub fn uninit(&mut self) {
        if self.decoder.take().is_some() {
            debug!("解码器后端状态已释放");
        }
    }

    /// 是否持有后端状态
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.decoder.is_some()
    }

    pub fn decoder(&self) -> Option<&Decoder> {
        self.decoder.as_deref()
    }

    pub fn decoder_mut(&mut self) -> Option<&mut Decoder> {
        self.decoder.as_deref_mut()
    }

    /// 原始输出字段快照 `(format, channels, sample_rate)`
    #[inline]
    pub fn raw_output_info(&self) -> (u32, u32, u32) {
        (
            self.output_format,
            self.output_channels,
            self.output_sample_rate,
        )
    }

    /// 类型化输出信息；无法识别的格式编号映射为 [`SampleFormat::Unknown`]
    pub fn output_info(&self) -> OutputInfo {
        OutputInfo {
            format: SampleFormat::from_raw(self.output_format).unwrap_or_default(),
            channels: self.output_channels,
            sample_rate: self.output_sample_rate,
        }
    }
}

/// 分配一个句柄
///
/// 内存由 `calloc` 提供并清零：未初始化时查询得到 `(0, 0, 0)`，后端指针为空。
/// 分配失败返回 `None`。
pub fn alloc_handle() -> Option<NonNull<DecoderHandle>> {
    // SAFETY: calloc 对任意尺寸都是安全调用，失败返回空指针
    let raw = unsafe { libc::calloc(1, DecoderHandle::size()) };
    NonNull::new(raw.cast::<DecoderHandle>())
}

/// 释放句柄；空指针为无操作
///
/// 若句柄仍持有后端状态，先释放后端状态再归还内存。
///
/// # Safety
///
/// `handle` 必须为空，或是 [`alloc_handle`] 返回且尚未释放的指针。
pub unsafe fn free_handle(handle: *mut DecoderHandle) {
    let Some(mut handle) = NonNull::new(handle) else {
        return;
    };

    // SAFETY: 由调用方保证指针来自 alloc_handle（清零内存，或已经被 init 写入）
    unsafe {
        handle.as_mut().uninit();
        libc::free(handle.as_ptr().cast());
    }
}

/// 读取句柄的已协商输出参数
///
/// 句柄为 `None` 时不写任何输出；为 `None` 的输出槽被跳过，不会被解引用。
pub fn get_output_info(
    handle: Option<&DecoderHandle>,
    format: Option<&mut u32>,
    channels: Option<&mut u32>,
    sample_rate: Option<&mut u32>,
) {
    let Some(handle) = handle else {
        return;
    };

    if let Some(format) = format {
        *format = handle.output_format;
    }
    if let Some(channels) = channels {
        *channels = handle.output_channels;
    }
    if let Some(sample_rate) = sample_rate {
        *sample_rate = handle.output_sample_rate;
    }
}

/// 拥有所有权的句柄
///
/// 构造即分配，析构即释放（包括后端状态）。
/// 通过 [`as_ptr`](Self::as_ptr) / [`into_raw`](Self::into_raw) 把同一块内存交给FFI调用方。
pub struct DecoderBox {
    ptr: NonNull<DecoderHandle>,
}

// 句柄独占其内存，后端状态（symphonia读取器与解码器）均为 Send
unsafe impl Send for DecoderBox {}

impl DecoderBox {
    /// 分配一个未初始化的句柄
    pub fn try_new() -> AudioResult<Self> {
        alloc_handle()
            .map(|ptr| Self { ptr })
            .ok_or(AudioError::OutOfMemory)
    }

    /// 分配并用文件初始化
    pub fn open_file<P: AsRef<Path>>(path: P, config: &DecoderConfig) -> AudioResult<Self> {
        let decoder = Decoder::from_file(path, config)?;
        let mut handle = Self::try_new()?;
        handle.init(decoder);
        Ok(handle)
    }

    /// 分配并用内存数据初始化
    pub fn open_memory(data: Vec<u8>, config: &DecoderConfig) -> AudioResult<Self> {
        let decoder = Decoder::from_memory(data, config)?;
        let mut handle = Self::try_new()?;
        handle.init(decoder);
        Ok(handle)
    }

    /// 裸指针（所有权不转移）
    #[inline]
    pub fn as_ptr(&self) -> *mut DecoderHandle {
        self.ptr.as_ptr()
    }

    /// 交出所有权，之后需由 [`free_handle`] 或 [`DecoderBox::from_raw`] 回收
    pub fn into_raw(self) -> *mut DecoderHandle {
        let ptr = self.ptr.as_ptr();
        mem::forget(self);
        ptr
    }

    /// 接管裸指针；空指针返回 `None`
    ///
    /// # Safety
    ///
    /// `ptr` 必须来自 [`alloc_handle`] / [`DecoderBox::into_raw`]，且没有其他所有者。
    pub unsafe fn from_raw(ptr: *mut DecoderHandle) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr })
    }
}

impl Deref for DecoderBox {
    type Target = DecoderHandle;

    fn deref(&self) -> &DecoderHandle {
        // SAFETY: ptr 来自 calloc，内容要么是全零（合法的空句柄），要么已被 init 写入
        unsafe { self.ptr.as_ref() }
    }
}

impl DerefMut for DecoderBox {
    fn deref_mut(&mut self) -> &mut DecoderHandle {
        // SAFETY: 同上，且 DecoderBox 独占该内存
        unsafe { self.ptr.as_mut() }
    }
}

impl Drop for DecoderBox {
    fn drop(&mut self) {
        // SAFETY: ptr 由本实例独占，且只会释放一次
        unsafe { free_handle(self.ptr.as_ptr()) };
    }
}
