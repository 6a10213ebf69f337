use std::collections::TryReserveError;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::gpu::driver::types::Format;

#[derive(Debug, thiserror::Error)]
pub enum GPUError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("out of range: {0}")]
    OutOfRange(String),
    #[error("unsupported format {0:?}")]
    UnsupportedFormat(Format),
    #[error("out of memory")]
    OutOfMemory,
    #[error("timed out waiting for the GPU")]
    Timeout,
    #[error("backend error: {0}")]
    Backend(String),
    #[cfg(feature = "vulkan")]
    #[error("Vulkan Error: {0}")]
    Vulkan(ash::vk::Result),
}

pub type Result<T, E = GPUError> = std::result::Result<T, E>;

/// Coarse error classes stored in the process-wide last-error slot.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    None = 0,
    PermissionDenied = 1,
    NotFound = 2,
    InvalidArgument = 3,
    OutOfRange = 4,
    UnsupportedFormat = 5,
    OutOfMemory = 6,
    Timeout = 7,
    Backend = 8,
}

impl ErrorCode {
    fn from_raw(raw: u32) -> Self {
        match raw {
            1 => ErrorCode::PermissionDenied,
            2 => ErrorCode::NotFound,
            3 => ErrorCode::InvalidArgument,
            4 => ErrorCode::OutOfRange,
            5 => ErrorCode::UnsupportedFormat,
            6 => ErrorCode::OutOfMemory,
            7 => ErrorCode::Timeout,
            8 => ErrorCode::Backend,
            _ => ErrorCode::None,
        }
    }
}

static LAST_ERROR: AtomicU32 = AtomicU32::new(ErrorCode::None as u32);

/// Code of the most recent error returned by a recorder or device entry point.
pub fn last_error() -> ErrorCode {
    ErrorCode::from_raw(LAST_ERROR.load(Ordering::Acquire))
}

pub fn clear_last_error() {
    LAST_ERROR.store(ErrorCode::None as u32, Ordering::Release);
}

impl GPUError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GPUError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            GPUError::NotFound(_) => ErrorCode::NotFound,
            GPUError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            GPUError::OutOfRange(_) => ErrorCode::OutOfRange,
            GPUError::UnsupportedFormat(_) => ErrorCode::UnsupportedFormat,
            GPUError::OutOfMemory => ErrorCode::OutOfMemory,
            GPUError::Timeout => ErrorCode::Timeout,
            GPUError::Backend(_) => ErrorCode::Backend,
            #[cfg(feature = "vulkan")]
            GPUError::Vulkan(_) => ErrorCode::Backend,
        }
    }

    /// Stores the error code in the last-error slot and logs the message.
    pub fn recorded(self) -> Self {
        LAST_ERROR.store(self.code() as u32, Ordering::Release);
        log::error!(target: "strata::render", "{}", self);
        self
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        GPUError::PermissionDenied(msg.into()).recorded()
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        GPUError::NotFound(msg.into()).recorded()
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        GPUError::InvalidArgument(msg.into()).recorded()
    }

    pub fn out_of_range(msg: impl Into<String>) -> Self {
        GPUError::OutOfRange(msg.into()).recorded()
    }

    pub fn unsupported_format(format: Format) -> Self {
        GPUError::UnsupportedFormat(format).recorded()
    }

    pub fn out_of_memory() -> Self {
        GPUError::OutOfMemory.recorded()
    }

    pub fn timeout() -> Self {
        GPUError::Timeout.recorded()
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        GPUError::Backend(msg.into()).recorded()
    }
}

impl From<TryReserveError> for GPUError {
    fn from(_: TryReserveError) -> Self {
        GPUError::out_of_memory()
    }
}

impl From<smallvec::CollectionAllocErr> for GPUError {
    fn from(_: smallvec::CollectionAllocErr) -> Self {
        GPUError::out_of_memory()
    }
}

#[cfg(feature = "vulkan")]
impl From<ash::vk::Result> for GPUError {
    fn from(res: ash::vk::Result) -> Self {
        match res {
            ash::vk::Result::ERROR_OUT_OF_HOST_MEMORY
            | ash::vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
            | ash::vk::Result::ERROR_OUT_OF_POOL_MEMORY => GPUError::out_of_memory(),
            ash::vk::Result::TIMEOUT => GPUError::timeout(),
            _ => GPUError::Vulkan(res).recorded(),
        }
    }
}
