//! Engine output capture buffer.

use std::ffi::{c_char, c_int};
use std::ptr::NonNull;

/// Byte buffer registered with the engine through `engOutputBuffer`.
///
/// The engine writes a NUL-terminated transcript of the most recent command
/// into it. The allocation is `capacity + 1` bytes and never moves while the
/// buffer lives, so the pointer handed to the engine stays valid until the
/// buffer is dropped. Resizing means building a new buffer and replacing the
/// old one; a capacity of 0 means no buffer and no capture.
#[derive(Debug)]
pub struct OutputBuffer {
    data: Option<NonNull<u8>>,
    capacity: usize,
}

// SAFETY: the allocation is uniquely owned; the engine only writes to it
// during calls made through the owning session.
unsafe impl Send for OutputBuffer {}

impl OutputBuffer {
    /// Allocate a buffer able to hold `capacity` bytes of output.
    pub fn with_capacity(capacity: usize) -> Self {
        if capacity == 0 {
            return Self::disabled();
        }

        let storage = vec![0u8; capacity + 1].into_boxed_slice();
        let data = NonNull::new(Box::into_raw(storage) as *mut u8);
        Self { data, capacity }
    }

    /// A buffer that captures nothing.
    pub fn disabled() -> Self {
        Self {
            data: None,
            capacity: 0,
        }
    }

    /// Capacity in bytes (0 when disabled).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether output is captured.
    pub fn is_enabled(&self) -> bool {
        self.data.is_some()
    }

    /// Pointer handed to `engOutputBuffer` (null when disabled).
    pub fn as_native_ptr(&self) -> *mut c_char {
        self.data
            .map(|data| data.as_ptr() as *mut c_char)
            .unwrap_or(std::ptr::null_mut())
    }

    /// Length handed to `engOutputBuffer`.
    pub fn native_len(&self) -> c_int {
        c_int::try_from(self.capacity).unwrap_or(c_int::MAX)
    }

    /// Text up to the first NUL.
    pub fn contents(&self) -> String {
        let Some(data) = self.data else {
            return String::new();
        };

        // SAFETY: `data` points to `capacity + 1` initialised bytes owned by
        // this buffer; no engine call is in flight while `&self` is held.
        let bytes = unsafe { std::slice::from_raw_parts(data.as_ptr(), self.capacity + 1) };
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(self.capacity);
        String::from_utf8_lossy(&bytes[..end]).into_owned()
    }

    /// Forget the previous transcript.
    pub fn clear(&mut self) {
        if let Some(data) = self.data {
            // SAFETY: the first byte is always inside the allocation.
            unsafe { *data.as_ptr() = 0 };
        }
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::with_capacity(matlab_mcp_core::config::DEFAULT_OUTPUT_BUFFER_SIZE)
    }
}

impl Drop for OutputBuffer {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            // SAFETY: reconstructs the boxed slice leaked in `with_capacity`.
            let slice = std::ptr::slice_from_raw_parts_mut(data.as_ptr(), self.capacity + 1);
            drop(unsafe { Box::from_raw(slice) });
        }
    }
}
