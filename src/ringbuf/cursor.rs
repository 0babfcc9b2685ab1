use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

/// The size of the writer region in bytes.
pub const WRITER_REGION_LEN: usize = 8;

/// The size of the reader region in bytes.
pub const READER_REGION_LEN: usize = 4;

/// The cursors owned by the writer side.
///
/// ## The underlying structure
///
/// ```text
/// writer_pos_ptr      watermark_pos_ptr
///     |                   |
///     v                   v
///     +-------------------+-------------------+
///     | writer_pos        | watermark_pos     |
///     +-------------------+-------------------+
///     | 4 bytes, LE       | 4 bytes, LE       |
///     +-------------------+-------------------+
/// ```
#[derive(Copy, Clone, Debug)]
pub struct WriterCursor {
    /// The raw pointer to writer_pos, which is the next write position.
    writer_pos_ptr: *mut u32,

    /// The raw pointer to watermark_pos, which is the end of the data
    /// written before the last wraparound.
    watermark_pos_ptr: *mut u32,
}

impl WriterCursor {
    /// Create a new instance of `WriterCursor`.
    ///
    /// # Safety
    /// The `region_ptr` must be a valid, 4-byte aligned pointer to at least
    /// [WRITER_REGION_LEN] bytes that outlive the cursor.
    pub unsafe fn new(region_ptr: *mut u8) -> Self {
        let writer_pos_ptr = region_ptr as *mut u32;
        let watermark_pos_ptr = unsafe { writer_pos_ptr.add(1) };

        Self {
            writer_pos_ptr,
            watermark_pos_ptr,
        }
    }

    pub fn writer_pos(&self) -> u32 {
        unsafe { load(self.writer_pos_ptr) }
    }

    pub fn set_writer_pos(&self, pos: u32) {
        unsafe { store(self.writer_pos_ptr, pos) }
    }

    pub fn watermark_pos(&self) -> u32 {
        unsafe { load(self.watermark_pos_ptr) }
    }

    pub fn set_watermark_pos(&self, pos: u32) {
        unsafe { store(self.watermark_pos_ptr, pos) }
    }
}

/// The cursor owned by the reader side.
///
/// ```text
///     +-------------------+
///     | reader_pos        |
///     +-------------------+
///     | 4 bytes, LE       |
///     +-------------------+
/// ```
#[derive(Copy, Clone, Debug)]
pub struct ReaderCursor {
    reader_pos_ptr: *mut u32,
}

impl ReaderCursor {
    /// Create a new instance of `ReaderCursor`.
    ///
    /// # Safety
    /// The `region_ptr` must be a valid, 4-byte aligned pointer to at least
    /// [READER_REGION_LEN] bytes that outlive the cursor.
    pub unsafe fn new(region_ptr: *mut u8) -> Self {
        Self {
            reader_pos_ptr: region_ptr as *mut u32,
        }
    }

    pub fn reader_pos(&self) -> u32 {
        unsafe { load(self.reader_pos_ptr) }
    }

    pub fn set_reader_pos(&self, pos: u32) {
        unsafe { store(self.reader_pos_ptr, pos) }
    }
}

// The words are little-endian in shared memory whatever the host order is.
unsafe fn load(ptr: *mut u32) -> u32 {
    let atomic = unsafe { AtomicU32::from_ptr(ptr) };
    u32::from_le(atomic.load(Ordering::Acquire))
}

unsafe fn store(ptr: *mut u32, value: u32) {
    let atomic = unsafe { AtomicU32::from_ptr(ptr) };
    atomic.store(value.to_le(), Ordering::Release);
}
