pub mod cursor;

use std::ptr;

use cursor::ReaderCursor;
use cursor::WriterCursor;
use cursor::READER_REGION_LEN;
use cursor::WRITER_REGION_LEN;
use snafu::ensure;
use snafu::ResultExt;
use tracing::info;
use tracing::warn;

use crate::convert_num;
use crate::error;
use crate::error::Result;
use crate::record::Record;
use crate::record::DATA_BLOCK_SIZE;
use crate::shm::ShmRegion;

// Unit is byte.
const BLOCK: u32 = DATA_BLOCK_SIZE as u32;

/// A single slot cannot tell a full ring from an empty one.
pub const MIN_SIZE: usize = 2 * DATA_BLOCK_SIZE;

/// A single-producer/single-consumer ring buffer of fixed-size records,
/// spread over three shared memory regions.
///
/// ## The underlying structure
///
/// ```text
///  <name>           0                                            size
///                   +-------+-------+-------+-----+-------+------+
///                   | slot  | slot  | slot  | ... | slot  | rest |
///                   +-------+-------+-------+-----+-------+------+
///                   | 16 bytes each, the rest is never used      |
///
///  <name>-writer    +----------------+----------------+
///                   | writer_pos     | watermark_pos  |
///                   +----------------+----------------+
///
///  <name>-reader    +----------------+
///                   | reader_pos     |
///                   +----------------+
/// ```
///
/// The writer owns `writer_pos` and `watermark_pos`, the reader owns
/// `reader_pos`. Each side only reads the cursors of the other one.
///
/// When the writer runs out of room at the end of the data region it wraps
/// to offset 0 and stores the end of the previous lap in `watermark_pos`, so
/// that the reader knows where the tail of that lap stops.
///
/// `writer_pos == reader_pos < watermark_pos` always means that the writer
/// filled the new lap up to a reader still on the tail: the ring is full.
/// The writer drops the watermark as soon as the reader has left the tail,
/// and the reader never catches up with the writer while the watermark is
/// still up. The record that would bring it level waits for the next put.
pub struct RingBuffer {
    /// The data region, organized as `size / 16` slots.
    data: ShmRegion,

    /// The region behind [WriterCursor], kept alive for the cursor.
    writer_region: ShmRegion,

    /// The region behind [ReaderCursor], kept alive for the cursor.
    reader_region: ShmRegion,

    writer: WriterCursor,

    reader: ReaderCursor,

    /// The size of the data region in bytes.
    size: u32,
}

unsafe impl Send for RingBuffer {}

impl RingBuffer {
    /// Creates the three regions of a new ring buffer and attaches to them,
    /// or attaches to existing ones when `create` is false. `size` is only
    /// used when creating.
    pub fn new(name: &str, size: usize, create: bool) -> Result<Self> {
        if create {
            Self::create(name, size)
        } else {
            Self::attach(name)
        }
    }

    /// Creates the three regions of a new ring buffer. All cursors start at
    /// zero.
    ///
    /// Fails if any of the regions already exists. Regions created by this
    /// call are removed again before the error is returned.
    pub fn create(name: &str, size: usize) -> Result<Self> {
        ensure!(
            size >= MIN_SIZE,
            error::InvalidParameterSnafu {
                detail: format!(
                    "The size {} is smaller than two records ({} bytes).",
                    size, MIN_SIZE
                ),
            }
        );
        let size_u32 = convert_num!(size, u32)?;

        let data = ShmRegion::create(name, size)?;

        let writer_name = writer_region_name(name);
        let writer_region =
            match ShmRegion::create(&writer_name, WRITER_REGION_LEN) {
                Ok(region) => region,
                Err(e) => {
                    unlink_quietly(&[name]);
                    return Err(e);
                }
            };

        let reader_name = reader_region_name(name);
        let reader_region =
            match ShmRegion::create(&reader_name, READER_REGION_LEN) {
                Ok(region) => region,
                Err(e) => {
                    unlink_quietly(&[name, &writer_name]);
                    return Err(e);
                }
            };

        info!(
            "created ring buffer {}, size: {}, capacity: {} records",
            name,
            size,
            size / DATA_BLOCK_SIZE
        );

        // The regions are zero-filled by ftruncate, so are the cursors.
        Ok(Self::build(data, writer_region, reader_region, size_u32))
    }

    /// Attaches to the three regions of an existing ring buffer. The size
    /// is the size of the existing data region.
    ///
    /// Does not modify the cursors nor the data.
    pub fn attach(name: &str) -> Result<Self> {
        let data = ShmRegion::open(name)?;
        let writer_region = ShmRegion::open(&writer_region_name(name))?;
        let reader_region = ShmRegion::open(&reader_region_name(name))?;

        ensure!(
            writer_region.len() >= WRITER_REGION_LEN
                && reader_region.len() >= READER_REGION_LEN,
            error::InvalidParameterSnafu {
                detail: format!(
                    "Cursor regions of {} too small, writer: {}, reader: {}.",
                    name,
                    writer_region.len(),
                    reader_region.len()
                ),
            }
        );

        let size = convert_num!(data.len(), u32)?;

        info!("attached to ring buffer {}, size: {}", name, size);

        Ok(Self::build(data, writer_region, reader_region, size))
    }

    fn build(
        data: ShmRegion,
        writer_region: ShmRegion,
        reader_region: ShmRegion,
        size: u32,
    ) -> Self {
        // The mappings are page aligned and live as long as the cursors.
        let writer = unsafe { WriterCursor::new(writer_region.as_ptr()) };
        let reader = unsafe { ReaderCursor::new(reader_region.as_ptr()) };

        RingBuffer {
            data,
            writer_region,
            reader_region,
            writer,
            reader,
            size,
        }
    }

    /// Writes a record into the next slot and advances the writer cursor.
    ///
    /// Fails with [error::Error::ReaderCollision] if the slot still holds
    /// data the reader has not consumed. The record is not written in that
    /// case.
    pub fn put(&mut self, record: &Record) -> Result<()> {
        let writer_pos = self.writer_pos();
        let reader_pos = self.reader_pos();
        let mut watermark_pos = self.watermark_pos();

        // 1. drop a watermark the reader has already left behind.
        if watermark_pos > writer_pos
            && (reader_pos < writer_pos || watermark_pos <= reader_pos)
        {
            self.writer.set_watermark_pos(writer_pos);
            watermark_pos = writer_pos;
        }

        // 2. pick the slot.
        let wrap = self.wrap_around(writer_pos);
        let start = if wrap { 0 } else { writer_pos };
        let end = start + BLOCK;

        // 3. make sure the reader is not in the way.
        ensure!(
            !overtaking_read(start, reader_pos, watermark_pos, self.size),
            error::ReaderCollisionSnafu {
                reader_pos,
                start,
                end,
            }
        );

        // 4. copy the record.
        unsafe {
            let dst = self.data.as_ptr().add(start as usize);
            ptr::copy_nonoverlapping(record.as_ptr(), dst, DATA_BLOCK_SIZE);
        }

        // 5. publish it. The two stores are not atomic as a pair, the reader
        // loads the writer cursor first and the watermark second.
        if wrap {
            // Nothing left behind when the reader caught up with the lap.
            let watermark = if reader_pos == writer_pos {
                end
            } else {
                writer_pos
            };
            self.writer.set_watermark_pos(watermark);
            self.writer.set_writer_pos(end);
        } else {
            self.writer.set_writer_pos(end);
            if watermark_pos < end {
                self.writer.set_watermark_pos(end);
            }
        }

        Ok(())
    }

    /// Reads the next record and advances the reader cursor.
    ///
    /// Fails with [error::Error::WriterCollision] if no fully written record
    /// is available. Nothing is modified in that case.
    pub fn get(&mut self) -> Result<Record> {
        let rpos = self.reader_pos();
        let wpos = self.writer_pos();
        let wmpos = self.watermark_pos();

        // Set while the writer does not know yet that the reader has left
        // the tail. Reaching the writer cursor now would look like a full
        // ring, so the record that would get us there is held back.
        let stale = wmpos > wpos;

        let (start, next_reader_pos) = if wpos < rpos
            || (wpos == rpos && rpos < wmpos)
        {
            // The writer has wrapped, the reader is on the tail of the
            // previous lap.
            if wmpos.saturating_sub(rpos) >= BLOCK {
                (rpos, rpos + BLOCK)
            } else if wpos > BLOCK || (wpos == BLOCK && !stale) {
                // The tail is exhausted, jump to the new lap.
                (0, BLOCK)
            } else {
                return error::WriterCollisionSnafu {
                    writer_pos: wpos,
                    start: 0u32,
                    end: BLOCK,
                }
                .fail();
            }
        } else {
            let available = wpos - rpos;
            ensure!(
                available > BLOCK || (available == BLOCK && !stale),
                error::WriterCollisionSnafu {
                    writer_pos: wpos,
                    start: rpos,
                    end: rpos + BLOCK,
                }
            );
            (rpos, rpos + BLOCK)
        };

        // Only a peer that does not follow the protocol can get us here.
        ensure!(
            start as u64 + BLOCK as u64 <= self.size as u64,
            error::InvalidParameterSnafu {
                detail: format!(
                    "Reader cursor {} is out of the data region of {} bytes.",
                    start, self.size
                ),
            }
        );

        let mut record = [0u8; DATA_BLOCK_SIZE];
        unsafe {
            let src = self.data.as_ptr().add(start as usize);
            ptr::copy_nonoverlapping(src, record.as_mut_ptr(), DATA_BLOCK_SIZE);
        }

        self.reader.set_reader_pos(next_reader_pos);

        Ok(record)
    }

    /// Get the writer cursor, which is the end of the last written record.
    pub fn writer_pos(&self) -> u32 {
        self.writer.writer_pos()
    }

    /// Get the watermark, which is the end of the valid data before the last
    /// wraparound.
    pub fn watermark_pos(&self) -> u32 {
        self.writer.watermark_pos()
    }

    /// Get the reader cursor, which is the start of the next record to read.
    pub fn reader_pos(&self) -> u32 {
        self.reader.reader_pos()
    }

    /// Get the size of the data region in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Get the number of slots in the data region.
    pub fn capacity(&self) -> u32 {
        self.size / BLOCK
    }

    /// Get the name of the data region, as passed to `shm_open`.
    pub fn name(&self) -> &str {
        self.data.name()
    }

    /// Releases the mappings of this process. The shared regions and their
    /// content stay for the other side.
    pub fn close(self) {
        info!("closed ring buffer {}", self.name());
    }

    /// Releases the mappings and removes the three regions from the system.
    ///
    /// All three regions are unlinked even if one of them fails, the first
    /// error is returned.
    pub fn destroy(self) -> Result<()> {
        let names = [
            self.data.name().to_string(),
            self.writer_region.name().to_string(),
            self.reader_region.name().to_string(),
        ];

        let mut result = Ok(());
        for name in &names {
            if let Err(e) = ShmRegion::unlink(name) {
                warn!("failed to unlink region {}: {}", name, e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        info!("destroyed ring buffer {}", names[0]);

        result
    }

    fn wrap_around(&self, writer_pos: u32) -> bool {
        writer_pos as u64 + BLOCK as u64 > self.size as u64
    }
}

/// Whether writing the slot starting at `start` would overwrite data the
/// reader has not consumed yet.
///
/// A reader parked at the end of the data region with nothing left in the
/// tail has logically moved on to offset 0. Filling the slot right in front
/// of it would make a full lap look exactly like an empty one, so that slot
/// counts as taken.
fn overtaking_read(
    start: u32,
    reader_pos: u32,
    watermark_pos: u32,
    size: u32,
) -> bool {
    if start < reader_pos {
        let end = start + BLOCK;
        reader_pos < end
            || (reader_pos == end
                && watermark_pos <= reader_pos
                && reader_pos as u64 + BLOCK as u64 > size as u64)
    } else if start == reader_pos {
        start < watermark_pos
    } else {
        false
    }
}

fn writer_region_name(name: &str) -> String {
    format!("{}-writer", name)
}

fn reader_region_name(name: &str) -> String {
    format!("{}-reader", name)
}

fn unlink_quietly(names: &[&str]) {
    for name in names {
        if let Err(e) = ShmRegion::unlink(name) {
            warn!("failed to unlink region {}: {}", name, e);
        }
    }
}
