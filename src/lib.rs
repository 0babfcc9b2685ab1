pub mod driver;
pub mod error;
pub mod record;
pub mod ringbuf;

mod macros;
mod shm;

pub use record::Quote;
pub use record::Record;
pub use record::DATA_BLOCK_SIZE;
pub use ringbuf::RingBuffer;
