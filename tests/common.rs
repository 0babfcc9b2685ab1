use shm_slotring::Record;
use shm_slotring::RingBuffer;
use shm_slotring::DATA_BLOCK_SIZE;

/// A ring buffer created for one test, destroyed when dropped.
pub struct TestBuffer {
    pub name: String,
    buffer: Option<RingBuffer>,
}

impl TestBuffer {
    pub fn create(size: usize) -> Self {
        let name = format!("slotring-it-{}", uuid::Uuid::new_v4());
        let buffer = RingBuffer::create(&name, size).unwrap();

        TestBuffer {
            name,
            buffer: Some(buffer),
        }
    }

    pub fn writer(&mut self) -> &mut RingBuffer {
        self.buffer.as_mut().unwrap()
    }

    pub fn attach(&self) -> RingBuffer {
        RingBuffer::attach(&self.name).unwrap()
    }

    pub fn destroy(mut self) {
        self.buffer.take().unwrap().destroy().unwrap();
    }
}

impl Drop for TestBuffer {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            let _ = buffer.destroy();
        }
    }
}

/// Distinct records: the n-th one is filled with its index and carries it
/// little-endian in the first four bytes.
pub fn records(count: u32) -> Vec<Record> {
    (0..count).map(record).collect()
}

pub fn record(i: u32) -> Record {
    let mut record = [(i % 251) as u8; DATA_BLOCK_SIZE];
    record[..4].copy_from_slice(&i.to_le_bytes());
    record
}
