use rand::distributions::Alphanumeric;
use rand::Rng;

/// The length of every record in the ring buffer. Unit is byte.
pub const DATA_BLOCK_SIZE: usize = 16;

/// A record as stored in one slot. The ring buffer never looks inside it.
pub type Record = [u8; DATA_BLOCK_SIZE];

/// The payload used by the `slotring` tool.
///
/// ## The record layout
///
/// ```text
/// +----------------+----------------------------+-----------------+
/// | symbol         | price                      | quantity        |
/// +----------------+----------------------------+-----------------+
/// | 4 bytes, ASCII | 8 bytes, f64 LE            | 4 bytes, i32 LE |
/// +----------------+----------------------------+-----------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub symbol: [u8; 4],
    pub price: f64,
    pub quantity: i32,
}

impl Quote {
    /// A random quote: four ASCII letters, a price in [100, 115] rounded to
    /// cents and a quantity in [10, 100].
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut symbol = [0u8; 4];
        for byte in symbol.iter_mut() {
            *byte = loop {
                let c = rng.sample(Alphanumeric);
                if c.is_ascii_alphabetic() {
                    break c;
                }
            };
        }

        let price = (rng.gen_range(100.0..=115.0_f64) * 100.0).round() / 100.0;
        let quantity = rng.gen_range(10..=100);

        Quote {
            symbol,
            price,
            quantity,
        }
    }

    pub fn encode(&self) -> Record {
        let mut record = [0u8; DATA_BLOCK_SIZE];
        record[..4].copy_from_slice(&self.symbol);
        record[4..12].copy_from_slice(&self.price.to_le_bytes());
        record[12..].copy_from_slice(&self.quantity.to_le_bytes());
        record
    }

    pub fn decode(record: &Record) -> Self {
        let mut symbol = [0u8; 4];
        symbol.copy_from_slice(&record[..4]);

        let mut price = [0u8; 8];
        price.copy_from_slice(&record[4..12]);

        let mut quantity = [0u8; 4];
        quantity.copy_from_slice(&record[12..]);

        Quote {
            symbol,
            price: f64::from_le_bytes(price),
            quantity: i32::from_le_bytes(quantity),
        }
    }

    pub fn symbol_lossy(&self) -> String {
        String::from_utf8_lossy(&self.symbol).into_owned()
    }
}
