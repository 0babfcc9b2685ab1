use std::num::TryFromIntError;

use snafu::Location;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("IO error"))]
    Io {
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Invalid parameter, detail: {}", detail))]
    InvalidParameter {
        detail: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Shared memory region {} already exists", name))]
    AlreadyExists {
        name: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Shared memory region {} not found", name))]
    NotFound {
        name: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to open shared memory region {}", name))]
    ShmOpen {
        name: String,
        source: nix::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to unlink shared memory region {}", name))]
    ShmUnlink {
        name: String,
        source: nix::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to mmap"))]
    Mmap {
        source: nix::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display(
        "Reader cursor at {}. Writer cursor attemping to write [{}:{}]",
        reader_pos,
        start,
        end
    ))]
    ReaderCollision {
        reader_pos: u32,
        start: u32,
        end: u32,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display(
        "Writer cursor at {}. Reader cursor attemping to read [{} :{}]",
        writer_pos,
        start,
        end
    ))]
    WriterCollision {
        writer_pos: u32,
        start: u32,
        end: u32,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to convert {} from {} to {}", value, from, to))]
    TryFromInt {
        value: String,
        from: String,
        to: String,
        source: TryFromIntError,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Error {
    /// Returns true for the errors that signal backpressure rather than a
    /// broken setup. The caller may retry the same operation later.
    pub fn is_collision(&self) -> bool {
        matches!(
            self,
            Error::ReaderCollision { .. } | Error::WriterCollision { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
