use snafu::prelude::*;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[cfg(feature = "std")]
    #[snafu(display("I/O error at byte {}: {}", pos, source))]
    Io {
        source: std::io::Error,
        pos: u64,
    },

    #[snafu(display("reading {} bytes at byte {} of device {} failed", len, pos, device))]
    Read {
        device: u32,
        pos: u64,
        len: usize,
    },

    #[snafu(display("scratch allocator could not provide {} bytes", size))]
    OutOfScratch {
        size: usize,
    },

    #[snafu(display("no volume at index {}", index))]
    NoSuchVolume {
        index: usize,
    },

    RegistryFull,

    NotFound,

    BiggerThanMemory,

    #[snafu(display("{}", message))]
    InvalidStatic {
        message: &'static str,
    },
}
