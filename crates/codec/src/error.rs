use thiserror::Error;

/// Errors raised while decoding on-disk structures.
///
/// Every variant describes corrupt or truncated input; encoding never fails
/// with a `CodecError`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Not enough bytes left in the buffer for the next field.
    #[error("truncated at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A stored checksum did not match the recomputed one.
    #[error("crc mismatch at offset {offset}: stored {stored:#010x}, computed {computed:#010x}")]
    Crc {
        offset: usize,
        stored: u32,
        computed: u32,
    },

    /// A magic number did not match.
    #[error("bad magic {found:#010x} (expected {expected:#010x})")]
    BadMagic { expected: u32, found: u32 },

    /// The log header carries a version this build does not read.
    #[error("unsupported log version {major}.{minor}")]
    Version { major: u8, minor: u8 },

    /// Record flags were neither SET nor DEL.
    #[error("invalid record flags {0:#04x}")]
    Flags(u8),

    /// A log record used the reserved `value_offset` field.
    #[error("reserved value_offset is {0}, expected 0")]
    ValueOffset(u32),

    /// A structurally valid field holds an impossible value.
    #[error("malformed {what} at offset {offset}")]
    Malformed { what: &'static str, offset: usize },
}
