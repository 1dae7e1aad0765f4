//! # Codec - on-disk layouts for the Sediment storage engine
//!
//! Every structure the engine persists is a fixed little-endian layout
//! protected by a CRC32C checksum. This crate owns those layouts and nothing
//! else: it knows how bytes look, not where they live.
//!
//! ## Log file
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ LOG HEADER  magic (u32) | version_major (u8) | minor (u8) │
//! ├──────────────────────────────────────────────────────────┤
//! │ RECORD      crc (u32) | key_size (u16) | value_offset (u32)│
//! │             value_size (u32) | flags (u8) | key | value    │
//! │ ... repeated ...                                         │
//! ├──────────────────────────────────────────────────────────┤
//! │ EOF MARKER  magic (u32) "LEOF"   (sealed logs only)      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Page
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ PAGE HEADER id | record_count | byte_size | stride | crc │
//! ├──────────────────────────────────────────────────────────┤
//! │ SLOTS       record_count x stride bytes:                  │
//! │             record header (15) | key | zero padding       │
//! ├──────────────────────────────────────────────────────────┤
//! │ VALUES      value bytes, addressed by value_offset        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The record CRC covers the key, then the value, then the header fields
//! that follow the CRC. The page header CRC covers the four fields before it.

mod error;
mod keys;
mod layout;
mod reader;
mod record;

pub use error::CodecError;
pub use keys::{Comparator, Order, OrderedKey};
pub use layout::{
    LogHeader, PageHeader, RecordHeader, EOF_MAGIC, EOF_SIZE, LOG_HEADER_SIZE, LOG_MAGIC,
    LOG_VERSION_MAJOR, LOG_VERSION_MINOR, PAGE_HEADER_SIZE, RECORD_HEADER_SIZE,
};
pub use reader::ByteReader;
pub use record::{decode_log_record, encode_log_record, record_crc, Op, Version, MAX_KEY_SIZE, MAX_VALUE_SIZE};
