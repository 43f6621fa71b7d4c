//! Common test infrastructure
//!
//! Builds a complete librarian (stores, queues, workers) on temp directories,
//! with in-process fakes standing in for the metadata service and the image
//! host. Tests should only import from this module.

mod fakes;
mod librarian;

pub use fakes::{remote_file, remote_series, FakeMetadata, FakeTransport};
pub use librarian::{wait_until, Librarian, RunningLibrarian, TestEnv};

/// Minimal PNG signature plus the start of an IHDR chunk.
pub const PNG_BYTES: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R',
];

/// JFIF header.
pub const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
