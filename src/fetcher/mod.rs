//! Image fetching.
//!
//! Payloads are validated against known image signatures and staged in a
//! temp directory; the caller installs them with
//! [`FetchedArtifact::move_into_place`].

mod artifact_fetcher;
mod error;
mod image_format;
mod transport;

pub use artifact_fetcher::{ArtifactFetcher, FetchedArtifact, DEFAULT_MAX_ATTEMPTS};
pub use error::FetchError;
pub use image_format::ImageFormat;
pub use transport::{ArtifactTransport, HttpTransport};

#[cfg(test)]
pub(crate) use image_format::tests as test_images;
