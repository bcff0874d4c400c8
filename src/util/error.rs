//! Error types for junctions.

use thiserror::Error;

/// Result alias for junctions operations.
pub type Result<T> = std::result::Result<T, JunctionError>;

/// Errors that can occur when running junctions algorithms.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JunctionError {
    /// A parameter is outside of its documented range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        name: &'static str,
        reason: &'static str,
    },
    /// Width or height is zero or overflows.
    #[error("invalid dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    /// The stride is smaller than the width.
    #[error("invalid stride {stride} for width {width}")]
    InvalidStride { width: usize, stride: usize },
    /// The backing buffer is shorter than the view requires.
    #[error("buffer too small: needed {needed} elements, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// The image is smaller than an algorithm requires.
    #[error("image {width}x{height} is too small, need at least {min_width}x{min_height}")]
    ImageTooSmall {
        width: usize,
        height: usize,
        min_width: usize,
        min_height: usize,
    },
    /// A region does not fit into the domain it addresses.
    #[error(
        "region ({x}, {y}, {width}x{height}) exceeds domain {domain_width}x{domain_height}"
    )]
    RegionOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        domain_width: usize,
        domain_height: usize,
    },
    /// Decoding or reading an image file failed.
    #[error("image i/o failed: {reason}")]
    ImageIo { reason: String },
}
