//! Junctions locates L-, T- and X-shaped line junctions in 8-bit grayscale
//! images and relates them across frames.
//!
//! Shapes come from two sources: line segments supplied by the caller
//! ([`detector::geometric`], [`detector::rectangle`]) or dense T-junction
//! response fields ([`GradientDetector`], [`VarianceDetector`],
//! [`GradientVarianceDetector`]) whose peaks are extracted by the sparse
//! [`NonMaximumSuppression`] engine. The [`matcher`] grades shape pairs,
//! computes aligned one-to-one matchings, merges duplicates and groups shapes
//! along lines.
//!
//! The optional `rayon` feature parallelizes candidate collection and
//! suppression, `simd` vectorizes response combination and `tracing` emits
//! spans and counts for every stage. `image-io` adds `image::io` for
//! decoding PNG/JPEG frames into grayscale buffers.

pub mod detector;
pub mod geometry;
pub mod image;
pub mod matcher;
pub mod nms;
pub mod shape;
mod trace;
pub mod util;

pub use detector::geometric::{determine_l_shapes, determine_shapes, post_adjust_shapes, ShapeParams};
pub use detector::rectangle::{detect_aligned_rectangles, Rectangle, RectangleParams};
pub use detector::{
    GradientDetector, GradientDetectorConfig, GradientVarianceConfig, GradientVarianceDetection,
    GradientVarianceDetector, JunctionDetector, JunctionTemplate, VarianceDetector,
    VarianceDetectorConfig,
};
pub use geometry::{FiniteLine2, Homography, Line2, Vec2};
pub use image::{ImageView, OwnedImage};
pub use matcher::{
    AlignedMatching, AlignedMatchingParams, MatchType, ShapeLineGroup, ShapeMatcher,
};
pub use nms::{NonMaximumSuppression, Region, StrengthPosition};
pub use shape::{LShape, SerializedShapes, ShapeSet, ShapeType, ShapeView, TShape, XShape};
pub use util::{JunctionError, JunctionResult};
