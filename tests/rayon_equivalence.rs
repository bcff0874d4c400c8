#![cfg(feature = "rayon")]

use junctions::{
    GradientDetector, GradientDetectorConfig, GradientVarianceConfig, GradientVarianceDetector,
    ImageView, NonMaximumSuppression, OwnedImage, Region, VarianceDetector,
    VarianceDetectorConfig,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Textured background with a few dark bars and stems.
fn make_scene(width: usize, height: usize) -> OwnedImage {
    let mut rng = StdRng::seed_from_u64(7);
    let mut image = OwnedImage::filled(width, height, 0u8).unwrap();
    for y in 0..height {
        for x in 0..width {
            image.set(x, y, 180 + rng.random_range(0..20u8));
        }
    }
    for (bar, stem) in [(20usize, 40usize), (70, 110), (95, 30)] {
        for y in bar..bar + 3 {
            for x in 0..width {
                image.set(x, y, 40);
            }
        }
        for y in bar + 3..(bar + 40).min(height) {
            for x in stem..stem + 3 {
                image.set(x, y, 40);
            }
        }
    }
    image
}

#[test]
fn parallel_detectors_match_sequential() {
    let image = make_scene(160, 120);
    let view = image.view();

    let gradient = |parallel| {
        GradientDetector::new(GradientDetectorConfig {
            parallel,
            ..GradientDetectorConfig::default()
        })
        .unwrap()
        .detect(view)
        .unwrap()
    };
    assert_eq!(gradient(false), gradient(true));

    let variance = |parallel| {
        VarianceDetector::new(VarianceDetectorConfig {
            parallel,
            ..VarianceDetectorConfig::default()
        })
        .unwrap()
        .detect(view)
        .unwrap()
    };
    assert_eq!(variance(false), variance(true));

    let gradient_variance = |parallel| {
        GradientVarianceDetector::new(GradientVarianceConfig {
            parallel,
            ..GradientVarianceConfig::default()
        })
        .unwrap()
        .detect(view)
        .unwrap()
        .shapes
    };
    assert_eq!(gradient_variance(false), gradient_variance(true));
}

#[test]
fn parallel_suppression_matches_sequential() {
    let mut rng = StdRng::seed_from_u64(99);
    let (width, height) = (97usize, 83usize);
    let values: Vec<u16> = (0..width * height).map(|_| rng.random_range(0..50u16)).collect();
    let view = ImageView::from_slice(&values, width, height).unwrap();
    let region = Region::new(0, 0, width as u32, height as u32);

    let mut sequential = NonMaximumSuppression::new(width as u32, height as u32, 0);
    sequential.add_candidates(view, region, 20).unwrap();
    let mut parallel = NonMaximumSuppression::new(width as u32, height as u32, 0);
    parallel.add_candidates_par(view, region, 20).unwrap();
    assert_eq!(sequential.candidate_count(), parallel.candidate_count());

    for strict in [true, false] {
        assert_eq!(
            sequential.suppress_non_maximum(region, strict).unwrap(),
            parallel.suppress_non_maximum_par(region, strict).unwrap()
        );
    }
}
