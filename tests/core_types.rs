use junctions::geometry::{Bresenham, SpatialGrid};
use junctions::image::interpolate_bilinear;
use junctions::{FiniteLine2, Homography, ImageView, JunctionError, Line2, OwnedImage, Vec2};

#[test]
fn image_view_rejects_invalid_dimensions() {
    let data = [0u8; 4];

    let err = ImageView::from_slice(&data, 0, 1).err().unwrap();
    assert_eq!(
        err,
        JunctionError::InvalidDimensions {
            width: 0,
            height: 1,
        }
    );

    let err = ImageView::new(&data, 4, 1, 3).err().unwrap();
    assert_eq!(
        err,
        JunctionError::InvalidStride {
            width: 4,
            stride: 3,
        }
    );

    let err = ImageView::new(&data[..3], 2, 2, 2).err().unwrap();
    assert_eq!(err, JunctionError::BufferTooSmall { needed: 4, got: 3 });
}

#[test]
fn padded_views_copy_without_padding() {
    let data: Vec<u8> = (0u8..12).collect();
    let view = ImageView::new(&data, 3, 3, 4).unwrap();
    assert_eq!(view.padding(), 1);
    assert_eq!(view.row(2), Some(&[8u8, 9, 10][..]));

    let owned = OwnedImage::from_view(view);
    assert_eq!(owned.data(), &[0, 1, 2, 4, 5, 6, 8, 9, 10]);

    let rotated = owned.rotated_180();
    assert_eq!(rotated.get(0, 0), Some(10));
    assert_eq!(rotated.get(2, 2), Some(0));
    assert_eq!(rotated.rotated_180(), owned);

    let roi = view.roi(1, 1, 2, 2).unwrap();
    assert_eq!(roi.get(1, 1), Some(&10));
    assert!(matches!(
        view.roi(2, 2, 2, 2),
        Err(JunctionError::RegionOutOfBounds { .. })
    ));
}

#[test]
fn bilinear_sampling_uses_pixel_centers() {
    let mut image = OwnedImage::filled(4, 2, 0u8).unwrap();
    image.set(2, 0, 200);
    image.set(2, 1, 100);
    let value = interpolate_bilinear(image.view(), 1.5, 0.5).unwrap();
    assert!((value - 75.0).abs() < 1e-4);
    assert_eq!(interpolate_bilinear(image.view(), 3.5, 0.0), None);
}

#[test]
fn lines_intersect_and_fit() {
    let horizontal = Line2::new(Vec2::new(0.0, 5.0), Vec2::x()).unwrap();
    let diagonal = Line2::new(Vec2::zeros(), Vec2::new(1.0, 1.0)).unwrap();
    let point = horizontal.intersection(&diagonal).unwrap();
    assert!((point - Vec2::new(5.0, 5.0)).norm() < 1e-5);
    assert!(horizontal.intersection(&horizontal).is_none());
    assert!((horizontal.signed_distance(&Vec2::new(3.0, 8.0)).abs() - 3.0).abs() < 1e-5);

    let mut points: Vec<Vec2> = (0..20).map(|i| Vec2::new(i as f32, 0.5 * i as f32 + 2.0)).collect();
    points.push(Vec2::new(4.0, 40.0));
    let (line, inliers) = Line2::fit_robust(&points, 0.5).unwrap();
    assert_eq!(inliers, 20);
    assert!(line.sqr_distance(&Vec2::new(30.0, 17.0)) < 1e-4);

    let segment = FiniteLine2::new(Vec2::new(0.0, 0.0), Vec2::new(3.0, 4.0));
    assert!((segment.length() - 5.0).abs() < 1e-6);
    assert!(FiniteLine2::new(Vec2::zeros(), Vec2::zeros()).infinite_line().is_none());
}

#[test]
fn homography_maps_points_and_directions() {
    let shift = Homography::from_row_slice(&[1.0, 0.0, 3.0, 0.0, 1.0, -2.0, 0.0, 0.0, 1.0]);
    assert!(!shift.is_identity());
    assert_eq!(shift.transform(&Vec2::new(1.0, 1.0)), Some(Vec2::new(4.0, -1.0)));
    let direction = shift.transform_direction(&Vec2::new(1.0, 1.0), &Vec2::x()).unwrap();
    assert!((direction - Vec2::x()).norm() < 1e-6);

    let singular = Homography::from_row_slice(&[0.0; 9]);
    assert!(singular.is_identity());
}

#[test]
fn bresenham_walks_without_the_end_cell() {
    let cells: Vec<(i32, i32)> = Bresenham::new(0, 0, 4, 2).collect();
    assert_eq!(cells.len(), 4);
    assert_eq!(cells[0], (0, 0));
    assert!(!cells.contains(&(4, 2)));
}

#[test]
fn spatial_grid_neighborhoods() {
    let mut grid = SpatialGrid::new(0.0, 0.0, 30.0, 30.0, 3, 3);
    assert!(grid.insert(&Vec2::new(5.0, 5.0), 0));
    assert!(grid.insert(&Vec2::new(25.0, 25.0), 1));
    assert!(!grid.insert(&Vec2::new(35.0, 5.0), 2));

    let mut neighbors = Vec::new();
    grid.indices_neighborhood9(1, 1, &mut neighbors);
    neighbors.sort_unstable();
    assert_eq!(neighbors, vec![0, 1]);

    let copied = grid.with_copied_neighborhood8();
    assert_eq!(copied.cell(0, 0), &[0]);
    let mut center = copied.cell(1, 1).to_vec();
    center.sort_unstable();
    assert_eq!(center, vec![0, 1]);
}
