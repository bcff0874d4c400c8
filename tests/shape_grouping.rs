use junctions::matcher::{
    determine_horizontal_groups, determine_parallel_line_groups, determine_shapes_along_lines,
    merge_t_shapes, merge_x_and_t_shapes,
};
use junctions::{Line2, MatchType, ShapeMatcher, ShapeView, TShape, Vec2, XShape};

/// Two rows of eight downward T-shapes at y = 30 and y = 70.
fn two_rows() -> Vec<TShape> {
    [30.0f32, 70.0]
        .iter()
        .flat_map(|&y| {
            (1..=8).map(move |n| TShape::new(Vec2::new(20.0 * n as f32, y), Vec2::y(), 1.0))
        })
        .collect()
}

#[test]
fn rows_of_t_shapes_form_two_lines() {
    let shapes = two_rows();
    let views: Vec<ShapeView<'_>> = shapes.iter().map(ShapeView::from).collect();

    let groups = determine_shapes_along_lines(200, 100, &views, 5, true).unwrap();
    assert_eq!(groups.len(), 2, "{groups:?}");

    for (group, (y, first)) in groups.iter().zip([(30.0f32, 0u32), (70.0, 8)]) {
        let mut indices = group.indices.clone();
        indices.sort_unstable();
        assert_eq!(indices, (first..first + 8).collect::<Vec<u32>>());

        let line = group.line.unwrap();
        assert!(line.sqr_distance(&Vec2::new(0.0, y)) < 1e-4);
        assert!(line.sqr_distance(&Vec2::new(200.0, y)) < 1e-4);
    }

    let lines: Vec<Line2> = groups.iter().filter_map(|g| g.line).collect();
    assert_eq!(determine_parallel_line_groups(&lines, 5.0, 2), vec![vec![0, 1]]);
}

#[test]
fn sparse_rows_are_not_reported() {
    let shapes = two_rows();
    let views: Vec<ShapeView<'_>> = shapes.iter().map(ShapeView::from).collect();
    let groups = determine_shapes_along_lines(200, 100, &views, 9, false).unwrap();
    assert!(groups.is_empty());
}

#[test]
fn horizontal_bands_collect_rows() {
    let positions: Vec<Vec2> = two_rows().iter().map(|t| t.position()).collect();
    let (groups, means) = determine_horizontal_groups(100, &positions, 4, 5.0);
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0], (0..8).collect::<Vec<u32>>());
    assert!((means[0] - 30.0).abs() < 1e-4);
    assert!((means[1] - 70.0).abs() < 1e-4);
}

#[test]
fn matched_shapes_merge_into_one() {
    let reference = [TShape::new(Vec2::new(50.0, 50.0), Vec2::y(), 2.0)];
    let observations = [
        TShape::new(Vec2::new(51.0, 50.0), Vec2::y(), 4.0),
        TShape::new(Vec2::new(49.0, 51.0), Vec2::new(0.1, 1.0).normalize(), 2.0),
    ];
    let matcher = ShapeMatcher::new(3.0, 20.0);
    let matching: Vec<u32> = observations
        .iter()
        .enumerate()
        .filter(|(_, t)| {
            matcher.match_shapes(ShapeView::from(&reference[0]), ShapeView::from(*t), None)
                == MatchType::PerfectMatch
        })
        .map(|(n, _)| n as u32)
        .collect();
    assert_eq!(matching, vec![0, 1]);

    let merged = merge_t_shapes(&observations, &matching).unwrap();
    assert!((merged.position() - Vec2::new(50.0, 50.5)).norm() < 1e-5);
    assert!((merged.score() - 3.0).abs() < 1e-5);
    assert!(merged.direction.y > 0.99);

    let crossing = [XShape::new(Vec2::new(50.0, 50.0), Vec2::x(), Vec2::y(), 1.0)];
    let merged = merge_x_and_t_shapes(&crossing, &[0], &observations, &[0]).unwrap();
    assert!((merged.position() - Vec2::new(50.5, 50.0)).norm() < 1e-5);
    assert!(merge_t_shapes(&observations, &[]).is_none());
}
