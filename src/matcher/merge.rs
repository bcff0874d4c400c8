//! Merging of shapes that describe the same junction.
//!
//! Merged shapes average positions and scores and carry no source line
//! indices. Directions are summed and renormalized; when a sum degenerates
//! the direction of the first input is kept.

use crate::geometry::{normalized, perpendicular, Vec2};
use crate::shape::{LShape, TShape, XShape};

/// cos(35 deg): directions closer than this are paired when merging
/// crossings.
const COS_35: f32 = 0.819_152_04;

const FRAC_1_SQRT_2: f32 = std::f32::consts::FRAC_1_SQRT_2;

fn mean_of<I>(values: I) -> (Vec2, f32)
where
    I: IntoIterator<Item = (Vec2, f32)>,
{
    let mut position = Vec2::zeros();
    let mut score = 0.0f32;
    let mut count = 0usize;
    for (p, s) in values {
        position += p;
        score += s;
        count += 1;
    }
    let inv = 1.0 / count.max(1) as f32;
    (position * inv, score * inv)
}

/// Adds `direction` to `sum`, flipped if it points away from `reference`.
fn add_aligned(sum: &mut Vec2, reference: &Vec2, direction: &Vec2) {
    if reference.dot(direction) >= COS_35 {
        *sum += direction;
    } else {
        *sum -= direction;
    }
}

/// Adds both directions of a crossing to the running sums, pairing each
/// with the reference direction it is closest to.
fn add_crossing(sums: &mut (Vec2, Vec2), reference: (&Vec2, &Vec2), other: (&Vec2, &Vec2)) {
    let (d0, d1) = reference;
    let (o0, o1) = other;
    if d0.dot(o0).abs() >= COS_35 {
        add_aligned(&mut sums.0, d0, o0);
        add_aligned(&mut sums.1, d1, o1);
    } else {
        add_aligned(&mut sums.0, d0, o1);
        add_aligned(&mut sums.1, d1, o0);
    }
}

/// Corner edges of a bisecting direction, rotated by -45 and +45 degrees.
fn corner_edges(direction: &Vec2) -> (Vec2, Vec2) {
    let left = Vec2::new(direction.x + direction.y, -direction.x + direction.y) * FRAC_1_SQRT_2;
    let right = Vec2::new(direction.x - direction.y, direction.x + direction.y) * FRAC_1_SQRT_2;
    (left, right)
}

/// Merges the L-shapes at `indices` into one corner whose edges are
/// rebuilt at +-45 degrees around the mean direction.
///
/// Returns `None` for empty `indices`.
pub fn merge_l_shapes(l_shapes: &[LShape], indices: &[u32]) -> Option<LShape> {
    let first = l_shapes.get(*indices.first()? as usize)?;
    let shapes = indices.iter().map(|&i| &l_shapes[i as usize]);
    let (position, score) = mean_of(shapes.clone().map(|l| (l.position(), l.score())));
    let sum = shapes.fold(Vec2::zeros(), |sum, l| sum + l.direction);
    let direction = normalized(&sum).unwrap_or(first.direction);
    let (edge_left, edge_right) = corner_edges(&direction);
    Some(LShape::new(position, direction, edge_left, edge_right, score))
}

/// Merges the T-shapes at `indices`.
pub fn merge_t_shapes(t_shapes: &[TShape], indices: &[u32]) -> Option<TShape> {
    let first = t_shapes.get(*indices.first()? as usize)?;
    let shapes = indices.iter().map(|&i| &t_shapes[i as usize]);
    let (position, score) = mean_of(shapes.clone().map(|t| (t.position(), t.score())));
    let sum = shapes.fold(Vec2::zeros(), |sum, t| sum + t.direction);
    let direction = normalized(&sum).unwrap_or(first.direction);
    Some(TShape::new(position, direction, score))
}

/// Merges the X-shapes at `indices`; the directions of every shape are
/// paired with those of the first shape (35 degree rule) and sign-aligned
/// before summing.
pub fn merge_x_shapes(x_shapes: &[XShape], indices: &[u32]) -> Option<XShape> {
    let first = x_shapes.get(*indices.first()? as usize)?;
    let shapes = indices.iter().map(|&i| &x_shapes[i as usize]);
    let (position, score) = mean_of(shapes.clone().map(|x| (x.position(), x.score())));

    let reference = (&first.direction0, &first.direction1);
    let mut sums = (first.direction0, first.direction1);
    for x in shapes.skip(1) {
        add_crossing(&mut sums, reference, (&x.direction0, &x.direction1));
    }
    let direction0 = normalized(&sums.0).unwrap_or(first.direction0);
    let direction1 = normalized(&sums.1).unwrap_or(first.direction1);
    Some(XShape::new(position, direction0, direction1, score))
}

/// Merges T-shapes with L-shapes lying on their bar; each L-shape
/// contributes the edge that agrees best with the mean T direction.
///
/// Returns `None` without T-shapes.
pub fn merge_t_and_l_shapes(
    t_shapes: &[TShape],
    t_indices: &[u32],
    l_shapes: &[LShape],
    l_indices: &[u32],
) -> Option<TShape> {
    let first = t_shapes.get(*t_indices.first()? as usize)?;
    let ts = t_indices.iter().map(|&i| &t_shapes[i as usize]);
    let ls = l_indices.iter().map(|&i| &l_shapes[i as usize]);
    let (position, score) = mean_of(
        ts.clone()
            .map(|t| (t.position(), t.score()))
            .chain(ls.clone().map(|l| (l.position(), l.score()))),
    );

    let mut sum = ts.fold(Vec2::zeros(), |sum, t| sum + t.direction);
    let t_direction = normalized(&sum).unwrap_or(first.direction);
    for l in ls {
        if t_direction.dot(&l.edge_left) > t_direction.dot(&l.edge_right) {
            sum += l.edge_left;
        } else {
            sum += l.edge_right;
        }
    }
    let direction = normalized(&sum).unwrap_or(t_direction);
    Some(TShape::new(position, direction, score))
}

/// Merges X-shapes with T-shapes; every T direction is added to the
/// crossing direction it is closest to.
///
/// Returns `None` without X-shapes.
pub fn merge_x_and_t_shapes(
    x_shapes: &[XShape],
    x_indices: &[u32],
    t_shapes: &[TShape],
    t_indices: &[u32],
) -> Option<XShape> {
    let first = x_shapes.get(*x_indices.first()? as usize)?;
    let xs = x_indices.iter().map(|&i| &x_shapes[i as usize]);
    let ts = t_indices.iter().map(|&i| &t_shapes[i as usize]);
    let (position, score) = mean_of(
        xs.clone()
            .map(|x| (x.position(), x.score()))
            .chain(ts.clone().map(|t| (t.position(), t.score()))),
    );

    let (d0, d1) = (&first.direction0, &first.direction1);
    let mut sums = (first.direction0, first.direction1);
    for x in xs.skip(1) {
        add_crossing(&mut sums, (d0, d1), (&x.direction0, &x.direction1));
    }
    for t in ts {
        if d0.dot(&t.direction).abs() >= COS_35 {
            add_aligned(&mut sums.0, d0, &t.direction);
        } else {
            add_aligned(&mut sums.1, d1, &t.direction);
        }
    }
    let direction0 = normalized(&sums.0).unwrap_or(first.direction0);
    let direction1 = normalized(&sums.1).unwrap_or(first.direction1);
    Some(XShape::new(position, direction0, direction1, score))
}

/// Two coincident T-shapes form a crossing along the direction of `a`.
pub fn merge_t_shapes_into_x(a: &TShape, b: &TShape) -> XShape {
    let (position, score) = mean_of([(a.position(), a.score()), (b.position(), b.score())]);
    XShape::new(position, a.direction, perpendicular(&a.direction), score)
}

/// Two opposite corners form a crossing whose directions run along the
/// matching edges.
pub fn merge_l_shapes_into_x(a: &LShape, b: &LShape) -> XShape {
    let (position, score) = mean_of([(a.position(), a.score()), (b.position(), b.score())]);
    let direction0 = normalized(&(a.edge_left - b.edge_left)).unwrap_or(a.edge_left);
    let direction1 = normalized(&(a.edge_right - b.edge_right)).unwrap_or(a.edge_right);
    XShape::new(position, direction0, direction1, score)
}

/// Two perpendicular corners sharing one leg form a T-junction pointing
/// between them; `None` if their directions cancel.
pub fn merge_l_shapes_into_t(a: &LShape, b: &LShape) -> Option<TShape> {
    let (position, score) = mean_of([(a.position(), a.score()), (b.position(), b.score())]);
    let direction = normalized(&(a.direction + b.direction))?;
    Some(TShape::new(position, direction, score))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corner(position: Vec2, direction: Vec2) -> LShape {
        let direction = direction.normalize();
        let (left, right) = corner_edges(&direction);
        LShape::new(position, direction, left, right, 1.0)
    }

    #[test]
    fn corner_edges_follow_orientation_convention() {
        let (left, right) = corner_edges(&Vec2::new(1.0, 1.0).normalize());
        assert!((left - Vec2::new(1.0, 0.0)).norm() < 1e-6);
        assert!((right - Vec2::new(0.0, 1.0)).norm() < 1e-6);
    }

    #[test]
    fn l_shapes_average_position_and_direction() {
        let shapes = [
            LShape::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::y(), Vec2::x(), 2.0),
            LShape::new(Vec2::new(2.0, 2.0), Vec2::new(0.0, 1.0), Vec2::y(), Vec2::x(), 4.0),
        ];
        let merged = merge_l_shapes(&shapes, &[0, 1]).unwrap();
        assert_eq!(merged.position(), Vec2::new(1.0, 1.0));
        assert_eq!(merged.score(), 3.0);
        assert!((merged.direction - Vec2::new(1.0, 1.0).normalize()).norm() < 1e-6);
        assert!((merged.edge_left - Vec2::x()).norm() < 1e-6);
        assert_eq!(merged.base.line_a, None);
        assert!(merge_l_shapes(&shapes, &[]).is_none());
    }

    #[test]
    fn x_shapes_pair_swapped_and_flipped_directions() {
        let shapes = [
            XShape::new(Vec2::new(0.0, 0.0), Vec2::x(), Vec2::y(), 0.0),
            XShape::new(Vec2::new(2.0, 0.0), -Vec2::y(), Vec2::x(), 0.0),
        ];
        let merged = merge_x_shapes(&shapes, &[0, 1]).unwrap();
        assert_eq!(merged.position(), Vec2::new(1.0, 0.0));
        assert!((merged.direction0 - Vec2::x()).norm() < 1e-6);
        assert!((merged.direction1 - Vec2::y()).norm() < 1e-6);
    }

    #[test]
    fn t_and_l_merge_picks_agreeing_edge() {
        let t = [TShape::new(Vec2::new(10.0, 10.0), Vec2::y(), 1.0)];
        let l = [corner(Vec2::new(12.0, 10.0), Vec2::new(-1.0, 1.0))];
        let merged = merge_t_and_l_shapes(&t, &[0], &l, &[0]).unwrap();
        assert_eq!(merged.position(), Vec2::new(11.0, 10.0));
        assert!((merged.direction - Vec2::y()).norm() < 1e-6);
    }

    #[test]
    fn x_and_t_merge_adds_t_to_closest_direction() {
        let x = [XShape::new(Vec2::new(0.0, 0.0), Vec2::x(), Vec2::y(), 0.0)];
        let t = [TShape::new(Vec2::new(0.0, 2.0), Vec2::new(0.2, -1.0).normalize(), 0.0)];
        let merged = merge_x_and_t_shapes(&x, &[0], &t, &[0]).unwrap();
        assert!(merged.direction1.y > 0.99);
        assert!(merged.direction1.x < 0.0);
        assert!((merged.direction0 - Vec2::x()).norm() < 1e-6);
    }

    #[test]
    fn opposite_corners_become_crossing() {
        let a = corner(Vec2::new(5.0, 5.0), Vec2::new(1.0, 1.0));
        let b = corner(Vec2::new(5.5, 5.0), Vec2::new(-1.0, -1.0));
        let x = merge_l_shapes_into_x(&a, &b);
        assert!((x.direction0 - Vec2::x()).norm() < 1e-6);
        assert!((x.direction1 - Vec2::y()).norm() < 1e-6);
        assert_eq!(x.position(), Vec2::new(5.25, 5.0));
    }

    #[test]
    fn perpendicular_corners_become_t() {
        let a = corner(Vec2::new(5.0, 5.0), Vec2::new(1.0, 1.0));
        let b = corner(Vec2::new(5.0, 5.0), Vec2::new(-1.0, 1.0));
        let t = merge_l_shapes_into_t(&a, &b).unwrap();
        assert!((t.direction - Vec2::y()).norm() < 1e-6);

        let c = corner(Vec2::new(5.0, 5.0), Vec2::new(-1.0, -1.0));
        assert!(merge_l_shapes_into_t(&a, &c).is_none());
    }

    #[test]
    fn coincident_t_shapes_become_crossing() {
        let a = TShape::new(Vec2::new(1.0, 1.0), Vec2::y(), 2.0);
        let b = TShape::new(Vec2::new(1.0, 2.0), -Vec2::y(), 4.0);
        let x = merge_t_shapes_into_x(&a, &b);
        assert_eq!(x.score(), 3.0);
        assert!(x.direction0.dot(&x.direction1).abs() < 1e-6);
    }
}
