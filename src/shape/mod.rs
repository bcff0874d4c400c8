//! Two-line junction shapes.
//!
//! Every shape is formed by two line segments: an L-shape is a corner, a
//! T-shape a junction where one segment ends on the other, and an X-shape a
//! crossing. Shapes are value types kept in three flat sequences; a
//! [`SerializedShapes`] borrows them as one polymorphic sequence.

use crate::geometry::Vec2;

mod verify;

/// Kind of a two-line shape.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ShapeType {
    L,
    T,
    X,
}

/// Fields shared by all shapes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ShapeBase {
    /// Index of the first source segment; `None` for shapes detected from
    /// response fields or produced by merging.
    pub line_a: Option<u32>,
    /// Index of the second source segment.
    pub line_b: Option<u32>,
    pub position: Vec2,
    /// Non-negative detection score.
    pub score: f32,
}

impl ShapeBase {
    fn new(position: Vec2, score: f32) -> Self {
        debug_assert!(score >= 0.0);
        Self {
            line_a: None,
            line_b: None,
            position,
            score,
        }
    }
}

/// Corner shape.
///
/// `direction` bisects the corner and points into its opening;
/// `edge_left` and `edge_right` point along the two legs with
/// `cross(edge_left, edge_right) >= 0`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LShape {
    pub base: ShapeBase,
    pub direction: Vec2,
    pub edge_left: Vec2,
    pub edge_right: Vec2,
}

impl LShape {
    pub fn new(position: Vec2, direction: Vec2, edge_left: Vec2, edge_right: Vec2, score: f32) -> Self {
        Self {
            base: ShapeBase::new(position, score),
            direction,
            edge_left,
            edge_right,
        }
    }

    /// Attaches the indices of the two source segments.
    pub fn with_lines(mut self, line_a: u32, line_b: u32) -> Self {
        self.base.line_a = Some(line_a);
        self.base.line_b = Some(line_b);
        self
    }

    pub fn position(&self) -> Vec2 {
        self.base.position
    }

    pub fn score(&self) -> f32 {
        self.base.score
    }
}

/// T-junction; `direction` points along the terminating segment, away from
/// the junction.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TShape {
    pub base: ShapeBase,
    pub direction: Vec2,
}

impl TShape {
    pub fn new(position: Vec2, direction: Vec2, score: f32) -> Self {
        Self {
            base: ShapeBase::new(position, score),
            direction,
        }
    }

    pub fn with_lines(mut self, line_a: u32, line_b: u32) -> Self {
        self.base.line_a = Some(line_a);
        self.base.line_b = Some(line_b);
        self
    }

    pub fn position(&self) -> Vec2 {
        self.base.position
    }

    pub fn score(&self) -> f32 {
        self.base.score
    }
}

/// Crossing of two segments with (roughly) perpendicular directions.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct XShape {
    pub base: ShapeBase,
    pub direction0: Vec2,
    pub direction1: Vec2,
}

impl XShape {
    pub fn new(position: Vec2, direction0: Vec2, direction1: Vec2, score: f32) -> Self {
        Self {
            base: ShapeBase::new(position, score),
            direction0,
            direction1,
        }
    }

    pub fn with_lines(mut self, line_a: u32, line_b: u32) -> Self {
        self.base.line_a = Some(line_a);
        self.base.line_b = Some(line_b);
        self
    }

    pub fn position(&self) -> Vec2 {
        self.base.position
    }

    pub fn score(&self) -> f32 {
        self.base.score
    }
}

/// Borrowed view of any shape.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ShapeView<'a> {
    L(&'a LShape),
    T(&'a TShape),
    X(&'a XShape),
}

impl ShapeView<'_> {
    pub fn shape_type(&self) -> ShapeType {
        match self {
            ShapeView::L(_) => ShapeType::L,
            ShapeView::T(_) => ShapeType::T,
            ShapeView::X(_) => ShapeType::X,
        }
    }

    pub fn base(&self) -> &ShapeBase {
        match self {
            ShapeView::L(shape) => &shape.base,
            ShapeView::T(shape) => &shape.base,
            ShapeView::X(shape) => &shape.base,
        }
    }

    pub fn position(&self) -> Vec2 {
        self.base().position
    }

    pub fn score(&self) -> f32 {
        self.base().score
    }
}

impl<'a> From<&'a LShape> for ShapeView<'a> {
    fn from(shape: &'a LShape) -> Self {
        ShapeView::L(shape)
    }
}

impl<'a> From<&'a TShape> for ShapeView<'a> {
    fn from(shape: &'a TShape) -> Self {
        ShapeView::T(shape)
    }
}

impl<'a> From<&'a XShape> for ShapeView<'a> {
    fn from(shape: &'a XShape) -> Self {
        ShapeView::X(shape)
    }
}

/// The three shape sequences produced by one detection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShapeSet {
    pub l_shapes: Vec<LShape>,
    pub t_shapes: Vec<TShape>,
    pub x_shapes: Vec<XShape>,
}

/// Polymorphic sequence over a [`ShapeSet`]: all X-shapes, then all
/// T-shapes, then all L-shapes.
#[derive(Clone, Debug)]
pub struct SerializedShapes<'a> {
    pub shapes: Vec<ShapeView<'a>>,
    /// Offset of the first X-shape; `None` without X-shapes.
    pub first_x: Option<usize>,
    pub first_t: Option<usize>,
    pub first_l: Option<usize>,
}

impl ShapeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.l_shapes.len() + self.t_shapes.len() + self.x_shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.l_shapes.clear();
        self.t_shapes.clear();
        self.x_shapes.clear();
    }

    /// Borrows all shapes as one sequence ordered X, T, L.
    pub fn serialize(&self) -> SerializedShapes<'_> {
        let mut shapes = Vec::with_capacity(self.len());
        shapes.extend(self.x_shapes.iter().map(ShapeView::X));
        shapes.extend(self.t_shapes.iter().map(ShapeView::T));
        shapes.extend(self.l_shapes.iter().map(ShapeView::L));

        let first = |count: usize, offset: usize| (count > 0).then_some(offset);
        SerializedShapes {
            shapes,
            first_x: first(self.x_shapes.len(), 0),
            first_t: first(self.t_shapes.len(), self.x_shapes.len()),
            first_l: first(self.l_shapes.len(), self.x_shapes.len() + self.t_shapes.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LShape, ShapeSet, ShapeType, TShape, XShape};
    use crate::geometry::Vec2;

    #[test]
    fn serialize_orders_x_t_l() {
        let mut set = ShapeSet::new();
        set.l_shapes.push(LShape::new(
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(-1.0, 0.0),
            Vec2::new(1.0, 0.0),
            1.0,
        ));
        set.x_shapes.push(XShape::new(Vec2::new(2.0, 2.0), Vec2::x(), Vec2::y(), 0.0));
        set.x_shapes.push(XShape::new(Vec2::new(3.0, 3.0), Vec2::x(), Vec2::y(), 0.0));

        let serialized = set.serialize();
        assert_eq!(serialized.shapes.len(), 3);
        assert_eq!(serialized.first_x, Some(0));
        assert_eq!(serialized.first_t, None);
        assert_eq!(serialized.first_l, Some(2));
        assert_eq!(serialized.shapes[2].shape_type(), ShapeType::L);
        assert_eq!(serialized.shapes[1].position(), Vec2::new(3.0, 3.0));
    }

    #[test]
    fn response_shapes_have_no_lines() {
        let t = TShape::new(Vec2::new(4.0, 5.0), Vec2::new(0.0, 1.0), 2.5);
        assert_eq!(t.base.line_a, None);
        let t = t.with_lines(3, 7);
        assert_eq!((t.base.line_a, t.base.line_b), (Some(3), Some(7)));
    }
}
