use crate::geometry::{Line2, Vec2};

/// Integer line stepper visiting every cell between two grid positions.
///
/// Iteration yields the start position first and stops before the end
/// position.
#[derive(Clone, Debug)]
pub struct Bresenham {
    x: i32,
    y: i32,
    end_x: i32,
    end_y: i32,
    dx: i32,
    dy: i32,
    step_x: i32,
    step_y: i32,
    error: i32,
}

impl Bresenham {
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        Self {
            x: x0,
            y: y0,
            end_x: x1,
            end_y: y1,
            dx,
            dy,
            step_x: if x0 < x1 { 1 } else { -1 },
            step_y: if y0 < y1 { 1 } else { -1 },
            error: dx + dy,
        }
    }

    /// Advances `(x, y)` to the next cell on the line.
    #[inline]
    pub fn find_next(&mut self) {
        let doubled = 2 * self.error;
        if doubled >= self.dy {
            self.error += self.dy;
            self.x += self.step_x;
        }
        if doubled <= self.dx {
            self.error += self.dx;
            self.y += self.step_y;
        }
    }
}

impl Iterator for Bresenham {
    type Item = (i32, i32);

    fn next(&mut self) -> Option<(i32, i32)> {
        if self.x == self.end_x && self.y == self.end_y {
            return None;
        }
        let current = (self.x, self.y);
        self.find_next();
        Some(current)
    }
}

/// Clips an infinite line against the axis-aligned box
/// `[left, right] x [top, bottom]`.
///
/// Returns the two intersection points ordered along the line direction, or
/// `None` if the line misses the box or only touches a corner.
pub fn border_intersection(
    line: &Line2,
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
) -> Option<(Vec2, Vec2)> {
    debug_assert!(left <= right && top <= bottom);
    let n = line.normal();
    let d = line.distance();
    let eps = 1e-6f32;

    let mut points: Vec<Vec2> = Vec::with_capacity(4);
    let mut push_unique = |p: Vec2| {
        if !points.iter().any(|q| (q - p).norm_squared() <= eps) {
            points.push(p);
        }
    };

    if n.y.abs() > eps {
        for x in [left, right] {
            let y = (d - n.x * x) / n.y;
            if y >= top - eps && y <= bottom + eps {
                push_unique(Vec2::new(x, y.clamp(top, bottom)));
            }
        }
    }
    if n.x.abs() > eps {
        for y in [top, bottom] {
            let x = (d - n.y * y) / n.x;
            if x >= left - eps && x <= right + eps {
                push_unique(Vec2::new(x.clamp(left, right), y));
            }
        }
    }

    if points.len() < 2 {
        return None;
    }
    let direction = line.direction();
    let (mut first, mut last) = (points[0], points[0]);
    for p in &points[1..] {
        if p.dot(&direction) < first.dot(&direction) {
            first = *p;
        }
        if p.dot(&direction) > last.dot(&direction) {
            last = *p;
        }
    }
    Some((first, last))
}
