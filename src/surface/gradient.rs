// Linear and radial gradients with color stops, padded at both ends.

use super::canvas::Color;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Shape {
    Linear {
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
    },
    /// Interpolates between the circle (cx0, cy0, r0) and (cx1, cy1, r1).
    Radial {
        cx0: f32,
        cy0: f32,
        r0: f32,
        cx1: f32,
        cy1: f32,
        r1: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    pub offset: f32,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    shape: Shape,
    stops: Vec<ColorStop>,
}

impl Gradient {
    pub fn linear(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            shape: Shape::Linear { x0, y0, x1, y1 },
            stops: Vec::new(),
        }
    }

    pub fn radial(cx0: f32, cy0: f32, r0: f32, cx1: f32, cy1: f32, r1: f32) -> Self {
        Self {
            shape: Shape::Radial {
                cx0,
                cy0,
                r0,
                cx1,
                cy1,
                r1,
            },
            stops: Vec::new(),
        }
    }

    /// Add a stop; `offset` is clamped into 0..=1.  Stops with equal offsets
    /// keep insertion order, which gives a hard edge.
    pub fn add_color(&mut self, offset: f32, color: Color) {
        let offset = offset.clamp(0.0, 1.0);
        let at = self.stops.partition_point(|s| s.offset <= offset);
        self.stops.insert(at, ColorStop { offset, color });
    }

    pub fn stops(&self) -> &[ColorStop] {
        &self.stops
    }

    /// Color at the point `(x, y)`.  Points the gradient does not reach are
    /// transparent.
    pub fn color_at(&self, x: f32, y: f32) -> Color {
        match self.parameter(x, y) {
            Some(t) => self.color_for(t),
            None => Color::TRANSPARENT,
        }
    }

    fn parameter(&self, x: f32, y: f32) -> Option<f32> {
        match self.shape {
            Shape::Linear { x0, y0, x1, y1 } => {
                let (dx, dy) = (x1 - x0, y1 - y0);
                let len2 = dx * dx + dy * dy;
                if len2 == 0.0 {
                    return Some(0.0);
                }
                Some(((x - x0) * dx + (y - y0) * dy) / len2)
            }
            Shape::Radial {
                cx0,
                cy0,
                r0,
                cx1,
                cy1,
                r1,
            } => {
                // Largest t with |p - c(t)| = r(t) and r(t) >= 0, where
                // c(t) and r(t) interpolate the two circles.
                let (cdx, cdy, dr) = (cx1 - cx0, cy1 - cy0, r1 - r0);
                let (pdx, pdy) = (x - cx0, y - cy0);
                let a = cdx * cdx + cdy * cdy - dr * dr;
                let b = pdx * cdx + pdy * cdy + r0 * dr;
                let c = pdx * pdx + pdy * pdy - r0 * r0;
                let valid = |t: f32| r0 + t * dr >= 0.0;

                if a.abs() < f32::EPSILON {
                    if b == 0.0 {
                        return None;
                    }
                    let t = c / (2.0 * b);
                    return valid(t).then_some(t);
                }
                let disc = b * b - a * c;
                if disc < 0.0 {
                    return None;
                }
                let sq = disc.sqrt();
                let (t1, t2) = ((b + sq) / a, (b - sq) / a);
                let (hi, lo) = if t1 >= t2 { (t1, t2) } else { (t2, t1) };
                if valid(hi) {
                    Some(hi)
                } else if valid(lo) {
                    Some(lo)
                } else {
                    None
                }
            }
        }
    }

    fn color_for(&self, t: f32) -> Color {
        let (Some(first), Some(last)) = (self.stops.first(), self.stops.last()) else {
            return Color::TRANSPARENT;
        };
        if t <= first.offset {
            return first.color;
        }
        if t >= last.offset {
            return last.color;
        }
        for pair in self.stops.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if t >= a.offset && t <= b.offset {
                let span = b.offset - a.offset;
                if span <= 0.0 {
                    return b.color;
                }
                return Color::lerp(a.color, b.color, (t - a.offset) / span);
            }
        }
        last.color
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bw_linear() -> Gradient {
        let mut g = Gradient::linear(0.0, 0.0, 100.0, 0.0);
        g.add_color(0.0, Color::BLACK);
        g.add_color(1.0, Color::WHITE);
        g
    }

    #[test]
    fn linear_midpoint_and_padding() {
        let g = bw_linear();
        let mid = g.color_at(50.0, 7.0);
        assert!((mid.red - 0.5).abs() < 1e-4);
        assert_eq!(g.color_at(-10.0, 0.0), Color::BLACK);
        assert_eq!(g.color_at(500.0, 0.0), Color::WHITE);
    }

    #[test]
    fn stops_are_sorted() {
        let mut g = Gradient::linear(0.0, 0.0, 1.0, 0.0);
        g.add_color(0.8, Color::WHITE);
        g.add_color(0.2, Color::BLACK);
        let offs: Vec<f32> = g.stops().iter().map(|s| s.offset).collect();
        assert_eq!(offs, vec![0.2, 0.8]);
    }

    #[test]
    fn concentric_radial_follows_distance() {
        let mut g = Gradient::radial(50.0, 50.0, 0.0, 50.0, 50.0, 10.0);
        g.add_color(0.0, Color::WHITE);
        g.add_color(1.0, Color::BLACK);
        assert_eq!(g.color_at(50.0, 50.0), Color::WHITE);
        let half = g.color_at(55.0, 50.0);
        assert!((half.red - 0.5).abs() < 1e-4);
        assert_eq!(g.color_at(80.0, 50.0), Color::BLACK);
    }

    #[test]
    fn no_stops_is_transparent() {
        let g = Gradient::linear(0.0, 0.0, 1.0, 1.0);
        assert_eq!(g.color_at(0.5, 0.5), Color::TRANSPARENT);
    }
}
