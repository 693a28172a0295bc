// Demo scene: shapes bouncing around the viewport, plus a pointer trail.

use heatmap_renderer::{Geometry, Point, Shape};

/// Tiny xorshift generator; deterministic per seed.
pub struct Rng32 {
    state: u32,
}

impl Rng32 {
    pub fn from_seed(seed: u32) -> Self {
        Self { state: seed | 1 }
    }

    #[inline]
    fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Uniform in [0, 1).
    #[inline]
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / ((1u32 << 24) as f32)
    }

    /// Uniform integer in [0, max).
    #[inline]
    pub fn below(&mut self, max: u32) -> u32 {
        (self.next_f32() * max as f32) as u32
    }
}

struct Body {
    shape: Shape,
    vx: f32,
    vy: f32,
}

/// Horizontal and vertical footprint used for wall bounces.
fn extent(shape: &Shape) -> (f32, f32) {
    match &shape.geometry {
        Geometry::Circle { radius } | Geometry::Diamond { radius } => (radius * 2.0, radius * 2.0),
        Geometry::Rectangle { width, height } => (*width, *height),
        Geometry::Path { points } => {
            let span = |f: fn(&Point) -> f32| {
                let (lo, hi) = points
                    .iter()
                    .map(f)
                    .fold((f32::INFINITY, 0.0f32), |(lo, hi), v| (lo.min(v), hi.max(v)));
                hi - lo
            };
            (span(|p| p.x), span(|p| p.y))
        }
    }
}

pub struct Scene {
    bodies: Vec<Body>,
    trail: Vec<Shape>,
}

impl Scene {
    /// `count` random shapes launched from the center of a `width` x `height` area.
    pub fn bouncing(seed: u32, count: usize, width: u32, height: u32) -> Self {
        let mut rng = Rng32::from_seed(seed);
        let (x, y) = (width as f32 / 2.0, height as f32 / 2.0);

        let bodies = (0..count)
            .map(|_| {
                let value = rng.below(100) as f32;
                let pick = rng.next_f32();
                let shape = if pick <= 0.25 {
                    Shape::diamond(x, y, value, 40.0)
                } else if pick <= 0.5 {
                    Shape::circle(x, y, value, 20.0)
                } else if pick <= 0.75 {
                    let points = vec![
                        Point::new(0.0, 100.0),
                        Point::new(0.0, 0.0),
                        Point::new(200.0, 0.0),
                        Point::new(200.0, 100.0),
                    ];
                    Shape::path(x, y, value, points)
                } else {
                    Shape::rectangle(x, y, value, rng.next_f32() * 200.0, rng.next_f32() * 100.0)
                };
                let mut speed = || 2.0 * rng.next_f32() * (rng.below(6) as f32 - 3.0);
                let (vx, vy) = (speed(), speed());
                Body { shape, vx, vy }
            })
            .collect();

        Self { bodies, trail: Vec::new() }
    }

    /// Largest value in the scene; used as the normalization maximum.
    pub fn max_value(&self) -> f32 {
        self.bodies.iter().map(|b| b.shape.value).fold(0.0, f32::max)
    }

    /// Advance every body one frame, reflecting off the area's edges.
    pub fn step(&mut self, width: u32, height: u32) {
        let (max_x, max_y) = (width as f32, height as f32);
        for body in &mut self.bodies {
            let (w, h) = extent(&body.shape);
            let s = &mut body.shape;
            if s.x + w + body.vx > max_x || s.x + body.vx < 0.0 {
                body.vx = -body.vx;
            }
            if s.y + h + body.vy > max_y || s.y + body.vy < 0.0 {
                body.vy = -body.vy;
            }
            s.x += body.vx;
            s.y += body.vy;
        }
    }

    /// Drop a small circle at the pointer.
    pub fn push_trail(&mut self, x: f32, y: f32) {
        const RADIUS: f32 = 20.0;
        self.trail.push(Shape::circle(x - RADIUS, y - RADIUS, 1.0, RADIUS));
    }

    pub fn clear_trail(&mut self) {
        self.trail.clear();
    }

    pub fn shapes(&self) -> Vec<Shape> {
        self.bodies.iter().map(|b| b.shape.clone()).chain(self.trail.iter().cloned()).collect()
    }
}
