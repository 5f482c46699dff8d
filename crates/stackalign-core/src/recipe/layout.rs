use crate::affine::Point;
use crate::frame::ImageSize;

/// Arrangement of correlation windows over an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowLayout {
    /// One window centred on the image.
    Single,
    /// `n x n` grid of equal cells, one window per cell.
    Grid(usize),
}

impl WindowLayout {
    /// Window centres, x varying fastest.
    pub fn centers(&self, image: ImageSize) -> Vec<Point> {
        match *self {
            Self::Single => vec![Point::new(
                (image.width / 2) as f64,
                (image.height / 2) as f64,
            )],
            Self::Grid(n) => {
                let n = n.max(1);
                let sx = image.width / n;
                let sy = image.height / n;
                let mut points = Vec::with_capacity(n * n);
                for y in 0..n {
                    for x in 0..n {
                        points.push(Point::new(
                            (0.5 * sx as f64 + (sx * x) as f64).floor(),
                            (0.5 * sy as f64 + (sy * y) as f64).floor(),
                        ));
                    }
                }
                points
            }
        }
    }

    /// Window size: the cell scaled by `scale_factor`, truncated.
    pub fn window(&self, image: ImageSize, scale_factor: f64) -> ImageSize {
        let (cw, ch) = match *self {
            Self::Single => (image.width, image.height),
            Self::Grid(n) => (image.width / n.max(1), image.height / n.max(1)),
        };
        ImageSize::new(
            (scale_factor * cw as f64) as usize,
            (scale_factor * ch as f64) as usize,
        )
    }

    pub fn window_count(&self) -> usize {
        match *self {
            Self::Single => 1,
            Self::Grid(n) => n * n,
        }
    }
}
