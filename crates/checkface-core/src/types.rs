use serde::{Deserialize, Serialize};

/// 2D point in frame pixel coordinates.
pub type Point = (f32, f32);

/// Dimension of an ArcFace embedding.
pub const EMBEDDING_DIM: usize = 512;

/// Axis-aligned face bounding box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Width over height, 0 for a degenerate box.
    pub fn ratio(&self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            0.0
        }
    }

    /// The four corners followed by the four edge midpoints.
    pub fn extrema(&self) -> [Point; 8] {
        let (x0, y0) = (self.x, self.y);
        let (x1, y1) = (self.x + self.width, self.y + self.height);
        let (mx, my) = self.center();
        [
            (x0, y0),
            (x1, y0),
            (x0, y1),
            (x1, y1),
            (mx, y0),
            (mx, y1),
            (x0, my),
            (x1, my),
        ]
    }
}

/// Face embedding produced by the recognition model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }
}

/// An enrolled identity held in the in-memory gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedFace {
    pub id: String,
    pub display_name: String,
    /// L2-normalized at enrollment.
    pub embedding: Embedding,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_derived_values() {
        let b = BoundingBox::new(10.0, 20.0, 100.0, 200.0);
        assert_eq!(b.center(), (60.0, 120.0));
        assert_eq!(b.area(), 20_000.0);
        assert!((b.ratio() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_bbox_degenerate_ratio() {
        let b = BoundingBox::new(0.0, 0.0, 10.0, 0.0);
        assert_eq!(b.ratio(), 0.0);
    }

    #[test]
    fn test_extrema_order() {
        let b = BoundingBox::new(0.0, 0.0, 4.0, 2.0);
        let pts = b.extrema();
        assert_eq!(pts[0], (0.0, 0.0));
        assert_eq!(pts[3], (4.0, 2.0));
        assert_eq!(pts[4], (2.0, 0.0));
        assert_eq!(pts[7], (4.0, 1.0));
    }
}
