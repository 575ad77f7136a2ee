// caliper_core/src/measurement/reference.rs

//! Everyday objects of standard size, usable as calibration references when
//! an object detector recognizes them in the frame.

use serde::{Deserialize, Serialize};

/// Known object sizes in millimeters, matched as substrings of a detector label.
///
/// The size is the extent along the bounding box's width, which is what the
/// detection calibration measures.
pub const KNOWN_OBJECTS: &[(&str, f64)] = &[
    ("credit card", 85.6),
    ("coin", 24.26),
    ("smartphone", 150.0),
    ("book", 200.0),
    ("bottle", 240.0),
    ("soda can", 123.0),
    ("a4", 297.0),
    ("cd", 120.0),
    ("dvd", 120.0),
    ("pencil", 175.0),
    ("hand", 190.0),
];

/// Looks up the real size of a labelled object, in meters.
pub fn known_object_size(label: &str) -> Option<f64> {
    let label = label.to_lowercase();
    KNOWN_OBJECTS
        .iter()
        .find(|(name, _)| label.contains(name))
        .map(|(_, mm)| mm / 1000.0)
}

/// Axis-aligned box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        (self.right - self.left).abs()
    }

    pub fn height(&self) -> f64 {
        (self.bottom - self.top).abs()
    }
}

/// One detection handed over by the object-detection collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub label: String,
    /// Detector score in `[0, 1]`.
    pub confidence: f64,
    pub bounding_box: BoundingBox,
}

impl DetectedObject {
    pub fn known_size(&self) -> Option<f64> {
        known_object_size(&self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_match_case_insensitively() {
        assert_eq!(known_object_size("VISA Credit Card"), Some(0.0856));
        assert_eq!(known_object_size("euro coin"), Some(0.02426));
        assert_eq!(known_object_size("giraffe"), None);
    }

    #[test]
    fn box_extent_ignores_corner_order() {
        let b = BoundingBox {
            left: 120.0,
            top: 40.0,
            right: 20.0,
            bottom: 90.0,
        };
        assert_eq!(b.width(), 100.0);
        assert_eq!(b.height(), 50.0);
    }
}
