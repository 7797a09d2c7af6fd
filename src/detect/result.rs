use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in source-image pixel space.
///
/// Construction through [`DetectionBox::new`] guarantees `x1 < x2` and `y1 < y2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl DetectionBox {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Result<Self> {
        if x1 >= x2 || y1 >= y2 {
            return Err(anyhow!(
                "degenerate box ({}, {}) - ({}, {})",
                x1,
                y1,
                x2,
                y2
            ));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    /// Center point, used for zone and mask membership.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.x1 as f64 + self.x2 as f64) / 2.0,
            (self.y1 as f64 + self.y2 as f64) / 2.0,
        )
    }
}

/// A single classified, scored box produced by one inference call.
///
/// Serializes to the outbound wire shape
/// `{pred_cls_name, pred_cls_idx, pred_score, box: {x1, y1, x2, y2}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "pred_cls_name")]
    pub class_name: String,
    #[serde(rename = "pred_cls_idx")]
    pub class_idx: u32,
    #[serde(rename = "pred_score")]
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: DetectionBox,
}

impl Detection {
    pub fn new(class_name: &str, class_idx: u32, confidence: f32, bbox: DetectionBox) -> Self {
        Self {
            class_name: class_name.to_string(),
            class_idx,
            confidence,
            bbox,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_rejects_inverted_coordinates() {
        assert!(DetectionBox::new(10, 10, 5, 20).is_err());
        assert!(DetectionBox::new(10, 10, 20, 10).is_err());
        assert!(DetectionBox::new(0, 0, 1, 1).is_ok());
    }

    #[test]
    fn box_center_is_midpoint() -> Result<()> {
        let b = DetectionBox::new(10, 20, 30, 60)?;
        assert_eq!(b.center(), (20.0, 40.0));
        assert_eq!(b.width(), 20);
        assert_eq!(b.height(), 40);
        Ok(())
    }

    #[test]
    fn detection_serializes_to_wire_names() -> Result<()> {
        let d = Detection::new("person", 0, 0.8, DetectionBox::new(1, 2, 3, 4)?);
        let json = serde_json::to_value(&d)?;
        assert_eq!(json["pred_cls_name"], "person");
        assert_eq!(json["pred_cls_idx"], 0);
        assert_eq!(json["box"]["x2"], 3);
        Ok(())
    }
}
