//! Anchor (prior) generation for Single Shot MultiBox Detectors (SSDs).
//!
//! Only the anchor layout used by the MediaPipe detection networks is supported: every cell of an
//! output feature map gets a fixed number of anchors, all centered in the cell. Box sizes are
//! regressed by the network directly, so anchors carry no size.

use std::ops::Index;

use crate::image::Resolution;

/// An anchor of an SSD network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    // values range from 0 to 1
    x_center: f32,
    y_center: f32,
}

impl Anchor {
    pub fn x_center(&self) -> f32 {
        self.x_center
    }

    pub fn y_center(&self) -> f32 {
        self.y_center
    }
}

/// Describes an output layer of an SSD network.
#[derive(Debug, Clone, Copy)]
pub struct LayerInfo {
    /// Number of anchors per feature map cell. Non-zero.
    boxes_per_cell: u32,
    /// Feature map resolution of this layer.
    resolution: Resolution,
}

impl LayerInfo {
    /// Creates a new SSD layer description.
    ///
    /// - `boxes_per_cell`: the number of anchors associated with each cell in this feature map.
    /// - `width`/`height`: size of this layer's feature map, in output cells.
    pub fn new(boxes_per_cell: u32, width: u32, height: u32) -> Self {
        assert_ne!(boxes_per_cell, 0);
        Self {
            boxes_per_cell,
            resolution: Resolution::new(width, height),
        }
    }
}

/// The full list of anchors of a network, in output order.
pub struct Anchors {
    anchors: Vec<Anchor>,
}

impl Anchors {
    pub fn calculate(layers: &[LayerInfo]) -> Self {
        let mut anchors = Vec::new();

        for layer in layers {
            let height = layer.resolution.height();
            let width = layer.resolution.width();

            for y in 0..height {
                for x in 0..width {
                    let anchor = Anchor {
                        x_center: (x as f32 + 0.5) / width as f32,
                        y_center: (y as f32 + 0.5) / height as f32,
                    };
                    anchors.extend((0..layer.boxes_per_cell).map(|_| anchor));
                }
            }
        }

        Self { anchors }
    }

    /// Returns the total number of SSD anchors.
    pub fn anchor_count(&self) -> usize {
        self.anchors.len()
    }
}

impl Index<usize> for Anchors {
    type Output = Anchor;

    fn index(&self, index: usize) -> &Anchor {
        &self.anchors[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palm_anchor_layout() {
        let anchors = Anchors::calculate(&[LayerInfo::new(2, 24, 24), LayerInfo::new(6, 12, 12)]);
        assert_eq!(anchors.anchor_count(), 2016);

        // Both anchors of a cell share its center.
        assert_eq!(anchors[0], anchors[1]);
        assert_eq!(anchors[0].x_center(), 0.5 / 24.0);
        assert_eq!(anchors[2].x_center(), 1.5 / 24.0);

        // The first anchor of the second layer.
        let first = &anchors[24 * 24 * 2];
        assert_eq!((first.x_center(), first.y_center()), (0.5 / 12.0, 0.5 / 12.0));
        let last = &anchors[2015];
        assert_eq!((last.x_center(), last.y_center()), (11.5 / 12.0, 11.5 / 12.0));
    }
}
