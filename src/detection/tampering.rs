use std::collections::BTreeMap;

use image::{GrayImage, Luma, RgbImage};
use imageproc::region_labelling::{Connectivity, connected_components};
use ndarray::Array2;

use crate::{
    Region,
    detection::signature::{SignatureKey, draw_signature},
    error::{Result, ensure_same_dimensions},
    report::visualization::Visualizer,
};

pub const DEFAULT_THRESHOLD: u32 = 50;
pub const DEFAULT_PADDING: u32 = 3;

/// Per-pixel sum of absolute channel differences, indexed `[y, x]`.
pub fn energy_map(original: &RgbImage, suspect: &RgbImage) -> Result<Array2<u32>> {
    ensure_same_dimensions(original.dimensions(), suspect.dimensions())?;

    let (width, height) = original.dimensions();
    let mut energy = Array2::zeros((height as usize, width as usize));

    for ((x, y, a), b) in original.enumerate_pixels().zip(suspect.pixels()) {
        let sum = a
            .0
            .iter()
            .zip(b.0.iter())
            .map(|(&p, &q)| (p as i32 - q as i32).unsigned_abs())
            .sum::<u32>();
        energy[[y as usize, x as usize]] = sum;
    }

    Ok(energy)
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiffMask {
    mask: GrayImage,
}

impl DiffMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            mask: GrayImage::new(width, height),
        }
    }

    pub fn from_energy(energy: &Array2<u32>, threshold: u32) -> Self {
        let (height, width) = energy.dim();
        let mut mask = Self::new(width as u32, height as u32);

        for ((y, x), &value) in energy.indexed_iter() {
            if value > threshold {
                mask.set(x as u32, y as u32, true);
            }
        }

        mask
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        self.mask.put_pixel(x, y, Luma([if value { 255 } else { 0 }]));
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.mask.get_pixel(x, y)[0] != 0
    }

    pub fn count(&self) -> usize {
        self.mask.pixels().filter(|p| p[0] != 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.mask.pixels().all(|p| p[0] == 0)
    }

    /// Tight bounding boxes of the maximal connected clusters, ordered top to
    /// bottom then left to right.
    pub fn components(&self, connectivity: Connectivity) -> Vec<Region> {
        let labels = connected_components(&self.mask, connectivity, Luma([0u8]));
        let mut boxes: BTreeMap<u32, Region> = BTreeMap::new();

        for (x, y, label) in labels.enumerate_pixels() {
            let label = label[0];
            if label == 0 {
                continue;
            }

            boxes
                .entry(label)
                .and_modify(|r| {
                    r.x_start = r.x_start.min(x);
                    r.y_start = r.y_start.min(y);
                    r.x_stop = r.x_stop.max(x + 1);
                    r.y_stop = r.y_stop.max(y + 1);
                })
                .or_insert(Region {
                    x_start: x,
                    y_start: y,
                    x_stop: x + 1,
                    y_stop: y + 1,
                });
        }

        let mut regions = boxes.into_values().collect::<Vec<_>>();
        regions.sort_by_key(|r| (r.y_start, r.x_start, r.y_stop, r.x_stop));
        regions
    }
}

pub fn extract_regions(mask: &DiffMask, connectivity: Connectivity, padding: u32) -> Vec<Region> {
    let (width, height) = mask.dimensions();
    mask.components(connectivity)
        .into_iter()
        .map(|r| r.padded(padding, width, height))
        .collect()
}

#[derive(Debug, Clone)]
pub struct DifferenceResult {
    /// Suspect copy with region outlines and the signature marker. Equal to
    /// the suspect when nothing was flagged.
    pub annotated: RgbImage,
    pub tampered: bool,
    pub max_energy: u32,
    pub changed_pixels: usize,
    pub regions: Vec<Region>,
}

impl DifferenceResult {
    pub fn verdict(&self) -> String {
        if self.tampered {
            format!(
                "Tampering detected: {} changed region(s) covering {} pixel(s)",
                self.regions.len(),
                self.changed_pixels
            )
        } else {
            "No tampering detected".to_string()
        }
    }
}

pub struct DifferenceDetector {
    threshold: u32,
    padding: u32,
    connectivity: Connectivity,
    visualizer: Visualizer,
}

impl DifferenceDetector {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            padding: DEFAULT_PADDING,
            connectivity: Connectivity::Four,
            visualizer: Visualizer::new(),
        }
    }

    pub fn with_padding(mut self, padding: u32) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn detect(
        &self,
        original: &RgbImage,
        suspect: &RgbImage,
        key: &SignatureKey,
    ) -> Result<DifferenceResult> {
        let energy = energy_map(original, suspect)?;
        let max_energy = energy.iter().copied().max().unwrap_or(0);

        if max_energy <= self.threshold {
            log::debug!(
                "Max energy {} within threshold {}, skipping clustering",
                max_energy,
                self.threshold
            );
            return Ok(DifferenceResult {
                annotated: suspect.clone(),
                tampered: false,
                max_energy,
                changed_pixels: 0,
                regions: Vec::new(),
            });
        }

        let mask = DiffMask::from_energy(&energy, self.threshold);
        let regions = extract_regions(&mask, self.connectivity, self.padding);

        let mut annotated = suspect.clone();
        for region in &regions {
            self.visualizer.draw_region_outline(&mut annotated, region);
        }
        draw_signature(&mut annotated, key);

        log::info!(
            "Difference check flagged {} region(s), max energy {}",
            regions.len(),
            max_energy
        );

        Ok(DifferenceResult {
            annotated,
            tampered: true,
            max_energy,
            changed_pixels: mask.count(),
            regions,
        })
    }
}

impl Default for DifferenceDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

pub fn detect_differences(
    original: &RgbImage,
    suspect: &RgbImage,
    key: &SignatureKey,
    threshold: u32,
) -> Result<DifferenceResult> {
    DifferenceDetector::new(threshold).detect(original, suspect, key)
}
