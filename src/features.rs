use serde::{Deserialize, Serialize};

use crate::error::FeatureError;

/// An interest point in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub p2d: glam::Vec2,
    #[serde(default)]
    pub scale: f32,
    #[serde(default)]
    pub orientation: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Keypoint {
        Keypoint {
            p2d: glam::Vec2::new(x, y),
            scale: 1.0,
            orientation: 0.0,
        }
    }
}

/// Keypoints of one image together with one fixed-length descriptor each.
///
/// Descriptors are stored flat, row-major, `descriptor_len` bytes per keypoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureStore {
    pub width: u32,
    pub height: u32,
    descriptor_len: usize,
    keypoints: Vec<Keypoint>,
    descriptors: Vec<u8>,
}

impl FeatureStore {
    pub fn new(width: u32, height: u32, descriptor_len: usize) -> FeatureStore {
        FeatureStore {
            width,
            height,
            descriptor_len,
            keypoints: Vec::new(),
            descriptors: Vec::new(),
        }
    }

    pub fn from_parts(
        width: u32,
        height: u32,
        keypoints: Vec<Keypoint>,
        descriptors: &[Vec<u8>],
    ) -> Result<FeatureStore, FeatureError> {
        if keypoints.len() != descriptors.len() {
            return Err(FeatureError::CountMismatch {
                keypoints: keypoints.len(),
                descriptors: descriptors.len(),
            });
        }
        let descriptor_len = descriptors.first().map(|d| d.len()).unwrap_or(0);
        let mut store = FeatureStore::new(width, height, descriptor_len);
        for (kp, desc) in keypoints.into_iter().zip(descriptors) {
            store.push(kp, desc)?;
        }
        Ok(store)
    }

    pub fn push(&mut self, keypoint: Keypoint, descriptor: &[u8]) -> Result<usize, FeatureError> {
        if descriptor.len() != self.descriptor_len {
            return Err(FeatureError::DescriptorLength {
                expected: self.descriptor_len,
                got: descriptor.len(),
            });
        }
        self.keypoints.push(keypoint);
        self.descriptors.extend_from_slice(descriptor);
        Ok(self.keypoints.len() - 1)
    }

    /// Checks that the flat descriptor buffer matches the keypoint count.
    pub fn validate(&self) -> Result<(), FeatureError> {
        let expected = self.keypoints.len() * self.descriptor_len;
        if self.descriptors.len() != expected {
            let descriptors = if self.descriptor_len == 0 {
                self.descriptors.len()
            } else {
                self.descriptors.len() / self.descriptor_len
            };
            return Err(FeatureError::CountMismatch {
                keypoints: self.keypoints.len(),
                descriptors,
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }
    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
    pub fn descriptor_len(&self) -> usize {
        self.descriptor_len
    }
    pub fn image_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }
    pub fn keypoint(&self, idx: usize) -> Option<&Keypoint> {
        self.keypoints.get(idx)
    }
    pub fn descriptor(&self, idx: usize) -> Option<&[u8]> {
        if idx >= self.keypoints.len() {
            return None;
        }
        let start = idx * self.descriptor_len;
        self.descriptors.get(start..start + self.descriptor_len)
    }
    pub fn descriptors(&self) -> impl Iterator<Item = &[u8]> {
        (0..self.len()).map(|i| &self.descriptors[i * self.descriptor_len..(i + 1) * self.descriptor_len])
    }
}
