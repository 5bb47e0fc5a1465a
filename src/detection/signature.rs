use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;
use sha2::{Digest, Sha256};

pub const MARKER_RADIUS: i32 = 10;
pub const MARKER_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignatureKey(String);

impl SignatureKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&hasher.finalize());
        digest
    }

        pub fn fingerprint(&self) -> String {
        hex::encode(self.digest())
    }

    /// Big-endian bytes 0..4 of the digest pick the column, 4..8 the row.
    pub fn position(&self, width: u32, height: u32) -> (u32, u32) {
        let digest = self.digest();
        let x = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        let y = u32::from_be_bytes([digest[4], digest[5], digest[6], digest[7]]);

        (x % width.max(1), y % height.max(1))
    }
}

impl From<&str> for SignatureKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for SignatureKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Draws the marker in place. Parts of the disc outside the image are clipped.
pub fn draw_signature(image: &mut RgbImage, key: &SignatureKey) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    let (x, y) = key.position(width, height);
    draw_filled_circle_mut(image, (x as i32, y as i32), MARKER_RADIUS, MARKER_COLOR);
}

pub fn place_signature(image: &RgbImage, key: &SignatureKey) -> RgbImage {
    let mut marked = image.clone();
    draw_signature(&mut marked, key);
    marked
}
