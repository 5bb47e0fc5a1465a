use image::{GrayImage, Luma, RgbImage, imageops::FilterType};
use ndarray::Array2;

pub fn rgb_to_gray(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut gray = GrayImage::new(width, height);

    for (x, y, pixel) in image.enumerate_pixels() {
        let lum = (0.299 * pixel[0] as f64 + 0.587 * pixel[1] as f64 + 0.114 * pixel[2] as f64)
            .round()
            .min(255.0) as u8;
        gray.put_pixel(x, y, Luma([lum]));
    }

    gray
}

pub fn gray_to_array(image: &GrayImage) -> Array2<f64> {
    let (width, height) = image.dimensions();
    let mut arr = Array2::zeros((height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        arr[[y as usize, x as usize]] = pixel[0] as f64;
    }

    arr
}

pub fn array_to_gray(arr: &Array2<f64>) -> GrayImage {
    let (height, width) = arr.dim();
    let mut image = GrayImage::new(width as u32, height as u32);

    for ((y, x), &value) in arr.indexed_iter() {
        image.put_pixel(x as u32, y as u32, Luma([value.clamp(0.0, 255.0) as u8]));
    }

    image
}

pub fn gray_to_rgb(gray: &GrayImage) -> RgbImage {
    let (width, height) = gray.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let v = gray.get_pixel(x, y)[0];
        image::Rgb([v, v, v])
    })
}

/// Mirrors an out-of-range index back into `0..len` without repeating the
/// edge sample (`dcb|abcd|cba`).
pub fn reflect_101(index: i64, len: usize) -> usize {
    if len == 1 {
        return 0;
    }

    let last = len as i64 - 1;
    let period = 2 * last;
    let mut i = index.rem_euclid(period);
    if i > last {
        i = period - i;
    }
    i as usize
}

/// Downscales so that the longer side is at most `max_dimension`, keeping the
/// aspect ratio. A cap of 0 disables resizing.
pub fn prepare_image(image: &RgbImage, max_dimension: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let longest = width.max(height);

    if max_dimension == 0 || longest <= max_dimension {
        log::debug!("Image size {}x{} within cap {}, no resize", width, height, max_dimension);
        return image.clone();
    }

    let ratio = max_dimension as f64 / longest as f64;
    let new_width = ((width as f64 * ratio) as u32).max(1);
    let new_height = ((height as f64 * ratio) as u32).max(1);
    log::debug!("Resizing image from {}x{} to {}x{}", width, height, new_width, new_height);

    image::imageops::resize(image, new_width, new_height, FilterType::Lanczos3)
}

pub fn normalize_pair(original: &RgbImage, suspect: &RgbImage) -> RgbImage {
    if original.dimensions() == suspect.dimensions() {
        return suspect.clone();
    }

    let (width, height) = original.dimensions();
    log::debug!(
        "Resizing suspect from {:?} to original size {}x{}",
        suspect.dimensions(),
        width,
        height
    );
    image::imageops::resize(suspect, width, height, FilterType::Lanczos3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflect_keeps_in_range_indices() {
        assert_eq!(reflect_101(0, 5), 0);
        assert_eq!(reflect_101(4, 5), 4);
    }

    #[test]
    fn reflect_mirrors_without_edge_repeat() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(6, 5), 2);
        assert_eq!(reflect_101(-3, 1), 0);
    }

    #[test]
    fn prepare_image_caps_longest_side() {
        let image = RgbImage::new(2000, 1000);
        let resized = prepare_image(&image, 1024);
        assert_eq!(resized.dimensions(), (1024, 512));
    }

    #[test]
    fn prepare_image_leaves_small_images_alone() {
        let image = RgbImage::new(300, 200);
        assert_eq!(prepare_image(&image, 1024).dimensions(), (300, 200));
        assert_eq!(prepare_image(&image, 0).dimensions(), (300, 200));
    }

    #[test]
    fn normalize_pair_matches_original_size() {
        let original = RgbImage::new(64, 48);
        let suspect = RgbImage::new(128, 96);
        assert_eq!(normalize_pair(&original, &suspect).dimensions(), (64, 48));
    }

    #[test]
    fn gray_conversion_of_pure_white() {
        let image = RgbImage::from_pixel(2, 2, image::Rgb([255, 255, 255]));
        assert!(rgb_to_gray(&image).pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn array_round_trip_clamps() {
        let mut arr = Array2::zeros((1, 2));
        arr[[0, 0]] = -20.0;
        arr[[0, 1]] = 400.0;
        let gray = array_to_gray(&arr);
        assert_eq!(gray.get_pixel(0, 0)[0], 0);
        assert_eq!(gray.get_pixel(1, 0)[0], 255);
    }
}
