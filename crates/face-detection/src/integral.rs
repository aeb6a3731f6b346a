//! Summed-area tables for constant-time rectangle sums

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::{integral_image, integral_squared_image, sum_image_pixels};

type Table = ImageBuffer<Luma<u64>, Vec<u64>>;

/// Integral image of pixel values and squared pixel values
#[derive(Debug, Clone)]
pub struct IntegralImage {
    width: u32,
    height: u32,
    sum: Table,
    sq_sum: Table,
}

impl IntegralImage {
    /// Build the tables for a grayscale image
    #[must_use]
    pub fn new(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            sum: integral_image::<_, u64>(image),
            sq_sum: integral_squared_image::<_, u64>(image),
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Sum of pixels in the rectangle `[x, x + w) x [y, y + h)`
    #[must_use]
    #[inline]
    pub fn rect_sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        Self::lookup(&self.sum, x, y, w, h)
    }

    /// Sum of squared pixels in the rectangle `[x, x + w) x [y, y + h)`
    #[must_use]
    #[inline]
    pub fn rect_sq_sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        Self::lookup(&self.sq_sum, x, y, w, h)
    }

    #[inline]
    fn lookup(table: &Table, x: u32, y: u32, w: u32, h: u32) -> u64 {
        if w == 0 || h == 0 {
            return 0;
        }
        // Bounds are inclusive
        sum_image_pixels(table, x, y, x + w - 1, y + h - 1)[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_image_sums() {
        let img = GrayImage::from_pixel(10, 8, Luma([3]));
        let integral = IntegralImage::new(&img);
        assert_eq!(integral.rect_sum(0, 0, 10, 8), 3 * 80);
        assert_eq!(integral.rect_sq_sum(0, 0, 10, 8), 9 * 80);
        assert_eq!(integral.rect_sum(2, 3, 4, 2), 3 * 8);
        assert_eq!(integral.rect_sum(4, 4, 0, 0), 0);
    }

    #[test]
    fn test_matches_brute_force() {
        let img = GrayImage::from_fn(13, 9, |x, y| Luma([((x * 37 + y * 11) % 256) as u8]));
        let integral = IntegralImage::new(&img);

        let (x, y, w, h) = (3, 2, 7, 5);
        let mut expected = 0u64;
        let mut expected_sq = 0u64;
        for yy in y..y + h {
            for xx in x..x + w {
                let v = u64::from(img.get_pixel(xx, yy).0[0]);
                expected += v;
                expected_sq += v * v;
            }
        }

        assert_eq!(integral.rect_sum(x, y, w, h), expected);
        assert_eq!(integral.rect_sq_sum(x, y, w, h), expected_sq);
        assert_eq!((integral.width(), integral.height()), (13, 9));
    }

    #[test]
    fn test_single_pixel_at_far_corner() {
        let img = GrayImage::from_fn(5, 4, |x, y| Luma([(x * 10 + y) as u8]));
        let integral = IntegralImage::new(&img);
        assert_eq!(integral.rect_sum(4, 3, 1, 1), 43);
        assert_eq!(integral.rect_sq_sum(4, 3, 1, 1), 43 * 43);
    }
}
