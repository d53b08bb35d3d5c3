use image::{GrayImage, RgbImage};

/// One packed RGB8 camera frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl Frame {
    /// Returns `None` when the buffer length doesn't match the dimensions
    pub fn from_rgb(width: u32, height: u32, rgb: Vec<u8>) -> Option<Self> {
        if rgb.len() != (width as usize) * (height as usize) * 3 {
            return None;
        }
        Some(Self { width, height, rgb })
    }

    /// Uniform frame, used by tests and as a placeholder
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            rgb: vec![value; (width as usize) * (height as usize) * 3],
        }
    }

    pub fn to_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.rgb.clone())
    }

    pub fn to_luma(&self) -> Option<GrayImage> {
        self.to_image()
            .map(|img| image::DynamicImage::ImageRgb8(img).into_luma8())
    }

    /// Pixels as `0RGB` words, the layout preview windows expect
    pub fn to_argb_words(&self) -> Vec<u32> {
        self.rgb
            .chunks_exact(3)
            .map(|px| ((px[0] as u32) << 16) | ((px[1] as u32) << 8) | px[2] as u32)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgb_checks_length() {
        assert!(Frame::from_rgb(2, 2, vec![0; 12]).is_some());
        assert!(Frame::from_rgb(2, 2, vec![0; 11]).is_none());
    }

    #[test]
    fn test_argb_words() {
        let frame = Frame::from_rgb(1, 1, vec![0x12, 0x34, 0x56]).unwrap();
        assert_eq!(frame.to_argb_words(), vec![0x0012_3456]);
    }

    #[test]
    fn test_to_luma_dimensions() {
        let luma = Frame::filled(4, 3, 200).to_luma().unwrap();
        assert_eq!(luma.dimensions(), (4, 3));
    }
}
