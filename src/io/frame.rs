//! Captured frames

/// A grayscale camera frame handed to the extractor
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    index: usize,
    timestamp: f64,
    width: u32,
    height: u32,
    gray: Vec<u8>,
}

impl Frame {
    /// Wrap a grayscale buffer; `None` when its size does not match
    pub fn new(index: usize, timestamp: f64, width: u32, height: u32, gray: Vec<u8>) -> Option<Self> {
        if gray.len() != (width as usize) * (height as usize) {
            return None;
        }
        Some(Self {
            index,
            timestamp,
            width,
            height,
            gray,
        })
    }

    /// A frame without pixels, for sources whose descriptors come precomputed
    pub fn empty(index: usize, timestamp: f64) -> Self {
        Self {
            index,
            timestamp,
            width: 0,
            height: 0,
            gray: Vec::new(),
        }
    }

    /// Convert an interleaved 3-channel capture (BGR, as cameras deliver it)
    pub fn from_bgr(index: usize, timestamp: f64, width: u32, height: u32, bgr: &[u8]) -> Option<Self> {
        let gray = to_grayscale(bgr, width, height)?;
        Self::new(index, timestamp, width, height, gray)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn gray(&self) -> &[u8] {
        &self.gray
    }
}

/// Luma of an interleaved BGR image. Single-channel input is passed through.
pub fn to_grayscale(image: &[u8], width: u32, height: u32) -> Option<Vec<u8>> {
    let expected_gray = (width as usize) * (height as usize);
    let expected_bgr = expected_gray * 3;

    if image.len() == expected_gray {
        return Some(image.to_vec());
    }
    if image.len() != expected_bgr {
        return None;
    }

    Some(
        image
            .chunks_exact(3)
            .map(|px| {
                let b = px[0] as f32;
                let g = px[1] as f32;
                let r = px[2] as f32;
                (0.299 * r + 0.587 * g + 0.114 * b).round() as u8
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_checked() {
        assert!(Frame::new(0, 0.0, 4, 4, vec![0; 16]).is_some());
        assert!(Frame::new(0, 0.0, 4, 4, vec![0; 15]).is_none());
    }

    #[test]
    fn test_bgr_conversion() {
        // Pure red, pure green, pure blue, white.
        let bgr = [0, 0, 255, 0, 255, 0, 255, 0, 0, 255, 255, 255];
        let frame = Frame::from_bgr(3, 0.1, 2, 2, &bgr).unwrap();

        assert_eq!(frame.gray(), &[76, 150, 29, 255]);
        assert_eq!(frame.index(), 3);
    }

    #[test]
    fn test_gray_passthrough_and_bad_size() {
        assert_eq!(to_grayscale(&[1, 2, 3, 4], 2, 2), Some(vec![1, 2, 3, 4]));
        assert_eq!(to_grayscale(&[1, 2, 3, 4, 5], 2, 2), None);
    }
}
