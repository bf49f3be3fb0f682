//! Training-time image transform: RGB, bilinear resize, rescale, normalize, CHW.
//!
//! The order of the steps is part of the model contract. Reordering them changes
//! the numeric output even when every individual step is correct.

use crate::error::ClassifierError;
use crate::model_config::PreprocessorConfig;
use image::imageops::FilterType;
use image::{ImageFormat, RgbImage};
use ndarray::Array3;
use std::io::Cursor;
use std::path::Path;

/// Interleaved channel order of a decoded 8-bit buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// Decoded 3-channel 8-bit pixels, row-major and interleaved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub order: ChannelOrder,
    pub pixels: Vec<u8>,
}

impl RawImage {
    pub fn new(
        width: u32,
        height: u32,
        order: ChannelOrder,
        pixels: Vec<u8>,
    ) -> Result<Self, ClassifierError> {
        if width == 0 || height == 0 {
            return Err(ClassifierError::InvalidImage(format!(
                "image has zero extent ({width}x{height})"
            )));
        }
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(ClassifierError::InvalidImage(format!(
                "expected {expected} bytes for {width}x{height}x3, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            order,
            pixels,
        })
    }

    /// Step 1: channel-order normalization.
    fn to_rgb(&self) -> Result<RgbImage, ClassifierError> {
        let pixels = match self.order {
            ChannelOrder::Rgb => self.pixels.clone(),
            ChannelOrder::Bgr => self
                .pixels
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
        };
        RgbImage::from_raw(self.width, self.height, pixels).ok_or_else(|| {
            ClassifierError::InvalidImage("pixel buffer does not match dimensions".to_string())
        })
    }
}

/// An image as the caller hands it over: an encoded file or decoded pixels.
#[derive(Debug, Clone)]
pub enum ImageInput {
    Encoded { file_name: String, bytes: Vec<u8> },
    Pixels(RawImage),
}

impl ImageInput {
    pub fn from_path(path: &Path) -> Result<Self, ClassifierError> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image")
            .to_string();
        Ok(ImageInput::Encoded { file_name, bytes })
    }

    pub fn file_name(&self) -> &str {
        match self {
            ImageInput::Encoded { file_name, .. } => file_name,
            ImageInput::Pixels(_) => "image.png",
        }
    }

    /// Decodes to RGB pixels. Encoded files always decode to RGB.
    pub fn decode(&self) -> Result<RgbImage, ClassifierError> {
        let rgb = match self {
            ImageInput::Encoded { bytes, .. } => image::load_from_memory(bytes)
                .map_err(|e| ClassifierError::InvalidImage(format!("cannot decode image: {e}")))?
                .to_rgb8(),
            ImageInput::Pixels(raw) => raw.to_rgb()?,
        };
        if rgb.width() == 0 || rgb.height() == 0 {
            return Err(ClassifierError::InvalidImage(
                "image has zero extent".to_string(),
            ));
        }
        Ok(rgb)
    }

    /// Bytes to upload to a deployment that preprocesses server-side.
    ///
    /// Encoded files pass through untouched; pixel buffers are converted to RGB
    /// first and sent as PNG.
    pub fn upload_bytes(&self) -> Result<Vec<u8>, ClassifierError> {
        match self {
            ImageInput::Encoded { bytes, .. } => Ok(bytes.clone()),
            ImageInput::Pixels(raw) => {
                let rgb = raw.to_rgb()?;
                let mut out = Cursor::new(Vec::new());
                rgb.write_to(&mut out, ImageFormat::Png)?;
                Ok(out.into_inner())
            }
        }
    }
}

/// A (C, H, W) float tensor produced by [`Preprocessor`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor {
    data: Array3<f32>,
}

impl NormalizedTensor {
    /// Wraps an arbitrary array; the engine's shape check still applies.
    pub fn from_array(data: Array3<f32>) -> Self {
        Self { data }
    }

    pub fn shape(&self) -> [usize; 3] {
        let s = self.data.shape();
        [s[0], s[1], s[2]]
    }

    pub fn as_array(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn into_array(self) -> Array3<f32> {
        self.data
    }
}

#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    config: PreprocessorConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessorConfig) -> Result<Self, ClassifierError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PreprocessorConfig {
        &self.config
    }

    pub fn preprocess(&self, image: &ImageInput) -> Result<NormalizedTensor, ClassifierError> {
        let rgb = image.decode()?;
        Ok(self.normalize(&rgb))
    }

    fn normalize(&self, rgb: &RgbImage) -> NormalizedTensor {
        let config = &self.config;
        let target_height = config.size.height;
        let target_width = config.size.width;

        // Triangle is the bilinear kernel.
        let resized = image::imageops::resize(
            rgb,
            target_width as u32,
            target_height as u32,
            FilterType::Triangle,
        );

        let mut array = Array3::<f32>::zeros((3, target_height, target_width));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                let value = pixel[c] as f32 / config.pixel_scale;
                array[[c, y as usize, x as usize]] =
                    (value - config.image_mean[c]) / config.image_std[c];
            }
        }
        NormalizedTensor { data: array }
    }
}
