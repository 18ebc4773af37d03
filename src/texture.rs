use std::path::Path;

use glam::{Vec2, Vec3};
use image::DynamicImage;

lazy_static::lazy_static! {
    // Shared stand-in for assets that failed to load. Magenta makes the
    // failure visible in the output instead of aborting the render.
    static ref SENTINEL: Texture = Texture::solid(Vec3::new(1.0, 0.0, 1.0));
}

/// Decoded 2D RGB texture sampled with nearest-pixel lookup. Pixel data is
/// stored as raw bytes with 1, 3 or 4 channels; grayscale expands to gray
/// RGB on sampling.
#[derive(Clone)]
pub struct Texture {
    width: u32,
    height: u32,
    channels: u32,
    data: Vec<u8>,
}

impl Texture {
    pub fn new(width: u32, height: u32, channels: u32, data: Vec<u8>) -> Self {
        assert!(matches!(channels, 1 | 3 | 4));
        assert_eq!(data.len(), (width * height * channels) as usize);
        Self {
            width,
            height,
            channels,
            data,
        }
    }

    pub fn solid(rgb: Vec3) -> Self {
        let bytes = [
            (rgb.x * 255.0) as u8,
            (rgb.y * 255.0) as u8,
            (rgb.z * 255.0) as u8,
        ];
        Self::new(1, 1, 3, bytes.to_vec())
    }

    pub fn from_image(image: &DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(buf) => {
                Self::new(buf.width(), buf.height(), 1, buf.as_raw().clone())
            }
            DynamicImage::ImageRgba8(buf) => {
                Self::new(buf.width(), buf.height(), 4, buf.as_raw().clone())
            }
            other => {
                let buf = other.to_rgb8();
                Self::new(buf.width(), buf.height(), 3, buf.into_raw())
            }
        }
    }

    /// Albedo images usually arrive gamma encoded; this converts the
    /// payload to linear before sampling.
    pub fn from_image_srgb(image: &DynamicImage) -> Self {
        let mut texture = Self::from_image(image);
        for byte in texture.data.iter_mut() {
            *byte = ((*byte as f32 / 255.0).powf(2.2) * 255.0) as u8;
        }
        texture
    }

    /// Decodes `path`, falling back to the magenta sentinel when the file is
    /// missing or undecodable.
    pub fn open(path: &Path) -> Self {
        match image::open(path) {
            Ok(image) => Self::from_image(&image),
            Err(err) => {
                log::error!("texture {} failed to load: {err}", path.display());
                SENTINEL.clone()
            }
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Nearest-pixel lookup. UV wraps by fract, so any real-valued
    /// coordinate is legal. Returns linear RGB in [0, 1].
    pub fn sample_pixel(&self, uv: Vec2) -> Vec3 {
        let uv = uv - uv.floor();
        let x = ((uv.x * self.width as f32) as u32).min(self.width - 1);
        let y = ((uv.y * self.height as f32) as u32).min(self.height - 1);
        let base = ((y * self.width + x) * self.channels) as usize;

        let rgb = match self.channels {
            1 => {
                let v = self.data[base];
                [v, v, v]
            }
            _ => [self.data[base], self.data[base + 1], self.data[base + 2]],
        };

        Vec3::new(
            rgb[0] as f32 / 255.0,
            rgb[1] as f32 / 255.0,
            rgb[2] as f32 / 255.0,
        )
    }

    /// Bilinear variant of `sample_pixel`, blending the four texels around
    /// the sample point.
    pub fn sample_bilinear(&self, uv: Vec2) -> Vec3 {
        let uv = uv - uv.floor();
        let x = uv.x * self.width as f32 - 0.5;
        let y = uv.y * self.height as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;

        let texel = |px: f32, py: f32| -> Vec3 {
            let px = px.rem_euclid(self.width as f32) as u32;
            let py = py.rem_euclid(self.height as f32) as u32;
            self.sample_pixel(Vec2::new(
                (px as f32 + 0.5) / self.width as f32,
                (py as f32 + 0.5) / self.height as f32,
            ))
        };

        let top = texel(x0, y0).lerp(texel(x0 + 1.0, y0), fx);
        let bottom = texel(x0, y0 + 1.0).lerp(texel(x0 + 1.0, y0 + 1.0), fx);
        top.lerp(bottom, fy)
    }
}
