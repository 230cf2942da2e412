use std::sync::{Arc, Mutex, PoisonError};

use burn::{data::dataset::transform::Mapper, prelude::*};
use image::{Rgb, RgbImage};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::data::ModulationImage;

/// Random geometric perturbations applied to training images.
///
/// Shifts, shear and zoom are fractions; rotation is in degrees. Every value is
/// sampled independently per image, each time the image is drawn.
#[derive(Config, Debug)]
pub struct AugmentationConfig {
    #[config(default = 15.0)]
    pub rotation_degrees: f32,

    #[config(default = 0.1)]
    pub width_shift: f32,

    #[config(default = 0.1)]
    pub height_shift: f32,

    #[config(default = 0.1)]
    pub shear: f32,

    #[config(default = 0.1)]
    pub zoom: f32,

    #[config(default = true)]
    pub horizontal_flip: bool,
}

impl AugmentationConfig {
    /// Mapper drawing its transforms from one generator seeded with `seed`.
    pub fn init(&self, seed: u64) -> RandomAffine {
        RandomAffine {
            config: self.clone(),
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    pub fn sample<R: Rng>(&self, rng: &mut R, width: u32, height: u32) -> AffineParams {
        AffineParams {
            rotation: symmetric(rng, self.rotation_degrees).to_radians(),
            shift_x: symmetric(rng, self.width_shift) * width as f32,
            shift_y: symmetric(rng, self.height_shift) * height as f32,
            shear: symmetric(rng, self.shear),
            zoom_x: 1.0 + symmetric(rng, self.zoom),
            zoom_y: 1.0 + symmetric(rng, self.zoom),
            flip: self.horizontal_flip && rng.gen_bool(0.5),
        }
    }
}

fn symmetric<R: Rng>(rng: &mut R, limit: f32) -> f32 {
    if limit > 0.0 {
        rng.gen_range(-limit..=limit)
    } else {
        0.0
    }
}

/// One sampled transform. Maps output pixel coordinates back to source
/// coordinates around the image centre.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineParams {
    pub rotation: f32,
    pub shift_x: f32,
    pub shift_y: f32,
    pub shear: f32,
    pub zoom_x: f32,
    pub zoom_y: f32,
    pub flip: bool,
}

impl AffineParams {
    pub const IDENTITY: Self = Self {
        rotation: 0.0,
        shift_x: 0.0,
        shift_y: 0.0,
        shear: 0.0,
        zoom_x: 1.0,
        zoom_y: 1.0,
        flip: false,
    };

    fn source(&self, x: f32, y: f32, center: (f32, f32)) -> (f32, f32) {
        let (mut vx, mut vy) = ((x - center.0) * self.zoom_x, (y - center.1) * self.zoom_y);
        vx += self.shear * vy;
        vx += self.shift_x;
        vy += self.shift_y;

        let (sin, cos) = self.rotation.sin_cos();
        (
            cos * vx - sin * vy + center.0,
            sin * vx + cos * vy + center.1,
        )
    }

    /// Warps `image`. Samples bilinearly; coordinates outside the image take
    /// the nearest edge pixel.
    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return image.clone();
        }
        let center = ((width as f32 - 1.0) / 2.0, (height as f32 - 1.0) / 2.0);

        RgbImage::from_fn(width, height, |x, y| {
            let x = if self.flip { width - 1 - x } else { x };
            let (sx, sy) = self.source(x as f32, y as f32, center);
            bilinear(image, sx, sy)
        })
    }
}

fn bilinear(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = image.dimensions();
    let x = x.clamp(0.0, (width - 1) as f32);
    let y = y.clamp(0.0, (height - 1) as f32);

    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(width - 1), (y0 + 1).min(height - 1));
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);

    let [a, b, c, d] = [
        image.get_pixel(x0, y0),
        image.get_pixel(x1, y0),
        image.get_pixel(x0, y1),
        image.get_pixel(x1, y1),
    ];

    let mut out = [0u8; 3];
    for (channel, value) in out.iter_mut().enumerate() {
        let top = a[channel] as f32 * (1.0 - fx) + b[channel] as f32 * fx;
        let bottom = c[channel] as f32 * (1.0 - fx) + d[channel] as f32 * fx;
        *value = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }

    Rgb(out)
}

/// Dataset mapper that re-samples an [`AffineParams`] on every access.
///
/// Clones share the generator. With several loader workers the sequence of
/// transforms is fixed by the seed but its assignment to images depends on
/// worker scheduling.
#[derive(Debug, Clone)]
pub struct RandomAffine {
    config: AugmentationConfig,
    rng: Arc<Mutex<StdRng>>,
}

impl Mapper<ModulationImage, ModulationImage> for RandomAffine {
    fn map(&self, item: &ModulationImage) -> ModulationImage {
        let (width, height) = item.image.dimensions();
        let params = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            self.config.sample(&mut *rng, width, height)
        };

        ModulationImage {
            image: params.apply(&item.image),
            label: item.label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| Rgb([(x * 10) as u8, (y * 10) as u8, 7]))
    }

    #[test]
    fn identity_leaves_pixels_untouched() {
        let image = gradient(9, 7);
        assert_eq!(AffineParams::IDENTITY.apply(&image), image);
    }

    #[test]
    fn flip_mirrors_columns() {
        let image = gradient(6, 4);
        let flipped = AffineParams {
            flip: true,
            ..AffineParams::IDENTITY
        }
        .apply(&image);

        for y in 0..4 {
            for x in 0..6 {
                assert_eq!(flipped.get_pixel(x, y), image.get_pixel(5 - x, y));
            }
        }
    }

    #[test]
    fn shift_repeats_edge_pixels() {
        let image = gradient(8, 8);
        let shifted = AffineParams {
            shift_x: 2.0,
            ..AffineParams::IDENTITY
        }
        .apply(&image);

        assert_eq!(shifted.get_pixel(0, 3), image.get_pixel(2, 3));
        assert_eq!(shifted.get_pixel(5, 3), image.get_pixel(7, 3));
        assert_eq!(shifted.get_pixel(7, 3), image.get_pixel(7, 3));
    }

    #[test]
    fn sampled_parameters_stay_within_limits() {
        let config = AugmentationConfig::new();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..500 {
            let params = config.sample(&mut rng, 224, 224);
            assert!(params.rotation.abs() <= 15f32.to_radians() + 1e-6);
            assert!(params.shift_x.abs() <= 22.4 + 1e-3);
            assert!(params.shift_y.abs() <= 22.4 + 1e-3);
            assert!(params.shear.abs() <= 0.1 + 1e-6);
            assert!((0.9 - 1e-6..=1.1 + 1e-6).contains(&params.zoom_x));
            assert!((0.9 - 1e-6..=1.1 + 1e-6).contains(&params.zoom_y));
        }
    }

    #[test]
    fn disabled_augmentation_samples_identity() {
        let config = AugmentationConfig::new()
            .with_rotation_degrees(0.0)
            .with_width_shift(0.0)
            .with_height_shift(0.0)
            .with_shear(0.0)
            .with_zoom(0.0)
            .with_horizontal_flip(false);
        let mut rng = StdRng::seed_from_u64(1);

        assert_eq!(config.sample(&mut rng, 32, 32), AffineParams::IDENTITY);
    }

    #[test]
    fn seeded_mapper_is_reproducible() {
        let item = ModulationImage {
            image: gradient(16, 16),
            label: 1,
        };
        let config = AugmentationConfig::new();
        let (first, second) = (config.init(42), config.init(42));

        for _ in 0..4 {
            let (a, b) = (first.map(&item), second.map(&item));
            assert_eq!(a.image, b.image);
            assert_eq!(a.label, 1);
        }

        let other = config.init(43);
        let differs = (0..4).any(|_| first.map(&item).image != other.map(&item).image);
        assert!(differs);
    }
}
