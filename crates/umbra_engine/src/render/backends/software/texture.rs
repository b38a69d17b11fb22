//! Texel storage and sampling

use crate::foundation::math::{Vec2, Vec3, Vec4};
use crate::render::device::{CubeFace, TextureFilter, TextureFormat, WrapMode};

/// CPU texture: one layer for 2D, six for cube maps
#[derive(Debug, Clone)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub format: TextureFormat,
    pub filter: TextureFilter,
    pub wrap: WrapMode,
    pub texels: Vec<Vec4>,
}

impl Texture {
    pub fn new(width: u32, height: u32, layers: u32, format: TextureFormat) -> Self {
        let count = (width as usize) * (height as usize) * (layers as usize);
        let fill = if format.is_depth() { Vec4::new(1.0, 0.0, 0.0, 0.0) } else { Vec4::zeros() };
        Self {
            width,
            height,
            layers,
            format,
            filter: TextureFilter::Linear,
            wrap: WrapMode::ClampToEdge,
            texels: vec![fill; count],
        }
    }

    pub fn is_cube(&self) -> bool {
        self.layers == 6
    }

    pub fn index(&self, layer: u32, x: u32, y: u32) -> usize {
        ((layer * self.height + y) * self.width + x) as usize
    }

    /// Store a value, applying the format's precision and channel count
    pub fn store(&mut self, index: usize, value: Vec4) {
        let stored = match self.format {
            TextureFormat::Rgba8 => value.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() / 255.0),
            TextureFormat::Rgba16F => value,
            TextureFormat::Rg32F => Vec4::new(value.x, value.y, 0.0, 0.0),
            TextureFormat::Depth24Stencil8 => Vec4::new(value.x.clamp(0.0, 1.0), 0.0, 0.0, 0.0),
        };
        if let Some(texel) = self.texels.get_mut(index) {
            *texel = stored;
        }
    }

    pub fn fetch(&self, layer: u32, x: i64, y: i64) -> Vec4 {
        if self.width == 0 || self.height == 0 {
            return Vec4::zeros();
        }
        let (x, y) = match self.wrap {
            WrapMode::ClampToEdge => (
                x.clamp(0, i64::from(self.width) - 1),
                y.clamp(0, i64::from(self.height) - 1),
            ),
            WrapMode::Repeat => (x.rem_euclid(i64::from(self.width)), y.rem_euclid(i64::from(self.height))),
        };
        self.texels
            .get(self.index(layer, x as u32, y as u32))
            .copied()
            .unwrap_or_else(Vec4::zeros)
    }

    /// Filtered lookup at normalized coordinates, origin bottom-left
    pub fn sample_layer(&self, layer: u32, uv: Vec2) -> Vec4 {
        let x = uv.x * self.width as f32 - 0.5;
        let y = uv.y * self.height as f32 - 0.5;
        match self.filter {
            TextureFilter::Nearest => self.fetch(layer, x.round() as i64, y.round() as i64),
            TextureFilter::Linear => {
                let (x0, y0) = (x.floor(), y.floor());
                let (fx, fy) = (x - x0, y - y0);
                let (ix, iy) = (x0 as i64, y0 as i64);
                let bottom = self.fetch(layer, ix, iy).lerp(&self.fetch(layer, ix + 1, iy), fx);
                let top = self.fetch(layer, ix, iy + 1).lerp(&self.fetch(layer, ix + 1, iy + 1), fx);
                bottom.lerp(&top, fy)
            }
        }
    }

    /// Cube lookup along a world direction
    pub fn sample_cube(&self, direction: &Vec3) -> Vec4 {
        if !self.is_cube() || direction.norm_squared() <= f32::EPSILON {
            return Vec4::zeros();
        }
        let face = CubeFace::from_direction(direction);
        let (forward, right, up) = face.basis();
        let depth = direction.dot(&forward);
        let uv = Vec2::new(
            direction.dot(&right) / depth * 0.5 + 0.5,
            direction.dot(&up) / depth * 0.5 + 0.5,
        );
        self.sample_layer(face.index() as u32, uv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rgba8_quantizes_and_clamps() {
        let mut texture = Texture::new(1, 1, 1, TextureFormat::Rgba8);
        texture.store(0, Vec4::new(2.0, -1.0, 0.5, 1.0));
        let texel = texture.texels[0];
        assert_eq!(texel.x, 1.0);
        assert_eq!(texel.y, 0.0);
        assert_relative_eq!(texel.z, 128.0 / 255.0);
    }

    #[test]
    fn test_linear_sampling_blends_neighbours() {
        let mut texture = Texture::new(2, 1, 1, TextureFormat::Rgba16F);
        texture.store(0, Vec4::zeros());
        texture.store(1, Vec4::new(1.0, 1.0, 1.0, 1.0));
        let middle = texture.sample_layer(0, Vec2::new(0.5, 0.5));
        assert_relative_eq!(middle.x, 0.5);
        texture.filter = TextureFilter::Nearest;
        assert_relative_eq!(texture.sample_layer(0, Vec2::new(0.9, 0.5)).x, 1.0);
    }

    #[test]
    fn test_cube_sampling_picks_face() {
        let mut cube = Texture::new(2, 2, 6, TextureFormat::Rg32F);
        for face in CubeFace::ALL {
            for y in 0..2 {
                for x in 0..2 {
                    let index = cube.index(face.index() as u32, x, y);
                    cube.store(index, Vec4::new(face.index() as f32, 0.0, 0.0, 0.0));
                }
            }
        }
        assert_relative_eq!(cube.sample_cube(&Vec3::new(0.1, -5.0, 0.2)).x, 3.0);
        assert_relative_eq!(cube.sample_cube(&Vec3::new(4.0, 0.5, 0.2)).x, 0.0);
    }
}
