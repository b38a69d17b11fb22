//! Engine and renderer settings

use serde::{Serialize, Deserialize};

use super::{Config, ConfigError};

/// Top-level configuration file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Engine-wide settings
    pub engine: EngineConfig,
    /// Deferred renderer settings
    pub renderer: RendererConfig,
}

impl Config for ApplicationConfig {}

impl ApplicationConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        self.renderer.validate().map_err(ConfigError::Invalid)
    }
}

/// Engine-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default `env_logger` filter
    pub log_level: String,
    /// Simulation step in seconds (animation playback)
    pub fixed_timestep: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            fixed_timestep: 1.0 / 60.0,
        }
    }
}

impl Config for EngineConfig {}

impl EngineConfig {
    /// Check the timestep is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fixed_timestep.is_finite() && self.fixed_timestep > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "fixed_timestep must be positive, got {}",
                self.fixed_timestep
            )));
        }
        Ok(())
    }
}

/// Separable gaussian kernel width used by bloom and shadow blur
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlurKernel {
    /// 5 taps
    K5,
    /// 7 taps
    K7,
    /// 11 taps
    K11,
    /// 15 taps
    K15,
}

impl BlurKernel {
    /// Number of taps along one axis
    pub fn taps(self) -> usize {
        match self {
            Self::K5 => 5,
            Self::K7 => 7,
            Self::K11 => 11,
            Self::K15 => 15,
        }
    }

    /// Normalized gaussian weights for offsets `-radius..=radius`
    pub fn weights(self) -> Vec<f32> {
        let taps = self.taps();
        let radius = (taps / 2) as i32;
        // sigma chosen so the outermost tap still contributes
        let sigma = (radius as f32 / 2.0).max(1.0);
        let raw: Vec<f32> = (-radius..=radius)
            .map(|offset| (-((offset * offset) as f32) / (2.0 * sigma * sigma)).exp())
            .collect();
        let sum: f32 = raw.iter().sum();
        raw.into_iter().map(|w| w / sum).collect()
    }
}

/// Bloom extraction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomConfig {
    /// Run the bloom passes at all
    pub enabled: bool,
    /// Luminance above which color contributes to bloom
    pub threshold: f32,
    /// Additive weight of the bloom buffer during composition
    pub intensity: f32,
    /// Blur kernel width
    pub kernel: BlurKernel,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 1.0,
            intensity: 0.6,
            kernel: BlurKernel::K7,
        }
    }
}

/// Shadow map settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Honor `cast_shadows` on lights
    pub enabled: bool,
    /// Edge length of the 2D shadow map (directional / spot)
    pub map_size: u32,
    /// Edge length of each cube face (point lights)
    pub cube_map_size: u32,
    /// Half-extent of the orthographic box used for directional shadows
    pub directional_extent: f32,
    /// Blur kernel applied to the variance map
    pub blur: BlurKernel,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            map_size: 512,
            cube_map_size: 256,
            directional_extent: 20.0,
            blur: BlurKernel::K5,
        }
    }
}

/// Where vertex skinning happens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkinningMode {
    /// Skin into the model's back skinning buffer on the CPU
    Cpu,
    /// Upload the bone palette and skin in the vertex stage
    Gpu,
}

/// Visibility processor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilityConfig {
    /// Enforce set semantics on the per-frame visible lists
    pub deduplicate: bool,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self { deduplicate: true }
    }
}

/// Deferred renderer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Render into a floating point buffer and tone-map at the end
    pub hdr_enabled: bool,
    /// Tone-mapping exposure
    pub exposure: f32,
    /// Color the composite buffers are cleared to
    pub clear_color: [f32; 4],
    /// Bloom settings
    pub bloom: BloomConfig,
    /// Shadow settings
    pub shadows: ShadowConfig,
    /// Skinning mode
    pub skinning: SkinningMode,
    /// Visibility settings
    pub visibility: VisibilityConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            hdr_enabled: true,
            exposure: 1.0,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            bloom: BloomConfig::default(),
            shadows: ShadowConfig::default(),
            skinning: SkinningMode::Cpu,
            visibility: VisibilityConfig::default(),
        }
    }
}

impl Config for RendererConfig {}

impl RendererConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if !(self.exposure.is_finite() && self.exposure > 0.0) {
            return Err(format!("exposure must be positive, got {}", self.exposure));
        }
        if self.shadows.map_size == 0 {
            return Err("shadows.map_size must be non-zero".to_string());
        }
        if self.shadows.cube_map_size == 0 {
            return Err("shadows.cube_map_size must be non-zero".to_string());
        }
        if self.shadows.directional_extent <= 0.0 {
            return Err("shadows.directional_extent must be positive".to_string());
        }
        if self.bloom.intensity < 0.0 {
            return Err("bloom.intensity cannot be negative".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_renderer_config_is_valid() {
        assert!(RendererConfig::default().validate().is_ok());
        assert!(ApplicationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RendererConfig::default();
        config.exposure = 0.0;
        assert!(config.validate().is_err());

        let mut config = RendererConfig::default();
        config.shadows.map_size = 0;
        assert!(config.validate().is_err());

        let mut engine = EngineConfig::default();
        engine.fixed_timestep = -1.0;
        assert!(engine.validate().is_err());
    }

    #[test]
    fn test_kernel_weights_normalized() {
        for kernel in [BlurKernel::K5, BlurKernel::K7, BlurKernel::K11, BlurKernel::K15] {
            let weights = kernel.weights();
            assert_eq!(weights.len(), kernel.taps());
            assert_relative_eq!(weights.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
            // symmetric and peaked in the middle
            assert_relative_eq!(weights[0], weights[weights.len() - 1]);
            assert!(weights[weights.len() / 2] > weights[0]);
        }
    }
}
