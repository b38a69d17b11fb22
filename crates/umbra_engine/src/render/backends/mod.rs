//! Graphics device implementations
//!
//! The renderer only sees [`GraphicsDevice`](super::GraphicsDevice); a
//! hardware backend plugs in next to the CPU reference device.

/// CPU rasterizer used for headless rendering and tests
pub mod software;
