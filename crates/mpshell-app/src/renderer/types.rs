use serde::{Deserialize, Serialize};

use crate::error::StartError;

/// Default upper bound for either frame dimension (matches wgpu's default texture limit).
pub const DEFAULT_MAX_DIMENSION: u32 = 8192;
/// Default fixed-point scale of the protocol's integer aspect value.
pub const DEFAULT_ASPECT_SCALE: u32 = 100;
/// Decoded aspect ratios outside `1/MAX_ASPECT_RATIO..=MAX_ASPECT_RATIO` are rejected.
pub const MAX_ASPECT_RATIO: f64 = 16.0;

/// Packed pixel layout of the shared segment, selected by bytes-per-pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 4:2:2 packed as Y0 U Y1 V.
    Yuy2,
    Rgb24,
    Bgra32,
}

impl PixelFormat {
    pub fn from_bytes_per_pixel(bytes: i32) -> Option<Self> {
        match bytes {
            2 => Some(PixelFormat::Yuy2),
            3 => Some(PixelFormat::Rgb24),
            4 => Some(PixelFormat::Bgra32),
            _ => None,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Yuy2 => 2,
            PixelFormat::Rgb24 => 3,
            PixelFormat::Bgra32 => 4,
        }
    }
}

/// How the protocol's aspect value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AspectMode {
    /// Pixel aspect ratio: display width = frame width * ratio.
    #[default]
    Pixel,
    /// Display aspect ratio: display width = frame height * ratio.
    Display,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectConfig {
    pub scale: u32,
    pub mode: AspectMode,
}

impl Default for AspectConfig {
    fn default() -> Self {
        Self {
            scale: DEFAULT_ASPECT_SCALE,
            mode: AspectMode::Pixel,
        }
    }
}

impl AspectConfig {
    /// Scaled integer as sent on the wire for a given ratio.
    pub fn encode(&self, ratio: f64) -> i32 {
        (ratio * f64::from(self.scale)).round() as i32
    }
}

/// Limits applied to every `start` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RendererLimits {
    pub max_dimension: u32,
    pub aspect: AspectConfig,
}

impl RendererLimits {
    /// Cap frame dimensions at what the GPU can hold in one texture.
    pub fn within_texture_limit(self, max_texture_dimension: u32) -> Self {
        Self {
            max_dimension: self.max_dimension.min(max_texture_dimension.max(1)),
            ..self
        }
    }
}

impl Default for RendererLimits {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            aspect: AspectConfig::default(),
        }
    }
}

/// Size of the content in presentation (logical) units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySize {
    pub width: u32,
    pub height: u32,
}

impl DisplaySize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height.max(1))
    }
}

impl std::fmt::Display for DisplaySize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Validated geometry of one playback session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Decoded aspect ratio (wire value / scale).
    pub aspect: f64,
}

impl FrameDescriptor {
    /// Validate raw protocol arguments. Nothing is allocated here.
    pub fn validate(
        width: i32,
        height: i32,
        bytes: i32,
        aspect: i32,
        limits: &RendererLimits,
    ) -> Result<Self, StartError> {
        let in_range = |v: i32| v > 0 && v.unsigned_abs() <= limits.max_dimension;
        if !in_range(width) || !in_range(height) {
            return Err(StartError::InvalidGeometry { width, height });
        }
        let format = PixelFormat::from_bytes_per_pixel(bytes)
            .ok_or(StartError::UnsupportedPixelFormat(bytes))?;
        if format == PixelFormat::Yuy2 && width % 2 != 0 {
            return Err(StartError::InvalidGeometry { width, height });
        }
        if aspect <= 0 || limits.aspect.scale == 0 {
            return Err(StartError::InvalidAspect(aspect));
        }
        let ratio = f64::from(aspect) / f64::from(limits.aspect.scale);
        if !(1.0 / MAX_ASPECT_RATIO..=MAX_ASPECT_RATIO).contains(&ratio) {
            return Err(StartError::InvalidAspect(aspect));
        }

        Ok(Self {
            width: width.unsigned_abs(),
            height: height.unsigned_abs(),
            format,
            aspect: ratio,
        })
    }

    /// Bytes one frame occupies in the shared segment.
    pub fn segment_len(&self) -> usize {
        self.pixel_count() * self.format.bytes_per_pixel()
    }

    /// Bytes one frame occupies once converted to RGBA8.
    pub fn rgba_len(&self) -> usize {
        self.pixel_count() * 4
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn display_size(&self, mode: AspectMode) -> DisplaySize {
        let width = match mode {
            AspectMode::Pixel => f64::from(self.width) * self.aspect,
            AspectMode::Display => f64::from(self.height) * self.aspect,
        };
        DisplaySize::new((width.round() as u32).max(1), self.height)
    }
}
