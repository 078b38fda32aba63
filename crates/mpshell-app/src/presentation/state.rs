use crate::renderer::types::DisplaySize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowMode {
    #[default]
    Windowed,
    Fullscreen,
}

/// Content size relative to the video's display size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewScale {
    Half,
    #[default]
    Actual,
    Double,
}

impl ViewScale {
    pub fn factor(self) -> f64 {
        match self {
            ViewScale::Half => 0.5,
            ViewScale::Actual => 1.0,
            ViewScale::Double => 2.0,
        }
    }

    pub fn apply(self, size: DisplaySize) -> DisplaySize {
        let f = self.factor();
        DisplaySize::new(
            scale_dim(size.width, f),
            scale_dim(size.height, f),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PresentationState {
    pub mode: WindowMode,
    pub float_on_top: bool,
    pub view_scale: ViewScale,
    /// Display geometry of the current stream.
    pub display: Option<DisplaySize>,
    pub surface_visible: bool,
    pub window_visible: bool,
    /// Latest windowed content size, requested by us or reported by the window system.
    pub content: Option<DisplaySize>,
    /// Content size to restore when leaving fullscreen.
    pub windowed_size: Option<DisplaySize>,
    pub closed: bool,
}

/// Shrink `size` to fit inside `bounds`, keeping its aspect ratio. Never enlarges.
pub fn fit_size(size: DisplaySize, bounds: DisplaySize) -> DisplaySize {
    if size.width <= bounds.width && size.height <= bounds.height {
        return size;
    }
    let sx = f64::from(bounds.width) / f64::from(size.width);
    let sy = f64::from(bounds.height) / f64::from(size.height);
    let s = sx.min(sy);
    DisplaySize::new(scale_dim(size.width, s), scale_dim(size.height, s))
}

fn scale_dim(value: u32, factor: f64) -> u32 {
    ((f64::from(value) * factor).round() as u32).max(1)
}
