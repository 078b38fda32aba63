use std::sync::Arc;

use winit::dpi::LogicalSize;
use winit::window::{Fullscreen, Window, WindowLevel};

use crate::renderer::types::DisplaySize;

/// Window capabilities the presentation layer drives. Sizes are in logical units.
pub trait WindowSurface {
    fn set_fullscreen(&self, fullscreen: bool);
    fn set_float_on_top(&self, on_top: bool);
    fn resize_content(&self, size: DisplaySize);
    fn set_visible(&self, visible: bool);
    fn content_size(&self) -> DisplaySize;
    /// Size of the monitor holding the window, if known.
    fn screen_size(&self) -> Option<DisplaySize>;
    fn request_redraw(&self);
}

impl<T: WindowSurface + ?Sized> WindowSurface for &T {
    fn set_fullscreen(&self, fullscreen: bool) {
        (**self).set_fullscreen(fullscreen);
    }

    fn set_float_on_top(&self, on_top: bool) {
        (**self).set_float_on_top(on_top);
    }

    fn resize_content(&self, size: DisplaySize) {
        (**self).resize_content(size);
    }

    fn set_visible(&self, visible: bool) {
        (**self).set_visible(visible);
    }

    fn content_size(&self) -> DisplaySize {
        (**self).content_size()
    }

    fn screen_size(&self) -> Option<DisplaySize> {
        (**self).screen_size()
    }

    fn request_redraw(&self) {
        (**self).request_redraw();
    }
}

impl WindowSurface for Arc<Window> {
    fn set_fullscreen(&self, fullscreen: bool) {
        let window: &Window = self;
        window.set_fullscreen(fullscreen.then_some(Fullscreen::Borderless(None)));
    }

    fn set_float_on_top(&self, on_top: bool) {
        let window: &Window = self;
        window.set_window_level(if on_top {
            WindowLevel::AlwaysOnTop
        } else {
            WindowLevel::Normal
        });
    }

    fn resize_content(&self, size: DisplaySize) {
        let window: &Window = self;
        let _ = window.request_inner_size(LogicalSize::new(size.width, size.height));
    }

    fn set_visible(&self, visible: bool) {
        let window: &Window = self;
        window.set_visible(visible);
    }

    fn content_size(&self) -> DisplaySize {
        let logical: LogicalSize<u32> = self.inner_size().to_logical(self.scale_factor());
        DisplaySize::new(logical.width.max(1), logical.height.max(1))
    }

    fn screen_size(&self) -> Option<DisplaySize> {
        let monitor = self.current_monitor()?;
        let logical: LogicalSize<u32> = monitor.size().to_logical(monitor.scale_factor());
        (logical.width > 0 && logical.height > 0)
            .then(|| DisplaySize::new(logical.width, logical.height))
    }

    fn request_redraw(&self) {
        let window: &Window = self;
        window.request_redraw();
    }
}
