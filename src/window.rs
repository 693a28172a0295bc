// minifb window acting as the heatmap's display host.
// The visible surface is composited over black and pushed as 0x00RRGGBB.

use heatmap_renderer::{DisplayHost, Error, Layer, Result};
use image::RgbaImage;
use minifb::{Key, KeyRepeat, MouseButton, MouseMode, Window, WindowOptions};

pub struct WindowHost {
    window: Window,
    width: u32,
    height: u32,
    buffer: Vec<u32>,
    layers: Vec<Layer>,
}

impl WindowHost {
    pub fn new(title: &str, width: u32, height: u32) -> Result<Self> {
        let window = Window::new(
            title,
            width as usize,
            height as usize,
            WindowOptions { resize: true, ..WindowOptions::default() },
        )
        .map_err(|e| Error::Window(e.to_string()))?;
        Ok(Self { window, width, height, buffer: Vec::new(), layers: Vec::new() })
    }

    /// Show `visible`; minifb stretches it if the window size differs.
    pub fn present(&mut self, visible: &RgbaImage) -> Result<()> {
        self.buffer.clear();
        self.buffer.extend(visible.pixels().map(|p| {
            let [r, g, b, a] = p.0;
            let over_black = |c: u8| (c as u32 * a as u32 + 127) / 255;
            (over_black(r) << 16) | (over_black(g) << 8) | over_black(b)
        }));
        let (w, h) = visible.dimensions();
        self.window
            .update_with_buffer(&self.buffer, w as usize, h as usize)
            .map_err(|e| Error::Window(e.to_string()))
    }

    /// Pick up the OS window size; true when it changed.
    pub fn sync_size(&mut self) -> bool {
        let (w, h) = self.window.get_size();
        let (w, h) = (w as u32, h as u32);
        if w == 0 || h == 0 || (w, h) == (self.width, self.height) {
            return false;
        }
        self.width = w;
        self.height = h;
        true
    }

    pub fn is_open(&self) -> bool {
        self.window.is_open()
    }

    pub fn esc_pressed(&self) -> bool {
        self.window.is_key_down(Key::Escape)
    }

    pub fn c_pressed_once(&self) -> bool {
        self.window.is_key_pressed(Key::C, KeyRepeat::No)
    }

    pub fn left_mouse_down(&self) -> bool {
        self.window.get_mouse_down(MouseButton::Left)
    }

    /// Pointer position in heatmap pixels.
    pub fn mouse_pos(&self) -> Option<(f32, f32)> {
        self.window.get_mouse_pos(MouseMode::Clamp)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }
}

impl DisplayHost for WindowHost {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn attach(&mut self, layer: Layer) {
        if !self.layers.contains(&layer) {
            self.layers.push(layer);
        }
    }

    fn detach(&mut self, layer: Layer) {
        self.layers.retain(|l| *l != layer);
    }
}
