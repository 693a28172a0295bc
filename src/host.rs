// Display hosts: whatever owns the on-screen area the heatmap draws into.
//
// The heatmap only asks a host for its size and tells it which output
// layers exist. Presenting pixels is the host's business.

use tracing::debug;

/// Output layers a heatmap can expose to its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    /// The colorized heatmap.
    Visible,
    /// Raw density raster (debug only).
    Density,
    /// Palette strip (debug only).
    Palette,
}

pub trait DisplayHost {
    /// Current drawable size in pixels.
    fn size(&self) -> (u32, u32);

    fn attach(&mut self, layer: Layer);

    fn detach(&mut self, layer: Layer);
}

/// A host with no window: fixed size, records which layers are attached.
#[derive(Debug, Clone)]
pub struct Headless {
    width: u32,
    height: u32,
    attached: Vec<Layer>,
}

impl Headless {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, attached: Vec::new() }
    }

    pub fn attached(&self) -> &[Layer] {
        &self.attached
    }

    pub fn is_attached(&self, layer: Layer) -> bool {
        self.attached.contains(&layer)
    }
}

impl DisplayHost for Headless {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn attach(&mut self, layer: Layer) {
        if !self.is_attached(layer) {
            debug!(?layer, "attach");
            self.attached.push(layer);
        }
    }

    fn detach(&mut self, layer: Layer) {
        self.attached.retain(|l| *l != layer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_is_idempotent() {
        let mut host = Headless::new(10, 20);
        host.attach(Layer::Visible);
        host.attach(Layer::Visible);
        host.attach(Layer::Density);
        assert_eq!(host.attached(), &[Layer::Visible, Layer::Density]);

        host.detach(Layer::Visible);
        assert_eq!(host.attached(), &[Layer::Density]);
        assert_eq!(host.size(), (10, 20));
    }
}
