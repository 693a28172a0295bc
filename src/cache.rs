// Brush cache keyed by shape type, then by geometry identity.
//
// Entries are created at most once per key and never mutated. The only ways
// out are re-registering a shape type (clears its sub-map) and teardown.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::brush::Brush;
use crate::error::Result;
use crate::types::ShapeType;

#[derive(Default)]
pub struct BrushCache {
    entries: FxHashMap<ShapeType, FxHashMap<String, Rc<Brush>>>,
}

impl BrushCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached brush for `key`, or build it with `factory` and keep it.
    pub fn get_or_create<F>(&mut self, shape_type: ShapeType, key: String, factory: F) -> Result<Rc<Brush>>
    where
        F: FnOnce() -> Result<Brush>,
    {
        let brushes = self.entries.entry(shape_type).or_default();
        if let Some(brush) = brushes.get(&key) {
            return Ok(Rc::clone(brush));
        }

        let brush = Rc::new(factory()?);
        tracing::debug!(
            ?shape_type,
            %key,
            width = brush.width(),
            height = brush.height(),
            "rasterized brush"
        );
        brushes.insert(key, Rc::clone(&brush));
        Ok(brush)
    }

    pub fn get(&self, shape_type: ShapeType, key: &str) -> Option<Rc<Brush>> {
        self.entries.get(&shape_type)?.get(key).cloned()
    }

    /// Drop every brush of one shape type.
    pub fn clear_type(&mut self, shape_type: ShapeType) {
        self.entries.remove(&shape_type);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of brushes cached for one shape type.
    pub fn len_for(&self, shape_type: ShapeType) -> usize {
        self.entries.get(&shape_type).map_or(0, FxHashMap::len)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(FxHashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
