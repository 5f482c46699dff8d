use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::consts::DEFAULT_POLY_ORDER;
use crate::error::{AlignError, Result};
use crate::frame::ImageSize;
use crate::io::image_io::image_size;

use super::layer::{ImageRecord, Layer};

/// Ordered layers of one resolution level plus composition settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stack {
    #[serde(default)]
    pub alignment_stack: Vec<Layer>,
    #[serde(default)]
    pub null_cafm_trends: bool,
    #[serde(default = "default_poly_order")]
    pub poly_order: usize,
    #[serde(default = "default_use_bounding_rect")]
    pub use_bounding_rect: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_poly_order() -> usize {
    DEFAULT_POLY_ORDER
}

fn default_use_bounding_rect() -> bool {
    true
}

impl Default for Stack {
    fn default() -> Self {
        Self {
            alignment_stack: Vec::new(),
            null_cafm_trends: false,
            poly_order: DEFAULT_POLY_ORDER,
            use_bounding_rect: true,
            extra: Map::new(),
        }
    }
}

impl Stack {
    pub fn len(&self) -> usize {
        self.alignment_stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alignment_stack.is_empty()
    }

    pub fn layer(&self, index: usize) -> Result<&Layer> {
        self.alignment_stack
            .get(index)
            .ok_or(AlignError::LayerIndexOutOfRange {
                index,
                total: self.alignment_stack.len(),
            })
    }

    pub fn layer_mut(&mut self, index: usize) -> Result<&mut Layer> {
        let total = self.alignment_stack.len();
        self.alignment_stack
            .get_mut(index)
            .ok_or(AlignError::LayerIndexOutOfRange { index, total })
    }

    /// Point every layer's `ref` at the nearest preceding non-skipped base.
    /// Existing reference metadata (match points) is kept when the target
    /// image does not change.
    pub fn link_references(&mut self) {
        let mut previous: Option<std::path::PathBuf> = None;
        for (i, layer) in self.alignment_stack.iter_mut().enumerate() {
            match &previous {
                None => layer.images.reference = None,
                Some(prev) => {
                    let unchanged = layer.ref_path() == Some(prev.as_path());
                    if !unchanged {
                        debug!(layer = i, reference = %prev.display(), "Relinking reference");
                        layer.images.reference = Some(ImageRecord::new(prev.clone()));
                    }
                }
            }
            if !layer.skip {
                previous = Some(layer.base_path().to_path_buf());
            }
        }
    }

    /// Size of the first layer's base image; all layers share it.
    pub fn image_size(&self) -> Result<ImageSize> {
        let first = self.alignment_stack.first().ok_or(AlignError::EmptyStack)?;
        image_size(first.base_path())
    }
}
