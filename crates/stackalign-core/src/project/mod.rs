mod layer;
mod stack;

pub use layer::{
    AlignToRefMethod, ImageMetadata, ImageRecord, Layer, LayerImages, MethodData, MethodResults,
    SelectedMethod,
};
pub use stack::Stack;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::affine::{AffineMatrix, Point};
use crate::error::{AlignError, Result};
use crate::io::image_io::{downscale, load_image, save_image};

/// Document format version written by this crate.
pub const PROJECT_VERSION: f64 = 0.50;

/// The persisted project document shared with the GUI.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub version: f64,
    #[serde(default = "default_method")]
    pub method: String,
    pub data: ProjectData,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_method() -> String {
    "None".to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectData {
    #[serde(default)]
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    #[serde(default = "default_scale_key")]
    pub current_scale: String,
    #[serde(default)]
    pub current_layer: usize,
    #[serde(default)]
    pub scales: BTreeMap<String, Stack>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_scale_key() -> String {
    scale_key(1)
}

/// `3` -> `"scale_3"`.
pub fn scale_key(level: u32) -> String {
    format!("scale_{level}")
}

/// `"scale_3"` -> `3`.
pub fn parse_scale_key(key: &str) -> Result<u32> {
    key.strip_prefix("scale_")
        .and_then(|n| n.parse().ok())
        .filter(|n| *n > 0)
        .ok_or_else(|| AlignError::UnknownScale(key.to_string()))
}

/// Starting point for `refine_affine` / `apply_affine`, carried up from the
/// next-coarser level.
#[derive(Clone, Debug, PartialEq)]
pub struct CoarseSeed {
    pub afm: AffineMatrix,
    /// Coarser level divided by the current level.
    pub upscale: f64,
    /// Coarser reference and base match points, scaled by `upscale`.
    pub match_points: Option<(Vec<Point>, Vec<Point>)>,
}

impl Project {
    pub fn new(source_path: PathBuf, destination_path: PathBuf) -> Self {
        Self {
            version: PROJECT_VERSION,
            method: default_method(),
            data: ProjectData {
                source_path,
                destination_path,
                current_scale: default_scale_key(),
                current_layer: 0,
                scales: BTreeMap::new(),
                extra: Map::new(),
            },
            extra: Map::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let project: Project = serde_json::from_str(&text)?;
        project.validate()?;
        Ok(project)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for key in self.data.scales.keys() {
            parse_scale_key(key)?;
        }
        if self.data.destination_path.as_os_str().is_empty() {
            return Err(AlignError::InvalidProject("destination_path is empty".into()));
        }
        let scales = &self.data.scales;
        if !scales.is_empty() && !scales.contains_key(&self.data.current_scale) {
            return Err(AlignError::InvalidProject(format!(
                "current_scale {} is not one of the project's scales",
                self.data.current_scale
            )));
        }
        Ok(())
    }

    pub fn current_level(&self) -> Result<u32> {
        parse_scale_key(&self.data.current_scale)
    }

    /// Directory holding outputs for one level: `<destination>/scale_N`.
    pub fn scale_dir(&self, level: u32) -> PathBuf {
        self.data.destination_path.join(scale_key(level))
    }

    pub fn stack(&self, level: u32) -> Result<&Stack> {
        let key = scale_key(level);
        self.data
            .scales
            .get(&key)
            .ok_or(AlignError::UnknownScale(key))
    }

    pub fn stack_mut(&mut self, level: u32) -> Result<&mut Stack> {
        let key = scale_key(level);
        self.data
            .scales
            .get_mut(&key)
            .ok_or(AlignError::UnknownScale(key))
    }

    /// Sorted resolution levels present in the document.
    pub fn levels(&self) -> Vec<u32> {
        let mut levels: Vec<u32> = self
            .data
            .scales
            .keys()
            .filter_map(|k| parse_scale_key(k).ok())
            .collect();
        levels.sort_unstable();
        levels
    }

    /// Smallest level coarser than `level` that holds alignment results.
    pub fn coarser_level(&self, level: u32) -> Option<u32> {
        self.levels().into_iter().filter(|&l| l > level).find(|&l| {
            self.stack(l)
                .map(|s| {
                    s.alignment_stack
                        .iter()
                        .any(|layer| layer.results().affine_matrix.is_some())
                })
                .unwrap_or(false)
        })
    }

    /// Coarser-level affine for layer `index` with its translation scaled
    /// up to `level`. Skipped or unaligned coarse layers seed identity.
    pub fn coarse_seed(&self, level: u32, index: usize) -> Result<CoarseSeed> {
        let coarse_level = self.coarser_level(level).ok_or_else(|| {
            AlignError::Config(format!(
                "no aligned level coarser than {} to seed from",
                scale_key(level)
            ))
        })?;
        let upscale = coarse_level as f64 / level as f64;
        let coarse = self.stack(coarse_level)?.layer(index)?;

        let afm = if coarse.skip {
            AffineMatrix::IDENTITY
        } else {
            coarse
                .results()
                .affine_matrix
                .unwrap_or(AffineMatrix::IDENTITY)
        };

        let scale = |pts: &[Point]| pts.iter().map(|&p| p * upscale).collect::<Vec<_>>();
        let match_points = coarse.images.reference.as_ref().map(|r| {
            (
                scale(&r.metadata.match_points),
                scale(&coarse.images.base.metadata.match_points),
            )
        });

        Ok(CoarseSeed {
            afm: afm.scale_translation(upscale),
            upscale,
            match_points,
        })
    }

    /// Build a project from an ordered image list. Level 1 references the
    /// originals; every other level gets block-averaged copies under
    /// `<destination>/scale_N/img_src/`.
    pub fn import(images: &[PathBuf], destination: &Path, levels: &[u32]) -> Result<Self> {
        if images.is_empty() {
            return Err(AlignError::EmptyStack);
        }
        let source_path = images[0]
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let mut project = Project::new(source_path, destination.to_path_buf());

        let mut levels: Vec<u32> = levels.iter().copied().filter(|&l| l > 0).collect();
        if !levels.contains(&1) {
            levels.push(1);
        }
        levels.sort_unstable();
        levels.dedup();

        for &level in &levels {
            let mut stack = Stack::default();
            for src in images {
                let base = if level == 1 {
                    src.clone()
                } else {
                    let name = src
                        .file_name()
                        .ok_or_else(|| AlignError::ImageNotFound(src.clone()))?;
                    let dst_dir = project.scale_dir(level).join("img_src");
                    fs::create_dir_all(&dst_dir)?;
                    let dst = dst_dir.join(name);
                    let frame = load_image(src)?;
                    save_image(&downscale(&frame, level as usize), &dst)?;
                    dst
                };
                stack.alignment_stack.push(Layer::new(base));
            }
            stack.link_references();
            info!(
                level,
                layers = stack.len(),
                "Imported images into stack"
            );
            project.data.scales.insert(scale_key(level), stack);
        }

        if let Some(&coarsest) = levels.last() {
            project.data.current_scale = scale_key(coarsest);
        }
        Ok(project)
    }
}
