use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::affine::{AffineMatrix, Point};
use crate::pipeline::config::AlignmentOption;

/// One section in a stack: its base image, the reference it is aligned to,
/// and the alignment settings and results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub snr_skip: bool,
    pub images: LayerImages,
    #[serde(default)]
    pub align_to_ref_method: AlignToRefMethod,
    /// Fields owned by other tools, preserved on round trip.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Layer {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            skip: false,
            snr_skip: false,
            images: LayerImages {
                reference: None,
                base: ImageRecord::new(base),
                aligned: None,
            },
            align_to_ref_method: AlignToRefMethod::default(),
            extra: Map::new(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.images.base.filename
    }

    pub fn ref_path(&self) -> Option<&Path> {
        self.images.reference.as_ref().map(|r| r.filename.as_path())
    }

    pub fn results(&self) -> &MethodResults {
        &self.align_to_ref_method.method_results
    }

    pub fn results_mut(&mut self) -> &mut MethodResults {
        &mut self.align_to_ref_method.method_results
    }

    pub fn method_data(&self) -> &MethodData {
        &self.align_to_ref_method.method_data
    }

    /// Pairwise affine used for composition. `None` for skipped layers and
    /// layers that were never aligned.
    pub fn pairwise_affine(&self) -> Option<AffineMatrix> {
        if self.skip {
            None
        } else {
            self.results().affine_matrix
        }
    }

    /// Mean of the stored per-window SNR values. `None` when the layer
    /// carries no measurement (identity, applied or match-point results).
    pub fn mean_snr(&self) -> Option<f64> {
        let snr = &self.results().snr;
        if snr.is_empty() {
            None
        } else {
            Some(snr.iter().sum::<f64>() / snr.len() as f64)
        }
    }

    /// Replace the pairwise result with identity, as for a failed or
    /// skipped layer.
    pub fn set_identity(&mut self) {
        let results = self.results_mut();
        results.affine_matrix = Some(AffineMatrix::IDENTITY);
        results.snr.clear();
        results.snr_report = None;
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerImages {
    /// Predecessor's base. Absent for the first layer; an empty filename
    /// in older documents reads as absent.
    #[serde(
        rename = "ref",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_image"
    )]
    pub reference: Option<ImageRecord>,
    pub base: ImageRecord,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_image"
    )]
    pub aligned: Option<ImageRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub filename: PathBuf,
    #[serde(default)]
    pub metadata: ImageMetadata,
}

impl ImageRecord {
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            metadata: ImageMetadata::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    #[serde(default)]
    pub match_points: Vec<Point>,
    #[serde(default)]
    pub annotations: Vec<Value>,
}

#[derive(Deserialize)]
struct RawImageRecord {
    #[serde(default)]
    filename: Option<PathBuf>,
    #[serde(default)]
    metadata: ImageMetadata,
}

fn optional_image<'de, D>(deserializer: D) -> Result<Option<ImageRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawImageRecord>::deserialize(deserializer)?;
    Ok(raw.and_then(|r| match r.filename {
        Some(filename) if !filename.as_os_str().is_empty() => Some(ImageRecord {
            filename,
            metadata: r.metadata,
        }),
        _ => None,
    }))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectedMethod {
    #[default]
    #[serde(rename = "Auto Swim Align")]
    AutoSwimAlign,
    #[serde(rename = "Match Point Align")]
    MatchPointAlign,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignToRefMethod {
    #[serde(default)]
    pub selected_method: SelectedMethod,
    #[serde(default)]
    pub method_data: MethodData,
    #[serde(default)]
    pub method_results: MethodResults,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Per-layer alignment settings written by the GUI.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addx: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias_x_per_image: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias_y_per_image: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias_rot_per_image: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias_scale_x_per_image: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias_scale_y_per_image: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias_skew_x_per_image: Option<f64>,
    #[serde(default)]
    pub alignment_option: AlignmentOption,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whitening_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub win_scale_factor: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MethodData {
    /// Record that no per-image drift correction was applied.
    pub fn clear_biases(&mut self) {
        self.bias_x_per_image = Some(0.0);
        self.bias_y_per_image = Some(0.0);
        self.bias_rot_per_image = Some(0.0);
        self.bias_scale_x_per_image = Some(0.0);
        self.bias_scale_y_per_image = Some(0.0);
        self.bias_skew_x_per_image = Some(0.0);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affine_matrix: Option<AffineMatrix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cumulative_afm: Option<AffineMatrix>,
    #[serde(default)]
    pub snr: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snr_report: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
