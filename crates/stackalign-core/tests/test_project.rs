mod common;

use std::path::{Path, PathBuf};

use stackalign_core::affine::{AffineMatrix, Point};
use stackalign_core::error::AlignError;
use stackalign_core::io::image_io::image_size;
use stackalign_core::project::{parse_scale_key, scale_key, Layer, Project, SelectedMethod, Stack};

use common::{translated_frames, write_frames};

const DOCUMENT: &str = r#"{
  "version": 0.5,
  "method": "None",
  "user": "someone",
  "data": {
    "source_path": "/src",
    "destination_path": "/dst",
    "current_scale": "scale_1",
    "current_layer": 0,
    "panel_roles": ["ref", "base", "aligned"],
    "scales": {
      "scale_1": {
        "null_cafm_trends": true,
        "poly_order": 2,
        "method_data": {"alignment_option": "init_affine"},
        "alignment_stack": [
          {
            "skip": false,
            "images": {
              "ref": {"filename": "", "metadata": {"match_points": []}},
              "base": {"filename": "/src/a.tif", "metadata": {"match_points": [], "annotations": ["note"]}}
            },
            "align_to_ref_method": {
              "selected_method": "Auto Swim Align",
              "method_options": ["Auto Swim Align", "Match Point Align"],
              "method_data": {"alignment_option": "init_affine", "win_scale_factor": 0.75},
              "method_results": {
                "affine_matrix": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                "snr": [12.5]
              }
            }
          },
          {
            "skip": true,
            "images": {
              "ref": {"filename": "/src/a.tif"},
              "base": {"filename": "/src/b.tif"}
            }
          }
        ]
      }
    }
  }
}"#;

fn parse() -> Project {
    serde_json::from_str(DOCUMENT).unwrap()
}

#[test]
fn test_document_fields() {
    let project = parse();
    assert_eq!(project.current_level().unwrap(), 1);
    let stack = project.stack(1).unwrap();
    assert!(stack.null_cafm_trends);
    assert_eq!(stack.poly_order, 2);

    let first = stack.layer(0).unwrap();
    assert!(first.images.reference.is_none());
    assert_eq!(first.method_data().win_scale_factor, Some(0.75));
    assert_eq!(first.mean_snr(), Some(12.5));
    assert_eq!(
        first.align_to_ref_method.selected_method,
        SelectedMethod::AutoSwimAlign
    );

    let second = stack.layer(1).unwrap();
    assert!(second.skip);
    assert!(second.pairwise_affine().is_none());
}

#[test]
fn test_unknown_fields_survive_round_trip() {
    let project = parse();
    let json = serde_json::to_string(&project).unwrap();
    let back: Project = serde_json::from_str(&json).unwrap();
    assert_eq!(back, project);

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["user"], "someone");
    assert_eq!(value["data"]["panel_roles"][2], "aligned");
    assert_eq!(
        value["data"]["scales"]["scale_1"]["alignment_stack"][0]["align_to_ref_method"]
            ["method_options"][1],
        "Match Point Align"
    );
    assert_eq!(
        value["data"]["scales"]["scale_1"]["alignment_stack"][0]["images"]["base"]["metadata"]
            ["annotations"][0],
        "note"
    );
}

#[test]
fn test_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("project.json");
    let project = parse();
    project.save(&path).unwrap();
    assert_eq!(Project::load(&path).unwrap(), project);
}

#[test]
fn test_bad_scale_key_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("project.json");
    let text = DOCUMENT.replace("\"scale_1\": {", "\"scale_x\": {");
    std::fs::write(&path, text).unwrap();
    assert!(matches!(Project::load(&path), Err(AlignError::UnknownScale(_))));
}

#[test]
fn test_inconsistent_project_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("project.json");

    let text = DOCUMENT.replace("scale_1\",\n", "scale_2\",\n");
    std::fs::write(&path, text).unwrap();
    assert!(matches!(Project::load(&path), Err(AlignError::InvalidProject(_))));

    let text = DOCUMENT.replace("\"/dst\"", "\"\"");
    std::fs::write(&path, text).unwrap();
    assert!(matches!(Project::load(&path), Err(AlignError::InvalidProject(_))));
}

#[test]
fn test_scale_keys() {
    assert_eq!(scale_key(4), "scale_4");
    assert_eq!(parse_scale_key("scale_4").unwrap(), 4);
    assert!(parse_scale_key("scale_0").is_err());
    assert!(parse_scale_key("4").is_err());
}

fn stack_of(names: &[&str]) -> Stack {
    let mut stack = Stack::default();
    for name in names {
        stack.alignment_stack.push(Layer::new(*name));
    }
    stack
}

#[test]
fn test_link_references_follows_order() {
    let mut stack = stack_of(&["a", "b", "c"]);
    stack.link_references();
    assert_eq!(stack.layer(0).unwrap().ref_path(), None);
    assert_eq!(stack.layer(1).unwrap().ref_path(), Some(Path::new("a")));
    assert_eq!(stack.layer(2).unwrap().ref_path(), Some(Path::new("b")));
}

#[test]
fn test_link_references_skips_skipped_layers() {
    let mut stack = stack_of(&["a", "b", "c", "d"]);
    stack.alignment_stack[1].skip = true;
    stack.alignment_stack[2].skip = true;
    stack.link_references();
    assert_eq!(stack.layer(1).unwrap().ref_path(), Some(Path::new("a")));
    assert_eq!(stack.layer(3).unwrap().ref_path(), Some(Path::new("a")));
}

#[test]
fn test_link_references_keeps_metadata_when_unchanged() {
    let mut stack = stack_of(&["a", "b"]);
    stack.link_references();
    stack.alignment_stack[1]
        .images
        .reference
        .as_mut()
        .unwrap()
        .metadata
        .match_points = vec![Point::new(1.0, 2.0)];
    stack.link_references();
    let reference = stack.layer(1).unwrap().images.reference.as_ref().unwrap();
    assert_eq!(reference.metadata.match_points, vec![Point::new(1.0, 2.0)]);
}

#[test]
fn test_layer_index_out_of_range() {
    let stack = stack_of(&["a"]);
    assert!(matches!(
        stack.layer(3),
        Err(AlignError::LayerIndexOutOfRange { index: 3, total: 1 })
    ));
}

#[test]
fn test_import_builds_downscaled_levels() {
    let dir = tempfile::tempdir().unwrap();
    let images = write_frames(dir.path(), &translated_frames(3, 64, 1, 1));
    let dest = dir.path().join("out");
    let project = Project::import(&images, &dest, &[2, 4]).unwrap();

    assert_eq!(project.levels(), vec![1, 2, 4]);
    assert_eq!(project.current_level().unwrap(), 4);

    let coarse = project.stack(4).unwrap();
    assert_eq!(coarse.len(), 3);
    let base = coarse.layer(1).unwrap().base_path().to_path_buf();
    assert!(base.starts_with(dest.join("scale_4").join("img_src")));
    assert_eq!(image_size(&base).unwrap().width, 16);
    assert_eq!(
        coarse.layer(1).unwrap().ref_path(),
        Some(coarse.layer(0).unwrap().base_path())
    );

    let full = project.stack(1).unwrap();
    assert_eq!(full.layer(2).unwrap().base_path(), images[2].as_path());
}

#[test]
fn test_import_without_images_fails() {
    let images: Vec<PathBuf> = Vec::new();
    assert!(matches!(
        Project::import(&images, Path::new("/tmp/out"), &[1]),
        Err(AlignError::EmptyStack)
    ));
}

#[test]
fn test_coarse_seed_scales_translation() {
    let mut project = Project::new(PathBuf::from("/src"), PathBuf::from("/dst"));
    for level in [1, 4] {
        let mut stack = stack_of(&["a", "b"]);
        stack.link_references();
        project.data.scales.insert(scale_key(level), stack);
    }
    {
        let coarse = project.stack_mut(4).unwrap();
        let layer = coarse.layer_mut(1).unwrap();
        layer.results_mut().affine_matrix =
            Some(AffineMatrix::new(1.01, 0.0, 2.0, 0.0, 0.99, -1.5));
        layer.images.base.metadata.match_points = vec![Point::new(3.0, 4.0)];
        layer
            .images
            .reference
            .as_mut()
            .unwrap()
            .metadata
            .match_points = vec![Point::new(2.0, 2.0)];
    }

    assert_eq!(project.coarser_level(1), Some(4));
    let seed = project.coarse_seed(1, 1).unwrap();
    assert_eq!(seed.upscale, 4.0);
    assert_eq!(seed.afm, AffineMatrix::new(1.01, 0.0, 8.0, 0.0, 0.99, -6.0));
    let (stationary, moving) = seed.match_points.unwrap();
    assert_eq!(stationary, vec![Point::new(8.0, 8.0)]);
    assert_eq!(moving, vec![Point::new(12.0, 16.0)]);
}

#[test]
fn test_coarse_seed_of_skipped_layer_is_identity() {
    let mut project = Project::new(PathBuf::from("/src"), PathBuf::from("/dst"));
    for level in [1, 2] {
        let mut stack = stack_of(&["a", "b", "c"]);
        stack.link_references();
        project.data.scales.insert(scale_key(level), stack);
    }
    {
        let coarse = project.stack_mut(2).unwrap();
        coarse.alignment_stack[2].results_mut().affine_matrix =
            Some(AffineMatrix::translation(1.0, 1.0));
        coarse.alignment_stack[1].results_mut().affine_matrix =
            Some(AffineMatrix::translation(5.0, 5.0));
        coarse.alignment_stack[1].skip = true;
    }
    let seed = project.coarse_seed(1, 1).unwrap();
    assert_eq!(seed.afm, AffineMatrix::IDENTITY);
}

#[test]
fn test_coarse_seed_without_coarser_level_fails() {
    let mut project = Project::new(PathBuf::from("/src"), PathBuf::from("/dst"));
    project
        .data
        .scales
        .insert(scale_key(1), stack_of(&["a", "b"]));
    assert!(matches!(
        project.coarse_seed(1, 1),
        Err(AlignError::Config(_))
    ));
}

#[test]
fn test_set_identity() {
    let mut layer = Layer::new("a");
    layer.set_identity();
    assert_eq!(layer.results().affine_matrix, Some(AffineMatrix::IDENTITY));
    assert!(layer.results().snr.is_empty());
    assert_eq!(layer.mean_snr(), None);
}
