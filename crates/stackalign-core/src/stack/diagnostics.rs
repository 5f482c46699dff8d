use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::info;

use crate::affine::AffineMatrix;
use crate::error::Result;
use crate::frame::Rect;
use crate::project::Stack;

use super::bias::decompose;

const SERIES: [&str; 10] = [
    "snr_1.dat",
    "bias_x_1.dat",
    "bias_y_1.dat",
    "bias_rot_1.dat",
    "bias_scale_x_1.dat",
    "bias_scale_y_1.dat",
    "bias_skew_x_1.dat",
    "bias_det_1.dat",
    "afm_1.dat",
    "c_afm_1.dat",
];

fn matrix_fields(m: &AffineMatrix) -> String {
    let [[a, b, tx], [c, d, ty]] = m.rows();
    format!("{a} {b} {tx} {c} {d} {ty}")
}

/// Write one `index value...` line per layer into each series file under
/// `dir`, plus `bounding_rect.dat` when a rectangle is given.
pub fn save_bias_analysis(stack: &Stack, dir: &Path, rect: Option<Rect>) -> Result<()> {
    fs::create_dir_all(dir)?;
    let mut writers = SERIES
        .iter()
        .map(|name| File::create(dir.join(name)).map(BufWriter::new))
        .collect::<std::io::Result<Vec<_>>>()?;

    for (i, layer) in stack.alignment_stack.iter().enumerate() {
        let results = layer.results();
        let afm = results.affine_matrix.unwrap_or(AffineMatrix::IDENTITY);
        let cafm = results.cumulative_afm.unwrap_or(AffineMatrix::IDENTITY);
        let d = decompose(&cafm);

        let values = [
            layer.mean_snr().unwrap_or(0.0).to_string(),
            d.x.to_string(),
            d.y.to_string(),
            d.rot.to_string(),
            d.scale_x.to_string(),
            d.scale_y.to_string(),
            d.skew_x.to_string(),
            d.det.to_string(),
            matrix_fields(&afm),
            matrix_fields(&cafm),
        ];
        for (w, v) in writers.iter_mut().zip(&values) {
            writeln!(w, "{i} {v}")?;
        }
    }
    for mut w in writers {
        w.flush()?;
    }

    if let Some(r) = rect {
        fs::write(
            dir.join("bounding_rect.dat"),
            format!("{} {} {} {}\n", r.x, r.y, r.width, r.height),
        )?;
    }

    info!(dir = %dir.display(), layers = stack.len(), "Saved bias diagnostics");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Layer;

    #[test]
    fn test_one_line_per_layer() {
        let dir = tempfile::tempdir().unwrap();
        let mut stack = Stack::default();
        for name in ["a.tif", "b.tif", "c.tif"] {
            stack.alignment_stack.push(Layer::new(name));
        }
        save_bias_analysis(&stack, dir.path(), Some(Rect::new(0, 0, 10, 10))).unwrap();

        let snr = fs::read_to_string(dir.path().join("snr_1.dat")).unwrap();
        assert_eq!(snr.lines().count(), 3);
        let cafm = fs::read_to_string(dir.path().join("c_afm_1.dat")).unwrap();
        assert_eq!(cafm.lines().next().unwrap(), "0 1 0 0 0 1 0");
        let rect = fs::read_to_string(dir.path().join("bounding_rect.dat")).unwrap();
        assert_eq!(rect.trim(), "0 0 10 10");
    }
}
