use ndarray::Array2;

/// Bilinear sample at `(y, x)` with pixel centres on integer coordinates.
/// Taps outside the image read `border`.
pub fn bilinear_sample(data: &Array2<f32>, y: f64, x: f64, border: f32) -> f32 {
    let (h, w) = data.dim();
    sample_with(y, x, |r, c| {
        if r >= 0 && r < h as i64 && c >= 0 && c < w as i64 {
            data[[r as usize, c as usize]]
        } else {
            border
        }
    })
}

/// Bilinear sample with edge replication outside the image.
pub fn bilinear_sample_clamped(data: &Array2<f32>, y: f64, x: f64) -> f32 {
    let (h, w) = data.dim();
    if h == 0 || w == 0 {
        return 0.0;
    }
    sample_with(y, x, |r, c| {
        let r = r.clamp(0, h as i64 - 1) as usize;
        let c = c.clamp(0, w as i64 - 1) as usize;
        data[[r, c]]
    })
}

fn sample_with(y: f64, x: f64, tap: impl Fn(i64, i64) -> f32) -> f32 {
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = (x - x0 as f64) as f32;
    let fy = (y - y0 as f64) as f32;

    let v00 = tap(y0, x0);
    let v10 = tap(y0, x0 + 1);
    let v01 = tap(y0 + 1, x0);
    let v11 = tap(y0 + 1, x0 + 1);

    v00 * (1.0 - fx) * (1.0 - fy) + v10 * fx * (1.0 - fy) + v01 * (1.0 - fx) * fy + v11 * fx * fy
}
