use anyhow::{Context, Result};
use beam_common::config::FieldSource;
use beam_common::Vec3;
use serde::Deserialize;
use std::path::Path;

/// A precomputed static field, sampled at arbitrary positions.
///
/// Pure function of position, stateless across calls. Sampling outside the
/// tabulated domain is a fatal error: forces extrapolated past the grid are
/// physically meaningless, so the run aborts instead.
pub trait FieldInterpolator: Send + Sync {
    fn sample(&self, pos: Vec3) -> Result<Vec3>;
}

/// Constant field over all space. Used for vacuum/test runs.
pub struct UniformField {
    value: Vec3,
}

impl UniformField {
    pub fn new(value: Vec3) -> Self {
        Self { value }
    }
}

impl FieldInterpolator for UniformField {
    fn sample(&self, _pos: Vec3) -> Result<Vec3> {
        Ok(self.value)
    }
}

/// Radially symmetric field tabulated as a signed magnitude along the
/// outward radial unit vector in the x-y plane.
pub struct RadialFieldInterpolation {
    radii: Vec<f64>,
    field: Vec<f64>,
}

impl RadialFieldInterpolation {
    pub fn new(radii: Vec<f64>, field: Vec<f64>) -> Result<Self> {
        if radii.len() < 2 || radii.len() != field.len() {
            anyhow::bail!(
                "radial field table needs at least two (r, field) rows, got {} radii / {} values",
                radii.len(),
                field.len()
            );
        }
        if radii.windows(2).any(|w| w[1] <= w[0]) {
            anyhow::bail!("radial field grid must be strictly ascending");
        }
        Ok(Self { radii, field })
    }
}

impl FieldInterpolator for RadialFieldInterpolation {
    fn sample(&self, pos: Vec3) -> Result<Vec3> {
        let r = (pos.x * pos.x + pos.y * pos.y).sqrt();
        let r_min = self.radii[0];
        let r_max = *self.radii.last().unwrap_or(&r_min);
        if r < r_min || r > r_max {
            anyhow::bail!(
                "radius {:.6e} at position ({:.6e}, {:.6e}, {:.6e}) is outside the field domain [{:.6e}, {:.6e}]",
                r, pos.x, pos.y, pos.z, r_min, r_max
            );
        }
        // Segment lookup + linear interpolation of the signed magnitude.
        let hi = self.radii.partition_point(|&x| x < r).clamp(1, self.radii.len() - 1);
        let lo = hi - 1;
        let t = (r - self.radii[lo]) / (self.radii[hi] - self.radii[lo]);
        let magnitude = self.field[lo] + t * (self.field[hi] - self.field[lo]);

        if r < 1e-12 {
            // No radial direction on the axis.
            return Ok(Vec3::zero());
        }
        Ok(Vec3::new(pos.x / r, pos.y / r, 0.0).scale(magnitude))
    }
}

/// Vector field tabulated on a regular 3-D grid, sampled with trilinear
/// interpolation.
pub struct FieldInterpolation3d {
    origin: Vec3,
    step: Vec3,
    dims: [usize; 3],
    /// Row-major (ix, iy, iz) samples.
    data: Vec<Vec3>,
}

impl FieldInterpolation3d {
    pub fn new(x: Vec<f64>, y: Vec<f64>, z: Vec<f64>, data: Vec<Vec3>) -> Result<Self> {
        let step = Vec3::new(
            uniform_step(&x).context("x axis")?,
            uniform_step(&y).context("y axis")?,
            uniform_step(&z).context("z axis")?,
        );
        if data.len() != x.len() * y.len() * z.len() {
            anyhow::bail!(
                "grid field table has {} samples for a {}x{}x{} grid",
                data.len(),
                x.len(),
                y.len(),
                z.len()
            );
        }
        Ok(Self {
            origin: Vec3::new(x[0], y[0], z[0]),
            step,
            dims: [x.len(), y.len(), z.len()],
            data,
        })
    }

    #[inline(always)]
    fn at(&self, ix: usize, iy: usize, iz: usize) -> Vec3 {
        self.data[(ix * self.dims[1] + iy) * self.dims[2] + iz]
    }
}

/// Fractional grid coordinate along one axis, or None outside the domain.
#[inline(always)]
fn grid_coord(v: f64, origin: f64, step: f64, n: usize) -> Option<(usize, f64)> {
    let f = (v - origin) / step;
    let max = (n - 1) as f64;
    // Tolerate round-off at the domain faces.
    if f < -1e-9 || f > max + 1e-9 {
        return None;
    }
    let f = f.clamp(0.0, max);
    let i = (f.floor() as usize).min(n - 2);
    Some((i, f - i as f64))
}

fn uniform_step(axis: &[f64]) -> Result<f64> {
    if axis.len() < 2 {
        anyhow::bail!("grid axis needs at least two points");
    }
    let step = axis[1] - axis[0];
    if step <= 0.0 {
        anyhow::bail!("grid axis must be strictly ascending");
    }
    for w in axis.windows(2) {
        if ((w[1] - w[0]) - step).abs() > 1e-6 * step.abs() {
            anyhow::bail!("grid axis spacing is not uniform");
        }
    }
    Ok(step)
}

impl FieldInterpolator for FieldInterpolation3d {
    fn sample(&self, pos: Vec3) -> Result<Vec3> {
        let out_of_domain = || {
            anyhow::anyhow!(
                "position ({:.6e}, {:.6e}, {:.6e}) is outside the field grid domain",
                pos.x,
                pos.y,
                pos.z
            )
        };
        let (ix, tx) =
            grid_coord(pos.x, self.origin.x, self.step.x, self.dims[0]).ok_or_else(out_of_domain)?;
        let (iy, ty) =
            grid_coord(pos.y, self.origin.y, self.step.y, self.dims[1]).ok_or_else(out_of_domain)?;
        let (iz, tz) =
            grid_coord(pos.z, self.origin.z, self.step.z, self.dims[2]).ok_or_else(out_of_domain)?;

        // Blend the eight cell corners.
        let mut out = Vec3::zero();
        for (dx, wx) in [(0, 1.0 - tx), (1, tx)] {
            for (dy, wy) in [(0, 1.0 - ty), (1, ty)] {
                for (dz, wz) in [(0, 1.0 - tz), (1, tz)] {
                    let w = wx * wy * wz;
                    if w != 0.0 {
                        out = out.add(self.at(ix + dx, iy + dy, iz + dz).scale(w));
                    }
                }
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Deserialize)]
struct RadialRow {
    r: f64,
    field: f64,
}

#[derive(Debug, Deserialize)]
struct GridRow {
    x: f64,
    y: f64,
    z: f64,
    fx: f64,
    fy: f64,
    fz: f64,
}

/// Loads a radial field table from a CSV file with `r,field` columns.
pub fn load_radial_field_csv<P: AsRef<Path>>(path: P) -> Result<RadialFieldInterpolation> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open radial field table '{}'", path.display()))?;
    let mut radii = Vec::new();
    let mut field = Vec::new();
    for row in reader.deserialize() {
        let row: RadialRow =
            row.with_context(|| format!("Malformed row in '{}'", path.display()))?;
        radii.push(row.r);
        field.push(row.field);
    }
    RadialFieldInterpolation::new(radii, field)
        .with_context(|| format!("Invalid radial field table '{}'", path.display()))
}

/// Loads a regular-grid 3-D field from a CSV file with `x,y,z,fx,fy,fz`
/// columns; every grid node must appear exactly once. `scale` multiplies the
/// loaded vectors (the two-coil field data ships unscaled).
pub fn load_grid_field_csv<P: AsRef<Path>>(path: P, scale: f64) -> Result<FieldInterpolation3d> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open grid field table '{}'", path.display()))?;
    let mut rows: Vec<GridRow> = Vec::new();
    for row in reader.deserialize() {
        rows.push(row.with_context(|| format!("Malformed row in '{}'", path.display()))?);
    }
    if rows.is_empty() {
        anyhow::bail!("grid field table '{}' is empty", path.display());
    }

    let x = sorted_axis(rows.iter().map(|r| r.x));
    let y = sorted_axis(rows.iter().map(|r| r.y));
    let z = sorted_axis(rows.iter().map(|r| r.z));
    let (nx, ny, nz) = (x.len(), y.len(), z.len());
    if rows.len() != nx * ny * nz {
        anyhow::bail!(
            "grid field table '{}' has {} rows, expected {}x{}x{} = {}",
            path.display(),
            rows.len(),
            nx,
            ny,
            nz,
            nx * ny * nz
        );
    }

    let mut data = vec![None; rows.len()];
    for row in &rows {
        let ix = axis_index(&x, row.x);
        let iy = axis_index(&y, row.y);
        let iz = axis_index(&z, row.z);
        let idx = (ix * ny + iy) * nz + iz;
        if data[idx].replace(Vec3::new(row.fx, row.fy, row.fz).scale(scale)).is_some() {
            anyhow::bail!(
                "grid field table '{}' repeats node ({}, {}, {})",
                path.display(),
                row.x,
                row.y,
                row.z
            );
        }
    }
    let data = data
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .with_context(|| format!("grid field table '{}' is missing grid nodes", path.display()))?;
    FieldInterpolation3d::new(x, y, z, data)
        .with_context(|| format!("Invalid grid field table '{}'", path.display()))
}

fn sorted_axis(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut axis: Vec<f64> = values.collect();
    axis.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    axis.dedup_by(|a, b| (*a - *b).abs() < 1e-12);
    axis
}

fn axis_index(axis: &[f64], v: f64) -> usize {
    axis.partition_point(|&x| x < v - 1e-12).min(axis.len() - 1)
}

/// Constructs the interpolator described by a `[fields]` config entry.
pub fn build_field(source: &FieldSource) -> Result<Box<dyn FieldInterpolator>> {
    Ok(match source {
        FieldSource::Uniform { value } => Box::new(UniformField::new(Vec3::from_array(*value))),
        FieldSource::RadialCsv { path } => Box::new(load_radial_field_csv(path)?),
        FieldSource::GridCsv { path, scale } => Box::new(load_grid_field_csv(path, *scale)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_grid() -> FieldInterpolation3d {
        // f(x, y, z) = (x, 2y, x + z) sampled on [0,2]^3 with step 1.
        let axis = vec![0.0, 1.0, 2.0];
        let mut data = Vec::new();
        for &x in &axis {
            for &y in &axis {
                for &z in &axis {
                    data.push(Vec3::new(x, 2.0 * y, x + z));
                }
            }
        }
        FieldInterpolation3d::new(axis.clone(), axis.clone(), axis, data).unwrap()
    }

    #[test]
    fn trilinear_reproduces_linear_fields_exactly() {
        let field = linear_grid();
        let p = Vec3::new(0.3, 1.7, 0.9);
        let got = field.sample(p).unwrap();
        assert!((got.x - 0.3).abs() < 1e-12);
        assert!((got.y - 3.4).abs() < 1e-12);
        assert!((got.z - 1.2).abs() < 1e-12);
    }

    #[test]
    fn grid_sample_outside_domain_fails() {
        let field = linear_grid();
        assert!(field.sample(Vec3::new(2.5, 0.0, 0.0)).is_err());
        assert!(field.sample(Vec3::new(0.0, -0.1, 0.0)).is_err());
    }

    #[test]
    fn radial_field_points_along_radius() {
        let interp =
            RadialFieldInterpolation::new(vec![0.0, 1.0, 2.0], vec![0.0, 10.0, 20.0]).unwrap();
        let f = interp.sample(Vec3::new(0.0, 1.5, 0.3)).unwrap();
        assert!((f.x - 0.0).abs() < 1e-12);
        assert!((f.y - 15.0).abs() < 1e-12);
        assert_eq!(f.z, 0.0);
    }

    #[test]
    fn radial_sample_outside_domain_fails() {
        let interp = RadialFieldInterpolation::new(vec![0.5, 1.0], vec![1.0, 2.0]).unwrap();
        assert!(interp.sample(Vec3::new(0.0, 0.1, 0.0)).is_err());
        assert!(interp.sample(Vec3::new(3.0, 0.0, 0.0)).is_err());
    }
}
