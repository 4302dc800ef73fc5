//! Test data generators for synthetic gridded variables and coordinates.
//!
//! Grids are returned as `Vec<f64>` in row-major order (row 0 first) so they
//! can be handed straight to [`ArraySpec`](crate::zarr::ArraySpec) whatever
//! the on-disk dtype.

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// This makes it easy to verify that chunks are sliced, truncated and
/// flipped correctly by checking that a decoded sample still equals
/// `col * 1000 + row` of its source cell.
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50); // 10 * 5
/// assert_eq!(grid[0], 0.0);   // col=0, row=0 -> 0*1000 + 0
/// assert_eq!(grid[1], 1000.0); // col=1, row=0 -> 1*1000 + 0
/// assert_eq!(grid[10], 1.0);  // col=0, row=1 -> 0*1000 + 1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f64> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f64);
        }
    }
    data
}

/// Creates a test grid with temperature-like values in Kelvin.
///
/// Values run from 250K in the top-left corner to just under 310K in the
/// bottom-right one.
pub fn create_temperature_grid(width: usize, height: usize) -> Vec<f64> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let x_factor = col as f64 / width.max(1) as f64;
            let y_factor = row as f64 / height.max(1) as f64;
            data.push(250.0 + (x_factor * 30.0) + (y_factor * 30.0));
        }
    }
    data
}

/// Creates a grid filled with a single value.
pub fn create_constant_grid(width: usize, height: usize, value: f64) -> Vec<f64> {
    vec![value; width * height]
}

/// Creates a zero grid with `fill` at the given `(col, row)` positions.
///
/// Useful for testing missing data handling.
pub fn create_grid_with_fill(
    width: usize,
    height: usize,
    fill: f64,
    positions: &[(usize, usize)],
) -> Vec<f64> {
    let mut data = vec![0.0; width * height];
    for &(col, row) in positions {
        if col < width && row < height {
            data[row * width + col] = fill;
        }
    }
    data
}

/// `n` evenly spaced values starting at `start`.
pub fn cell_centers(start: f64, step: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| start + step * i as f64).collect()
}

/// Cell-center latitudes of a global grid with `n` rows.
///
/// `descending` gives north-to-south order (89.5, 88.5, ... for `n = 180`).
pub fn global_latitudes(n: usize, descending: bool) -> Vec<f64> {
    let step = 180.0 / n as f64;
    if descending {
        cell_centers(90.0 - step / 2.0, -step, n)
    } else {
        cell_centers(-90.0 + step / 2.0, step, n)
    }
}

/// Cell-center longitudes of a global grid with `n` columns, from -180.
pub fn global_longitudes(n: usize) -> Vec<f64> {
    let step = 360.0 / n as f64;
    cell_centers(-180.0 + step / 2.0, step, n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_grid() {
        let grid = create_test_grid(10, 5);
        assert_eq!(grid.len(), 50);
        assert_eq!(grid[0], 0.0);
        assert_eq!(grid[9], 9000.0);
        assert_eq!(grid[49], 9004.0);
    }

    #[test]
    fn test_create_temperature_grid() {
        let grid = create_temperature_grid(100, 50);
        assert_eq!(grid.len(), 5000);
        for &v in &grid {
            assert!((250.0..=310.0).contains(&v), "Temperature {} out of range", v);
        }
        assert_eq!(grid[0], 250.0);
    }

    #[test]
    fn test_create_grid_with_fill() {
        let grid = create_grid_with_fill(4, 4, -9999.0, &[(1, 2), (9, 9)]);
        assert_eq!(grid[2 * 4 + 1], -9999.0);
        assert_eq!(grid.iter().filter(|&&v| v == -9999.0).count(), 1);
    }

    #[test]
    fn test_global_coordinates() {
        let lats = global_latitudes(180, true);
        assert_eq!(lats.len(), 180);
        assert_eq!(lats[0], 89.5);
        assert_eq!(lats[179], -89.5);

        let ascending = global_latitudes(4, false);
        assert_eq!(ascending, vec![-67.5, -22.5, 22.5, 67.5]);

        let lons = global_longitudes(360);
        assert_eq!(lons[0], -179.5);
        assert_eq!(lons[359], 179.5);
    }
}
