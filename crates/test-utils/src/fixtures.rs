//! Common test fixtures for zarr-explorer tests.
//!
//! Pre-built stores for the scenarios the engine is exercised against.
//! Each fixture returns a [`ZarrStoreBuilder`] so a test can still add,
//! replace or drop objects before calling `build()`.

use serde_json::json;

use crate::generators::{
    create_temperature_grid, create_test_grid, global_latitudes, global_longitudes,
};
use crate::zarr::{ArraySpec, Compression, ZarrStoreBuilder};

/// Common bounding box definitions for testing, `(min_lon, min_lat, max_lon, max_lat)`.
pub mod bbox {
    /// Global bounding box (-180 to 180, -90 to 90)
    pub const GLOBAL: (f64, f64, f64, f64) = (-180.0, -90.0, 180.0, 90.0);

    /// Continental United States bounding box
    pub const CONUS: (f64, f64, f64, f64) = (-130.0, 20.0, -60.0, 55.0);

    /// Europe bounding box
    pub const EUROPE: (f64, f64, f64, f64) = (-15.0, 35.0, 45.0, 72.0);

    /// Crosses the antimeridian (Pacific-centric, min_lon > max_lon)
    pub const PACIFIC: (f64, f64, f64, f64) = (160.0, -50.0, -140.0, 50.0);
}

/// Layout of the global air temperature fixture.
pub mod air_temperature {
    pub const VARIABLE: &str = "air_temperature";
    pub const SHAPE: [usize; 3] = [1, 180, 360];
    pub const CHUNKS: [usize; 3] = [1, 45, 90];
    pub const SEPARATOR: &str = "/";
    pub const TIME_UNITS: &str = "hours since 1800-01-01";
}

/// Global 1-degree air temperature on a `time, lat, lon` grid.
///
/// Latitudes run north to south (89.5 .. -89.5), longitudes from -179.5 to
/// 179.5. Chunks are zlib-compressed `<f4` with a `/` key separator.
pub fn air_temperature_store() -> ZarrStoreBuilder {
    let [_, height, width] = air_temperature::SHAPE;

    ZarrStoreBuilder::new()
        .coordinate(
            "time",
            &[0.0],
            json!({"units": air_temperature::TIME_UNITS, "calendar": "standard"}),
        )
        .coordinate(
            "lat",
            &global_latitudes(height, true),
            json!({"units": "degrees_north", "standard_name": "latitude"}),
        )
        .coordinate(
            "lon",
            &global_longitudes(width),
            json!({"units": "degrees_east", "standard_name": "longitude"}),
        )
        .array(air_temperature_array(create_temperature_grid(width, height)))
}

/// The air temperature variable with custom values, for tests that swap the
/// data (all-fill windows, marker grids).
pub fn air_temperature_array(data: Vec<f64>) -> ArraySpec {
    ArraySpec::new(
        air_temperature::VARIABLE,
        &["time", "lat", "lon"],
        &air_temperature::SHAPE,
        &air_temperature::CHUNKS,
        data,
    )
    .compression(Compression::Zlib)
    .separator(air_temperature::SEPARATOR)
    .fill_value(json!(-9999.0))
    .attr("units", json!("K"))
}

/// Web-mercator multiscale pyramid with `levels` levels of a `y, x`
/// variable named `tavg`.
///
/// Level `z` is `(8 << z)` pixels square in blosc-compressed 8x8 chunks and
/// carries no coordinate arrays. Values follow [`create_test_grid`].
pub fn pyramid_store(levels: usize) -> ZarrStoreBuilder {
    let datasets: Vec<_> = (0..levels).map(|z| json!({"path": z.to_string()})).collect();

    let mut builder = ZarrStoreBuilder::new().root_attrs(json!({
        "multiscales": [{"datasets": datasets, "type": "reduce"}]
    }));

    for z in 0..levels {
        let n = 8usize << z;
        builder = builder.group(&z.to_string()).array(
            ArraySpec::new(&format!("{}/tavg", z), &["y", "x"], &[n, n], &[8, 8], create_test_grid(n, n))
                .compression(Compression::Blosc)
                .separator("/"),
        );
    }
    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_air_temperature_chunk_keys() {
        let objects = air_temperature_store().build();
        assert!(objects.contains_key("air_temperature/0/0/0"));
        assert!(objects.contains_key("air_temperature/0/3/3"));
        assert!(!objects.contains_key("air_temperature/0/4/0"));
        assert!(objects.contains_key("lat/0"));
        assert!(objects.contains_key("time/.zattrs"));
    }

    #[test]
    fn test_pyramid_levels() {
        let objects = pyramid_store(3).build();
        assert!(objects.contains_key("0/tavg/0/0"));
        assert!(objects.contains_key("2/tavg/3/3"));
        assert!(!objects.contains_key("2/tavg/4/0"));
        assert!(objects.contains_key("1/.zgroup"));
    }
}
