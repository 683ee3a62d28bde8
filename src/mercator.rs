use std::f64::consts::PI;

// http://wiki.openstreetmap.org/wiki/Slippy_map_tilenames

/// Spherical-Mercator projection of (lon, lat) onto the square pixel grid
/// at `zoom`, 2^zoom pixels on a side. Ingest always projects at zoom 32;
/// out-of-range coordinates saturate at the grid edges.
pub fn lonlat_to_pixel(lon: f64, lat: f64, zoom: u32) -> (u32, u32) {
    let n = (1u64 << zoom) as f64;
    let lat_rad = lat.to_radians();

    let x = n * ((lon + 180.0) / 360.0);
    let y = n * (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0;
    (x as u32, y as u32)
}

pub fn pixel_to_lonlat(x: u32, y: u32, zoom: u32) -> (f64, f64) {
    let n = (1u64 << zoom) as f64;
    let lon = 360.0 * x as f64 / n - 180.0;
    let lat_rad = (PI * (1.0 - 2.0 * y as f64 / n)).sinh().atan();
    (lon, lat_rad.to_degrees())
}

/// Min/max accumulator in zoom-32 pixel space. Starts at the inverted
/// sentinel, so an untouched bbox reads as empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBBox {
    pub xmin: u32,
    pub ymin: u32,
    pub xmax: u32,
    pub ymax: u32,
}

impl PixelBBox {
    pub fn empty() -> Self {
        Self {
            xmin: u32::MAX,
            ymin: u32::MAX,
            xmax: 0,
            ymax: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.xmin > self.xmax || self.ymin > self.ymax
    }

    pub fn add(&mut self, x: u32, y: u32) {
        self.xmin = self.xmin.min(x);
        self.ymin = self.ymin.min(y);
        self.xmax = self.xmax.max(x);
        self.ymax = self.ymax.max(y);
    }

    pub fn merge(&mut self, other: &PixelBBox) {
        self.xmin = self.xmin.min(other.xmin);
        self.ymin = self.ymin.min(other.ymin);
        self.xmax = self.xmax.max(other.xmax);
        self.ymax = self.ymax.max(other.ymax);
    }

    pub fn center(&self) -> (u32, u32) {
        (
            ((self.xmin as u64 + self.xmax as u64) / 2) as u32,
            ((self.ymin as u64 + self.ymax as u64) / 2) as u32,
        )
    }
}
