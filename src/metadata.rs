use std::path::Path;

use anyhow::Result;
use serde_json::json;

use crate::mercator::{pixel_to_lonlat, PixelBBox};
use crate::pool::Pool;
use crate::store::TAG_NUMBER;
use crate::BASE_ZOOM;

/// Write the layer manifest next to the tiles. The `json` member holds
/// the serialized `vector_layers` descriptor, with one field per pooled
/// property key: `Number` for numeric values, `String` for the rest.
pub fn write_manifest(
    out_dir: &Path,
    name: &str,
    layer_name: &str,
    bbox: &PixelBBox,
    file_keys: &Pool<String>,
) -> Result<()> {
    // Pixel y grows southward, so the bbox's minimum row is the north edge.
    let (min_lon, max_lat) = pixel_to_lonlat(bbox.xmin, bbox.ymin, 32);
    let (max_lon, min_lat) = pixel_to_lonlat(bbox.xmax, bbox.ymax, 32);
    let mid_lon = (min_lon + max_lon) / 2.0;
    let mid_lat = (min_lat + max_lat) / 2.0;

    let mut fields = serde_json::Map::new();
    for (key, tag) in file_keys.iter() {
        let field_type = if tag == TAG_NUMBER { "Number" } else { "String" };
        fields.entry(key.clone()).or_insert_with(|| json!(field_type));
    }

    let layers = json!({
        "vector_layers": [{
            "id": layer_name,
            "description": "",
            "minzoom": 0,
            "maxzoom": BASE_ZOOM,
            "fields": fields,
        }]
    });

    let manifest = json!({
        "name": name,
        "description": name,
        "version": 1,
        "minzoom": 0,
        "maxzoom": BASE_ZOOM,
        "center": format!("{mid_lon:.6},{mid_lat:.6},{BASE_ZOOM}"),
        "bounds": format!("{min_lon:.6},{min_lat:.6},{max_lon:.6},{max_lat:.6}"),
        "type": "overlay",
        "json": layers.to_string(),
        "format": "pbf",
    });

    fs_err::create_dir_all(out_dir)?;
    fs_err::write(
        out_dir.join("metadata.json"),
        serde_json::to_string_pretty(&manifest)?,
    )?;
    Ok(())
}
