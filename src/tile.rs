use std::collections::HashSet;
use std::ops::Range;

use anyhow::{bail, Result};
use mvt::{GeomEncoder, GeomType, Tile};
use pointy::Transform;

use crate::morton;
use crate::pool::Pool;
use crate::store::{
    IndexEntry, MetaReader, SortedStore, GEOM_LINE, GEOM_POINT, GEOM_POLYGON, OP_CLOSEPATH,
    OP_END, OP_LINETO, OP_MOVETO, TAG_BOOLEAN, TAG_NUMBER,
};
use crate::{Options, BASE_ZOOM};

/// Coordinate bits inside a tile: full detail at the base zoom, coarser
/// at the overview zooms.
const BASE_DETAIL: u32 = 12;
const OVERVIEW_DETAIL: u32 = 10;

/// Walk the sorted index from the base zoom up to zoom 0, emitting one
/// tile per run of entries that share a tile prefix.
pub fn walk(store: &SortedStore, options: &Options, file_keys: &mut Pool<String>) -> Result<()> {
    let entries = store.entries();
    let meta = store.meta();

    for z in (0..=BASE_ZOOM).rev() {
        for (tx, ty, range) in groups(entries, z) {
            println!("{}/{}/{}    {} to {}", z, tx, ty, range.start, range.end);
            let detail = if z == BASE_ZOOM {
                BASE_DETAIL
            } else {
                OVERVIEW_DETAIL
            };
            write_tile(&entries[range], meta, z, tx, ty, detail, options, file_keys)?;
        }
    }
    Ok(())
}

/// Runs of consecutive entries whose pixels share the tile prefix at zoom
/// `z`. Runs are contiguous, non-overlapping, and cover the whole index;
/// at zoom 0 there is a single run.
pub fn groups(entries: &[IndexEntry], z: u32) -> Vec<(u32, u32, Range<usize>)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < entries.len() {
        let (tx, ty) = tile_of(entries[i].key, z);
        let mut j = i + 1;
        while j < entries.len() && tile_of(entries[j].key, z) == (tx, ty) {
            j += 1;
        }
        out.push((tx, ty, i..j));
        i = j;
    }
    out
}

fn tile_of(key: u64, z: u32) -> (u32, u32) {
    if z == 0 {
        return (0, 0);
    }
    let (wx, wy) = morton::decode(key);
    (wx >> (32 - z), wy >> (32 - z))
}

/// Offset of a global pixel within tile (z, tx, ty), scaled to the tile's
/// `1 << detail` extent. Coverage is by bounding box, so pixels outside
/// the tile are expected and land outside [0, extent).
fn tile_coord(x: u32, y: u32, z: u32, tx: u32, ty: u32, detail: u32) -> (f64, f64) {
    let shift = 32 - z;
    let scale = (1u64 << (shift - detail)) as f64;
    let px = (x as i64 - ((tx as i64) << shift)) as f64 / scale;
    let py = (y as i64 - ((ty as i64) << shift)) as f64 / scale;
    (px, py)
}

/// Encode one tile from the meta records referenced by `entries` and
/// write it to `<out_dir>/<z>/<tx>/<ty>.pbf`. A tile that ends up with no
/// drawable features writes nothing.
#[allow(clippy::too_many_arguments)]
fn write_tile(
    entries: &[IndexEntry],
    meta: &[u8],
    z: u32,
    tx: u32,
    ty: u32,
    detail: u32,
    options: &Options,
    file_keys: &mut Pool<String>,
) -> Result<()> {
    let mut tile = Tile::new(1 << detail);
    let mut layer = tile.create_layer(&options.layer_name);

    // A feature spanning several base tiles appears once per covered tile;
    // draw each record only once per emitted tile.
    let mut seen = HashSet::new();

    for entry in entries {
        if !seen.insert(entry.fpos) {
            continue;
        }

        let mut reader = MetaReader::at(meta, entry.fpos);
        let primitive = reader.read_i32();
        let geom_type = match primitive {
            GEOM_POINT => GeomType::Point,
            GEOM_LINE => GeomType::Linestring,
            GEOM_POLYGON => GeomType::Polygon,
            other => bail!("corrupt meta record: geometry type {other}"),
        };

        let mut b = GeomEncoder::new(geom_type, Transform::default());
        let mut in_subpath = false;
        let mut total = 0usize;
        loop {
            match reader.read_i32() {
                OP_END => break,
                op @ (OP_MOVETO | OP_LINETO) => {
                    if op == OP_MOVETO && in_subpath && primitive != GEOM_POINT {
                        b.complete_geom()?;
                    }
                    let x = reader.read_u32();
                    let y = reader.read_u32();
                    let (px, py) = tile_coord(x, y, z, tx, ty, detail);
                    b = b.point(px, py)?;
                    in_subpath = true;
                    total += 1;
                }
                OP_CLOSEPATH => {
                    b.complete_geom()?;
                    in_subpath = false;
                }
                other => bail!("corrupt meta record: draw op {other}"),
            }
        }

        if total == 0 {
            continue;
        }

        let id = layer.num_features() as u64;
        let mut feature = layer.into_feature(b.encode()?);
        feature.set_id(id);

        let n_props = reader.read_i32();
        for _ in 0..n_props {
            let tag = reader.read_i32();
            let key = reader.read_str();
            let value = reader.read_str();
            file_keys.intern(key.to_string(), tag);
            match tag {
                TAG_NUMBER => {
                    if let Ok(number) = value.parse::<f64>() {
                        feature.add_tag_double(key, number);
                    }
                }
                TAG_BOOLEAN => feature.add_tag_bool(key, value == "true"),
                _ => feature.add_tag_string(key, value),
            }
        }
        layer = feature.into_layer();
    }

    if layer.num_features() == 0 {
        return Ok(());
    }
    tile.add_layer(layer)?;

    let dir = options.output_dir.join(z.to_string()).join(tx.to_string());
    fs_err::create_dir_all(&dir)?;
    fs_err::write(dir.join(format!("{ty}.pbf")), tile.to_bytes()?)?;
    Ok(())
}
