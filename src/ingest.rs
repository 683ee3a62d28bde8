use anyhow::Result;
use geojson::{Feature, Value};
use serde_json::Value as Json;

use crate::mercator::{lonlat_to_pixel, PixelBBox};
use crate::morton;
use crate::store::{
    FeatureStore, IndexEntry, GEOM_LINE, GEOM_POINT, GEOM_POLYGON, OP_CLOSEPATH, OP_END,
    OP_LINETO, OP_MOVETO, TAG_BOOLEAN, TAG_NUMBER, TAG_STRING,
};
use crate::BASE_ZOOM;

/// The six geometry kinds the pipeline accepts, and the tile primitive
/// each renders as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeomKind {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
}

impl GeomKind {
    fn of(value: &Value) -> Option<GeomKind> {
        Some(match value {
            Value::Point(_) => GeomKind::Point,
            Value::MultiPoint(_) => GeomKind::MultiPoint,
            Value::LineString(_) => GeomKind::LineString,
            Value::MultiLineString(_) => GeomKind::MultiLineString,
            Value::Polygon(_) => GeomKind::Polygon,
            Value::MultiPolygon(_) => GeomKind::MultiPolygon,
            Value::GeometryCollection(_) => return None,
        })
    }

    pub fn primitive(self) -> i32 {
        match self {
            GeomKind::Point | GeomKind::MultiPoint => GEOM_POINT,
            GeomKind::LineString | GeomKind::MultiLineString => GEOM_LINE,
            GeomKind::Polygon | GeomKind::MultiPolygon => GEOM_POLYGON,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawOp {
    MoveTo(u32, u32),
    LineTo(u32, u32),
    ClosePath,
}

/// A feature reduced to what the store holds: its tile primitive, draw
/// ops in zoom-32 pixels, pixel bbox, and type-tagged properties.
#[derive(Debug)]
pub struct Normalized {
    pub primitive: i32,
    pub ops: Vec<DrawOp>,
    pub bbox: PixelBBox,
    pub props: Vec<(i32, String, String)>,
}

/// Validate and project one feature. Pure: a rejected feature names its
/// reason and leaves no trace anywhere.
pub fn normalize(feature: &Feature) -> Result<Normalized, String> {
    let geometry = feature
        .geometry
        .as_ref()
        .ok_or_else(|| "feature with no geometry".to_string())?;
    let kind = GeomKind::of(&geometry.value)
        .ok_or_else(|| "can't handle geometry type GeometryCollection".to_string())?;
    let properties = feature
        .properties
        .as_ref()
        .ok_or_else(|| "feature without properties object".to_string())?;

    let mut ops = Vec::new();
    let mut bbox = PixelBBox::empty();
    walk(&geometry.value, &mut ops, &mut bbox)?;
    if kind.primitive() == GEOM_POLYGON {
        ops.push(DrawOp::ClosePath);
    }

    let mut props = Vec::with_capacity(properties.len());
    for (key, value) in properties {
        let (tag, text) = match value {
            Json::String(s) => (TAG_STRING, s.clone()),
            Json::Number(n) => (TAG_NUMBER, n.to_string()),
            Json::Bool(b) => (TAG_BOOLEAN, b.to_string()),
            _ => return Err(format!("unsupported property value for {key:?}")),
        };
        props.push((tag, key.clone(), text));
    }

    Ok(Normalized {
        primitive: kind.primitive(),
        ops,
        bbox,
        props,
    })
}

fn walk(value: &Value, ops: &mut Vec<DrawOp>, bbox: &mut PixelBBox) -> Result<(), String> {
    match value {
        Value::Point(p) => position(p, true, ops, bbox)?,
        Value::MultiPoint(points) => {
            // Every position of a MultiPoint starts its own subpath.
            for p in points {
                position(p, true, ops, bbox)?;
            }
        }
        Value::LineString(path) => subpath(path, ops, bbox)?,
        Value::MultiLineString(paths) => {
            for path in paths {
                subpath(path, ops, bbox)?;
            }
        }
        Value::Polygon(rings) => {
            for ring in rings {
                subpath(ring, ops, bbox)?;
            }
        }
        Value::MultiPolygon(polygons) => {
            for rings in polygons {
                for ring in rings {
                    subpath(ring, ops, bbox)?;
                }
            }
        }
        Value::GeometryCollection(_) => {
            return Err("can't handle geometry type GeometryCollection".to_string())
        }
    }
    Ok(())
}

fn subpath(path: &[Vec<f64>], ops: &mut Vec<DrawOp>, bbox: &mut PixelBBox) -> Result<(), String> {
    for (i, p) in path.iter().enumerate() {
        position(p, i == 0, ops, bbox)?;
    }
    Ok(())
}

fn position(
    p: &[f64],
    moveto: bool,
    ops: &mut Vec<DrawOp>,
    bbox: &mut PixelBBox,
) -> Result<(), String> {
    if p.len() != 2 {
        return Err(format!("malformed position {p:?}"));
    }
    let (x, y) = lonlat_to_pixel(p[0], p[1], 32);
    bbox.add(x, y);
    ops.push(if moveto {
        DrawOp::MoveTo(x, y)
    } else {
        DrawOp::LineTo(x, y)
    });
    Ok(())
}

/// Append a normalized feature: the meta record, then one index entry per
/// base-zoom tile its bbox touches. The tile holding the bbox center gets
/// the center's exact key; every other covered tile gets its NW corner
/// key, so any covering tile's range scan still finds the feature.
pub fn append(
    store: &mut FeatureStore,
    feature: &Normalized,
    file_bbox: &mut PixelBBox,
) -> Result<()> {
    let start = store.meta.pos();

    store.meta.write_i32(feature.primitive)?;
    for op in &feature.ops {
        match *op {
            DrawOp::MoveTo(x, y) => {
                store.meta.write_i32(OP_MOVETO)?;
                store.meta.write_u32(x)?;
                store.meta.write_u32(y)?;
            }
            DrawOp::LineTo(x, y) => {
                store.meta.write_i32(OP_LINETO)?;
                store.meta.write_u32(x)?;
                store.meta.write_u32(y)?;
            }
            DrawOp::ClosePath => store.meta.write_i32(OP_CLOSEPATH)?,
        }
    }
    store.meta.write_i32(OP_END)?;

    store.meta.write_i32(feature.props.len() as i32)?;
    for (tag, key, value) in &feature.props {
        store.meta.write_i32(*tag)?;
        store.meta.write_str(key)?;
        store.meta.write_str(value)?;
    }

    let bbox = &feature.bbox;
    if bbox.is_empty() {
        // No positions, nothing to index.
        return Ok(());
    }

    let shift = 32 - BASE_ZOOM;
    let (cx, cy) = bbox.center();
    for tx in (bbox.xmin >> shift)..=(bbox.xmax >> shift) {
        for ty in (bbox.ymin >> shift)..=(bbox.ymax >> shift) {
            let key = if (tx, ty) == (cx >> shift, cy >> shift) {
                morton::encode(cx, cy)
            } else {
                morton::encode(tx << shift, ty << shift)
            };
            store.index.write(IndexEntry { key, fpos: start })?;
        }
    }

    file_bbox.merge(bbox);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(json: &str) -> Feature {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn point_becomes_one_moveto() {
        let n = normalize(&feature(
            r#"{"type":"Feature","properties":{"name":"A"},
                "geometry":{"type":"Point","coordinates":[0,0]}}"#,
        ))
        .unwrap();
        assert_eq!(n.primitive, GEOM_POINT);
        assert_eq!(n.ops, [DrawOp::MoveTo(1 << 31, 1 << 31)]);
        assert_eq!(n.bbox.center(), (1 << 31, 1 << 31));
    }

    #[test]
    fn linestring_is_moveto_then_lineto() {
        let n = normalize(&feature(
            r#"{"type":"Feature","properties":{},
                "geometry":{"type":"LineString","coordinates":[[0,0],[1,1]]}}"#,
        ))
        .unwrap();
        assert_eq!(n.primitive, GEOM_LINE);
        assert_eq!(n.ops.len(), 2);
        assert!(matches!(n.ops[0], DrawOp::MoveTo(..)));
        assert!(matches!(n.ops[1], DrawOp::LineTo(..)));
    }

    #[test]
    fn polygon_gets_one_trailing_closepath() {
        let n = normalize(&feature(
            r#"{"type":"Feature","properties":{},
                "geometry":{"type":"Polygon","coordinates":
                    [[[0,0],[1,0],[1,1],[0,1],[0,0]],
                     [[0.2,0.2],[0.4,0.2],[0.4,0.4],[0.2,0.2]]]}}"#,
        ))
        .unwrap();
        assert_eq!(n.primitive, GEOM_POLYGON);
        // One CLOSEPATH for the whole geometry, ring count notwithstanding.
        let closes = n.ops.iter().filter(|op| **op == DrawOp::ClosePath).count();
        assert_eq!(closes, 1);
        assert_eq!(*n.ops.last().unwrap(), DrawOp::ClosePath);
        // The second ring still opens with its own MOVETO.
        let moves = n
            .ops
            .iter()
            .filter(|op| matches!(op, DrawOp::MoveTo(..)))
            .count();
        assert_eq!(moves, 2);
    }

    #[test]
    fn multipoint_is_all_moveto() {
        let n = normalize(&feature(
            r#"{"type":"Feature","properties":{},
                "geometry":{"type":"MultiPoint","coordinates":[[0,0],[10,10]]}}"#,
        ))
        .unwrap();
        assert!(n.ops.iter().all(|op| matches!(op, DrawOp::MoveTo(..))));
        assert_eq!(n.ops.len(), 2);
    }

    #[test]
    fn property_type_tags() {
        let n = normalize(&feature(
            r#"{"type":"Feature","properties":{"rank":3,"ok":true,"name":"X"},
                "geometry":{"type":"Point","coordinates":[0,0]}}"#,
        ))
        .unwrap();
        assert_eq!(n.props.len(), 3);
        assert!(n
            .props
            .contains(&(TAG_NUMBER, "rank".to_string(), "3".to_string())));
        assert!(n
            .props
            .contains(&(TAG_BOOLEAN, "ok".to_string(), "true".to_string())));
        assert!(n
            .props
            .contains(&(TAG_STRING, "name".to_string(), "X".to_string())));
    }

    #[test]
    fn rejects_geometry_collection() {
        let err = normalize(&feature(
            r#"{"type":"Feature","properties":{},
                "geometry":{"type":"GeometryCollection","geometries":[]}}"#,
        ))
        .unwrap_err();
        assert!(err.contains("GeometryCollection"));
    }

    #[test]
    fn rejects_missing_pieces() {
        assert!(normalize(&feature(
            r#"{"type":"Feature","properties":{},"geometry":null}"#
        ))
        .is_err());
        assert!(normalize(&feature(
            r#"{"type":"Feature","properties":null,
                "geometry":{"type":"Point","coordinates":[0,0]}}"#
        ))
        .is_err());
    }

    #[test]
    fn rejects_bad_positions_and_values() {
        assert!(normalize(&feature(
            r#"{"type":"Feature","properties":{},
                "geometry":{"type":"Point","coordinates":[0,0,50]}}"#
        ))
        .is_err());
        assert!(normalize(&feature(
            r#"{"type":"Feature","properties":{"tags":[1,2]},
                "geometry":{"type":"Point","coordinates":[0,0]}}"#
        ))
        .is_err());
    }

    #[test]
    fn coverage_is_one_entry_per_touched_tile() -> Result<()> {
        let n = normalize(&feature(
            r#"{"type":"Feature","properties":{},
                "geometry":{"type":"LineString","coordinates":[[0,0],[0.1,0.1]]}}"#,
        ))
        .unwrap();

        let shift = 32 - BASE_ZOOM;
        let bbox = n.bbox;
        let across = (bbox.xmax >> shift) - (bbox.xmin >> shift) + 1;
        let down = (bbox.ymax >> shift) - (bbox.ymin >> shift) + 1;
        assert!(across > 1, "fixture should span several base tiles");

        let mut store = FeatureStore::create()?;
        let mut file_bbox = PixelBBox::empty();
        append(&mut store, &n, &mut file_bbox)?;
        assert_eq!(store.index.count(), (across as u64) * (down as u64));
        assert_eq!(file_bbox, bbox);

        let sorted = store.finish()?.unwrap();
        let entries = sorted.entries();
        // Every entry points at this feature's record.
        assert!(entries.iter().all(|e| e.fpos == 0));
        // The center tile carries the exact center key.
        let (cx, cy) = bbox.center();
        assert!(entries.iter().any(|e| e.key == morton::encode(cx, cy)));
        Ok(())
    }

    #[test]
    fn empty_geometry_emits_no_entries() -> Result<()> {
        let n = normalize(&feature(
            r#"{"type":"Feature","properties":{},
                "geometry":{"type":"LineString","coordinates":[]}}"#,
        ))
        .unwrap();
        assert!(n.bbox.is_empty());

        let mut store = FeatureStore::create()?;
        let mut file_bbox = PixelBBox::empty();
        append(&mut store, &n, &mut file_bbox)?;
        assert_eq!(store.index.count(), 0);
        assert!(file_bbox.is_empty());
        Ok(())
    }
}
