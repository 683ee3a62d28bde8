use std::io::Read;
use std::path::PathBuf;

use anyhow::Result;
use geojson::FeatureReader;
use indicatif::{HumanCount, ProgressBar, ProgressStyle};

use self::mercator::PixelBBox;
use self::pool::Pool;
use self::store::FeatureStore;

pub mod ingest;
pub mod mercator;
pub mod metadata;
pub mod morton;
pub mod pool;
pub mod store;
pub mod tile;

/// Finest zoom at which features are individually indexed.
pub const BASE_ZOOM: u32 = 14;

pub struct Options {
    pub layer_name: String,
    pub output_dir: PathBuf,
}

/// Run the pipeline over one GeoJSON input: stream features into the
/// external store, sort the index, emit the tile pyramid, write the
/// manifest. Malformed features are skipped with a diagnostic; I/O
/// failures are fatal.
pub fn process<R: Read>(input: R, name: &str, options: &Options) -> Result<()> {
    let mut store = FeatureStore::create()?;
    let mut file_bbox = PixelBBox::empty();

    let progress = ingest_progress();
    let reader = FeatureReader::from_reader(input);
    let mut seq: u64 = 0;
    for feature in reader.features() {
        let feature = match feature {
            Ok(feature) => feature,
            Err(e) => {
                // Bad JSON past this point; keep whatever was ingested.
                eprintln!("{name}: {e}");
                break;
            }
        };
        match ingest::normalize(&feature) {
            Ok(normalized) => ingest::append(&mut store, &normalized, &mut file_bbox)?,
            Err(reason) => eprintln!("{name}: feature {seq}: {reason}"),
        }
        seq += 1;
        progress.inc(1);
    }
    progress.finish_and_clear();

    println!("bbox of {} features: {:?}", HumanCount(seq), file_bbox);

    let Some(sorted) = store.finish()? else {
        eprintln!("{name}: no features indexed");
        return Ok(());
    };

    let mut file_keys = Pool::new();
    tile::walk(&sorted, options, &mut file_keys)?;
    metadata::write_manifest(
        &options.output_dir,
        name,
        &options.layer_name,
        &file_bbox,
        &file_keys,
    )?;
    Ok(())
}

fn ingest_progress() -> ProgressBar {
    ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("[{elapsed_precise}] read {human_pos} features").unwrap(),
    )
}
