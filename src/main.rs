use std::io::BufReader;

use anyhow::Result;
use fs_err::File;

fn main() -> Result<()> {
    let options = geojson2tiles::Options {
        layer_name: "features".to_string(),
        output_dir: "tiles".into(),
    };

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        for path in &args[1..] {
            // An unopenable input shouldn't stop the rest.
            match File::open(path) {
                Ok(file) => geojson2tiles::process(BufReader::new(file), path, &options)?,
                Err(e) => eprintln!("{e}"),
            }
        }
    } else {
        let stdin = std::io::stdin();
        geojson2tiles::process(stdin.lock(), "standard input", &options)?;
    }
    Ok(())
}
