use clap::Parser;
use s2fetch::config::{DEFAULT_LOCATION_WKT, DEFAULT_TILE_GRID};
use s2fetch::io::auth::DEFAULT_REFRESH_INTERVAL;
use s2fetch::io::MalformedRecordPolicy;
use s2fetch::{Endpoints, FetchConfig};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "s2fetch")]
#[command(about = "Downloads the clearest Sentinel-2 products covering a region", long_about = None)]
pub struct Args {
    /// The location (in WKT) to query the catalogue for
    #[arg(short, long, default_value = DEFAULT_LOCATION_WKT)]
    pub location: String,

    /// The months to query the catalogue for
    #[arg(
        short,
        long,
        num_args = 1..,
        value_parser = clap::value_parser!(u32).range(1..=12),
        default_values_t = [1u32, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]
    )]
    pub months: Vec<u32>,

    /// The year to start looking for data on (inclusive)
    #[arg(short, long)]
    pub start_year: i32,

    /// The year to end looking for data on (inclusive)
    #[arg(short, long)]
    pub end_year: i32,

    /// The maximum acceptable cloud cover (in %)
    #[arg(short = 'c', long, default_value_t = 20.0)]
    pub max_cloud_cover: f64,

    /// The minimum acceptable tile intersection with the shape (in %)
    #[arg(short = 't', long, default_value_t = 30.0)]
    pub minimum_tile_intersection: f64,

    /// The minimum share of the clipped tile a product footprint must cover (in %)
    #[arg(long, default_value_t = 80.0)]
    pub minimum_coverage: f64,

    /// The directory to output downloads to
    #[arg(short, long, default_value = "./data")]
    pub output_directory: PathBuf,

    /// Sentinel-2 tiling system definition file
    #[arg(long, default_value = DEFAULT_TILE_GRID)]
    pub tile_grid: PathBuf,

    /// Skip unparsable tile grid records instead of aborting
    #[arg(long)]
    pub skip_malformed_grid_records: bool,

    /// Replace the access token after this many downloads
    #[arg(long, default_value_t = DEFAULT_REFRESH_INTERVAL)]
    pub refresh_interval: usize,

    /// Keep downloaded payloads even if they do not open as zip archives
    #[arg(long)]
    pub no_verify_archives: bool,

    /// Do not ask for confirmation before downloading
    #[arg(short, long)]
    pub yes: bool,
}

impl Args {
    pub fn to_config(&self) -> FetchConfig {
        FetchConfig {
            location_wkt: self.location.clone(),
            months: self.months.iter().copied().collect(),
            start_year: self.start_year,
            end_year: self.end_year,
            max_cloud_cover: self.max_cloud_cover,
            min_tile_intersection: self.minimum_tile_intersection,
            min_coverage: self.minimum_coverage,
            output_dir: self.output_directory.clone(),
            tile_grid: self.tile_grid.clone(),
            grid_policy: if self.skip_malformed_grid_records {
                MalformedRecordPolicy::Skip
            } else {
                MalformedRecordPolicy::Abort
            },
            refresh_interval: self.refresh_interval,
            verify_archives: !self.no_verify_archives,
            endpoints: Endpoints::default(),
        }
    }
}

/// Print `prompt` and read one answer line. Only answers starting with `y`
/// or `Y` accept; anything else, including end of input, declines.
pub fn confirm<R: BufRead, W: Write>(mut input: R, mut output: W, prompt: &str) -> io::Result<bool> {
    write!(output, "{}", prompt)?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;

    Ok(answer
        .trim_start()
        .chars()
        .next()
        .map(|c| c.eq_ignore_ascii_case(&'y'))
        .unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_confirm_answers() {
        for (answer, expected) in [("y\n", true), ("Yes\n", true), ("n\n", false), ("\n", false), ("", false)] {
            let mut out = Vec::new();
            let accepted = confirm(Cursor::new(answer), &mut out, "Continue? [Y/N]: ").unwrap();
            assert_eq!(accepted, expected, "answer {:?}", answer);
            assert_eq!(String::from_utf8(out).unwrap(), "Continue? [Y/N]: ");
        }
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["s2fetch", "-s", "2022", "-e", "2023"]).unwrap();
        let config = args.to_config();

        assert_eq!(config.months.len(), 12);
        assert_eq!(config.max_cloud_cover, 20.0);
        assert_eq!(config.min_tile_intersection, 30.0);
        assert_eq!(config.refresh_interval, 5);
        assert!(config.verify_archives);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_args_months_and_range_checks() {
        let args = Args::try_parse_from(["s2fetch", "-s", "2022", "-e", "2022", "-m", "12", "1"]).unwrap();
        assert_eq!(args.to_config().months.into_iter().collect::<Vec<_>>(), vec![1, 12]);

        assert!(Args::try_parse_from(["s2fetch", "-s", "2022", "-e", "2022", "-m", "13"]).is_err());
        assert!(Args::try_parse_from(["s2fetch", "-e", "2022"]).is_err());
    }
}
