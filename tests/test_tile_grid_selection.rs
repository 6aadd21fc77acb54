use approx::assert_relative_eq;
use s2fetch::config::DEFAULT_LOCATION_WKT;
use s2fetch::io::{MalformedRecordPolicy, TileGridLoader};
use s2fetch::types::{FetchError, RegionOfInterest};
use s2fetch::TileSelector;
use std::io::Write;
use tempfile::NamedTempFile;

const GRID: &str = "\
TILE_ID EPSG UTM_WKT MGRS_REF_X MGRS_REF_Y LL_LON_MIN LL_LON_MAX LL_LAT_MIN LL_LAT_MAX
15TUG 32615 UTM15N 300000 4800000 -95.45 -94.13 42.38 43.36
15TVG 32615 UTM15N 400000 4800000 -94.23 -92.88 42.36 43.36
15TWG 32615 UTM15N 500000 4800000 -93.00 -91.64 42.35 43.35
31UFU 32631 UTM31N 600000 5800000 4.39 5.82 52.22 53.24
15TXF 32615 UTM15N 600000 4700000 -91.80 -90.45 41.44 42.44
";

fn grid_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_and_select_iowa_tiles() {
    let _ = env_logger::builder().is_test(true).try_init();

    let file = grid_file(GRID);
    let tiles = TileGridLoader::default().load_file(file.path()).unwrap();
    assert_eq!(tiles.len(), 5);

    let roi = RegionOfInterest::from_wkt(DEFAULT_LOCATION_WKT).unwrap();
    let selections = TileSelector::new(0.3).select(&tiles, &roi);

    let ids: Vec<&str> = selections.iter().map(|s| s.tile_id()).collect();
    println!("Selected tiles: {:?}", ids);

    // the Dutch tile is nowhere near Iowa
    assert!(!ids.contains(&"31UFU"));
    // interior tiles lie entirely inside the state outline
    assert!(ids.contains(&"15TVG"));
    assert!(ids.contains(&"15TWG"));

    let tvg = selections.iter().find(|s| s.tile_id() == "15TVG").unwrap();
    assert_relative_eq!(tvg.intersection_fraction, 1.0, epsilon = 1e-9);

    for selection in &selections {
        assert!(selection.intersection_fraction >= 0.3);
        assert!(selection.intersection_fraction <= 1.0);
    }

    // grid order preserved
    let positions: Vec<usize> = ids
        .iter()
        .map(|id| tiles.iter().position(|t| t.id == *id).unwrap())
        .collect();
    let mut sorted = positions.clone();
    sorted.sort();
    assert_eq!(positions, sorted);
}

#[test]
fn test_zero_threshold_still_drops_disjoint_tiles() {
    let file = grid_file(GRID);
    let tiles = TileGridLoader::default().load_file(file.path()).unwrap();
    let roi = RegionOfInterest::from_wkt(DEFAULT_LOCATION_WKT).unwrap();

    let selections = TileSelector::new(0.0).select(&tiles, &roi);
    assert!(selections.iter().all(|s| s.tile_id() != "31UFU"));
    assert!(selections.iter().all(|s| s.intersection_fraction > 0.0));
}

#[test]
fn test_malformed_grid_policy() {
    let broken = format!("{}15TYF 32615 UTM15N 700000\n", GRID);
    let file = grid_file(&broken);

    let err = TileGridLoader::new(MalformedRecordPolicy::Abort)
        .load_file(file.path())
        .unwrap_err();
    assert!(matches!(err, FetchError::MalformedGridRecord { line: 7, .. }));

    let tiles = TileGridLoader::new(MalformedRecordPolicy::Skip)
        .load_file(file.path())
        .unwrap();
    assert_eq!(tiles.len(), 5);
}

#[test]
fn test_missing_grid_file_is_io_error() {
    let result = TileGridLoader::default().load_file("/nonexistent/S2_TilingSystem2-1.txt");
    assert!(matches!(result, Err(FetchError::Io(_))));
}
