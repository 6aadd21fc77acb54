mod cli;

use anyhow::Context;
use clap::Parser;
use dotenv::dotenv;
use s2fetch::io::download::DownloadOutcome;
use s2fetch::io::{HttpTransport, ODataCatalog, PasswordGrantAuth};
use s2fetch::{
    AcquisitionPlanner, Credentials, DownloadExecutor, FetchError, SessionManager, TileGridLoader,
    TileSelector,
};
use std::process::ExitCode;

const EXIT_AUTH_FAILURE: u8 = 1;
const EXIT_INVALID_INPUT: u8 = 2;
const EXIT_DOWNLOADS_FAILED: u8 = 3;

fn main() -> ExitCode {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = cli::Args::parse();

    match run(&args) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            match e.downcast_ref::<FetchError>() {
                Some(err) if err.is_fatal() => ExitCode::from(EXIT_AUTH_FAILURE),
                _ => ExitCode::from(EXIT_INVALID_INPUT),
            }
        }
    }
}

fn run(args: &cli::Args) -> anyhow::Result<ExitCode> {
    let config = args.to_config();
    let roi = config.validate()?;

    let tiles = TileGridLoader::new(config.grid_policy)
        .load_file(&config.tile_grid)
        .with_context(|| format!("loading tile grid {}", config.tile_grid.display()))?;

    let selections = TileSelector::new(config.min_tile_intersection_fraction()).select(&tiles, &roi);

    let endpoints = &config.endpoints;
    let catalog = ODataCatalog::new(&endpoints.catalog_url, &endpoints.collection, endpoints.catalog_timeout)?;
    let planner = AcquisitionPlanner::new(&catalog, config.min_coverage_fraction(), &config.output_dir);
    let plan = planner.plan(
        config.start_year..=config.end_year,
        &config.months,
        &selections,
        config.max_cloud_cover,
    );

    for entry in &plan.entries {
        println!("{}", entry);
    }

    if plan.total() == 0 {
        println!("no products found between {} and {}", config.start_year, config.end_year);
        return Ok(ExitCode::SUCCESS);
    }

    let prompt = format!(
        "found {} products between {} and {} for the months {:?}. Download size is estimated to be {}GB. Continue? [Y/N]: ",
        plan.total(),
        config.start_year,
        config.end_year,
        config.months,
        plan.estimated_size_gb()
    );

    if !args.yes && !cli::confirm(std::io::stdin().lock(), std::io::stdout(), &prompt)? {
        return Ok(ExitCode::SUCCESS);
    }

    let credentials = Credentials::from_env()?;
    let provider = PasswordGrantAuth::new(&endpoints.token_url, &endpoints.client_id, credentials)?;
    let mut session = SessionManager::new(provider, config.refresh_interval);

    let executor = DownloadExecutor::new(HttpTransport::new(&endpoints.catalog_url)?)
        .with_archive_verification(config.verify_archives);

    let summary = executor.execute_with_progress(&plan.tasks, &mut session, |index, total, task, outcome| {
        match outcome {
            DownloadOutcome::Failed(reason) => eprintln!("{} failed: {}", task.product_name, reason),
            DownloadOutcome::Skipped => println!("{} already downloaded", task.product_name),
            DownloadOutcome::Downloaded { .. } => {}
        }
        println!("{}/{}", index, total);
    })?;

    println!(
        "{} downloaded ({} bytes), {} already present, {} failed",
        summary.downloaded(),
        summary.bytes(),
        summary.skipped(),
        summary.failed()
    );

    if summary.failed() > 0 {
        return Ok(ExitCode::from(EXIT_DOWNLOADS_FAILED));
    }

    Ok(ExitCode::SUCCESS)
}
