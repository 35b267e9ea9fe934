//! End-to-end runs through the job controller with a mock tile server.

mod common;

use std::fs;
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::{config, job, MockHttpClient, Recorder, TEMPLATE};
use tempfile::TempDir;
use tilebaker::source::TileSource;
use tilebaker::{
    BuilderConfig, ContainerTileSource, CoverageRegion, GeoBBox, JobController, TileCoord,
};

fn url_for(tile: &TileCoord) -> String {
    TEMPLATE
        .replace("{z}", &tile.zoom.to_string())
        .replace("{x}", &tile.col.to_string())
        .replace("{y}", &tile.row.to_string())
}

#[test]
fn test_run_packages_tiles_readable_from_container() {
    let temp = TempDir::new().unwrap();
    let config = config(temp.path(), Duration::from_millis(50));
    let client = Arc::new(MockHttpClient::echo(Duration::ZERO));
    let recorder = Arc::new(Recorder::default());
    let controller = JobController::new(
        &config,
        job(&config, Arc::clone(&client)),
        recorder.callbacks(),
    );

    assert!(controller.run(false).unwrap());
    controller.wait().unwrap();

    assert_eq!(recorder.successes(), 1);
    assert_eq!(recorder.error_count(), 0);
    assert_eq!(recorder.final_count(), 1);
    assert_eq!(client.request_count(), 21);

    let container = ContainerTileSource::open(config.output_path()).unwrap();
    for tile in controller.job().tile_set() {
        assert_eq!(container.fetch(&tile).unwrap(), url_for(&tile).into_bytes());
    }
    assert_eq!(container.zoom_levels().unwrap(), vec![0, 1, 2]);

    let metadata = container.metadata().unwrap();
    assert_eq!(metadata.get("format").map(String::as_str), Some("png"));
    assert_eq!(metadata.get("maxzoom").map(String::as_str), Some("2"));
    assert!(metadata.contains_key("bounds"));
    assert!(!metadata.contains_key("attribution"));

    let staging = config.staging_dir();
    assert!(!staging.join("tiles").exists());
}

#[test]
fn test_progress_is_monotonic_and_bounded() {
    let temp = TempDir::new().unwrap();
    let config = config(temp.path(), Duration::from_millis(50));
    let client = Arc::new(MockHttpClient::echo(Duration::ZERO));
    let recorder = Arc::new(Recorder::default());
    let controller = JobController::new(&config, job(&config, client), recorder.callbacks());

    controller.run(false).unwrap();
    controller.wait().unwrap();

    let progress = recorder.progress.lock().unwrap().clone();
    assert_eq!(progress.len(), 21);
    assert!(progress.iter().all(|&(fetched, total)| fetched <= total));
    assert!(progress.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(progress.last(), Some(&(21, 21)));
}

#[test]
fn test_existing_destination_is_kept() {
    let temp = TempDir::new().unwrap();
    let config = config(temp.path(), Duration::from_millis(50));
    fs::create_dir_all(config.output_path().parent().unwrap()).unwrap();
    fs::write(config.output_path(), b"previous build").unwrap();

    let client = Arc::new(MockHttpClient::echo(Duration::ZERO));
    let recorder = Arc::new(Recorder::default());
    let controller = JobController::new(
        &config,
        job(&config, Arc::clone(&client)),
        recorder.callbacks(),
    );

    controller.run(false).unwrap();
    controller.wait().unwrap();

    assert_eq!(client.request_count(), 0);
    assert_eq!(recorder.error_count(), 0);
    assert_eq!(recorder.final_count(), 1);
    assert_eq!(fs::read(config.output_path()).unwrap(), b"previous build");
}

#[test]
fn test_stop_mid_run_leaves_no_destination() {
    let temp = TempDir::new().unwrap();
    let unit = Duration::from_millis(200);
    let config = config(temp.path(), unit);
    let client = Arc::new(MockHttpClient::echo(Duration::from_millis(20)));
    let recorder = Arc::new(Recorder::default());
    let controller = JobController::new(&config, job(&config, client), recorder.callbacks());

    controller.run(false).unwrap();
    thread::sleep(Duration::from_millis(100));
    assert!(controller.progress().is_running);

    let stopped_at = Instant::now();
    controller.stop();
    controller.wait().unwrap();
    assert!(stopped_at.elapsed() <= unit * 2);

    assert_eq!(recorder.successes(), 0);
    assert_eq!(recorder.error_count(), 0);
    assert_eq!(recorder.final_count(), 1);
    assert!(!config.output_path().exists());
    assert!(!controller.progress().is_running);
}

#[test]
fn test_http_status_error_propagates_immediately() {
    let temp = TempDir::new().unwrap();
    let config = config(temp.path(), Duration::from_millis(50));
    let client = Arc::new(MockHttpClient::failing(Some(404)));
    let recorder = Arc::new(Recorder::default());
    let controller = JobController::new(
        &config,
        job(&config, Arc::clone(&client)),
        recorder.callbacks(),
    );

    controller.run(false).unwrap();
    controller.wait().unwrap();

    assert_eq!(client.request_count(), 1);
    assert_eq!(recorder.successes(), 0);
    assert_eq!(recorder.final_count(), 1);
    let errors = recorder.errors.lock().unwrap().clone();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("404"), "unexpected error: {}", errors[0]);
    assert!(!config.output_path().exists());
}

#[test]
fn test_connection_failure_retries_until_stopped() {
    let temp = TempDir::new().unwrap();
    let config = config(temp.path(), Duration::from_millis(10));
    let client = Arc::new(MockHttpClient::failing(None));
    let recorder = Arc::new(Recorder::default());
    let controller = JobController::new(
        &config,
        job(&config, Arc::clone(&client)),
        recorder.callbacks(),
    );

    controller.run(false).unwrap();
    thread::sleep(Duration::from_millis(150));
    assert!(controller.progress().is_running);
    assert!(client.request_count() > 2);
    assert_eq!(recorder.connection_lost_count(), 1);

    controller.stop();
    controller.wait().unwrap();

    assert_eq!(recorder.error_count(), 0);
    assert_eq!(recorder.successes(), 0);
    assert_eq!(recorder.final_count(), 1);
}

#[test]
fn test_connection_failure_without_waiting_fails_run() {
    let temp = TempDir::new().unwrap();
    let config = config(temp.path(), Duration::from_millis(10)).with_wait_connection(false);
    let client = Arc::new(MockHttpClient::failing(None));
    let recorder = Arc::new(Recorder::default());
    let controller = JobController::new(&config, job(&config, client), recorder.callbacks());

    controller.run(false).unwrap();
    controller.wait().unwrap();

    assert_eq!(recorder.error_count(), 1);
    assert_eq!(recorder.final_count(), 1);
}

#[test]
fn test_sampler_shares_run_signals() {
    let temp = TempDir::new().unwrap();
    let config = config(temp.path(), Duration::from_millis(50));
    let client = Arc::new(MockHttpClient::echo(Duration::from_millis(20)));
    let recorder = Arc::new(Recorder::default());
    let controller = JobController::new(&config, job(&config, client), recorder.callbacks());

    controller.run(false).unwrap();
    let (tx, rx) = std::sync::mpsc::channel();
    let sampler = controller
        .estimate_size_mb(20, move |mb| tx.send(mb).unwrap())
        .unwrap();

    controller.stop();
    sampler.join().unwrap();
    controller.wait().unwrap();

    assert!(rx.try_recv().is_err());
    assert_eq!(recorder.final_count(), 1);
}

/// URL template pointing at a local port nothing listens on.
fn refused_template() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/{{z}}/{{x}}/{{y}}.png", port)
}

#[test]
fn test_stop_is_prompt_with_default_retry_budget() {
    let temp = TempDir::new().unwrap();
    let unit = Duration::from_millis(100);
    let world = CoverageRegion::with_zoom_range(GeoBBox::new(-85.0, -180.0, 85.0, 180.0), 0, 1)
        .unwrap();
    let config = BuilderConfig::new()
        .with_url_template(refused_template())
        .with_time_unit(unit)
        .with_request_delay(Duration::ZERO)
        .with_cache_enabled(false)
        .with_staging_dir(temp.path().join("staging"))
        .with_output_path(temp.path().join("out.mbtiles"))
        .with_coverage(world);
    let recorder = Arc::new(Recorder::default());
    let controller = JobController::from_config(&config, recorder.callbacks()).unwrap();

    controller.run(false).unwrap();
    thread::sleep(unit * 3);
    assert!(controller.progress().is_running);
    assert_eq!(recorder.connection_lost_count(), 1);

    let stopped_at = Instant::now();
    controller.stop();
    controller.wait().unwrap();
    let elapsed = stopped_at.elapsed();
    assert!(elapsed <= unit * 2, "stop took {:?}", elapsed);

    assert_eq!(recorder.successes(), 0);
    assert_eq!(recorder.error_count(), 0);
    assert_eq!(recorder.final_count(), 1);
    assert!(!config.output_path().exists());
}
