//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tilebaker::cache::NullCache;
use tilebaker::source::{HttpClient, RemoteTileSource, SourceError};
use tilebaker::{BuildJob, BuilderConfig, GeoBBox, JobCallbacks, TileAcquisitionService};

pub const TEMPLATE: &str = "http://tiles.example.com/{z}/{x}/{y}.png";

type Responder = Box<dyn Fn(&str) -> Result<Vec<u8>, SourceError> + Send + Sync>;

/// HTTP client answering every request from a closure, optionally slowly.
pub struct MockHttpClient {
    responder: Responder,
    delay: Duration,
    requests: Mutex<Vec<String>>,
}

impl MockHttpClient {
    pub fn new(
        delay: Duration,
        responder: impl Fn(&str) -> Result<Vec<u8>, SourceError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            delay,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Responds with the requested URL's bytes.
    pub fn echo(delay: Duration) -> Self {
        Self::new(delay, |url| Ok(url.as_bytes().to_vec()))
    }

    pub fn failing(status: Option<u16>) -> Self {
        Self::new(Duration::ZERO, move |url| {
            Err(SourceError::Download {
                url: url.to_string(),
                status,
                reason: "mock failure".to_string(),
            })
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl HttpClient for MockHttpClient {
    fn get(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        self.requests.lock().unwrap().push(url.to_string());
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        (self.responder)(url)
    }
}

pub fn config(dir: &Path, time_unit: Duration) -> BuilderConfig {
    BuilderConfig::new()
        .with_url_template(TEMPLATE)
        .with_time_unit(time_unit)
        .with_request_delay(Duration::ZERO)
        .with_staging_dir(dir.join("staging"))
        .with_output_path(dir.join("out").join("tiles.mbtiles"))
}

/// Job over the whole world at zooms 0-2 (21 tiles), without caching, with
/// the source retry budget a job controller would use.
pub fn job(config: &BuilderConfig, client: Arc<MockHttpClient>) -> BuildJob {
    let source = RemoteTileSource::new(client, config.url_template())
        .unwrap()
        .with_request_delay(config.request_delay())
        .with_retries(config.controlled_download_retries())
        .with_backoff(config.backoff());
    let job = BuildJob::new(
        config,
        TileAcquisitionService::new(Box::new(source), Box::new(NullCache)),
    );
    job.add_coverage(GeoBBox::new(-85.0, -180.0, 85.0, 180.0), [0, 1, 2])
        .unwrap();
    job
}

/// Records every callback invocation.
#[derive(Default)]
pub struct Recorder {
    pub progress: Mutex<Vec<(u64, u64)>>,
    pub success: AtomicUsize,
    pub errors: Mutex<Vec<String>>,
    pub connection_lost: AtomicUsize,
    pub finals: AtomicUsize,
}

impl Recorder {
    pub fn callbacks(self: &Arc<Self>) -> JobCallbacks {
        let (p, s, e, c, f) = (
            Arc::clone(self),
            Arc::clone(self),
            Arc::clone(self),
            Arc::clone(self),
            Arc::clone(self),
        );
        JobCallbacks::new()
            .on_progress(move |fetched, total| p.progress.lock().unwrap().push((fetched, total)))
            .on_success(move || {
                s.success.fetch_add(1, Ordering::SeqCst);
            })
            .on_error(move |err| e.errors.lock().unwrap().push(err.to_string()))
            .on_connection_lost(move || {
                c.connection_lost.fetch_add(1, Ordering::SeqCst);
            })
            .on_final(move || {
                f.finals.fetch_add(1, Ordering::SeqCst);
            })
    }

    pub fn successes(&self) -> usize {
        self.success.load(Ordering::SeqCst)
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }

    pub fn final_count(&self) -> usize {
        self.finals.load(Ordering::SeqCst)
    }

    pub fn connection_lost_count(&self) -> usize {
        self.connection_lost.load(Ordering::SeqCst)
    }
}
