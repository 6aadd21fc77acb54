use crate::io::auth::{SessionManager, TokenProvider};
use crate::types::{DownloadTask, FetchError, FetchResult};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Maximum number of redirects followed for one product download
pub const MAX_REDIRECTS: usize = 10;

/// What a transport reports after a successful transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReceipt {
    pub bytes_written: u64,
    pub status: u16,
}

/// Fetches a product payload by catalog id
pub trait ProductTransport {
    fn fetch(&self, product_id: &str, token: &str, sink: &mut dyn Write) -> FetchResult<TransferReceipt>;
}

/// Authorized HTTP download from the OData `$value` endpoint.
///
/// Redirects are followed by hand so the bearer header survives the hop to
/// the download host.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> FetchResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()
            .map_err(|e| FetchError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn product_url(&self, product_id: &str) -> String {
        format!("{}/Products({})/$value", self.base_url, product_id)
    }
}

impl ProductTransport for HttpTransport {
    fn fetch(&self, product_id: &str, token: &str, sink: &mut dyn Write) -> FetchResult<TransferReceipt> {
        let failed = |reason: String| FetchError::DownloadFailed {
            product_id: product_id.to_string(),
            reason,
        };

        let mut url = reqwest::Url::parse(&self.product_url(product_id))
            .map_err(|e| failed(format!("invalid product URL: {}", e)))?;

        for _ in 0..=MAX_REDIRECTS {
            log::debug!("Downloading from: {}", url);

            let mut response = self
                .client
                .get(url.clone())
                .bearer_auth(token)
                .send()
                .map_err(|e| failed(format!("HTTP request failed: {}", e)))?;

            let status = response.status();
            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok());

                url = resolve_redirect(response.url(), location).map_err(failed)?;
                continue;
            }

            if !status.is_success() {
                return Err(failed(format!("HTTP request failed with status: {}", status)));
            }

            let bytes_written = response
                .copy_to(sink)
                .map_err(|e| failed(format!("transfer interrupted: {}", e)))?;

            return Ok(TransferReceipt {
                bytes_written,
                status: status.as_u16(),
            });
        }

        Err(failed(format!("more than {} redirects", MAX_REDIRECTS)))
    }
}

/// Resolve a redirect `Location` against the URL that produced it
pub fn resolve_redirect(current: &reqwest::Url, location: Option<&str>) -> Result<reqwest::Url, String> {
    let location = location.ok_or_else(|| "redirect without location".to_string())?;

    current
        .join(location)
        .map_err(|e| format!("invalid redirect target '{}': {}", location, e))
}

/// Result of processing one task
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    Downloaded { bytes: u64 },
    /// The archive was already present
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, Default)]
pub struct DownloadSummary {
    pub outcomes: Vec<DownloadOutcome>,
}

impl DownloadSummary {
    pub fn processed(&self) -> usize {
        self.outcomes.len()
    }

    pub fn downloaded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, DownloadOutcome::Downloaded { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, DownloadOutcome::Skipped))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, DownloadOutcome::Failed(_)))
            .count()
    }

    pub fn bytes(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|o| match o {
                DownloadOutcome::Downloaded { bytes } => *bytes,
                _ => 0,
            })
            .sum()
    }
}

/// Runs a download plan in order under an expiring session
pub struct DownloadExecutor<T: ProductTransport> {
    transport: T,
    verify_archives: bool,
}

impl<T: ProductTransport> DownloadExecutor<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            verify_archives: true,
        }
    }

    /// Require every payload to open as a zip archive before it is kept
    pub fn with_archive_verification(mut self, verify: bool) -> Self {
        self.verify_archives = verify;
        self
    }

    pub fn execute<P: TokenProvider>(
        &self,
        tasks: &[DownloadTask],
        session: &mut SessionManager<P>,
    ) -> FetchResult<DownloadSummary> {
        self.execute_with_progress(tasks, session, |index, total, task, outcome| match outcome {
            DownloadOutcome::Failed(reason) => {
                log::error!("{}/{} {} failed: {}", index, total, task.product_name, reason)
            }
            _ => log::info!("{}/{} {} {:?}", index, total, task.product_name, outcome),
        })
    }

    /// Process every task, calling `progress(index, total, task, outcome)`
    /// with a 1-based index after each one. A failed transfer is reported
    /// and the run moves on; only an authentication failure aborts.
    pub fn execute_with_progress<P, F>(
        &self,
        tasks: &[DownloadTask],
        session: &mut SessionManager<P>,
        mut progress: F,
    ) -> FetchResult<DownloadSummary>
    where
        P: TokenProvider,
        F: FnMut(usize, usize, &DownloadTask, &DownloadOutcome),
    {
        let total = tasks.len();
        let mut summary = DownloadSummary::default();

        if total == 0 {
            return Ok(summary);
        }

        session.acquire()?;

        for (index, task) in tasks.iter().enumerate() {
            let token = session.acquire()?.to_string();

            let outcome = match self.process(task, &token) {
                Ok(outcome) => outcome,
                Err(e) => DownloadOutcome::Failed(e.to_string()),
            };

            let completed = index + 1;
            progress(completed, total, task, &outcome);
            summary.outcomes.push(outcome);

            // No point renewing the token once nothing is left to fetch
            if completed < total {
                session.refresh_if_due(completed)?;
            }
        }

        log::info!(
            "Processed {} products: {} downloaded, {} already present, {} failed",
            summary.processed(),
            summary.downloaded(),
            summary.skipped(),
            summary.failed()
        );

        Ok(summary)
    }

    fn process(&self, task: &DownloadTask, token: &str) -> FetchResult<DownloadOutcome> {
        fs::create_dir_all(&task.destination_dir)?;

        let target = task.target_path();
        if target.exists() {
            log::debug!("{} already exists, skipping", target.display());
            return Ok(DownloadOutcome::Skipped);
        }

        // Stream into a sibling temp file so an interrupted transfer never
        // leaves a partial archive at the final path
        let mut part = tempfile::Builder::new()
            .prefix(".")
            .suffix(".part")
            .tempfile_in(&task.destination_dir)?;

        let receipt = self
            .transport
            .fetch(&task.external_id, token, part.as_file_mut())?;
        part.as_file_mut().flush()?;

        if self.verify_archives {
            verify_archive(part.path()).map_err(|reason| FetchError::DownloadFailed {
                product_id: task.external_id.clone(),
                reason,
            })?;
        }

        part.persist(&target).map_err(|e| FetchError::Io(e.error))?;
        log::debug!("Saved {} ({} bytes)", target.display(), receipt.bytes_written);

        Ok(DownloadOutcome::Downloaded {
            bytes: receipt.bytes_written,
        })
    }
}

/// Check that a downloaded payload is a readable, non-empty zip archive
pub fn verify_archive(path: &Path) -> Result<(), String> {
    let file = File::open(path).map_err(|e| format!("cannot reopen payload: {}", e))?;
    let archive =
        zip::ZipArchive::new(file).map_err(|e| format!("payload is not a zip archive: {}", e))?;

    if archive.len() == 0 {
        return Err("zip archive is empty".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_redirect() {
        let current = reqwest::Url::parse("https://catalogue.example/odata/v1/Products(abc)/$value").unwrap();

        let absolute = resolve_redirect(&current, Some("https://download.example/odata/v1/Products(abc)/$value")).unwrap();
        assert_eq!(absolute.host_str(), Some("download.example"));

        let relative = resolve_redirect(&current, Some("/zipper/abc")).unwrap();
        assert_eq!(relative.as_str(), "https://catalogue.example/zipper/abc");

        assert!(resolve_redirect(&current, None).is_err());
    }

    #[test]
    fn test_product_url() {
        let transport = HttpTransport::new("https://catalogue.example/odata/v1/").unwrap();
        assert_eq!(
            transport.product_url("abc"),
            "https://catalogue.example/odata/v1/Products(abc)/$value"
        );
    }
}
