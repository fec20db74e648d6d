//! Prometheus export of warehouse metrics.
//!
//! A batch run never lives long enough to be scraped, so the recorder is
//! rendered once on exit into a file for a textfile collector to pick up.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::{CliError, Result};

/// Installs the global Prometheus recorder.
///
/// Must run before the pipeline is opened so metric descriptions land in it.
pub fn install() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    debug!("Prometheus metrics recorder installed");
    Ok(handle)
}

/// Writes everything recorded so far to `path` in Prometheus text format.
pub fn write_snapshot(handle: &PrometheusHandle, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, handle.render())?;
    info!(path = %path.display(), "Metrics written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mart_transform::metrics::{record_default_substitutions, FACT_DEFAULT_KEY_SUBSTITUTIONS};

    #[test]
    fn test_snapshot_renders_recorded_counters() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        ::metrics::with_local_recorder(&recorder, || {
            record_default_substitutions("fact_transactions", "dim_merchants", 2);
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("textfile").join("finmart.prom");
        write_snapshot(&handle, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let line = text
            .lines()
            .find(|l| l.starts_with(FACT_DEFAULT_KEY_SUBSTITUTIONS))
            .unwrap();
        assert!(line.contains("dimension=\"dim_merchants\""));
        assert!(line.ends_with(" 2"));
    }
}
