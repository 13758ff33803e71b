//! `dblog-archive` binary: one archival run per invocation.
//!
//! Configuration comes from a TOML file named by `DBLOG_ARCHIVE_CONFIG`, or
//! from `DBLOG_*` environment variables when unset. The per-file report is
//! printed as JSON on stdout; the exit code is 0 only when every eligible
//! file committed or was skipped. Scheduling recurring runs is the
//! invoker's job.

#[cfg(all(feature = "rds", feature = "s3"))]
mod entry {
    use dblog_archive::{ArchiveConfig, LogArchiver, RdsLogSource, S3LogStore};
    use std::path::Path;
    use std::process::ExitCode;
    use tracing::error;
    use tracing_subscriber::EnvFilter;

    pub async fn main() -> ExitCode {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();

        match run().await {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => {
                // Partial failure: the report names the files to retry.
                ExitCode::from(1)
            }
            Err(e) => {
                error!(error = %e, "archival run aborted");
                ExitCode::from(2)
            }
        }
    }

    async fn run() -> Result<bool, Box<dyn std::error::Error>> {
        let config = match std::env::var("DBLOG_ARCHIVE_CONFIG") {
            Ok(path) => ArchiveConfig::from_toml_file(Path::new(&path))?,
            Err(_) => ArchiveConfig::from_env()?,
        };

        let source = RdsLogSource::connect(
            &config.instance_id,
            &config.region,
            config.timestamp_unit,
        )
        .await;
        let store = S3LogStore::new(&config.bucket, &config.region, &config.encryption)?;

        let archiver = LogArchiver::new(source, store, config);
        let report = archiver.run().await?;

        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(report.all_succeeded())
    }
}

#[cfg(all(feature = "rds", feature = "s3"))]
#[tokio::main]
async fn main() -> std::process::ExitCode {
    entry::main().await
}

#[cfg(not(all(feature = "rds", feature = "s3")))]
fn main() -> std::process::ExitCode {
    eprintln!("dblog-archive was built without the `aws` feature; no production bindings are available");
    std::process::ExitCode::FAILURE
}
