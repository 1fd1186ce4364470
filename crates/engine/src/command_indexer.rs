//! Indexer that shells out to the search engine's `indexer` binary
//!
//! The feed is written to `<searchd_file_path>/<partition>.xml`, then
//! `<bin_path>/<indexer> --config <config_file> [--rotate] <partition>` is run
//! and waited for. The daemon config is expected to declare each partition
//! as an xmlpipe2 source reading that file.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::Command;
use std::time::Instant;

use tracing::{debug, info, warn};

use docsync_core::{DocsyncConfig, Error, IndexPartition, Result};

use crate::client::Indexer;
use crate::feed::Feed;
use crate::xmlpipe::write_feed;

/// Runs the external indexer per partition
#[derive(Debug, Clone)]
pub struct CommandIndexer {
    program: PathBuf,
    config_file: PathBuf,
    feed_dir: PathBuf,
    rotate: bool,
}

impl CommandIndexer {
    /// Build from configuration
    pub fn from_config(config: &DocsyncConfig) -> Self {
        CommandIndexer {
            program: config.indexer_command(),
            config_file: config.config_file(),
            feed_dir: config.searchd_file_path(),
            rotate: config.rotate,
        }
    }

    /// Path the feed for `partition` is written to
    pub fn feed_path(&self, partition: &IndexPartition) -> PathBuf {
        self.feed_dir.join(format!("{}.xml", partition.name()))
    }

    /// Arguments passed to the indexer for `partition`
    pub fn arguments(&self, partition: &IndexPartition) -> Vec<String> {
        let mut args = vec![
            "--config".to_string(),
            self.config_file.display().to_string(),
        ];
        if self.rotate {
            args.push("--rotate".to_string());
        }
        args.push(partition.name());
        args
    }

    fn write_feed_file(&self, partition: &IndexPartition, feed: &mut Feed) -> Result<PathBuf> {
        fs::create_dir_all(&self.feed_dir)?;
        let path = self.feed_path(partition);
        let tmp = path.with_extension("xml.tmp");

        let file = BufWriter::new(File::create(&tmp)?);
        let written = write_feed(feed, file).and_then(|w| {
            w.into_inner()
                .map_err(|e| Error::Io(e.into_error()))?
                .sync_all()?;
            Ok(())
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        fs::rename(&tmp, &path)?;
        Ok(path)
    }
}

impl Indexer for CommandIndexer {
    fn index(&self, partition: &IndexPartition, feed: &mut Feed) -> Result<()> {
        let started = Instant::now();
        let path = self.write_feed_file(partition, feed)?;
        let stats = feed.stats();
        debug!(target: "docsync::indexer", partition = %partition, path = %path.display(), documents = stats.emitted, "feed written");

        let args = self.arguments(partition);
        let output = Command::new(&self.program).args(&args).output().map_err(|e| {
            Error::IndexUnavailable(format!(
                "failed to run {}: {}",
                self.program.display(),
                e
            ))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(target: "docsync::indexer", partition = %partition, status = ?output.status.code(), stderr = %stderr.trim(), "indexer failed");
            return Err(Error::IndexUnavailable(format!(
                "{} exited with {} while indexing {}",
                self.program.display(),
                output.status,
                partition
            )));
        }

        info!(target: "docsync::indexer", partition = %partition, documents = stats.emitted, skipped = stats.skipped, elapsed_ms = started.elapsed().as_millis() as u64, "partition indexed");
        Ok(())
    }
}
