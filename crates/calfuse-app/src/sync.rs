//! The merge cycle: fetch all sources, run the RFC 5545 pipeline, and
//! atomically replace the output file.
//!
//! Fetches run as spawned tasks bounded by a semaphore, but results are
//! awaited in configured source order so merge precedence never depends on
//! network timing. Cycles never overlap: one loop, delayed ticks.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use calfuse_core::config::Settings;
use calfuse_core::constants::CALENDAR_NAME;
use calfuse_rfc::ical::build::serialize;
use calfuse_rfc::ical::merge::{merge, SourceCalendar};
use calfuse_rfc::ical::parse::parse;
use calfuse_rfc::ical::timezone::TimeZoneResolver;
use chrono::Datelike;
use chrono_tz::Tz;
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::fetch::{fetch_source_with_timeout, FetchError};

/// Counters from one completed merge cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub sources_ok: usize,
    pub sources_failed: usize,
    pub events: usize,
    pub duplicates: usize,
    pub dropped: usize,
    pub repaired: usize,
}

/// Owns the HTTP client and configuration for the lifetime of the process.
pub struct Merger {
    client: reqwest::Client,
    settings: Settings,
    output_tz: Tz,
}

impl Merger {
    /// Builds a merger, resolving the output timezone up front.
    ///
    /// ## Errors
    /// Returns an error when the configured output timezone is unknown or
    /// the HTTP client cannot be built.
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let mut resolver = TimeZoneResolver::new();
        let output_tz = resolver
            .resolve(&settings.output.timezone)
            .with_context(|| format!("output timezone {:?}", settings.output.timezone))?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("calfuse/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            settings,
            output_tz,
        })
    }

    /// Runs merge cycles on the configured interval until Ctrl-C.
    ///
    /// The first tick fires immediately, so the initial merge happens at
    /// startup. A failed cycle leaves the previous output file in place and
    /// the loop keeps going.
    ///
    /// ## Errors
    /// Only returns an error if waiting for the shutdown signal fails.
    pub async fn run(self) -> anyhow::Result<()> {
        let period = Duration::from_secs(self.settings.sync.interval_minutes * 60);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.run_cycle().await {
                        Ok(report) => info!(?report, "merge cycle complete"),
                        Err(e) => error!(error = ?e, "merge cycle failed, keeping previous output"),
                    }
                }
                result = tokio::signal::ctrl_c() => {
                    result.context("waiting for shutdown signal")?;
                    info!("shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Runs one fetch-parse-merge-write cycle under the configured
    /// cycle deadline.
    ///
    /// ## Errors
    /// Returns an error only for cycle-fatal conditions: the deadline
    /// elapsed or the output file cannot be written. Per-source failures
    /// are logged and skipped.
    pub async fn run_cycle(&self) -> anyhow::Result<CycleReport> {
        let deadline = Duration::from_secs(self.settings.sync.cycle_timeout_secs);
        match tokio::time::timeout(deadline, self.merge_once()).await {
            Ok(result) => result,
            Err(_elapsed) => Err(anyhow::anyhow!("merge cycle timed out after {deadline:?}")),
        }
    }

    async fn merge_once(&self) -> anyhow::Result<CycleReport> {
        let results = self.fetch_all().await;

        let tzid = self.settings.output.timezone.as_str();
        let mut resolver = TimeZoneResolver::new();
        let mut calendars = Vec::new();
        let mut sources_failed = 0usize;

        for (name, result) in results {
            match result {
                Err(e) => {
                    warn!(source = %name, error = %e, "fetch failed, skipping source");
                    sources_failed += 1;
                }
                Ok(text) => match parse(&text) {
                    Err(e) => {
                        warn!(source = %name, error = %e, "parse failed, skipping source");
                        sources_failed += 1;
                    }
                    Ok(outcome) => {
                        calendars.push(SourceCalendar::extract(
                            name,
                            &outcome,
                            tzid,
                            self.output_tz,
                            &mut resolver,
                        ));
                    }
                },
            }
        }

        let sources_ok = calendars.len();
        let dropped = calendars.iter().map(|c| c.dropped).sum();
        let repaired = calendars.iter().map(|c| c.repaired).sum();

        let merged = merge(calendars, tzid);
        let events = merged.events.len();
        let duplicates = merged.duplicates;

        let year = chrono::Utc::now().year();
        let text = serialize(&merged.to_icalendar(CALENDAR_NAME, self.output_tz, year));
        self.write_atomic(&text).await?;

        Ok(CycleReport {
            sources_ok,
            sources_failed,
            events,
            duplicates,
            dropped,
            repaired,
        })
    }

    /// Spawns bounded fetch tasks and collects their results in source order.
    async fn fetch_all(&self) -> Vec<(String, Result<String, FetchError>)> {
        let semaphore = Arc::new(Semaphore::new(self.settings.sync.fetch_concurrency.max(1)));
        let timeout = Duration::from_secs(self.settings.sync.fetch_timeout_secs);

        let handles: Vec<_> = self
            .settings
            .sources
            .iter()
            .cloned()
            .map(|source| {
                let client = self.client.clone();
                let semaphore = Arc::clone(&semaphore);
                let name = source.name.clone();
                let handle = tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    fetch_source_with_timeout(&client, &source, timeout).await
                });
                (name, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_err) => Err(FetchError::Io(std::io::Error::other(join_err))),
            };
            results.push((name, result));
        }
        results
    }

    /// Writes the serialized calendar via a temp file and rename, so the
    /// output path always holds a complete document.
    async fn write_atomic(&self, text: &str) -> anyhow::Result<()> {
        let path = self.settings.output.path.as_str();
        let tmp = format!("{path}.tmp");

        tokio::fs::write(&tmp, text)
            .await
            .with_context(|| format!("writing {tmp}"))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("renaming {tmp} to {path}"))?;

        Ok(())
    }
}
