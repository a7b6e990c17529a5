// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Live progress bars for move jobs

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use collection_mover_client::types::{CollectionId, JobId};
use collection_mover_client::{JobTracker, MoverClient, TrackerEvent};

const PROGRESS_CHARS: &str = "█▉▊▋▌▍▎▏ ";

/// A job to follow until it finishes.
pub struct WatchedJob {
    pub job_id: JobId,
    pub source_collection: CollectionId,
    pub target_collection: CollectionId,
}

/// How a followed job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub label: String,
    pub error: Option<String>,
}

struct Styles {
    running: ProgressStyle,
    done: ProgressStyle,
    failed: ProgressStyle,
}

impl Styles {
    fn new() -> Result<Self> {
        Ok(Self {
            running: ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos:>3}%")?
                .progress_chars(PROGRESS_CHARS),
            done: ProgressStyle::with_template("{msg} [{bar:40.green/grey}] {pos:>3}%")?
                .progress_chars(PROGRESS_CHARS),
            failed: ProgressStyle::with_template("❌ {msg} [{bar:40.red/grey}] {pos:>3}%")?
                .progress_chars(PROGRESS_CHARS),
        })
    }
}

/// Render one bar per job until every job has finished.
pub async fn follow_jobs(client: &MoverClient, jobs: Vec<WatchedJob>) -> Result<Vec<JobOutcome>> {
    if jobs.is_empty() {
        return Ok(Vec::new());
    }

    let styles = Styles::new()?;
    let (tracker, mut events) = JobTracker::new(Arc::new(client.clone()));
    match client.list_collections().await {
        Ok(collections) => tracker.set_collection_names(collections),
        Err(e) => eprintln!("warning: collection names unavailable: {}", e),
    }

    let multi = MultiProgress::new();
    let mut bars: HashMap<JobId, (String, ProgressBar)> = HashMap::new();
    let mut outcomes = Vec::new();
    let mut remaining = 0;
    for job in jobs {
        if tracker
            .track(job.job_id, job.source_collection, job.target_collection)
            .is_some()
        {
            remaining += 1;
        }
    }

    while remaining > 0 {
        let Some(event) = events.recv().await else {
            break;
        };

        match event {
            TrackerEvent::Added { job_id, label } => {
                let bar = multi.add(ProgressBar::new(100));
                bar.set_style(styles.running.clone());
                bar.set_message(label.clone());
                bars.insert(job_id, (label, bar));
            }
            TrackerEvent::Progress { job_id, percent } => {
                if let Some((_, bar)) = bars.get(&job_id) {
                    bar.set_position(u64::from(percent));
                }
            }
            TrackerEvent::Finished { job_id } => {
                if let Some((label, bar)) = bars.get(&job_id) {
                    bar.set_style(styles.done.clone());
                    bar.finish_with_message(label.clone());
                    outcomes.push(JobOutcome {
                        job_id,
                        label: label.clone(),
                        error: None,
                    });
                }
            }
            TrackerEvent::Failed { job_id, error } => {
                if let Some((label, bar)) = bars.get(&job_id) {
                    bar.set_style(styles.failed.clone());
                    bar.abandon_with_message(label.clone());
                    outcomes.push(JobOutcome {
                        job_id,
                        label: label.clone(),
                        error: Some(error),
                    });
                }
            }
            TrackerEvent::Removed { job_id } => {
                bars.remove(&job_id);
                remaining -= 1;
            }
        }
    }

    Ok(outcomes)
}

/// Print one line per job; fails when any job failed.
pub fn report(outcomes: &[JobOutcome]) -> Result<()> {
    let mut failed = 0;
    for outcome in outcomes {
        match &outcome.error {
            None => println!("{}  {}  completed", outcome.job_id, outcome.label),
            Some(error) => {
                failed += 1;
                println!("{}  {}  failed: {}", outcome.job_id, outcome.label, error);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} job(s) failed", failed, outcomes.len());
    }
    Ok(())
}
