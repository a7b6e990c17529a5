// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Collection mover administration CLI
//!
//! Lists collections and companies, issues moves and follows move jobs with
//! live progress bars.

mod progress;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use collection_mover_client::MoverClient;
use collection_mover_client::types::{CompanyOutput, JobRecord, MoveJobResponse};

use crate::progress::{WatchedJob, follow_jobs, report};

#[derive(Parser)]
#[command(name = "collection-mover-adm")]
#[command(about = "Collection mover client utility", long_about = None)]
#[command(version)]
struct Cli {
    /// Base URL of the collection mover service
    #[arg(long, default_value = "http://localhost:8000", env = "COLLECTION_MOVER_URL")]
    base_url: String,

    /// Print JSON instead of tables
    #[arg(short, long, global = true)]
    json: bool,

    /// Log client activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collection operations
    Collections {
        #[command(subcommand)]
        action: CollectionsAction,
    },

    /// Company operations
    Companies {
        #[command(subcommand)]
        action: CompaniesAction,
    },

    /// Move companies between collections
    Move {
        #[command(subcommand)]
        action: MoveAction,
    },

    /// Move job operations
    Job {
        #[command(subcommand)]
        action: JobAction,
    },
}

#[derive(Subcommand)]
enum CollectionsAction {
    /// List all collections
    List,

    /// Show one page of a collection's companies
    Show {
        /// Collection id
        id: String,

        #[arg(long, default_value_t = 0)]
        offset: u64,

        #[arg(long, default_value_t = 10)]
        limit: u64,
    },
}

#[derive(Subcommand)]
enum CompaniesAction {
    /// List all companies
    List {
        #[arg(long, default_value_t = 0)]
        offset: u64,

        #[arg(long, default_value_t = 10)]
        limit: u64,
    },
}

#[derive(Subcommand)]
enum MoveAction {
    /// Move a single company right away
    Company {
        /// Source collection id
        #[arg(long)]
        from: String,

        /// Target collection id
        #[arg(long)]
        to: String,

        company_id: i64,
    },

    /// Start a job moving the given companies
    Selected {
        /// Source collection id
        #[arg(long)]
        from: String,

        /// Target collection id
        #[arg(long)]
        to: String,

        /// Company ids to move
        #[arg(required = true)]
        company_ids: Vec<i64>,

        /// Print the job id and return without waiting
        #[arg(long)]
        no_wait: bool,
    },

    /// Start a job moving every company of a collection
    All {
        /// Source collection id
        #[arg(long)]
        from: String,

        /// Target collection id
        #[arg(long)]
        to: String,

        /// Print the job id and return without waiting
        #[arg(long)]
        no_wait: bool,
    },
}

#[derive(Subcommand)]
enum JobAction {
    /// List retained move jobs
    List,

    /// Get information on a specific job
    Get {
        /// Job id
        job_id: String,
    },

    /// Follow a running job until it finishes
    Watch {
        /// Job id
        job_id: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_companies(companies: &[CompanyOutput], total: u64) {
    println!("{:<10} {:<40} {:<6}", "ID", "NAME", "LIKED");
    println!("{}", "-".repeat(58));
    for company in companies {
        println!(
            "{:<10} {:<40} {:<6}",
            company.id,
            company.company_name,
            if company.liked { "yes" } else { "" }
        );
    }
    println!();
    println!("{} of {} shown", companies.len(), total);
}

fn print_job(job: &JobRecord) {
    println!("Job {}", job.job_id);
    println!("{}", "=".repeat(50));
    println!("  Status:    {}", job.status);
    println!("  Mode:      {}", job.mode);
    println!("  From:      {}", job.source_collection);
    println!("  To:        {}", job.target_collection);
    println!("  Companies: {}", job.companies);
    println!(
        "  Chunks:    {}/{} ({}%)",
        job.chunks_processed,
        job.chunks,
        job.progress_event().percent()
    );
    if let Some(error) = &job.error {
        println!("  Error:     {}", error);
    }
    println!("  Created:   {}", job.created_at);
    println!("  Updated:   {}", job.updated_at);
}

/// Either print the accepted job or follow it to the end.
async fn finish_move(
    client: &MoverClient,
    job: MoveJobResponse,
    from: String,
    to: String,
    no_wait: bool,
    json: bool,
) -> Result<()> {
    if no_wait {
        if json {
            return print_json(&job);
        }
        println!("{}", job.message);
        println!("Job id: {}", job.job_id);
        return Ok(());
    }

    let outcomes = follow_jobs(
        client,
        vec![WatchedJob {
            job_id: job.job_id,
            source_collection: from,
            target_collection: to,
        }],
    )
    .await?;
    report(&outcomes)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("collection_mover_client=debug")
            .with_writer(std::io::stderr)
            .init();
    }

    let client = MoverClient::new(&cli.base_url)
        .with_context(|| format!("Invalid base URL '{}'", cli.base_url))?;
    let json = cli.json;

    match cli.command {
        Commands::Collections { action } => match action {
            CollectionsAction::List => {
                let collections = client
                    .list_collections()
                    .await
                    .context("Failed to list collections")?;

                if json {
                    return print_json(&collections);
                }
                if collections.is_empty() {
                    println!("No collections found.");
                } else {
                    println!("{:<40} {:<30}", "ID", "NAME");
                    println!("{}", "-".repeat(70));
                    for collection in collections {
                        println!("{:<40} {:<30}", collection.id, collection.collection_name);
                    }
                }
            }

            CollectionsAction::Show { id, offset, limit } => {
                let page = client
                    .get_collection(&id, offset, limit)
                    .await
                    .with_context(|| format!("Failed to get collection '{}'", id))?;

                if json {
                    return print_json(&page);
                }
                println!("{} ({})", page.collection_name, page.id);
                println!();
                print_companies(&page.companies, page.total);
            }
        },

        Commands::Companies { action } => match action {
            CompaniesAction::List { offset, limit } => {
                let page = client
                    .list_companies(offset, limit)
                    .await
                    .context("Failed to list companies")?;

                if json {
                    return print_json(&page);
                }
                print_companies(&page.companies, page.total);
            }
        },

        Commands::Move { action } => match action {
            MoveAction::Company {
                from,
                to,
                company_id,
            } => {
                let response = client
                    .move_company(company_id, &from, &to)
                    .await
                    .with_context(|| format!("Failed to move company {}", company_id))?;

                if json {
                    return print_json(&response);
                }
                println!("{}: {}", response.status, response.message);
            }

            MoveAction::Selected {
                from,
                to,
                company_ids,
                no_wait,
            } => {
                let job = client
                    .move_selected(&from, &to, &company_ids)
                    .await
                    .context("Failed to start move")?;
                finish_move(&client, job, from, to, no_wait, json).await?;
            }

            MoveAction::All { from, to, no_wait } => {
                let job = client
                    .move_all(&from, &to)
                    .await
                    .context("Failed to start move")?;
                finish_move(&client, job, from, to, no_wait, json).await?;
            }
        },

        Commands::Job { action } => match action {
            JobAction::List => {
                let jobs = client.list_jobs().await.context("Failed to list jobs")?;

                if json {
                    return print_json(&jobs);
                }
                if jobs.is_empty() {
                    println!("No jobs found.");
                } else {
                    println!("{:<38} {:<9} {:<12} {:>9}", "ID", "MODE", "STATUS", "CHUNKS");
                    println!("{}", "-".repeat(71));
                    for job in jobs {
                        println!(
                            "{:<38} {:<9} {:<12} {:>9}",
                            job.job_id,
                            job.mode.to_string(),
                            job.status.to_string(),
                            format!("{}/{}", job.chunks_processed, job.chunks),
                        );
                    }
                }
            }

            JobAction::Get { job_id } => {
                let job = client
                    .get_job(&job_id)
                    .await
                    .with_context(|| format!("Failed to get job '{}'", job_id))?;

                if json {
                    return print_json(&job);
                }
                print_job(&job);
            }

            JobAction::Watch { job_id } => {
                let job = client
                    .get_job(&job_id)
                    .await
                    .with_context(|| format!("Failed to get job '{}'", job_id))?;

                let outcomes = follow_jobs(
                    &client,
                    vec![WatchedJob {
                        job_id: job.job_id,
                        source_collection: job.source_collection,
                        target_collection: job.target_collection,
                    }],
                )
                .await?;
                report(&outcomes)?;
            }
        },
    }

    Ok(())
}
