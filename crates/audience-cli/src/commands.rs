//! Command line interface
//!
//! Every command prints one JSON document on stdout.

use crate::config::AudienceConfig;
use crate::sources::{load_definitions, load_events};
use anyhow::{Result, bail};
use audience_core::{IdentifierKind, SegmentEngine, parse_overrides, parse_snapshot};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Segment membership over recorded events
#[derive(Parser, Debug)]
#[command(name = "audience")]
#[command(about = "Audience segment membership checks and resolution")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (defaults to AUDIENCE_CONFIG_PATH or audience.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// JSON array of segment definitions
    #[arg(long, global = true, default_value = "segments.json")]
    pub definitions: PathBuf,

    /// JSON-lines file of tracked events
    #[arg(long, global = true, default_value = "events.jsonl")]
    pub events: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check whether one identifier belongs to a segment
    Check {
        #[arg(short, long)]
        segment: String,

        /// User ID, or browser ID with --browser
        #[arg(short, long)]
        identifier: String,

        /// Treat the identifier as a browser ID
        #[arg(long)]
        browser: bool,

        /// Field overrides as a JSON object
        #[arg(long)]
        fields: Option<String>,

        /// Round-trip cache returned by a previous check
        #[arg(long)]
        cache: Option<String>,
    },

    /// List every user belonging to a segment
    Members {
        #[arg(short, long)]
        segment: String,

        /// Field overrides as a JSON object
        #[arg(long)]
        fields: Option<String>,
    },

    /// List all segments
    List,
}

impl Cli {
    /// Runs the command and returns the JSON document to print.
    pub async fn execute(&self) -> Result<String> {
        let config = match &self.config {
            Some(path) => AudienceConfig::load_from(path)?,
            None => AudienceConfig::load()?,
        }
        .apply_profile();

        let definitions = Arc::new(load_definitions(&self.definitions)?);
        let events = Arc::new(load_events(&self.events)?);
        let engine = SegmentEngine::from_config(&config.engine, definitions, events).await?;

        let output = match &self.command {
            Command::Check { segment, identifier, browser, fields, cache } => {
                let overrides = parse_overrides(fields.as_deref())?;
                let snapshot = parse_snapshot(cache.as_deref())?;
                let kind = if *browser { IdentifierKind::Browser } else { IdentifierKind::User };

                let Some(check) = engine
                    .check_identifier(segment, identifier, kind, &overrides, snapshot)
                    .await?
                else {
                    bail!("Segment not found: {segment}");
                };
                info!(
                    %segment,
                    %identifier,
                    %kind,
                    member = check.check,
                    "Checked segment membership"
                );
                serde_json::to_value(&check)?
            }
            Command::Members { segment, fields } => {
                let overrides = parse_overrides(fields.as_deref())?;
                let Some(members) = engine.resolve_members(segment, &overrides).await? else {
                    bail!("Segment not found: {segment}");
                };
                info!(%segment, members = members.len(), "Resolved segment members");
                json!({ "members": members })
            }
            Command::List => serde_json::to_value(engine.list_segments().await?)?,
        };

        Ok(serde_json::to_string_pretty(&output)?)
    }
}
