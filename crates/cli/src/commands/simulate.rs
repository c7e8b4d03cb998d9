use std::sync::Arc;

use atrium_blob_memory::MemoryBlobStore;
use atrium_core::{EntityRef, UploadState, UserId};
use atrium_entitlements::{
    EntitlementsBuilder, EntitlementsConfig, MetricsSnapshot, UploadObserver, UploadRequest,
    format_bytes,
};
use atrium_persistence::{Collection, Document, PersistenceGateway};
use atrium_persistence_memory::MemoryPersistence;
use clap::Args;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::OutputFormat;

const NOTE_ID: &str = "walkthrough-note";

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// User id to simulate.
    #[arg(long, default_value = "demo-user")]
    pub user: String,

    /// Number of files to upload.
    #[arg(long, default_value_t = 3)]
    pub files: usize,

    /// Size of each uploaded file.
    #[arg(long, default_value = "1MB", value_parser = super::parse_size)]
    pub file_size: u64,
}

#[derive(Debug, Serialize)]
struct Step {
    step: &'static str,
    outcome: String,
}

#[derive(Debug, Serialize)]
struct Report {
    user_id: String,
    steps: Vec<Step>,
    metrics: MetricsSnapshot,
}

impl Report {
    fn record(&mut self, step: &'static str, outcome: impl Into<String>) {
        self.steps.push(Step {
            step,
            outcome: outcome.into(),
        });
    }
}

/// Logs upload states at debug level.
struct TraceObserver;

impl UploadObserver for TraceObserver {
    fn on_state(&self, state: UploadState) {
        debug!(%state, "upload state");
    }
}

pub async fn run(
    config: EntitlementsConfig,
    args: &SimulateArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let persistence = Arc::new(MemoryPersistence::new());
    let entitlements = EntitlementsBuilder::new()
        .persistence(Arc::clone(&persistence) as Arc<dyn PersistenceGateway>)
        .blobs(Arc::new(MemoryBlobStore::new()))
        .config(config)
        .build()?;

    let user = UserId::new(args.user.as_str());
    let entity = EntityRef::note(NOTE_ID);
    let mut note = Document::new();
    note.insert("userId".into(), Value::from(user.as_str()));
    note.insert("title".into(), Value::from("Walkthrough"));
    note.insert("attachments".into(), Value::Array(Vec::new()));
    persistence
        .create(Collection::Notes, Some(NOTE_ID), note)
        .await?;

    let mut report = Report {
        user_id: user.to_string(),
        steps: Vec::new(),
        metrics: entitlements.metrics(),
    };

    let sub = entitlements.subscription(&user).await?;
    report.record("subscription", format!("plan '{}' ({})", sub.plan_id, sub.status));

    let file_size = usize::try_from(args.file_size)?;
    for i in 0..args.files {
        let request = UploadRequest::new(
            user.clone(),
            entity.clone(),
            format!("file-{i}.bin"),
            "application/octet-stream",
            vec![0u8; file_size],
        );
        let outcome = match entitlements.upload(request, Some(&TraceObserver)).await {
            Ok(attachment) => format!("stored {}", attachment.storage_path),
            Err(e) => format!("rejected: {}", e.user_message()),
        };
        report.record("upload", outcome);
    }

    let usage = entitlements.usage_report(&user).await?;
    report.record(
        "usage",
        format!(
            "{} of {} ({:.1}%)",
            format_bytes(usage.used_bytes),
            format_bytes(usage.limit_bytes),
            usage.percent_used
        ),
    );

    let oversize = entitlements.evaluator().max_file_size_bytes(Some(&sub)) + 1;
    let request = UploadRequest::new(
        user.clone(),
        entity.clone(),
        "oversize.bin",
        "application/octet-stream",
        vec![0u8; usize::try_from(oversize)?],
    );
    let outcome = match entitlements.upload(request, None).await {
        Ok(_) => "unexpectedly admitted".to_owned(),
        Err(e) => format!("rejected: {}", e.user_message()),
    };
    report.record("oversize upload", outcome);

    match entitlements.upgrade(&user, atrium_core::PRO_PLAN_ID).await {
        Ok(sub) => {
            let until = sub
                .end_date
                .map_or_else(|| "open-ended".to_owned(), |d| d.to_rfc3339());
            report.record("upgrade", format!("plan '{}' until {until}", sub.plan_id));
        }
        Err(e) => report.record("upgrade", format!("failed: {e}")),
    }
    report.record(
        "is pro",
        entitlements.is_pro(&user).await?.to_string(),
    );

    let canceled = entitlements.cancel(&user).await?;
    report.record(
        "cancel",
        format!(
            "status {}, still pro: {}",
            canceled.status,
            entitlements.is_pro(&user).await?
        ),
    );

    if let Some(first) = entitlements.attachments(&user, &entity).await?.first() {
        entitlements
            .delete_attachment(&user, &entity, &first.storage_path)
            .await?;
        report.record("delete", format!("removed {}", first.storage_path));
    }
    report.record(
        "usage",
        format_bytes(entitlements.current_usage(&user).await?),
    );

    report.metrics = entitlements.metrics();
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!("Walkthrough for user '{}':", report.user_id);
            for (i, step) in report.steps.iter().enumerate() {
                println!("  {:>2}. {:<16} {}", i + 1, step.step, step.outcome);
            }
            let m = &report.metrics;
            println!(
                "Metrics: {} started, {} completed, {} too large, {} over quota, {} lapsed, {} deleted",
                m.uploads_started,
                m.uploads_completed,
                m.rejected_file_too_large,
                m.rejected_quota,
                m.rejected_lapsed,
                m.deletions
            );
        }
    }
    Ok(())
}
