use std::collections::BTreeMap;
use std::process::Command;
use std::sync::Arc;

use anyhow::{Context, Result};
use depot_core::retention::RetentionPolicy;
use depot_pipeline::sync::{DirectoryAssetCollector, UploadOptions};
use depot_pipeline::{CleanOptions, CleanReport, DeployEngine, DeployOptions, DeployReport, UploadReport};
use depot_store::FsObjectStore;

use crate::Target;

fn build_engine(target: &Target, upload: UploadOptions) -> DeployEngine {
    let store = Arc::new(FsObjectStore::new(target.bucket_dir.clone()));
    let local = DirectoryAssetCollector::new(target.public_dir.clone())
        .with_prefixes(target.prefixes.clone());
    DeployEngine::new(store, Box::new(local)).with_upload_options(upload)
}

fn print_target(target: &Target) {
    println!("   Public: {}", target.public_dir);
    println!("   Bucket: {}", target.bucket_dir);
    if !target.prefixes.is_empty() {
        println!("   Prefixes: {}", target.prefixes.join(", "));
    }
}

fn dry_run_note(dry_run: bool) -> &'static str {
    if dry_run {
        " (dry run)"
    } else {
        ""
    }
}

fn print_upload(report: &UploadReport) {
    println!("\n:: Upload Result{}", dry_run_note(report.dry_run));
    println!("   Uploaded:           {}", report.uploaded.len());
    for key in &report.uploaded {
        println!("     + {key}");
    }
    if !report.skipped_missing.is_empty() {
        println!("   Missing locally:    {}", report.skipped_missing.len());
        for key in &report.skipped_missing {
            println!("     ? {key}");
        }
    }
    if !report.tombstones_cleared.is_empty() {
        println!("   Removals cancelled: {}", report.tombstones_cleared.len());
    }
}

fn print_clean(report: &CleanReport) {
    println!("\n:: Clean Result{}", dry_run_note(report.dry_run));
    if report.refused {
        println!("   Skipped: local assets are not uploaded yet. Run `depot upload` first.");
        return;
    }
    println!("   Deleted:            {}", report.deleted.len());
    for key in &report.deleted {
        println!("     - {key}");
    }
    println!("   Marked for removal: {}", report.tombstoned.len());
    println!("   Awaiting removal:   {}", report.pending.len());
}

pub async fn cmd_upload(
    target: &Target,
    upload: UploadOptions,
    dry_run: bool,
) -> Result<UploadReport> {
    println!(":: Uploading assets...");
    print_target(target);

    let mut engine = build_engine(target, upload);
    let report = engine.upload(dry_run).await.context("Upload failed")?;
    print_upload(&report);
    Ok(report)
}

pub async fn cmd_clean(
    target: &Target,
    policy: RetentionPolicy,
    dry_run: bool,
) -> Result<CleanReport> {
    println!(":: Cleaning old versions...");
    print_target(target);

    let mut engine = build_engine(target, UploadOptions::default());
    let report = engine
        .clean(&CleanOptions { policy, dry_run })
        .await
        .context("Clean failed")?;
    print_clean(&report);
    Ok(report)
}

pub async fn cmd_deploy(
    target: &Target,
    upload: UploadOptions,
    options: DeployOptions,
    after_upload: Option<String>,
) -> Result<DeployReport> {
    println!(":: Deploying assets...");
    print_target(target);

    let mut engine = build_engine(target, upload);
    let dry_run = options.dry_run;
    let report = engine
        .deploy(&options, |upload| match after_upload.as_deref() {
            Some(cmd) if dry_run => {
                tracing::info!("Dry run, not running hook: {}", cmd);
                Ok(())
            }
            Some(cmd) => run_hook(cmd, upload),
            None => Ok(()),
        })
        .await
        .context("Deploy failed")?;

    print_upload(&report.upload);
    if let Some(clean) = &report.clean {
        print_clean(clean);
    }
    Ok(report)
}

pub async fn cmd_manifest(target: &Target) -> Result<BTreeMap<String, String>> {
    let mut engine = build_engine(target, UploadOptions::default());
    let manifest = engine.manifest_mut();
    manifest
        .load()
        .await
        .context("Failed to load removal manifest")?;
    let entries = manifest.entries()?.clone();

    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(entries)
}

/// Run a shell-style command line. The number of uploaded keys is passed in
/// `DEPOT_UPLOADED_COUNT`.
pub fn run_hook(cmd: &str, report: &UploadReport) -> Result<(), String> {
    let parts = shlex::split(cmd).ok_or_else(|| format!("could not parse hook command: {cmd}"))?;
    let Some((program, args)) = parts.split_first() else {
        return Err("hook command is empty".to_string());
    };

    tracing::info!("Running hook: {}", cmd);
    let status = Command::new(program)
        .args(args)
        .env("DEPOT_UPLOADED_COUNT", report.uploaded.len().to_string())
        .status()
        .map_err(|e| format!("failed to start {program}: {e}"))?;

    if status.success() {
        Ok(())
    } else {
        Err(format!("{program} exited with {status}"))
    }
}
