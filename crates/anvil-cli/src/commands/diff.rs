use std::path::Path;

use anvil::build::FileStatus;
use anvil::cloud::{AnvilClient, Endpoints};
use anvil::{AnvilConfig, EventBus, MemoryCache, Pipeline, Plan, Workspace};
use serde::Serialize;

use super::{
    Overrides, api_key, cancel_on_ctrl_c, load_config, report, reported_failure, setup_failure,
};

#[derive(Debug, Serialize)]
struct DiffSummary<'a> {
    total: usize,
    new: usize,
    modified: usize,
    unchanged: usize,
    /// Distinct contents a push would transfer.
    uploads: usize,
    pending: Vec<PendingFile<'a>>,
    removed: &'a [String],
}

#[derive(Debug, Serialize)]
struct PendingFile<'a> {
    path: &'a str,
    status: &'static str,
    #[serde(skip)]
    kind: FileStatus,
}

impl<'a> DiffSummary<'a> {
    fn new(plan: &'a Plan) -> Self {
        let diff = &plan.diff;
        let pending = diff
            .files()
            .iter()
            .filter(|f| f.status.needs_upload())
            .map(|f| PendingFile {
                path: &f.entry.path,
                status: status_name(f.status),
                kind: f.status,
            })
            .collect();
        Self {
            total: diff.total(),
            new: diff.count(FileStatus::New),
            modified: diff.count(FileStatus::Modified),
            unchanged: diff.count(FileStatus::Unchanged),
            uploads: diff.upload_count(),
            pending,
            removed: diff.removed(),
        }
    }

    fn print(&self) {
        println!("Workspace contains {}", report::amt(self.total, "file"));
        println!("  new:        {}", self.new);
        println!("  modified:   {}", self.modified);
        println!("  unchanged:  {}", self.unchanged);
        println!("  removed:    {}", self.removed.len());

        if self.pending.is_empty() {
            println!("Nothing to upload");
        } else {
            println!("Would upload {}:", report::amt(self.uploads, "file"));
            for file in &self.pending {
                println!("  {} {}", marker(file.kind), file.path);
            }
        }

        if !self.removed.is_empty() {
            println!("Removed since last push:");
            for path in self.removed {
                println!("  - {path}");
            }
        }
    }
}

fn status_name(status: FileStatus) -> &'static str {
    match status {
        FileStatus::New => "new",
        FileStatus::Modified => "modified",
        FileStatus::Unchanged => "unchanged",
    }
}

fn marker(status: FileStatus) -> &'static str {
    match status {
        FileStatus::Modified => "~",
        FileStatus::New | FileStatus::Unchanged => "+",
    }
}

/// Report what a push would upload. `--no-cache` diffs against an empty
/// cache and needs no network access.
pub async fn diff(dir: &Path, overrides: &Overrides, json: bool) -> anyhow::Result<()> {
    let bus = EventBus::new().on_error(|message| eprintln!("ERROR: {message}"));
    let config = load_config(dir, overrides).map_err(|e| setup_failure("diff", &bus, e))?;
    let workspace = Workspace::from_config(dir, &config.files);

    let plan = if config.build.use_cache {
        let client = remote_cache(&config).map_err(|e| setup_failure("diff", &bus, e))?;
        Pipeline::new(&client, &client, &bus)
            .with_cancellation(cancel_on_ctrl_c())
            .plan(&workspace, true)
            .await
    } else {
        let cache = MemoryCache::new();
        Pipeline::new(&(), &cache, &bus)
            .plan(&workspace, false)
            .await
    }
    .map_err(|e| reported_failure("diff", &e))?;

    let summary = DiffSummary::new(&plan);
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        summary.print();
    }
    Ok(())
}

fn remote_cache(config: &AnvilConfig) -> anyhow::Result<AnvilClient> {
    let app_name = config.app_name()?;
    let key = api_key(&config.platform)?;
    Ok(AnvilClient::new(
        Endpoints::from_config(&config.platform),
        key,
        app_name,
    ))
}
