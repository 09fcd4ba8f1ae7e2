//! otaup cleanup - Delete old bundle versions
//!
//! Keeps the newest `--keep` versions plus every version a channel points
//! at. With `--bundle X.Y.Z` only versions in `[X.Y.Z, next major)` are
//! considered.

use std::io::{self, BufRead, Write};

use clap::Args;
use colored::Colorize;
use serde_json::json;

use crate::app::AppContext;
use crate::cli::output::{emit_json, robot_ok, robot_partial};
use crate::error::{OtaError, Result};
use crate::remote::BundleService;
use crate::retention::{
    RemovalOutcome, RemovalPlan, RetentionDecision, RetentionEntry, VersionRange,
    remove_versions, select_for_removal, sort_by_recency,
};

#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// App id (default: --app-id or app.app_id)
    #[arg(value_name = "APP_ID")]
    pub app: Option<String>,

    /// Only consider versions from this semver floor up to its next major
    #[arg(long, short = 'b', value_name = "VERSION")]
    pub bundle: Option<String>,

    /// Upper bound (exclusive) instead of the next major
    #[arg(long, value_name = "VERSION", requires = "bundle")]
    pub below: Option<String>,

    /// Number of versions to keep (default: cleanup.keep, 4)
    #[arg(long, short = 'k')]
    pub keep: Option<usize>,

    /// Delete without asking for confirmation
    #[arg(long, short = 'f')]
    pub force: bool,
}

pub fn run(ctx: &AppContext, args: &CleanupArgs) -> Result<()> {
    let app_id = ctx.require_app_id(args.app.as_deref())?;
    let range = args
        .bundle
        .as_deref()
        .map(|floor| VersionRange::from_floor(floor, args.below.as_deref()))
        .transpose()?;
    if ctx.robot_mode && !args.force {
        return Err(OtaError::ValidationFailed(
            "--force is required with machine output".to_string(),
        ));
    }

    let service = ctx.bundle_service()?;
    run_with_service(ctx, args, &service, &app_id, range.as_ref())
}

fn run_with_service<S: BundleService>(
    ctx: &AppContext,
    args: &CleanupArgs,
    service: &S,
    app_id: &str,
    range: Option<&VersionRange>,
) -> Result<()> {
    let keep = args.keep.unwrap_or(ctx.config.cleanup.keep);

    let mut versions = service.list_versions(app_id)?;
    sort_by_recency(&mut versions);
    let in_use = service.list_in_use_version_ids(app_id)?;
    tracing::info!(app_id, total = versions.len(), in_use = in_use.len(), "versions listed");

    let entries = select_for_removal(&versions, &in_use, keep, range);

    let removals = match RemovalPlan::from_entries(&entries) {
        RemovalPlan::NothingToDo => {
            if ctx.robot_mode {
                return emit_json(&robot_ok(json!({
                    "app_id": app_id,
                    "range": range.map(ToString::to_string),
                    "entries": entries,
                    "removed": [],
                    "failed": [],
                })));
            }
            if !versions.is_empty() {
                print_entries(&entries);
            }
            println!("{} Nothing to be removed", "→".cyan());
            return Ok(());
        }
        RemovalPlan::Remove(removals) => removals,
    };

    if !ctx.robot_mode {
        if let Some(range) = range {
            println!(
                "Versions between {} and {}: {}",
                range.floor(),
                range.ceiling(),
                entries.len()
            );
        }
        print_entries(&entries);
        if !args.force && !confirm(removals.len())? {
            return Err(OtaError::Cancelled("removal not confirmed".to_string()));
        }
    }

    let outcomes = remove_versions(service, app_id, &removals);
    report(ctx, app_id, range, &entries, &outcomes)
}

fn confirm(count: usize) -> Result<bool> {
    print!(
        "Remove {count} version(s)? Type {} to confirm: ",
        "yes".bold()
    );
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    Ok(input.trim() == "yes")
}

fn print_entries(entries: &[RetentionEntry]) {
    println!("{}", "Bundle versions".bold());
    println!("{}", "─".repeat(60));
    for entry in entries {
        let marker = match entry.decision {
            RetentionDecision::KeepExplicit => "keep".green(),
            RetentionDecision::KeepInUse => "keep (linked to channel)".green(),
            RetentionDecision::Remove => "remove".red(),
        };
        println!(
            "  {:<20} {}  {}",
            entry.version.name,
            entry
                .version
                .created_at
                .format("%Y-%m-%d %H:%M")
                .to_string()
                .dimmed(),
            marker
        );
    }
    println!();
}

fn report(
    ctx: &AppContext,
    app_id: &str,
    range: Option<&VersionRange>,
    entries: &[RetentionEntry],
    outcomes: &[RemovalOutcome],
) -> Result<()> {
    let (removed, failed): (Vec<&RemovalOutcome>, Vec<&RemovalOutcome>) =
        outcomes.iter().partition(|outcome| outcome.is_removed());

    if ctx.robot_mode {
        let data = json!({
            "app_id": app_id,
            "range": range.map(ToString::to_string),
            "entries": entries,
            "removed": removed.iter().map(|o| &o.version.name).collect::<Vec<_>>(),
            "failed": failed
                .iter()
                .map(|o| json!({
                    "version": o.version.name,
                    "error": o.result.as_ref().err().map(ToString::to_string),
                }))
                .collect::<Vec<_>>(),
        });
        return if failed.is_empty() {
            emit_json(&robot_ok(data))
        } else {
            emit_json(&robot_partial(data, removed.len(), failed.len()))
        };
    }

    for outcome in outcomes {
        match &outcome.result {
            Ok(()) => println!(
                "  {} removed {} created {}",
                "✓".green(),
                outcome.version.name,
                outcome.version.created_at.format("%Y-%m-%d")
            ),
            Err(err) => println!(
                "  {} {} not removed: {}",
                "✗".red(),
                outcome.version.name,
                err
            ),
        }
    }
    println!();
    if failed.is_empty() {
        println!("{} Removed {} version(s)", "Done".green().bold(), removed.len());
    } else {
        println!(
            "{} Removed {} version(s), {} failed",
            "Done".yellow().bold(),
            removed.len(),
            failed.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashSet;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::config::Config;
    use crate::remote::{BundleVersion, ChannelRef, VersionId, VersionUpload};

    struct FakeService {
        versions: Vec<BundleVersion>,
        in_use: Vec<VersionId>,
        deleted: RefCell<Vec<String>>,
    }

    impl FakeService {
        fn new(names: &[&str], in_use: &[VersionId]) -> Self {
            let versions = names
                .iter()
                .zip(1..)
                .map(|(name, id)| BundleVersion {
                    id,
                    name: (*name).to_string(),
                    created_at: Utc.timestamp_opt(1_700_000_000 + id * 3600, 0).unwrap(),
                    checksum: None,
                    session_key: None,
                })
                .collect();
            Self {
                versions,
                in_use: in_use.to_vec(),
                deleted: RefCell::new(Vec::new()),
            }
        }
    }

    impl BundleService for FakeService {
        fn list_versions(&self, _: &str) -> Result<Vec<BundleVersion>> {
            // Oldest first on purpose; cleanup must sort
            Ok(self.versions.clone())
        }

        fn list_channels(&self, _: &str) -> Result<Vec<ChannelRef>> {
            Ok(self
                .in_use
                .iter()
                .map(|id| ChannelRef {
                    name: format!("channel-{id}"),
                    version_id: Some(*id),
                })
                .collect())
        }

        fn delete_version(&self, _: &str, name: &str) -> Result<()> {
            self.deleted.borrow_mut().push(name.to_string());
            Ok(())
        }

        fn upload_version(&self, _: &str, _: &VersionUpload, _: Option<&[u8]>) -> Result<BundleVersion> {
            unreachable!()
        }

        fn set_channel(&self, _: &str, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
    }

    fn context() -> AppContext {
        AppContext {
            root: std::env::temp_dir(),
            config: Config::default(),
            robot_mode: true,
            app_id: None,
        }
    }

    fn args(keep: usize) -> CleanupArgs {
        CleanupArgs {
            app: Some("app".into()),
            bundle: None,
            below: None,
            keep: Some(keep),
            force: true,
        }
    }

    #[test]
    fn deletes_oldest_versions_not_in_use() {
        let service = FakeService::new(&["1.0.0", "1.0.1", "1.0.2", "1.0.3", "1.0.4"], &[1]);
        run_with_service(&context(), &args(2), &service, "app", None).unwrap();

        // Newest two kept, 1.0.0 linked to a channel
        assert_eq!(
            *service.deleted.borrow(),
            vec!["1.0.2".to_string(), "1.0.1".to_string()]
        );
    }

    #[test]
    fn range_limits_what_is_deleted() {
        let service = FakeService::new(&["1.9.0", "2.0.0", "2.1.0", "3.0.0"], &[]);
        let range = VersionRange::from_floor("2.0.0", None).unwrap();
        run_with_service(&context(), &args(0), &service, "app", Some(&range)).unwrap();

        let deleted: HashSet<String> = service.deleted.borrow().iter().cloned().collect();
        assert_eq!(
            deleted,
            HashSet::from(["2.0.0".to_string(), "2.1.0".to_string()])
        );
    }

    #[test]
    fn nothing_to_do_deletes_nothing() {
        let service = FakeService::new(&["1.0.0", "1.0.1"], &[]);
        run_with_service(&context(), &args(4), &service, "app", None).unwrap();
        assert!(service.deleted.borrow().is_empty());
    }
}
