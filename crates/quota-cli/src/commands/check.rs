//! `quota check` command.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;
use quota_kernel::{ObjectCatalog, ObjectClassifier, PermissionResolver};
use serde_json::json;

use crate::input::{load_catalog, load_config};
use crate::opts::{GlobalOpts, setup_logging};
use crate::output::print_success;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Limits config (JSON)
    #[arg(long)]
    pub config: PathBuf,

    /// Object catalog: JSON array of trackable types
    #[arg(long)]
    pub catalog: PathBuf,

    /// Fail when the config has error-level issues
    #[arg(long)]
    pub strict: bool,
}

pub fn cmd_check(opts: &GlobalOpts, args: &CheckArgs) -> Result<()> {
    let config = load_config(Some(&args.config))?;
    setup_logging(opts, config.log_level);
    let catalog = load_catalog(&args.catalog)?;

    let types = catalog.enumerate_trackable_types();
    let (classifier, mut issues) = ObjectClassifier::build(&types, &config);
    let (resolver, tier_issues) = PermissionResolver::build(&config, &classifier);
    issues.extend(tier_issues);
    let errors = issues.iter().filter(|issue| issue.is_error()).count();

    let data = if opts.wants_json() {
        let tiers: Vec<_> = resolver
            .tiers()
            .iter()
            .map(|tier| {
                json!({
                    "permission": tier.permission,
                    "priority": tier.priority,
                    "global_total": tier.global.total,
                    "structure_total": tier.structure.total,
                    "merge_guard": tier.merge_guard,
                })
            })
            .collect();
        json!({
            "tracked_types": classifier.tracked_len(),
            "tiers": tiers,
            "errors": errors,
            "warnings": issues.len() - errors,
        })
    } else {
        json!(format!(
            "{} tracked types, {} tiers, {} errors, {} warnings",
            classifier.tracked_len(),
            resolver.tiers().len(),
            errors,
            issues.len() - errors
        ))
    };
    let notices = issues.iter().map(ToString::to_string).collect();
    print_success(opts, data, notices)?;

    if args.strict && errors > 0 {
        bail!("config has {errors} error(s)");
    }
    Ok(())
}
