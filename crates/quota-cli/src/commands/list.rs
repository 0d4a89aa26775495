//! `quota list` command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use quota_kernel::{ObjectCatalog, ObjectClassifier};
use serde_json::{Value, json};

use crate::input::{load_catalog, load_config};
use crate::opts::{GlobalOpts, setup_logging};
use crate::output::print_success;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Object catalog: JSON array of trackable types
    #[arg(long)]
    pub catalog: PathBuf,

    /// Limits config supplying exclusions and groups
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub fn cmd_list(opts: &GlobalOpts, args: &ListArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    setup_logging(opts, config.log_level);
    let catalog = load_catalog(&args.catalog)?;
    let (classifier, issues) = ObjectClassifier::build(&catalog.enumerate_trackable_types(), &config);

    let rows: Vec<(Value, String)> = classifier
        .tracked_types()
        .map(|(type_id, entry)| {
            let group = classifier
                .resolve_category(type_id)
                .filter(|category| classifier.is_group(*category))
                .map(|category| classifier.label(category));
            let line = format!(
                "{type_id}\t{}\t{}\t{}",
                entry.short_name,
                if entry.structural { "structural" } else { "-" },
                group.as_deref().unwrap_or("-")
            );
            let row = json!({
                "type_id": type_id,
                "name": entry.short_name,
                "structural": entry.structural,
                "group": group,
            });
            (row, line)
        })
        .collect();

    let data = if opts.wants_json() {
        Value::Array(rows.into_iter().map(|(row, _)| row).collect())
    } else {
        let lines: Vec<String> = rows.into_iter().map(|(_, line)| line).collect();
        Value::String(lines.join("\n"))
    };
    let notices = issues.iter().map(ToString::to_string).collect();
    print_success(opts, data, notices)
}
