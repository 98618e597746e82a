//! Local side of the mirror: ignore rules, the pending-change ledger, tree
//! walks and the filesystem watch source that feeds the ledger.

pub mod ignore;
mod ledger;
mod source;
mod tree;

pub use ignore::{
    is_builtin_excluded, is_ignored, is_path_ignored, load_ignore_rules, load_ignore_rules_from,
    IgnoreRule, IgnoreRuleSet, PathFilter, IGNORE_FILE_NAME,
};
pub use ledger::{ChangeLedger, LedgerSnapshot};
pub use source::{map_event, Ingestor, WatchStream};
pub use tree::{list_files, KnownFiles, TreeListing};

pub(crate) use source::decode_text;

use std::path::{Component, Path};

/// Path of `absolute` relative to `root`, `/`-separated.
///
/// `None` for paths outside the root and for the root itself.
pub fn relative_path(root: &Path, absolute: &Path) -> Option<String> {
    let stripped = absolute.strip_prefix(root).ok()?;
    let parts: Vec<String> = stripped
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
