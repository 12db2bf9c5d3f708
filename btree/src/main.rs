#![cfg_attr(test, allow(clippy::disallowed_methods))]
// Forbid unwrap() in production code to prevent panics from corrupt data.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
use std::process::ExitCode;

use hfs_btree::config::CheckConfig;
use hfs_btree::storage::{BlockProvider, FileProvider};
use hfs_btree::{BTree, BytewiseKeys, OpenOptions, VerifyOptions};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "btreecheck=info,hfs_btree=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match CheckConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        "Loaded configuration: tree_file={}, zero_unused={}, check_key_order={}",
        config.tree_file.display(),
        config.zero_unused,
        config.check_key_order
    );

    let provider = match FileProvider::open(&config.tree_file) {
        Ok(provider) => provider,
        Err(e) => {
            tracing::error!("Failed to open {}: {e}", config.tree_file.display());
            return ExitCode::FAILURE;
        }
    };
    let mut tree = match BTree::open(provider, Box::new(BytewiseKeys), OpenOptions::default()) {
        Ok(tree) => tree,
        Err(e) => {
            tracing::error!("Failed to open tree: {e}");
            return ExitCode::FAILURE;
        }
    };

    let report = match tree.verify(VerifyOptions {
        check_key_order: config.check_key_order,
    }) {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Check aborted: {e}");
            return ExitCode::FAILURE;
        }
    };

    let info = tree.info();
    tracing::info!(
        "Checked {} nodes: {} leaf records, {} of {} nodes in use",
        report.nodes_visited,
        report.leaf_records,
        report.allocated_nodes,
        info.total_nodes
    );
    if !report.is_clean() {
        for problem in &report.problems {
            tracing::error!("{problem}");
        }
        tracing::error!("{} problems found", report.problems.len());
        return ExitCode::FAILURE;
    }

    if config.zero_unused {
        let zeroed = match tree.zero_unused_nodes() {
            Ok(zeroed) => zeroed,
            Err(e) => {
                tracing::error!("Failed to zero unused nodes: {e}");
                return ExitCode::FAILURE;
            }
        };
        if let Err(e) = tree.provider_mut().sync() {
            tracing::error!("Failed to sync: {e}");
            return ExitCode::FAILURE;
        }
        tracing::info!("Zeroed {zeroed} unused nodes");
    }

    tracing::info!("Tree is consistent");
    ExitCode::SUCCESS
}
