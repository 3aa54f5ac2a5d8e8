//! `mptt`: maintenance CLI for nested-set trees stored in SQLite.
#![forbid(unsafe_code)]

mod config;
mod output;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use config::CliConfig;
use mptt_core::{NewNode, NodeId, Placement, RebuildOptions};
use mptt_storage::SqliteStore;
use output::Printer;
use serde_json::{Value, json};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "mptt",
    version,
    about = "Maintain nested-set (lft/rgt) trees stored in SQLite",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(long, global = true, env = "MPTT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, global = true, env = "MPTT_STORAGE_DIR", value_name = "DIR")]
    storage_dir: Option<PathBuf>,

    #[arg(long, global = true, help = "Print JSON instead of text")]
    json: bool,

    #[arg(short, long, global = true, action = ArgAction::Count, help = "Raise log verbosity")]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the tables of every configured tree type (or the named ones).
    Init { trees: Vec<String> },
    #[command(flatten)]
    Tree(TreeCommand),
}

/// Commands that operate on one tree type.
#[derive(Subcommand, Debug)]
enum TreeCommand {
    /// Insert a node as the rightmost child of PARENT, or as a new root.
    Add {
        tree: String,
        id: String,
        #[arg(long)]
        parent: Option<String>,
        #[arg(long)]
        group: bool,
    },
    /// Re-parent a node with its subtree; without --parent it becomes a root.
    Move {
        tree: String,
        id: String,
        #[arg(long)]
        parent: Option<String>,
    },
    /// Place or move a row after its parent column was edited directly.
    Update { tree: String, id: String },
    /// Delete a single node that has no children.
    Delete { tree: String, id: String },
    /// Delete a node and everything below it.
    RemoveSubtree { tree: String, id: String },
    /// Rename a node, or merge it into an existing one with --merge.
    Rename {
        tree: String,
        from: String,
        to: String,
        #[arg(long)]
        merge: bool,
    },
    /// Switch a node between group and leaf.
    SetGroup {
        tree: String,
        id: String,
        #[arg(long, action = ArgAction::Set, default_value_t = true)]
        group: bool,
    },
    /// Recompute every lft/rgt from the parent pointers.
    Rebuild {
        tree: String,
        #[arg(long, value_name = "ROWS")]
        commit_every: Option<usize>,
    },
    Ancestors {
        tree: String,
        id: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    Descendants {
        tree: String,
        id: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    Children { tree: String, id: String },
    Root { tree: String },
    Show { tree: String, id: String },
    /// Verify that ranges nest and agree with the parent pointers.
    Check { tree: String },
}

impl TreeCommand {
    fn tree(&self) -> &str {
        match self {
            Self::Add { tree, .. }
            | Self::Move { tree, .. }
            | Self::Update { tree, .. }
            | Self::Delete { tree, .. }
            | Self::RemoveSubtree { tree, .. }
            | Self::Rename { tree, .. }
            | Self::SetGroup { tree, .. }
            | Self::Rebuild { tree, .. }
            | Self::Ancestors { tree, .. }
            | Self::Descendants { tree, .. }
            | Self::Children { tree, .. }
            | Self::Root { tree }
            | Self::Show { tree, .. }
            | Self::Check { tree } => tree,
        }
    }
}

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn node_id(value: &str) -> Result<NodeId> {
    NodeId::try_new(value).map_err(|err| anyhow::anyhow!("invalid node id '{value}': {}", err.message()))
}

fn optional_node_id(value: Option<&str>) -> Result<Option<NodeId>> {
    value.map(node_id).transpose()
}

fn open_tree(store: &mut SqliteStore, config: &CliConfig, tree: &str) -> Result<()> {
    let spec = config.tree_spec(tree)?;
    store
        .register_tree(spec)
        .with_context(|| format!("tree type '{tree}' is not usable; run `mptt init {tree}`"))?;
    Ok(())
}

fn placement_detail(placement: Placement) -> Value {
    let (kind, bounds) = match placement {
        Placement::Inserted(bounds) => ("inserted", bounds),
        Placement::Moved(bounds) => ("moved", bounds),
        Placement::Unchanged(bounds) => ("unchanged", bounds),
    };
    json!({ "placement": kind, "lft": bounds.lft(), "rgt": bounds.rgt() })
}

fn init(
    store: &mut SqliteStore,
    config: &CliConfig,
    trees: &[String],
    printer: Printer,
) -> Result<()> {
    let specs = if trees.is_empty() {
        config.trees().cloned().collect::<Vec<_>>()
    } else {
        trees
            .iter()
            .map(|tree| config.tree_spec(tree))
            .collect::<Result<Vec<_>, _>>()?
    };
    if specs.is_empty() {
        bail!("no tree types configured; pass names to `mptt init` or add [[tree]] tables");
    }

    let mut installed = Vec::new();
    for spec in specs {
        let name = spec.tree_type().to_string();
        store
            .install_tree(spec)
            .with_context(|| format!("install tree '{name}'"))?;
        installed.push(name);
    }
    printer.message("initialized", json!(installed));
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = CliConfig::load(cli.config.clone()).context("load config")?;
    let storage_dir = config.storage_dir(cli.storage_dir.as_deref());
    debug!(config = ?config.path(), storage_dir = %storage_dir.display(), "cli starting");
    let mut store = SqliteStore::open(&storage_dir)
        .with_context(|| format!("open store at {}", storage_dir.display()))?;
    let printer = Printer::new(cli.json);

    match cli.command {
        Command::Init { trees } => init(&mut store, &config, &trees, printer),
        Command::Tree(command) => run_tree(&mut store, &config, command, printer),
    }
}

fn run_tree(
    store: &mut SqliteStore,
    config: &CliConfig,
    command: TreeCommand,
    printer: Printer,
) -> Result<()> {
    let tree_type = command.tree().to_string();
    open_tree(store, config, &tree_type)?;
    let mut tree = store.tree(&tree_type)?;

    match command {
        TreeCommand::Add {
            id, parent, group, ..
        } => {
            let node = NewNode {
                id: node_id(&id)?,
                parent: optional_node_id(parent.as_deref())?,
                is_group: group,
            };
            let bounds = tree.on_create(&node).with_context(|| format!("add {id}"))?;
            printer.message("added", json!({ "id": id, "lft": bounds.lft(), "rgt": bounds.rgt() }));
        }
        TreeCommand::Move { id, parent, .. } => {
            let target = optional_node_id(parent.as_deref())?;
            let bounds = tree
                .on_reparent(&node_id(&id)?, target.as_ref())
                .with_context(|| format!("move {id}"))?;
            printer.message("moved", json!({ "id": id, "lft": bounds.lft(), "rgt": bounds.rgt() }));
        }
        TreeCommand::Update { id, .. } => {
            let placement = tree
                .on_update(&node_id(&id)?)
                .with_context(|| format!("update {id}"))?;
            printer.message("updated", placement_detail(placement));
        }
        TreeCommand::Delete { id, .. } => {
            tree.on_delete(&node_id(&id)?)
                .with_context(|| format!("delete {id}"))?;
            printer.message("deleted", json!(id));
        }
        TreeCommand::RemoveSubtree { id, .. } => {
            let removed = tree
                .force_remove_subtree(&node_id(&id)?)
                .with_context(|| format!("remove subtree {id}"))?;
            printer.message("removed", json!({ "id": id, "rows": removed }));
        }
        TreeCommand::Rename {
            from, to, merge, ..
        } => {
            tree.rename(&node_id(&from)?, &node_id(&to)?, merge)
                .with_context(|| format!("rename {from} -> {to}"))?;
            let action = if merge { "merged" } else { "renamed" };
            printer.message(action, json!({ "from": from, "to": to }));
        }
        TreeCommand::SetGroup { id, group, .. } => {
            tree.set_group(&node_id(&id)?, group)
                .with_context(|| format!("set group on {id}"))?;
            printer.message("updated", json!({ "id": id, "is_group": group }));
        }
        TreeCommand::Rebuild { commit_every, .. } => {
            let report = tree
                .rebuild(RebuildOptions { commit_every })
                .context("rebuild")?;
            printer.rebuild(&tree_type, &report);
        }
        TreeCommand::Ancestors { id, limit, .. } => {
            printer.nodes(&tree.get_ancestors(&node_id(&id)?, limit)?);
        }
        TreeCommand::Descendants { id, limit, .. } => {
            printer.nodes(&tree.get_descendants(&node_id(&id)?, limit)?);
        }
        TreeCommand::Children { id, .. } => {
            printer.nodes(&tree.get_children(&node_id(&id)?)?);
        }
        TreeCommand::Root { .. } => {
            printer.node(tree.get_root()?.as_ref());
        }
        TreeCommand::Show { id, .. } => {
            printer.node(tree.get_node(&node_id(&id)?)?.as_ref());
        }
        TreeCommand::Check { .. } => {
            let report = tree.check_integrity()?;
            printer.integrity(&tree_type, &report);
            if !report.is_ok() {
                bail!(
                    "{} integrity violations in {tree_type}; run `mptt rebuild {tree_type}`",
                    report.violations.len()
                );
            }
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
