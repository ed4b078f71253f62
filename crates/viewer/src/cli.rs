use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use graphview::{
    GraphModel, GraphSession, NodeKey, PersistedGraph, SearchBudget, SessionConfig,
    SessionSnapshot,
};
use tracing::{debug, info, warn};

const DEFAULT_GRAPH_NAME: &str = "main";
const DEFAULT_MAX_TICKS: usize = 3_000;

#[derive(Parser)]
#[command(author, version, about = "Inspect and edit metabolite-reaction networks", long_about = None)]
pub struct Cli {
    /// JSON file with force, style and history settings.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Graph to operate on instead of the snapshot's active one.
    #[arg(long, global = true)]
    pub graph: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct Io {
    /// Session snapshot, or a single persisted graph.
    pub input: PathBuf,

    /// Where to write the updated session snapshot.
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Summarize the graphs in a snapshot.
    Info {
        #[command(flatten)]
        io: Io,
    },
    /// Run the force layout until it settles.
    Layout {
        #[command(flatten)]
        io: Io,
        #[arg(long, default_value_t = DEFAULT_MAX_TICKS)]
        ticks: usize,
        /// Also draw the laid-out graph.
        #[arg(long)]
        svg: Option<PathBuf>,
    },
    /// Shortest path between two nodes, ignoring link direction.
    Path {
        #[command(flatten)]
        io: Io,
        from: String,
        to: String,
        /// List every tied shortest path.
        #[arg(long)]
        all: bool,
        #[arg(long)]
        timeout_ms: Option<u64>,
        #[arg(long)]
        max_paths: Option<usize>,
    },
    /// Give every extra link of the selected metabolites its own copy.
    Split {
        #[command(flatten)]
        io: Io,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Merge selected metabolites sharing a class.
    Join {
        #[command(flatten)]
        io: Io,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Give a reaction private copies of its shared metabolites.
    Isolate {
        #[command(flatten)]
        io: Io,
        id: String,
    },
    /// Take metabolites out of the graph, remembering their links.
    Suspend {
        #[command(flatten)]
        io: Io,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Bring a suspended metabolite back.
    Restore {
        #[command(flatten)]
        io: Io,
        id: String,
    },
    /// Remove nodes and every link touching them.
    Delete {
        #[command(flatten)]
        io: Io,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Contract reactions into one synthetic reaction.
    Collapse {
        #[command(flatten)]
        io: Io,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Register the subgraph connecting the selected nodes as a new graph.
    Component {
        #[command(flatten)]
        io: Io,
        #[arg(long)]
        name: String,
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Join two graphs of the snapshot into a new one.
    MergeGraphs {
        #[command(flatten)]
        io: Io,
        a: String,
        b: String,
        name: String,
        /// Also join metabolites whose class occurs in both graphs.
        #[arg(long)]
        merge: bool,
    },
}

impl Commands {
    fn io(&self) -> &Io {
        match self {
            Commands::Info { io }
            | Commands::Layout { io, .. }
            | Commands::Path { io, .. }
            | Commands::Split { io, .. }
            | Commands::Join { io, .. }
            | Commands::Isolate { io, .. }
            | Commands::Suspend { io, .. }
            | Commands::Restore { io, .. }
            | Commands::Delete { io, .. }
            | Commands::Collapse { io, .. }
            | Commands::Component { io, .. }
            | Commands::MergeGraphs { io, .. } => io,
        }
    }
}

pub fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let io = cli.command.io();
    let mut session = load_session(&io.input, config)?;
    if let Some(name) = &cli.graph {
        session
            .switch_graph(name)
            .with_context(|| format!("selecting graph {name}"))?;
    }

    match &cli.command {
        Commands::Info { .. } => print_info(&session),
        Commands::Layout { ticks, svg, .. } => {
            if *ticks == 0 {
                bail!("--ticks must be at least 1");
            }
            let taken = session.run_until_settled(*ticks)?;
            info!(ticks = taken, "layout finished");
            if let Some(path) = svg {
                fs::write(path, session.render_svg())
                    .with_context(|| format!("writing {}", path.display()))?;
                info!(path = %path.display(), "svg written");
            }
        }
        Commands::Path {
            from,
            to,
            all,
            timeout_ms,
            max_paths,
            ..
        } => {
            let graph = session.graph();
            let a = graph.require_key(from)?;
            let b = graph.require_key(to)?;
            let mut budget = budget(*timeout_ms);
            if let Some(max) = max_paths {
                budget = budget.max_paths(*max);
            }
            if *all {
                let outcome = session.shortest_paths_all(a, b, budget)?;
                report_timeout(outcome.is_complete());
                for path in outcome.value() {
                    println!("{}", format_path(graph, path));
                }
            } else {
                let outcome = session.shortest_path(a, b, budget)?;
                report_timeout(outcome.is_complete());
                println!("{}", format_path(graph, outcome.value()));
            }
        }
        Commands::Split { ids, .. } => {
            session.select_ids(ids)?;
            let created = session.split_selected()?;
            println!("created {} node(s)", created.len());
        }
        Commands::Join { ids, .. } => {
            session.select_ids(ids)?;
            let merged = session.join_selected()?;
            println!("merged {merged} node(s)");
        }
        Commands::Isolate { id, .. } => {
            session.select_ids(&[id])?;
            let created = session.isolate_selected()?;
            println!("created {} node(s)", created.len());
        }
        Commands::Suspend { ids, .. } => {
            session.select_ids(ids)?;
            let suspended = session.suspend_selected()?;
            println!("suspended {}", suspended.join(", "));
        }
        Commands::Restore { id, .. } => {
            let report = session.restore(id)?;
            println!("restored {id} with {} link(s)", report.restored_links);
            for missing in &report.skipped {
                println!("  neighbor {missing} is gone");
            }
        }
        Commands::Delete { ids, .. } => {
            session.select_ids(ids)?;
            let removed = session.delete_selected()?;
            println!("removed {removed} node(s)");
        }
        Commands::Collapse { ids, .. } => {
            session.select_ids(ids)?;
            let key = session.collapse_selected()?;
            let id = session.graph().id_of(key).unwrap_or_default();
            println!("collapsed into {id}");
        }
        Commands::Component {
            name,
            ids,
            timeout_ms,
            ..
        } => {
            session.select_ids(ids)?;
            let outcome = session.extract_component(name, budget(*timeout_ms))?;
            report_timeout(outcome.is_complete());
            println!("{name}: {} node(s)", outcome.value());
        }
        Commands::MergeGraphs {
            a, b, name, merge, ..
        } => {
            session.join_graphs(a, b, name, *merge)?;
            let joined = session.registry().get(name)?;
            println!(
                "{name}: {} node(s), {} link(s)",
                joined.node_count(),
                joined.link_count()
            );
        }
    }

    if let Some(output) = &io.output {
        let json = session.to_snapshot().to_json()?;
        fs::write(output, json).with_context(|| format!("writing {}", output.display()))?;
        info!(path = %output.display(), "snapshot written");
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<SessionConfig> {
    let Some(path) = path else {
        return Ok(SessionConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

/// Accept either a full session snapshot or one bare graph.
fn load_session(path: &Path, config: SessionConfig) -> Result<GraphSession> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    match SessionSnapshot::from_json(&text) {
        Ok(snapshot) => {
            debug!(graphs = snapshot.graphs.len(), "loaded session snapshot");
            Ok(GraphSession::from_snapshot(config, &snapshot)?)
        }
        Err(snapshot_err) => {
            let persisted: PersistedGraph = serde_json::from_str(&text).with_context(|| {
                format!(
                    "{} is neither a session snapshot ({snapshot_err}) nor a graph",
                    path.display()
                )
            })?;
            let graph = GraphModel::from_persisted_at(&persisted, config.force.center)?;
            debug!(nodes = graph.node_count(), "loaded single graph");
            Ok(GraphSession::with_graph(config, DEFAULT_GRAPH_NAME, graph)?)
        }
    }
}

fn budget(timeout_ms: Option<u64>) -> SearchBudget {
    match timeout_ms {
        Some(ms) => SearchBudget::with_timeout(Duration::from_millis(ms)),
        None => SearchBudget::unlimited(),
    }
}

fn report_timeout(complete: bool) {
    if !complete {
        warn!("search budget exhausted, result is partial");
    }
}

fn format_path(graph: &GraphModel, path: &[NodeKey]) -> String {
    path.iter()
        .map(|&k| graph.id_of(k).unwrap_or("?"))
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn print_info(session: &GraphSession) {
    for (name, graph) in session.registry().iter() {
        let marker = if name == session.active_name() { "*" } else { " " };
        let reactions = graph.nodes().filter(|(_, n)| n.is_reaction()).count();
        println!(
            "{marker} {name}: {} node(s) ({reactions} reaction(s)), {} link(s), {} suspended",
            graph.node_count(),
            graph.link_count(),
            graph.suspended().len()
        );
    }
    if let Some(history) = session.history() {
        println!(
            "history: {} undo, {} redo, {} commit(s)",
            history.undo_len(),
            history.redo_len(),
            history.commits().count()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_every_subcommand_has_help_text() {
        let cli = Cli::command();
        for sub in cli.get_subcommands() {
            assert!(sub.get_about().is_some(), "{} has no about", sub.get_name());
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "metnet", "path", "net.json", "A", "C", "--all", "--graph", "sub",
        ])
        .unwrap();
        assert_eq!(cli.graph.as_deref(), Some("sub"));
        match cli.command {
            Commands::Path { from, to, all, .. } => {
                assert_eq!((from.as_str(), to.as_str(), all), ("A", "C", true));
            }
            _ => panic!("expected path command"),
        }
    }

    #[test]
    fn test_edit_commands_need_ids() {
        assert!(Cli::try_parse_from(["metnet", "split", "net.json"]).is_err());
        let cli = Cli::try_parse_from(["metnet", "join", "net.json", "a", "b", "-o", "out.json"])
            .unwrap();
        assert_eq!(cli.command.io().output, Some(PathBuf::from("out.json")));
    }

    #[test]
    fn test_unlimited_budget_without_timeout() {
        assert_eq!(budget(None), SearchBudget::unlimited());
        assert!(budget(Some(5)).deadline.is_some());
    }

    #[test]
    fn test_path_format() {
        let mut g = GraphModel::new();
        let a = g.add_node(graphview::Node::metabolite("A", "a")).unwrap();
        let r = g.add_node(graphview::Node::reaction("R", "r")).unwrap();
        assert_eq!(format_path(&g, &[a, r]), "A -> R");
        assert_eq!(format_path(&g, &[]), "");
    }
}
