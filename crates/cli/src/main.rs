use anyhow::{Context, Result, anyhow};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use flowscope_engine::{
    ContextValue, ExecutionCursor, PreparedSnapshot, ProxySettings, Resolution, WorkflowDataProxy, complete, parse_snapshot_file,
    resolve_reference,
};
use flowscope_types::WorkflowExecuteMode;
use tracing::debug;

fn main() -> Result<()> {
    init_tracing();
    let matches = build_cli().get_matches();

    let (name, sub) = matches.subcommand().context("expected a subcommand")?;
    let prepared = load_snapshot(sub)?;
    let proxy = prepared
        .session(ProxySettings::from_env())
        .context("failed to open a proxy session")?;

    match name {
        "resolve" => run_resolve(&proxy, sub),
        "complete" => run_complete(&proxy, sub),
        "nodes" => run_nodes(&proxy),
        other => anyhow::bail!("unknown subcommand: {other}"),
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_cli() -> Command {
    let snapshot_args = [
        Arg::new("file")
            .long("file")
            .short('f')
            .required(true)
            .action(ArgAction::Set)
            .help("Path to a snapshot YAML/JSON file"),
        Arg::new("node")
            .long("node")
            .action(ArgAction::Set)
            .help("Evaluate from this node instead of the snapshot cursor"),
        Arg::new("run")
            .long("run")
            .action(ArgAction::Set)
            .value_parser(value_parser!(usize))
            .help("Run index of the cursor node"),
        Arg::new("item")
            .long("item")
            .action(ArgAction::Set)
            .value_parser(value_parser!(usize))
            .help("Input item index"),
        Arg::new("mode")
            .long("mode")
            .action(ArgAction::Set)
            .help("Execution mode (manual, trigger, webhook, ...)"),
    ];

    Command::new("flowscope")
        .about("Inspect workflow execution snapshots")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("resolve")
                .about("Resolve a reference such as $('Function').item.json")
                .args(snapshot_args.clone())
                .arg(Arg::new("reference").required(true).action(ArgAction::Set)),
        )
        .subcommand(
            Command::new("complete")
                .about("List completions for a partially typed reference")
                .args(snapshot_args.clone())
                .arg(Arg::new("partial").required(true).action(ArgAction::Set)),
        )
        .subcommand(
            Command::new("nodes")
                .about("List workflow nodes with their recorded runs")
                .args(snapshot_args),
        )
}

fn load_snapshot(matches: &ArgMatches) -> Result<PreparedSnapshot> {
    let file = matches.get_one::<String>("file").context("missing --file")?;
    let snapshot = parse_snapshot_file(file)?;

    let cursor = apply_cursor_overrides(matches, snapshot.cursor.clone())?;
    debug!(file = %file, node = %cursor.node_name, run = cursor.run_index, item = cursor.item_index, "loaded snapshot");

    snapshot
        .with_cursor(cursor)
        .prepare()
        .with_context(|| format!("failed to prepare snapshot {file}"))
}

fn apply_cursor_overrides(matches: &ArgMatches, mut cursor: ExecutionCursor) -> Result<ExecutionCursor> {
    if let Some(node) = matches.get_one::<String>("node") {
        cursor.node_name = node.clone();
    }
    if let Some(run) = matches.get_one::<usize>("run") {
        cursor = cursor.with_run_index(*run);
    }
    if let Some(item) = matches.get_one::<usize>("item") {
        cursor = cursor.with_item_index(*item);
    }
    if let Some(mode) = matches.get_one::<String>("mode") {
        let mode = mode.parse::<WorkflowExecuteMode>().map_err(|message| anyhow!(message))?;
        cursor = cursor.with_mode(mode);
    }
    Ok(cursor)
}

fn run_resolve(proxy: &WorkflowDataProxy<'_>, matches: &ArgMatches) -> Result<()> {
    let reference = matches.get_one::<String>("reference").context("missing reference")?;
    match resolve_reference(proxy, reference)? {
        Resolution::Value(ContextValue::Defined(value)) => println!("{}", serde_json::to_string_pretty(&value)?),
        Resolution::Value(ContextValue::Undefined) => println!("undefined"),
        Resolution::Accessor(kind) => {
            for member in kind.members() {
                println!("{:<12} {}", member.name, member.description);
            }
        }
    }
    Ok(())
}

fn run_complete(proxy: &WorkflowDataProxy<'_>, matches: &ArgMatches) -> Result<()> {
    let partial = matches.get_one::<String>("partial").context("missing partial reference")?;
    for suggestion in complete(proxy, partial) {
        println!(
            "{:<20} {:<24} {}",
            suggestion.display,
            suggestion.insert_text,
            suggestion.meta.as_deref().unwrap_or_default()
        );
    }
    Ok(())
}

fn run_nodes(proxy: &WorkflowDataProxy<'_>) -> Result<()> {
    let workflow = proxy.workflow();
    let run_data = proxy.run_data();
    let active = proxy.cursor().node_name.as_str();
    let upstream = workflow.parent_node_names(active);

    for node in workflow.nodes() {
        let marker = if node.name == active {
            "*"
        } else if upstream.contains(&node.name.as_str()) {
            "^"
        } else {
            " "
        };
        println!(
            "{marker} {:<20} {:<32} runs={}",
            node.name,
            node.node_type,
            run_data.tasks(&node.name).len()
        );
    }
    Ok(())
}
