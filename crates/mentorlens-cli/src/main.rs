//! `mentorlens` - drive the widget engine against a live backend
//!
//! ```bash
//! # Years and quarters with data for a coordinator's program
//! mentorlens --config mentorlens.toml availability --widget sessions --coordinator u-17
//!
//! # Rows of one quarter
//! mentorlens fetch --widget sessions --endpoint /api/sessions \
//!     --mode quarterly --year 2025 --quarter Q3
//!
//! # Poll a notification feed until Ctrl-C
//! mentorlens --json watch --feed mentor-inbox
//! ```

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgGroup, ArgMatches, Command};
use mentorlens_core::{
    EngineConfig, FeedId, FetchOrchestrator, Identity, JsonRow, JsonRowAdapter, NotificationSource,
    PollEvent, PollerRegistry, Preference, RowSource, ScopeResolver, ScopeState, Visibility,
    WidgetSpec, WidgetView,
};
use mentorlens_filter::{PeriodMode, PeriodSelection, Quarter, Scope};
use mentorlens_http::{BackendClient, HttpNotificationSource, HttpProgramDirectory, HttpRowSource};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("mentorlens")
        .version(mentorlens_core::VERSION)
        .about("Scoped, period-filtered analytics widgets against a MentorLens backend")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("base-url")
                .long("base-url")
                .global(true)
                .help("Backend base URL, overriding configuration and environment"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            widget_command("availability")
                .about("Print the years and quarters that have data for a scope"),
        )
        .subcommand(
            widget_command("fetch")
                .about("Compile a period and print the filtered rows")
                .arg(
                    Arg::new("mode")
                        .long("mode")
                        .value_parser(["overall", "quarterly", "yearly"])
                        .help("Period mode"),
                )
                .arg(
                    Arg::new("year")
                        .long("year")
                        .value_parser(value_parser!(i32))
                        .help("Selected year"),
                )
                .arg(Arg::new("quarter").long("quarter").help("Selected quarter (Q1..Q4)"))
                .arg(
                    Arg::new("view")
                        .long("view")
                        .value_parser(["chart", "table"])
                        .help("Remember this view for the widget"),
                )
                .arg(
                    Arg::new("rows")
                        .long("rows")
                        .action(ArgAction::SetTrue)
                        .help("Print every row as a JSON line"),
                ),
        )
        .subcommand(
            Command::new("watch")
                .about("Poll a notification feed until Ctrl-C")
                .arg(
                    Arg::new("feed")
                        .long("feed")
                        .required(true)
                        .help("Feed identifier"),
                )
                .arg(
                    Arg::new("timestamp-field")
                        .long("timestamp-field")
                        .default_value("date")
                        .help("JSON field holding each notification's date"),
                ),
        )
}

fn widget_command(name: &'static str) -> Command {
    Command::new(name)
        .arg(
            Arg::new("widget")
                .long("widget")
                .short('w')
                .required(true)
                .help("Widget name from configuration"),
        )
        .arg(
            Arg::new("endpoint")
                .long("endpoint")
                .help("Row endpoint, for widgets missing from configuration"),
        )
        .arg(Arg::new("program").long("program").help("Restrict to one program"))
        .arg(Arg::new("entity").long("entity").help("Restrict to one pinned entity"))
        .arg(
            Arg::new("coordinator")
                .long("coordinator")
                .help("Resolve the program of this coordinator"),
        )
        .group(
            ArgGroup::new("scope")
                .args(["program", "entity", "coordinator"])
                .multiple(false),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let config = load_config(&matches)?;
    init_logging(&config, matches.get_flag("json"));

    match matches.subcommand() {
        Some(("availability", args)) => run_availability(&config, args).await,
        Some(("fetch", args)) => run_fetch(&config, args).await,
        Some(("watch", args)) => run_watch(&config, args).await,
        _ => Ok(()),
    }
}

fn load_config(matches: &ArgMatches) -> Result<EngineConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => {
            EngineConfig::load(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => EngineConfig::default(),
    }
    .with_env_overrides();

    if let Some(url) = matches.get_one::<String>("base-url") {
        config = config.with_base_url(url.clone());
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn init_logging(config: &EngineConfig, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn backend(config: &EngineConfig) -> Result<Arc<BackendClient>> {
    let client = BackendClient::from_config(&config.backend).context("building backend client")?;
    Ok(Arc::new(client))
}

/// Where the widget's scope comes from
enum ScopeFeed {
    /// Looked up from an identity
    Resolver(ScopeResolver, Identity),
    /// Given on the command line
    Fixed(watch::Sender<ScopeState>),
}

impl ScopeFeed {
    fn from_args(client: &Arc<BackendClient>, config: &EngineConfig, args: &ArgMatches) -> Self {
        if let Some(program) = args.get_one::<String>("program") {
            let (tx, _) = watch::channel(ScopeState::Resolved(Scope::program(program.as_str())));
            return Self::Fixed(tx);
        }

        let identity = if let Some(user) = args.get_one::<String>("coordinator") {
            Identity::coordinator(user.as_str())
        } else if let Some(entity) = args.get_one::<String>("entity") {
            Identity::pinned(entity.as_str())
        } else {
            Identity::Administrator
        };
        let directory = HttpProgramDirectory::new(
            Arc::clone(client),
            config.backend.routes.program_lookup.clone(),
        );
        Self::Resolver(ScopeResolver::new(Arc::new(directory)), identity)
    }

    fn subscribe(&self) -> watch::Receiver<ScopeState> {
        match self {
            Self::Resolver(resolver, _) => resolver.subscribe(),
            Self::Fixed(tx) => tx.subscribe(),
        }
    }

    async fn settle(&self) -> Scope {
        match self {
            Self::Resolver(resolver, identity) => resolver.resolve(identity).await,
            Self::Fixed(tx) => tx.borrow().scope().cloned().unwrap_or(Scope::Unrestricted),
        }
    }
}

fn widget_spec(config: &EngineConfig, args: &ArgMatches) -> Result<WidgetSpec> {
    let name = args.get_one::<String>("widget").context("--widget is required")?;
    if let Some(endpoint) = args.get_one::<String>("endpoint") {
        return Ok(WidgetSpec::new(name.as_str(), endpoint.as_str()));
    }
    config
        .widget(name)
        .cloned()
        .with_context(|| format!("widget {name:?} is not configured; pass --endpoint"))
}

fn view_preference(path: PathBuf) -> Preference<WidgetView> {
    let initial = std::fs::read_to_string(&path)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_default();
    Preference::new(initial, move |view: &WidgetView| {
        if let Err(e) = std::fs::write(&path, view.to_string()) {
            tracing::warn!(path = %path.display(), error = %e, "failed to persist widget view");
        }
    })
}

fn build_widget(
    client: &Arc<BackendClient>,
    config: &EngineConfig,
    spec: WidgetSpec,
    scope_rx: watch::Receiver<ScopeState>,
) -> FetchOrchestrator<JsonRow> {
    let source: Arc<dyn RowSource<JsonRow>> =
        Arc::new(HttpRowSource::for_widget(Arc::clone(client), &spec));
    let widget = FetchOrchestrator::new(spec, source, scope_rx);
    match &config.view_state_path {
        Some(path) => widget.with_view_preference(view_preference(path.clone())),
        None => widget,
    }
}

fn describe(selection: PeriodSelection) -> String {
    match selection.mode {
        PeriodMode::Overall => "overall".to_string(),
        PeriodMode::Yearly => format!("year {}", selection.year),
        PeriodMode::Quarterly => format!("{} {}", selection.year, selection.quarter),
    }
}

async fn run_availability(config: &EngineConfig, args: &ArgMatches) -> Result<()> {
    let client = backend(config)?;
    let feed = ScopeFeed::from_args(&client, config, args);
    let widget = build_widget(&client, config, widget_spec(config, args)?, feed.subscribe());

    let scope = feed.settle().await;
    widget.refresh().await;

    let availability = widget.availability();
    println!("scope: {scope}");
    if availability.is_empty() {
        println!("no dated rows");
    }
    for year in availability.years() {
        let quarters: Vec<String> =
            availability.quarters(year).iter().map(ToString::to_string).collect();
        println!("{year}: {}", quarters.join(" "));
    }
    if let Some(defaults) = widget.defaults() {
        println!("default: {}", describe(defaults.selection()));
    }

    widget.teardown();
    Ok(())
}

async fn run_fetch(config: &EngineConfig, args: &ArgMatches) -> Result<()> {
    let client = backend(config)?;
    let feed = ScopeFeed::from_args(&client, config, args);
    let widget = build_widget(&client, config, widget_spec(config, args)?, feed.subscribe());

    feed.settle().await;
    widget.refresh().await;

    if let Some(mode) = args.get_one::<String>("mode") {
        let mode: PeriodMode = mode.parse()?;
        widget.set_mode(mode).await.context("changing period mode")?;
    }
    if let Some(year) = args.get_one::<i32>("year") {
        widget.set_year(*year).await.context("changing year")?;
    }
    if let Some(quarter) = args.get_one::<String>("quarter") {
        let quarter: Quarter = quarter.parse()?;
        widget.set_quarter(quarter).await.context("changing quarter")?;
    }
    if let Some(view) = args.get_one::<String>("view") {
        let view: WidgetView = view.parse()?;
        widget.set_view(view);
    }

    let state = widget.state();
    let label = state.range.as_ref().map_or("Overall", |range| range.label.as_str());
    println!(
        "{label}: {} rows ({} view, {})",
        state.rows.len(),
        widget.view(),
        if widget.is_dirty() { "filtered" } else { "defaults" }
    );
    if args.get_flag("rows") {
        for row in &state.rows {
            println!("{}", serde_json::to_string(&row.fields)?);
        }
    }

    widget.teardown();
    if let Some(message) = state.error {
        bail!(message);
    }
    Ok(())
}

async fn run_watch(config: &EngineConfig, args: &ArgMatches) -> Result<()> {
    let client = backend(config)?;
    let feed_id = args.get_one::<String>("feed").context("--feed is required")?;
    let timestamp_field = args
        .get_one::<String>("timestamp-field")
        .map_or("date", String::as_str);

    let source: Arc<dyn NotificationSource<JsonRow>> = Arc::new(HttpNotificationSource::new(
        client,
        config.backend.routes.notifications.clone(),
        JsonRowAdapter::new(timestamp_field),
    ));
    let (visibility, visibility_rx) = watch::channel(Visibility::Visible);
    let registry = PollerRegistry::new(source, config.poller, visibility_rx);

    let (sink, mut events) = mpsc::channel(16);
    let feed = FeedId::new(feed_id.as_str());
    let subscription = registry.subscribe(feed.clone(), sink);
    tracing::info!(feed = %feed, subscription = %subscription, "watching feed");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("listening for Ctrl-C")?;
                break;
            }
            event = events.recv() => match event {
                Some(PollEvent::Items(items)) => {
                    for item in items {
                        println!("{}", serde_json::to_string(&item.fields)?);
                    }
                }
                Some(PollEvent::Error(message)) => eprintln!("poll failed: {message}"),
                Some(PollEvent::RateLimited { next_interval }) => {
                    eprintln!("rate limited; next poll in {next_interval:?}");
                }
                None => break,
            }
        }
    }

    registry.unsubscribe(&feed, subscription);
    drop(visibility);
    Ok(())
}
