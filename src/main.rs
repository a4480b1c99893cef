use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use yoketrim::config::AppConfig;
use yoketrim::controller::event_monitor::Opened;
use yoketrim::controller::{
    enumerate_devices, reconcile, GilrsBackend, InputBackend, InputMonitor, ListenerRegistry,
    MonitorHandle, RawInputEvent,
};
use yoketrim::mapping::{BindingEngine, BindingTable, EngineEvent, TrimFunction};
use yoketrim::persistence::{BindingStore, TomlBindingStore};
use yoketrim::trim::TrimClient;

#[derive(Parser)]
#[command(name = "yoketrim")]
#[command(about = "Bind joystick buttons and hats to trim functions")]
struct Cli {
    /// Config file path (default: <config dir>/yoketrim/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Dispatch bound controls to the trim device until Ctrl-C (default)
    Run,
    /// Wait for one button or hat and bind it to FUNCTION
    Bind {
        /// "Trim Set", "Trim Release", "Trim Left", "Trim Right" or set/release/left/right
        function: TrimFunction,
        #[arg(long, default_value_t = 30)]
        timeout_s: u64,
    },
    /// Show stored bindings and whether their device is connected
    List,
    /// Remove the binding of FUNCTION
    Delete { function: TrimFunction },
    /// Remove every binding
    Clear,
    /// Print raw input events until Ctrl-C
    Monitor,
    /// List connected input devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup(cli.verbose)?;

    let config_path = cli.config.unwrap_or_else(AppConfig::default_path);
    info!("Using config {}", config_path.display());
    let config = AppConfig::load_or_create(&config_path)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&config).await,
        Command::Bind {
            function,
            timeout_s,
        } => bind(&config, function, Duration::from_secs(timeout_s)).await,
        Command::List => list(&config),
        Command::Delete { function } => delete(&config, function),
        Command::Clear => clear(&config),
        Command::Monitor => monitor(&config).await,
        Command::Devices => devices(),
    }
}

fn setup(verbose: bool) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging(if verbose { Level::DEBUG } else { Level::INFO });
    Ok(())
}

fn setup_logging(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

fn build_engine(config: &AppConfig, listeners: ListenerRegistry) -> Result<BindingEngine> {
    let trim = TrimClient::connect(config.trim_settings())
        .map_err(|e| eyre!("Failed to open trim channel: {}", e))?;
    info!("Trim commands go to {}", trim.remote());
    let store = TomlBindingStore::new(&config.storage.bindings_file);
    Ok(BindingEngine::new(
        Box::new(store),
        Arc::new(trim),
        listeners,
        config.engine_settings(),
    ))
}

fn open_monitor(config: &AppConfig) -> Result<InputMonitor<Opened>> {
    let backend = GilrsBackend::new()?;
    let monitor = InputMonitor::open(
        Box::new(backend),
        ListenerRegistry::new(),
        config.monitor_settings(),
    );
    let settings = monitor.settings();
    debug!(
        "Polling input every {:?}, stats every {:?}",
        settings.poll_interval, settings.stats_interval
    );
    Ok(monitor)
}

async fn stop_monitor(handle: MonitorHandle) -> Result<()> {
    tokio::task::spawn_blocking(move || handle.stop())
        .await
        .map_err(|e| eyre!("Failed to join monitor shutdown: {}", e))??;
    Ok(())
}

async fn run(config: &AppConfig) -> Result<()> {
    let monitor = open_monitor(config)?;
    let engine = build_engine(config, monitor.listeners())?;
    engine.load_bindings(&monitor.devices())?;
    let mut events = engine.subscribe();

    let handle = MonitorHandle::spawn(monitor)?;
    engine.start_run();
    info!("Trim bindings active, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(EngineEvent::ActionTriggered { function, offset, at }) => {
                    println!("{} {} -> {:+.3}", at.format("%H:%M:%S%.3f"), function, offset);
                }
                Ok(EngineEvent::ActionFailed { function, error }) => {
                    println!("{} failed: {}", function, error);
                }
                Ok(other) => debug!("Engine event: {:?}", other),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Missed {} engine events", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    engine.stop_run();
    stop_monitor(handle).await
}

async fn bind(config: &AppConfig, function: TrimFunction, timeout: Duration) -> Result<()> {
    let monitor = open_monitor(config)?;
    let engine = build_engine(config, monitor.listeners())?;
    engine.load_bindings(&monitor.devices())?;
    let mut events = engine.subscribe();

    let handle = MonitorHandle::spawn(monitor)?;
    engine.start_bind(function);
    println!("Press a button or move a hat for {} ...", function);

    let captured = async {
        loop {
            match events.recv().await {
                Ok(EngineEvent::BindingsChanged(table)) => return Some(table),
                Ok(EngineEvent::BindingEvicted { evicted, by }) => {
                    println!("{} no longer bound, its control now triggers {}", evicted, by);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    };

    let outcome = tokio::select! {
        result = tokio::time::timeout(timeout, captured) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, cancelling capture");
            Ok(None)
        }
    };

    match outcome {
        Ok(Some(table)) => print_table(&table),
        Ok(None) => cancel_capture(&engine),
        Err(_) => {
            warn!("No input within {:?}", timeout);
            cancel_capture(&engine);
        }
    }
    stop_monitor(handle).await
}

fn cancel_capture(engine: &BindingEngine) {
    if let Err(e) = engine.cancel_bind() {
        debug!("Capture already finished: {}", e);
    }
}

fn list(config: &AppConfig) -> Result<()> {
    let store = TomlBindingStore::new(&config.storage.bindings_file);
    let stored = store.load()?;
    let live = match GilrsBackend::new() {
        Ok(mut backend) => {
            backend.pump();
            enumerate_devices(&backend)
        }
        Err(e) => {
            warn!("Cannot enumerate devices: {}", e);
            Vec::new()
        }
    };
    print_table(&reconcile(&stored, &live).table);
    Ok(())
}

fn delete(config: &AppConfig, function: TrimFunction) -> Result<()> {
    let engine = build_engine(config, ListenerRegistry::new())?;
    engine.load_bindings(&[])?;
    match engine.delete_binding(function)? {
        Some(binding) => println!("Removed {}", binding),
        None => println!("{} was not bound", function),
    }
    Ok(())
}

fn clear(config: &AppConfig) -> Result<()> {
    let engine = build_engine(config, ListenerRegistry::new())?;
    engine.clear_bindings()?;
    println!("All bindings removed");
    Ok(())
}

async fn monitor(config: &AppConfig) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let monitor = open_monitor(config)?.with_event_tap(tx);
    let handle = MonitorHandle::spawn(monitor)?;
    info!("Printing input events, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = rx.recv() => match event {
                Some(event) => print_event(&event),
                None => {
                    error!("Input monitor stopped unexpectedly");
                    break;
                }
            },
        }
    }
    stop_monitor(handle).await
}

fn devices() -> Result<()> {
    let mut backend = GilrsBackend::new()?;
    backend.pump();
    let devices = backend.devices();
    if devices.is_empty() {
        println!("No input devices connected");
    }
    for device in devices {
        println!(
            "[{}] {} ({} buttons, {} hats)",
            device.runtime_id, device.name, device.buttons, device.hats
        );
    }
    Ok(())
}

fn print_table(table: &BindingTable) {
    if table.is_empty() {
        println!("No bindings");
        return;
    }
    for binding in table.iter() {
        println!("{}", binding);
    }
}

fn print_event(event: &RawInputEvent) {
    match event {
        RawInputEvent::ButtonEdge {
            device_name,
            button,
            pressed,
            ..
        } => println!(
            "{}: button {} {}",
            device_name,
            button,
            if *pressed { "down" } else { "up" }
        ),
        RawInputEvent::HatChange {
            device_name,
            hat,
            direction,
            ..
        } => println!("{}: hat {} {}", device_name, hat, direction),
    }
}
