use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use syncthing_status_monitor::config::{probe_syncthing_config, Config};
use syncthing_status_monitor::filewatcher::{read_config_file, ConfigFileWatcher, GuiConfig};
use syncthing_status_monitor::syncthing_client::{
    ConnectionState, HttpClient, Session, SessionEvent, SessionOptions,
};
use syncthing_status_monitor::systemd::{
    ServiceAction, ServiceControl, ServiceMonitor, ServiceState, SystemctlService,
};
use syncthing_status_monitor::types::MonitorError;

#[tokio::main]
async fn main() {
    init_tracing();
    let config = Config::load().await;

    let result = match env::args().nth(1).as_deref() {
        Some("start") => control(&config, ServiceAction::Start).await,
        Some("stop") => control(&config, ServiceAction::Stop).await,
        Some(other) => Err(MonitorError::Config(format!(
            "unknown command '{other}', expected 'start' or 'stop'"
        ))),
        None => run(config).await,
    };

    if let Err(err) = result {
        error!(error = ?err, "Syncthing status monitor exited with error");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

async fn control(config: &Config, action: ServiceAction) -> Result<(), MonitorError> {
    let service = SystemctlService::from_config(config);
    let message = service.control(action).await?;
    info!("{message}");
    Ok(())
}

async fn run(config: Config) -> Result<(), MonitorError> {
    let (minimum, maximum) = config.poll_interval.bounds();
    let (fast_minimum, fast_maximum) = config.fast_poll_interval.bounds();
    let fast = Arc::new(AtomicBool::new(false));

    let api = Arc::new(HttpClient::new()?);
    let (session, mut events) = Session::spawn(api, SessionOptions { minimum, maximum });
    let _watcher = connect(&config, &session, Arc::clone(&fast))?;

    let service = Arc::new(SystemctlService::from_config(&config));
    let (monitor, mut service_states) = ServiceMonitor::spawn(service, minimum, maximum);

    let mut fast_signal = signal(SignalKind::user_defined1())?;
    let mut normal_signal = signal(SignalKind::user_defined2())?;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut indicator = StatusIndicator::default();
    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                log_event(&event);
                if let SessionEvent::ConnectionStateChanged(state) = event {
                    indicator.connection = state;
                    indicator.refresh();
                }
            }
            Some(state) = service_states.recv() => {
                match state {
                    ServiceState::NotAvailable | ServiceState::NotLoaded | ServiceState::Active => {
                        session.start()
                    }
                    ServiceState::Inactive => session.stop(),
                }
                indicator.service = Some(state);
                indicator.refresh();
            }
            _ = fast_signal.recv() => {
                info!("Switching to fast polling");
                fast.store(true, Ordering::SeqCst);
                session.set_update_interval(fast_minimum, fast_maximum);
                monitor.set_interval(fast_minimum, fast_maximum);
                monitor.refresh();
            }
            _ = normal_signal.recv() => {
                info!("Switching to normal polling");
                fast.store(false, Ordering::SeqCst);
                session.set_update_interval(minimum, maximum);
                monitor.set_interval(minimum, maximum);
            }
            result = &mut shutdown => {
                result?;
                info!("Shutting down");
                break;
            }
        }
    }

    session.shutdown().await;
    Ok(())
}

/// Points the session at the daemon, following config.xml when autoconfig is
/// on. The returned watcher must stay alive for updates to keep flowing.
fn connect(
    config: &Config,
    session: &Session,
    fast: Arc<AtomicBool>,
) -> Result<Option<ConfigFileWatcher>, MonitorError> {
    let fallback_uri = config.configuration_uri.clone();
    let fallback_key = config.api_key.clone();

    if !config.autoconfig {
        info!(uri = %fallback_uri, "Autoconfig disabled, using configured address");
        session.set_parameters(Some(fallback_uri), fallback_key);
        return Ok(None);
    }

    let Some(path) = probe_syncthing_config(&config.syncthing_config_dirs()) else {
        session.set_parameters(Some(fallback_uri), fallback_key);
        return Ok(None);
    };

    let normal = config.poll_interval.bounds();
    let quick = config.fast_poll_interval.bounds();
    let target = session.clone();
    let apply = move |parsed: GuiConfig| {
        let uri = parsed.uri.unwrap_or_else(|| fallback_uri.clone());
        let api_key = parsed.api_key.or_else(|| fallback_key.clone());
        target.set_parameters(Some(uri), api_key);
        let (minimum, maximum) = if fast.load(Ordering::SeqCst) { quick } else { normal };
        target.set_update_interval(minimum, maximum);
    };

    match ConfigFileWatcher::spawn(path.clone(), config.watcher, apply.clone()) {
        Ok(watcher) => Ok(Some(watcher)),
        Err(err) => {
            warn!(error = ?err, path = %path.display(), "Cannot watch Syncthing config, reading it once");
            apply(read_config_file(&path));
            Ok(None)
        }
    }
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::ConnectionStateChanged(state) => {
            info!(state = state.as_str(), "Syncthing connection")
        }
        SessionEvent::ThroughputStateChanged(state) => {
            info!(state = state.as_str(), "Network activity")
        }
        SessionEvent::FolderAdded(handle) => {
            let view = handle.current();
            info!(folder = %view.id, label = %view.label, path = ?view.path, "Folder added");
        }
        SessionEvent::FolderRemoved(view) => {
            info!(folder = %view.id, label = %view.label, "Folder removed")
        }
        SessionEvent::FolderStateChanged { id, state, percent } => {
            info!(folder = %id, state = state.as_str(), percent, "Folder state")
        }
        SessionEvent::FolderLabelChanged { id, label } => {
            info!(folder = %id, label = %label, "Folder renamed")
        }
        SessionEvent::FolderPathChanged { id, path } => {
            info!(folder = %id, path = ?path, "Folder moved")
        }
    }
}

/// Overall status: ok while connected, paused while the service is stopped,
/// warning otherwise.
#[derive(Default)]
struct StatusIndicator {
    connection: ConnectionState,
    service: Option<ServiceState>,
    shown: Option<&'static str>,
}

impl StatusIndicator {
    fn current(&self) -> &'static str {
        match (self.connection, self.service) {
            (ConnectionState::Connected, _) => "ok",
            (ConnectionState::Disconnected, Some(ServiceState::Inactive)) => "paused",
            (ConnectionState::Disconnected, _) => "warning",
        }
    }

    fn refresh(&mut self) {
        let status = self.current();
        if self.shown != Some(status) {
            info!(status, "Status indicator");
            self.shown = Some(status);
        }
    }
}
