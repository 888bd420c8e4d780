use std::ffi::OsString;
use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WatcherConfig;
use crate::types::MonitorError;

use super::debounce::Debouncer;
use super::parser::{read_config_file, GuiConfig};

/// Watches Syncthing's config.xml and reports the connection parameters it
/// holds whenever they change. The file is parsed once right after spawning.
///
/// Dropping the watcher cancels any pending timer; a parse that is already
/// running finishes but its result is discarded.
pub struct ConfigFileWatcher {
    token: CancellationToken,
    _watcher: RecommendedWatcher,
}

impl ConfigFileWatcher {
    pub fn spawn<F>(path: PathBuf, timing: WatcherConfig, on_change: F) -> Result<Self, MonitorError>
    where
        F: FnMut(GuiConfig) + Send + 'static,
    {
        let (changes_tx, changes_rx) = mpsc::unbounded_channel();
        let file_name = path.file_name().map(ToOwned::to_owned);
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if concerns_file(&event, file_name.as_ref()) {
                        let _ = changes_tx.send(());
                    }
                }
                Err(err) => warn!(error = ?err, "Config file watch error"),
            },
            notify::Config::default(),
        )?;

        let directory = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        watcher.watch(directory, RecursiveMode::NonRecursive)?;
        info!(path = %path.display(), "Watching Syncthing config file");

        let token = CancellationToken::new();
        tokio::spawn(drive(
            changes_rx,
            Debouncer::new(timing.warmup(), timing.cooldown()),
            move || read_config_file(&path),
            on_change,
            token.clone(),
        ));

        Ok(Self {
            token,
            _watcher: watcher,
        })
    }
}

impl Drop for ConfigFileWatcher {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

fn concerns_file(event: &Event, file_name: Option<&OsString>) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    match file_name {
        Some(name) => event
            .paths
            .iter()
            .any(|path| path.file_name() == Some(name.as_os_str())),
        None => true,
    }
}

async fn drive<R, F>(
    mut changes: mpsc::UnboundedReceiver<()>,
    mut debouncer: Debouncer,
    mut read: R,
    mut on_change: F,
    token: CancellationToken,
) where
    R: FnMut() -> GuiConfig,
    F: FnMut(GuiConfig),
{
    let mut delivered: Option<GuiConfig> = None;
    debouncer.on_change(Instant::now());

    loop {
        let deadline = debouncer.deadline();
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            change = changes.recv() => match change {
                Some(()) => debouncer.on_change(Instant::now()),
                None => break,
            },
            _ = wait_until(deadline) => {
                if !debouncer.on_deadline(Instant::now()) {
                    continue;
                }
                let parsed = read();
                if token.is_cancelled() {
                    debug!("Watcher dropped while parsing, discarding result");
                    break;
                }
                debouncer.on_parsed(Instant::now());
                if delivered.as_ref() == Some(&parsed) {
                    debug!("Syncthing config file changed without affecting the connection");
                    continue;
                }
                info!(
                    uri = ?parsed.uri,
                    api_key = parsed.api_key.is_some(),
                    "Syncthing connection parameters changed"
                );
                delivered = Some(parsed.clone());
                on_change(parsed);
            }
        }
    }
    debug!("Config file watcher stopped");
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::sleep;

    struct Harness {
        changes: mpsc::UnboundedSender<()>,
        reads: Arc<AtomicUsize>,
        contents: Arc<Mutex<GuiConfig>>,
        delivered: mpsc::UnboundedReceiver<GuiConfig>,
        token: CancellationToken,
    }

    fn gui(uri: &str) -> GuiConfig {
        GuiConfig {
            uri: Some(uri.to_string()),
            api_key: Some("key".to_string()),
        }
    }

    fn start() -> Harness {
        let (changes_tx, changes_rx) = mpsc::unbounded_channel();
        let (delivered_tx, delivered_rx) = mpsc::unbounded_channel();
        let reads = Arc::new(AtomicUsize::new(0));
        let contents = Arc::new(Mutex::new(gui("http://127.0.0.1:8384")));
        let token = CancellationToken::new();

        let read_count = Arc::clone(&reads);
        let read_contents = Arc::clone(&contents);
        tokio::spawn(drive(
            changes_rx,
            Debouncer::new(Duration::from_secs(1), Duration::from_secs(10)),
            move || {
                read_count.fetch_add(1, Ordering::SeqCst);
                read_contents.lock().expect("contents").clone()
            },
            move |parsed| {
                let _ = delivered_tx.send(parsed);
            },
            token.clone(),
        ));

        Harness {
            changes: changes_tx,
            reads,
            contents,
            delivered: delivered_rx,
            token,
        }
    }

    impl Harness {
        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }

        fn change(&self, times: usize) {
            for _ in 0..times {
                self.changes.send(()).expect("driver alive");
            }
        }
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn initial_parse_is_delivered_after_warmup() {
        let mut harness = start();
        sleep(Duration::from_millis(900)).await;
        assert_eq!(harness.reads(), 0);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(harness.reads(), 1);
        assert_eq!(
            harness.delivered.try_recv().ok(),
            Some(gui("http://127.0.0.1:8384"))
        );
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn burst_of_changes_parses_once() {
        let mut harness = start();
        sleep(Duration::from_secs(12)).await;
        assert_eq!(harness.reads(), 1);
        harness.delivered.try_recv().expect("initial delivery");

        *harness.contents.lock().expect("contents") = gui("https://10.0.0.2:8384");
        harness.change(10);
        sleep(Duration::from_millis(1100)).await;
        assert_eq!(harness.reads(), 2);
        assert_eq!(
            harness.delivered.try_recv().ok(),
            Some(gui("https://10.0.0.2:8384"))
        );

        sleep(Duration::from_secs(30)).await;
        assert_eq!(harness.reads(), 2);
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn changes_during_cooldown_cause_one_rerun() {
        let harness = start();
        sleep(Duration::from_millis(1500)).await;
        assert_eq!(harness.reads(), 1);

        harness.change(3);
        sleep(Duration::from_secs(5)).await;
        harness.change(2);

        // Cooldown ends at 11s, the rerun parses after another warmup.
        sleep(Duration::from_secs(5)).await;
        assert_eq!(harness.reads(), 1);
        sleep(Duration::from_secs(1)).await;
        assert_eq!(harness.reads(), 2);

        sleep(Duration::from_secs(60)).await;
        assert_eq!(harness.reads(), 2);
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn unchanged_parameters_are_not_redelivered() {
        let mut harness = start();
        sleep(Duration::from_secs(12)).await;
        harness.delivered.try_recv().expect("initial delivery");

        harness.change(1);
        sleep(Duration::from_secs(2)).await;
        assert_eq!(harness.reads(), 2);
        assert!(harness.delivered.try_recv().is_err());
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn cancelling_during_warmup_skips_the_parse() {
        let mut harness = start();
        sleep(Duration::from_millis(500)).await;
        harness.token.cancel();
        sleep(Duration::from_secs(5)).await;
        assert_eq!(harness.reads(), 0);
        assert!(harness.delivered.recv().await.is_none());
    }

    #[tokio::test]
    async fn watches_a_real_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.xml");
        std::fs::write(
            &path,
            "<configuration><gui><address>127.0.0.1:8384</address><apikey>one</apikey></gui></configuration>",
        )
        .expect("write");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let timing = WatcherConfig {
            warmup_secs: 0,
            cooldown_secs: 0,
        };
        let watcher = ConfigFileWatcher::spawn(path.clone(), timing, move |parsed| {
            let _ = tx.send(parsed);
        })
        .expect("watcher");

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("initial parse")
            .expect("delivery");
        assert_eq!(first.uri.as_deref(), Some("http://127.0.0.1:8384"));
        assert_eq!(first.api_key.as_deref(), Some("one"));

        std::fs::write(
            &path,
            "<configuration><gui tls=\"true\"><address>127.0.0.1:8385</address><apikey>two</apikey></gui></configuration>",
        )
        .expect("rewrite");
        // A truncated intermediate state may be delivered first.
        let second = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let parsed = rx.recv().await.expect("delivery");
                if parsed.uri.is_some() && parsed.api_key.is_some() && parsed != first {
                    break parsed;
                }
            }
        })
        .await
        .expect("change detected");
        assert_eq!(second.uri.as_deref(), Some("https://127.0.0.1:8385"));
        assert_eq!(second.api_key.as_deref(), Some("two"));

        drop(watcher);
    }
}
