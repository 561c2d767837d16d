// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Hot reload of the application config.
//!
//! Watches the config file's directory, debounces bursts of modify events
//! (editors often write a file several times) and re-parses the file once
//! things settle. A broken file yields [`ConfigEvent::Error`] and the caller
//! keeps running with what it had.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::debug;

use super::AppConfig;

/// Events emitted by the config watcher
#[derive(Debug, Clone)]
pub enum ConfigEvent {
    /// The file changed and parsed cleanly
    Reloaded(Box<AppConfig>),
    /// The file changed but could not be loaded
    Error(String),
    /// The file was removed
    Removed(PathBuf),
}

/// Watches one config file
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    event_receiver: Receiver<ConfigEvent>,
    watched_path: PathBuf,
}

impl ConfigWatcher {
    /// Watch `path`. `debounce_ms` defaults to 500.
    ///
    /// The parent directory is watched rather than the file itself so that
    /// editors which save by rename are still picked up.
    pub fn new<P: AsRef<Path>>(path: P, debounce_ms: Option<u64>) -> Result<Self> {
        let watched_path = path.as_ref().to_path_buf();
        let debounce = Duration::from_millis(debounce_ms.unwrap_or(500));
        let dir = match watched_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = watched_path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| anyhow!("Config path has no file name: {:?}", watched_path))?;

        let (event_tx, event_rx): (Sender<ConfigEvent>, Receiver<ConfigEvent>) = mpsc::channel();
        let (notify_tx, notify_rx): (Sender<Event>, Receiver<Event>) = mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = notify_tx.send(event);
                }
            },
            Config::default(),
        )
        .map_err(|e| anyhow!("Failed to create file watcher: {}", e))?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| anyhow!("Failed to watch path {:?}: {}", dir, e))?;

        let target = watched_path.clone();
        std::thread::Builder::new()
            .name("config-watch".into())
            .spawn(move || {
                let mut dirty_since: Option<Instant> = None;

                loop {
                    match notify_rx.recv_timeout(Duration::from_millis(100)) {
                        Ok(event) => {
                            let ours = event.paths.iter().any(|p| p.file_name() == Some(file_name.as_os_str()));
                            if !ours {
                                continue;
                            }
                            match event.kind {
                                EventKind::Create(_) | EventKind::Modify(_) => {
                                    dirty_since = Some(Instant::now());
                                }
                                EventKind::Remove(_) => {
                                    dirty_since = None;
                                    if event_tx.send(ConfigEvent::Removed(target.clone())).is_err() {
                                        break;
                                    }
                                }
                                _ => {}
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            let settled = dirty_since.is_some_and(|t| t.elapsed() >= debounce);
                            if !settled {
                                continue;
                            }
                            dirty_since = None;
                            debug!(path = ?target, "config changed, reloading");
                            let event = match AppConfig::load(&target) {
                                Ok(config) => ConfigEvent::Reloaded(Box::new(config)),
                                Err(e) => ConfigEvent::Error(format!("Failed to load {:?}: {:#}", target, e)),
                            };
                            if event_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|e| anyhow!("Failed to spawn watcher thread: {}", e))?;

        Ok(Self {
            _watcher: watcher,
            event_receiver: event_rx,
            watched_path,
        })
    }

    /// Next pending event, if any
    pub fn try_recv(&self) -> Option<ConfigEvent> {
        self.event_receiver.try_recv().ok()
    }

    /// Drain all pending events
    pub fn recv_all(&self) -> Vec<ConfigEvent> {
        self.event_receiver.try_iter().collect()
    }

    pub fn watched_path(&self) -> &Path {
        &self.watched_path
    }
}

/// Load a config file and check that it converts into runtime settings
pub fn validate_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let config = AppConfig::load(path)?;
    config.studio_config()?;
    Ok(config)
}
