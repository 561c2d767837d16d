// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Gamepad polling.
//!
//! Hardware controllers are read through gilrs and reported in the standard
//! gamepad button order, so button 0 is the bottom face button and button 1
//! the right one. Most USB foot switches enumerate as one of these.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use gilrs::{Button, Gilrs};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::dispatcher::{InputDispatcher, LogicalAction};

/// A polled game controller
pub trait GamepadSource: Send {
    /// Current button states, indexed by button number. `None` when no
    /// controller is connected.
    fn poll(&mut self) -> Option<Vec<bool>>;
}

/// Standard gamepad button order
const STANDARD_BUTTONS: [Button; 17] = [
    Button::South,
    Button::East,
    Button::West,
    Button::North,
    Button::LeftTrigger,
    Button::RightTrigger,
    Button::LeftTrigger2,
    Button::RightTrigger2,
    Button::Select,
    Button::Start,
    Button::LeftThumb,
    Button::RightThumb,
    Button::DPadUp,
    Button::DPadDown,
    Button::DPadLeft,
    Button::DPadRight,
    Button::Mode,
];

/// How often the gilrs thread drains its event queue
const GILRS_REFRESH: Duration = Duration::from_millis(5);

type Snapshot = Arc<Mutex<Option<Vec<bool>>>>;

fn standard_buttons(pressed: impl Fn(Button) -> bool) -> Vec<bool> {
    STANDARD_BUTTONS.iter().map(|b| pressed(*b)).collect()
}

/// Game controllers and USB foot switches read through gilrs.
///
/// gilrs stays on its own thread; `poll` returns the first connected
/// controller's latest button states.
pub struct GilrsGamepad {
    state: Snapshot,
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl GilrsGamepad {
    /// Start the gilrs thread; fails when the platform has no gamepad backend
    pub fn open() -> Result<Self> {
        let state: Snapshot = Arc::new(Mutex::new(None));
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let thread = {
            let state = Arc::clone(&state);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("gamepad".into())
                .spawn(move || {
                    let mut gilrs = match Gilrs::new() {
                        Ok(gilrs) => {
                            let _ = ready_tx.send(Ok(()));
                            gilrs
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e.to_string()));
                            return;
                        }
                    };
                    for (_, pad) in gilrs.gamepads() {
                        info!(name = pad.name(), "gamepad found");
                    }

                    while !stop.load(Ordering::Acquire) {
                        while gilrs.next_event().is_some() {}
                        let snapshot = gilrs
                            .gamepads()
                            .next()
                            .map(|(_, pad)| standard_buttons(|b| pad.is_pressed(b)));
                        match state.lock() {
                            Ok(mut state) => *state = snapshot,
                            Err(_) => break,
                        }
                        thread::sleep(GILRS_REFRESH);
                    }
                })
                .context("failed to spawn gamepad thread")?
        };

        ready_rx
            .recv()
            .context("gamepad thread exited")?
            .map_err(|e| anyhow!("gamepad backend unavailable: {}", e))?;

        Ok(Self {
            state,
            stop,
            thread: Some(thread),
        })
    }

    #[cfg(test)]
    fn from_snapshot(state: Snapshot) -> Self {
        Self {
            state,
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

impl GamepadSource for GilrsGamepad {
    fn poll(&mut self) -> Option<Vec<bool>> {
        self.state.lock().ok().and_then(|state| state.clone())
    }
}

impl Drop for GilrsGamepad {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Polls a [`GamepadSource`] on a fixed cadence and forwards press edges
pub struct GamepadPoller {
    task: JoinHandle<()>,
}

impl GamepadPoller {
    /// Start polling on the current tokio runtime
    pub fn spawn<F>(
        mut source: Box<dyn GamepadSource>,
        dispatcher: Arc<Mutex<InputDispatcher>>,
        period: Duration,
        mut on_action: F,
    ) -> Self
    where
        F: FnMut(LogicalAction) + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut ticker = interval(period.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut connected = false;

            loop {
                ticker.tick().await;

                let fired = match source.poll() {
                    Some(buttons) => {
                        if !connected {
                            debug!("gamepad connected");
                            connected = true;
                        }
                        match dispatcher.lock() {
                            Ok(mut d) => d.gamepad_poll(&buttons, Instant::now()),
                            Err(_) => break,
                        }
                    }
                    None => {
                        if connected {
                            debug!("gamepad disconnected");
                            connected = false;
                            if let Ok(mut d) = dispatcher.lock() {
                                d.gamepad_disconnected();
                            }
                        }
                        Vec::new()
                    }
                };

                for action in fired {
                    on_action(action);
                }
            }
        });

        Self { task }
    }

    /// Stop polling
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for GamepadPoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::PedalBinding;
    use std::collections::VecDeque;

    /// Replays a fixed sequence of button states, then reports disconnected
    struct Scripted(VecDeque<Option<Vec<bool>>>);

    impl GamepadSource for Scripted {
        fn poll(&mut self) -> Option<Vec<bool>> {
            self.0.pop_front().flatten()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_forwards_press_edges() {
        let script = Scripted(VecDeque::from(vec![
            Some(vec![true, false]),
            Some(vec![true, false]),
            Some(vec![false, false]),
            None,
            Some(vec![false, true]),
            Some(vec![true, true]),
        ]));
        let dispatcher = Arc::new(Mutex::new(InputDispatcher::new(PedalBinding::default(), Duration::ZERO)));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let poller = GamepadPoller::spawn(Box::new(script), dispatcher, Duration::from_millis(50), move |a| {
            let _ = tx.send(a);
        });

        tokio::time::sleep(Duration::from_millis(500)).await;
        poller.stop();

        let mut got = Vec::new();
        while let Ok(a) = rx.try_recv() {
            got.push(a);
        }
        assert_eq!(got, vec![LogicalAction::Left, LogicalAction::Right, LogicalAction::Left]);
    }

    #[test]
    fn test_standard_button_order() {
        let south = standard_buttons(|b| b == Button::South);
        assert_eq!(south.len(), 17);
        assert!(south[0]);
        assert_eq!(south.iter().filter(|p| **p).count(), 1);

        let east = standard_buttons(|b| b == Button::East);
        assert!(east[1]);
        assert!(!east[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gilrs_gamepad_feeds_poller() {
        let state: Snapshot = Arc::new(Mutex::new(None));
        let pad = GilrsGamepad::from_snapshot(Arc::clone(&state));
        let dispatcher = Arc::new(Mutex::new(InputDispatcher::new(PedalBinding::default(), Duration::ZERO)));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let poller = GamepadPoller::spawn(Box::new(pad), dispatcher, Duration::from_millis(10), move |a| {
            let _ = tx.send(a);
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        *state.lock().unwrap() = Some(standard_buttons(|b| b == Button::East));
        tokio::time::sleep(Duration::from_millis(30)).await;
        *state.lock().unwrap() = Some(standard_buttons(|_| false));
        tokio::time::sleep(Duration::from_millis(30)).await;
        *state.lock().unwrap() = Some(standard_buttons(|b| b == Button::South));
        tokio::time::sleep(Duration::from_millis(30)).await;
        poller.stop();

        let mut got = Vec::new();
        while let Ok(a) = rx.try_recv() {
            got.push(a);
        }
        assert_eq!(got, vec![LogicalAction::Right, LogicalAction::Left]);
    }
}
