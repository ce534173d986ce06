use crate::engine::Renderer;
use crate::model::request::{SynthesisRequest, Timeline};
use anyhow::bail;
use log::{debug, info, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const MAX_SLEEP_CHUNK_S: f64 = 0.050;

enum ControlMsg {
    Stop,
}

/// Dispatches a timeline's requests to a renderer on a worker thread, each at its start offset.
#[derive(Debug)]
pub struct Player<R: Renderer> {
    delay: u64,
    verbose: bool,
    renderer: Arc<R>,
    schedule: Mutex<Vec<SynthesisRequest>>,
    control_tx: Mutex<Option<Sender<ControlMsg>>>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<R: Renderer + 'static> Player<R> {
    pub fn new(renderer: R, verbose: bool, delay: u64) -> Self {
        Self {
            delay,
            verbose,
            renderer: Arc::new(renderer),
            schedule: Mutex::new(Vec::new()),
            control_tx: Mutex::new(None),
            worker_handle: Mutex::new(None),
        }
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn load_timeline(&self, timeline: Timeline) -> anyhow::Result<()> {
        let mut requests = timeline.requests;
        requests.sort_by(|a, b| a.start_offset_seconds.total_cmp(&b.start_offset_seconds));

        let Ok(mut schedule_lock) = self.schedule.lock() else {
            bail!("Failed to lock the schedule..!");
        };
        *schedule_lock = requests;

        info!(
            "Loaded timeline with {} requests over {:.3}s at {} bpm..!",
            schedule_lock.len(),
            timeline.total_seconds,
            timeline.bpm
        );

        Ok(())
    }

    pub fn is_playing(&self) -> bool {
        match self.worker_handle.lock() {
            Ok(guard) => guard.as_ref().is_some_and(|handle| !handle.is_finished()),
            Err(_) => false,
        }
    }

    pub fn play(&self, join: bool) -> anyhow::Result<()> {
        {
            let Ok(mut guard) = self.worker_handle.lock() else {
                bail!("Failed to lock worker handle..!")
            };

            if let Some(handle) = guard.take() {
                if !handle.is_finished() {
                    *guard = Some(handle);
                    bail!("Playback already running..!")
                }
                if handle.join().is_err() {
                    warn!("Previous playback thread panicked..!");
                }
                debug!("Reaped finished playback thread..!");
            }
        }

        let Ok(schedule) = self.schedule.lock() else {
            bail!("Failed to lock schedule..!")
        };

        let schedule = schedule.clone();

        if schedule.is_empty() {
            bail!("No timeline loaded..!")
        }

        let renderer = Arc::clone(&self.renderer);
        let (tx, rx) = mpsc::channel::<ControlMsg>();

        {
            let Ok(mut ctl) = self.control_tx.lock() else {
                bail!("Failed to lock control_tx..!")
            };

            *ctl = Some(tx);
        }

        let delay = self.delay;
        let verbose = self.verbose;
        let handle = thread::spawn(move || {
            run_schedule(renderer.as_ref(), schedule, rx, delay, verbose);
        });

        if join {
            let joined = handle.join();

            if let Ok(mut ctl) = self.control_tx.lock() {
                ctl.take();
            }

            if joined.is_err() {
                bail!("Playback thread panicked..!")
            }
        } else {
            let Ok(mut wh) = self.worker_handle.lock() else {
                bail!("Failed to lock worker handle..!")
            };

            *wh = Some(handle);
        }

        Ok(())
    }

    /// Drops every request not yet dispatched and silences the renderer.
    /// Calling it with nothing playing does nothing.
    pub fn stop(&self) -> anyhow::Result<()> {
        let tx = {
            let Ok(mut lock) = self.control_tx.lock() else {
                bail!("Failed to lock control_tx..!")
            };
            lock.take()
        };

        let Some(tx) = tx else {
            debug!("No worker is running playback, nothing to stop..!");
            return Ok(());
        };

        let _ = tx.send(ControlMsg::Stop);

        let handle = {
            let Ok(mut lock) = self.worker_handle.lock() else {
                bail!("Failed to lock worker_handle..!")
            };
            lock.take()
        };

        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Playback thread panicked..!");
            } else {
                debug!("Playback thread joined..!");
            }
        }

        self.renderer.stop_all()?;
        info!("Stopped playback..!");

        Ok(())
    }
}

fn stop_requested(ctrl_rx: &Receiver<ControlMsg>) -> bool {
    matches!(ctrl_rx.try_recv(), Ok(ControlMsg::Stop))
}

fn run_schedule<R: Renderer>(
    renderer: &R,
    schedule: Vec<SynthesisRequest>,
    ctrl_rx: Receiver<ControlMsg>,
    delay: u64,
    verbose: bool,
) {
    let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);

    info!(
        "Starting playback {}..!",
        if delay > 0 {
            format!("in {} seconds", delay)
        } else {
            "now".to_owned()
        }
    );

    if delay > 0 {
        let Some(until) = Instant::now().checked_add(Duration::from_secs(delay)) else {
            warn!("Start delay of {} seconds is out of range..!", delay);
            return;
        };
        if !wait_until(&sleeper, &ctrl_rx, until) {
            warn!("Playback stopped during start delay..!");
            return;
        }
    }

    let start = Instant::now();
    let total = schedule.len();

    for (dispatched, request) in schedule.into_iter().enumerate() {
        let Some(target) = Duration::try_from_secs_f64(request.start_offset_seconds.max(0.0))
            .ok()
            .and_then(|offset| start.checked_add(offset))
        else {
            warn!(
                "Start offset {}s of {} is out of range, skipping..!",
                request.start_offset_seconds, request.label
            );
            continue;
        };

        if !wait_until(&sleeper, &ctrl_rx, target) {
            warn!(
                "Playback stopped after {:.3} seconds, dropping {} pending requests..!",
                start.elapsed().as_secs_f64(),
                total - dispatched
            );
            return;
        }

        let emitted_at_ms = start.elapsed().as_secs_f64() * 1000.0;

        if verbose {
            let info = format!("Rendering {} ", request.label);
            info!(
                "{:30} | at {:>13.3}ms | scheduled for: {:>13.3}ms | duration: {:>9.3}ms",
                info,
                emitted_at_ms,
                request.start_offset_seconds * 1000.0,
                request.duration_seconds * 1000.0
            );
        }

        if let Err(why) = renderer.render(&request) {
            warn!(
                "Render error for {} at {:.3}ms | why: {:?}",
                request.label, emitted_at_ms, why
            );
        }
    }

    info!("Playback thread finished all requests..!");
}

/// Sleeps until `target` in short chunks; false if a stop arrived first.
fn wait_until(sleeper: &SpinSleeper, ctrl_rx: &Receiver<ControlMsg>, target: Instant) -> bool {
    loop {
        if stop_requested(ctrl_rx) {
            return false;
        }

        let now = Instant::now();
        if now >= target {
            return true;
        }

        let remaining = (target - now).as_secs_f64();
        sleeper.sleep(Duration::from_secs_f64(remaining.min(MAX_SLEEP_CHUNK_S)));
    }
}
