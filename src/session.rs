use crate::{
    config::{Directory, Settings},
    controller::{ControllerState, MotionController},
    error::ConfigError,
    transport::{spawn_writer, FrameQueue, Transport, WriteOutcome},
    types::{Direction, Speed},
};
use futures::stream::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

/// Events the input layer feeds into the control loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    Press(Direction),
    Release(Direction),
    StopAll,
    IncreaseSpeed,
    DecreaseSpeed,
    SetSpeed(u8),
    SetHoldMode(bool),
    ToggleHoldMode,
    SelectGimbal(String),
    Quit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub events: u64,
    pub rejected: u64,
    pub frames_sent: u64,
    pub frames_failed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub stats: SessionStats,
    pub gimbal: String,
    pub final_state: ControllerState,
}

// Failed writes only count; the controller's intent is left alone.
fn record(stats: &mut SessionStats, outcome: WriteOutcome) {
    match outcome.result {
        Ok(()) => stats.frames_sent += 1,
        Err(e) => {
            stats.frames_failed += 1;
            warn!(error = %e, frame = %outcome.frame, "frame not delivered");
        }
    }
}

/// Owns the controller and runs the single control loop: input events,
/// repeat timer ticks and write outcomes are all handled on one task.
pub struct Session {
    controller: MotionController<FrameQueue>,
    directory: Directory,
    gimbal: String,
    outcomes: mpsc::UnboundedReceiver<WriteOutcome>,
    writer: JoinHandle<()>,
    stats: SessionStats,
}

impl Session {
    /// Must be called from within a tokio runtime; spawns the frame writer.
    pub fn start(
        settings: &Settings,
        directory: Directory,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        let (gimbal, address) = directory.initial(settings.default_gimbal.as_deref())?;
        info!(
            transport = %transport.describe(),
            %gimbal,
            %address,
            hold_mode = settings.hold_mode,
            "starting session"
        );

        let (queue, outcomes, writer) = spawn_writer(transport);
        let controller = MotionController::new(queue, settings.controller_options(address));

        Ok(Session {
            controller,
            directory,
            gimbal,
            outcomes,
            writer,
            stats: SessionStats::default(),
        })
    }

    /// Run until the event stream ends or a `Quit` arrives. Motion is
    /// stopped and every queued frame is written before this returns.
    pub async fn run<St>(mut self, events: St) -> SessionReport
    where
        St: Stream<Item = ControlEvent>,
    {
        futures::pin_mut!(events);

        loop {
            let deadline = self.controller.next_deadline();
            tokio::select! {
                biased;

                event = events.next() => match event {
                    Some(ControlEvent::Quit) | None => break,
                    Some(event) => self.handle(event),
                },
                Some(outcome) = self.outcomes.recv() => record(&mut self.stats, outcome),
                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.controller.fire_due_timers();
                }
            }
        }

        self.shutdown().await
    }

    fn handle(&mut self, event: ControlEvent) {
        self.stats.events += 1;
        debug!(?event, "control event");

        match event {
            ControlEvent::Press(direction) => self.controller.press(direction),
            ControlEvent::Release(direction) => self.controller.release(direction),
            ControlEvent::StopAll => self.controller.stop_all(),
            ControlEvent::IncreaseSpeed => {
                self.controller.increase_speed();
            }
            ControlEvent::DecreaseSpeed => {
                self.controller.decrease_speed();
            }
            ControlEvent::SetSpeed(value) => {
                self.controller.set_speed(Speed::new(value));
            }
            ControlEvent::SetHoldMode(enabled) => self.controller.set_hold_mode(enabled),
            ControlEvent::ToggleHoldMode => {
                let enabled = !self.controller.hold_mode();
                self.controller.set_hold_mode(enabled);
            }
            ControlEvent::SelectGimbal(name) => match self.directory.lookup(&name) {
                Ok(address) => {
                    self.controller.select_gimbal(address);
                    self.gimbal = name;
                }
                Err(e) => {
                    warn!(error = %e, "gimbal selection rejected");
                    self.stats.rejected += 1;
                }
            },
            ControlEvent::Quit => {}
        }
    }

    async fn shutdown(self) -> SessionReport {
        let Session {
            mut controller,
            gimbal,
            mut outcomes,
            writer,
            mut stats,
            ..
        } = self;

        controller.stop_all();
        let final_state = controller.state();
        // Dropping the queue lets the writer drain and exit.
        drop(controller);

        if let Err(e) = writer.await {
            warn!(error = %e, "frame writer ended abnormally");
        }
        while let Some(outcome) = outcomes.recv().await {
            record(&mut stats, outcome);
        }

        info!(
            events = stats.events,
            sent = stats.frames_sent,
            failed = stats.frames_failed,
            "session finished"
        );

        SessionReport {
            stats,
            gimbal,
            final_state,
        }
    }
}
