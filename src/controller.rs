use crate::{
    constants::REPEAT_INTERVAL_MS,
    error::TransportError,
    protocol::{Command, Frame},
    types::{Address, Axis, DiagonalMode, Direction, PanDirection, Speed, TiltDirection},
};
use std::collections::HashMap;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Where the controller hands finished frames.
pub trait FrameSink {
    fn emit(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// True while earlier frames are still waiting to be written.
    fn is_backlogged(&self) -> bool {
        false
    }
}

impl FrameSink for Vec<Frame> {
    fn emit(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.push(frame);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Repeat timer armed for one held direction. Cancelling a timer means
/// removing it from the hold registry, after which it can never fire.
#[derive(Debug, Clone, Copy)]
struct RepeatTimer {
    id: TimerId,
    due: Instant,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub address: Address,
    pub speed: Speed,
    pub hold_mode: bool,
    pub diagonal: DiagonalMode,
    pub repeat_interval: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        ControllerOptions {
            address: Address(1),
            speed: Speed::default(),
            hold_mode: true,
            diagonal: DiagonalMode::default(),
            repeat_interval: Duration::from_millis(REPEAT_INTERVAL_MS),
        }
    }
}

/// Snapshot of what the controller intends the gimbal to be doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerState {
    pub address: Address,
    pub speed: Speed,
    pub hold_mode: bool,
    pub active_pan: Option<PanDirection>,
    pub active_tilt: Option<TiltDirection>,
    pub held: Vec<Direction>,
}

impl ControllerState {
    pub fn is_idle(&self) -> bool {
        self.active_pan.is_none() && self.active_tilt.is_none() && self.held.is_empty()
    }
}

/// Turns press/release, speed and mode events into a stream of frames.
///
/// The controller never touches time-driven I/O itself: the owner polls
/// `next_deadline` and calls `fire_due_timers` from the same loop that
/// delivers input events, so no locking is needed.
pub struct MotionController<S> {
    sink: S,
    address: Address,
    speed: Speed,
    hold_mode: bool,
    diagonal: DiagonalMode,
    repeat_interval: Duration,
    active_pan: Option<PanDirection>,
    active_tilt: Option<TiltDirection>,
    holds: HashMap<Direction, RepeatTimer>,
    next_timer: u64,
}

impl<S: FrameSink> MotionController<S> {
    pub fn new(sink: S, options: ControllerOptions) -> Self {
        MotionController {
            sink,
            address: options.address,
            speed: options.speed,
            hold_mode: options.hold_mode,
            diagonal: options.diagonal,
            repeat_interval: options.repeat_interval,
            active_pan: None,
            active_tilt: None,
            holds: HashMap::new(),
            next_timer: 0,
        }
    }

    pub fn press(&mut self, direction: Direction) {
        if !self.hold_mode {
            self.one_shot(direction);
            return;
        }

        if self.holds.contains_key(&direction) {
            trace!(%direction, "already held");
            return;
        }

        match direction {
            Direction::Stop => self.stop_all(),
            _ => {
                // A motion press cancels a held stop.
                if self.holds.remove(&Direction::Stop).is_some() {
                    debug!("held stop superseded");
                }
                if let Some(pan) = direction.pan() {
                    self.active_pan = Some(pan);
                }
                if let Some(tilt) = direction.tilt() {
                    self.active_tilt = Some(tilt);
                }
                self.send_motion(direction);
            }
        }

        let timer = self.arm_timer();
        self.holds.insert(direction, timer);
        debug!(%direction, timer = timer.id.0, "hold started");
    }

    pub fn release(&mut self, direction: Direction) {
        if !self.hold_mode {
            trace!(%direction, "release ignored outside hold mode");
            return;
        }

        if let Some(timer) = self.holds.remove(&direction) {
            debug!(%direction, timer = timer.id.0, "hold released");
        }

        match direction.axis() {
            Some(Axis::Pan) if self.active_pan.map(Direction::from) == Some(direction) => {
                self.active_pan = None;
                self.send(Command::Stop);
                // A stop halts both axes; resume tilt if it is still held.
                if let Some(tilt) = self.active_tilt {
                    self.send_motion(tilt.into());
                }
            }
            Some(Axis::Tilt) if self.active_tilt.map(Direction::from) == Some(direction) => {
                self.active_tilt = None;
                self.send(Command::Stop);
                if let Some(pan) = self.active_pan {
                    self.send_motion(pan.into());
                }
            }
            _ => {}
        }
    }

    pub fn stop_all(&mut self) {
        let cancelled = self.holds.len();
        self.holds.clear();
        self.active_pan = None;
        self.active_tilt = None;
        debug!(cancelled, "stopping all motion");
        self.send(Command::Stop);
    }

    pub fn increase_speed(&mut self) -> Speed {
        self.set_speed(self.speed.increment())
    }

    pub fn decrease_speed(&mut self) -> Speed {
        self.set_speed(self.speed.decrement())
    }

    /// Change speed and push it to any active axis right away.
    pub fn set_speed(&mut self, speed: Speed) -> Speed {
        if speed != self.speed {
            self.speed = speed;
            debug!(%speed, "speed changed");
            self.refresh_motion();
        }
        self.speed
    }

    pub fn set_hold_mode(&mut self, enabled: bool) {
        if enabled == self.hold_mode {
            return;
        }
        if !self.holds.is_empty() || self.active_pan.is_some() || self.active_tilt.is_some() {
            self.stop_all();
        }
        self.hold_mode = enabled;
        info!(enabled, "hold mode changed");
    }

    /// Applies to the next emitted frame, armed timers included.
    pub fn select_gimbal(&mut self, address: Address) {
        if address != self.address {
            self.address = address;
            info!(%address, "gimbal selected");
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.holds.values().map(|timer| timer.due).min()
    }

    /// Re-emit the command of every hold whose timer is due. Returns the
    /// number of timers that fired.
    ///
    /// While the sink is still busy with earlier frames the timers are
    /// rescheduled without emitting, so repeats never pile up behind a slow
    /// link.
    pub fn fire_due_timers(&mut self) -> usize {
        let now = Instant::now();
        let backlogged = self.sink.is_backlogged();
        let mut due: Vec<(Instant, TimerId, Direction)> = self
            .holds
            .iter()
            .filter(|(_, timer)| timer.due <= now)
            .map(|(direction, timer)| (timer.due, timer.id, *direction))
            .collect();
        due.sort();

        for &(_, _, direction) in &due {
            if let Some(timer) = self.holds.get_mut(&direction) {
                timer.due += self.repeat_interval;
                // Skip missed ticks instead of bursting to catch up
                if timer.due <= now {
                    timer.due = now + self.repeat_interval;
                }
            }
            if backlogged {
                trace!(%direction, "repeat skipped, writer busy");
            } else if !self.folded_into_pan(direction) {
                self.send_motion(direction);
            }
        }

        due.len()
    }

    pub fn state(&self) -> ControllerState {
        let mut held: Vec<Direction> = self.holds.keys().copied().collect();
        held.sort();
        ControllerState {
            address: self.address,
            speed: self.speed,
            hold_mode: self.hold_mode,
            active_pan: self.active_pan,
            active_tilt: self.active_tilt,
            held,
        }
    }

    pub fn speed(&self) -> Speed {
        self.speed
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn hold_mode(&self) -> bool {
        self.hold_mode
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    fn one_shot(&mut self, direction: Direction) {
        match direction {
            Direction::Stop => self.stop_all(),
            _ => self.send(Command::for_direction(direction, self.speed)),
        }
    }

    fn refresh_motion(&mut self) {
        if let Some(pan) = self.active_pan {
            self.send_motion(pan.into());
        }
        if let Some(tilt) = self.active_tilt {
            if !self.folded_into_pan(tilt.into()) {
                self.send_motion(tilt.into());
            }
        }
    }

    /// In combined mode the active tilt rides on the pan emission.
    fn folded_into_pan(&self, direction: Direction) -> bool {
        self.diagonal == DiagonalMode::Combined
            && self.active_pan.is_some()
            && self.active_tilt.map(Direction::from) == Some(direction)
    }

    fn command_for(&self, direction: Direction) -> Command {
        if self.diagonal == DiagonalMode::Combined {
            if let (Some(pan), Some(tilt)) = (self.active_pan, self.active_tilt) {
                if direction == Direction::from(pan) || direction == Direction::from(tilt) {
                    return Command::Diagonal(pan, tilt, self.speed);
                }
            }
        }
        Command::for_direction(direction, self.speed)
    }

    fn send_motion(&mut self, direction: Direction) {
        let command = self.command_for(direction);
        self.send(command);
    }

    fn send(&mut self, command: Command) {
        let frame = command.to_frame(self.address);
        trace!(%frame, ?command, "emitting frame");
        // Intended state stays as-is on failure; the next tick retries.
        if let Err(e) = self.sink.emit(frame) {
            warn!(error = %e, %frame, "failed to emit frame");
        }
    }

    fn arm_timer(&mut self) -> RepeatTimer {
        self.next_timer += 1;
        RepeatTimer {
            id: TimerId(self.next_timer),
            due: Instant::now() + self.repeat_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{pan_left, pan_right, stop, tilt_down, tilt_up};

    const ADDR: Address = Address(5);

    fn controller() -> MotionController<Vec<Frame>> {
        MotionController::new(
            Vec::new(),
            ControllerOptions {
                address: ADDR,
                ..ControllerOptions::default()
            },
        )
    }

    fn drain(controller: &mut MotionController<Vec<Frame>>) -> Vec<Frame> {
        std::mem::take(controller.sink_mut())
    }

    struct FailingSink {
        attempts: usize,
    }

    impl FrameSink for FailingSink {
        fn emit(&mut self, _frame: Frame) -> Result<(), TransportError> {
            self.attempts += 1;
            Err(TransportError::Unavailable {
                port: "test".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct BusySink {
        frames: Vec<Frame>,
        busy: bool,
    }

    impl FrameSink for BusySink {
        fn emit(&mut self, frame: Frame) -> Result<(), TransportError> {
            self.frames.push(frame);
            Ok(())
        }

        fn is_backlogged(&self) -> bool {
            self.busy
        }
    }

    #[tokio::test(start_paused = true)]
    async fn press_emits_then_repeats_every_tick() {
        let mut c = controller();
        let speed = c.speed();
        c.press(Direction::PanLeft);
        assert_eq!(drain(&mut c), vec![pan_left(ADDR, speed)]);

        for _ in 0..3 {
            tokio::time::advance(Duration::from_millis(100)).await;
            assert_eq!(c.fire_due_timers(), 1);
        }
        assert_eq!(drain(&mut c), vec![pan_left(ADDR, speed); 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_does_not_fire_early() {
        let mut c = controller();
        c.press(Direction::TiltUp);
        drain(&mut c);

        tokio::time::advance(Duration::from_millis(99)).await;
        assert_eq!(c.fire_due_timers(), 0);
        assert!(drain(&mut c).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn double_press_arms_one_timer() {
        let mut c = controller();
        c.press(Direction::PanLeft);
        c.press(Direction::PanLeft);
        assert_eq!(drain(&mut c).len(), 1);

        tokio::time::advance(Duration::from_millis(100)).await;
        c.fire_due_timers();
        assert_eq!(drain(&mut c).len(), 1);
    }

    #[test]
    fn release_of_other_axis_resumes_held_tilt() {
        let mut c = controller();
        let speed = c.speed();
        c.press(Direction::TiltUp);
        c.press(Direction::PanLeft);
        drain(&mut c);

        c.release(Direction::PanLeft);
        assert_eq!(drain(&mut c), vec![stop(ADDR), tilt_up(ADDR, speed)]);
        assert_eq!(c.state().active_tilt, Some(TiltDirection::Up));
        assert_eq!(c.state().active_pan, None);
    }

    #[test]
    fn release_without_other_axis_only_stops() {
        let mut c = controller();
        c.press(Direction::PanRight);
        drain(&mut c);

        c.release(Direction::PanRight);
        assert_eq!(drain(&mut c), vec![stop(ADDR)]);
        assert!(c.state().is_idle());
    }

    #[test]
    fn release_of_tilt_resumes_pan() {
        let mut c = controller();
        let speed = c.speed();
        c.press(Direction::PanRight);
        c.press(Direction::TiltDown);
        drain(&mut c);

        c.release(Direction::TiltDown);
        assert_eq!(drain(&mut c), vec![stop(ADDR), pan_right(ADDR, speed)]);
    }

    #[test]
    fn releasing_a_superseded_direction_does_not_stop() {
        let mut c = controller();
        c.press(Direction::PanLeft);
        c.press(Direction::PanRight);
        drain(&mut c);

        c.release(Direction::PanLeft);
        assert!(drain(&mut c).is_empty());
        assert_eq!(c.state().active_pan, Some(PanDirection::Right));
        assert_eq!(c.state().held, vec![Direction::PanRight]);
    }

    #[test]
    fn release_of_idle_key_is_harmless() {
        let mut c = controller();
        c.release(Direction::TiltUp);
        assert!(drain(&mut c).is_empty());
        assert!(c.state().is_idle());
    }

    #[test]
    fn stop_all_clears_everything() {
        let mut c = controller();
        c.press(Direction::PanLeft);
        c.press(Direction::TiltDown);
        drain(&mut c);

        c.stop_all();
        assert_eq!(drain(&mut c), vec![stop(ADDR)]);
        assert!(c.state().is_idle());
        assert_eq!(c.next_deadline(), None);

        c.stop_all();
        assert_eq!(drain(&mut c), vec![stop(ADDR)]);
        assert!(c.state().is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn pressing_stop_halts_and_repeats_stop() {
        let mut c = controller();
        c.press(Direction::PanLeft);
        drain(&mut c);

        c.press(Direction::Stop);
        assert_eq!(drain(&mut c), vec![stop(ADDR)]);
        assert_eq!(c.state().held, vec![Direction::Stop]);
        assert_eq!(c.state().active_pan, None);

        tokio::time::advance(Duration::from_millis(100)).await;
        c.fire_due_timers();
        assert_eq!(drain(&mut c), vec![stop(ADDR)]);

        c.release(Direction::Stop);
        assert!(drain(&mut c).is_empty());
        assert!(c.state().is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn motion_press_supersedes_held_stop() {
        let mut c = controller();
        let speed = c.speed();
        c.press(Direction::Stop);
        c.press(Direction::TiltUp);
        assert_eq!(drain(&mut c), vec![stop(ADDR), tilt_up(ADDR, speed)]);
        assert_eq!(c.state().held, vec![Direction::TiltUp]);

        for _ in 0..3 {
            tokio::time::advance(Duration::from_millis(100)).await;
            assert_eq!(c.fire_due_timers(), 1);
        }
        assert_eq!(drain(&mut c), vec![tilt_up(ADDR, speed); 3]);

        c.release(Direction::Stop);
        assert!(drain(&mut c).is_empty());
        assert_eq!(c.state().active_tilt, Some(TiltDirection::Up));
    }

    #[test]
    fn speed_change_refreshes_active_axes() {
        let mut c = controller();
        c.set_speed(Speed::new(10));
        assert!(drain(&mut c).is_empty());

        c.press(Direction::PanLeft);
        c.press(Direction::TiltUp);
        drain(&mut c);

        assert_eq!(c.increase_speed(), Speed::new(11));
        assert_eq!(
            drain(&mut c),
            vec![pan_left(ADDR, Speed::new(11)), tilt_up(ADDR, Speed::new(11))]
        );

        assert_eq!(c.decrease_speed(), Speed::new(10));
        assert_eq!(drain(&mut c).len(), 2);
    }

    #[test]
    fn speed_at_bounds_does_not_reemit() {
        let mut c = controller();
        c.set_speed(Speed::MAX);
        c.press(Direction::TiltDown);
        drain(&mut c);

        assert_eq!(c.increase_speed(), Speed::MAX);
        assert!(drain(&mut c).is_empty());

        c.set_speed(Speed::MIN);
        drain(&mut c);
        assert_eq!(c.decrease_speed(), Speed::MIN);
        assert!(drain(&mut c).is_empty());
        assert_eq!(c.state().active_tilt, Some(TiltDirection::Down));
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_use_current_speed_and_address() {
        let mut c = controller();
        c.press(Direction::TiltDown);
        drain(&mut c);

        c.select_gimbal(Address(9));
        c.set_speed(Speed::new(50));
        assert_eq!(drain(&mut c), vec![tilt_down(Address(9), Speed::new(50))]);

        tokio::time::advance(Duration::from_millis(100)).await;
        c.fire_due_timers();
        assert_eq!(drain(&mut c), vec![tilt_down(Address(9), Speed::new(50))]);
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_mode_never_arms_timers() {
        let mut c = controller();
        c.set_hold_mode(false);
        c.press(Direction::PanRight);
        assert_eq!(drain(&mut c), vec![pan_right(ADDR, c.speed())]);
        assert!(c.state().is_idle());
        assert_eq!(c.next_deadline(), None);

        c.release(Direction::PanRight);
        tokio::time::advance(Duration::from_millis(500)).await;
        c.fire_due_timers();
        assert!(drain(&mut c).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn mode_toggle_mid_hold_cancels_timers() {
        let mut c = controller();
        c.press(Direction::PanLeft);
        c.press(Direction::TiltUp);
        drain(&mut c);

        c.set_hold_mode(false);
        assert_eq!(drain(&mut c), vec![stop(ADDR)]);
        assert!(c.state().is_idle());

        for _ in 0..5 {
            tokio::time::advance(Duration::from_millis(100)).await;
            assert_eq!(c.fire_due_timers(), 0);
        }
        assert!(drain(&mut c).is_empty());
    }

    #[test]
    fn mode_toggle_while_idle_is_silent() {
        let mut c = controller();
        c.set_hold_mode(false);
        c.set_hold_mode(true);
        assert!(drain(&mut c).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn release_cancels_a_due_tick() {
        let mut c = controller();
        c.press(Direction::PanLeft);
        drain(&mut c);

        // The tick is already due when the release arrives.
        tokio::time::advance(Duration::from_millis(150)).await;
        c.release(Direction::PanLeft);
        assert_eq!(c.fire_due_timers(), 0);
        assert_eq!(drain(&mut c), vec![stop(ADDR)]);
    }

    #[test]
    fn combined_mode_sends_diagonal_frames() {
        let mut c = MotionController::new(
            Vec::new(),
            ControllerOptions {
                address: ADDR,
                diagonal: DiagonalMode::Combined,
                ..ControllerOptions::default()
            },
        );
        let speed = c.speed();
        c.press(Direction::PanLeft);
        c.press(Direction::TiltUp);
        let diagonal = Command::Diagonal(PanDirection::Left, TiltDirection::Up, speed).to_frame(ADDR);
        assert_eq!(drain(&mut c), vec![pan_left(ADDR, speed), diagonal]);

        c.increase_speed();
        let faster = Command::Diagonal(PanDirection::Left, TiltDirection::Up, speed.increment())
            .to_frame(ADDR);
        assert_eq!(drain(&mut c), vec![faster]);

        c.release(Direction::TiltUp);
        assert_eq!(drain(&mut c), vec![stop(ADDR), pan_left(ADDR, speed.increment())]);
    }

    #[tokio::test(start_paused = true)]
    async fn combined_mode_ticks_send_one_diagonal_frame() {
        let mut c = MotionController::new(
            Vec::new(),
            ControllerOptions {
                address: ADDR,
                diagonal: DiagonalMode::Combined,
                ..ControllerOptions::default()
            },
        );
        let speed = c.speed();
        c.press(Direction::PanRight);
        c.press(Direction::TiltDown);
        drain(&mut c);

        // Both timers fire, one frame goes out.
        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(c.fire_due_timers(), 2);
        let diagonal = Command::Diagonal(PanDirection::Right, TiltDirection::Down, speed).to_frame(ADDR);
        assert_eq!(drain(&mut c), vec![diagonal]);

        c.release(Direction::PanRight);
        drain(&mut c);
        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(c.fire_due_timers(), 1);
        assert_eq!(drain(&mut c), vec![tilt_down(ADDR, speed)]);
    }

    #[tokio::test(start_paused = true)]
    async fn busy_sink_skips_repeats_but_not_release() {
        let mut c = MotionController::new(
            BusySink::default(),
            ControllerOptions {
                address: ADDR,
                ..ControllerOptions::default()
            },
        );
        let speed = c.speed();
        c.press(Direction::PanLeft);
        c.press(Direction::TiltUp);
        c.sink_mut().busy = true;

        for _ in 0..5 {
            tokio::time::advance(Duration::from_millis(100)).await;
            assert_eq!(c.fire_due_timers(), 2);
        }
        assert_eq!(c.sink().frames.len(), 2);

        c.release(Direction::PanLeft);
        assert_eq!(
            c.sink().frames[2..].to_vec(),
            vec![stop(ADDR), tilt_up(ADDR, speed)]
        );

        c.sink_mut().busy = false;
        tokio::time::advance(Duration::from_millis(100)).await;
        c.fire_due_timers();
        assert_eq!(c.sink().frames.last(), Some(&tilt_up(ADDR, speed)));
        assert_eq!(c.sink().frames.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_leaves_state_untouched() {
        let mut c = MotionController::new(FailingSink { attempts: 0 }, ControllerOptions::default());
        c.press(Direction::PanLeft);
        c.press(Direction::TiltUp);
        let before = c.state();

        tokio::time::advance(Duration::from_millis(100)).await;
        c.fire_due_timers();
        assert_eq!(c.state(), before);
        assert_eq!(c.sink().attempts, 4);
    }
}
