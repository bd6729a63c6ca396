use crate::{controller::FrameSink, error::TransportError, protocol::Frame};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{info, trace};

/// An open, scoped link to the device. Dropping it closes the port.
pub trait Connection: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), TransportError>;
}

/// Opens connections to the device on demand.
pub trait Transport: Send + Sync {
    fn open(&self) -> Result<Box<dyn Connection>, TransportError>;

    fn describe(&self) -> String;

    /// Open, write one frame, close. Nothing outlives the call.
    fn send_frame(&self, frame: &Frame) -> Result<(), TransportError> {
        let mut connection = self.open()?;
        connection.write_frame(frame)
    }
}

#[derive(Debug, Clone)]
pub struct SerialTransport {
    port: String,
    baud_rate: u32,
    timeout: Duration,
}

impl SerialTransport {
    pub fn new(port: impl Into<String>, baud_rate: u32, timeout: Duration) -> Self {
        SerialTransport {
            port: port.into(),
            baud_rate,
            timeout,
        }
    }
}

impl Transport for SerialTransport {
    fn open(&self) -> Result<Box<dyn Connection>, TransportError> {
        let port = serialport::new(self.port.as_str(), self.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(self.timeout)
            .open()
            .map_err(|source| TransportError::Open {
                port: self.port.clone(),
                source,
            })?;

        Ok(Box::new(SerialConnection {
            name: self.port.clone(),
            port,
        }))
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.port, self.baud_rate)
    }
}

struct SerialConnection {
    name: String,
    port: Box<dyn serialport::SerialPort>,
}

impl Connection for SerialConnection {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), TransportError> {
        self.port
            .write_all(frame.as_bytes())
            .and_then(|_| self.port.flush())
            .map_err(|source| TransportError::Write {
                port: self.name.clone(),
                source,
            })
    }
}

#[derive(Debug, Default)]
struct LoopbackState {
    frames: Vec<Frame>,
    offline: bool,
    opens: usize,
}

/// In-memory transport that records every frame written to it.
#[derive(Debug, Clone, Default)]
pub struct LoopbackTransport {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.state.lock().frames.clone()
    }

    /// While offline every open fails, like an unplugged adapter.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().opens
    }
}

impl Transport for LoopbackTransport {
    fn open(&self) -> Result<Box<dyn Connection>, TransportError> {
        let mut state = self.state.lock();
        if state.offline {
            return Err(TransportError::Unavailable {
                port: self.describe(),
            });
        }
        state.opens += 1;
        Ok(Box::new(LoopbackConnection {
            state: Arc::clone(&self.state),
        }))
    }

    fn describe(&self) -> String {
        "loopback".to_string()
    }
}

struct LoopbackConnection {
    state: Arc<Mutex<LoopbackState>>,
}

impl Connection for LoopbackConnection {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), TransportError> {
        info!(%frame, "loopback write");
        self.state.lock().frames.push(*frame);
        Ok(())
    }
}

/// Result of one frame write, reported back to the control loop.
#[derive(Debug)]
pub struct WriteOutcome {
    pub frame: Frame,
    pub result: Result<(), TransportError>,
}

/// Sending half of the writer queue; this is the controller's sink.
#[derive(Debug, Clone)]
pub struct FrameQueue {
    tx: mpsc::UnboundedSender<Frame>,
    // Frames queued or being written.
    unwritten: Arc<AtomicUsize>,
}

impl FrameQueue {
    pub fn unwritten(&self) -> usize {
        self.unwritten.load(Ordering::Acquire)
    }
}

impl FrameSink for FrameQueue {
    fn emit(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.unwritten.fetch_add(1, Ordering::AcqRel);
        self.tx.send(frame).map_err(|_| {
            self.unwritten.fetch_sub(1, Ordering::AcqRel);
            TransportError::Disconnected
        })
    }

    fn is_backlogged(&self) -> bool {
        self.unwritten() > 0
    }
}

/// Spawn the task that writes queued frames one at a time on the blocking
/// pool. It exits once every `FrameQueue` clone is dropped and the queue
/// is drained.
pub fn spawn_writer(
    transport: Arc<dyn Transport>,
) -> (FrameQueue, mpsc::UnboundedReceiver<WriteOutcome>, JoinHandle<()>) {
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<Frame>();
    let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
    let unwritten = Arc::new(AtomicUsize::new(0));
    let pending = Arc::clone(&unwritten);

    let handle = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            let transport = Arc::clone(&transport);
            let result = match tokio::task::spawn_blocking(move || transport.send_frame(&frame)).await {
                Ok(result) => result,
                Err(e) => Err(TransportError::Worker(e.to_string())),
            };
            pending.fetch_sub(1, Ordering::AcqRel);
            trace!(%frame, ok = result.is_ok(), "frame written");
            if outcome_tx.send(WriteOutcome { frame, result }).is_err() {
                break;
            }
        }
    });

    let queue = FrameQueue {
        tx: frame_tx,
        unwritten,
    };
    (queue, outcome_rx, handle)
}
