//! STM IR block backend.
//!
//! [`StmLirc`] owns the register interface, the receive and transmit state
//! and a ring buffer of timing records. It registers on minor 0 as a mode2
//! receiver with its own buffer, a custom `write` (transmit) and a custom
//! `ioctl`. Interrupts arrive through [`StmLirc::handle_interrupt`], either
//! called directly or from the thread started by [`spawn_irq_handler`].

use crate::clock::{RxClocks, TxClocks};
use crate::platform::StmPlatformData;
use crate::regs::{IrbRegister, RegisterIo, RX_DISABLE_IRQ, RX_ENABLE_IRQ};
use crate::rx::{Clock, InterruptOutcome, RxDecoder, SystemClock, MAX_SYMBOLS};
use crate::scd::ScdFilter;
use crate::tx::Transmitter;
use lirc_core::{
    DriverDescriptor, Features, FileContext, FileOperations, FileOps, IoctlReply, IoctlRequest,
    LircDriver, LircError, Mode, Registry, Result, RingBuffer, ScdValue,
};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Minor number the STM receiver registers on.
pub const STM_MINOR: usize = 0;

/// Driver name.
pub const STM_NAME: &str = "lirc-stm";

/// Receive-side state touched from the interrupt path.
#[derive(Debug)]
pub(crate) struct RxState {
    pub(crate) decoder: RxDecoder,
    pub(crate) scd: ScdFilter,
}

/// STM IR block receiver and transmitter.
pub struct StmLirc {
    pub(crate) io: Arc<dyn RegisterIo>,
    pub(crate) platform: StmPlatformData,
    pub(crate) buffer: Arc<RingBuffer>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) rx: Mutex<RxState>,
    pub(crate) tx: Transmitter,
    pub(crate) open_count: AtomicUsize,
    pub(crate) clock_gated: AtomicBool,
}

impl std::fmt::Debug for StmLirc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StmLirc")
            .field("platform", &self.platform)
            .field("open_count", &self.open_count.load(Ordering::SeqCst))
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

impl StmLirc {
    /// Probe the IR block behind `io` with the system clock.
    pub fn probe(io: Arc<dyn RegisterIo>, platform: StmPlatformData) -> Result<Arc<Self>> {
        Self::probe_with_clock(io, platform, Arc::new(SystemClock::default()))
    }

    /// Probe with an explicit time source for sync spaces.
    pub fn probe_with_clock(
        io: Arc<dyn RegisterIo>,
        platform: StmPlatformData,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>> {
        if platform.sys_clock_div == 0 {
            return Err(LircError::invalid("sys_clock_div must be non-zero"));
        }
        let buffer = Arc::new(RingBuffer::for_records(2 * MAX_SYMBOLS)?);
        let base_clock = platform.base_clock();
        let driver = Arc::new(Self {
            rx: Mutex::new(RxState {
                decoder: RxDecoder::new(RxClocks::calculate(base_clock, &platform)),
                scd: ScdFilter::new(),
            }),
            tx: Transmitter::new(
                TxClocks::calculate(base_clock, platform.subcarrier_width_percent()),
                platform.tx_enabled,
            ),
            io,
            platform,
            buffer,
            clock,
            open_count: AtomicUsize::new(0),
            clock_gated: AtomicBool::new(false),
        });

        driver.hardware_init();
        info!(
            mode = if driver.platform.rx_uhf_mode { "UHF" } else { "IR" },
            base_clock,
            "STM LIRC plugin probed"
        );
        Ok(driver)
    }

    /// Register on `registry` (minor 0).
    pub fn register(self: &Arc<Self>, registry: &Registry) -> Result<usize> {
        let desc = DriverDescriptor::new(STM_NAME, 1, Arc::clone(self) as Arc<dyn LircDriver>)
            .with_minor(STM_MINOR)
            .with_features(Features::REC_MODE2)
            .with_buffer(Arc::clone(&self.buffer))
            .with_file_ops(Arc::clone(self) as Arc<dyn FileOperations>)
            .with_data(Arc::clone(self) as Arc<dyn std::any::Any + Send + Sync>);
        let minor = registry.register(desc)?;
        info!(minor, "STMicroelectronics LIRC driver initialized");
        Ok(minor)
    }

    /// Undo [`StmLirc::register`], quiescing the receiver first.
    pub fn unregister(&self, registry: &Registry) -> Result<()> {
        self.rx_flush();
        registry.unregister(STM_MINOR).map_err(|e| {
            error!(error = %e, "driver unregister failed");
            e
        })?;
        info!("STMicroelectronics LIRC driver removed");
        Ok(())
    }

    /// Records queued for readers.
    pub fn buffer(&self) -> &Arc<RingBuffer> {
        &self.buffer
    }

    /// Board settings.
    pub fn platform(&self) -> &StmPlatformData {
        &self.platform
    }

    /// Transmitter.
    pub fn transmitter(&self) -> &Transmitter {
        &self.tx
    }

    /// Opens currently counted by the backend.
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    /// Clock rate reaching the IR block.
    pub fn base_clock(&self) -> u64 {
        self.platform.base_clock()
    }

    /// Combined interrupt handler: transmit first, then receive.
    pub fn handle_interrupt(&self) -> InterruptOutcome {
        if self.clock_gated.load(Ordering::SeqCst) {
            return InterruptOutcome::default();
        }
        self.tx.handle_interrupt(self.io.as_ref());

        let mut rx = self.rx.lock();
        let RxState { decoder, scd } = &mut *rx;
        decoder.handle_interrupt(self.io.as_ref(), &self.buffer, scd, self.clock.as_ref())
    }

    // =========================================================================
    // Start-code detection
    // =========================================================================

    /// Program and arm start-code detection.
    pub fn configure_scd(&self, value: ScdValue) -> Result<()> {
        let mut rx = self.rx.lock();
        let was_active = rx.scd.is_active();
        rx.scd.configure(
            self.io.as_ref(),
            value,
            self.base_clock(),
            self.platform.rx_uhf_mode,
        )?;
        if was_active {
            rx.scd.set_enabled(self.io.as_ref(), true)?;
        }
        Ok(())
    }

    /// Turn armed start-code detection on or off.
    pub fn set_scd_enabled(&self, enable: bool) -> Result<()> {
        self.rx.lock().scd.set_enabled(self.io.as_ref(), enable)
    }

    /// True if start-code detection is armed.
    pub fn scd_status(&self) -> bool {
        self.rx.lock().scd.is_armed()
    }

    /// Stored start-code configuration.
    pub fn scd_value(&self) -> ScdValue {
        self.rx.lock().scd.value()
    }

    // =========================================================================
    // Hardware sequences
    // =========================================================================

    /// Polarity, clocks and start code, as after reset.
    pub(crate) fn hardware_init(&self) {
        let io = self.io.as_ref();
        let base_clock = self.base_clock();
        io.write(IrbRegister::RxPolarityInv, self.platform.rx_polarity);

        let rx_clocks = RxClocks::calculate(base_clock, &self.platform);
        rx_clocks.program(io);
        let tx_clocks = TxClocks::calculate(base_clock, self.platform.subcarrier_width_percent());
        tx_clocks.program(io);
        self.tx.set_clocks(tx_clocks);

        let mut rx = self.rx.lock();
        rx.decoder.set_clocks(rx_clocks);
        let scd_value = if rx.scd.is_armed() {
            Some(rx.scd.value())
        } else {
            self.platform.scd
        };
        if let Some(value) = scd_value {
            if let Err(e) = rx.scd.configure(io, value, base_clock, self.platform.rx_uhf_mode) {
                warn!(error = %e, "Start code not armed");
            }
        }
    }

    /// Enable receive interrupts and the receiver.
    pub(crate) fn rx_enable(&self, rx: &mut RxState) {
        self.io.write(IrbRegister::RxIntEnable, RX_ENABLE_IRQ);
        self.io.write(IrbRegister::RxEnable, 1);
        rx.decoder.reset();
    }

    /// Switch start-code detection, if a code is armed.
    fn scd_switch(&self, rx: &mut RxState, enable: bool) {
        if !rx.scd.is_armed() {
            return;
        }
        if let Err(e) = rx.scd.set_enabled(self.io.as_ref(), enable) {
            warn!(error = %e, enable, "SCD switch failed");
        }
    }

    /// Start-code detection on, then the receiver.
    pub(crate) fn rx_restore(&self) {
        let mut rx = self.rx.lock();
        self.scd_switch(&mut rx, true);
        self.rx_enable(&mut rx);
    }

    /// Start-code detection off, receiver off, command in progress dropped.
    pub(crate) fn rx_flush(&self) {
        let mut rx = self.rx.lock();
        self.scd_switch(&mut rx, false);
        self.io.write(IrbRegister::RxEnable, 0);
        self.io.write(IrbRegister::RxIntEnable, RX_DISABLE_IRQ);
        rx.decoder.reset();
    }
}

impl LircDriver for StmLirc {
    fn on_open(&self) -> Result<()> {
        if self.open_count.fetch_add(1, Ordering::SeqCst) == 0 {
            debug!("plugin enabled");
            let mut rx = self.rx.lock();
            self.rx_enable(&mut rx);
            rx.scd.reset_detection();
            self.scd_switch(&mut rx, true);
        } else {
            debug!("plugin already open");
        }
        Ok(())
    }

    fn on_close(&self) {
        let previous = self
            .open_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if previous == Ok(1) {
            debug!("plugin disabled");
            self.rx_flush();
        }
    }
}

impl FileOperations for StmLirc {
    fn provides(&self) -> FileOps {
        FileOps::WRITE | FileOps::IOCTL
    }

    fn write(&self, ctx: &FileContext<'_>, data: &[u8]) -> Result<usize> {
        self.tx
            .write(self.io.as_ref(), data, ctx.nonblocking, ctx.signal)
    }

    fn ioctl(&self, _ctx: &FileContext<'_>, request: IoctlRequest) -> Result<IoctlReply> {
        match request {
            IoctlRequest::GetFeatures => Ok(IoctlReply::Value(u64::from(
                (Features::REC_MODE2 | Features::SEND_PULSE).bits(),
            ))),
            IoctlRequest::GetRecMode => Ok(IoctlReply::Value(u64::from(Mode::MODE2.bits()))),
            IoctlRequest::SetRecMode(mode) => {
                if mode == u64::from(Mode::MODE2.bits()) {
                    Ok(IoctlReply::Done)
                } else {
                    Err(LircError::not_supported(format!("receive mode 0x{:x}", mode)))
                }
            }
            IoctlRequest::GetSendMode => Ok(IoctlReply::Value(u64::from(Mode::PULSE.bits()))),
            IoctlRequest::SetSendMode(mode) => {
                if mode == u64::from(Mode::PULSE.bits()) {
                    Ok(IoctlReply::Done)
                } else {
                    Err(LircError::not_supported(format!("send mode 0x{:x}", mode)))
                }
            }
            IoctlRequest::ScdConfigure(value) => {
                self.configure_scd(value)?;
                Ok(IoctlReply::Done)
            }
            IoctlRequest::ScdEnable => {
                self.set_scd_enabled(true)?;
                Ok(IoctlReply::Done)
            }
            IoctlRequest::ScdDisable => {
                self.set_scd_enabled(false)?;
                Ok(IoctlReply::Done)
            }
            IoctlRequest::ScdStatus => Ok(IoctlReply::Value(self.rx.lock().scd.status())),
            IoctlRequest::ScdGetValue => Ok(IoctlReply::Scd(self.scd_value())),
            other => {
                debug!("command {} (0x{:x}) not supported", other.name(), other.code());
                Err(LircError::NoIoctlCommand)
            }
        }
    }
}

// =============================================================================
// Interrupt line
// =============================================================================

/// Interrupt request line between the IR block and its handler thread.
#[derive(Debug, Default)]
pub struct IrqLine {
    state: Mutex<IrqState>,
    cond: Condvar,
}

#[derive(Debug, Default)]
struct IrqState {
    pending: u64,
    stop: bool,
}

impl IrqLine {
    /// Idle line.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assert the line.
    pub fn raise(&self) {
        let mut state = self.state.lock();
        state.pending += 1;
        self.cond.notify_all();
    }

    /// Wait for the next assertion; `None` once the line is shut down.
    fn wait(&self) -> Option<u64> {
        let mut state = self.state.lock();
        while state.pending == 0 && !state.stop {
            self.cond.wait(&mut state);
        }
        if state.stop {
            return None;
        }
        Some(std::mem::take(&mut state.pending))
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        state.stop = true;
        self.cond.notify_all();
    }
}

/// Running interrupt handler thread.
#[derive(Debug)]
pub struct IrqHandler {
    line: Arc<IrqLine>,
    handle: Option<JoinHandle<InterruptOutcome>>,
}

impl IrqHandler {
    /// Stop the thread and return what it handled.
    pub fn stop(mut self) -> InterruptOutcome {
        self.shutdown()
    }

    fn shutdown(&mut self) -> InterruptOutcome {
        self.line.shutdown();
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(outcome)) => outcome,
            Some(Err(e)) => {
                error!("IRQ handler panicked: {:?}", e);
                InterruptOutcome::default()
            }
            None => InterruptOutcome::default(),
        }
    }
}

impl Drop for IrqHandler {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown();
        }
    }
}

/// Run `driver`'s interrupt handler each time `line` is raised.
pub fn spawn_irq_handler(driver: Arc<StmLirc>, line: Arc<IrqLine>) -> Result<IrqHandler> {
    let thread_line = Arc::clone(&line);
    let handle = thread::Builder::new()
        .name("lirc-stm-irq".into())
        .spawn(move || {
            let mut total = InterruptOutcome::default();
            debug!("IRQ handler started");
            while thread_line.wait().is_some() {
                total.merge(driver.handle_interrupt());
            }
            debug!(
                delivered = total.delivered,
                dropped = total.dropped,
                "IRQ handler exiting"
            );
            total
        })
        .map_err(|e| LircError::ChildProcessFailed {
            message: e.to_string(),
        })?;
    Ok(IrqHandler {
        line,
        handle: Some(handle),
    })
}
