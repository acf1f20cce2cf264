//! Power management transitions.
//!
//! Standby keeps the receiver alive when the device may wake the system,
//! so a remote key press can bring it back. Hibernation always stops the
//! block and gates its clock; on restore the receiver comes back only if
//! someone still holds the device open.

use crate::clock::RxClocks;
use crate::driver::StmLirc;
use crate::regs::{IrbRegister, RX_CLEAR_ALL, RX_ENABLE_IRQ};
use std::sync::atomic::Ordering;
use tracing::{debug, warn};

impl StmLirc {
    /// Enter standby.
    pub fn suspend(&self, may_wakeup: bool) {
        if may_wakeup {
            self.rx_flush();
            self.reconfigure_rx();
            self.rx_restore();
            self.rx.lock().scd.restart(self.io.as_ref());
            debug!("suspended with IR wake-up armed");
        } else {
            self.clock_gated.store(true, Ordering::SeqCst);
            debug!("suspended, clock gated");
        }
    }

    /// Leave standby.
    pub fn resume(&self, may_wakeup: bool) {
        if !may_wakeup {
            self.clock_gated.store(false, Ordering::SeqCst);
        }
        self.hardware_init();
        self.rx_restore();
        self.rx.lock().scd.restart(self.io.as_ref());
        debug!(may_wakeup, "resumed");
    }

    /// Prepare for hibernation.
    pub fn freeze(&self) {
        self.io.write(IrbRegister::RxEnable, 0);
        self.io.write(IrbRegister::RxIntClear, RX_CLEAR_ALL);
        self.rx.lock().decoder.reset();
        self.clock_gated.store(true, Ordering::SeqCst);
        debug!("frozen");
    }

    /// Come back from hibernation.
    pub fn restore(&self) {
        self.clock_gated.store(false, Ordering::SeqCst);
        self.hardware_init();
        if self.open_count() > 0 {
            self.io.write(IrbRegister::RxIntEnable, RX_ENABLE_IRQ);
            self.io.write(IrbRegister::RxEnable, 1);
        }
        debug!(open = self.open_count(), "restored");
    }

    /// True while the block's clock is gated off.
    pub fn is_clock_gated(&self) -> bool {
        self.clock_gated.load(Ordering::SeqCst)
    }

    /// Recompute receive clocks and re-arm the start code against them.
    fn reconfigure_rx(&self) {
        let base_clock = self.base_clock();
        let clocks = RxClocks::calculate(base_clock, &self.platform);
        clocks.program(self.io.as_ref());

        let mut rx = self.rx.lock();
        rx.decoder.set_clocks(clocks);
        if rx.scd.is_armed() {
            let value = rx.scd.value();
            if let Err(e) =
                rx.scd
                    .configure(self.io.as_ref(), value, base_clock, self.platform.rx_uhf_mode)
            {
                warn!(error = %e, "Start code not re-armed");
            }
        }
    }
}
