//! IR block (IRB) register map.
//!
//! Offsets are relative to the block base. The receiver registers sit 0x40
//! higher when the block runs in UHF mode; every other register is at a
//! fixed offset.

use serde::Serialize;

/// Registers of the IR block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum IrbRegister {
    // Transmitter
    /// Carrier clock prescaler
    TxPrescaler,
    /// Subcarrier period
    TxSubcarrier,
    /// Symbol period FIFO
    TxSymPeriod,
    /// Symbol on-time FIFO
    TxOnTime,
    /// Interrupt enable
    TxIntEnable,
    /// Interrupt status
    TxIntStatus,
    /// Transmit enable
    TxEnable,
    /// Interrupt clear
    TxIntClear,
    /// Subcarrier on-width
    TxSubcarrierWidth,
    /// Status, FIFO fill in bits 8..=10
    TxStatus,

    // Receiver (IR or UHF bank)
    /// Pulse time of the FIFO head
    RxOn,
    /// Symbol period of the FIFO head (pops the FIFO)
    RxSys,
    /// Interrupt enable
    RxIntEnable,
    /// Interrupt status
    RxIntStatus,
    /// Receive enable
    RxEnable,
    /// Maximum symbol period before a command is terminated
    RxMaxSymPeriod,
    /// Interrupt clear
    RxIntClear,
    /// Noise suppression
    RxNoiseSuppr,
    /// Input polarity inversion
    RxPolarityInv,
    /// Status: words in FIFO and overrun
    RxStatus,

    // Common
    /// Receive sampling divisor
    RxRateCommon,
    /// Receive clock select
    RxClockSel,
    /// Receive clock select status
    RxClockSelStatus,
    /// Noise suppression width
    RxNoiseSuppWidth,

    // Start-code detection (UHF only)
    /// Filter configuration
    ScdConfig,
    /// Detection status
    ScdStatus,
    /// Primary start code
    ScdCode,
    /// Code lengths (primary in bits 0..5, alternative in 8..13)
    ScdCodeLen,
    /// Minimum symbol time
    ScdSymbMinTime,
    /// Maximum symbol time
    ScdSymbMaxTime,
    /// Nominal symbol time
    ScdSymbNomTime,
    /// 1 MHz sampling prescaler
    ScdPrescaler,
    /// Interrupt enable
    ScdIntEnable,
    /// Interrupt clear
    ScdIntClear,
    /// Noise recovery
    ScdNoiseRecov,
    /// Interrupt status
    ScdIntStatus,
    /// Alternative start code
    ScdAltCode,
}

/// Extra offset of the receiver bank in UHF mode.
pub const UHF_RX_OFFSET: u32 = 0x40;

impl IrbRegister {
    /// Byte offset from the block base.
    pub const fn offset(self, uhf: bool) -> u32 {
        let base = match self {
            Self::TxPrescaler => 0x00,
            Self::TxSubcarrier => 0x04,
            Self::TxSymPeriod => 0x08,
            Self::TxOnTime => 0x0c,
            Self::TxIntEnable => 0x10,
            Self::TxIntStatus => 0x14,
            Self::TxEnable => 0x18,
            Self::TxIntClear => 0x1c,
            Self::TxSubcarrierWidth => 0x20,
            Self::TxStatus => 0x24,
            Self::RxOn => 0x40,
            Self::RxSys => 0x44,
            Self::RxIntEnable => 0x48,
            Self::RxIntStatus => 0x4c,
            Self::RxEnable => 0x50,
            Self::RxMaxSymPeriod => 0x54,
            Self::RxIntClear => 0x58,
            Self::RxNoiseSuppr => 0x5c,
            Self::RxPolarityInv => 0x68,
            Self::RxStatus => 0x6c,
            Self::RxRateCommon => 0x64,
            Self::RxClockSel => 0x70,
            Self::RxClockSelStatus => 0x74,
            Self::RxNoiseSuppWidth => 0x9c,
            Self::ScdConfig => 0x200,
            Self::ScdStatus => 0x204,
            Self::ScdCode => 0x208,
            Self::ScdCodeLen => 0x20c,
            Self::ScdSymbMinTime => 0x210,
            Self::ScdSymbMaxTime => 0x214,
            Self::ScdSymbNomTime => 0x218,
            Self::ScdPrescaler => 0x21c,
            Self::ScdIntEnable => 0x220,
            Self::ScdIntClear => 0x224,
            Self::ScdNoiseRecov => 0x228,
            Self::ScdIntStatus => 0x22c,
            Self::ScdAltCode => 0x230,
        };
        if uhf && self.is_rx_bank() {
            base + UHF_RX_OFFSET
        } else {
            base
        }
    }

    /// True for registers of the switchable IR/UHF receiver bank.
    pub const fn is_rx_bank(self) -> bool {
        matches!(
            self,
            Self::RxOn
                | Self::RxSys
                | Self::RxIntEnable
                | Self::RxIntStatus
                | Self::RxEnable
                | Self::RxMaxSymPeriod
                | Self::RxIntClear
                | Self::RxNoiseSuppr
                | Self::RxPolarityInv
                | Self::RxStatus
        )
    }
}

/// Register access to an IR block.
///
/// Implemented by the memory-mapped hardware binding and by
/// [`SimulatedIrb`](crate::sim::SimulatedIrb).
pub trait RegisterIo: Send + Sync {
    /// Read a 32-bit register.
    fn read(&self, reg: IrbRegister) -> u32;

    /// Write a 32-bit register.
    fn write(&self, reg: IrbRegister, value: u32);
}

// =============================================================================
// Bit settings
// =============================================================================

/// `RxStatus`: words in the FIFO or overrun.
pub const RX_WORDS_OR_OVERRUN: u32 = 0xff04;
/// `RxIntStatus` / `RxIntClear`: overrun.
pub const RX_OVERRUN: u32 = 0x04;
/// `RxIntClear`: pending receive interrupts.
pub const RX_CLEAR_IRQ: u32 = 0x38;
/// `RxIntClear`: last-symbol interrupt.
pub const RX_CLEAR_LAST_SYMBOL: u32 = 0x02;
/// `RxIntEnable`: FIFO full, overrun, last symbol and receive interrupts.
pub const RX_ENABLE_IRQ: u32 = 0x0f;
/// `RxIntEnable` while draining: everything except FIFO full.
pub const RX_DRAIN_IRQ: u32 = 0x07;
/// `RxIntEnable` written when the receiver is shut down.
pub const RX_DISABLE_IRQ: u32 = 0x20;
/// `RxIntClear`: every status bit.
pub const RX_CLEAR_ALL: u32 = 0xff;
/// Symbol period marking the end of a received sequence.
pub const RX_END_OF_SEQUENCE: u32 = 0xffff;

/// `TxIntStatus`: interrupt pending.
pub const TX_INT_PENDING: u32 = 0x01;
/// `TxIntStatus` / `TxIntClear`: FIFO underrun.
pub const TX_INT_UNDERRUN: u32 = 0x02;
/// `TxIntEnable` / `TxIntClear`: every transmit interrupt.
pub const TX_INT_ALL: u32 = 0x07;
/// Depth of the transmit FIFO.
pub const TX_FIFO_DEPTH: u32 = 7;

/// Entries queued in the transmit FIFO, from a `TxStatus` value.
pub const fn tx_fifo_used(status: u32) -> u32 {
    (status >> 8) & 0x07
}

/// `ScdConfig`: filter on.
pub const SCD_CFG_ENABLE: u32 = 0x01;
/// `ScdConfig`: restart detection.
pub const SCD_CFG_RESTART: u32 = 0x02;
