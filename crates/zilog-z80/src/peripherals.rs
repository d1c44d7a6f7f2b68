//! NMI-time peripheral collaborators.
//!
//! NMI acceptance has machine-specific paging side
//! effects that belong to peripherals the Z80 core doesn't otherwise know
//! about. Rather than hard-wiring Spectrum knowledge into this crate, callers
//! hand in a small bundle of capability objects; the core walks them in the
//! documented priority order and stops at the first match.

/// The Spectranet network peripheral. Can absorb an NMI entirely (its flip-
/// flop takes priority over delivering the NMI to the CPU at all).
pub trait SpectranetPeripheral {
    fn nmi_flipflop(&self) -> bool;
    fn nmi(&mut self);
    fn retn(&mut self);
}

/// The Beta 128 disk interface. When present, an NMI pages in the TR-DOS ROM.
pub trait BetaDiskPeripheral {
    fn available(&self) -> bool;
    fn page(&mut self);
}

/// Capability bundle consulted during NMI acceptance, highest priority first:
/// Scorpion memory paging, then Beta disk, then Spectranet.
#[derive(Default)]
pub struct NmiCapabilities<'a> {
    /// `Some(last_1ffd_byte)` if Scorpion-style memory paging is available;
    /// NMI acceptance ORs in bit 1 and writes the result back to port 0x1FFD.
    pub scorpion_last_1ffd: Option<u8>,
    pub beta_disk: Option<&'a mut dyn BetaDiskPeripheral>,
    pub spectranet: Option<&'a mut dyn SpectranetPeripheral>,
}

impl<'a> NmiCapabilities<'a> {
    /// True if a connected Spectranet's flip-flop absorbs this NMI.
    #[must_use]
    pub fn absorbed_by_spectranet(&self) -> bool {
        self.spectranet
            .as_ref()
            .is_some_and(|s| s.nmi_flipflop())
    }
}
