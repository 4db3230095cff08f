use crate::oid::PrinterOid;

/// Raw page counters from the last successful poll plus the aggregates
/// derived from them.
///
/// Raw values are clamped at zero on the way in, so every field is
/// non-negative by construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSet {
    pub total_pages: u64,
    pub color_copies: u64,
    pub mono_copies: u64,
    pub color_prints: u64,
    pub mono_prints: u64,
    pub color_total: u64,
    pub mono_total: u64,
    pub total_copies: u64,
}

impl CounterSet {
    /// Store one raw reading. Returns `false` for identifiers that are not
    /// counters (the serial number).
    pub fn set_raw(&mut self, oid: PrinterOid, value: i64) -> bool {
        let value = clamp(value);
        let slot = match oid {
            PrinterOid::SysTotal => &mut self.total_pages,
            PrinterOid::ColorCopies => &mut self.color_copies,
            PrinterOid::MonoCopies => &mut self.mono_copies,
            PrinterOid::ColorPrints => &mut self.color_prints,
            PrinterOid::MonoPrints => &mut self.mono_prints,
            PrinterOid::Serial => return false,
        };
        *slot = value;
        true
    }

    pub fn recompute(&mut self) {
        self.color_total = self.color_prints.saturating_add(self.color_copies);
        self.mono_total = self.mono_prints.saturating_add(self.mono_copies);
        self.total_copies = self.color_copies.saturating_add(self.mono_copies);
    }

    /// Forget everything; used when the session is lost.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn clamp(value: i64) -> u64 {
    value.max(0) as u64
}
