use std::fmt;

/// Printer MIB serial number (`prtGeneralSerialNumber.1`).
const SERIAL: &[u32] = &[1, 3, 6, 1, 2, 1, 43, 5, 1, 1, 17, 1];
/// Printer MIB lifetime marker count (`prtMarkerLifeCount.1.1`).
const SYS_TOTAL: &[u32] = &[1, 3, 6, 1, 2, 1, 43, 10, 2, 1, 4, 1, 1];
// Ricoh private counters under enterprise 367.
const COLOR_COPIES: &[u32] = &[1, 3, 6, 1, 4, 1, 367, 3, 2, 1, 2, 19, 5, 1, 9, 138];
const MONO_COPIES: &[u32] = &[1, 3, 6, 1, 4, 1, 367, 3, 2, 1, 2, 19, 5, 1, 9, 139];
const COLOR_PRINTS: &[u32] = &[1, 3, 6, 1, 4, 1, 367, 3, 2, 1, 2, 19, 5, 1, 9, 142];
const MONO_PRINTS: &[u32] = &[1, 3, 6, 1, 4, 1, 367, 3, 2, 1, 2, 19, 5, 1, 9, 143];

/// The fixed set of object identifiers the bridge ever asks a printer for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrinterOid {
    Serial,
    SysTotal,
    ColorCopies,
    MonoCopies,
    ColorPrints,
    MonoPrints,
}

impl PrinterOid {
    /// Every counter identifier, in request order.
    pub const COUNTERS: [PrinterOid; 5] = [
        PrinterOid::SysTotal,
        PrinterOid::ColorCopies,
        PrinterOid::MonoCopies,
        PrinterOid::ColorPrints,
        PrinterOid::MonoPrints,
    ];

    const ALL: [PrinterOid; 6] = [
        PrinterOid::Serial,
        PrinterOid::SysTotal,
        PrinterOid::ColorCopies,
        PrinterOid::MonoCopies,
        PrinterOid::ColorPrints,
        PrinterOid::MonoPrints,
    ];

    pub fn arcs(self) -> &'static [u32] {
        match self {
            PrinterOid::Serial => SERIAL,
            PrinterOid::SysTotal => SYS_TOTAL,
            PrinterOid::ColorCopies => COLOR_COPIES,
            PrinterOid::MonoCopies => MONO_COPIES,
            PrinterOid::ColorPrints => COLOR_PRINTS,
            PrinterOid::MonoPrints => MONO_PRINTS,
        }
    }

    /// Identify a received object identifier by its trailing arcs.
    ///
    /// Agents echo the full identifier, but some prefix it differently, so
    /// the match is on the suffix rather than on equality.
    pub fn from_suffix(oid: &[u32]) -> Option<PrinterOid> {
        Self::ALL.into_iter().find(|known| oid.ends_with(known.arcs()))
    }
}

impl fmt::Display for PrinterOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for arc in self.arcs() {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{arc}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_dotted() {
        assert_eq!(PrinterOid::Serial.to_string(), "1.3.6.1.2.1.43.5.1.1.17.1");
        assert_eq!(
            PrinterOid::MonoPrints.to_string(),
            "1.3.6.1.4.1.367.3.2.1.2.19.5.1.9.143"
        );
    }

    #[test]
    fn suffix_match_identifies_each_counter() {
        for oid in PrinterOid::ALL {
            assert_eq!(PrinterOid::from_suffix(oid.arcs()), Some(oid));
        }
        let mut prefixed = vec![0u32];
        prefixed.extend_from_slice(COLOR_PRINTS);
        assert_eq!(PrinterOid::from_suffix(&prefixed), Some(PrinterOid::ColorPrints));
    }

    #[test]
    fn unknown_oid_is_none() {
        assert_eq!(PrinterOid::from_suffix(&[1, 3, 6, 1, 2, 1, 1, 5, 0]), None);
        assert_eq!(PrinterOid::from_suffix(&[17, 1]), None);
    }
}
