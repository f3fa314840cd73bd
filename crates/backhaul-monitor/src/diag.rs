//! On-demand diagnostics and the single-slot request exchange.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::UnknownDiagKind;
use crate::worker::JobKind;

const NONE: u8 = 0;

/// Diagnostic the control plane may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DiagKind {
    Chg = 1,
    Parallel = 2,
    Bufferbloat = 3,
}

impl DiagKind {
    pub const ALL: [DiagKind; 3] = [DiagKind::Chg, DiagKind::Parallel, DiagKind::Bufferbloat];

    pub fn as_str(self) -> &'static str {
        match self {
            DiagKind::Chg => "chg",
            DiagKind::Parallel => "parallel",
            DiagKind::Bufferbloat => "bufferbloat",
        }
    }

    /// Worker job that runs this diagnostic.
    pub fn job_kind(self) -> JobKind {
        match self {
            DiagKind::Chg => JobKind::Chg,
            DiagKind::Parallel => JobKind::DiagParallel,
            DiagKind::Bufferbloat => JobKind::DiagBufferbloat,
        }
    }

    fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(DiagKind::Chg),
            2 => Some(DiagKind::Parallel),
            3 => Some(DiagKind::Bufferbloat),
            _ => None,
        }
    }
}

impl fmt::Display for DiagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiagKind {
    type Err = UnknownDiagKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiagKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownDiagKind(s.to_string()))
    }
}

/// At most one outstanding diagnostic request. Writers overwrite
/// (last writer wins); the scheduler takes it exactly once.
#[derive(Debug, Default)]
pub struct DiagSlot(AtomicU8);

impl DiagSlot {
    pub fn new() -> Self {
        Self(AtomicU8::new(NONE))
    }

    /// Stores `kind`, returning the request it replaced, if any.
    pub fn request(&self, kind: DiagKind) -> Option<DiagKind> {
        DiagKind::from_u8(self.0.swap(kind as u8, Ordering::AcqRel))
    }

    /// Reads and clears the slot.
    pub fn take(&self) -> Option<DiagKind> {
        DiagKind::from_u8(self.0.swap(NONE, Ordering::AcqRel))
    }

    /// Puts a taken request back, unless a newer one arrived meanwhile.
    pub fn restore(&self, kind: DiagKind) -> bool {
        self.0
            .compare_exchange(NONE, kind as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn pending(&self) -> Option<DiagKind> {
        DiagKind::from_u8(self.0.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_kind() {
        assert_eq!("chg".parse::<DiagKind>().unwrap(), DiagKind::Chg);
        assert_eq!("Parallel".parse::<DiagKind>().unwrap(), DiagKind::Parallel);
        assert_eq!("bufferbloat".parse::<DiagKind>().unwrap(), DiagKind::Bufferbloat);
        assert!("speedtest".parse::<DiagKind>().is_err());
    }

    #[test]
    fn unknown_kind_is_a_std_error() {
        let err = "speedtest".parse::<DiagKind>().unwrap_err();
        assert_eq!(err, UnknownDiagKind("speedtest".into()));
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert_eq!(
            boxed.to_string(),
            "unknown diagnostic `speedtest` (expected chg, parallel or bufferbloat)"
        );
    }

    #[test]
    fn take_once() {
        let slot = DiagSlot::new();
        assert_eq!(slot.take(), None);
        assert_eq!(slot.request(DiagKind::Parallel), None);
        assert_eq!(slot.pending(), Some(DiagKind::Parallel));
        assert_eq!(slot.take(), Some(DiagKind::Parallel));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn last_writer_wins() {
        let slot = DiagSlot::new();
        slot.request(DiagKind::Chg);
        assert_eq!(slot.request(DiagKind::Bufferbloat), Some(DiagKind::Chg));
        assert_eq!(slot.take(), Some(DiagKind::Bufferbloat));
    }

    #[test]
    fn restore_does_not_clobber_newer_request() {
        let slot = DiagSlot::new();
        slot.request(DiagKind::Chg);
        let taken = slot.take().unwrap();
        slot.request(DiagKind::Parallel);
        assert!(!slot.restore(taken));
        assert_eq!(slot.take(), Some(DiagKind::Parallel));

        assert!(slot.restore(DiagKind::Chg));
        assert_eq!(slot.take(), Some(DiagKind::Chg));
    }
}
