//! # Transition Detector
//!
//! Per station slot the occupancy is either vacant or holds one container.
//! Comparing two successive resolver passes yields exactly one of these.

use crate::model::is_vacant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Same container (or still vacant). Must not trigger any work.
    Unchanged,
    Arrival { container: String },
    Departure { container: String },
    /// Handled as a departure of `from` followed by an arrival of `to`.
    Swap { from: String, to: String },
}

impl Transition {
    /// Container that became current, if any.
    pub fn arriving(&self) -> Option<&str> {
        match self {
            Transition::Arrival { container } => Some(container),
            Transition::Swap { to, .. } => Some(to),
            _ => None,
        }
    }

    /// Container that stopped being current, if any.
    pub fn departing(&self) -> Option<&str> {
        match self {
            Transition::Departure { container } => Some(container),
            Transition::Swap { from, .. } => Some(from),
            _ => None,
        }
    }
}

/// Classifies the move from `old` to `new` occupancy.
pub fn classify(old: &str, new: &str) -> Transition {
    match (is_vacant(old), is_vacant(new)) {
        (true, true) => Transition::Unchanged,
        (true, false) => Transition::Arrival {
            container: new.to_string(),
        },
        (false, true) => Transition::Departure {
            container: old.to_string(),
        },
        (false, false) if old == new => Transition::Unchanged,
        (false, false) => Transition::Swap {
            from: old.to_string(),
            to: new.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_every_pair() {
        assert_eq!(classify("", ""), Transition::Unchanged);
        assert_eq!(classify("0", ""), Transition::Unchanged);
        assert_eq!(classify("C1", "C1"), Transition::Unchanged);
        assert_eq!(classify("", "C1"), Transition::Arrival { container: "C1".into() });
        assert_eq!(classify("C1", "0"), Transition::Departure { container: "C1".into() });
        assert_eq!(
            classify("C1", "C2"),
            Transition::Swap { from: "C1".into(), to: "C2".into() }
        );
    }

    #[test]
    fn swap_exposes_both_sides() {
        let swap = classify("C1", "C2");
        assert_eq!(swap.departing(), Some("C1"));
        assert_eq!(swap.arriving(), Some("C2"));
        assert_eq!(classify("", "").arriving(), None);
    }
}
