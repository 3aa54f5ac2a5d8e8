#![forbid(unsafe_code)]

//! Range arithmetic for every mutation, computed up front and applied to
//! both boundary columns in one set-based update.

use crate::error::TreeError;
use crate::model::Bounds;

/// Every boundary value in `[from, to]` moves by `delta`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub from: i64,
    pub to: i64,
    pub delta: i64,
}

impl Segment {
    fn contains(&self, value: i64) -> bool {
        self.from <= value && value <= self.to
    }
}

/// A piecewise shift over boundary positions. Segments never overlap, so the
/// result of [`ShiftPlan::apply`] is independent of evaluation order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShiftPlan {
    segments: Vec<Segment>,
}

impl ShiftPlan {
    /// Makes room for `width` slots starting at `anchor`.
    pub fn open_gap(anchor: i64, width: i64) -> Self {
        Self::from_segments([Segment {
            from: anchor,
            to: i64::MAX,
            delta: width,
        }])
    }

    /// Pulls everything right of `after` back by `width`.
    pub fn close_gap(after: i64, width: i64) -> Self {
        Self::from_segments([Segment {
            from: after.saturating_add(1),
            to: i64::MAX,
            delta: -width,
        }])
    }

    /// Relocates `subtree` so that it starts at the slot currently numbered
    /// `anchor`: the new parent's `rgt`, or one past the last root.
    pub fn relocate(subtree: Bounds, anchor: i64) -> Result<Self, TreeError> {
        let (lft, rgt) = (subtree.lft(), subtree.rgt());
        let width = subtree.width();
        if subtree.covers(anchor) {
            return Err(TreeError::InvalidInput(
                "relocation anchor lies inside the moved subtree",
            ));
        }

        if anchor > rgt {
            Ok(Self::from_segments([
                Segment {
                    from: lft,
                    to: rgt,
                    delta: anchor - rgt - 1,
                },
                Segment {
                    from: rgt + 1,
                    to: anchor - 1,
                    delta: -width,
                },
            ]))
        } else {
            Ok(Self::from_segments([
                Segment {
                    from: anchor,
                    to: lft - 1,
                    delta: width,
                },
                Segment {
                    from: lft,
                    to: rgt,
                    delta: anchor - lft,
                },
            ]))
        }
    }

    fn from_segments(segments: impl IntoIterator<Item = Segment>) -> Self {
        Self {
            segments: segments
                .into_iter()
                .filter(|segment| segment.from <= segment.to && segment.delta != 0)
                .collect(),
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_noop(&self) -> bool {
        self.segments.is_empty()
    }

    /// Smallest and largest boundary the plan can touch.
    pub fn span(&self) -> Option<(i64, i64)> {
        let from = self.segments.iter().map(|s| s.from).min()?;
        let to = self.segments.iter().map(|s| s.to).max()?;
        Some((from, to))
    }

    pub fn apply(&self, value: i64) -> i64 {
        self.segments
            .iter()
            .find(|segment| segment.contains(value))
            .map_or(value, |segment| value + segment.delta)
    }

    pub fn apply_bounds(&self, bounds: Bounds) -> Result<Bounds, TreeError> {
        Bounds::new(self.apply(bounds.lft()), self.apply(bounds.rgt()))
    }

    pub fn touches(&self, bounds: &Bounds) -> bool {
        self.segments
            .iter()
            .any(|segment| segment.contains(bounds.lft()) || segment.contains(bounds.rgt()))
    }
}
