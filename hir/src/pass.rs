use core::ops::{BitOr, BitOrAssign};

use crate::Function;

/// Whether a pass changed the IR it ran on.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum PostPassStatus {
    Changed,
    #[default]
    Unchanged,
}

impl PostPassStatus {
    pub fn ir_changed(self) -> bool {
        matches!(self, Self::Changed)
    }
}

impl From<bool> for PostPassStatus {
    fn from(changed: bool) -> Self {
        if changed { Self::Changed } else { Self::Unchanged }
    }
}

impl BitOr for PostPassStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        if self.ir_changed() || rhs.ir_changed() {
            Self::Changed
        } else {
            Self::Unchanged
        }
    }
}

impl BitOrAssign for PostPassStatus {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

/// A function transformation pass.
///
/// Passes do not fail: malformed inputs (e.g. a loop without the shape a
/// transform requires) are reported via logging and left unmodified, so the
/// only thing a caller learns is whether the IR changed.
pub trait Pass {
    /// A short name for this pass, used as a logging target.
    fn name(&self) -> &'static str;

    /// The full command-line style argument naming this pass.
    fn argument(&self) -> &'static str;

    fn run_on_function(&mut self, function: &mut Function) -> PostPassStatus;
}
