//! Seek-overshoot correction.
//!
//! A backward seek is supposed to land on a keyframe at or before the target,
//! but some containers land after it. The first picture decoded after a seek
//! is checked against the target; if it is already past, the seek is redone
//! one second earlier. That correction happens at most once per logical seek.

/// Outcome of [`SeekCorrection::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekStep {
    /// Use the picture.
    Proceed,
    /// Discard the picture and seek again to the given timestamp.
    Reseek(i64),
}

/// Per-seek correction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekCorrection {
    /// Decoding forward without a seek.
    Linear,
    /// A seek was issued and no picture has been checked since.
    Seeking {
        /// Requested timestamp.
        target: i64,
        /// Whether the one allowed re-seek has been used.
        attempted_correction: bool,
    },
    /// The first picture after the seek was accepted.
    Settled,
}

impl SeekCorrection {
    /// State right after seeking to `target`.
    pub fn seeking(target: i64) -> Self {
        SeekCorrection::Seeking {
            target,
            attempted_correction: false,
        }
    }

    /// Check a decoded picture's timestamp.
    ///
    /// `one_second` is the number of ticks in one second.
    pub fn observe(&mut self, timestamp: i64, one_second: i64) -> SeekStep {
        match *self {
            SeekCorrection::Linear | SeekCorrection::Settled => SeekStep::Proceed,
            SeekCorrection::Seeking {
                target,
                attempted_correction,
            } => {
                if timestamp > target && !attempted_correction {
                    *self = SeekCorrection::Seeking {
                        target,
                        attempted_correction: true,
                    };
                    SeekStep::Reseek((target - one_second).max(0))
                } else {
                    *self = SeekCorrection::Settled;
                    SeekStep::Proceed
                }
            }
        }
    }

    /// Whether the one allowed re-seek was issued.
    pub fn corrected(&self) -> bool {
        matches!(
            self,
            SeekCorrection::Seeking {
                attempted_correction: true,
                ..
            }
        )
    }
}
