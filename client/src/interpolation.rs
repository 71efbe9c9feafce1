//! Snapshot interpolation for smooth rendering
//!
//! The server sends one snapshot per tick. Rendering slightly in the past
//! (by [`INTERP_DELAY`]) means there is almost always a snapshot on either
//! side of the render time, so positions can be blended instead of jumping.

use serde::{Deserialize, Serialize};
use shared::{Snapshot, INTERP_DELAY};
use std::time::{Duration, Instant};

/// Smallest span used as the interpolation denominator, in seconds.
const MIN_SPAN: f32 = 1e-6;

/// What the front-end draws for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RenderState {
    pub ly: f32,
    pub ry: f32,
    pub bx: f32,
    pub by: f32,
    pub sl: u32,
    pub sr: u32,
}

impl From<Snapshot> for RenderState {
    fn from(s: Snapshot) -> Self {
        Self {
            ly: s.ly,
            ry: s.ry,
            bx: s.bx,
            by: s.by,
            sl: s.sl,
            sr: s.sr,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Timed {
    at: Instant,
    snapshot: Snapshot,
}

/// Keeps the two most recent snapshots and blends between them.
#[derive(Debug, Clone)]
pub struct SnapshotInterpolator {
    prev: Option<Timed>,
    curr: Option<Timed>,
    delay: Duration,
    /// Sign of the last non-zero ball displacement on each axis.
    heading: (f32, f32),
}

impl Default for SnapshotInterpolator {
    fn default() -> Self {
        Self::new(INTERP_DELAY)
    }
}

impl SnapshotInterpolator {
    pub fn new(delay: Duration) -> Self {
        Self {
            prev: None,
            curr: None,
            delay,
            heading: (0.0, 0.0),
        }
    }

    /// Stores a snapshot received at `at`, discarding the oldest one.
    ///
    /// Returns true when the ball reversed direction on either axis compared
    /// with the previous pair. A serve after a point is not a bounce.
    pub fn push(&mut self, at: Instant, snapshot: Snapshot) -> bool {
        let mut bounced = false;

        if let Some(curr) = self.curr {
            let last = curr.snapshot;
            if last.sl != snapshot.sl || last.sr != snapshot.sr {
                self.heading = (0.0, 0.0);
            } else {
                let dx = snapshot.bx - last.bx;
                let dy = snapshot.by - last.by;
                bounced |= flipped(&mut self.heading.0, dx);
                bounced |= flipped(&mut self.heading.1, dy);
            }
        }

        self.prev = self.curr;
        self.curr = Some(Timed { at, snapshot });
        bounced
    }

    /// Blended state for a frame drawn at `now`, or `None` until two snapshots exist.
    pub fn sample(&self, now: Instant) -> Option<RenderState> {
        let (prev, curr) = (self.prev?, self.curr?);

        let render_time = match now.checked_sub(self.delay) {
            Some(t) if t > prev.at => t,
            _ => return Some(prev.snapshot.into()),
        };
        if render_time >= curr.at {
            return Some(curr.snapshot.into());
        }

        let span = curr
            .at
            .saturating_duration_since(prev.at)
            .as_secs_f32()
            .max(MIN_SPAN);
        let a = (render_time.duration_since(prev.at).as_secs_f32() / span).clamp(0.0, 1.0);

        let (p, c) = (prev.snapshot, curr.snapshot);
        Some(RenderState {
            ly: lerp(p.ly, c.ly, a),
            ry: lerp(p.ry, c.ry, a),
            bx: lerp(p.bx, c.bx, a),
            by: lerp(p.by, c.by, a),
            sl: c.sl,
            sr: c.sr,
        })
    }

    pub fn latest(&self) -> Option<Snapshot> {
        self.curr.map(|t| t.snapshot)
    }

    pub fn len(&self) -> usize {
        usize::from(self.prev.is_some()) + usize::from(self.curr.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.curr.is_none()
    }

    pub fn clear(&mut self) {
        self.prev = None;
        self.curr = None;
        self.heading = (0.0, 0.0);
    }
}

fn lerp(from: f32, to: f32, a: f32) -> f32 {
    from + (to - from) * a
}

/// Records the sign of `delta` and reports a reversal. Zero deltas are ignored.
fn flipped(heading: &mut f32, delta: f32) -> bool {
    if delta == 0.0 {
        return false;
    }
    let sign = delta.signum();
    let reversed = *heading != 0.0 && sign != *heading;
    *heading = sign;
    reversed
}
