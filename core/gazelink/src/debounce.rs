//! Change detection and settle-delay debouncing for the direction stream.
//!
//! A new direction is only transmitted once it has been the latest
//! observation for a full settle delay. Each differing observation re-arms
//! the delay, so rapid oscillation sends nothing until the stream calms down.

use std::time::Duration;

use tracing::debug;

use crate::Direction;

/// Bytes to hand to the link for one committed direction change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payload {
    direction: Direction,
}

impl Payload {
    /// The committed direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// ASCII encoding of the direction label, e.g. `b"LEFT"`.
    pub fn as_bytes(&self) -> &'static [u8] {
        self.direction.label().as_bytes()
    }
}

/// A scheduled send waiting for its settle deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSend {
    /// Direction that will be sent if it is still latest at `deadline`.
    pub candidate: Direction,
    /// When the candidate was first observed.
    pub since: Duration,
    /// `since` plus the settle delay.
    pub deadline: Duration,
}

/// Decides which directions are worth transmitting, and when.
///
/// Timestamps are host-supplied offsets from any fixed monotonic epoch.
#[derive(Debug, Clone)]
pub struct Debouncer {
    settle: Duration,
    last_sent: Option<Direction>,
    latest: Option<Direction>,
    pending: Option<PendingSend>,
}

impl Debouncer {
    /// Debouncer with the given settle delay and nothing sent yet.
    pub fn new(settle: Duration) -> Self {
        Self {
            settle,
            last_sent: None,
            latest: None,
            pending: None,
        }
    }

    /// The last direction actually committed for sending.
    pub fn last_sent(&self) -> Option<Direction> {
        self.last_sent
    }

    /// The armed settle action, if any.
    pub fn pending(&self) -> Option<PendingSend> {
        self.pending
    }

    /// Feed one tick's direction and fire any settle action that is now due.
    pub fn on_direction(&mut self, direction: Direction, now: Duration) -> Option<Payload> {
        self.observe(direction, now);
        self.poll(now)
    }

    /// Record an observation without checking deadlines.
    ///
    /// `NoFace` and `EyesNotResolved` carry no information and leave the
    /// state untouched.
    pub fn observe(&mut self, direction: Direction, now: Duration) {
        if !direction.is_dispatchable() {
            return;
        }
        self.latest = Some(direction);

        match self.pending {
            Some(pending) if pending.candidate == direction => {}
            Some(_) => self.arm(direction, now),
            None if self.last_sent != Some(direction) => self.arm(direction, now),
            None => {}
        }
    }

    /// Fire the pending settle action if its deadline has passed.
    ///
    /// The send is committed only if the candidate is still the latest
    /// observation and differs from what was last sent.
    pub fn poll(&mut self, now: Duration) -> Option<Payload> {
        let pending = self.pending?;
        if now < pending.deadline {
            return None;
        }
        self.pending = None;

        let candidate = pending.candidate;
        if self.latest != Some(candidate) || self.last_sent == Some(candidate) {
            debug!(?candidate, "settle action superseded");
            return None;
        }

        self.last_sent = Some(candidate);
        Some(Payload {
            direction: candidate,
        })
    }

    /// Forget everything, e.g. after the link drops.
    pub fn reset(&mut self) {
        self.last_sent = None;
        self.latest = None;
        self.pending = None;
    }

    fn arm(&mut self, candidate: Direction, now: Duration) {
        self.pending = Some(PendingSend {
            candidate,
            since: now,
            deadline: now + self.settle,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Direction::*;

    const SETTLE: Duration = Duration::from_millis(120);

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    /// Feed `(direction, at_ms)` pairs and collect every payload produced.
    fn run(debouncer: &mut Debouncer, stream: &[(Direction, u64)]) -> Vec<Direction> {
        stream
            .iter()
            .filter_map(|&(d, t)| debouncer.on_direction(d, ms(t)))
            .map(|p| p.direction())
            .collect()
    }

    fn settled_on(direction: Direction) -> Debouncer {
        let mut d = Debouncer::new(SETTLE);
        assert_eq!(run(&mut d, &[(direction, 0), (direction, 200)]), vec![direction]);
        d
    }

    #[test]
    fn first_direction_is_sent_after_settle_delay() {
        let mut d = Debouncer::new(SETTLE);
        assert!(d.on_direction(Left, ms(0)).is_none());
        assert!(d.on_direction(Left, ms(60)).is_none());
        let payload = d.on_direction(Left, ms(120)).unwrap();
        assert_eq!(payload.as_bytes(), b"LEFT");
        assert_eq!(d.last_sent(), Some(Left));
    }

    #[test]
    fn repeated_direction_is_never_resent() {
        let mut d = settled_on(Left);
        let sent = run(&mut d, &[(Left, 300), (Left, 400), (Left, 500), (Left, 600)]);
        assert!(sent.is_empty());
    }

    #[test]
    fn oscillation_back_to_last_sent_sends_nothing() {
        let mut d = settled_on(Left);
        let sent = run(&mut d, &[(Left, 300), (Right, 330), (Left, 360), (Left, 700)]);
        assert!(sent.is_empty());
        assert_eq!(d.last_sent(), Some(Left));
    }

    #[test]
    fn settled_change_is_sent_exactly_once() {
        let mut d = settled_on(Left);
        let sent = run(
            &mut d,
            &[(Right, 300), (Right, 350), (Right, 420), (Right, 500), (Right, 900)],
        );
        assert_eq!(sent, vec![Right]);
    }

    #[test]
    fn intervening_observation_re_arms_delay() {
        let mut d = Debouncer::new(SETTLE);
        d.observe(Left, ms(0));
        d.observe(Right, ms(100));
        // Left's deadline would have been 120; Right re-armed to 220
        assert!(d.poll(ms(130)).is_none());
        assert_eq!(d.pending().unwrap().candidate, Right);
        assert_eq!(d.poll(ms(220)).unwrap().direction(), Right);
    }

    #[test]
    fn lost_faces_do_not_disturb_pending_send() {
        let mut d = Debouncer::new(SETTLE);
        let sent = run(
            &mut d,
            &[(Center, 0), (NoFace, 40), (EyesNotResolved, 80), (NoFace, 130)],
        );
        assert_eq!(sent, vec![Center]);
    }

    #[test]
    fn no_face_is_never_sent() {
        let mut d = Debouncer::new(SETTLE);
        let sent = run(&mut d, &[(NoFace, 0), (NoFace, 200), (NoFace, 400)]);
        assert!(sent.is_empty());
        assert!(d.pending().is_none());
    }

    #[test]
    fn blink_is_dispatched_like_any_direction() {
        let mut d = settled_on(Center);
        assert_eq!(run(&mut d, &[(Blink, 300), (Blink, 450)]), vec![Blink]);
    }

    #[test]
    fn reset_clears_everything() {
        let mut d = settled_on(Left);
        d.observe(Right, ms(300));
        d.reset();
        assert_eq!(d.last_sent(), None);
        assert!(d.pending().is_none());
        assert!(d.poll(ms(10_000)).is_none());
        // After a reset the same direction is sent again
        assert_eq!(run(&mut d, &[(Left, 11_000), (Left, 11_200)]), vec![Left]);
    }

    #[test]
    fn payload_round_trips_through_last_sent() {
        let mut d = Debouncer::new(SETTLE);
        let payload = run(&mut d, &[(Right, 0)]);
        assert!(payload.is_empty());
        let payload = d.on_direction(Right, ms(150)).unwrap();
        assert_eq!(Direction::from_payload(payload.as_bytes()), d.last_sent());
    }
}
