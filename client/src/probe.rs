//! Round-trip latency probe.
//!
//! Every `ping_every` frames the probe emits a Ping carrying the milliseconds
//! elapsed since its epoch, truncated to 32 bits. The server echoes the
//! timestamp untouched and the difference on arrival is the round trip.
//! Subtraction wraps, so a probe that runs for longer than `u32::MAX`
//! milliseconds still measures correctly.

use log::trace;
use shared::Frame;
use std::time::Instant;

pub const DEFAULT_PING_EVERY: u32 = 30;

#[derive(Debug, Clone)]
pub struct LatencyProbe {
    ping_every: u32,
    frame: u32,
    epoch: Instant,
    last_rtt: Option<u32>,
    samples: u32,
    total_rtt: u64,
}

impl LatencyProbe {
    pub fn new(ping_every: u32) -> Self {
        Self::with_epoch(ping_every, Instant::now())
    }

    pub fn with_epoch(ping_every: u32, epoch: Instant) -> Self {
        Self {
            ping_every: ping_every.max(1),
            frame: 0,
            epoch,
            last_rtt: None,
            samples: 0,
            total_rtt: 0,
        }
    }

    /// Milliseconds since the epoch, truncated to 32 bits.
    pub fn timestamp_at(&self, now: Instant) -> u32 {
        now.saturating_duration_since(self.epoch).as_millis() as u32
    }

    /// Counts one frame. Returns a Ping when this frame is due one.
    pub fn on_frame(&mut self) -> Option<Frame> {
        self.on_frame_at(Instant::now())
    }

    pub fn on_frame_at(&mut self, now: Instant) -> Option<Frame> {
        self.frame = self.frame.wrapping_add(1);
        if self.frame % self.ping_every == 0 {
            Some(Frame::Ping {
                timestamp: self.timestamp_at(now),
            })
        } else {
            None
        }
    }

    /// Records the round trip for an echoed timestamp and returns it.
    pub fn on_pong(&mut self, timestamp: u32) -> u32 {
        self.on_pong_at(timestamp, Instant::now())
    }

    pub fn on_pong_at(&mut self, timestamp: u32, now: Instant) -> u32 {
        let rtt = self.timestamp_at(now).wrapping_sub(timestamp);
        trace!("Round trip {} ms", rtt);
        self.last_rtt = Some(rtt);
        self.samples += 1;
        self.total_rtt += rtt as u64;
        rtt
    }

    pub fn last_rtt(&self) -> Option<u32> {
        self.last_rtt
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Mean over every recorded sample.
    pub fn average_rtt(&self) -> Option<f64> {
        if self.samples == 0 {
            None
        } else {
            Some(self.total_rtt as f64 / self.samples as f64)
        }
    }
}

impl Default for LatencyProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PING_EVERY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_ping_every_n_frames() {
        let epoch = Instant::now();
        let mut probe = LatencyProbe::with_epoch(3, epoch);

        let pings: Vec<bool> = (0..9)
            .map(|_| probe.on_frame_at(epoch).is_some())
            .collect();
        assert_eq!(
            pings,
            vec![false, false, true, false, false, true, false, false, true]
        );
    }

    #[test]
    fn test_ping_carries_elapsed_millis() {
        let epoch = Instant::now();
        let mut probe = LatencyProbe::with_epoch(1, epoch);

        let ping = probe.on_frame_at(epoch + Duration::from_millis(1500));
        assert_eq!(ping, Some(Frame::Ping { timestamp: 1500 }));
    }

    #[test]
    fn test_pong_measures_round_trip() {
        let epoch = Instant::now();
        let mut probe = LatencyProbe::with_epoch(1, epoch);
        assert_eq!(probe.average_rtt(), None);

        let rtt = probe.on_pong_at(100, epoch + Duration::from_millis(140));
        assert_eq!(rtt, 40);
        probe.on_pong_at(200, epoch + Duration::from_millis(260));

        assert_eq!(probe.last_rtt(), Some(60));
        assert_eq!(probe.samples(), 2);
        assert_eq!(probe.average_rtt(), Some(50.0));
    }

    #[test]
    fn test_round_trip_across_wrap() {
        let epoch = Instant::now();
        let mut probe = LatencyProbe::with_epoch(1, epoch);

        // Sent just before the 32-bit counter wrapped, received 25 ms later.
        let sent = u32::MAX - 4;
        let now = epoch + Duration::from_millis(20);
        assert_eq!(probe.on_pong_at(sent, now), 25);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let mut probe = LatencyProbe::new(0);
        assert!(probe.on_frame().is_some());
    }
}
