//! Card LED fade-out
//!
//! The only sign of life after a veto: the card LED is pulse-width
//! modulated from a high-precision timer, starting fully on and fading to
//! dark over a few seconds.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::host::{Host, HostError};

/// One on/off cycle, 62.5 Hz
pub const FADE_PERIOD_US: u32 = 16_000;

/// Remaining on-time per cycle
pub struct LedFade {
    level: AtomicU32,
}

impl LedFade {
    pub const fn new() -> Self {
        Self { level: AtomicU32::new(FADE_PERIOD_US) }
    }

    pub fn reset(&self) {
        self.level.store(FADE_PERIOD_US, Ordering::Release);
    }

    pub fn level(&self) -> u32 {
        self.level.load(Ordering::Acquire)
    }

    /// Drive the LED for one half-cycle
    ///
    /// Returns how long this half-cycle lasts, `None` once the fade is over.
    pub fn step(&self, host: &dyn Host, on: bool) -> Option<u32> {
        let k = self.level();
        if k == 0 {
            return None;
        }

        host.set_card_led(on);
        let delay = if on { k } else { FADE_PERIOD_US - k };
        let next = k.saturating_sub((k / 32).max(16));
        self.level.store(next, Ordering::Release);
        Some(delay)
    }
}

impl Default for LedFade {
    fn default() -> Self {
        Self::new()
    }
}

static FADE: LedFade = LedFade::new();

/// Timer callback; `arg` is non-zero for the on half-cycle
pub fn fade_tick(host: &dyn Host, arg: usize) {
    let on = arg != 0;
    if let Some(delay) = FADE.step(host, on) {
        // Nothing to do if the timer pool ran dry; the LED just stays put
        let _ = host.schedule_timer(delay, fade_tick, usize::from(!on));
    } else {
        host.set_card_led(false);
    }
}

/// Start the fade `delay_us` from now
pub fn start_fade(host: &dyn Host, delay_us: u32) -> Result<(), HostError> {
    FADE.reset();
    host.schedule_timer(delay_us, fade_tick, 0)
}
