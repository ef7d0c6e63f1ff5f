//! Monotonic time source for the poll loops.
//!
//! The engine needs two things from its environment: a milliseconds-since-boot
//! reading for deadlines and the guard interval, and a way to yield between
//! polls. The delay half reuses the `embedded-hal` [`DelayNs`] trait so any
//! HAL delay provider can be composed in.
//!
//! - **`target_os = "espidf"`** — wraps `esp_timer_get_time()` and the
//!   FreeRTOS delay.
//! - **otherwise** — `std::time::Instant` and `std::thread::sleep` for host
//!   builds and tests.

use embedded_hal::delay::DelayNs;

/// Monotonic clock contract used by the engine and sessions.
///
/// Implementations must be monotonic; wall-clock time is never used.
pub trait Monotonic: DelayNs {
    /// Milliseconds since an arbitrary fixed origin (typically boot).
    fn now_ms(&self) -> u64;
}

/// Platform clock: ESP-IDF high-resolution timer on target, `Instant` on
/// the host.
pub struct SystemClock {
    #[cfg(not(all(target_os = "espidf", feature = "espidf")))]
    start: std::time::Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(all(target_os = "espidf", feature = "espidf")))]
            start: std::time::Instant::now(),
        }
    }
}

#[cfg(all(target_os = "espidf", feature = "espidf"))]
impl Monotonic for SystemClock {
    fn now_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }
}

#[cfg(all(target_os = "espidf", feature = "espidf"))]
impl DelayNs for SystemClock {
    fn delay_ns(&mut self, ns: u32) {
        esp_idf_hal::delay::Delay::new_default().delay_ns(ns);
    }
}

#[cfg(not(all(target_os = "espidf", feature = "espidf")))]
impl Monotonic for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[cfg(not(all(target_os = "espidf", feature = "espidf")))]
impl DelayNs for SystemClock {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }
}
