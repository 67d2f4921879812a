/// FlightSlot - identity of one in-flight frame replica
///
/// Per-frame-mutable resources own one allocation per flight slot; exactly
/// one slot is "current" at any time and advances round-robin each frame.
/// The slot is always passed explicitly to operations that need it, never
/// read from ambient state.

/// One of N rotating frame slots, an index in `[0, N)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlightSlot(usize);

impl FlightSlot {
    /// First slot
    pub const ZERO: FlightSlot = FlightSlot(0);

    /// Create a slot from its index
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Index in `[0, N)`
    pub fn index(&self) -> usize {
        self.0
    }

    /// The slot after this one, wrapping at `frames_in_flight`
    pub fn next(&self, frames_in_flight: usize) -> Self {
        Self((self.0 + 1) % frames_in_flight)
    }
}

#[cfg(test)]
#[path = "flight_slot_tests.rs"]
mod tests;
