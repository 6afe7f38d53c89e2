//! Audio output seam.
//!
//! The engine treats the output peripheral as a pure "set level" sink: one
//! 8-bit duty-cycle value per tick, no feedback. Firmware implements
//! [`AudioSink`] over a PWM slice; tests and the host CLI capture into a
//! buffer.

/// One PWM (or equivalent) output channel.
pub trait AudioSink {
    /// Latch the duty-cycle value for the current tick (128 = silence).
    fn write(&mut self, level: u8);
}

impl<S: AudioSink + ?Sized> AudioSink for &mut S {
    #[inline]
    fn write(&mut self, level: u8) {
        (**self).write(level);
    }
}

/// Discards every sample.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    #[inline]
    fn write(&mut self, _level: u8) {}
}

/// Fan-out to two output channels, written identically each tick.
#[derive(Clone, Copy, Debug, Default)]
pub struct DualSink<A, B>(pub A, pub B);

impl<A: AudioSink, B: AudioSink> AudioSink for DualSink<A, B> {
    #[inline]
    fn write(&mut self, level: u8) {
        self.0.write(level);
        self.1.write(level);
    }
}

/// Captures samples for tests and offline rendering.
#[cfg(feature = "std")]
#[derive(Clone, Debug, Default)]
pub struct BufferSink {
    samples: Vec<u8>,
}

#[cfg(feature = "std")]
impl BufferSink {
    /// Create an empty capture buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples captured so far.
    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    /// Drain the buffer.
    pub fn take(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.samples)
    }
}

#[cfg(feature = "std")]
impl AudioSink for BufferSink {
    #[inline]
    fn write(&mut self, level: u8) {
        self.samples.push(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dual_sink_writes_both_channels() {
        let mut sink = DualSink(BufferSink::new(), BufferSink::new());
        sink.write(17);
        sink.write(200);
        assert_eq!(sink.0.samples(), &[17, 200]);
        assert_eq!(sink.1.samples(), &[17, 200]);
    }

    #[test]
    fn buffer_sink_take_empties() {
        let mut sink = BufferSink::new();
        sink.write(5);
        assert_eq!(sink.take(), vec![5]);
        assert!(sink.samples().is_empty());
    }
}
