//! Transport seam for encoded MIDI bytes.
//!
//! The dispatcher writes every message to one [`MidiTransport`]; the device
//! build wires that to USB and/or serial, tests capture into a buffer. Use
//! [`Tee`] to send identical bytes on two transports at once.

/// A byte-oriented MIDI output.
pub trait MidiTransport {
    /// Send one complete message (2–3 bytes, status first).
    fn send(&mut self, bytes: &[u8]);
}

impl<T: MidiTransport + ?Sized> MidiTransport for &mut T {
    #[inline]
    fn send(&mut self, bytes: &[u8]) {
        (**self).send(bytes);
    }
}

/// Discards every message.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullTransport;

impl MidiTransport for NullTransport {
    #[inline]
    fn send(&mut self, _bytes: &[u8]) {}
}

/// Sends every message on both inner transports, in order.
#[derive(Clone, Copy, Debug, Default)]
pub struct Tee<A, B>(pub A, pub B);

impl<A: MidiTransport, B: MidiTransport> MidiTransport for Tee<A, B> {
    #[inline]
    fn send(&mut self, bytes: &[u8]) {
        self.0.send(bytes);
        self.1.send(bytes);
    }
}

/// Captures messages for tests and offline rendering.
#[cfg(feature = "std")]
#[derive(Clone, Debug, Default)]
pub struct BufferTransport {
    messages: Vec<Vec<u8>>,
}

#[cfg(feature = "std")]
impl BufferTransport {
    /// Create an empty capture buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages captured so far, oldest first.
    pub fn messages(&self) -> &[Vec<u8>] {
        &self.messages
    }

    /// Number of captured messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when nothing has been sent.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drain the capture buffer.
    pub fn take(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.messages)
    }

    /// Captured messages with the given status nibble (e.g. `0x90`).
    pub fn with_status(&self, nibble: u8) -> impl Iterator<Item = &Vec<u8>> {
        self.messages
            .iter()
            .filter(move |m| m.first().is_some_and(|s| s & 0xF0 == nibble))
    }
}

#[cfg(feature = "std")]
impl MidiTransport for BufferTransport {
    #[inline]
    fn send(&mut self, bytes: &[u8]) {
        self.messages.push(bytes.to_vec());
    }
}
