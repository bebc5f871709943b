use crate::buffer::AudioBuffer;

/// A pull-based node in the host audio graph.
pub trait AudioNode: Send {
    /// Renders `frames` frames into `output`.
    ///
    /// `input` is `None` when nothing is connected upstream. Implementations write silence
    /// rather than fail.
    fn process(&mut self, input: Option<&AudioBuffer>, output: &mut AudioBuffer, frames: usize);

    /// Clears internal filter state without releasing resources.
    fn reset(&mut self);

    /// Seconds of output still produced after input stops.
    fn tail_time(&self) -> f64;

    /// Processing latency in seconds.
    fn latency_time(&self) -> f64 {
        0.0
    }
}
