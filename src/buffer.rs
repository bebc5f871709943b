//! Deinterleaved multichannel sample buffers.

/// A planar (channel-major) block of `f32` samples.
///
/// Channel `c` occupies `data[c * num_frames..(c + 1) * num_frames]`, the layout Steam Audio
/// expects for its deinterleaved buffers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioBuffer {
    data: Vec<f32>,
    num_channels: usize,
    num_frames: usize,
}

impl AudioBuffer {
    /// Creates a zeroed buffer.
    pub fn new(num_channels: usize, num_frames: usize) -> Self {
        Self {
            data: vec![0.0; num_channels * num_frames],
            num_channels,
            num_frames,
        }
    }

    /// Builds a buffer from one slice per channel. All channels are truncated to the shortest.
    pub fn from_channels(channels: &[&[f32]]) -> Self {
        let num_frames = channels.iter().map(|c| c.len()).min().unwrap_or(0);
        let mut buffer = Self::new(channels.len(), num_frames);
        for (index, channel) in channels.iter().enumerate() {
            buffer
                .channel_mut(index)
                .copy_from_slice(&channel[..num_frames]);
        }
        buffer
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        let start = index * self.num_frames;
        &self.data[start..start + self.num_frames]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        let start = index * self.num_frames;
        &mut self.data[start..start + self.num_frames]
    }

    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        // `max(1)` keeps `chunks_exact` happy for zero-frame buffers, which hold no data anyway.
        self.data.chunks_exact(self.num_frames.max(1))
    }

    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut [f32]> {
        self.data.chunks_exact_mut(self.num_frames.max(1))
    }

    /// Raw planar samples.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Zeroes every sample.
    pub fn silence(&mut self) {
        self.data.fill(0.0);
    }

    pub fn is_silent(&self) -> bool {
        self.data.iter().all(|&sample| sample == 0.0)
    }

    /// Resizes to the given dimensions. Returns `true` only when storage was reallocated, which
    /// happens exactly when either dimension changed.
    pub fn resize(&mut self, num_channels: usize, num_frames: usize) -> bool {
        if self.num_channels == num_channels && self.num_frames == num_frames {
            return false;
        }
        *self = Self::new(num_channels, num_frames);
        true
    }

    /// Writes samples interleaved into `out`, stopping at whichever runs out first.
    /// Returns the number of frames written.
    pub fn write_interleaved(&self, out: &mut [f32]) -> usize {
        if self.num_channels == 0 {
            return 0;
        }
        let frames = (out.len() / self.num_channels).min(self.num_frames);
        for (channel_index, channel) in self.channels().enumerate() {
            for (frame, &sample) in channel[..frames].iter().enumerate() {
                out[frame * self.num_channels + channel_index] = sample;
            }
        }
        frames
    }

    /// Peak absolute sample value of a channel.
    pub fn peak(&self, index: usize) -> f32 {
        self.channel(index)
            .iter()
            .fold(0.0f32, |peak, &sample| peak.max(sample.abs()))
    }
}
