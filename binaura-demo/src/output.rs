//! Audio device output driving a fixed-period renderer.

use anyhow::{Context, Result, anyhow};
use binaura::{AudioBuffer, AudioSettings};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Serves device callbacks of any size from a renderer that only produces whole periods.
pub struct FixedPeriodAdapter<F> {
    render: F,
    block: AudioBuffer,
    carry_index: usize,
    carry_available: usize,
}

impl<F: FnMut(&mut AudioBuffer)> FixedPeriodAdapter<F> {
    pub fn new(frame_size: usize, render: F) -> Self {
        Self {
            render,
            block: AudioBuffer::new(2, frame_size),
            carry_index: 0,
            carry_available: 0,
        }
    }

    /// Fills an interleaved device buffer, rendering new periods as needed.
    ///
    /// Returns the number of frames written.
    pub fn fill(&mut self, out: &mut [f32], channels: usize) -> usize {
        if channels == 0 {
            return 0;
        }

        let mut frames = 0;
        for frame in out.chunks_exact_mut(channels) {
            if self.carry_index >= self.carry_available {
                (self.render)(&mut self.block);
                self.carry_index = 0;
                self.carry_available = self.block.num_frames();
                if self.carry_available == 0 {
                    frame.fill(0.0);
                    continue;
                }
            }

            let left = self.block.channel(0)[self.carry_index];
            let right = self.block.channel(1)[self.carry_index];
            self.carry_index += 1;

            if channels == 1 {
                frame[0] = 0.5 * (left + right);
            } else {
                frame[0] = left;
                frame[1] = right;
                frame[2..].fill(0.0);
            }
            frames += 1;
        }
        frames
    }
}

/// A running output stream on the default device.
pub struct OutputStream {
    stream: cpal::Stream,
    frames_played: Arc<AtomicUsize>,
}

impl OutputStream {
    /// Opens the default output device at the configured sample rate and starts pulling
    /// `frame_size` periods from `render`.
    pub fn start<F>(settings: AudioSettings, render: F) -> Result<Self>
    where
        F: FnMut(&mut AudioBuffer) + Send + 'static,
    {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("No default output device available"))?;
        let default_config = device
            .default_output_config()
            .context("Failed to get default output config")?;

        let config = cpal::StreamConfig {
            channels: default_config.channels(),
            sample_rate: cpal::SampleRate(settings.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        log::info!(
            "Opening output device {} ({} channels, {} Hz)",
            device.name().unwrap_or_else(|_| "<unknown>".into()),
            config.channels,
            config.sample_rate.0
        );

        let adapter = FixedPeriodAdapter::new(settings.frame_size, render);
        let scratch_len = settings.frame_size * config.channels as usize;
        let frames_played = Arc::new(AtomicUsize::new(0));

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => {
                build_stream::<f32, F>(&device, &config, adapter, scratch_len, frames_played.clone())?
            }
            cpal::SampleFormat::I16 => {
                build_stream::<i16, F>(&device, &config, adapter, scratch_len, frames_played.clone())?
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16, F>(&device, &config, adapter, scratch_len, frames_played.clone())?
            }
            format => return Err(anyhow!("Unsupported sample format {:?}", format)),
        };
        stream.play().context("Failed to start stream")?;

        Ok(Self {
            stream,
            frames_played,
        })
    }

    pub fn frames_played(&self) -> usize {
        self.frames_played.load(Ordering::Relaxed)
    }

    pub fn stop(self) -> Result<()> {
        self.stream.pause().context("Failed to stop stream")?;
        Ok(())
    }
}

fn build_stream<T, F>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut adapter: FixedPeriodAdapter<F>,
    scratch_len: usize,
    frames_played: Arc<AtomicUsize>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
    F: FnMut(&mut AudioBuffer) + Send + 'static,
{
    let channels = config.channels as usize;
    // Whole device frames, allocated before the stream starts.
    let mut scratch = vec![0.0f32; scratch_len.max(channels).max(1)];

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = write_device_buffer(&mut adapter, &mut scratch, channels, data);
                frames_played.fetch_add(frames, Ordering::Relaxed);
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .context("Failed to build output stream")?;

    Ok(stream)
}

/// Fills `data` through `scratch` one chunk at a time so callbacks of any size never allocate.
fn write_device_buffer<T, F>(
    adapter: &mut FixedPeriodAdapter<F>,
    scratch: &mut [f32],
    channels: usize,
    data: &mut [T],
) -> usize
where
    T: SizedSample + FromSample<f32>,
    F: FnMut(&mut AudioBuffer),
{
    let mut frames = 0;
    for chunk in data.chunks_mut(scratch.len().max(1)) {
        let scratch = &mut scratch[..chunk.len()];
        frames += adapter.fill(scratch, channels);
        for (out, &sample) in chunk.iter_mut().zip(scratch.iter()) {
            *out = T::from_sample(sample);
        }
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_renderer() -> impl FnMut(&mut AudioBuffer) {
        let mut next = 0.0f32;
        move |block: &mut AudioBuffer| {
            let frames = block.num_frames();
            for i in 0..frames {
                block.channel_mut(0)[i] = next + i as f32;
                block.channel_mut(1)[i] = -(next + i as f32);
            }
            next += frames as f32;
        }
    }

    #[test]
    fn test_callbacks_smaller_than_period_are_continuous() {
        let mut adapter = FixedPeriodAdapter::new(8, counting_renderer());
        let mut collected = Vec::new();
        for _ in 0..5 {
            let mut out = [0.0f32; 6];
            assert_eq!(adapter.fill(&mut out, 2), 3);
            collected.extend(out.chunks(2).map(|frame| frame[0]));
        }
        let expected: Vec<f32> = (0..15).map(|i| i as f32).collect();
        assert_eq!(collected, expected);
    }

    #[test]
    fn test_callback_larger_than_period() {
        let mut renders = 0;
        let mut adapter = FixedPeriodAdapter::new(4, |block: &mut AudioBuffer| {
            renders += 1;
            block.data_mut().fill(0.25);
        });
        let mut out = [0.0f32; 20];

        assert_eq!(adapter.fill(&mut out, 2), 10);
        drop(adapter);
        assert_eq!(renders, 3);
        assert!(out.iter().all(|&s| s == 0.25));
    }

    #[test]
    fn test_mono_and_surround_devices() {
        let mut adapter = FixedPeriodAdapter::new(4, counting_renderer());
        let mut mono = [1.0f32; 4];
        adapter.fill(&mut mono, 1);
        assert!(mono.iter().all(|&s| s == 0.0));

        let mut surround = [1.0f32; 12];
        adapter.fill(&mut surround, 6);
        assert_eq!(&surround[..6], &[4.0, -4.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_device_buffer_larger_than_scratch() {
        let mut adapter = FixedPeriodAdapter::new(4, counting_renderer());
        let mut scratch = vec![0.0f32; 8];
        let mut data = [0.0f32; 40];

        assert_eq!(write_device_buffer(&mut adapter, &mut scratch, 2, &mut data), 20);
        assert_eq!(scratch.len(), 8);
        let left: Vec<f32> = data.chunks(2).map(|frame| frame[0]).collect();
        let expected: Vec<f32> = (0..20).map(|i| i as f32).collect();
        assert_eq!(left, expected);
        assert_eq!(data[39], -19.0);
    }
}
