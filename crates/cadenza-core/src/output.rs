//! CPAL audio output driving a [`Renderer`].

use crate::render::Renderer;
use crate::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

/// Wrapper to hold `cpal::Stream` in a `Send` context.
///
/// # Safety
/// `cpal::Stream` is `!Send` due to platform internals. The handle is only
/// kept alive and dropped; it is never used from another thread.
struct StreamHandle(#[allow(dead_code)] cpal::Stream);

unsafe impl Send for StreamHandle {}

/// Streams a renderer to an output device until dropped.
pub struct AudioOutput {
    device_index: Option<usize>,
    sample_rate: f64,
    channels: usize,
    _stream: StreamHandle,
}

impl AudioOutput {
    /// Open the device (default device if `None`) and start rendering.
    ///
    /// The stream runs at the renderer's sample rate and channel count.
    pub fn start(renderer: Renderer, device_index: Option<usize>) -> Result<Self> {
        let device = get_device(device_index)?;
        let sample_format = device.default_output_config()?.sample_format();

        let sample_rate = renderer.sample_rate();
        let channels = renderer.channels();
        let config = cpal::StreamConfig {
            channels: channels as u16,
            sample_rate: cpal::SampleRate(sample_rate as u32),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, renderer)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, renderer)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, renderer)?,
            format => {
                return Err(Error::InvalidConfig(format!(
                    "Unsupported sample format: {format:?}"
                )));
            }
        };

        stream.play()?;
        tracing::debug!(
            "Audio output started: {} Hz, {} channels",
            sample_rate,
            channels
        );

        Ok(Self {
            device_index,
            sample_rate,
            channels,
            _stream: StreamHandle(stream),
        })
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn device_name(&self) -> Result<String> {
        get_device(self.device_index)?
            .name()
            .map_err(|e| Error::InvalidDevice(e.to_string()))
    }

    /// Output devices as `"<index>: <name>"`.
    pub fn list_devices() -> Result<Vec<String>> {
        cpal::default_host()
            .output_devices()?
            .enumerate()
            .map(|(i, d)| {
                d.name()
                    .map(|name| format!("{i}: {name}"))
                    .map_err(|e| Error::InvalidDevice(e.to_string()))
            })
            .collect()
    }
}

fn get_device(index: Option<usize>) -> Result<cpal::Device> {
    let host = cpal::default_host();

    match index {
        Some(i) => {
            let devices: Vec<_> = host.output_devices()?.collect();
            let count = devices.len();
            devices.into_iter().nth(i).ok_or_else(|| {
                Error::InvalidDevice(format!("Device index {i} out of range ({count} available)"))
            })
        }
        None => host
            .default_output_device()
            .ok_or_else(|| Error::InvalidDevice("No output device available".into())),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut renderer: Renderer,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    // Grows on the first callback, then stays put.
    let mut scratch = Vec::<f32>::new();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                if scratch.len() < data.len() {
                    scratch.resize(data.len(), 0.0);
                }
                let buf = &mut scratch[..data.len()];
                renderer.render(buf);
                for (out, &sample) in data.iter_mut().zip(buf.iter()) {
                    *out = T::from_sample(sample);
                }
            }));

            if result.is_err() {
                output_silence(data);
            }
        },
        |err| tracing::warn!("Audio stream error: {}", err),
        None,
    )?;

    Ok(stream)
}

/// Output silence (panic recovery).
#[inline]
fn output_silence<T: cpal::SizedSample + cpal::FromSample<f32>>(data: &mut [T]) {
    for sample in data.iter_mut() {
        *sample = T::from_sample(0.0);
    }
}
