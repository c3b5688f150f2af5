//! cpal input capture
//!
//! Opens an input device, keeps the first channel of every frame, converts
//! it to i16 and pushes it into a lock-free ring buffer. The producer thread
//! drains the consumer half through [`CaptureStream`].

use super::{CaptureBackend, CaptureError, CaptureStream};
use crate::config::TrackerConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    Device, FromSample, Host, Sample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Source id selecting the host's default input device
pub const DEFAULT_SOURCE: &str = "default";

/// Input device information
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Device name (usable as a source id)
    pub name: String,
    /// Whether this is the host's default input
    pub is_default: bool,
    /// Number of input channels
    pub input_channels: u16,
    /// Supported sample rates
    pub sample_rates: Vec<u32>,
}

/// List available input devices on the default host
pub fn list_input_devices() -> Result<Vec<DeviceInfo>, CaptureError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::HostUnavailable(e.to_string()))?;

    let common_rates = [44100, 48000, 88200, 96000, 176400, 192000];
    let mut result = Vec::new();

    for device in devices {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let input_channels = device
            .default_input_config()
            .map(|c| c.channels())
            .unwrap_or(0);

        let mut sample_rates = Vec::new();
        if let Ok(configs) = device.supported_input_configs() {
            for config in configs {
                for &rate in &common_rates {
                    if (config.min_sample_rate().0..=config.max_sample_rate().0).contains(&rate)
                        && !sample_rates.contains(&rate)
                    {
                        sample_rates.push(rate);
                    }
                }
            }
        }
        sample_rates.sort();

        result.push(DeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            input_channels,
            sample_rates,
        });
    }

    Ok(result)
}

/// Capture backend for cpal input devices
#[derive(Debug, Clone)]
pub struct CpalBackend {
    sample_rate: u32,
    ring_capacity: usize,
}

impl CpalBackend {
    /// # Arguments
    /// * `sample_rate` - Requested capture rate in Hz
    /// * `ring_capacity` - Samples buffered between the callback and the producer
    pub fn new(sample_rate: u32, ring_capacity: usize) -> Self {
        Self {
            sample_rate,
            ring_capacity,
        }
    }

    /// Backend sized so the ring can hold more than the overload limit
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(
            config.sample_rate,
            (config.max_queued * 2).max(config.buffer_len * 4),
        )
    }

    /// Requested sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn find_device(host: &Host, source_id: &str) -> Result<Device, CaptureError> {
        if source_id.is_empty() || source_id == DEFAULT_SOURCE {
            return host
                .default_input_device()
                .ok_or_else(|| CaptureError::DeviceNotFound(DEFAULT_SOURCE.to_string()));
        }

        host.input_devices()
            .map_err(|e| CaptureError::HostUnavailable(e.to_string()))?
            .find(|d| d.name().map(|n| n == source_id).unwrap_or(false))
            .ok_or_else(|| CaptureError::DeviceNotFound(source_id.to_string()))
    }

    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        mut producer: HeapProd<i16>,
    ) -> Result<Stream, cpal::BuildStreamError>
    where
        T: SizedSample + Send + 'static,
        i16: FromSample<T>,
    {
        let channels = usize::from(config.channels.max(1));
        device.build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                for frame in data.chunks(channels) {
                    if let Some(&sample) = frame.first() {
                        // Full ring: drop the sample, the producer reports the overload
                        let _ = producer.try_push(i16::from_sample(sample));
                    }
                }
            },
            move |err| {
                tracing::error!("Input stream error: {}", err);
            },
            None,
        )
    }

    fn build_capture(
        &self,
        device: &Device,
        format: SampleFormat,
        config: &StreamConfig,
    ) -> Result<(Stream, HeapCons<i16>), CaptureError> {
        let (producer, consumer) = HeapRb::<i16>::new(self.ring_capacity).split();
        let stream = match format {
            SampleFormat::I16 => Self::build_stream::<i16>(device, config, producer),
            SampleFormat::U16 => Self::build_stream::<u16>(device, config, producer),
            SampleFormat::I32 => Self::build_stream::<i32>(device, config, producer),
            SampleFormat::F32 => Self::build_stream::<f32>(device, config, producer),
            other => {
                return Err(CaptureError::Init(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        };
        let stream = stream.map_err(|e| CaptureError::Init(e.to_string()))?;
        Ok((stream, consumer))
    }
}

impl CaptureBackend for CpalBackend {
    fn open(&self, source_id: &str) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let host = cpal::default_host();
        let device = Self::find_device(&host, source_id)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let default_config = device
            .default_input_config()
            .map_err(|e| CaptureError::Init(e.to_string()))?;
        let format = default_config.sample_format();
        let device_rate = default_config.sample_rate().0;

        tracing::info!(
            "Device default input config: {} Hz, {} channels, {:?}",
            device_rate,
            default_config.channels(),
            format
        );

        let mut config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        // Try the configured rate first, fall back to the device default
        let (stream, consumer, rate) = match self.build_capture(&device, format, &config) {
            Ok((stream, consumer)) => (stream, consumer, self.sample_rate),
            Err(e) if device_rate != self.sample_rate => {
                tracing::warn!(
                    "Sample rate {} Hz failed ({}), using device default {} Hz",
                    self.sample_rate,
                    e,
                    device_rate
                );
                config.sample_rate = SampleRate(device_rate);
                let (stream, consumer) = self.build_capture(&device, format, &config)?;
                (stream, consumer, device_rate)
            }
            Err(e) => return Err(e),
        };

        stream
            .play()
            .map_err(|e| CaptureError::Init(e.to_string()))?;

        tracing::info!(device = %device_name, sample_rate = rate, "Capture started");

        Ok(Box::new(CpalStream { stream, consumer }))
    }
}

/// Running cpal input stream and the consumer half of its ring buffer
struct CpalStream {
    stream: Stream,
    consumer: HeapCons<i16>,
}

impl CaptureStream for CpalStream {
    fn queued_samples(&self) -> usize {
        self.consumer.occupied_len()
    }

    fn clear(&mut self) {
        self.consumer.clear();
    }

    fn dequeue(&mut self, buffer: &mut [i16]) -> usize {
        self.consumer.pop_slice(buffer)
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        if let Err(e) = self.stream.pause() {
            tracing::debug!("Pausing capture stream failed: {}", e);
        }
        tracing::info!("Capture stream released");
    }
}
