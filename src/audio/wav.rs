//! Uncompressed PCM WAV container used for every synthesized chunk.
//!
//! Encoding always writes the canonical 44-byte header. Decoding goes through
//! `hound`, so containers carrying extension chunks (`LIST`, `fact`, ...) are
//! accepted and their real data offset is honoured when stitching.

use crate::defaults;
use crate::error::{PipertrayError, Result};
use std::fmt;
use std::io::Cursor;
use std::time::Duration;

/// Size of the canonical RIFF/WAVE header written by [`AudioContainer::encode`].
pub const HEADER_LEN: usize = 44;

/// PCM sample layout of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
}

impl AudioFormat {
    /// The layout piper emits with `--output-raw`.
    pub const PIPER: AudioFormat = AudioFormat {
        sample_rate: defaults::SAMPLE_RATE,
        bits_per_sample: defaults::BITS_PER_SAMPLE,
        channels: defaults::CHANNELS,
    };

    /// Bytes per frame (all channels of one sample instant).
    pub fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * u32::from(self.block_align())
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::PIPER
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels = match self.channels {
            1 => "mono".to_string(),
            2 => "stereo".to_string(),
            n => format!("{n}ch"),
        };
        write!(
            f,
            "{}Hz {} {}-bit",
            self.sample_rate, channels, self.bits_per_sample
        )
    }
}

/// A complete WAV file in memory: header plus raw little-endian samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioContainer {
    format: AudioFormat,
    bytes: Vec<u8>,
    data_offset: usize,
    data_len: usize,
}

impl AudioContainer {
    /// Wrap raw PCM sample bytes in a canonical 44-byte WAV header.
    ///
    /// Fails if the sample bytes are not a whole number of frames or do not
    /// fit the 32-bit RIFF size fields.
    pub fn encode(samples: &[u8], format: AudioFormat) -> Result<Self> {
        let block_align = usize::from(format.block_align());
        if block_align == 0 || samples.len() % block_align != 0 {
            return Err(PipertrayError::MalformedAudio {
                message: format!(
                    "{} sample bytes is not a multiple of the {}-byte frame size",
                    samples.len(),
                    block_align
                ),
            });
        }
        let data_len = u32::try_from(samples.len())
            .ok()
            .filter(|len| *len <= u32::MAX - 36)
            .ok_or_else(|| PipertrayError::MalformedAudio {
                message: format!("{} sample bytes exceed the WAV size limit", samples.len()),
            })?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + samples.len());
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&format.channels.to_le_bytes());
        bytes.extend_from_slice(&format.sample_rate.to_le_bytes());
        bytes.extend_from_slice(&format.byte_rate().to_le_bytes());
        bytes.extend_from_slice(&format.block_align().to_le_bytes());
        bytes.extend_from_slice(&format.bits_per_sample.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        bytes.extend_from_slice(samples);

        Ok(Self {
            format,
            bytes,
            data_offset: HEADER_LEN,
            data_len: samples.len(),
        })
    }

    /// Wrap raw backend output (22050 Hz, 16-bit, mono).
    pub fn from_pcm(samples: &[u8]) -> Result<Self> {
        Self::encode(samples, AudioFormat::PIPER)
    }

    /// Parse a WAV file, locating the data chunk wherever it is.
    pub fn decode(bytes: Vec<u8>) -> Result<Self> {
        let reader = hound::WavReader::new(Cursor::new(bytes.as_slice())).map_err(|e| {
            PipertrayError::MalformedAudio {
                message: format!("Failed to parse WAV container: {}", e),
            }
        })?;

        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int {
            return Err(PipertrayError::MalformedAudio {
                message: "only integer PCM containers are supported".to_string(),
            });
        }

        let format = AudioFormat {
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
            channels: spec.channels,
        };
        let data_len = reader.len() as usize * usize::from(spec.bits_per_sample / 8);
        // hound stops reading right after the data chunk header.
        let data_offset = reader.into_inner().position() as usize;

        if data_offset + data_len > bytes.len() {
            return Err(PipertrayError::MalformedAudio {
                message: format!(
                    "data chunk declares {} bytes but only {} follow the header",
                    data_len,
                    bytes.len() - data_offset
                ),
            });
        }

        Ok(Self {
            format,
            bytes,
            data_offset,
            data_len,
        })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Raw sample bytes without any header.
    pub fn samples(&self) -> &[u8] {
        &self.bytes[self.data_offset..self.data_offset + self.data_len]
    }

    /// The complete file, header included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Byte offset of the first sample.
    pub fn data_offset(&self) -> usize {
        self.data_offset
    }

    /// Total size of the file in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when the container carries no samples.
    pub fn is_empty(&self) -> bool {
        self.data_len == 0
    }

    /// Playback length of the samples.
    pub fn duration(&self) -> Duration {
        let byte_rate = self.format.byte_rate();
        if byte_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.data_len as f64 / f64::from(byte_rate))
    }
}

/// Join containers into one, in order.
///
/// A single container is returned as-is. Every container must share the first
/// one's format; each contributes its own data chunk, so non-canonical headers
/// are handled instead of being copied into the audio.
pub fn concat(containers: &[AudioContainer]) -> Result<AudioContainer> {
    let Some(first) = containers.first() else {
        return AudioContainer::encode(&[], AudioFormat::PIPER);
    };
    if containers.len() == 1 {
        return Ok(first.clone());
    }

    let format = first.format();
    let total: usize = containers.iter().map(|c| c.samples().len()).sum();
    let mut samples = Vec::with_capacity(total);

    for container in containers {
        if container.format() != format {
            return Err(PipertrayError::AudioFormatMismatch {
                expected: format.to_string(),
                actual: container.format().to_string(),
            });
        }
        samples.extend_from_slice(container.samples());
    }

    AudioContainer::encode(&samples, format)
}

/// Join raw WAV buffers, skipping any shorter than a canonical header.
pub fn concat_wav_bytes(buffers: &[&[u8]]) -> Result<AudioContainer> {
    let containers = buffers
        .iter()
        .filter(|buffer| buffer.len() >= HEADER_LEN)
        .map(|buffer| AudioContainer::decode(buffer.to_vec()))
        .collect::<Result<Vec<_>>>()?;
    concat(&containers)
}
