//! Audio re-encoding for uploads the provider cannot read directly
//!
//! Decodes any container/codec symphonia understands (plus Opus through
//! libopus, which browsers use for `audio/webm` recordings) and writes the
//! samples as 16-bit PCM WAV at the source rate and channel count.

use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;
use std::sync::OnceLock;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecRegistry, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia_adapter_libopus::OpusDecoder;

/// Converts an audio file into a WAV file
pub trait AudioTranscoder: Send + Sync {
    /// Decode `source` and write it to `dest` as 16-bit PCM WAV
    ///
    /// Blocking; callers run it on the blocking pool.
    fn transcode_to_wav(&self, source: &Path, dest: &Path) -> Result<()>;
}

/// Codec registry with Opus registered ahead of the symphonia defaults
fn codec_registry() -> &'static CodecRegistry {
    static CODEC_REGISTRY: OnceLock<CodecRegistry> = OnceLock::new();
    CODEC_REGISTRY.get_or_init(|| {
        let mut registry = CodecRegistry::new();
        registry.register_all::<OpusDecoder>();
        symphonia::default::register_enabled_codecs(&mut registry);
        registry
    })
}

/// [`AudioTranscoder`] backed by symphonia (decode) and hound (encode)
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaTranscoder;

impl AudioTranscoder for SymphoniaTranscoder {
    fn transcode_to_wav(&self, source: &Path, dest: &Path) -> Result<()> {
        tracing::debug!(source = %source.display(), "Transcoding audio to WAV");

        let file = std::fs::File::open(source)
            .with_context(|| format!("Failed to open audio file: {}", source.display()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = source.extension().and_then(|e| e.to_str()) {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .context("Unrecognized audio container")?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .context("No audio track found")?;
        let track_id = track.id;

        let mut decoder = codec_registry()
            .make(&track.codec_params, &DecoderOptions::default())
            .context("Unsupported audio codec")?;

        let mut writer: Option<WavWriter<std::io::BufWriter<std::fs::File>>> = None;
        let mut sample_buf: Option<SampleBuffer<i16>> = None;
        let mut frames_written: u64 = 0;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(anyhow::anyhow!("Error reading packet: {}", e)),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                // Corrupt packet: skip it, keep the rest of the recording
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::warn!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(e) => return Err(anyhow::anyhow!("Decode failed: {}", e)),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count();

            if writer.is_none() {
                let wav_spec = WavSpec {
                    channels: channels as u16,
                    sample_rate: spec.rate,
                    bits_per_sample: 16,
                    sample_format: SampleFormat::Int,
                };
                writer = Some(
                    WavWriter::create(dest, wav_spec)
                        .with_context(|| format!("Failed to create {}", dest.display()))?,
                );
            }

            let buf = sample_buf
                .get_or_insert_with(|| SampleBuffer::<i16>::new(decoded.capacity() as u64, spec));
            buf.copy_interleaved_ref(decoded);

            if let Some(writer) = writer.as_mut() {
                for &sample in buf.samples() {
                    writer.write_sample(sample)?;
                }
            }
            frames_written += (buf.samples().len() / channels.max(1)) as u64;
        }

        let writer = writer.context("Audio contained no decodable frames")?;
        writer.finalize().context("Failed to finalize WAV file")?;

        tracing::debug!(dest = %dest.display(), frames = frames_written, "Transcode complete");
        Ok(())
    }
}
