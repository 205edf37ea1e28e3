//! Decode provider clips (mp3/wav) into mono f32 samples.

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{Result, VoiceError};
use crate::tts::{AudioFormat, SynthesizedClip};

/// Decode a synthesized clip to mono samples plus its sample rate.
///
/// # Errors
///
/// Returns an error if the container cannot be probed or decoded.
pub fn decode_clip(clip: &SynthesizedClip) -> Result<(Vec<f32>, u32)> {
    let cursor = std::io::Cursor::new(clip.bytes.clone());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(match clip.format {
        AudioFormat::Mp3 => "mp3",
        AudioFormat::Wav => "wav",
    });

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| VoiceError::Audio(format!("failed to probe clip: {e}")))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| VoiceError::Audio("no default audio track".into()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| VoiceError::Audio("unknown sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| VoiceError::Audio(format!("failed to create decoder: {e}")))?;

    let mut out: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(VoiceError::Audio(format!("clip read error: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // Skip corrupt frames instead of dropping the whole clip.
            Err(SymphError::DecodeError(_)) => continue,
            Err(e) => return Err(VoiceError::Audio(format!("clip decode error: {e}"))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let frames = decoded.frames() as u64;

        let required = (frames as usize).saturating_mul(channels);
        let needs_new = match sample_buf.as_ref() {
            Some(b) => b.capacity() < required,
            None => true,
        };
        if needs_new {
            sample_buf = Some(SampleBuffer::<f32>::new(frames, spec));
        } else if let Some(b) = sample_buf.as_mut() {
            b.clear();
        }

        if let Some(b) = sample_buf.as_mut() {
            b.copy_interleaved_ref(decoded);
        }

        let data = match sample_buf.as_ref() {
            Some(b) => b.samples(),
            None => &[],
        };
        if channels <= 1 {
            out.extend_from_slice(data);
        } else {
            for frame in data.chunks_exact(channels) {
                out.push(frame.iter().sum::<f32>() / channels as f32);
            }
        }
    }

    if out.is_empty() {
        return Err(VoiceError::Audio("clip decoded to no samples".into()));
    }

    Ok((out, sample_rate))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn wav_clip(samples: &[f32], sample_rate: u32) -> SynthesizedClip {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                let v = (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16;
                writer.write_sample(v).unwrap();
            }
            writer.finalize().unwrap();
        }
        SynthesizedClip {
            bytes: cursor.into_inner(),
            format: AudioFormat::Wav,
        }
    }

    #[test]
    fn wav_roundtrip_preserves_length_and_rate() {
        let sample_rate = 16_000;
        let tone: Vec<f32> = (0..sample_rate)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sample_rate as f32).sin())
            .collect();

        let clip = wav_clip(&tone, sample_rate);
        let (decoded, rate) = decode_clip(&clip).unwrap();
        assert_eq!(rate, sample_rate);
        assert_eq!(decoded.len(), tone.len());
        // Quantization noise only.
        let max_err = decoded
            .iter()
            .zip(&tone)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_err < 0.001, "max quantization error {max_err}");
    }

    #[test]
    fn garbage_bytes_error_out() {
        let clip = SynthesizedClip {
            bytes: vec![0u8; 64],
            format: AudioFormat::Mp3,
        };
        assert!(decode_clip(&clip).is_err());
    }
}
