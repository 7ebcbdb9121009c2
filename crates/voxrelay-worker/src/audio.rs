//! WAV encode/decode helpers
//!
//! Used by the stub backend and by voice cloning, which concatenates
//! reference clips into one mono file.

use std::io::Cursor;

use bytes::Bytes;
use voxrelay_core::Error;

pub const STUB_SAMPLE_RATE: u32 = 22_050;

fn wav_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Bytes, Error> {
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, wav_spec(sample_rate))
        .map_err(|e| Error::Audio(format!("failed to open WAV writer: {e}")))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| Error::Audio(format!("failed to write WAV sample: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| Error::Audio(format!("failed to finalize WAV: {e}")))?;
    Ok(Bytes::from(cursor.into_inner()))
}

/// Decodes a WAV payload to mono i16 samples. Float input is rescaled.
pub fn decode_wav(data: &[u8]) -> Result<(Vec<i16>, u32), Error> {
    let reader = hound::WavReader::new(Cursor::new(data))
        .map_err(|e| Error::Audio(format!("not a readable WAV file: {e}")))?;
    let spec = reader.spec();
    let samples = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Error::Audio(format!("corrupt WAV samples: {e}")))?,
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Error::Audio(format!("corrupt WAV samples: {e}")))?,
    };
    Ok((samples, spec.sample_rate))
}

/// Concatenates reference clips into a single mono WAV. All clips must
/// share a sample rate.
pub fn concat_wavs(files: &[(String, Bytes)]) -> Result<Bytes, Error> {
    let mut combined = Vec::new();
    let mut sample_rate = None;
    for (filename, data) in files {
        let (samples, rate) = decode_wav(data)
            .map_err(|e| Error::Audio(format!("{filename}: {e}")))?;
        match sample_rate {
            None => sample_rate = Some(rate),
            Some(existing) if existing != rate => {
                return Err(Error::Validation(format!(
                    "{filename}: sample rate {rate} does not match {existing}"
                )));
            }
            _ => {}
        }
        combined.extend_from_slice(&samples);
    }
    let rate =
        sample_rate.ok_or_else(|| Error::Validation("no reference audio supplied".to_string()))?;
    encode_wav(&combined, rate)
}
