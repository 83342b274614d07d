//! Decode an audio container file into raw interleaved PCM.
//!
//! This module only decodes; it does not resample or downmix. That is
//! deliberately left to [`crate::resample`], so the same normalization path
//! is used whether audio arrives from a file, a stream buffer, or any other
//! collaborator.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{EngineError, Result};

pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: usize,
}

/// Decode a file at `path` into interleaved `f32` samples at its native
/// sample rate and channel count.
pub fn load_audio_file(path: &Path) -> Result<DecodedAudio> {
    let to_decode_err = |e: Box<dyn std::error::Error + Send + Sync>| EngineError::Decode {
        path: path.to_path_buf(),
        source: e,
    };

    let src = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|s| s.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| to_decode_err(Box::new(e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
        .ok_or_else(|| to_decode_err("no compatible audio track found".into()))?;

    let dec_opts = DecoderOptions::default();
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &dec_opts)
        .map_err(|e| to_decode_err(Box::new(e)))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(44_100);
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1);
    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => {
                let params = format.tracks().iter().find(|t| t.id == track_id).map(|t| t.codec_params.clone());
                match params {
                    Some(params) => {
                        decoder = symphonia::default::get_codecs()
                            .make(&params, &dec_opts)
                            .map_err(|e| to_decode_err(Box::new(e)))?;
                        continue;
                    }
                    None => return Err(to_decode_err("track disappeared after reset".into())),
                }
            }
            Err(e) => return Err(to_decode_err(Box::new(e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count();

                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(to_decode_err(Box::new(e))),
        }
    }

    if samples.is_empty() {
        return Err(EngineError::EmptyInput);
    }

    Ok(DecodedAudio { samples, sample_rate, channels })
}
