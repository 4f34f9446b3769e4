use std::io::Cursor;

use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

#[derive(thiserror::Error, Debug)]
pub enum AudioError {
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("Resampler setup failed: {0}")]
    ResamplerSetup(#[from] rubato::ResamplerConstructionError),
    #[error("Resampling failed: {0}")]
    Resample(#[from] rubato::ResampleError),
    #[error("Unsupported WAV format: {0}")]
    Unsupported(String),
    #[error("Waves do not match: expected {expected_rate} Hz x{expected_channels}, got {rate} Hz x{channels}")]
    Mismatch {
        expected_rate: u32,
        expected_channels: u16,
        rate: u32,
        channels: u16,
    },
    #[error("No waves to connect")]
    Empty,
}

/// Interleaved audio samples in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Wave {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Wave {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    /// Duplicate a mono wave into two interleaved channels.
    pub fn into_stereo(self) -> Self {
        if self.channels != 1 {
            return self;
        }
        let samples = self.samples.iter().flat_map(|&s| [s, s]).collect();
        Self {
            samples,
            sample_rate: self.sample_rate,
            channels: 2,
        }
    }

    /// Encode as 16-bit PCM WAV.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>, AudioError> {
        let mut buf = Cursor::new(Vec::<u8>::new());
        {
            let mut writer = hound::WavWriter::new(&mut buf, self.spec())?;
            for &sample in &self.samples {
                writer.write_sample(to_pcm16(sample))?;
            }
            writer.finalize()?;
        }
        Ok(buf.into_inner())
    }

    /// Decode a 16-bit PCM or 32-bit float WAV.
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self, AudioError> {
        let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();
        let samples = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Int, 16) => reader
                .samples::<i16>()
                .map(|s| s.map(|v| f32::from(v) / 32768.0))
                .collect::<Result<Vec<_>, _>>()?,
            (hound::SampleFormat::Float, 32) => {
                reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?
            }
            (format, bits) => {
                return Err(AudioError::Unsupported(format!("{format:?} {bits}-bit")));
            }
        };
        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        })
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.channels) / f64::from(self.sample_rate)
    }

    fn spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }
}

fn to_pcm16(sample: f32) -> i16 {
    let x = sample.clamp(-1.0, 1.0);
    if x >= 0.0 {
        (x * 32767.0).round() as i16
    } else {
        (x * 32768.0).round() as i16
    }
}

/// Resample mono samples with a sinc interpolator.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, AudioError> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = f64::from(to_rate) / f64::from(from_rate);
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)?;

    let expected = (samples.len() as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();

    let input = vec![samples.to_vec()];
    let mut output = first_channel(resampler.process(&input, None)?);
    // Flush the filter until the delayed tail has come out.
    while output.len() < delay + expected {
        let tail = first_channel(resampler.process_partial(None::<&[Vec<f32>]>, None)?);
        if tail.is_empty() {
            break;
        }
        output.extend(tail);
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);
    Ok(output)
}

fn first_channel(channels: Vec<Vec<f32>>) -> Vec<f32> {
    channels.into_iter().next().unwrap_or_default()
}

/// Concatenate WAV files that share a sample rate and channel count.
pub fn connect_waves(waves: &[Vec<u8>]) -> Result<Wave, AudioError> {
    let mut decoded = waves.iter().map(|bytes| Wave::from_wav_bytes(bytes));
    let mut joined = decoded.next().ok_or(AudioError::Empty)??;
    for wave in decoded {
        let wave = wave?;
        if wave.sample_rate != joined.sample_rate || wave.channels != joined.channels {
            return Err(AudioError::Mismatch {
                expected_rate: joined.sample_rate,
                expected_channels: joined.channels,
                rate: wave.sample_rate,
                channels: wave.channels,
            });
        }
        joined.samples.extend(wave.samples);
    }
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::{connect_waves, resample, AudioError, Wave};

    #[test]
    fn wav_bytes_are_readable() {
        let wave = Wave::mono(vec![0.0, 0.5, -0.5, 1.0, -1.0], 24000);
        let bytes = wave.to_wav_bytes().expect("encode");
        let decoded = Wave::from_wav_bytes(&bytes).expect("decode");
        assert_eq!(decoded.sample_rate, 24000);
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.samples.len(), 5);
        assert!((decoded.samples[1] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn stereo_duplicates_samples() {
        let wave = Wave::mono(vec![0.1, 0.2], 24000).into_stereo();
        assert_eq!(wave.channels, 2);
        assert_eq!(wave.samples, vec![0.1, 0.1, 0.2, 0.2]);
        assert!((wave.duration_secs() - 2.0 / 24000.0).abs() < 1e-9);
    }

    #[test]
    fn resample_keeps_rate_when_equal() {
        let samples = vec![0.1; 100];
        assert_eq!(resample(&samples, 24000, 24000).expect("identity"), samples);
    }

    #[test]
    fn resample_scales_length() {
        let samples = vec![0.0; 24000];
        let out = resample(&samples, 24000, 48000).expect("upsample");
        assert_eq!(out.len(), 48000);

        let short = resample(&[0.5; 10], 24000, 44100).expect("short input");
        assert_eq!(short.len(), 18);
    }

    #[test]
    fn connect_waves_concatenates() {
        let a = Wave::mono(vec![0.1; 10], 24000).to_wav_bytes().expect("encode");
        let b = Wave::mono(vec![0.2; 5], 24000).to_wav_bytes().expect("encode");
        let joined = connect_waves(&[a, b]).expect("connect");
        assert_eq!(joined.samples.len(), 15);
    }

    #[test]
    fn connect_waves_rejects_mismatched_rates() {
        let a = Wave::mono(vec![0.1; 10], 24000).to_wav_bytes().expect("encode");
        let b = Wave::mono(vec![0.2; 5], 48000).to_wav_bytes().expect("encode");
        assert!(matches!(connect_waves(&[a, b]), Err(AudioError::Mismatch { .. })));
        assert!(matches!(connect_waves(&[]), Err(AudioError::Empty)));
    }
}
