use anyhow::{Context, Result, anyhow};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::path::Path;

/// Load a click sample as mono f32 at `target_sample_rate`.
pub fn import_wav<P: AsRef<Path>>(path: P, target_sample_rate: u32) -> Result<Vec<f32>> {
    let path = path.as_ref();
    let (mono, source_rate) =
        read_mono(path).with_context(|| format!("Failed to read click sample {}", path.display()))?;

    if mono.is_empty() {
        return Err(anyhow!("Click sample {} is empty", path.display()));
    }

    if source_rate == target_sample_rate {
        return Ok(mono);
    }

    log::debug!(
        "Resampling {} from {}Hz to {}Hz",
        path.display(),
        source_rate,
        target_sample_rate
    );
    resample_mono(&mono, source_rate, target_sample_rate)
}

/// Write mono f32 samples, used for offline renders of a pattern.
pub fn export_wav<P: AsRef<Path>>(path: P, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(&path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

fn read_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let max_value = 2_i64.pow((spec.bits_per_sample - 1) as u32) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_value))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    let channels = spec.channels.max(1) as usize;
    let mono = if channels > 1 {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        interleaved
    };

    Ok((mono, spec.sample_rate))
}

fn resample_mono(samples: &[f32], input_rate: u32, output_rate: u32) -> Result<Vec<f32>> {
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        output_rate as f64 / input_rate as f64,
        2.0,
        params,
        samples.len(),
        1,
    )?;

    let output = resampler.process(&[samples], None)?;
    Ok(output.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_same_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("click.wav");
        let original = vec![0.1, -0.2, 0.3, -0.4, 0.5];
        export_wav(&path, &original, 44100).unwrap();

        let imported = import_wav(&path, 44100).unwrap();
        assert_eq!(original.len(), imported.len());
        for (orig, imp) in original.iter().zip(imported.iter()) {
            assert!((orig - imp).abs() < 0.001);
        }
    }

    #[test]
    fn test_import_downmixes_int_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..10 {
            writer.write_sample(16384i16).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let imported = import_wav(&path, 48000).unwrap();
        assert_eq!(imported.len(), 10);
        assert!(imported.iter().all(|&s| (s - 0.25).abs() < 0.001));
    }

    #[test]
    fn test_import_resamples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("click22k.wav");
        export_wav(&path, &vec![0.0; 2205], 22050).unwrap();

        let imported = import_wav(&path, 44100).unwrap();
        assert!(imported.len() > 2205);
    }

    #[test]
    fn test_import_missing_file() {
        assert!(import_wav("does/not/exist.wav", 44100).is_err());
    }
}
