use base64::Engine;
use rubato::{FastFixedIn, PolynomialDegree};

/// Sample rate the live endpoint expects for microphone audio.
pub const LIVE_API_INPUT_SAMPLE_RATE: f64 = 16000.0;
/// Sample rate of the PCM16 audio the live endpoint streams back.
pub const LIVE_API_OUTPUT_SAMPLE_RATE: f64 = 24000.0;

pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

pub fn split_for_chunks(samples: &[f32], chunk_size: usize) -> Vec<Vec<f32>> {
    samples
        .chunks(chunk_size)
        .map(|chunk| {
            let mut chunk = chunk.to_vec();
            chunk.resize(chunk_size, 0.0);
            chunk
        })
        .collect()
}

/// Decodes a base64 PCM16 fragment into normalized f32 samples.
pub fn decode(fragment: &str) -> Vec<f32> {
    if let Ok(pcm16) = base64::engine::general_purpose::STANDARD.decode(fragment) {
        pcm16
            .chunks_exact(2)
            .map(|chunk| {
                let v = i16::from_le_bytes([chunk[0], chunk[1]]);
                (v as f32 / i16::MAX as f32).clamp(-1.0, 1.0)
            })
            .collect()
    } else {
        tracing::error!("Failed to decode base64 fragment");
        Vec::new()
    }
}

/// Encodes f32 samples as little-endian PCM16 wrapped in base64.
pub fn encode(pcm32: &[f32]) -> String {
    let pcm16: Vec<u8> = pcm32
        .iter()
        .flat_map(|&sample| {
            ((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .to_le_bytes()
                .to_vec()
        })
        .collect();
    base64::engine::general_purpose::STANDARD.encode(&pcm16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_preserves_samples() {
        let samples = vec![0.0, 0.5, -0.5, 1.0, -1.0];
        let decoded = decode(&encode(&samples));
        assert_eq!(decoded.len(), samples.len());
        for (a, b) in samples.iter().zip(decoded.iter()) {
            assert!((a - b).abs() < 1e-3, "{} vs {}", a, b);
        }
    }

    #[test]
    fn encode_saturates_out_of_range_samples() {
        let decoded = decode(&encode(&[2.0, -2.0, 1.0, -1.0]));
        assert!((decoded[0] - 1.0).abs() < 1e-3);
        assert!((decoded[1] + 1.0).abs() < 1e-3);
        assert!((decoded[0] - decoded[2]).abs() < 1e-6);
        assert!((decoded[1] - decoded[3]).abs() < 1e-6);
    }

    #[test]
    fn decode_rejects_invalid_base64() {
        assert!(decode("not base64!!!").is_empty());
    }

    #[test]
    fn split_pads_the_final_chunk() {
        let chunks = split_for_chunks(&[1.0, 1.0, 1.0], 2);
        assert_eq!(chunks, vec![vec![1.0, 1.0], vec![1.0, 0.0]]);
    }
}
