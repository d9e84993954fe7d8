use std::io::Cursor;

/// Wraps little-endian PCM16 in a WAV container.
pub fn encode_wav(pcm16: &[u8], sample_rate: u32, channels: u16) -> anyhow::Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut out = Cursor::new(Vec::with_capacity(pcm16.len() + 44));
    {
        let mut writer = hound::WavWriter::new(&mut out, spec)?;
        for chunk in pcm16.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))?;
        }
        writer.finalize()?;
    }
    Ok(out.into_inner())
}
