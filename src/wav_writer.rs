use crate::config::{BitDepth, WaveConfig};
use crate::error::RecorderError;
use crate::sink::{Sink, SinkStream};
use crate::types::{AudioFrame, SampleF32};
use std::io;

/// ヘッダ長 (RIFFチャンク12 + fmtチャンク24 + dataチャンクヘッダ8)
const HEADER_LEN: u32 = 44;
/// RIFFチャンクの全体サイズフィールドの位置
const RIFF_SIZE_OFFSET: u64 = 4;
/// dataチャンクのサイズフィールドの位置
const DATA_SIZE_OFFSET: u64 = 40;

/// WAVコンテナへの書き出し
///
/// シンクを排他的に所有し、オープン時に暫定ヘッダ（サイズ未確定）を
/// 書き込む。フレームを設定されたビット深度のPCMに変換して追記し、
/// [`finalize`](WavWriter::finalize) でヘッダのサイズフィールドを
/// 確定値に書き換えてシンクを解放する。
///
/// ヘッダは2回書かれる: オープン時の暫定ヘッダと、全データ長が
/// 確定した finalize 時の訂正ヘッダ。
pub struct WavWriter {
    stream: Option<SinkStream>,
    config: WaveConfig,
    data_bytes: u64,
}

impl WavWriter {
    /// シンクを開いて暫定ヘッダを書き込む
    ///
    /// # Errors
    ///
    /// シンクを書き込み用に開けない（またはヘッダすら書けない）場合は
    /// [`RecorderError::SinkUnavailable`]。
    pub fn open(sink: Sink, config: &WaveConfig) -> Result<Self, RecorderError> {
        let mut stream = sink.open()?;

        let header = build_header(config, 0);
        stream
            .write_all(&header)
            .map_err(|source| RecorderError::SinkUnavailable { source })?;

        log::info!(
            "暫定ヘッダを書き込みました ({}Hz / {}ch / {}bit)",
            config.sample_rate,
            config.channels.count(),
            config.bit_depth.bits()
        );

        Ok(Self {
            stream: Some(stream),
            config: *config,
            data_bytes: 0,
        })
    }

    /// フレームのサンプルをPCMに変換して追記する
    ///
    /// 書き込んだバイト数を累積する。失敗時のロールバックは行わない。
    pub fn write_frame(&mut self, frame: &AudioFrame) -> Result<(), RecorderError> {
        let stream = self.stream.as_mut().ok_or_else(|| RecorderError::Write {
            source: io::Error::new(io::ErrorKind::NotConnected, "シンクは解放済み"),
        })?;

        let bytes = encode_samples(&frame.samples, self.config.bit_depth);
        stream.write_all(&bytes)?;
        self.data_bytes += bytes.len() as u64;
        Ok(())
    }

    /// ヘッダのサイズフィールドを確定させ、シンクを解放する
    ///
    /// 2回目以降の呼び出しは何もしない。サイズの書き換えに失敗しても
    /// シンクは必ず解放する（ファイル記述子を漏らさない）。その場合
    /// ヘッダは暫定のままになり、呼び出し側は書き込み先を破損として
    /// 扱うこと。
    pub fn finalize(&mut self) -> Result<(), RecorderError> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };

        // RIFFのサイズフィールドは32bit
        let data_len = self.data_bytes as u32;
        let patch = (|| -> io::Result<()> {
            stream.seek_to(RIFF_SIZE_OFFSET)?;
            stream.write_all(&(HEADER_LEN - 8 + data_len).to_le_bytes())?;
            stream.seek_to(DATA_SIZE_OFFSET)?;
            stream.write_all(&data_len.to_le_bytes())?;
            Ok(())
        })();

        let finish = stream.finish();
        patch?;
        finish?;

        log::info!(
            "WAVファイル書き込み完了: {}バイト ({:.2}秒)",
            self.data_bytes,
            self.duration_seconds()
        );
        Ok(())
    }

    /// 書き込んだデータバイト数（ヘッダを除く）
    pub fn bytes_written(&self) -> u64 {
        self.data_bytes
    }

    /// 書き込んだ時間（秒）
    pub fn duration_seconds(&self) -> f64 {
        let byte_rate = self.config.byte_rate();
        if byte_rate == 0 {
            return 0.0;
        }
        self.data_bytes as f64 / byte_rate as f64
    }
}

impl Drop for WavWriter {
    fn drop(&mut self) {
        if self.stream.is_some() {
            if let Err(e) = self.finalize() {
                log::error!("WavWriter のドロップ時にエラー: {}", e);
            }
        }
    }
}

/// 44バイトのRIFF/WAVEヘッダを構築する
fn build_header(config: &WaveConfig, data_len: u32) -> [u8; HEADER_LEN as usize] {
    let mut header = [0u8; HEADER_LEN as usize];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(HEADER_LEN - 8 + data_len).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
    header[22..24].copy_from_slice(&config.channels.count().to_le_bytes());
    header[24..28].copy_from_slice(&config.sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&config.byte_rate().to_le_bytes());
    header[32..34].copy_from_slice(&config.block_align().to_le_bytes());
    header[34..36].copy_from_slice(&config.bit_depth.bits().to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_len.to_le_bytes());
    header
}

/// 正規化済みサンプルを指定ビット深度のPCMバイト列に変換する
fn encode_samples(samples: &[SampleF32], depth: BitDepth) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * depth.bytes() as usize);
    match depth {
        BitDepth::Bits8 => {
            // 8bit PCM は128オフセットの符号なし
            for &s in samples {
                let v = (s.clamp(-1.0, 1.0) * i8::MAX as f32) as i8;
                bytes.push((v as i16 + 128) as u8);
            }
        }
        BitDepth::Bits16 => {
            for &s in samples {
                let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        BitDepth::Bits32 => {
            for &s in samples {
                let v = (s.clamp(-1.0, 1.0) as f64 * i32::MAX as f64) as i32;
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelMask;
    use crate::types::AudioFormat;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn wave_config(sample_rate: u32, channels: ChannelMask, bit_depth: BitDepth) -> WaveConfig {
        WaveConfig {
            sample_rate,
            channels,
            bit_depth,
        }
    }

    fn frame(config: &WaveConfig, samples: Vec<f32>) -> AudioFrame {
        AudioFrame {
            samples,
            format: AudioFormat {
                sample_rate: config.sample_rate,
                channels: config.channels.count(),
            },
            timestamp_ns: 0,
        }
    }

    /// テスト用の追記専用ライター
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_wav_writer_basic() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("basic.wav");
        let config = wave_config(16000, ChannelMask::Mono, BitDepth::Bits16);

        let mut writer = WavWriter::open(Sink::path(&path), &config).unwrap();
        let samples: Vec<f32> = (0..16000).map(|i| (i as f32 * 0.1).sin() * 0.3).collect();
        writer.write_frame(&frame(&config, samples)).unwrap();
        assert_eq!(writer.bytes_written(), 32000);
        assert!((writer.duration_seconds() - 1.0).abs() < 1e-9);
        writer.finalize().unwrap();

        // 書き出したコンテナをデコードして検証
        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, hound::SampleFormat::Int);
        assert_eq!(reader.duration(), 16000);

        let file_len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(file_len, 44 + 32000);
    }

    #[test]
    fn test_header_fields_match_config() {
        let temp_dir = TempDir::new().unwrap();
        let cases = [
            (8000, ChannelMask::Mono, BitDepth::Bits8),
            (16000, ChannelMask::Stereo, BitDepth::Bits16),
            (48000, ChannelMask::Stereo, BitDepth::Bits32),
        ];

        for (i, (rate, channels, depth)) in cases.into_iter().enumerate() {
            let path = temp_dir.path().join(format!("case_{}.wav", i));
            let config = wave_config(rate, channels, depth);
            let mut writer = WavWriter::open(Sink::path(&path), &config).unwrap();
            let n = channels.count() as usize * 100;
            writer.write_frame(&frame(&config, vec![0.25; n])).unwrap();
            writer.finalize().unwrap();

            let reader = hound::WavReader::open(&path).unwrap();
            let spec = reader.spec();
            assert_eq!(spec.channels, channels.count());
            assert_eq!(spec.sample_rate, rate);
            assert_eq!(spec.bits_per_sample, depth.bits());
            assert_eq!(reader.duration(), 100);
        }
    }

    #[test]
    fn test_stereo_32bit_two_seconds() {
        // 44100Hz ステレオ 32bit で2.0秒 → 44100 × 2ch × 4byte × 2.0s
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stereo32.wav");
        let config = wave_config(44100, ChannelMask::Stereo, BitDepth::Bits32);

        let mut writer = WavWriter::open(Sink::path(&path), &config).unwrap();
        // 100msのフレーム × 20
        for _ in 0..20 {
            let samples = vec![0.5f32; 44100 / 10 * 2];
            writer.write_frame(&frame(&config, samples)).unwrap();
        }
        writer.finalize().unwrap();

        assert_eq!(writer.bytes_written(), 705_600);
        let file_len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(file_len, 44 + 705_600);

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.duration(), 88_200);
    }

    #[test]
    fn test_sample_values_roundtrip_16bit() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("values16.wav");
        let config = wave_config(16000, ChannelMask::Mono, BitDepth::Bits16);

        let mut writer = WavWriter::open(Sink::path(&path), &config).unwrap();
        writer
            .write_frame(&frame(&config, vec![0.0, 0.5, -0.5, 1.0]))
            .unwrap();
        writer.finalize().unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 16383, -16383, i16::MAX]);
    }

    #[test]
    fn test_sample_values_roundtrip_8bit() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("values8.wav");
        let config = wave_config(8000, ChannelMask::Mono, BitDepth::Bits8);

        let mut writer = WavWriter::open(Sink::path(&path), &config).unwrap();
        writer
            .write_frame(&frame(&config, vec![0.0, 0.5, -1.0]))
            .unwrap();
        writer.finalize().unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let samples: Vec<i8> = reader.samples::<i8>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 63, -127]);
    }

    #[test]
    fn test_sequential_sink_header_is_patched() {
        // 追記専用シンクでもfinalize後のヘッダは確定値になる
        let captured = Arc::new(Mutex::new(Vec::new()));
        let config = wave_config(16000, ChannelMask::Mono, BitDepth::Bits16);

        let mut writer =
            WavWriter::open(Sink::sequential(SharedBuf(captured.clone())), &config).unwrap();
        writer.write_frame(&frame(&config, vec![0.1; 1600])).unwrap();
        writer.finalize().unwrap();

        let bytes = captured.lock().unwrap();
        assert_eq!(bytes.len(), 44 + 3200);
        assert_eq!(&bytes[0..4], b"RIFF");
        let riff_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        assert_eq!(riff_size, 36 + 3200);
        assert_eq!(&bytes[8..12], b"WAVE");
        let data_size = u32::from_le_bytes(bytes[40..44].try_into().unwrap());
        assert_eq!(data_size, 3200);
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("twice.wav");
        let config = wave_config(16000, ChannelMask::Mono, BitDepth::Bits16);

        let mut writer = WavWriter::open(Sink::path(&path), &config).unwrap();
        writer.write_frame(&frame(&config, vec![0.1; 160])).unwrap();
        writer.finalize().unwrap();
        // 2回目は何もしない
        writer.finalize().unwrap();

        let file_len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(file_len, 44 + 320);
    }

    #[test]
    fn test_write_after_finalize_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("closed.wav");
        let config = wave_config(16000, ChannelMask::Mono, BitDepth::Bits16);

        let mut writer = WavWriter::open(Sink::path(&path), &config).unwrap();
        writer.finalize().unwrap();
        let result = writer.write_frame(&frame(&config, vec![0.1; 160]));
        assert!(matches!(result, Err(RecorderError::Write { .. })));
    }

    #[test]
    fn test_drop_finalizes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dropped.wav");
        let config = wave_config(16000, ChannelMask::Mono, BitDepth::Bits16);

        {
            let mut writer = WavWriter::open(Sink::path(&path), &config).unwrap();
            writer.write_frame(&frame(&config, vec![0.1; 160])).unwrap();
            // finalizeせずにドロップ
        }

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.duration(), 160);
    }
}
