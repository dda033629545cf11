use crate::audio_source::{AudioSource, FrameReader};
use crate::config::WaveConfig;
use crate::error::RecorderError;
use crate::types::{AudioFormat, AudioFrame};
use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SizedSample};
use crossbeam_channel::{bounded, Sender, TrySendError};
use std::time::{SystemTime, UNIX_EPOCH};

/// キャプチャコールバックからフレームチャンネルへ渡す際の容量
///
/// 読み取り側が詰まってもコールバックはブロックせず、溢れた分は破棄する
const FRAME_CHANNEL_CAPACITY: usize = 64;

/// オーディオデバイスからの音声入力
///
/// [`AudioSource`] のcpal実装。デバイスのネイティブフォーマットが
/// 何であれ、サンプルを正規化済みf32に変換したフレームを配送する。
pub struct AudioInput {
    device_id: String,
    stream: Option<cpal::Stream>,
}

impl AudioInput {
    /// 新しいAudioInputを作成
    ///
    /// # Arguments
    /// * `device_id` - デバイス名。"default" でシステムのデフォルト入力
    pub fn new<S: Into<String>>(device_id: S) -> Self {
        Self {
            device_id: device_id.into(),
            stream: None,
        }
    }

    /// デバイスを取得
    fn find_device(&self) -> Result<cpal::Device, RecorderError> {
        let host = cpal::default_host();

        if self.device_id == "default" {
            host.default_input_device()
                .ok_or_else(|| RecorderError::SourceUnavailable {
                    reason: "デフォルト入力デバイスが見つかりません".to_string(),
                })
        } else {
            // デバイスIDが指定されている場合は、デバイス一覧から検索
            let mut devices =
                host.input_devices()
                    .map_err(|e| RecorderError::SourceUnavailable {
                        reason: format!("入力デバイスを列挙できません: {}", e),
                    })?;
            devices
                .find(|d| d.name().ok().as_deref() == Some(&self.device_id))
                .ok_or_else(|| RecorderError::SourceUnavailable {
                    reason: format!("デバイスが見つかりません: {}", self.device_id),
                })
        }
    }

    /// ストリームを構築
    fn build_stream<T>(
        &self,
        device: &cpal::Device,
        stream_config: &cpal::StreamConfig,
        format: AudioFormat,
        tx: Sender<AudioFrame>,
    ) -> Result<cpal::Stream, RecorderError>
    where
        T: SizedSample + Sample + Send + 'static,
        <T as Sample>::Float: Into<f32>,
    {
        let data_callback = move |data: &[T], _info: &cpal::InputCallbackInfo| {
            let timestamp_ns = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos();

            // デバイスのフォーマットに関わらず正規化済みf32へ変換
            let samples: Vec<f32> = data
                .iter()
                .map(|&s| {
                    let f: f32 = s.to_float_sample().into();
                    f.clamp(-1.0, 1.0)
                })
                .collect();

            let frame = AudioFrame {
                samples,
                format,
                timestamp_ns,
            };

            // 非同期送信（ブロッキングしない）
            match tx.try_send(frame) {
                Ok(_) => {
                    // 成功時はログ出力しない（パフォーマンス重視）
                }
                Err(TrySendError::Full(_)) => {
                    log::warn!("フレーム送信失敗: バッファ満杯");
                }
                Err(TrySendError::Disconnected(_)) => {
                    // 読み取り側が終了済み。ストリーム停止待ちなので無視
                }
            }
        };

        let error_callback = move |err| {
            log::error!("ストリームエラー: {}", err);
        };

        device
            .build_input_stream(stream_config, data_callback, error_callback, None)
            .map_err(|e| RecorderError::SourceUnavailable {
                reason: format!("入力ストリームの構築に失敗: {}", e),
            })
    }

    /// デバイス一覧を表示
    pub fn list_devices() -> Result<()> {
        let host = cpal::default_host();
        println!("利用可能な入力デバイス:");
        println!();

        for (idx, device) in host.input_devices()?.enumerate() {
            let name = device.name()?;
            println!("  [{}] {}", idx, name);

            device.supported_input_configs()?.for_each(|config_range| {
                println!(
                    "      フォーマット: {:?}, {}-{}Hz, {}ch",
                    config_range.sample_format(),
                    config_range.min_sample_rate().0,
                    config_range.max_sample_rate().0,
                    config_range.channels()
                );
            });
            println!();
        }

        Ok(())
    }
}

impl AudioSource for AudioInput {
    fn open(
        &mut self,
        config: &WaveConfig,
        noise_suppressor: bool,
    ) -> Result<FrameReader, RecorderError> {
        if noise_suppressor {
            // cpalにはノイズサプレッサAPIがないため、要求は受理して無視する
            log::debug!("ノイズサプレッサは未対応のため無視します");
        }

        let device = self.find_device()?;
        log::info!("入力デバイス: {:?}", device.name());

        let default_config =
            device
                .default_input_config()
                .map_err(|e| RecorderError::SourceUnavailable {
                    reason: format!("デフォルト入力設定が取得できません: {}", e),
                })?;

        log::info!(
            "デバイス設定: {:?}, {}Hz, {}ch",
            default_config.sample_format(),
            default_config.sample_rate().0,
            default_config.channels()
        );

        let stream_config = cpal::StreamConfig {
            channels: config.channels.count(),
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(4096),
        };

        let format = config.format();
        let (tx, rx) = bounded(FRAME_CHANNEL_CAPACITY);

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => self.build_stream::<f32>(&device, &stream_config, format, tx)?,
            cpal::SampleFormat::I16 => self.build_stream::<i16>(&device, &stream_config, format, tx)?,
            cpal::SampleFormat::U16 => self.build_stream::<u16>(&device, &stream_config, format, tx)?,
            cpal::SampleFormat::I32 => self.build_stream::<i32>(&device, &stream_config, format, tx)?,
            other => {
                return Err(RecorderError::SourceUnavailable {
                    reason: format!("サポートされていないサンプルフォーマット: {:?}", other),
                })
            }
        };

        stream
            .play()
            .map_err(|e| RecorderError::SourceUnavailable {
                reason: format!("ストリームの再生開始に失敗: {}", e),
            })?;
        self.stream = Some(stream);

        log::info!("音声入力ストリームを開始しました");

        Ok(FrameReader::from_channel(rx))
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            // ストリームを破棄すると送信側が閉じ、リーダーは終端を観測する
            drop(stream);
            log::info!("音声入力ストリームを停止しました");
        }
    }
}

impl Drop for AudioInput {
    fn drop(&mut self) {
        self.close();
    }
}
