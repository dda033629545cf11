use crate::error::RecorderError;
use crate::types::AudioFormat;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub wave: WaveConfig,
    #[serde(default)]
    pub silence: SilenceConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// オーディオ入力設定
///
/// オーディオデバイスの取得に関する設定。
///
/// # デフォルト値
///
/// - `device_id`: "default" (システムのデフォルトデバイス)
/// - `noise_suppressor`: false
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputConfig {
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// ハードウェアのノイズサプレッサを要求する
    ///
    /// ベストエフォート。デバイスが対応していなければ黙って無視される。
    #[serde(default)]
    pub noise_suppressor: bool,
}

/// チャンネル構成
///
/// # Examples
///
/// ```
/// # use wavecap::config::ChannelMask;
/// assert_eq!(ChannelMask::Mono.count(), 1);
/// assert_eq!(ChannelMask::Stereo.count(), 2);
/// ```
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMask {
    Mono,
    Stereo,
}

impl ChannelMask {
    /// チャンネル数
    pub fn count(self) -> u16 {
        match self {
            ChannelMask::Mono => 1,
            ChannelMask::Stereo => 2,
        }
    }
}

/// サンプルのビット深度
///
/// WAVコンテナに書き出すPCMのビット数。8 / 16 / 32 のみ対応。
/// TOML上は数値で指定する (`bit_depth = 16`)。
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(try_from = "u16", into = "u16")]
pub enum BitDepth {
    Bits8,
    Bits16,
    Bits32,
}

impl BitDepth {
    /// ビット数
    pub fn bits(self) -> u16 {
        match self {
            BitDepth::Bits8 => 8,
            BitDepth::Bits16 => 16,
            BitDepth::Bits32 => 32,
        }
    }

    /// 1サンプルあたりのバイト数
    pub fn bytes(self) -> u16 {
        self.bits() / 8
    }
}

impl TryFrom<u16> for BitDepth {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            8 => Ok(BitDepth::Bits8),
            16 => Ok(BitDepth::Bits16),
            32 => Ok(BitDepth::Bits32),
            other => Err(format!(
                "ビット深度は 8, 16, 32 のいずれか (指定値: {})",
                other
            )),
        }
    }
}

impl From<BitDepth> for u16 {
    fn from(value: BitDepth) -> Self {
        value.bits()
    }
}

/// 波形設定
///
/// 録音開始後は変更不可。オーディオ入力デバイスの設定と
/// WAVコンテナのヘッダフィールドの両方を決定する。
///
/// # デフォルト値
///
/// - `sample_rate`: 44100 Hz
/// - `channels`: mono
/// - `bit_depth`: 16
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct WaveConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: ChannelMask,
    #[serde(default = "default_bit_depth")]
    pub bit_depth: BitDepth,
}

impl WaveConfig {
    /// 内部表現用のフォーマット情報へ変換
    pub fn format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.sample_rate,
            channels: self.channels.count(),
        }
    }

    /// ブロックアライン (チャンネル数 × サンプルバイト数)
    pub fn block_align(&self) -> u16 {
        self.channels.count() * self.bit_depth.bytes()
    }

    /// バイトレート (サンプリングレート × ブロックアライン)
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }
}

/// 無音検出設定
///
/// 振幅が閾値を下回る区間を検出してコンテナへの書き込みを
/// 抑制するための設定。`enabled` が false の間は検出が一切
/// 行われず、レコーダーが SkippingSilence に遷移することはない。
///
/// # デフォルト値
///
/// - `enabled`: false
/// - `min_amplitude_threshold`: 80
/// - `buffer_duration_ms`: 1500 ms
/// - `pre_silence_duration_ms`: 1500 ms
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct SilenceConfig {
    #[serde(default)]
    pub enabled: bool,

    /// 音声とみなす最小振幅（16ビットスケール）
    ///
    /// この値以上の振幅を持つフレームは音声。比較は音声側が閉区間
    /// (`>= threshold` が音声)。
    #[serde(default = "default_min_amplitude_threshold")]
    pub min_amplitude_threshold: i32,

    /// 無音判定ウィンドウの長さ (ミリ秒)
    ///
    /// 直近この長さのすべての振幅が閾値未満になったとき無音と判定する
    #[serde(default = "default_buffer_duration_ms")]
    pub buffer_duration_ms: u32,

    /// 抑制開始前に書き残す音声の長さ (ミリ秒)
    ///
    /// 無音開始直前の音声がこの長さだけコンテナに残ることを保証する。
    /// `buffer_duration_ms` 以下でなければならない。
    #[serde(default = "default_pre_silence_duration_ms")]
    pub pre_silence_duration_ms: u32,
}

/// 出力設定
///
/// 録音ファイルの出力先とログ・テレメトリに関する設定。
///
/// # デフォルト値
///
/// - `output_dir`: "./recordings"
/// - `log_level`: "info"
/// - `amplitude`: false (振幅テレメトリを出さない)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub amplitude: bool,
}

// Default functions
fn default_device_id() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_channels() -> ChannelMask {
    ChannelMask::Mono
}

fn default_bit_depth() -> BitDepth {
    BitDepth::Bits16
}

fn default_min_amplitude_threshold() -> i32 {
    80
}

fn default_buffer_duration_ms() -> u32 {
    1500
}

fn default_pre_silence_duration_ms() -> u32 {
    1500
}

fn default_output_dir() -> String {
    "./recordings".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: InputConfig::default(),
            wave: WaveConfig::default(),
            silence: SilenceConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            noise_suppressor: false,
        }
    }
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            bit_depth: default_bit_depth(),
        }
    }
}

impl Default for SilenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_amplitude_threshold: default_min_amplitude_threshold(),
            buffer_duration_ms: default_buffer_duration_ms(),
            pre_silence_duration_ms: default_pre_silence_duration_ms(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            log_level: default_log_level(),
            amplitude: false,
        }
    }
}

impl Config {
    /// 設定ファイルから読み込み
    ///
    /// TOML形式の設定ファイルをパースしてConfig構造体を生成する。
    ///
    /// # Arguments
    ///
    /// * `path` - 設定ファイルのパス
    ///
    /// # Errors
    ///
    /// ファイルの読み込みまたはパースに失敗した場合にエラーを返す。
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use wavecap::config::Config;
    /// let config = Config::from_file("config.toml").unwrap();
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("設定ファイルの読み込みに失敗: {:?}", path.as_ref()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "設定ファイルのパースに失敗")?;
        Ok(config)
    }

    /// デフォルト設定をファイルに書き出し
    ///
    /// デフォルト値を持つ設定ファイルを生成する。
    /// 既存のファイルは上書きされる。
    ///
    /// # Errors
    ///
    /// ファイルの書き込みに失敗した場合にエラーを返す。
    pub fn write_default<P: AsRef<Path>>(path: P) -> Result<()> {
        let config = Config::default();
        let content =
            toml::to_string_pretty(&config).with_context(|| "設定のシリアライズに失敗")?;
        fs::write(path.as_ref(), content)
            .with_context(|| format!("設定ファイルの書き込みに失敗: {:?}", path.as_ref()))?;
        Ok(())
    }

    /// 設定ファイルがあれば読み込み、なければデフォルトを使用
    ///
    /// # Errors
    ///
    /// ファイルが存在するがパースに失敗した場合にエラーを返す。
    /// ファイルが存在しない場合はエラーにならず、デフォルト設定を返す。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            log::warn!(
                "設定ファイルが見つかりません。デフォルト設定を使用します: {:?}",
                path.as_ref()
            );
            Ok(Config::default())
        }
    }

    /// 数値制約を検証する
    ///
    /// 録音開始前に呼ばれ、違反があればリソースを開く前に
    /// [`RecorderError::InvalidConfig`] で拒否する。
    pub fn validate(&self) -> Result<(), RecorderError> {
        if self.wave.sample_rate == 0 {
            return Err(RecorderError::InvalidConfig(
                "wave.sample_rate は正の値でなければならない".to_string(),
            ));
        }
        if self.silence.min_amplitude_threshold < 0 {
            return Err(RecorderError::InvalidConfig(
                "silence.min_amplitude_threshold は非負でなければならない".to_string(),
            ));
        }
        if self.silence.buffer_duration_ms == 0 {
            return Err(RecorderError::InvalidConfig(
                "silence.buffer_duration_ms は正の値でなければならない".to_string(),
            ));
        }
        if self.silence.pre_silence_duration_ms > self.silence.buffer_duration_ms {
            return Err(RecorderError::InvalidConfig(
                "silence.pre_silence_duration_ms は buffer_duration_ms 以下でなければならない"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
