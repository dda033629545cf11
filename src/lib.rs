//! wavecap - マイク録音エンジン
//!
//! このクレートは、マイクから取り込んだPCMフレームをWAVコンテナに
//! 書き出す録音エンジンを提供します。録音のライフサイクルを状態機械
//! として公開し、無音区間の適応的なスキップと、振幅・経過時間の
//! ライブテレメトリに対応します。
//!
//! # 主な機能
//!
//! - **録音ライフサイクル**: start / pause / resume / stop の状態機械
//! - **無音スキップ**: 振幅のスライディングウィンドウで無音区間を検出し、
//!   直前の音声（プリサイレンステール）を残したまま書き込みを抑制
//! - **WAVファイル出力**: 暫定ヘッダ→確定ヘッダの2段階書き込み。
//!   パス・シーク可能ハンドル・追記専用ハンドルのいずれにも対応
//! - **テレメトリ**: 受理フレーム毎の振幅と録音経過時間を監視者に配送
//!
//! # アーキテクチャ
//!
//! ```text
//! [Microphone] → [AudioInput] → [CaptureLoop]
//!                                     ↓
//!                       ┌─────────────┼─────────────┐
//!                       │             │             │
//!                 [Amplitude]  [SilenceDetector]  [WavWriter]
//!                       │             │             │
//!                       ↓             ↓             ↓
//!                 [Observers]  [State machine]  [WAV File]
//! ```
//!
//! # 使用例
//!
//! ```no_run
//! use wavecap::audio_input::AudioInput;
//! use wavecap::config::Config;
//! use wavecap::recorder::WaveRecorder;
//! use wavecap::sink::Sink;
//!
//! let config = Config::load_or_default("config.toml").unwrap();
//!
//! let mut recorder = WaveRecorder::new(Box::new(AudioInput::new("default")));
//! recorder.start(&config, Sink::path("recording.wav")).unwrap();
//! // ... 録音中 ...
//! recorder.stop().unwrap();
//! ```

pub mod amplitude;
pub mod audio_input;
pub mod audio_source;
pub mod buffer;
pub mod config;
pub mod error;
pub mod recorder;
pub mod silence;
pub mod sink;
pub mod types;
pub mod wav_writer;
