use crate::error::RecorderError;

/// 正規化済みオーディオサンプル
///
/// -1.0 ~ 1.0 の範囲に正規化された1サンプル。
/// 入力デバイスのフォーマットに依存しない内部表現として使用し、
/// WAV書き出し時に設定されたビット深度へ変換する。
pub type SampleF32 = f32;

/// オーディオフォーマット情報
///
/// 音声データのサンプリングレートとチャンネル数を保持する。
///
/// # Examples
///
/// ```
/// # use wavecap::types::AudioFormat;
/// let format = AudioFormat {
///     sample_rate: 44100, // 44.1kHz
///     channels: 2,        // ステレオ
/// };
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioFormat {
    /// サンプリングレート (Hz)
    ///
    /// 典型的な値: 8000, 16000, 44100, 48000
    pub sample_rate: u32,

    /// チャンネル数
    ///
    /// 1: モノラル, 2: ステレオ
    pub channels: u16,
}

/// オーディオフレーム
///
/// タイムスタンプ付きの音声データのまとまり。
/// オーディオ入力から受信した1コールバック分のサンプルを表現する。
/// サンプルはチャンネルインターリーブ形式。
///
/// # Examples
///
/// ```
/// # use wavecap::types::{AudioFormat, AudioFrame};
/// let frame = AudioFrame {
///     samples: vec![0.0f32; 1600], // 100ms分 @ 16kHz モノラル
///     format: AudioFormat { sample_rate: 16000, channels: 1 },
///     timestamp_ns: 1_000_000_000, // 1秒
/// };
/// assert_eq!(frame.duration_ms(), 100.0);
/// ```
#[derive(Clone, Debug)]
pub struct AudioFrame {
    /// 正規化済みPCMサンプルの配列（インターリーブ）
    pub samples: Vec<SampleF32>,

    /// オーディオフォーマット情報
    pub format: AudioFormat,

    /// このフレームの開始タイムスタンプ (ナノ秒)
    ///
    /// UNIX_EPOCHからの経過時間
    pub timestamp_ns: u128,
}

impl AudioFrame {
    /// フレームの再生時間（ミリ秒）
    pub fn duration_ms(&self) -> f64 {
        if self.format.sample_rate == 0 || self.format.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.format.channels as f64 / self.format.sample_rate as f64
            * 1000.0
    }
}

/// レコーダーの状態
///
/// 録音セッションのライフサイクルを表す状態機械の状態。
/// `Stop` は初期状態かつ終端状態で、一度停止したセッションを
/// 再開することはできない（新しいセッションを作成する）。
///
/// ```text
/// Stop --start--> Recording
/// Recording --pause--> Pause
/// Pause --resume--> Recording
/// Recording --無音検出--> SkippingSilence   (無音検出が有効な場合のみ)
/// SkippingSilence --音声再開--> Recording
/// Recording|Pause|SkippingSilence --stop--> Stop
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecorderState {
    /// 停止中（初期状態・終端状態）
    Stop,

    /// 録音中
    Recording,

    /// 一時停止中
    ///
    /// この間に到着したフレームはバッファリングせず破棄する
    Pause,

    /// 無音スキップ中
    ///
    /// フレームは解析されるがコンテナには書き込まれない
    SkippingSilence,
}

/// レコーダーから監視者へ配送されるイベント
///
/// キャプチャループからチャンネル経由で通知スレッドに送られ、
/// 登録された [`RecorderObserver`](crate::recorder::RecorderObserver)
/// に配送される。配送はキャプチャループをブロックしない。
#[derive(Debug)]
pub enum RecorderEvent {
    /// 状態遷移 (旧状態 → 新状態)
    StateChange {
        old: RecorderState,
        new: RecorderState,
    },

    /// 受理したフレームの振幅（16ビットスケール、0〜32767）
    Amplitude(i32),

    /// 録音経過時間（ミリ秒）
    ///
    /// Recording / SkippingSilence 中のみ進む。
    /// Pause 中の時間は含まれない。
    TimeElapsed(u64),

    /// 録音中に発生したエラー
    Error(RecorderError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_format_creation() {
        let format = AudioFormat {
            sample_rate: 48000,
            channels: 2,
        };
        assert_eq!(format.sample_rate, 48000);
        assert_eq!(format.channels, 2);
    }

    #[test]
    fn test_frame_duration_mono() {
        let frame = AudioFrame {
            samples: vec![0.0; 1600],
            format: AudioFormat {
                sample_rate: 16000,
                channels: 1,
            },
            timestamp_ns: 0,
        };
        assert_eq!(frame.duration_ms(), 100.0);
    }

    #[test]
    fn test_frame_duration_stereo() {
        // ステレオではインターリーブ数がサンプル数の2倍になる
        let frame = AudioFrame {
            samples: vec![0.0; 44100 * 2],
            format: AudioFormat {
                sample_rate: 44100,
                channels: 2,
            },
            timestamp_ns: 0,
        };
        assert_eq!(frame.duration_ms(), 1000.0);
    }

    #[test]
    fn test_frame_duration_zero_rate() {
        let frame = AudioFrame {
            samples: vec![0.0; 100],
            format: AudioFormat {
                sample_rate: 0,
                channels: 1,
            },
            timestamp_ns: 0,
        };
        assert_eq!(frame.duration_ms(), 0.0);
    }

    #[test]
    fn test_recorder_state_equality() {
        assert_eq!(RecorderState::Stop, RecorderState::Stop);
        assert_ne!(RecorderState::Recording, RecorderState::SkippingSilence);
    }
}
