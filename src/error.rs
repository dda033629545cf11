use crate::types::RecorderState;
use std::io;
use thiserror::Error;

/// 録音エンジンのエラー
///
/// いずれのエラーも内部ではリトライしない。
/// 呼び出し側がリトライするかどうかを判断する。
#[derive(Debug, Error)]
pub enum RecorderError {
    /// 停止状態以外で start() が呼ばれた
    ///
    /// 同期的に拒否される非致命的エラー。セッションの状態は変化しない。
    /// 一度録音を終えたセッション（Stop は終端状態）で再度 start() を
    /// 呼んだ場合もこのエラーになる。
    #[error("録音を開始できません (現在の状態: {state:?})")]
    AlreadyRecording { state: RecorderState },

    /// オーディオ入力デバイスを取得できない
    ///
    /// 権限がない、デバイスが使用中、といった場合。
    /// セッションは Stop のまま（または Stop に戻る）。
    #[error("オーディオ入力デバイスを取得できません: {reason}")]
    SourceUnavailable { reason: String },

    /// 書き込み先のシンクを開けない
    #[error("書き込み先を開けません: {source}")]
    SinkUnavailable { source: io::Error },

    /// 録音中のI/O失敗
    ///
    /// キャプチャループは停止し、セッションは強制的に Stop に遷移する。
    /// 失敗前の部分的な書き込みはロールバックされないため、
    /// 呼び出し側は書き込み先を破損として扱うこと。
    #[error("書き込みに失敗しました: {source}")]
    Write {
        #[from]
        source: io::Error,
    },

    /// 設定値が制約を満たしていない
    ///
    /// リソースを開く前に拒否される。
    #[error("設定が不正です: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RecorderError::AlreadyRecording {
            state: RecorderState::Recording,
        };
        assert!(err.to_string().contains("Recording"));

        let err = RecorderError::InvalidConfig("sample_rate は正の値".to_string());
        assert!(err.to_string().contains("sample_rate"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        let err: RecorderError = io_err.into();
        assert!(matches!(err, RecorderError::Write { .. }));
    }
}
