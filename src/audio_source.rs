use crate::config::WaveConfig;
use crate::error::RecorderError;
use crate::types::AudioFrame;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::time::Duration;

/// フレーム読み取りの結果
#[derive(Debug)]
pub enum ReadResult {
    /// フレームを受信した
    Frame(AudioFrame),
    /// タイムアウトした（ソースは生きている）
    Timeout,
    /// ソースがクローズされ、ストリームが終端した
    Closed,
}

/// オーディオ入力ソース
///
/// プラットフォームのマイクを抽象化する。[`open`](AudioSource::open) は
/// 設定されたサンプリングレート・チャンネル数でフレームストリームを
/// 開始し、読み取り側の [`FrameReader`] を返す。
///
/// ノイズサプレッサの要求はベストエフォートで、対応していない実装は
/// 黙って無視する。
pub trait AudioSource {
    /// ソースを開いてキャプチャを開始する
    ///
    /// # Errors
    ///
    /// マイクを取得できない場合（権限なし・デバイス使用中など）は
    /// [`RecorderError::SourceUnavailable`]。
    fn open(
        &mut self,
        config: &WaveConfig,
        noise_suppressor: bool,
    ) -> Result<FrameReader, RecorderError>;

    /// ソースを閉じる
    ///
    /// ストリームが終端し、ブロック中の [`FrameReader::read`] は
    /// [`ReadResult::Closed`] で解除される。
    fn close(&mut self);
}

/// フレームストリームの読み取り側
///
/// キャプチャループが唯一ブロックする地点。タイムアウト付きで
/// 読み取ることで、停止要求の検出遅延に上限を与える。
pub struct FrameReader {
    rx: Receiver<AudioFrame>,
}

impl FrameReader {
    /// 受信チャンネルからリーダーを作る
    pub fn from_channel(rx: Receiver<AudioFrame>) -> Self {
        Self { rx }
    }

    /// 次のフレームが届くまでブロックして読み取る
    ///
    /// `timeout` 経過で [`ReadResult::Timeout`]、送信側が全て破棄されて
    /// いれば [`ReadResult::Closed`] を返す。
    pub fn read(&self, timeout: Duration) -> ReadResult {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => ReadResult::Frame(frame),
            Err(RecvTimeoutError::Timeout) => ReadResult::Timeout,
            Err(RecvTimeoutError::Disconnected) => ReadResult::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AudioFormat;
    use crossbeam_channel::bounded;

    fn frame() -> AudioFrame {
        AudioFrame {
            samples: vec![0.0; 160],
            format: AudioFormat {
                sample_rate: 16000,
                channels: 1,
            },
            timestamp_ns: 0,
        }
    }

    #[test]
    fn test_read_frame() {
        let (tx, rx) = bounded(4);
        let reader = FrameReader::from_channel(rx);
        tx.send(frame()).unwrap();
        assert!(matches!(
            reader.read(Duration::from_millis(10)),
            ReadResult::Frame(_)
        ));
    }

    #[test]
    fn test_read_timeout() {
        let (_tx, rx) = bounded::<AudioFrame>(4);
        let reader = FrameReader::from_channel(rx);
        assert!(matches!(
            reader.read(Duration::from_millis(1)),
            ReadResult::Timeout
        ));
    }

    #[test]
    fn test_read_closed_after_sender_dropped() {
        let (tx, rx) = bounded(4);
        let reader = FrameReader::from_channel(rx);
        tx.send(frame()).unwrap();
        drop(tx);
        // 残っているフレームは読み切れる
        assert!(matches!(
            reader.read(Duration::from_millis(10)),
            ReadResult::Frame(_)
        ));
        // その後は終端
        assert!(matches!(
            reader.read(Duration::from_millis(10)),
            ReadResult::Closed
        ));
    }
}
