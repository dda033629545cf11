use crate::error::RecorderError;
use std::fs::File;
use std::io::{self, BufWriter, Cursor, Seek, SeekFrom, Write};
use std::path::PathBuf;

/// シーク可能な書き込みハンドル
///
/// プラットフォームから渡される「開いたままのファイル記述子」の類を
/// 表現するためのトレイトエイリアス。
pub trait SeekWrite: Write + Seek + Send {}

impl<T: Write + Seek + Send> SeekWrite for T {}

/// 録音データの書き込み先
///
/// 1セッションにつき1つだけ束縛され、セッションの生存期間中は
/// WAVライターが排他的に所有する。呼び出し側が具体的な書き込み先を
/// 選び、エンジンはその種別に関知しない。
///
/// - [`Sink::path`] - ファイルパス。ランダムアクセスでヘッダを書き換える
/// - [`Sink::handle`] - 呼び出し側が開いたシーク可能ハンドル
/// - [`Sink::sequential`] - 追記しかできないハンドル。ライターが
///   コンテナ全体をメモリに保持し、finalize時に一括で書き出す
pub enum Sink {
    Path(PathBuf),
    Handle(Box<dyn SeekWrite>),
    Sequential(Box<dyn Write + Send>),
}

impl Sink {
    /// ファイルパスへのシンクを作成
    pub fn path<P: Into<PathBuf>>(path: P) -> Self {
        Sink::Path(path.into())
    }

    /// シーク可能なハンドルへのシンクを作成
    pub fn handle<H: SeekWrite + 'static>(handle: H) -> Self {
        Sink::Handle(Box::new(handle))
    }

    /// 追記専用ハンドルへのシンクを作成
    ///
    /// シークできないため、コンテナ全体が finalize までメモリに
    /// バッファリングされる。長時間録音には向かない。
    pub fn sequential<W: Write + Send + 'static>(writer: W) -> Self {
        Sink::Sequential(Box::new(writer))
    }

    /// シンクを開いて書き込みストリームにする
    pub(crate) fn open(self) -> Result<SinkStream, RecorderError> {
        let inner = match self {
            Sink::Path(path) => {
                let file = File::create(&path)
                    .map_err(|source| RecorderError::SinkUnavailable { source })?;
                log::info!("シンクを開きました: {:?}", path);
                StreamInner::File(BufWriter::new(file))
            }
            Sink::Handle(handle) => StreamInner::Handle(handle),
            Sink::Sequential(out) => StreamInner::Buffered {
                buf: Cursor::new(Vec::new()),
                out,
            },
        };
        Ok(SinkStream { inner })
    }
}

enum StreamInner {
    File(BufWriter<File>),
    Handle(Box<dyn SeekWrite>),
    Buffered {
        buf: Cursor<Vec<u8>>,
        out: Box<dyn Write + Send>,
    },
}

/// 開かれたシンクの書き込みストリーム
///
/// シーク可能なシンクはその場でヘッダを書き換え、追記専用のシンクは
/// メモリ上のバッファに対して同じ操作を行い [`finish`](SinkStream::finish)
/// で一括して吐き出す。
pub struct SinkStream {
    inner: StreamInner,
}

impl SinkStream {
    pub(crate) fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        match &mut self.inner {
            StreamInner::File(w) => w.write_all(bytes),
            StreamInner::Handle(w) => w.write_all(bytes),
            StreamInner::Buffered { buf, .. } => buf.write_all(bytes),
        }
    }

    /// 先頭からの絶対位置へシークする
    pub(crate) fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        match &mut self.inner {
            StreamInner::File(w) => w.seek(SeekFrom::Start(pos)).map(|_| ()),
            StreamInner::Handle(w) => w.seek(SeekFrom::Start(pos)).map(|_| ()),
            StreamInner::Buffered { buf, .. } => {
                buf.set_position(pos);
                Ok(())
            }
        }
    }

    /// ストリームを閉じ、シンクを解放する
    ///
    /// 追記専用シンクはここで初めてバッファ全体が書き出される。
    pub(crate) fn finish(self) -> io::Result<()> {
        match self.inner {
            StreamInner::File(mut w) => w.flush(),
            StreamInner::Handle(mut w) => w.flush(),
            StreamInner::Buffered { buf, mut out } => {
                out.write_all(buf.get_ref())?;
                out.flush()
            }
        }
    }
}
