use crate::amplitude;
use crate::audio_source::{AudioSource, FrameReader, ReadResult};
use crate::buffer::FrameTail;
use crate::config::Config;
use crate::error::RecorderError;
use crate::silence::SilenceDetector;
use crate::sink::Sink;
use crate::types::{AudioFrame, RecorderEvent, RecorderState};
use crate::wav_writer::WavWriter;
use crossbeam_channel::{unbounded, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// フレーム読み取りのタイムアウト
///
/// 停止要求の検出遅延はこの値が上限になる
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// レコーダーのイベント監視者
///
/// [`WaveRecorder::subscribe`] で録音開始前に登録する。呼び出しは
/// 専用の通知スレッドから行われ、キャプチャループをブロックしない。
/// 既定実装はすべて何もしないため、必要な通知だけ実装すればよい。
pub trait RecorderObserver: Send {
    /// 状態遷移 (旧状態 → 新状態)
    fn on_state_change(&mut self, _old: RecorderState, _new: RecorderState) {}

    /// 録音経過時間の更新（ミリ秒）
    ///
    /// Recording / SkippingSilence 中のみ届く。Pause中は進まない。
    fn on_time_elapsed(&mut self, _elapsed_ms: u64) {}

    /// 振幅の更新（16ビットスケール）
    ///
    /// [`WaveRecorder::set_amplitude_enabled`] で有効化された場合のみ届く
    fn on_amplitude(&mut self, _amplitude: i32) {}

    /// 録音中のエラー
    fn on_error(&mut self, _error: &RecorderError) {}
}

/// 呼び出しスレッドとキャプチャループが共有する状態
struct Shared {
    /// 状態機械の唯一の真実
    state: Mutex<RecorderState>,
    /// 停止要求。ループが各イテレーションの先頭で観測する
    stop: AtomicBool,
    /// 一時停止中はフレームを破棄する
    paused: AtomicBool,
    /// 振幅テレメトリの有効フラグ
    amplitude_enabled: AtomicBool,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, RecorderState> {
        // 状態は単純な列挙値なので、ポイズニングしても続行できる
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 録音セッション
///
/// キャプチャ・無音スキップ・WAV書き出し・テレメトリを束ねる
/// 状態機械。`Stop` が初期状態かつ終端状態で、1セッションは
/// 1回の録音にのみ使える。
///
/// 状態遷移の要求（start / pause / resume / stop）は呼び出し側の
/// スレッドで受け付けられ、フレーム処理の境界で効果を持つ。
/// フレームの途中で遷移が反映されることはない。
///
/// # Examples
///
/// ```no_run
/// # use wavecap::audio_input::AudioInput;
/// # use wavecap::config::Config;
/// # use wavecap::recorder::WaveRecorder;
/// # use wavecap::sink::Sink;
/// let config = Config::default();
/// let mut recorder = WaveRecorder::new(Box::new(AudioInput::new("default")));
/// recorder.start(&config, Sink::path("out.wav")).unwrap();
/// std::thread::sleep(std::time::Duration::from_secs(3));
/// recorder.stop().unwrap();
/// ```
pub struct WaveRecorder {
    source: Box<dyn AudioSource>,
    shared: Arc<Shared>,
    /// 登録済み監視者。start時に通知スレッドへ移動する
    observers: Option<Vec<Box<dyn RecorderObserver>>>,
    events_tx: Option<Sender<RecorderEvent>>,
    capture: Option<JoinHandle<Result<(), RecorderError>>>,
    notifier: Option<JoinHandle<()>>,
    /// 一度でも録音を終えたか。Stopは終端状態
    finished: bool,
}

impl WaveRecorder {
    pub fn new(source: Box<dyn AudioSource>) -> Self {
        Self {
            source,
            shared: Arc::new(Shared {
                state: Mutex::new(RecorderState::Stop),
                stop: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                amplitude_enabled: AtomicBool::new(false),
            }),
            observers: Some(Vec::new()),
            events_tx: None,
            capture: None,
            notifier: None,
            finished: false,
        }
    }

    /// 現在の状態
    pub fn state(&self) -> RecorderState {
        *self.shared.lock_state()
    }

    /// 振幅テレメトリの有効/無効を切り替える
    ///
    /// 録音中でも切り替えられる
    pub fn set_amplitude_enabled(&self, enabled: bool) {
        self.shared.amplitude_enabled.store(enabled, Ordering::SeqCst);
    }

    /// 監視者を登録する
    ///
    /// 録音開始前にのみ登録できる。開始後の登録は無視される。
    pub fn subscribe(&mut self, observer: Box<dyn RecorderObserver>) {
        match &mut self.observers {
            Some(list) => list.push(observer),
            None => log::warn!("録音開始後の監視者登録は無視されます"),
        }
    }

    /// 録音を開始する
    ///
    /// シンクを開いて暫定ヘッダを書き、オーディオソースを開いて
    /// キャプチャループを起動し、Recording に遷移して監視者に通知する。
    ///
    /// # Errors
    ///
    /// - [`RecorderError::AlreadyRecording`] - Stop以外の状態、または
    ///   既に録音を終えたセッション
    /// - [`RecorderError::InvalidConfig`] - 設定値の制約違反
    /// - [`RecorderError::SinkUnavailable`] - シンクを開けない
    /// - [`RecorderError::SourceUnavailable`] - マイクを取得できない。
    ///   この場合も開いたシンクは解放され、セッションはStopのまま
    pub fn start(&mut self, config: &Config, sink: Sink) -> Result<(), RecorderError> {
        config.validate()?;

        {
            let state = self.shared.lock_state();
            if *state != RecorderState::Stop {
                return Err(RecorderError::AlreadyRecording { state: *state });
            }
        }
        if self.finished {
            // Stopは終端状態。再録音には新しいセッションを作る
            return Err(RecorderError::AlreadyRecording {
                state: RecorderState::Stop,
            });
        }

        let writer = WavWriter::open(sink, &config.wave)?;

        let reader = match self.source.open(&config.wave, config.input.noise_suppressor) {
            Ok(reader) => reader,
            Err(e) => {
                // 開いてしまったシンクは解放する。暫定ヘッダだけの
                // ファイルが残るが、呼び出し側が破棄する
                drop(writer);
                return Err(e);
            }
        };

        let (events_tx, events_rx) = unbounded();
        let mut observers = self.observers.take().unwrap_or_default();
        let notifier = thread::spawn(move || {
            for event in events_rx.iter() {
                dispatch(&mut observers, &event);
            }
        });

        self.shared.stop.store(false, Ordering::SeqCst);
        self.shared.paused.store(false, Ordering::SeqCst);
        {
            let mut state = self.shared.lock_state();
            *state = RecorderState::Recording;
        }
        let _ = events_tx.send(RecorderEvent::StateChange {
            old: RecorderState::Stop,
            new: RecorderState::Recording,
        });
        log::info!("録音を開始しました");

        let skipper = if config.silence.enabled {
            Some(SilenceSkipper {
                detector: SilenceDetector::new(&config.silence),
                tail: FrameTail::new(config.silence.pre_silence_duration_ms),
            })
        } else {
            None
        };

        let worker = CaptureLoop {
            reader,
            writer,
            skipper,
            shared: self.shared.clone(),
            events: events_tx.clone(),
            elapsed_ms: 0.0,
            was_paused: false,
        };
        self.capture = Some(thread::spawn(move || worker.run()));
        self.events_tx = Some(events_tx);
        self.notifier = Some(notifier);

        Ok(())
    }

    /// 録音を一時停止する
    ///
    /// Pause / Stop からの呼び出しは何もしない。一時停止中に届いた
    /// フレームはキューされず破棄されるため、メモリ使用量は増えない。
    /// オーディオソースとシンクは開いたまま維持される。
    pub fn pause(&mut self) {
        let old = {
            let mut state = self.shared.lock_state();
            match *state {
                RecorderState::Recording | RecorderState::SkippingSilence => {
                    let old = *state;
                    self.shared.paused.store(true, Ordering::SeqCst);
                    *state = RecorderState::Pause;
                    Some(old)
                }
                RecorderState::Pause | RecorderState::Stop => None,
            }
        };

        match old {
            Some(old) => {
                log::info!("録音を一時停止しました");
                self.emit(RecorderEvent::StateChange {
                    old,
                    new: RecorderState::Pause,
                });
            }
            None => log::debug!("pause: 対象外の状態のため何もしません"),
        }
    }

    /// 一時停止から再開する
    ///
    /// Pause以外の状態からの呼び出しは何もしない
    pub fn resume(&mut self) {
        let resumed = {
            let mut state = self.shared.lock_state();
            if *state == RecorderState::Pause {
                self.shared.paused.store(false, Ordering::SeqCst);
                *state = RecorderState::Recording;
                true
            } else {
                false
            }
        };

        if resumed {
            log::info!("録音を再開しました");
            self.emit(RecorderEvent::StateChange {
                old: RecorderState::Pause,
                new: RecorderState::Recording,
            });
        } else {
            log::debug!("resume: 一時停止中ではないため何もしません");
        }
    }

    /// 録音を停止する
    ///
    /// キャプチャループを止め、プリサイレンステールを書き切り、
    /// ヘッダを確定してシンクを解放し、Stop に遷移する。
    /// 冪等で、停止済みセッションへの呼び出しは何もしない。
    ///
    /// # Errors
    ///
    /// 停止処理中のI/O失敗は戻り値で報告される。その場合も
    /// シンクは解放済みで、書き込み先は破損として扱うこと。
    pub fn stop(&mut self) -> Result<(), RecorderError> {
        if self.capture.is_none() && *self.shared.lock_state() == RecorderState::Stop {
            log::debug!("stop: 既に停止済み");
            return Ok(());
        }

        self.shared.stop.store(true, Ordering::SeqCst);

        let mut result = Ok(());
        if let Some(handle) = self.capture.take() {
            match handle.join() {
                Ok(r) => result = r,
                Err(_) => log::error!("キャプチャスレッドが異常終了しました"),
            }
        }

        self.source.close();

        let old = {
            let mut state = self.shared.lock_state();
            let old = *state;
            *state = RecorderState::Stop;
            old
        };
        if old != RecorderState::Stop {
            self.emit(RecorderEvent::StateChange {
                old,
                new: RecorderState::Stop,
            });
        }

        // 送信側を全て破棄すると、通知スレッドは残りのイベントを
        // 配り切って終了する
        self.events_tx = None;
        if let Some(handle) = self.notifier.take() {
            let _ = handle.join();
        }

        self.finished = true;
        log::info!("録音を停止しました");
        result
    }

    fn emit(&self, event: RecorderEvent) {
        if let Some(tx) = &self.events_tx {
            let _ = tx.send(event);
        }
    }
}

impl Drop for WaveRecorder {
    fn drop(&mut self) {
        if self.capture.is_some() {
            if let Err(e) = self.stop() {
                log::error!("ドロップ時の停止処理でエラー: {}", e);
            }
        }
    }
}

/// イベントを登録済み監視者すべてに配る
fn dispatch(observers: &mut [Box<dyn RecorderObserver>], event: &RecorderEvent) {
    for observer in observers.iter_mut() {
        match event {
            RecorderEvent::StateChange { old, new } => observer.on_state_change(*old, *new),
            RecorderEvent::TimeElapsed(ms) => observer.on_time_elapsed(*ms),
            RecorderEvent::Amplitude(amp) => observer.on_amplitude(*amp),
            RecorderEvent::Error(e) => observer.on_error(e),
        }
    }
}

/// 無音スキップに必要な検出器と遅延ラインの組
struct SilenceSkipper {
    detector: SilenceDetector,
    tail: FrameTail,
}

/// キャプチャループ本体
///
/// 専用スレッドで動き、フレームの読み取りが唯一のブロック地点。
/// 受理したフレームは受信したイテレーション内で同期的に
/// ライターへ転送され、入力順が保たれる。
struct CaptureLoop {
    reader: FrameReader,
    writer: WavWriter,
    skipper: Option<SilenceSkipper>,
    shared: Arc<Shared>,
    events: Sender<RecorderEvent>,
    /// 録音経過時間。フレームの実時間の積算で、壁時計には依存しない
    elapsed_ms: f64,
    /// 直前のイテレーションが一時停止中だったか
    was_paused: bool,
}

impl CaptureLoop {
    fn run(mut self) -> Result<(), RecorderError> {
        loop {
            // 停止要求はフレーム境界でのみ観測する
            if self.shared.stop.load(Ordering::SeqCst) {
                break;
            }

            let frame = match self.reader.read(READ_TIMEOUT) {
                ReadResult::Frame(frame) => frame,
                ReadResult::Timeout => continue,
                ReadResult::Closed => {
                    log::info!("フレームストリームが終端しました");
                    break;
                }
            };

            if self.shared.stop.load(Ordering::SeqCst) {
                break;
            }

            if self.shared.paused.load(Ordering::SeqCst) {
                // 一時停止中のフレームはキューせず破棄する
                self.was_paused = true;
                continue;
            }

            if let Err(e) = self.process_frame(frame) {
                self.fail(e);
                // エラーは通知経路で表面化済み
                return Ok(());
            }
        }

        self.shutdown()
    }

    fn process_frame(&mut self, frame: AudioFrame) -> Result<(), RecorderError> {
        if self.was_paused {
            // 一時停止前の古い観測値が即時の無音判定を起こさないようにする
            if let Some(skipper) = &mut self.skipper {
                skipper.detector.reset();
            }
            self.was_paused = false;
        }

        let amp = amplitude::analyze(&frame.samples);
        if self.shared.amplitude_enabled.load(Ordering::SeqCst) {
            let _ = self.events.send(RecorderEvent::Amplitude(amp));
        }
        let duration_ms = frame.duration_ms();

        let mut transition = None;
        {
            let mut state = self.shared.lock_state();
            match *state {
                RecorderState::Recording => {
                    match &mut self.skipper {
                        Some(skipper) => {
                            if skipper.detector.observe(amp, duration_ms) {
                                // 無音を検出。抑制に入る前にプリサイレンス
                                // テールを書き切り、境界の音を残す
                                for f in skipper.tail.drain() {
                                    self.writer.write_frame(&f)?;
                                }
                                *state = RecorderState::SkippingSilence;
                                transition = Some((
                                    RecorderState::Recording,
                                    RecorderState::SkippingSilence,
                                ));
                            } else {
                                for f in skipper.tail.push(frame) {
                                    self.writer.write_frame(&f)?;
                                }
                            }
                        }
                        None => {
                            self.writer.write_frame(&frame)?;
                        }
                    }
                    self.elapsed_ms += duration_ms;
                }
                RecorderState::SkippingSilence => {
                    if let Some(skipper) = &mut self.skipper {
                        if skipper.detector.is_sound(amp) {
                            // 音声再開。ウィンドウを切り直して録音に戻る
                            skipper.detector.reset();
                            skipper.detector.observe(amp, duration_ms);
                            for f in skipper.tail.push(frame) {
                                self.writer.write_frame(&f)?;
                            }
                            *state = RecorderState::Recording;
                            transition = Some((
                                RecorderState::SkippingSilence,
                                RecorderState::Recording,
                            ));
                        }
                        // 閾値未満のフレームは破棄
                    }
                    self.elapsed_ms += duration_ms;
                }
                RecorderState::Pause | RecorderState::Stop => {
                    // フラグ側で先に弾かれる。ここに届いたフレームは破棄
                    return Ok(());
                }
            }
        }

        if let Some((old, new)) = transition {
            log::info!("状態遷移: {:?} → {:?}", old, new);
            let _ = self.events.send(RecorderEvent::StateChange { old, new });
        }
        let _ = self
            .events
            .send(RecorderEvent::TimeElapsed(self.elapsed_ms as u64));

        Ok(())
    }

    /// 録音中のI/O失敗。セッションを強制的にStopへ遷移させる
    fn fail(mut self, error: RecorderError) {
        log::error!("書き込みエラーにより録音を強制停止します: {}", error);
        let _ = self.events.send(RecorderEvent::Error(error));

        // ヘッダが未確定でもシンクは必ず解放する
        if let Err(e) = self.writer.finalize() {
            log::error!("強制停止時のファイナライズに失敗: {}", e);
        }

        self.shared.stop.store(true, Ordering::SeqCst);
        let old = {
            let mut state = self.shared.lock_state();
            let old = *state;
            *state = RecorderState::Stop;
            old
        };
        if old != RecorderState::Stop {
            let _ = self.events.send(RecorderEvent::StateChange {
                old,
                new: RecorderState::Stop,
            });
        }
    }

    /// 遅延ラインに残った受理済みフレームを書き切る
    fn flush_tail(&mut self) -> Result<(), RecorderError> {
        if let Some(skipper) = &mut self.skipper {
            for f in skipper.tail.drain() {
                self.writer.write_frame(&f)?;
            }
        }
        Ok(())
    }

    /// 通常の停止処理。フラッシュに失敗してもシンクは解放する
    fn shutdown(mut self) -> Result<(), RecorderError> {
        let flushed = self.flush_tail();
        let finalized = self.writer.finalize();
        if let Some(e) = flushed.as_ref().err().or(finalized.as_ref().err()) {
            log::error!("停止処理でエラー: {}", e);
        }
        flushed.and(finalized)
    }
}
