use anyhow::{Context, Result};
use env_logger::Env;
use std::fs;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;
use wavecap::audio_input::AudioInput;
use wavecap::config::Config;
use wavecap::error::RecorderError;
use wavecap::recorder::{RecorderObserver, WaveRecorder};
use wavecap::sink::Sink;
use wavecap::types::RecorderState;

/// 状態・経過時間・振幅をログに流す監視者
struct ConsoleObserver {
    last_second: u64,
}

impl RecorderObserver for ConsoleObserver {
    fn on_state_change(&mut self, old: RecorderState, new: RecorderState) {
        log::info!("状態: {:?} → {:?}", old, new);
    }

    fn on_time_elapsed(&mut self, elapsed_ms: u64) {
        // 1秒刻みでだけ出力する
        let second = elapsed_ms / 1000;
        if second > self.last_second {
            self.last_second = second;
            log::info!("経過時間: {}秒", second);
        }
    }

    fn on_amplitude(&mut self, amplitude: i32) {
        log::debug!("振幅: {}", amplitude);
    }

    fn on_error(&mut self, error: &RecorderError) {
        log::error!("録音エラー: {}", error);
    }
}

fn main() -> Result<()> {
    // コマンドライン引数をパース
    let args: Vec<String> = std::env::args().collect();

    // デバイス一覧表示モード
    if args.len() > 1 && args[1] == "--show-interfaces" {
        AudioInput::list_devices()?;
        return Ok(());
    }

    // 設定ファイル生成モード
    if args.len() > 1 && args[1] == "--generate-config" {
        let config_path = if args.len() > 2 {
            &args[2]
        } else {
            "config.toml"
        };
        Config::write_default(config_path)?;
        println!("設定ファイルを生成しました: {}", config_path);
        return Ok(());
    }

    // 設定ファイルのパス
    let config_path = if args.len() > 1 && !args[1].starts_with("--") {
        &args[1]
    } else {
        "config.toml"
    };

    // 設定を読み込み
    let config = Config::load_or_default(config_path)?;

    // ロガーを初期化
    env_logger::Builder::from_env(Env::default().default_filter_or(config.output.log_level.as_str()))
        .format_timestamp(None)
        .init();

    log::info!("wavecap を起動します");
    log::info!("設定: {:?}", config);

    // 出力先を準備
    let output_dir = PathBuf::from(&config.output.output_dir);
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("出力ディレクトリの作成に失敗: {:?}", output_dir))?;
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let output_path = output_dir.join(format!("recording_{}.wav", timestamp));

    // Ctrl+C ハンドラを設定
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    ctrlc::set_handler(move || {
        log::info!("停止シグナルを受信しました...");
        running_clone.store(false, Ordering::SeqCst);
    })?;

    // レコーダーを構築して録音開始
    let mut recorder = WaveRecorder::new(Box::new(AudioInput::new(
        config.input.device_id.clone(),
    )));
    recorder.subscribe(Box::new(ConsoleObserver { last_second: 0 }));
    recorder.set_amplitude_enabled(config.output.amplitude);

    recorder
        .start(&config, Sink::path(&output_path))
        .with_context(|| "録音の開始に失敗")?;

    log::info!("録音を開始しました (Ctrl+C で停止): {:?}", output_path);

    // メインループ: 停止を待つ
    while running.load(Ordering::SeqCst) {
        if recorder.state() == RecorderState::Stop {
            // 書き込みエラーなどで録音側から停止した
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }

    // クリーンアップ
    log::info!("停止処理を開始します...");
    recorder.stop().with_context(|| "録音の停止に失敗")?;

    log::info!("録音ファイル: {:?}", output_path);
    log::info!("wavecap を終了しました");

    Ok(())
}
