use crate::config::SilenceConfig;
use std::collections::VecDeque;

/// ウィンドウに保持する1フレーム分の観測値
#[derive(Clone, Copy, Debug)]
struct WindowEntry {
    duration_ms: f64,
    amplitude: i32,
}

/// 無音検出器
///
/// 直近 `buffer_duration_ms` 分の振幅を時間インデックスで保持する
/// スライディングウィンドウ。フレーム長が一定でなくても、サンプル数
/// ではなく各フレームの実時間で窓を管理する。
///
/// # 判定規則
///
/// - ウィンドウがまだ `buffer_duration_ms` 分の音声を蓄積していない
///   うちは決して無音と判定しない（開始直後の空ウィンドウを含む）
/// - 蓄積済みウィンドウ内のすべての振幅が閾値未満なら無音
/// - 振幅が1つでも閾値以上なら音声（音声側が閉区間: `>= threshold`）
///
/// # Examples
///
/// ```
/// # use wavecap::config::SilenceConfig;
/// # use wavecap::silence::SilenceDetector;
/// let config = SilenceConfig {
///     enabled: true,
///     min_amplitude_threshold: 80,
///     buffer_duration_ms: 300,
///     pre_silence_duration_ms: 300,
/// };
/// let mut detector = SilenceDetector::new(&config);
///
/// // 窓が埋まるまでは無音と判定されない
/// assert!(!detector.observe(0, 100.0));
/// assert!(!detector.observe(0, 100.0));
///
/// // 300ms分蓄積した時点で全振幅が閾値未満なら無音
/// assert!(detector.observe(0, 100.0));
/// ```
pub struct SilenceDetector {
    /// 音声とみなす最小振幅
    ///
    /// この値以上は音声
    threshold: i32,

    /// ウィンドウの長さ (ミリ秒)
    window_duration_ms: f64,

    /// 観測値のキュー（古い順）
    window: VecDeque<WindowEntry>,

    /// ウィンドウ内の合計時間 (ミリ秒)
    total_ms: f64,
}

impl SilenceDetector {
    pub fn new(config: &SilenceConfig) -> Self {
        Self {
            threshold: config.min_amplitude_threshold,
            window_duration_ms: config.buffer_duration_ms as f64,
            window: VecDeque::new(),
            total_ms: 0.0,
        }
    }

    /// 新しい振幅観測値をウィンドウに加え、無音かどうかを判定する
    ///
    /// # Arguments
    /// * `amplitude` - フレームの振幅（16ビットスケール）
    /// * `duration_ms` - フレームの実時間（ミリ秒）
    ///
    /// # Returns
    /// * `true` - ウィンドウが埋まっており、かつ全振幅が閾値未満
    /// * `false` - それ以外
    pub fn observe(&mut self, amplitude: i32, duration_ms: f64) -> bool {
        self.window.push_back(WindowEntry {
            duration_ms,
            amplitude,
        });
        self.total_ms += duration_ms;

        // 古い観測値を追い出す。追い出してもウィンドウが
        // window_duration_ms を下回らない範囲でのみ削除する
        while let Some(front) = self.window.front() {
            if self.total_ms - front.duration_ms >= self.window_duration_ms {
                self.total_ms -= front.duration_ms;
                self.window.pop_front();
            } else {
                break;
            }
        }

        if self.total_ms < self.window_duration_ms {
            // まだウィンドウが埋まっていない
            return false;
        }

        let all_silent = self.window.iter().all(|e| e.amplitude < self.threshold);
        if all_silent {
            log::debug!(
                "無音ウィンドウを検出 ({}ms, 閾値: {})",
                self.total_ms,
                self.threshold
            );
        }
        all_silent
    }

    /// 振幅が音声とみなされるかどうか
    ///
    /// 比較は音声側が閉区間で、閾値ちょうどの振幅は音声になる。
    pub fn is_sound(&self, amplitude: i32) -> bool {
        amplitude >= self.threshold
    }

    /// ウィンドウをリセットする
    ///
    /// 一時停止からの再開時と音声再開時に呼ばれ、古い観測値が
    /// 即時の無音判定を引き起こすのを防ぐ。
    pub fn reset(&mut self) {
        self.window.clear();
        self.total_ms = 0.0;
    }

    /// ウィンドウに蓄積された時間 (ミリ秒)
    pub fn window_ms(&self) -> f64 {
        self.total_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(threshold: i32, window_ms: u32) -> SilenceDetector {
        SilenceDetector::new(&SilenceConfig {
            enabled: true,
            min_amplitude_threshold: threshold,
            buffer_duration_ms: window_ms,
            pre_silence_duration_ms: window_ms,
        })
    }

    #[test]
    fn test_empty_window_is_not_silent() {
        let det = detector(80, 1500);
        assert_eq!(det.window_ms(), 0.0);
        // 観測値がないうちは is_sound のみ意味を持つ
        assert!(det.is_sound(80));
        assert!(!det.is_sound(79));
    }

    #[test]
    fn test_partial_window_never_silent() {
        let mut det = detector(80, 1000);
        // 900ms分しか溜まっていないので、全て無音でも判定しない
        for _ in 0..9 {
            assert!(!det.observe(0, 100.0));
        }
    }

    #[test]
    fn test_full_quiet_window_is_silent() {
        let mut det = detector(80, 1000);
        for _ in 0..9 {
            assert!(!det.observe(10, 100.0));
        }
        // 10フレーム目で1000msに到達し、全振幅が閾値未満
        assert!(det.observe(10, 100.0));
    }

    #[test]
    fn test_loud_sample_in_window_prevents_silence() {
        let mut det = detector(80, 1000);
        for _ in 0..5 {
            det.observe(10, 100.0);
        }
        det.observe(5000, 100.0);
        for _ in 0..4 {
            assert!(!det.observe(10, 100.0));
        }
        // 大きい振幅がまだウィンドウ内に残っている
        assert!(!det.observe(10, 100.0));
        // さらに無音が続くと大きい振幅が追い出されて無音判定になる
        for _ in 0..4 {
            det.observe(10, 100.0);
        }
        assert!(det.observe(10, 100.0));
    }

    #[test]
    fn test_threshold_is_inclusive_on_sound_side() {
        let mut det = detector(80, 300);
        // 閾値ちょうどの振幅は音声
        assert!(det.is_sound(80));
        det.observe(80, 100.0);
        det.observe(80, 100.0);
        assert!(!det.observe(80, 100.0));
        // 閾値未満のみで埋まれば無音
        det.reset();
        det.observe(79, 100.0);
        det.observe(79, 100.0);
        assert!(det.observe(79, 100.0));
    }

    #[test]
    fn test_reset_clears_window() {
        let mut det = detector(80, 300);
        det.observe(0, 100.0);
        det.observe(0, 100.0);
        det.reset();
        assert_eq!(det.window_ms(), 0.0);
        // リセット後は再びウィンドウが埋まるまで判定しない
        assert!(!det.observe(0, 100.0));
        assert!(!det.observe(0, 100.0));
        assert!(det.observe(0, 100.0));
    }

    #[test]
    fn test_variable_frame_durations() {
        // フレーム長が一定でなくても実時間で窓が管理される
        let mut det = detector(80, 500);
        assert!(!det.observe(0, 450.0));
        assert!(det.observe(0, 50.0));

        let mut det = detector(80, 500);
        det.observe(5000, 400.0);
        // 大きい振幅のフレームがウィンドウの大半を占めている
        assert!(!det.observe(0, 100.0));
        // 500ms分の無音が蓄積されると大きいフレームが追い出される
        assert!(!det.observe(0, 300.0));
        assert!(det.observe(0, 200.0));
    }

    #[test]
    fn test_zero_amplitude_threshold() {
        // 閾値0ではあらゆる振幅が音声になり、無音判定は起きない
        let mut det = detector(0, 200);
        det.observe(0, 100.0);
        assert!(!det.observe(0, 100.0));
    }
}
