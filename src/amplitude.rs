use crate::types::SampleF32;

/// サンプルバッファのピーク振幅を計算する
///
/// 正規化済みサンプル (-1.0 ~ 1.0) の絶対値の最大を16ビット整数
/// スケール (0 ~ 32767) に変換して返す。入力のビット深度に
/// 依存しないため、無音判定の閾値はどの録音設定でも同じ意味を持つ。
///
/// 決定的な純関数で、状態は持たない。
///
/// # Examples
///
/// ```
/// # use wavecap::amplitude;
/// assert_eq!(amplitude::analyze(&[]), 0);
/// assert_eq!(amplitude::analyze(&[0.0, 0.5, -0.25]), 16383);
/// assert_eq!(amplitude::analyze(&[1.0]), i16::MAX as i32);
/// ```
pub fn analyze(samples: &[SampleF32]) -> i32 {
    let peak = samples.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
    (peak.clamp(0.0, 1.0) * i16::MAX as f32) as i32
}
