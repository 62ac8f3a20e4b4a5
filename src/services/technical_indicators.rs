//! Indicator maths on a series of daily closes (oldest first).
//! Each series is aligned with the input; `None` where not enough history.

pub struct MacdSeries {
    pub line: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

/// EMA seeded with the first value (pandas `ewm(adjust=False)`).
pub fn calc_ema(data: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; data.len()];
    if data.is_empty() || period == 0 { return result; }

    let multiplier = 2.0 / (period as f64 + 1.0);
    result[0] = Some(data[0]);

    for i in 1..data.len() {
        let prev = result[i - 1].unwrap_or(data[i]);
        result[i] = Some(data[i] * multiplier + prev * (1.0 - multiplier));
    }
    result
}

/// MACD line = EMA(fast) - EMA(slow); signal = EMA(line, signal).
pub fn calc_macd(data: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    let ema_fast = calc_ema(data, fast);
    let ema_slow = calc_ema(data, slow);
    let n = data.len();

    let line: Vec<Option<f64>> = (0..n)
        .map(|i| match (ema_fast[i], ema_slow[i]) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        })
        .collect();

    // signal runs over the defined part of the line only
    let defined: Vec<f64> = line.iter().flatten().copied().collect();
    let offset = n - defined.len();
    let signal_raw = calc_ema(&defined, signal);

    let mut signal_series = vec![None; n];
    let mut histogram = vec![None; n];
    for (j, s) in signal_raw.into_iter().enumerate() {
        let i = offset + j;
        signal_series[i] = s;
        if let (Some(l), Some(s)) = (line[i], s) {
            histogram[i] = Some(l - s);
        }
    }

    MacdSeries { line, signal: signal_series, histogram }
}

/// RSI with gains and losses smoothed by an EWM of alpha `1/period`, seeded
/// with the first bar (which has no change, so counts as zero). Defined from
/// index `period - 1`, like `ta`'s `RSIIndicator`.
pub fn calc_rsi(data: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; data.len()];
    if period == 0 || data.len() < period { return result; }

    let alpha = 1.0 / period as f64;
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    for i in 1..data.len() {
        let change = data[i] - data[i - 1];
        let (gain, loss) = if change > 0.0 { (change, 0.0) } else { (0.0, change.abs()) };

        avg_gain = (1.0 - alpha) * avg_gain + alpha * gain;
        avg_loss = (1.0 - alpha) * avg_loss + alpha * loss;
        if i + 1 >= period {
            result[i] = Some(rsi_value(avg_gain, avg_loss));
        }
    }

    result
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss.abs() < 1e-10 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// Lowest close over the trailing `window` sessions.
pub fn support_level(data: &[f64], window: usize) -> Option<f64> {
    let start = data.len().saturating_sub(window);
    data[start..].iter().copied().reduce(f64::min)
}

pub fn last_value(series: &[Option<f64>]) -> Option<f64> {
    series.last().copied().flatten()
}
