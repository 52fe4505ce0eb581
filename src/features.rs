//! Per-trial derived measures.
use ndarray::{s, Array2, Array3, ArrayView1, Axis};

/// Pupil diameter in mm from camera area units: `a + b·√area`.
///
/// Strictly increasing for `area ≥ 0` when `b > 0`; negative areas give NaN.
pub fn area_to_mm(area: f64, (a, b): (f64, f64)) -> f64 {
    a + b * area.sqrt()
}

/// Mean of a series as f64; NaN when empty.
pub fn mean(x: ArrayView1<f32>) -> f64 {
    if x.is_empty() {
        return f64::NAN;
    }
    x.iter().map(|&v| v as f64).sum::<f64>() / x.len() as f64
}

/// Ordinary least-squares slope of `y` against its sample index.
///
/// NaN when fewer than two samples are given or any sample is NaN.
pub fn ols_slope(y: ArrayView1<f32>) -> f64 {
    let n = y.len();
    if n < 2 {
        return f64::NAN;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(y);
    let (sxy, sxx) = y.iter().enumerate().fold((0.0, 0.0), |(sxy, sxx), (i, &v)| {
        let dx = i as f64 - x_mean;
        (sxy + dx * (v as f64 - y_mean), sxx + dx * dx)
    });
    sxy / sxx
}

/// Direction of the early pupil response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PupilTrend {
    Dilating,
    Constricting,
}

impl PupilTrend {
    /// `Dilating` only for a strictly positive slope; zero and NaN slopes are
    /// `Constricting`.
    pub fn classify(slope: f64) -> Self {
        if slope > 0.0 { PupilTrend::Dilating } else { PupilTrend::Constricting }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PupilTrend::Dilating => "Dilating",
            PupilTrend::Constricting => "Constricting",
        }
    }
}

/// Derived periocular channels, each `[trials, samples]`.
pub struct ErgChannels {
    /// Mean of all four electrodes.
    pub full: Array2<f32>,
    /// Mean of the two upper-eyelid electrodes.
    pub upper: Array2<f32>,
    /// Mean of the two lower-eyelid electrodes.
    pub lower: Array2<f32>,
    /// `mean(UL, LL) − mean(UR, LR)`.
    pub lateral: Array2<f32>,
}

/// Derive ERG channels from EOG epochs `[trials, 4, samples]` whose channel
/// axis is ordered upper-left, upper-right, lower-left, lower-right.
pub fn erg_channels(eog: &Array3<f32>) -> ErgChannels {
    let ch = |i: usize| eog.index_axis(Axis(1), i).to_owned();
    let (ul, ur, ll, lr) = (ch(0), ch(1), ch(2), ch(3));
    ErgChannels {
        full: (&ul + &ur + &ll + &lr) / 4.0,
        upper: (&ul + &ur) / 2.0,
        lower: (&ll + &lr) / 2.0,
        lateral: (&ul + &ll) / 2.0 - (&ur + &lr) / 2.0,
    }
}

/// Mean over `rows` of the channel axis of `[trials, channels, samples]`.
pub fn channel_mean(epochs: &Array3<f32>, rows: &[usize]) -> Array2<f32> {
    let picked = epochs.select(Axis(1), rows);
    picked
        .mean_axis(Axis(1))
        .unwrap_or_else(|| Array2::zeros((epochs.dim().0, epochs.dim().2)))
}

/// Symmetric Hanning smoothing of length `winlen` with reflected edges
/// (the classic numpy cookbook `smooth`). Lengths below 3 return the input.
pub fn hanning_smooth(x: ArrayView1<f32>, winlen: usize) -> Vec<f32> {
    let n = x.len();
    if winlen < 3 || n < winlen {
        return x.to_vec();
    }
    let w: Vec<f64> = (0..winlen)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / (winlen - 1) as f64).cos())
        .collect();
    let w_sum: f64 = w.iter().sum();
    let half = winlen / 2;
    // Reflect without repeating the edge sample.
    let at = |i: isize| -> f64 {
        let j = if i < 0 {
            (-i) as usize
        } else if i as usize >= n {
            2 * (n - 1) - i as usize
        } else {
            i as usize
        };
        x[j.min(n - 1)] as f64
    };
    (0..n as isize)
        .map(|t| {
            let acc: f64 = w
                .iter()
                .enumerate()
                .map(|(k, &wk)| wk * at(t + k as isize - half as isize))
                .sum();
            (acc / w_sum) as f32
        })
        .collect()
}

/// Mean sample-to-sample Euclidean gaze velocity over the first `n`
/// samples, after Hanning smoothing.
pub fn mean_gaze_velocity(x: ArrayView1<f32>, y: ArrayView1<f32>, winlen: usize, n: usize) -> f64 {
    let xs = hanning_smooth(x, winlen);
    let ys = hanning_smooth(y, winlen);
    let n = n.min(xs.len()).min(ys.len());
    if n < 2 {
        return f64::NAN;
    }
    let total: f64 = (1..n)
        .map(|i| {
            let dx = (xs[i] - xs[i - 1]) as f64;
            let dy = (ys[i] - ys[i - 1]) as f64;
            (dx * dx + dy * dy).sqrt()
        })
        .sum();
    total / (n - 1) as f64
}

/// Mean of each row over `[a, b)`.
pub fn window_means(series: &Array2<f32>, a: usize, b: usize) -> Vec<f64> {
    series.outer_iter().map(|row| mean(row.slice(s![a..b]))).collect()
}
