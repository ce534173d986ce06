use serde::{Deserialize, Serialize};

const TIME_EPSILON: f64 = 1e-9;

/// A gain breakpoint, `time` in seconds from the start of the sound.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct EnvelopePoint {
    pub time: f64,
    pub gain: f64,
}

impl EnvelopePoint {
    pub const fn new(time: f64, gain: f64) -> Self {
        Self { time, gain }
    }
}

/// What happens to a contour once the note's duration is reached.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Cut at the note end, keeping whatever level the contour had reached.
    Hold,
    /// Ramp linearly to silence at the note end.
    Linear,
}

/// Piecewise-linear gain at `time`; flat before the first and after the last point.
/// An empty envelope is full volume.
pub fn sample(points: &[EnvelopePoint], time: f64) -> f64 {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return 1.0;
    };

    if time <= first.time {
        return first.gain;
    }
    if time >= last.time {
        return last.gain;
    }

    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if time <= b.time {
            let span = b.time - a.time;
            if span <= TIME_EPSILON {
                return b.gain;
            }
            return a.gain + (b.gain - a.gain) * (time - a.time) / span;
        }
    }

    last.gain
}

/// Spreads `values` evenly from 0 to `duration`; one value is a constant envelope.
pub fn spread(values: &[f64], duration: f64) -> Vec<EnvelopePoint> {
    match values {
        [] => vec![EnvelopePoint::new(0.0, 1.0)],
        [only] => vec![EnvelopePoint::new(0.0, *only)],
        _ => {
            let steps = (values.len() - 1) as f64;
            values
                .iter()
                .enumerate()
                .map(|(i, &gain)| EnvelopePoint::new(duration * i as f64 / steps, gain))
                .collect()
        }
    }
}

/// Truncates a canonical contour to `duration` and closes it according to `release`.
pub fn clip(stages: &[EnvelopePoint], duration: f64, release: Release) -> Vec<EnvelopePoint> {
    let mut points: Vec<EnvelopePoint> = stages
        .iter()
        .copied()
        .take_while(|p| p.time < duration - TIME_EPSILON)
        .collect();

    let end_gain = match release {
        Release::Hold => sample(stages, duration),
        Release::Linear => 0.0,
    };
    points.push(EnvelopePoint::new(duration, end_gain));

    points
}

/// Pointwise product of two envelopes, evaluated on the union of their breakpoints.
pub fn multiply(a: &[EnvelopePoint], b: &[EnvelopePoint]) -> Vec<EnvelopePoint> {
    let mut times: Vec<f64> = a.iter().chain(b.iter()).map(|p| p.time).collect();
    times.sort_by(|x, y| x.total_cmp(y));
    times.dedup_by(|x, y| (*x - *y).abs() <= TIME_EPSILON);

    times
        .into_iter()
        .map(|t| EnvelopePoint::new(t, sample(a, t) * sample(b, t)))
        .collect()
}
