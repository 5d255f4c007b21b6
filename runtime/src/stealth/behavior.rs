//! Human-like interaction timing.
//!
//! Delays are drawn from per-kind distributions so inter-request timing
//! never settles into a fixed rhythm.

use rand::Rng;
use std::time::Duration;

/// Kind of interaction being imitated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    /// Dwelling on a page.
    Reading,
    /// Pause between scroll steps.
    Scrolling,
    /// Gap between keystrokes.
    Typing,
}

/// Gaussian parameters in seconds: mean, std dev, min, max.
fn params(kind: InteractionKind) -> (f64, f64, f64, f64) {
    match kind {
        InteractionKind::Reading => (3.0, 1.0, 0.5, 10.0),
        InteractionKind::Scrolling => (0.8, 0.3, 0.2, 3.0),
        InteractionKind::Typing => (0.1, 0.03, 0.05, 0.5),
    }
}

/// Standard normal sample (Box-Muller).
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn gaussian<R: Rng + ?Sized>(rng: &mut R, mean: f64, sd: f64, min: f64, max: f64) -> f64 {
    (mean + sd * standard_normal(rng)).clamp(min, max)
}

/// Random delay for an interaction kind.
pub fn human_delay(kind: InteractionKind) -> Duration {
    human_delay_with(&mut rand::thread_rng(), kind)
}

pub fn human_delay_with<R: Rng + ?Sized>(rng: &mut R, kind: InteractionKind) -> Duration {
    let (mean, sd, min, max) = params(kind);
    Duration::from_secs_f64(gaussian(rng, mean, sd, min, max))
}

/// Per-character typing timings, cumulative from the first keystroke.
///
/// Spaces and punctuation are slower; an occasional longer pause stands in
/// for hesitation.
pub fn typing_pattern(text: &str) -> Vec<(char, Duration)> {
    let mut rng = rand::thread_rng();
    let mut elapsed = 0.0;
    let mut events = Vec::with_capacity(text.len());
    for c in text.chars() {
        let gap = match c {
            ' ' => gaussian(&mut rng, 0.15, 0.05, 0.05, 0.5),
            '.' | ',' | '!' | '?' => gaussian(&mut rng, 0.3, 0.1, 0.05, 0.5),
            _ => gaussian(&mut rng, 0.1, 0.03, 0.05, 0.5),
        };
        elapsed += gap;
        if rng.gen_bool(0.05) {
            elapsed += rng.gen_range(0.5..2.0);
        }
        events.push((c, Duration::from_secs_f64(elapsed)));
    }
    events
}

/// Scroll offsets with their timestamps for a page of `page_height` pixels.
///
/// Mostly moves down in uneven steps, sometimes scrolls back a little.
pub fn scroll_pattern(page_height: u32, viewport_height: u32) -> Vec<(u32, Duration)> {
    let mut rng = rand::thread_rng();
    let bottom = page_height.saturating_sub(viewport_height) as i64;
    let mut pos: i64 = 0;
    let mut elapsed = Duration::ZERO;
    let mut steps = Vec::new();

    while pos < bottom {
        elapsed += human_delay_with(&mut rng, InteractionKind::Scrolling);
        let delta: i64 = if rng.gen_bool(0.1) && pos > 0 {
            -rng.gen_range(50..200)
        } else {
            rng.gen_range(100..500)
        };
        pos = (pos + delta).clamp(0, bottom);
        steps.push((pos as u32, elapsed));
        if rng.gen_bool(0.2) {
            elapsed += human_delay_with(&mut rng, InteractionKind::Reading);
        }
    }
    steps
}

/// Sleep for a human-length pause of the given kind.
pub async fn sleep_human(kind: InteractionKind) {
    tokio::time::sleep(human_delay(kind)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_delays_within_kind_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        for kind in [
            InteractionKind::Reading,
            InteractionKind::Scrolling,
            InteractionKind::Typing,
        ] {
            let (_, _, min, max) = params(kind);
            for _ in 0..200 {
                let d = human_delay_with(&mut rng, kind).as_secs_f64();
                assert!(d >= min && d <= max, "{kind:?}: {d}");
            }
        }
    }

    #[test]
    fn test_delays_are_not_uniform() {
        let mut rng = StdRng::seed_from_u64(11);
        let samples: Vec<Duration> = (0..20)
            .map(|_| human_delay_with(&mut rng, InteractionKind::Reading))
            .collect();
        assert!(samples.iter().any(|d| *d != samples[0]));
    }

    #[test]
    fn test_reading_slower_than_typing_on_average() {
        let mut rng = StdRng::seed_from_u64(5);
        let avg = |rng: &mut StdRng, kind| {
            (0..300)
                .map(|_| human_delay_with(rng, kind).as_secs_f64())
                .sum::<f64>()
                / 300.0
        };
        let reading = avg(&mut rng, InteractionKind::Reading);
        let typing = avg(&mut rng, InteractionKind::Typing);
        assert!(reading > typing * 10.0);
    }

    #[test]
    fn test_typing_pattern_is_increasing() {
        let events = typing_pattern("Cascade, baignade");
        assert_eq!(events.len(), 17);
        assert!(events.windows(2).all(|w| w[0].1 < w[1].1));
    }

    #[test]
    fn test_scroll_pattern_reaches_bottom() {
        let steps = scroll_pattern(3000, 800);
        assert!(!steps.is_empty());
        assert_eq!(steps.last().unwrap().0, 2200);
        assert!(steps.iter().all(|(p, _)| *p <= 2200));
    }
}
