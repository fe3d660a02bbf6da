//! Simulated streaming: reveal a finished response one character at a time.

use std::time::Duration;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(75);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderState {
    /// Nothing to reveal yet.
    #[default]
    Idle,
    Revealing,
    Complete,
}

/// One character to append, due `delay` after the reveal started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTick {
    pub index: usize,
    pub unit: char,
    pub delay: Duration,
}

/// Split `text` into ticks. Tick `i` is due at `i * interval` from the start.
pub fn plan(text: &str, interval: Duration) -> Vec<RenderTick> {
    text.chars()
        .enumerate()
        .map(|(index, unit)| RenderTick {
            index,
            unit,
            delay: interval.saturating_mul(u32::try_from(index).unwrap_or(u32::MAX)),
        })
        .collect()
}

/// Deliver `ticks` in order from a single task.
///
/// Each tick waits for its own deadline relative to one start instant, so a
/// late wakeup never reorders characters; it only delivers the backlog at
/// once. `apply` returns `false` once the reveal has been superseded, which
/// stops the loop. Returns whether every tick was applied.
pub async fn reveal<F>(ticks: Vec<RenderTick>, mut apply: F) -> bool
where
    F: FnMut(&RenderTick) -> bool,
{
    let start = tokio::time::Instant::now();
    for tick in &ticks {
        tokio::time::sleep_until(start + tick.delay).await;
        if !apply(tick) {
            tracing::debug!(index = tick.index, total = ticks.len(), "reveal superseded");
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_uses_linear_delays() {
        let ticks = plan("héy", Duration::from_millis(75));
        assert_eq!(ticks.len(), 3);
        assert_eq!(ticks[1].unit, 'é');
        assert_eq!(
            ticks.iter().map(|t| t.delay.as_millis()).collect::<Vec<_>>(),
            vec![0, 75, 150]
        );
        assert!(plan("", Duration::from_millis(75)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reveal_applies_ticks_in_order_on_schedule() {
        let start = tokio::time::Instant::now();
        let mut seen = Vec::new();
        let done = reveal(plan("abcd", Duration::from_millis(10)), |t| {
            seen.push((t.unit, start.elapsed().as_millis()));
            true
        })
        .await;

        assert!(done);
        assert_eq!(seen, vec![('a', 0), ('b', 10), ('c', 20), ('d', 30)]);
    }

    #[tokio::test(start_paused = true)]
    async fn reveal_stops_when_superseded() {
        let mut out = String::new();
        let done = reveal(plan("abcdef", Duration::from_millis(10)), |t| {
            if t.index == 3 {
                return false;
            }
            out.push(t.unit);
            true
        })
        .await;

        assert!(!done);
        assert_eq!(out, "abc");
    }
}
