use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::pipeline::generate;
use crate::state::{AppState, CycleKind};

pub fn interval_of(hours: u64) -> Duration {
    Duration::from_secs(hours.max(1) * 60 * 60)
}

/// Runs generation every `generation_interval_hours`, skipping ticks while another cycle runs.
pub fn start(state: AppState) -> JoinHandle<()> {
    let (hours, on_startup) = {
        let config = state.config.read();
        (config.generation_interval_hours, config.generate_on_startup)
    };
    let period = interval_of(hours);
    info!(
        "Scheduling generation every {} h (on startup: {})",
        period.as_secs() / 3600,
        on_startup
    );
    tokio::spawn(async move {
        let start = if on_startup {
            tokio::time::Instant::now()
        } else {
            tokio::time::Instant::now() + period
        };
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match state.try_begin(CycleKind::Generate) {
                Some(guard) => {
                    info!("Scheduled generation starting");
                    if let Err(err) = generate(state.clone(), guard).await {
                        warn!("Scheduled generation failed: {}", err);
                    }
                }
                None => info!("Skipping scheduled generation; a cycle is already running"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_has_a_floor_of_one_hour() {
        assert_eq!(interval_of(0), Duration::from_secs(3600));
        assert_eq!(interval_of(24), Duration::from_secs(24 * 3600));
    }
}
