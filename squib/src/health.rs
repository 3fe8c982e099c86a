use embassy_time::{Duration, Ticker};
use squib_core::config::HEALTH_PERIOD_MS;
use squib_core::{HealthReport, info, warn};

use crate::arming::Arming;
use crate::channels::EVENTS;
use crate::datacells::{LINK_HEALTH, NODE_ID};

/// Logs link counters and arm state every health period.
#[embassy_executor::task]
pub async fn health_task(arming: &'static Arming) -> ! {
    let mut ticker = Ticker::every(Duration::from_millis(HEALTH_PERIOD_MS));
    let mut last_dropped = 0;
    loop {
        ticker.next().await;

        let (arm_state, silent_ticks) = arming.lock(|ctl| {
            let ctl = ctl.borrow();
            (ctl.state(), ctl.silent_ticks())
        });
        let report = HealthReport {
            link: LINK_HEALTH.read(),
            events_dropped: EVENTS.dropped(),
            queue_len: EVENTS.len(),
            arm_state,
            silent_ticks,
        };

        info!("Node {:?}: {:?}", NODE_ID.load(), report);
        if report.events_dropped != last_dropped {
            warn!(
                "{} radio events dropped since last report",
                report.events_dropped.wrapping_sub(last_dropped)
            );
            last_dropped = report.events_dropped;
        }
    }
}
