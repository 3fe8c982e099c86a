use embassy_time::{Duration, Ticker};
use squib_core::config::{DEPLOYMENT_MAGIC, WATCHDOG_TICK_MS};
use squib_core::{Dispatcher, SharedArming};

use crate::channels::EVENTS;
use crate::datacells::{LINK_HEALTH, NODE_ID};
use crate::outputs::GpioOutputs;

pub type Arming = SharedArming<GpioOutputs>;

/// Drains the radio event queue into the arming controller.
#[embassy_executor::task]
pub async fn dispatcher_task(arming: &'static Arming) -> ! {
    let mut dispatcher = Dispatcher::new(arming, &NODE_ID, &LINK_HEALTH, DEPLOYMENT_MAGIC);
    dispatcher.run(&EVENTS).await
}

/// Silence watchdog. Runs on the high priority executor so a busy thread
/// executor can't delay the fall back to safe.
#[embassy_executor::task]
pub async fn watchdog_task(arming: &'static Arming) -> ! {
    let mut ticker = Ticker::every(Duration::from_millis(WATCHDOG_TICK_MS));
    loop {
        ticker.next().await;
        arming.lock(|ctl| ctl.borrow_mut().on_tick());
    }
}
