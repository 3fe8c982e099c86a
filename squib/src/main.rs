#![no_std]
#![no_main]

#[cfg(not(any(feature = "rp2040", feature = "rp2350")))]
compile_error!(
    "Please use a chip alias:\n  - For Pico (RP2040):   cargo run-pico\n  - For Pico 2 (RP2350): cargo run-pico2"
);

#[cfg(all(feature = "rp2040", not(target_arch = "arm")))]
compile_error!("Mismatched target for RP2040! Please use 'cargo run-pico'");

#[cfg(all(feature = "rp2350", not(target_arch = "arm")))]
compile_error!("Mismatched target for RP2350! Please use 'cargo run-pico2'");

use core::cell::RefCell;

use cortex_m_rt::entry;
use defmt::unwrap;
use embassy_executor::{Executor, InterruptExecutor, Spawner};
use embassy_futures::join::join;
use embassy_rp::interrupt::{InterruptExt, Priority};
use embassy_rp::peripherals::{DMA_CH0, DMA_CH1, USB};
use embassy_rp::{bind_interrupts, interrupt};
use embassy_sync::blocking_mutex::Mutex;
use squib_core::config::SILENCE_TIMEOUT_TICKS;
use squib_core::{ArmingController, Console, NodeIdStore, Role, info, warn};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

mod arming;
mod channels;
mod datacells;
mod health;
mod macros;
mod outputs;
mod radio;
mod storage;
mod usb;

use crate::arming::Arming;
use crate::datacells::{NODE_ID, TX_PAYLOAD};
use crate::outputs::GpioOutputs;
use crate::storage::SdNodeIdStore;

assign_resources! {
    RadioResources {
        spi: SPI1,
        clk: PIN_10,
        mosi: PIN_11,
        miso: PIN_12,
        cs: PIN_13,
        reset: PIN_14,
        dio0: PIN_15,
        dma_tx: DMA_CH0,
        dma_rx: DMA_CH1,
    }
    StorageResources {
        spi: SPI0,
        clk: PIN_18,
        mosi: PIN_19,
        miso: PIN_16,
        cs: PIN_17,
    }
    OutputResources {
        detonate: PIN_20,
        arm_led: PIN_21,
    }
    USBResources {
        usb: USB,
    }
}

pub const ROLE: Role = if cfg!(feature = "transmitter") {
    Role::Transmitter
} else {
    Role::Receiver
};

// Program metadata for `picotool info`.
#[unsafe(link_section = ".bi_entries")]
#[used]
pub static PICOTOOL_ENTRIES: [embassy_rp::binary_info::EntryAddr; 4] = [
    embassy_rp::binary_info::rp_program_name!(c"squib"),
    embassy_rp::binary_info::rp_program_description!(
        c"Wireless pyro node: RFM95 frames in, fail-safe arm and detonate outputs out."
    ),
    embassy_rp::binary_info::rp_cargo_version!(),
    embassy_rp::binary_info::rp_program_build_attribute!(),
];

bind_interrupts!(pub struct Irqs {
    USBCTRL_IRQ => embassy_rp::usb::InterruptHandler<USB>;
    DMA_IRQ_0 => embassy_rp::dma::InterruptHandler<DMA_CH0>,
                 embassy_rp::dma::InterruptHandler<DMA_CH1>;
});

/// Loads the node id, starts the thread mode tasks, then serves USB.
#[embassy_executor::task]
async fn init_tasks(
    spawner: Spawner,
    arming: &'static Arming,
    storage: StorageResources,
    usb: USBResources,
) {
    let mut store = SdNodeIdStore::new(storage);
    // Without a stored id the node can arm but never be addressed.
    match store.load() {
        Ok(id) => {
            info!("Node id {}", id.get());
            NODE_ID.store(Some(id));
        }
        Err(e) => {
            warn!("No node id ({:?}), node will not fire", e);
        }
    }

    spawner.spawn(unwrap!(arming::dispatcher_task(arming)));
    spawner.spawn(unwrap!(health::health_task(arming)));

    let (mut class, usb_runner) = usb::setup_usb(usb.usb);
    let mut console = Console::new(ROLE, store, &NODE_ID, &TX_PAYLOAD);
    join(usb_runner, usb::console_loop(&mut class, &mut console)).await;
}

static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();
static EXECUTOR_LOW: StaticCell<Executor> = StaticCell::new();
static ARMING: StaticCell<Arming> = StaticCell::new();

#[interrupt]
unsafe fn SWI_IRQ_1() {
    unsafe { EXECUTOR_HIGH.on_interrupt() }
}

#[entry]
fn main() -> ! {
    let p = embassy_rp::init(Default::default());
    let r = AssignedResources::take(p);

    // Outputs are driven low here, before any task can run.
    let arming = ARMING.init(Mutex::new(RefCell::new(ArmingController::new(
        GpioOutputs::new(r.OutputResources),
        SILENCE_TIMEOUT_TICKS,
    ))));
    info!("squib starting as {:?}", ROLE);

    // Radio and watchdog preempt everything in thread mode.
    interrupt::SWI_IRQ_1.set_priority(Priority::P2);
    let spawner = EXECUTOR_HIGH.start(interrupt::SWI_IRQ_1);
    spawner.spawn(unwrap!(arming::watchdog_task(arming)));
    spawner.spawn(unwrap!(radio::radio_task(r.RadioResources)));

    let executor = EXECUTOR_LOW.init(Executor::new());
    executor.run(|spawner| {
        spawner.spawn(unwrap!(init_tasks(
            spawner,
            arming,
            r.StorageResources,
            r.USBResources,
        )));
    });
}
