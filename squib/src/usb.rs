use crate::Irqs;
use crate::storage::SdNodeIdStore;
use cortex_m::peripheral::SCB;
use embassy_futures::select::{Either, select};
use embassy_rp::Peri;
use embassy_rp::peripherals::USB;
use embassy_rp::usb::Driver;
use embassy_time::{Duration, Timer};
use embassy_usb::class::cdc_acm::{CdcAcmClass, State};
use embassy_usb::driver::EndpointError;
use embassy_usb::{Builder, Config};
use squib_core::command::CommandWindow;
use squib_core::console::{Console, REPLY_MAX_LEN, Reply, reset_requested};
use squib_core::{info, warn};
use static_cell::StaticCell;

pub type SerialClass = CdcAcmClass<'static, Driver<'static, USB>>;

// Line state changes arrive on the control pipe, not as data.
const RESET_POLL: Duration = Duration::from_millis(50);

pub struct Disconnected {}

impl From<EndpointError> for Disconnected {
    fn from(val: EndpointError) -> Self {
        if matches!(val, EndpointError::BufferOverflow) {
            warn!("USB buffer overflow, dropping connection");
        }
        Disconnected {}
    }
}

/// Builds the USB device with two CDC ports: the operator console first, the
/// log stream second. Returns the console class and a future that must be
/// polled for either to work.
pub fn setup_usb(usb: Peri<'static, USB>) -> (SerialClass, impl core::future::Future<Output = ()>) {
    let usb_driver = Driver::new(usb, Irqs);

    let mut config = Config::new(0xc0de, 0xcafe);
    config.manufacturer = Some("squib");
    config.product = Some(if cfg!(feature = "transmitter") {
        "squib transmitter"
    } else {
        "squib receiver"
    });
    config.serial_number = Some("00000001");
    config.max_power = 100;
    config.max_packet_size_0 = 64;

    static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
    static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
    static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();

    let mut builder = Builder::new(
        usb_driver,
        config,
        CONFIG_DESCRIPTOR.init([0; 256]),
        BOS_DESCRIPTOR.init([0; 256]),
        &mut [], // no msos descriptors
        CONTROL_BUF.init([0; 64]),
    );

    static STATE: StaticCell<State> = StaticCell::new();
    let class = CdcAcmClass::new(&mut builder, STATE.init(State::new()), 64);

    static LOGGER_STATE: StaticCell<State> = StaticCell::new();
    let logger_class = CdcAcmClass::new(&mut builder, LOGGER_STATE.init(State::new()), 64);
    let log_fut = embassy_usb_logger::with_class!(1024, log::LevelFilter::Info, logger_class);

    static DEVICE: StaticCell<embassy_usb::UsbDevice<'static, Driver<'static, USB>>> =
        StaticCell::new();
    let usb = DEVICE.init(builder.build());
    let usb_fut = usb.run();

    (class, async move {
        embassy_futures::join::join(usb_fut, log_fut).await;
    })
}

/// Serves the operator console for as long as the board runs. The command
/// window survives reconnects.
pub async fn console_loop(
    class: &mut SerialClass,
    console: &mut Console<'static, SdNodeIdStore>,
) -> ! {
    let mut window = CommandWindow::new();
    loop {
        class.wait_connection().await;
        info!("Console connected");
        let _ = run_console(class, &mut window, console).await;
        info!("Console disconnected");
    }
}

// Returns when the host goes away.
async fn run_console(
    class: &mut SerialClass,
    window: &mut CommandWindow,
    console: &mut Console<'static, SdNodeIdStore>,
) -> Result<(), Disconnected> {
    let mut rx_buf = [0u8; 64];
    loop {
        let n = match select(class.read_packet(&mut rx_buf), Timer::after(RESET_POLL)).await {
            Either::First(read) => read?,
            Either::Second(()) => {
                check_reset(class);
                continue;
            }
        };

        // Echo first so replies land after what the operator typed.
        class.write_packet(&rx_buf[..n]).await?;

        for &b in &rx_buf[..n] {
            for cmd in window.push(b) {
                info!("Command {:?}", cmd.kind());
                let reply = console.execute(cmd);
                write_reply(class, reply).await?;
            }
        }
    }
}

fn check_reset(class: &SerialClass) {
    if reset_requested(class.line_coding().data_rate(), class.dtr()) {
        warn!("Reset requested by host");
        SCB::sys_reset();
    }
}

async fn write_reply(class: &mut SerialClass, reply: Reply) -> Result<(), Disconnected> {
    let mut line = heapless::String::<REPLY_MAX_LEN>::new();
    if reply.write_to(&mut line).is_err() {
        warn!("Reply too long: {:?}", reply);
        return Ok(());
    }
    class.write_packet(line.as_bytes()).await?;
    Ok(())
}
