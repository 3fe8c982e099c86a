use defmt::unwrap;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::peripherals::SPI1;
use embassy_rp::spi::{self, Async, Spi};
use embassy_time::{Duration, Ticker, Timer};
use embedded_hal_bus::spi::{ExclusiveDevice, NoDelay};
use squib_core::config::{DEPLOYMENT_MAGIC, TX_PERIOD_MS};
use squib_core::{PeerAddress, Role, SendStatus, debug, frame, info, trace, warn};
use squib_drivers::rfm95::{LoRaConfig, MAX_PACKET_LEN, RadioError, Rfm95};

use crate::channels::EVENTS;
use crate::datacells::TX_PAYLOAD;
use crate::{Irqs, ROLE, RadioResources};

type Radio = Rfm95<
    ExclusiveDevice<Spi<'static, SPI1, Async>, Output<'static>, NoDelay>,
    Output<'static>,
    Input<'static>,
>;

const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Owns the RFM95. Receivers listen continuously, transmitters send the
/// staged payload every transmit period. Results go to the event queue.
#[embassy_executor::task]
pub async fn radio_task(r: RadioResources) -> ! {
    let mut config = spi::Config::default();
    config.frequency = 1_000_000;
    config.phase = spi::Phase::CaptureOnFirstTransition;
    config.polarity = spi::Polarity::IdleLow;

    let cs = Output::new(r.cs, Level::High);
    // Active low. Released here, the driver pulses it.
    let reset = Output::new(r.reset, Level::High);
    let dio0 = Input::new(r.dio0, Pull::Down);

    // Let the supply settle before the first SPI transaction.
    Timer::after(Duration::from_millis(50)).await;

    let spi = Spi::new(
        r.spi, r.clk, r.mosi, r.miso, r.dma_tx, r.dma_rx, Irqs, config,
    );
    let Ok(spi_dev) = ExclusiveDevice::new_no_delay(spi, cs);

    let mut radio = unwrap!(Rfm95::new(spi_dev, reset, dio0, LoRaConfig::default()).await);
    info!("Radio initialised as {:?}", ROLE);

    match ROLE {
        Role::Transmitter => transmit_loop(&mut radio).await,
        Role::Receiver => receive_loop(&mut radio).await,
    }
}

async fn receive_loop(radio: &mut Radio) -> ! {
    let mut buf = [0u8; MAX_PACKET_LEN];
    loop {
        match radio.receive(&mut buf).await {
            Ok((len, quality)) => {
                trace!(
                    "Packet {} bytes, rssi {} dBm, snr {}",
                    len,
                    quality.rssi_dbm,
                    quality.snr_db_tenths
                );
                // Drops are counted by the queue.
                EVENTS.post_received(PeerAddress::BROADCAST, &buf[..len]).ok();
            }
            Err(RadioError::CrcError) => {
                debug!("Radio payload CRC error");
            }
            Err(e) => {
                warn!("Radio receive failed: {:?}", e);
                Timer::after(RETRY_DELAY).await;
            }
        }
    }
}

async fn transmit_loop(radio: &mut Radio) -> ! {
    let mut ticker = Ticker::every(Duration::from_millis(TX_PERIOD_MS));
    loop {
        ticker.next().await;
        let bytes = frame::encode(&TX_PAYLOAD.read(), DEPLOYMENT_MAGIC);
        let status = match radio.transmit(&bytes).await {
            Ok(()) => SendStatus::Success,
            Err(e) => {
                warn!("Radio transmit failed: {:?}", e);
                SendStatus::Failed
            }
        };
        EVENTS.post_sent(PeerAddress::BROADCAST, status).ok();
    }
}
