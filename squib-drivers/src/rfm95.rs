//! RFM95/96/97/98 LoRa driver.
//!
//! # Wiring
//!
//! | RFM95 Pin | Function                     |
//! |-----------|------------------------------|
//! | NSS       | SPI chip select (active low) |
//! | SCK       | SPI clock                    |
//! | MOSI      | SPI data in                  |
//! | MISO      | SPI data out                 |
//! | RESET     | Active-low hardware reset    |
//! | DIO0      | TX-done / RX-done interrupt  |
//!
//! DIO0 must reach a GPIO with edge detection. Transmit gives up after
//! [`TX_DONE_TIMEOUT`] if no edge arrives; receive waits forever.
//!
//! Payloads are raw bytes. The radio's own payload CRC is switched on and
//! packets failing it are discarded here, before the frame layer sees them.

use embassy_time::{Duration, Timer, with_timeout};
use embedded_hal_async::digital::Wait;
use embedded_hal_async::spi::SpiDevice;

#[allow(dead_code)]
mod regs {
    pub const FIFO: u8 = 0x00;
    pub const OP_MODE: u8 = 0x01;
    pub const FR_MSB: u8 = 0x06;
    pub const FR_MID: u8 = 0x07;
    pub const FR_LSB: u8 = 0x08;
    pub const PA_CONFIG: u8 = 0x09;
    pub const PA_DAC: u8 = 0x4D;
    pub const LNA: u8 = 0x0C;
    pub const FIFO_ADDR_PTR: u8 = 0x0D;
    pub const FIFO_TX_BASE_ADDR: u8 = 0x0E;
    pub const FIFO_RX_BASE_ADDR: u8 = 0x0F;
    pub const FIFO_RX_CURRENT_ADDR: u8 = 0x10;
    pub const IRQ_FLAGS: u8 = 0x12;
    pub const RX_NB_BYTES: u8 = 0x13;
    pub const PKT_SNR_VALUE: u8 = 0x19;
    pub const PKT_RSSI_VALUE: u8 = 0x1A;
    pub const MODEM_CONFIG1: u8 = 0x1D;
    pub const MODEM_CONFIG2: u8 = 0x1E;
    pub const PREAMBLE_MSB: u8 = 0x20;
    pub const PREAMBLE_LSB: u8 = 0x21;
    pub const PAYLOAD_LENGTH: u8 = 0x22;
    pub const MAX_PAYLOAD_LENGTH: u8 = 0x23;
    pub const MODEM_CONFIG3: u8 = 0x26;
    pub const SYNC_WORD: u8 = 0x39;
    pub const DIO_MAPPING1: u8 = 0x40;
    pub const VERSION: u8 = 0x42;
}

const IRQ_RX_DONE: u8 = 0x40;
const IRQ_TX_DONE: u8 = 0x08;
const IRQ_PAYLOAD_CRC_ERROR: u8 = 0x20;

const MODE_SLEEP: u8 = 0x00;
const MODE_STDBY: u8 = 0x01;
const MODE_TX: u8 = 0x03;
const MODE_RX_CONTINUOUS: u8 = 0x05;
const MODE_LONG_RANGE: u8 = 0x80;

const DIO0_RX_DONE: u8 = 0x00;
const DIO0_TX_DONE: u8 = 0x40;

// RFM95 only has the PA_BOOST output wired.
const PA_BOOST: u8 = 0x80;

// Private network. Keeps LoRaWAN traffic on the same channel out of our FIFO.
const LORA_SYNC_WORD: u8 = 0x12;

const RFM95_VERSION: u8 = 0x12;

const FXOSC: u64 = 32_000_000;

/// Hardware FIFO limit for one packet.
pub const MAX_PACKET_LEN: usize = 255;

/// Longest a single frame can take on air at the slowest configuration we
/// ship plus margin.
pub const TX_DONE_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpreadingFactor {
    SF6 = 6,
    SF7 = 7,
    SF8 = 8,
    SF9 = 9,
    SF10 = 10,
    SF11 = 11,
    SF12 = 12,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bandwidth {
    BW7_8 = 0,
    BW10_4 = 1,
    BW15_6 = 2,
    BW20_8 = 3,
    BW31_25 = 4,
    BW41_7 = 5,
    BW62_5 = 6,
    BW125 = 7,
    BW250 = 8,
    BW500 = 9,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodingRate {
    CR4_5 = 1,
    CR4_6 = 2,
    CR4_7 = 3,
    CR4_8 = 4,
}

#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoRaConfig {
    /// Centre frequency in Hz.
    pub frequency_hz: u32,
    pub spreading_factor: SpreadingFactor,
    pub bandwidth: Bandwidth,
    pub coding_rate: CodingRate,
    /// 2 to 20 dBm on the PA_BOOST path. Above 17 dBm needs the PA_DAC boost.
    pub tx_power_dbm: i8,
    pub preamble_len: u16,
}

impl Default for LoRaConfig {
    /// A 72 byte frame at SF7/BW500 is on air for roughly 30ms, which leaves
    /// headroom inside the transmit period.
    fn default() -> Self {
        Self {
            frequency_hz: 915_000_000,
            spreading_factor: SpreadingFactor::SF7,
            bandwidth: Bandwidth::BW500,
            coding_rate: CodingRate::CR4_5,
            tx_power_dbm: 17,
            preamble_len: 8,
        }
    }
}

/// Link quality of the last received packet.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SignalQuality {
    pub rssi_dbm: i16,
    /// Tenths of a dB. Negative values are normal for LoRa.
    pub snr_db_tenths: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioError {
    Spi,
    /// Wrong chip or bad wiring.
    InvalidVersion(u8),
    /// The radio's payload CRC failed.
    CrcError,
    PacketTooLarge,
    EmptyPacket,
    /// DIO0 never signalled TX done.
    TxTimeout,
    Dio0,
}

pub struct Rfm95<SPI, RST, DIO0> {
    spi: SPI,
    reset: RST,
    dio0: DIO0,
    config: LoRaConfig,
}

impl<SPI, RST, DIO0> Rfm95<SPI, RST, DIO0>
where
    SPI: SpiDevice,
    RST: embedded_hal::digital::OutputPin,
    DIO0: Wait,
{
    /// Resets the chip, checks its version, applies `config` and leaves it in
    /// standby.
    pub async fn new(
        spi: SPI,
        reset: RST,
        dio0: DIO0,
        config: LoRaConfig,
    ) -> Result<Self, RadioError> {
        let mut radio = Self {
            spi,
            reset,
            dio0,
            config,
        };

        radio.reset.set_low().ok();
        Timer::after(Duration::from_millis(10)).await;
        radio.reset.set_high().ok();
        Timer::after(Duration::from_millis(10)).await;

        let version = radio.read_reg(regs::VERSION).await?;
        if version != RFM95_VERSION {
            return Err(RadioError::InvalidVersion(version));
        }

        // LoRa mode can only be selected from sleep.
        radio.write_reg(regs::OP_MODE, MODE_SLEEP).await?;
        Timer::after(Duration::from_millis(10)).await;
        radio
            .write_reg(regs::OP_MODE, MODE_SLEEP | MODE_LONG_RANGE)
            .await?;
        Timer::after(Duration::from_millis(10)).await;

        radio.write_reg(regs::FIFO_TX_BASE_ADDR, 0x00).await?;
        radio.write_reg(regs::FIFO_RX_BASE_ADDR, 0x00).await?;
        // Max LNA gain, boost on.
        radio.write_reg(regs::LNA, 0x23).await?;

        radio.apply_config().await?;
        radio.standby().await?;

        Ok(radio)
    }

    pub fn config(&self) -> &LoRaConfig {
        &self.config
    }

    /// Sends one packet and waits for the radio to report it gone.
    pub async fn transmit(&mut self, payload: &[u8]) -> Result<(), RadioError> {
        if payload.is_empty() {
            return Err(RadioError::EmptyPacket);
        }
        if payload.len() > MAX_PACKET_LEN {
            return Err(RadioError::PacketTooLarge);
        }

        self.standby().await?;
        self.write_reg(regs::FIFO_ADDR_PTR, 0x00).await?;
        self.write_reg(regs::PAYLOAD_LENGTH, payload.len() as u8)
            .await?;
        self.write_fifo(payload).await?;

        self.write_reg(regs::DIO_MAPPING1, DIO0_TX_DONE).await?;
        self.write_reg(regs::IRQ_FLAGS, 0xFF).await?;
        self.write_reg(regs::OP_MODE, MODE_LONG_RANGE | MODE_TX)
            .await?;

        let done = with_timeout(TX_DONE_TIMEOUT, self.dio0.wait_for_rising_edge()).await;
        // On failure drop out of TX so the next attempt starts clean.
        match done {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                self.standby().await?;
                return Err(RadioError::Dio0);
            }
            Err(_) => {
                self.standby().await?;
                return Err(RadioError::TxTimeout);
            }
        }

        self.write_reg(regs::IRQ_FLAGS, IRQ_TX_DONE).await?;
        Ok(())
    }

    /// Waits in continuous receive for one packet and copies it into `buf`.
    /// Returns the packet length.
    pub async fn receive(
        &mut self,
        buf: &mut [u8; MAX_PACKET_LEN],
    ) -> Result<(usize, SignalQuality), RadioError> {
        self.write_reg(regs::DIO_MAPPING1, DIO0_RX_DONE).await?;
        self.write_reg(regs::IRQ_FLAGS, 0xFF).await?;
        self.write_reg(regs::FIFO_ADDR_PTR, 0x00).await?;
        self.write_reg(regs::OP_MODE, MODE_LONG_RANGE | MODE_RX_CONTINUOUS)
            .await?;

        self.dio0
            .wait_for_rising_edge()
            .await
            .map_err(|_| RadioError::Dio0)?;

        let irq = self.read_reg(regs::IRQ_FLAGS).await?;
        self.write_reg(regs::IRQ_FLAGS, 0xFF).await?;
        if irq & IRQ_PAYLOAD_CRC_ERROR != 0 || irq & IRQ_RX_DONE == 0 {
            return Err(RadioError::CrcError);
        }

        let quality = self.read_signal_quality().await?;
        let len = self.read_reg(regs::RX_NB_BYTES).await? as usize;
        if len == 0 {
            return Err(RadioError::EmptyPacket);
        }
        let fifo_addr = self.read_reg(regs::FIFO_RX_CURRENT_ADDR).await?;
        self.write_reg(regs::FIFO_ADDR_PTR, fifo_addr).await?;
        self.read_fifo(&mut buf[..len]).await?;

        Ok((len, quality))
    }

    pub async fn read_signal_quality(&mut self) -> Result<SignalQuality, RadioError> {
        let raw_rssi = self.read_reg(regs::PKT_RSSI_VALUE).await?;
        let raw_snr = self.read_reg(regs::PKT_SNR_VALUE).await? as i8;

        // HF port: RSSI = -157 + raw. SNR is in quarter dB.
        Ok(SignalQuality {
            rssi_dbm: -157i16 + raw_rssi as i16,
            snr_db_tenths: (raw_snr as i16 * 10) / 4,
        })
    }

    async fn standby(&mut self) -> Result<(), RadioError> {
        self.write_reg(regs::OP_MODE, MODE_LONG_RANGE | MODE_STDBY)
            .await
    }

    async fn apply_config(&mut self) -> Result<(), RadioError> {
        // frf = f * 2^19 / FXOSC
        let frf = ((self.config.frequency_hz as u64) << 19) / FXOSC;
        self.write_reg(regs::FR_MSB, (frf >> 16) as u8).await?;
        self.write_reg(regs::FR_MID, (frf >> 8) as u8).await?;
        self.write_reg(regs::FR_LSB, frf as u8).await?;

        // Explicit header.
        let bw = self.config.bandwidth as u8;
        let cr = self.config.coding_rate as u8;
        self.write_reg(regs::MODEM_CONFIG1, (bw << 4) | (cr << 1))
            .await?;

        // Payload CRC on.
        let sf = self.config.spreading_factor as u8;
        self.write_reg(regs::MODEM_CONFIG2, (sf << 4) | 0x04)
            .await?;

        // AGC on, low data rate optimisation for SF11 and SF12.
        let ldro = if sf >= 11 { 0x08 } else { 0x00 };
        self.write_reg(regs::MODEM_CONFIG3, ldro | 0x04).await?;

        let [preamble_msb, preamble_lsb] = self.config.preamble_len.to_be_bytes();
        self.write_reg(regs::PREAMBLE_MSB, preamble_msb).await?;
        self.write_reg(regs::PREAMBLE_LSB, preamble_lsb).await?;

        // Pout = 2 + OutputPower on PA_BOOST.
        let (pa_config, pa_dac) = match self.config.tx_power_dbm {
            p if p >= 20 => (PA_BOOST | 0x0F, 0x87u8),
            p if p >= 2 => (PA_BOOST | ((p - 2) as u8 & 0x0F), 0x84u8),
            _ => (PA_BOOST, 0x84u8),
        };
        self.write_reg(regs::PA_CONFIG, pa_config).await?;
        self.write_reg(regs::PA_DAC, pa_dac).await?;

        self.write_reg(regs::SYNC_WORD, LORA_SYNC_WORD).await?;
        self.write_reg(regs::MAX_PAYLOAD_LENGTH, MAX_PACKET_LEN as u8)
            .await?;

        Ok(())
    }

    async fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), RadioError> {
        let buf = [reg | 0x80, value];
        self.spi.write(&buf).await.map_err(|_| RadioError::Spi)
    }

    async fn read_reg(&mut self, reg: u8) -> Result<u8, RadioError> {
        let mut buf = [reg & 0x7F, 0x00];
        self.spi
            .transfer_in_place(&mut buf)
            .await
            .map_err(|_| RadioError::Spi)?;
        Ok(buf[1])
    }

    async fn write_fifo(&mut self, data: &[u8]) -> Result<(), RadioError> {
        let mut buf = [0u8; MAX_PACKET_LEN + 1];
        buf[0] = regs::FIFO | 0x80;
        buf[1..=data.len()].copy_from_slice(data);
        self.spi
            .write(&buf[..=data.len()])
            .await
            .map_err(|_| RadioError::Spi)
    }

    async fn read_fifo(&mut self, data: &mut [u8]) -> Result<(), RadioError> {
        let mut buf = [0u8; MAX_PACKET_LEN + 1];
        buf[0] = regs::FIFO & 0x7F;
        let len = data.len();
        self.spi
            .transfer_in_place(&mut buf[..=len])
            .await
            .map_err(|_| RadioError::Spi)?;
        data.copy_from_slice(&buf[1..=len]);
        Ok(())
    }
}
