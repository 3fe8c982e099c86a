//! Node id persistence on the SD card.
//!
//! The id lives in `NODEID.TXT` in the root of the first FAT volume as a
//! decimal number and a newline. Every store truncates and rewrites it.

use embassy_rp::gpio::{Level, Output};
use embassy_rp::peripherals::SPI0;
use embassy_rp::spi::{self, Blocking, Spi};
use embassy_time::Delay;
use embedded_hal_bus::spi::{ExclusiveDevice, NoDelay};
use embedded_sdmmc::{Mode, RawDirectory, SdCard, TimeSource, Timestamp, VolumeIdx, VolumeManager};
use squib_core::node_id::{RECORD_MAX_LEN, format_record, parse_record};
use squib_core::{NodeId, NodeIdStore, RecordError};

use crate::StorageResources;

const NODE_ID_FILE: &str = "NODEID.TXT";

// Slow enough for every card we have tried during discovery; the store is
// touched a handful of times per boot so there is no point switching up.
const SD_BAUD_RATE: u32 = 400_000;

type SdSpi = ExclusiveDevice<Spi<'static, SPI0, Blocking>, Output<'static>, NoDelay>;
type Card = SdCard<SdSpi, Delay>;
type CardError = embedded_sdmmc::Error<embedded_sdmmc::SdCardError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum StoreError {
    /// Card missing, unreadable, or no usable FAT volume.
    Card,
    Record(RecordError),
}

impl From<RecordError> for StoreError {
    fn from(e: RecordError) -> Self {
        StoreError::Record(e)
    }
}

/// The board has no RTC; files get a fixed date.
#[derive(Default)]
pub struct FixedTime;

impl TimeSource for FixedTime {
    fn get_timestamp(&self) -> Timestamp {
        Timestamp {
            year_since_1970: 56,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}

pub struct SdNodeIdStore {
    mgr: VolumeManager<Card, FixedTime>,
}

impl SdNodeIdStore {
    pub fn new(r: StorageResources) -> Self {
        let mut config = spi::Config::default();
        config.frequency = SD_BAUD_RATE;
        let spi = Spi::new_blocking(r.spi, r.clk, r.mosi, r.miso, config);
        let cs = Output::new(r.cs, Level::High);
        let Ok(dev) = ExclusiveDevice::new_no_delay(spi, cs);
        Self {
            mgr: VolumeManager::new(SdCard::new(dev, Delay), FixedTime),
        }
    }

    /// Opens the volume and its root, runs `f`, then closes both whatever
    /// `f` returned.
    fn with_root<R>(
        &mut self,
        f: impl FnOnce(&mut VolumeManager<Card, FixedTime>, RawDirectory) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let volume = self
            .mgr
            .open_raw_volume(VolumeIdx(0))
            .map_err(|e| card_error("open volume", e))?;
        let result = match self.mgr.open_root_dir(volume) {
            Ok(root) => {
                let result = f(&mut self.mgr, root);
                self.mgr.close_dir(root).ok();
                result
            }
            Err(e) => Err(card_error("open root", e)),
        };
        self.mgr.close_volume(volume).ok();
        result
    }
}

// The card error only has a `Debug` impl, so each backend gets its own form.
fn card_error(what: &str, e: CardError) -> StoreError {
    defmt::error!("SD card: {} failed: {:?}", what, defmt::Debug2Format(&e));
    log::error!("SD card: {} failed: {:?}", what, e);
    StoreError::Card
}

impl NodeIdStore for SdNodeIdStore {
    type Error = StoreError;

    fn load(&mut self) -> Result<NodeId, StoreError> {
        self.with_root(|mgr, root| {
            let file = mgr
                .open_file_in_dir(root, NODE_ID_FILE, Mode::ReadOnly)
                .map_err(|e| card_error("open node id", e))?;
            let mut buf = [0u8; RECORD_MAX_LEN];
            let read = mgr.read(file, &mut buf);
            mgr.close_file(file).ok();
            let n = read.map_err(|e| card_error("read node id", e))?;
            Ok(parse_record(&buf[..n])?)
        })
    }

    fn store(&mut self, id: NodeId) -> Result<(), StoreError> {
        let record = format_record(id);
        self.with_root(|mgr, root| {
            let file = mgr
                .open_file_in_dir(root, NODE_ID_FILE, Mode::ReadWriteCreateOrTruncate)
                .map_err(|e| card_error("create node id", e))?;
            let written = mgr.write(file, record.as_bytes());
            // Closing flushes the directory entry, so it has to succeed too.
            let closed = mgr.close_file(file);
            written.map_err(|e| card_error("write node id", e))?;
            closed.map_err(|e| card_error("close node id", e))
        })
    }
}
