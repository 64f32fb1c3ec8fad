//! `imu_core::framer::StorageSink` over a FAT-formatted SD card via
//! `embedded-sdmmc`, opening/closing `LOG_FILE_NAME` on the card's root
//! directory.

use embedded_sdmmc::{BlockDevice, File, Mode, TimeSource, Volume, VolumeIdx, VolumeManager};

use imu_core::config::LOG_FILE_NAME;
use imu_core::framer::StorageSink;

/// A `TimeSource` that always reports the card's epoch; this board has
/// no real-time clock, so every file gets the same fixed timestamp.
pub struct NoRtc;

impl TimeSource for NoRtc {
    fn get_timestamp(&self) -> embedded_sdmmc::Timestamp {
        embedded_sdmmc::Timestamp {
            year_since_1970: 0,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}

pub struct SdStorage<D: BlockDevice> {
    manager: VolumeManager<D, NoRtc>,
    volume: Option<Volume>,
    open: Option<File>,
}

impl<D: BlockDevice> SdStorage<D> {
    pub fn new(device: D) -> Self {
        SdStorage {
            manager: VolumeManager::new(device, NoRtc),
            volume: None,
            open: None,
        }
    }

    fn volume(&mut self) -> Result<&mut Volume, embedded_sdmmc::Error<D::Error>> {
        if self.volume.is_none() {
            self.volume = Some(self.manager.open_volume(VolumeIdx(0))?);
        }
        Ok(self.volume.as_mut().expect("just populated"))
    }
}

impl<D: BlockDevice> StorageSink for SdStorage<D> {
    type Error = embedded_sdmmc::Error<D::Error>;

    fn open_write(&mut self, truncate: bool) -> Result<(), Self::Error> {
        self.close()?;
        let mode = if truncate {
            Mode::ReadWriteCreateOrTruncate
        } else {
            Mode::ReadWriteCreateOrAppend
        };
        let volume = self.volume()?;
        let mut root = self.manager.open_root_dir(volume)?;
        let file = self.manager.open_file_in_dir(&mut root, LOG_FILE_NAME, mode)?;
        self.open = Some(file);
        Ok(())
    }

    fn open_read(&mut self) -> Result<(), Self::Error> {
        self.close()?;
        let volume = self.volume()?;
        let mut root = self.manager.open_root_dir(volume)?;
        let file =
            self.manager
                .open_file_in_dir(&mut root, LOG_FILE_NAME, Mode::ReadOnly)?;
        self.open = Some(file);
        Ok(())
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        if let Some(file) = self.open.take() {
            self.manager.close_file(file)?;
        }
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        let file = self
            .open
            .as_mut()
            .expect("write called with no file open");
        self.manager.write(file, data)?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let file = self.open.as_mut().expect("read called with no file open");
        self.manager.read(file, buf)
    }

    fn is_open(&self) -> bool {
        self.open.is_some()
    }
}
