//! ROM ingestion for the trace driver.
//!
//! Accepts the iNES container the reference logs were produced from: a
//! 16-byte header (magic `NES\x1A`), an optional 512-byte trainer, then PRG
//! ROM. Only the first 16 KiB of PRG is used; the driver maps it at
//! `0xC000..0x10000` and mirrors it at `0x8000..0xBFFF`.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use rec_core::logging::{log, LogCategory, LogLevel};

pub const PRG_BANK: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct Cartridge {
    pub prg_rom: Vec<u8>,
    pub mapper: u8,
}

impl Cartridge {
    /// Parse an iNES image from bytes.
    pub fn from_bytes(data: &[u8]) -> std::io::Result<Self> {
        if data.len() < 16 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Data too small for iNES header",
            ));
        }
        let header = &data[0..16];
        if &header[0..4] != b"NES\x1A" {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Not an iNES file",
            ));
        }

        let prg_size = header[4] as usize * PRG_BANK;
        let mapper = (header[6] >> 4) | (header[7] & 0xF0);
        if prg_size < PRG_BANK {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "PRG ROM smaller than one 16 KiB bank",
            ));
        }

        // Skip the trainer if present (flags 6, bit 2).
        let mut offset = 16;
        if header[6] & 0x04 != 0 {
            offset += 512;
        }
        if data.len() < offset + PRG_BANK {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Data too small for PRG ROM",
            ));
        }

        let prg_rom = data[offset..offset + PRG_BANK].to_vec();
        log(LogCategory::Bus, LogLevel::Info, || {
            format!(
                "Loaded cartridge: mapper {}, {} KiB PRG (first bank used)",
                mapper,
                prg_size / 1024
            )
        });
        Ok(Self { prg_rom, mapper })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut data = Vec::new();
        File::open(path)?.read_to_end(&mut data)?;
        Self::from_bytes(&data)
    }
}
