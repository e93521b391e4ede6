//! Flash layouts of the supported targets

use md5::{Digest, Md5};

use crate::config::EcuKind;
use crate::error::EcuError;

/// Size, loader target byte and partition table of one flash device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareLayout {
    pub name: &'static str,
    pub size: usize,
    /// Target selector in loader read/write requests
    pub target: u8,
    /// Partition start offsets followed by the image end; empty when the
    /// device has no partition table
    pub boundaries: &'static [usize],
}

/// Trionic 8 main flash: 1 MiB in 9 partitions
pub const TRIONIC8: FirmwareLayout = FirmwareLayout {
    name: "T8",
    size: 0x100000,
    target: 0x00,
    boundaries: &[
        0x000000, 0x004000, 0x006000, 0x008000, 0x010000, 0x020000, 0x040000, 0x060000, 0x080000,
        0x100000,
    ],
};

/// Trionic 8 MCP co-processor flash
pub const TRIONIC8_MCP: FirmwareLayout = FirmwareLayout {
    name: "MCP",
    size: 0x40100,
    target: 0x01,
    boundaries: &[],
};

impl FirmwareLayout {
    pub fn for_kind(kind: EcuKind) -> Option<&'static FirmwareLayout> {
        match kind {
            EcuKind::Trionic8 | EcuKind::Trionic8Z22se => Some(&TRIONIC8),
            EcuKind::Trionic8Mcp => Some(&TRIONIC8_MCP),
            EcuKind::Trionic7 => None,
        }
    }

    pub fn partition_count(&self) -> usize {
        self.boundaries.len().saturating_sub(1)
    }

    /// Fail with a size error unless `image` is exactly one device long
    pub fn check_size(&self, image: &[u8]) -> Result<(), EcuError> {
        if image.len() != self.size {
            return Err(EcuError::Size {
                expected: self.size,
                actual: image.len(),
            });
        }
        Ok(())
    }

    /// Bytes of 1-based partition `number`
    pub fn partition<'a>(&self, image: &'a [u8], number: usize) -> Option<&'a [u8]> {
        if number == 0 || number > self.partition_count() {
            return None;
        }
        image.get(self.boundaries[number - 1]..self.boundaries[number])
    }
}

pub fn md5(data: &[u8]) -> [u8; 16] {
    Md5::digest(data).into()
}

/// Upper case hex, the way digests are shown to the operator
pub fn md5_hex(digest: &[u8]) -> String {
    hex::encode_upper(digest)
}
