//! Artifacts written into the minimal ISO tree.
//!
//! - `placeholder` - Zero-filled reserved initrd slot
//! - `ramdisk` - Reproducible single-file cpio ram disk

pub mod placeholder;
pub mod ramdisk;

pub use placeholder::{write_placeholder, PLACEHOLDER_LEN};
pub use ramdisk::{
    build_ram_disk, create_ram_disk, decode_ram_disk, encode_ram_disk, read_ram_disk,
    RamDiskEntry, RamDiskTool,
};
