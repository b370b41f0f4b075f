// =============================================================================
// GD-ROM Driver — Crate Root
// =============================================================================
//
// Driver for the optical-disc drive's shared command interface. One
// hardware command server, many threads, one DMA completion interrupt:
// this crate coordinates them with exactly two synchronization
// primitives — a mutual-exclusion drive lock and a counting completion
// signal — and enforces the alignment and cache-coherency rules DMA
// buffers live by.
//
// The hardware command protocol itself is opaque: submission, polling
// and transfers go through the `hw::HwInterface` trait, and everything
// the driver needs from the surrounding system (threads, clock, caches,
// interrupt hookup) goes through `hw::Platform`. Bare-metal targets
// implement both over their boot-ROM/kernel services; the test suite
// implements them as scriptable stubs.
//
// Typical use:
//
//   let cd = Cdrom::new(hw, platform);
//   cd.init()?;
//   let mut toc = Toc::zeroed();
//   cd.read_toc(&mut toc, 0)?;
//   let lba = toc.locate_data_track();
//   cd.read_sectors_ex(&mut buf, lba, 16, TransferMode::Dma)?;
// =============================================================================

#![cfg_attr(not(test), no_std)]

/// Driver context: command channel, sector reads, streaming engine and
/// the DMA completion handler.
pub mod driver;

/// Error taxonomy shared by every operation.
pub mod error;

/// The hardware command interface and platform service seams.
pub mod hw;

/// The two synchronization primitives the driver runs on.
pub mod sync;

/// Disc table of contents and data-track location.
pub mod toc;

pub use driver::Cdrom;
pub use error::{CdError, CdResult};
pub use hw::{
    CddaMode, CmdState, CmdStatus, Command, CommandHandle, CommandParam, DiscType, DmaEvents,
    DriveQuery, DriveStatus, HwInterface, Platform, SectorModeParams, SectorPart, SubcodeType,
    ThreadId, TransferCheck, TransferMode,
};
pub use toc::Toc;
