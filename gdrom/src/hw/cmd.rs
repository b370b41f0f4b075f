//! Hardware command vocabulary.
//!
//! Command identifiers, parameter blocks and poll states for the drive's
//! command interface. The wire format of the protocol itself is opaque to
//! this crate; these types are the request/response contract the driver
//! hands to the [`HwInterface`](super::HwInterface) implementation.

use core::num::NonZeroU32;

/// Token tracking one submitted hardware command's progress.
///
/// At most one handle is outstanding system-wide at any instant; it is
/// valid only between submission and a terminal poll state (or abort).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHandle(NonZeroU32);

impl CommandHandle {
    /// Wrap a raw nonzero handle value from the hardware layer.
    pub const fn new(raw: u32) -> Option<Self> {
        match NonZeroU32::new(raw) {
            Some(n) => Some(Self(n)),
            None => None,
        }
    }

    /// The raw handle value (never zero).
    pub const fn raw(self) -> u32 {
        self.0.get()
    }
}

/// Commands understood by the drive's command server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Command {
    /// Read sectors into memory, register-programmed.
    PioRead = 16,
    /// Read sectors into memory via DMA.
    DmaRead = 17,
    /// Read the session table of contents.
    GetToc = 19,
    /// Play CDDA by track range.
    Play = 20,
    /// Play CDDA by sector range.
    Play2 = 21,
    /// Pause CDDA playback.
    Pause = 22,
    /// Resume paused CDDA playback.
    Release = 23,
    /// (Re)initialize the drive after power-up or disc change.
    Init = 24,
    /// Spin the disc down.
    Stop = 33,
    /// Read the subcode of the last sector read.
    GetSubcode = 34,
    /// Start a DMA streaming read; data is pulled by later transfers.
    DmaReadStream = 38,
    /// Start a PIO streaming read.
    PioReadStream = 39,
}

/// Parameter block accompanying a command submission.
///
/// Buffer-carrying variants hold the address the hardware will see, not a
/// borrow: the memory must stay reserved until the command reaches a
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandParam {
    /// No parameters (Init, Pause, Release, Stop).
    None,
    /// Whole-buffer sector read (PioRead / DmaRead).
    Read {
        /// First sector to read.
        sector: u32,
        /// Number of sectors.
        count: u32,
        /// Destination address as the hardware sees it.
        buffer: usize,
    },
    /// Streaming read session (PioReadStream / DmaReadStream); data
    /// buffers are supplied per-request afterwards.
    Stream { sector: u32, count: u32 },
    /// Table-of-contents read into a [`Toc`](crate::toc::Toc).
    Toc { session: u32, buffer: usize },
    /// CDDA playback range. `repeat` is 0-15, 15 meaning forever.
    Play { start: u32, end: u32, repeat: u32 },
    /// Subcode query.
    Subcode { which: u32, len: u32, buffer: usize },
}

/// State of a submitted command, as reported by a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdState {
    /// The handle does not refer to an in-flight command.
    NoActive,
    /// The command server is working on the command.
    Processing,
    /// The command finished successfully.
    Completed,
    /// A streaming command is established and awaiting transfers.
    Streaming,
    /// The command server cannot look at the command yet.
    Busy,
    /// The command finished with an error; see the status payload.
    Failed,
}

impl CmdState {
    /// Whether polling should stop: anything but Busy/Processing.
    #[inline]
    pub fn is_terminal(self) -> bool {
        !matches!(self, CmdState::Busy | CmdState::Processing)
    }
}

/// Raw per-command status payload filled in by a poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CmdStatus {
    /// Primary hardware error code (2 = no disc, 6 = disc changed).
    pub err1: i32,
    /// Secondary hardware error code.
    pub err2: i32,
    /// Bytes transferred so far.
    pub transferred: u32,
    /// Device status word (ATA status waiting).
    pub ata_status: u32,
}

/// Result of one drive status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveQuery {
    /// The drive cannot answer right now; poll again.
    Busy,
    /// Raw status and disc-type words.
    Ready { status: u32, disc_type: u32 },
    /// The query itself failed.
    Failed,
}

/// Progress of an asynchronous PIO/DMA stream transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferCheck {
    /// A transfer is still moving data; `bytes` transferred so far.
    InFlight { bytes: u32 },
    /// No transfer is in flight; `bytes` moved by the last one.
    Idle { bytes: u32 },
}

/// How sector data is moved off the drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Register-programmed transfer; synchronous, blocks the bus.
    Pio,
    /// Hardware-offloaded transfer; completion raises an interrupt.
    Dma,
}

/// Drive activity as decoded from the status query word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveStatus {
    Busy,
    Paused,
    Standby,
    Playing,
    Seeking,
    Scanning,
    Open,
    NoDisc,
    Retry,
    Error,
    /// A status word this driver does not know about.
    Unknown(u32),
}

impl DriveStatus {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => DriveStatus::Busy,
            1 => DriveStatus::Paused,
            2 => DriveStatus::Standby,
            3 => DriveStatus::Playing,
            4 => DriveStatus::Seeking,
            5 => DriveStatus::Scanning,
            6 => DriveStatus::Open,
            7 => DriveStatus::NoDisc,
            8 => DriveStatus::Retry,
            9 => DriveStatus::Error,
            other => DriveStatus::Unknown(other),
        }
    }
}

/// Media type as decoded from the status query word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscType {
    CdDa,
    CdRom,
    CdRomXa,
    CdI,
    GdRom,
    Unknown(u32),
}

impl DiscType {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0x00 => DiscType::CdDa,
            0x10 => DiscType::CdRom,
            0x20 => DiscType::CdRomXa,
            0x30 => DiscType::CdI,
            0x80 => DiscType::GdRom,
            other => DiscType::Unknown(other),
        }
    }

    /// The raw status-query encoding of this disc type.
    pub fn raw(self) -> u32 {
        match self {
            DiscType::CdDa => 0x00,
            DiscType::CdRom => 0x10,
            DiscType::CdRomXa => 0x20,
            DiscType::CdI => 0x30,
            DiscType::GdRom => 0x80,
            DiscType::Unknown(other) => other,
        }
    }
}

/// Which part of each sector a read returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SectorPart {
    /// Everything, including headers (raw 2352-byte reads).
    WholeSector = 0x1000,
    /// Only the data area.
    DataArea = 0x2000,
}

/// Subcode query types for [`Command::GetSubcode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SubcodeType {
    QChannel = 0,
    CurrentPosition = 1,
    MediaCatalog = 2,
    Isrc = 3,
}

/// Addressing mode for CDDA playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CddaMode {
    /// `start`/`end` are track numbers.
    Tracks,
    /// `start`/`end` are absolute sectors.
    Sectors,
}

/// Sector-mode parameters handed to the hardware's datatype setter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorModeParams {
    /// Which part of the sector reads return.
    pub part: u32,
    /// CD-XA coding field.
    pub cdxa: u32,
    /// Sector size in bytes.
    pub size: u32,
}
