//! Table of contents for the disc in the drive.
//!
//! The drive fills this structure in response to a TOC read command; the
//! layout is a bit-exact hardware response and must not be reordered.
//! Each entry packs the track control nibble, address nibble and LBA into
//! one 32-bit word:
//!
//!   bits 31..28  control (4 = data track)
//!   bits 27..24  address
//!   bits 23..0   LBA
//!
//! The `first`/`last` markers pack their track number into bits 23..16.

/// Maximum number of tracks a disc session can carry.
pub const MAX_TRACKS: usize = 99;

/// A disc table of contents, exactly as the drive returns it.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct Toc {
    /// One packed word per track, indexed by track number - 1.
    pub entry: [u32; MAX_TRACKS],
    /// Packed word for the first track of the session.
    pub first: u32,
    /// Packed word for the last track of the session.
    pub last: u32,
    /// Packed word for the session lead-out.
    pub leadout_sector: u32,
}

// The drive writes 408 bytes; anything else means the layout drifted.
const _: () = assert!(core::mem::size_of::<Toc>() == (MAX_TRACKS + 3) * 4);

/// Extract the track number from a packed first/last marker.
#[inline]
pub const fn toc_track(n: u32) -> u32 {
    (n >> 16) & 0xff
}

/// Extract the control nibble from a packed TOC entry.
#[inline]
pub const fn toc_ctrl(n: u32) -> u32 {
    (n >> 28) & 0x0f
}

/// Extract the address nibble from a packed TOC entry.
#[inline]
pub const fn toc_adr(n: u32) -> u32 {
    (n >> 24) & 0x0f
}

/// Extract the LBA from a packed TOC entry.
#[inline]
pub const fn toc_lba(n: u32) -> u32 {
    n & 0x00ff_ffff
}

impl Toc {
    /// An all-zero TOC, useful as a read target.
    pub const fn zeroed() -> Self {
        Self {
            entry: [0; MAX_TRACKS],
            first: 0,
            last: 0,
            leadout_sector: 0,
        }
    }

    /// Locate the LBA of the data track; call after reading the TOC.
    ///
    /// Scans from the last track down to the first for the
    /// highest-numbered entry with a control nibble of 4 (data) and
    /// returns its LBA. Returns 0 if the track range is invalid or no
    /// data track exists.
    pub fn locate_data_track(&self) -> u32 {
        let first = toc_track(self.first);
        let last = toc_track(self.last);

        if first < 1 || last > MAX_TRACKS as u32 || first > last {
            return 0;
        }

        for i in (first..=last).rev() {
            if toc_ctrl(self.entry[i as usize - 1]) == 4 {
                return toc_lba(self.entry[i as usize - 1]);
            }
        }

        0
    }
}

impl Default for Toc {
    fn default() -> Self {
        Self::zeroed()
    }
}
