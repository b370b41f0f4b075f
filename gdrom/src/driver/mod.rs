// =============================================================================
// GD-ROM Driver — Driver Context and Whole-Buffer Operations
// =============================================================================
//
// This module contains low-level primitives for accessing the optical disc
// drive. It will not access the GD area, by design. Whenever a file is
// accessed and a new disc is inserted, callers read the TOC for the disc
// in the drive and get everything situated; after that raw sectors can be
// read from the data track.
//
// All of the former global driver state (lock, completion signal, command
// handle, stream session) lives in one `Cdrom` context object constructed
// once and shared by reference — including by the interrupt handler. The
// single-flight invariant (at most one outstanding command handle, ever)
// is enforced inside this object.
//
// Split across three files:
//   mod.rs     — the context, initialization, status, sector reads,
//                TOC/subcode/CDDA wrappers
//   channel.rs — the command channel: exec_cmd[_timed] and abort
//   stream.rs  — the streaming engine and the DMA completion handler
// =============================================================================

pub mod channel;
pub mod stream;

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use spin::Mutex as SpinMutex;

use crate::error::{CdError, CdResult};
use crate::hw::{
    mem, CddaMode, Command, CommandHandle, CommandParam, DiscType, DmaEvents, DriveQuery,
    DriveStatus, HwInterface, Platform, SectorModeParams, SectorPart, SubcodeType, TransferMode,
    DMA_BUFFER_ALIGN, PIO_BUFFER_ALIGN,
};
use crate::sync::{CompletionSignal, DriveLock};
use crate::toc::Toc;

/// Deadline for each Init command issued during a reinit.
const INIT_TIMEOUT_MS: u64 = 10_000;

/// Sector size programmed until the first datatype change.
const DEFAULT_SECTOR_SIZE: u32 = 2048;

/// Custom-BIOS signature word; verification needs only the first 1 KiB.
const BIOS_SIG_CUSTOM: u16 = 0xe6ff;

/// Thread-side stream session bookkeeping. Never touched from interrupt
/// context; guarded by a short spin mutex.
struct Session {
    /// Transfer mode of the established streaming session.
    stream_mode: TransferMode,
    /// Sector size currently programmed into the drive.
    sector_size: u32,
}

/// The optical-disc drive driver context.
///
/// Construct exactly one per drive and call [`init`](Self::init) before
/// anything else. All operations take `&self`; the context is the unit
/// shared between caller threads and the DMA interrupt handler.
pub struct Cdrom<H, P> {
    hw: H,
    plat: P,
    /// Serializes every submit-then-poll sequence.
    lock: DriveLock,
    /// DMA completion hand-off between the irq handler and a waiter.
    dma_done: CompletionSignal,
    /// Raw in-flight command handle; 0 when none. Published at
    /// submission time, under the drive lock.
    handle: AtomicU32,
    /// Set while a DMA stream transfer is in flight. The interrupt
    /// handler is the only writer from interrupt context.
    dma_in_progress: AtomicBool,
    /// Whether a thread is suspended waiting for that transfer.
    dma_blocking: AtomicBool,
    /// Id of the suspended thread, 0 when none.
    dma_waiter: AtomicUsize,
    session: SpinMutex<Session>,
}

impl<H: HwInterface, P: Platform> Cdrom<H, P> {
    /// Create a driver context. Touches no hardware; call
    /// [`init`](Self::init) to bring the drive up.
    pub fn new(hw: H, plat: P) -> Self {
        Self {
            hw,
            plat,
            lock: DriveLock::new(),
            dma_done: CompletionSignal::new(),
            handle: AtomicU32::new(0),
            dma_in_progress: AtomicBool::new(false),
            dma_blocking: AtomicBool::new(false),
            dma_waiter: AtomicUsize::new(0),
            session: SpinMutex::new(Session {
                stream_mode: TransferMode::Pio,
                sector_size: DEFAULT_SECTOR_SIZE,
            }),
        }
    }

    /// The in-flight command handle, if any.
    pub(crate) fn current_handle(&self) -> Option<CommandHandle> {
        CommandHandle::new(self.handle.load(Ordering::Acquire))
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Bring the drive up: boot-ROM handshake, command-interface reset,
    /// DMA-region unlock, interrupt hookup and a full reinit.
    ///
    /// The platform must route the hooked [`DmaEvents`] to
    /// [`dma_irq`](Self::dma_irq) on this context.
    pub fn init(&self) -> CdResult<()> {
        self.lock.lock(&self.plat);

        // Reactivate the drive: present the firmware size, then read
        // every word across the bus so the controller can verify it.
        // A custom firmware announces itself with 0xe6ff in the first
        // word and passes verification with only the first 1 KiB.
        let fw_base = mem::AREA_P2_BASE;
        let react = mem::REACTIVATE_REG | mem::AREA_P2_BASE;

        if self.plat.read_mem16(fw_base) == BIOS_SIG_CUSTOM {
            self.plat.write_mem32(react, 0x3ff);
            for off in (0..0x400).step_by(4) {
                let _ = self.plat.read_mem32(fw_base + off);
            }
        } else {
            self.plat.write_mem32(react, 0x1f_ffff);
            for off in (0..0x20_0000).step_by(4) {
                let _ = self.plat.read_mem32(fw_base + off);
            }
        }

        self.hw.reset();
        self.hw.init();

        self.unlock_dma_memory();
        self.lock.unlock();

        // Hook all the DMA-related events.
        self.plat.hook_dma_events(DmaEvents::ALL_HOOKED);

        self.reinit()
    }

    /// Detach the driver from the DMA interrupt events.
    pub fn shutdown(&self) {
        self.plat.unhook_dma_events(DmaEvents::ALL_HOOKED);
    }

    /// Widen the DMA protection from system-memory-only to all of
    /// memory: patch every system-memory unlock marker found in the
    /// protection-check region, flush the icache over the patched
    /// range, then program the protection register itself.
    fn unlock_dma_memory(&self) {
        let prot_reg = mem::DMA_PROTECTION_REG | mem::AREA_P2_BASE;
        let start = mem::SYSMEM_BASE | mem::AREA_P2_BASE;
        let end = start + mem::PROTECTION_SCAN_LEN;

        let mut patched = 0usize;
        let mut addr = start;
        while addr <= end {
            if self.plat.read_mem32(addr) == mem::DMA_UNLOCK_SYSMEM {
                self.plat.write_mem32(addr, mem::DMA_UNLOCK_ALLMEM);
                patched += 1;
            }
            addr += 4;
        }
        if patched != 0 {
            self.plat
                .icache_flush(mem::SYSMEM_BASE | mem::AREA_P1_BASE, mem::PROTECTION_SCAN_LEN);
        }
        self.plat.write_mem32(prot_reg, mem::DMA_UNLOCK_ALLMEM);

        log::debug!("unlock_dma_memory: patched {} protection marker(s)", patched);
    }

    // =========================================================================
    // Drive state
    // =========================================================================

    /// Drive activity and disc type.
    ///
    /// Callable from interrupt context, where it takes the drive lock
    /// non-blockingly and returns [`CdError::Busy`] if another thread
    /// holds it. Thread context blocks on the lock as usual.
    pub fn get_status(&self) -> CdResult<(DriveStatus, DiscType)> {
        let in_irq = self.plat.in_irq();
        if in_irq {
            if !self.lock.try_lock(&self.plat) {
                return Err(CdError::Busy);
            }
        } else {
            self.lock.lock(&self.plat);
        }

        let rv = loop {
            match self.hw.query_drive() {
                DriveQuery::Busy => {
                    if !in_irq {
                        self.plat.yield_now();
                    }
                }
                DriveQuery::Ready { status, disc_type } => {
                    break Ok((DriveStatus::from_raw(status), DiscType::from_raw(disc_type)));
                }
                DriveQuery::Failed => break Err(CdError::Sys),
            }
        };

        self.lock.unlock();
        rv
    }

    // =========================================================================
    // Sector mode
    // =========================================================================

    /// Program which part of each sector reads return, the CD-XA coding
    /// and the sector size. `None` picks the drive-appropriate default
    /// for each field.
    pub fn change_datatype(
        &self,
        part: Option<SectorPart>,
        cdxa: Option<u32>,
        size: Option<u32>,
    ) -> CdResult<()> {
        self.lock.lock(&self.plat);

        let (part, cdxa, size) = if size == Some(2352) {
            // Raw reads: whole sector, no CD-XA coding.
            (part.unwrap_or(SectorPart::WholeSector), cdxa.unwrap_or(0), 2352)
        } else {
            let cdxa = match cdxa {
                Some(v) => v,
                // Not overriding: ask the drive what it thinks the
                // inserted disc should use.
                None => match self.hw.query_drive() {
                    DriveQuery::Ready { disc_type, .. }
                        if disc_type == DiscType::CdRomXa.raw() =>
                    {
                        2048
                    }
                    _ => 1024,
                },
            };
            (
                part.unwrap_or(SectorPart::DataArea),
                cdxa,
                size.unwrap_or(DEFAULT_SECTOR_SIZE),
            )
        };

        self.session.lock().sector_size = size;
        let rv = self
            .hw
            .set_sector_mode(&SectorModeParams { part: part as u32, cdxa, size })
            .map_err(|_| CdError::Sys);

        self.lock.unlock();
        rv
    }

    /// Shortcut for [`reinit_ex`](Self::reinit_ex) when only the sector
    /// size changes.
    pub fn set_sector_size(&self, size: u32) -> CdResult<()> {
        self.reinit_ex(None, None, Some(size))
    }

    /// Re-init the drive with default parameters, e.g. after a disc
    /// change.
    pub fn reinit(&self) -> CdResult<()> {
        self.reinit_ex(None, None, None)
    }

    /// Re-init the drive: issue Init until the disc-changed condition
    /// clears, then program the sector mode.
    pub fn reinit_ex(
        &self,
        part: Option<SectorPart>,
        cdxa: Option<u32>,
        size: Option<u32>,
    ) -> CdResult<()> {
        loop {
            match self.exec_cmd_timed(Command::Init, &CommandParam::None, INIT_TIMEOUT_MS) {
                Err(CdError::DiscChanged) => continue,
                Err(e @ (CdError::NoDisc | CdError::Sys | CdError::Timeout)) => return Err(e),
                _ => break,
            }
        }

        self.change_datatype(part, cdxa, size)
    }

    // =========================================================================
    // Whole-buffer reads
    // =========================================================================

    /// Read `count` sectors starting at `sector` into `buf`, choosing
    /// the transfer mode.
    ///
    /// DMA blocks the calling thread but lets others run; the buffer
    /// must be 32-byte aligned and is handed to the hardware through the
    /// cacheable alias (with the covering data-cache lines invalidated
    /// first, since the transfer bypasses the cache). PIO requires
    /// 2-byte alignment. Violations fail with [`CdError::Sys`] before
    /// any hardware is touched.
    pub fn read_sectors_ex(
        &self,
        buf: &mut [u8],
        sector: u32,
        count: u32,
        mode: TransferMode,
    ) -> CdResult<()> {
        let sector_size = self.session.lock().sector_size as usize;
        let needed = match (count as usize).checked_mul(sector_size) {
            Some(n) => n,
            None => {
                log::error!("read_sectors_ex: {} sectors overflows the transfer size", count);
                return Err(CdError::Sys);
            }
        };
        if buf.len() < needed {
            log::error!(
                "read_sectors_ex: buffer of {} bytes cannot hold {} sector(s)",
                buf.len(),
                count
            );
            return Err(CdError::Sys);
        }

        let addr = buf.as_mut_ptr() as usize;
        let (cmd, hw_addr) = match mode {
            TransferMode::Dma => (Command::DmaRead, self.dma_prepare(addr, needed)?),
            TransferMode::Pio => (Command::PioRead, self.pio_prepare(addr)?),
        };

        self.exec_cmd(cmd, &CommandParam::Read { sector, count, buffer: hw_addr })
    }

    /// Basic sector read (PIO).
    pub fn read_sectors(&self, buf: &mut [u8], sector: u32, count: u32) -> CdResult<()> {
        self.read_sectors_ex(buf, sector, count, TransferMode::Pio)
    }

    /// Validate a DMA destination and return the address the hardware
    /// sees. Rejects before dispatch; invalidates covering cache lines
    /// when the buffer lives in the cached alias.
    pub(crate) fn dma_prepare(&self, addr: usize, len: usize) -> CdResult<usize> {
        if addr % DMA_BUFFER_ALIGN != 0 {
            log::error!("dma_prepare: unaligned memory for DMA (32-byte)");
            return Err(CdError::Sys);
        }
        let hw_addr = addr & mem::AREA_CACHE_MASK;
        if (addr >> 24) == (mem::SYSMEM_BASE >> 24) {
            self.plat.dcache_inval(hw_addr, len);
        }
        Ok(hw_addr)
    }

    /// Validate a PIO destination.
    pub(crate) fn pio_prepare(&self, addr: usize) -> CdResult<usize> {
        if addr % PIO_BUFFER_ALIGN != 0 {
            log::error!("pio_prepare: unaligned memory for PIO (2-byte)");
            return Err(CdError::Sys);
        }
        Ok(addr)
    }

    // =========================================================================
    // TOC, subcode, CDDA
    // =========================================================================

    /// Read the table of contents of `session` into `toc`.
    pub fn read_toc(&self, toc: &mut Toc, session: u32) -> CdResult<()> {
        let buffer = toc as *mut Toc as usize;
        self.exec_cmd(Command::GetToc, &CommandParam::Toc { session, buffer })
    }

    /// Read part or all of the subcode of the last sector read.
    pub fn get_subcode(&self, buf: &mut [u8], which: SubcodeType) -> CdResult<()> {
        let param = CommandParam::Subcode {
            which: which as u32,
            len: buf.len() as u32,
            buffer: buf.as_mut_ptr() as usize,
        };
        self.exec_cmd(Command::GetSubcode, &param)
    }

    /// Play CDDA from `start` to `end` (tracks or sectors, per `mode`),
    /// repeating `repeat` times (15 = forever; larger values clamp).
    pub fn cdda_play(&self, start: u32, end: u32, repeat: u32, mode: CddaMode) -> CdResult<()> {
        let param = CommandParam::Play { start, end, repeat: repeat.min(15) };
        let cmd = match mode {
            CddaMode::Tracks => Command::Play,
            CddaMode::Sectors => Command::Play2,
        };
        self.exec_cmd(cmd, &param)
    }

    /// Pause CDDA playback.
    pub fn cdda_pause(&self) -> CdResult<()> {
        self.exec_cmd(Command::Pause, &CommandParam::None)
    }

    /// Resume paused CDDA playback.
    pub fn cdda_resume(&self) -> CdResult<()> {
        self.exec_cmd(Command::Release, &CommandParam::None)
    }

    /// Spin the disc down.
    pub fn spin_down(&self) -> CdResult<()> {
        self.exec_cmd(Command::Stop, &CommandParam::None)
    }
}
