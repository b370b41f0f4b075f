// =============================================================================
// GD-ROM Driver — Hardware Interface Seam
// =============================================================================
//
// Everything the driver consumes from the outside world sits behind two
// traits:
//
//   HwInterface — the drive's opaque command interface: submit a command,
//                 tick the command server, poll a handle, move stream data.
//   Platform    — services of the surrounding system: thread identity,
//                 cooperative yield, a millisecond clock, interrupt-context
//                 probing, cache maintenance and the raw memory accesses
//                 the init handshake needs.
//
// On target hardware these are thin shims over the boot-ROM syscall
// vectors and the kernel; under test they are scriptable stubs, which is
// what makes the polling state machine deterministic to drive.
// =============================================================================

pub mod cmd;

pub use cmd::{
    CddaMode, CmdState, CmdStatus, Command, CommandHandle, CommandParam, DiscType, DriveQuery,
    DriveStatus, SectorModeParams, SectorPart, SubcodeType, TransferCheck, TransferMode,
};

use bitflags::bitflags;

/// Identity of a kernel thread, as reported by [`Platform::thread_id`].
///
/// Must be nonzero for any real thread; zero is reserved to mean
/// "no thread" in the driver's interrupt-shared bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadId(pub usize);

bitflags! {
    /// DMA interrupt event sources the driver reacts to.
    ///
    /// All three feed the same completion handler: a transfer that
    /// overran or hit an illegal address still has to be finalized and
    /// its waiter released.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DmaEvents: u32 {
        /// Transfer finished normally.
        const COMPLETE = 1 << 0;
        /// Transfer overran the programmed length.
        const OVERRUN = 1 << 1;
        /// Transfer touched an address outside the unlocked range.
        const ILL_ADDR = 1 << 2;
    }
}

impl DmaEvents {
    /// The full set hooked at init and unhooked at shutdown.
    pub const ALL_HOOKED: DmaEvents = DmaEvents::all();
}

/// The drive's opaque hardware command interface.
///
/// One command server, one handle at a time. The driver guarantees it
/// never holds more than one outstanding [`CommandHandle`]; implementors
/// may assume calls are serialized except for `dma_ack`, which arrives
/// from interrupt context.
pub trait HwInterface {
    /// Submit a command. Returns `None` if the command server cannot
    /// accept one right now (the driver retries after a tick + yield).
    fn submit(&self, cmd: Command, param: &CommandParam) -> Option<CommandHandle>;

    /// Advance the command-processing loop one step. Must be invoked
    /// repeatedly while polling.
    fn tick(&self);

    /// Poll a submitted command, filling `status` with the raw payload.
    fn poll(&self, hnd: CommandHandle, status: &mut CmdStatus) -> CmdState;

    /// Request cancellation of an in-flight command. Confirmation comes
    /// from subsequent polls, not from this call.
    fn abort(&self, hnd: CommandHandle);

    /// Hard-reset the command interface.
    fn reset(&self);

    /// Reinitialize the command interface after a reset.
    fn init(&self);

    /// Query drive activity and disc type.
    fn query_drive(&self) -> DriveQuery;

    /// Program the sector part/coding/size used by subsequent reads.
    fn set_sector_mode(&self, params: &SectorModeParams) -> Result<(), ()>;

    /// Kick off an asynchronous DMA transfer for a streaming command.
    fn dma_transfer(&self, hnd: CommandHandle, addr: usize, len: usize) -> Result<(), ()>;

    /// Kick off a PIO transfer for a streaming command; the data is
    /// moved by subsequent ticks.
    fn pio_transfer(&self, hnd: CommandHandle, addr: usize, len: usize) -> Result<(), ()>;

    /// Progress of the current DMA transfer.
    fn dma_check(&self, hnd: CommandHandle) -> TransferCheck;

    /// Progress of the current PIO transfer.
    fn pio_check(&self, hnd: CommandHandle) -> TransferCheck;

    /// Acknowledge DMA completion to the transfer layer. The only
    /// method called from interrupt context; must not block.
    fn dma_ack(&self);
}

/// Services the driver needs from the surrounding system.
pub trait Platform {
    /// Identity of the calling thread (nonzero).
    fn thread_id(&self) -> ThreadId;

    /// Cooperatively give up the CPU to other runnable threads.
    fn yield_now(&self);

    /// Monotonic milliseconds since some fixed origin.
    fn now_ms(&self) -> u64;

    /// Whether the caller is running in interrupt context.
    fn in_irq(&self) -> bool;

    /// Request a scheduler pass so a just-woken thread resumes promptly.
    /// Called from interrupt context; must not block.
    fn schedule(&self);

    /// Invalidate data-cache lines covering `[addr, addr + len)`.
    /// Required before DMA into a cached alias: the transfer bypasses
    /// the cache, and stale lines would shadow the new data.
    fn dcache_inval(&self, addr: usize, len: usize);

    /// Flush the instruction cache over `[addr, addr + len)` after
    /// patching code in that range.
    fn icache_flush(&self, addr: usize, len: usize);

    /// Read a 16-bit word from a physical address (uncached access).
    fn read_mem16(&self, addr: usize) -> u16;

    /// Read a 32-bit word from a physical address (uncached access).
    fn read_mem32(&self, addr: usize) -> u32;

    /// Write a 32-bit word to a physical address (uncached access).
    fn write_mem32(&self, addr: usize, value: u32);

    /// Route the given DMA events to the driver's completion handler.
    /// The caller of [`Cdrom::init`](crate::Cdrom::init) is responsible
    /// for wiring the actual interrupt vector to
    /// [`Cdrom::dma_irq`](crate::Cdrom::dma_irq).
    fn hook_dma_events(&self, events: DmaEvents);

    /// Detach the driver from the given DMA events.
    fn unhook_dma_events(&self, events: DmaEvents);
}

// =============================================================================
// Memory map constants
// =============================================================================
//
// Fixed addresses of the target memory model. DMA sees physical
// addresses, so buffer pointers are masked into the cacheable alias
// before being handed to the hardware.
// =============================================================================

/// Memory map constants used by buffer masking and the init handshake.
pub mod mem {
    /// Cached mirror base.
    pub const AREA_P1_BASE: usize = 0x8000_0000;
    /// Uncached mirror base.
    pub const AREA_P2_BASE: usize = 0xa000_0000;
    /// Masks a pointer into the cacheable alias range.
    pub const AREA_CACHE_MASK: usize = 0x1fff_ffff;
    /// Base of system RAM in the physical map.
    pub const SYSMEM_BASE: usize = 0x0c00_0000;

    /// DMA protection register.
    pub const DMA_PROTECTION_REG: usize = 0x005f_74b8;
    /// Drive reactivation register written during the boot-ROM handshake.
    pub const REACTIVATE_REG: usize = 0x005f_74e4;

    /// Magic upper half of the DMA protection unlock values.
    pub const DMA_UNLOCK_CODE: u32 = 0x8843;
    /// Protection value allowing DMA into system memory only.
    pub const DMA_UNLOCK_SYSMEM: u32 = (DMA_UNLOCK_CODE << 16) | 0x407f;
    /// Protection value allowing DMA into all of memory.
    pub const DMA_UNLOCK_ALLMEM: u32 = (DMA_UNLOCK_CODE << 16) | 0x007f;

    /// Bytes of the protection-check region scanned for unlock markers.
    pub const PROTECTION_SCAN_LEN: usize = 16 << 10;
}

/// Required alignment for DMA buffers (one cache line).
pub const DMA_BUFFER_ALIGN: usize = 32;

/// Required alignment for PIO buffers.
pub const PIO_BUFFER_ALIGN: usize = 2;
