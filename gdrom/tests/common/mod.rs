//! Scriptable hardware and platform stubs for driving the driver's
//! polling state machine deterministically from host tests.
//!
//! Both stubs are cheap-cloneable handles around shared state so a test
//! can keep poking them after moving clones into the driver context.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use gdrom::{
    CmdState, CmdStatus, Command, CommandHandle, CommandParam, DmaEvents, DriveQuery, HwInterface,
    Platform, SectorModeParams, ThreadId, Toc, TransferCheck,
};

// =============================================================================
// Hardware stub
// =============================================================================

struct ActiveCmd {
    cmd: Command,
    param: CommandParam,
    polls: u32,
    aborted: bool,
    /// Primary error code this command is scripted to fail with.
    fail_err1: Option<i32>,
    finished: bool,
}

struct DmaXfer {
    active: bool,
    requested: usize,
    bytes: u32,
}

struct PioXfer {
    active: bool,
    requested: usize,
    ticks_left: u32,
    bytes: u32,
}

struct HwState {
    active: Mutex<Vec<ActiveCmd>>,
    next_handle: AtomicU32,

    /// Total calls into any hardware entry point.
    pub hw_calls: AtomicU32,
    pub submits: AtomicU32,
    pub init_submits: AtomicU32,
    pub abort_calls: AtomicU32,
    pub reset_calls: AtomicU32,
    pub init_calls: AtomicU32,
    pub dma_acks: AtomicU32,
    pub dma_transfers: AtomicU32,

    /// Commands outstanding right now / high-water mark / observed
    /// violations of the single-flight invariant.
    outstanding: AtomicU32,
    pub max_outstanding: AtomicU32,
    pub violations: AtomicU32,

    /// Scripting knobs.
    never_terminal: AtomicBool,
    stalled_cmd: Mutex<Option<Command>>,
    init_disc_changed_left: AtomicU32,
    init_no_disc_left: AtomicU32,

    dma: Mutex<DmaXfer>,
    pio: Mutex<PioXfer>,

    /// TOC image written back on GetToc completion.
    toc_image: Mutex<Option<Toc>>,

    /// Drive query answer: (status word, disc type word).
    drive_words: Mutex<(u32, u32)>,

    /// (params, init submissions at that moment) per sector-mode call.
    pub sector_modes: Mutex<Vec<(SectorModeParams, u32)>>,
}

#[derive(Clone)]
pub struct StubHw(Arc<HwState>);

impl StubHw {
    pub fn new() -> Self {
        Self(Arc::new(HwState {
            active: Mutex::new(Vec::new()),
            next_handle: AtomicU32::new(1),
            hw_calls: AtomicU32::new(0),
            submits: AtomicU32::new(0),
            init_submits: AtomicU32::new(0),
            abort_calls: AtomicU32::new(0),
            reset_calls: AtomicU32::new(0),
            init_calls: AtomicU32::new(0),
            dma_acks: AtomicU32::new(0),
            dma_transfers: AtomicU32::new(0),
            outstanding: AtomicU32::new(0),
            max_outstanding: AtomicU32::new(0),
            violations: AtomicU32::new(0),
            never_terminal: AtomicBool::new(false),
            stalled_cmd: Mutex::new(None),
            init_disc_changed_left: AtomicU32::new(0),
            init_no_disc_left: AtomicU32::new(0),
            dma: Mutex::new(DmaXfer { active: false, requested: 0, bytes: 0 }),
            pio: Mutex::new(PioXfer { active: false, requested: 0, ticks_left: 0, bytes: 0 }),
            toc_image: Mutex::new(None),
            drive_words: Mutex::new((2, 0x80)),
            sector_modes: Mutex::new(Vec::new()),
        }))
    }

    /// Make every poll report Processing until the command is aborted.
    pub fn set_never_terminal(&self, v: bool) {
        self.0.never_terminal.store(v, Ordering::SeqCst);
    }

    /// Polls of `cmd` report Processing forever; other commands run
    /// normally. The stall lifts only through an abort.
    pub fn stall_cmd(&self, cmd: Command) {
        *self.0.stalled_cmd.lock().unwrap() = Some(cmd);
    }

    /// The next `n` Init commands fail with the disc-changed code.
    pub fn fail_init_with_disc_changed(&self, n: u32) {
        self.0.init_disc_changed_left.store(n, Ordering::SeqCst);
    }

    /// The next `n` Init commands fail with the no-disc code.
    pub fn fail_init_with_no_disc(&self, n: u32) {
        self.0.init_no_disc_left.store(n, Ordering::SeqCst);
    }

    /// TOC the drive writes back on the next GetToc.
    pub fn set_toc(&self, toc: Toc) {
        *self.0.toc_image.lock().unwrap() = Some(toc);
    }

    pub fn set_drive_words(&self, status: u32, disc_type: u32) {
        *self.0.drive_words.lock().unwrap() = (status, disc_type);
    }

    /// Finish the in-flight DMA transfer (the "hardware side" of a
    /// completion interrupt; pair with `Cdrom::dma_irq`).
    pub fn complete_dma(&self) {
        let mut dma = self.0.dma.lock().unwrap();
        dma.active = false;
        dma.bytes = dma.requested as u32;
    }

    pub fn hw_calls(&self) -> u32 {
        self.0.hw_calls.load(Ordering::SeqCst)
    }

    pub fn submits(&self) -> u32 {
        self.0.submits.load(Ordering::SeqCst)
    }

    pub fn init_submits(&self) -> u32 {
        self.0.init_submits.load(Ordering::SeqCst)
    }

    pub fn abort_calls(&self) -> u32 {
        self.0.abort_calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) -> u32 {
        self.0.reset_calls.load(Ordering::SeqCst)
    }

    pub fn init_calls(&self) -> u32 {
        self.0.init_calls.load(Ordering::SeqCst)
    }

    pub fn dma_acks(&self) -> u32 {
        self.0.dma_acks.load(Ordering::SeqCst)
    }

    pub fn dma_transfers(&self) -> u32 {
        self.0.dma_transfers.load(Ordering::SeqCst)
    }

    pub fn max_outstanding(&self) -> u32 {
        self.0.max_outstanding.load(Ordering::SeqCst)
    }

    pub fn violations(&self) -> u32 {
        self.0.violations.load(Ordering::SeqCst)
    }

    pub fn sector_modes(&self) -> Vec<(SectorModeParams, u32)> {
        self.0.sector_modes.lock().unwrap().clone()
    }

    fn entered(&self) {
        self.0.hw_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self, slot: &mut ActiveCmd) {
        if !slot.finished {
            slot.finished = true;
            self.0.outstanding.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl HwInterface for StubHw {
    fn submit(&self, cmd: Command, param: &CommandParam) -> Option<CommandHandle> {
        self.entered();
        self.0.submits.fetch_add(1, Ordering::SeqCst);

        let mut active = self.0.active.lock().unwrap();
        if active.iter().any(|c| !c.finished) {
            self.0.violations.fetch_add(1, Ordering::SeqCst);
        }

        let mut fail_err1 = None;
        if cmd == Command::Init {
            self.0.init_submits.fetch_add(1, Ordering::SeqCst);
            let take = |counter: &AtomicU32| {
                counter
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            };
            if take(&self.0.init_disc_changed_left) {
                fail_err1 = Some(6);
            } else if take(&self.0.init_no_disc_left) {
                fail_err1 = Some(2);
            }
        }

        let prev = self.0.outstanding.fetch_add(1, Ordering::SeqCst);
        self.0.max_outstanding.fetch_max(prev + 1, Ordering::SeqCst);

        let raw = self.0.next_handle.fetch_add(1, Ordering::SeqCst);
        active.push(ActiveCmd {
            cmd,
            param: *param,
            polls: 0,
            aborted: false,
            fail_err1,
            finished: false,
        });
        // Handle value encodes the slot so poll can find it.
        CommandHandle::new(raw)
    }

    fn tick(&self) {
        self.entered();
        let mut pio = self.0.pio.lock().unwrap();
        if pio.active {
            if pio.ticks_left > 0 {
                pio.ticks_left -= 1;
            }
            if pio.ticks_left == 0 {
                pio.active = false;
                pio.bytes = pio.requested as u32;
            }
        }
    }

    fn poll(&self, hnd: CommandHandle, status: &mut CmdStatus) -> CmdState {
        self.entered();
        let mut active = self.0.active.lock().unwrap();
        let idx = hnd.raw() as usize - 1;
        let Some(slot) = active.get_mut(idx) else {
            return CmdState::NoActive;
        };
        slot.polls += 1;

        if slot.aborted || slot.finished {
            self.finish(slot);
            return CmdState::NoActive;
        }
        if self.0.never_terminal.load(Ordering::SeqCst) {
            return CmdState::Processing;
        }
        if *self.0.stalled_cmd.lock().unwrap() == Some(slot.cmd) {
            return CmdState::Processing;
        }

        if let Some(err1) = slot.fail_err1 {
            status.err1 = err1;
            self.finish(slot);
            return CmdState::Failed;
        }

        match slot.cmd {
            Command::GetToc => {
                if let CommandParam::Toc { buffer, .. } = slot.param {
                    if let Some(toc) = *self.0.toc_image.lock().unwrap() {
                        // The drive DMAs the TOC into the caller's buffer.
                        unsafe { (buffer as *mut Toc).write(toc) };
                    }
                }
                self.finish(slot);
                CmdState::Completed
            }
            Command::DmaReadStream | Command::PioReadStream => CmdState::Streaming,
            _ => {
                self.finish(slot);
                CmdState::Completed
            }
        }
    }

    fn abort(&self, hnd: CommandHandle) {
        self.entered();
        self.0.abort_calls.fetch_add(1, Ordering::SeqCst);
        let mut active = self.0.active.lock().unwrap();
        if let Some(slot) = active.get_mut(hnd.raw() as usize - 1) {
            slot.aborted = true;
        }
        let mut dma = self.0.dma.lock().unwrap();
        dma.active = false;
    }

    fn reset(&self) {
        self.entered();
        self.0.reset_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn init(&self) {
        self.entered();
        self.0.init_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn query_drive(&self) -> DriveQuery {
        self.entered();
        let (status, disc_type) = *self.0.drive_words.lock().unwrap();
        DriveQuery::Ready { status, disc_type }
    }

    fn set_sector_mode(&self, params: &SectorModeParams) -> Result<(), ()> {
        self.entered();
        let at_init_submits = self.0.init_submits.load(Ordering::SeqCst);
        self.0
            .sector_modes
            .lock()
            .unwrap()
            .push((*params, at_init_submits));
        Ok(())
    }

    fn dma_transfer(&self, _hnd: CommandHandle, _addr: usize, len: usize) -> Result<(), ()> {
        self.entered();
        self.0.dma_transfers.fetch_add(1, Ordering::SeqCst);
        let mut dma = self.0.dma.lock().unwrap();
        dma.active = true;
        dma.requested = len;
        dma.bytes = (len / 2) as u32;
        Ok(())
    }

    fn pio_transfer(&self, _hnd: CommandHandle, _addr: usize, len: usize) -> Result<(), ()> {
        self.entered();
        let mut pio = self.0.pio.lock().unwrap();
        pio.active = true;
        pio.requested = len;
        pio.ticks_left = 4;
        pio.bytes = 0;
        Ok(())
    }

    fn dma_check(&self, _hnd: CommandHandle) -> TransferCheck {
        self.entered();
        let dma = self.0.dma.lock().unwrap();
        if dma.active {
            TransferCheck::InFlight { bytes: dma.bytes }
        } else {
            TransferCheck::Idle { bytes: dma.bytes }
        }
    }

    fn pio_check(&self, _hnd: CommandHandle) -> TransferCheck {
        self.entered();
        let pio = self.0.pio.lock().unwrap();
        if pio.active {
            TransferCheck::InFlight { bytes: pio.bytes }
        } else {
            TransferCheck::Idle { bytes: pio.bytes }
        }
    }

    fn dma_ack(&self) {
        // Interrupt context: counters only.
        self.0.hw_calls.fetch_add(1, Ordering::SeqCst);
        self.0.dma_acks.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Platform stub
// =============================================================================

static NEXT_THREAD_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static THREAD_ID: usize = NEXT_THREAD_ID.fetch_add(1, Ordering::SeqCst);
}

struct PlatState {
    start: Instant,
    in_irq: AtomicBool,
    mem16: Mutex<HashMap<usize, u16>>,
    mem32: Mutex<HashMap<usize, u32>>,
    pub mem_writes: Mutex<Vec<(usize, u32)>>,
    pub mem_reads16: AtomicU32,
    pub mem_reads32: AtomicU32,
    pub dcache_invals: AtomicU32,
    pub icache_flushes: AtomicU32,
    pub schedules: AtomicU32,
    hooked: Mutex<DmaEvents>,
    unhooked: Mutex<DmaEvents>,
}

#[derive(Clone)]
pub struct StubPlat(Arc<PlatState>);

impl StubPlat {
    pub fn new() -> Self {
        Self(Arc::new(PlatState {
            start: Instant::now(),
            in_irq: AtomicBool::new(false),
            mem16: Mutex::new(HashMap::new()),
            mem32: Mutex::new(HashMap::new()),
            mem_writes: Mutex::new(Vec::new()),
            mem_reads16: AtomicU32::new(0),
            mem_reads32: AtomicU32::new(0),
            dcache_invals: AtomicU32::new(0),
            icache_flushes: AtomicU32::new(0),
            schedules: AtomicU32::new(0),
            hooked: Mutex::new(DmaEvents::empty()),
            unhooked: Mutex::new(DmaEvents::empty()),
        }))
    }

    pub fn set_in_irq(&self, v: bool) {
        self.0.in_irq.store(v, Ordering::SeqCst);
    }

    pub fn poke16(&self, addr: usize, value: u16) {
        self.0.mem16.lock().unwrap().insert(addr, value);
    }

    pub fn poke32(&self, addr: usize, value: u32) {
        self.0.mem32.lock().unwrap().insert(addr, value);
    }

    pub fn writes(&self) -> Vec<(usize, u32)> {
        self.0.mem_writes.lock().unwrap().clone()
    }

    pub fn icache_flushes(&self) -> u32 {
        self.0.icache_flushes.load(Ordering::SeqCst)
    }

    pub fn schedules(&self) -> u32 {
        self.0.schedules.load(Ordering::SeqCst)
    }

    pub fn hooked(&self) -> DmaEvents {
        *self.0.hooked.lock().unwrap()
    }

    pub fn unhooked(&self) -> DmaEvents {
        *self.0.unhooked.lock().unwrap()
    }
}

impl Platform for StubPlat {
    fn thread_id(&self) -> ThreadId {
        ThreadId(THREAD_ID.with(|id| *id))
    }

    fn yield_now(&self) {
        std::thread::yield_now();
    }

    fn now_ms(&self) -> u64 {
        self.0.start.elapsed().as_millis() as u64
    }

    fn in_irq(&self) -> bool {
        self.0.in_irq.load(Ordering::SeqCst)
    }

    fn schedule(&self) {
        self.0.schedules.fetch_add(1, Ordering::SeqCst);
    }

    fn dcache_inval(&self, _addr: usize, _len: usize) {
        self.0.dcache_invals.fetch_add(1, Ordering::SeqCst);
    }

    fn icache_flush(&self, _addr: usize, _len: usize) {
        self.0.icache_flushes.fetch_add(1, Ordering::SeqCst);
    }

    fn read_mem16(&self, addr: usize) -> u16 {
        self.0.mem_reads16.fetch_add(1, Ordering::SeqCst);
        self.0.mem16.lock().unwrap().get(&addr).copied().unwrap_or(0)
    }

    fn read_mem32(&self, addr: usize) -> u32 {
        self.0.mem_reads32.fetch_add(1, Ordering::SeqCst);
        self.0.mem32.lock().unwrap().get(&addr).copied().unwrap_or(0)
    }

    fn write_mem32(&self, addr: usize, value: u32) {
        self.0.mem32.lock().unwrap().insert(addr, value);
        self.0.mem_writes.lock().unwrap().push((addr, value));
    }

    fn hook_dma_events(&self, events: DmaEvents) {
        *self.0.hooked.lock().unwrap() |= events;
    }

    fn unhook_dma_events(&self, events: DmaEvents) {
        *self.0.unhooked.lock().unwrap() |= events;
    }
}

// =============================================================================
// Buffers with hardware-grade alignment
// =============================================================================

/// A 32-byte-aligned byte buffer for DMA-eligible reads.
#[repr(C, align(32))]
pub struct AlignedBuf<const N: usize>(pub [u8; N]);

impl<const N: usize> AlignedBuf<N> {
    pub fn new() -> Self {
        Self([0u8; N])
    }
}

/// Build a packed TOC entry word.
pub fn toc_entry(ctrl: u32, lba: u32) -> u32 {
    (ctrl << 28) | (lba & 0x00ff_ffff)
}

/// Build a packed first/last track marker.
pub fn toc_marker(track: u32) -> u32 {
    track << 16
}
