// =============================================================================
// GD-ROM Driver — Synchronization Primitives
// =============================================================================
//
// The whole driver runs on exactly two primitives:
//
//   DriveLock        — the mutual-exclusion lock serializing every
//                      submit-then-poll sequence against the command
//                      interface.
//   CompletionSignal — a counting wait primitive used only for the DMA
//                      completion hand-off between the interrupt handler
//                      and a blocked requester.
//
// Lock ordering rule: the DriveLock is the outermost (and only) blocking
// lock here. The spin::Mutex around session bookkeeping is taken strictly
// inside it and never from interrupt context.
// =============================================================================

pub mod completion;
pub mod drive_lock;

pub use completion::CompletionSignal;
pub use drive_lock::DriveLock;
