use core::arch::naked_asm;
use core::mem::offset_of;
use x86_64::VirtAddr;

/// Entry point a new thread is started with, taking its opaque argument.
pub type EntryFn = extern "C" fn(*mut u8) -> i32;

const FXSAVE_SIZE: usize = 512;
const FPU_CONTROL_WORD: u16 = 0x037f;
const MXCSR_OFFSET: usize = 24;
const MXCSR_DEFAULT: u32 = 0x1f80;

#[derive(Clone, Copy)]
#[repr(C, align(16))]
struct FxSaveArea([u8; FXSAVE_SIZE]);

impl Default for FxSaveArea {
    fn default() -> Self {
        let mut area = [0u8; FXSAVE_SIZE];
        area[..2].copy_from_slice(&FPU_CONTROL_WORD.to_le_bytes());
        area[MXCSR_OFFSET..MXCSR_OFFSET + 4].copy_from_slice(&MXCSR_DEFAULT.to_le_bytes());
        Self(area)
    }
}

/// Saved register file of a suspended thread.
///
/// The layout is fixed: [`swap_rfiles`] addresses every field by offset.
#[derive(Clone, Copy, Default)]
#[repr(C, align(16))]
pub struct Context {
    fxsave: FxSaveArea,
    rsp: usize,
    rbp: usize,
    rbx: usize,
    r12: usize,
    r13: usize,
    r14: usize,
    r15: usize,
    rdi: usize,
    rsi: usize,
}

const _: () = {
    assert!(offset_of!(Context, fxsave) == 0x000);
    assert!(offset_of!(Context, rsp) == 0x200);
    assert!(offset_of!(Context, rbp) == 0x208);
    assert!(offset_of!(Context, rbx) == 0x210);
    assert!(offset_of!(Context, r12) == 0x218);
    assert!(offset_of!(Context, r13) == 0x220);
    assert!(offset_of!(Context, r14) == 0x228);
    assert!(offset_of!(Context, r15) == 0x230);
    assert!(offset_of!(Context, rdi) == 0x238);
    assert!(offset_of!(Context, rsi) == 0x240);
};

impl Context {
    /// Lays out a bootstrap frame at the top of `stack_end` so that the first
    /// switch into this context lands in [`thread_wrapper`] with `entry` and
    /// `arg` as its two arguments.
    ///
    /// # Safety
    ///
    /// `stack_end` must be one past the top of a writable region of at least
    /// three words that stays alive for as long as the context can be resumed.
    pub unsafe fn init(&mut self, entry: EntryFn, arg: *mut u8, stack_end: VirtAddr) {
        let top = stack_end.align_down(16u64).as_u64() as *mut usize;

        // Slot the wrapper would have returned to; zero ends backtraces.
        let return_slot = unsafe { top.sub(1) };
        let wrapper_slot = unsafe { top.sub(2) };
        let frame_slot = unsafe { top.sub(3) };

        unsafe {
            return_slot.write(0);
            wrapper_slot.write(thread_wrapper as *const () as usize);
            frame_slot.write(0);
        }

        *self = Self::default();
        self.rsp = frame_slot as usize;
        self.rbp = frame_slot as usize;
        self.rdi = entry as *const () as usize;
        self.rsi = arg as usize;
    }
}

/// Runs a thread body and routes its return value through the single
/// termination path. Only ever entered through a bootstrap frame.
extern "C" fn thread_wrapper(entry: EntryFn, arg: *mut u8) -> ! {
    let code = entry(arg);
    super::runtime::exit(code)
}

/// Saves the running register file into `old` and resumes `new`.
///
/// Returns only when some later call switches back into `old`.
///
/// # Safety
///
/// `old` must be writable and `new` must hold either a context saved by this
/// function or one prepared by [`Context::init`] whose stack is still mapped.
#[unsafe(naked)]
pub unsafe extern "C" fn swap_rfiles(_old: *mut Context, _new: *const Context) {
    naked_asm!(
        "push rbp",
        "mov rbp, rsp",
        "mov [rdi + 0x200], rsp",
        "mov [rdi + 0x208], rbp",
        "mov [rdi + 0x210], rbx",
        "mov [rdi + 0x218], r12",
        "mov [rdi + 0x220], r13",
        "mov [rdi + 0x228], r14",
        "mov [rdi + 0x230], r15",
        "mov [rdi + 0x238], rdi",
        "mov [rdi + 0x240], rsi",
        "fxsave [rdi]",
        "fxrstor [rsi]",
        "mov rsp, [rsi + 0x200]",
        "mov rbp, [rsi + 0x208]",
        "mov rbx, [rsi + 0x210]",
        "mov r12, [rsi + 0x218]",
        "mov r13, [rsi + 0x220]",
        "mov r14, [rsi + 0x228]",
        "mov r15, [rsi + 0x230]",
        "mov rdi, [rsi + 0x238]",
        "mov rsi, [rsi + 0x240]",
        "leave",
        "ret",
    );
}
