use core::ptr::{self, NonNull};
use spin::Once;
use std::io;
use thiserror::Error;
use x86_64::VirtAddr;

/// Stack size used when the soft stack limit is unbounded or unavailable.
pub const DEFAULT_STACK_SIZE: usize = 8 * 1024 * 1024;

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "openbsd"
))]
const MAP_STACK: libc::c_int = libc::MAP_STACK;
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "openbsd"
)))]
const MAP_STACK: libc::c_int = 0;

static STACK_LAYOUT: Once<StackResult<StackLayout>> = Once::new();

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    #[error("Failed to query the platform page size")]
    PageSize,
    #[error("Stack soft limit is zero, refusing to allocate stacks")]
    ZeroLimit,
    #[error("Failed to map thread stack (errno {0})")]
    Map(i32),
}

pub type StackResult<T> = Result<T, StackError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackLayout {
    pub page_size: usize,
    pub stack_size: usize,
}

impl StackLayout {
    fn query() -> StackResult<Self> {
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if page_size <= 0 {
            return Err(StackError::PageSize);
        }

        let mut limit = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        let soft_limit = match unsafe { libc::getrlimit(libc::RLIMIT_STACK, &mut limit) } {
            -1 => None,
            _ if limit.rlim_cur == libc::RLIM_INFINITY => None,
            _ => Some(limit.rlim_cur as usize),
        };

        Self::from_limit(page_size as usize, soft_limit)
    }

    fn from_limit(page_size: usize, soft_limit: Option<usize>) -> StackResult<Self> {
        let stack_size = match soft_limit {
            None => DEFAULT_STACK_SIZE,
            Some(0) => return Err(StackError::ZeroLimit),
            Some(limit) => limit,
        };

        Ok(Self {
            page_size,
            stack_size: stack_size.next_multiple_of(page_size),
        })
    }
}

/// Page size and per-thread stack size, computed once per process.
pub fn layout() -> StackResult<StackLayout> {
    STACK_LAYOUT
        .call_once(|| {
            let layout = StackLayout::query();
            match &layout {
                Ok(layout) => log::debug!("Stack layout: {:?}", layout),
                Err(err) => log::error!("{}", err),
            }
            layout
        })
        .clone()
}

/// Anonymous mapping used as a downward-growing thread stack.
#[derive(Debug)]
pub struct ThreadStack {
    base: NonNull<u8>,
    size: usize,
}

impl ThreadStack {
    pub fn allocate() -> StackResult<Self> {
        let size = layout()?.stack_size;

        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | MAP_STACK,
                -1,
                0,
            )
        };

        if base == libc::MAP_FAILED {
            let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
            let err = StackError::Map(errno);
            log::error!("{}", err);
            return Err(err);
        }

        let base = NonNull::new(base.cast::<u8>()).ok_or(StackError::Map(0))?;
        Ok(Self { base, size })
    }

    #[inline]
    pub fn start_address(&self) -> VirtAddr {
        VirtAddr::from_ptr(self.base.as_ptr())
    }

    #[inline]
    pub fn end_address(&self) -> VirtAddr {
        self.start_address() + self.size as u64
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for ThreadStack {
    fn drop(&mut self) {
        if unsafe { libc::munmap(self.base.as_ptr().cast(), self.size) } == -1 {
            log::error!(
                "Failed to unmap stack at {:#x}: {}",
                self.start_address().as_u64(),
                io::Error::last_os_error()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_rounded_up_to_whole_pages() {
        let layout = StackLayout::from_limit(4096, Some(10_000)).unwrap();
        assert_eq!(layout.stack_size, 12_288);

        let layout = StackLayout::from_limit(4096, Some(8192)).unwrap();
        assert_eq!(layout.stack_size, 8192);
    }

    #[test]
    fn unbounded_limit_falls_back_to_default() {
        let layout = StackLayout::from_limit(4096, None).unwrap();
        assert_eq!(layout.stack_size, DEFAULT_STACK_SIZE);
    }

    #[test]
    fn zero_limit_is_rejected() {
        assert_eq!(
            StackLayout::from_limit(4096, Some(0)),
            Err(StackError::ZeroLimit)
        );
    }

    #[test]
    fn layout_is_cached() {
        assert_eq!(layout(), layout());
    }

    #[test]
    fn allocated_stack_is_page_multiple_and_writable() {
        let page_size = layout().unwrap().page_size;
        let stack = ThreadStack::allocate().unwrap();

        assert!(stack.size() > 0);
        assert_eq!(stack.size() % page_size, 0);
        assert_eq!(stack.start_address().as_u64() % page_size as u64, 0);
        assert_eq!(
            stack.end_address() - stack.start_address(),
            stack.size() as u64
        );

        unsafe {
            stack.base.as_ptr().write(0xaa);
            stack.base.as_ptr().add(stack.size() - 1).write(0x55);
        }
    }

    #[test]
    fn releasing_one_stack_leaves_others_mapped() {
        let first = ThreadStack::allocate().unwrap();
        let second = ThreadStack::allocate().unwrap();
        let top = (second.end_address().as_u64() - 1) as *mut u8;

        unsafe { top.write(7) };
        drop(first);
        assert_eq!(unsafe { top.read() }, 7);
    }
}
