use std::sync::OnceLock;

use windows_sys::Win32::System::{
    Memory::{MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE, VirtualAlloc, VirtualFree},
    SystemInformation::{GetSystemInfo, SYSTEM_INFO},
};

/// Allocates a page-aligned block via `VirtualAlloc`.
///
/// The requested `size` is rounded up to the next page boundary; a request of
/// zero bytes still commits one page.
///
/// # Returns
///
/// `Ok((ptr, capacity))` with a page-aligned pointer and the actual committed
/// capacity in bytes, or `Err(io::Error)` if the allocation fails.
///
/// # Safety
///
/// The returned pointer must eventually be released with [`free`]. The
/// committed memory is zero-initialized.
pub fn allocate(size: usize) -> std::io::Result<(*mut std::ffi::c_void, usize)> {
    let capacity = round_to_pages(size);
    let ptr = unsafe {
        VirtualAlloc(
            std::ptr::null_mut(),
            capacity,
            MEM_COMMIT | MEM_RESERVE,
            PAGE_READWRITE,
        )
    };
    if ptr.is_null() {
        return Err(std::io::Error::last_os_error());
    }
    Ok((ptr, capacity))
}

/// Releases a block obtained from [`allocate`].
///
/// # Safety
///
/// `ptr` must have been returned by [`allocate`], the memory must not have
/// been freed already, and it must not be accessed afterwards.
pub unsafe fn free(ptr: *mut std::ffi::c_void, _size: usize) -> std::io::Result<()> {
    let result = unsafe { VirtualFree(ptr, 0, MEM_RELEASE) };
    if result == 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// In-place resizing is not available on Windows.
///
/// Always returns `Unsupported`; callers fall back to allocate-and-copy.
///
/// # Safety
///
/// No requirements — the allocation is never touched.
pub unsafe fn remap(
    _ptr: *mut std::ffi::c_void,
    _old_size: usize,
    _new_size: usize,
    _may_move: bool,
) -> std::io::Result<*mut std::ffi::c_void> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "page remapping is not supported on this platform",
    ))
}

/// Returns the system page size in bytes, cached after the first query.
pub fn page_size() -> usize {
    static SIZE: OnceLock<usize> = OnceLock::new();
    *SIZE.get_or_init(|| unsafe {
        let mut system_info: SYSTEM_INFO = std::mem::zeroed();
        GetSystemInfo(&mut system_info);
        system_info.dwPageSize as usize
    })
}

fn round_to_pages(size: usize) -> usize {
    let page_size = page_size();
    assert!(page_size.is_power_of_two());
    (size.max(1) + page_size - 1) & !(page_size - 1)
}
