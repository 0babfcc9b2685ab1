use std::ffi::c_void;
use std::fs::File;
use std::num::NonZeroUsize;
use std::ptr::NonNull;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman;
use nix::sys::mman::MapFlags;
use nix::sys::mman::ProtFlags;
use nix::sys::stat::Mode;
use snafu::ensure;
use snafu::OptionExt;
use snafu::ResultExt;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::convert_num;
use crate::error;
use crate::error::Result;

/// A named POSIX shared memory object, mapped read/write into this process.
///
/// ```text
///  ptr
///   |
///   v
///   +-------------------------------------------------------+
///   | len bytes, MAP_SHARED                                 |
///   +-------------------------------------------------------+
/// ```
///
/// Dropping the region only unmaps it. The underlying object stays until
/// [ShmRegion::unlink] is called with its name.
pub(crate) struct ShmRegion {
    /// The name passed to `shm_open`, always with a leading slash.
    name: String,

    /// The start of the mapping.
    ptr: NonNull<c_void>,

    /// The length of the mapping, which is the size of the object.
    len: usize,
}

unsafe impl Send for ShmRegion {}

impl ShmRegion {
    /// Create a new shared memory object with the given size and map it.
    ///
    /// Fails with [error::Error::AlreadyExists] if an object with this name
    /// is already present. The content is zero-filled by `ftruncate`.
    pub fn create(name: &str, len: usize) -> Result<Self> {
        ensure!(
            len > 0,
            error::InvalidParameterSnafu {
                detail: format!("The size of region {} must be > 0.", name),
            }
        );

        let name = os_name(name)?;
        let flags = OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR;
        let mode = Mode::S_IRUSR | Mode::S_IWUSR;

        let fd = match mman::shm_open(name.as_str(), flags, mode) {
            Ok(fd) => fd,
            Err(Errno::EEXIST) => {
                return error::AlreadyExistsSnafu { name }.fail();
            }
            Err(e) => {
                return Err(e).context(error::ShmOpenSnafu { name });
            }
        };
        let file = File::from(fd);

        let set_len = convert_num!(len, u64)
            .and_then(|l| file.set_len(l).context(error::IoSnafu));
        if let Err(e) = set_len {
            unlink_after_failed_create(&name);
            return Err(e);
        }

        match Self::map(name.clone(), &file, len) {
            Ok(region) => Ok(region),
            Err(e) => {
                unlink_after_failed_create(&name);
                Err(e)
            }
        }
    }

    /// Open an existing shared memory object and map all of it.
    ///
    /// Fails with [error::Error::NotFound] if no object has this name.
    pub fn open(name: &str) -> Result<Self> {
        let name = os_name(name)?;

        let flags = OFlag::O_RDWR;

        let fd = match mman::shm_open(name.as_str(), flags, Mode::empty()) {
            Ok(fd) => fd,
            Err(Errno::ENOENT) => {
                return error::NotFoundSnafu { name }.fail();
            }
            Err(e) => {
                return Err(e).context(error::ShmOpenSnafu { name });
            }
        };
        let file = File::from(fd);

        let len = file.metadata().context(error::IoSnafu)?.len();
        let len = convert_num!(len, usize)?;

        ensure!(
            len > 0,
            error::InvalidParameterSnafu {
                detail: format!("The region {} has zero size.", name),
            }
        );

        Self::map(name, &file, len)
    }

    fn map(name: String, file: &File, len: usize) -> Result<Self> {
        let mmap_len = NonZeroUsize::new(len).context(
            error::InvalidParameterSnafu {
                detail: format!("Cannot map region {} of size 0.", name),
            },
        )?;
        let prot = ProtFlags::PROT_READ | ProtFlags::PROT_WRITE;

        let ptr = unsafe {
            mman::mmap(None, mmap_len, prot, MapFlags::MAP_SHARED, file, 0)
                .context(error::MmapSnafu)?
        };

        debug!("mapped region {}, len: {}, addr: {:?}", name, len, ptr);

        // The fd can be closed now, the mapping keeps the object alive.
        Ok(ShmRegion { name, ptr, len })
    }

    /// Remove the shared memory object with the given name from the system.
    /// Existing mappings stay valid until they are dropped.
    pub fn unlink(name: &str) -> Result<()> {
        let name = os_name(name)?;

        match mman::shm_unlink(name.as_str()) {
            Ok(()) => Ok(()),
            Err(Errno::ENOENT) => error::NotFoundSnafu { name }.fail(),
            Err(e) => Err(e).context(error::ShmUnlinkSnafu { name }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr() as *mut u8
    }
}

impl Drop for ShmRegion {
    fn drop(&mut self) {
        if let Err(e) = unsafe { mman::munmap(self.ptr, self.len) } {
            error!(
                "munmap failed: {:?}, region: {}, addr: {:?}, len: {}",
                e, self.name, self.ptr, self.len
            );
        }
    }
}

fn unlink_after_failed_create(name: &str) {
    if let Err(e) = mman::shm_unlink(name) {
        warn!("failed to unlink region {} after a failed create: {}", name, e);
    }
}

/// Turn a buffer name into a POSIX shared memory object name: a single
/// leading slash and no other slash.
pub(crate) fn os_name(name: &str) -> Result<String> {
    let bare = name.strip_prefix('/').unwrap_or(name);

    let first_slash = bare.find('/');
    ensure!(
        !bare.is_empty() && first_slash.is_none(),
        error::InvalidParameterSnafu {
            detail: format!("Invalid shared memory name: {:?}.", name),
        }
    );

    Ok(format!("/{}", bare))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn unique_name() -> String {
        format!("shm-region-test-{}", uuid::Uuid::new_v4())
    }

    #[test]
    fn test_os_name() {
        assert_eq!(os_name("test").unwrap(), "/test");
        assert_eq!(os_name("/test").unwrap(), "/test");
        assert_eq!(os_name("test-writer").unwrap(), "/test-writer");

        assert!(matches!(os_name(""), Err(Error::InvalidParameter { .. })));
        assert!(matches!(os_name("/"), Err(Error::InvalidParameter { .. })));
        assert!(matches!(
            os_name("a/b"),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_create_and_open() {
        let name = unique_name();

        let created = ShmRegion::create(&name, 100).unwrap();
        assert_eq!(created.len(), 100);
        assert_eq!(created.name(), format!("/{}", name));

        let zeroed =
            unsafe { std::slice::from_raw_parts(created.as_ptr(), 100) };
        assert!(zeroed.iter().all(|b| *b == 0));

        unsafe { *created.as_ptr().add(7) = 42 };

        let opened = ShmRegion::open(&name).unwrap();
        assert_eq!(opened.len(), 100);
        assert_eq!(unsafe { *opened.as_ptr().add(7) }, 42);

        ShmRegion::unlink(&name).unwrap();
    }

    #[test]
    fn test_create_twice() {
        let name = unique_name();

        let _region = ShmRegion::create(&name, 8).unwrap();
        let result = ShmRegion::create(&name, 8);
        assert!(matches!(result, Err(Error::AlreadyExists { .. })));

        ShmRegion::unlink(&name).unwrap();
    }

    #[test]
    fn test_open_missing() {
        let result = ShmRegion::open(&unique_name());
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_create_zero_size() {
        let result = ShmRegion::create(&unique_name(), 0);
        assert!(matches!(result, Err(Error::InvalidParameter { .. })));
    }

    #[test]
    fn test_failed_create_leaves_no_object() {
        let name = unique_name();

        let result = ShmRegion::create(&name, usize::MAX);
        assert!(matches!(result, Err(Error::Io { .. })));

        assert!(matches!(
            ShmRegion::open(&name),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_unlink_keeps_mapping() {
        let name = unique_name();

        let region = ShmRegion::create(&name, 4).unwrap();
        ShmRegion::unlink(&name).unwrap();

        unsafe { *region.as_ptr() = 1 };
        assert_eq!(unsafe { *region.as_ptr() }, 1);

        assert!(matches!(
            ShmRegion::open(&name),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            ShmRegion::unlink(&name),
            Err(Error::NotFound { .. })
        ));
    }
}
