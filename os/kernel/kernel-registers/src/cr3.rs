#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
use crate::LoadRegisterUnsafe;
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// CR3: Page-Directory Base Register (32-bit paging, PAE disabled).
///
/// Holds the physical base address of the page directory and cache-control
/// flags for directory accesses.
#[bitfield(u32)]
pub struct Cr3 {
    /// Bits 0–2: Ignored.
    #[bits(3)]
    pub reserved0: u8,

    /// Bit 3: PWT: Page-level Write-Through for the page directory.
    pub pwt: bool,

    /// Bit 4: PCD: Page-level Cache Disable for the page directory.
    pub pcd: bool,

    /// Bits 5–11: Ignored.
    #[bits(7)]
    pub reserved1: u8,

    /// Bits 12–31: Page directory physical base >> 12.
    #[bits(20)]
    page_directory_4k: u32,
}

impl Cr3 {
    /// Create a `Cr3` value from a page directory base and flags.
    #[must_use]
    pub const fn from_page_directory(root: PhysicalPage<Size4K>, pwt: bool, pcd: bool) -> Self {
        Self::new()
            .with_pwt(pwt)
            .with_pcd(pcd)
            .with_page_directory_4k(root.number())
    }

    /// The page holding the page directory.
    #[must_use]
    pub const fn page_directory(&self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_number(self.page_directory_4k())
    }

    /// Physical address of the first page directory entry.
    #[must_use]
    pub const fn page_directory_phys(&self) -> PhysicalAddress {
        self.page_directory().base()
    }
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
impl LoadRegisterUnsafe for Cr3 {
    #[allow(clippy::cast_possible_truncation)]
    unsafe fn load_unsafe() -> Self {
        let mut cr3: usize;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        // Non-PAE CR3 is a 32-bit quantity; the upper half is zero in long mode too.
        Self::from_bits(cr3 as u32)
    }
}
