use kernel_alloc::{PinError, PinnedRange, ProcessPinner};
use kernel_memory_addresses::VirtualAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pid(u32);

/// Keeps a log of every pin and unpin request.
#[derive(Default)]
struct FakeHost {
    next: u32,
    pinned: Vec<(Pid, VirtualAddress, usize, u32)>,
    unpinned: Vec<(Pid, u32)>,
    refuse: bool,
}

impl ProcessPinner for FakeHost {
    type Process = Pid;
    type Descriptor = u32;

    fn pin(&mut self, process: &Pid, start: VirtualAddress, len: usize) -> Option<u32> {
        if self.refuse {
            return None;
        }
        self.next += 1;
        self.pinned.push((*process, start, len, self.next));
        Some(self.next)
    }

    fn unpin(&mut self, process: &Pid, descriptor: u32) {
        self.unpinned.push((*process, descriptor));
    }
}

#[test]
fn unpins_exactly_once_on_drop() {
    let mut host = FakeHost::default();
    {
        let range = PinnedRange::pin(&mut host, Pid(7), VirtualAddress::new(0x0010_0000), 0x3000)
            .unwrap();
        assert_eq!(range.start(), VirtualAddress::new(0x0010_0000));
        assert_eq!(range.len(), 0x3000);
        assert!(!range.is_empty());
        assert_eq!(range.descriptor(), Some(&1));
        assert_eq!(range.process(), &Pid(7));
    }
    assert_eq!(host.pinned, [(Pid(7), VirtualAddress::new(0x0010_0000), 0x3000, 1)]);
    assert_eq!(host.unpinned, [(Pid(7), 1)]);
}

#[test]
fn failed_pin_is_reported_and_not_unpinned() {
    let mut host = FakeHost {
        refuse: true,
        ..FakeHost::default()
    };
    let err = PinnedRange::pin(&mut host, Pid(1), VirtualAddress::new(0x4000), 16).unwrap_err();
    assert_eq!(
        err,
        PinError::PinFailed {
            start: VirtualAddress::new(0x4000),
            len: 16
        }
    );
    assert!(host.unpinned.is_empty());
}

#[test]
fn empty_range_never_reaches_the_host() {
    let mut host = FakeHost::default();
    let err = PinnedRange::pin(&mut host, Pid(1), VirtualAddress::new(0x4000), 0).unwrap_err();
    assert_eq!(err, PinError::EmptyRange);
    assert!(host.pinned.is_empty());
    assert!(host.unpinned.is_empty());
}
